use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Fallback URL when a citation tag has no matching link in the reply.
const DEFAULT_SOURCE_URL: &str = "https://t.me/";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Source {
    pub id: usize,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedReply {
    pub response: String,
    pub sources: Vec<Source>,
}

struct Citation {
    tag: String,
    ordinal: usize,
    url: String,
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"【\d+[:：]?\d*[^】]*】").expect("valid citation regex"))
}

fn source_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://t\.me/[^\s)\]"<]+"#).expect("valid url regex"))
}

/// Turns a raw agent reply into display HTML plus its source list.
///
/// Prompt scaffolding lines ("Question ...", "Answer ...") are dropped,
/// each unique citation tag gets a first-seen ordinal and is rewritten as a
/// superscript anchor, and the remaining lines are wrapped in paragraphs.
/// A tag is paired with the URL at the tag's enumeration index in the link
/// match list, not with the nearest URL in the text.
pub fn format_reply(raw: &str) -> FormattedReply {
    let cleaned = raw
        .trim()
        .lines()
        .filter(|line| {
            let lowered = line.trim().to_lowercase();
            !lowered.starts_with("question") && !lowered.starts_with("answer")
        })
        .collect::<Vec<_>>()
        .join("\n");
    let mut text = cleaned.trim().to_string();

    let tags: Vec<String> = citation_re()
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect();
    let urls: Vec<String> = source_url_re()
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect();

    let mut citations: Vec<Citation> = Vec::new();
    for (index, tag) in tags.iter().enumerate() {
        if citations.iter().any(|citation| &citation.tag == tag) {
            continue;
        }
        let url = urls
            .get(index)
            .cloned()
            .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());
        citations.push(Citation {
            tag: tag.clone(),
            ordinal: citations.len() + 1,
            url,
        });
    }

    for citation in &citations {
        let link = format!(
            "<sup><a href='#{0}'>[{0}]</a></sup>",
            citation.ordinal
        );
        text = text.replace(&citation.tag, &link);
    }

    let response = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("<p>{}</p>", line))
        .collect::<Vec<_>>()
        .join("\n");

    let sources = citations
        .iter()
        .map(|citation| Source {
            id: citation.ordinal,
            name: format!(
                "Source {} – {}",
                citation.ordinal,
                channel_name(&citation.url)
            ),
            url: citation.url.clone(),
        })
        .collect();

    FormattedReply { response, sources }
}

fn channel_name(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
