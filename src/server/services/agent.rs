use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::configuration::AgentSettings;

/// Client for the hosted agent platform. One thread is opened at startup
/// and reused for every exchange; each request posts the user message,
/// triggers a processing run, then reads the thread's text messages back.
pub struct AgentService {
    client: Client,
    base_url: String,
    api_key: String,
    agent_id: String,
}

#[derive(Debug, Deserialize)]
struct Thread {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Run {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    text_messages: Vec<TextMessage>,
}

#[derive(Debug, Deserialize)]
struct TextMessage {
    text: TextContent,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

impl AgentService {
    pub fn new(settings: &AgentSettings) -> Self {
        Self::with_base_url(
            settings.api_key.clone(),
            settings.agent_id.clone(),
            settings.api_url.clone(),
        )
    }

    pub fn with_base_url(api_key: String, agent_id: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            agent_id,
        }
    }

    pub async fn create_thread(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/threads", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(anyhow!("agent API error: {}", error));
        }

        let thread: Thread = response.json().await?;
        Ok(thread.id)
    }

    pub async fn create_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/threads/{}/messages", self.base_url, thread_id))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "role": "user",
                "content": content
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(anyhow!("agent API error: {}", error));
        }

        Ok(())
    }

    /// Runs the agent against the thread. The platform processes the run
    /// synchronously, so a successful response means the reply is ready.
    pub async fn create_and_process_run(&self, thread_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/threads/{}/runs", self.base_url, thread_id))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "agent_id": self.agent_id
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(anyhow!("agent API error: {}", error));
        }

        let run: Run = response.json().await?;
        if run.status == "failed" {
            return Err(anyhow!("agent run failed"));
        }

        Ok(())
    }

    /// Text messages of the thread, newest first. Non-text content is not
    /// part of the listing.
    pub async fn list_text_messages(&self, thread_id: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/threads/{}/messages", self.base_url, thread_id))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(anyhow!("agent API error: {}", error));
        }

        let messages: MessageList = response.json().await?;
        Ok(messages
            .text_messages
            .into_iter()
            .map(|message| message.text.value)
            .collect())
    }
}
