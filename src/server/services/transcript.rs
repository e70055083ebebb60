use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatPair {
    pub user: String,
    pub bot: String,
}

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("chat file not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Default)]
struct Buffer {
    pairs: Vec<ChatPair>,
    last_activity: Option<Instant>,
}

/// In-memory buffer of one conversation session plus the transcript files
/// it flushes to. The buffer's only mutators are `append` and the drain
/// step of a flush, both behind the mutex, so a flush always takes the
/// whole buffer atomically.
pub struct TranscriptStore {
    dir: PathBuf,
    idle_timeout: Duration,
    poll_interval: Duration,
    buffer: Mutex<Buffer>,
}

impl TranscriptStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        idle_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, TranscriptError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            idle_timeout,
            poll_interval,
            buffer: Mutex::new(Buffer::default()),
        })
    }

    pub fn append(&self, user: String, bot: String) {
        let mut buffer = self.buffer.lock();
        buffer.pairs.push(ChatPair { user, bot });
        buffer.last_activity = Some(Instant::now());
    }

    /// Writes the buffered session to a new transcript file if the session
    /// has been idle past the threshold. The timer resets either way.
    pub fn flush_idle(&self) -> Result<Option<PathBuf>, TranscriptError> {
        match self.drain_if_idle() {
            Some(pairs) if !pairs.is_empty() => self.write_transcript(&pairs).map(Some),
            _ => Ok(None),
        }
    }

    /// Unconditionally drains and writes whatever is buffered. Used on
    /// shutdown so an orderly exit does not lose the tail of a session.
    pub fn flush_pending(&self) -> Result<Option<PathBuf>, TranscriptError> {
        let pairs = {
            let mut buffer = self.buffer.lock();
            buffer.last_activity = None;
            std::mem::take(&mut buffer.pairs)
        };
        if pairs.is_empty() {
            return Ok(None);
        }
        self.write_transcript(&pairs).map(Some)
    }

    fn drain_if_idle(&self) -> Option<Vec<ChatPair>> {
        let mut buffer = self.buffer.lock();
        let last_activity = buffer.last_activity?;
        if last_activity.elapsed() <= self.idle_timeout {
            return None;
        }
        buffer.last_activity = None;
        Some(std::mem::take(&mut buffer.pairs))
    }

    fn write_transcript(&self, pairs: &[ChatPair]) -> Result<PathBuf, TranscriptError> {
        let path = self.next_transcript_path()?;
        let mut body = String::new();
        for pair in pairs {
            body.push_str(&format!("User: {}\n", pair.user));
            body.push_str(&format!("Bot: {}\n\n", pair.bot));
        }
        fs::write(&path, body)?;
        info!("Idle transcript saved: {}", path.display());
        Ok(path)
    }

    /// Next free `TE<n>_<timestamp>.txt` path, with `n` one past the highest
    /// ordinal currently in the directory.
    fn next_transcript_path(&self) -> Result<PathBuf, TranscriptError> {
        let mut highest = 0u32;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("TE") || !name.ends_with(".txt") {
                continue;
            }
            if let Some(ordinal) = transcript_ordinal(&name) {
                highest = highest.max(ordinal);
            }
        }
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        Ok(self.dir.join(format!("TE{}_{}.txt", highest + 1, timestamp)))
    }

    /// Transcript filenames, latest first.
    pub fn list_history(&self) -> Result<Vec<String>, TranscriptError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("TE") && name.ends_with(".txt") {
                files.push(name);
            }
        }
        files.sort_by(|a, b| b.cmp(a));
        Ok(files)
    }

    /// Parses a transcript back into pairs. A line that carries neither
    /// prefix is treated as a continuation of the current bot text. Blank
    /// lines and literal "User:"/"Bot:" prefixes inside a message cannot be
    /// told apart from structure, so parsing those is lossy.
    pub fn read_transcript(&self, filename: &str) -> Result<Vec<ChatPair>, TranscriptError> {
        let path = self.dir.join(filename);
        if !path.exists() {
            return Err(TranscriptError::NotFound(filename.to_string()));
        }
        let contents = fs::read_to_string(&path)?;

        let mut pairs = Vec::new();
        let mut user: Option<String> = None;
        let mut bot: Option<String> = None;
        let mut capturing_bot = false;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("User:") {
                if user.is_some() || bot.is_some() {
                    pairs.push(ChatPair {
                        user: user.take().unwrap_or_default(),
                        bot: bot.take().unwrap_or_default(),
                    });
                }
                user = Some(rest.trim().to_string());
                capturing_bot = false;
            } else if let Some(rest) = line.strip_prefix("Bot:") {
                bot = Some(rest.trim().to_string());
                capturing_bot = true;
            } else if capturing_bot {
                if let Some(text) = bot.as_mut() {
                    text.push(' ');
                    text.push_str(line);
                }
            }
        }
        if user.is_some() || bot.is_some() {
            pairs.push(ChatPair {
                user: user.unwrap_or_default(),
                bot: bot.unwrap_or_default(),
            });
        }

        Ok(pairs)
    }

    /// Background loop: poll at the store's interval and flush idle
    /// sessions until the shutdown signal fires. Flush failures are logged
    /// and never end the loop.
    pub fn spawn_flusher(
        store: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Transcript flush loop started");
            let mut ticker = tokio::time::interval(store.poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush_idle() {
                            error!("Transcript flush failed: {}", e);
                        }
                    }
                    _ = shutdown.changed() => {
                        if let Err(e) = store.flush_pending() {
                            error!("Final transcript flush failed: {}", e);
                        }
                        info!("Transcript flush loop stopped");
                        break;
                    }
                }
            }
        })
    }
}

fn transcript_ordinal(name: &str) -> Option<u32> {
    name.strip_prefix("TE")?.split('_').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store(dir: &std::path::Path, idle: Duration) -> TranscriptStore {
        TranscriptStore::new(dir, idle, Duration::from_millis(10)).unwrap()
    }

    #[test]
    fn flush_writes_pairs_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Duration::from_secs(60));

        store.append("hi".to_string(), "hello".to_string());
        store.append("more?".to_string(), "sure".to_string());

        let path = store.flush_pending().unwrap().expect("transcript written");
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(
            contents,
            "User: hi\nBot: hello\n\nUser: more?\nBot: sure\n\n"
        );
    }

    #[test]
    fn ordinal_is_one_past_the_highest_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("TE3_20250101_010101.txt"), "").unwrap();
        fs::write(dir.path().join("TE7_20250102_020202.txt"), "").unwrap();
        fs::write(dir.path().join("TEbad_20250103.txt"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let store = store(dir.path(), Duration::from_secs(60));
        store.append("u".to_string(), "b".to_string());
        let path = store.flush_pending().unwrap().unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("TE8_"), "unexpected name: {}", name);
    }

    #[test]
    fn round_trips_through_the_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Duration::from_secs(60));

        store.append("first question".to_string(), "first answer".to_string());
        store.append("second".to_string(), "reply".to_string());
        store.flush_pending().unwrap().unwrap();

        let name = store.list_history().unwrap().remove(0);
        let pairs = store.read_transcript(&name).unwrap();
        assert_eq!(
            pairs,
            vec![
                ChatPair {
                    user: "first question".to_string(),
                    bot: "first answer".to_string(),
                },
                ChatPair {
                    user: "second".to_string(),
                    bot: "reply".to_string(),
                },
            ]
        );
    }

    #[test]
    fn continuation_lines_join_the_bot_text() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("TE1_20250101_010101.txt"),
            "User: hi\nBot: line one\nline two\n\n",
        )
        .unwrap();

        let store = store(dir.path(), Duration::from_secs(60));
        let pairs = store.read_transcript("TE1_20250101_010101.txt").unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].bot, "line one line two");
    }

    #[test]
    fn missing_transcript_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Duration::from_secs(60));

        let err = store.read_transcript("TE9_nope.txt").unwrap_err();
        assert!(matches!(err, TranscriptError::NotFound(_)));
    }

    #[test]
    fn history_is_sorted_latest_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("TE1_20250101_010101.txt"), "").unwrap();
        fs::write(dir.path().join("TE2_20250102_020202.txt"), "").unwrap();

        let store = store(dir.path(), Duration::from_secs(60));
        assert_eq!(
            store.list_history().unwrap(),
            vec![
                "TE2_20250102_020202.txt".to_string(),
                "TE1_20250101_010101.txt".to_string(),
            ]
        );
    }

    #[test]
    fn empty_directory_lists_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Duration::from_secs(60));
        assert!(store.list_history().unwrap().is_empty());
    }

    #[test]
    fn flush_idle_skips_an_active_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Duration::from_secs(60));

        store.append("hi".to_string(), "hello".to_string());
        assert!(store.flush_idle().unwrap().is_none());
        assert!(store.list_history().unwrap().is_empty());
    }

    #[test]
    fn flush_idle_drains_an_idle_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Duration::from_millis(0));

        store.append("hi".to_string(), "hello".to_string());
        std::thread::sleep(Duration::from_millis(5));

        assert!(store.flush_idle().unwrap().is_some());
        // Drained and timer reset: a second pass has nothing to do.
        assert!(store.flush_idle().unwrap().is_none());
        assert_eq!(store.list_history().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn flusher_writes_after_idle_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store(dir.path(), Duration::from_millis(20)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = TranscriptStore::spawn_flusher(store.clone(), shutdown_rx);

        store.append("hi".to_string(), "hello".to_string());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.list_history().unwrap().len(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn flusher_drains_pending_pairs_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store(dir.path(), Duration::from_secs(3600)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = TranscriptStore::spawn_flusher(store.clone(), shutdown_rx);

        store.append("hi".to_string(), "hello".to_string());
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(store.list_history().unwrap().len(), 1);
    }
}
