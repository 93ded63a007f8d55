//! Shared test fixtures: a scripted conversationalist for exercising the
//! proposer and engine without a live provider.
//!
//! The script is keyed by file basename, recovered from the `// File:` line
//! the context builder puts first. Files without a script reply with an
//! empty rename array.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{Conversation, Conversationalist, LlmError};

#[derive(Debug, Clone)]
enum Script {
    Reply(String),
    Fail(LlmError),
    Stall,
}

/// A conversationalist that answers from a canned per-file script.
#[derive(Default)]
pub struct ScriptedConversationalist {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    sent: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedConversationalist {
    pub fn new() -> Self {
        ScriptedConversationalist::default()
    }

    /// Script a reply for one file.
    pub fn set_reply(&self, file: &str, reply: &str) {
        self.scripts
            .lock()
            .expect("script lock")
            .insert(file.to_string(), Script::Reply(reply.to_string()));
    }

    /// Script a failure for one file.
    pub fn fail_with(&self, file: &str, error: LlmError) {
        self.scripts
            .lock()
            .expect("script lock")
            .insert(file.to_string(), Script::Fail(error));
    }

    /// Make one file's send hang until cancelled.
    pub fn stall(&self, file: &str) {
        self.scripts
            .lock()
            .expect("script lock")
            .insert(file.to_string(), Script::Stall);
    }

    /// Handle to the high-water mark of concurrent sends.
    pub fn peak_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.peak)
    }

    /// Handle to every user message sent so far, in completion order.
    pub fn sent_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }
}

impl Conversationalist for ScriptedConversationalist {
    fn new_conversation(&self, _model: &str, _system_message: &str) -> Box<dyn Conversation> {
        Box::new(ScriptedConversation {
            scripts: Arc::clone(&self.scripts),
            sent: Arc::clone(&self.sent),
            in_flight: Arc::clone(&self.in_flight),
            peak: Arc::clone(&self.peak),
            messages: Vec::new(),
        })
    }
}

struct ScriptedConversation {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    sent: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    messages: Vec<String>,
}

impl ScriptedConversation {
    /// Recover the prompted file's basename from the context header.
    fn prompted_file(&self) -> Option<String> {
        let first = self.messages.first()?;
        let line = first.lines().next()?;
        line.strip_prefix("// File: ").map(str::to_string)
    }
}

#[async_trait]
impl Conversation for ScriptedConversation {
    fn add_user_message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }

    async fn send(&mut self) -> Result<String, LlmError> {
        if let Some(first) = self.messages.first() {
            self.sent.lock().expect("sent lock").push(first.clone());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // Yield so sibling tasks can overlap and the peak is meaningful.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;

        let script = self
            .prompted_file()
            .and_then(|file| self.scripts.lock().expect("script lock").get(&file).cloned());
        let result = match script {
            Some(Script::Reply(reply)) => Ok(reply),
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Stall) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                unreachable!("stalled send never completes")
            }
            None => Ok("[]".to_string()),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_reply_matches_prompted_file() {
        let script = ScriptedConversationalist::new();
        script.set_reply("a.go", "[1]");
        let mut conversation = script.new_conversation("m", "sys");
        conversation.add_user_message("// File: a.go\n\npackage p\n");
        assert_eq!(conversation.send().await.expect("send"), "[1]");
    }

    #[tokio::test]
    async fn unknown_file_defaults_to_empty_array() {
        let script = ScriptedConversationalist::new();
        let mut conversation = script.new_conversation("m", "sys");
        conversation.add_user_message("// File: other.go\n");
        assert_eq!(conversation.send().await.expect("send"), "[]");
    }

    #[tokio::test]
    async fn scripted_failure_is_returned() {
        let script = ScriptedConversationalist::new();
        script.fail_with("a.go", LlmError::Fatal("nope".to_string()));
        let mut conversation = script.new_conversation("m", "sys");
        conversation.add_user_message("// File: a.go\n");
        assert!(conversation.send().await.is_err());
    }
}
