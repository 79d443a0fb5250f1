// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock content handler with scripted outcomes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use banter_core::types::{
    ClassifiedContent, HandlerInput, HandlerReply, SessionHandle, UsageEvent,
};
use banter_core::{BanterError, ContentHandler};

enum Outcome {
    Reply { text: String, usage: Vec<UsageEvent> },
    Fail(BanterError),
}

/// A content handler that replays scripted outcomes.
///
/// Outcomes are popped FIFO; an empty queue yields a default reply.
/// An optional artificial delay lets tests drive the per-attempt timeout.
pub struct MockHandler {
    name: String,
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    acknowledgement: Option<String>,
    invocations: Arc<Mutex<Vec<HandlerInput>>>,
}

impl MockHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            delay: Arc::new(Mutex::new(None)),
            acknowledgement: None,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Emit the given acknowledgement before every invocation.
    pub fn with_acknowledgement(mut self, text: &str) -> Self {
        self.acknowledgement = Some(text.to_string());
        self
    }

    /// Queue a successful reply.
    pub async fn push_reply(&self, text: &str) {
        self.push_reply_with_usage(text, Vec::new()).await;
    }

    /// Queue a successful reply carrying usage events.
    pub async fn push_reply_with_usage(&self, text: &str, usage: Vec<UsageEvent>) {
        self.outcomes.lock().await.push_back(Outcome::Reply {
            text: text.to_string(),
            usage,
        });
    }

    /// Queue a failure.
    pub async fn push_failure(&self, err: BanterError) {
        self.outcomes.lock().await.push_back(Outcome::Fail(err));
    }

    /// Sleep this long inside every invocation before producing the outcome.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    /// Inputs this handler has been invoked with, in order.
    pub async fn invocations(&self) -> Vec<HandlerInput> {
        self.invocations.lock().await.clone()
    }

    pub async fn invocation_count(&self) -> usize {
        self.invocations.lock().await.len()
    }
}

#[async_trait]
impl ContentHandler for MockHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn acknowledgement(&self, _content: &ClassifiedContent) -> Option<String> {
        self.acknowledgement.clone()
    }

    async fn handle(&self, input: HandlerInput) -> Result<HandlerReply, BanterError> {
        self.invocations.lock().await.push(input.clone());
        // Copy the delay out so the lock is not held across the sleep,
        // which would serialize concurrent invocations.
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.outcomes.lock().await.pop_front() {
            Some(Outcome::Reply { text, usage }) => Ok(HandlerReply {
                text,
                usage,
                attachments: Vec::new(),
                session: input
                    .context
                    .session
                    .or_else(|| Some(SessionHandle(format!("mock-{}", uuid::Uuid::new_v4())))),
            }),
            Some(Outcome::Fail(err)) => Err(err),
            None => Ok(HandlerReply {
                text: "mock reply".to_string(),
                attachments: Vec::new(),
                session: input.context.session,
                usage: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::types::{ConversationContext, ConversationKey};

    fn input(text: &str) -> HandlerInput {
        HandlerInput {
            conversation: ConversationKey::normalize("+15551234567"),
            content: ClassifiedContent::PlainText {
                text: text.to_string(),
            },
            context: ConversationContext::default(),
        }
    }

    #[tokio::test]
    async fn outcomes_replay_in_order_then_default() {
        let handler = MockHandler::new("mock");
        handler.push_reply("first").await;
        handler
            .push_failure(BanterError::transient("backend down"))
            .await;

        assert_eq!(handler.handle(input("a")).await.unwrap().text, "first");
        assert!(handler.handle(input("b")).await.is_err());
        assert_eq!(handler.handle(input("c")).await.unwrap().text, "mock reply");
        assert_eq!(handler.invocation_count().await, 3);
    }

    #[tokio::test]
    async fn acknowledgement_is_configurable() {
        let silent = MockHandler::new("silent");
        let content = ClassifiedContent::PlainText {
            text: "hi".to_string(),
        };
        assert!(silent.acknowledgement(&content).is_none());

        let chatty = MockHandler::new("chatty").with_acknowledgement("on it");
        assert_eq!(chatty.acknowledgement(&content).as_deref(), Some("on it"));
    }

    #[tokio::test]
    async fn delayed_invocations_overlap() {
        let handler = Arc::new(MockHandler::new("mock"));
        handler.set_delay(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        let (a, b) = tokio::join!(handler.handle(input("a")), handler.handle(input("b")));
        a.unwrap();
        b.unwrap();
        // Serialized sleeps would take at least 200ms.
        assert!(started.elapsed() < Duration::from_millis(190));
    }

    #[tokio::test]
    async fn default_reply_mints_no_session_without_outcome() {
        let handler = MockHandler::new("mock");
        let reply = handler.handle(input("a")).await.unwrap();
        assert!(reply.session.is_none());
    }
}
