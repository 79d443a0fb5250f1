// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport sender that captures delivered events.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use banter_core::types::DispatchEvent;
use banter_core::{BanterError, TransportSender};

/// A transport sender that records every delivered event.
///
/// Tests assert on the captured sequence: acknowledgements and replies
/// arrive in delivery order, so per-conversation ordering and the
/// one-reply-per-message invariant are both directly checkable.
pub struct MockSender {
    delivered: Arc<Mutex<Vec<DispatchEvent>>>,
    failures: Arc<Mutex<VecDeque<BanterError>>>,
    notify: Arc<Notify>,
}

impl MockSender {
    pub fn new() -> Self {
        Self {
            delivered: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// All events delivered so far, in order.
    pub async fn delivered(&self) -> Vec<DispatchEvent> {
        self.delivered.lock().await.clone()
    }

    /// Terminal replies only, acknowledgements filtered out.
    pub async fn replies(&self) -> Vec<DispatchEvent> {
        self.delivered
            .lock()
            .await
            .iter()
            .filter(|e| matches!(e, DispatchEvent::Reply(_)))
            .cloned()
            .collect()
    }

    pub async fn delivered_count(&self) -> usize {
        self.delivered.lock().await.len()
    }

    /// Script the next delivery to fail.
    pub async fn fail_next_delivery(&self, err: BanterError) {
        self.failures.lock().await.push_back(err);
    }

    /// Wait until at least `count` events have been delivered.
    pub async fn wait_for_deliveries(&self, count: usize) {
        loop {
            if self.delivered.lock().await.len() >= count {
                return;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for MockSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportSender for MockSender {
    async fn deliver(&self, event: DispatchEvent) -> Result<(), BanterError> {
        if let Some(err) = self.failures.lock().await.pop_front() {
            return Err(err);
        }
        self.delivered.lock().await.push(event);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::types::{ConversationKey, MessageService, OutboundReply};

    fn reply(text: &str) -> OutboundReply {
        OutboundReply {
            conversation: ConversationKey::normalize("+15551234567"),
            recipient: "+15551234567".to_string(),
            service: MessageService::IMessage,
            text: text.to_string(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn captures_events_in_delivery_order() {
        let sender = MockSender::new();
        sender
            .deliver(DispatchEvent::Acknowledgement(reply("working on it")))
            .await
            .unwrap();
        sender.deliver(DispatchEvent::Reply(reply("done"))).await.unwrap();

        let all = sender.delivered().await;
        assert_eq!(all.len(), 2);
        assert!(matches!(all[0], DispatchEvent::Acknowledgement(_)));

        let replies = sender.replies().await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].reply().text, "done");
    }

    #[tokio::test]
    async fn scripted_failure_drops_one_delivery() {
        let sender = MockSender::new();
        sender
            .fail_next_delivery(BanterError::Transport {
                message: "osascript exited nonzero".to_string(),
                source: None,
            })
            .await;

        assert!(sender.deliver(DispatchEvent::Reply(reply("lost"))).await.is_err());
        sender.deliver(DispatchEvent::Reply(reply("kept"))).await.unwrap();
        assert_eq!(sender.delivered_count().await, 1);
    }

    #[tokio::test]
    async fn wait_for_deliveries_unblocks_on_arrival() {
        let sender = Arc::new(MockSender::new());
        let background = sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
            background
                .deliver(DispatchEvent::Reply(reply("late")))
                .await
                .unwrap();
        });

        tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            sender.wait_for_deliveries(1),
        )
        .await
        .expect("delivery never arrived");
    }
}
