// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch pipeline: one inbound message in, exactly one terminal reply out.
//!
//! Messages for the same conversation key are processed by a dedicated
//! worker task, so enqueue order equals processing order per key while
//! different keys run in parallel. A global semaphore bounds how many
//! handler invocations run at once across all keys.
//!
//! Pipeline per message: classify, rate gate, attach context, invoke the
//! handler with retry and per-attempt timeout, persist the exchange, and
//! deliver the reply. Every branch, including rate denial and exhausted
//! retries, ends in a delivered reply.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use strum::Display;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use banter_classify::{classify, supported_formats_notice};
use banter_config::model::{ConversationConfig, DispatchConfig, FollowupConfig};
use banter_core::types::{
    ClassifiedContent, ContentKind, ConversationContext, ConversationKey, DispatchEvent,
    HandlerInput, HandlerReply, InboundMessage, OutboundReply,
};
use banter_core::{BanterError, ContentHandler, TransportSender};
use banter_ratelimit::{RateDecision, RateLimiter};
use banter_usage::{UsageLedger, UsageRecord};

use crate::followup;
use crate::sessions::ConversationStore;

/// Stages a message moves through. Logged, never branched on: the
/// pipeline code is the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DispatchState {
    Classified,
    RateChecked,
    ContextAttached,
    HandlerInvoked,
    Succeeded,
    Retrying,
    Failed,
    Replied,
}

const APOLOGY_REPLY: &str =
    "Sorry, I ran into trouble handling that. Please try again in a little while.";
const THROTTLE_REPLY: &str =
    "You're messaging me a little too quickly. Give it a minute and try again.";
const RESET_REPLY: &str = "Okay, starting fresh. What would you like to talk about?";

/// Handlers by content kind. Chat is mandatory; the others are optional
/// and an absent one turns into a capability notice at dispatch time.
pub struct HandlerRegistry {
    chat: Arc<dyn ContentHandler>,
    vision: Option<Arc<dyn ContentHandler>>,
    document: Option<Arc<dyn ContentHandler>>,
    audio: Option<Arc<dyn ContentHandler>>,
    image_generation: Option<Arc<dyn ContentHandler>>,
}

impl HandlerRegistry {
    pub fn new(chat: Arc<dyn ContentHandler>) -> Self {
        Self {
            chat,
            vision: None,
            document: None,
            audio: None,
            image_generation: None,
        }
    }

    pub fn with_vision(mut self, handler: Arc<dyn ContentHandler>) -> Self {
        self.vision = Some(handler);
        self
    }

    pub fn with_document(mut self, handler: Arc<dyn ContentHandler>) -> Self {
        self.document = Some(handler);
        self
    }

    pub fn with_audio(mut self, handler: Arc<dyn ContentHandler>) -> Self {
        self.audio = Some(handler);
        self
    }

    pub fn with_image_generation(mut self, handler: Arc<dyn ContentHandler>) -> Self {
        self.image_generation = Some(handler);
        self
    }

    fn for_kind(&self, kind: ContentKind) -> Option<&Arc<dyn ContentHandler>> {
        match kind {
            ContentKind::Chat => Some(&self.chat),
            ContentKind::Vision => self.vision.as_ref(),
            ContentKind::Document => self.document.as_ref(),
            ContentKind::Audio => self.audio.as_ref(),
            ContentKind::ImageGeneration => self.image_generation.as_ref(),
            ContentKind::Mixed => None,
        }
    }

    fn capability_notice(kind: ContentKind) -> String {
        match kind {
            ContentKind::Vision => "I can't look at images right now.".to_string(),
            ContentKind::Document => "I can't read documents right now.".to_string(),
            ContentKind::Audio => "I can't listen to voice messages right now.".to_string(),
            ContentKind::ImageGeneration => {
                "Image generation isn't available right now.".to_string()
            }
            ContentKind::Chat | ContentKind::Mixed => {
                "I can't handle that kind of message right now.".to_string()
            }
        }
    }
}

/// What one content part produced: either a handler reply or a notice
/// composed without invoking anything.
struct PartOutcome {
    text: String,
    attachments: Vec<std::path::PathBuf>,
    session: Option<banter_core::types::SessionHandle>,
    usage: Vec<banter_core::types::UsageEvent>,
}

struct DispatchCore {
    handlers: HandlerRegistry,
    sender: Arc<dyn TransportSender>,
    store: Arc<ConversationStore>,
    limiter: Arc<RateLimiter>,
    ledger: Arc<UsageLedger>,
    semaphore: Semaphore,
    dispatch: DispatchConfig,
    conversation: ConversationConfig,
    followup: FollowupConfig,
}

struct Worker {
    tx: mpsc::UnboundedSender<InboundMessage>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Entry point for accepted messages. Owns the per-key worker map.
///
/// The map keeps one worker per conversation key seen since startup and
/// only shrinks on [`Dispatcher::drain`]. An idle worker is a single task
/// parked on an empty channel, so memory grows with the number of
/// distinct senders, which a personal message store keeps small.
pub struct Dispatcher {
    core: Arc<DispatchCore>,
    workers: DashMap<ConversationKey, Worker>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handlers: HandlerRegistry,
        sender: Arc<dyn TransportSender>,
        store: Arc<ConversationStore>,
        limiter: Arc<RateLimiter>,
        ledger: Arc<UsageLedger>,
        dispatch: DispatchConfig,
        conversation: ConversationConfig,
        followup: FollowupConfig,
    ) -> Self {
        let semaphore = Semaphore::new(dispatch.worker_concurrency.max(1));
        Self {
            core: Arc::new(DispatchCore {
                handlers,
                sender,
                store,
                limiter,
                ledger,
                semaphore,
                dispatch,
                conversation,
                followup,
            }),
            workers: DashMap::new(),
        }
    }

    /// Accept a message into its conversation's queue. Returns once the
    /// message is enqueued; the caller may advance its watermark past it.
    pub fn dispatch(&self, msg: InboundMessage) {
        let key = msg.conversation.clone();
        let worker = self.workers.entry(key.clone()).or_insert_with(|| {
            let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
            let core = Arc::clone(&self.core);
            let handle = tokio::spawn(async move {
                while let Some(m) = rx.recv().await {
                    core.process(m).await;
                }
            });
            Worker {
                tx,
                handle: Mutex::new(Some(handle)),
            }
        });
        if worker.tx.send(msg).is_err() {
            // Workers only stop during drain; a send after that is a bug.
            error!(conversation = %key, "dispatch worker gone, message dropped");
        }
    }

    /// Close all worker queues and wait for in-flight messages to finish.
    pub async fn drain(&self) {
        let keys: Vec<ConversationKey> =
            self.workers.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, worker)) = self.workers.remove(&key) {
                drop(worker.tx);
                let handle = worker.handle.lock().await.take();
                if let Some(handle) = handle {
                    if let Err(e) = handle.await {
                        warn!(conversation = %key, error = %e, "dispatch worker panicked");
                    }
                }
            }
        }
        info!("dispatch workers drained");
    }
}

impl DispatchCore {
    async fn process(&self, msg: InboundMessage) {
        let key = msg.conversation.clone();
        let content = classify(&msg);
        info!(
            conversation = %key,
            row_id = msg.row_id,
            kind = %content.kind(),
            state = %DispatchState::Classified,
            "message classified"
        );

        if self.is_reset_request(&msg) {
            if let Err(e) = self.store.reset(&key).await {
                error!(conversation = %key, error = %e, "session reset failed");
                self.deliver_reply(&msg, APOLOGY_REPLY.to_string(), Vec::new()).await;
                return;
            }
            self.deliver_reply(&msg, RESET_REPLY.to_string(), Vec::new()).await;
            return;
        }

        match self.limiter.acquire(&key, 1.0) {
            RateDecision::Allowed => {
                debug!(conversation = %key, state = %DispatchState::RateChecked, "rate check passed");
            }
            RateDecision::Denied { scope } => {
                warn!(
                    conversation = %key,
                    scope = scope.as_str(),
                    state = %DispatchState::RateChecked,
                    "rate limited"
                );
                self.deliver_reply(&msg, THROTTLE_REPLY.to_string(), Vec::new()).await;
                return;
            }
        }

        let context = match self.attach_context(&key, &content).await {
            Ok(context) => context,
            Err(e) => {
                error!(conversation = %key, error = %e, "context load failed");
                self.deliver_reply(&msg, APOLOGY_REPLY.to_string(), Vec::new()).await;
                return;
            }
        };
        debug!(
            conversation = %key,
            history_len = context.history.len(),
            merged = context.merged_query.is_some(),
            state = %DispatchState::ContextAttached,
            "context attached"
        );

        self.send_acknowledgement(&msg, &content).await;

        let parts: Vec<&ClassifiedContent> = match &content {
            ClassifiedContent::Mixed { parts } => parts.iter().collect(),
            single => vec![single],
        };

        let mut texts = Vec::new();
        let mut attachments = Vec::new();
        let mut session = None;
        let mut usage = Vec::new();
        let mut any_failed = false;

        for part in parts {
            match self.run_part(&key, part, &context).await {
                Ok(outcome) => {
                    texts.push(outcome.text);
                    attachments.extend(outcome.attachments);
                    if outcome.session.is_some() {
                        session = outcome.session;
                    }
                    usage.extend(outcome.usage);
                }
                Err(e) => {
                    error!(
                        conversation = %key,
                        kind = %part.kind(),
                        error = %e,
                        state = %DispatchState::Failed,
                        "handler failed"
                    );
                    any_failed = true;
                    texts.push(APOLOGY_REPLY.to_string());
                }
            }
        }

        let reply_text = texts.join("\n\n");

        if !any_failed {
            for event in &usage {
                let record = UsageRecord::from_event(event);
                if let Err(e) = self.ledger.record(&record).await {
                    warn!(conversation = %key, error = %e, "usage record failed");
                }
            }

            let user_text = msg
                .body
                .clone()
                .filter(|b| !b.trim().is_empty())
                .unwrap_or_else(|| format!("[{}]", content.kind()));
            let topic = followup::extract_topic(&user_text);
            if let Err(e) = self
                .store
                .record_exchange(&key, &user_text, &reply_text, session, topic)
                .await
            {
                // The reply still goes out; history just loses this turn.
                error!(conversation = %key, error = %e, "exchange persist failed");
            }
            info!(conversation = %key, row_id = msg.row_id, state = %DispatchState::Succeeded, "dispatch succeeded");
        }

        self.deliver_reply(&msg, reply_text, attachments).await;
    }

    fn is_reset_request(&self, msg: &InboundMessage) -> bool {
        let Some(body) = &msg.body else {
            return false;
        };
        let normalized = body.trim().trim_end_matches(['.', '!']).to_lowercase();
        self.conversation
            .reset_phrases
            .iter()
            .any(|p| p.to_lowercase() == normalized)
    }

    async fn attach_context(
        &self,
        key: &ConversationKey,
        content: &ClassifiedContent,
    ) -> Result<ConversationContext, BanterError> {
        let stored = self.store.get_or_create(key).await?;

        let merged_query = if let ClassifiedContent::PlainText { text } = content {
            if followup::looks_like_followup(text, &self.followup, stored.last_activity, Utc::now())
            {
                stored
                    .last_topic
                    .as_deref()
                    .map(|topic| followup::merge_query(text, topic))
            } else {
                None
            }
        } else {
            None
        };

        Ok(ConversationContext {
            history: stored.history,
            session: stored.handle,
            merged_query,
        })
    }

    /// Best effort: an acknowledgement that fails to send never blocks the
    /// terminal reply.
    async fn send_acknowledgement(&self, msg: &InboundMessage, content: &ClassifiedContent) {
        let Some(handler) = self.handlers.for_kind(content.kind()) else {
            return;
        };
        let Some(text) = handler.acknowledgement(content) else {
            return;
        };
        let event = DispatchEvent::Acknowledgement(self.outbound(msg, text, Vec::new()));
        if let Err(e) = self.sender.deliver(event).await {
            warn!(conversation = %msg.conversation, error = %e, "acknowledgement delivery failed");
        }
    }

    async fn run_part(
        &self,
        key: &ConversationKey,
        part: &ClassifiedContent,
        context: &ConversationContext,
    ) -> Result<PartOutcome, BanterError> {
        if let ClassifiedContent::Document {
            supported: false, ..
        } = part
        {
            return Ok(PartOutcome {
                text: supported_formats_notice(),
                attachments: Vec::new(),
                session: None,
                usage: Vec::new(),
            });
        }

        let kind = part.kind();
        let Some(handler) = self.handlers.for_kind(kind) else {
            return Ok(PartOutcome {
                text: HandlerRegistry::capability_notice(kind),
                attachments: Vec::new(),
                session: None,
                usage: Vec::new(),
            });
        };

        let input = HandlerInput {
            conversation: key.clone(),
            content: part.clone(),
            context: context.clone(),
        };
        let reply = self.invoke_with_retry(handler.as_ref(), key, input).await?;
        Ok(PartOutcome {
            text: reply.text,
            attachments: reply.attachments,
            session: reply.session,
            usage: reply.usage,
        })
    }

    async fn invoke_with_retry(
        &self,
        handler: &dyn ContentHandler,
        key: &ConversationKey,
        input: HandlerInput,
    ) -> Result<HandlerReply, BanterError> {
        let timeout = Duration::from_secs(self.dispatch.handler_timeout_secs);
        let max_attempts = self.dispatch.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            let permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|_| BanterError::Invariant("handler semaphore closed".to_string()))?;
            debug!(
                conversation = %key,
                handler = handler.name(),
                attempt,
                state = %DispatchState::HandlerInvoked,
                "invoking handler"
            );
            let result = tokio::time::timeout(timeout, handler.handle(input.clone())).await;
            drop(permit);

            let err = match result {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(e)) => e,
                Err(_) => BanterError::Timeout { duration: timeout },
            };

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                conversation = %key,
                handler = handler.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                state = %DispatchState::Retrying,
                "handler attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Exponential backoff with up to 25% jitter so retries from separate
    /// conversations do not align.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.dispatch.backoff_base_ms as f64;
        let exp = self.dispatch.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let jitter = 1.0 + rand::thread_rng().gen_range(0.0..0.25);
        Duration::from_millis((base * exp * jitter) as u64)
    }

    fn outbound(
        &self,
        msg: &InboundMessage,
        text: String,
        attachments: Vec<std::path::PathBuf>,
    ) -> OutboundReply {
        OutboundReply {
            conversation: msg.conversation.clone(),
            recipient: msg.sender.clone(),
            service: msg.service,
            text,
            attachments,
        }
    }

    async fn deliver_reply(
        &self,
        msg: &InboundMessage,
        text: String,
        attachments: Vec<std::path::PathBuf>,
    ) {
        let event = DispatchEvent::Reply(self.outbound(msg, text, attachments));
        match self.sender.deliver(event).await {
            Ok(()) => {
                info!(
                    conversation = %msg.conversation,
                    row_id = msg.row_id,
                    state = %DispatchState::Replied,
                    "reply delivered"
                );
            }
            Err(e) => {
                error!(
                    conversation = %msg.conversation,
                    row_id = msg.row_id,
                    error = %e,
                    "reply delivery failed"
                );
            }
        }
    }
}
