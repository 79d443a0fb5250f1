// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end dispatch tests over mock source, sender, and handlers.

use std::sync::Arc;
use std::time::Duration;

use banter_agent::{AgentLoop, ConversationStore, Dispatcher, HandlerRegistry};
use banter_config::model::{
    ConversationConfig, DispatchConfig, FollowupConfig, PollerConfig, RateLimitConfig,
};
use banter_core::types::{ConversationKey, DispatchEvent, UsageEvent, UsageFeature};
use banter_core::BanterError;
use banter_ratelimit::RateLimiter;
use banter_store::StateDb;
use banter_test_utils::{message_with_row_id, MockHandler, MockSender, MockSource};
use banter_usage::UsageLedger;
use tokio_util::sync::CancellationToken;

struct Rig {
    dispatcher: Arc<Dispatcher>,
    sender: Arc<MockSender>,
    handler: Arc<MockHandler>,
    state: Arc<StateDb>,
    store: Arc<ConversationStore>,
    ledger: Arc<UsageLedger>,
}

async fn rig_with(
    dispatch: DispatchConfig,
    ratelimit: RateLimitConfig,
    handler: Arc<MockHandler>,
) -> Rig {
    let state = Arc::new(StateDb::open_in_memory().await.unwrap());
    let store = Arc::new(ConversationStore::new(state.clone(), 10));
    let ledger = Arc::new(UsageLedger::open_in_memory().await.unwrap());
    let sender = Arc::new(MockSender::new());
    let limiter = Arc::new(RateLimiter::new(ratelimit));
    let registry = HandlerRegistry::new(handler.clone());
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        sender.clone(),
        store.clone(),
        limiter,
        ledger.clone(),
        dispatch,
        ConversationConfig::default(),
        FollowupConfig::default(),
    ));
    Rig {
        dispatcher,
        sender,
        handler,
        state,
        store,
        ledger,
    }
}

async fn rig() -> Rig {
    rig_with(
        fast_dispatch(),
        RateLimitConfig::default(),
        Arc::new(MockHandler::new("chat")),
    )
    .await
}

fn fast_dispatch() -> DispatchConfig {
    DispatchConfig {
        backoff_base_ms: 10,
        ..DispatchConfig::default()
    }
}

async fn wait_for_replies(sender: &MockSender, count: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if sender.replies().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("expected replies never arrived");
}

#[tokio::test]
async fn same_key_messages_reply_in_order() {
    let rig = rig().await;
    rig.handler.push_reply("first answer").await;
    rig.handler.push_reply("second answer").await;

    rig.dispatcher
        .dispatch(message_with_row_id(1, "+15551234567", "question one"));
    rig.dispatcher
        .dispatch(message_with_row_id(2, "+15551234567", "question two"));

    wait_for_replies(&rig.sender, 2).await;
    let replies = rig.sender.replies().await;
    assert_eq!(replies[0].reply().text, "first answer");
    assert_eq!(replies[1].reply().text, "second answer");
}

#[tokio::test]
async fn independent_keys_run_in_parallel() {
    let handler = Arc::new(MockHandler::new("chat"));
    handler.set_delay(Duration::from_millis(500)).await;
    let rig = rig_with(fast_dispatch(), RateLimitConfig::default(), handler).await;

    let started = std::time::Instant::now();
    rig.dispatcher
        .dispatch(message_with_row_id(1, "+15551111111", "hi"));
    rig.dispatcher
        .dispatch(message_with_row_id(2, "+15552222222", "hi"));

    wait_for_replies(&rig.sender, 2).await;
    // Serialized processing would take at least a full second.
    assert!(started.elapsed() < Duration::from_millis(950));
}

#[tokio::test]
async fn rate_gate_short_circuits_over_capacity() {
    let ratelimit = RateLimitConfig {
        sender_capacity: 2,
        sender_refill_per_min: 0.1,
        ..RateLimitConfig::default()
    };
    let rig = rig_with(fast_dispatch(), ratelimit, Arc::new(MockHandler::new("chat"))).await;
    rig.handler.push_reply("one").await;
    rig.handler.push_reply("two").await;

    for i in 1..=3 {
        rig.dispatcher
            .dispatch(message_with_row_id(i, "+15551234567", "hello"));
    }

    wait_for_replies(&rig.sender, 3).await;
    let replies = rig.sender.replies().await;
    assert_eq!(replies[0].reply().text, "one");
    assert_eq!(replies[1].reply().text, "two");
    assert!(replies[2].reply().text.contains("too quickly"));
    assert_eq!(rig.handler.invocation_count().await, 2);
}

#[tokio::test]
async fn transient_failure_retries_then_succeeds() {
    let rig = rig().await;
    rig.handler
        .push_failure(BanterError::transient("backend hiccup"))
        .await;
    rig.handler.push_reply("recovered").await;

    rig.dispatcher
        .dispatch(message_with_row_id(1, "+15551234567", "hello"));

    wait_for_replies(&rig.sender, 1).await;
    assert_eq!(rig.sender.replies().await[0].reply().text, "recovered");
    assert_eq!(rig.handler.invocation_count().await, 2);
}

#[tokio::test]
async fn permanent_failure_fails_fast_with_apology() {
    let rig = rig().await;
    rig.handler
        .push_failure(BanterError::permanent("malformed request"))
        .await;

    rig.dispatcher
        .dispatch(message_with_row_id(1, "+15551234567", "hello"));

    wait_for_replies(&rig.sender, 1).await;
    assert!(rig.sender.replies().await[0].reply().text.contains("Sorry"));
    assert_eq!(rig.handler.invocation_count().await, 1);
}

#[tokio::test]
async fn exhausted_retries_yield_apology_and_no_usage_record() {
    let dispatch = DispatchConfig {
        max_attempts: 2,
        backoff_base_ms: 10,
        ..DispatchConfig::default()
    };
    let rig = rig_with(dispatch, RateLimitConfig::default(), Arc::new(MockHandler::new("chat")))
        .await;
    rig.handler
        .push_failure(BanterError::transient("down"))
        .await;
    rig.handler
        .push_failure(BanterError::transient("still down"))
        .await;

    rig.dispatcher
        .dispatch(message_with_row_id(1, "+15551234567", "hello"));

    wait_for_replies(&rig.sender, 1).await;
    assert!(rig.sender.replies().await[0].reply().text.contains("Sorry"));
    assert_eq!(rig.handler.invocation_count().await, 2);
    assert_eq!(rig.ledger.record_count().await.unwrap(), 0);
}

#[tokio::test]
async fn handler_timeout_counts_as_transient() {
    let dispatch = DispatchConfig {
        handler_timeout_secs: 1,
        max_attempts: 1,
        backoff_base_ms: 10,
        ..DispatchConfig::default()
    };
    let handler = Arc::new(MockHandler::new("chat"));
    handler.set_delay(Duration::from_millis(1500)).await;
    let rig = rig_with(dispatch, RateLimitConfig::default(), handler).await;
    rig.handler.push_reply("too late").await;

    rig.dispatcher
        .dispatch(message_with_row_id(1, "+15551234567", "hello"));

    wait_for_replies(&rig.sender, 1).await;
    assert!(rig.sender.replies().await[0].reply().text.contains("Sorry"));
}

#[tokio::test]
async fn successful_dispatch_records_usage() {
    let rig = rig().await;
    rig.handler
        .push_reply_with_usage(
            "here you go",
            vec![UsageEvent {
                provider: "openai".to_string(),
                model: "dall-e-3".to_string(),
                feature: UsageFeature::ImageGeneration,
                input_units: 1,
                output_units: 0,
            }],
        )
        .await;

    rig.dispatcher
        .dispatch(message_with_row_id(1, "+15551234567", "describe a sunset"));

    wait_for_replies(&rig.sender, 1).await;
    assert_eq!(rig.ledger.record_count().await.unwrap(), 1);
}

#[tokio::test]
async fn reset_phrase_clears_session_without_handler_call() {
    let rig = rig().await;
    let key = ConversationKey::normalize("+15551234567");
    rig.store
        .record_exchange(&key, "hi", "hello", None, None)
        .await
        .unwrap();

    rig.dispatcher
        .dispatch(message_with_row_id(1, "+15551234567", "Start over"));

    wait_for_replies(&rig.sender, 1).await;
    assert!(rig.sender.replies().await[0]
        .reply()
        .text
        .contains("starting fresh"));
    assert_eq!(rig.handler.invocation_count().await, 0);

    let session = rig.store.get_or_create(&key).await.unwrap();
    assert!(session.history.is_empty());
}

#[tokio::test]
async fn followup_merges_previous_topic_into_query() {
    let rig = rig().await;
    let key = ConversationKey::normalize("+15551234567");
    rig.store
        .record_exchange(
            &key,
            "summarize the quarterly budget report",
            "done, it's mostly flat",
            None,
            Some("quarterly budget report".to_string()),
        )
        .await
        .unwrap();

    rig.dispatcher
        .dispatch(message_with_row_id(2, "+15551234567", "what about it?"));

    wait_for_replies(&rig.sender, 1).await;
    let invocations = rig.handler.invocations().await;
    assert_eq!(
        invocations[0].context.merged_query.as_deref(),
        Some("what about it? (about quarterly budget report)")
    );
}

#[tokio::test]
async fn what_about_continuation_merges_topic_without_pronoun() {
    let rig = rig().await;
    let key = ConversationKey::normalize("+15551234567");
    rig.store
        .record_exchange(
            &key,
            "summarize the quarterly budget report",
            "done, it's mostly flat",
            None,
            Some("quarterly budget report".to_string()),
        )
        .await
        .unwrap();

    rig.dispatcher
        .dispatch(message_with_row_id(2, "+15551234567", "what about page 3?"));

    wait_for_replies(&rig.sender, 1).await;
    let invocations = rig.handler.invocations().await;
    assert_eq!(
        invocations[0].context.merged_query.as_deref(),
        Some("what about page 3? (about quarterly budget report)")
    );
}

#[tokio::test]
async fn acknowledgement_precedes_terminal_reply() {
    let handler = Arc::new(MockHandler::new("slow").with_acknowledgement("working on it"));
    let rig = rig_with(fast_dispatch(), RateLimitConfig::default(), handler).await;
    rig.handler.push_reply("all done").await;

    rig.dispatcher
        .dispatch(message_with_row_id(1, "+15551234567", "hello"));

    rig.sender.wait_for_deliveries(2).await;
    let delivered = rig.sender.delivered().await;
    assert!(matches!(delivered[0], DispatchEvent::Acknowledgement(_)));
    assert_eq!(delivered[0].reply().text, "working on it");
    assert!(matches!(delivered[1], DispatchEvent::Reply(_)));
    assert_eq!(delivered[1].reply().text, "all done");
}

#[tokio::test]
async fn reply_goes_back_on_inbound_service() {
    let rig = rig().await;
    rig.handler.push_reply("hi back").await;
    let mut msg = message_with_row_id(1, "+15551234567", "hello");
    msg.service = banter_core::types::MessageService::Sms;

    rig.dispatcher.dispatch(msg);

    wait_for_replies(&rig.sender, 1).await;
    let replies = rig.sender.replies().await;
    assert_eq!(
        replies[0].reply().service,
        banter_core::types::MessageService::Sms
    );
    assert_eq!(replies[0].reply().recipient, "+15551234567");
}

fn poller(interval_secs: u64) -> PollerConfig {
    PollerConfig {
        interval_secs,
        flush_interval_secs: 1,
        ..PollerConfig::default()
    }
}

#[tokio::test]
async fn first_run_skips_backlog_then_picks_up_new_rows() {
    let rig = rig().await;
    rig.handler.push_reply("answered").await;
    let source = Arc::new(MockSource::new());
    source
        .push_message(message_with_row_id(1, "+15551234567", "old one"))
        .await;
    source
        .push_message(message_with_row_id(2, "+15551234567", "old two"))
        .await;

    let agent = AgentLoop::new(
        source.clone(),
        rig.dispatcher.clone(),
        rig.state.clone(),
        poller(1),
    );
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { agent.run(cancel).await }
    });

    // Give the loop a couple of cycles: backlog must stay untouched.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(rig.sender.delivered_count().await, 0);

    source
        .push_message(message_with_row_id(3, "+15551234567", "fresh"))
        .await;
    wait_for_replies(&rig.sender, 1).await;
    assert_eq!(rig.sender.replies().await[0].reply().text, "answered");
    assert_eq!(rig.handler.invocations().await.len(), 1);

    cancel.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn restart_does_not_replay_processed_rows() {
    let rig = rig().await;
    rig.handler.push_reply("once").await;
    let source = Arc::new(MockSource::new());
    // Seed the watermark so first-run initialization does not skip the
    // rows pushed below.
    rig.state.store_watermark(0).await.unwrap();

    let cancel = CancellationToken::new();
    let agent = AgentLoop::new(
        source.clone(),
        rig.dispatcher.clone(),
        rig.state.clone(),
        poller(1),
    );
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { agent.run(cancel).await }
    });

    source
        .push_message(message_with_row_id(1, "+15551234567", "hello"))
        .await;
    wait_for_replies(&rig.sender, 1).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    // Same state database, fresh loop: the processed row must not come back.
    let agent = AgentLoop::new(
        source.clone(),
        rig.dispatcher.clone(),
        rig.state.clone(),
        poller(1),
    );
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { agent.run(cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(2500)).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(rig.sender.replies().await.len(), 1);
    assert_eq!(rig.handler.invocation_count().await, 1);
}

#[tokio::test]
async fn self_echo_is_never_dispatched() {
    let rig = rig().await;
    let source = Arc::new(MockSource::new());
    rig.state.store_watermark(0).await.unwrap();

    let cancel = CancellationToken::new();
    let agent = AgentLoop::new(
        source.clone(),
        rig.dispatcher.clone(),
        rig.state.clone(),
        poller(1),
    );
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { agent.run(cancel).await }
    });

    let mut echo = message_with_row_id(1, "+15551234567", "my own reply");
    echo.is_from_me = true;
    source.push_message(echo).await;
    source
        .push_message(message_with_row_id(2, "+15559876543", "real message"))
        .await;

    wait_for_replies(&rig.sender, 1).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(rig.handler.invocation_count().await, 1);
    let invocations = rig.handler.invocations().await;
    assert_eq!(
        invocations[0].conversation,
        ConversationKey::normalize("+15559876543")
    );
}

#[tokio::test]
async fn poll_failure_backs_off_and_recovers() {
    let rig = rig().await;
    rig.handler.push_reply("made it").await;
    let source = Arc::new(MockSource::new());
    source
        .fail_next_fetch(BanterError::StoreUnavailable {
            message: "database is locked".to_string(),
            source: None,
        })
        .await;
    rig.state.store_watermark(0).await.unwrap();

    let cancel = CancellationToken::new();
    let agent = AgentLoop::new(
        source.clone(),
        rig.dispatcher.clone(),
        rig.state.clone(),
        poller(1),
    );
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { agent.run(cancel).await }
    });

    source
        .push_message(message_with_row_id(1, "+15551234567", "hello"))
        .await;
    wait_for_replies(&rig.sender, 1).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(rig.sender.replies().await[0].reply().text, "made it");
}

#[tokio::test]
async fn unowned_recipient_is_dropped() {
    let rig = rig().await;
    let source = Arc::new(MockSource::new());
    let config = PollerConfig {
        interval_secs: 1,
        flush_interval_secs: 1,
        owned_addresses: vec!["+15550000000".to_string()],
        ..PollerConfig::default()
    };
    rig.state.store_watermark(0).await.unwrap();

    let cancel = CancellationToken::new();
    let agent = AgentLoop::new(source.clone(), rig.dispatcher.clone(), rig.state.clone(), config);
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { agent.run(cancel).await }
    });

    // message_with_row_id sets recipient to +15550000000, so this one passes.
    source
        .push_message(message_with_row_id(1, "+15551234567", "for me"))
        .await;
    let mut other = message_with_row_id(2, "+15551234567", "for someone else");
    other.recipient = "+15557777777".to_string();
    source.push_message(other).await;

    wait_for_replies(&rig.sender, 1).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(rig.handler.invocation_count().await, 1);
}
