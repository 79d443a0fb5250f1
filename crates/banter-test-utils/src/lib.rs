// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Banter integration tests.
//!
//! Provides mock implementations of the core traits for fast,
//! deterministic, CI-runnable tests without a real message store,
//! transport, or AI backend.
//!
//! # Components
//!
//! - [`MockSource`] - Scripted message source with injectable rows and failures
//! - [`MockSender`] - Transport that captures delivered events for assertion
//! - [`MockHandler`] - Content handler with queued replies and failure scripting

pub mod mock_handler;
pub mod mock_sender;
pub mod mock_source;

pub use mock_handler::MockHandler;
pub use mock_sender::MockSender;
pub use mock_source::{message_with_row_id, MockSource};
