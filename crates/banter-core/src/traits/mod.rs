// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boundary traits separating the orchestrator core from its external
//! collaborators: the message store, the outbound transport, and the
//! pluggable content handlers.

pub mod handler;
pub mod sender;
pub mod source;

pub use handler::ContentHandler;
pub use sender::TransportSender;
pub use source::MessageSource;
