// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport sender trait for outbound delivery.

use async_trait::async_trait;

use crate::error::BanterError;
use crate::types::DispatchEvent;

/// Outbound side of the messaging transport.
///
/// The dispatcher emits two-phase events; the transport decides how each
/// phase is rendered (an acknowledgement may become a plain message, a
/// typing signal, or nothing at all).
#[async_trait]
pub trait TransportSender: Send + Sync {
    async fn deliver(&self, event: DispatchEvent) -> Result<(), BanterError>;
}
