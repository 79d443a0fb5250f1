// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage tracking for the Banter dispatch orchestrator.
//!
//! This crate provides:
//! - **Usage ledger**: append-only recording of every external call with
//!   unit counts and estimated cost
//! - **Pricing**: per-model cost estimation

pub mod ledger;
pub mod pricing;

pub use ledger::{UsageLedger, UsageRecord};
pub use pricing::{calculate_cost, get_pricing, ModelPricing};
