//! BAP attestation ingestion.
//!
//! This crate provides:
//! - Feed clients and the subscription driver
//! - The event processor that validates BAP outputs and stores attestations
//! - SQLite storage for attestations, error records and the block cursor
//! - Configuration loading
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  bap-indexer                         │
//! │                                      │
//! │  ┌──────────────────┐                │
//! │  │  Feed client     │ ← JSON lines   │
//! │  │  (tokio task)    │   (file/stdin) │
//! │  └────────┬─────────┘                │
//! │           │ mpsc                     │
//! │  ┌────────▼─────────┐                │
//! │  │ SubscriptionDriver│── cursor ──┐  │
//! │  └────────┬─────────┘             │  │
//! │           │                       │  │
//! │  ┌────────▼─────────┐             │  │
//! │  │  EventProcessor  │             │  │
//! │  │  classify/parse  │ ← bap-core  │  │
//! │  └────────┬─────────┘             │  │
//! │           │                       │  │
//! │      ┌────▼──────────────────────▼┐ │
//! │      │  Storage (SQLite)          │ │
//! │      │  attestations/errors/status│ │
//! │      └────────────────────────────┘ │
//! └──────────────────────────────────────┘
//! ```
//!
//! Events are handled strictly in delivery order, one at a time. The cursor
//! only moves on block completion signals, so a restart replays any block
//! that was not finished.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod listener;
pub mod storage;

pub use bap_core::*;
