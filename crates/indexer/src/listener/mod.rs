//! Feed subscription for BAP transactions.
//!
//! This module provides:
//! - Feed event definitions and feed clients
//! - The event processor that turns transactions into attestations
//! - The persistent cursor and the subscription driver tying it together

pub mod cursor;
pub mod events;
pub mod feed;
pub mod processor;
pub mod subscription;

pub use cursor::CursorTracker;
pub use events::{FeedEvent, StatusMessage};
pub use feed::{ChannelFeed, FeedClient, FeedSource, JsonLinesFeed};
pub use processor::{EventProcessor, ProcessSummary};
pub use subscription::{DriverStats, SubscriptionDriver};
