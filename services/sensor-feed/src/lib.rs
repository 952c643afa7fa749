//! Sensor Feed Service
//!
//! Polls an upstream particulate-matter provider and keeps:
//! - The freshest reading per sensor source (freshness cache)
//! - A change broadcast to every live stream subscriber
//! - Point-in-time snapshots for on-demand queries
//!
//! # Architecture
//!
//! ```text
//!  Upstream provider
//!        │
//!    ┌───▼────┐
//!    │ Poller │  ← fixed-interval fetch, cancellable
//!    └───┬────┘
//!        │ upsert
//!    ┌───▼─────────────┐      ┌──────────┐
//!    │ FreshnessCache  │─────▶│ Snapshot │ ← query path
//!    └───┬─────────────┘      └──────────┘
//!        │ Inserted / Updated
//!    ┌───▼──────────┐
//!    │ BroadcastBus │  ← bounded per-subscriber queues
//!    └───┬──────────┘
//!   ┌────┴─────┬──────────┐
//! ┌─▼───────┐┌─▼───────┐┌─▼───────┐
//! │ Session ││ Session ││ Session │ → one per connection
//! └─────────┘└─────────┘└─────────┘
//! ```

pub mod backpressure;
pub mod bus;
pub mod cache;
pub mod metrics;
pub mod poller;
pub mod session;
pub mod snapshot;
pub mod source;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
