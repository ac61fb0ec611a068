//! Alerting state machine (§4.4): per-series level tracking, topic bus,
//! deduplication/rate-limit, and the service that fans alert events out to
//! registered handlers.

pub mod dedup;
pub mod inhibit;
pub mod service;
pub mod state;
pub mod topic;

pub use dedup::RateLimiter;
pub use inhibit::InhibitorRegistry;
pub use service::AlertService;
pub use state::{AlertEvent, AlertLevel, AlertSeriesState};
pub use topic::{Subscription, TopicBus};
