//! Live event hub.
//!
//! # Data Flow
//! ```text
//! Monitor tick:
//!     health update / alert transition / failover outcome
//!     → message.rs (typed message, serialized once to JSON)
//!     → broadcaster.rs (publish lock held)
//!         → every subscriber concurrently, each under the send timeout
//!         → failed or timed-out subscribers removed before return
//!
//! New subscriber:
//!     → latest health update + current active alerts, then live messages
//! ```
//!
//! # Design Decisions
//! - Publishes are serialized; each subscriber sees publish order
//! - A slow subscriber costs at most one send timeout per publish
//! - Transports plug in through the EventSink trait (sink.rs)

pub mod broadcaster;
pub mod message;
pub mod sink;

pub use broadcaster::{PublishReport, SubscriberId, SubscriptionHub};
pub use message::{ActiveAlertSummary, AlertNotice, FailoverNotice, HealthUpdate, HubMessage};
pub use sink::{ChannelSink, DeliveryError, EventSink, LogSink};
