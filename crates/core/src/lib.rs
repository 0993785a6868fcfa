//! 派单核心
//!
//! 地理计算、工单生命周期、技师匹配、围栏监控、定位接入与事件总线。
//! 只依赖领域仓储抽象，不绑定具体存储。

pub mod config;
pub mod event_bus;
pub mod geo;
pub mod geofence;
pub mod ingest;
pub mod lifecycle;
pub mod matcher;
pub mod timeout;

pub use config::{
    AppConfig, EventBusConfig, GeofenceConfig, IngestConfig, MatchingConfig, StoreConfig,
};
pub use event_bus::{DispatchEventBus, EventSubscription};
pub use geofence::GeofenceMonitor;
pub use ingest::{IngestOutcome, LocationIngest};
pub use lifecycle::TicketLifecycle;
pub use matcher::{rank_candidates, skill_for_category, Candidate, MatchOptions, MatcherService};
pub use timeout::with_timeout;
