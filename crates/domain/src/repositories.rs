//! 领域仓储抽象
//!
//! 外部持久化存储必须满足的契约，本核心不选择具体存储技术。
//! 工单与其当前派工单作为一个整体保存，任何观察者都不应看到
//! 状态为 assigned 却没有对应派工单的工单。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{
    Geofence, GeoPoint, LocationSample, TechnicianFilter, TechnicianSnapshot, TechnicianStatus,
    Ticket, TicketFilter,
};
use crate::errors::DispatchResult;

/// 工单仓储抽象
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn create(&self, ticket: &Ticket) -> DispatchResult<Ticket>;
    async fn get_by_id(&self, id: Uuid) -> DispatchResult<Option<Ticket>>;
    async fn get_by_tracking_code(&self, code: &str) -> DispatchResult<Option<Ticket>>;
    /// 工单状态与派工单时间戳作为一个单元原子更新
    async fn update(&self, ticket: &Ticket) -> DispatchResult<()>;
    async fn list(&self, filter: &TicketFilter) -> DispatchResult<Vec<Ticket>>;
}

/// 技师仓储抽象
#[async_trait]
pub trait TechnicianRepository: Send + Sync {
    async fn upsert(&self, technician: &TechnicianSnapshot) -> DispatchResult<()>;
    async fn get_by_id(&self, id: Uuid) -> DispatchResult<Option<TechnicianSnapshot>>;
    async fn list(&self, filter: &TechnicianFilter) -> DispatchResult<Vec<TechnicianSnapshot>>;
    async fn update_status(&self, id: Uuid, status: TechnicianStatus) -> DispatchResult<()>;
    /// 覆盖当前位置缓存，历史记录由 LocationRepository 负责
    async fn update_position(
        &self,
        id: Uuid,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> DispatchResult<()>;
}

/// 定位历史仓储抽象，仅追加
#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn append(&self, sample: &LocationSample) -> DispatchResult<()>;
    async fn history(
        &self,
        technician_id: Uuid,
        limit: usize,
    ) -> DispatchResult<Vec<LocationSample>>;
}

/// 地理围栏仓储抽象
#[async_trait]
pub trait GeofenceRepository: Send + Sync {
    async fn upsert(&self, geofence: &Geofence) -> DispatchResult<()>;
    async fn get_by_ticket(&self, ticket_id: Uuid) -> DispatchResult<Option<Geofence>>;
    async fn delete_by_ticket(&self, ticket_id: Uuid) -> DispatchResult<bool>;
}
