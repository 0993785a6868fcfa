//! 内存仓储实现
//!
//! 使用 tokio RwLock 保护的 HashMap 存储，适用于嵌入式部署与测试。
//! 每个仓储带一个故障注入开关，打开后所有操作返回 StoreUnavailable，
//! 用于验证调用方的错误路径。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use dispatch_domain::{
    DispatchError, DispatchResult, Geofence, GeofenceRepository, GeoPoint, LocationRepository,
    LocationSample, TechnicianFilter, TechnicianRepository, TechnicianSnapshot, TechnicianStatus,
    Ticket, TicketFilter, TicketRepository,
};

fn check_available(flag: &AtomicBool, store: &str) -> DispatchResult<()> {
    if flag.load(Ordering::Relaxed) {
        Err(DispatchError::store_error(format!("{store} 存储不可用")))
    } else {
        Ok(())
    }
}

/// 内存工单仓储
#[derive(Default)]
pub struct MemoryTicketRepository {
    tickets: RwLock<HashMap<Uuid, Ticket>>,
    unavailable: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tickets(tickets: Vec<Ticket>) -> Self {
        let map = tickets.into_iter().map(|t| (t.id, t)).collect();
        Self {
            tickets: RwLock::new(map),
            unavailable: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    /// 故障注入：打开后所有操作返回 StoreUnavailable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// 故障注入：只让 update 返回 StoreUnavailable，读取照常
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::Relaxed);
    }

    pub async fn count(&self) -> usize {
        self.tickets.read().await.len()
    }
}

#[async_trait]
impl TicketRepository for MemoryTicketRepository {
    async fn create(&self, ticket: &Ticket) -> DispatchResult<Ticket> {
        check_available(&self.unavailable, "工单")?;
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id, ticket.clone());
        Ok(ticket.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> DispatchResult<Option<Ticket>> {
        check_available(&self.unavailable, "工单")?;
        Ok(self.tickets.read().await.get(&id).cloned())
    }

    async fn get_by_tracking_code(&self, code: &str) -> DispatchResult<Option<Ticket>> {
        check_available(&self.unavailable, "工单")?;
        Ok(self
            .tickets
            .read()
            .await
            .values()
            .find(|t| t.tracking_code == code)
            .cloned())
    }

    async fn update(&self, ticket: &Ticket) -> DispatchResult<()> {
        check_available(&self.unavailable, "工单")?;
        check_available(&self.fail_updates, "工单")?;
        let mut tickets = self.tickets.write().await;
        if !tickets.contains_key(&ticket.id) {
            return Err(DispatchError::ticket_not_found(ticket.id));
        }
        tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn list(&self, filter: &TicketFilter) -> DispatchResult<Vec<Ticket>> {
        check_available(&self.unavailable, "工单")?;
        let tickets = self.tickets.read().await;
        let mut result: Vec<Ticket> = tickets.values().cloned().collect();

        if let Some(status) = filter.status {
            result.retain(|t| t.status == status);
        }
        if let Some(priority) = filter.priority {
            result.retain(|t| t.priority == priority);
        }
        if let Some(category) = &filter.category {
            result.retain(|t| t.category == *category);
        }
        // 按创建时间排序保证列表稳定
        result.sort_by_key(|t| t.created_at);
        Ok(result)
    }
}

/// 内存技师仓储
#[derive(Default)]
pub struct MemoryTechnicianRepository {
    technicians: RwLock<HashMap<Uuid, TechnicianSnapshot>>,
    unavailable: AtomicBool,
}

impl MemoryTechnicianRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_technicians(technicians: Vec<TechnicianSnapshot>) -> Self {
        let map = technicians.into_iter().map(|t| (t.id, t)).collect();
        Self {
            technicians: RwLock::new(map),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

#[async_trait]
impl TechnicianRepository for MemoryTechnicianRepository {
    async fn upsert(&self, technician: &TechnicianSnapshot) -> DispatchResult<()> {
        check_available(&self.unavailable, "技师")?;
        let mut technicians = self.technicians.write().await;
        technicians.insert(technician.id, technician.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> DispatchResult<Option<TechnicianSnapshot>> {
        check_available(&self.unavailable, "技师")?;
        Ok(self.technicians.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &TechnicianFilter) -> DispatchResult<Vec<TechnicianSnapshot>> {
        check_available(&self.unavailable, "技师")?;
        let technicians = self.technicians.read().await;
        let mut result: Vec<TechnicianSnapshot> = technicians.values().cloned().collect();

        if let Some(status) = filter.status {
            result.retain(|t| t.status == status);
        }
        if let Some(skill) = &filter.skill {
            result.retain(|t| t.has_skill(skill));
        }
        result.sort_by_key(|t| t.id);
        Ok(result)
    }

    async fn update_status(&self, id: Uuid, status: TechnicianStatus) -> DispatchResult<()> {
        check_available(&self.unavailable, "技师")?;
        let mut technicians = self.technicians.write().await;
        match technicians.get_mut(&id) {
            Some(technician) => {
                technician.status = status;
                technician.last_update = Utc::now();
                Ok(())
            }
            None => Err(DispatchError::technician_unavailable(format!(
                "技师 {id} 不存在"
            ))),
        }
    }

    async fn update_position(
        &self,
        id: Uuid,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> DispatchResult<()> {
        check_available(&self.unavailable, "技师")?;
        let mut technicians = self.technicians.write().await;
        match technicians.get_mut(&id) {
            Some(technician) => {
                technician.position = Some(point);
                technician.last_update = at;
                Ok(())
            }
            None => Err(DispatchError::technician_unavailable(format!(
                "技师 {id} 不存在"
            ))),
        }
    }
}

/// 内存定位历史仓储，按技师追加
#[derive(Default)]
pub struct MemoryLocationRepository {
    samples: RwLock<HashMap<Uuid, Vec<LocationSample>>>,
    unavailable: AtomicBool,
}

impl MemoryLocationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

#[async_trait]
impl LocationRepository for MemoryLocationRepository {
    async fn append(&self, sample: &LocationSample) -> DispatchResult<()> {
        check_available(&self.unavailable, "定位")?;
        let mut samples = self.samples.write().await;
        samples
            .entry(sample.technician_id)
            .or_default()
            .push(sample.clone());
        Ok(())
    }

    async fn history(
        &self,
        technician_id: Uuid,
        limit: usize,
    ) -> DispatchResult<Vec<LocationSample>> {
        check_available(&self.unavailable, "定位")?;
        let samples = self.samples.read().await;
        let history = samples.get(&technician_id).cloned().unwrap_or_default();
        // 最新的样本在前
        let mut history: Vec<LocationSample> = history.into_iter().rev().collect();
        history.truncate(limit);
        Ok(history)
    }
}

/// 内存地理围栏仓储，每张工单至多一个围栏
#[derive(Default)]
pub struct MemoryGeofenceRepository {
    geofences: RwLock<HashMap<Uuid, Geofence>>,
    unavailable: AtomicBool,
}

impl MemoryGeofenceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

#[async_trait]
impl GeofenceRepository for MemoryGeofenceRepository {
    async fn upsert(&self, geofence: &Geofence) -> DispatchResult<()> {
        check_available(&self.unavailable, "围栏")?;
        let mut geofences = self.geofences.write().await;
        geofences.insert(geofence.ticket_id, geofence.clone());
        Ok(())
    }

    async fn get_by_ticket(&self, ticket_id: Uuid) -> DispatchResult<Option<Geofence>> {
        check_available(&self.unavailable, "围栏")?;
        Ok(self.geofences.read().await.get(&ticket_id).cloned())
    }

    async fn delete_by_ticket(&self, ticket_id: Uuid) -> DispatchResult<bool> {
        check_available(&self.unavailable, "围栏")?;
        let mut geofences = self.geofences.write().await;
        Ok(geofences.remove(&ticket_id).is_some())
    }
}
