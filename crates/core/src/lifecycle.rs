//! 工单生命周期
//!
//! 唯一允许修改工单状态的入口。前进路径
//! pending -> assigned -> en_route -> arrived -> in_progress -> completed
//! 只能逐级推进，cancelled 可从任意非终态进入。同一工单的并发操作
//! 通过每工单互斥锁串行化，工单与其派工单作为一个整体写回存储。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use dispatch_domain::{
    Assignment, DispatchError, DispatchEvent, DispatchResult, Geofence, TechnicianRepository,
    TechnicianStatus, Ticket, TicketRepository, TicketStatus,
};

use crate::config::{GeofenceConfig, StoreConfig};
use crate::event_bus::DispatchEventBus;
use crate::geofence::GeofenceMonitor;
use crate::matcher::MatcherService;
use crate::timeout::with_timeout;

pub struct TicketLifecycle {
    ticket_repo: Arc<dyn TicketRepository>,
    technician_repo: Arc<dyn TechnicianRepository>,
    monitor: Arc<GeofenceMonitor>,
    matcher: Arc<MatcherService>,
    bus: Arc<DispatchEventBus>,
    geofence: GeofenceConfig,
    store_timeout: Duration,
    /// ticket_id -> 串行化该工单所有写操作的锁
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl TicketLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticket_repo: Arc<dyn TicketRepository>,
        technician_repo: Arc<dyn TechnicianRepository>,
        monitor: Arc<GeofenceMonitor>,
        matcher: Arc<MatcherService>,
        bus: Arc<DispatchEventBus>,
        geofence: GeofenceConfig,
        store: &StoreConfig,
    ) -> Self {
        Self {
            ticket_repo,
            technician_repo,
            monitor,
            matcher,
            bus,
            geofence,
            store_timeout: Duration::from_secs(store.operation_timeout_seconds),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, ticket_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(ticket_id).or_default().clone()
    }

    /// 工单进入终态后回收它的锁条目
    async fn discard_lock(&self, ticket_id: Uuid) {
        self.locks.lock().await.remove(&ticket_id);
    }

    /// 工单写入失败后的尽力回补，释放失败只记录不上抛
    async fn compensate_occupation(&self, technician_id: Uuid) {
        if let Err(release_err) = self.release_technician(technician_id).await {
            warn!(
                technician_id = %technician_id,
                error = %release_err,
                "回补释放技师失败，技师可能残留为忙碌状态"
            );
        }
    }

    async fn load_ticket(&self, ticket_id: Uuid) -> DispatchResult<Ticket> {
        with_timeout(self.store_timeout, "load_ticket", async {
            self.ticket_repo.get_by_id(ticket_id).await
        })
        .await?
        .ok_or_else(|| DispatchError::ticket_not_found(ticket_id))
    }

    async fn save_ticket(&self, ticket: &Ticket) -> DispatchResult<()> {
        with_timeout(self.store_timeout, "save_ticket", async {
            self.ticket_repo.update(ticket).await
        })
        .await
    }

    /// 技师接单：状态置忙，工作量加一
    async fn occupy_technician(&self, technician_id: Uuid) -> DispatchResult<()> {
        let mut technician = with_timeout(self.store_timeout, "load_technician", async {
            self.technician_repo.get_by_id(technician_id).await
        })
        .await?
        .ok_or_else(|| {
            DispatchError::technician_unavailable(format!("技师 {technician_id} 不存在"))
        })?;

        if !technician.is_available() {
            return Err(DispatchError::technician_unavailable(format!(
                "技师 {} 当前状态为 {}，无法接单",
                technician.name, technician.status
            )));
        }
        technician.status = TechnicianStatus::Busy;
        technician.workload += 1;
        technician.last_update = Utc::now();
        with_timeout(self.store_timeout, "occupy_technician", async {
            self.technician_repo.upsert(&technician).await
        })
        .await
    }

    /// 工单完结、取消或改派后释放技师
    async fn release_technician(&self, technician_id: Uuid) -> DispatchResult<()> {
        let technician = with_timeout(self.store_timeout, "load_technician", async {
            self.technician_repo.get_by_id(technician_id).await
        })
        .await?;

        match technician {
            Some(mut technician) => {
                technician.workload = technician.workload.saturating_sub(1);
                if technician.workload == 0 && technician.status == TechnicianStatus::Busy {
                    technician.status = TechnicianStatus::Available;
                }
                technician.last_update = Utc::now();
                with_timeout(self.store_timeout, "release_technician", async {
                    self.technician_repo.upsert(&technician).await
                })
                .await
            }
            None => {
                warn!(technician_id = %technician_id, "释放的技师不存在，忽略");
                Ok(())
            }
        }
    }

    fn publish_status_change(&self, ticket_id: Uuid, from: TicketStatus, to: TicketStatus) {
        info!(ticket_id = %ticket_id, from = %from, to = %to, "工单状态变更");
        self.bus.publish(DispatchEvent::TicketStatusChanged {
            ticket_id,
            from,
            to,
            occurred_at: Utc::now(),
        });
    }

    pub async fn create_ticket(&self, ticket: Ticket) -> DispatchResult<Ticket> {
        if let Some(position) = ticket.position {
            if !position.is_valid() {
                return Err(DispatchError::invalid_coordinates(format!(
                    "lat={}, lng={}",
                    position.lat, position.lng
                )));
            }
        }
        let created = with_timeout(self.store_timeout, "create_ticket", async {
            self.ticket_repo.create(&ticket).await
        })
        .await?;
        info!(
            ticket_id = %created.id,
            tracking_code = %created.tracking_code,
            "工单已创建"
        );
        Ok(created)
    }

    pub async fn get_ticket(&self, ticket_id: Uuid) -> DispatchResult<Ticket> {
        self.load_ticket(ticket_id).await
    }

    /// 指派技师：pending -> assigned
    ///
    /// 非 pending 工单的指派在触碰技师之前就拒绝，失败路径不产生
    /// 任何状态变更。
    pub async fn assign(&self, ticket_id: Uuid, technician_id: Uuid) -> DispatchResult<Ticket> {
        let lock = self.lock_for(ticket_id).await;
        let _guard = lock.lock().await;

        let mut ticket = self.load_ticket(ticket_id).await?;
        if ticket.status != TicketStatus::Pending {
            return Err(DispatchError::invalid_transition(
                ticket.status,
                TicketStatus::Assigned,
            ));
        }

        self.occupy_technician(technician_id).await?;

        let assignment = Assignment::new(ticket_id, technician_id);
        let assignment_id = assignment.id;
        ticket.assignment = Some(assignment);
        ticket.status = TicketStatus::Assigned;
        ticket.updated_at = Utc::now();
        // 工单写入失败时回补技师占用，失败路径不留下任何残余
        if let Err(save_err) = self.save_ticket(&ticket).await {
            self.compensate_occupation(technician_id).await;
            return Err(save_err);
        }

        self.bus.publish(DispatchEvent::AssignmentCreated {
            ticket_id,
            assignment_id,
            technician_id,
            occurred_at: Utc::now(),
        });
        self.publish_status_change(ticket_id, TicketStatus::Pending, TicketStatus::Assigned);
        Ok(ticket)
    }

    /// 匹配并指派排名最靠前的候选技师
    pub async fn auto_assign(&self, ticket_id: Uuid) -> DispatchResult<Ticket> {
        let candidates = self.matcher.find_candidates(ticket_id, None).await?;
        let best = candidates.into_iter().next().ok_or_else(|| {
            DispatchError::technician_unavailable(format!("工单 {ticket_id} 没有可用的候选技师"))
        })?;
        info!(
            ticket_id = %ticket_id,
            technician_id = %best.technician.id,
            distance_meters = ?best.distance_meters,
            "自动派单命中候选技师"
        );
        self.assign(ticket_id, best.technician.id).await
    }

    /// 沿前进路径推进一步；跳级与回退都拒绝
    ///
    /// pending -> assigned 必须携带派工单，只能经由 assign/reassign，
    /// 从 advance 走会出现没有派工单的 assigned 工单。
    pub async fn advance(&self, ticket_id: Uuid, to: TicketStatus) -> DispatchResult<Ticket> {
        let lock = self.lock_for(ticket_id).await;
        let _guard = lock.lock().await;

        let mut ticket = self.load_ticket(ticket_id).await?;
        let from = ticket.status;
        if to == TicketStatus::Assigned || from.successor() != Some(to) {
            return Err(DispatchError::invalid_transition(from, to));
        }

        let now = Utc::now();
        if let Some(assignment) = ticket.assignment.as_mut() {
            match to {
                TicketStatus::EnRoute => assignment.accepted_at = Some(now),
                TicketStatus::Arrived => assignment.arrived_at = Some(now),
                TicketStatus::InProgress => assignment.started_at = Some(now),
                TicketStatus::Completed => assignment.completed_at = Some(now),
                _ => {}
            }
        }
        ticket.status = to;
        ticket.updated_at = now;
        self.save_ticket(&ticket).await?;

        match to {
            TicketStatus::EnRoute => self.activate_geofence(&ticket).await?,
            TicketStatus::Completed => {
                self.finish(&ticket).await?;
                self.discard_lock(ticket_id).await;
            }
            _ => {}
        }

        self.publish_status_change(ticket_id, from, to);
        Ok(ticket)
    }

    /// 从任意非终态取消；当前派工单被关闭并归档，取消原因写入备注
    pub async fn cancel(&self, ticket_id: Uuid, reason: Option<&str>) -> DispatchResult<Ticket> {
        let lock = self.lock_for(ticket_id).await;
        let _guard = lock.lock().await;

        let mut ticket = self.load_ticket(ticket_id).await?;
        let from = ticket.status;
        if from.is_terminal() {
            return Err(DispatchError::invalid_transition(from, TicketStatus::Cancelled));
        }

        let released_technician = ticket.assignment.take().map(|mut assignment| {
            assignment.superseded_at = Some(Utc::now());
            if let Some(reason) = reason {
                assignment.append_note(&format!("取消原因: {reason}"));
            }
            let technician_id = assignment.technician_id;
            ticket.assignment_history.push(assignment);
            technician_id
        });
        ticket.status = TicketStatus::Cancelled;
        ticket.updated_at = Utc::now();
        // 先落盘再释放技师，写入失败时技师保持占用、存储无变更
        self.save_ticket(&ticket).await?;

        if let Some(technician_id) = released_technician {
            self.release_technician(technician_id).await?;
        }
        self.monitor.deactivate(ticket_id).await?;
        self.discard_lock(ticket_id).await;
        self.publish_status_change(ticket_id, from, TicketStatus::Cancelled);
        Ok(ticket)
    }

    /// 改派：关闭当前派工单并创建新的，工单进入 assigned
    ///
    /// 仅允许 pending 或 assigned；技师已经动身后改派需先取消。
    /// 旧派工单显式关闭（superseded_at），不补填 completed_at。
    pub async fn reassign(
        &self,
        ticket_id: Uuid,
        new_technician_id: Uuid,
    ) -> DispatchResult<Ticket> {
        let lock = self.lock_for(ticket_id).await;
        let _guard = lock.lock().await;

        let mut ticket = self.load_ticket(ticket_id).await?;
        let from = ticket.status;
        if !matches!(from, TicketStatus::Pending | TicketStatus::Assigned) {
            return Err(DispatchError::invalid_transition(from, TicketStatus::Assigned));
        }

        // 新技师先占用成功，再关闭旧派工单
        self.occupy_technician(new_technician_id).await?;

        let previous_technician = ticket.assignment.take().map(|mut previous| {
            previous.superseded_at = Some(Utc::now());
            let technician_id = previous.technician_id;
            ticket.assignment_history.push(previous);
            technician_id
        });

        let assignment = Assignment::new(ticket_id, new_technician_id);
        let assignment_id = assignment.id;
        ticket.assignment = Some(assignment);
        ticket.status = TicketStatus::Assigned;
        ticket.updated_at = Utc::now();
        // 写入失败时回补新技师占用；旧技师要等写入成功后才释放
        if let Err(save_err) = self.save_ticket(&ticket).await {
            self.compensate_occupation(new_technician_id).await;
            return Err(save_err);
        }

        if let Some(previous_technician) = previous_technician {
            self.release_technician(previous_technician).await?;
        }

        self.bus.publish(DispatchEvent::AssignmentCreated {
            ticket_id,
            assignment_id,
            technician_id: new_technician_id,
            occurred_at: Utc::now(),
        });
        if from != TicketStatus::Assigned {
            self.publish_status_change(ticket_id, from, TicketStatus::Assigned);
        }
        Ok(ticket)
    }

    /// 技师动身后围绕服务地址激活围栏；坐标缺失只降级不阻断
    async fn activate_geofence(&self, ticket: &Ticket) -> DispatchResult<()> {
        let technician_id = match ticket.assignment.as_ref() {
            Some(assignment) => assignment.technician_id,
            None => return Ok(()),
        };
        match ticket.position {
            Some(position) if ticket.can_enter_geofencing() => {
                let geofence =
                    Geofence::new(ticket.id, position, self.geofence.default_radius_meters);
                self.monitor.activate(geofence, technician_id).await
            }
            _ => {
                warn!(
                    ticket_id = %ticket.id,
                    "工单缺少有效坐标，跳过围栏监控"
                );
                Ok(())
            }
        }
    }

    async fn finish(&self, ticket: &Ticket) -> DispatchResult<()> {
        if let Some(assignment) = ticket.assignment.as_ref() {
            self.release_technician(assignment.technician_id).await?;
        }
        self.monitor.deactivate(ticket.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use dispatch_domain::{GeoPoint, TechnicianSnapshot, TicketPriority};
    use dispatch_infrastructure::{
        MemoryGeofenceRepository, MemoryTechnicianRepository, MemoryTicketRepository,
    };

    const SITE: GeoPoint = GeoPoint {
        lat: 21.1458,
        lng: 79.0882,
    };

    struct Fixture {
        lifecycle: TicketLifecycle,
        ticket_repo: Arc<MemoryTicketRepository>,
        technician_repo: Arc<MemoryTechnicianRepository>,
        monitor: Arc<GeofenceMonitor>,
        bus: Arc<DispatchEventBus>,
    }

    fn fixture() -> Fixture {
        let ticket_repo = Arc::new(MemoryTicketRepository::new());
        let technician_repo = Arc::new(MemoryTechnicianRepository::new());
        let geofence_repo = Arc::new(MemoryGeofenceRepository::new());
        let bus = Arc::new(DispatchEventBus::new(64));
        let monitor = Arc::new(GeofenceMonitor::new(geofence_repo, bus.clone()));
        let matcher = Arc::new(MatcherService::new(
            ticket_repo.clone(),
            technician_repo.clone(),
            MatchingConfig::default(),
            &StoreConfig::default(),
        ));
        let lifecycle = TicketLifecycle::new(
            ticket_repo.clone(),
            technician_repo.clone(),
            monitor.clone(),
            matcher,
            bus.clone(),
            GeofenceConfig::default(),
            &StoreConfig::default(),
        );
        Fixture {
            lifecycle,
            ticket_repo,
            technician_repo,
            monitor,
            bus,
        }
    }

    fn new_ticket(position: Option<GeoPoint>) -> Ticket {
        let mut ticket = Ticket::new(
            "测试客户".to_string(),
            "customer@example.com".to_string(),
            "Nagpur 市区".to_string(),
            "plumbing".to_string(),
            "厨房水管漏水".to_string(),
            TicketPriority::High,
        );
        ticket.position = position;
        ticket
    }

    async fn seed_technician(
        repo: &MemoryTechnicianRepository,
        position: Option<GeoPoint>,
    ) -> Uuid {
        let mut tech = TechnicianSnapshot::new("张师傅".to_string(), vec!["plumbing".to_string()]);
        tech.position = position;
        repo.upsert(&tech).await.unwrap();
        tech.id
    }

    #[tokio::test]
    async fn test_full_forward_path_stamps_assignment_timestamps() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let tech_id = seed_technician(&f.technician_repo, Some(SITE)).await;

        let ticket = f.lifecycle.assign(ticket.id, tech_id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Assigned);
        assert!(ticket.assignment.is_some());

        let ticket = f
            .lifecycle
            .advance(ticket.id, TicketStatus::EnRoute)
            .await
            .unwrap();
        assert!(f.monitor.is_watching(ticket.id).await);

        let ticket = f.lifecycle.advance(ticket.id, TicketStatus::Arrived).await.unwrap();
        let ticket = f
            .lifecycle
            .advance(ticket.id, TicketStatus::InProgress)
            .await
            .unwrap();
        let ticket = f
            .lifecycle
            .advance(ticket.id, TicketStatus::Completed)
            .await
            .unwrap();

        let assignment = ticket.assignment.as_ref().unwrap();
        assert!(assignment.accepted_at.is_some());
        assert!(assignment.arrived_at.is_some());
        assert!(assignment.started_at.is_some());
        assert!(assignment.completed_at.is_some());
        assert!(assignment.superseded_at.is_none());

        // 完结后释放技师并停用围栏
        let tech = f.technician_repo.get_by_id(tech_id).await.unwrap().unwrap();
        assert_eq!(tech.status, TechnicianStatus::Available);
        assert_eq!(tech.workload, 0);
        assert!(!f.monitor.is_watching(ticket.id).await);
    }

    #[tokio::test]
    async fn test_skipping_a_step_is_rejected() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let tech_id = seed_technician(&f.technician_repo, Some(SITE)).await;
        f.lifecycle.assign(ticket.id, tech_id).await.unwrap();

        // assigned 直接跳 arrived
        let result = f.lifecycle.advance(ticket.id, TicketStatus::Arrived).await;
        assert!(matches!(
            result,
            Err(DispatchError::InvalidTransition { .. })
        ));

        // 状态未变，后续正常推进仍然可行
        let ticket = f
            .lifecycle
            .advance(ticket.id, TicketStatus::EnRoute)
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::EnRoute);
    }

    #[tokio::test]
    async fn test_advance_cannot_reach_assigned_without_assignment() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();

        // assigned 只能经由 assign/reassign 进入
        let result = f.lifecycle.advance(ticket.id, TicketStatus::Assigned).await;
        assert!(matches!(
            result,
            Err(DispatchError::InvalidTransition { .. })
        ));

        let ticket = f.lifecycle.get_ticket(ticket.id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert!(ticket.assignment.is_none());
    }

    #[tokio::test]
    async fn test_assign_save_failure_frees_technician() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let tech_id = seed_technician(&f.technician_repo, Some(SITE)).await;

        f.ticket_repo.set_fail_updates(true);
        let result = f.lifecycle.assign(ticket.id, tech_id).await;
        assert!(matches!(result, Err(DispatchError::StoreUnavailable(_))));

        // 占用已回补，技师可以继续接单
        let tech = f.technician_repo.get_by_id(tech_id).await.unwrap().unwrap();
        assert_eq!(tech.status, TechnicianStatus::Available);
        assert_eq!(tech.workload, 0);

        // 存储恢复后重试成功
        f.ticket_repo.set_fail_updates(false);
        let ticket = f.lifecycle.assign(ticket.id, tech_id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Assigned);
    }

    #[tokio::test]
    async fn test_reassign_save_failure_keeps_old_assignment_intact() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let first = seed_technician(&f.technician_repo, Some(SITE)).await;
        let second = seed_technician(&f.technician_repo, Some(SITE)).await;
        f.lifecycle.assign(ticket.id, first).await.unwrap();

        f.ticket_repo.set_fail_updates(true);
        let result = f.lifecycle.reassign(ticket.id, second).await;
        assert!(matches!(result, Err(DispatchError::StoreUnavailable(_))));

        // 新技师占用已回补，旧技师仍持有工单
        let new_tech = f.technician_repo.get_by_id(second).await.unwrap().unwrap();
        assert_eq!(new_tech.status, TechnicianStatus::Available);
        assert_eq!(new_tech.workload, 0);
        let old_tech = f.technician_repo.get_by_id(first).await.unwrap().unwrap();
        assert_eq!(old_tech.status, TechnicianStatus::Busy);
        assert_eq!(old_tech.workload, 1);
        let stored = f.lifecycle.get_ticket(ticket.id).await.unwrap();
        assert_eq!(stored.assignment.as_ref().unwrap().technician_id, first);
    }

    #[tokio::test]
    async fn test_cancel_save_failure_keeps_technician_occupied() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let tech_id = seed_technician(&f.technician_repo, Some(SITE)).await;
        f.lifecycle.assign(ticket.id, tech_id).await.unwrap();

        f.ticket_repo.set_fail_updates(true);
        let result = f.lifecycle.cancel(ticket.id, None).await;
        assert!(matches!(result, Err(DispatchError::StoreUnavailable(_))));

        // 写入失败时技师不释放，工单留在 assigned 可重试
        let tech = f.technician_repo.get_by_id(tech_id).await.unwrap().unwrap();
        assert_eq!(tech.status, TechnicianStatus::Busy);
        assert_eq!(tech.workload, 1);
        let stored = f.lifecycle.get_ticket(ticket.id).await.unwrap();
        assert_eq!(stored.status, TicketStatus::Assigned);

        f.ticket_repo.set_fail_updates(false);
        let ticket = f.lifecycle.cancel(ticket.id, None).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_terminal_tickets_release_their_locks() {
        let f = fixture();
        let completed = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let cancelled = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let first = seed_technician(&f.technician_repo, Some(SITE)).await;
        let second = seed_technician(&f.technician_repo, Some(SITE)).await;

        f.lifecycle.assign(completed.id, first).await.unwrap();
        for status in [
            TicketStatus::EnRoute,
            TicketStatus::Arrived,
            TicketStatus::InProgress,
            TicketStatus::Completed,
        ] {
            f.lifecycle.advance(completed.id, status).await.unwrap();
        }

        f.lifecycle.assign(cancelled.id, second).await.unwrap();
        f.lifecycle.cancel(cancelled.id, None).await.unwrap();

        // 终态工单的锁条目全部回收
        assert!(f.lifecycle.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_assign_on_non_pending_leaves_technician_untouched() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let first = seed_technician(&f.technician_repo, Some(SITE)).await;
        let second = seed_technician(&f.technician_repo, Some(SITE)).await;

        f.lifecycle.assign(ticket.id, first).await.unwrap();
        let result = f.lifecycle.assign(ticket.id, second).await;
        assert!(matches!(
            result,
            Err(DispatchError::InvalidTransition { .. })
        ));

        // 第二名技师完全未被触碰
        let untouched = f.technician_repo.get_by_id(second).await.unwrap().unwrap();
        assert_eq!(untouched.status, TechnicianStatus::Available);
        assert_eq!(untouched.workload, 0);
    }

    #[tokio::test]
    async fn test_assign_to_busy_technician_rejected() {
        let f = fixture();
        let ticket_a = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let ticket_b = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let tech_id = seed_technician(&f.technician_repo, Some(SITE)).await;

        f.lifecycle.assign(ticket_a.id, tech_id).await.unwrap();
        let result = f.lifecycle.assign(ticket_b.id, tech_id).await;
        assert!(matches!(
            result,
            Err(DispatchError::TechnicianUnavailable(_))
        ));

        // 失败的指派不留下任何残余，工单仍是 pending
        let ticket_b = f.lifecycle.get_ticket(ticket_b.id).await.unwrap();
        assert_eq!(ticket_b.status, TicketStatus::Pending);
        assert!(ticket_b.assignment.is_none());
    }

    #[tokio::test]
    async fn test_cancel_frees_technician_and_archives_assignment() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let tech_id = seed_technician(&f.technician_repo, Some(SITE)).await;
        f.lifecycle.assign(ticket.id, tech_id).await.unwrap();
        f.lifecycle
            .advance(ticket.id, TicketStatus::EnRoute)
            .await
            .unwrap();

        let ticket = f
            .lifecycle
            .cancel(ticket.id, Some("客户临时取消"))
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Cancelled);
        assert!(ticket.assignment.is_none());
        assert_eq!(ticket.assignment_history.len(), 1);
        let archived = &ticket.assignment_history[0];
        assert!(archived.superseded_at.is_some());
        assert!(archived.notes.as_ref().unwrap().contains("客户临时取消"));

        let tech = f.technician_repo.get_by_id(tech_id).await.unwrap().unwrap();
        assert_eq!(tech.status, TechnicianStatus::Available);
        assert!(!f.monitor.is_watching(ticket.id).await);

        // 终态工单不能再取消
        let result = f.lifecycle.cancel(ticket.id, None).await;
        assert!(matches!(
            result,
            Err(DispatchError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_reassign_closes_previous_assignment() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let first = seed_technician(&f.technician_repo, Some(SITE)).await;
        let second = seed_technician(&f.technician_repo, Some(SITE)).await;

        f.lifecycle.assign(ticket.id, first).await.unwrap();

        let ticket = f.lifecycle.reassign(ticket.id, second).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Assigned);
        let current = ticket.assignment.as_ref().unwrap();
        assert_eq!(current.technician_id, second);
        assert!(current.is_active());

        // 旧派工单归档并关闭，completed_at 不补填
        assert_eq!(ticket.assignment_history.len(), 1);
        let previous = &ticket.assignment_history[0];
        assert_eq!(previous.technician_id, first);
        assert!(previous.superseded_at.is_some());
        assert!(previous.completed_at.is_none());

        // 旧技师释放
        let old = f.technician_repo.get_by_id(first).await.unwrap().unwrap();
        assert_eq!(old.status, TechnicianStatus::Available);
        assert_eq!(old.workload, 0);
    }

    #[tokio::test]
    async fn test_reassign_from_pending_behaves_like_assign() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let tech_id = seed_technician(&f.technician_repo, Some(SITE)).await;

        // pending 工单没有旧派工单可关闭
        let ticket = f.lifecycle.reassign(ticket.id, tech_id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Assigned);
        assert!(ticket.assignment_history.is_empty());
        assert_eq!(ticket.assignment.as_ref().unwrap().technician_id, tech_id);
    }

    #[tokio::test]
    async fn test_reassign_after_departure_rejected() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let first = seed_technician(&f.technician_repo, Some(SITE)).await;
        let second = seed_technician(&f.technician_repo, Some(SITE)).await;

        f.lifecycle.assign(ticket.id, first).await.unwrap();
        f.lifecycle
            .advance(ticket.id, TicketStatus::EnRoute)
            .await
            .unwrap();

        // 技师已动身，改派被拒绝，新技师不受影响
        let result = f.lifecycle.reassign(ticket.id, second).await;
        assert!(matches!(
            result,
            Err(DispatchError::InvalidTransition { .. })
        ));
        let untouched = f.technician_repo.get_by_id(second).await.unwrap().unwrap();
        assert_eq!(untouched.workload, 0);
    }

    #[tokio::test]
    async fn test_auto_assign_picks_nearest_candidate() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();

        let near = seed_technician(
            &f.technician_repo,
            Some(GeoPoint::new(SITE.lat + 0.001, SITE.lng)),
        )
        .await;
        let _far = seed_technician(
            &f.technician_repo,
            Some(GeoPoint::new(SITE.lat + 0.05, SITE.lng)),
        )
        .await;

        let ticket = f.lifecycle.auto_assign(ticket.id).await.unwrap();
        assert_eq!(ticket.assignment.as_ref().unwrap().technician_id, near);
    }

    #[tokio::test]
    async fn test_auto_assign_without_candidates_fails() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();

        let result = f.lifecycle.auto_assign(ticket.id).await;
        assert!(matches!(
            result,
            Err(DispatchError::TechnicianUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_en_route_without_coordinates_skips_geofence() {
        let f = fixture();
        let ticket = f.lifecycle.create_ticket(new_ticket(None)).await.unwrap();
        let tech_id = seed_technician(&f.technician_repo, Some(SITE)).await;

        f.lifecycle.assign(ticket.id, tech_id).await.unwrap();
        let ticket = f
            .lifecycle
            .advance(ticket.id, TicketStatus::EnRoute)
            .await
            .unwrap();

        // 缺坐标的工单照常推进，只是没有围栏监控
        assert_eq!(ticket.status, TicketStatus::EnRoute);
        assert!(!f.monitor.is_watching(ticket.id).await);
    }

    #[tokio::test]
    async fn test_assignment_events_published_in_order() {
        let f = fixture();
        let mut subscription = f.bus.subscribe();
        let ticket = f.lifecycle.create_ticket(new_ticket(Some(SITE))).await.unwrap();
        let tech_id = seed_technician(&f.technician_repo, Some(SITE)).await;

        f.lifecycle.assign(ticket.id, tech_id).await.unwrap();

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.event_type(), "assignment_created");
        let second = subscription.recv().await.unwrap();
        assert_eq!(second.event_type(), "ticket_status_changed");
    }
}
