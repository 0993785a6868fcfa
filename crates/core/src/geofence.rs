//! 地理围栏监控
//!
//! 每个活跃围栏维护 {未知, 圈内, 圈外} 三态。首个样本只记录
//! 基准不发事件，避免冷启动时样本恰好在圈内引发虚假进入；
//! 之后只有跨越边界才发事件，徘徊在边界附近的样本不会刷屏。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dispatch_domain::{
    DispatchError, DispatchEvent, DispatchResult, Geofence, GeofenceRepository, LocationSample,
};

use crate::event_bus::DispatchEventBus;
use crate::geo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Unknown,
    Inside,
    Outside,
}

struct Watch {
    geofence: Geofence,
    technician_id: Uuid,
    presence: Presence,
}

pub struct GeofenceMonitor {
    geofence_repo: Arc<dyn GeofenceRepository>,
    bus: Arc<DispatchEventBus>,
    /// ticket_id -> 活跃围栏监视状态
    watches: RwLock<HashMap<Uuid, Watch>>,
}

impl GeofenceMonitor {
    pub fn new(geofence_repo: Arc<dyn GeofenceRepository>, bus: Arc<DispatchEventBus>) -> Self {
        Self {
            geofence_repo,
            bus,
            watches: RwLock::new(HashMap::new()),
        }
    }

    /// 技师动身后激活围栏监视；同一工单重复激活会重置基准
    pub async fn activate(&self, geofence: Geofence, technician_id: Uuid) -> DispatchResult<()> {
        self.geofence_repo.upsert(&geofence).await?;

        let ticket_id = geofence.ticket_id;
        let mut watches = self.watches.write().await;
        watches.insert(
            ticket_id,
            Watch {
                geofence,
                technician_id,
                presence: Presence::Unknown,
            },
        );
        info!(ticket_id = %ticket_id, technician_id = %technician_id, "围栏监视已激活");
        Ok(())
    }

    /// 工单完结或取消时停用围栏，之后的样本按无操作处理
    pub async fn deactivate(&self, ticket_id: Uuid) -> DispatchResult<()> {
        let removed = {
            let mut watches = self.watches.write().await;
            watches.remove(&ticket_id).is_some()
        };
        if removed {
            self.geofence_repo.delete_by_ticket(ticket_id).await?;
            info!(ticket_id = %ticket_id, "围栏监视已停用");
        } else {
            debug!(ticket_id = %ticket_id, "停用请求对应的围栏不存在，忽略");
        }
        Ok(())
    }

    pub async fn is_watching(&self, ticket_id: Uuid) -> bool {
        self.watches.read().await.contains_key(&ticket_id)
    }

    /// 处理一条已接受的定位样本
    ///
    /// 对绑定到该技师的每个围栏做进出判定（常见情况是零或一个，
    /// 设计上允许多个）。没有绑定围栏的样本是正常的无操作。
    pub async fn handle_sample(
        &self,
        sample: &LocationSample,
    ) -> DispatchResult<Vec<DispatchEvent>> {
        let mut events = Vec::new();
        let mut failure: Option<DispatchError> = None;
        let mut watches = self.watches.write().await;

        for watch in watches
            .values_mut()
            .filter(|w| w.technician_id == sample.technician_id)
        {
            let currently_inside = geo::is_inside(
                sample.point,
                watch.geofence.center,
                watch.geofence.radius_meters,
            );
            let now = Utc::now();

            match (watch.presence, currently_inside) {
                // 首个样本只建立基准，不发事件
                (Presence::Unknown, inside) => {
                    watch.presence = if inside {
                        Presence::Inside
                    } else {
                        Presence::Outside
                    };
                    debug!(
                        ticket_id = %watch.geofence.ticket_id,
                        inside,
                        "围栏基准已建立"
                    );
                }
                (Presence::Outside, true) => {
                    // 先落盘再改内存状态，写入失败时基准保持圈外，重试样本可补发进入
                    let mut updated = watch.geofence.clone();
                    updated.entry_logged_at = Some(now);
                    if let Err(save_err) = self.geofence_repo.upsert(&updated).await {
                        failure = Some(save_err);
                        break;
                    }
                    watch.geofence = updated;
                    watch.presence = Presence::Inside;

                    info!(
                        ticket_id = %watch.geofence.ticket_id,
                        technician_id = %sample.technician_id,
                        "检测到进入围栏"
                    );
                    events.push(DispatchEvent::GeofenceEntered {
                        ticket_id: watch.geofence.ticket_id,
                        technician_id: sample.technician_id,
                        occurred_at: now,
                    });
                }
                (Presence::Inside, false) => {
                    let mut updated = watch.geofence.clone();
                    updated.exit_logged_at = Some(now);
                    if let Err(save_err) = self.geofence_repo.upsert(&updated).await {
                        failure = Some(save_err);
                        break;
                    }
                    watch.geofence = updated;
                    watch.presence = Presence::Outside;

                    info!(
                        ticket_id = %watch.geofence.ticket_id,
                        technician_id = %sample.technician_id,
                        "检测到离开围栏"
                    );
                    events.push(DispatchEvent::GeofenceExited {
                        ticket_id: watch.geofence.ticket_id,
                        technician_id: sample.technician_id,
                        occurred_at: now,
                    });
                }
                // 稳态：同侧样本不发事件
                (Presence::Inside, true) | (Presence::Outside, false) => {}
            }
        }
        drop(watches);

        if events.is_empty() {
            debug!(technician_id = %sample.technician_id, "样本未触发围栏事件");
        } else if events.len() > 1 {
            warn!(
                technician_id = %sample.technician_id,
                count = events.len(),
                "单条样本触发了多个围栏事件"
            );
        }

        // 已判定出的事件照常广播，再上抛中途的存储错误
        for event in &events {
            self.bus.publish(event.clone());
        }
        match failure {
            Some(save_err) => Err(save_err),
            None => Ok(events),
        }
    }
}
