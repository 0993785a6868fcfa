use std::sync::Arc;

use anyhow::Result;
use dispatch_core::{
    AppConfig, DispatchEventBus, GeofenceMonitor, LocationIngest, MatcherService, TicketLifecycle,
};
use dispatch_infrastructure::{
    MemoryGeofenceRepository, MemoryLocationRepository, MemoryTechnicianRepository,
    MemoryTicketRepository,
};
use tokio::sync::broadcast;
use tracing::info;

/// 主应用程序
///
/// 装配内存仓储、事件总线与各个派单服务。服务之间只通过
/// 仓储抽象与事件总线交互。
pub struct Application {
    pub bus: Arc<DispatchEventBus>,
    pub monitor: Arc<GeofenceMonitor>,
    pub matcher: Arc<MatcherService>,
    pub lifecycle: Arc<TicketLifecycle>,
    pub ingest: Arc<LocationIngest>,
}

impl Application {
    /// 创建新的应用实例
    pub fn new(config: &AppConfig) -> Self {
        info!("初始化派单应用");

        let ticket_repo = Arc::new(MemoryTicketRepository::new());
        let technician_repo = Arc::new(MemoryTechnicianRepository::new());
        let location_repo = Arc::new(MemoryLocationRepository::new());
        let geofence_repo = Arc::new(MemoryGeofenceRepository::new());

        let bus = Arc::new(DispatchEventBus::new(config.event_bus.channel_capacity));
        let monitor = Arc::new(GeofenceMonitor::new(geofence_repo, bus.clone()));
        let matcher = Arc::new(MatcherService::new(
            ticket_repo.clone(),
            technician_repo.clone(),
            config.matching.clone(),
            &config.store,
        ));
        let lifecycle = Arc::new(TicketLifecycle::new(
            ticket_repo,
            technician_repo.clone(),
            monitor.clone(),
            matcher.clone(),
            bus.clone(),
            config.geofence.clone(),
            &config.store,
        ));
        let ingest = Arc::new(LocationIngest::new(
            location_repo,
            technician_repo,
            monitor.clone(),
            bus.clone(),
            config.ingest.clone(),
            &config.store,
        ));

        Self {
            bus,
            monitor,
            matcher,
            lifecycle,
            ingest,
        }
    }

    /// 运行应用程序：审计订阅循环记录所有领域事件，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("派单应用已启动");
        let mut subscription = self.bus.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("审计订阅收到关闭信号");
                    break;
                }
                event = subscription.recv() => {
                    match event {
                        Some(event) => {
                            info!(
                                event_type = event.event_type(),
                                ticket_id = ?event.ticket_id(),
                                technician_id = ?event.technician_id(),
                                "领域事件"
                            );
                        }
                        None => {
                            info!("事件总线已关闭");
                            break;
                        }
                    }
                }
            }
        }

        info!("派单应用已停止");
        Ok(())
    }
}
