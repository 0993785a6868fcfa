//! 定位样本接入
//!
//! 校验、限流并打点所有上报的技师定位，接受后写入历史记录、
//! 覆盖当前位置缓存，再转发给围栏监控。同一技师的样本串行处理，
//! 保证按 recorded_at 顺序生效；跨技师之间不保证顺序。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use dispatch_domain::{
    DispatchError, DispatchEvent, DispatchResult, LocationRepository, LocationSample,
    TechnicianRepository,
};

use crate::config::{IngestConfig, StoreConfig};
use crate::event_bus::DispatchEventBus;
use crate::geofence::GeofenceMonitor;
use crate::timeout::with_timeout;

/// 接入结果；限流与乱序丢弃是预期的背压行为，不是错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    Throttled,
    OutOfOrder,
}

#[derive(Default)]
struct Lane {
    last_accepted: Option<DateTime<Utc>>,
}

pub struct LocationIngest {
    location_repo: Arc<dyn LocationRepository>,
    technician_repo: Arc<dyn TechnicianRepository>,
    monitor: Arc<GeofenceMonitor>,
    bus: Arc<DispatchEventBus>,
    config: IngestConfig,
    store_timeout: StdDuration,
    /// 每技师一条处理通道，串行化该技师的样本
    lanes: Mutex<HashMap<Uuid, Arc<Mutex<Lane>>>>,
}

impl LocationIngest {
    pub fn new(
        location_repo: Arc<dyn LocationRepository>,
        technician_repo: Arc<dyn TechnicianRepository>,
        monitor: Arc<GeofenceMonitor>,
        bus: Arc<DispatchEventBus>,
        config: IngestConfig,
        store: &StoreConfig,
    ) -> Self {
        Self {
            location_repo,
            technician_repo,
            monitor,
            bus,
            config,
            store_timeout: StdDuration::from_secs(store.operation_timeout_seconds),
            lanes: Mutex::new(HashMap::new()),
        }
    }

    async fn lane(&self, technician_id: Uuid) -> Arc<Mutex<Lane>> {
        let mut lanes = self.lanes.lock().await;
        lanes.entry(technician_id).or_default().clone()
    }

    /// 回收沉寂的通道，防止映射随技师流动无限增长
    ///
    /// 超过最大落后偏差的样本在校验阶段就会被拒绝，因此丢掉
    /// 同样沉寂的通道不会削弱乱序保护。正被持有的通道跳过。
    async fn prune_idle_lanes(&self) {
        let horizon = Utc::now() - Duration::seconds(self.config.max_past_skew_seconds as i64);
        let mut lanes = self.lanes.lock().await;
        lanes.retain(|_, lane| match lane.try_lock() {
            Ok(guard) => guard.last_accepted.is_some_and(|last| last >= horizon),
            Err(_) => true,
        });
    }

    fn validate(&self, sample: &LocationSample) -> DispatchResult<()> {
        if !sample.point.is_valid() {
            return Err(DispatchError::invalid_coordinates(format!(
                "lat={}, lng={}",
                sample.point.lat, sample.point.lng
            )));
        }
        if let Some(accuracy) = sample.accuracy {
            if accuracy > self.config.accuracy_ceiling_meters {
                return Err(DispatchError::invalid_coordinates(format!(
                    "定位精度 {accuracy}m 超过上限 {}m",
                    self.config.accuracy_ceiling_meters
                )));
            }
        }

        let now = Utc::now();
        let future_skew = Duration::seconds(self.config.max_future_skew_seconds as i64);
        let past_skew = Duration::seconds(self.config.max_past_skew_seconds as i64);
        if sample.recorded_at > now + future_skew {
            return Err(DispatchError::stale_or_future(format!(
                "recorded_at 超前 {}s",
                (sample.recorded_at - now).num_seconds()
            )));
        }
        if sample.recorded_at < now - past_skew {
            return Err(DispatchError::stale_or_future(format!(
                "recorded_at 落后 {}s",
                (now - sample.recorded_at).num_seconds()
            )));
        }
        Ok(())
    }

    /// 接入一条定位样本
    ///
    /// 失败路径（坐标无效、时钟偏差）不产生任何状态变更；
    /// 限流与乱序丢弃同样不触碰缓存，也不会到达围栏监控。
    pub async fn accept(&self, sample: LocationSample) -> DispatchResult<IngestOutcome> {
        self.validate(&sample)?;

        let lane = self.lane(sample.technician_id).await;
        let mut lane = lane.lock().await;

        if let Some(last) = lane.last_accepted {
            // 比当前缓存旧的样本直接丢弃，不回溯围栏事件
            if sample.recorded_at <= last {
                debug!(
                    technician_id = %sample.technician_id,
                    "乱序样本已丢弃"
                );
                return Ok(IngestOutcome::OutOfOrder);
            }
            let min_interval = Duration::seconds(self.config.min_interval_seconds as i64);
            let max_staleness = Duration::seconds(self.config.max_staleness_seconds as i64);
            if sample.recorded_at - last < min_interval && Utc::now() - last <= max_staleness {
                // 突发中的多余样本静默丢弃；位置缓存即将过期时放行，
                // 保证突发也不会让位置新鲜度饿死
                debug!(
                    technician_id = %sample.technician_id,
                    "样本到达过快，已限流"
                );
                return Ok(IngestOutcome::Throttled);
            }
        }

        with_timeout(self.store_timeout, "append_location_sample", async {
            self.location_repo.append(&sample).await
        })
        .await?;
        with_timeout(self.store_timeout, "update_position_cache", async {
            self.technician_repo
                .update_position(sample.technician_id, sample.point, sample.recorded_at)
                .await
        })
        .await?;
        lane.last_accepted = Some(sample.recorded_at);

        self.monitor.handle_sample(&sample).await?;
        self.bus.publish(DispatchEvent::LocationUpdated {
            technician_id: sample.technician_id,
            point: sample.point,
            recorded_at: sample.recorded_at,
            occurred_at: Utc::now(),
        });
        drop(lane);

        self.prune_idle_lanes().await;
        Ok(IngestOutcome::Accepted)
    }
}
