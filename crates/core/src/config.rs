//! 应用配置
//!
//! TOML 文件加载，缺省字段取默认值，加载后统一校验。

use serde::{Deserialize, Serialize};

use dispatch_domain::{DispatchError, DispatchResult, Geofence};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub geofence: GeofenceConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// 定位接入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// 同一技师两次接受样本之间的最小间隔（秒）
    pub min_interval_seconds: u64,
    /// 位置缓存允许的最大陈旧时间（秒），超过则限流失效
    pub max_staleness_seconds: u64,
    /// 可接受的最差定位精度（米）
    pub accuracy_ceiling_meters: f64,
    /// 样本时间戳允许超前接入时钟的偏差（秒）
    pub max_future_skew_seconds: u64,
    /// 样本时间戳允许落后接入时钟的偏差（秒）
    pub max_past_skew_seconds: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_interval_seconds: 30,
            max_staleness_seconds: 120,
            accuracy_ceiling_meters: 100.0,
            max_future_skew_seconds: 30,
            max_past_skew_seconds: 300,
        }
    }
}

/// 技师匹配配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub max_distance_km: f64,
    pub avg_speed_kmh: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_distance_km: 10.0,
            avg_speed_kmh: crate::geo::DEFAULT_AVG_SPEED_KMH,
        }
    }
}

/// 地理围栏配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceConfig {
    pub default_radius_meters: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            default_radius_meters: Geofence::DEFAULT_RADIUS_METERS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// 外部存储调用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 单次存储操作的超时时间（秒），超时返回 Timeout 且不产生部分变更
    pub operation_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            operation_timeout_seconds: 10,
        }
    }
}

impl AppConfig {
    /// 从 TOML 文件加载配置；路径为 None 时使用默认值
    pub fn load(path: Option<&str>) -> DispatchResult<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    DispatchError::config_error(format!("读取配置文件 {path} 失败: {e}"))
                })?;
                toml::from_str(&content).map_err(|e| {
                    DispatchError::config_error(format!("解析配置文件 {path} 失败: {e}"))
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.ingest.min_interval_seconds == 0 {
            return Err(DispatchError::config_error(
                "ingest.min_interval_seconds 必须大于 0",
            ));
        }
        if self.ingest.accuracy_ceiling_meters <= 0.0 {
            return Err(DispatchError::config_error(
                "ingest.accuracy_ceiling_meters 必须大于 0",
            ));
        }
        if self.matching.max_distance_km <= 0.0 {
            return Err(DispatchError::config_error(
                "matching.max_distance_km 必须大于 0",
            ));
        }
        if self.matching.avg_speed_kmh <= 0.0 {
            return Err(DispatchError::config_error(
                "matching.avg_speed_kmh 必须大于 0",
            ));
        }
        if !(Geofence::MIN_RADIUS_METERS..=Geofence::MAX_RADIUS_METERS)
            .contains(&self.geofence.default_radius_meters)
        {
            return Err(DispatchError::config_error(format!(
                "geofence.default_radius_meters 必须在 [{}, {}] 之间",
                Geofence::MIN_RADIUS_METERS,
                Geofence::MAX_RADIUS_METERS
            )));
        }
        if self.event_bus.channel_capacity == 0 {
            return Err(DispatchError::config_error(
                "event_bus.channel_capacity 必须大于 0",
            ));
        }
        if self.store.operation_timeout_seconds == 0 {
            return Err(DispatchError::config_error(
                "store.operation_timeout_seconds 必须大于 0",
            ));
        }
        Ok(())
    }
}
