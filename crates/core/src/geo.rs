//! 地理计算
//!
//! 距离、包含判定与到达时间估算的唯一实现，
//! 所有调用方共享同一套常量，避免各处口径漂移。

use dispatch_domain::GeoPoint;

/// 地球平均半径（米）
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// 城市路况下的默认平均行驶速度（公里/小时）
pub const DEFAULT_AVG_SPEED_KMH: f64 = 30.0;

/// Haversine 大圆距离（米）
///
/// 输入必须是有效坐标；结果非负且对称。
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// 点是否落在圆形围栏内（含边界）
pub fn is_inside(point: GeoPoint, center: GeoPoint, radius_meters: f64) -> bool {
    distance_meters(point, center) <= radius_meters
}

/// 到达时间估算，四舍五入到分钟
///
/// 距离为 0 返回 0；速度非正返回 None，表示调用方传参错误。
pub fn estimate_eta_minutes(distance_meters: f64, avg_speed_kmh: f64) -> Option<i64> {
    if avg_speed_kmh <= 0.0 {
        return None;
    }
    if distance_meters == 0.0 {
        return Some(0);
    }
    let speed_m_per_min = avg_speed_kmh * 1000.0 / 60.0;
    Some((distance_meters / speed_m_per_min).round() as i64)
}
