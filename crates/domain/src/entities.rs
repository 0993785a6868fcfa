use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// WGS84 坐标点，十进制度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "assigned")]
    Assigned,
    #[serde(rename = "en_route")]
    EnRoute,
    #[serde(rename = "arrived")]
    Arrived,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Assigned => "assigned",
            TicketStatus::EnRoute => "en_route",
            TicketStatus::Arrived => "arrived",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Completed => "completed",
            TicketStatus::Cancelled => "cancelled",
        }
    }
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Completed | TicketStatus::Cancelled)
    }
    /// 生命周期前进路径上的唯一后继状态
    pub fn successor(&self) -> Option<TicketStatus> {
        match self {
            TicketStatus::Pending => Some(TicketStatus::Assigned),
            TicketStatus::Assigned => Some(TicketStatus::EnRoute),
            TicketStatus::EnRoute => Some(TicketStatus::Arrived),
            TicketStatus::Arrived => Some(TicketStatus::InProgress),
            TicketStatus::InProgress => Some(TicketStatus::Completed),
            TicketStatus::Completed | TicketStatus::Cancelled => None,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TicketPriority {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "urgent")]
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    /// 面向客户的追踪码
    pub tracking_code: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub address: String,
    pub position: Option<GeoPoint>,
    pub category: String,
    pub description: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    /// 当前有效的派工单，与工单状态作为一个整体持久化
    pub assignment: Option<Assignment>,
    /// 被改派关闭的历史派工单，仅追加
    pub assignment_history: Vec<Assignment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(
        customer_name: String,
        customer_email: String,
        address: String,
        category: String,
        description: String,
        priority: TicketPriority,
    ) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            tracking_code: Self::generate_tracking_code(&id),
            customer_name,
            customer_email,
            customer_phone: None,
            address,
            position: None,
            category,
            description,
            priority,
            status: TicketStatus::Pending,
            assignment: None,
            assignment_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
    fn generate_tracking_code(id: &Uuid) -> String {
        format!("TRK-{}", &id.simple().to_string()[..8].to_uppercase())
    }
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
    /// 坐标有效的工单才能进入地理围栏监控
    pub fn can_enter_geofencing(&self) -> bool {
        self.position.map(|p| p.is_valid()).unwrap_or(false)
    }
    pub fn entity_description(&self) -> String {
        format!(
            "工单 '{}' (ID: {}, 类别: {}, 状态: {})",
            self.tracking_code, self.id, self.category, self.status
        )
    }
}

/// 一张工单与一名技师的一次履约绑定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub technician_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 改派时被关闭的时间；completed_at 不补填
    pub superseded_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Assignment {
    pub fn new(ticket_id: Uuid, technician_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            technician_id,
            assigned_at: Utc::now(),
            accepted_at: None,
            started_at: None,
            arrived_at: None,
            completed_at: None,
            superseded_at: None,
            notes: None,
        }
    }
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none() && self.superseded_at.is_none()
    }
    pub fn append_note(&mut self, note: &str) {
        match &mut self.notes {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(note);
            }
            None => self.notes = Some(note.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TechnicianStatus {
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "busy")]
    Busy,
    #[serde(rename = "offline")]
    Offline,
}

impl TechnicianStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TechnicianStatus::Available => "available",
            TechnicianStatus::Busy => "busy",
            TechnicianStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for TechnicianStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 技师的最近已知状态快照，由定位管道维护，匹配与围栏只读取
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicianSnapshot {
    pub id: Uuid,
    pub name: String,
    pub skills: Vec<String>,
    pub vehicle: Option<String>,
    pub status: TechnicianStatus,
    /// 最近已知位置，可能过期
    pub position: Option<GeoPoint>,
    /// 当前承接的工单数量，用于匹配排序的并列打破
    pub workload: u32,
    pub last_update: DateTime<Utc>,
}

impl TechnicianSnapshot {
    pub fn new(name: String, skills: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            skills,
            vehicle: None,
            status: TechnicianStatus::Available,
            position: None,
            workload: 0,
            last_update: Utc::now(),
        }
    }
    pub fn is_available(&self) -> bool {
        matches!(self.status, TechnicianStatus::Available)
    }
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s == skill)
    }
    pub fn position_known(&self) -> bool {
        self.position.map(|p| p.is_valid()).unwrap_or(false)
    }
}

/// 技师定位样本，接收后不可变，追加到历史记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSample {
    pub technician_id: Uuid,
    pub point: GeoPoint,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    /// 定位精度（米），越小越准
    pub accuracy: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(technician_id: Uuid, point: GeoPoint, recorded_at: DateTime<Utc>) -> Self {
        Self {
            technician_id,
            point,
            speed: None,
            heading: None,
            accuracy: None,
            recorded_at,
        }
    }
}

/// 工单服务地址周边的圆形到场检测区
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    pub ticket_id: Uuid,
    pub center: GeoPoint,
    pub radius_meters: f64,
    pub entry_logged_at: Option<DateTime<Utc>>,
    pub exit_logged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Geofence {
    pub const MIN_RADIUS_METERS: f64 = 50.0;
    pub const MAX_RADIUS_METERS: f64 = 500.0;
    pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

    /// 半径限制在 [50, 500] 米之间
    pub fn new(ticket_id: Uuid, center: GeoPoint, radius_meters: f64) -> Self {
        Self {
            ticket_id,
            center,
            radius_meters: radius_meters.clamp(Self::MIN_RADIUS_METERS, Self::MAX_RADIUS_METERS),
            entry_logged_at: None,
            exit_logged_at: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TechnicianFilter {
    pub status: Option<TechnicianStatus>,
    pub skill: Option<String>,
}
