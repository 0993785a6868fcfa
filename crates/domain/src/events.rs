//! 派单领域事件
//!
//! 生命周期、定位与围栏的状态变化通过事件总线扇出给订阅方
//! （看板、通知、审计）。事件只发布不持久化。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{GeoPoint, TicketStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DispatchEvent {
    TicketStatusChanged {
        ticket_id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
        occurred_at: DateTime<Utc>,
    },
    AssignmentCreated {
        ticket_id: Uuid,
        assignment_id: Uuid,
        technician_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    GeofenceEntered {
        ticket_id: Uuid,
        technician_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    GeofenceExited {
        ticket_id: Uuid,
        technician_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    LocationUpdated {
        technician_id: Uuid,
        point: GeoPoint,
        recorded_at: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
}

impl DispatchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DispatchEvent::TicketStatusChanged { .. } => "ticket_status_changed",
            DispatchEvent::AssignmentCreated { .. } => "assignment_created",
            DispatchEvent::GeofenceEntered { .. } => "geofence_entered",
            DispatchEvent::GeofenceExited { .. } => "geofence_exited",
            DispatchEvent::LocationUpdated { .. } => "location_updated",
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DispatchEvent::TicketStatusChanged { occurred_at, .. }
            | DispatchEvent::AssignmentCreated { occurred_at, .. }
            | DispatchEvent::GeofenceEntered { occurred_at, .. }
            | DispatchEvent::GeofenceExited { occurred_at, .. }
            | DispatchEvent::LocationUpdated { occurred_at, .. } => *occurred_at,
        }
    }

    /// 事件关联的工单，定位更新不绑定工单
    pub fn ticket_id(&self) -> Option<Uuid> {
        match self {
            DispatchEvent::TicketStatusChanged { ticket_id, .. }
            | DispatchEvent::AssignmentCreated { ticket_id, .. }
            | DispatchEvent::GeofenceEntered { ticket_id, .. }
            | DispatchEvent::GeofenceExited { ticket_id, .. } => Some(*ticket_id),
            DispatchEvent::LocationUpdated { .. } => None,
        }
    }

    pub fn technician_id(&self) -> Option<Uuid> {
        match self {
            DispatchEvent::TicketStatusChanged { .. } => None,
            DispatchEvent::AssignmentCreated { technician_id, .. }
            | DispatchEvent::GeofenceEntered { technician_id, .. }
            | DispatchEvent::GeofenceExited { technician_id, .. }
            | DispatchEvent::LocationUpdated { technician_id, .. } => Some(*technician_id),
        }
    }
}
