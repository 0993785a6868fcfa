//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization. The default service site
//! is central Nagpur, matching the coordinates used throughout the
//! integration tests.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use dispatch_domain::{
    GeoPoint, LocationSample, TechnicianSnapshot, TechnicianStatus, Ticket, TicketPriority,
    TicketStatus,
};

/// Default service site used by the builders (central Nagpur)
pub const TEST_SITE: GeoPoint = GeoPoint {
    lat: 21.1458,
    lng: 79.0882,
};

/// Returns a point offset north of `origin` by roughly `meters`
pub fn point_north_of(origin: GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::new(origin.lat + meters / 111_195.0, origin.lng)
}

/// Builder for creating test Ticket entities
pub struct TicketBuilder {
    ticket: Ticket,
}

impl TicketBuilder {
    pub fn new() -> Self {
        let mut ticket = Ticket::new(
            "Test Customer".to_string(),
            "customer@example.com".to_string(),
            "12 Residency Road, Nagpur".to_string(),
            "plumbing".to_string(),
            "Leaking kitchen pipe".to_string(),
            TicketPriority::Medium,
        );
        ticket.position = Some(TEST_SITE);
        Self { ticket }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.ticket.category = category.to_string();
        self
    }

    pub fn with_priority(mut self, priority: TicketPriority) -> Self {
        self.ticket.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.ticket.status = status;
        self
    }

    pub fn with_position(mut self, position: GeoPoint) -> Self {
        self.ticket.position = Some(position);
        self
    }

    pub fn without_position(mut self) -> Self {
        self.ticket.position = None;
        self
    }

    pub fn with_customer(mut self, name: &str, email: &str) -> Self {
        self.ticket.customer_name = name.to_string();
        self.ticket.customer_email = email.to_string();
        self
    }

    pub fn build(self) -> Ticket {
        self.ticket
    }
}

impl Default for TicketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test TechnicianSnapshot entities
pub struct TechnicianBuilder {
    technician: TechnicianSnapshot,
}

impl TechnicianBuilder {
    pub fn new() -> Self {
        let mut technician =
            TechnicianSnapshot::new("Test Technician".to_string(), vec!["plumbing".to_string()]);
        technician.position = Some(TEST_SITE);
        Self { technician }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.technician.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.technician.name = name.to_string();
        self
    }

    pub fn with_skills(mut self, skills: Vec<&str>) -> Self {
        self.technician.skills = skills.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_status(mut self, status: TechnicianStatus) -> Self {
        self.technician.status = status;
        self
    }

    pub fn with_position(mut self, position: GeoPoint) -> Self {
        self.technician.position = Some(position);
        self
    }

    pub fn without_position(mut self) -> Self {
        self.technician.position = None;
        self
    }

    pub fn with_workload(mut self, workload: u32) -> Self {
        self.technician.workload = workload;
        self
    }

    pub fn build(self) -> TechnicianSnapshot {
        self.technician
    }
}

impl Default for TechnicianBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test LocationSample entities
pub struct LocationSampleBuilder {
    sample: LocationSample,
}

impl LocationSampleBuilder {
    pub fn new(technician_id: Uuid) -> Self {
        Self {
            sample: LocationSample::new(technician_id, TEST_SITE, Utc::now()),
        }
    }

    pub fn with_point(mut self, point: GeoPoint) -> Self {
        self.sample.point = point;
        self
    }

    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.sample.recorded_at = recorded_at;
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.sample.accuracy = Some(accuracy);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.sample.speed = Some(speed);
        self
    }

    pub fn build(self) -> LocationSample {
        self.sample
    }
}
