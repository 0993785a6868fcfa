pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;

pub use entities::{
    Assignment, Geofence, GeoPoint, LocationSample, TechnicianFilter, TechnicianSnapshot,
    TechnicianStatus, Ticket, TicketFilter, TicketPriority, TicketStatus,
};
pub use errors::{DispatchError, DispatchResult};
pub use events::DispatchEvent;
pub use repositories::{
    GeofenceRepository, LocationRepository, TechnicianRepository, TicketRepository,
};
