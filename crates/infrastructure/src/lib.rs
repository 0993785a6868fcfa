//! 基础设施层：领域仓储抽象的具体实现
//!
//! 当前提供内存实现，适用于嵌入式部署与测试场景。

pub mod memory;

pub use memory::{
    MemoryGeofenceRepository, MemoryLocationRepository, MemoryTechnicianRepository,
    MemoryTicketRepository,
};
