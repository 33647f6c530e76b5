// Domain models shared by the collector, cache, broadcaster and routes

mod container;
mod logs;
mod network;
mod system;

pub use container::{ContainerDetail, ContainerMetrics, ContainerSnapshot, ContainerStatus};
pub use logs::LogLine;
pub use network::{ContainerRef, NetworkEntry, NetworkTopology};
pub use system::{DiskStats, LoadAverage, MemoryStats, NetworkCounters, SystemSnapshot};
