//! SensorNet - a dynamic registry of reading-bearing devices.
//!
//! Devices are grouped two levels deep (manager -> group -> device) and
//! created lazily on first reference. Every component is a serialized tokio
//! actor task; callers interact through cloneable handles and oneshot
//! replies. The centerpiece is the collect-all query: a scatter/gather
//! aggregator that folds device answers, device terminations and a one-shot
//! deadline into exactly one aggregated reply.
//!
//! Typical use goes through [`Fleet`]:
//!
//! - `track` a device (registers it, creating group and device on demand)
//! - `record` / `read` its last reading
//! - `collect_readings` across a whole group within a bounded deadline

// Actor runtime and the actors themselves
pub mod actors;

// Message and reply types
pub mod messages;

// Settings (toml)
pub mod config;

// Public facade
pub mod fleet;

// Shared ids, outcomes, errors
pub mod types;

// Re-exports
pub use config::{QuerySettings, Settings};
pub use fleet::Fleet;
pub use messages::ReadingsCollected;
pub use types::{DeviceId, Error, GroupId, Reading, RequestId, Result};
