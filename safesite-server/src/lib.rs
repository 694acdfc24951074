//! safesite-server: HTTP surface for the PPE compliance monitor

pub mod http;
pub mod metrics;
pub mod startup;

pub use http::{create_router, ApiState};
pub use metrics::Metrics;
pub use startup::{Services, StartupError, StorageMode};
