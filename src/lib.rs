// Library interface for vo2lab modules
// The CLI and integration tests both go through these re-exports

pub mod chart;
pub mod config;
pub mod error;
pub mod export;
pub mod heart_rate;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod session;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use error::{Result, ValidationError, Vo2LabError};
pub use export::json::SessionReport;
pub use export::{ExportArtifact, ExportFormat, ReportExporter, TabularRecord};
pub use heart_rate::HrMaxFormula;
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use metrics::{EnduranceMetrics, EnduranceRow, MetricsEngine, Vo2Summary};
pub use models::*;
pub use session::{PhaseInput, ProtocolLimits, SessionModel};
