pub mod hub;
pub use hub::{HubConfig, HubConfigCli};

/// Keeps the non-blocking log writer alive for the lifetime of the process.
pub struct TracingGuard {
    pub file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}
