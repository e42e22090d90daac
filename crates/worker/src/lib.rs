pub mod service;

pub use service::{WorkerService, WorkerServiceBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
