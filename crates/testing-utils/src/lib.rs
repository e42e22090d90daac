//! # Tutor Testing Utils
//!
//! Shared testing utilities for the tutor workspace.
//!
//! - **Mock Repositories**: in-memory `TaskRepository` and `MonitoringRepository`
//! - **Mock Services**: scripted vision API, recording message queue, failing cache
//! - **Test Data Builders**: tasks, jobs and sample images
//! - **Helpers**: in-memory SQLite pools and polling utilities
//!
//! ```toml
//! [dev-dependencies]
//! tutor-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
