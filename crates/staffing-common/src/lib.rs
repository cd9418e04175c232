//! Staffing Common Library
//!
//! Shared error handling and logging for the staffing ETL workspace.
//!
//! - **Error Handling**: [`StaffingError`] and the [`Result`] alias
//! - **Logging**: [`logging::init_logging`] driven by [`logging::LogConfig`]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

pub use error::{Result, StaffingError};
