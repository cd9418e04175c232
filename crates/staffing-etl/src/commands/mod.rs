//! Command implementations

pub mod migrate;
pub mod profile;
pub mod report;
pub mod run;
