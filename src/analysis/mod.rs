//! Temporal assignment engine: pure functions over already fetched records.

pub mod assignment;
pub mod breakdown;
pub mod debt;
pub mod lifetime;
pub mod quintiles;
pub mod stats;

pub use assignment::{assign, AnalysisIssues, AssignmentTable};
pub use breakdown::aggregate_by_key;
pub use debt::aggregate_debt;
pub use quintiles::partition_into_quintiles;
