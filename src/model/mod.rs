pub mod opportunity;
pub mod report;

pub use opportunity::{AggregateResult, Opportunity};
pub use report::{SourceReport, SourceStats, SourceStatus};
