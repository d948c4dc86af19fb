pub mod next_data;
pub mod scanner;

pub use next_data::extract_next_data;
pub use scanner::{CandidateValue, MetricCandidate, MetricScanner};
