pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod normalize;
pub mod sources;
