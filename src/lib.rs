pub mod config;
pub mod dataset;
pub mod fetch;
pub mod interrupt;
pub mod metrics;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod schools;
pub mod store;
