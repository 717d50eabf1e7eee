pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;

#[cfg(test)]
pub mod test_support;

pub use analysis::jobs::{AnalysisRunner, RunManifest, RunSummary};
pub use config::AnalyticsConfig;
