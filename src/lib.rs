pub mod analysis;
pub mod config;
pub mod error;
pub mod source;
pub mod tcp;

#[cfg(test)]
mod test;

pub use analysis::{AnalysisResult, Analyzer, RunSummary};
pub use config::Config;
pub use error::{Error, Result};
