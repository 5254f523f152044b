mod analyzer;
mod correlator;
mod result;
pub mod timeline;

pub use self::analyzer::{Analyzer, RunSummary};
pub use self::correlator::{Candidate, Correlator, FlowSnapshot};
pub use self::result::AnalysisResult;
pub use self::timeline::{CongestionEvent, SrttCursor, SrttEntry};
