//! The analyzer adapter (C5): invokes the SQL linter and normalizes its
//! output.

pub mod analyzer;
pub mod model;

pub use analyzer::{Analyzer, FakeAnalyzer, SqlFluffAdapter};
pub use model::{AnalysisMetadata, AnalysisResult, AnalyzeRequest, FileInfo, Severity, Summary, Violation};
