//! The normalized analysis result (§4.5), independent of whatever tool
//! produced it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub sql_text: String,
    pub file_name: String,
    pub dialect: String,
    pub rules: Option<Vec<String>>,
    pub exclude_rules: Option<Vec<String>>,
    pub config_overrides: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

/// Rule codes whose violations are layout/whitespace-structural enough to
/// be treated as blocking rather than advisory (§4.5).
const CRITICAL_RULES: [&str; 5] = ["L001", "L002", "L003", "L008", "L009"];

pub fn classify_severity(rule_code: &str) -> Severity {
    if CRITICAL_RULES.contains(&rule_code) {
        Severity::Critical
    } else {
        Severity::Warning
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub line_no: u32,
    pub line_pos: u32,
    pub code: String,
    pub description: String,
    pub rule: String,
    pub severity: Severity,
    pub fixable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub total_violations: u32,
    pub critical_violations: u32,
    pub warning_violations: u32,
    pub file_passed: bool,
    /// `{0, 100}`: binary per §4.5, not a weighted score.
    pub success_rate: u8,
}

impl Summary {
    pub fn from_violations(violations: &[Violation]) -> Self {
        let critical_violations = violations.iter().filter(|v| v.severity == Severity::Critical).count() as u32;
        let total_violations = violations.len() as u32;
        Self {
            total_violations,
            critical_violations,
            warning_violations: total_violations - critical_violations,
            file_passed: total_violations == 0,
            success_rate: if total_violations > 0 { 0 } else { 100 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_name: String,
    pub file_size: u64,
    pub line_count: u32,
    pub character_count: u32,
}

impl FileInfo {
    pub fn from_source(file_name: &str, sql_text: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            file_size: sql_text.len() as u64,
            line_count: sql_text.lines().count().max(1) as u32,
            character_count: sql_text.chars().count() as u32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analyzer_version: String,
    pub dialect: String,
    pub analysis_time: chrono::DateTime<chrono::Utc>,
    pub rules_applied: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub violations: Vec<Violation>,
    pub summary: Summary,
    pub file_info: FileInfo,
    pub analysis_metadata: AnalysisMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_rules_are_classified_critical() {
        assert_eq!(classify_severity("L003"), Severity::Critical);
        assert_eq!(classify_severity("L999"), Severity::Warning);
    }

    #[test]
    fn success_rate_is_binary_not_weighted() {
        let clean = Summary::from_violations(&[]);
        assert_eq!(clean.success_rate, 100);
        let dirty = Summary::from_violations(&[Violation {
            line_no: 1,
            line_pos: 1,
            code: "L999".into(),
            description: "x".into(),
            rule: "x".into(),
            severity: Severity::Warning,
            fixable: false,
        }]);
        assert_eq!(dirty.success_rate, 0);
    }
}
