//! The `Analyzer` trait (C5) plus its two implementations: `SqlFluffAdapter`
//! (shells out to the real `sqlfluff` CLI) and `FakeAnalyzer` (a
//! deterministic in-process double for tests).

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;

use sqlcheck_types::error::{CoreError, CoreResult};
use sqlcheck_types::ids::now;

use crate::model::{classify_severity, AnalysisMetadata, AnalysisResult, AnalyzeRequest, FileInfo, Summary, Violation};

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, req: AnalyzeRequest) -> CoreResult<AnalysisResult>;
}

/// Per-dialect invocation profile, cached so repeated analyses of the same
/// dialect don't re-derive the CLI argument list each time.
#[derive(Clone)]
struct DialectConfig {
    rules_applied: u32,
}

pub struct SqlFluffAdapter {
    binary: String,
    /// `analyze` itself only spawns a `Command`, which is safe to call
    /// concurrently; the mutex guards the cache *population* path, not the
    /// subprocess call (§5).
    dialect_cache: Mutex<HashMap<String, DialectConfig>>,
}

impl SqlFluffAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            dialect_cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SqlFluffAdapter {
    fn default() -> Self {
        Self::new("sqlfluff")
    }
}

/// Dialects the wrapped linter understands. §4.5: "construction failure for
/// an unknown dialect is signalled as `ConfigError`" — here that check runs
/// lazily per-call instead of at adapter construction, since the adapter has
/// no fixed dialect of its own until a request names one.
const KNOWN_DIALECTS: &[&str] = &[
    "ansi", "mysql", "postgres", "bigquery", "snowflake", "redshift", "sqlite", "tsql", "oracle", "hive", "spark",
];

fn validate_dialect(dialect: &str) -> CoreResult<()> {
    if KNOWN_DIALECTS.contains(&dialect) {
        Ok(())
    } else {
        Err(CoreError::Config(format!("unknown SQL dialect {dialect:?}")))
    }
}

#[derive(Debug, Deserialize)]
struct SqlFluffFileReport {
    #[allow(dead_code)]
    filepath: Option<String>,
    #[serde(default)]
    violations: Vec<SqlFluffViolation>,
}

#[derive(Debug, Deserialize)]
struct SqlFluffViolation {
    line_no: u32,
    line_pos: u32,
    code: String,
    description: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    fixes: Vec<serde_json::Value>,
}

#[async_trait]
impl Analyzer for SqlFluffAdapter {
    async fn analyze(&self, req: AnalyzeRequest) -> CoreResult<AnalysisResult> {
        validate_dialect(&req.dialect)?;
        {
            let mut cache = self.dialect_cache.lock().await;
            cache
                .entry(req.dialect.clone())
                .or_insert(DialectConfig { rules_applied: 0 });
        }

        let mut args = vec!["lint".to_string(), "--format".to_string(), "json".to_string(), "--dialect".to_string(), req.dialect.clone()];
        if let Some(rules) = &req.rules {
            if !rules.is_empty() {
                args.push("--rules".to_string());
                args.push(rules.join(","));
            }
        }
        if let Some(exclude) = &req.exclude_rules {
            if !exclude.is_empty() {
                args.push("--exclude-rules".to_string());
                args.push(exclude.join(","));
            }
        }
        args.push("-".to_string());

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::Analyzer(format!("spawning {}: {e}", self.binary)))?;

        {
            let mut stdin = child.stdin.take().ok_or_else(|| CoreError::Analyzer("no stdin pipe".to_string()))?;
            stdin
                .write_all(req.sql_text.as_bytes())
                .await
                .map_err(|e| CoreError::Analyzer(format!("writing sql to stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CoreError::Analyzer(format!("waiting for {}: {e}", self.binary)))?;

        // sqlfluff exits non-zero when violations are found; only stdout
        // parse failure is a real analyzer error.
        let reports: Vec<SqlFluffFileReport> = serde_json::from_slice(&output.stdout).map_err(|e| {
            CoreError::Analyzer(format!(
                "parsing sqlfluff output: {e}; stderr: {}",
                String::from_utf8_lossy(&output.stderr)
            ))
        })?;

        let sqlfluff_violations: Vec<SqlFluffViolation> = reports.into_iter().flat_map(|r| r.violations).collect();
        let violations: Vec<Violation> = sqlfluff_violations
            .into_iter()
            .map(|v| Violation {
                line_no: v.line_no,
                line_pos: v.line_pos,
                severity: classify_severity(&v.code),
                rule: v.name.unwrap_or_else(|| "unknown".to_string()),
                description: v.description,
                fixable: !v.fixes.is_empty(),
                code: v.code,
            })
            .collect();

        let rules_applied = self
            .dialect_cache
            .lock()
            .await
            .get(&req.dialect)
            .map(|c| c.rules_applied)
            .unwrap_or(0);

        Ok(AnalysisResult {
            summary: Summary::from_violations(&violations),
            file_info: FileInfo::from_source(&req.file_name, &req.sql_text),
            analysis_metadata: AnalysisMetadata {
                analyzer_version: "sqlfluff-cli".to_string(),
                dialect: req.dialect,
                analysis_time: now(),
                rules_applied,
            },
            violations,
        })
    }
}

/// Deterministic, subprocess-free double: flags any line containing the
/// literal substring `SELECT *` with rule `L044` (warning) so tests have a
/// non-empty violation set to assert on without depending on the real
/// linter's rule behavior.
pub struct FakeAnalyzer;

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, req: AnalyzeRequest) -> CoreResult<AnalysisResult> {
        let violations: Vec<Violation> = req
            .sql_text
            .lines()
            .enumerate()
            .filter(|(_, line)| line.to_uppercase().contains("SELECT *"))
            .map(|(i, line)| Violation {
                line_no: (i + 1) as u32,
                line_pos: line.to_uppercase().find("SELECT *").map(|p| p as u32 + 1).unwrap_or(1),
                code: "L044".to_string(),
                description: "avoid SELECT *".to_string(),
                rule: "select_star".to_string(),
                severity: classify_severity("L044"),
                fixable: false,
            })
            .collect();

        Ok(AnalysisResult {
            summary: Summary::from_violations(&violations),
            file_info: FileInfo::from_source(&req.file_name, &req.sql_text),
            analysis_metadata: AnalysisMetadata {
                analyzer_version: "fake-analyzer".to_string(),
                dialect: req.dialect,
                analysis_time: now(),
                rules_applied: 1,
            },
            violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_analyzer_flags_select_star() {
        let analyzer = FakeAnalyzer;
        let result = analyzer
            .analyze(AnalyzeRequest {
                sql_text: "SELECT * FROM orders;\nSELECT id FROM orders;".to_string(),
                file_name: "q.sql".to_string(),
                dialect: "ansi".to_string(),
                rules: None,
                exclude_rules: None,
                config_overrides: None,
            })
            .await
            .unwrap();
        assert_eq!(result.summary.total_violations, 1);
        assert_eq!(result.violations[0].line_no, 1);
        assert_eq!(result.summary.success_rate, 0);
    }

    #[test]
    fn unknown_dialect_is_rejected_as_config_error() {
        let err = validate_dialect("not-a-real-dialect").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn known_dialects_pass_validation() {
        assert!(validate_dialect("mysql").is_ok());
        assert!(validate_dialect("bigquery").is_ok());
    }

    #[tokio::test]
    async fn fake_analyzer_passes_clean_sql() {
        let analyzer = FakeAnalyzer;
        let result = analyzer
            .analyze(AnalyzeRequest {
                sql_text: "SELECT id FROM orders;".to_string(),
                file_name: "q.sql".to_string(),
                dialect: "ansi".to_string(),
                rules: None,
                exclude_rules: None,
                config_overrides: None,
            })
            .await
            .unwrap();
        assert!(result.summary.file_passed);
        assert_eq!(result.summary.success_rate, 100);
    }
}
