//! Integrity auditing of persisted sessions.
//!
//! [`IntegrityVerifier`] reads what the recorder wrote, scores it, and
//! reconstructs damaged sessions. Every entry point returns a structured
//! report; failures become issues inside the report, not `Err`s.

pub mod batch;
pub mod quality;
pub mod recovery;
pub mod validate;

use std::path::{Path, PathBuf};

use crate::circuit::CircuitBreaker;
use crate::config::{Config, IntegrityConfig};
use crate::error::{Issue, IssueKind, Severity, TrailError};
use crate::session_files::{list_session_ids, recovered_path, write_file};

pub use batch::{BatchReport, QualityReport, SessionHealth};
pub use quality::{Grade, QualityAssessment, QualityFactors};
pub use recovery::{RecoveryReport, RecoveryStatus, RecoveryStrategy, StrategyOutcome};
pub use validate::IntegrityReport;

pub struct IntegrityVerifier {
    session_dir: PathBuf,
    config: IntegrityConfig,
    breaker: CircuitBreaker,
    strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl IntegrityVerifier {
    pub fn new(session_dir: impl Into<PathBuf>, config: IntegrityConfig) -> Self {
        let breaker = CircuitBreaker::new(
            config.circuit_breaker_threshold,
            config.circuit_breaker_timeout(),
        );
        Self {
            session_dir: session_dir.into(),
            config,
            breaker,
            strategies: recovery::default_strategies(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.capture.session_dir.clone(), config.integrity.clone())
    }

    /// Replace the recovery chain; strategies run in the given order.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn RecoveryStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn breaker_mut(&mut self) -> &mut CircuitBreaker {
        &mut self.breaker
    }

    pub fn validate_session_integrity(&self, session_id: &str) -> IntegrityReport {
        validate::validate_session_file(&self.session_dir, session_id)
    }

    pub fn analyze_session(&mut self, session_id: &str) -> QualityAssessment {
        let dir = self.session_dir.clone();
        self.analyze_in(&dir, session_id)
    }

    fn analyze_in(&mut self, dir: &Path, session_id: &str) -> QualityAssessment {
        if self.breaker.is_open() {
            let issue = TrailError::CircuitOpen {
                operation: "quality-check",
            }
            .to_issue();
            let mut skipped = QualityAssessment::failed(session_id, vec![issue], Vec::new());
            skipped.skipped = true;
            return skipped;
        }

        let report = validate::validate_session_file(dir, session_id);
        if report.unexpected_failure {
            self.breaker.record_failure();
        } else {
            self.breaker.record_success();
        }

        let Some(doc) = report.document.as_ref() else {
            tracing::debug!(session_id, errors = report.errors.len(), "session not scorable");
            return QualityAssessment::failed(session_id, report.errors, report.warnings);
        };

        let (factors, stats, quality_warnings) =
            quality::assess(doc, self.config.consistency_sample);
        let score = factors.score();
        let mut warnings = report.warnings;
        warnings.extend(quality_warnings);
        QualityAssessment {
            session_id: session_id.to_string(),
            score,
            grade: Grade::from_score(score),
            factors,
            stats,
            errors: report.errors,
            warnings,
            skipped: false,
            analyzed_at: chrono::Utc::now(),
        }
    }

    /// Intact sessions are reported as such; otherwise the strategy chain
    /// runs and a reconstruction lands in `recovered/<id>.json`.
    pub fn attempt_session_recovery(&self, session_id: &str) -> RecoveryReport {
        let report = self.validate_session_integrity(session_id);
        if report.is_valid {
            return RecoveryReport::intact(session_id);
        }

        let mut recovery = recovery::run_strategies(&self.strategies, &self.session_dir, session_id);
        if let Some(doc) = recovery.recovered_session.as_ref() {
            let path = recovered_path(&self.session_dir, session_id);
            let written = serde_json::to_string_pretty(doc)
                .map_err(TrailError::from)
                .and_then(|text| write_file(&path, &text).map_err(TrailError::from));
            match written {
                Ok(()) => {
                    tracing::info!(session_id, status = ?recovery.status, path = %path.display(), "session recovered");
                    recovery.output_path = Some(path.display().to_string());
                }
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "failed to write recovered session");
                    recovery.errors.push(e.to_issue());
                }
            }
        } else {
            tracing::warn!(session_id, "session could not be recovered");
        }
        recovery
    }

    /// Analyze every session under `dir` in id order. Sessions that only
    /// survive as a `.json.corrupted` sibling are included.
    pub fn process_session_batch(&mut self, dir: &Path) -> BatchReport {
        let ids = match batch_session_ids(dir) {
            Ok(ids) => ids,
            Err(e) => {
                let mut report = BatchReport::empty(dir);
                report.errors.push(Issue::new(
                    IssueKind::Io,
                    Severity::Error,
                    format!("failed to list {}: {}", dir.display(), e),
                ));
                return report;
            }
        };
        let assessments: Vec<QualityAssessment> =
            ids.iter().map(|id| self.analyze_in(dir, id)).collect();
        let report = BatchReport::from_assessments(dir, assessments);
        tracing::info!(
            dir = %dir.display(),
            total = report.total_sessions,
            corrupted = report.corrupted,
            average = report.average_score,
            "batch verification finished"
        );
        report
    }

    pub fn generate_quality_report(&self, results: &[QualityAssessment]) -> QualityReport {
        batch::quality_report(results)
    }
}

fn batch_session_ids(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut ids = list_session_ids(dir)?;
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        if let Some(id) = name.to_string_lossy().strip_suffix(".json.corrupted") {
            if !id.is_empty() && !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids.sort();
    Ok(ids)
}
