//! Directory sweeps and aggregate quality reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::quality::{Grade, QualityAssessment};
use crate::error::{Issue, IssueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionHealth {
    Healthy,
    Problematic,
    Corrupted,
    NearEmpty,
    Skipped,
}

/// Classes are exclusive and checked in this order: skipped, corrupted,
/// near-empty, healthy, then problematic.
pub fn classify(assessment: &QualityAssessment) -> SessionHealth {
    if assessment.skipped {
        SessionHealth::Skipped
    } else if assessment.has_corruption() {
        SessionHealth::Corrupted
    } else if assessment.score < 0.3 {
        SessionHealth::NearEmpty
    } else if assessment.score > 0.7 {
        SessionHealth::Healthy
    } else {
        SessionHealth::Problematic
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub session_id: String,
    pub score: f64,
    pub grade: Grade,
    pub health: SessionHealth,
    pub error_count: usize,
    pub warning_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub directory: String,
    pub total_sessions: usize,
    pub analyzed: usize,
    pub healthy: usize,
    pub problematic: usize,
    pub corrupted: usize,
    pub near_empty: usize,
    pub skipped: usize,
    pub average_score: f64,
    pub sessions: Vec<BatchEntry>,
    pub recommendations: Vec<String>,
    pub errors: Vec<Issue>,
    pub processed_at: DateTime<Utc>,
    #[serde(skip)]
    pub assessments: Vec<QualityAssessment>,
}

impl BatchReport {
    pub fn empty(dir: &Path) -> Self {
        Self {
            directory: dir.display().to_string(),
            total_sessions: 0,
            analyzed: 0,
            healthy: 0,
            problematic: 0,
            corrupted: 0,
            near_empty: 0,
            skipped: 0,
            average_score: 0.0,
            sessions: Vec::new(),
            recommendations: Vec::new(),
            errors: Vec::new(),
            processed_at: Utc::now(),
            assessments: Vec::new(),
        }
    }

    /// Fold a set of assessments, already in id order, into the aggregate.
    pub fn from_assessments(dir: &Path, assessments: Vec<QualityAssessment>) -> Self {
        let mut report = Self::empty(dir);
        let mut score_sum = 0.0;
        for assessment in &assessments {
            let health = classify(assessment);
            match health {
                SessionHealth::Healthy => report.healthy += 1,
                SessionHealth::Problematic => report.problematic += 1,
                SessionHealth::Corrupted => report.corrupted += 1,
                SessionHealth::NearEmpty => report.near_empty += 1,
                SessionHealth::Skipped => report.skipped += 1,
            }
            if health != SessionHealth::Skipped {
                report.analyzed += 1;
                score_sum += assessment.score;
            }
            report.sessions.push(BatchEntry {
                session_id: assessment.session_id.clone(),
                score: assessment.score,
                grade: assessment.grade,
                health,
                error_count: assessment.errors.len(),
                warning_count: assessment.warnings.len(),
            });
        }
        report.total_sessions = assessments.len();
        if report.analyzed > 0 {
            report.average_score = score_sum / report.analyzed as f64;
        }
        report.recommendations = recommendations(&report);
        report.assessments = assessments;
        report
    }
}

fn recommendations(report: &BatchReport) -> Vec<String> {
    let mut out = Vec::new();
    if report.corrupted > 0 {
        out.push(format!(
            "{} corrupted session(s): improve the backup strategy and run recovery",
            report.corrupted
        ));
    }
    if report.analyzed > 0 && report.average_score < 0.7 {
        out.push(format!(
            "average score {:.2} is below 0.7: review the capture process",
            report.average_score
        ));
    }
    if report.near_empty > 0 {
        out.push(format!(
            "{} near-empty session(s): check that capture feeds are running",
            report.near_empty
        ));
    }
    if report.problematic > 0 {
        out.push(format!(
            "{} session(s) scored between 0.3 and 0.7: inspect their warnings",
            report.problematic
        ));
    }
    if report.skipped > 0 {
        out.push(format!(
            "{} session(s) skipped while the quality-check breaker was open: rerun later",
            report.skipped
        ));
    }
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFrequency {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub session_id: String,
    pub score: f64,
    pub grade: Grade,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub total_sessions: usize,
    pub average_score: f64,
    pub grade_distribution: BTreeMap<&'static str, usize>,
    pub common_issues: Vec<IssueFrequency>,
    pub best_sessions: Vec<ScoreEntry>,
    pub worst_sessions: Vec<ScoreEntry>,
    pub recommendations: Vec<String>,
}

const REPORT_TOP: usize = 5;
const COMMON_ISSUES: usize = 10;

pub fn quality_report(results: &[QualityAssessment]) -> QualityReport {
    let scored: Vec<&QualityAssessment> = results.iter().filter(|a| !a.skipped).collect();

    let mut grade_distribution: BTreeMap<&'static str, usize> =
        ["A", "B", "C", "D", "F"].into_iter().map(|g| (g, 0)).collect();
    for a in &scored {
        *grade_distribution.entry(a.grade.as_str()).or_insert(0) += 1;
    }

    let mut tally: HashMap<(IssueKind, &str), usize> = HashMap::new();
    for a in &scored {
        for issue in a.errors.iter().chain(a.warnings.iter()) {
            let key = issue.field.as_deref().unwrap_or(issue.message.as_str());
            *tally.entry((issue.kind, key)).or_insert(0) += 1;
        }
    }
    let mut common_issues: Vec<IssueFrequency> = tally
        .into_iter()
        .map(|((kind, key), count)| IssueFrequency {
            kind,
            message: key.to_string(),
            count,
        })
        .collect();
    common_issues.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
    common_issues.truncate(COMMON_ISSUES);

    let mut ranked: Vec<ScoreEntry> = scored
        .iter()
        .map(|a| ScoreEntry {
            session_id: a.session_id.clone(),
            score: a.score,
            grade: a.grade,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
    let best_sessions: Vec<ScoreEntry> = ranked.iter().take(REPORT_TOP).cloned().collect();
    let worst_sessions: Vec<ScoreEntry> = ranked.iter().rev().take(REPORT_TOP).cloned().collect();

    let average_score = if scored.is_empty() {
        0.0
    } else {
        scored.iter().map(|a| a.score).sum::<f64>() / scored.len() as f64
    };

    let mut recommendations = Vec::new();
    let failing = grade_distribution.get("F").copied().unwrap_or(0);
    if failing > 0 {
        recommendations.push(format!("{} session(s) graded F: run integrity recover", failing));
    }
    if !scored.is_empty() && average_score < 0.7 {
        recommendations.push(format!(
            "average score {:.2} is below 0.7: review the capture process",
            average_score
        ));
    }
    if let Some(top) = common_issues.first() {
        recommendations.push(format!(
            "most common issue ({} occurrences): {}",
            top.count, top.message
        ));
    }

    QualityReport {
        generated_at: Utc::now(),
        total_sessions: scored.len(),
        average_score,
        grade_distribution,
        common_issues,
        best_sessions,
        worst_sessions,
        recommendations,
    }
}
