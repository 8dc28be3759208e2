//! Five-factor quality score for a parsed session document.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::validate::parse_timestamp;
use crate::error::{Issue, IssueKind, Severity};

pub const COMPLETENESS_WEIGHT: f64 = 0.30;
pub const CONSISTENCY_WEIGHT: f64 = 0.20;
pub const ACTIVITY_WEIGHT: f64 = 0.25;
pub const RESOLUTION_WEIGHT: f64 = 0.15;
pub const STRUCTURE_WEIGHT: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Grade::A
        } else if score >= 0.8 {
            Grade::B
        } else if score >= 0.7 {
            Grade::C
        } else if score >= 0.6 {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityFactors {
    pub completeness: f64,
    pub consistency: f64,
    pub activity_level: f64,
    pub problem_resolution: f64,
    pub structural_integrity: f64,
}

impl QualityFactors {
    pub fn score(&self) -> f64 {
        let total = self.completeness * COMPLETENESS_WEIGHT
            + self.consistency * CONSISTENCY_WEIGHT
            + self.activity_level * ACTIVITY_WEIGHT
            + self.problem_resolution * RESOLUTION_WEIGHT
            + self.structural_integrity * STRUCTURE_WEIGHT;
        total.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub activities: usize,
    pub file_changes: usize,
    pub commits: usize,
    pub problems: usize,
    pub solutions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAssessment {
    pub session_id: String,
    pub score: f64,
    pub grade: Grade,
    pub factors: QualityFactors,
    pub stats: SessionStats,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    /// True when the quality-check breaker was open and nothing was read.
    pub skipped: bool,
    pub analyzed_at: DateTime<Utc>,
}

impl QualityAssessment {
    /// Zero-score record carrying the reasons it could not be scored.
    pub fn failed(session_id: &str, errors: Vec<Issue>, warnings: Vec<Issue>) -> Self {
        Self {
            session_id: session_id.to_string(),
            score: 0.0,
            grade: Grade::F,
            factors: QualityFactors::default(),
            stats: SessionStats::default(),
            errors,
            warnings,
            skipped: false,
            analyzed_at: Utc::now(),
        }
    }

    pub fn has_corruption(&self) -> bool {
        self.errors.iter().any(Issue::is_corruption)
    }
}

/// Score `doc`, returning the factors, stats, and any quality warnings.
pub fn assess(doc: &Value, sample: usize) -> (QualityFactors, SessionStats, Vec<Issue>) {
    let mut warnings = Vec::new();
    let activities = array(doc, "activities");
    let stats = SessionStats {
        activities: activities.len(),
        file_changes: array(doc, "fileChanges").len(),
        commits: array(doc, "gitCommits").len(),
        problems: array(doc, "problems").len(),
        solutions: array(doc, "solutions").len(),
    };

    let factors = QualityFactors {
        completeness: completeness(doc),
        consistency: consistency(activities, sample, &mut warnings),
        activity_level: activity_level(stats.activities),
        problem_resolution: problem_resolution(stats.problems, stats.solutions),
        structural_integrity: structural_integrity(doc, &mut warnings),
    };
    (factors, stats, warnings)
}

fn array<'a>(doc: &'a Value, field: &str) -> &'a [Value] {
    doc.get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn completeness(doc: &Value) -> f64 {
    let mut score = 0.0;
    if doc
        .get("sessionId")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
    {
        score += 0.2;
    }
    for field in ["start", "lastUpdate"] {
        if doc.get(field).and_then(Value::as_str).is_some() {
            score += 0.1;
        }
    }
    if !array(doc, "activities").is_empty() {
        score += 0.3;
    }
    if !array(doc, "fileChanges").is_empty() {
        score += 0.3;
    }
    score
}

/// Fraction of sampled activities carrying a parseable timestamp. Large
/// sessions are sampled at an even stride.
pub fn consistency(activities: &[Value], sample: usize, warnings: &mut Vec<Issue>) -> f64 {
    if activities.is_empty() {
        return 1.0;
    }
    let stride = if sample == 0 || activities.len() <= sample {
        1
    } else {
        activities.len().div_ceil(sample)
    };
    let sampled: Vec<&Value> = activities.iter().step_by(stride).collect();
    let stamped = sampled
        .iter()
        .filter(|a| {
            a.get("timestamp")
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .is_some()
        })
        .count();
    let missing = sampled.len() - stamped;
    if missing > 0 {
        warnings.push(
            Issue::new(
                IssueKind::Validation,
                Severity::Warning,
                format!(
                    "{} of {} sampled activities have no timestamp",
                    missing,
                    sampled.len()
                ),
            )
            .with_field("activities"),
        );
    }
    stamped as f64 / sampled.len() as f64
}

pub fn activity_level(count: usize) -> f64 {
    match count {
        0 => 0.0,
        1..=4 => 0.3,
        5..=19 => 0.6,
        20..=49 => 0.8,
        _ => 1.0,
    }
}

pub fn problem_resolution(problems: usize, solutions: usize) -> f64 {
    if problems == 0 {
        return if solutions > 0 { 0.8 } else { 0.5 };
    }
    (solutions as f64 / problems as f64).min(1.0)
}

const COUNT_FIELDS: [(&str, &str); 7] = [
    ("activityCount", "activities"),
    ("fileChangeCount", "fileChanges"),
    ("commitCount", "gitCommits"),
    ("commandCount", "commands"),
    ("decisionCount", "decisions"),
    ("problemCount", "problems"),
    ("solutionCount", "solutions"),
];

/// Share of recorded metadata counts that match their array lengths.
pub fn structural_integrity(doc: &Value, warnings: &mut Vec<Issue>) -> f64 {
    let Some(metadata) = doc.get("metadata").and_then(Value::as_object) else {
        return 0.5;
    };
    let mut checked = 0usize;
    let mut matched = 0usize;
    for (count_field, list_field) in COUNT_FIELDS {
        let Some(recorded) = metadata.get(count_field).and_then(Value::as_u64) else {
            continue;
        };
        checked += 1;
        let actual = array(doc, list_field).len() as u64;
        if recorded == actual {
            matched += 1;
        } else {
            warnings.push(
                Issue::new(
                    IssueKind::Corruption,
                    Severity::Warning,
                    format!(
                        "metadata.{} is {} but {} has {} entries",
                        count_field, recorded, list_field, actual
                    ),
                )
                .with_field(list_field),
            );
        }
    }
    if checked == 0 {
        return 0.5;
    }
    matched as f64 / checked as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity(i: usize) -> Value {
        json!({"type": "command", "command": format!("cmd {}", i), "timestamp": "2026-10-01T10:00:00Z"})
    }

    #[test]
    fn empty_session_gets_low_grade() {
        let doc = json!({
            "sessionId": "s1",
            "start": "2026-10-01T10:00:00Z",
            "lastUpdate": "2026-10-01T10:00:00Z",
            "activities": [], "fileChanges": [], "gitCommits": [], "commands": [],
            "decisions": [], "problems": [], "solutions": [],
            "metadata": {"activityCount": 0, "fileChangeCount": 0}
        });
        let (factors, stats, _) = assess(&doc, 100);
        assert!((factors.completeness - 0.4).abs() < 1e-9);
        assert_eq!(factors.activity_level, 0.0);
        assert_eq!(stats.activities, 0);
        let grade = Grade::from_score(factors.score());
        assert!(grade >= Grade::C, "got {:?}", grade);
    }

    #[test]
    fn rich_session_scores_well() {
        let activities: Vec<Value> = (0..60).map(activity).collect();
        let doc = json!({
            "sessionId": "s2",
            "start": "2026-10-01T10:00:00Z",
            "lastUpdate": "2026-10-01T12:00:00Z",
            "activities": activities,
            "fileChanges": [{"path": "a.rs"}],
            "problems": [{"id": "p"}],
            "solutions": [{"id": "s"}],
            "metadata": {"activityCount": 60, "fileChangeCount": 1, "problemCount": 1, "solutionCount": 1}
        });
        let (factors, _, warnings) = assess(&doc, 100);
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert!((factors.score() - 1.0).abs() < 1e-9);
        assert_eq!(Grade::from_score(factors.score()), Grade::A);
    }

    #[test]
    fn activity_steps() {
        assert_eq!(activity_level(0), 0.0);
        assert_eq!(activity_level(4), 0.3);
        assert_eq!(activity_level(5), 0.6);
        assert_eq!(activity_level(19), 0.6);
        assert_eq!(activity_level(20), 0.8);
        assert_eq!(activity_level(50), 1.0);
    }

    #[test]
    fn resolution_ratio() {
        assert_eq!(problem_resolution(0, 0), 0.5);
        assert_eq!(problem_resolution(0, 2), 0.8);
        assert_eq!(problem_resolution(4, 1), 0.25);
        assert_eq!(problem_resolution(1, 3), 1.0);
    }

    #[test]
    fn missing_timestamps_lower_consistency() {
        let acts = vec![activity(0), json!({"type": "command"})];
        let mut warnings = Vec::new();
        assert_eq!(consistency(&acts, 100, &mut warnings), 0.5);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn sampling_covers_large_sessions() {
        let acts: Vec<Value> = (0..1000).map(activity).collect();
        let mut warnings = Vec::new();
        assert_eq!(consistency(&acts, 100, &mut warnings), 1.0);
    }

    #[test]
    fn count_mismatch_is_reported() {
        let doc = json!({
            "activities": [activity(0)],
            "metadata": {"activityCount": 3, "problemCount": 0}
        });
        let mut warnings = Vec::new();
        assert_eq!(structural_integrity(&doc, &mut warnings), 0.5);
        assert_eq!(warnings[0].field.as_deref(), Some("activities"));
        assert_eq!(structural_integrity(&json!({}), &mut Vec::new()), 0.5);
    }

    #[test]
    fn grades_are_monotonic() {
        let mut last = Grade::A;
        for step in (0..=100).rev() {
            let grade = Grade::from_score(step as f64 / 100.0);
            assert!(grade >= last);
            last = grade;
        }
    }
}
