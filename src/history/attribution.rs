//! Best-effort project attribution and the additive unified history.
//!
//! Attribution is a keyword heuristic and never claims certainty: the
//! strongest confidence it reports is `medium`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::patterns::rank_files;
use crate::config::ProjectRule;
use crate::models::FileTouchCount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    None,
    Low,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub project: Option<String>,
    pub confidence: Confidence,
    pub matched_keywords: Vec<String>,
}

/// Pick the rule with the most distinct keyword hits in `text`. Ties go to
/// the rule listed first.
pub fn attribute(text: &str, rules: &[ProjectRule]) -> Attribution {
    let haystack = text.to_lowercase();
    let mut best: Option<(&ProjectRule, Vec<String>)> = None;
    for rule in rules {
        let hits: Vec<String> = rule
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty() && haystack.contains(k.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if hits.is_empty() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, b)| hits.len() > b.len()) {
            best = Some((rule, hits));
        }
    }
    match best {
        Some((rule, hits)) => Attribution {
            project: Some(rule.name.clone()),
            confidence: if hits.len() >= 2 {
                Confidence::Medium
            } else {
                Confidence::Low
            },
            matched_keywords: hits,
        },
        None => Attribution {
            project: None,
            confidence: Confidence::None,
            matched_keywords: Vec::new(),
        },
    }
}

/// Technology keywords that appear as whole words in `text`.
pub fn technologies_in<'a>(text: &str, keywords: &'a [String]) -> Vec<&'a str> {
    let words: HashSet<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    keywords
        .iter()
        .filter(|k| words.contains(&k.to_lowercase()))
        .map(String::as_str)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub source: String,
    pub kind: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub name: String,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub commits: usize,
    pub sessions: usize,
    pub documents: usize,
    pub commands: usize,
    pub keywords: BTreeSet<String>,
}

impl ProjectRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn seen_at(&mut self, at: DateTime<Utc>) {
        self.first_seen = Some(self.first_seen.map_or(at, |f| f.min(at)));
        self.last_seen = Some(self.last_seen.map_or(at, |l| l.max(at)));
    }

    /// Shallow combine: counters add, the seen window widens.
    pub fn combine(&mut self, other: &ProjectRecord) {
        self.commits += other.commits;
        self.sessions += other.sessions;
        self.documents += other.documents;
        self.commands += other.commands;
        self.keywords.extend(other.keywords.iter().cloned());
        if let Some(f) = other.first_seen {
            self.seen_at(f);
        }
        if let Some(l) = other.last_seen {
            self.seen_at(l);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub source: String,
    pub items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// History merged from every source. All merges are additive.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedHistory {
    pub timeline: BTreeMap<NaiveDate, Vec<TimelineEvent>>,
    pub developers: BTreeMap<String, usize>,
    pub technologies: BTreeMap<String, usize>,
    pub file_touches: BTreeMap<String, u64>,
    pub projects: BTreeMap<String, ProjectRecord>,
    pub sources: Vec<SourceStatus>,
}

impl UnifiedHistory {
    pub fn add_event(&mut self, date: NaiveDate, event: TimelineEvent) {
        let day = self.timeline.entry(date).or_default();
        if !day.contains(&event) {
            day.push(event);
        }
    }

    pub fn count_developer(&mut self, name: &str, n: usize) {
        *self.developers.entry(name.to_string()).or_insert(0) += n;
    }

    pub fn count_technologies(&mut self, text: &str, keywords: &[String]) {
        for tech in technologies_in(text, keywords) {
            *self.technologies.entry(tech.to_string()).or_insert(0) += 1;
        }
    }

    pub fn touch_file(&mut self, path: &str, n: u64) {
        *self.file_touches.entry(path.to_string()).or_insert(0) += n;
    }

    /// Record an attributed item against its project, if any.
    pub fn credit_project(
        &mut self,
        attribution: &Attribution,
        at: Option<DateTime<Utc>>,
        apply: impl FnOnce(&mut ProjectRecord),
    ) {
        let Some(name) = attribution.project.as_deref() else {
            return;
        };
        let record = self
            .projects
            .entry(name.to_string())
            .or_insert_with(|| ProjectRecord::new(name));
        record
            .keywords
            .extend(attribution.matched_keywords.iter().cloned());
        if let Some(at) = at {
            record.seen_at(at);
        }
        apply(record);
    }

    pub fn merge(&mut self, other: UnifiedHistory) {
        for (date, events) in other.timeline {
            for event in events {
                self.add_event(date, event);
            }
        }
        for (name, n) in other.developers {
            *self.developers.entry(name).or_insert(0) += n;
        }
        for (tech, n) in other.technologies {
            *self.technologies.entry(tech).or_insert(0) += n;
        }
        for (path, n) in other.file_touches {
            *self.file_touches.entry(path).or_insert(0) += n;
        }
        for (name, record) in other.projects {
            self.projects
                .entry(name.clone())
                .or_insert_with(|| ProjectRecord::new(&name))
                .combine(&record);
        }
        self.sources.extend(other.sources);
    }

    pub fn top_files(&self, limit: usize) -> Vec<FileTouchCount> {
        rank_files(&self.file_touches, limit)
    }

    pub fn event_count(&self) -> usize {
        self.timeline.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rules() -> Vec<ProjectRule> {
        vec![
            ProjectRule {
                name: "checkout".into(),
                keywords: vec!["payment".into(), "stripe".into(), "cart".into()],
            },
            ProjectRule {
                name: "donations".into(),
                keywords: vec!["donation".into(), "payment".into()],
            },
        ]
    }

    #[test]
    fn most_hits_wins_and_ties_go_first() {
        let a = attribute("Stripe payment webhook", &rules());
        assert_eq!(a.project.as_deref(), Some("checkout"));
        assert_eq!(a.confidence, Confidence::Medium);
        assert_eq!(a.matched_keywords, vec!["payment", "stripe"]);

        let tie = attribute("payment form", &rules());
        assert_eq!(tie.project.as_deref(), Some("checkout"));
        assert_eq!(tie.confidence, Confidence::Low);

        let donation = attribute("donation payment receipt", &rules());
        assert_eq!(donation.project.as_deref(), Some("donations"));

        assert_eq!(attribute("unrelated", &rules()).confidence, Confidence::None);
    }

    #[test]
    fn technologies_match_whole_words() {
        let keywords = vec!["rust".to_string(), "node".to_string()];
        assert_eq!(technologies_in("Rust service, trusted", &keywords), vec!["rust"]);
        assert!(technologies_in("nodes", &keywords).is_empty());
    }

    #[test]
    fn merge_is_additive() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let event = |summary: &str| TimelineEvent {
            source: "git".into(),
            kind: "commit".into(),
            summary: summary.into(),
            reference: None,
            project: None,
        };

        let mut git = UnifiedHistory::default();
        git.touch_file("src/app.js", 5);
        git.touch_file("src/util.js", 6);
        git.count_developer("ada", 2);
        git.add_event(day, event("feat: cart"));

        let mut sessions = UnifiedHistory::default();
        sessions.touch_file("src/app.js", 3);
        sessions.count_developer("ada", 1);
        sessions.add_event(day, event("feat: cart"));
        sessions.add_event(day, event("fix: totals"));

        git.merge(sessions);
        assert_eq!(git.top_files(1)[0].path, "src/app.js");
        assert_eq!(git.file_touches["src/app.js"], 8);
        assert_eq!(git.developers["ada"], 3);
        assert_eq!(git.timeline[&day].len(), 2);
    }

    #[test]
    fn project_windows_widen() {
        let t1: DateTime<Utc> = "2026-10-01T10:00:00Z".parse().unwrap();
        let t2: DateTime<Utc> = "2026-10-05T10:00:00Z".parse().unwrap();
        let mut a = ProjectRecord::new("checkout");
        a.seen_at(t2);
        a.commits = 2;
        let mut b = ProjectRecord::new("checkout");
        b.seen_at(t1);
        b.sessions = 1;
        a.combine(&b);
        assert_eq!((a.first_seen, a.last_seen), (Some(t1), Some(t2)));
        assert_eq!((a.commits, a.sessions), (2, 1));
    }
}
