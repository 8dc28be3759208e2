//! Commit classification, working-time histograms, and streaks.

use chrono::{Datelike, Days, NaiveDate, Timelike, Weekday};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::git_log::MinedCommit;
use crate::models::FileTouchCount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitCategory {
    Feature,
    Bugfix,
    Refactor,
    Docs,
    Test,
    Other,
}

impl CommitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitCategory::Feature => "feature",
            CommitCategory::Bugfix => "bugfix",
            CommitCategory::Refactor => "refactor",
            CommitCategory::Docs => "docs",
            CommitCategory::Test => "test",
            CommitCategory::Other => "other",
        }
    }
}

fn category_patterns() -> &'static [(CommitCategory, Regex)] {
    static PATTERNS: OnceLock<Vec<(CommitCategory, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                CommitCategory::Feature,
                r"(?i)\b(feat|feature|features|add|adds|added|implement\w*|introduc\w*|new)\b",
            ),
            (
                CommitCategory::Bugfix,
                r"(?i)\b(fix|fixes|fixed|bug|bugs|bugfix|issue|error|patch|resolve[sd]?|hotfix)\b",
            ),
            (
                CommitCategory::Refactor,
                r"(?i)\b(refactor\w*|restructur\w*|cleanup|clean up|simplif\w*|renam\w*|reorganiz\w*)\b",
            ),
            (CommitCategory::Docs, r"(?i)\b(docs?|readme|documentation|comments?)\b"),
            (CommitCategory::Test, r"(?i)\b(tests?|testing|specs?|coverage)\b"),
        ]
        .into_iter()
        .map(|(category, pattern)| (category, Regex::new(pattern).expect("valid regex")))
        .collect()
    })
}

/// First matching category in priority order; `Other` when nothing matches.
pub fn classify_commit(subject: &str) -> CommitCategory {
    category_patterns()
        .iter()
        .find(|(_, re)| re.is_match(subject))
        .map(|(category, _)| *category)
        .unwrap_or(CommitCategory::Other)
}

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPatterns {
    /// Commit counts indexed Monday..Sunday.
    pub by_weekday: Vec<usize>,
    /// Commit counts indexed by hour 0..23, author-local time.
    pub by_hour: Vec<usize>,
    pub peak_day: Option<String>,
    pub peak_hour: Option<u32>,
}

pub fn activity_patterns(commits: &[MinedCommit]) -> ActivityPatterns {
    let mut by_weekday = vec![0usize; 7];
    let mut by_hour = vec![0usize; 24];
    for commit in commits {
        by_weekday[commit.date.weekday().num_days_from_monday() as usize] += 1;
        by_hour[commit.date.hour() as usize] += 1;
    }
    let peak_day = peak_index(&by_weekday).map(|i| WEEKDAYS[i].to_string());
    let peak_hour = peak_index(&by_hour).map(|i| i as u32);
    ActivityPatterns {
        by_weekday,
        by_hour,
        peak_day,
        peak_hour,
    }
}

/// Index of the largest bucket; ties go to the earliest. `None` when empty.
fn peak_index(buckets: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, &count) in buckets.iter().enumerate() {
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((i, count));
        }
    }
    best.map(|(i, _)| i)
}

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[day.num_days_from_monday() as usize]
}

pub fn commit_dates(commits: &[MinedCommit]) -> BTreeSet<NaiveDate> {
    commits.iter().map(|c| c.date.date_naive()).collect()
}

/// Consecutive commit days ending today, or ending yesterday when nothing
/// has been committed yet today.
pub fn current_streak(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let start = if dates.contains(&today) {
        today
    } else {
        match today.checked_sub_days(Days::new(1)) {
            Some(yesterday) if dates.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };
    let mut streak = 0;
    let mut day = Some(start);
    while let Some(d) = day.filter(|d| dates.contains(d)) {
        streak += 1;
        day = d.pred_opt();
    }
    streak
}

pub fn longest_streak(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for &date in dates {
        run = match prev {
            Some(p) if p.succ_opt() == Some(date) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(date);
    }
    longest
}

/// Files ranked by touch count, ties broken by path.
pub fn rank_files<'a, I>(touches: I, limit: usize) -> Vec<FileTouchCount>
where
    I: IntoIterator<Item = (&'a String, &'a u64)>,
{
    let mut ranked: Vec<FileTouchCount> = touches
        .into_iter()
        .map(|(path, &changes)| FileTouchCount {
            path: path.clone(),
            changes,
        })
        .collect();
    ranked.sort_by(|a, b| b.changes.cmp(&a.changes).then_with(|| a.path.cmp(&b.path)));
    ranked.truncate(limit);
    ranked
}
