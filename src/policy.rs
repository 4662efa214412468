//! Publication rules: when a question becomes visible, and when it counts as new.

use chrono::{DateTime, Duration, Utc};

use crate::model::db::question::QuestionCore;

/// How far back a publication date may lie and still count as recent.
pub fn recent_window() -> Duration {
    Duration::days(1)
}

/// Is the question visible to the public at `now`?
pub fn is_published(question: &QuestionCore, now: DateTime<Utc>) -> bool {
    question.pub_date <= now
}

/// Was the question published within [`recent_window`] of `now`?
/// Both ends of the window are inclusive; future questions are never recent.
pub fn was_published_recently(question: &QuestionCore, now: DateTime<Utc>) -> bool {
    now - recent_window() <= question.pub_date && is_published(question, now)
}
