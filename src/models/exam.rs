// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'exams' table in the database.
///
/// `active` is a derived flag maintained by the activation engine; authors
/// only control `visibility`. An exam is active iff it owns at least one
/// question that is both active and visible.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,

    /// Monotonic content revision. Bumped on qualifying question/variant
    /// edits while the exam is published; compared by equality only to
    /// detect stale in-flight attempts.
    pub revision: i64,

    pub title: String,
    pub slug: String,

    /// Sanitized rich-text description.
    pub description: String,

    /// Shown on the results page after a finished attempt.
    pub success_message: Option<String>,

    /// Nulled if the author account is deleted.
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,

    /// Optional sequence membership; exams in a sprint may gate each other.
    pub sprint_id: Option<i64>,

    /// Ordering inside a sprint; lower comes first, NULL last.
    pub priority: Option<i64>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Opt-in: bump `revision` when questions or variants change.
    pub change_revision: bool,

    /// Time limit in minutes; evaluated lazily at final submission.
    pub timer: Option<i64>,

    /// Pass threshold in percent; no threshold means any score passes.
    pub required_percent: Option<i64>,

    pub allow_retesting: bool,

    /// Show per-stage feedback and the detailed results page.
    pub show_results: bool,

    /// Shuffle variant display order. Grading always uses canonical order.
    pub shuffle_variants: bool,

    /// Allow blank submissions for many_correct questions.
    pub empty_answers: bool,

    pub active: bool,
    pub visibility: bool,
}

/// Represents the 'sprints' table: an ordered chain of exams.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Sprint {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    /// When false, each exam unlocks only after the previous one is passed.
    pub any_order: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Exam list row for the catalog endpoints.
#[derive(Debug, Serialize, FromRow)]
pub struct ExamSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub category_title: Option<String>,
    pub sprint_title: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub questions_count: i64,
}

/// Requesting user's latest attempt, embedded in the exam detail response.
#[derive(Debug, Serialize, FromRow)]
pub struct ProgressSummary {
    pub id: i64,
    pub stage: i64,
    pub answers_quantity: i64,
    pub started: chrono::DateTime<chrono::Utc>,
    pub finished: Option<chrono::DateTime<chrono::Utc>>,
    pub passed: Option<bool>,
}

/// Exam detail response.
#[derive(Debug, Serialize)]
pub struct ExamDetailResponse {
    #[serde(flatten)]
    pub exam: ExamView,
    pub questions_count: i64,
    /// Present only for authenticated callers with at least one attempt.
    pub progress: Option<ProgressSummary>,
    /// False when the previous exam of an ordered sprint is not passed yet.
    pub previous_exam_passed: bool,
}

/// Public projection of an exam (derived/authored flags included, internal
/// bookkeeping like `change_revision` excluded).
#[derive(Debug, Serialize, FromRow)]
pub struct ExamView {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub category_title: Option<String>,
    pub sprint_slug: Option<String>,
    pub timer: Option<i64>,
    pub required_percent: Option<i64>,
    pub allow_retesting: bool,
    pub show_results: bool,
}

/// DTO for creating an exam.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub success_message: Option<String>,
    pub category_id: Option<i64>,
    pub sprint_id: Option<i64>,
    #[validate(range(min = 1, max = 99))]
    pub priority: Option<i64>,
    pub change_revision: Option<bool>,
    #[validate(range(min = 1, max = 720))]
    pub timer: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub required_percent: Option<i64>,
    pub allow_retesting: Option<bool>,
    pub show_results: Option<bool>,
    pub shuffle_variants: Option<bool>,
    pub empty_answers: Option<bool>,
    pub visibility: Option<bool>,
}

/// Wraps a present field (including an explicit `null`) in the outer
/// `Some`, so a double-Option field can tell "absent" from "null".
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::deserialize(deserializer).map(Some)
}

/// DTO for updating an exam. Absent fields keep their stored value; the
/// nullable columns use a double Option so an explicit JSON `null` clears
/// the stored value instead of being indistinguishable from "absent".
/// Range limits on the double-Option fields are checked in the handler.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub success_message: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub sprint_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub priority: Option<Option<i64>>,
    pub change_revision: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub timer: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub required_percent: Option<Option<i64>>,
    pub allow_retesting: Option<bool>,
    pub show_results: Option<bool>,
    pub shuffle_variants: Option<bool>,
    pub empty_answers: Option<bool>,
    pub visibility: Option<bool>,
}

/// DTO for creating a sprint.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSprintRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub any_order: Option<bool>,
}
