// src/models/progress.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'progress' table: one user's attempt at one exam.
///
/// `stage` is a 1-based pointer into the ordered active+visible question
/// sequence. `passed` is tri-state: NULL while in progress, then the
/// finalization verdict. `exam_revision` snapshots the exam's revision at
/// creation; a mismatch with the current revision marks the attempt stale.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Progress {
    pub id: i64,
    pub user_id: i64,
    pub exam_id: i64,
    pub exam_revision: i64,
    /// Title snapshot so history survives exam deletion/rename.
    pub exam_title: String,
    pub stage: i64,
    pub answers_quantity: i64,
    pub started: chrono::DateTime<chrono::Utc>,
    pub finished: Option<chrono::DateTime<chrono::Utc>>,
    pub passed: Option<bool>,
    /// Opaque share token for unauthenticated result viewing.
    #[serde(skip)]
    pub guest_key: String,
}

impl Progress {
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }
}

/// Represents the 'user_answers' table: one graded submission for one
/// question within an attempt. Immutable once created.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserAnswer {
    pub id: i64,
    pub progress_id: i64,
    /// Weak reference: survives question deletion.
    pub question_id: Option<i64>,
    pub question_text: Option<String>,
    pub correct: Option<bool>,
    /// Set when a many_correct question was submitted empty under the
    /// permissive empty_answers policy.
    pub no_answers: Option<bool>,
    pub date: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'user_variants' table: the per-variant snapshot recorded
/// with each answer. `variant_text` is denormalized at write time so later
/// content edits don't corrupt history.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserVariant {
    pub id: i64,
    pub answer_id: i64,
    pub variant_id: Option<i64>,
    pub variant_text: Option<String>,
    /// The user chose this variant.
    pub selected: bool,
    /// This variant was a right choice.
    pub correct: bool,
}

/// Represents the 'user_sprints' table: a user's participation in a sprint.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserSprint {
    pub id: i64,
    pub user_id: i64,
    pub sprint_id: i64,
    pub started: chrono::DateTime<chrono::Utc>,
    /// Stamped when the last exam of the sprint is passed.
    pub finished: Option<chrono::DateTime<chrono::Utc>>,
}

/// One recorded variant row in the progress detail response.
#[derive(Debug, Serialize, FromRow)]
pub struct UserVariantView {
    pub variant_text: Option<String>,
    pub selected: bool,
    pub correct: bool,
}

/// One graded answer with its variant snapshot, as shown on the results
/// page.
#[derive(Debug, Serialize)]
pub struct AnswerDetail {
    pub question_text: Option<String>,
    pub correct: Option<bool>,
    pub no_answers: Option<bool>,
    pub variants: Vec<UserVariantView>,
}

/// Full results page payload for one attempt.
#[derive(Debug, Serialize)]
pub struct ProgressDetailResponse {
    pub id: i64,
    pub exam_title: String,
    pub exam_slug: Option<String>,
    pub started: chrono::DateTime<chrono::Utc>,
    pub finished: Option<chrono::DateTime<chrono::Utc>>,
    pub passed: Option<bool>,
    pub stage: i64,
    pub answers_quantity: i64,
    pub questions_count: i64,
    pub correct_count: i64,
    /// NULL when the exam has no active questions (undefined percentage).
    pub correct_percentage: Option<i64>,
    /// Exam's configured message, included only for passed attempts.
    pub success_message: Option<String>,
    /// Per-answer breakdown; omitted when the exam hides results.
    pub answers: Option<Vec<AnswerDetail>>,
}
