// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Question kind, stored as TEXT in the 'kind' column.
///
/// Each kind carries different activation and grading rules; the evaluator
/// dispatches exhaustively over this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Exactly one variant is the right answer (radio buttons).
    OneCorrect,
    /// A set of variants must be matched exactly (checkboxes).
    ManyCorrect,
    /// Free text compared case-insensitively against reference variants.
    TextAnswer,
}

/// Represents the 'questions' table in the database.
///
/// `active` is derived from the question's variants by the activation
/// engine; authors only control `visibility`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub exam_id: i64,
    pub text: String,
    /// Shown after answering this question when the exam displays results.
    pub success_message: Option<String>,
    /// Ordering within the exam; ties broken by id.
    pub priority: Option<i64>,
    pub kind: QuestionKind,
    pub active: bool,
    pub visibility: bool,
}

/// Represents the 'variants' table in the database.
///
/// For text_answer questions a variant flagged correct holds the reference
/// answer string instead of a selectable option.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Variant {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub priority: Option<i64>,
    pub correct: bool,
}

/// Variant as rendered into the answer form: the correct flag stays hidden.
#[derive(Debug, Serialize)]
pub struct VariantOption {
    pub id: i64,
    pub text: String,
}

/// DTO for creating a question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub exam_id: i64,
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    pub success_message: Option<String>,
    #[validate(range(min = 1, max = 99))]
    pub priority: Option<i64>,
    pub kind: QuestionKind,
    pub visibility: Option<bool>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: Option<String>,
    pub success_message: Option<String>,
    #[validate(range(min = 1, max = 99))]
    pub priority: Option<i64>,
    pub kind: Option<QuestionKind>,
    pub visibility: Option<bool>,
}

/// DTO for creating a variant.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateVariantRequest {
    pub question_id: i64,
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[validate(range(min = 1, max = 99))]
    pub priority: Option<i64>,
    pub correct: Option<bool>,
}

/// DTO for updating a variant. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateVariantRequest {
    #[validate(length(min = 1, max = 500))]
    pub text: Option<String>,
    #[validate(range(min = 1, max = 99))]
    pub priority: Option<i64>,
    pub correct: Option<bool>,
}
