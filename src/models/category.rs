// src/models/category.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'categories' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub title: String,
    /// Stable URL identifier: slugified title plus a random 5-digit suffix.
    pub slug: String,
    pub description: String,
    /// Whether the category is listed even when it owns no published exams.
    pub show_empty: bool,
    /// Display order; lower comes first, NULL last.
    pub priority: Option<i64>,
}

/// Category list row with the count of published exams it owns.
#[derive(Debug, Serialize, FromRow)]
pub struct CategorySummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub show_empty: bool,
    pub priority: Option<i64>,
    pub exams_count: i64,
}

/// DTO for creating a category.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 300))]
    pub description: Option<String>,
    pub show_empty: Option<bool>,
    #[validate(range(min = 1, max = 99))]
    pub priority: Option<i64>,
}

/// DTO for updating a category. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCategoryRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 300))]
    pub description: Option<String>,
    pub show_empty: Option<bool>,
    #[validate(range(min = 1, max = 99))]
    pub priority: Option<i64>,
}
