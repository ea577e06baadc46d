// src/handlers/catalog.rs
//
// Read-only listing endpoints. These are thin collaborators of the attempt
// engine: everything here filters to published content (active AND visible)
// and never mutates state.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    attempt,
    config::Config,
    error::AppError,
    models::{
        category::CategorySummary,
        exam::{Exam, ExamDetailResponse, ExamSummary, ExamView, ProgressSummary, Sprint},
    },
    utils::jwt::claims_from_headers,
};

/// Lists categories with their published exam counts.
///
/// Categories that opted out of `show_empty` are hidden while they own no
/// published exams.
pub async fn list_categories(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let categories = sqlx::query_as::<_, CategorySummary>(
        r#"
        SELECT c.id, c.title, c.slug, c.description, c.show_empty, c.priority,
               (SELECT COUNT(*) FROM exams e
                WHERE e.category_id = c.id AND e.active = 1 AND e.visibility = 1
               ) AS exams_count
        FROM categories c
        WHERE c.show_empty = 1
           OR EXISTS(SELECT 1 FROM exams e
                     WHERE e.category_id = c.id AND e.active = 1 AND e.visibility = 1)
        ORDER BY c.priority IS NULL, c.priority, c.title
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(categories))
}

/// Lists sprints, newest first.
pub async fn list_sprints(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let sprints = sqlx::query_as::<_, Sprint>(
        r#"
        SELECT id, title, slug, description, any_order, created_at
        FROM sprints
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(sprints))
}

/// A sprint with its published exams in traversal order.
pub async fn sprint_detail(
    State(pool): State<SqlitePool>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let sprint = sqlx::query_as::<_, Sprint>(
        "SELECT id, title, slug, description, any_order, created_at FROM sprints WHERE slug = ?",
    )
    .bind(&slug)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Sprint not found".to_string()))?;

    let exams = sqlx::query_as::<_, ExamSummary>(
        r#"
        SELECT e.id, e.title, e.slug,
               c.title AS category_title,
               s.title AS sprint_title,
               e.created_at,
               (SELECT COUNT(*) FROM questions q
                WHERE q.exam_id = e.id AND q.active = 1 AND q.visibility = 1
               ) AS questions_count
        FROM exams e
        LEFT JOIN categories c ON c.id = e.category_id
        LEFT JOIN sprints s ON s.id = e.sprint_id
        WHERE e.sprint_id = ? AND e.active = 1 AND e.visibility = 1
        ORDER BY e.priority IS NULL, e.priority, e.created_at, e.id
        "#,
    )
    .bind(sprint.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(serde_json::json!({
        "sprint": sprint,
        "exams": exams,
    })))
}

/// Query parameters for listing exams.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Category slug filter.
    pub category: Option<String>,
    /// Title substring search.
    pub q: Option<String>,
}

/// Lists published exams, optionally filtered by category and search
/// keyword, newest first.
pub async fn list_exams(
    State(pool): State<SqlitePool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let search_pattern = params.q.map(|k| format!("%{}%", k));

    let exams = sqlx::query_as::<_, ExamSummary>(
        r#"
        SELECT e.id, e.title, e.slug,
               c.title AS category_title,
               s.title AS sprint_title,
               e.created_at,
               (SELECT COUNT(*) FROM questions q
                WHERE q.exam_id = e.id AND q.active = 1 AND q.visibility = 1
               ) AS questions_count
        FROM exams e
        LEFT JOIN categories c ON c.id = e.category_id
        LEFT JOIN sprints s ON s.id = e.sprint_id
        WHERE e.active = 1 AND e.visibility = 1
          AND (? IS NULL OR c.slug = ?)
          AND (? IS NULL OR e.title LIKE ?)
        ORDER BY e.created_at DESC, e.id DESC
        "#,
    )
    .bind(&params.category)
    .bind(&params.category)
    .bind(&search_pattern)
    .bind(&search_pattern)
    .fetch_all(&pool)
    .await?;

    Ok(Json(exams))
}

/// Fetches a published exam by slug, or 404. Takes any executor so the
/// process route can call it inside its transaction.
pub async fn fetch_published_exam(
    executor: impl sqlx::SqliteExecutor<'_>,
    slug: &str,
) -> Result<Exam, AppError> {
    sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, revision, title, slug, description, success_message,
               author_id, category_id, sprint_id, priority, created_at,
               change_revision, timer, required_percent, allow_retesting,
               show_results, shuffle_variants, empty_answers, active, visibility
        FROM exams
        WHERE slug = ? AND active = 1 AND visibility = 1
        "#,
    )
    .bind(slug)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))
}

/// Exam detail page data.
///
/// Public route; when the caller presents a valid bearer token the response
/// additionally carries their latest attempt and, for ordered sprints, the
/// unlock state derived from the previous exam.
pub async fn exam_detail(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let exam = fetch_published_exam(&pool, &slug).await?;

    let category_title: Option<String> = match exam.category_id {
        Some(id) => {
            sqlx::query_scalar("SELECT title FROM categories WHERE id = ?")
                .bind(id)
                .fetch_optional(&pool)
                .await?
        }
        None => None,
    };

    let sprint: Option<Sprint> = match exam.sprint_id {
        Some(id) => {
            sqlx::query_as::<_, Sprint>(
                "SELECT id, title, slug, description, any_order, created_at FROM sprints WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&pool)
            .await?
        }
        None => None,
    };

    let questions_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM questions WHERE exam_id = ? AND active = 1 AND visibility = 1",
    )
    .bind(exam.id)
    .fetch_one(&pool)
    .await?;

    let claims = claims_from_headers(&headers, &config.jwt_secret);

    let mut progress: Option<ProgressSummary> = None;
    let mut previous_exam_passed = true;

    if let Some(claims) = &claims {
        let user_id = claims.user_id();

        progress = sqlx::query_as::<_, ProgressSummary>(
            r#"
            SELECT id, stage, answers_quantity, started, finished, passed
            FROM progress
            WHERE user_id = ? AND exam_id = ?
            ORDER BY started DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(exam.id)
        .fetch_optional(&pool)
        .await?;

        // First-time visitors to an ordered sprint see whether this exam is
        // unlocked yet.
        if progress.is_none() {
            if let Some(sprint) = &sprint {
                if !sprint.any_order {
                    let mut conn = pool.acquire().await?;
                    if let Some(previous_id) =
                        attempt::previous_exam_in_sprint(&mut conn, &exam).await?
                    {
                        previous_exam_passed =
                            attempt::has_passed(&mut conn, user_id, previous_id).await?;
                    }
                }
            }
        }
    }

    let view = ExamView {
        id: exam.id,
        title: exam.title,
        slug: exam.slug,
        description: exam.description,
        category_title,
        sprint_slug: sprint.map(|s| s.slug),
        timer: exam.timer,
        required_percent: exam.required_percent,
        allow_retesting: exam.allow_retesting,
        show_results: exam.show_results,
    };

    Ok(Json(ExamDetailResponse {
        exam: view,
        questions_count,
        progress,
        previous_exam_passed,
    }))
}
