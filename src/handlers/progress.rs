// src/handlers/progress.rs

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
        exam::Exam,
        progress::{AnswerDetail, Progress, ProgressDetailResponse, UserVariantView},
    },
    utils::jwt::claims_from_headers,
};

/// Query parameters for the progress detail route.
#[derive(Debug, Deserialize)]
pub struct DetailParams {
    /// Guest share key for unauthenticated result viewing.
    pub key: Option<String>,
}

#[derive(sqlx::FromRow)]
struct AnswerRow {
    id: i64,
    question_text: Option<String>,
    correct: Option<bool>,
    no_answers: Option<bool>,
}

/// Results page for one attempt.
///
/// Visible to the attempt's owner, admins, and anyone presenting the
/// attempt's guest key.
pub async fn progress_detail(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(params): Query<DetailParams>,
) -> Result<impl IntoResponse, AppError> {
    let progress = sqlx::query_as::<_, Progress>(
        r#"
        SELECT id, user_id, exam_id, exam_revision, exam_title, stage,
               answers_quantity, started, finished, passed, guest_key
        FROM progress
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Progress not found".to_string()))?;

    let claims = claims_from_headers(&headers, &config.jwt_secret);
    let is_owner = claims
        .as_ref()
        .map(|c| c.user_id() == progress.user_id || c.role == "admin")
        .unwrap_or(false);
    let has_guest_key = params
        .key
        .map(|key| key == progress.guest_key)
        .unwrap_or(false);

    if !is_owner && !has_guest_key {
        return Err(AppError::Forbidden(
            "This progress is not shared with you".to_string(),
        ));
    }

    // The exam may have been deleted; the snapshot fields keep the page
    // meaningful regardless.
    let exam = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, revision, title, slug, description, success_message,
               author_id, category_id, sprint_id, priority, created_at,
               change_revision, timer, required_percent, allow_retesting,
               show_results, shuffle_variants, empty_answers, active, visibility
        FROM exams
        WHERE id = ?
        "#,
    )
    .bind(progress.exam_id)
    .fetch_optional(&pool)
    .await?;

    let questions_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM questions WHERE exam_id = ? AND active = 1 AND visibility = 1",
    )
    .bind(progress.exam_id)
    .fetch_one(&pool)
    .await?;

    let correct_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_answers WHERE progress_id = ? AND correct = 1",
    )
    .bind(progress.id)
    .fetch_one(&pool)
    .await?;

    let show_results = exam.as_ref().map(|e| e.show_results).unwrap_or(true);

    let answers = if show_results {
        let rows = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT id, question_text, correct, no_answers
            FROM user_answers
            WHERE progress_id = ?
            ORDER BY date, id
            "#,
        )
        .bind(progress.id)
        .fetch_all(&pool)
        .await?;

        let mut details = Vec::with_capacity(rows.len());
        for row in rows {
            let variants = sqlx::query_as::<_, UserVariantView>(
                r#"
                SELECT variant_text, selected, correct
                FROM user_variants
                WHERE answer_id = ?
                ORDER BY selected DESC, correct DESC, id
                "#,
            )
            .bind(row.id)
            .fetch_all(&pool)
            .await?;

            details.push(AnswerDetail {
                question_text: row.question_text,
                correct: row.correct,
                no_answers: row.no_answers,
                variants,
            });
        }
        Some(details)
    } else {
        None
    };

    let success_message = match (&exam, progress.passed) {
        (Some(exam), Some(true)) => exam.success_message.clone(),
        _ => None,
    };

    Ok(Json(ProgressDetailResponse {
        id: progress.id,
        exam_title: progress.exam_title.clone(),
        exam_slug: exam.as_ref().map(|e| e.slug.clone()),
        started: progress.started,
        finished: progress.finished,
        passed: progress.passed,
        stage: progress.stage,
        answers_quantity: progress.answers_quantity,
        questions_count,
        correct_count,
        correct_percentage: attempt::correct_percentage(correct_count, questions_count),
        success_message,
        answers,
    }))
}
