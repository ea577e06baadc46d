// src/handlers/admin.rs
//
// Content management. Every write that can change a question's or exam's
// derived `active` flag runs the activation hooks inside the same
// transaction as the write itself.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    activation,
    error::AppError,
    models::{
        category::{Category, CreateCategoryRequest, UpdateCategoryRequest},
        exam::{CreateExamRequest, CreateSprintRequest, Exam, UpdateExamRequest},
        question::{
            CreateQuestionRequest, CreateVariantRequest, Question, UpdateQuestionRequest,
            UpdateVariantRequest, Variant,
        },
    },
    utils::{
        html::clean_html,
        jwt::Claims,
        slug::{make_slug, reslug},
    },
};

// ---------------------------------------------------------------------------
// Categories

pub async fn create_category(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::BadRequest(errors.to_string()));
    }

    let slug = make_slug(&payload.title);
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO categories (title, slug, description, show_empty, priority)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&slug)
    .bind(payload.description.as_deref().map(clean_html).unwrap_or_default())
    .bind(payload.show_empty.unwrap_or(false))
    .bind(payload.priority)
    .fetch_one(&pool)
    .await?;

    tracing::info!(id, slug, "category created");
    Ok((StatusCode::CREATED, Json(json!({ "id": id, "slug": slug }))))
}

pub async fn update_category(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::BadRequest(errors.to_string()));
    }

    let category = sqlx::query_as::<_, Category>(
        "SELECT id, title, slug, description, show_empty, priority FROM categories WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Category not found".to_string()))?;

    let title = payload.title.unwrap_or(category.title.clone());
    let slug = if title != category.title {
        reslug(&title, &category.slug)
    } else {
        category.slug
    };
    let description = payload
        .description
        .as_deref()
        .map(clean_html)
        .unwrap_or(category.description);

    sqlx::query(
        r#"
        UPDATE categories
        SET title = ?, slug = ?, description = ?, show_empty = ?, priority = ?
        WHERE id = ?
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(&description)
    .bind(payload.show_empty.unwrap_or(category.show_empty))
    .bind(payload.priority.or(category.priority))
    .bind(id)
    .execute(&pool)
    .await?;

    Ok(Json(json!({ "id": id, "slug": slug })))
}

pub async fn delete_category(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Category not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Sprints

pub async fn create_sprint(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateSprintRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::BadRequest(errors.to_string()));
    }

    let slug = make_slug(&payload.title);
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sprints (title, slug, description, any_order, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&slug)
    .bind(payload.description.as_deref().map(clean_html).unwrap_or_default())
    .bind(payload.any_order.unwrap_or(false))
    .bind(chrono::Utc::now())
    .fetch_one(&pool)
    .await?;

    tracing::info!(id, slug, "sprint created");
    Ok((StatusCode::CREATED, Json(json!({ "id": id, "slug": slug }))))
}

pub async fn delete_sprint(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM sprints WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Sprint not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Exams

/// Range validation for double-Option update fields, where the validator
/// derive cannot reach the inner value.
fn range_check(field: &str, value: Option<i64>, min: i64, max: i64) -> Result<(), AppError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(AppError::BadRequest(format!(
            "{} must be between {} and {}",
            field, min, max
        ))),
        _ => Ok(()),
    }
}

pub async fn create_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::BadRequest(errors.to_string()));
    }

    let slug = make_slug(&payload.title);
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO exams (
            title, slug, description, success_message, author_id, category_id,
            sprint_id, priority, created_at, change_revision, timer,
            required_percent, allow_retesting, show_results, shuffle_variants,
            empty_answers, visibility
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&slug)
    .bind(payload.description.as_deref().map(clean_html).unwrap_or_default())
    .bind(&payload.success_message)
    .bind(claims.user_id())
    .bind(payload.category_id)
    .bind(payload.sprint_id)
    .bind(payload.priority)
    .bind(chrono::Utc::now())
    .bind(payload.change_revision.unwrap_or(false))
    .bind(payload.timer)
    .bind(payload.required_percent)
    .bind(payload.allow_retesting.unwrap_or(true))
    .bind(payload.show_results.unwrap_or(true))
    .bind(payload.shuffle_variants.unwrap_or(true))
    .bind(payload.empty_answers.unwrap_or(false))
    .bind(payload.visibility.unwrap_or(true))
    .fetch_one(&pool)
    .await?;

    tracing::info!(id, slug, "exam created");
    Ok((StatusCode::CREATED, Json(json!({ "id": id, "slug": slug }))))
}

pub async fn update_exam(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::BadRequest(errors.to_string()));
    }
    range_check("priority", payload.priority.flatten(), 1, 99)?;
    range_check("timer", payload.timer.flatten(), 1, 720)?;
    range_check("required_percent", payload.required_percent.flatten(), 1, 100)?;

    let mut tx = pool.begin().await?;

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
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let title = payload.title.unwrap_or(exam.title.clone());
    let slug = if title != exam.title {
        reslug(&title, &exam.slug)
    } else {
        exam.slug.clone()
    };
    let description = payload
        .description
        .as_deref()
        .map(clean_html)
        .unwrap_or(exam.description.clone());
    let empty_answers = payload.empty_answers.unwrap_or(exam.empty_answers);

    sqlx::query(
        r#"
        UPDATE exams
        SET title = ?, slug = ?, description = ?, success_message = ?,
            category_id = ?, sprint_id = ?, priority = ?, change_revision = ?,
            timer = ?, required_percent = ?, allow_retesting = ?,
            show_results = ?, shuffle_variants = ?, empty_answers = ?,
            visibility = ?
        WHERE id = ?
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(&description)
    .bind(payload.success_message.unwrap_or(exam.success_message))
    .bind(payload.category_id.unwrap_or(exam.category_id))
    .bind(payload.sprint_id.unwrap_or(exam.sprint_id))
    .bind(payload.priority.unwrap_or(exam.priority))
    .bind(payload.change_revision.unwrap_or(exam.change_revision))
    .bind(payload.timer.unwrap_or(exam.timer))
    .bind(payload.required_percent.unwrap_or(exam.required_percent))
    .bind(payload.allow_retesting.unwrap_or(exam.allow_retesting))
    .bind(payload.show_results.unwrap_or(exam.show_results))
    .bind(payload.shuffle_variants.unwrap_or(exam.shuffle_variants))
    .bind(empty_answers)
    .bind(payload.visibility.unwrap_or(exam.visibility))
    .bind(id)
    .execute(&mut *tx)
    .await?;

    // Flipping the empty-answers policy changes grading semantics and can
    // re-activate or deactivate many_correct questions, so it counts as a
    // content edit: bump the revision first, then recompute.
    if empty_answers != exam.empty_answers {
        activation::touch_revision(&mut tx, id).await?;
        activation::apply_empty_answers_change(&mut tx, id, empty_answers).await?;
    }

    tx.commit().await?;
    Ok(Json(json!({ "id": id, "slug": slug })))
}

pub async fn delete_exam(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM exams WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }
    tracing::info!(id, "exam deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Questions

pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::BadRequest(errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let exam_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM exams WHERE id = ?)")
        .bind(payload.exam_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exam_exists {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (exam_id, text, success_message, priority, kind, visibility)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.exam_id)
    .bind(clean_html(&payload.text))
    .bind(&payload.success_message)
    .bind(payload.priority)
    .bind(payload.kind)
    .bind(payload.visibility.unwrap_or(true))
    .fetch_one(&mut *tx)
    .await?;

    activation::after_question_write(&mut tx, payload.exam_id, id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::BadRequest(errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let question = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, exam_id, text, success_message, priority, kind, active, visibility
        FROM questions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    sqlx::query(
        r#"
        UPDATE questions
        SET text = ?, success_message = ?, priority = ?, kind = ?, visibility = ?
        WHERE id = ?
        "#,
    )
    .bind(payload.text.as_deref().map(clean_html).unwrap_or(question.text))
    .bind(payload.success_message.or(question.success_message))
    .bind(payload.priority.or(question.priority))
    .bind(payload.kind.unwrap_or(question.kind))
    .bind(payload.visibility.unwrap_or(question.visibility))
    .bind(id)
    .execute(&mut *tx)
    .await?;

    activation::after_question_write(&mut tx, question.exam_id, id).await?;
    tx.commit().await?;

    Ok(Json(json!({ "id": id })))
}

pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let exam_id: i64 = sqlx::query_scalar("SELECT exam_id FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    activation::after_content_delete(&mut tx, exam_id, None).await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Variants

pub async fn create_variant(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateVariantRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::BadRequest(errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let exam_id: i64 = sqlx::query_scalar("SELECT exam_id FROM questions WHERE id = ?")
        .bind(payload.question_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO variants (question_id, text, priority, correct)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.question_id)
    .bind(&payload.text)
    .bind(payload.priority)
    .bind(payload.correct.unwrap_or(false))
    .fetch_one(&mut *tx)
    .await?;

    activation::after_variant_write(&mut tx, exam_id, payload.question_id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn update_variant(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateVariantRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::BadRequest(errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let variant = sqlx::query_as::<_, Variant>(
        "SELECT id, question_id, text, priority, correct FROM variants WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Variant not found".to_string()))?;

    let exam_id: i64 = sqlx::query_scalar("SELECT exam_id FROM questions WHERE id = ?")
        .bind(variant.question_id)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("UPDATE variants SET text = ?, priority = ?, correct = ? WHERE id = ?")
        .bind(payload.text.unwrap_or(variant.text))
        .bind(payload.priority.or(variant.priority))
        .bind(payload.correct.unwrap_or(variant.correct))
        .bind(id)
        .execute(&mut *tx)
        .await?;

    activation::after_variant_write(&mut tx, exam_id, variant.question_id).await?;
    tx.commit().await?;

    Ok(Json(json!({ "id": id })))
}

pub async fn delete_variant(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let variant = sqlx::query_as::<_, Variant>(
        "SELECT id, question_id, text, priority, correct FROM variants WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Variant not found".to_string()))?;

    let exam_id: i64 = sqlx::query_scalar("SELECT exam_id FROM questions WHERE id = ?")
        .bind(variant.question_id)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM variants WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    activation::after_content_delete(&mut tx, exam_id, Some(variant.question_id)).await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
