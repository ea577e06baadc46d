// src/handlers/process.rs
//
// The exam process route: GET renders stage N for the requesting user's
// attempt (resume-or-create plus gating), POST submits the stage's answer.
// Both run inside one transaction per request so progress creation, the
// stage-advance guard, and answer persistence commit or roll back together.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    attempt::{self, Navigation},
    error::AppError,
    evaluator::AnswerPayload,
    handlers::catalog::fetch_published_exam,
    models::{
        progress::AnswerDetail,
        question::{QuestionKind, VariantOption},
    },
    utils::jwt::Claims,
};

/// Query parameters for the process route.
#[derive(Debug, Deserialize)]
pub struct ProcessParams {
    /// Explicit restart request after a finished attempt.
    pub restart: Option<bool>,
}

/// One stage of an attempt, rendered for the answer form or for review.
#[derive(Debug, Serialize)]
pub struct StagePage {
    pub exam_title: String,
    pub slug: String,
    pub stage: i64,
    pub total_stages: i64,
    pub last_stage: bool,
    /// This stage was already submitted; `answer` carries the snapshot.
    pub answered: bool,
    pub question_id: i64,
    pub question_text: String,
    pub question_kind: QuestionKind,
    /// Question's configured feedback, present after answering when the
    /// exam shows results.
    pub success_message: Option<String>,
    /// Selectable options for the form; empty for text answers and for
    /// already-answered stages.
    pub variants: Vec<VariantOption>,
    /// Stored answer snapshot for answered stages (show_results only).
    pub answer: Option<AnswerDetail>,
    /// Seconds left on the exam timer; may go negative once expired.
    pub remaining_seconds: Option<i64>,
}

/// GET handler: resume or start an attempt and render stage `stage`.
pub async fn process_stage(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((slug, stage)): Path<(String, i64)>,
    Query(params): Query<ProcessParams>,
) -> Result<Response, AppError> {
    let user_id = claims.user_id();
    let mut tx = pool.begin().await?;

    let exam = fetch_published_exam(&mut *tx, &slug).await?;
    let restart = params.restart.unwrap_or(false);

    let Some(progress) = attempt::resume_or_create(&mut *tx, user_id, &exam, restart).await? else {
        tx.commit().await?;
        return Ok(Json(Navigation::ExamDetail { slug }).into_response());
    };

    let queue = attempt::load_queue(&mut *tx, exam.id).await?;

    if let Some(redirect) = attempt::gate_stage(&exam, &progress, stage, queue.len() as i64) {
        tx.commit().await?;
        return Ok(Json(redirect).into_response());
    }

    let question = &queue[(stage - 1) as usize];
    let answered = stage < progress.stage;

    let variants = if answered {
        Vec::new()
    } else {
        let mut variants: Vec<VariantOption> = attempt::load_variants(&mut *tx, question.id)
            .await?
            .into_iter()
            .map(|v| VariantOption {
                id: v.id,
                text: v.text,
            })
            .collect();
        if exam.shuffle_variants {
            variants.shuffle(&mut rand::thread_rng());
        }
        variants
    };

    let answer = if answered && exam.show_results {
        attempt::load_answer_snapshot(&mut *tx, progress.id, question.id).await?
    } else {
        None
    };

    let remaining_seconds = exam.timer.map(|timer| {
        let elapsed = Utc::now().signed_duration_since(progress.started).num_seconds();
        timer * 60 - elapsed
    });

    let page = StagePage {
        exam_title: exam.title.clone(),
        slug: exam.slug.clone(),
        stage,
        total_stages: queue.len() as i64,
        last_stage: stage == queue.len() as i64,
        answered,
        question_id: question.id,
        question_text: question.text.clone(),
        question_kind: question.kind,
        success_message: if answered && exam.show_results {
            question.success_message.clone()
        } else {
            None
        },
        variants,
        answer,
        remaining_seconds,
    };

    tx.commit().await?;
    Ok(Json(page).into_response())
}

/// POST handler: grade and persist the answer for stage `stage`, then
/// return where to go next. Duplicate submissions are absorbed silently.
pub async fn submit_stage(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((slug, stage)): Path<(String, i64)>,
    Json(payload): Json<AnswerPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();
    let mut tx = pool.begin().await?;

    let exam = fetch_published_exam(&mut *tx, &slug).await?;

    let Some(progress) = attempt::resume_or_create(&mut *tx, user_id, &exam, false).await? else {
        tx.commit().await?;
        return Ok(Json(Navigation::ExamDetail { slug }));
    };

    let queue = attempt::load_queue(&mut *tx, exam.id).await?;

    if stage < 1 || stage > queue.len() as i64 {
        tx.commit().await?;
        return Ok(Json(Navigation::ExamDetail { slug }));
    }
    if stage > progress.stage {
        tx.commit().await?;
        return Ok(Json(Navigation::Stage {
            slug,
            stage: progress.stage,
        }));
    }

    let navigation =
        attempt::submit_stage(&mut *tx, user_id, &exam, &progress, &queue, stage, &payload).await?;

    tx.commit().await?;
    Ok(Json(navigation))
}
