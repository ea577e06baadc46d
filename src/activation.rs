// src/activation.rs
//
// Derived publication state. Authors set `visibility`; `active` is computed
// here, bottom-up: variant data decides Question.active, questions decide
// Exam.active. Every content write that can change the outcome calls one of
// the hooks below inside its own transaction, so a failed recomputation
// rolls the triggering write back and the flags never drift from the rule.

use sqlx::SqliteConnection;

use crate::{error::AppError, models::question::QuestionKind};

/// The activation rule for a single question.
///
/// A question with zero variants is never active. Otherwise:
/// - one_correct: exactly one variant marked correct;
/// - text_answer: at least one reference variant marked correct;
/// - many_correct: at least one correct variant, or unconditionally when the
///   exam permits empty answers (a blank submission is then a valid answer,
///   so no correct variant is required).
pub fn question_rule(
    kind: QuestionKind,
    variant_count: i64,
    correct_count: i64,
    empty_answers: bool,
) -> bool {
    if variant_count == 0 {
        return false;
    }
    match kind {
        QuestionKind::OneCorrect => correct_count == 1,
        QuestionKind::TextAnswer => correct_count >= 1,
        QuestionKind::ManyCorrect => empty_answers || correct_count >= 1,
    }
}

#[derive(sqlx::FromRow)]
struct QuestionFacts {
    exam_id: i64,
    kind: QuestionKind,
    empty_answers: bool,
    variant_count: i64,
    correct_count: i64,
}

/// Recomputes and persists `questions.active` for one question.
/// Returns the new value.
pub async fn recompute_question(
    conn: &mut SqliteConnection,
    question_id: i64,
) -> Result<bool, AppError> {
    let facts = sqlx::query_as::<_, QuestionFacts>(
        r#"
        SELECT
            q.exam_id AS exam_id,
            q.kind AS kind,
            e.empty_answers AS empty_answers,
            (SELECT COUNT(*) FROM variants v WHERE v.question_id = q.id) AS variant_count,
            (SELECT COUNT(*) FROM variants v
                WHERE v.question_id = q.id AND v.correct = 1) AS correct_count
        FROM questions q
        JOIN exams e ON e.id = q.exam_id
        WHERE q.id = ?
        "#,
    )
    .bind(question_id)
    .fetch_one(&mut *conn)
    .await?;

    let active = question_rule(
        facts.kind,
        facts.variant_count,
        facts.correct_count,
        facts.empty_answers,
    );

    sqlx::query("UPDATE questions SET active = ? WHERE id = ?")
        .bind(active)
        .bind(question_id)
        .execute(&mut *conn)
        .await?;

    Ok(active)
}

/// Recomputes and persists `exams.active`: active iff at least one question
/// is both active and visible. Returns the new value.
pub async fn recompute_exam(conn: &mut SqliteConnection, exam_id: i64) -> Result<bool, AppError> {
    let active: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM questions WHERE exam_id = ? AND active = 1 AND visibility = 1)",
    )
    .bind(exam_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("UPDATE exams SET active = ? WHERE id = ?")
        .bind(active)
        .bind(exam_id)
        .execute(&mut *conn)
        .await?;

    Ok(active)
}

/// Advances the exam's revision counter, but only while the exam is
/// published (active and visible) and has opted into revision tracking.
/// The check uses the exam state as stored at the moment of the triggering
/// edit, before any recomputation from that same edit lands.
pub async fn touch_revision(conn: &mut SqliteConnection, exam_id: i64) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE exams SET revision = revision + 1
        WHERE id = ? AND active = 1 AND visibility = 1 AND change_revision = 1
        "#,
    )
    .bind(exam_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        tracing::debug!(exam_id, "exam revision bumped");
    }
    Ok(())
}

/// Hook for every variant create/update/delete. Must run in the same
/// transaction as the triggering write.
pub async fn after_variant_write(
    conn: &mut SqliteConnection,
    exam_id: i64,
    question_id: i64,
) -> Result<(), AppError> {
    touch_revision(&mut *conn, exam_id).await?;
    recompute_question(&mut *conn, question_id).await?;
    recompute_exam(&mut *conn, exam_id).await?;
    Ok(())
}

/// Hook for question create/update. Must run in the same transaction as the
/// triggering write.
pub async fn after_question_write(
    conn: &mut SqliteConnection,
    exam_id: i64,
    question_id: i64,
) -> Result<(), AppError> {
    touch_revision(&mut *conn, exam_id).await?;
    recompute_question(&mut *conn, question_id).await?;
    recompute_exam(&mut *conn, exam_id).await?;
    Ok(())
}

/// Hook for question/variant deletion, after the row is gone.
pub async fn after_content_delete(
    conn: &mut SqliteConnection,
    exam_id: i64,
    question_id: Option<i64>,
) -> Result<(), AppError> {
    touch_revision(&mut *conn, exam_id).await?;
    if let Some(question_id) = question_id {
        recompute_question(&mut *conn, question_id).await?;
    }
    recompute_exam(&mut *conn, exam_id).await?;
    Ok(())
}

/// Mass recomputation when an exam's `empty_answers` policy flips.
///
/// Only many_correct questions that have variants but zero correct ones can
/// change state under this policy: they become active when blank answers
/// are allowed and inactive when they are not.
pub async fn apply_empty_answers_change(
    conn: &mut SqliteConnection,
    exam_id: i64,
    empty_answers: bool,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE questions SET active = ?
        WHERE exam_id = ?
          AND kind = 'many_correct'
          AND EXISTS(SELECT 1 FROM variants v WHERE v.question_id = questions.id)
          AND NOT EXISTS(
              SELECT 1 FROM variants v
              WHERE v.question_id = questions.id AND v.correct = 1
          )
        "#,
    )
    .bind(empty_answers)
    .bind(exam_id)
    .execute(&mut *conn)
    .await?;

    recompute_exam(&mut *conn, exam_id).await?;
    Ok(())
}
