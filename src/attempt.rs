// src/attempt.rs
//
// The attempt state machine. One Progress row tracks a user's path through
// an exam: NO_PROGRESS -> IN_PROGRESS -> FINISHED(passed). All transitions
// here expect to run inside the caller's transaction; the stage-advance
// guard relies on that for at-most-once grading.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    error::AppError,
    evaluator::{self, AnswerPayload},
    models::{
        exam::Exam,
        progress::{AnswerDetail, Progress, UserVariantView},
        question::{Question, Variant},
    },
};

/// Where the client should go next. Serialized as a tagged JSON object so
/// the frontend can route without interpreting status codes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum Navigation {
    /// Go to (or stay on) a stage of the exam process.
    Stage { slug: String, stage: i64 },
    /// Back to the exam detail page (out-of-range stage, refused entry).
    ExamDetail { slug: String },
    /// The attempt is finished; show its results.
    Results { progress_id: i64 },
}

/// The ordered question queue for an attempt: active and visible questions
/// of the exam, by (priority, id), NULL priorities last.
pub async fn load_queue(
    conn: &mut SqliteConnection,
    exam_id: i64,
) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, exam_id, text, success_message, priority, kind, active, visibility
        FROM questions
        WHERE exam_id = ? AND active = 1 AND visibility = 1
        ORDER BY priority IS NULL, priority, id
        "#,
    )
    .bind(exam_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(questions)
}

/// Canonical variant ordering for a question. Grading and snapshots always
/// use this order; `shuffle_variants` only affects the rendered form.
pub async fn load_variants(
    conn: &mut SqliteConnection,
    question_id: i64,
) -> Result<Vec<Variant>, AppError> {
    let variants = sqlx::query_as::<_, Variant>(
        r#"
        SELECT id, question_id, text, priority, correct
        FROM variants
        WHERE question_id = ?
        ORDER BY priority IS NULL, priority, id
        "#,
    )
    .bind(question_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(variants)
}

async fn latest_progress(
    conn: &mut SqliteConnection,
    user_id: i64,
    exam_id: i64,
) -> Result<Option<Progress>, AppError> {
    let progress = sqlx::query_as::<_, Progress>(
        r#"
        SELECT id, user_id, exam_id, exam_revision, exam_title, stage,
               answers_quantity, started, finished, passed, guest_key
        FROM progress
        WHERE user_id = ? AND exam_id = ?
        ORDER BY started DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(exam_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(progress)
}

/// Exam ids of a sprint in traversal order: (priority, created, id).
async fn sprint_exam_ids(
    conn: &mut SqliteConnection,
    sprint_id: i64,
) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT id FROM exams
        WHERE sprint_id = ? AND active = 1 AND visibility = 1
        ORDER BY priority IS NULL, priority, created_at, id
        "#,
    )
    .bind(sprint_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// The exam preceding `exam` in its sprint, if any.
pub async fn previous_exam_in_sprint(
    conn: &mut SqliteConnection,
    exam: &Exam,
) -> Result<Option<i64>, AppError> {
    let Some(sprint_id) = exam.sprint_id else {
        return Ok(None);
    };
    let ids = sprint_exam_ids(&mut *conn, sprint_id).await?;
    let position = ids.iter().position(|id| *id == exam.id);
    Ok(match position {
        Some(p) if p > 0 => Some(ids[p - 1]),
        _ => None,
    })
}

async fn next_exam_in_sprint(
    conn: &mut SqliteConnection,
    exam: &Exam,
) -> Result<Option<i64>, AppError> {
    let Some(sprint_id) = exam.sprint_id else {
        return Ok(None);
    };
    let ids = sprint_exam_ids(&mut *conn, sprint_id).await?;
    let position = ids.iter().position(|id| *id == exam.id);
    Ok(match position {
        Some(p) if p + 1 < ids.len() => Some(ids[p + 1]),
        _ => None,
    })
}

/// Whether the user has a passed attempt for the given exam.
pub async fn has_passed(
    conn: &mut SqliteConnection,
    user_id: i64,
    exam_id: i64,
) -> Result<bool, AppError> {
    let passed: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM progress WHERE user_id = ? AND exam_id = ? AND passed = 1)",
    )
    .bind(user_id)
    .bind(exam_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(passed)
}

async fn create_progress(
    conn: &mut SqliteConnection,
    user_id: i64,
    exam: &Exam,
) -> Result<Progress, AppError> {
    // Enroll in the sprint on first contact.
    if let Some(sprint_id) = exam.sprint_id {
        sqlx::query(
            "INSERT OR IGNORE INTO user_sprints (user_id, sprint_id, started) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(sprint_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO progress
            (user_id, exam_id, exam_revision, exam_title, started, guest_key)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(exam.id)
    .bind(exam.revision)
    .bind(&exam.title)
    .bind(Utc::now())
    .bind(Uuid::new_v4().to_string())
    .fetch_one(&mut *conn)
    .await?;

    let progress = sqlx::query_as::<_, Progress>(
        r#"
        SELECT id, user_id, exam_id, exam_revision, exam_title, stage,
               answers_quantity, started, finished, passed, guest_key
        FROM progress WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(user_id, exam_id = exam.id, progress_id = progress.id, "attempt started");
    Ok(progress)
}

/// Resume-or-create transition.
///
/// Returns `None` when entry is refused (the previous exam of an ordered
/// sprint has not been passed); callers redirect to the exam detail page.
///
/// An unfinished attempt whose stamped revision no longer matches the
/// exam's current revision is stale: it is abandoned in place and a fresh
/// attempt is created, so users never keep answering superseded content.
pub async fn resume_or_create(
    conn: &mut SqliteConnection,
    user_id: i64,
    exam: &Exam,
    restart: bool,
) -> Result<Option<Progress>, AppError> {
    let latest = latest_progress(&mut *conn, user_id, exam.id).await?;

    let needs_new = match &latest {
        None => true,
        Some(p) if !p.is_finished() => {
            if p.exam_revision != exam.revision {
                tracing::info!(
                    progress_id = p.id,
                    stamped = p.exam_revision,
                    current = exam.revision,
                    "stale attempt superseded by content revision"
                );
                true
            } else {
                false
            }
        }
        Some(_) => restart && exam.allow_retesting,
    };

    if !needs_new {
        return Ok(latest);
    }

    // Ordered sprints gate every new attempt on the previous exam.
    if let Some(sprint_id) = exam.sprint_id {
        let any_order: bool = sqlx::query_scalar("SELECT any_order FROM sprints WHERE id = ?")
            .bind(sprint_id)
            .fetch_one(&mut *conn)
            .await?;

        if !any_order {
            if let Some(previous_id) = previous_exam_in_sprint(&mut *conn, exam).await? {
                if !has_passed(&mut *conn, user_id, previous_id).await? {
                    return Ok(None);
                }
            }
        }
    }

    Ok(Some(create_progress(&mut *conn, user_id, exam).await?))
}

/// GET gating for stage N. Returns a redirect when the requested stage may
/// not be rendered, `None` when it may.
pub fn gate_stage(exam: &Exam, progress: &Progress, stage: i64, queue_len: i64) -> Option<Navigation> {
    if stage < 1 || stage > queue_len {
        return Some(Navigation::ExamDetail {
            slug: exam.slug.clone(),
        });
    }
    // Skipping ahead is never allowed; revisiting is allowed only when the
    // exam shows results. The redirect targets the legitimate stage even if
    // that is past the queue (a finished attempt then lands on the detail
    // page via the range check above).
    if stage > progress.stage || (!exam.show_results && stage != progress.stage) {
        return Some(Navigation::Stage {
            slug: exam.slug.clone(),
            stage: progress.stage,
        });
    }
    None
}

/// Integer percentage of correct answers, or `None` when the question count
/// is zero (undefined, never a division error).
pub fn correct_percentage(correct_count: i64, questions_count: i64) -> Option<i64> {
    if questions_count > 0 {
        Some(correct_count * 100 / questions_count)
    } else {
        None
    }
}

async fn finalize(
    conn: &mut SqliteConnection,
    user_id: i64,
    exam: &Exam,
    progress: &Progress,
    questions_count: i64,
) -> Result<bool, AppError> {
    let now = Utc::now();
    let mut passed = true;

    if let Some(timer) = exam.timer {
        let elapsed = now.signed_duration_since(progress.started);
        if elapsed.num_seconds() > timer * 60 {
            passed = false;
        }
    }

    if let Some(required) = exam.required_percent {
        let correct_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_answers WHERE progress_id = ? AND correct = 1",
        )
        .bind(progress.id)
        .fetch_one(&mut *conn)
        .await?;

        match correct_percentage(correct_count, questions_count) {
            Some(percentage) if percentage >= required => {}
            // Undefined percentage counts as not meeting the threshold.
            _ => passed = false,
        }
    }

    sqlx::query("UPDATE progress SET finished = ?, passed = ? WHERE id = ?")
        .bind(now)
        .bind(passed)
        .bind(progress.id)
        .execute(&mut *conn)
        .await?;

    tracing::info!(progress_id = progress.id, passed, "attempt finished");

    // Passing the last exam of a sprint completes the sprint.
    if passed {
        if let Some(sprint_id) = exam.sprint_id {
            if next_exam_in_sprint(&mut *conn, exam).await?.is_none() {
                sqlx::query(
                    r#"
                    UPDATE user_sprints SET finished = ?
                    WHERE user_id = ? AND sprint_id = ? AND finished IS NULL
                    "#,
                )
                .bind(now)
                .bind(user_id)
                .bind(sprint_id)
                .execute(&mut *conn)
                .await?;
            }
        }
    }

    Ok(passed)
}

/// Submit transition for stage N.
///
/// The stage advance is guarded by `stage < N + 1` inside the transaction,
/// making grading at-most-once: a double submit (back navigation, retried
/// request, concurrent tab) finds zero affected rows and writes nothing,
/// but still receives the same navigation as the first submit.
pub async fn submit_stage(
    conn: &mut SqliteConnection,
    user_id: i64,
    exam: &Exam,
    progress: &Progress,
    queue: &[Question],
    stage: i64,
    payload: &AnswerPayload,
) -> Result<Navigation, AppError> {
    // Out-of-range stages never touch the attempt, whatever the caller
    // checked beforehand.
    let Some(question) = queue.get((stage - 1) as usize) else {
        return Ok(Navigation::ExamDetail {
            slug: exam.slug.clone(),
        });
    };
    let last_stage = stage == queue.len() as i64;

    let guard = sqlx::query(
        "UPDATE progress SET stage = ?, answers_quantity = ? WHERE id = ? AND stage < ?",
    )
    .bind(stage + 1)
    .bind(stage)
    .bind(progress.id)
    .bind(stage + 1)
    .execute(&mut *conn)
    .await?;

    if guard.rows_affected() == 1 {
        let variants = load_variants(&mut *conn, question.id).await?;
        let verdict = evaluator::grade(question.kind, payload, &variants, exam.empty_answers)?;
        evaluator::record(&mut *conn, progress.id, question, &variants, payload, verdict).await?;

        if last_stage {
            finalize(&mut *conn, user_id, exam, progress, queue.len() as i64).await?;
        }
    } else {
        tracing::debug!(progress_id = progress.id, stage, "duplicate submission dropped");
    }

    Ok(if last_stage {
        Navigation::Results {
            progress_id: progress.id,
        }
    } else if exam.show_results {
        Navigation::Stage {
            slug: exam.slug.clone(),
            stage,
        }
    } else {
        Navigation::Stage {
            slug: exam.slug.clone(),
            stage: stage + 1,
        }
    })
}

/// The stored answer snapshot for an already-answered stage, replayed on
/// revisits when the exam shows results.
pub async fn load_answer_snapshot(
    conn: &mut SqliteConnection,
    progress_id: i64,
    question_id: i64,
) -> Result<Option<AnswerDetail>, AppError> {
    #[derive(sqlx::FromRow)]
    struct AnswerRow {
        id: i64,
        question_text: Option<String>,
        correct: Option<bool>,
        no_answers: Option<bool>,
    }

    let answer = sqlx::query_as::<_, AnswerRow>(
        r#"
        SELECT id, question_text, correct, no_answers
        FROM user_answers
        WHERE progress_id = ? AND question_id = ?
        ORDER BY date
        LIMIT 1
        "#,
    )
    .bind(progress_id)
    .bind(question_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(answer) = answer else {
        return Ok(None);
    };

    let variants = sqlx::query_as::<_, UserVariantView>(
        r#"
        SELECT variant_text, selected, correct
        FROM user_variants
        WHERE answer_id = ?
        ORDER BY selected DESC, correct DESC, id
        "#,
    )
    .bind(answer.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(AnswerDetail {
        question_text: answer.question_text,
        correct: answer.correct,
        no_answers: answer.no_answers,
        variants,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exam_stub(show_results: bool) -> Exam {
        Exam {
            id: 1,
            revision: 1,
            title: "Exam".to_string(),
            slug: "exam-12345".to_string(),
            description: String::new(),
            success_message: None,
            author_id: None,
            category_id: None,
            sprint_id: None,
            priority: None,
            created_at: None,
            change_revision: false,
            timer: None,
            required_percent: None,
            allow_retesting: true,
            show_results,
            shuffle_variants: false,
            empty_answers: false,
            active: true,
            visibility: true,
        }
    }

    fn progress_stub(stage: i64) -> Progress {
        Progress {
            id: 7,
            user_id: 1,
            exam_id: 1,
            exam_revision: 1,
            exam_title: "Exam".to_string(),
            stage,
            answers_quantity: stage - 1,
            started: chrono::Utc::now(),
            finished: None,
            passed: None,
            guest_key: "k".to_string(),
        }
    }

    #[test]
    fn out_of_range_stage_redirects_to_detail() {
        let exam = exam_stub(true);
        let nav = gate_stage(&exam, &progress_stub(1), 5, 3);
        assert_eq!(
            nav,
            Some(Navigation::ExamDetail {
                slug: exam.slug.clone()
            })
        );
    }

    #[test]
    fn skipping_ahead_redirects_to_current_stage() {
        let exam = exam_stub(true);
        let nav = gate_stage(&exam, &progress_stub(2), 3, 3);
        assert_eq!(
            nav,
            Some(Navigation::Stage {
                slug: exam.slug.clone(),
                stage: 2
            })
        );
    }

    #[test]
    fn revisiting_requires_show_results() {
        let hidden = exam_stub(false);
        let nav = gate_stage(&hidden, &progress_stub(3), 1, 3);
        assert_eq!(
            nav,
            Some(Navigation::Stage {
                slug: hidden.slug.clone(),
                stage: 3
            })
        );

        let shown = exam_stub(true);
        assert_eq!(gate_stage(&shown, &progress_stub(3), 1, 3), None);
    }

    #[test]
    fn current_stage_renders() {
        let exam = exam_stub(false);
        assert_eq!(gate_stage(&exam, &progress_stub(2), 2, 3), None);
    }

    #[test]
    fn percentage_is_null_safe() {
        assert_eq!(correct_percentage(6, 10), Some(60));
        assert_eq!(correct_percentage(0, 10), Some(0));
        assert_eq!(correct_percentage(0, 0), None);
    }

    #[tokio::test]
    async fn submit_out_of_range_stage_redirects_without_writes() {
        use sqlx::Connection;

        let mut conn = sqlx::SqliteConnection::connect("sqlite::memory:")
            .await
            .unwrap();
        let exam = exam_stub(true);
        let progress = progress_stub(1);
        let payload = AnswerPayload::Many { variants: vec![] };

        // Empty queue, and a stage below the valid range.
        for stage in [0, 1, 5] {
            let nav = submit_stage(&mut conn, 1, &exam, &progress, &[], stage, &payload)
                .await
                .unwrap();
            assert_eq!(
                nav,
                Navigation::ExamDetail {
                    slug: exam.slug.clone()
                }
            );
        }
    }
}
