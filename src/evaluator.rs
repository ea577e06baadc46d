// src/evaluator.rs
//
// Grading is split in two: a pure `grade` function over the question's
// canonical variant list, and `record`, which persists the denormalized
// answer snapshot. Display shuffling never reaches this module; callers
// pass variants in (priority, id) order.

use std::collections::HashSet;

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqliteConnection;

use crate::{
    error::AppError,
    models::question::{Question, QuestionKind, Variant},
};

/// A submitted answer, one shape per question kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerPayload {
    /// Single selected variant id (radio group).
    One { variant: i64 },
    /// Selected variant ids (checkboxes); may be empty under the
    /// empty_answers policy.
    Many { variants: Vec<i64> },
    /// Free-text answer.
    Text { text: String },
}

/// Grading outcome for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub correct: bool,
    /// The submission was intentionally empty (many_correct with the
    /// permissive policy and at least one correct variant existing).
    pub no_answers: bool,
}

fn unknown_variant() -> AppError {
    AppError::BadRequest("Unknown answer variant".to_string())
}

fn payload_mismatch() -> AppError {
    AppError::BadRequest("Answer payload does not match the question type".to_string())
}

/// Grades a submission against the question's variants.
///
/// Validation failures (unknown ids, wrong payload shape, empty selection
/// without the empty_answers policy) are errors; the caller must not write
/// anything in that case.
pub fn grade(
    kind: QuestionKind,
    payload: &AnswerPayload,
    variants: &[Variant],
    empty_answers: bool,
) -> Result<Verdict, AppError> {
    match (kind, payload) {
        (QuestionKind::OneCorrect, AnswerPayload::One { variant }) => {
            let chosen = variants
                .iter()
                .find(|v| v.id == *variant)
                .ok_or_else(unknown_variant)?;
            Ok(Verdict {
                correct: chosen.correct,
                no_answers: false,
            })
        }

        (QuestionKind::ManyCorrect, AnswerPayload::Many { variants: selected }) => {
            for id in selected {
                if !variants.iter().any(|v| v.id == *id) {
                    return Err(unknown_variant());
                }
            }

            let correct_count = variants.iter().filter(|v| v.correct).count();

            if selected.is_empty() {
                if !empty_answers {
                    return Err(AppError::BadRequest(
                        "Select at least one option".to_string(),
                    ));
                }
                // With no correct variant an empty submission is trivially
                // right; otherwise it counts as a recorded non-answer.
                return Ok(Verdict {
                    correct: correct_count == 0,
                    no_answers: correct_count > 0,
                });
            }

            // Selections compare as a set; duplicate ids must not widen it.
            let chosen: HashSet<i64> = selected.iter().copied().collect();
            let wrong_selected = variants
                .iter()
                .any(|v| !v.correct && chosen.contains(&v.id));
            let correct = !wrong_selected && chosen.len() >= correct_count;

            Ok(Verdict {
                correct,
                no_answers: false,
            })
        }

        (QuestionKind::TextAnswer, AnswerPayload::Text { text }) => {
            let answer = text.trim();
            if answer.is_empty() {
                return Err(AppError::BadRequest("Enter an answer".to_string()));
            }
            let correct = variants
                .iter()
                .any(|v| v.correct && v.text.trim().to_lowercase() == answer.to_lowercase());
            Ok(Verdict {
                correct,
                no_answers: false,
            })
        }

        _ => Err(payload_mismatch()),
    }
}

fn variant_selected(payload: &AnswerPayload, variant: &Variant) -> bool {
    match payload {
        AnswerPayload::One { variant: id } => variant.id == *id,
        AnswerPayload::Many { variants } => variants.contains(&variant.id),
        AnswerPayload::Text { text } => {
            variant.text.trim().to_lowercase() == text.trim().to_lowercase()
        }
    }
}

/// Persists the graded submission: one user_answers row plus one
/// user_variants row per variant, each snapshotting the variant text so
/// later content edits cannot rewrite history. A wrong text answer gets an
/// extra synthetic row holding what the user actually typed.
///
/// Runs inside the caller's transaction, alongside the stage advance.
pub async fn record(
    conn: &mut SqliteConnection,
    progress_id: i64,
    question: &Question,
    variants: &[Variant],
    payload: &AnswerPayload,
    verdict: Verdict,
) -> Result<i64, AppError> {
    let answer_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO user_answers
            (progress_id, question_id, question_text, correct, no_answers, date)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(progress_id)
    .bind(question.id)
    .bind(&question.text)
    .bind(verdict.correct)
    .bind(verdict.no_answers)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    for variant in variants {
        sqlx::query(
            r#"
            INSERT INTO user_variants
                (answer_id, variant_id, variant_text, selected, correct)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(answer_id)
        .bind(variant.id)
        .bind(&variant.text)
        .bind(variant_selected(payload, variant))
        .bind(variant.correct)
        .execute(&mut *conn)
        .await?;
    }

    if let AnswerPayload::Text { text } = payload {
        if !verdict.correct {
            sqlx::query(
                r#"
                INSERT INTO user_variants
                    (answer_id, variant_id, variant_text, selected, correct)
                VALUES (?, NULL, ?, 1, 0)
                "#,
            )
            .bind(answer_id)
            .bind(text.trim())
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(answer_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: i64, text: &str, correct: bool) -> Variant {
        Variant {
            id,
            question_id: 1,
            text: text.to_string(),
            priority: None,
            correct,
        }
    }

    fn choice_set() -> Vec<Variant> {
        vec![
            variant(1, "Alpha", true),
            variant(2, "Beta", true),
            variant(3, "Gamma", false),
        ]
    }

    #[test]
    fn one_correct_grades_by_chosen_variant() {
        let variants = vec![variant(1, "Yes", true), variant(2, "No", false)];

        let ok = grade(
            QuestionKind::OneCorrect,
            &AnswerPayload::One { variant: 1 },
            &variants,
            false,
        )
        .unwrap();
        assert!(ok.correct);

        let wrong = grade(
            QuestionKind::OneCorrect,
            &AnswerPayload::One { variant: 2 },
            &variants,
            false,
        )
        .unwrap();
        assert!(!wrong.correct);
    }

    #[test]
    fn one_correct_rejects_unknown_variant() {
        let variants = vec![variant(1, "Yes", true)];
        let result = grade(
            QuestionKind::OneCorrect,
            &AnswerPayload::One { variant: 99 },
            &variants,
            false,
        );
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn many_correct_requires_exact_set() {
        let variants = choice_set();

        let exact = grade(
            QuestionKind::ManyCorrect,
            &AnswerPayload::Many {
                variants: vec![1, 2],
            },
            &variants,
            false,
        )
        .unwrap();
        assert!(exact.correct);

        let with_wrong = grade(
            QuestionKind::ManyCorrect,
            &AnswerPayload::Many {
                variants: vec![1, 3],
            },
            &variants,
            false,
        )
        .unwrap();
        assert!(!with_wrong.correct);

        let partial = grade(
            QuestionKind::ManyCorrect,
            &AnswerPayload::Many { variants: vec![1] },
            &variants,
            false,
        )
        .unwrap();
        assert!(!partial.correct);
    }

    #[test]
    fn many_correct_ignores_duplicate_selections() {
        let variants = choice_set();

        // [1, 1] covers only one of the two correct variants.
        let duplicated = grade(
            QuestionKind::ManyCorrect,
            &AnswerPayload::Many {
                variants: vec![1, 1],
            },
            &variants,
            false,
        )
        .unwrap();
        assert!(!duplicated.correct);

        // Duplicates of a complete selection stay correct.
        let complete = grade(
            QuestionKind::ManyCorrect,
            &AnswerPayload::Many {
                variants: vec![1, 1, 2],
            },
            &variants,
            false,
        )
        .unwrap();
        assert!(complete.correct);
    }

    #[test]
    fn many_correct_empty_submission_policy() {
        let variants = choice_set();

        // Policy off: empty selection is a validation error.
        let rejected = grade(
            QuestionKind::ManyCorrect,
            &AnswerPayload::Many { variants: vec![] },
            &variants,
            false,
        );
        assert!(matches!(rejected, Err(AppError::BadRequest(_))));

        // Policy on with correct variants existing: recorded as no_answers.
        let skipped = grade(
            QuestionKind::ManyCorrect,
            &AnswerPayload::Many { variants: vec![] },
            &variants,
            true,
        )
        .unwrap();
        assert!(!skipped.correct);
        assert!(skipped.no_answers);

        // Policy on with zero correct variants: trivially correct.
        let none_correct = vec![variant(1, "A", false), variant(2, "B", false)];
        let trivially = grade(
            QuestionKind::ManyCorrect,
            &AnswerPayload::Many { variants: vec![] },
            &none_correct,
            true,
        )
        .unwrap();
        assert!(trivially.correct);
        assert!(!trivially.no_answers);
    }

    #[test]
    fn text_answer_matches_case_insensitively() {
        let variants = vec![variant(1, "Ferris", true)];

        let ok = grade(
            QuestionKind::TextAnswer,
            &AnswerPayload::Text {
                text: "  fErRiS ".to_string(),
            },
            &variants,
            false,
        )
        .unwrap();
        assert!(ok.correct);

        let wrong = grade(
            QuestionKind::TextAnswer,
            &AnswerPayload::Text {
                text: "Gopher".to_string(),
            },
            &variants,
            false,
        )
        .unwrap();
        assert!(!wrong.correct);
    }

    #[test]
    fn payload_shape_must_match_kind() {
        let variants = choice_set();
        let result = grade(
            QuestionKind::TextAnswer,
            &AnswerPayload::One { variant: 1 },
            &variants,
            false,
        );
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
