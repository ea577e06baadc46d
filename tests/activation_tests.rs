// tests/activation_tests.rs
//
// End-to-end checks for the derived `active` flags and the revision
// counter, driven through the admin API the way content authors would.

mod common;

use common::spawn_app;
use serde_json::json;

#[tokio::test]
async fn exam_without_questions_is_inactive() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let (exam_id, _slug) = app.create_exam(&token, json!({ "title": "Empty" })).await;

    let (active, revision) = app.exam_row(exam_id).await;
    assert!(!active);
    assert_eq!(revision, 1);
}

#[tokio::test]
async fn one_correct_question_needs_exactly_one_correct_variant() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let (exam_id, _slug) = app.create_exam(&token, json!({ "title": "Radio" })).await;
    let question_id = app
        .create_question(
            &token,
            json!({ "exam_id": exam_id, "text": "Pick one", "kind": "one_correct" }),
        )
        .await;

    // Variants exist but none is correct.
    let first = app
        .create_variant(&token, json!({ "question_id": question_id, "text": "A" }))
        .await;
    let second = app
        .create_variant(&token, json!({ "question_id": question_id, "text": "B" }))
        .await;
    assert!(!app.question_active(question_id).await);
    assert!(!app.exam_row(exam_id).await.0);

    // Exactly one correct: question and exam go live.
    let response = app
        .client
        .put(format!("{}/api/admin/variants/{}", app.address, first))
        .bearer_auth(&token)
        .json(&json!({ "correct": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(app.question_active(question_id).await);
    assert!(app.exam_row(exam_id).await.0);

    // A second correct variant makes the question ambiguous again.
    app.client
        .put(format!("{}/api/admin/variants/{}", app.address, second))
        .bearer_auth(&token)
        .json(&json!({ "correct": true }))
        .send()
        .await
        .unwrap();
    assert!(!app.question_active(question_id).await);
    assert!(!app.exam_row(exam_id).await.0);
}

#[tokio::test]
async fn text_answer_question_needs_a_reference_answer() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let (exam_id, _slug) = app.create_exam(&token, json!({ "title": "Free text" })).await;
    let question_id = app
        .create_question(
            &token,
            json!({ "exam_id": exam_id, "text": "Name it", "kind": "text_answer" }),
        )
        .await;

    app.create_variant(
        &token,
        json!({ "question_id": question_id, "text": "maybe" }),
    )
    .await;
    assert!(!app.question_active(question_id).await);

    app.create_variant(
        &token,
        json!({ "question_id": question_id, "text": "ferris", "correct": true }),
    )
    .await;
    assert!(app.question_active(question_id).await);
    assert!(app.exam_row(exam_id).await.0);
}

#[tokio::test]
async fn empty_answers_policy_flip_recomputes_many_correct_questions() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let (exam_id, _slug) = app.create_exam(&token, json!({ "title": "Checkboxes" })).await;
    let question_id = app
        .create_question(
            &token,
            json!({ "exam_id": exam_id, "text": "Pick any", "kind": "many_correct" }),
        )
        .await;
    app.create_variant(&token, json!({ "question_id": question_id, "text": "A" }))
        .await;
    app.create_variant(&token, json!({ "question_id": question_id, "text": "B" }))
        .await;

    // No correct variant and no permissive policy: inactive.
    assert!(!app.question_active(question_id).await);

    let response = app
        .client
        .put(format!("{}/api/admin/exams/{}", app.address, exam_id))
        .bearer_auth(&token)
        .json(&json!({ "empty_answers": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(app.question_active(question_id).await);
    assert!(app.exam_row(exam_id).await.0);

    // Flip back: inactive again.
    app.client
        .put(format!("{}/api/admin/exams/{}", app.address, exam_id))
        .bearer_auth(&token)
        .json(&json!({ "empty_answers": false }))
        .send()
        .await
        .unwrap();
    assert!(!app.question_active(question_id).await);
    assert!(!app.exam_row(exam_id).await.0);
}

#[tokio::test]
async fn hiding_the_only_question_deactivates_the_exam() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    let (exam_id, _slug, _correct, _wrong) = app.seed_simple_exam(&token, "Solo").await;

    assert!(app.exam_row(exam_id).await.0);

    let question_id: i64 = sqlx::query_scalar("SELECT id FROM questions WHERE exam_id = ?")
        .bind(exam_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();

    app.client
        .put(format!("{}/api/admin/questions/{}", app.address, question_id))
        .bearer_auth(&token)
        .json(&json!({ "visibility": false }))
        .send()
        .await
        .unwrap();

    assert!(!app.exam_row(exam_id).await.0);
}

#[tokio::test]
async fn revision_bumps_only_while_published_and_opted_in() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let (exam_id, _slug) = app
        .create_exam(&token, json!({ "title": "Tracked", "change_revision": true }))
        .await;
    let question_id = app
        .create_question(
            &token,
            json!({ "exam_id": exam_id, "text": "Pick", "kind": "one_correct" }),
        )
        .await;

    // Content edits before the exam is active do not bump the revision.
    let variant_id = app
        .create_variant(
            &token,
            json!({ "question_id": question_id, "text": "A", "correct": true }),
        )
        .await;
    let (active, revision) = app.exam_row(exam_id).await;
    assert!(active);
    assert_eq!(revision, 1);

    // Now published: a variant edit bumps it.
    app.client
        .put(format!("{}/api/admin/variants/{}", app.address, variant_id))
        .bearer_auth(&token)
        .json(&json!({ "text": "A (edited)" }))
        .send()
        .await
        .unwrap();
    assert_eq!(app.exam_row(exam_id).await.1, 2);

    // Hidden exam: edits no longer count.
    app.client
        .put(format!("{}/api/admin/exams/{}", app.address, exam_id))
        .bearer_auth(&token)
        .json(&json!({ "visibility": false }))
        .send()
        .await
        .unwrap();
    app.client
        .put(format!("{}/api/admin/variants/{}", app.address, variant_id))
        .bearer_auth(&token)
        .json(&json!({ "text": "A (hidden edit)" }))
        .send()
        .await
        .unwrap();
    assert_eq!(app.exam_row(exam_id).await.1, 2);
}

#[tokio::test]
async fn untracked_exam_never_bumps_revision() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    let (exam_id, _slug, correct, _wrong) = app.seed_simple_exam(&token, "Untracked").await;

    app.client
        .put(format!("{}/api/admin/variants/{}", app.address, correct))
        .bearer_auth(&token)
        .json(&json!({ "text": "Right (edited)" }))
        .send()
        .await
        .unwrap();

    assert_eq!(app.exam_row(exam_id).await.1, 1);
}

#[tokio::test]
async fn admin_routes_reject_non_admin_users() {
    let app = spawn_app().await;
    let user_token = app.register_and_login("plain_user").await;

    let response = app
        .client
        .post(format!("{}/api/admin/exams", app.address))
        .bearer_auth(&user_token)
        .json(&json!({ "title": "Nope" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
}
