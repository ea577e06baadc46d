// tests/common/mod.rs

use exams_backend::{config::Config, routes, state::AppState, utils::hash::hash_password};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";

/// A running application instance backed by its own temporary database.
pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub client: reqwest::Client,
    // Dropping the TempDir deletes the database file.
    _db_dir: tempfile::TempDir,
}

/// Spawns the app on a random port with a fresh file-backed SQLite database.
///
/// SQLite in-memory databases are per-connection, so a pooled app cannot use
/// them; a throwaway file in a temp directory gives every test an isolated,
/// shareable database instead.
pub async fn spawn_app() -> TestApp {
    let db_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let db_path = db_dir.path().join("test.db");

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("Failed to open test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: format!("sqlite://{}?mode=rwc", db_path.display()),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: Some(ADMIN_USERNAME.to_string()),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
    };

    let hashed = hash_password(ADMIN_PASSWORD).expect("Failed to hash admin password");
    sqlx::query("INSERT INTO users (username, password, role, created_at) VALUES (?, ?, 'admin', ?)")
        .bind(ADMIN_USERNAME)
        .bind(hashed)
        .bind(chrono::Utc::now())
        .execute(&pool)
        .await
        .expect("Failed to seed admin user");

    let state = AppState {
        pool: pool.clone(),
        config,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        client: reqwest::Client::new(),
        _db_dir: db_dir,
    }
}

impl TestApp {
    /// Registers a new user and returns their bearer token.
    pub async fn register_and_login(&self, username: &str) -> String {
        let response = self
            .client
            .post(format!("{}/api/auth/register", self.address))
            .json(&json!({ "username": username, "password": "password123" }))
            .send()
            .await
            .expect("Failed to register");
        assert_eq!(response.status().as_u16(), 201);

        self.login(username, "password123").await
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .client
            .post(format!("{}/api/auth/login", self.address))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to login");
        assert_eq!(response.status().as_u16(), 200);

        let body: Value = response.json().await.expect("Invalid login body");
        body["token"].as_str().expect("No token in body").to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    async fn post_created(&self, token: &str, path: &str, body: Value) -> Value {
        let response = self
            .client
            .post(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201, "POST {} failed", path);
        response.json().await.expect("Invalid creation body")
    }

    /// Creates an exam via the admin API; returns (id, slug).
    pub async fn create_exam(&self, token: &str, body: Value) -> (i64, String) {
        let created = self.post_created(token, "/api/admin/exams", body).await;
        (
            created["id"].as_i64().unwrap(),
            created["slug"].as_str().unwrap().to_string(),
        )
    }

    pub async fn create_question(&self, token: &str, body: Value) -> i64 {
        let created = self.post_created(token, "/api/admin/questions", body).await;
        created["id"].as_i64().unwrap()
    }

    pub async fn create_variant(&self, token: &str, body: Value) -> i64 {
        let created = self.post_created(token, "/api/admin/variants", body).await;
        created["id"].as_i64().unwrap()
    }

    pub async fn create_sprint(&self, token: &str, body: Value) -> i64 {
        let created = self.post_created(token, "/api/admin/sprints", body).await;
        created["id"].as_i64().unwrap()
    }

    /// Builds a published exam with one one_correct question and two
    /// variants; returns (exam_id, slug, correct_variant_id, wrong_variant_id).
    pub async fn seed_simple_exam(&self, token: &str, title: &str) -> (i64, String, i64, i64) {
        let (exam_id, slug) = self.create_exam(token, json!({ "title": title })).await;
        let question_id = self
            .create_question(
                token,
                json!({ "exam_id": exam_id, "text": "Pick one", "kind": "one_correct" }),
            )
            .await;
        let correct = self
            .create_variant(
                token,
                json!({ "question_id": question_id, "text": "Right", "correct": true }),
            )
            .await;
        let wrong = self
            .create_variant(
                token,
                json!({ "question_id": question_id, "text": "Wrong", "correct": false }),
            )
            .await;
        (exam_id, slug, correct, wrong)
    }

    pub async fn get_stage(&self, token: &str, slug: &str, stage: i64) -> Value {
        let response = self
            .client
            .get(format!(
                "{}/api/exams/{}/process/{}",
                self.address, slug, stage
            ))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to load stage");
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.expect("Invalid stage body")
    }

    pub async fn submit_stage(&self, token: &str, slug: &str, stage: i64, answer: Value) -> Value {
        let response = self
            .client
            .post(format!(
                "{}/api/exams/{}/process/{}",
                self.address, slug, stage
            ))
            .bearer_auth(token)
            .json(&answer)
            .send()
            .await
            .expect("Failed to submit stage");
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.expect("Invalid navigation body")
    }

    pub async fn exam_row(&self, exam_id: i64) -> (bool, i64) {
        sqlx::query_as::<_, (bool, i64)>("SELECT active, revision FROM exams WHERE id = ?")
            .bind(exam_id)
            .fetch_one(&self.pool)
            .await
            .expect("Exam row missing")
    }

    pub async fn question_active(&self, question_id: i64) -> bool {
        sqlx::query_scalar("SELECT active FROM questions WHERE id = ?")
            .bind(question_id)
            .fetch_one(&self.pool)
            .await
            .expect("Question row missing")
    }
}
