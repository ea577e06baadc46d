// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, catalog, process, progress},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, catalog, process, progress, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Public catalog. Exam detail and progress detail read the bearer token
    // opportunistically, so they stay outside the auth layer.
    let catalog_routes = Router::new()
        .route("/categories", get(catalog::list_categories))
        .route("/sprints", get(catalog::list_sprints))
        .route("/sprints/{slug}", get(catalog::sprint_detail))
        .route("/exams", get(catalog::list_exams))
        .route("/exams/{slug}", get(catalog::exam_detail))
        .route("/progress/{id}", get(progress::progress_detail));

    // The attempt state machine requires an authenticated user.
    let process_routes = Router::new()
        .route(
            "/exams/{slug}/process/{stage}",
            get(process::process_stage).post(process::submit_stage),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/categories", post(admin::create_category))
        .route(
            "/categories/{id}",
            put(admin::update_category).delete(admin::delete_category),
        )
        .route("/sprints", post(admin::create_sprint))
        .route("/sprints/{id}", delete(admin::delete_sprint))
        .route("/exams", post(admin::create_exam))
        .route(
            "/exams/{id}",
            put(admin::update_exam).delete(admin::delete_exam),
        )
        .route("/questions", post(admin::create_question))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/variants", post(admin::create_variant))
        .route(
            "/variants/{id}",
            delete(admin::delete_variant).put(admin::update_variant),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", catalog_routes.merge(process_routes))
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
