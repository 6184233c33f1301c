//! HTTP server and routes.

mod handlers;
mod pages;
pub mod session;
mod state;


pub use state::{AppState, auth_service};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let book_routes = Router::new()
        .route("/", get(handlers::book_list))
        .route(
            "/add",
            get(handlers::add_book_form).post(handlers::add_book),
        )
        .route("/{id}", get(handlers::book_detail))
        .route(
            "/{id}/edit",
            get(handlers::edit_book_form).post(handlers::edit_book),
        )
        .route("/{id}/delete", post(handlers::delete_book));

    let auth_routes = Router::new()
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route(
            "/register",
            get(handlers::register_form).post(handlers::register),
        )
        .route(
            "/register-admin",
            get(handlers::register_admin_form).post(handlers::register_admin),
        )
        .route("/logout", get(handlers::logout));

    let admin_routes = Router::new()
        .route("/dashboard", get(handlers::admin_dashboard))
        .route("/books", get(handlers::manage_books))
        .route("/users", get(handlers::manage_users))
        .route("/users/{id}/role", post(handlers::update_user_role))
        .route("/users/{id}/delete", post(handlers::delete_user))
        .route("/api/stats", get(handlers::api_stats))
        .route("/profile", get(handlers::admin_profile))
        .route("/profile/update", post(handlers::update_profile))
        .route(
            "/profile/change-password",
            post(handlers::change_password),
        );

    let client_routes = Router::new()
        .route("/dashboard", get(handlers::client_dashboard))
        .route("/books", get(handlers::client_books))
        .route("/books/{id}", get(handlers::client_book_detail))
        .route("/profile", get(handlers::client_profile))
        .route("/favorites", get(handlers::client_favorites));

    let favorite_routes = Router::new()
        .route("/add/{id}", post(handlers::add_favorite))
        .route("/remove/{id}", post(handlers::remove_favorite))
        .route("/toggle/{id}", post(handlers::toggle_favorite))
        .route("/list", get(handlers::list_favorites));

    let upload_limit = state.config.uploads.max_bytes;
    let uploads = ServeDir::new(state.images.dir());

    Router::new()
        .route("/", get(handlers::index))
        .route("/search", get(handlers::search_form).post(handlers::search))
        .route("/health", get(handlers::health))
        .nest("/books", book_routes)
        .nest("/auth", auth_routes)
        .nest("/admin", admin_routes)
        .nest("/client", client_routes)
        .nest("/favorites", favorite_routes)
        .nest_service("/static/uploads", uploads)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
