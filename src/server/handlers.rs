//! HTTP request handlers.

use crate::auth::Registration;
use crate::db::{BookFields, ProfileUpdate};
use crate::error::{AppError, Result};
use crate::library::{self, ADMIN_RECENT_BOOKS, CLIENT_RECENT_BOOKS, LibraryStats};
use crate::server::AppState;
use crate::server::pages::{self, DetailActions, ListFilters};
use crate::server::session::{
    AdminUser, Flash, FlashKind, LOGIN_PATH, SESSION_COOKIE, SignedIn, Viewer, clear_cookie,
    dashboard_for, redirect_with_flash, session_cookie, with_cookie,
};
use axum::{
    Form, Json,
    body::Bytes,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

/// Turn a user-facing error into a flash + redirect; other errors propagate.
fn flash_outcome(result: Result<()>, to: &str, success: &str) -> Result<Response> {
    match result {
        Ok(()) => Ok(redirect_with_flash(to, FlashKind::Success, success)),
        Err(e) if e.is_user_facing() => {
            Ok(redirect_with_flash(to, FlashKind::Error, e.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Redirect to the user's dashboard with a fresh session cookie.
fn start_session(state: &AppState, dashboard: &str, token: &str, message: &str) -> Response {
    let response = redirect_with_flash(dashboard, FlashKind::Success, message);
    with_cookie(
        response,
        &session_cookie(token, state.auth.session_max_age()),
    )
}

fn book_not_found(to: &str) -> Response {
    redirect_with_flash(to, FlashKind::Error, "Book not found")
}

// ============================================================================
// BOOKS
// ============================================================================

/// Search and genre filter on book listings.
#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    #[serde(default)]
    search: String,
    #[serde(default)]
    genre: String,
}

/// Search form.
#[derive(Debug, Default, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    query: String,
}

/// Index page.
pub async fn index(State(state): State<AppState>, viewer: Viewer) -> Result<Response> {
    let book_count = state.db.count_books()?;
    let body = pages::index(book_count, viewer.user.as_ref());
    Ok(viewer.render(&state, "Welcome", &body))
}

/// Public book list.
pub async fn book_list(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<BookQuery>,
) -> Result<Response> {
    let books = library::browse(&state.db, Some(&query.search), Some(&query.genre))?;
    let filters = ListFilters {
        action: "/books",
        search: &query.search,
        genre: &query.genre,
        genres: None,
    };
    let body = pages::book_list(&books, &filters, "/books");
    Ok(viewer.render(&state, "Books", &body))
}

/// Public book detail.
pub async fn book_detail(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> Result<Response> {
    let Some(book) = state.db.get_book(&id)? else {
        return Ok(book_not_found("/books"));
    };

    let actions = DetailActions {
        signed_in: viewer.user.is_some(),
        is_favorite: viewer.user.as_ref().is_some_and(|u| u.is_favorite(&book.id)),
        can_edit: can_edit_books(&state, &viewer),
    };
    let body = pages::book_detail(&book, &actions);
    Ok(viewer.render(&state, &book.title, &body))
}

fn can_edit_books(state: &AppState, viewer: &Viewer) -> bool {
    !state.book_editing_requires_admin() || viewer.user.as_ref().is_some_and(|u| u.is_admin())
}

/// Gate for book mutations. `None` means the viewer may proceed.
fn editor_gate(state: &AppState, viewer: &Viewer) -> Option<Response> {
    if can_edit_books(state, viewer) {
        return None;
    }

    Some(match &viewer.user {
        Some(user) => {
            tracing::warn!(username = %user.username, "Book editing denied");
            redirect_with_flash(
                LOGIN_PATH,
                FlashKind::Error,
                "Access denied. Admin privileges required.",
            )
        }
        None => redirect_with_flash(
            LOGIN_PATH,
            FlashKind::Info,
            "Please log in to access this page.",
        ),
    })
}

/// Add book form.
pub async fn add_book_form(State(state): State<AppState>, viewer: Viewer) -> Response {
    if let Some(denied) = editor_gate(&state, &viewer) {
        return denied;
    }
    viewer.render(&state, "Add Book", &pages::book_form(None))
}

/// Create a book from the multipart form.
pub async fn add_book(
    State(state): State<AppState>,
    viewer: Viewer,
    multipart: Multipart,
) -> Result<Response> {
    if let Some(denied) = editor_gate(&state, &viewer) {
        return Ok(denied);
    }

    let fields = match read_book_form(&state, multipart, None).await {
        Ok(fields) => fields,
        Err(e) if e.is_user_facing() => {
            return Ok(redirect_with_flash("/books/add", FlashKind::Error, e.to_string()));
        }
        Err(e) => return Err(e),
    };

    let book = state.db.create_book(&fields)?;
    tracing::info!(book_id = %book.id, title = %book.title, "Book added");
    Ok(redirect_with_flash("/books", FlashKind::Success, "Book added successfully"))
}

/// Edit book form.
pub async fn edit_book_form(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> Result<Response> {
    if let Some(denied) = editor_gate(&state, &viewer) {
        return Ok(denied);
    }

    let Some(book) = state.db.get_book(&id)? else {
        return Ok(book_not_found("/books"));
    };
    Ok(viewer.render(&state, "Edit Book", &pages::book_form(Some(&book))))
}

/// Update a book from the multipart form. Without a new upload the old image stays.
pub async fn edit_book(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response> {
    if let Some(denied) = editor_gate(&state, &viewer) {
        return Ok(denied);
    }

    let Some(book) = state.db.get_book(&id)? else {
        return Ok(book_not_found("/books"));
    };

    let edit_path = format!("/books/{}/edit", book.id);
    let fields = match read_book_form(&state, multipart, book.image.clone()).await {
        Ok(fields) => fields,
        Err(e) if e.is_user_facing() => {
            return Ok(redirect_with_flash(&edit_path, FlashKind::Error, e.to_string()));
        }
        Err(e) => return Err(e),
    };

    if !state.db.update_book(&book.id, &fields)? {
        return Ok(book_not_found("/books"));
    }

    tracing::info!(book_id = %book.id, "Book updated");
    Ok(redirect_with_flash(
        &format!("/books/{}", book.id),
        FlashKind::Success,
        "Book updated successfully",
    ))
}

/// Delete a book. Favorites pointing at it are left in place.
pub async fn delete_book(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> Result<Response> {
    if let Some(denied) = editor_gate(&state, &viewer) {
        return Ok(denied);
    }

    if !state.db.delete_book(&id)? {
        return Ok(book_not_found("/books"));
    }

    tracing::info!(book_id = %id, "Book deleted");
    Ok(redirect_with_flash("/books", FlashKind::Success, "Book deleted successfully"))
}

/// Search page.
pub async fn search_form(State(state): State<AppState>, viewer: Viewer) -> Response {
    viewer.render(&state, "Search", &pages::search("", None))
}

/// Search results.
pub async fn search(
    State(state): State<AppState>,
    viewer: Viewer,
    Form(form): Form<SearchForm>,
) -> Result<Response> {
    let query = form.query.trim();
    let books = state.db.search_books(query)?;
    Ok(viewer.render(&state, "Search", &pages::search(query, Some(&books))))
}

fn bad_form(e: MultipartError) -> AppError {
    AppError::Validation(format!("Invalid form data: {}", e))
}

/// Read the add/edit multipart form. The cover image is stored only once the
/// text fields validate; otherwise `current_image` is kept.
async fn read_book_form(
    state: &AppState,
    mut multipart: Multipart,
    current_image: Option<String>,
) -> Result<BookFields> {
    let mut text: HashMap<String, String> = HashMap::new();
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(bad_form)?;
            if !filename.is_empty() && !data.is_empty() {
                upload = Some((filename, data));
            }
        } else {
            let value = field.text().await.map_err(bad_form)?;
            text.insert(name, value);
        }
    }

    let value = |key: &str| text.get(key).map(|v| v.trim().to_string()).unwrap_or_default();

    let title = value("title");
    let author = value("author");
    if title.is_empty() || author.is_empty() {
        return Err(AppError::Validation(
            "Title and author are required".to_string(),
        ));
    }

    let year = value("year")
        .parse::<i32>()
        .map_err(|_| AppError::Validation("Year must be a whole number".to_string()))?;

    let mut image = current_image;
    if let Some((filename, data)) = upload
        && let Some(saved) = state.images.save(&filename, &data).await?
    {
        image = Some(saved);
    }

    Ok(BookFields {
        title,
        author,
        genre: value("genre"),
        year,
        description: value("description"),
        image,
    })
}

// ============================================================================
// AUTH
// ============================================================================

/// Login form fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    username: String,
    password: String,
}

/// Admin registration form fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdminRegistrationForm {
    username: String,
    email: String,
    password: String,
    confirm_password: String,
    admin_code: String,
}

/// Login page. Signed-in users go straight to their dashboard.
pub async fn login_form(State(state): State<AppState>, viewer: Viewer) -> Response {
    if let Some(user) = &viewer.user {
        return Redirect::to(dashboard_for(user)).into_response();
    }
    viewer.render(&state, "Login", &pages::login())
}

/// Check credentials and open a session.
pub async fn login(
    State(state): State<AppState>,
    viewer: Viewer,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    if let Some(user) = &viewer.user {
        return Ok(Redirect::to(dashboard_for(user)).into_response());
    }

    match state.auth.login(&form.username, &form.password) {
        Ok((user, token)) => Ok(start_session(
            &state,
            dashboard_for(&user),
            &token,
            "Login successful!",
        )),
        Err(AppError::Validation(message)) => {
            tracing::info!(username = %form.username, "Failed login");
            Ok(viewer.render_with_message(
                &state,
                "Login",
                &pages::login(),
                Flash::new(FlashKind::Error, message),
            ))
        }
        Err(e) => Err(e),
    }
}

/// Registration page.
pub async fn register_form(State(state): State<AppState>, viewer: Viewer) -> Response {
    if viewer.user.is_some() {
        return Redirect::to("/client/dashboard").into_response();
    }
    let body = pages::register(state.config.auth.allow_role_selection);
    viewer.render(&state, "Register", &body)
}

/// Create an account and sign it in.
pub async fn register(
    State(state): State<AppState>,
    viewer: Viewer,
    Form(form): Form<Registration>,
) -> Result<Response> {
    if viewer.user.is_some() {
        return Ok(Redirect::to("/client/dashboard").into_response());
    }

    match state.auth.register(&form) {
        Ok(user) => {
            let token = state.auth.open_session(&user)?;
            Ok(start_session(
                &state,
                dashboard_for(&user),
                &token,
                "Registration successful!",
            ))
        }
        Err(AppError::Validation(message)) => {
            let body = pages::register(state.config.auth.allow_role_selection);
            Ok(viewer.render_with_message(
                &state,
                "Register",
                &body,
                Flash::new(FlashKind::Error, message),
            ))
        }
        Err(e) => Err(e),
    }
}

/// Admin registration page.
pub async fn register_admin_form(State(state): State<AppState>, viewer: Viewer) -> Response {
    viewer.render(&state, "Admin Registration", &pages::register_admin())
}

/// Create an admin account guarded by the shared admin code.
pub async fn register_admin(
    State(state): State<AppState>,
    viewer: Viewer,
    Form(form): Form<AdminRegistrationForm>,
) -> Result<Response> {
    let registration = Registration {
        username: form.username,
        email: form.email,
        password: form.password,
        confirm_password: form.confirm_password,
        role: None,
    };

    match state.auth.register_admin(&registration, &form.admin_code) {
        Ok(user) => {
            let token = state.auth.open_session(&user)?;
            Ok(start_session(
                &state,
                "/admin/dashboard",
                &token,
                "Admin registration successful!",
            ))
        }
        Err(AppError::Validation(message)) => Ok(viewer.render_with_message(
            &state,
            "Admin Registration",
            &pages::register_admin(),
            Flash::new(FlashKind::Error, message),
        )),
        Err(e) => Err(e),
    }
}

/// End the session.
pub async fn logout(State(state): State<AppState>, session: SignedIn) -> Result<Response> {
    state.auth.logout(&session.token)?;
    tracing::info!(username = %session.user.username, "User logged out");

    let response = redirect_with_flash("/", FlashKind::Info, "You have been logged out");
    Ok(with_cookie(response, &clear_cookie(SESSION_COOKIE)))
}

// ============================================================================
// ADMIN
// ============================================================================

/// Role change form.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoleForm {
    role: String,
}

/// Profile form. Blank fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileForm {
    username: Option<String>,
    email: Option<String>,
}

/// Password change form.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PasswordForm {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

/// Admin dashboard.
pub async fn admin_dashboard(State(state): State<AppState>, admin: AdminUser) -> Result<Response> {
    let total_books = state.db.count_books()?;
    let total_users = state.db.count_users()?;
    let recent = library::recent_books(&state.db, ADMIN_RECENT_BOOKS)?;

    let body = pages::admin_dashboard(total_books, total_users, &recent);
    Ok(admin.render(&state, "Admin Dashboard", &body))
}

/// Book management listing.
pub async fn manage_books(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<BookQuery>,
) -> Result<Response> {
    let books = library::browse(&state.db, Some(&query.search), Some(&query.genre))?;
    let all_genres = library::genres(&state.db.list_books()?);
    let filters = ListFilters {
        action: "/admin/books",
        search: &query.search,
        genre: &query.genre,
        genres: Some(&all_genres),
    };

    let body = format!(
        r#"<p><a href="/books/add">Add a book</a></p>
    {}"#,
        pages::book_list(&books, &filters, "/books")
    );
    Ok(admin.render(&state, "Manage Books", &body))
}

/// User management listing.
pub async fn manage_users(State(state): State<AppState>, admin: AdminUser) -> Result<Response> {
    let users = state.auth.list_users()?;
    let body = pages::manage_users(&users, &admin.user.id);
    Ok(admin.render(&state, "Manage Users", &body))
}

/// Change a user's role.
pub async fn update_user_role(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Form(form): Form<RoleForm>,
) -> Result<Response> {
    tracing::info!(
        actor = %admin.user.username,
        user_id = %id,
        role = %form.role,
        "Role change requested"
    );
    flash_outcome(
        state.auth.update_role(&id, &form.role),
        "/admin/users",
        "User role updated successfully",
    )
}

/// Delete a user. Admins cannot delete themselves.
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Response> {
    flash_outcome(
        state.auth.delete_user(&admin.user, &id),
        "/admin/users",
        "User deleted successfully",
    )
}

/// Catalog statistics as JSON.
pub async fn api_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<LibraryStats>> {
    Ok(Json(LibraryStats::collect(&state.db)?))
}

/// Admin profile page.
pub async fn admin_profile(State(state): State<AppState>, admin: AdminUser) -> Response {
    admin.render(&state, "Profile", &pages::admin_profile(&admin.user))
}

/// Update the admin's own username/email.
pub async fn update_profile(
    State(state): State<AppState>,
    admin: AdminUser,
    Form(form): Form<ProfileForm>,
) -> Result<Response> {
    let update = ProfileUpdate::from_form(form.username.as_deref(), form.email.as_deref());
    let result = state.auth.update_profile(&admin.user, &update).map(|user| {
        tracing::info!(user_id = %user.id, username = %user.username, "Profile updated");
    });
    flash_outcome(result, "/admin/profile", "Profile updated successfully")
}

/// Change the admin's own password.
pub async fn change_password(
    State(state): State<AppState>,
    admin: AdminUser,
    Form(form): Form<PasswordForm>,
) -> Result<Response> {
    flash_outcome(
        state.auth.change_password(
            &admin.user,
            &form.current_password,
            &form.new_password,
            &form.confirm_password,
        ),
        "/admin/profile",
        "Password changed successfully",
    )
}

// ============================================================================
// CLIENT
// ============================================================================

/// Client dashboard.
pub async fn client_dashboard(
    State(state): State<AppState>,
    session: SignedIn,
) -> Result<Response> {
    let books = library::recent_books(&state.db, CLIENT_RECENT_BOOKS)?;
    let body = pages::client_dashboard(&session.user, &books);
    Ok(session.render(&state, "Dashboard", &body))
}

/// Client book browser with a genre dropdown.
pub async fn client_books(
    State(state): State<AppState>,
    session: SignedIn,
    Query(query): Query<BookQuery>,
) -> Result<Response> {
    let books = library::browse(&state.db, Some(&query.search), Some(&query.genre))?;
    let all_genres = library::genres(&state.db.list_books()?);
    let filters = ListFilters {
        action: "/client/books",
        search: &query.search,
        genre: &query.genre,
        genres: Some(&all_genres),
    };

    let body = pages::book_list(&books, &filters, "/client/books");
    Ok(session.render(&state, "Browse Books", &body))
}

/// Client book detail.
pub async fn client_book_detail(
    State(state): State<AppState>,
    session: SignedIn,
    Path(id): Path<String>,
) -> Result<Response> {
    let Some(book) = state.db.get_book(&id)? else {
        return Ok(book_not_found("/client/books"));
    };

    let actions = DetailActions {
        signed_in: true,
        is_favorite: session.user.is_favorite(&book.id),
        can_edit: session.user.is_admin(),
    };
    let body = pages::book_detail(&book, &actions);
    Ok(session.render(&state, &book.title, &body))
}

/// Client profile page.
pub async fn client_profile(State(state): State<AppState>, session: SignedIn) -> Response {
    session.render(&state, "Profile", &pages::client_profile(&session.user))
}

/// The signed-in user's favorite books. Deleted books are skipped.
pub async fn client_favorites(
    State(state): State<AppState>,
    session: SignedIn,
) -> Result<Response> {
    let books = library::resolve_favorites(&state.db, &session.user.favorites)?;
    let body = pages::favorites(&books, "/client/books");
    Ok(session.render(&state, "My Favorites", &body))
}

// ============================================================================
// FAVORITES
// ============================================================================

fn back_to(session: &SignedIn, book_id: &str) -> String {
    session
        .referer
        .clone()
        .unwrap_or_else(|| format!("/client/books/{}", book_id))
}

/// Add a book to the user's favorites.
pub async fn add_favorite(
    State(state): State<AppState>,
    session: SignedIn,
    Path(id): Path<String>,
) -> Result<Response> {
    let Some(book) = state.db.get_book(&id)? else {
        return Ok(book_not_found("/client/books"));
    };

    state.db.add_favorite(&session.user.id, &book.id)?;
    tracing::debug!(user_id = %session.user.id, book_id = %book.id, "Favorite added");

    Ok(redirect_with_flash(
        &back_to(&session, &book.id),
        FlashKind::Success,
        format!("\"{}\" added to favorites!", book.title),
    ))
}

/// Remove a book from the user's favorites.
pub async fn remove_favorite(
    State(state): State<AppState>,
    session: SignedIn,
    Path(id): Path<String>,
) -> Result<Response> {
    let Some(book) = state.db.get_book(&id)? else {
        return Ok(book_not_found("/client/books"));
    };

    state.db.remove_favorite(&session.user.id, &book.id)?;
    tracing::debug!(user_id = %session.user.id, book_id = %book.id, "Favorite removed");

    Ok(redirect_with_flash(
        &back_to(&session, &book.id),
        FlashKind::Info,
        format!("\"{}\" removed from favorites!", book.title),
    ))
}

/// Flip a favorite and report the new state as JSON.
pub async fn toggle_favorite(
    State(state): State<AppState>,
    session: SignedIn,
    Path(id): Path<String>,
) -> Result<Response> {
    let outcome = match library::toggle_favorite(&state.db, &session.user.id, &id) {
        Ok(outcome) => outcome,
        Err(AppError::NotFound(message)) => {
            return Ok((StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response());
        }
        Err(e) => return Err(e),
    };

    let verb = match outcome.action {
        library::FavoriteAction::Added => "added to",
        library::FavoriteAction::Removed => "removed from",
    };

    Ok(Json(json!({
        "success": true,
        "message": format!("\"{}\" {} favorites", outcome.book.title, verb),
        "action": outcome.action,
        "is_favorite": outcome.is_favorite,
    }))
    .into_response())
}

/// Favorites list page.
pub async fn list_favorites(State(state): State<AppState>, session: SignedIn) -> Result<Response> {
    let books = library::resolve_favorites(&state.db, &session.user.favorites)?;
    let body = pages::favorites(&books, "/client/books");
    Ok(session.render(&state, "Favorites", &body))
}

// ============================================================================
// HEALTH
// ============================================================================

/// Store connectivity check.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.db.ping() {
        Ok(()) => Json(json!({ "status": "healthy", "database": "connected" })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
