//! Cookie sessions, flash messages and the login/admin gates.
//!
//! The session cookie carries an opaque token looked up in the `sessions`
//! table. Flash messages travel in a second cookie that the next rendered page
//! displays and clears.

use crate::db::User;
use crate::error::AppError;
use crate::server::{AppState, pages};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use std::ops::Deref;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "bookshelf_session";

/// Flash message cookie name.
pub const FLASH_COOKIE: &str = "bookshelf_flash";

/// Where the gates send visitors who fail them.
pub const LOGIN_PATH: &str = "/auth/login";

/// Flash message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Error,
    /// Neutral notice.
    Info,
}

impl FlashKind {
    fn as_str(&self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
            FlashKind::Info => "info",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "success" => FlashKind::Success,
            "error" => FlashKind::Error,
            _ => FlashKind::Info,
        }
    }
}

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    /// Category, used for styling.
    pub kind: FlashKind,
    /// Message text.
    pub message: String,
}

impl Flash {
    /// Create a flash message.
    pub fn new(kind: FlashKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// CSS class / category name.
    pub fn category(&self) -> &'static str {
        self.kind.as_str()
    }

    fn encode(&self) -> String {
        urlencoding::encode(&format!("{}:{}", self.kind.as_str(), self.message)).into_owned()
    }

    fn decode(raw: &str) -> Option<Self> {
        let decoded = urlencoding::decode(raw).ok()?;
        let (kind, message) = decoded.split_once(':')?;
        Some(Self::new(FlashKind::parse(kind), message))
    }
}

/// Find a cookie value across all `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value establishing a session.
pub fn session_cookie(token: &str, max_age: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age
    )
}

/// `Set-Cookie` value expiring a cookie.
pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

fn flash_cookie(flash: &Flash) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        FLASH_COOKIE,
        flash.encode()
    )
}

/// Append a `Set-Cookie` header to a response.
pub fn with_cookie(mut response: Response, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Dropping malformed cookie"),
    }
    response
}

/// Redirect carrying a flash message.
pub fn redirect_with_flash(to: &str, kind: FlashKind, message: impl Into<String>) -> Response {
    let flash = Flash::new(kind, message);
    with_cookie(Redirect::to(to).into_response(), &flash_cookie(&flash))
}

/// Dashboard matching the user's role.
pub fn dashboard_for(user: &User) -> &'static str {
    if user.is_admin() {
        "/admin/dashboard"
    } else {
        "/client/dashboard"
    }
}

/// Whoever is making the request, possibly anonymous.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    /// Authenticated user, if any.
    pub user: Option<User>,
    /// Session token from the cookie, if any.
    pub token: Option<String>,
    /// Pending flash message.
    pub flash: Option<Flash>,
    /// `Referer` header.
    pub referer: Option<String>,
}

impl Viewer {
    /// Render a page for this viewer.
    pub fn render(&self, state: &AppState, title: &str, body: &str) -> Response {
        pages::render(state, self.user.as_ref(), self.flash.as_ref(), title, body)
    }

    /// Same as [`Viewer::render`], with an inline message in place of the flash.
    /// A pending flash is not shown, but its cookie is still cleared.
    pub fn render_with_message(
        &self,
        state: &AppState,
        title: &str,
        body: &str,
        message: Flash,
    ) -> Response {
        pages::render(state, self.user.as_ref(), Some(&message), title, body)
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = cookie_value(&parts.headers, SESSION_COOKIE);
        let user = match token.as_deref() {
            Some(token) => state.auth.validate_token(token)?,
            None => None,
        };

        let flash = cookie_value(&parts.headers, FLASH_COOKIE).and_then(|raw| Flash::decode(&raw));
        let referer = parts
            .headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            user,
            token,
            flash,
            referer,
        })
    }
}

/// An authenticated user. Anonymous requests are redirected to the login page.
#[derive(Debug, Clone)]
pub struct SignedIn {
    /// The user.
    pub user: User,
    /// Session token.
    pub token: String,
    /// Pending flash message.
    pub flash: Option<Flash>,
    /// `Referer` header.
    pub referer: Option<String>,
}

impl SignedIn {
    /// Render a page for this user.
    pub fn render(&self, state: &AppState, title: &str, body: &str) -> Response {
        pages::render(state, Some(&self.user), self.flash.as_ref(), title, body)
    }
}

impl FromRequestParts<AppState> for SignedIn {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let viewer = Viewer::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        match (viewer.user, viewer.token) {
            (Some(user), Some(token)) => Ok(Self {
                user,
                token,
                flash: viewer.flash,
                referer: viewer.referer,
            }),
            _ => Err(redirect_with_flash(
                LOGIN_PATH,
                FlashKind::Info,
                "Please log in to access this page.",
            )),
        }
    }
}

/// An authenticated admin or super admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub SignedIn);

impl Deref for AdminUser {
    type Target = SignedIn;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let signed_in = SignedIn::from_request_parts(parts, state).await?;

        if !signed_in.user.is_admin() {
            tracing::warn!(
                username = %signed_in.user.username,
                path = %parts.uri.path(),
                "Admin access denied"
            );
            return Err(redirect_with_flash(
                LOGIN_PATH,
                FlashKind::Error,
                "Access denied. Admin privileges required.",
            ));
        }

        Ok(Self(signed_in))
    }
}
