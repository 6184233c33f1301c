mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access tier attached to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular reader account.
    Client,
    /// Catalog and user administrator.
    Admin,
    /// Administrator created by the bootstrap routine.
    SuperAdmin,
}

impl Role {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Admins and super admins pass the admin gate alike.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Roles an administrator may assign from the user management page.
    pub fn assignable(&self) -> bool {
        matches!(self, Role::Admin | Role::Client)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Username for login.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Access tier.
    pub role: Role,
    /// Inactive accounts cannot log in.
    pub is_active: bool,
    /// Favorite book IDs, in the order they were added.
    pub favorites: Vec<String>,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

impl User {
    /// Check if the user passes the admin gate.
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Check if the user is a super admin.
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    /// Check whether a book is in the favorites list.
    pub fn is_favorite(&self, book_id: &str) -> bool {
        self.favorites.iter().any(|id| id == book_id)
    }
}

/// Partial profile update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// New username.
    pub username: Option<String>,
    /// New email.
    pub email: Option<String>,
}

impl ProfileUpdate {
    /// Build an update from raw form values, treating blanks as absent.
    pub fn from_form(username: Option<&str>, email: Option<&str>) -> Self {
        let keep = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            username: keep(username),
            email: keep(email),
        }
    }

    /// Nothing to change.
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none()
    }
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: String,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Book record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Book ID.
    pub id: String,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Free-text genre.
    pub genre: String,
    /// Publication year.
    pub year: i32,
    /// Description.
    pub description: String,
    /// Cover image filename inside the upload directory.
    pub image: Option<String>,
}

/// Editable book fields, as submitted by the add/edit forms.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookFields {
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Free-text genre.
    pub genre: String,
    /// Publication year.
    pub year: i32,
    /// Description.
    pub description: String,
    /// Cover image filename.
    pub image: Option<String>,
}

impl From<&Book> for BookFields {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            genre: book.genre.clone(),
            year: book.year,
            description: book.description.clone(),
            image: book.image.clone(),
        }
    }
}

/// Normalize a record identifier. Malformed identifiers yield `None`.
pub fn parse_id(id: &str) -> Option<String> {
    uuid::Uuid::parse_str(id.trim())
        .ok()
        .map(|uuid| uuid.hyphenated().to_string())
}

/// Generate a new record identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
