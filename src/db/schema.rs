use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, favorites, created_at, last_login";

const BOOK_COLUMNS: &str = "id, title, author, genre, year, description, image";

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Database wrapper for thread-safe access.
///
/// A single connection sits behind a mutex, so every method below runs
/// atomically with respect to the others.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'client',
                is_active INTEGER NOT NULL DEFAULT 1,
                favorites TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Books table (favorites reference it weakly, no foreign key)
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                genre TEXT NOT NULL DEFAULT '',
                year INTEGER NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                image TEXT
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Connectivity check. Touches the users table so a broken schema fails too.
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get::<_, i64>(0))
            .map_err(|e| AppError::Internal(format!("Database unreachable: {}", e)))?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(sql)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let favorites = encode_favorites(&user.favorites)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, role, is_active, favorites, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user.id,
                user.username,
                user.email,
                user.password_hash,
                user.role,
                user.is_active,
                favorites,
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Validation("Username already exists".to_string())
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID. Malformed IDs are reported as absent.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };

        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users in insertion order.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY rowid"))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Count users.
    pub fn count_users(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to count users: {}", e)))?;
        Ok(count as usize)
    }

    /// Update user role.
    pub fn update_user_role(&self, id: &str, role: Role) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };

        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role, id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update role: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user password hash.
    pub fn update_user_password(&self, id: &str, password_hash: &str) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };

        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![password_hash, id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Apply a partial profile update.
    pub fn update_user_profile(&self, id: &str, update: &ProfileUpdate) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        if update.is_empty() {
            return Ok(false);
        }

        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET
                    username = COALESCE(?1, username),
                    email = COALESCE(?2, email)
                 WHERE id = ?3",
                params![update.username, update.email, id],
            )
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    AppError::Validation("Username already exists".to_string())
                } else {
                    AppError::Internal(format!("Failed to update profile: {}", e))
                }
            })?;
        Ok(rows > 0)
    }

    /// Activate or deactivate an account.
    pub fn set_user_active(&self, id: &str, active: bool) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };

        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET is_active = ?1 WHERE id = ?2",
                params![active, id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update account: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    /// Delete user (sessions go with it).
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };

        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        let favorites: String = row.get(6)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get(4)?,
            is_active: row.get(5)?,
            favorites: decode_favorites(&favorites),
            created_at: row.get(7)?,
            last_login: row.get(8)?,
        })
    }

    // ========== FAVORITE OPERATIONS ==========

    /// Add a book to a user's favorites. Returns whether the list changed.
    pub fn add_favorite(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let (Some(user_id), Some(book_id)) = (parse_id(user_id), parse_id(book_id)) else {
            return Ok(false);
        };

        // Read and write under the same lock so concurrent adds cannot duplicate.
        let conn = self.conn.lock();
        let Some(mut favorites) = Self::load_favorites(&conn, &user_id)? else {
            return Ok(false);
        };
        if favorites.contains(&book_id) {
            return Ok(false);
        }

        favorites.push(book_id);
        Self::store_favorites(&conn, &user_id, &favorites)?;
        Ok(true)
    }

    /// Remove a book from a user's favorites. Returns whether the list changed.
    pub fn remove_favorite(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let (Some(user_id), Some(book_id)) = (parse_id(user_id), parse_id(book_id)) else {
            return Ok(false);
        };

        let conn = self.conn.lock();
        let Some(mut favorites) = Self::load_favorites(&conn, &user_id)? else {
            return Ok(false);
        };
        let before = favorites.len();
        favorites.retain(|id| id != &book_id);
        if favorites.len() == before {
            return Ok(false);
        }

        Self::store_favorites(&conn, &user_id, &favorites)?;
        Ok(true)
    }

    /// Get a user's favorite book IDs (possibly dangling).
    pub fn get_favorites(&self, user_id: &str) -> Result<Vec<String>> {
        let Some(user_id) = parse_id(user_id) else {
            return Ok(Vec::new());
        };

        let conn = self.conn.lock();
        Ok(Self::load_favorites(&conn, &user_id)?.unwrap_or_default())
    }

    /// Check whether a book is one of the user's favorites.
    pub fn is_favorite(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let Some(book_id) = parse_id(book_id) else {
            return Ok(false);
        };
        Ok(self.get_favorites(user_id)?.contains(&book_id))
    }

    fn load_favorites(conn: &Connection, user_id: &str) -> Result<Option<Vec<String>>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT favorites FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to get favorites: {}", e)))?;
        Ok(raw.map(|raw| decode_favorites(&raw)))
    }

    fn store_favorites(conn: &Connection, user_id: &str, favorites: &[String]) -> Result<()> {
        conn.execute(
            "UPDATE users SET favorites = ?1 WHERE id = ?2",
            params![encode_favorites(favorites)?, user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save favorites: {}", e)))?;
        Ok(())
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }

    // ========== BOOK OPERATIONS ==========

    /// Insert a new book.
    pub fn create_book(&self, fields: &BookFields) -> Result<Book> {
        let book = Book {
            id: new_id(),
            title: fields.title.clone(),
            author: fields.author.clone(),
            genre: fields.genre.clone(),
            year: fields.year,
            description: fields.description.clone(),
            image: fields.image.clone(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books (id, title, author, genre, year, description, image)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                book.id,
                book.title,
                book.author,
                book.genre,
                book.year,
                book.description,
                book.image,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create book: {}", e)))?;
        Ok(book)
    }

    /// Get book by ID. Malformed IDs are reported as absent.
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };

        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
            params![id],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// Get all books in insertion order.
    pub fn list_books(&self) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY rowid"))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map([], Self::row_to_book)
            .map_err(|e| AppError::Internal(format!("Failed to get all books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// Count books.
    pub fn count_books(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to count books: {}", e)))?;
        Ok(count as usize)
    }

    /// Case-insensitive substring search over title and author.
    pub fn search_books(&self, query: &str) -> Result<Vec<Book>> {
        let query = query.trim().to_lowercase();
        let books = self.list_books()?;

        Ok(books
            .into_iter()
            .filter(|b| {
                b.title.to_lowercase().contains(&query) || b.author.to_lowercase().contains(&query)
            })
            .collect())
    }

    /// Overwrite a book's editable fields.
    pub fn update_book(&self, id: &str, fields: &BookFields) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };

        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE books SET
                    title = ?1,
                    author = ?2,
                    genre = ?3,
                    year = ?4,
                    description = ?5,
                    image = ?6
                 WHERE id = ?7",
                params![
                    fields.title,
                    fields.author,
                    fields.genre,
                    fields.year,
                    fields.description,
                    fields.image,
                    id,
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update book: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete a single book by ID. Favorites pointing at it are left alone.
    pub fn delete_book(&self, id: &str) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };

        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM books WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            genre: row.get(3)?,
            year: row.get(4)?,
            description: row.get(5)?,
            image: row.get(6)?,
        })
    }
}

fn encode_favorites(favorites: &[String]) -> Result<String> {
    serde_json::to_string(favorites)
        .map_err(|e| AppError::Internal(format!("Failed to encode favorites: {}", e)))
}

fn decode_favorites(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Discarding unreadable favorites list");
        Vec::new()
    })
}
