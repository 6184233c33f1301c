//! Catalog queries built on top of the store: browsing, tallies, favorites.

use crate::db::{Book, Database, Role};
use crate::error::{AppError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of books shown on the admin dashboard.
pub const ADMIN_RECENT_BOOKS: usize = 5;

/// Number of books shown on the client dashboard.
pub const CLIENT_RECENT_BOOKS: usize = 6;

/// Genre key used for books without one.
pub const UNKNOWN_GENRE: &str = "Unknown";

/// List books, optionally searched by title/author and filtered by genre.
pub fn browse(db: &Database, search: Option<&str>, genre: Option<&str>) -> Result<Vec<Book>> {
    let books = match search.map(str::trim).filter(|q| !q.is_empty()) {
        Some(query) => db.search_books(query)?,
        None => db.list_books()?,
    };

    Ok(match genre.map(str::trim).filter(|g| !g.is_empty()) {
        Some(genre) => filter_by_genre(books, genre),
        None => books,
    })
}

/// Keep books whose genre equals `genre`, ignoring case.
pub fn filter_by_genre(books: Vec<Book>, genre: &str) -> Vec<Book> {
    let genre = genre.to_lowercase();
    books
        .into_iter()
        .filter(|b| b.genre.to_lowercase() == genre)
        .collect()
}

/// Sorted distinct non-empty genres.
pub fn genres(books: &[Book]) -> Vec<String> {
    let mut genres: Vec<String> = books
        .iter()
        .map(|b| b.genre.trim())
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect();
    genres.sort();
    genres.dedup();
    genres
}

/// First `limit` books in store order.
pub fn recent_books(db: &Database, limit: usize) -> Result<Vec<Book>> {
    let mut books = db.list_books()?;
    books.truncate(limit);
    Ok(books)
}

/// Catalog statistics served by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    /// Total number of books.
    pub total_books: usize,
    /// Total number of users.
    pub total_users: usize,
    /// Books per genre.
    pub genres: BTreeMap<String, usize>,
    /// Users per role.
    pub user_roles: BTreeMap<String, usize>,
}

impl LibraryStats {
    /// Tally books per genre and users per role.
    pub fn collect(db: &Database) -> Result<Self> {
        let books = db.list_books()?;
        let users = db.list_users()?;

        let mut genres = BTreeMap::new();
        for book in &books {
            let genre = match book.genre.trim() {
                "" => UNKNOWN_GENRE,
                genre => genre,
            };
            *genres.entry(genre.to_string()).or_insert(0) += 1;
        }

        let mut user_roles: BTreeMap<String, usize> = [Role::Admin, Role::Client]
            .iter()
            .map(|role| (role.to_string(), 0))
            .collect();
        for user in &users {
            *user_roles.entry(user.role.to_string()).or_insert(0) += 1;
        }

        Ok(Self {
            total_books: books.len(),
            total_users: users.len(),
            genres,
            user_roles,
        })
    }
}

/// Resolve favorite IDs to books, skipping IDs whose book no longer exists.
pub fn resolve_favorites(db: &Database, favorite_ids: &[String]) -> Result<Vec<Book>> {
    let mut books = Vec::with_capacity(favorite_ids.len());
    for id in favorite_ids {
        match db.get_book(id)? {
            Some(book) => books.push(book),
            None => tracing::debug!(book_id = %id, "Skipping dangling favorite"),
        }
    }
    Ok(books)
}

/// What a toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteAction {
    /// The book was added to favorites.
    Added,
    /// The book was removed from favorites.
    Removed,
}

/// Result of toggling a favorite.
#[derive(Debug, Clone)]
pub struct ToggleOutcome {
    /// The book that was toggled.
    pub book: Book,
    /// What happened.
    pub action: FavoriteAction,
    /// Whether the book is a favorite afterwards.
    pub is_favorite: bool,
}

/// Flip a book's membership in the user's favorites.
pub fn toggle_favorite(db: &Database, user_id: &str, book_id: &str) -> Result<ToggleOutcome> {
    let book = db
        .get_book(book_id)?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

    let action = if db.is_favorite(user_id, &book.id)? {
        db.remove_favorite(user_id, &book.id)?;
        FavoriteAction::Removed
    } else {
        db.add_favorite(user_id, &book.id)?;
        FavoriteAction::Added
    };

    Ok(ToggleOutcome {
        book,
        action,
        is_favorite: action == FavoriteAction::Added,
    })
}
