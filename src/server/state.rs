//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::uploads::ImageStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Cover image storage.
    pub images: Arc<ImageStore>,
}

impl AppState {
    /// Create application state from already opened parts.
    pub fn new(config: Config, db: Database, auth: AuthService, images: ImageStore) -> Self {
        Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            images: Arc::new(images),
        }
    }

    /// Open the database and upload directory named by the config.
    pub fn from_config(config: Config) -> Result<Self> {
        let db = Database::open(&config.database.path)?;
        let images = ImageStore::open(&config.uploads.dir)?;
        let auth = auth_service(&config, db.clone());
        Ok(Self::new(config, db, auth, images))
    }

    /// Site title.
    pub fn title(&self) -> &str {
        &self.config.server.title
    }

    /// Whether book mutations require an admin.
    pub fn book_editing_requires_admin(&self) -> bool {
        !self.config.auth.open_book_editing
    }
}

/// Build the auth service described by the config.
pub fn auth_service(config: &Config, db: Database) -> AuthService {
    AuthService::new(
        db,
        config.auth.session_days,
        config.auth.registration_enabled(),
    )
    .with_admin_code(config.auth.admin_code())
    .with_role_selection(config.auth.allow_role_selection)
}
