//! Authentication and account management.

use crate::db::{Database, ProfileUpdate, Role, Session, User, new_id, now_timestamp};
use crate::error::{AppError, Result};
use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::{OsRng, RngCore},
    },
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use std::sync::LazyLock;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Message shared by every failed login, whatever the cause.
pub const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Hash verified when the username is unknown, so both failure paths cost the same.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("bookshelf-dummy-password").unwrap_or_default());

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a secure random token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Public registration form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Registration {
    /// Desired username.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Password.
    pub password: String,
    /// Password confirmation.
    pub confirm_password: String,
    /// Requested role (only honored when role selection is allowed).
    pub role: Option<String>,
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    session_duration_days: u32,
    registration_enabled: bool,
    admin_code: Option<String>,
    allow_role_selection: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, session_duration_days: u32, registration_enabled: bool) -> Self {
        Self {
            db,
            session_duration_days,
            registration_enabled,
            admin_code: None,
            allow_role_selection: false,
        }
    }

    /// Enable admin self-registration guarded by a shared code.
    pub fn with_admin_code(mut self, code: Option<&str>) -> Self {
        self.admin_code = code.map(str::to_string);
        self
    }

    /// Honor the role requested on the public registration form.
    pub fn with_role_selection(mut self, allowed: bool) -> Self {
        self.allow_role_selection = allowed;
        self
    }

    /// Session lifetime in seconds.
    pub fn session_max_age(&self) -> i64 {
        self.session_duration_days as i64 * 24 * 60 * 60
    }

    /// Register a new user through the public form.
    pub fn register(&self, form: &Registration) -> Result<User> {
        if !self.registration_enabled {
            return Err(AppError::Validation("Registration is disabled".to_string()));
        }

        let role = if self.allow_role_selection {
            match form.role.as_deref().map(str::parse::<Role>) {
                None => Role::Client,
                Some(Ok(role)) if role.assignable() => role,
                Some(_) => return Err(AppError::Validation("Invalid role specified".to_string())),
            }
        } else {
            Role::Client
        };

        self.register_as(form, role)
    }

    /// Register an administrator using the shared admin code.
    pub fn register_admin(&self, form: &Registration, admin_code: &str) -> Result<User> {
        let Some(expected) = self.admin_code.as_deref() else {
            return Err(AppError::Validation(
                "Admin registration is disabled".to_string(),
            ));
        };

        if admin_code != expected {
            tracing::warn!(username = %form.username, "Admin registration with invalid code");
            return Err(AppError::Validation("Invalid admin code".to_string()));
        }

        self.register_as(form, Role::Admin)
    }

    fn register_as(&self, form: &Registration, role: Role) -> Result<User> {
        if form.password != form.confirm_password {
            return Err(AppError::Validation("Passwords do not match".to_string()));
        }

        let user = self.insert_user(form.username.trim(), form.email.trim(), &form.password, role)?;
        tracing::info!(username = %user.username, role = %user.role, "User registered");
        Ok(user)
    }

    /// Create a new user (CLI and bootstrap). Unlike self-registration, the
    /// username, email and password length are checked here.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User> {
        let username = username.trim();
        validate_username(username)?;

        let email = email.trim();
        if !email.contains('@') {
            return Err(AppError::Validation(
                "Please enter a valid email address".to_string(),
            ));
        }

        validate_password(password)?;
        self.insert_user(username, email, password, role)
    }

    fn insert_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User> {
        // Friendly check first; the UNIQUE index settles concurrent registrations.
        if self.db.get_user_by_username(username)?.is_some() {
            return Err(AppError::Validation("Username already exists".to_string()));
        }

        let user = User {
            id: new_id(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            role,
            is_active: true,
            favorites: Vec::new(),
            created_at: now_timestamp(),
            last_login: None,
        };

        self.db.create_user(&user)?;
        Ok(user)
    }

    /// Check credentials without opening a session.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let Some(user) = self.db.get_user_by_username(username.trim())? else {
            let _ = verify_password(password, &DUMMY_HASH);
            return Err(AppError::Validation(INVALID_CREDENTIALS.to_string()));
        };

        if !verify_password(password, &user.password_hash)? || !user.is_active {
            return Err(AppError::Validation(INVALID_CREDENTIALS.to_string()));
        }

        Ok(user)
    }

    /// Login and create a session.
    pub fn login(&self, username: &str, password: &str) -> Result<(User, String)> {
        let user = self.authenticate(username, password)?;
        let token = self.open_session(&user)?;
        tracing::info!(username = %user.username, "User logged in");
        Ok((user, token))
    }

    /// Open a session for an already verified user.
    pub fn open_session(&self, user: &User) -> Result<String> {
        self.db.update_user_last_login(&user.id)?;

        let token = generate_token();
        let session = Session {
            token: token.clone(),
            user_id: user.id.clone(),
            expires_at: now_timestamp() + self.session_max_age(),
        };

        self.db.create_session(&session)?;
        Ok(token)
    }

    /// Validate a session token and return the user.
    pub fn validate_token(&self, token: &str) -> Result<Option<User>> {
        let session = match self.db.get_session(token)? {
            Some(s) => s,
            None => return Ok(None),
        };

        // Check expiration
        if session.expires_at < now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        Ok(self
            .db
            .get_user_by_id(&session.user_id)?
            .filter(|user| user.is_active))
    }

    /// Logout (delete session).
    pub fn logout(&self, token: &str) -> Result<()> {
        self.db.delete_session(token)
    }

    /// Self-service password change.
    pub fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<()> {
        if !verify_password(current_password, &user.password_hash)? {
            return Err(AppError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        if new_password != confirm_password {
            return Err(AppError::Validation("New passwords do not match".to_string()));
        }

        validate_password(new_password)?;

        self.db
            .update_user_password(&user.id, &hash_password(new_password)?)?;
        tracing::info!(username = %user.username, "Password changed");
        Ok(())
    }

    /// Reset a password by username (CLI).
    pub fn reset_password(&self, username: &str, new_password: &str) -> Result<bool> {
        validate_password(new_password)?;

        let Some(user) = self.db.get_user_by_username(username)? else {
            return Ok(false);
        };
        self.db
            .update_user_password(&user.id, &hash_password(new_password)?)
    }

    /// Self-service profile update. Blank fields are left unchanged.
    pub fn update_profile(&self, user: &User, update: &ProfileUpdate) -> Result<User> {
        if let Some(username) = update.username.as_deref()
            && username != user.username
        {
            validate_username(username)?;
            if self.db.get_user_by_username(username)?.is_some() {
                return Err(AppError::Validation("Username already exists".to_string()));
            }
        }

        if let Some(email) = update.email.as_deref()
            && !email.contains('@')
        {
            return Err(AppError::Validation(
                "Please enter a valid email address".to_string(),
            ));
        }

        self.db.update_user_profile(&user.id, update)?;
        self.db
            .get_user_by_id(&user.id)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Change another user's role. Only `admin` and `client` can be assigned.
    pub fn update_role(&self, user_id: &str, role: &str) -> Result<()> {
        let role = role
            .parse::<Role>()
            .ok()
            .filter(Role::assignable)
            .ok_or_else(|| AppError::Validation("Invalid role specified".to_string()))?;

        if !self.db.update_user_role(user_id, role)? {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!(user_id, role = %role, "User role updated");
        Ok(())
    }

    /// Set any role by username (CLI).
    pub fn set_role(&self, username: &str, role: Role) -> Result<bool> {
        match self.db.get_user_by_username(username)? {
            Some(user) => self.db.update_user_role(&user.id, role),
            None => Ok(false),
        }
    }

    /// Enable or disable an account by username (CLI).
    pub fn set_active(&self, username: &str, active: bool) -> Result<bool> {
        match self.db.get_user_by_username(username)? {
            Some(user) => self.db.set_user_active(&user.id, active),
            None => Ok(false),
        }
    }

    /// Delete a user on behalf of an administrator. Self-deletion is refused.
    pub fn delete_user(&self, actor: &User, user_id: &str) -> Result<()> {
        if crate::db::parse_id(user_id).as_deref() == Some(actor.id.as_str()) {
            return Err(AppError::Validation(
                "Cannot delete your own account".to_string(),
            ));
        }

        if !self.db.delete_user(user_id)? {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!(actor = %actor.username, user_id, "User deleted");
        Ok(())
    }

    /// Delete a user by username (CLI).
    pub fn delete_user_by_username(&self, username: &str) -> Result<bool> {
        match self.db.get_user_by_username(username)? {
            Some(user) => self.db.delete_user(&user.id),
            None => Ok(false),
        }
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }

    /// Delete the named account if present and recreate it as super admin.
    pub fn bootstrap_admin(&self, username: &str, email: &str, password: &str) -> Result<User> {
        if self.delete_user_by_username(username)? {
            tracing::warn!(username, "Existing admin user deleted");
        }

        let user = self.create_user(username, email, password, Role::SuperAdmin)?;
        tracing::warn!(username, "Super admin created by bootstrap");
        Ok(user)
    }

}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.chars().count() > 64 {
        return Err(AppError::Validation(
            "Username must be 1-64 characters".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, _, - and .".to_string(),
        ));
    }

    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
