use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Book catalog server with accounts, roles and favorites.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookshelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKSHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Delete and recreate the bootstrap admin account on startup.
        #[arg(long)]
        bootstrap_admin: bool,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Add a new user.
    Add {
        /// Username.
        username: String,
        /// Email address.
        #[arg(short, long)]
        email: String,
        /// Password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
        /// User role (client, admin or super_admin).
        #[arg(short, long, default_value = "client")]
        role: String,
    },

    /// Delete a user.
    Del {
        /// Username to delete.
        username: String,
    },

    /// List all users.
    List,

    /// Change user password.
    Passwd {
        /// Username.
        username: String,
        /// New password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Change user role.
    Role {
        /// Username.
        username: String,
        /// New role (client, admin or super_admin).
        role: String,
    },

    /// Re-enable a deactivated account.
    Enable {
        /// Username.
        username: String,
    },

    /// Deactivate an account (it can no longer log in).
    Disable {
        /// Username.
        username: String,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Cover image uploads.
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Startup admin bootstrap.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Site title shown in page headers.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        5001,
    )
}

fn default_title() -> String {
    "Book Library".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/bookshelf.db")
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Registration mode: "open", "disabled".
    #[serde(default = "default_registration")]
    pub registration: String,

    /// Session cookie duration in days.
    #[serde(default = "default_session_days")]
    pub session_days: u32,

    /// Shared secret required by the admin registration form.
    /// Empty disables admin self-registration.
    #[serde(default = "default_admin_code")]
    pub admin_code: String,

    /// Honor the `role` field of the public registration form.
    #[serde(default)]
    pub allow_role_selection: bool,

    /// Let anonymous visitors add, edit and delete books.
    #[serde(default)]
    pub open_book_editing: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            registration: default_registration(),
            session_days: default_session_days(),
            admin_code: default_admin_code(),
            allow_role_selection: false,
            open_book_editing: false,
        }
    }
}

fn default_registration() -> String {
    "open".to_string()
}

fn default_session_days() -> u32 {
    30
}

fn default_admin_code() -> String {
    "ADMIN2024".to_string()
}

impl AuthConfig {
    /// Check if registration is enabled.
    pub fn registration_enabled(&self) -> bool {
        self.registration == "open"
    }

    /// Admin registration code, if admin self-registration is enabled.
    pub fn admin_code(&self) -> Option<&str> {
        Some(self.admin_code.as_str()).filter(|code| !code.is_empty())
    }
}

/// Upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory holding uploaded cover images.
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,

    /// Maximum request body size for book forms, in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

fn default_max_bytes() -> usize {
    16 * 1024 * 1024
}

/// Startup admin bootstrap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Delete and recreate the admin account on every start.
    #[serde(default)]
    pub enabled: bool,

    /// Admin username.
    #[serde(default = "default_bootstrap_username")]
    pub username: String,

    /// Admin email.
    #[serde(default = "default_bootstrap_email")]
    pub email: String,

    /// Admin password.
    #[serde(default = "default_bootstrap_password")]
    pub password: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: default_bootstrap_username(),
            email: default_bootstrap_email(),
            password: default_bootstrap_password(),
        }
    }
}

fn default_bootstrap_username() -> String {
    "admin".to_string()
}

fn default_bootstrap_email() -> String {
    "admin@booklibrary.com".to_string()
}

fn default_bootstrap_password() -> String {
    "admin123".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("bookshelf.toml"),
            dirs::config_dir()
                .map(|p| p.join("bookshelf").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/bookshelf/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# bookshelf configuration

[server]
bind = "0.0.0.0:5001"
title = "Book Library"

[database]
# path = "/var/lib/bookshelf/bookshelf.db"

[auth]
# Registration mode: "open" or "disabled"
registration = "open"
# Session duration in days
session_days = 30
# Code required by /auth/register-admin (empty disables it)
admin_code = "ADMIN2024"
# Let the public registration form pick "admin" as role
allow_role_selection = false
# Let anonymous visitors add, edit and delete books
open_book_editing = false

[uploads]
# dir = "/var/lib/bookshelf/uploads"
max_bytes = 16777216

[bootstrap]
# Delete and recreate this account as super_admin on every start.
# Development convenience only.
enabled = false
username = "admin"
email = "admin@booklibrary.com"
password = "admin123"
"#
        .to_string()
    }
}
