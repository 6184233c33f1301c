//! bookshelf server entry point.

use bookshelf::{
    config::{Cli, Command, Config, UserCommand},
    db::{Database, Role, timestamp_to_datetime},
    server::{self, AppState},
};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired sessions are purged while serving.
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::User { action }) => cmd_user(action, &config),
        Some(Command::Serve {
            bind,
            bootstrap_admin,
        }) => cmd_serve(config, bind, bootstrap_admin).await,
        None => cmd_serve(config, None, false).await,
    }
}

/// Initialize config and database.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    std::fs::create_dir_all(&config.uploads.dir)?;
    println!("Created upload directory: {}", config.uploads.dir.display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: bookshelf user add <username> --email <email> --role admin");

    Ok(())
}

/// User management commands.
fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let auth = server::auth_service(config, db);

    match action {
        UserCommand::Add {
            username,
            email,
            password,
            role,
        } => {
            let role = role.parse::<Role>().map_err(anyhow::Error::msg)?;
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let user = auth.create_user(&username, &email, &password, role)?;
            println!(
                "Created user: {} (role: {}, id: {})",
                user.username, user.role, user.id
            );
        }

        UserCommand::Del { username } => {
            if auth.delete_user_by_username(&username)? {
                println!("Deleted user: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }

        UserCommand::List => {
            let users = auth.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!(
                    "{:<20} {:<12} {:<8} {:<36} LAST LOGIN",
                    "USERNAME", "ROLE", "ACTIVE", "ID"
                );
                println!("{}", "-".repeat(96));
                for user in users {
                    let last_login = user
                        .last_login
                        .map(|ts| timestamp_to_datetime(ts).format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<20} {:<12} {:<8} {:<36} {}",
                        user.username,
                        user.role,
                        if user.is_active { "yes" } else { "no" },
                        user.id,
                        last_login
                    );
                }
            }
        }

        UserCommand::Passwd { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("New password: ")?,
            };

            if auth.reset_password(&username, &password)? {
                println!("Password changed for: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }

        UserCommand::Role { username, role } => {
            let role = role.parse::<Role>().map_err(anyhow::Error::msg)?;
            if auth.set_role(&username, role)? {
                println!("Role of {} set to {}", username, role);
            } else {
                println!("User not found: {}", username);
            }
        }

        UserCommand::Enable { username } => {
            if auth.set_active(&username, true)? {
                println!("Enabled user: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }

        UserCommand::Disable { username } => {
            if auth.set_active(&username, false)? {
                println!("Disabled user: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<std::net::SocketAddr>,
    bootstrap_admin: bool,
) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if bootstrap_admin {
        config.bootstrap.enabled = true;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookshelf=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        uploads = %config.uploads.dir.display(),
        "Starting bookshelf server"
    );

    let bind = config.server.bind;
    let state = AppState::from_config(config)?;

    if state.config.bootstrap.enabled {
        let bootstrap = &state.config.bootstrap;
        state
            .auth
            .bootstrap_admin(&bootstrap.username, &bootstrap.email, &bootstrap.password)?;
    }

    let purged = state.db.cleanup_expired_sessions()?;
    if purged > 0 {
        tracing::info!(count = purged, "Purged expired sessions");
    }

    let db = state.db.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        ticker.tick().await; // Skip first immediate tick

        loop {
            ticker.tick().await;
            match db.cleanup_expired_sessions() {
                Ok(count) => tracing::debug!(count, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
            }
        }
    });

    let app = server::create_router(state);

    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
