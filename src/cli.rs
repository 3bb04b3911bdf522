//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::{Database, NewUser, UserRole};
use clap::Parser;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";
const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "keyward", about = "User accounts with JWT access and refresh tokens")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "keyward.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer the ACCESS_TOKEN_SECRET env var
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the REFRESH_TOKEN_SECRET env var
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, default_value_t = crate::jwt::ACCESS_TOKEN_DURATION_SECS)]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value_t = crate::jwt::REFRESH_TOKEN_DURATION_SECS)]
    pub refresh_token_ttl: u64,

    /// Create (or promote) an admin with this email on startup. Password is read from ADMIN_PASSWORD
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Disable new user signups (admin creation via --create-admin still works)
    #[arg(long)]
    pub no_signup: bool,

    /// Use the X-Forwarded-For header for client IPs. Only enable behind a trusted proxy
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Login attempts allowed per minute per IP
    #[arg(long, default_value_t = crate::rate_limit::DEFAULT_LOGIN_PER_MINUTE)]
    pub login_rate_limit: u32,

    /// Registrations allowed per minute per IP
    #[arg(long, default_value_t = crate::rate_limit::DEFAULT_REGISTER_PER_MINUTE)]
    pub register_rate_limit: u32,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a variable and remove it from the environment.
fn take_env(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    // SAFETY: We're single-threaded at this point during startup,
    // and no other code is reading this environment variable.
    unsafe { std::env::remove_var(name) };
    Some(value)
}

/// Load one secret from its environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
fn load_secret(env_name: &str, file: Option<&str>, flag: &str) -> Option<String> {
    let secret = if let Some(secret) = take_env(env_name) {
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the environment variable (recommended) or use {}",
            env_name, flag
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_name, MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the access and refresh secrets. They must both be present and must differ.
pub fn load_jwt_secrets(
    access_secret_file: Option<&str>,
    refresh_secret_file: Option<&str>,
) -> Option<(String, String)> {
    load_secret_pair(
        (ACCESS_SECRET_ENV, access_secret_file),
        (REFRESH_SECRET_ENV, refresh_secret_file),
    )
}

/// [`load_jwt_secrets`] with the environment variable names passed in.
fn load_secret_pair(
    (access_env, access_file): (&str, Option<&str>),
    (refresh_env, refresh_file): (&str, Option<&str>),
) -> Option<(String, String)> {
    let access = load_secret(access_env, access_file, "--access-secret-file")?;
    let refresh = load_secret(refresh_env, refresh_file, "--refresh-secret-file")?;

    if access == refresh {
        error!("Access and refresh token secrets must be different");
        return None;
    }

    Some((access, refresh))
}

/// Handle the --create-admin flag: create the admin, or promote an existing user.
/// Returns false if startup should abort.
pub async fn handle_create_admin(db: &Database, email: &str) -> bool {
    let email = email.trim().to_lowercase();

    match db.users().get_by_login(&email).await {
        Ok(Some(existing)) if existing.role == UserRole::Admin => {
            info!(email = %email, "Admin already exists");
            true
        }
        Ok(Some(existing)) => match db.users().set_role(&existing.id, UserRole::Admin).await {
            Ok(_) => {
                info!(email = %email, "Existing user promoted to admin");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to promote user");
                false
            }
        },
        Ok(None) => {
            let Some(password) = take_env(ADMIN_PASSWORD_ENV) else {
                error!("{} is required to create a new admin", ADMIN_PASSWORD_ENV);
                return false;
            };

            let new_user = NewUser {
                name: "Administrator".to_string(),
                email: email.clone(),
                phone: None,
                password,
                role: UserRole::Admin,
                image: None,
            };

            match db.users().create(new_user).await {
                Ok(user) => {
                    info!(email = %email, user_id = %user.id, "Admin user created");
                    true
                }
                Err(e) => {
                    error!(error = %e, "Failed to create admin user");
                    false
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, access_secret: String, refresh_secret: String) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        access_token_ttl: args.access_token_ttl,
        refresh_token_ttl: args.refresh_token_ttl,
        no_signup: args.no_signup,
        trust_forwarded_for: args.trust_forwarded_for,
        login_per_minute: args.login_rate_limit,
        register_per_minute: args.register_rate_limit,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
