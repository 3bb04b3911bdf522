//! Command-line client that keeps a session on disk.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use keyward::session::{
    FileStorage, LoginHandle, ProfileImage, ReauthHandler, RegisterForm, SessionClient,
    SessionManager,
};

#[derive(Parser, Debug)]
#[command(name = "keyward-client", about = "Log in to a keyward server and call it")]
struct Cli {
    /// Server base URL
    #[arg(long, env = "KEYWARD_SERVER", default_value = "http://localhost:7291")]
    server: String,

    /// Where the session is stored (default: ~/.keyward/session.json)
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and start a session
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        /// Profile image to upload
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Log in with an email address or phone number
    Login { login: String },
    /// End the session
    Logout,
    /// Show the logged-in user's profile
    Whoami,
    /// Show what the stored session contains
    Status,
    /// Exchange the refresh token for a new pair now
    Refresh,
}

/// Tells the user to log in again once the stored session is gone.
struct PrintLoginHint;

impl ReauthHandler for PrintLoginHint {
    fn redirect_to_login(&self) {
        eprintln!("Session ended. Run `keyward-client login <email|phone>` to sign in again.");
    }
}

/// Password from KEYWARD_PASSWORD, or the first line of stdin.
fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var("KEYWARD_PASSWORD") {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

fn image_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn load_image(path: &Path) -> Result<ProfileImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    Ok(ProfileImage {
        file_name,
        content_type: image_content_type(path).to_string(),
        bytes,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    let session_file = cli
        .session_file
        .clone()
        .unwrap_or_else(FileStorage::default_path);
    let session = SessionManager::open(FileStorage::new(&session_file))
        .with_context(|| format!("Failed to load session from {}", session_file.display()))?;

    let client = SessionClient::with_timeout(
        &cli.server,
        Arc::new(session),
        Duration::from_secs(cli.timeout),
    )
    .context("Failed to create client")?
    .with_reauth_handler(Arc::new(PrintLoginHint));

    match cli.command {
        Command::Register {
            name,
            email,
            phone,
            image,
        } => {
            let image = image.as_deref().map(load_image).transpose()?;
            let password = read_password()?;
            let user = client
                .register(RegisterForm {
                    name,
                    email,
                    phone,
                    password,
                    image,
                })
                .await
                .context("Registration failed")?;
            println!("Registered {} ({})", user.email, user.id);
        }
        Command::Login { login } => {
            let password = read_password()?;
            let user = client
                .login(LoginHandle::parse(&login), &password)
                .await
                .context("Login failed")?;
            println!("Logged in as {} ({})", user.email, user.role.as_str());
        }
        Command::Logout => {
            client.logout().await.context("Logout failed")?;
            println!("Logged out");
        }
        Command::Whoami => {
            let user = client.me().await.context("Request failed")?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::Status => {
            let state = client.session().current();
            match state.identity_id {
                Some(id) => println!(
                    "Session for {} on {} stored at {}",
                    id,
                    client.base_url(),
                    session_file.display()
                ),
                None => println!("No session stored at {}", session_file.display()),
            }
        }
        Command::Refresh => {
            client.refresh_now().await.context("Refresh failed")?;
            println!("Session renewed");
        }
    }

    Ok(())
}
