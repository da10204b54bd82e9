//! Command-line client for a running roster server.
//!
//! Subcommands for the directory service:
//! - `register <username>` - Create an account
//! - `login <username>` - Log in and store the session token
//! - `logout` - Destroy the current session
//! - `whoami` - Show the logged-in user's profile
//! - `departments` - List departments
//! - `users` - List users, with optional search
//! - `passwd` - Change the password
//!
//! The client runs the same field checks the server enforces before
//! sending anything; the server re-validates regardless. The token
//! returned by `login` is kept in a session file so later invocations
//! stay authenticated.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::error::ErrorResponse;
use crate::api::validation;
use crate::db::{
    ChangePasswordRequest, Department, LoginRequest, LoginResponse, MessageResponse,
    RegisterRequest, UserBasic, UserResponse,
};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "roster")]
#[command(author, version, about = "A small staff directory and session service", long_about = None)]
pub struct Cli {
    /// Path to configuration file (server mode)
    #[arg(short, long, default_value = "roster.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// API URL to connect to (default: http://localhost:8080)
    #[arg(long, env = "ROSTER_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Session token (overrides the session file)
    #[arg(long, env = "ROSTER_TOKEN")]
    pub token: Option<String>,

    /// Where `login` keeps the session token between invocations
    #[arg(long, env = "ROSTER_SESSION_FILE", default_value = ".roster-session")]
    pub session_file: PathBuf,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a new account (prompts for the password)
    Register {
        /// Username for the new account
        username: String,
        /// Email address
        #[arg(long)]
        email: String,
        /// First name
        #[arg(long)]
        first_name: String,
        /// Last name
        #[arg(long)]
        last_name: String,
    },

    /// Log in and store the session token (prompts for the password)
    Login {
        /// Username to log in as
        username: String,
    },

    /// Destroy the current session
    Logout,

    /// Show the logged-in user's profile
    Whoami,

    /// List departments
    Departments,

    /// List users (everyone but you)
    Users {
        /// Case-insensitive substring match on username and names
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Change the password (prompts for current and new)
    Passwd,
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

/// Create an HTTP client with the given token
fn create_client(token: Option<&str>) -> Result<Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", token)
                .parse()
                .context("Invalid token format")?,
        );
    }

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Register {
            username,
            email,
            first_name,
            last_name,
        }) => cmd_register(cli, username, email, first_name, last_name).await,
        Some(Commands::Login { username }) => cmd_login(cli, username).await,
        Some(Commands::Logout) => cmd_logout(cli).await,
        Some(Commands::Whoami) => cmd_whoami(cli).await,
        Some(Commands::Departments) => cmd_departments(cli).await,
        Some(Commands::Users { search }) => cmd_users(cli, search.as_deref()).await,
        Some(Commands::Passwd) => cmd_passwd(cli).await,
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

/// Register a new account
async fn cmd_register(
    cli: &Cli,
    username: &str,
    email: &str,
    first_name: &str,
    last_name: &str,
) -> Result<()> {
    // The same pre-flight checks the registration form runs. The server
    // re-validates; this just saves a round trip for the common mistakes.
    if let Err(msg) = validation::validate_username(username) {
        bail!(msg);
    }
    if let Err(msg) = validation::validate_email(email) {
        bail!(msg);
    }

    let password = prompt("Password: ")?;
    let confirm = prompt("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    if let Err(msg) = validation::validate_password(&password) {
        bail!(msg);
    }

    let client = create_client(None)?;
    let url = format!("{}/api/auth/register", cli.api_url);
    let response = client
        .post(&url)
        .json(&RegisterRequest {
            username: username.to_string(),
            password,
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })
        .send()
        .await
        .context("Failed to connect to server. Is roster running?")?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let user: UserResponse = response
        .json()
        .await
        .context("Failed to parse registration response")?;

    println!("Registered {} ({}).", user.username, display_name(&user.first_name, &user.last_name));
    println!("Log in with 'roster login {}'.", user.username);
    Ok(())
}

/// Log in and store the session token
async fn cmd_login(cli: &Cli, username: &str) -> Result<()> {
    let password = prompt("Password: ")?;

    let client = create_client(None)?;
    let url = format!("{}/api/auth/login", cli.api_url);
    let response = client
        .post(&url)
        .json(&LoginRequest {
            username: username.to_string(),
            password,
        })
        .send()
        .await
        .context("Failed to connect to server. Is roster running?")?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let login: LoginResponse = response
        .json()
        .await
        .context("Failed to parse login response")?;

    save_token(&cli.session_file, &login.token)?;

    println!(
        "Logged in as {} ({}).",
        login.user.username,
        display_name(&login.user.first_name, &login.user.last_name)
    );
    Ok(())
}

/// Destroy the current session
async fn cmd_logout(cli: &Cli) -> Result<()> {
    let token = resolve_token(cli);
    let client = create_client(token.as_deref())?;

    let url = format!("{}/api/auth/logout", cli.api_url);
    let response = client
        .post(&url)
        .send()
        .await
        .context("Failed to connect to server. Is roster running?")?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let reply: MessageResponse = response
        .json()
        .await
        .context("Failed to parse logout response")?;

    clear_token(&cli.session_file);
    println!("{}", reply.message);
    Ok(())
}

/// Show the logged-in user's profile
async fn cmd_whoami(cli: &Cli) -> Result<()> {
    let client = create_client(resolve_token(cli).as_deref())?;

    let url = format!("{}/api/auth/me", cli.api_url);
    let response = client
        .get(&url)
        .send()
        .await
        .context("Failed to connect to server. Is roster running?")?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let user: UserResponse = response
        .json()
        .await
        .context("Failed to parse profile response")?;

    println!();
    println!("Username:    {}", user.username);
    println!("Name:        {}", display_name(&user.first_name, &user.last_name));
    println!("Email:       {}", user.email);
    println!(
        "Department:  {}",
        user.department.as_ref().map(|d| d.name.as_str()).unwrap_or("-")
    );
    println!("Role:        {}", user.role);
    println!();
    Ok(())
}

/// List departments
async fn cmd_departments(cli: &Cli) -> Result<()> {
    let client = create_client(None)?;

    let url = format!("{}/api/departments", cli.api_url);
    let response = client
        .get(&url)
        .send()
        .await
        .context("Failed to connect to server. Is roster running?")?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let departments: Vec<Department> = response
        .json()
        .await
        .context("Failed to parse departments response")?;

    if departments.is_empty() {
        println!("No departments found.");
        return Ok(());
    }

    println!();
    println!("{:<36}  {:<30}", "ID", "NAME");
    println!("{}", "-".repeat(68));
    for department in departments {
        println!("{:<36}  {:<30}", department.id, truncate(&department.name, 30));
    }
    println!();
    Ok(())
}

/// List users, with optional search
async fn cmd_users(cli: &Cli, search: Option<&str>) -> Result<()> {
    let client = create_client(resolve_token(cli).as_deref())?;

    let url = format!("{}/api/users", cli.api_url);
    let mut request = client.get(&url);
    if let Some(term) = search {
        request = request.query(&[("search", term)]);
    }

    let response = request
        .send()
        .await
        .context("Failed to connect to server. Is roster running?")?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let users: Vec<UserBasic> = response
        .json()
        .await
        .context("Failed to parse users response")?;

    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!();
    println!(
        "{:<20}  {:<30}  {:<20}  {:<10}",
        "USERNAME", "NAME", "DEPARTMENT", "ROLE"
    );
    println!("{}", "-".repeat(86));
    for user in users {
        let department = user.department.as_ref().map(|d| d.name.as_str()).unwrap_or("-");
        println!(
            "{:<20}  {:<30}  {:<20}  {:<10}",
            truncate(&user.username, 20),
            truncate(&display_name(&user.first_name, &user.last_name), 30),
            truncate(department, 20),
            user.role
        );
    }
    println!();
    Ok(())
}

/// Change the password
async fn cmd_passwd(cli: &Cli) -> Result<()> {
    let current = prompt("Current password: ")?;
    let new = prompt("New password: ")?;
    let confirm = prompt("Confirm new password: ")?;

    // The settings form's checks, run before anything leaves the machine.
    // The server applies the same policy again.
    if let Err(msg) = validation::validate_password_change(&current, &new, &confirm) {
        bail!(msg);
    }

    let client = create_client(resolve_token(cli).as_deref())?;
    let url = format!("{}/api/auth/change-password", cli.api_url);
    let response = client
        .post(&url)
        .json(&ChangePasswordRequest {
            current_password: current,
            new_password: new,
            confirm_password: confirm,
        })
        .send()
        .await
        .context("Failed to connect to server. Is roster running?")?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let reply: MessageResponse = response
        .json()
        .await
        .context("Failed to parse change-password response")?;

    println!("{}", reply.message);
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Turn a non-success response into a readable error. The server's error
/// envelope carries a machine-readable code; `unauthenticated` gets a
/// login hint, everything else surfaces its message as-is.
async fn api_error(response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(envelope) if envelope.error.code == "unauthenticated" => {
            anyhow::anyhow!("Not logged in. Run 'roster login <username>' first.")
        }
        Ok(envelope) => anyhow::anyhow!(envelope.error.message),
        Err(_) => anyhow::anyhow!("Server returned error {}: {}", status, body),
    }
}

/// The token for this invocation: an explicit --token / env value wins,
/// otherwise whatever `login` left in the session file.
fn resolve_token(cli: &Cli) -> Option<String> {
    cli.token.clone().or_else(|| load_token(&cli.session_file))
}

fn save_token(path: &Path, token: &str) -> Result<()> {
    std::fs::write(path, token)
        .with_context(|| format!("Failed to write session file: {}", path.display()))
}

fn load_token(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let token = contents.trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn clear_token(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Read a line from stdin with a prompt
fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn display_name(first: &str, last: &str) -> String {
    format!("{} {}", first, last)
}

/// Truncate a string to max length with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len.saturating_sub(3)])
    }
}
