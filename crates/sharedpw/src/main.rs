use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use sharedpw_server::Revealed;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "sharedpw", about = "sharedpw: one-time secret sharing", version)]
struct Cli {
    /// sharedpw server URL (default: http://localhost:8080 or $SHAREDPW_SERVER)
    #[arg(long, env = "SHAREDPW_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sharedpw HTTP server
    Serve {
        /// Port to listen on (default: $SHAREDPW_PORT or 8080)
        #[arg(long, env = "SHAREDPW_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $SHAREDPW_HOST or 0.0.0.0)
        #[arg(long, env = "SHAREDPW_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Deposit a value; prints its one-time id
    Push {
        /// The value to share. Encrypt it first; it is stored as given.
        value: String,
        /// Lifetime in hours, 1-72 (server default: 72)
        #[arg(long)]
        hours: Option<i64>,
        /// Only allow the reveal from this machine's address
        #[arg(long)]
        bind_ip: bool,
        /// Hint shown to the recipient
        #[arg(long, default_value = "")]
        hint: String,
        /// Mark the value as additionally password-protected
        #[arg(long)]
        has_password: bool,
        #[arg(long, default_value = "")]
        tag: String,
        #[arg(long, default_value = "")]
        iv: String,
        #[arg(long, default_value = "")]
        pw_tag: String,
        #[arg(long, default_value = "")]
        pw_iv: String,
    },
    /// Reveal a secret. This destroys it.
    Get {
        /// Secret id
        id: String,
    },
    /// Check a secret still exists without consuming it
    Check {
        /// Secret id
        id: String,
    },
    /// Print the shareable URL for a secret
    Share {
        /// Secret id
        id: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SHAREDPW_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,

        Commands::Push {
            value,
            hours,
            bind_ip,
            hint,
            has_password,
            tag,
            iv,
            pw_tag,
            pw_iv,
        } => {
            let body = serde_json::json!({
                "secret": STANDARD.encode(value.as_bytes()),
                "hours": hours,
                "bindIp": bind_ip,
                "hasPassword": has_password,
                "hint": hint,
                "tag": tag,
                "iv": iv,
                "pwTag": pw_tag,
                "pwIv": pw_iv,
            });
            cmd_push(&cli.server, &body).await
        }

        Commands::Get { id } => cmd_get(&cli.server, &id).await,

        Commands::Check { id } => cmd_check(&cli.server, &id).await,

        Commands::Share { id } => {
            println!("{}", secret_url(&cli.server, &id));
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = sharedpw_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };

    sharedpw_server::run(cfg).await
}

async fn cmd_push(server: &str, body: &Value) -> Result<()> {
    let client = Client::new();
    let resp = client
        .post(format!("{}/secrets", server.trim_end_matches('/')))
        .json(body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("server returned {status}: {}", error_text(&json));
    }

    let id = json["id"].as_str().context("response missing id")?;
    println!("{id}");
    println!("{}", secret_url(server, id));
    Ok(())
}

async fn cmd_get(server: &str, id: &str) -> Result<()> {
    let client = Client::new();
    let resp = client
        .get(secret_url(server, id))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let json: Value = resp.json().await.unwrap_or_default();
        anyhow::bail!("{}", error_text(&json));
    }

    let revealed: Revealed = resp.json().await.context("parse response")?;
    if !revealed.hint.is_empty() {
        eprintln!("hint: {}", revealed.hint);
    }
    if revealed.has_password {
        eprintln!("note: value is password-protected");
    }
    let bytes = STANDARD
        .decode(revealed.secret.as_bytes())
        .context("server returned a payload that is not base64")?;
    match String::from_utf8(bytes) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{}", revealed.secret),
    }
    Ok(())
}

async fn cmd_check(server: &str, id: &str) -> Result<()> {
    let client = Client::new();
    let resp = client
        .head(secret_url(server, id))
        .send()
        .await
        .context("HTTP request failed")?;

    match resp.status() {
        StatusCode::OK => {
            println!("✓ {id} exists");
            Ok(())
        }
        StatusCode::NOT_FOUND => anyhow::bail!("not found or expired"),
        status => anyhow::bail!("server returned {status}"),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn secret_url(server: &str, id: &str) -> String {
    format!("{}/secrets/{}", server.trim_end_matches('/'), id)
}

fn error_text(json: &Value) -> &str {
    json["error"].as_str().unwrap_or("unknown error")
}
