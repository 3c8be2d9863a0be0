use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use munayd::api::{self, AppState};
use munayd::client::{ApiClient, SessionStore};
use munayd::config::Config;
use munayd::db::Db;
use munayd::notify;

#[derive(Debug, Parser)]
#[command(name = "munayd", version, about = "Munay school wellbeing API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Log in and store the session
    Login {
        email: String,
        #[arg(long, env = "MUNAY_PASSWORD")]
        password: String,
        #[command(flatten)]
        remote: Remote,
    },
    /// Forget the stored session
    Logout {
        #[command(flatten)]
        remote: Remote,
    },
    /// Show the logged-in user
    Whoami {
        #[command(flatten)]
        remote: Remote,
    },
    /// GET an API path and print the data as JSON
    Get {
        path: String,
        #[command(flatten)]
        remote: Remote,
    },
}

#[derive(Debug, clap::Args)]
struct Remote {
    #[arg(long, env = "MUNAY_URL", default_value = "http://localhost:5000")]
    url: String,
    #[arg(long, env = "MUNAY_SESSION", default_value = ".munay-session.json")]
    session: PathBuf,
}

impl Remote {
    fn client(&self) -> anyhow::Result<ApiClient> {
        ApiClient::new(self.url.clone(), SessionStore::new(self.session.clone()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { host, port, db } => serve(host, port, db).await,
        Command::Login {
            email,
            password,
            remote,
        } => {
            let session = remote.client()?.login(&email, &password).await?;
            let name = session.user["name"].as_str().unwrap_or_default();
            let role = session.user["role"].as_str().unwrap_or_default();
            println!("logged in as {name} ({role})");
            Ok(())
        }
        Command::Logout { remote } => {
            remote.client()?.logout().await?;
            println!("logged out");
            Ok(())
        }
        Command::Whoami { remote } => {
            let client = remote.client()?;
            if client.store().load()?.is_none() {
                anyhow::bail!("not logged in");
            }
            print_json(&client.get("/auth/me").await?)
        }
        Command::Get { path, remote } => print_json(&remote.client()?.get(&path).await?),
    }
}

async fn serve(host: Option<String>, port: Option<u16>, db: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(db) = db {
        config.db_path = db;
    }

    let db = Db::open(&config.db_path)
        .with_context(|| format!("failed to open {}", config.db_path.to_string_lossy()))?;
    let notifier = notify::from_config(&config)?;
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(
        db = %config.db_path.to_string_lossy(),
        environment = ?config.environment,
        smtp = config.smtp.is_some(),
        "starting munayd"
    );

    let app = api::app(AppState::new(config, db, notifier)?);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "munayd=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
