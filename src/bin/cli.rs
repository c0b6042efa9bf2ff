use anyhow::{anyhow, Context, Result};
use chrono::TimeZone;
use clap::{Parser, Subcommand};
use lib::api::spotify::SpotifyClient;
use lib::api::MusicService;
use lib::auth::{AuthSessionManager, BrowserLauncher};
use lib::builder::{PlaylistBuildJob, PlaylistBuildOrchestrator};
use lib::config::Config;
use lib::db::SqliteStorage;
use lib::error::BuildError;
use songlist_playlist as lib;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "songlist-playlist", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with the provider (opens a browser, then asks for the redirect URL)
    Login,
    /// Forget the stored session
    Logout,
    /// Show whether a valid session exists and whose it is
    Status,
    /// Build a playlist from song titles, one per line
    Build {
        /// Playlist name; the configured default is used when blank
        #[arg(long, default_value = "")]
        name: String,

        /// File with song titles; reads stdin when omitted
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Validate config file and exit
    ConfigValidate,
}

fn resolve_config_path(explicit: Option<&PathBuf>) -> PathBuf {
    if let Some(p) = explicit {
        return p.clone();
    }
    if let Ok(p) = std::env::var("SONGLIST_PLAYLIST_CONFIG") {
        return PathBuf::from(p);
    }
    let user_path = dirs::config_dir().map(|d| d.join("songlist-playlist").join("config.toml"));
    match user_path {
        Some(p) if p.exists() => p,
        _ => PathBuf::from("config/example-config.toml"),
    }
}

fn init_logging(log_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let _ = LogTracer::init();
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(log_dir, "songlist-playlist.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_ref());

    if let Commands::ConfigValidate = cli.command {
        match Config::from_path(&config_path) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                return Ok(ExitCode::from(2));
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = Config::from_path(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    // dropped when main returns; flushes the file log
    let _log_guard = init_logging(&cfg.log_dir)?;

    let storage = Arc::new(
        SqliteStorage::open(&cfg.db_path)
            .with_context(|| format!("opening session db {}", cfg.db_path.display()))?,
    );
    let manager = AuthSessionManager::new(cfg.clone(), storage);
    let service: Arc<dyn MusicService> = Arc::new(SpotifyClient::new(&cfg.api_base));
    let logout_delay = Duration::from_millis(cfg.profile_failure_logout_delay_ms);

    match cli.command {
        Commands::Login => {
            manager.begin_login(&BrowserLauncher)?;
            println!("After authorizing, you'll be redirected to {}. Copy the full redirect URL and paste it here.", cfg.redirect_uri);
            println!("Paste redirect URL:");
            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            let session = manager
                .complete_login_from_redirect(input.trim())
                .await
                .context("login")?;
            let profile = service.fetch_profile(&session.access_token).await;
            match profile {
                Ok(p) => println!(
                    "Logged in as {}.",
                    p.display_name.as_deref().unwrap_or(&p.id)
                ),
                Err(_) => println!("Logged in."),
            }
        }
        Commands::Logout => {
            manager.logout()?;
            println!("Logged out.");
        }
        Commands::Status => match manager.get_valid_session()? {
            None => println!("Not logged in."),
            Some(session) => match service.fetch_profile(&session.access_token).await {
                Ok(p) => println!(
                    "Logged in as {} ({}); session expires at {}.",
                    p.display_name.as_deref().unwrap_or("User"),
                    p.id,
                    chrono::Utc
                        .timestamp_millis_opt(session.expires_at_ms)
                        .single()
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| session.expires_at_ms.to_string())
                ),
                Err(e) => {
                    eprintln!("Failed to fetch user profile. Your session might have expired: {}", e);
                    manager.logout_after(logout_delay).await?;
                    return Ok(ExitCode::FAILURE);
                }
            },
        },
        Commands::Build { name, file } => {
            let session = manager
                .get_valid_session()?
                .ok_or_else(|| anyhow!("not logged in; run `songlist-playlist login` first"))?;

            let text = match file {
                Some(p) => std::fs::read_to_string(&p)
                    .with_context(|| format!("reading titles from {}", p.display()))?,
                None => {
                    let mut s = String::new();
                    std::io::stdin().read_to_string(&mut s)?;
                    s
                }
            };
            let mut job = PlaylistBuildJob::from_text(&text, &name, &cfg.default_playlist_name);

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let printer = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    println!("{}", ev);
                }
            });
            let orchestrator = PlaylistBuildOrchestrator::new(service.clone())
                .with_add_batch_size(cfg.add_tracks_batch_size)
                .with_progress(tx);

            let res = orchestrator.run(&mut job, &session).await;
            drop(orchestrator);
            let _ = printer.await;

            match res {
                Ok(url) => println!("Open playlist: {}", url),
                Err(BuildError::ProfileFetch(e)) => {
                    eprintln!("Failed to fetch user profile. Your session might have expired: {}", e);
                    manager.logout_after(logout_delay).await?;
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => {
                    eprintln!("{}", e);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::ConfigValidate => {}
    }

    Ok(ExitCode::SUCCESS)
}
