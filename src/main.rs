mod api;
mod commands;
mod gateway;
mod linker;
mod reply;
#[cfg(test)]
mod testutil;

use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use whiz_channels::session::{import_session, SESSION_DB_FILE};
use whiz_channels::whatsapp::{WhatsAppLinker, WhatsAppTransport};
use whiz_core::{
    config::{self, shellexpand, Config},
    logbuf::{LogBuffer, LogBufferLayer},
    traits::Transport,
};

#[derive(Parser)]
#[command(
    name = "whiz",
    version,
    about = "WHIZ-MD: WhatsApp command bot and session generator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot.
    Start,
    /// Run the session generator web app.
    Link,
    /// Check configuration and session state.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    match cli.command {
        Commands::Start => {
            let logs = LogBuffer::default();
            let _guard = init_logging(&cfg, Some(logs.clone()))?;
            let started = Instant::now();

            let session_dir = WhatsAppTransport::session_dir_for(&cfg.bot.data_dir);
            prepare_session(&cfg, &session_dir)?;

            let registry = commands::Registry::builtin()?;
            let transport: Arc<dyn Transport> = Arc::new(WhatsAppTransport::new(
                &cfg.linker.device_name,
                session_dir,
            ));

            if cfg.web.enabled {
                let state =
                    api::StatusState::new(&cfg.bot.name, logs, started, Some(transport.clone()));
                tokio::spawn(api::serve(cfg.web.clone(), state));
            }

            info!(
                "{} v{} starting ({} commands)",
                cfg.bot.name,
                cfg.bot.version,
                registry.len()
            );
            if cfg.bot.owner_number.is_empty() {
                warn!("No owner configured (bot.owner_number / OWNER_JID); owner commands are disabled");
            }

            let http = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?;
            let gw = Arc::new(gateway::Gateway::new(
                transport,
                cfg.bot.clone(),
                registry,
                http,
                started,
            ));
            let shutdown = gw.run().await?;
            // The log guard must drop before the process exits.
            return exit_status(shutdown).map(ExitCode::from);
        }
        Commands::Link => {
            let _guard = init_logging(&cfg, None)?;
            let data_dir = shellexpand(&cfg.bot.data_dir);
            let backend = Arc::new(WhatsAppLinker::new(&cfg.linker.device_name));
            let linker = Arc::new(linker::Linker::new(
                backend,
                Path::new(&data_dir),
                Duration::from_secs(cfg.linker.timeout_secs),
            ));
            linker::web::serve(&cfg.linker, linker).await?;
        }
        Commands::Status => {
            print_status(&cli.config, &cfg);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Process exit status for a gateway shutdown.
///
/// A restart exits non-zero so the process supervisor starts a fresh instance.
fn exit_status(shutdown: gateway::Shutdown) -> anyhow::Result<u8> {
    match shutdown {
        gateway::Shutdown::Signal => Ok(0),
        gateway::Shutdown::Restart => {
            info!("Exiting for restart");
            Ok(1)
        }
        gateway::Shutdown::TransportClosed => anyhow::bail!("WhatsApp connection closed"),
    }
}

/// Install the tracing stack: console, `{data_dir}/logs/whiz.log` and optionally the in-memory buffer.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(
    cfg: &Config,
    buffer: Option<LogBuffer>,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = Path::new(&shellexpand(&cfg.bot.data_dir)).join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::never(&log_dir, "whiz.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&cfg.bot.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .with(buffer.map(LogBufferLayer::new))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logging: {e}"))?;

    Ok(guard)
}

/// Write `bot.session_id` into the session directory unless a store already exists there.
fn prepare_session(cfg: &Config, session_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(session_dir)?;
    let existing = session_dir.join(SESSION_DB_FILE);
    match cfg.bot.session_id.as_deref() {
        Some(_) if existing.exists() => info!(
            "Session store already present at {}, ignoring WHATSAPP_SESSION_ID",
            existing.display()
        ),
        Some(blob) => {
            if let Err(e) = import_session(blob, session_dir) {
                error!("Failed to import session id: {e}. Proceeding without pre-filled session.");
            }
        }
        None if existing.exists() => info!("Using session store at {}", existing.display()),
        None => warn!(
            "No session found. Link a device with `whiz link` and set WHATSAPP_SESSION_ID, \
             or scan the QR code printed below."
        ),
    }
    Ok(())
}

fn print_status(config_path: &str, cfg: &Config) {
    let session_dir = WhatsAppTransport::session_dir_for(&cfg.bot.data_dir);
    let has_store = session_dir.join(SESSION_DB_FILE).exists();

    println!("{} status check\n", cfg.bot.name);
    println!("Config: {config_path}");
    println!("Data dir: {}", shellexpand(&cfg.bot.data_dir));
    println!("Prefixes: {}", cfg.bot.prefixes.join(" "));
    println!();
    println!(
        "  owner: {}",
        if cfg.bot.owner_number.is_empty() {
            "not configured"
        } else {
            cfg.bot.owner_number.as_str()
        }
    );
    println!(
        "  session: {}",
        match (has_store, cfg.bot.session_id.is_some()) {
            (true, _) => "store present",
            (false, true) => "session id set (imported on start)",
            (false, false) => "not linked",
        }
    );
    println!(
        "  status saves: {}",
        cfg.bot.save_target().unwrap_or_else(|| "not configured".into())
    );
    println!(
        "  youtube search: {}",
        if cfg.bot.youtube_api_key.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    println!(
        "  status server: {}",
        if cfg.web.enabled {
            format!("http://{}:{}", cfg.web.host, cfg.web.port)
        } else {
            "disabled".into()
        }
    );
    println!(
        "  session generator: http://{}:{}",
        cfg.linker.host, cfg.linker.port
    );
}
