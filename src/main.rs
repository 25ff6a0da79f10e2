use anyhow::Result;
use clap::{Parser, Subcommand};
use redraft::{config::DaemonConfig, AppContext};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "redraftd",
    about = "Redraft — AI text-rewrite daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "REDRAFT_PORT")]
    port: Option<u16>,

    /// Data directory for settings and logs
    #[arg(long, env = "REDRAFT_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REDRAFT_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "REDRAFT_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    Serve,
    /// Query a running daemon over its HTTP health endpoint.
    Status {
        /// Print the raw JSON health document
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Init once — must happen before any tracing calls.
    let log_level = args.log.clone().unwrap_or_else(|| "info".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref());

    match args.command {
        Some(Command::Status { json }) => {
            let config = DaemonConfig::new(args.port, args.data_dir, Some("error".to_string()), None);
            std::process::exit(run_status(&config, json).await);
        }
        None | Some(Command::Serve) => {
            run_server(args.port, args.data_dir, args.log, args.log_file).await?;
        }
    }

    Ok(())
}

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    log_file: Option<std::path::PathBuf>,
) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "redraftd starting");

    let config = DaemonConfig::new(port, data_dir, log, log_file);
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        "config loaded"
    );

    let ctx = AppContext::bootstrap(config).await?;
    redraft::ipc::run(ctx).await
}

async fn run_status(config: &DaemonConfig, json: bool) -> i32 {
    let url = format!("http://{}:{}/health", config.bind_address, config.port);
    let health = async {
        let resp = reqwest::get(&url).await?;
        resp.json::<serde_json::Value>().await
    }
    .await;

    match health {
        Ok(body) => {
            if json {
                println!("{body}");
            } else {
                let version = body["version"].as_str().unwrap_or("?");
                let tabs = body["openTabs"].as_u64().unwrap_or(0);
                let uptime = format_uptime(body["uptime"].as_u64().unwrap_or(0));
                println!("redraftd {version} — Running ({tabs} open tabs, uptime {uptime})");
            }
            0
        }
        Err(_) => {
            if json {
                println!(r#"{{"status":"not_running"}}"#);
            } else {
                println!("redraftd: not running");
            }
            1
        }
    }
}

/// Format uptime seconds as "2h 14m" or "45m 3s".
fn format_uptime(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// If the log directory cannot be created, falls back to stdout-only
/// logging with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("redraftd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .compact()
                .init();
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().compact())
            .with(fmt::layer().with_writer(non_blocking))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
        None
    }
}
