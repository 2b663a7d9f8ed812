use anyhow::{Context, Result};
use clap::Parser;
use spotguard::app::{EXIT_ALREADY_RUNNING, EXIT_OK, EXIT_STARTUP_FAILED};
use spotguard::{GuardApp, GuardConfig, GuardError, RunMode};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "spotguard")]
#[command(about = "Drains, stops and backs up a Minecraft server before its spot instance is reclaimed")]
#[command(version)]
#[command(long_about = "Watches the instance metadata service for a spot interruption notice. \
When one appears, players are warned, world saving is flushed, the server is stopped through its \
tmux console and the world is handed to the backup agent before the instance goes away. \
The same sequence can be run on demand, and a scheduled backup mode archives the world \
without stopping the server.")]
struct Args {
    /// Server root directory
    #[arg(default_value = "/minecraft", value_name = "SERVER_ROOT")]
    server_root: PathBuf,

    /// Entry point into the shutdown lifecycle
    #[arg(short, long, value_enum, default_value_t = RunMode::Active)]
    mode: RunMode,

    /// Path to configuration file
    #[arg(short, long, help = "Path to TOML configuration file (default: <SERVER_ROOT>/spotguard.toml)")]
    config: Option<PathBuf>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also append logs to this file
    #[arg(long, value_name = "FILE", help = "Append log output to FILE (relative to SERVER_ROOT)")]
    log_file: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit without touching the server")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.print_config {
        std::process::exit(print_default_config());
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(EXIT_STARTUP_FAILED);
        }
    };

    let log_guard = match init_logging(&args, &config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(EXIT_STARTUP_FAILED);
        }
    };

    let exit_code = run(args, config).await;
    info!("spotguard exiting with code {}", exit_code);

    // Flush the file writer before exit skips destructors
    drop(log_guard);
    std::process::exit(exit_code);
}

async fn run(args: Args, config: GuardConfig) -> i32 {
    info!("Starting spotguard v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
        }
        return EXIT_STARTUP_FAILED;
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return EXIT_OK;
    }

    let app = GuardApp::new(config, args.server_root);
    match app.run(args.mode).await {
        Ok(code) => code,
        Err(e @ GuardError::AlreadyRunning { .. }) => {
            error!("{}", e);
            EXIT_ALREADY_RUNNING
        }
        Err(e) => {
            error!("Failed to start {:?} mode for {}: {}", args.mode, app.server_root().display(), e);
            EXIT_STARTUP_FAILED
        }
    }
}

fn load_config(args: &Args) -> spotguard::Result<GuardConfig> {
    match &args.config {
        Some(path) => GuardConfig::load_from_file(path),
        None => GuardConfig::load_for_root(&args.server_root),
    }
}

fn init_logging(args: &Args, config: &GuardConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("spotguard={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };

    let log_file = args
        .log_file
        .clone()
        .or_else(|| config.logging.file.as_ref().map(PathBuf::from))
        .map(|file| resolve_log_path(&args.server_root, file));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("log file path {} has no file name", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .try_init()
        .context("tracing subscriber already initialized")?;

    Ok(guard)
}

fn resolve_log_path(server_root: &Path, file: PathBuf) -> PathBuf {
    if file.is_absolute() {
        file
    } else {
        server_root.join(file)
    }
}

/// Print default configuration in TOML format
fn print_default_config() -> i32 {
    match GuardConfig::default().to_toml() {
        Ok(rendered) => {
            println!("# spotguard configuration");
            println!("# Place at <SERVER_ROOT>/spotguard.toml or pass with --config.");
            println!("# Every key may be overridden with SPOTGUARD_<SECTION>__<KEY>.");
            println!();
            println!("{}", rendered);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Failed to render default configuration: {}", e);
            EXIT_STARTUP_FAILED
        }
    }
}
