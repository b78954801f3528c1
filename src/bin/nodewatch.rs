//! nodewatch command-line watchdog
//!
//! Loads `watchdog.conf`, tails the configured log and reports sequence
//! timeouts until interrupted.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use crossbeam_channel::bounded;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use nodewatch::{load_config, FanoutNotifier, LogNotifier, LoadedConfig, Monitor, Notifier, WatchContext};

/// Command-line options.
struct Args {
    /// Configuration file.
    config_path: PathBuf,
    /// Overrides `Log_File_Path`.
    log_file: Option<PathBuf>,
    /// Print status and exit.
    status: bool,
    verbose: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("watchdog.conf"),
            log_file: None,
            status: false,
            verbose: false,
        }
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    eprintln!("error: --config requires a value");
                    process::exit(1);
                }
            }
            "--log-file" | "-l" => {
                if i + 1 < args.len() {
                    parsed.log_file = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --log-file requires a value");
                    process::exit(1);
                }
            }
            "--status" => {
                parsed.status = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("nodewatch - log-driven sequence watchdog");
                println!();
                println!("USAGE:");
                println!("    nodewatch [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <PATH>       Configuration file [default: watchdog.conf]");
                println!("    -l, --log-file <PATH>     Log file to tail (overrides Log_File_Path)");
                println!("        --status              Print rule status as JSON and exit");
                println!("    -v, --verbose             Enable debug logging");
                println!("    -h, --help                Print help information");
                process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                process::exit(1);
            }
        }
    }

    parsed
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn build_notifier(loaded: &LoadedConfig) -> Arc<dyn Notifier> {
    let mut fanout = FanoutNotifier::new().with(Arc::new(LogNotifier));
    if let Some(preferred) = &loaded.config.preferred_notifier {
        if !fanout.attempt_order().contains(&preferred.as_str()) {
            warn!(notifier = %preferred, "preferred notifier is not available, using log output");
        }
        fanout = fanout.prefer(preferred.clone());
    }
    Arc::new(fanout)
}

fn main() {
    let args = parse_args();
    init_logging(args.verbose);

    let mut loaded = match load_config(&args.config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            process::exit(1);
        }
    };

    if let Some(path) = args.log_file {
        loaded.config.log_file_path = Some(path);
    }

    if loaded.registry.is_empty() {
        error!(path = %args.config_path.display(), "no valid rules configured");
        process::exit(1);
    }

    let notifier = build_notifier(&loaded);
    let context = WatchContext::new(loaded.config, loaded.registry).with_notifier(notifier);
    let monitor = Monitor::new(context);

    if args.status {
        match serde_json::to_string_pretty(&monitor.get_detailed_status()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!(error = %e, "failed to render status");
                process::exit(1);
            }
        }
        return;
    }

    if monitor.context().config.log_file_path.is_none() {
        error!("no log file configured; set Log_File_Path or pass --log-file");
        process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    }) {
        error!(error = %e, "failed to install signal handler");
        process::exit(1);
    }

    if let Err(e) = monitor.start() {
        error!(error = %e, "failed to start monitor");
        process::exit(1);
    }

    info!("watching, press Ctrl+C to stop");
    let _ = shutdown_rx.recv();

    monitor.stop();
    info!("shut down");
}
