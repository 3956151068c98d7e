use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tcpd::{
    Config, Engine, EngineOptions, ExecutionContext, ScanEvent, ScanMode,
    monitor::{LiveMonitor, MonitorOptions, plain::print_snapshots},
    scanners,
    stress::{StressKind, StressOptions, StressRunner},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "tcpd")]
#[command(about = "Host diagnostics, stress tests and live monitoring", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run diagnostic scanners and print a report
    Scan {
        /// quick, full, a group name or a comma separated list of scanners
        #[arg(short, long, default_value = "quick")]
        mode: ScanMode,

        /// Also write the report as JSON
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Maximum number of scanners in flight
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// List the scanners a mode would run
    List {
        #[arg(short, long, default_value = "full")]
        mode: ScanMode,
    },

    /// Put the host under load while sampling it
    Stress {
        kind: StressKind,

        /// Duration in seconds
        #[arg(short, long, default_value_t = 60)]
        duration: u64,

        /// Workers for cpu, percent of available memory for memory
        #[arg(short, long)]
        intensity: Option<u32>,
    },

    /// Sample lightweight scanners continuously
    Monitor {
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Print one line per tick instead of the dashboard
        #[arg(long)]
        plain: bool,
    },
}

impl Command {
    /// The dashboard owns the terminal, so logs go to a file instead
    fn wants_terminal(&self) -> bool {
        matches!(self, Command::Monitor { plain: false, .. }) && cfg!(feature = "dashboard")
    }
}

fn level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init(verbose: u8, to_file: bool) {
    let level = level(verbose);
    let filter = filter::Targets::new().with_targets(vec![("tcpd", level)]);

    if to_file {
        let log_path = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("tcpd")
            .join("monitor.log");

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path);

        match log_file {
            Ok(file) => tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(file)
                        .compact()
                        .with_ansi(false),
                )
                .with(filter)
                .init(),
            Err(_) => tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .with(filter::Targets::new().with_targets(vec![("tcpd", LevelFilter::ERROR)]))
                .init(),
        }
        return;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

/// Token that fires on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            token.cancel();
        }
    });
    cancel
}

fn build_engine(config: &Config, workers: Option<usize>) -> anyhow::Result<Engine> {
    let policy = config.policy().context("invalid threshold configuration")?;

    let exec = ExecutionContext::detect();
    if !exec.elevated {
        debug!("running without elevated privileges");
    }

    let mut options = EngineOptions::from_config(config, exec);
    if let Some(workers) = workers {
        options.workers = workers.max(1);
    }

    let mut engine = Engine::new(Arc::new(policy), options);
    engine.register_all(scanners::builtin(config));
    Ok(engine)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose, args.command.wants_terminal());
    trace!("started with args: {args:?}");

    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    match args.command {
        Command::Scan {
            mode,
            output,
            workers,
        } => {
            let engine = build_engine(&config, workers)?;
            let code = scan(&engine, mode, output).await?;
            std::process::exit(code);
        }
        Command::List { mode } => {
            let engine = build_engine(&config, None)?;
            for name in engine.list(&mode) {
                println!("{name}");
            }
        }
        Command::Stress {
            kind,
            duration,
            intensity,
        } => {
            let engine = build_engine(&config, None)?;
            stress(&engine, &config, kind, Duration::from_secs(duration), intensity).await?;
        }
        Command::Monitor {
            interval_ms,
            duration,
            plain,
        } => {
            if let Some(interval_ms) = interval_ms {
                config.monitor.interval_ms = interval_ms.max(1);
            }
            let engine = build_engine(&config, None)?;
            monitor(&engine, &config, duration.map(Duration::from_secs), plain).await?;
        }
    }

    Ok(())
}

async fn scan(engine: &Engine, mode: ScanMode, output: Option<PathBuf>) -> anyhow::Result<i32> {
    let mut events = engine.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ScanEvent::Started { scanner } => debug!("{scanner}: started"),
                ScanEvent::Finished {
                    scanner,
                    severity,
                    duration,
                } => info!("{scanner}: {severity} in {duration:?}"),
            }
        }
    });

    let report = engine.run(mode).await?;
    engine.shutdown();
    progress.abort();

    println!("{report}");

    if let Some(path) = output {
        report.save_json(&path)?;
        info!("report written to {}", path.display());
    }

    Ok(report.overall_severity().exit_code())
}

async fn stress(
    engine: &Engine,
    config: &Config,
    kind: StressKind,
    duration: Duration,
    intensity: Option<u32>,
) -> anyhow::Result<()> {
    let options = StressOptions::from_config(&config.stress, kind, duration, intensity);
    let runner = StressRunner::new(
        kind,
        scanners::stress_sampler(kind),
        kind.load(),
        engine.executor().clone(),
        options,
    );

    println!("stressing {kind} for {duration:?}, Ctrl-C to stop");
    let session = runner.run(interrupt_token()).await;
    let summary = session.summary();

    println!("{kind} stress {:?}", session.state);
    if let Some(reason) = &session.abort_reason {
        println!("  reason: {reason}");
    }
    if !session.load_stopped_in_grace {
        warn!("load generator had to be aborted");
    }
    for (metric, stats) in &summary.metrics {
        println!(
            "  {metric}: min {:.1} / avg {:.1} / max {:.1} ({} samples)",
            stats.min, stats.avg, stats.max, stats.count
        );
    }
    if summary.throttling_detected {
        println!("  CPU throttling detected");
    }

    Ok(())
}

async fn monitor(
    engine: &Engine,
    config: &Config,
    max_duration: Option<Duration>,
    plain: bool,
) -> anyhow::Result<()> {
    let scanners = engine.resolve(&ScanMode::Names(config.monitor.scanners.clone()));
    let options = MonitorOptions::from_config(&config.monitor, max_duration);
    let monitor = LiveMonitor::new(scanners, engine.executor().clone(), options);

    let cancel = interrupt_token();
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(monitor.run(cancel.clone(), tx));

    #[cfg(feature = "dashboard")]
    {
        if !plain {
            let mut dashboard = tcpd::monitor::dashboard::Dashboard::new(rx, cancel);
            dashboard.run().await?;
            let ticks = handle.await?;
            debug!("monitor stopped after {ticks} ticks");
            return Ok(());
        }
    }

    #[cfg(not(feature = "dashboard"))]
    {
        if !plain {
            debug!("dashboard support not compiled in, printing plain lines");
        }
    }

    print_snapshots(rx).await?;
    let ticks = handle.await?;
    debug!("monitor stopped after {ticks} ticks");

    Ok(())
}
