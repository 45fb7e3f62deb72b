mod config;

use anyhow::{Context, Result};
use benchlog_core::{
    list_ports, CancelToken, Deadline, ManualSupply, ReplaySource, SerialPortSource, Session, TestReport, TextEncoding,
};
use clap::Parser;
use config::AppConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Power the board under test and capture its self-test output.
#[derive(Parser, Debug)]
#[command(name = "benchlog", version, about)]
struct Cli {
    /// JSON config file (defaults to the per-user config, then built-ins)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the device under test
    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    /// Character set of the device output (UTF-8, UTF-16, ASCII, GBK)
    #[arg(long)]
    encoding: Option<TextEncoding>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Feed a recorded capture instead of opening the serial port
    #[arg(long)]
    replay: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("An error occurred: {e:#}");
            println!("Please ensure the fixture is connected and the serial port drivers are installed.");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.list_ports {
        for port in list_ports()? {
            println!("{port}");
        }
        return Ok(());
    }

    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        cfg.port.port_name = port;
    }
    if let Some(baud) = cli.baud {
        cfg.port.baud_rate = baud;
    }
    if let Some(encoding) = cli.encoding {
        cfg.session.encoding = encoding;
    }
    if cli.timeout.is_some() {
        cfg.session_timeout_secs = cli.timeout;
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("install Ctrl-C handler")?;
    }
    let deadline = cfg.session_timeout_secs.map(|secs| Deadline::after(Duration::from_secs(secs)));
    let mut stop = (cancel, deadline);

    let plan = &cfg.session;
    let session = Session::new(plan);
    let mut psu = ManualSupply::new();

    let reports = match &cli.replay {
        Some(path) => {
            let capture = std::fs::read(path).with_context(|| format!("read capture {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = capture.len(), "replaying capture");
            session.run(&mut psu, || Ok(ReplaySource::chunked(&capture, plan.chunk_size)), &mut stop)?
        }
        None => {
            let serial = cfg.port.to_serial_config()?;
            session.run(&mut psu, || SerialPortSource::open(&serial), &mut stop)?
        }
    };

    println!();
    print_reports(&reports);
    Ok(())
}

fn print_reports(reports: &[TestReport]) {
    for report in reports {
        println!("{}: {} (log: {})", report.label, report.outcome, report.log.display());
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    // RUST_LOG overrides, e.g. RUST_LOG=debug
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
