//! EEG Stress Agent CLI
//!
//! Real-time stress detection and actuation from a two-channel EEG stream.

use chrono::Local;
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use eeg_stress_agent::{
    actuator::{
        Actuator, ActuatorController, DigitalActuator, KeyPressActuator, NoopKeyboard, NullActuator,
    },
    capture::{run_capture, CaptureWriter},
    config::{parse_key, ActuatorKind, Config, TelemetryConfig},
    core::{LiveAggregator, LiveSnapshot, SharedAggregator, SoftmaxScorer},
    pipeline::{PipelineDriver, PipelineError, Session, StopHandle},
    telemetry::{ChartOptions, SessionReport, SharedSessionStats, TelemetryRecorder},
    transport::{list_ports, ReplayTransport, SerialTransport, Transport},
    VERSION,
};
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eeg-stress")]
#[command(version = VERSION)]
#[command(about = "Real-time EEG stress detection with actuator control", long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection pipeline
    Run {
        /// Actuator backend (none, digital or keys)
        #[arg(long)]
        actuator: Option<String>,

        /// Serial port of the acquisition board
        #[arg(long)]
        port: Option<String>,

        /// Serial baud rate
        #[arg(long)]
        baud: Option<u32>,

        /// Scorer weights file (JSON)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Stress decision threshold in [0, 1]
        #[arg(long)]
        threshold: Option<f64>,

        /// Telemetry mode (incremental, batch or off)
        #[arg(long)]
        telemetry: Option<String>,

        /// Telemetry column layout (control or live)
        #[arg(long)]
        layout: Option<String>,

        /// Show a live dashboard while running
        #[arg(long)]
        live: bool,

        /// Replay frames from a file instead of the serial port
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Skip the summary chart
        #[arg(long)]
        no_chart: bool,
    },

    /// Capture raw frames to CSV for training
    Collect {
        /// Serial port of the acquisition board
        #[arg(long)]
        port: Option<String>,

        /// Serial baud rate
        #[arg(long)]
        baud: Option<u32>,

        /// Output CSV (appended)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Capture length in seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// List serial ports
    Ports,

    /// Show configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,

        /// Set the engage key of the key-press actuator
        #[arg(long)]
        engage_key: Option<String>,

        /// Set the disengage key of the key-press actuator
        #[arg(long)]
        disengage_key: Option<String>,
    },
}

struct RunOptions {
    actuator: Option<String>,
    port: Option<String>,
    baud: Option<u32>,
    model: Option<PathBuf>,
    duration: Option<u64>,
    threshold: Option<f64>,
    telemetry: Option<String>,
    layout: Option<String>,
    live: bool,
    replay: Option<PathBuf>,
    no_chart: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run {
            actuator,
            port,
            baud,
            model,
            duration,
            threshold,
            telemetry,
            layout,
            live,
            replay,
            no_chart,
        } => {
            cmd_run(RunOptions {
                actuator,
                port,
                baud,
                model,
                duration,
                threshold,
                telemetry,
                layout,
                live,
                replay,
                no_chart,
            });
        }
        Commands::Collect {
            port,
            baud,
            output,
            duration,
        } => {
            cmd_collect(port, baud, output, duration);
        }
        Commands::Ports => {
            cmd_ports();
        }
        Commands::Config {
            init,
            engage_key,
            disengage_key,
        } => {
            cmd_config(init, engage_key, disengage_key);
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config ({e}), using defaults");
            Config::default()
        }
    }
}

fn cmd_run(options: RunOptions) {
    println!("EEG Stress Agent v{VERSION}");
    println!();

    let mut config = load_config();
    if let Some(actuator) = &options.actuator {
        config.actuator = ActuatorKind::parse(actuator).unwrap_or_else(|e| fail(e));
    }
    if let Some(port) = options.port {
        config.serial.port = port;
    }
    if let Some(baud) = options.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(model) = options.model {
        config.model_path = model;
    }
    if let Some(secs) = options.duration {
        config.session_duration = Some(Duration::from_secs(secs));
    }
    if let Some(threshold) = options.threshold {
        config.decision_threshold = threshold;
    }
    if let Some(mode) = &options.telemetry {
        config.telemetry.mode = TelemetryConfig::parse_mode(mode).unwrap_or_else(|e| fail(e));
    }
    if let Some(layout) = &options.layout {
        config.telemetry.layout =
            TelemetryConfig::parse_layout(layout).unwrap_or_else(|e| fail(e));
    }
    if options.no_chart {
        config.telemetry.chart = false;
    }
    if let Err(e) = config.validate() {
        fail(e);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let scorer = SoftmaxScorer::load(&config.model_path).unwrap_or_else(|e| fail(e));

    // The digital actuator writes back over the same serial link, so it is
    // built from the transport before the transport is boxed.
    let (transport, actuator): (Box<dyn Transport + Send>, Box<dyn Actuator + Send>) =
        match &options.replay {
            Some(path) => {
                let transport = ReplayTransport::from_path(path).unwrap_or_else(|e| fail(e));
                let actuator: Box<dyn Actuator + Send> = match config.actuator {
                    ActuatorKind::Digital => {
                        fail("the digital actuator needs a serial port, not a replay file")
                    }
                    ActuatorKind::Keys => Box::new(KeyPressActuator::new(NoopKeyboard, config.keys)),
                    ActuatorKind::None => Box::new(NullActuator),
                };
                println!("Replaying {}", path.display());
                let transport: Box<dyn Transport + Send> = Box::new(transport);
                (transport, actuator)
            }
            None => {
                let transport = SerialTransport::open(
                    &config.serial.port,
                    config.serial.baud_rate,
                    config.serial.read_timeout,
                )
                .unwrap_or_else(|e| fail(e));
                let actuator: Box<dyn Actuator + Send> = match config.actuator {
                    ActuatorKind::Digital => {
                        let writer = transport.writer().unwrap_or_else(|e| fail(e));
                        Box::new(DigitalActuator::new(writer))
                    }
                    ActuatorKind::Keys => Box::new(KeyPressActuator::new(NoopKeyboard, config.keys)),
                    ActuatorKind::None => Box::new(NullActuator),
                };
                println!(
                    "Connected to {} at {} baud",
                    transport.port_name(),
                    config.serial.baud_rate
                );
                let transport: Box<dyn Transport + Send> = Box::new(transport);
                (transport, actuator)
            }
        };

    println!("  Actuator: {}", actuator.name());
    println!("  Threshold: {:.2}", config.decision_threshold);
    match config.session_duration {
        Some(d) => println!("  Duration: {}s", d.as_secs()),
        None => println!("  Duration: until stopped"),
    }

    let controller = ActuatorController::new(actuator, config.decision_threshold);
    let mut session = Session::new(controller).with_report_dir(config.data_path.join("sessions"));

    if let Some(mode) = config.telemetry.mode {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let csv_path = config.data_path.join(format!("stress_log_{stamp}.csv"));
        match TelemetryRecorder::create(&csv_path, config.telemetry.layout, mode) {
            Ok(mut recorder) => {
                if config.telemetry.chart {
                    recorder = recorder.with_chart(
                        csv_path.with_extension("svg"),
                        ChartOptions {
                            bands: config.bands,
                            ..ChartOptions::default()
                        },
                    );
                }
                println!("  Telemetry: {}", csv_path.display());
                session = session.with_telemetry(recorder);
            }
            Err(e) => eprintln!("Warning: Telemetry disabled: {e}"),
        }
    } else {
        println!("  Telemetry: off");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stop = StopHandle::new();
    ctrlc_handler(stop.clone());

    let mut driver =
        PipelineDriver::new(transport, scorer, config.pipeline()).with_stop_handle(stop);

    let result = if options.live {
        let aggregator = SharedAggregator::new(LiveAggregator::new(
            config.window_horizon,
            config.bands,
        ));
        let session = session.with_aggregator(aggregator.clone());
        let stats = session.stats().clone();
        run_live(driver, session, &aggregator, &stats, config.refresh_interval)
    } else {
        driver.run(session)
    };

    println!();
    match result {
        Ok(report) => print_report(&report),
        Err(e) => {
            eprintln!("Error: {e}");
            print_report(e.report());
            std::process::exit(1);
        }
    }
}

/// Run the pipeline on a worker thread while the main thread redraws the
/// dashboard.
fn run_live<T, S>(
    mut driver: PipelineDriver<T, S>,
    session: Session,
    aggregator: &SharedAggregator,
    stats: &SharedSessionStats,
    refresh: Duration,
) -> Result<SessionReport, PipelineError>
where
    T: Transport + Send + 'static,
    S: eeg_stress_agent::Scorer + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    let worker = thread::spawn(move || {
        let _ = tx.send(driver.run(session));
    });

    let result = loop {
        match rx.recv_timeout(refresh) {
            Ok(result) => break result,
            Err(RecvTimeoutError::Timeout) => {
                render_dashboard(&aggregator.snapshot(), stats);
            }
            Err(RecvTimeoutError::Disconnected) => {
                fail("pipeline worker exited without a result");
            }
        }
    };
    render_dashboard(&aggregator.snapshot(), stats);
    println!();

    if worker.join().is_err() {
        eprintln!("Warning: pipeline worker panicked after finishing");
    }
    result
}

fn render_dashboard(snapshot: &LiveSnapshot, stats: &SharedSessionStats) {
    const BAR_WIDTH: usize = 30;

    let (time, latest) = snapshot
        .latest()
        .map(|p| (p.time_secs, p.probability_pct))
        .unwrap_or((0.0, 0.0));
    let filled = ((latest / 100.0) * BAR_WIDTH as f64).round().clamp(0.0, BAR_WIDTH as f64) as usize;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled));

    print!(
        "\r[{:>7.1}s] [{}] {:>6.2}% | avg {:>6.2}% {:<15} | {:.2} ms | {} samples, {} skipped ",
        time,
        bar,
        latest,
        snapshot.mean_pct,
        snapshot.band.label(),
        snapshot.mean_latency_ms,
        snapshot.total_samples,
        stats.stats().frames_skipped,
    );
    let _ = std::io::stdout().flush();
}

fn print_report(report: &SessionReport) {
    println!("{}", report.summary());
}

fn cmd_collect(
    port: Option<String>,
    baud: Option<u32>,
    output: Option<PathBuf>,
    duration: Option<u64>,
) {
    let config = load_config();
    let port = port.unwrap_or_else(|| config.serial.port.clone());
    let baud = baud.unwrap_or(config.serial.baud_rate);
    let output = output.unwrap_or_else(|| config.capture_path.clone());
    let duration = duration
        .map(Duration::from_secs)
        .unwrap_or(config.capture_duration);

    let mut transport =
        SerialTransport::open(&port, baud, config.serial.read_timeout).unwrap_or_else(|e| fail(e));
    let mut writer = CaptureWriter::append(&output).unwrap_or_else(|e| fail(e));

    println!("Capturing from {port} to {}", output.display());
    println!("  Duration: {}s", duration.as_secs());
    println!();
    println!("Press Ctrl+C to stop");

    let stop = StopHandle::new();
    ctrlc_handler(stop.clone());

    match run_capture(&mut transport, &mut writer, Some(duration), &stop) {
        Ok(summary) => {
            println!();
            println!(
                "Captured {} frames ({} malformed lines skipped) to {}",
                summary.rows_written,
                summary.lines_skipped,
                output.display()
            );
        }
        Err(e) => {
            eprintln!("Error: capture stopped after {} frames: {e}", writer.rows());
            std::process::exit(1);
        }
    }
}

fn cmd_ports() {
    match list_ports() {
        Ok(ports) if ports.is_empty() => println!("No serial ports found."),
        Ok(ports) => {
            println!("Serial ports:");
            for port in ports {
                println!("  {} ({:?})", port.port_name, port.port_type);
            }
        }
        Err(e) => fail(e),
    }
}

fn cmd_config(init: bool, engage_key: Option<String>, disengage_key: Option<String>) {
    let mut config = if init {
        Config::default()
    } else {
        load_config()
    };

    let mut changed = init;
    if let Some(key) = engage_key {
        config.keys.engage = parse_key(&key).unwrap_or_else(|e| fail(e));
        changed = true;
    }
    if let Some(key) = disengage_key {
        config.keys.disengage = parse_key(&key).unwrap_or_else(|e| fail(e));
        changed = true;
    }
    if changed {
        if let Err(e) = config.save() {
            fail(format!("could not save config: {e}"));
        }
        println!("Configuration saved.");
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(stop: StopHandle) {
    if let Err(e) = ctrlc::set_handler(move || stop.stop()) {
        eprintln!("Warning: Could not install Ctrl+C handler: {e}");
    }
}
