use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use templog::config::{duration_from_hours, AppConfig, SensorProfile, SessionCounter};
use templog::display::ConsoleDisplay;
use templog::{App, Control, ExportFormat};
use templog_core::{SensorHandle, SharedSensor};
use templog_sources::{SimulatedConfig, WaveMode};
use templog_types::{Bound, SensorId, StartCommand, ThresholdConfig};
use tokio::sync::mpsc;

/// templog - multi-sensor temperature logger with threshold-controlled sessions
#[derive(Parser, Debug)]
#[command(name = "templog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0", global = true)]
    debug: u8,

    /// Configuration file to use instead of the default location
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Add N simulated sensors (sim-1 .. sim-N)
    #[arg(long = "simulate", value_name = "N", default_value = "0", global = true)]
    simulate: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered sensors with a current reading
    List,
    /// Run a logging session
    Run(RunArgs),
    /// Set the label of a sensor
    Rename {
        sensor: String,
        label: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Measurement name used for the session folder
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Sensors to log (default: all discovered)
    #[arg(short = 's', long = "sensor", value_name = "ID")]
    sensors: Vec<String>,

    /// Log interval in seconds
    #[arg(short = 'l', long = "log-interval", value_name = "SECS")]
    log_interval: Option<u64>,

    /// View interval in seconds (0 shows log ticks only)
    #[arg(short = 'v', long = "view-interval", value_name = "SECS")]
    view_interval: Option<u64>,

    /// Session length in hours
    #[arg(short = 't', long = "duration", value_name = "HOURS")]
    duration_hours: Option<f64>,

    /// Only start once a sensor reads at or above this (°C)
    #[arg(long = "start-above", value_name = "C", conflicts_with = "start_below")]
    start_above: Option<f64>,

    /// Only start once a sensor reads at or below this (°C)
    #[arg(long = "start-below", value_name = "C")]
    start_below: Option<f64>,

    /// Stop once a sensor reads at or above this (°C)
    #[arg(long = "stop-above", value_name = "C", conflicts_with = "stop_below")]
    stop_above: Option<f64>,

    /// Stop once a sensor reads at or below this (°C)
    #[arg(long = "stop-below", value_name = "C")]
    stop_below: Option<f64>,

    /// Degrees a reading must clear a bound by before it re-arms
    #[arg(long = "hysteresis", value_name = "C")]
    hysteresis: Option<f64>,

    /// Sensors the thresholds apply to (default: all logged sensors)
    #[arg(long = "track", value_name = "ID")]
    track: Vec<String>,

    /// Formats to export when the session ends (default from config)
    #[arg(short = 'e', long = "export", value_enum, value_delimiter = ',')]
    export: Vec<ExportFormat>,

    /// Load a sensor profile
    #[arg(short = 'p', long = "profile", value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Save this run's setup as a profile in the config folder
    #[arg(long = "save-profile", value_name = "NAME")]
    save_profile: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    // Level 0 (default): warn only
    // Level 1: info
    // Level 2: debug
    // Level 3+: trace
    let log_level = match cli.debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // Allow RUST_LOG to override CLI setting
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting templog v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {:#}", e);
            AppConfig::default()
        }),
    };
    config
        .discovery
        .simulated
        .extend((1..=cli.simulate).map(|n| SimulatedConfig {
            mode: WaveMode::SineWave,
            noise: 0.1,
            ..SimulatedConfig::constant(format!("sim-{}", n), 21.0)
        }));

    templog_sources::initialize_sensors();
    let sensors = templog_sources::discover_all(&config.discovery)?;

    match cli.command {
        Command::List => {
            list_sensors(&config, &sensors);
            Ok(())
        }
        Command::Rename { sensor, label } => {
            let sensor = SensorId::new(sensor);
            if !sensors.iter().any(|s| s.id() == &sensor) {
                warn!("Sensor {} is not currently attached", sensor);
            }
            let stored = config
                .set_label(sensor.clone(), &label)
                .context("label is empty after removing invalid characters")?;
            save_config(&config, cli.config.as_ref())?;
            println!("{} is now '{}'", sensor, stored);
            Ok(())
        }
        Command::Run(args) => {
            if sensors.is_empty() {
                bail!("No sensors found; attach a 1-Wire sensor or use --simulate");
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;
            runtime.block_on(run_session(config, cli.config, sensors, args))
        }
    }
}

fn save_config(config: &AppConfig, path: Option<&PathBuf>) -> Result<()> {
    match path {
        Some(path) => config.save_to_path(path),
        None => config.save(),
    }
}

fn list_sensors(config: &AppConfig, sensors: &[SharedSensor]) {
    if sensors.is_empty() {
        println!("No sensors found");
        return;
    }
    for (index, sensor) in sensors.iter().enumerate() {
        let meta = sensor.metadata();
        let label = config
            .sensor_labels
            .get(&meta.id)
            .cloned()
            .unwrap_or_else(|| templog_types::SensorIdentity::default_label(index));
        let value = match sensor.read().and_then(|c| sensor.validate(c)) {
            Ok(celsius) => format!("{:.3}°C", celsius),
            Err(e) => format!("ERROR ({})", e),
        };
        println!("{:<20} {:<16} {:<8} {}", meta.id, label, meta.source, value);
    }
}

async fn run_session(
    mut config: AppConfig,
    config_path: Option<PathBuf>,
    sensors: Vec<SharedSensor>,
    args: RunArgs,
) -> Result<()> {
    let profile = match &args.profile {
        Some(path) => Some(SensorProfile::load(path)?),
        None => None,
    };
    if let Some(profile) = &profile {
        config.default_log_interval = profile.log_interval;
        config.default_view_interval = profile.view_interval;
        config.sensor_labels.extend(profile.sensor_names.clone());
    }
    if let Some(secs) = args.log_interval {
        config.default_log_interval = secs;
    }
    if let Some(secs) = args.view_interval {
        config.default_view_interval = secs;
    }
    if !args.export.is_empty() {
        config.auto_export = args.export.clone();
    }

    let all: Vec<SensorId> = sensors.iter().map(|s| s.id().clone()).collect();
    let start = start_command(&args, profile.as_ref(), &all)?;

    if let Some(name) = &args.save_profile {
        let mut saved = SensorProfile::from_config(&config, start.active_sensors.iter().cloned());
        saved.measurement_name = start.name.clone();
        saved.start_threshold = start.thresholds.start.map(|b| b.value());
        saved.stop_threshold = start.thresholds.stop.map(|b| b.value());
        saved.duration_hours = start
            .duration_limit
            .map(|d| d.as_secs_f64() / 3600.0)
            .unwrap_or(0.0);
        let path = config
            .config_folder
            .join(format!("{}.json", templog::export::sanitize_filename(name)));
        saved.save(&path)?;
        println!("Profile saved to {}", path.display());
    }

    let counter = match &config_path {
        Some(path) => SessionCounter::new(
            path.parent()
                .map(|dir| dir.join("counter.json"))
                .unwrap_or_else(|| PathBuf::from("counter.json")),
        ),
        None => SessionCounter::in_config_dir()?,
    };
    let display = ConsoleDisplay::stdout(config.max_log_lines);
    let mut app = App::launch(config, sensors, display, counter)?;

    let (controls_tx, mut controls) = mpsc::channel(16);
    spawn_stdin_reader(controls_tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = controls_tx.send(Control::Stop).await;
        }
    });

    println!("Commands: stop | status | rename ID LABEL | enable ID|all | disable ID|all | log SECS | view SECS");
    let result = app.run_session(start, &mut controls).await;

    if let Ok(report) = &result {
        if let Some(reason) = &report.session.stop_reason {
            println!("Session '{}' ended: {}", report.session.name, reason);
        }
        if let Err(e) = save_config(app.config(), config_path.as_ref()) {
            warn!("Failed to save config: {:#}", e);
        }
    }
    app.shutdown().await?;
    result.map(|_| ())
}

fn start_command(
    args: &RunArgs,
    profile: Option<&SensorProfile>,
    all: &[SensorId],
) -> Result<StartCommand> {
    let mut start = match profile {
        Some(profile) => profile.start_command()?,
        None => StartCommand::new("temptestlog", all.iter().cloned()),
    };

    if let Some(name) = &args.name {
        start.name = name.clone();
    }
    if !args.sensors.is_empty() {
        start.active_sensors = args.sensors.iter().map(SensorId::new).collect();
    }
    if start.active_sensors.is_empty() {
        start.active_sensors = all.iter().cloned().collect();
    }
    if let Some(hours) = args.duration_hours {
        start.duration_limit = duration_from_hours(hours)?;
    }

    let mut thresholds: ThresholdConfig = start.thresholds.clone();
    if let Some(bound) = args
        .start_above
        .map(Bound::Above)
        .or(args.start_below.map(Bound::Below))
    {
        thresholds.start = Some(bound);
    }
    if let Some(bound) = args
        .stop_above
        .map(Bound::Above)
        .or(args.stop_below.map(Bound::Below))
    {
        thresholds.stop = Some(bound);
    }
    if let Some(hysteresis) = args.hysteresis {
        thresholds.hysteresis = hysteresis;
    }
    if !args.track.is_empty() {
        thresholds.tracked = Some(args.track.iter().map(SensorId::new).collect());
    }
    start.thresholds = thresholds;

    Ok(start)
}

/// Forward console lines as controls until stdin closes
fn spawn_stdin_reader(controls: mpsc::Sender<Control>) {
    let spawned = std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Control>() {
                    Ok(control) => {
                        if controls.blocking_send(control).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Console commands unavailable: {}", e);
    }
}

