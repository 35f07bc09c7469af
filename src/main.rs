mod menu;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use common::config::load_config;
use common::{CycleRecorder, SharedDiagnostics, SystemConfig};
use motor::{MotorController, Rangefinder};
use supervisor::{run_balance_loop, BalanceController, LoopMode, Supervisor};

const DEFAULT_CONFIG: &str = "configs/smart_motor.toml";

/// Operator console for a serial smart motor with rangefinder feedback.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Motor serial device, overriding the config
    #[arg(long)]
    motor_device: Option<String>,

    /// Rangefinder serial device, overriding the config
    #[arg(long)]
    rangefinder_device: Option<String>,

    /// Write the balance loop trace to this CSV file
    #[arg(long)]
    trace_csv: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smart_motor=info,motor=info,supervisor=info,common=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))
            .context("failed to install Ctrl-C handler")?;
    }

    let motor = MotorController::open(&config.motor)
        .with_context(|| format!("cannot start motor on {}", config.motor.device))?;
    let diagnostics = Arc::new(SharedDiagnostics::default());
    let mut session = Supervisor::new(motor, Arc::clone(&diagnostics));

    println!("===========================================");
    println!("Smart Motor on {}", config.motor.device);
    println!("===========================================");

    while !shutdown.load(Ordering::Relaxed) {
        menu::show_menu(&session.mode().to_string());

        match menu::get_user_choice() {
            Some(1) => show_telemetry(&mut session),
            Some(2) => move_to_target(&mut session),
            Some(3) => set_profile(&mut session),
            Some(4) => set_velocity(&mut session),
            Some(5) => report(session.set_origin(), "origin set"),
            Some(6) => report(session.go_to_origin(), "moving to origin"),
            Some(7) => report(session.stop(), "stopped"),
            Some(8) => run_balance(&mut session, &config, &shutdown),
            Some(9) => {
                println!("Goodbye!");
                break;
            }
            _ => println!("Invalid choice. Please select 1-9."),
        }
    }

    let counts = diagnostics.snapshot();
    info!(
        write_errors = counts.write_errors,
        protocol_errors = counts.protocol_errors,
        sensor_errors = counts.sensor_errors,
        "session finished"
    );
    session
        .into_motor()
        .shutdown()
        .context("motor shutdown did not complete")?;
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<SystemConfig> {
    let mut config = if cli.config == Path::new(DEFAULT_CONFIG) && !cli.config.exists() {
        warn!(path = %cli.config.display(), "config file not found, using defaults");
        SystemConfig::default()
    } else {
        load_config(&cli.config)?
    };

    if let Some(device) = &cli.motor_device {
        config.motor.device = device.clone();
    }
    if let Some(device) = &cli.rangefinder_device {
        config.rangefinder.device = device.clone();
    }
    if cli.trace_csv.is_some() {
        config.trace_csv = cli.trace_csv.clone();
    }
    Ok(config)
}

fn report(res: motor::Result<()>, done: &str) {
    match res {
        Ok(()) => println!("{done}"),
        Err(e) => println!("Command failed: {e}"),
    }
}

fn ensure_mode<L: motor::Link>(session: &mut Supervisor<L>, mode: LoopMode) -> bool {
    if session.mode() == mode && session.entry_complete() {
        return true;
    }
    match session.switch_mode(mode) {
        Ok(()) => true,
        Err(e) => {
            println!("Could not enter {mode} mode: {e}");
            false
        }
    }
}

fn show_telemetry<L: motor::Link>(session: &mut Supervisor<L>) {
    let now = session.refresh_telemetry();
    println!("\nPosition: {:.1}", now.position);
    println!("Velocity: {:.1}", now.velocity);
    let recent = session.telemetry().get_recent(10);
    let trail: Vec<String> = recent.iter().map(|s| format!("{:.1}", s.position)).collect();
    println!("Recent positions: {}", trail.join(" "));
    menu::wait_for_enter();
}

fn move_to_target<L: motor::Link>(session: &mut Supervisor<L>) {
    if !ensure_mode(session, LoopMode::Position) {
        return;
    }
    let limit = session.limits().position;
    let current = session.position_targets().position.get();
    let target = menu::prompt_f32(&format!("Absolute position (+/-{limit:.0})"), current);
    session.set_position_target(target);
    session.apply_targets();
}

fn set_profile<L: motor::Link>(session: &mut Supervisor<L>) {
    if !ensure_mode(session, LoopMode::Position) {
        return;
    }
    let targets = *session.position_targets();
    let v = menu::prompt_f32("Velocity", targets.velocity.get());
    let a = menu::prompt_f32("Acceleration", targets.acceleration.get());
    session.set_velocity_target(v);
    session.set_acceleration_target(a);
    session.apply_targets();
}

fn set_velocity<L: motor::Link>(session: &mut Supervisor<L>) {
    if !ensure_mode(session, LoopMode::Velocity) {
        return;
    }
    let targets = *session.velocity_targets();
    let v = menu::prompt_f32("Velocity", targets.velocity.get());
    let a = menu::prompt_f32("Acceleration", targets.acceleration.get());
    session.set_velocity_target(v);
    session.set_acceleration_target(a);
    session.apply_targets();
}

fn run_balance<L: motor::Link>(
    session: &mut Supervisor<L>,
    config: &SystemConfig,
    shutdown: &AtomicBool,
) {
    println!("\n=== Balance Loop ===");
    let mut sensor = match Rangefinder::open(&config.rangefinder) {
        Ok(sensor) => sensor,
        Err(e) => {
            println!("Rangefinder unavailable: {e}");
            menu::wait_for_enter();
            return;
        }
    };

    let mut control = config.control.clone();
    let gains = &mut control.gains;
    gains.p = menu::prompt_f32("P", gains.p);
    gains.i = menu::prompt_f32("I", gains.i);
    gains.d = menu::prompt_f32("D", gains.d);
    control.scale = menu::prompt_f32("Scale", control.scale);
    if control.scale == 0.0 {
        println!("Scale must be non-zero.");
        return;
    }
    println!("Running; press Ctrl-C to stop.");

    let mut controller = BalanceController::new(&control);
    let mut recorder = if config.trace_csv.is_some() {
        CycleRecorder::with_trace()
    } else {
        CycleRecorder::new()
    };
    let Some(outcome) = run_until_interrupted(shutdown, || {
        run_balance_loop(
            session,
            &mut sensor,
            &mut controller,
            &control,
            shutdown,
            &mut recorder,
        )
    }) else {
        return;
    };

    match outcome {
        Ok(cycles) => display_results(&recorder, cycles),
        Err(e) => println!("Balance loop could not start: {e}"),
    }
    if let Some(path) = &config.trace_csv {
        if let Err(e) = recorder.save_to_csv(path) {
            println!("Failed to save trace to {}: {e}", path.display());
        }
    }
    menu::wait_for_enter();
}

/// Run `f` unless an exit was already requested. A Ctrl-C raised while `f`
/// runs ends `f` only, so the flag is cleared afterwards.
fn run_until_interrupted<T>(shutdown: &AtomicBool, f: impl FnOnce() -> T) -> Option<T> {
    if shutdown.load(Ordering::Relaxed) {
        return None;
    }
    let out = f();
    shutdown.store(false, Ordering::Relaxed);
    Some(out)
}

fn display_results(recorder: &CycleRecorder, cycles: u64) {
    if recorder.cycles() == 0 {
        println!("No cycles recorded.");
        return;
    }

    println!("\n=== Balance Results ===");
    println!("Total cycles: {cycles}");
    println!(
        "Deadline compliance: {:.2}% ({} missed)",
        recorder.deadline_compliance(),
        recorder.missed_deadlines()
    );
    println!("Commands sent: {}", recorder.commands_sent());
    println!("Cycles without measurement: {}", recorder.skipped_measurements());
    println!("Max lateness: {} ns", recorder.max_lateness_ns());
}
