//! can-stacker - camera-guided can stacking command-line interface

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use can_stacker::arm::{ArmController, RemoteArm, SimulatedArm};
use can_stacker::calibration::Homography;
use can_stacker::config::{default_config_path, resolve_config, save_config, SettleTimes, StackerConfig};
use can_stacker::detection::DetectionFile;
use can_stacker::motion::{GripperAction, MotionCommand, ThreadPacer};
use can_stacker::planner::StackLayout;
use can_stacker::runner::StackRunner;
use can_stacker::telemetry::{init_logging, LogConfig};

#[derive(Parser)]
#[command(name = "can-stacker")]
#[command(about = "Stack camera-detected cans into a pyramid with a remote robot arm", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (XML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use a simulated arm with no settle delays
    #[arg(long, global = true)]
    dry_run: bool,

    /// Emit JSON logs
    #[arg(long, global = true)]
    log_json: bool,

    /// Also append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for detections and stack them
    Stack {
        /// Detection file (overrides the configuration)
        #[arg(short, long)]
        detections: Option<PathBuf>,
    },

    /// Place a can on each calibration point for pixel measurement
    Teach,

    /// Fit the calibration and print the matrix and residuals
    Calibrate,

    /// Map one pixel to robot coordinates
    Map {
        #[arg(allow_negative_numbers = true)]
        u: f64,
        #[arg(allow_negative_numbers = true)]
        v: f64,
    },

    /// Preview a stack plan without moving the arm
    Plan {
        /// Detection file to plan from
        file: Option<PathBuf>,

        /// Print the slot layout for a can count instead
        #[arg(short = 'n', long, conflicts_with = "file")]
        count: Option<usize>,
    },

    /// Toggle the gripper between open and closed
    Toggle,

    /// Move the tool to an absolute position (mm)
    Move {
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        #[arg(allow_negative_numbers = true)]
        z: f64,
    },

    /// Rotate the tool about the robot base (degrees)
    Rotate {
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
    },

    /// Print the current tool pose
    Tcp,

    /// Write the current configuration to a file
    InitConfig {
        /// Destination (defaults to the user configuration directory)
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        json_format: cli.log_json,
        file_path: cli.log_file.clone(),
        ..LogConfig::default()
    };
    let _log_guard = init_logging(&log_config)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to initialize logging")?;

    let mut config = resolve_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.dry_run {
        config.timing = SettleTimes::zero();
    }

    match cli.command {
        Commands::Calibrate => calibrate(&config),
        Commands::Map { u, v } => {
            let runner = StackRunner::new(config)?;
            let point = runner.homography().map(u, v)?;
            println!("({:.2}, {:.2}) px -> ({:.2}, {:.2}) mm", u, v, point.x, point.y);
            Ok(())
        }
        Commands::Plan { file, count } => plan(config, file, count),
        Commands::InitConfig { path } => {
            let path = path
                .or_else(default_config_path)
                .context("No configuration directory on this platform")?;
            save_config(&config, &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::Stack { detections } => {
            if let Some(path) = detections {
                config.detection.file = path.display().to_string();
            }
            with_arm(config, cli.dry_run, |runner, arm| {
                let file = DetectionFile::from_config(&runner.config().detection);
                tracing::info!(path = %file.path().display(), "waiting for detections");
                let outcome = runner.run_from_file(arm, ThreadPacer, &file)?;
                print!("{}", outcome.plan);
                println!(
                    "{} steps, {:.0} s of settle time",
                    outcome.report.completed,
                    outcome.report.settled.as_secs_f64()
                );
                Ok(())
            })
        }
        Commands::Teach => with_arm(config, cli.dry_run, |runner, arm| {
            runner.teach_in(arm, ThreadPacer)?;
            Ok(())
        }),
        Commands::Toggle => with_arm(config, cli.dry_run, |runner, arm| {
            runner.manual(arm, ThreadPacer, MotionCommand::Gripper(GripperAction::Toggle))?;
            Ok(())
        }),
        Commands::Move { x, y, z } => with_arm(config, cli.dry_run, |runner, arm| {
            let command = runner.sequencer().move_command(x, y, z);
            runner.manual(arm, ThreadPacer, command)?;
            Ok(())
        }),
        Commands::Rotate { degrees } => with_arm(config, cli.dry_run, |runner, arm| {
            runner.manual(arm, ThreadPacer, MotionCommand::RotateBase { degrees })?;
            Ok(())
        }),
        Commands::Tcp => with_arm(config, cli.dry_run, |_, arm| {
            println!("{}", arm.tcp_pose()?);
            arm.end_session()?;
            Ok(())
        }),
    }
}

fn calibrate(config: &StackerConfig) -> Result<()> {
    let report = Homography::report(&config.calibration.points)?;
    print!("{}", report);
    Ok(())
}

fn plan(config: StackerConfig, file: Option<PathBuf>, count: Option<usize>) -> Result<()> {
    if let Some(count) = count {
        let layout = StackLayout::new(&config.stack);
        for (i, slot) in layout.slots_for(count).iter().enumerate() {
            println!(
                "{}. ({:.1}, {:.1}) z={:.1} layer {}",
                i + 1,
                slot.x,
                slot.y,
                slot.z,
                slot.layer
            );
        }
        return Ok(());
    }

    let source = match file {
        Some(path) => DetectionFile::new(path),
        None => DetectionFile::from_config(&config.detection),
    };
    let detections = source
        .read()
        .with_context(|| format!("Failed to read {}", source.path().display()))?;

    let runner = StackRunner::new(config)?;
    let prepared = runner.prepare(&detections)?;
    print!("{}", prepared.plan);
    println!("{} motion steps", prepared.steps.len());
    Ok(())
}

/// Open an arm session (simulated on dry runs) and hand it to `task`.
fn with_arm<F>(config: StackerConfig, dry_run: bool, task: F) -> Result<()>
where
    F: FnOnce(&StackRunner, &mut dyn ArmController) -> Result<()>,
{
    let runner = StackRunner::new(config)?;

    let mut arm: Box<dyn ArmController> = if dry_run {
        tracing::info!("dry run, using simulated arm");
        Box::new(SimulatedArm::default())
    } else {
        Box::new(
            RemoteArm::connect(&runner.config().robot).context("Failed to connect to the arm")?,
        )
    };

    task(&runner, arm.as_mut())
}
