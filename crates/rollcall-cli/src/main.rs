use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::config::Config;
use rollcall_core::overlay::TracingOverlay;
use rollcall_core::scripted::{Scenario, ScriptedProvider};
use rollcall_core::storage::SqliteStore;
use rollcall_core::video::SyntheticSource;
use rollcall_core::{spawn_capture, CaptureState, RosterManager, Student, VideoSource};
use rollcall_hw::V4lSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rollcall", about = "Classroom attendance by face recognition")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage classes and students
    Roster {
        #[command(subcommand)]
        command: RosterCommand,
    },
    /// Run an attendance capture session and write the report
    Capture {
        /// Scenario file driving the scripted face provider
        #[arg(short, long)]
        scenario: PathBuf,
        /// Only take attendance for this class
        #[arg(short, long)]
        class: Option<String>,
        /// V4L2 device (overrides ROLLCALL_CAMERA_DEVICE; synthetic feed if unset)
        #[arg(short, long)]
        device: Option<String>,
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Directory for attendance_report.csv (overrides ROLLCALL_REPORT_DIR)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// List V4L2 capture devices
    Devices,
}

#[derive(Subcommand)]
enum RosterCommand {
    /// Show classes and students
    List,
    /// Add an empty class
    AddClass { name: String },
    /// Remove a class; its students become unassigned
    RemoveClass { name: String },
    /// Add a student
    AddStudent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        roll: String,
        /// Reference photo path or URI
        #[arg(long)]
        photo: String,
        #[arg(long)]
        class: Option<String>,
    },
    /// Remove a student by name
    RemoveStudent { name: String },
    /// Move a student to a class (omit --class to unassign)
    Assign {
        name: String,
        #[arg(long)]
        class: Option<String>,
    },
    /// Add the sample 12th-B class and its students
    SeedDemo,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Roster { command } => run_roster(&config, command),
        Commands::Capture {
            scenario,
            class,
            device,
            duration_secs,
            out_dir,
        } => {
            run_capture(
                &config,
                scenario,
                class,
                device,
                duration_secs.map(Duration::from_secs),
                out_dir,
            )
            .await
        }
        Commands::Devices => {
            let devices = rollcall_hw::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
            Ok(())
        }
    }
}

fn open_roster(config: &Config) -> Result<RosterManager<SqliteStore>> {
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening roster database {}", config.db_path.display()))?;
    Ok(RosterManager::load(store))
}

fn run_roster(config: &Config, command: RosterCommand) -> Result<()> {
    let mut manager = open_roster(config)?;

    match command {
        RosterCommand::List => {
            let roster = manager.roster();
            for class in roster.classes() {
                println!("{class}");
                for s in roster.students_in(class) {
                    println!("  {:<24} {:<8} {}", s.name, s.roll_no, s.photo);
                }
            }
            let unassigned: Vec<_> = roster
                .students()
                .iter()
                .filter(|s| s.class_name.is_none())
                .collect();
            if !unassigned.is_empty() {
                println!("(unassigned)");
                for s in unassigned {
                    println!("  {:<24} {:<8} {}", s.name, s.roll_no, s.photo);
                }
            }
        }
        RosterCommand::AddClass { name } => {
            manager.add_class(&name)?;
            println!("Added class {name}");
        }
        RosterCommand::RemoveClass { name } => {
            manager.remove_class(&name)?;
            println!("Removed class {name}");
        }
        RosterCommand::AddStudent {
            name,
            roll,
            photo,
            class,
        } => {
            manager.add_student(Student::new(name.clone(), roll, photo, class))?;
            println!("Added student {name}");
        }
        RosterCommand::RemoveStudent { name } => {
            manager.remove_student(&name)?;
            println!("Removed student {name}");
        }
        RosterCommand::Assign { name, class } => {
            manager.assign_student(&name, class.as_deref())?;
            match class {
                Some(class) => println!("Assigned {name} to {class}"),
                None => println!("Unassigned {name}"),
            }
        }
        RosterCommand::SeedDemo => {
            let added = manager.seed_demo()?;
            println!("Added {added} demo students");
        }
    }

    Ok(())
}

async fn run_capture(
    config: &Config,
    scenario: PathBuf,
    class: Option<String>,
    device: Option<String>,
    duration: Option<Duration>,
    out_dir: Option<PathBuf>,
) -> Result<()> {
    let identities = open_roster(config)?.roster().identities(class.as_deref());
    if identities.is_empty() {
        match class {
            Some(class) => bail!("class {class} has no students"),
            None => bail!("roster is empty; add students with `rollcall roster add-student`"),
        }
    }

    let scenario = Scenario::from_file(&scenario)?;
    let provider = Arc::new(ScriptedProvider::new(scenario));

    let source: Box<dyn VideoSource> = match device.or_else(|| config.camera_device.clone()) {
        Some(path) => Box::new(V4lSource::new(path)),
        None => Box::new(SyntheticSource::default()),
    };

    tracing::info!(students = identities.len(), "starting capture session");
    let mut handle = spawn_capture(
        config.capture_config(),
        identities,
        provider,
        source,
        Box::new(TracingOverlay),
    );

    let mut states = handle.subscribe_state();
    let mut sessions = handle.subscribe_session();
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    println!("{}", handle.state().status_message());
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                println!("{}", state.status_message());
                if state.is_terminal() {
                    break;
                }
            }
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                let present = sessions.borrow_and_update().present_count();
                println!("{present}/{} present", handle.roster().len());
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping...");
                break;
            }
        }
    }

    handle.stop().await;
    let failed = matches!(handle.state(), CaptureState::Error(_));

    let report = handle.export();
    for row in report.rows() {
        println!("{:<24} {:<8} {}", row.name, row.status.as_str(), row.timestamp_text());
    }
    let dir = out_dir.unwrap_or_else(|| config.report_dir.clone());
    let path = report
        .write_to_dir(&dir)
        .with_context(|| format!("writing report to {}", dir.display()))?;
    println!("Report written to {}", path.display());

    if failed {
        bail!("capture session ended with an error");
    }
    Ok(())
}
