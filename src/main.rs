use std::path::PathBuf;

use aiocc::app::AppContext;
use aiocc::config::Config;
use aiocc::pipeline::{ApprovalDecision, Checkpoint, CycleOutcome, StepOutcome};
use aiocc::plan::PlanItem;
use aiocc::scheduler::CycleSchedule;
use aiocc::storage::EventRepository;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "aiocc",
    about = "Incident orchestration for business metrics",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "AIOCC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + cycle scheduler)
    Serve {
        /// Bind address (defaults to api.bind from config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one full cycle: collect, analyze, correlate, plan, execute
    RunCycle {
        /// Session to run under (defaults to the active session)
        #[arg(long)]
        session: Option<String>,
    },

    /// Run a cycle up to the approval gate and save its checkpoint
    Step {
        #[arg(long)]
        session: Option<String>,
    },

    /// Approve the pending checkpoint and execute its plan
    Approve {
        /// JSON file holding a replacement plan (array of plan items)
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Reject the pending checkpoint without executing anything
    Reject {
        #[arg(long, default_value = "rejected by reviewer")]
        reason: String,
    },

    /// Manage sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Inspect the event log
    Events {
        #[command(subcommand)]
        action: EventsAction,
    },

    /// Record or read KPI baselines
    Kpi {
        #[command(subcommand)]
        action: KpiAction,
    },

    /// Inspect the cycle schedule
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a new active session
    Create {
        #[arg(long, default_value = aiocc::session::DEFAULT_SESSION_NAME)]
        name: String,

        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// List all sessions
    List,
    Pause { id: String },
    Resume { id: String },
    Finish { id: String },
}

#[derive(Subcommand)]
enum EventsAction {
    /// Show the most recent events
    Recent {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show every event of one type (incident, action_executed, kpi_baseline)
    Find {
        #[arg(long = "type")]
        kind: String,
    },
}

#[derive(Subcommand)]
enum KpiAction {
    Set { kpi: String, value: f64 },
    Get { kpi: String },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Preview when cycles will run in the next N hours
    DryRun {
        /// Hours to preview
        #[arg(long, default_value = "24")]
        hours: u64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut cfg = Config::load(path)?;
            cfg.apply_env();
            Ok(cfg)
        }
        None => Ok(Config::load_or_default()),
    }
}

fn init_tracing(cfg: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cfg.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Schedule { action } => match action {
            ScheduleAction::DryRun { hours } => {
                let schedule = CycleSchedule::parse(&config.schedule.cron)?;
                if !config.schedule.enabled {
                    println!("Scheduler is disabled ({}).", schedule.expr());
                }
                let preview = schedule.preview(chrono::Utc::now(), hours);
                if preview.is_empty() {
                    println!("No runs scheduled in next {} hours.", hours);
                } else {
                    println!("Upcoming runs (next {} hours, cron {}):", hours, schedule.expr());
                    for time in preview {
                        println!("{}", time.to_rfc3339());
                    }
                }
            }
        },
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.api.bind.clone());
            tracing::info!(%bind, "Starting aiocc daemon");
            let ctx = AppContext::from_config(config)?;
            aiocc::serve(ctx, &bind).await?;
        }
        Commands::RunCycle { session } => {
            let ctx = AppContext::from_config(config)?;
            match ctx.supervisor.run_cycle(session.as_deref()).await? {
                CycleOutcome::Completed(incident) => print_json(&incident)?,
                skipped @ CycleOutcome::Skipped(_) => print_json(&skipped)?,
            }
        }
        Commands::Step { session } => {
            let checkpoint_path = config.storage.checkpoint_path.clone();
            if let Some(pending) = Checkpoint::load(&checkpoint_path)? {
                anyhow::bail!(
                    "cycle {} is already awaiting approval; approve or reject it first",
                    pending.trace_id
                );
            }
            let ctx = AppContext::from_config(config)?;
            let outcome = ctx.supervisor.start_step(session.as_deref()).await?;
            match &outcome {
                StepOutcome::Suspended { checkpoint, signals } => {
                    checkpoint.save(&checkpoint_path)?;
                    for s in signals {
                        eprintln!("[{}] {}", s.stage, s.message);
                    }
                    print_json(&checkpoint.plan)?;
                    eprintln!(
                        "Cycle {} awaiting approval. Run `aiocc approve` or `aiocc reject`.",
                        checkpoint.trace_id
                    );
                }
                StepOutcome::Skipped(_) => print_json(&outcome)?,
            }
        }
        Commands::Approve { plan } => {
            let checkpoint_path = config.storage.checkpoint_path.clone();
            let checkpoint = Checkpoint::load(&checkpoint_path)?
                .context("no cycle is awaiting approval")?;
            let plan = match plan {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read plan file: {}", path.display()))?;
                    let items: Vec<PlanItem> = serde_json::from_str(&content)
                        .with_context(|| format!("failed to parse plan file: {}", path.display()))?;
                    Some(items)
                }
                None => None,
            };
            let ctx = AppContext::from_config(config)?;
            let incident = ctx
                .supervisor
                .resume(checkpoint, ApprovalDecision::Approve { plan })
                .await?;
            Checkpoint::clear(&checkpoint_path)?;
            print_json(&incident)?;
        }
        Commands::Reject { reason } => {
            let checkpoint_path = config.storage.checkpoint_path.clone();
            let checkpoint = Checkpoint::load(&checkpoint_path)?
                .context("no cycle is awaiting approval")?;
            let ctx = AppContext::from_config(config)?;
            let incident = ctx
                .supervisor
                .resume(checkpoint, ApprovalDecision::Reject { reason })
                .await?;
            Checkpoint::clear(&checkpoint_path)?;
            print_json(&incident)?;
        }
        Commands::Session { action } => {
            let ctx = AppContext::from_config(config)?;
            let sessions = ctx.supervisor.sessions();
            match action {
                SessionAction::Create { name, metadata } => {
                    let metadata = match metadata {
                        Some(raw) => serde_json::from_str(&raw).context("metadata must be a JSON object")?,
                        None => serde_json::Map::new(),
                    };
                    print_json(&sessions.create(&name, metadata)?)?;
                }
                SessionAction::List => {
                    let list = sessions.list()?;
                    if list.is_empty() {
                        println!("No sessions found.");
                    } else {
                        println!("{:<36} | {:<20} | {:<8} | Last trace", "ID", "Name", "State");
                        println!("{:-<36}-|-{:-<20}-|-{:-<8}-|-{:-<36}", "", "", "", "");
                        for s in list {
                            println!(
                                "{:<36} | {:<20} | {:<8} | {}",
                                s.session_id,
                                s.name,
                                s.state,
                                s.last_trace_id.as_deref().unwrap_or("-")
                            );
                        }
                    }
                }
                SessionAction::Pause { id } => print_json(&sessions.pause(&id)?)?,
                SessionAction::Resume { id } => print_json(&sessions.resume(&id)?)?,
                SessionAction::Finish { id } => print_json(&sessions.finish(&id)?)?,
            }
        }
        Commands::Events { action } => {
            let ctx = AppContext::from_config(config)?;
            match action {
                EventsAction::Recent { limit } => print_json(&ctx.events.query_recent(limit)?)?,
                EventsAction::Find { kind } => print_json(&ctx.events.find_by_type(&kind)?)?,
            }
        }
        Commands::Kpi { action } => {
            let ctx = AppContext::from_config(config)?;
            match action {
                KpiAction::Set { kpi, value } => print_json(&ctx.events.set_kpi_baseline(&kpi, value)?)?,
                KpiAction::Get { kpi } => match ctx.events.latest_kpi(&kpi)? {
                    Some(v) => println!("{}", v),
                    None => println!("No baseline recorded for {}.", kpi),
                },
            }
        }
    }

    Ok(())
}
