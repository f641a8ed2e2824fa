//! # VizAlert: alert & report execution CLI
//!
//! Usage:
//!   vizalert execute --schedule-id 3            # Run one scheduled execution
//!   vizalert import --file schedule.json        # Create or update a schedule
//!   vizalert logs --schedule-id 3               # Show the execution log
//!   vizalert init-db                            # Create the database
//!   vizalert password history --user-id 1       # Password history

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use vizalert_channels::ChannelNotificationFactory;
use vizalert_core::VizAlertConfig;
use vizalert_core::types::{Identity, ReportSchedule};
use vizalert_render::document::{options_from_config, renderer_from_config};
use vizalert_render::query::ApiClient;
use vizalert_render::{BaseUrlResolver, HttpPermalinkStore, HttpQueryExecutor, HttpSqlRunner, RemoteScreenshotDriver};
use vizalert_scheduler::{AsyncExecuteReportSchedule, ReportDb, Services, SqlAlertEvaluator};

#[derive(Parser)]
#[command(name = "vizalert", version, about = "📊 VizAlert: alert & report execution engine")]
struct Cli {
    /// Config file (default: ~/.vizalert/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a schedule once for a scheduler tick
    Execute {
        #[arg(long)]
        schedule_id: i64,
        /// Execution id shared by every log row of the run
        #[arg(long)]
        task_id: Option<Uuid>,
        /// Tick time (RFC 3339); defaults to now
        #[arg(long)]
        scheduled_at: Option<DateTime<Utc>>,
    },
    /// Create or update a schedule's configuration from a JSON file
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the execution log of a schedule
    Logs {
        #[arg(long)]
        schedule_id: i64,
    },
    /// List stored schedules
    List,
    /// Create the database and exit
    InitDb,
    /// Password history maintenance
    Password {
        #[command(subcommand)]
        action: PasswordAction,
    },
}

#[derive(Subcommand)]
enum PasswordAction {
    /// Remember a replaced password hash
    Record {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        old_hash: Option<String>,
    },
    /// Show the most recent entries
    History {
        #[arg(long)]
        user_id: i64,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Check whether a hash was used recently
    Check {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        hash: String,
        #[arg(long, default_value = "5")]
        depth: usize,
    },
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(path: Option<&Path>) -> Result<VizAlertConfig> {
    let config = match path {
        Some(p) => VizAlertConfig::load_from(p)?,
        None => VizAlertConfig::load()?,
    };
    Ok(config)
}

/// Wire the HTTP adapters and the notification channels.
fn build_services(config: &VizAlertConfig, db: Arc<ReportDb>) -> Services {
    let api = ApiClient::new(&config.render);
    let service_identity = Identity::new(None, config.reports.selenium_user.as_str());

    Services {
        db,
        config: config.reports.clone(),
        document_options: options_from_config(&config.render.document),
        urls: Arc::new(BaseUrlResolver::new(&config.render.base_url)),
        screenshots: Arc::new(RemoteScreenshotDriver::new(
            &config.render.screenshot_service_url,
            config.render.http_timeout_secs,
        )),
        queries: Arc::new(HttpQueryExecutor::new(api.clone())),
        documents: Arc::from(renderer_from_config(&config.render.document)),
        permalinks: Arc::new(HttpPermalinkStore::new(api.clone(), service_identity)),
        alerts: Arc::new(SqlAlertEvaluator::new(Arc::new(HttpSqlRunner::new(api)))),
        notifications: Arc::new(ChannelNotificationFactory::new(config.clone())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "vizalert=debug,vizalert_scheduler=debug,vizalert_render=debug,vizalert_channels=debug"
    } else {
        "vizalert=info,vizalert_scheduler=info,vizalert_render=info,vizalert_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let db_path = expand_path(&config.database.path);
    let db = Arc::new(
        ReportDb::open(Path::new(&db_path)).with_context(|| format!("opening database {db_path}"))?,
    );

    match cli.command {
        Commands::Execute {
            schedule_id,
            task_id,
            scheduled_at,
        } => {
            let services = build_services(&config, db);
            let task = AsyncExecuteReportSchedule::new(
                task_id.unwrap_or_else(Uuid::new_v4),
                schedule_id,
                scheduled_at.unwrap_or_else(Utc::now),
            );
            tracing::info!("🚀 Executing schedule {schedule_id} [{}]", task.execution_id());
            task.run(&services).await?;
            println!("✅ Schedule {schedule_id} executed [{}]", task.execution_id());
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let schedule: ReportSchedule = serde_json::from_str(&raw)?;
            db.save_schedule_config(&schedule)?;
            println!("✅ Schedule {} '{}' saved", schedule.id, schedule.name);
        }
        Commands::Logs { schedule_id } => {
            let logs = db.logs_for_schedule(schedule_id)?;
            if logs.is_empty() {
                println!("No executions recorded for schedule {schedule_id}");
            }
            for log in logs {
                println!(
                    "{}  {:<14} {}  {}",
                    log.end_at.to_rfc3339(),
                    log.state.to_string(),
                    log.uuid,
                    log.error_message.unwrap_or_default()
                );
            }
        }
        Commands::List => {
            for id in db.list_schedule_ids()? {
                if let Some(schedule) = db.find_schedule(id)? {
                    let state = schedule.last_state.map(|s| s.to_string()).unwrap_or_else(|| "never run".into());
                    println!("{:>5}  {:<8} {:<30} {}", id, schedule.schedule_type, schedule.name, state);
                }
            }
        }
        Commands::InitDb => {
            println!("✅ Database ready at {db_path}");
        }
        Commands::Password { action } => match action {
            PasswordAction::Record { user_id, old_hash } => {
                let id = db.record_password_change(user_id, old_hash.as_deref())?;
                println!("✅ Password history entry {id} recorded for user {user_id}");
            }
            PasswordAction::History { user_id, limit } => {
                for entry in db.password_history(user_id, limit)? {
                    println!("{:>5}  {}", entry.id, entry.timestamp.to_rfc3339());
                }
            }
            PasswordAction::Check { user_id, hash, depth } => {
                if db.is_password_reused(user_id, &hash, depth)? {
                    println!("⚠️  Password was used within the last {depth} changes");
                    std::process::exit(1);
                }
                println!("✅ Password not used recently");
            }
        },
    }

    Ok(())
}
