//! Questify command line.
//!
//! Seeds a small demo catalog into the in-memory store and drives the
//! generation engine against it: one-off ranges, the "upcoming" run, or the
//! daily loop until Ctrl-C.

use std::path::PathBuf;

use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use questify_core::app::{App, AppBuilder, OccurrenceView};
use questify_core::config::QuestifyConfig;
use questify_core::domain::{
    Area, AreaId, EntityId, EvaluationMethod, Parent, Project, ProjectId, Queue, RangeStats,
    RecurringEntity, TaskDefId, TaskDefinition, TaskItem, UpcomingStats, UserId,
};
use questify_core::impls::InMemoryStore;
use questify_core::ports::{CatalogStore, Clock, RunTrigger};

#[derive(Parser, Debug)]
#[command(name = "questify")]
#[command(about = "Generate routine and placeholder-task occurrences")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an inclusive range of days for the demo user
    Generate {
        /// First day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Number of days to generate
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Today plus the configured look-ahead window
    Upcoming {
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Run the daily generation loop until Ctrl-C
    Daemon {
        /// Fire once right away instead of waiting for the trigger time
        #[arg(long)]
        now: bool,
    },
}

#[derive(Serialize)]
struct RangeReport {
    user_id: UserId,
    stats: RangeStats,
    occurrences: Vec<OccurrenceView>,
}

#[derive(Serialize)]
struct UpcomingReport {
    user_id: UserId,
    stats: UpcomingStats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => QuestifyConfig::load(path)?,
        None => QuestifyConfig::default(),
    };
    setup_tracing(&config.logging.filter);

    let store = InMemoryStore::new();
    let user_id = seed_demo_catalog(&store).await?;
    info!(user_id = %user_id, "demo catalog seeded");

    let app = AppBuilder::new().config(config).store(store).build()?;
    let today = app.scheduler.local_date(app.clock.now());

    match args.command {
        Command::Generate { start, days } => {
            let start = start.unwrap_or(today);
            let end = start
                .checked_add_days(Days::new(u64::from(days.saturating_sub(1))))
                .unwrap_or(NaiveDate::MAX);
            let stats = app.scheduler.generate_range(user_id, start, end).await?;
            let occurrences = app.tracker.occurrences_between(user_id, start, end).await?;
            print_json(&RangeReport {
                user_id,
                stats,
                occurrences,
            })?;
        }
        Command::Upcoming { today: requested } => {
            let stats = app
                .scheduler
                .generate_upcoming(user_id, requested.unwrap_or(today))
                .await?;
            print_json(&UpcomingReport { user_id, stats })?;
        }
        Command::Daemon { now } => run_daemon(&app, now).await?,
    }

    Ok(())
}

async fn run_daemon(app: &App, fire_now: bool) -> Result<(), Box<dyn std::error::Error>> {
    let daily = app.spawn_daily_loop();
    let trigger = daily.trigger();
    if fire_now {
        trigger.arm(app.clock.now()).await?;
    } else {
        app.scheduler.schedule_next_run(&trigger).await?;
    }

    let mut batches = daily.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = batches.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(stats) = batches.borrow_and_update().clone() {
                    print_json(&stats)?;
                }
            }
        }
    }

    info!("shutting down");
    daily.shutdown_and_join().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn setup_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// One user with a rotating workout routine, a standalone daily task and a
/// study placeholder that alternates sub-tasks with a rest day.
async fn seed_demo_catalog(store: &InMemoryStore) -> Result<UserId, Box<dyn std::error::Error>> {
    let now = Utc::now();
    let user_id = UserId::random();

    let area = store
        .save_area(Area::new(AreaId::random(), user_id, "Self-improvement"))
        .await?;
    let project = store
        .save_project(Project::new(ProjectId::random(), area.id, "Language study"))
        .await?;

    let vocabulary = store
        .save_task_definition(TaskDefinition::yes_no(TaskDefId::random(), "Vocabulary drill"))
        .await?;
    let listening = store
        .save_task_definition(TaskDefinition::yes_no(TaskDefId::random(), "Listening practice"))
        .await?;

    let workout = Queue::from_json(&serde_json::json!({
        "rotation_type": "sequential",
        "iterations": [
            {
                "position": 0,
                "items": [
                    { "type": "TASK", "id": "pushups", "name": "Push-ups",
                      "evaluation_method": "NUMERIC", "target_value": 30.0,
                      "execution_time": "07:00", "duration": 10 },
                    { "type": "TASK", "id": "stretch", "name": "Stretch",
                      "evaluation_method": "YES_NO" }
                ]
            },
            {
                "position": 1,
                "items": [
                    { "type": "TASK", "id": "run", "name": "Run 5km",
                      "evaluation_method": "YES_NO", "execution_time": "06:30" },
                    { "type": "COOLDOWN", "duration": "1h", "description": "recover" }
                ]
            }
        ]
    }))?;
    store
        .save_entity(
            RecurringEntity::routine(EntityId::random(), user_id, "Morning workout", now)
                .with_queue(workout),
        )
        .await?;

    store
        .save_entity(RecurringEntity::standalone(
            EntityId::random(),
            Parent::Area(area.id),
            TaskItem {
                id: "water".to_string(),
                name: "Drink water".to_string(),
                evaluation_method: EvaluationMethod::Numeric,
                target_value: Some(8.0),
                execution_time: None,
                duration: None,
            },
            now,
        ))
        .await?;

    let study = Queue::from_json(&serde_json::json!({
        "iterations": [
            { "position": 0, "items": [
                { "type": "SUB_TASK", "sub_task_id": vocabulary.id, "execution_time": "20:00" }
            ] },
            { "position": 1, "items": [
                { "type": "SUB_TASK", "sub_task_id": listening.id }
            ] },
            { "position": 2, "isCooldown": true, "items": [] }
        ]
    }))?;
    store
        .save_entity(
            RecurringEntity::placeholder(
                EntityId::random(),
                Parent::Project(project.id),
                "Daily study",
                now,
            )
            .with_queue(study),
        )
        .await?;

    Ok(user_id)
}
