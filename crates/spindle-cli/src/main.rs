use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use spindle_core::{
    Priority, Scheduler, SchedulerConfig, TaskEventKind, TaskId, TaskKind, TaskRequest, WorkError,
    WorkFunction,
};

#[derive(Parser)]
#[command(name = "spindle", about = "Background task scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a batch of demo tasks, run them and print the metrics.
    Demo {
        /// Number of tasks to register.
        #[arg(long, default_value_t = 8)]
        tasks: usize,

        /// Overrides `max_concurrent_tasks` from the config.
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Every N-th task fails twice before succeeding. 0 disables.
        #[arg(long, default_value_t = 3)]
        fail_every: usize,

        /// Simulated work duration per attempt.
        #[arg(long, default_value_t = 50)]
        work_ms: u64,

        /// TOML scheduler config.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

const PRIORITIES: [Priority; 4] = [
    Priority::Low,
    Priority::Normal,
    Priority::High,
    Priority::Critical,
];

struct FlakyWork {
    name: String,
    remaining_failures: AtomicU32,
    duration: Duration,
}

impl FlakyWork {
    fn new(name: impl Into<String>, failures: u32, duration: Duration) -> Self {
        Self {
            name: name.into(),
            remaining_failures: AtomicU32::new(failures),
            duration,
        }
    }
}

#[async_trait]
impl WorkFunction for FlakyWork {
    async fn execute(&self) -> Result<(), WorkError> {
        sleep(self.duration).await;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(WorkError::new(format!("intentional failure (left={left})")));
        }

        tracing::info!(task = %self.name, "work done");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Demo {
            tasks,
            max_concurrent,
            fail_every,
            work_ms,
            config,
        } => demo(tasks, max_concurrent, fail_every, work_ms, config).await,
    }
}

async fn demo(
    tasks: usize,
    max_concurrent: Option<usize>,
    fail_every: usize,
    work_ms: u64,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => SchedulerConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SchedulerConfig {
            retry_base_delay_ms: 100,
            ..Default::default()
        },
    };
    if let Some(max) = max_concurrent {
        config.max_concurrent_tasks = max;
    }

    let scheduler = Scheduler::new(config)?;
    scheduler.activate().await?;
    let mut events = scheduler.task_events();

    let mut identifiers = Vec::with_capacity(tasks);
    for i in 0..tasks {
        let kind = TaskKind::ALL[i % TaskKind::ALL.len()];
        let identifier = TaskId::new(format!("{kind}-{i}"));
        let failures = if fail_every > 0 && (i + 1) % fail_every == 0 {
            2
        } else {
            0
        };
        let work: Arc<dyn WorkFunction> = Arc::new(FlakyWork::new(
            identifier.as_str(),
            failures,
            Duration::from_millis(work_ms),
        ));
        let request = TaskRequest::new(identifier.clone(), kind)
            .with_priority(PRIORITIES[i % PRIORITIES.len()]);
        scheduler.register_task(request, work).await?;
        identifiers.push(identifier);
    }
    for identifier in &identifiers {
        scheduler.execute_task(identifier)?;
    }

    let mut finished = 0;
    while finished < identifiers.len() {
        let Some(event) = events.next().await else {
            break;
        };
        tracing::info!(
            task = %event.record.identifier,
            event = ?event.kind,
            status = %event.record.status,
            retry = event.record.retry_count,
            "task event"
        );
        if event.kind.is_terminal() {
            finished += 1;
        }
        if event.kind == TaskEventKind::AttemptFailed {
            tracing::warn!(
                task = %event.record.identifier,
                error = event.record.last_error.as_deref().unwrap_or_default(),
                "attempt failed, retrying"
            );
        }
    }

    println!("{}", serde_json::to_string_pretty(&scheduler.metrics())?);
    scheduler.deactivate();
    Ok(())
}
