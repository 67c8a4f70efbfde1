mod cli;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use chartwright::broker::{Broker, InMemoryBroker};
use chartwright::config::{ChartwrightConfig, GenerationConfig};
use chartwright::error::PipelineError;
use chartwright::job::{InMemoryJobStore, Job, JobId, JobInput, JobStore};
use chartwright::llm::{ChatClient, Generator};
use chartwright::service::JobService;
use chartwright::telemetry;
use cli::{Cli, Command, Mode};
use ui::JobProgress;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Slack on top of the generation deadlines for queueing and store writes.
const POLL_MARGIN: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.log_json);
    let config = ChartwrightConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Command::Submit {
            owner,
            goal,
            name,
            chart_type,
            data,
            mode,
        } => {
            let raw_data = std::fs::read_to_string(&data)
                .with_context(|| format!("reading {}", data.display()))?;
            let mut input = JobInput::new(goal, raw_data);
            if let Some(name) = name {
                input = input.with_name(name);
            }
            if let Some(hint) = chart_type {
                input = input.with_chart_type(hint);
            }

            let client = ChatClient::new(&config.generation)?;
            let service = JobService::new(
                &config,
                InMemoryJobStore::new(),
                client,
                Arc::new(InMemoryBroker::new()),
            );
            let progress = JobProgress::start(&format!("submitting job ({mode:?})"));
            let deadline = poll_deadline(&config.generation);
            match submit(&service, &progress, &owner, input, mode, deadline).await {
                Ok(job) => {
                    progress.complete(&job);
                    progress.print_job(&job);
                }
                Err(err) => {
                    progress.abort(&err.to_string());
                    return Err(err);
                }
            }
        }
    }

    Ok(())
}

async fn submit<S: JobStore, G: Generator, B: Broker>(
    service: &JobService<S, G, B>,
    progress: &JobProgress,
    owner: &str,
    input: JobInput,
    mode: Mode,
    deadline: Duration,
) -> Result<Job> {
    let id = match mode {
        Mode::Sync => match service.create_job_sync(owner, input).await {
            Ok(result) => result.job_id,
            Err(err) => match failed_job_id(&err) {
                // The job exists and holds the outcome.
                Some(id) => id,
                None => return Err(err.into()),
            },
        },
        Mode::Async => service.create_job_async(owner, input).await?,
        Mode::Queued => {
            let consumers = service.start_consumers().await?;
            progress.note(&format!("{} queue consumer(s) running", consumers.len()));
            service.create_job_queued(owner, input).await?
        }
    };

    let job = wait_for_terminal(service, id, deadline, |job| progress.update(job)).await?;
    if !job.status.is_terminal() {
        progress.note(&format!("stopped waiting after {}s", deadline.as_secs()));
    }
    Ok(job)
}

/// How long the CLI polls before giving up on a job that never settles.
fn poll_deadline(config: &GenerationConfig) -> Duration {
    Duration::from_millis(config.timeout_ms.saturating_add(config.connect_timeout_ms)) + POLL_MARGIN
}

/// Poll until the job is terminal or `deadline` passes; returns the last
/// state seen either way.
async fn wait_for_terminal<S: JobStore, G: Generator, B: Broker>(
    service: &JobService<S, G, B>,
    id: JobId,
    deadline: Duration,
    on_update: impl Fn(&Job),
) -> Result<Job, PipelineError> {
    let give_up = tokio::time::Instant::now() + deadline;
    loop {
        let job = service.get_job(id).await?;
        on_update(&job);
        if job.status.is_terminal() || tokio::time::Instant::now() >= give_up {
            return Ok(job);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Id of a job that was stored before the error, so its row can be shown.
fn failed_job_id(err: &PipelineError) -> Option<JobId> {
    match err {
        PipelineError::Transport { job_id, .. }
        | PipelineError::Service { job_id, .. }
        | PipelineError::MalformedResponse { job_id, .. }
        | PipelineError::Conflict { job_id, .. }
        | PipelineError::Persistence {
            job_id: Some(job_id),
            ..
        } => Some(*job_id),
        _ => None,
    }
}
