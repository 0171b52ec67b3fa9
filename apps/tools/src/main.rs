use anyhow::Result;
use backend_client::{Backend, LogTailer, TailEvent, TailOptions};
use clap::{Parser, Subcommand};
use console_api::MissionRunner;
use shared::{
    domain::{PinkasId, TaskId},
    protocol::{PinkasQuery, ScheduleRequest},
};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    backend_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe backend liveness and sub-service health.
    Health,
    /// List recent pinkas entries.
    Pinkas {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one pinkas entry in full.
    PinkasEntry { id: i64 },
    /// Schedule a mission and wait for its terminal state.
    Mission {
        agent_name: String,
        /// JSON payload handed to the agent.
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Return right after scheduling instead of polling.
        #[arg(long)]
        no_wait: bool,
    },
    /// Poll a scheduled mission by task id.
    Status { task_id: String },
    /// Treasury balance.
    Balance,
    /// Print the agent log feed once.
    Logs,
    /// Follow the board-meeting log feed.
    Tail,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let backend = Backend::new(&cli.backend_url)?;

    match cli.command {
        Command::Health => {
            let report = backend.deep_health().await?;
            println!("status={}", report.status);
            for (service, state) in report.service_statuses() {
                println!("{service}={state}");
            }
        }
        Command::Pinkas {
            limit,
            agent,
            status,
        } => {
            let page = backend
                .list_pinkas(&PinkasQuery {
                    limit: Some(limit),
                    offset: None,
                    agent,
                    status,
                })
                .await?;
            for entry in page.items {
                let what = entry.action.or(entry.detail).unwrap_or_default();
                println!(
                    "#{} {} {} {} {}",
                    entry.id.0, entry.timestamp, entry.agent, entry.status, what
                );
            }
        }
        Command::PinkasEntry { id } => {
            let entry = backend.pinkas_entry(PinkasId(id)).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Command::Mission {
            agent_name,
            payload,
            no_wait,
        } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let request = ScheduleRequest {
                agent_name,
                payload,
            };

            if no_wait {
                let scheduled = backend.schedule_command(&request).await?;
                println!("scheduled task_id={}", scheduled.task_id);
            } else {
                let outcome = MissionRunner::default().run(&backend, &request).await?;
                println!(
                    "task_id={} state={:?} backend_state={} polls={}",
                    outcome.task_id, outcome.state, outcome.backend_state, outcome.polls
                );
                if let Some(summary) = outcome.summary {
                    println!("summary: {summary}");
                }
                if let Some(result) = outcome.result {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
            }
        }
        Command::Status { task_id } => {
            let report = backend.command_status(&TaskId(task_id)).await?;
            println!("task_id={} state={}", report.task_id, report.state);
            if let Some(summary) = report.summary {
                println!("summary: {summary}");
            }
        }
        Command::Balance => {
            let balance = backend.ton_balance().await?;
            println!("{}", balance.display());
        }
        Command::Logs => {
            for line in backend.agent_log_lines().await? {
                println!("{line}");
            }
        }
        Command::Tail => {
            let tailer = LogTailer::spawn(backend, TailOptions::default());
            let mut events = tailer.subscribe();
            loop {
                match events.recv().await {
                    Ok(TailEvent::Line(line)) => println!("{line}"),
                    Ok(TailEvent::Snapshot(lines)) => {
                        for line in lines {
                            println!("{line}");
                        }
                    }
                    Ok(TailEvent::Status(status)) => eprintln!("[feed {}]", status.as_str()),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}
