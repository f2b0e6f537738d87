use std::sync::Arc;

use crate::app::{AppContext, Result};
use crate::domain::RunResult;
use crate::pipeline::RunOptions;
use crate::scheduler::shutdown_signal;
use crate::store::Store;

pub async fn run(ctx: &AppContext, count: Option<usize>, use_feed_mode: Option<bool>) -> Result<()> {
    let run = ctx
        .scheduler
        .run_once(RunOptions {
            count,
            use_feed_mode,
        })
        .await?;

    println!("{}", summary_line(&run));
    for error in &run.errors {
        eprintln!("  ! {}", error);
    }
    Ok(())
}

pub fn status(ctx: &AppContext) -> Result<()> {
    let status = ctx.scheduler.status()?;
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!(
        "Scheduler: {} (every {})",
        if status.enabled { "enabled" } else { "disabled" },
        status.schedule
    );
    println!("Running:   {}", if status.running { "yes" } else { "no" });
    println!("Next run:  {}", fmt_time(status.next_run_at));
    println!("Last run:  {}", fmt_time(status.last_run_at));
    println!(
        "Totals:    {} runs, {} found, {} published, {} failed, {} duplicates",
        status.cumulative.total_runs,
        status.cumulative.total_found,
        status.cumulative.total_succeeded,
        status.cumulative.total_failed,
        status.cumulative.total_duplicates
    );
    Ok(())
}

pub fn history(ctx: &AppContext, limit: usize) -> Result<()> {
    let runs = ctx.store.recent_runs(limit)?;
    if runs.is_empty() {
        println!("No runs yet");
        return Ok(());
    }

    for run in &runs {
        println!("{}", history_line(run));
    }
    Ok(())
}

pub async fn schedule(ctx: &AppContext, run_now: bool) -> Result<()> {
    let scheduler = ctx.scheduler.clone();

    let stopper = Arc::clone(&scheduler);
    tokio::spawn(async move {
        shutdown_signal().await;
        stopper.shutdown();
    });

    if run_now {
        if let Some(run) = scheduler.trigger().await {
            println!("{}", summary_line(&run));
        }
    }

    scheduler.run_forever().await?;
    println!("Scheduler stopped");
    Ok(())
}

pub fn add_domain(ctx: &AppContext, name: &str, hostname: &str) -> Result<()> {
    let id = ctx.store.add_domain(name, hostname)?;
    println!("Added domain {} ({}) with id {}", name, hostname, id);
    Ok(())
}

pub fn list_domains(ctx: &AppContext) -> Result<()> {
    let domains = ctx.store.list_domains()?;
    if domains.is_empty() {
        println!("No domains");
        return Ok(());
    }

    for domain in domains {
        println!(
            "{:>4} {} {} {}",
            domain.id,
            if domain.is_active { "*" } else { " " },
            domain.hostname,
            domain.name
        );
    }
    Ok(())
}

pub fn add_author(ctx: &AppContext, username: &str) -> Result<()> {
    let id = ctx.store.add_user(username)?;
    println!("Added author {} with id {}", username, id);
    Ok(())
}

fn summary_line(run: &RunResult) -> String {
    format!(
        "Run {}: {}/{} published, {} found, {} processed, {} failed, {} duplicates ({:.1}s)",
        run.status.as_str(),
        run.succeeded,
        run.target,
        run.found,
        run.processed,
        run.failed,
        run.duplicates,
        run.elapsed_secs()
    )
}

fn history_line(run: &RunResult) -> String {
    format!(
        "{} {:<4} {:<7} {}/{} published, {} failed, {} duplicates",
        run.started_at.format("%Y-%m-%d %H:%M"),
        run.mode.as_str(),
        run.status.as_str(),
        run.succeeded,
        run.target,
        run.failed,
        run.duplicates
    )
}
