//! `algos list` – recent jobs, newest first.

use algos_core::Scheduler;
use anyhow::Result;

pub async fn run_list(sched: &Scheduler, limit: usize) -> Result<i32> {
    let jobs = sched.list(limit).await?;
    if jobs.is_empty() {
        println!("No jobs in ledger.");
    } else {
        println!("{:<6} {:<10} {:<8} {:<16} {}", "ID", "STATE", "PRIO", "ALGORITHM", "CALLER");
        for j in jobs {
            println!(
                "{:<6} {:<10} {:<8} {:<16} {}",
                j.id,
                j.state.as_str(),
                j.request.priority.as_str(),
                j.request.algorithm.to_string(),
                j.request.caller
            );
        }
    }
    Ok(0)
}
