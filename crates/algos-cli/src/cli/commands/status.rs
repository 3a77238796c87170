//! `algos status <id>` – show one job.

use algos_core::Scheduler;
use anyhow::Result;

use super::describe;

pub async fn run_status(sched: &Scheduler, id: i64, json: bool) -> Result<i32> {
    let job = sched.status(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        println!("{}", describe(&job));
    }
    Ok(0)
}
