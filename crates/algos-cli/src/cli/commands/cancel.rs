//! `algos cancel <id>` – cancel a pending or running job.

use algos_core::Scheduler;
use anyhow::Result;

use super::describe;

pub async fn run_cancel(sched: &Scheduler, id: i64) -> Result<i32> {
    let job = sched.cancel(id).await?;
    println!("{}", describe(&job));
    Ok(0)
}
