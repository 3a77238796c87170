use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::error::{CoreError, ErrorKind};

async fn backends() -> Vec<(&'static str, Arc<dyn JobLedger>)> {
    vec![
        ("memory", Arc::new(MemoryLedger::new())),
        ("sqlite", Arc::new(SqliteLedger::open_memory().await.unwrap())),
    ]
}

fn owner(instance: &str) -> JobOwner {
    JobOwner {
        pid: 0,
        instance: instance.to_string(),
    }
}

fn request(key: Option<&str>) -> JobRequest {
    JobRequest {
        algorithm: AlgorithmRef {
            name: "anagrams".into(),
            version: "1".into(),
        },
        input: json!("listen silent enlist"),
        caller: "tester".into(),
        idempotency_key: key.map(str::to_string),
        priority: Priority::Normal,
    }
}

#[tokio::test]
async fn create_assigns_increasing_ids_and_pending_state() {
    for (name, ledger) in backends().await {
        let a = ledger.create(request(None), &owner("a")).await.unwrap();
        let b = ledger.create(request(None), &owner("a")).await.unwrap();
        assert!(b.id > a.id, "{name}");
        assert_eq!(a.state, JobState::Pending, "{name}");
        assert!(a.started_at.is_none() && a.completed_at.is_none(), "{name}");

        let fetched = ledger.get(a.id).await.unwrap().unwrap();
        assert_eq!(fetched.request, a.request, "{name}");
        assert_eq!(fetched.state, JobState::Pending, "{name}");
    }
}

#[tokio::test]
async fn transition_records_timestamps_and_result() {
    for (name, ledger) in backends().await {
        let job = ledger.create(request(None), &owner("a")).await.unwrap();
        let running = ledger
            .transition(job.id, JobState::Pending, JobState::Running, TransitionUpdate::none())
            .await
            .unwrap();
        assert_eq!(running.state, JobState::Running, "{name}");
        assert!(running.started_at.is_some(), "{name}");

        let done = ledger
            .transition(
                job.id,
                JobState::Running,
                JobState::Completed,
                TransitionUpdate::result(json!([["enlist", "listen", "silent"]])),
            )
            .await
            .unwrap();
        assert_eq!(done.state, JobState::Completed, "{name}");
        assert!(done.completed_at.is_some(), "{name}");
        assert_eq!(done.started_at, running.started_at, "{name}");
        assert_eq!(done.result, Some(json!([["enlist", "listen", "silent"]])), "{name}");
        assert!(done.error.is_none(), "{name}");
    }
}

#[tokio::test]
async fn stale_transition_is_rejected() {
    for (name, ledger) in backends().await {
        let job = ledger.create(request(None), &owner("a")).await.unwrap();
        ledger
            .transition(job.id, JobState::Pending, JobState::Cancelled, TransitionUpdate::error(JobFailure::cancelled("by caller")))
            .await
            .unwrap();

        let err = ledger
            .transition(job.id, JobState::Pending, JobState::Running, TransitionUpdate::none())
            .await
            .unwrap_err();
        match err {
            CoreError::InvalidTransition { actual, .. } => {
                assert_eq!(actual, JobState::Cancelled, "{name}")
            }
            other => panic!("{name}: unexpected {other:?}"),
        }

        let stored = ledger.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Cancelled, "{name}");
        assert_eq!(stored.error_kind(), Some(ErrorKind::Cancelled), "{name}");
    }
}

#[tokio::test]
async fn illegal_edge_is_rejected_even_when_state_matches() {
    for (name, ledger) in backends().await {
        let job = ledger.create(request(None), &owner("a")).await.unwrap();
        let err = ledger
            .transition(job.id, JobState::Pending, JobState::Completed, TransitionUpdate::none())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }), "{name}");
        let stored = ledger.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Pending, "{name}");
    }
}

#[tokio::test]
async fn transition_of_unknown_job_is_not_found() {
    for (name, ledger) in backends().await {
        let err = ledger
            .transition(999, JobState::Pending, JobState::Running, TransitionUpdate::none())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(999)), "{name}");
        assert!(ledger.get(999).await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn idempotency_lookup_skips_released_keys() {
    for (name, ledger) in backends().await {
        let first = ledger.create(request(Some("k1")), &owner("a")).await.unwrap();
        let found = ledger.find_by_idempotency_key("k1", None).await.unwrap().unwrap();
        assert_eq!(found.id, first.id, "{name}");

        ledger
            .transition(first.id, JobState::Pending, JobState::Cancelled, TransitionUpdate::error(JobFailure::cancelled("x")))
            .await
            .unwrap();
        assert!(
            ledger.find_by_idempotency_key("k1", None).await.unwrap().is_none(),
            "{name}: cancelled job must release its key"
        );

        let second = ledger.create(request(Some("k1")), &owner("a")).await.unwrap();
        let found = ledger.find_by_idempotency_key("k1", None).await.unwrap().unwrap();
        assert_eq!(found.id, second.id, "{name}");

        let future = second.created_at + 60_000;
        assert!(
            ledger.find_by_idempotency_key("k1", Some(future)).await.unwrap().is_none(),
            "{name}: outside the window"
        );
        assert!(ledger.find_by_idempotency_key("other", None).await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn list_is_newest_first_and_limited() {
    for (name, ledger) in backends().await {
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(ledger.create(request(None), &owner("a")).await.unwrap().id);
        }
        let listed: Vec<JobId> = ledger.list(3).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(listed, vec![ids[4], ids[3], ids[2]], "{name}");
    }
}

#[tokio::test]
async fn purge_removes_only_old_terminal_jobs() {
    for (name, ledger) in backends().await {
        let done = ledger.create(request(Some("old")), &owner("a")).await.unwrap();
        ledger
            .transition(done.id, JobState::Pending, JobState::Running, TransitionUpdate::none())
            .await
            .unwrap();
        ledger
            .transition(done.id, JobState::Running, JobState::Completed, TransitionUpdate::result(json!([])))
            .await
            .unwrap();
        let waiting = ledger.create(request(None), &owner("a")).await.unwrap();

        let removed = ledger.purge_finished(unix_millis() + 1_000).await.unwrap();
        assert_eq!(removed, 1, "{name}");
        assert!(ledger.get(done.id).await.unwrap().is_none(), "{name}");
        assert!(ledger.get(waiting.id).await.unwrap().is_some(), "{name}");
        assert!(ledger.find_by_idempotency_key("old", None).await.unwrap().is_none(), "{name}");

        assert_eq!(ledger.purge_finished(0).await.unwrap(), 0, "{name}");
    }
}

#[tokio::test]
async fn fail_interrupted_closes_only_the_owners_open_jobs() {
    for (name, ledger) in backends().await {
        let gone = owner("gone");
        let live = owner("live");
        let pending = ledger.create(request(None), &gone).await.unwrap();
        let running = ledger.create(request(None), &gone).await.unwrap();
        ledger
            .transition(running.id, JobState::Pending, JobState::Running, TransitionUpdate::none())
            .await
            .unwrap();
        let finished = ledger.create(request(None), &gone).await.unwrap();
        ledger
            .transition(finished.id, JobState::Pending, JobState::Cancelled, TransitionUpdate::error(JobFailure::cancelled("caller")))
            .await
            .unwrap();
        let other = ledger.create(request(None), &live).await.unwrap();

        let mut owners = ledger.open_owners().await.unwrap();
        owners.sort_by(|a, b| a.instance.cmp(&b.instance));
        assert_eq!(owners, vec![gone.clone(), live.clone()], "{name}");

        assert_eq!(ledger.fail_interrupted(&gone).await.unwrap(), 2, "{name}");

        let p = ledger.get(pending.id).await.unwrap().unwrap();
        assert_eq!(p.state, JobState::Cancelled, "{name}");
        assert_eq!(p.error.as_ref().map(|e| e.message.as_str()), Some(INTERRUPTED_MESSAGE), "{name}");

        let r = ledger.get(running.id).await.unwrap().unwrap();
        assert_eq!(r.state, JobState::Failed, "{name}");
        assert_eq!(r.error_kind(), Some(ErrorKind::ExecutionFailure), "{name}");

        let f = ledger.get(finished.id).await.unwrap().unwrap();
        assert_eq!(f.error.as_ref().map(|e| e.message.as_str()), Some("caller"), "{name}");

        let o = ledger.get(other.id).await.unwrap().unwrap();
        assert_eq!(o.state, JobState::Pending, "{name}");
        assert_eq!(o.owner, live, "{name}");

        assert_eq!(ledger.fail_interrupted(&gone).await.unwrap(), 0, "{name}");
        assert_eq!(ledger.open_owners().await.unwrap(), vec![live], "{name}");
    }
}

#[tokio::test]
async fn sqlite_ledger_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested dir").join("jobs.db");
    let id = {
        let ledger = SqliteLedger::open_at(&path).await.unwrap();
        ledger.create(request(Some("durable")), &owner("a")).await.unwrap().id
    };
    let ledger = SqliteLedger::open_at(&path).await.unwrap();
    let job = ledger.get(id).await.unwrap().unwrap();
    assert_eq!(job.request.idempotency_key.as_deref(), Some("durable"));
    assert_eq!(job.request.input, json!("listen silent enlist"));
    assert_eq!(job.owner, owner("a"));
}
