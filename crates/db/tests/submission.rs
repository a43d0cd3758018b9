//! `Submitter` against the in-memory store.

use std::sync::Arc;

use assert_matches::assert_matches;
use renderfarm_core::assignment::AssignmentPolicy;
use renderfarm_core::render_request::RenderRequest;
use renderfarm_core::status::RenderStatus;
use renderfarm_core::types::new_job_uid;
use renderfarm_db::memory::MemoryJobStore;
use renderfarm_db::store::{JobStore, StoreError};
use renderfarm_db::submission::{AssignOutcome, Submitter};

fn request(name: &str, worker: Option<&str>) -> RenderRequest {
    RenderRequest {
        uid: None,
        name: name.to_string(),
        owner: "A".to_string(),
        map_ref: "/Game/Maps/Main".to_string(),
        sequence_ref: "/Game/Cinematics/Shot010".to_string(),
        config_ref: "/Game/Configs/HighQuality".to_string(),
        worker: worker.map(str::to_string),
    }
}

fn submitter(policy: AssignmentPolicy) -> (Submitter, Arc<MemoryJobStore>) {
    let store = Arc::new(MemoryJobStore::new());
    let submitter = Submitter::new(Arc::clone(&store) as Arc<dyn JobStore>, policy);
    (submitter, store)
}

// ---------------------------------------------------------------------------
// submit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_with_worker_assigns_immediately() {
    let (submitter, _) = submitter(AssignmentPolicy::Manual);

    let job = submitter.submit(request("render01", Some("W1"))).await.unwrap();

    assert_eq!(job.status, RenderStatus::ReadyToStart);
    assert_eq!(job.worker.as_deref(), Some("W1"));
    assert_eq!(job.name, "render01");
    assert_eq!(job.owner, "A");
}

#[tokio::test]
async fn submit_keeps_caller_uid() {
    let (submitter, store) = submitter(AssignmentPolicy::Manual);
    let uid = new_job_uid();
    let mut input = request("render01", None);
    input.uid = Some(uid);

    let job = submitter.submit(input.clone()).await.unwrap();
    assert_eq!(job.uid, uid);
    assert_eq!(job.status, RenderStatus::Submitted);

    assert_matches!(
        submitter.submit(input).await,
        Err(StoreError::DuplicateKey(dup)) if dup == uid
    );
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn create_never_assigns() {
    let (submitter, store) = submitter(AssignmentPolicy::RoundRobin {
        pool: vec!["W1".to_string()],
    });

    let job = submitter.create(request("render01", Some("W2"))).await.unwrap();
    assert_eq!(job.status, RenderStatus::Submitted);
    assert_eq!(job.worker.as_deref(), Some("W2"));

    let job = submitter.create(request("render02", None)).await.unwrap();
    assert_eq!(job.status, RenderStatus::Submitted);
    assert!(job.worker.is_none());
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn validation_failure_creates_nothing() {
    let (submitter, store) = submitter(AssignmentPolicy::Manual);
    let mut input = request("render01", Some("W1"));
    input.sequence_ref = String::new();

    assert_matches!(
        submitter.submit(input).await,
        Err(StoreError::Validation(_))
    );
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn round_robin_cycles_through_pool() {
    let (submitter, _) = submitter(AssignmentPolicy::RoundRobin {
        pool: vec!["W1".into(), "W2".into(), "W3".into()],
    });

    let mut workers = Vec::new();
    for i in 0..4 {
        let job = submitter
            .submit(request(&format!("render{i:02}"), None))
            .await
            .unwrap();
        workers.push(job.worker.unwrap());
    }

    assert_eq!(workers, vec!["W1", "W2", "W3", "W1"]);
}

// ---------------------------------------------------------------------------
// assign
// ---------------------------------------------------------------------------

#[tokio::test]
async fn assign_pass_under_manual_policy() {
    let (submitter, _) = submitter(AssignmentPolicy::Manual);
    let job = submitter.submit(request("render01", None)).await.unwrap();

    assert_matches!(
        submitter.assign(job.uid, None).await.unwrap(),
        AssignOutcome::NoWorker(j) if j.status == RenderStatus::Submitted
    );
    assert_matches!(
        submitter.assign(job.uid, Some("W1")).await.unwrap(),
        AssignOutcome::Assigned(j) if j.worker.as_deref() == Some("W1")
            && j.status == RenderStatus::ReadyToStart
    );
    assert_matches!(
        submitter.assign(job.uid, Some("W2")).await.unwrap(),
        AssignOutcome::AlreadyAssigned(j) if j.worker.as_deref() == Some("W1")
    );
}

#[tokio::test]
async fn assign_refuses_worker_other_than_recorded_one() {
    let (submitter, _) = submitter(AssignmentPolicy::Manual);
    let job = submitter.create(request("render01", Some("W1"))).await.unwrap();

    assert_matches!(
        submitter.assign(job.uid, Some("W2")).await.unwrap(),
        AssignOutcome::AlreadyAssigned(j) if j.status == RenderStatus::Submitted
            && j.worker.as_deref() == Some("W1")
    );
    assert_matches!(
        submitter.assign(job.uid, None).await.unwrap(),
        AssignOutcome::Assigned(j) if j.worker.as_deref() == Some("W1")
    );
}

#[tokio::test]
async fn assign_rejects_invalid_worker_name() {
    let (submitter, _) = submitter(AssignmentPolicy::Manual);
    let job = submitter.submit(request("render01", None)).await.unwrap();

    assert_matches!(
        submitter.assign(job.uid, Some("bad worker")).await,
        Err(StoreError::Validation(_))
    );
}

#[tokio::test]
async fn assign_unknown_uid_is_not_found() {
    let (submitter, _) = submitter(AssignmentPolicy::Manual);

    assert_matches!(
        submitter.assign(new_job_uid(), Some("W1")).await,
        Err(StoreError::NotFound(_))
    );
}
