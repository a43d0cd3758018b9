//! Behaviour every `JobStore` must share, run against each implementation.

#![allow(dead_code)]

use assert_matches::assert_matches;
use renderfarm_core::status::RenderStatus;
use renderfarm_core::types::new_job_uid;
use renderfarm_db::models::render_job::{JobUpdate, NewRenderJob, RenderJob, RenderJobFilter};
use renderfarm_db::store::{JobStore, StoreError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn new_job(name: &str, worker: Option<&str>) -> NewRenderJob {
    NewRenderJob {
        uid: new_job_uid(),
        name: name.to_string(),
        owner: "A".to_string(),
        map_ref: "/Game/Maps/Main".to_string(),
        sequence_ref: "/Game/Cinematics/Shot010".to_string(),
        config_ref: "/Game/Configs/HighQuality".to_string(),
        worker: worker.map(str::to_string),
    }
}

/// Create a job already assigned to `worker` and in `ready_to_start`.
pub async fn ready_job(store: &dyn JobStore, name: &str, worker: &str) -> RenderJob {
    let job = store.create(new_job(name, Some(worker))).await.unwrap();
    assert!(store
        .compare_and_transition(
            job.uid,
            RenderStatus::Submitted,
            RenderStatus::ReadyToStart,
            &JobUpdate::assign(worker),
        )
        .await
        .unwrap());
    store.get(job.uid).await.unwrap()
}

/// Create a job claimed by `worker`.
pub async fn running_job(store: &dyn JobStore, name: &str, worker: &str) -> RenderJob {
    let job = ready_job(store, name, worker).await;
    assert!(store
        .compare_and_transition(
            job.uid,
            RenderStatus::ReadyToStart,
            RenderStatus::InProgress,
            &JobUpdate::default(),
        )
        .await
        .unwrap());
    store.get(job.uid).await.unwrap()
}

// ---------------------------------------------------------------------------
// Shared scenarios
// ---------------------------------------------------------------------------

pub async fn create_sets_defaults_and_rejects_duplicates(store: &dyn JobStore) {
    let input = new_job("render01", None);
    let uid = input.uid;

    let job = store.create(input.clone()).await.unwrap();
    assert_eq!(job.uid, uid);
    assert_eq!(job.status, RenderStatus::Submitted);
    assert_eq!(job.progress_percent, 0.0);
    assert_eq!(job.time_estimate, "unknown");
    assert!(job.worker.is_none());

    assert_matches!(
        store.create(input).await,
        Err(StoreError::DuplicateKey(dup)) if dup == uid
    );
}

pub async fn get_unknown_is_not_found(store: &dyn JobStore) {
    let uid = new_job_uid();
    assert_matches!(store.get(uid).await, Err(StoreError::NotFound(u)) if u == uid);
    assert_matches!(
        store
            .compare_and_transition(
                uid,
                RenderStatus::InProgress,
                RenderStatus::InProgress,
                &JobUpdate::progress(10.0, "1:00"),
            )
            .await,
        Err(StoreError::NotFound(_))
    );
}

pub async fn list_scopes_by_worker_and_status(store: &dyn JobStore) {
    let first = ready_job(store, "first", "W1").await;
    let second = ready_job(store, "second", "W1").await;
    ready_job(store, "other", "W2").await;
    running_job(store, "busy", "W1").await;

    let claimable = store
        .list(&RenderJobFilter::claimable_by("W1"))
        .await
        .unwrap();
    let uids: Vec<_> = claimable.iter().map(|j| j.uid).collect();
    assert_eq!(uids, vec![first.uid, second.uid]);

    let w2 = store
        .list(&RenderJobFilter::claimable_by("W2"))
        .await
        .unwrap();
    assert!(w2.iter().all(|j| j.worker.as_deref() == Some("W2")));
    assert_eq!(w2.len(), 1);
}

pub async fn guard_mismatch_is_a_no_op(store: &dyn JobStore) {
    let job = store.create(new_job("render01", None)).await.unwrap();

    let applied = store
        .compare_and_transition(
            job.uid,
            RenderStatus::ReadyToStart,
            RenderStatus::InProgress,
            &JobUpdate::default(),
        )
        .await
        .unwrap();

    assert!(!applied);
    let after = store.get(job.uid).await.unwrap();
    assert_eq!(after.status, RenderStatus::Submitted);
    assert_eq!(after.updated_at, job.updated_at);
}

pub async fn illegal_edges_are_rejected(store: &dyn JobStore) {
    let job = running_job(store, "render01", "W1").await;

    assert_matches!(
        store
            .compare_and_transition(
                job.uid,
                RenderStatus::InProgress,
                RenderStatus::Submitted,
                &JobUpdate::default(),
            )
            .await,
        Err(StoreError::InvalidTransition { .. })
    );
    assert_eq!(
        store.get(job.uid).await.unwrap().status,
        RenderStatus::InProgress
    );
}

pub async fn worker_is_immutable_once_set(store: &dyn JobStore) {
    let job = store.create(new_job("render01", Some("W1"))).await.unwrap();

    let applied = store
        .compare_and_transition(
            job.uid,
            RenderStatus::Submitted,
            RenderStatus::ReadyToStart,
            &JobUpdate::assign("W2"),
        )
        .await
        .unwrap();

    assert!(!applied);
    let after = store.get(job.uid).await.unwrap();
    assert_eq!(after.worker.as_deref(), Some("W1"));
    assert_eq!(after.status, RenderStatus::Submitted);
}

pub async fn progress_is_monotonic_and_idempotent(store: &dyn JobStore) {
    let job = running_job(store, "render01", "W1").await;
    let push = |percent: f64, eta: &str| {
        let update = JobUpdate::progress(percent, eta);
        async move {
            store
                .compare_and_transition(
                    job.uid,
                    RenderStatus::InProgress,
                    RenderStatus::InProgress,
                    &update,
                )
                .await
        }
    };

    assert!(push(50.0, "0:05:00").await.unwrap());
    assert!(push(50.0, "0:05:00").await.unwrap());
    let once = store.get(job.uid).await.unwrap();
    assert_eq!(once.progress_percent, 50.0);
    assert_eq!(once.status, RenderStatus::InProgress);

    assert!(push(30.0, "0:06:00").await.unwrap());
    let after = store.get(job.uid).await.unwrap();
    assert_eq!(after.progress_percent, 50.0);
    assert_eq!(after.time_estimate, "0:06:00");
}

pub async fn late_pushes_after_error_are_rejected(store: &dyn JobStore) {
    let job = running_job(store, "render01", "W1").await;
    assert!(store
        .compare_and_transition(
            job.uid,
            RenderStatus::InProgress,
            RenderStatus::Error,
            &JobUpdate::failure("render timed out after 14400s"),
        )
        .await
        .unwrap());

    let late_progress = store
        .compare_and_transition(
            job.uid,
            RenderStatus::InProgress,
            RenderStatus::InProgress,
            &JobUpdate::progress(90.0, "0:00:10"),
        )
        .await
        .unwrap();
    let late_finish = store
        .compare_and_transition(
            job.uid,
            RenderStatus::InProgress,
            RenderStatus::Finished,
            &JobUpdate::progress(100.0, "N/A"),
        )
        .await
        .unwrap();

    assert!(!late_progress);
    assert!(!late_finish);
    let after = store.get(job.uid).await.unwrap();
    assert_eq!(after.status, RenderStatus::Error);
    assert_eq!(
        after.error_message.as_deref(),
        Some("render timed out after 14400s")
    );
    assert!(after.finished_at.is_some());
}

pub async fn finishing_pins_progress(store: &dyn JobStore) {
    let job = running_job(store, "render01", "W1").await;
    store
        .compare_and_transition(
            job.uid,
            RenderStatus::InProgress,
            RenderStatus::InProgress,
            &JobUpdate::progress(50.0, "0:05:00"),
        )
        .await
        .unwrap();

    assert!(store
        .compare_and_transition(
            job.uid,
            RenderStatus::InProgress,
            RenderStatus::Finished,
            &JobUpdate::progress(100.0, "N/A"),
        )
        .await
        .unwrap());

    let after = store.get(job.uid).await.unwrap();
    assert_eq!(after.status, RenderStatus::Finished);
    assert_eq!(after.progress_percent, 100.0);
    assert_eq!(after.time_estimate, "N/A");
}
