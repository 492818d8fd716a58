//! End-to-end trigger flow against in-memory collaborators.

use std::sync::Arc;

use commitflow::config::{AppConfig, RuntimeMode};
use commitflow::credentials::{sample_payload, CredentialStore, InMemoryCredentialStore};
use commitflow::metrics::{InMemoryMetricsSink, MetricsSink};
use commitflow::scm::{InMemorySourceControl, ScmCall, SourceControl};
use commitflow::{Error, JobRunner, TriggerOutcome, TriggerRequest};

struct Harness {
    store: Arc<InMemoryCredentialStore>,
    sink: Arc<InMemoryMetricsSink>,
    scm: Arc<InMemorySourceControl>,
    runner: JobRunner,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::for_mode(RuntimeMode::Development);
    config.workdir = dir.path().to_path_buf();
    config.scm_retry = config
        .scm_retry
        .with_base_delay(std::time::Duration::from_millis(1))
        .with_max_delay(std::time::Duration::from_millis(2))
        .with_jitter(false);

    let store = Arc::new(InMemoryCredentialStore::new());
    store.insert(&config.default_credential_key, sample_payload());
    let sink = Arc::new(InMemoryMetricsSink::new());
    let scm = Arc::new(InMemorySourceControl::new());
    let runner = JobRunner::new(
        config,
        store.clone() as Arc<dyn CredentialStore>,
        sink.clone() as Arc<dyn MetricsSink>,
        scm.clone() as Arc<dyn SourceControl>,
    );
    Harness {
        store,
        sink,
        scm,
        runner,
        _dir: dir,
    }
}

#[tokio::test]
async fn trigger_success_payload_and_side_effects() {
    let h = harness();
    let outcome = h
        .runner
        .run(TriggerRequest {
            new_content: Some("deployed v42".into()),
            commit_message: Some("chore: v42".into()),
            ..Default::default()
        })
        .await;

    let payload = match outcome {
        TriggerOutcome::Success { payload } => payload,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(payload.new_content, "deployed v42");
    assert_eq!(payload.old_content, "");
    assert_eq!(payload.commit_message, "chore: v42");
    assert!(!payload.invocation_id.is_empty());

    // The file really was written into the scratch checkout.
    let written = std::fs::read_to_string(
        h.runner.config().workdir.join(&payload.file_path),
    )
    .unwrap();
    assert_eq!(written, "deployed v42");

    assert!(h.scm.calls().contains(&ScmCall::Commit("chore: v42".into())));
}

#[tokio::test]
async fn warm_reuse_resets_cache_between_invocations() {
    let h = harness();

    h.runner.run(TriggerRequest::default()).await;
    h.runner.run(TriggerRequest::default()).await;

    // Lifecycle reset clears the cache at the start of every invocation, so
    // each run fetches fresh credentials despite the warm process.
    assert_eq!(h.store.fetch_count(), 2);
}

#[tokio::test]
async fn second_invocation_sees_previous_content() {
    let h = harness();

    h.runner
        .run(TriggerRequest {
            new_content: Some("first".into()),
            ..Default::default()
        })
        .await;
    let outcome = h
        .runner
        .run(TriggerRequest {
            new_content: Some("second".into()),
            ..Default::default()
        })
        .await;

    match outcome {
        TriggerOutcome::Success { payload } => {
            assert_eq!(payload.old_content, "first");
            assert_eq!(payload.new_content, "second");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn each_invocation_drains_metrics() {
    let h = harness();

    h.runner.run(TriggerRequest::default()).await;
    h.runner.run(TriggerRequest::default()).await;

    // One aggregate per invocation (forced end-of-invocation drain).
    let published = h.sink.published();
    assert_eq!(published.len(), 2);
    assert!(published.iter().all(|(_, a)| a.total_executions == 1));
    assert!(published.iter().all(|(_, a)| a.successful_executions == 1));
}

#[tokio::test]
async fn exhausted_scm_retries_surface_as_server_error() {
    let h = harness();
    // Dev policy allows 2 attempts; fail both pushes.
    h.scm.fail_next_push(Error::transient("remote hung up"));
    let outcome = h.runner.run(TriggerRequest::default()).await;
    // First push failure consumed the script; second push succeeds.
    assert_eq!(outcome.status_code(), 200);

    h.scm.fail_next_push(Error::scm("pre-receive hook declined", false));
    let outcome = h.runner.run(TriggerRequest::default()).await;
    assert_eq!(outcome.status_code(), 500);

    let failures: Vec<_> = h
        .sink
        .published()
        .into_iter()
        .filter(|(_, a)| a.failed_executions == 1)
        .collect();
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn health_never_touches_the_checkout() {
    let h = harness();
    let report = h.runner.health().await;
    assert!(report.healthy);
    assert!(h.scm.calls().is_empty());
    assert_eq!(h.sink.publish_count(), 0);
}
