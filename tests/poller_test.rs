use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scribe::error::Error;
use scribe::events::EventBus;
use scribe::gateway::poller::{PollConfig, Poller, ProgressHook};
use scribe::processor::mock::{MockObservation, MockProcessor};
use scribe::processor::{ContentKind, RemoteProcessor, Task, TaskStatus};

/// Fast pacing so tests don't sit around.
fn fast(max_attempts: u32) -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(5),
        max_attempts,
    }
}

fn poller(processor: &Arc<MockProcessor>, config: PollConfig) -> Poller {
    Poller::new(
        Arc::clone(processor) as Arc<dyn RemoteProcessor>,
        Arc::new(EventBus::default()),
        config,
    )
}

async fn submit(processor: &MockProcessor) -> Task {
    processor
        .create_task(ContentKind::CoverLetter, &HashMap::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn completed_on_third_observation_takes_exactly_three_queries() {
    let processor = Arc::new(MockProcessor::scripted(vec![
        MockObservation::Processing,
        MockObservation::Processing,
        MockObservation::Completed(serde_json::json!({"text": "Dear hiring team"})),
    ]));
    let task = submit(&processor).await;

    let finished = poller(&processor, fast(30)).poll(&task.id, None).await.unwrap();

    assert_eq!(finished.status, TaskStatus::Completed);
    assert!(finished.result.is_some());
    // Resolved on the terminal observation, well before the budget.
    assert_eq!(processor.poll_count(&task.id), 3);
}

#[tokio::test]
async fn timeout_after_exactly_max_attempts_queries() {
    let processor = Arc::new(MockProcessor::scripted(vec![MockObservation::Processing; 10]));
    let task = submit(&processor).await;

    let err = poller(&processor, fast(4)).poll(&task.id, None).await.unwrap_err();

    assert!(matches!(err, Error::PollingTimeout { attempts: 4 }));
    assert_eq!(processor.poll_count(&task.id), 4);
}

#[tokio::test]
async fn failed_is_authoritative_and_never_retried() {
    let processor = Arc::new(MockProcessor::scripted(vec![
        MockObservation::Processing,
        MockObservation::Failed("the prompt asked for too much".to_string()),
    ]));
    let task = submit(&processor).await;

    let err = poller(&processor, fast(30)).poll(&task.id, None).await.unwrap_err();

    match err {
        Error::TaskFailed { message } => {
            assert_eq!(message, "the prompt asked for too much");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    // The loop stopped at the failure instead of spending the budget.
    assert_eq!(processor.poll_count(&task.id), 2);
}

#[tokio::test]
async fn transport_error_aborts_the_session_immediately() {
    let processor = Arc::new(MockProcessor::scripted(vec![
        MockObservation::Processing,
        MockObservation::Transport("connection refused".to_string()),
        MockObservation::Processing,
        MockObservation::Completed(serde_json::json!({})),
    ]));
    let task = submit(&processor).await;

    let err = poller(&processor, fast(30)).poll(&task.id, None).await.unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    // Aborted on the failing query; no further attempts were spent.
    assert_eq!(processor.poll_count(&task.id), 2);
}

#[tokio::test]
async fn progress_hook_sees_every_observation_in_order() {
    let processor = Arc::new(MockProcessor::scripted(vec![
        MockObservation::Pending,
        MockObservation::Processing,
        MockObservation::Completed(serde_json::json!({"text": "done"})),
    ]));
    let task = submit(&processor).await;

    let seen: Arc<Mutex<Vec<TaskStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let hook: ProgressHook = Box::new(move |task: &Task| {
        sink.lock().unwrap().push(task.status);
    });

    poller(&processor, fast(30)).poll(&task.id, Some(&hook)).await.unwrap();

    // A full forward-only walk of the lifecycle, terminal snapshot included.
    assert_eq!(
        *seen.lock().unwrap(),
        vec![TaskStatus::Pending, TaskStatus::Processing, TaskStatus::Completed]
    );
}

#[tokio::test]
async fn status_regression_fails_loudly() {
    let processor = Arc::new(MockProcessor::scripted(vec![
        MockObservation::Processing,
        MockObservation::Pending,
    ]));
    let task = submit(&processor).await;

    let err = poller(&processor, fast(30)).poll(&task.id, None).await.unwrap_err();

    assert!(matches!(err, Error::Protocol(_)));
    assert!(err.to_string().contains("regressed"));
}

#[tokio::test]
async fn each_poll_call_gets_a_fresh_budget() {
    let processor = Arc::new(MockProcessor::scripted(vec![
        MockObservation::Processing,
        MockObservation::Processing,
        MockObservation::Processing,
        MockObservation::Completed(serde_json::json!({"text": "eventually"})),
    ]));
    let task = submit(&processor).await;

    let session = poller(&processor, fast(3));
    let err = session.poll(&task.id, None).await.unwrap_err();
    assert!(matches!(err, Error::PollingTimeout { attempts: 3 }));

    // A second session starts over and picks up where the task now is.
    let finished = session.poll(&task.id, None).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(processor.poll_count(&task.id), 4);
}

#[tokio::test]
async fn independent_tasks_poll_concurrently() {
    let processor = Arc::new(MockProcessor::new());
    processor.enqueue_script(vec![
        MockObservation::Processing,
        MockObservation::Completed(serde_json::json!({"text": "first"})),
    ]);
    processor.enqueue_script(vec![MockObservation::Completed(
        serde_json::json!({"text": "second"}),
    )]);

    let a = submit(&processor).await;
    let b = processor
        .create_task(ContentKind::JobMatch, &HashMap::new())
        .await
        .unwrap();

    let session = poller(&processor, fast(30));
    let (ra, rb) = tokio::join!(session.poll(&a.id, None), session.poll(&b.id, None));

    assert_eq!(ra.unwrap().result.unwrap()["text"], "first");
    assert_eq!(rb.unwrap().result.unwrap()["text"], "second");
}
