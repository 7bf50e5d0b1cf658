// tests/orchestrator.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use jobhost::engine::{
    EVENT_CHANNEL_CAPACITY, QueueTriggerExecutor, TriggerEvent, Worker, WorkerCore,
};
use jobhost::errors::HostError;
use jobhost::exec::{FunctionOutput, LocalExecutionQueue, QueueOutputSink};
use jobhost::listener::{PollQueueOptions, poison_queue_name, spawn_queue_listener};
use jobhost::storage::{
    Lease, MemoryQueueService, MemoryTable, MemoryTableService, QueueMessage, QueueService,
    QueueTransport,
};
use jobhost::triggers::causality::owner_from_payload;
use jobhost::triggers::{BlobPath, BlobWrittenMessage, FunctionDefinition, TriggerReason};
use jobhost::types::FunctionStatus;
use jobhost_test_utils::builders::FunctionBuilder;
use jobhost_test_utils::fakes::{FakeRunner, RecordingExecutionQueue};
use jobhost_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const NOTIFICATIONS: &str = "blob-written";

struct Host {
    queue: LocalExecutionQueue<MemoryTable>,
    runner: FakeRunner,
    queues: MemoryQueueService,
    shutdown: watch::Sender<bool>,
}

fn start_host(functions: Vec<FunctionDefinition>) -> Host {
    init_tracing();
    let runner = FakeRunner::new();
    let queues = MemoryQueueService::new();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let queue = LocalExecutionQueue::start(
        functions,
        &MemoryTableService::new(),
        Arc::new(runner.clone()),
        Arc::new(QueueOutputSink::new(queues.clone(), NOTIFICATIONS)),
        shutdown_rx,
    );
    Host {
        queue,
        runner,
        queues,
        shutdown,
    }
}

fn chain() -> Vec<FunctionDefinition> {
    vec![
        FunctionBuilder::new("A").build(),
        FunctionBuilder::new("B").build(),
    ]
}

fn queue_message(id: &str, payload: &str) -> QueueMessage {
    QueueMessage {
        id: id.to_string(),
        payload: payload.to_string(),
        dequeue_count: 1,
        lease: Lease {
            message_id: id.to_string(),
            pop_receipt: "r".to_string(),
        },
    }
}

#[tokio::test]
async fn chain_runs_prerequisite_first() -> TestResult {
    let host = start_host(chain());

    let a = host.queue.call("A", BTreeMap::new(), vec![]).await?;
    let b = host.queue.call("B", BTreeMap::new(), vec![a]).await?;
    with_timeout(host.queue.wait_idle()).await;

    assert_eq!(host.runner.run_names(), vec!["A", "B"]);
    assert_eq!(host.queue.store().status(a), Some(FunctionStatus::CompletedSuccess));
    assert_eq!(host.queue.store().status(b), Some(FunctionStatus::CompletedSuccess));
    assert!(host.queue.prereqs().is_ready(b).await?);
    Ok(())
}

#[tokio::test]
async fn failed_prerequisite_leaves_successor_queued() -> TestResult {
    let host = start_host(chain());
    host.runner.fail("A");

    let a = host.queue.call("A", BTreeMap::new(), vec![]).await?;
    let b = host.queue.call("B", BTreeMap::new(), vec![a]).await?;
    with_timeout(host.queue.wait_idle()).await;

    assert_eq!(host.runner.run_names(), vec!["A"]);
    assert_eq!(host.queue.store().status(a), Some(FunctionStatus::CompletedFailed));
    assert_eq!(host.queue.store().status(b), Some(FunctionStatus::Queued));
    assert_eq!(host.queue.prereqs().pending_prereqs(b).await?, vec![a]);
    assert_eq!(host.queue.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn successor_of_finished_prerequisite_starts_immediately() -> TestResult {
    let host = start_host(chain());

    let a = host.queue.call("A", BTreeMap::new(), vec![]).await?;
    with_timeout(host.queue.wait_idle()).await;
    let b = host.queue.call("test.B", BTreeMap::new(), vec![a]).await?;
    with_timeout(host.queue.wait_idle()).await;

    assert_eq!(host.queue.store().status(b), Some(FunctionStatus::CompletedSuccess));
    Ok(())
}

#[tokio::test]
async fn call_rejects_unknown_function() -> TestResult {
    let host = start_host(chain());

    let err = host
        .queue
        .call("nope", BTreeMap::new(), vec![])
        .await
        .err()
        .ok_or("expected an error")?;

    assert!(matches!(err, HostError::UnknownFunction(name) if name == "nope"));
    Ok(())
}

#[tokio::test]
async fn outputs_are_published_with_their_producer() -> TestResult {
    let host = start_host(chain());
    host.runner.produce(
        "A",
        FunctionOutput::Queue {
            queue: "orders".into(),
            payload: r#"{"order":7}"#.into(),
        },
    );
    host.runner
        .produce("A", FunctionOutput::Blob(BlobPath::new("reports", "a.csv")));

    let a = host.queue.call("A", BTreeMap::new(), vec![]).await?;
    with_timeout(host.queue.wait_idle()).await;

    let orders = host.queues.queue("orders").payloads();
    assert_eq!(orders.len(), 1);
    assert_eq!(owner_from_payload(&orders[0]), Some(a));

    let notices = host.queues.queue(NOTIFICATIONS).payloads();
    let notice = BlobWrittenMessage::from_json(&notices[0])?;
    assert_eq!(notice.path(), BlobPath::new("reports", "a.csv"));
    assert_eq!(notice.writer, Some(a));
    Ok(())
}

#[tokio::test]
async fn worker_acks_after_queueing_every_invocation() -> TestResult {
    let functions = vec![
        FunctionBuilder::new("bill").queue("orders").build(),
        FunctionBuilder::new("audit").queue("orders").build(),
    ];
    let host = start_host(functions.clone());
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let worker = tokio::spawn(Worker::new(WorkerCore::new(functions), rx, host.queue.clone()).run());

    let (ack_tx, ack_rx) = oneshot::channel();
    tx.send(TriggerEvent::QueueMessage {
        queue: "orders".into(),
        message: queue_message("m1", r#"{"order":"9"}"#),
        ack: ack_tx,
    })
    .await?;
    assert!(with_timeout(ack_rx).await?);
    with_timeout(host.queue.wait_idle()).await;

    let mut names = host.runner.run_names();
    names.sort();
    assert_eq!(names, vec!["audit", "bill"]);
    for run in host.runner.runs() {
        assert_eq!(run.args.get("order").map(String::as_str), Some("9"));
        assert!(matches!(run.trigger_reason, TriggerReason::QueueMessage { .. }));
    }

    tx.send(TriggerEvent::ShutdownRequested).await?;
    with_timeout(worker).await??;
    host.shutdown.send(true)?;
    Ok(())
}

#[tokio::test]
async fn worker_nacks_when_queueing_fails() -> TestResult {
    init_tracing();
    let functions = vec![FunctionBuilder::new("bill").queue("orders").build()];
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let worker = tokio::spawn(
        Worker::new(WorkerCore::new(functions), rx, RecordingExecutionQueue::rejecting()).run(),
    );

    let (ack_tx, ack_rx) = oneshot::channel();
    tx.send(TriggerEvent::QueueMessage {
        queue: "orders".into(),
        message: queue_message("m1", "plain"),
        ack: ack_tx,
    })
    .await?;
    assert!(!with_timeout(ack_rx).await?);

    drop(tx);
    with_timeout(worker).await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn worker_heartbeat_tracks_handled_events() -> TestResult {
    init_tracing();
    let functions = vec![
        FunctionBuilder::new("bill").queue("orders").build(),
        FunctionBuilder::new("audit").queue("orders").build(),
    ];
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let worker = Worker::new(WorkerCore::new(functions), rx, RecordingExecutionQueue::new());
    let heartbeat = worker.heartbeat();
    let started_at = heartbeat.borrow().started_at;
    assert_eq!(heartbeat.borrow().events_handled, 0);
    assert_eq!(heartbeat.borrow().last_event_at, None);
    let worker = tokio::spawn(worker.run());

    tokio::time::advance(Duration::from_secs(30)).await;
    let (ack_tx, ack_rx) = oneshot::channel();
    tx.send(TriggerEvent::QueueMessage {
        queue: "orders".into(),
        message: queue_message("m1", "plain"),
        ack: ack_tx,
    })
    .await?;
    assert!(with_timeout(ack_rx).await?);
    tx.send(TriggerEvent::ShutdownRequested).await?;
    with_timeout(worker).await??;

    let beat = *heartbeat.borrow();
    assert_eq!(beat.started_at, started_at);
    assert_eq!(beat.events_handled, 2);
    assert_eq!(beat.invocations_queued, 2);
    let last_event_at = beat.last_event_at.ok_or("no event recorded")?;
    assert!(last_event_at >= started_at + Duration::from_secs(30));
    assert!(beat.uptime() >= Duration::from_secs(30));
    Ok(())
}

#[tokio::test]
async fn blob_output_triggers_downstream_function() -> TestResult {
    let functions = vec![
        FunctionBuilder::new("export").build(),
        FunctionBuilder::new("index").blob("reports/{name}.csv", &[]).build(),
    ];
    let host = start_host(functions.clone());
    host.runner
        .produce("export", FunctionOutput::Blob(BlobPath::new("reports", "daily.csv")));
    let recorder = RecordingExecutionQueue::new();
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let worker = tokio::spawn(Worker::new(WorkerCore::new(functions), rx, recorder.clone()).run());

    let export = host.queue.call("export", BTreeMap::new(), vec![]).await?;
    with_timeout(host.queue.wait_idle()).await;
    let payload = host
        .queues
        .queue(NOTIFICATIONS)
        .payloads()
        .pop()
        .ok_or("no blob notification")?;
    tx.send(TriggerEvent::BlobWritten {
        notice: BlobWrittenMessage::from_json(&payload)?,
        ack: None,
    })
    .await?;
    tx.send(TriggerEvent::ShutdownRequested).await?;
    with_timeout(worker).await??;

    let requests = recorder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].location.name, "index");
    assert_eq!(requests[0].args.get("name").map(String::as_str), Some("daily"));
    assert_eq!(requests[0].trigger_reason.parent(), Some(export));
    Ok(())
}

#[tokio::test]
async fn queue_listener_feeds_worker_and_deletes_message() -> TestResult {
    let functions = vec![FunctionBuilder::new("bill").queue("orders").build()];
    let host = start_host(functions.clone());
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let worker = tokio::spawn(Worker::new(WorkerCore::new(functions), rx, host.queue.clone()).run());

    let orders = host.queues.queue("orders");
    orders.create_if_not_exists().await?;
    orders.add_message(r#"{"order":"1"}"#.into()).await?;

    let options = PollQueueOptions {
        poll_interval: Duration::from_millis(10),
        ..PollQueueOptions::default()
    };
    let listener = spawn_queue_listener(
        orders.clone(),
        host.queues.queue(&poison_queue_name("orders")),
        QueueTriggerExecutor::new("orders", tx.clone()),
        options,
        host.shutdown.subscribe(),
    );

    with_timeout(async {
        while !orders.is_empty() || host.runner.runs().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    with_timeout(host.queue.wait_idle()).await;
    assert_eq!(host.runner.run_names(), vec!["bill"]);

    host.shutdown.send(true)?;
    with_timeout(listener).await?;
    tx.send(TriggerEvent::ShutdownRequested).await?;
    with_timeout(worker).await??;
    Ok(())
}
