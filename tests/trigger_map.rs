// tests/trigger_map.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::time::Duration;

use jobhost::engine::{CoreEvent, WorkerCore};
use jobhost::storage::{Lease, QueueMessage};
use jobhost::triggers::{
    BlobPath, BlobPattern, BlobWrittenMessage, InvocationBuilder, NameParameterBinder,
    TriggerMap, TriggerReason,
};
use jobhost::types::InvocationId;
use jobhost_test_utils::builders::FunctionBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn message(id: &str, payload: &str) -> QueueMessage {
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

fn blob_event(path: &str, writer: Option<InvocationId>) -> Result<CoreEvent, Box<dyn Error>> {
    let path: BlobPath = path.parse()?;
    Ok(CoreEvent::BlobWritten(BlobWrittenMessage::new(&path, writer)))
}

#[test]
fn single_segment_capture_binds_name() -> TestResult {
    let pattern = BlobPattern::parse("container/{name}.txt")?;

    let captures = pattern
        .match_path(&"container/foo.txt".parse()?)
        .ok_or("expected a match")?;
    assert_eq!(captures.get("name").map(String::as_str), Some("foo"));

    assert!(pattern.match_path(&"container/sub/foo.txt".parse()?).is_none());
    Ok(())
}

#[test]
fn map_indexes_every_trigger_kind() {
    let functions = vec![
        FunctionBuilder::new("resize").blob("images/{name}.png", &[]).build(),
        FunctionBuilder::new("bill").queue("orders").build(),
        FunctionBuilder::new("audit").queue("orders").queue("refunds").build(),
        FunctionBuilder::new("tick").timer(Duration::from_secs(30)).build(),
    ];

    let map = TriggerMap::build(&functions);

    assert_eq!(map.queue_names(), vec!["orders", "refunds"]);
    assert_eq!(map.functions_for_queue("orders"), ["test.bill", "test.audit"]);
    assert!(map.functions_for_queue("unknown").is_empty());
    assert_eq!(map.timers(), [("test.tick".to_string(), Duration::from_secs(30))]);
    assert_eq!(map.blob_triggers_for(&BlobPath::new("Images", "x.png")).len(), 1);
    assert_eq!(map.triggers_for("test.audit").len(), 2);
    assert_eq!(map.function_ids().count(), 4);
}

#[test]
fn queue_message_fans_out_with_bound_arguments() -> TestResult {
    let mut core = WorkerCore::new(vec![
        FunctionBuilder::new("bill").queue("orders").build(),
        FunctionBuilder::new("audit").queue("orders").build(),
    ]);
    let parent = InvocationId::new();
    let payload = format!(r#"{{"order":"42","$ParentId":"{parent}"}}"#);

    let step = core.step(CoreEvent::QueueMessage {
        queue: "orders".into(),
        message: message("m1", &payload),
    });

    assert!(step.accepted);
    assert!(step.keep_running);
    assert_eq!(step.requests.len(), 2);
    for request in &step.requests {
        assert_eq!(request.args.get("order").map(String::as_str), Some("42"));
        assert_eq!(request.args.get("message"), Some(&payload));
        assert!(!request.args.contains_key("$ParentId"));
        assert_eq!(request.trigger_reason.parent(), Some(parent));
    }
    Ok(())
}

#[test]
fn blob_trigger_binds_captures_and_writer() -> TestResult {
    let mut core = WorkerCore::new(vec![
        FunctionBuilder::new("resize").blob("images/{name}.png", &[]).build(),
    ]);
    let writer = InvocationId::new();

    let step = core.step(blob_event("images/cat.png", Some(writer))?);

    assert_eq!(step.requests.len(), 1);
    let request = &step.requests[0];
    assert_eq!(request.args.get("name").map(String::as_str), Some("cat"));
    assert_eq!(request.args.get("blob").map(String::as_str), Some("images/cat.png"));
    assert_eq!(request.trigger_reason.parent(), Some(writer));

    let step = core.step(blob_event("images/nested/cat.png", None)?);
    assert!(step.requests.is_empty());
    Ok(())
}

#[test]
fn blob_trigger_with_outputs_fires_only_when_outputs_are_stale() -> TestResult {
    let mut core = WorkerCore::new(vec![
        FunctionBuilder::new("thumb")
            .blob("images/{name}.png", &["thumbs/{name}.png"])
            .build(),
    ]);
    let input: BlobPath = "images/cat.png".parse()?;
    let upload = BlobWrittenMessage::new(&input, None);

    // Missing output.
    assert_eq!(core.step(CoreEvent::BlobWritten(upload.clone())).requests.len(), 1);

    // Output written after the input: the same upload, redelivered, is up to date.
    core.step(blob_event("thumbs/cat.png", None)?);
    assert!(core.step(CoreEvent::BlobWritten(upload)).requests.is_empty());

    // A fresh upload makes the output older than the input.
    let reupload = BlobWrittenMessage::new(&input, None);
    assert_eq!(core.step(CoreEvent::BlobWritten(reupload)).requests.len(), 1);

    // Another function's output container does not fire this trigger.
    assert!(core.step(blob_event("thumbs/dog.png", None)?).requests.is_empty());
    Ok(())
}

#[test]
fn explicit_call_keeps_args_and_prereqs() {
    let builder = InvocationBuilder::new(NameParameterBinder);
    let function = FunctionBuilder::new("report").build();
    let prereq = InvocationId::new();
    let parent = InvocationId::new();
    let args = BTreeMap::from([("day".to_string(), "monday".to_string())]);

    let request = builder.for_call(&function, args.clone(), vec![prereq], Some(parent));

    assert_eq!(request.args, args);
    assert_eq!(request.prereqs, vec![prereq]);
    assert_eq!(request.trigger_reason, TriggerReason::Invoke { parent: Some(parent) });
    assert_eq!(request.location.id(), "test.report");
}
