// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use jobhost::config::{ConfigFile, load_and_validate, load_from_path};
use jobhost::errors::HostError;
use jobhost::triggers::Trigger;
use jobhost_test_utils::builders::{ConfigFileBuilder, FunctionConfigBuilder};

type TestResult = Result<(), Box<dyn Error>>;

const FULL_CONFIG: &str = r#"
[host]
name = "batch"
poll_interval = "500ms"
visibility_timeout = "2m"
min_renewal_interval = "10s"
max_dequeue_count = 3

[function.resize]
cmd = "convert $JOBHOST_ARG_BLOB out.png"
blob = "images/{name}.png"
outputs = ["thumbs/{name}.png"]

[function.ingest]
cmd = "./ingest.sh"
queue = "orders"

[function.cleanup]
cmd = "rm -rf /tmp/scratch"
timer = "1h"

[function.report]
cmd = "./report.sh"
"#;

fn write_config(contents: &str) -> Result<(TempDir, std::path::PathBuf), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("JobHost.toml");
    fs::write(&path, contents)?;
    Ok((dir, path))
}

#[test]
fn loads_and_validates_full_config_from_disk() -> TestResult {
    let (_dir, path) = write_config(FULL_CONFIG)?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.host.name, "batch");
    assert_eq!(cfg.host.listener.poll_interval, Duration::from_millis(500));
    assert_eq!(cfg.host.listener.visibility_timeout, Duration::from_secs(120));
    assert_eq!(cfg.host.listener.min_renewal_interval, Duration::from_secs(10));
    assert_eq!(cfg.host.listener.renewal_failure_divisor, 2);
    assert_eq!(cfg.host.listener.max_dequeue_count, 3);
    assert_eq!(cfg.functions.len(), 4);

    let resize = cfg.function("resize").ok_or("missing resize")?;
    assert_eq!(resize.id(), "batch.resize");
    match &resize.triggers[..] {
        [Trigger::Blob(blob)] => {
            assert_eq!(blob.input.as_str(), "images/{name}.png");
            assert_eq!(blob.outputs.len(), 1);
        }
        other => return Err(format!("unexpected triggers {other:?}").into()),
    }

    let ingest = cfg.function("ingest").ok_or("missing ingest")?;
    assert!(matches!(&ingest.triggers[..], [Trigger::Queue(q)] if q.queue_name == "orders"));

    let cleanup = cfg.function("cleanup").ok_or("missing cleanup")?;
    assert!(matches!(
        &cleanup.triggers[..],
        [Trigger::Timer(t)] if t.interval == Duration::from_secs(3600)
    ));

    let report = cfg.function("report").ok_or("missing report")?;
    assert!(report.triggers.is_empty());
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let err = load_from_path(dir.path().join("absent.toml"))
        .err()
        .ok_or("expected an error")?;
    assert!(matches!(err, HostError::IoError(_)));
    Ok(())
}

#[test]
fn malformed_toml_is_reported() -> TestResult {
    let (_dir, path) = write_config("[function.a\ncmd = 1")?;
    let err = load_and_validate(&path).err().ok_or("expected an error")?;
    assert!(matches!(err, HostError::TomlError(_)));
    Ok(())
}

#[test]
fn config_without_functions_is_rejected() -> TestResult {
    let (_dir, path) = write_config("[host]\nname = \"empty\"\n")?;
    let err = load_and_validate(&path).err().ok_or("expected an error")?;
    assert!(matches!(err, HostError::ConfigError(_)));
    Ok(())
}

#[test]
fn builder_configs_validate_like_files() {
    let cfg = ConfigFileBuilder::new()
        .host_name("built")
        .visibility_timeout("30s")
        .min_renewal_interval("5s")
        .with_function("a", FunctionConfigBuilder::new("true").queue("jobs").build())
        .build();

    assert_eq!(cfg.host.listener.visibility_timeout, Duration::from_secs(30));
    assert_eq!(cfg.functions[0].id(), "built.a");
}

#[test]
fn rejects_invalid_function_definitions() {
    let cases = [
        FunctionConfigBuilder::new("true").queue("jobs").timer("1s").build(),
        FunctionConfigBuilder::new("true").queue("Bad_Queue").build(),
        FunctionConfigBuilder::new("true").output("out/{x}").build(),
        FunctionConfigBuilder::new("true").blob("in/{a}").output("out/{b}").build(),
        FunctionConfigBuilder::new("true").blob("no-separator").build(),
        FunctionConfigBuilder::new("true").timer("0s").build(),
        FunctionConfigBuilder::new("   ").build(),
    ];

    for function in cases {
        let raw = ConfigFileBuilder::new().with_function("f", function.clone()).build_raw();
        assert!(
            ConfigFile::try_from(raw).is_err(),
            "expected {function:?} to be rejected"
        );
    }
}

#[test]
fn rejects_renewal_interval_above_half_the_visibility_timeout() {
    let raw = ConfigFileBuilder::new()
        .visibility_timeout("30s")
        .min_renewal_interval("20s")
        .with_function("a", FunctionConfigBuilder::new("true").build())
        .build_raw();

    let err = ConfigFile::try_from(raw).err();
    assert!(matches!(err, Some(HostError::ConfigError(msg)) if msg.contains("min_renewal_interval")));
}

#[test]
fn rejects_zero_poll_interval() {
    let raw = ConfigFileBuilder::new()
        .poll_interval("0ms")
        .with_function("a", FunctionConfigBuilder::new("true").queue("orders").build())
        .build_raw();

    let err = ConfigFile::try_from(raw).err();
    assert!(matches!(err, Some(HostError::ConfigError(msg)) if msg.contains("poll_interval")));

    let cfg = ConfigFileBuilder::new()
        .poll_interval("250ms")
        .with_function("a", FunctionConfigBuilder::new("true").queue("orders").build())
        .build();
    assert_eq!(cfg.host.listener.poll_interval, Duration::from_millis(250));
}

#[test]
fn rejects_zero_max_dequeue_count_and_dotted_names() {
    let zero = ConfigFileBuilder::new()
        .max_dequeue_count(0)
        .with_function("a", FunctionConfigBuilder::new("true").build())
        .build_raw();
    assert!(ConfigFile::try_from(zero).is_err());

    let dotted_host = ConfigFileBuilder::new()
        .host_name("a.b")
        .with_function("a", FunctionConfigBuilder::new("true").build())
        .build_raw();
    assert!(ConfigFile::try_from(dotted_host).is_err());

    let dotted_function = ConfigFileBuilder::new()
        .with_function("a.b", FunctionConfigBuilder::new("true").build())
        .build_raw();
    assert!(ConfigFile::try_from(dotted_function).is_err());
}
