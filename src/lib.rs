// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod listener;
pub mod logging;
pub mod prereq;
pub mod storage;
pub mod triggers;
pub mod types;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{
    BlobNotificationExecutor, EVENT_CHANNEL_CAPACITY, QueueTriggerExecutor, TriggerEvent, Worker,
    WorkerCore, spawn_timer_trigger,
};
use crate::exec::{LocalExecutionQueue, ProcessRunner, QueueOutputSink};
use crate::listener::{poison_queue_name, spawn_queue_listener};
use crate::storage::{
    MemoryQueueService, MemoryTable, MemoryTableService, QueueService, QueueTransport,
};
use crate::triggers::TriggerMap;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the local execution queue (prerequisite tables, instance store, runner)
/// - the worker loop
/// - one listener per function queue plus the blob notification listener
/// - timer triggers
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tables = MemoryTableService::new();
    let queues = MemoryQueueService::new();

    let exec_queue: LocalExecutionQueue<MemoryTable> = LocalExecutionQueue::start(
        cfg.functions.clone(),
        &tables,
        Arc::new(ProcessRunner::new()?),
        Arc::new(QueueOutputSink::new(
            queues.clone(),
            cfg.host.blob_notification_queue.clone(),
        )),
        shutdown_rx.clone(),
    );

    let core = WorkerCore::new(cfg.functions.clone());
    let map = core.trigger_map().clone();

    let (event_tx, event_rx) = mpsc::channel::<TriggerEvent>(EVENT_CHANNEL_CAPACITY);
    let worker = tokio::spawn(Worker::new(core, event_rx, exec_queue.clone()).run());

    for name in &args.invoke {
        let id = exec_queue.call(name, BTreeMap::new(), Vec::new()).await?;
        info!(function = %name, invocation = %id, "explicit invocation queued");
    }

    if args.once {
        for (function_id, _) in map.timers() {
            event_tx
                .send(TriggerEvent::Timer {
                    function_id: function_id.clone(),
                })
                .await?;
        }
        event_tx.send(TriggerEvent::ShutdownRequested).await?;
        worker.await??;

        exec_queue.wait_idle().await;
        info!("all invocations finished; exiting");
        let _ = shutdown_tx.send(true);
        return Ok(());
    }

    let mut listeners = spawn_listeners(&cfg, &map, &queues, &event_tx, &shutdown_rx).await?;
    for (function_id, interval) in map.timers() {
        listeners.push(spawn_timer_trigger(
            function_id.clone(),
            *interval,
            event_tx.clone(),
            shutdown_rx.clone(),
        ));
    }

    // Ctrl-C → graceful shutdown.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = shutdown_tx.send(true);
            let _ = tx.send(TriggerEvent::ShutdownRequested).await;
        });
    }
    drop(event_tx);

    worker.await??;
    for handle in listeners {
        if let Err(e) = handle.await {
            warn!(error = %e, "listener task ended abnormally");
        }
    }
    info!("jobhost stopped");
    Ok(())
}

async fn spawn_listeners(
    cfg: &ConfigFile,
    map: &TriggerMap,
    queues: &MemoryQueueService,
    event_tx: &mpsc::Sender<TriggerEvent>,
    shutdown: &watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::new();
    let options = cfg.host.listener;

    for name in map.queue_names() {
        let queue = queues.queue(name);
        queue.create_if_not_exists().await?;
        handles.push(spawn_queue_listener(
            queue,
            queues.queue(&poison_queue_name(name)),
            QueueTriggerExecutor::new(name, event_tx.clone()),
            options,
            shutdown.clone(),
        ));
    }

    let notifications = &cfg.host.blob_notification_queue;
    let queue = queues.queue(notifications);
    queue.create_if_not_exists().await?;
    handles.push(spawn_queue_listener(
        queue,
        queues.queue(&poison_queue_name(notifications)),
        BlobNotificationExecutor::new(event_tx.clone()),
        options,
        shutdown.clone(),
    ));

    debug!(listeners = handles.len(), "queue listeners started");
    Ok(handles)
}

/// Dry-run output: host settings, functions and the trigger index.
fn print_dry_run(cfg: &ConfigFile) {
    let listener = &cfg.host.listener;
    println!("jobhost dry-run");
    println!("  host.name = {}", cfg.host.name);
    println!("  host.poll_interval = {:?}", listener.poll_interval);
    println!("  host.visibility_timeout = {:?}", listener.visibility_timeout);
    println!("  host.min_renewal_interval = {:?}", listener.min_renewal_interval);
    println!("  host.renewal_failure_divisor = {}", listener.renewal_failure_divisor);
    println!("  host.max_dequeue_count = {}", listener.max_dequeue_count);
    println!("  host.blob_notification_queue = {}", cfg.host.blob_notification_queue);
    println!();

    println!("functions ({}):", cfg.functions.len());
    for function in &cfg.functions {
        println!("  - {}", function.location);
        println!("      cmd: {}", function.command);
        if function.triggers.is_empty() {
            println!("      trigger: (call only)");
        }
        for trigger in &function.triggers {
            println!("      trigger: {trigger}");
        }
    }
    println!();

    let map = TriggerMap::build(&cfg.functions);
    println!("trigger map:");
    for queue in map.queue_names() {
        println!("  queue {queue} -> {:?}", map.functions_for_queue(queue));
    }
    for (function_id, interval) in map.timers() {
        println!("  timer {interval:?} -> {function_id}");
    }

    debug!("dry-run complete (no execution)");
}
