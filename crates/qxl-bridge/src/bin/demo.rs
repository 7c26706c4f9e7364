#![forbid(unsafe_code)]

//! Drives a session end to end: a producer thread pushes draw commands while a polling worker
//! thread pulls, "executes" and releases them at its own pace.
//!
//! Configuration comes from `QXL_BRIDGE_*` env vars plus `QXL_BRIDGE_DEMO_COMMANDS`; log output is
//! controlled with `RUST_LOG`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use qxl_bridge::{
    BridgeConfig, CommandType, PushError, QxlInterface, Retire, SessionSlot, WorkerId,
};

const DEFAULT_COMMANDS: usize = 10_000;

fn main() -> Result<(), qxl_bridge::BridgeError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("invalid config: {err:#}");
            return Err(err.into());
        }
    };
    let commands = std::env::var("QXL_BRIDGE_DEMO_COMMANDS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_COMMANDS);

    let slot = SessionSlot::new();
    let mut session = slot.open(config)?;
    let released = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let adapter = session.adapter();
    let worker_done = done.clone();
    let worker = std::thread::spawn(move || {
        adapter.attach_worker(WorkerId(1));
        let init = adapter.get_init_info();
        tracing::info!(n_surfaces = init.n_surfaces, "worker attached");

        let mut executed = 0usize;
        loop {
            match adapter.get_command() {
                Some(cmd) => {
                    executed += 1;
                    // Pretend rendering takes a moment now and then so the producer sees
                    // back-pressure.
                    if executed % 512 == 0 {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    adapter.release_resource(cmd.release_info);
                }
                None if worker_done.load(Ordering::Acquire) => break,
                None => {
                    if adapter.req_cmd_notification() {
                        std::thread::yield_now();
                    }
                }
            }
        }
        executed
    });

    let producer = session.producer();
    let mut overloads = 0usize;
    for i in 0..commands {
        let counter = released.clone();
        let payload = (i as u32).to_le_bytes().to_vec();
        let mut cmd = producer.command(CommandType::Draw, payload, move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        loop {
            match producer.push(cmd) {
                Ok(()) => break,
                Err(PushError::Overloaded(rejected)) => {
                    overloads += 1;
                    cmd = rejected;
                }
                Err(PushError::Closed(rejected)) => {
                    tracing::error!(release_id = %rejected.release_info().id, "session closed");
                    rejected.retire();
                    return Ok(());
                }
            }
        }
    }

    done.store(true, Ordering::Release);
    let executed = worker.join().unwrap_or(0);
    let counts = session.teardown();

    tracing::info!(
        pushed = commands,
        executed,
        overloads,
        released = released.load(Ordering::Relaxed),
        force_released = counts.force_released(),
        "demo finished"
    );
    Ok(())
}
