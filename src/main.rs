#![doc = include_str!("../README.md")]

mod action;
mod condition;
mod config;
mod device;
mod handler;
mod ipc;
mod runtime;
mod stroke;
mod trigger;
mod variable;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use evdev::EventStream;
use log::{debug, error, info, warn};
use notify::Watcher;
use tokio::sync::mpsc;

use action::{ActionDeps, GlobalShortcutInvoker, InputEmitter};
use condition::CommandRunner;
use device::supervisor::DeviceEvent;

const DEV_INPUT: &str = "/dev/input";

/// Recognizes pointer, keyboard, touchpad and touchscreen gestures from raw
/// evdev input and runs configured actions in response.
#[derive(Debug, Clone, clap::Parser)]
pub struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory holding device nodes to watch (overridable for tests).
    #[arg(long, default_value = DEV_INPUT)]
    pub dev_input: PathBuf,
    /// Disable grabbing devices even if the configuration requests it.
    #[arg(long)]
    pub no_grab: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.filter_level(log::LevelFilter::Info);
    builder.parse_default_env();
    builder.init();
}

struct ProcessEmitter;

impl InputEmitter for ProcessEmitter {
    fn keyboard_key(&self, code: u32, pressed: bool) {
        debug!(target: "inputactions::action", "keyboard_key({code}, {pressed})");
    }
    fn keyboard_text(&self, text: &str) {
        debug!(target: "inputactions::action", "keyboard_text({text:?})");
    }
    fn mouse_button(&self, code: u32, pressed: bool) {
        debug!(target: "inputactions::action", "mouse_button({code}, {pressed})");
    }
    fn mouse_move_absolute(&self, x: f64, y: f64) {
        debug!(target: "inputactions::action", "mouse_move_absolute({x}, {y})");
    }
    fn mouse_move_relative(&self, dx: f64, dy: f64) {
        debug!(target: "inputactions::action", "mouse_move_relative({dx}, {dy})");
    }
    fn mouse_wheel(&self, dx: f64, dy: f64, executions: u32) {
        debug!(target: "inputactions::action", "mouse_wheel({dx}, {dy}, {executions})");
    }
}

struct NoopShortcuts;

impl GlobalShortcutInvoker for NoopShortcuts {
    fn invoke(&self, name: &str) {
        debug!(target: "inputactions::action", "global_shortcut({name:?})");
    }
}

struct ShellCommands;

impl CommandRunner for ShellCommands {
    fn run(&self, command: &str) -> Option<String> {
        std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .ok()
            .map(|output| String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

const CRASH_LOOP_SENTINEL: &str = "/run/inputactions.crash-sentinel";

fn load_config(path: Option<&Path>, initial: bool) -> config::Model {
    let Some(path) = path else { return config::Model::empty() };
    config::crash_loop_guard(Path::new(CRASH_LOOP_SENTINEL), initial, || {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_yaml::from_str::<config::Model>(&raw) {
                Ok(model) => {
                    let errors = model.validate();
                    if errors.is_empty() {
                        model
                    } else {
                        for error in &errors {
                            warn!(target: "inputactions::config", "{error}");
                        }
                        config::Model::empty()
                    }
                }
                Err(err) => {
                    warn!(target: "inputactions::config", "failed to parse {}: {err}", path.display());
                    config::Model::empty()
                }
            },
            Err(err) => {
                warn!(target: "inputactions::config", "failed to read {}: {err}", path.display());
                config::Model::empty()
            }
        }
    })
}

async fn run(args: Args) -> Result<()> {
    let model = load_config(args.config.as_deref(), true);
    let deps = ActionDeps {
        emitter: std::sync::Arc::new(ProcessEmitter),
        commands: std::sync::Arc::new(ShellCommands),
        shortcuts: std::sync::Arc::new(NoopShortcuts),
        delta_multiplied: (1.0, 1.0),
    };

    let mut runtime = runtime::Runtime::new(model, deps);
    runtime
        .initialize(&args.dev_input)
        .with_context(|| format!("failed to initialize devices under {}", args.dev_input.display()))?;

    let (send_device_events, mut recv_device_events) = mpsc::unbounded_channel::<DeviceEvent>();

    let watch_dir = args.dev_input.clone();
    let mut watcher = notify::recommended_watcher(move |res| match res {
        Ok(notify::Event { kind: notify::EventKind::Create(_), paths, .. }) => {
            for path in paths {
                let _ = send_device_events.send(DeviceEvent::Added(path));
            }
        }
        Ok(notify::Event { kind: notify::EventKind::Remove(_), paths, .. }) => {
            for path in paths {
                let _ = send_device_events.send(DeviceEvent::Removed(path));
            }
        }
        Ok(_) => {}
        Err(err) => warn!("error watching {:?}: {:#}", watch_dir, anyhow::Error::new(err)),
    })
    .with_context(|| format!("failed to create {DEV_INPUT:?} watcher"))?;
    watcher
        .watch(&args.dev_input, notify::RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to start watching {}", args.dev_input.display()))?;
    info!("watching {} for device changes", args.dev_input.display());

    event_loop(&mut runtime, &mut recv_device_events).await
}

/// Drives the main/event thread (spec.md §5): reads evdev frames from every
/// tracked device, feeds them to the supervisor, and reacts to hotplug
/// events. Does not itself own the per-device `EventStream`s beyond this
/// loop's lifetime — a config reload or emergency release resets handler
/// state in place rather than restarting the loop.
async fn event_loop(
    runtime: &mut runtime::Runtime,
    device_events: &mut mpsc::UnboundedReceiver<DeviceEvent>,
) -> Result<()> {
    use futures::stream::FuturesUnordered;
    use futures::StreamExt;

    let mut streams: ahash::AHashMap<PathBuf, EventStream> = ahash::AHashMap::new();
    // Events collected per device since its last SYN_REPORT (spec.md §4.1
    // step 1: a frame is everything up to and including the terminating
    // sync event, not one evdev event at a time).
    let mut frame_buffers: ahash::AHashMap<PathBuf, Vec<evdev::InputEvent>> = ahash::AHashMap::new();
    // Drives the touchpad virtual-device-reset timer (spec.md §4.1 step 5)
    // independently of whether any device is currently producing frames.
    let mut reset_ticker = tokio::time::interval(Duration::from_millis(50));

    loop {
        let mut pending = streams
            .iter_mut()
            .map(|(path, stream)| async move {
                let result = stream.next_event().await;
                (path.clone(), result)
            })
            .collect::<FuturesUnordered<_>>();

        tokio::select! {
            Some(event) = device_events.recv() => {
                drop(pending);
                match event.clone() {
                    DeviceEvent::Added(path) => {
                        runtime.supervisor.handle_device_event(event);
                        if let Some(device) = runtime.supervisor.devices().find(|d| d.system_path == path) {
                            if let Ok(stream) = evdev::Device::open(&path).and_then(evdev::Device::into_event_stream) {
                                streams.insert(path, stream);
                            }
                            let _ = device;
                        }
                    }
                    DeviceEvent::Removed(path) => {
                        streams.remove(&path);
                        frame_buffers.remove(&path);
                        runtime.supervisor.handle_device_event(event);
                    }
                }
            }
            Some((path, result)) = pending.next() => {
                drop(pending);
                match result {
                    Ok(event) => {
                        let buffer = frame_buffers.entry(path.clone()).or_default();
                        let is_syn_report = matches!(
                            event.kind(),
                            evdev::InputEventKind::Synchronization(evdev::SynchronizationCode::SYN_REPORT)
                        );
                        buffer.push(event);
                        if is_syn_report {
                            let frame = std::mem::take(buffer);
                            frame_buffers.remove(&path);
                            let ctx = runtime.eval_context(std::sync::Arc::new(condition::NoCommands));
                            runtime.supervisor.handle_frame(
                                &path,
                                &frame,
                                &mut runtime.chain,
                                &runtime.executor,
                                &ctx,
                                &runtime.deps,
                            );
                        }
                    }
                    Err(err) => {
                        warn!("failed to read events from {path:?}: {:#}", anyhow::Error::new(err));
                        streams.remove(&path);
                        frame_buffers.remove(&path);
                    }
                }
            }
            _ = reset_ticker.tick() => {
                runtime.supervisor.tick_virtual_device_resets();
            }
        }
    }
}
