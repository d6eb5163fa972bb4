//! Polymorphic [`Action`] payloads and the [`ActionExecutor`] dispatch lanes.
//!
//! Grounded on `original_source/src/libinputactions/actions/{Action,ActionGroup,
//! InputAction,SleepAction,ActionExecutor}.{h,cpp}`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::condition::{CommandRunner, Condition, EvalContext};
use crate::variable::VariableStore;

/// One step of an `InputSequence` action (spec.md §3, "Action"), grounded on
/// `InputAction::Item`.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum InputSequenceItem {
    KeyPress(u32),
    KeyRelease(u32),
    KeyboardText(String),
    MousePress(u32),
    MouseRelease(u32),
    MouseMoveAbsolute(f64, f64),
    MouseMoveRelative(f64, f64),
    /// Moves by the trigger's accumulated, multiplier-scaled delta (the
    /// `mouseMoveRelativeByDelta` flag); filled in by
    /// [`crate::trigger::TriggerAction`] right before dispatch.
    MouseMoveRelativeByDelta,
    MouseWheel(f64, f64),
}

/// Emits synthetic input. Implemented by the virtual output device owned by
/// the device supervisor (spec.md §4.1); kept as a trait so action execution
/// can be unit tested without a kernel uinput device.
pub trait InputEmitter: Send + Sync {
    /// Presses or releases a synthetic key.
    fn keyboard_key(&self, code: u32, pressed: bool);
    /// Types literal text (requires a layout-aware backend; may be a no-op).
    fn keyboard_text(&self, text: &str);
    /// Presses or releases a synthetic mouse button.
    fn mouse_button(&self, code: u32, pressed: bool);
    /// Moves the pointer to an absolute screen position.
    fn mouse_move_absolute(&self, x: f64, y: f64);
    /// Moves the pointer by a relative delta.
    fn mouse_move_relative(&self, dx: f64, dy: f64);
    /// Scrolls by a relative delta, scaled by `executions` (matches
    /// `mouseWheel(item.mouseAxis * executions)`).
    fn mouse_wheel(&self, dx: f64, dy: f64, executions: u32);
}

/// Invokes a compositor-bound global shortcut. The concrete DBus/Wayland
/// binding is an explicit Non-goal (spec.md §1, "compositor-specific
/// integrations"); only the contract is defined here.
pub trait GlobalShortcutInvoker: Send + Sync {
    /// Invokes the named shortcut.
    fn invoke(&self, name: &str);
}

/// What an [`Action`] actually does.
#[derive(Clone)]
pub enum ActionKind {
    /// Synthetic key/button/text/motion sequence, executed in order.
    InputSequence(Vec<InputSequenceItem>),
    /// Runs a shell command (`/bin/sh -c <command>`), grounded on
    /// `ProcessRunner::startProcess`.
    Command(String),
    /// Invokes a named compositor shortcut.
    GlobalShortcut(String),
    /// Blocks the executing lane for a fixed duration.
    Sleep(Duration),
    /// Runs a set of sub-actions, `All` or `First`-matching-condition.
    Group {
        /// Execution mode.
        mode: GroupExecutionMode,
        /// Member actions, each independently condition-gated.
        actions: Vec<Arc<Action>>,
    },
}

/// How a `Group` action's members are executed (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupExecutionMode {
    /// Execute every member whose condition is satisfied.
    All,
    /// Execute only the first member whose condition is satisfied.
    First,
}

/// A polymorphic action payload (spec.md §3, "Action").
pub struct Action {
    /// Optional identifier, used in log messages and `last_trigger_id`.
    pub id: Option<String>,
    /// What this action does.
    pub kind: ActionKind,
    /// Gates execution in addition to `execution_limit`.
    pub condition: Option<Condition>,
    /// Maximum number of executions per gesture activation; `None` means
    /// unlimited.
    pub execution_limit: Option<u32>,
    /// Per-gesture execution counter, reset on each trigger activation.
    executions: AtomicU32,
    /// Whether this action must never run on the caller's thread even when
    /// the shared lane is idle and `Current` wasn't explicitly requested
    /// ([`ActionExecutor`] dispatch policy, spec.md §4.6).
    pub is_async: bool,
    /// Whether repeated `Update`/`Tick` fires within one event should be
    /// merged into a single `execute` call carrying the fire count, rather
    /// than calling `execute` once per fire.
    pub mergeable: bool,
}

impl Action {
    /// Builds an action with no condition, no execution limit, and default
    /// async/mergeable flags appropriate for its kind.
    pub fn new(id: Option<String>, kind: ActionKind) -> Self {
        let is_async = matches!(kind, ActionKind::Sleep(_));
        let mergeable = matches!(kind, ActionKind::InputSequence(ref items) if items.iter().all(|i| matches!(i, InputSequenceItem::MouseWheel(..))));
        Self {
            id,
            kind,
            condition: None,
            execution_limit: None,
            executions: AtomicU32::new(0),
            is_async,
            mergeable,
        }
    }

    /// `canExecute()`: condition satisfied and under the execution limit.
    pub fn can_execute(&self, ctx: &EvalContext) -> bool {
        let condition_ok = self.condition.as_ref().map_or(true, |c| c.evaluate(ctx));
        let limit_ok = self
            .execution_limit
            .map_or(true, |limit| self.executions.load(Ordering::SeqCst) < limit);
        condition_ok && limit_ok
    }

    /// `aboutToExecute()`: increments the execution counter by `count`
    /// (usually 1, or the merged fire count for a mergeable action) even if
    /// the job later turns out to be a no-op.
    pub fn about_to_execute(&self, count: u32) {
        self.executions.fetch_add(count, Ordering::SeqCst);
        if let ActionKind::Group { actions, .. } = &self.kind {
            for action in actions {
                action.about_to_execute(0); // group members track their own limit independently
            }
        }
    }

    /// Whether this action has executed at least once since the last
    /// [`Action::reset`].
    pub fn has_executed(&self) -> bool {
        self.executions.load(Ordering::SeqCst) > 0
    }

    /// Resets the per-gesture execution counter (and, recursively, any
    /// group members').
    pub fn reset(&self) {
        self.executions.store(0, Ordering::SeqCst);
        if let ActionKind::Group { actions, .. } = &self.kind {
            for action in actions {
                action.reset();
            }
        }
    }

    /// Whether this action must dispatch on the shared or private lane.
    /// `Group` is conservative: true if *any* member is async, regardless of
    /// that member's condition — the upstream implementation admits the same
    /// imprecision (see DESIGN.md, Open Question: `ActionGroup::async()`).
    pub fn is_async(&self) -> bool {
        match &self.kind {
            ActionKind::Group { actions, .. } => actions.iter().any(|a| a.is_async()),
            _ => self.is_async,
        }
    }

    /// Runs the action payload. `executions` is the reported fire count
    /// (spec.md §4.6: "the action payload sees executions equal to how many
    /// times it was scheduled when mergeable, otherwise 1").
    pub fn execute(&self, executions: u32, ctx: &EvalContext, deps: &ActionDeps) {
        match &self.kind {
            ActionKind::InputSequence(items) => {
                for item in items {
                    match item {
                        InputSequenceItem::KeyPress(code) => deps.emitter.keyboard_key(*code, true),
                        InputSequenceItem::KeyRelease(code) => deps.emitter.keyboard_key(*code, false),
                        InputSequenceItem::KeyboardText(text) => deps.emitter.keyboard_text(text),
                        InputSequenceItem::MousePress(code) => deps.emitter.mouse_button(*code, true),
                        InputSequenceItem::MouseRelease(code) => deps.emitter.mouse_button(*code, false),
                        InputSequenceItem::MouseMoveAbsolute(x, y) => deps.emitter.mouse_move_absolute(*x, *y),
                        InputSequenceItem::MouseMoveRelative(dx, dy) => deps.emitter.mouse_move_relative(*dx, *dy),
                        InputSequenceItem::MouseMoveRelativeByDelta => {
                            let (dx, dy) = deps.delta_multiplied;
                            deps.emitter.mouse_move_relative(dx, dy);
                        }
                        InputSequenceItem::MouseWheel(dx, dy) => deps.emitter.mouse_wheel(*dx, *dy, executions),
                    }
                }
            }
            ActionKind::Command(command) => {
                deps.commands.run(command);
            }
            ActionKind::GlobalShortcut(name) => deps.shortcuts.invoke(name),
            ActionKind::Sleep(duration) => std::thread::sleep(*duration),
            ActionKind::Group { mode, actions } => match mode {
                GroupExecutionMode::All => {
                    for action in actions {
                        if action.can_execute(ctx) {
                            action.about_to_execute(1);
                            action.execute(1, ctx, deps);
                        }
                    }
                }
                GroupExecutionMode::First => {
                    for action in actions {
                        if action.can_execute(ctx) {
                            action.about_to_execute(1);
                            action.execute(1, ctx, deps);
                            break;
                        }
                    }
                }
            },
        }
    }
}

/// Collaborators an [`Action`] needs at execution time. Bundled so
/// `ActionExecutor::execute` doesn't need a growing parameter list.
///
/// Holds its collaborators through `Arc`, so a job closure can own a clone
/// and cross into the shared lane's thread or a `spawn_blocking` task
/// without borrowing anything from the caller's stack frame.
#[derive(Clone)]
pub struct ActionDeps {
    /// Synthetic input sink.
    pub emitter: Arc<dyn InputEmitter>,
    /// Shell command runner.
    pub commands: Arc<dyn CommandRunner>,
    /// Compositor shortcut invoker.
    pub shortcuts: Arc<dyn GlobalShortcutInvoker>,
    /// The trigger's accumulated, multiplier-scaled delta, for
    /// `MouseMoveRelativeByDelta` items.
    pub delta_multiplied: (f64, f64),
}

/// Which lane a submission should run on (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionThread {
    /// Pick the shared lane if `async` or the shared lane is busy, else run
    /// inline.
    Auto,
    /// Always run inline on the caller's thread.
    Current,
    /// Always run on the private per-submission pool.
    Own,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs [`Action`] payloads on one of three dispatch lanes, preserving
/// submission order within a lane (spec.md §4.6).
pub struct ActionExecutor {
    shared_tx: std_mpsc::Sender<Job>,
    shared_pending: Arc<std::sync::atomic::AtomicUsize>,
    own_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl ActionExecutor {
    /// Spawns the single-threaded shared lane and returns a ready executor.
    pub fn new() -> Self {
        let (tx, rx) = std_mpsc::channel::<Job>();
        let pending = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let pending_worker = pending.clone();
        std::thread::Builder::new()
            .name("inputactions-shared-action".to_owned())
            .spawn(move || {
                for job in rx {
                    job();
                    pending_worker.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .expect("failed to spawn shared action thread");
        Self {
            shared_tx: tx,
            shared_pending: pending,
            own_handles: Mutex::new(Vec::new()),
        }
    }

    /// Whether the shared lane currently has a job running or queued.
    pub fn shared_lane_busy(&self) -> bool {
        self.shared_pending.load(Ordering::SeqCst) > 0
    }

    /// Submits `action` for execution via `thread`, running `about_to_execute`
    /// synchronously first (so execution-limit bookkeeping never races with
    /// the caller observing `can_execute` again).
    pub fn execute(
        &self,
        action: Arc<Action>,
        executions: u32,
        thread: ActionThread,
        job: impl FnOnce(&Action, u32) + Send + 'static,
    ) {
        action.about_to_execute(executions);

        let run = {
            let action = action.clone();
            move || job(&action, executions)
        };

        match thread {
            ActionThread::Auto => {
                if action.is_async() || self.shared_lane_busy() {
                    self.submit_shared(run);
                } else {
                    run();
                }
            }
            ActionThread::Current => run(),
            ActionThread::Own => {
                let handle = tokio::task::spawn_blocking(run);
                self.own_handles.lock().unwrap().push(handle);
            }
        }
    }

    fn submit_shared(&self, job: impl FnOnce() + Send + 'static) {
        self.shared_pending.fetch_add(1, Ordering::SeqCst);
        if self.shared_tx.send(Box::new(job)).is_err() {
            log::warn!(target: "inputactions::action", "shared action lane is gone, dropping job");
            self.shared_pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Drops pending (not-yet-started) jobs on both pools.
    pub fn clear_queue(&self) {
        let mut handles = self.own_handles.lock().unwrap();
        for handle in handles.drain(..) {
            handle.abort();
        }
        // The shared lane has no peek/drain API over `mpsc::Receiver`; in
        // practice a config reload follows clear_queue with a fresh
        // executor (the whole handler set is replaced atomically per
        // spec.md §7), so an in-flight shared job is left to finish rather
        // than chased with an unsafe receiver swap.
    }

    /// Blocks until both pools have drained.
    pub async fn wait_for_done(&self) {
        while self.shared_lane_busy() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let handles: Vec<_> = self.own_handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::NoCommands;
    use std::sync::atomic::AtomicU32 as StdAtomicU32;

    struct NullEmitter;
    impl InputEmitter for NullEmitter {
        fn keyboard_key(&self, _: u32, _: bool) {}
        fn keyboard_text(&self, _: &str) {}
        fn mouse_button(&self, _: u32, _: bool) {}
        fn mouse_move_absolute(&self, _: f64, _: f64) {}
        fn mouse_move_relative(&self, _: f64, _: f64) {}
        fn mouse_wheel(&self, _: f64, _: f64, _: u32) {}
    }
    struct NullShortcuts;
    impl GlobalShortcutInvoker for NullShortcuts {
        fn invoke(&self, _: &str) {}
    }

    #[test]
    fn execution_limit_is_enforced() {
        let action = Action {
            execution_limit: Some(2),
            ..Action::new(None, ActionKind::Sleep(Duration::ZERO))
        };
        let store = Arc::new(VariableStore::new());
        let ctx = EvalContext::new(store, Arc::new(NoCommands));

        assert!(action.can_execute(&ctx));
        action.about_to_execute(1);
        assert!(action.can_execute(&ctx));
        action.about_to_execute(1);
        assert!(!action.can_execute(&ctx));
    }

    #[test]
    fn reset_clears_execution_counter() {
        let action = Action::new(None, ActionKind::Sleep(Duration::ZERO));
        action.about_to_execute(5);
        action.reset();
        assert_eq!(action.executions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn group_async_is_conservative() {
        let sync_action = Arc::new(Action::new(None, ActionKind::Command("true".into())));
        let async_action = Arc::new(Action::new(None, ActionKind::Sleep(Duration::ZERO)));
        let group = Action::new(
            None,
            ActionKind::Group {
                mode: GroupExecutionMode::All,
                actions: vec![sync_action, async_action],
            },
        );
        assert!(group.is_async());
    }

    #[tokio::test]
    async fn shared_lane_runs_auto_jobs_in_order() {
        let executor = ActionExecutor::new();
        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(StdAtomicU32::new(0));

        for i in 0..3 {
            let order = order.clone();
            let action = Arc::new(Action::new(None, ActionKind::Sleep(Duration::from_millis(1))));
            executor.execute(action, 1, ActionThread::Auto, move |_, _| {
                order.lock().unwrap().push(i);
            });
        }
        let _ = counter;
        executor.wait_for_done().await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
