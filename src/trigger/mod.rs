//! Declarative [`Trigger`]s and the [`TriggerAction`] update algorithm.
//!
//! Grounded on `original_source/src/libinputactions/actions/TriggerAction.{h,cpp}`;
//! the base `Trigger` class itself did not survive the source filter, so its
//! shape here follows spec.md §3/§4.5 directly, cross-checked against how
//! `MotionTriggerHandler.cpp` and `TouchscreenTriggerHandler.cpp` drive it.

use std::sync::Arc;
use std::time::Duration;

use crate::action::{Action, ActionDeps, ActionExecutor, ActionThread};
use crate::condition::{Condition, EvalContext};

/// A closed interval, used for `Trigger`/`TriggerAction` thresholds
/// (`original_source/src/libinputactions/Range.h`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    /// Inclusive lower bound.
    pub min: T,
    /// Inclusive upper bound.
    pub max: T,
}

impl Range<f64> {
    /// Builds a range, swapping bounds if given in the wrong order.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Inclusive containment check.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// What kind of gesture a [`Trigger`] recognizes (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TriggerType {
    Press,
    Click,
    Tap,
    Hover,
    Pinch,
    Rotate,
    Swipe,
    Wheel,
    Stroke,
    KeyboardShortcut,
    Circle,
}

/// Direction a directional trigger (swipe, pinch, rotate, circle) requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    In,
    Out,
    Clockwise,
    Counterclockwise,
}

/// A set of mouse buttons a `Click`/`Press` trigger matches against.
#[derive(Debug, Clone, Default)]
pub struct MouseButtons {
    /// Required button codes.
    pub buttons: Vec<u32>,
    /// Whether `buttons` must be pressed in the listed order.
    pub exact_order: bool,
}

/// The point of a trigger's lifecycle at which a [`TriggerAction`] runs
/// (`TriggerAction.h::On`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum On {
    Begin,
    Cancel,
    End,
    EndCancel,
    Tick,
    Update,
}

/// Direction filter applied to an [`ActionInterval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum IntervalDirection {
    #[default]
    Any,
    Positive,
    Negative,
}

/// Defines how often and in which direction an Update/Tick action repeats
/// (`TriggerAction.h::ActionInterval`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionInterval {
    /// `0` fires exactly once per event; direction still applies.
    pub value: f64,
    /// Which sign of delta is accepted.
    pub direction: IntervalDirection,
}

impl ActionInterval {
    /// Whether `delta`'s sign matches this interval's direction filter.
    pub fn matches(&self, delta: f64) -> bool {
        match self.direction {
            IntervalDirection::Any => true,
            IntervalDirection::Positive => delta > 0.0,
            IntervalDirection::Negative => delta < 0.0,
        }
    }
}

/// Scalar delta carrying both the raw ("unaccelerated") and
/// libinput-accelerated readings of one update event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Delta {
    /// Raw delta, as reported by the device.
    pub unaccelerated: f64,
    /// Delta after libinput pointer acceleration.
    pub accelerated: f64,
}

/// 2D counterpart of [`Delta`], already scaled by any trigger-level
/// multiplier (`swipe_delta_multiplier` etc.) — this is what
/// `InputSequenceItem::MouseMoveRelativeByDelta` consumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointDelta {
    /// Raw (x, y) delta.
    pub unaccelerated: (f64, f64),
    /// Accelerated (x, y) delta.
    pub accelerated: (f64, f64),
}

/// Binds an [`Action`] to a lifecycle hook of a [`Trigger`] (spec.md §3,
/// "TriggerAction"). Grounded on `TriggerAction.cpp`.
pub struct TriggerAction {
    action: Arc<Action>,
    on: On,
    interval: ActionInterval,
    accelerated: bool,
    threshold: Option<Range<f64>>,
    /// Whether this action's progress can cancel competing triggers
    /// (spec.md §4.2 conflict resolution).
    pub conflicting: bool,
    accumulated_delta: f64,
    absolute_accumulated_delta: f64,
}

impl TriggerAction {
    /// Builds a `TriggerAction` firing `action` on lifecycle point `on`.
    pub fn new(action: Arc<Action>, on: On) -> Self {
        Self {
            action,
            on,
            interval: ActionInterval::default(),
            accelerated: false,
            threshold: None,
            conflicting: true,
            accumulated_delta: 0.0,
            absolute_accumulated_delta: 0.0,
        }
    }

    /// The bound action.
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    /// Sets the repeat interval.
    #[must_use]
    pub fn with_interval(mut self, interval: ActionInterval) -> Self {
        self.interval = interval;
        self
    }

    /// Uses the accelerated delta for interval accumulation (thresholds
    /// always use the unaccelerated magnitude).
    #[must_use]
    pub fn with_accelerated(mut self, accelerated: bool) -> Self {
        self.accelerated = accelerated;
        self
    }

    /// Sets a threshold on accumulated absolute progress. Begin actions must
    /// not carry one (`TriggerAction.h`'s remark).
    #[must_use]
    pub fn with_threshold(mut self, threshold: Range<f64>) -> Self {
        assert!(self.on != On::Begin, "Begin actions can't have thresholds");
        self.threshold = Some(threshold);
        self
    }

    /// `triggerStarted()`: resets the action (in case a prior End/Cancel
    /// execution ran asynchronously and hasn't reset it yet) and fires a
    /// Begin action.
    pub fn trigger_started(&mut self, executor: &ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        self.action.reset();
        if self.on == On::Begin {
            self.try_execute(1, executor, ctx, deps);
        }
    }

    /// `triggerUpdated()`: runs the 5-step Update algorithm (spec.md §4.5)
    /// unless this action fires on `Tick` instead.
    pub fn trigger_updated(
        &mut self,
        delta: Delta,
        executor: &ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) {
        if self.on == On::Tick {
            return;
        }
        self.update(delta, executor, ctx, deps);
    }

    /// `triggerTick()`: same algorithm, driven by a timer rather than an
    /// input event, only for actions bound `On::Tick`.
    pub fn trigger_tick(
        &mut self,
        delta: Delta,
        executor: &ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) {
        if self.on == On::Tick {
            self.update(delta, executor, ctx, deps);
        }
    }

    /// `triggerEnded()`: fires End/EndCancel actions, then resets.
    pub fn trigger_ended(&mut self, executor: &ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        if self.on == On::End || self.on == On::EndCancel {
            self.try_execute(1, executor, ctx, deps);
        }
        self.reset();
    }

    /// `triggerCancelled()`: fires Cancel/EndCancel actions, then resets.
    pub fn trigger_cancelled(&mut self, executor: &ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        if self.on == On::Cancel || self.on == On::EndCancel {
            self.try_execute(1, executor, ctx, deps);
        }
        self.reset();
    }

    /// `tryExecute()`: threshold + `Action::can_execute` gate, then submits
    /// to the executor (spec.md §4.5 step 5).
    pub fn try_execute(&self, executions: u32, executor: &ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        if !self.can_execute(ctx) {
            return;
        }
        let action = self.action.clone();
        let job_deps = deps.clone();
        let job_ctx = ctx.fork();
        executor.execute(action, executions, ActionThread::Auto, move |action, executions| {
            action.execute(executions, &job_ctx, &job_deps);
        });
    }

    /// `canExecute()`: the action's own gate, plus this binding's threshold
    /// on accumulated absolute progress.
    pub fn can_execute(&self, ctx: &EvalContext) -> bool {
        self.action.can_execute(ctx)
            && self
                .threshold
                .is_none_or_range(self.absolute_accumulated_delta)
    }

    fn update(&mut self, delta: Delta, executor: &ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        let signed_delta = if self.accelerated { delta.accelerated } else { delta.unaccelerated };
        if delta.unaccelerated != 0.0 && self.accumulated_delta.is_sign_negative() != delta.unaccelerated.is_sign_negative() {
            // Direction changed.
            self.accumulated_delta = signed_delta;
        } else {
            self.accumulated_delta += signed_delta;
        }
        self.absolute_accumulated_delta += delta.unaccelerated.abs();

        if self.on != On::Update && self.on != On::Tick {
            return;
        }

        let interval = self.interval.value;
        if interval == 0.0 {
            if self.interval.matches(delta.unaccelerated) {
                self.try_execute(1, executor, ctx, deps);
            }
            return;
        }

        while self.interval.matches(self.accumulated_delta) && (self.accumulated_delta / interval).abs() >= 1.0 {
            self.try_execute(1, executor, ctx, deps);
            if self.accumulated_delta.is_sign_positive() != interval.is_sign_positive() {
                self.accumulated_delta += interval;
            } else {
                self.accumulated_delta -= interval;
            }
        }
    }

    fn reset(&mut self) {
        self.action.reset();
        self.accumulated_delta = 0.0;
        self.absolute_accumulated_delta = 0.0;
    }
}

trait RangeGate {
    fn is_none_or_range(&self, value: f64) -> bool;
}

impl RangeGate for Option<Range<f64>> {
    fn is_none_or_range(&self, value: f64) -> bool {
        match self {
            Some(range) => range.contains(value),
            None => true,
        }
    }
}

/// Lifecycle state of a [`Trigger`] (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TriggerState {
    Idle,
    Active,
    Ended,
    Cancelled,
}

/// A declarative gesture pattern, immutable after config load (spec.md §3).
pub struct Trigger {
    /// Configuration-assigned identifier.
    pub id: String,
    /// What gesture this trigger recognizes.
    pub kind: TriggerType,
    /// Required motion direction, if the gesture type is directional.
    pub direction: Option<Direction>,
    /// Required mouse button combination, for Press/Click triggers.
    pub mouse_buttons: Option<MouseButtons>,
    /// Closed interval on overall gesture progress gating activation.
    pub threshold: Option<Range<f64>>,
    /// Must hold for the trigger to become Active.
    pub activation_condition: Option<Condition>,
    /// If set and it stops holding, the trigger ends early.
    pub end_condition: Option<Condition>,
    /// How long after Ending the trigger may resume (double-tap-and-hold
    /// style gestures); `None` disables resuming.
    pub resume_timeout: Option<Duration>,
    /// Whether an Active trigger blocks the underlying input event.
    pub block_events: bool,
    /// Whether activation clears the tracked keyboard modifier mask.
    pub clear_modifiers: bool,
    /// Whether activation updates the `last_trigger_id` variable.
    pub set_last_trigger: bool,
    /// Bound actions.
    pub actions: Vec<TriggerAction>,
    state: TriggerState,
}

impl Trigger {
    /// Builds an Idle trigger with no bound actions.
    pub fn new(id: impl Into<String>, kind: TriggerType) -> Self {
        Self {
            id: id.into(),
            kind,
            direction: None,
            mouse_buttons: None,
            threshold: None,
            activation_condition: None,
            end_condition: None,
            resume_timeout: None,
            block_events: true,
            clear_modifiers: false,
            set_last_trigger: true,
            actions: Vec::new(),
            state: TriggerState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Whether this trigger is currently Active.
    pub fn is_active(&self) -> bool {
        self.state == TriggerState::Active
    }

    /// Transitions Idle → Active if `activation_condition` holds, firing
    /// every Begin action.
    pub fn activate(&mut self, executor: &ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) -> bool {
        if self.state == TriggerState::Active {
            return true;
        }
        if !self.activation_condition.as_ref().map_or(true, |c| c.evaluate(ctx)) {
            return false;
        }
        self.state = TriggerState::Active;
        for action in &mut self.actions {
            action.trigger_started(executor, ctx, deps);
        }
        true
    }

    /// Feeds an Update delta to every bound action (spec.md §4.5), ending
    /// the trigger first if `end_condition` has stopped holding.
    pub fn update(
        &mut self,
        delta: Delta,
        _point_delta_multiplied: PointDelta,
        executor: &ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) {
        if self.state != TriggerState::Active {
            return;
        }
        if let Some(end_condition) = &self.end_condition {
            if !end_condition.evaluate(ctx) {
                self.end(executor, ctx, deps);
                return;
            }
        }
        for action in &mut self.actions {
            action.trigger_updated(delta, executor, ctx, deps);
        }
    }

    /// Feeds a timer-driven Tick delta to every Tick-bound action.
    pub fn tick(&mut self, delta: Delta, executor: &ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        if self.state != TriggerState::Active {
            return;
        }
        for action in &mut self.actions {
            action.trigger_tick(delta, executor, ctx, deps);
        }
    }

    /// Drives the trigger to Ended, firing End/EndCancel actions, and
    /// returns it to Idle.
    pub fn end(&mut self, executor: &ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        if self.state != TriggerState::Active {
            return;
        }
        self.state = TriggerState::Ended;
        for action in &mut self.actions {
            action.trigger_ended(executor, ctx, deps);
        }
        self.state = TriggerState::Idle;
    }

    /// Drives the trigger to Cancelled, firing Cancel/EndCancel actions, and
    /// returns it to Idle.
    pub fn cancel(&mut self, executor: &ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        if self.state != TriggerState::Active {
            return;
        }
        self.state = TriggerState::Cancelled;
        for action in &mut self.actions {
            action.trigger_cancelled(executor, ctx, deps);
        }
        self.state = TriggerState::Idle;
    }

    /// Whether any bound, conflict-participating action has made observable
    /// progress (executed at least once), used by conflict resolution
    /// (spec.md §4.2: "those that have made observable progress cancel
    /// those that have not").
    pub fn has_progressed(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.conflicting && a.action().has_executed())
    }
}
