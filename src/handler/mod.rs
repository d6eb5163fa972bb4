//! Trigger handlers: the chain that turns backend-dispatched input events
//! into activated/updated/ended [`crate::trigger::Trigger`]s.
//!
//! The base `TriggerHandler`/`InputTriggerHandler` class hierarchy did not
//! survive the source filter, so its shape here is reconstructed from
//! spec.md §4.2 and cross-checked against how `MotionTriggerHandler.cpp`,
//! `MultiTouchMotionTriggerHandler.cpp` drive it. Rust has no virtual base
//! class to inherit trigger bookkeeping from, so that bookkeeping lives in
//! [`TriggerSet`], a plain struct every handler embeds by composition.

pub mod keyboard;
pub mod motion;
pub mod mouse;
pub mod multitouch;
pub mod pointer;
pub mod touchscreen;

use std::time::Instant;

use crate::action::ActionDeps;
use crate::condition::EvalContext;
use crate::trigger::{Delta, Direction, PointDelta, Trigger, TriggerType};

/// A bitmask over [`TriggerType`] (spec.md §4.2's `type_mask` parameters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerTypeMask(u32);

impl TriggerTypeMask {
    /// Mask containing a single type.
    pub fn of(kind: TriggerType) -> Self {
        Self(1 << Self::bit(kind))
    }

    /// Mask containing every given type.
    pub fn any_of(kinds: &[TriggerType]) -> Self {
        kinds.iter().fold(Self::default(), |acc, k| acc.with(Self::of(*k)))
    }

    /// Union of two masks.
    #[must_use]
    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether `kind` is set in this mask.
    pub fn contains(&self, kind: TriggerType) -> bool {
        self.0 & (1 << Self::bit(kind)) != 0
    }

    fn bit(kind: TriggerType) -> u32 {
        match kind {
            TriggerType::Press => 0,
            TriggerType::Click => 1,
            TriggerType::Tap => 2,
            TriggerType::Hover => 3,
            TriggerType::Pinch => 4,
            TriggerType::Rotate => 5,
            TriggerType::Swipe => 6,
            TriggerType::Wheel => 7,
            TriggerType::Stroke => 8,
            TriggerType::KeyboardShortcut => 9,
            TriggerType::Circle => 10,
        }
    }
}

/// Outcome of [`TriggerSet::activate_triggers`]/[`TriggerSet::update_triggers`]
/// (spec.md §4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerResult {
    /// At least one trigger changed state / accepted the event.
    pub success: bool,
    /// At least one Active trigger requests the underlying event be blocked.
    pub block: bool,
}

/// Trigger bookkeeping shared by every concrete handler: a fixed pool of
/// declarative [`Trigger`]s plus the activate/update/end/cancel/reset
/// contract handlers expose (spec.md §4.2).
#[derive(Default)]
pub struct TriggerSet {
    triggers: Vec<Trigger>,
}

impl TriggerSet {
    /// Builds a set over the given triggers.
    pub fn new(triggers: Vec<Trigger>) -> Self {
        Self { triggers }
    }

    /// Appends a trigger to the set (used when building handlers from
    /// config, spec.md §6).
    pub fn push(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    /// Scans triggers of `mask` whose `activation_condition` holds and
    /// activates them.
    pub fn activate_triggers(
        &mut self,
        mask: TriggerTypeMask,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> TriggerResult {
        self.activate_triggers_directional(mask, None, executor, ctx, deps)
    }

    /// Like [`Self::activate_triggers`], but skips triggers whose configured
    /// `direction` doesn't match the caller's observed motion direction.
    pub fn activate_triggers_directional(
        &mut self,
        mask: TriggerTypeMask,
        direction: Option<Direction>,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> TriggerResult {
        let mut result = TriggerResult::default();
        for trigger in &mut self.triggers {
            if !mask.contains(trigger.kind) || trigger.is_active() || !direction_matches(trigger.direction, direction) {
                continue;
            }
            if trigger.activate(executor, ctx, deps) {
                result.success = true;
                result.block |= trigger.block_events;
            }
        }
        result
    }

    /// Feeds `delta` to every Active trigger matching `mask`.
    pub fn update_triggers(
        &mut self,
        mask: TriggerTypeMask,
        delta: Delta,
        point_delta: PointDelta,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> TriggerResult {
        self.update_triggers_directional(mask, None, delta, point_delta, executor, ctx, deps)
    }

    /// Like [`Self::update_triggers`], but additionally skips triggers whose
    /// configured `direction` doesn't match the motion direction the caller
    /// observed this update (spec.md §3: a trigger's `direction`, when set,
    /// restricts which observed motion direction feeds it). `direction =
    /// None` (the caller couldn't classify a direction, e.g. still below the
    /// motion threshold) matches every trigger regardless of its own
    /// configured direction.
    pub fn update_triggers_directional(
        &mut self,
        mask: TriggerTypeMask,
        direction: Option<Direction>,
        delta: Delta,
        point_delta: PointDelta,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> TriggerResult {
        let mut result = TriggerResult::default();
        for trigger in &mut self.triggers {
            if !mask.contains(trigger.kind) || !trigger.is_active() || !direction_matches(trigger.direction, direction) {
                continue;
            }
            trigger.update(delta, point_delta, executor, ctx, deps);
            result.success = true;
            result.block |= trigger.block_events;
        }
        self.resolve_conflicts(mask, executor, ctx, deps);
        result
    }

    /// Ends every Active trigger matching `mask`.
    pub fn end_triggers(
        &mut self,
        mask: TriggerTypeMask,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) {
        for trigger in &mut self.triggers {
            if mask.contains(trigger.kind) && trigger.is_active() {
                trigger.end(executor, ctx, deps);
            }
        }
    }

    /// Cancels every Active trigger matching `mask`.
    pub fn cancel_triggers(
        &mut self,
        mask: TriggerTypeMask,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) {
        for trigger in &mut self.triggers {
            if mask.contains(trigger.kind) && trigger.is_active() {
                trigger.cancel(executor, ctx, deps);
            }
        }
    }

    /// Whether any trigger matching `mask` is Active.
    pub fn has_active_triggers(&self, mask: TriggerTypeMask) -> bool {
        self.triggers
            .iter()
            .any(|t| mask.contains(t.kind) && t.is_active())
    }

    /// Active triggers matching `mask`.
    pub fn active_triggers(&self, mask: TriggerTypeMask) -> Vec<&Trigger> {
        self.triggers
            .iter()
            .filter(|t| mask.contains(t.kind) && t.is_active())
            .collect()
    }

    /// Cancels every trigger, clearing all state.
    pub fn reset(&mut self, executor: &crate::action::ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        self.cancel_triggers(TriggerTypeMask::any_of(ALL_TRIGGER_TYPES), executor, ctx, deps);
    }

    /// Conflict resolution (spec.md §4.2): among compatible Active triggers,
    /// any that has made progress cancels any that has not.
    fn resolve_conflicts(
        &mut self,
        mask: TriggerTypeMask,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) {
        let any_progressed = self
            .triggers
            .iter()
            .any(|t| mask.contains(t.kind) && t.is_active() && t.has_progressed());
        if !any_progressed {
            return;
        }
        for trigger in &mut self.triggers {
            if mask.contains(trigger.kind) && trigger.is_active() && !trigger.has_progressed() {
                trigger.cancel(executor, ctx, deps);
            }
        }
    }
}

/// A trigger with no configured direction matches any observed direction; a
/// trigger with one only matches an observed direction equal to it. A
/// caller that couldn't classify a direction yet (`observed = None`) matches
/// every trigger regardless of its configured direction.
fn direction_matches(required: Option<Direction>, observed: Option<Direction>) -> bool {
    match (required, observed) {
        (Some(required), Some(observed)) => required == observed,
        _ => true,
    }
}

const ALL_TRIGGER_TYPES: &[TriggerType] = &[
    TriggerType::Press,
    TriggerType::Click,
    TriggerType::Tap,
    TriggerType::Hover,
    TriggerType::Pinch,
    TriggerType::Rotate,
    TriggerType::Swipe,
    TriggerType::Wheel,
    TriggerType::Stroke,
    TriggerType::KeyboardShortcut,
    TriggerType::Circle,
];

/// A speed class gesture triggers can be filtered by (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TriggerSpeed {
    Slow,
    Fast,
}

/// Input events dispatched down the handler chain (spec.md §4.2). This is a
/// deliberately small tagged union — handler-specific logic lives as
/// methods on the handler struct, not as virtual dispatch on the event
/// (spec.md §9 "deep inheritance" redesign note).
#[derive(Debug, Clone)]
pub enum InputEvent {
    /// A key was pressed or released. `pressed = false` is a release.
    Key { code: u32, pressed: bool },
    /// A mouse button was pressed or released.
    Button { code: u32, pressed: bool },
    /// Relative pointer motion.
    Motion { delta: PointDelta },
    /// Scroll wheel motion.
    Wheel { delta: f64, horizontal: bool },
    /// libinput pinch/rotate gesture update.
    Pinch { scale: f64, angle_delta: f64 },
    /// A touch point went down. `id` is the kernel slot/tracking id.
    TouchDown { id: i32, position: (f64, f64), timestamp: Instant },
    /// A touch point moved. `device_size_mm` is the owning device's physical
    /// size, needed to turn `position` into a normalized coordinate.
    TouchChanged {
        id: i32,
        position: (f64, f64),
        initial_position: (f64, f64),
        device_size_mm: (f64, f64),
    },
    /// A touch point was lifted.
    TouchUp { id: i32, down_timestamp: Instant },
    /// All touch points cancelled at once (palm rejection, device reset).
    TouchCancel,
}

/// Implemented by every concrete handler in the chain (spec.md §4.2).
pub trait TriggerHandler {
    /// Processes one event, returning whether it should be blocked from
    /// propagating further down the chain / to the output device.
    fn handle_event(
        &mut self,
        event: &InputEvent,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool;

    /// Cancels all active state, as if the device had gone neutral.
    fn reset(&mut self, executor: &crate::action::ActionExecutor, ctx: &EvalContext, deps: &ActionDeps);
}

/// The fixed-order chain the device supervisor drives per frame (spec.md
/// §4.1 step 3, §4.2): stroke recorder, keyboard, mouse, per-touchpad,
/// per-touchscreen, pointer. The first handler to return `true` (block)
/// short-circuits the rest.
#[derive(Default)]
pub struct Chain {
    handlers: Vec<Box<dyn TriggerHandler + Send>>,
}

impl Chain {
    /// Builds an empty chain; handlers are appended in dispatch order.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Appends a handler to the end of the chain.
    pub fn push(&mut self, handler: Box<dyn TriggerHandler + Send>) {
        self.handlers.push(handler);
    }

    /// Dispatches `event` through every handler in order, short-circuiting
    /// on the first block.
    pub fn handle_event(
        &mut self,
        event: &InputEvent,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        for handler in &mut self.handlers {
            if handler.handle_event(event, executor, ctx, deps) {
                return true;
            }
        }
        false
    }

    /// Resets every handler in the chain (e.g. on emergency release).
    pub fn reset(&mut self, executor: &crate::action::ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        for handler in &mut self.handlers {
            handler.reset(executor, ctx, deps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_contains_only_listed_types() {
        let mask = TriggerTypeMask::any_of(&[TriggerType::Swipe, TriggerType::Pinch]);
        assert!(mask.contains(TriggerType::Swipe));
        assert!(mask.contains(TriggerType::Pinch));
        assert!(!mask.contains(TriggerType::Rotate));
    }

    #[test]
    fn chain_short_circuits_on_first_block() {
        struct AlwaysBlock;
        impl TriggerHandler for AlwaysBlock {
            fn handle_event(
                &mut self,
                _event: &InputEvent,
                _executor: &crate::action::ActionExecutor,
                _ctx: &EvalContext,
                _deps: &ActionDeps,
            ) -> bool {
                true
            }
            fn reset(&mut self, _executor: &crate::action::ActionExecutor, _ctx: &EvalContext, _deps: &ActionDeps) {}
        }
        struct PanicsIfCalled;
        impl TriggerHandler for PanicsIfCalled {
            fn handle_event(
                &mut self,
                _event: &InputEvent,
                _executor: &crate::action::ActionExecutor,
                _ctx: &EvalContext,
                _deps: &ActionDeps,
            ) -> bool {
                panic!("should not be reached");
            }
            fn reset(&mut self, _executor: &crate::action::ActionExecutor, _ctx: &EvalContext, _deps: &ActionDeps) {}
        }

        use crate::action::ActionExecutor;
        use crate::variable::VariableStore;
        use std::sync::Arc;

        let mut chain = Chain::new();
        chain.push(Box::new(AlwaysBlock));
        chain.push(Box::new(PanicsIfCalled));

        let executor = ActionExecutor::new();
        let ctx = EvalContext::new(Arc::new(VariableStore::new()), Arc::new(crate::condition::NoCommands));
        let deps = test_deps();

        let blocked = chain.handle_event(&InputEvent::TouchCancel, &executor, &ctx, &deps);
        assert!(blocked);
    }

    pub(crate) fn test_deps() -> ActionDeps {
        use crate::action::{GlobalShortcutInvoker, InputEmitter};
        use std::sync::Arc;

        struct NullEmitter;
        impl InputEmitter for NullEmitter {
            fn keyboard_key(&self, _code: u32, _pressed: bool) {}
            fn keyboard_text(&self, _text: &str) {}
            fn mouse_button(&self, _code: u32, _pressed: bool) {}
            fn mouse_move_absolute(&self, _x: f64, _y: f64) {}
            fn mouse_move_relative(&self, _dx: f64, _dy: f64) {}
            fn mouse_wheel(&self, _dx: f64, _dy: f64, _executions: u32) {}
        }
        struct NullShortcuts;
        impl GlobalShortcutInvoker for NullShortcuts {
            fn invoke(&self, _name: &str) {}
        }
        struct NullCommands;
        impl crate::condition::CommandRunner for NullCommands {
            fn run(&self, _command: &str) -> Option<String> {
                None
            }
        }

        ActionDeps {
            emitter: Arc::new(NullEmitter),
            commands: Arc::new(NullCommands),
            shortcuts: Arc::new(NullShortcuts),
            delta_multiplied: (1.0, 1.0),
        }
    }
}
