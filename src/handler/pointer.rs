//! Wheel (scroll) and Hover triggers driven directly by pointer events,
//! last in the handler chain (spec.md §4.2).
//!
//! Reconstructed from spec.md directly; the original `PointerTriggerHandler`
//! source did not survive the filtered pack.

use crate::action::ActionDeps;
use crate::condition::EvalContext;
use crate::trigger::{Delta, PointDelta, TriggerType};

use super::{InputEvent, TriggerHandler, TriggerTypeMask};

/// Handles `Wheel` (scroll) triggers. `Hover` is activated/deactivated by
/// the owning touchpad/touchscreen handler directly, since it depends on
/// touch presence rather than a pointer event of its own.
pub struct PointerTriggerHandler {
    pub triggers: super::TriggerSet,
}

impl Default for PointerTriggerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerTriggerHandler {
    /// Builds an empty handler.
    pub fn new() -> Self {
        Self { triggers: super::TriggerSet::default() }
    }

    fn handle_wheel(
        &mut self,
        delta: f64,
        horizontal: bool,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        let result = self
            .triggers
            .activate_triggers(TriggerTypeMask::of(TriggerType::Wheel), executor, ctx, deps);
        let point_delta = if horizontal { (delta, 0.0) } else { (0.0, delta) };
        let update = self.triggers.update_triggers(
            TriggerTypeMask::of(TriggerType::Wheel),
            Delta { unaccelerated: delta, accelerated: delta },
            PointDelta { unaccelerated: point_delta, accelerated: point_delta },
            executor,
            ctx,
            deps,
        );
        self.triggers
            .end_triggers(TriggerTypeMask::of(TriggerType::Wheel), executor, ctx, deps);
        result.block || update.block
    }
}

impl TriggerHandler for PointerTriggerHandler {
    fn handle_event(
        &mut self,
        event: &InputEvent,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        match event {
            InputEvent::Wheel { delta, horizontal } => self.handle_wheel(*delta, *horizontal, executor, ctx, deps),
            _ => false,
        }
    }

    fn reset(&mut self, executor: &crate::action::ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        self.triggers.reset(executor, ctx, deps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_event_with_no_triggers_does_not_block() {
        let mut handler = PointerTriggerHandler::new();
        let executor = crate::action::ActionExecutor::new();
        let variables = std::sync::Arc::new(crate::variable::VariableStore::new());
        let ctx = EvalContext::new(variables, std::sync::Arc::new(crate::condition::NoCommands));
        let deps = super::super::tests::test_deps();

        let blocked = handler.handle_wheel(1.0, false, &executor, &ctx, &deps);
        assert!(!blocked);
    }
}
