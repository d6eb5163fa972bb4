//! Keyboard shortcut triggers and modifier-mask tracking (spec.md §3, §4.2).
//!
//! The original `KeyboardTriggerHandler` source did not survive the
//! filtered pack; this is reconstructed directly from spec.md's "Press"/
//! "KeyboardShortcut" trigger semantics and the `keyboard_modifiers`
//! variable contract (spec §4.7).

use crate::action::ActionDeps;
use crate::condition::EvalContext;
use crate::trigger::{Delta, PointDelta, TriggerType};
use crate::variable::{ModifierFlags, TypedValue, VariableStore};

use super::{InputEvent, TriggerHandler, TriggerTypeMask};

fn modifier_for(code: u32) -> Option<ModifierFlags> {
    let key = evdev::Key::new(code as u16);
    match key {
        evdev::Key::KEY_LEFTSHIFT | evdev::Key::KEY_RIGHTSHIFT => Some(ModifierFlags::SHIFT),
        evdev::Key::KEY_LEFTCTRL | evdev::Key::KEY_RIGHTCTRL => Some(ModifierFlags::CTRL),
        evdev::Key::KEY_LEFTALT | evdev::Key::KEY_RIGHTALT => Some(ModifierFlags::ALT),
        evdev::Key::KEY_LEFTMETA | evdev::Key::KEY_RIGHTMETA => Some(ModifierFlags::META),
        _ => None,
    }
}

/// Handles `KeyboardShortcut` triggers: a chord of pressed key codes plus
/// the required modifier mask. Also maintains the `keyboard_modifiers`
/// variable every handler's conditions can read.
pub struct KeyboardTriggerHandler {
    pub triggers: super::TriggerSet,
    variables: std::sync::Arc<VariableStore>,
    pressed: Vec<u32>,
    modifiers: ModifierFlags,
}

impl KeyboardTriggerHandler {
    /// Builds a handler that writes modifier state into `variables`.
    pub fn new(variables: std::sync::Arc<VariableStore>) -> Self {
        Self {
            triggers: super::TriggerSet::default(),
            variables,
            pressed: Vec::new(),
            modifiers: ModifierFlags::default(),
        }
    }

    fn handle_key(
        &mut self,
        code: u32,
        pressed: bool,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        if let Some(modifier) = modifier_for(code) {
            self.modifiers = if pressed {
                self.modifiers.with(modifier)
            } else {
                ModifierFlags(self.modifiers.0 & !modifier.0)
            };
            self.variables
                .set("keyboard_modifiers", Some(TypedValue::Modifiers(self.modifiers)));
        }

        if pressed {
            if !self.pressed.contains(&code) {
                self.pressed.push(code);
            }
        } else {
            self.pressed.retain(|c| *c != code);
        }

        let result = self.triggers.activate_triggers(
            TriggerTypeMask::of(TriggerType::KeyboardShortcut),
            executor,
            ctx,
            deps,
        );
        if result.success {
            self.triggers.update_triggers(
                TriggerTypeMask::of(TriggerType::KeyboardShortcut),
                Delta::default(),
                PointDelta::default(),
                executor,
                ctx,
                deps,
            );
            if !pressed {
                self.triggers
                    .end_triggers(TriggerTypeMask::of(TriggerType::KeyboardShortcut), executor, ctx, deps);
            }
        }
        result.block
    }

    /// Currently pressed modifier mask, e.g. for the emergency-release
    /// chord check in the device supervisor.
    pub fn modifiers(&self) -> ModifierFlags {
        self.modifiers
    }

    /// Clears the tracked modifier mask (used when a trigger's
    /// `clear_modifiers` flag fires, spec.md §3).
    pub fn clear_modifiers(&mut self) {
        self.modifiers = ModifierFlags::default();
        self.variables
            .set("keyboard_modifiers", Some(TypedValue::Modifiers(self.modifiers)));
    }
}

impl TriggerHandler for KeyboardTriggerHandler {
    fn handle_event(
        &mut self,
        event: &InputEvent,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        match event {
            InputEvent::Key { code, pressed } => self.handle_key(*code, *pressed, executor, ctx, deps),
            _ => false,
        }
    }

    fn reset(&mut self, executor: &crate::action::ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        self.triggers.reset(executor, ctx, deps);
        self.pressed.clear();
        self.clear_modifiers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressing_shift_sets_modifier_flag() {
        let variables = std::sync::Arc::new(VariableStore::new());
        let mut handler = KeyboardTriggerHandler::new(variables.clone());
        let executor = crate::action::ActionExecutor::new();
        let ctx = EvalContext::new(variables, std::sync::Arc::new(crate::condition::NoCommands));
        let deps = super::super::tests::test_deps();

        let code = evdev::Key::KEY_LEFTSHIFT.0 as u32;
        handler.handle_key(code, true, &executor, &ctx, &deps);
        assert!(handler.modifiers().contains_mask(ModifierFlags::SHIFT));

        handler.handle_key(code, false, &executor, &ctx, &deps);
        assert!(!handler.modifiers().contains_mask(ModifierFlags::SHIFT));
    }
}
