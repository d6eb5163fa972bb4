//! Bundles the collaborators one user session needs: variable store,
//! action executor, device supervisor, and handler chain (spec.md §5).
//!
//! The original program wires its equivalent pieces through global
//! singletons (`original_source`'s backends/handlers reach a shared
//! `InputBackend`/`ActionExecutor` directly); spec.md §9's redesign note
//! calls for an explicit struct instead, so `Runtime` is this crate's own
//! composition root, built the way
//! `examples/aecsocket-fukomaster/src/main.rs` wires its channel/device/sink
//! triple together in `main`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::action::{Action, ActionDeps, ActionExecutor, ActionKind};
use crate::condition::{ComparisonOp, Condition, EvalContext, GroupMode, Value as ConditionValue};
use crate::config;
use crate::device::{DeviceProperties, DeviceSupervisor, DeviceType};
use crate::handler::{self, Chain};
use crate::trigger::{Direction, On, Range, Trigger, TriggerAction, TriggerType};
use crate::variable::{TypedValue, VariableStore};

/// One running user session: owns every mutable collaborator the event
/// loop touches. `main.rs` constructs exactly one of these and drives it
/// from the evdev event loop.
pub struct Runtime {
    /// Shared typed-value store read by every `Condition`.
    pub variables: Arc<VariableStore>,
    /// Dispatches `Action` payloads onto the shared/own/current lanes.
    pub executor: ActionExecutor,
    /// Tracks and mirrors kernel input devices.
    pub supervisor: DeviceSupervisor,
    /// The fixed-order trigger handler chain.
    pub chain: Chain,
    /// Emitter/shortcuts/commands the action layer calls into.
    pub deps: ActionDeps,
    /// The currently loaded configuration, kept so a failed reload can fall
    /// back to it (spec.md §7: "either the whole new handler set replaces
    /// the old one, or the old one stays").
    pub config: config::Model,
}

impl Runtime {
    /// Builds a runtime around an already-loaded configuration and the
    /// concrete emitter/shortcut/command implementations the platform glue
    /// provides.
    pub fn new(config: config::Model, deps: ActionDeps) -> Self {
        let variables = Arc::new(VariableStore::new());
        let mut supervisor = DeviceSupervisor::new();
        supervisor.set_rules(device_rules_from_config(&config));

        let chain = build_chain(&config, variables.clone());

        Self {
            variables,
            executor: ActionExecutor::new(),
            supervisor,
            chain,
            deps,
            config,
        }
    }

    /// Scans `dev_input_dir` for already-present devices (spec.md §4.1).
    pub fn initialize(&mut self, dev_input_dir: &Path) -> Result<()> {
        self.supervisor
            .initialize(dev_input_dir)
            .context("failed to enumerate input devices")
    }

    /// An `EvalContext` bound to this runtime's variable store, for
    /// handlers/conditions evaluated outside the main event loop (e.g. from
    /// an IPC handler).
    pub fn eval_context(&self, commands: Arc<dyn crate::condition::CommandRunner>) -> EvalContext {
        EvalContext::new(self.variables.clone(), commands)
    }

    /// Replaces the running configuration (spec.md §7: atomic swap, old
    /// config preserved on failure). `loader` is expected to have already
    /// validated the new model; this only performs the swap and the
    /// associated handler-chain rebuild plus executor drain.
    pub async fn reload(&mut self, new_config: config::Model) {
        let errors = new_config.validate();
        if !errors.is_empty() {
            warn!(target: "inputactions::runtime", "rejecting reload with {} validation error(s)", errors.len());
            return;
        }

        self.executor.clear_queue();
        self.executor.wait_for_done().await;
        let ctx = self.eval_context(Arc::new(crate::condition::NoCommands));
        self.chain.reset(&self.executor, &ctx, &self.deps);

        self.supervisor.set_rules(device_rules_from_config(&new_config));
        self.chain = build_chain(&new_config, self.variables.clone());
        self.config = new_config;
        info!(target: "inputactions::runtime", "configuration reloaded");
    }

    /// Suspends the pipeline, resetting every handler and returning devices
    /// to neutral (spec.md §4.1's `reset()`, driven by the emergency
    /// release chord or an IPC `Suspend` message).
    pub fn suspend(&mut self) {
        let ctx = self.eval_context(Arc::new(crate::condition::NoCommands));
        self.chain.reset(&self.executor, &ctx, &self.deps);
        self.supervisor.reset();
    }
}

fn device_rules_from_config(config: &config::Model) -> Vec<(Option<DeviceType>, DeviceProperties)> {
    config
        .device_rules
        .iter()
        .map(|rule| {
            let device_type = rule.condition.as_ref().and_then(device_type_from_condition);

            let node = &rule.properties;
            let mut properties = DeviceProperties::default();
            if let Some(v) = node.grab {
                properties = properties.with_grab(v);
            }
            if let Some(v) = node.ignore {
                properties = properties.with_ignore(v);
            }
            if let Some(v) = node.handle_libevdev_events {
                properties = properties.with_handle_libevdev_events(v);
            }
            if let Some(v) = node.multi_touch {
                properties = properties.with_multi_touch(v);
            }
            if let Some(v) = node.button_pad {
                properties = properties.with_button_pad(v);
            }
            if let Some(v) = node.finger_pressure {
                properties = properties.with_finger_pressure(v);
            }
            if let Some(v) = node.thumb_pressure {
                properties = properties.with_thumb_pressure(v);
            }
            if let Some(v) = node.palm_pressure {
                properties = properties.with_palm_pressure(v);
            }
            if let Some(v) = node.lmr_tap_button_map {
                properties = properties.with_lmr_tap_button_map(v);
            }
            if let Some(v) = node.motion_threshold_mm {
                properties = properties.with_motion_threshold_mm(v);
            }

            (device_type, properties)
        })
        .collect()
}

/// Recognizes a `device_type` equality `Compare` node and maps its literal
/// to a concrete [`DeviceType`]; anything else (a `Group`, a comparison
/// against another variable, a `{ command: ... }` value) matches every
/// device, same as an absent condition. See DESIGN.md's Open Question entry
/// on `device_rules` condition matching for why this rule is narrow rather
/// than a general condition-to-device-type solver.
fn device_type_from_condition(condition: &config::ConditionNode) -> Option<DeviceType> {
    match condition {
        config::ConditionNode::Compare { variable, value, negate: false, .. } if variable == "device_type" => {
            match value {
                config::ValueSource::Literal(text) => parse_device_type(text),
                config::ValueSource::Command { .. } => None,
            }
        }
        _ => None,
    }
}

fn parse_device_type(text: &str) -> Option<DeviceType> {
    match text.to_ascii_lowercase().as_str() {
        "keyboard" => Some(DeviceType::Keyboard),
        "mouse" => Some(DeviceType::Mouse),
        "touchpad" => Some(DeviceType::Touchpad),
        "touchscreen" => Some(DeviceType::Touchscreen),
        _ => None,
    }
}

/// Builds the fixed-order handler chain (spec.md §4.2) and wires each
/// handler's [`crate::handler::TriggerSet`] with the `Trigger`s its config
/// section declares.
fn build_chain(config: &config::Model, variables: Arc<VariableStore>) -> Chain {
    let mut keyboard = handler::keyboard::KeyboardTriggerHandler::new(variables);
    for node in &config.keyboard.gestures {
        keyboard.triggers.push(trigger_from_config(node));
    }

    let mut mouse = handler::mouse::MouseTriggerHandler::new();
    for node in &config.mouse.gestures {
        mouse.triggers.push(trigger_from_config(node));
    }

    let mut touchpad = handler::multitouch::MultiTouchMotionTriggerHandler::new();
    for node in &config.touchpad.gestures {
        touchpad.motion.triggers.push(trigger_from_config(node));
    }

    let mut touchscreen = handler::touchscreen::TouchscreenTriggerHandler::new();
    for node in &config.touchscreen.gestures {
        touchscreen.multitouch.motion.triggers.push(trigger_from_config(node));
    }

    let mut pointer = handler::pointer::PointerTriggerHandler::new();
    for node in &config.pointer.gestures {
        pointer.triggers.push(trigger_from_config(node));
    }

    let mut chain = Chain::new();
    chain.push(Box::new(keyboard));
    chain.push(Box::new(mouse));
    chain.push(Box::new(touchpad));
    chain.push(Box::new(touchscreen));
    chain.push(Box::new(pointer));
    chain
}

fn trigger_from_config(node: &config::TriggerNode) -> Trigger {
    let kind = trigger_type_from_str(&node.kind).unwrap_or_else(|| {
        warn!(target: "inputactions::runtime", "unknown trigger type `{}` for `{}`, defaulting to Press", node.kind, node.id);
        TriggerType::Press
    });

    let mut trigger = Trigger::new(node.id.clone(), kind);
    trigger.direction = node.direction.as_deref().and_then(direction_from_str);
    trigger.threshold = node.threshold.map(|(a, b)| Range::new(a, b));
    trigger.activation_condition = node.activation_condition.as_ref().map(condition_from_config);
    trigger.end_condition = node.end_condition.as_ref().map(condition_from_config);
    trigger.block_events = node.block_events;
    trigger.clear_modifiers = node.clear_modifiers;
    trigger.set_last_trigger = node.set_last_trigger;
    trigger.actions = node.actions.iter().filter_map(trigger_action_from_config).collect();
    trigger
}

fn trigger_type_from_str(text: &str) -> Option<TriggerType> {
    match text {
        "press" => Some(TriggerType::Press),
        "click" => Some(TriggerType::Click),
        "tap" => Some(TriggerType::Tap),
        "hover" => Some(TriggerType::Hover),
        "pinch" => Some(TriggerType::Pinch),
        "rotate" => Some(TriggerType::Rotate),
        "swipe" => Some(TriggerType::Swipe),
        "wheel" => Some(TriggerType::Wheel),
        "stroke" => Some(TriggerType::Stroke),
        "keyboard_shortcut" => Some(TriggerType::KeyboardShortcut),
        "circle" => Some(TriggerType::Circle),
        _ => None,
    }
}

fn direction_from_str(text: &str) -> Option<Direction> {
    match text.to_ascii_lowercase().as_str() {
        "left" => Some(Direction::Left),
        "right" => Some(Direction::Right),
        "up" => Some(Direction::Up),
        "down" => Some(Direction::Down),
        "in" => Some(Direction::In),
        "out" => Some(Direction::Out),
        "clockwise" => Some(Direction::Clockwise),
        "counterclockwise" => Some(Direction::Counterclockwise),
        _ => None,
    }
}

/// Translates a [`config::ConditionNode`] into a [`Condition`] tree.
/// `Compare` carries a single value, so `Between`/`OneOf` (which need two or
/// more operands) only ever see one — documented in DESIGN.md alongside the
/// rest of this config model's simplifications.
fn condition_from_config(node: &config::ConditionNode) -> Condition {
    match node {
        config::ConditionNode::Compare { variable, op, negate, value } => {
            let op = op
                .as_deref()
                .and_then(comparison_op_from_str)
                .unwrap_or(ComparisonOp::Equal);
            let condition = Condition::variable(variable.clone(), op, vec![value_from_config(value)]);
            if *negate {
                condition.negated()
            } else {
                condition
            }
        }
        config::ConditionNode::Group { mode, negate, conditions } => {
            let mode = group_mode_from_str(mode).unwrap_or(GroupMode::All);
            let members = conditions.iter().map(condition_from_config).collect();
            let condition = Condition::group(mode, members);
            if *negate {
                condition.negated()
            } else {
                condition
            }
        }
    }
}

fn comparison_op_from_str(text: &str) -> Option<ComparisonOp> {
    match text {
        "equal" => Some(ComparisonOp::Equal),
        "not_equal" => Some(ComparisonOp::NotEqual),
        "less_than" => Some(ComparisonOp::LessThan),
        "less_or_equal" => Some(ComparisonOp::LessOrEqual),
        "greater_than" => Some(ComparisonOp::GreaterThan),
        "greater_or_equal" => Some(ComparisonOp::GreaterOrEqual),
        "contains" => Some(ComparisonOp::Contains),
        "between" => Some(ComparisonOp::Between),
        "one_of" => Some(ComparisonOp::OneOf),
        "regex_matches" => Some(ComparisonOp::RegexMatches),
        _ => None,
    }
}

fn group_mode_from_str(text: &str) -> Option<GroupMode> {
    match text {
        "all" => Some(GroupMode::All),
        "any" => Some(GroupMode::Any),
        "none" => Some(GroupMode::None),
        _ => None,
    }
}

fn value_from_config(value: &config::ValueSource) -> ConditionValue {
    match value {
        config::ValueSource::Literal(text) => ConditionValue::Literal(typed_value_from_literal(text)),
        config::ValueSource::Command { command } => ConditionValue::Command(command.clone()),
    }
}

/// Infers a [`TypedValue`] from a bare config scalar: `true`/`false` parse as
/// `Bool`, anything else that parses as a float is `Number`, otherwise the
/// text is taken verbatim as `String`.
fn typed_value_from_literal(text: &str) -> TypedValue {
    if let Ok(b) = text.parse::<bool>() {
        return TypedValue::Bool(b);
    }
    if let Ok(n) = text.parse::<f64>() {
        return TypedValue::Number(n);
    }
    TypedValue::String(text.to_owned())
}

/// Builds a [`TriggerAction`] from one `ActionNode`. Only `command` and
/// `global_shortcut` action types are representable in the config model
/// today (`config::ActionNode` carries no fields for `InputSequence`,
/// `Sleep` or `Group` payloads); anything else is logged and dropped rather
/// than faked.
fn trigger_action_from_config(node: &config::ActionNode) -> Option<TriggerAction> {
    let on = on_from_str(&node.on).unwrap_or_else(|| {
        warn!(target: "inputactions::runtime", "unknown action lifecycle point `{}`, defaulting to Update", node.on);
        On::Update
    });

    let kind = match node.kind.as_str() {
        "command" => {
            let Some(command) = &node.command else {
                warn!(target: "inputactions::runtime", "command action missing `command`, skipping");
                return None;
            };
            ActionKind::Command(command.clone())
        }
        "global_shortcut" => {
            let Some(shortcut) = &node.shortcut else {
                warn!(target: "inputactions::runtime", "global_shortcut action missing `shortcut`, skipping");
                return None;
            };
            ActionKind::GlobalShortcut(shortcut.clone())
        }
        other => {
            warn!(target: "inputactions::runtime", "action type `{other}` isn't representable in config, skipping");
            return None;
        }
    };

    let mut action = Action::new(node.id.clone(), kind);
    action.condition = node.condition.as_ref().map(condition_from_config);
    action.execution_limit = node.execution_limit;

    Some(TriggerAction::new(Arc::new(action), on))
}

fn on_from_str(text: &str) -> Option<On> {
    match text {
        "begin" => Some(On::Begin),
        "cancel" => Some(On::Cancel),
        "end" => Some(On::End),
        "end_cancel" => Some(On::EndCancel),
        "tick" => Some(On::Tick),
        "update" => Some(On::Update),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{GlobalShortcutInvoker, InputEmitter};
    use crate::condition::CommandRunner;

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
    impl CommandRunner for NullCommands {
        fn run(&self, _command: &str) -> Option<String> {
            None
        }
    }

    fn test_deps() -> ActionDeps {
        ActionDeps {
            emitter: Arc::new(NullEmitter),
            commands: Arc::new(NullCommands),
            shortcuts: Arc::new(NullShortcuts),
            delta_multiplied: (1.0, 1.0),
        }
    }

    #[test]
    fn new_runtime_starts_with_empty_chain_and_no_devices() {
        let runtime = Runtime::new(config::Model::empty(), test_deps());
        assert_eq!(runtime.supervisor.devices().count(), 0);
    }

    #[test]
    fn device_rule_maps_type_and_every_property() {
        let model = config::Model {
            device_rules: vec![config::DeviceRule {
                condition: Some(config::ConditionNode::Compare {
                    variable: "device_type".to_owned(),
                    op: None,
                    negate: false,
                    value: config::ValueSource::Literal("touchpad".to_owned()),
                }),
                properties: config::DevicePropertiesNode {
                    grab: Some(true),
                    ignore: Some(false),
                    handle_libevdev_events: Some(false),
                    multi_touch: Some(true),
                    button_pad: Some(true),
                    finger_pressure: Some(50),
                    thumb_pressure: Some(200),
                    palm_pressure: Some(300),
                    lmr_tap_button_map: Some(true),
                    motion_threshold_mm: Some(2.5),
                },
            }],
            ..config::Model::default()
        };

        let rules = device_rules_from_config(&model);
        assert_eq!(rules.len(), 1);
        let (device_type, properties) = &rules[0];
        assert_eq!(*device_type, Some(DeviceType::Touchpad));
        assert!(properties.grab());
        assert!(!properties.ignore());
        assert!(!properties.handle_libevdev_events());
        assert!(properties.multi_touch());
        assert!(properties.button_pad());
        assert_eq!(properties.finger_pressure(), 50);
        assert_eq!(properties.thumb_pressure(), 200);
        assert_eq!(properties.palm_pressure(), 300);
        assert!(properties.lmr_tap_button_map());
        assert!((properties.motion_threshold_mm() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn device_rule_with_unrecognized_condition_matches_every_device() {
        let model = config::Model {
            device_rules: vec![config::DeviceRule {
                condition: Some(config::ConditionNode::Group {
                    mode: "all".to_owned(),
                    negate: false,
                    conditions: vec![],
                }),
                properties: config::DevicePropertiesNode::default(),
            }],
            ..config::Model::default()
        };

        let rules = device_rules_from_config(&model);
        assert_eq!(rules[0].0, None);
    }

    #[test]
    fn trigger_from_config_maps_every_field() {
        let node = config::TriggerNode {
            id: "swipe-left-3".to_owned(),
            kind: "swipe".to_owned(),
            direction: Some("left".to_owned()),
            threshold: Some((10.0, 0.0)),
            activation_condition: Some(config::ConditionNode::Compare {
                variable: "fingers".to_owned(),
                op: Some("equal".to_owned()),
                negate: false,
                value: config::ValueSource::Literal("3".to_owned()),
            }),
            end_condition: None,
            block_events: true,
            clear_modifiers: false,
            set_last_trigger: true,
            actions: vec![config::ActionNode {
                id: None,
                on: "update".to_owned(),
                kind: "command".to_owned(),
                command: Some("notify-send swiped".to_owned()),
                shortcut: None,
                condition: None,
                execution_limit: None,
            }],
        };

        let trigger = trigger_from_config(&node);
        assert_eq!(trigger.kind, TriggerType::Swipe);
        assert_eq!(trigger.direction, Some(Direction::Left));
        assert_eq!(trigger.threshold, Some(Range::new(0.0, 10.0)));
        assert!(trigger.activation_condition.is_some());
        assert_eq!(trigger.actions.len(), 1);
    }

    #[test]
    fn unsupported_action_type_is_dropped_not_faked() {
        let node = config::ActionNode {
            id: None,
            on: "begin".to_owned(),
            kind: "input_sequence".to_owned(),
            command: None,
            shortcut: None,
            condition: None,
            execution_limit: None,
        };
        assert!(trigger_action_from_config(&node).is_none());
    }

    #[test]
    fn build_chain_wires_gestures_into_the_matching_handler() {
        let model = config::Model {
            touchpad: config::HandlerConfig {
                gestures: vec![config::TriggerNode {
                    id: "pinch-in".to_owned(),
                    kind: "pinch".to_owned(),
                    direction: Some("in".to_owned()),
                    threshold: None,
                    activation_condition: None,
                    end_condition: None,
                    block_events: true,
                    clear_modifiers: false,
                    set_last_trigger: true,
                    actions: vec![],
                }],
            },
            ..config::Model::default()
        };

        let runtime = Runtime::new(model, test_deps());
        assert_eq!(runtime.supervisor.devices().count(), 0);
        // The chain itself doesn't expose its handlers, so this only checks
        // that building it from a non-empty config doesn't panic/drop work;
        // per-handler wiring is covered by `trigger_from_config`'s own test.
        let _ = runtime.chain;
    }
}
