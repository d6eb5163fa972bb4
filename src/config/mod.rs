//! The configuration data contract (spec.md §6): a `serde`-deserializable
//! tree mirroring `Trigger`/`Action`/`Condition`, device rules, and the
//! global daemon flags. Parsing/watching a YAML file is out of scope
//! (spec.md §1's Non-goals); this module only defines the tree and the
//! crash-loop guard, both of which are in scope as part of the trigger/
//! action *model*.

use std::fs;
use std::path::Path;

use ahash::AHashMap;
use serde::Deserialize;

/// A value that may be a literal, a `$variable` reference, or a
/// `{ command: "..." }` node (spec.md §6: "Values may reference variables
/// ... or commands ... wherever a literal would be accepted").
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ValueSource {
    /// A literal string/number, written directly in the config.
    Literal(String),
    /// `{ command: "..." }`.
    Command {
        /// The shell command to run.
        command: String,
    },
}

/// One entry of `device_rules`: a condition-gated overlay of
/// [`crate::device::DeviceProperties`] (spec.md §6). Later entries in the
/// list override earlier ones.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRule {
    /// Matches against device name/type variables; `None` matches every
    /// device.
    pub condition: Option<ConditionNode>,
    /// The properties this rule overlays when it matches.
    pub properties: DevicePropertiesNode,
}

/// Serde mirror of [`crate::device::DeviceProperties`]'s optional fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicePropertiesNode {
    #[serde(default)]
    pub grab: Option<bool>,
    #[serde(default)]
    pub ignore: Option<bool>,
    #[serde(default)]
    pub handle_libevdev_events: Option<bool>,
    #[serde(default)]
    pub multi_touch: Option<bool>,
    #[serde(default)]
    pub button_pad: Option<bool>,
    #[serde(default)]
    pub finger_pressure: Option<u32>,
    #[serde(default)]
    pub thumb_pressure: Option<u32>,
    #[serde(default)]
    pub palm_pressure: Option<u32>,
    #[serde(default)]
    pub lmr_tap_button_map: Option<bool>,
    #[serde(default)]
    pub motion_threshold_mm: Option<f64>,
}

/// Serde mirror of [`crate::condition::Condition`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op")]
pub enum ConditionNode {
    /// A single variable comparison.
    Compare {
        variable: String,
        op: Option<String>,
        #[serde(default)]
        negate: bool,
        value: ValueSource,
    },
    /// A group of sub-conditions.
    Group {
        mode: String,
        #[serde(default)]
        negate: bool,
        conditions: Vec<ConditionNode>,
    },
}

/// Serde mirror of [`crate::trigger::Trigger`] (spec.md §3, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub threshold: Option<(f64, f64)>,
    #[serde(default)]
    pub activation_condition: Option<ConditionNode>,
    #[serde(default)]
    pub end_condition: Option<ConditionNode>,
    #[serde(default = "default_true")]
    pub block_events: bool,
    #[serde(default)]
    pub clear_modifiers: bool,
    #[serde(default = "default_true")]
    pub set_last_trigger: bool,
    #[serde(default)]
    pub actions: Vec<ActionNode>,
}

fn default_true() -> bool {
    true
}

/// Serde mirror of [`crate::action::Action`] (spec.md §3, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ActionNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "on")]
    pub on: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub shortcut: Option<String>,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
    #[serde(default)]
    pub execution_limit: Option<u32>,
}

/// Per-handler gesture list (spec.md §6: `keyboard`, `mouse`, `pointer`,
/// `touchpad`, `touchscreen`, each `{ gestures: [...] }`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlerConfig {
    #[serde(default)]
    pub gestures: Vec<TriggerNode>,
}

/// Notification toggles (spec.md §6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Notifications {
    #[serde(default)]
    pub config_error: bool,
}

/// The top-level configuration tree (spec.md §6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub device_rules: Vec<DeviceRule>,
    #[serde(default)]
    pub keyboard: HandlerConfig,
    #[serde(default)]
    pub mouse: HandlerConfig,
    #[serde(default)]
    pub pointer: HandlerConfig,
    #[serde(default)]
    pub touchpad: HandlerConfig,
    #[serde(default)]
    pub touchscreen: HandlerConfig,
    #[serde(default)]
    pub emergency_combination: Vec<u32>,
    #[serde(default)]
    pub autoreload: bool,
    #[serde(default)]
    pub notifications: Notifications,
    #[serde(default)]
    pub external_variable_access: bool,
}

impl Model {
    /// An empty configuration: no device rules, no gestures, nothing
    /// emergency-releasable beyond the hardcoded chord. Installed by
    /// [`crash_loop_guard`] when the sentinel indicates the previous load
    /// crashed the process.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pure structural validation over an already-parsed tree (the YAML
    /// loading pipeline itself is out of scope, but this is part of the
    /// condition/trigger model, spec.md §7). Collects every error rather
    /// than stopping at the first.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut seen_ids: AHashMap<String, ()> = AHashMap::new();

        for handler in [&self.keyboard, &self.mouse, &self.pointer, &self.touchpad, &self.touchscreen] {
            for trigger in &handler.gestures {
                if seen_ids.insert(trigger.id.clone(), ()).is_some() {
                    errors.push(ConfigError::DuplicateSetItem {
                        position: TextPosition::default(),
                        detail: format!("duplicate trigger id `{}`", trigger.id),
                    });
                }
                if !KNOWN_TRIGGER_TYPES.contains(&trigger.kind.as_str()) {
                    errors.push(ConfigError::InvalidValue {
                        position: TextPosition::default(),
                        detail: format!("unknown trigger type `{}`", trigger.kind),
                    });
                }
                for action in &trigger.actions {
                    if action.kind == "command" && action.command.is_none() {
                        errors.push(ConfigError::MissingProperty {
                            position: TextPosition::default(),
                            detail: "command action missing `command`".to_owned(),
                        });
                    }
                    if action.kind == "global_shortcut" && action.shortcut.is_none() {
                        errors.push(ConfigError::MissingProperty {
                            position: TextPosition::default(),
                            detail: "global_shortcut action missing `shortcut`".to_owned(),
                        });
                    }
                }
            }
        }

        errors
    }
}

const KNOWN_TRIGGER_TYPES: &[&str] = &[
    "press",
    "click",
    "tap",
    "hover",
    "pinch",
    "rotate",
    "swipe",
    "wheel",
    "stroke",
    "keyboard_shortcut",
    "circle",
];

/// Line/column of a config parse error (spec.md §9's design note:
/// `Result<Model, ConfigError>` carrying position information).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextPosition {
    pub line: u32,
    pub column: u32,
}

/// Structural/semantic configuration errors (spec.md §7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate item at {position:?}: {detail}")]
    DuplicateSetItem { position: TextPosition, detail: String },
    #[error("invalid value at {position:?}: {detail}")]
    InvalidValue { position: TextPosition, detail: String },
    #[error("invalid node type at {position:?}: {detail}")]
    InvalidNodeType { position: TextPosition, detail: String },
    #[error("missing property at {position:?}: {detail}")]
    MissingProperty { position: TextPosition, detail: String },
    #[error("invalid variable reference at {position:?}: {detail}")]
    InvalidVariable { position: TextPosition, detail: String },
    #[error("deprecated feature at {position:?}: {detail}")]
    DeprecatedFeature { position: TextPosition, detail: String },
}

/// A source of raw configuration text the daemon can watch for changes
/// (spec.md §5's Configuration thread collaborator). No implementation
/// ships — file watching/parsing is an explicit Non-goal — but the trait
/// boundary has to exist for `Runtime::reload` to be expressible and
/// testable with a fake source.
pub trait ConfigSource: Send + Sync {
    /// Returns a channel that yields a new raw config string every time the
    /// source changes.
    fn watch(&self) -> tokio::sync::mpsc::Receiver<String>;
}

/// Writes a sentinel file before calling `loader`, removing it on success.
/// If this is the initial (startup) load and the sentinel already exists —
/// meaning the previous run crashed partway through loading — skips
/// `loader` entirely and returns [`Model::empty`] (spec.md §7/§8 scenario
/// 4, the crash-loop guard).
pub fn crash_loop_guard(sentinel_path: &Path, initial: bool, loader: impl FnOnce() -> Model) -> Model {
    if initial && sentinel_path.exists() {
        log::warn!(
            target: "inputactions::config",
            "sentinel {} present on initial load, assuming a crash loop and loading an empty config",
            sentinel_path.display()
        );
        return Model::empty();
    }

    if let Err(err) = fs::write(sentinel_path, b"") {
        log::warn!(target: "inputactions::config", "failed to write crash-loop sentinel: {err}");
    }
    let model = loader();
    let _ = fs::remove_file(sentinel_path);
    model
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_model_validates_clean() {
        assert!(Model::empty().validate().is_empty());
    }

    #[test]
    fn duplicate_trigger_ids_are_flagged() {
        let trigger = |id: &str| TriggerNode {
            id: id.to_owned(),
            kind: "swipe".to_owned(),
            direction: None,
            threshold: None,
            activation_condition: None,
            end_condition: None,
            block_events: true,
            clear_modifiers: false,
            set_last_trigger: true,
            actions: Vec::new(),
        };
        let model = Model {
            touchpad: HandlerConfig {
                gestures: vec![trigger("swipe-left"), trigger("swipe-left")],
            },
            ..Model::default()
        };
        let errors = model.validate();
        assert!(matches!(errors[0], ConfigError::DuplicateSetItem { .. }));
    }

    #[test]
    fn crash_loop_guard_skips_loader_on_preexisting_sentinel() {
        let dir = std::env::temp_dir().join(format!("inputactions-test-sentinel-{:?}", std::thread::current().id()));
        let _ = fs::create_dir_all(&dir);
        let sentinel = dir.join("crash.lock");
        fs::write(&sentinel, b"").unwrap();

        let mut called = false;
        let model = crash_loop_guard(&sentinel, true, || {
            called = true;
            Model::default()
        });
        assert!(!called);
        assert!(!sentinel.exists() || fs::read(&sentinel).unwrap().is_empty());
        let _ = model;
        let _ = fs::remove_dir_all(&dir);
    }
}
