//! Named, typed, read-mostly values consulted by [`crate::condition::Condition`]s.
//!
//! Grounded on `original_source/src/libinputactions/variables/{Variable,VariableManager}.{h,cpp}`:
//! a variable is either *local* (an in-process cell set by handlers) or
//! *remote* (a getter closure re-evaluated on every read, e.g. querying the
//! compositor for the active window). Both are exposed through the same
//! [`Variable`] handle so [`condition`](crate::condition) code never has to
//! know which kind it is looking at.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;

/// The type space for variable comparisons (spec.md §3, "Variable").
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Boolean value, e.g. `window_fullscreen`.
    Bool(bool),
    /// Numeric value, e.g. `fingers`, `time_since_last_trigger`.
    Number(f64),
    /// A 2D point, e.g. `pointer_position_screen_percentage`.
    Point(f64, f64),
    /// A string, e.g. `window_class`.
    String(String),
    /// Keyboard modifier mask.
    Modifiers(ModifierFlags),
    /// Set of device types, e.g. `$device_type`.
    DeviceTypes(DeviceTypeFlags),
    /// Cursor shape enumeration.
    CursorShape(CursorShape),
}

/// A minimal bitflags-alike so we don't need to pull in the `bitflags` crate
/// for two small masks.
macro_rules! bitflags_like {
    ($name:ident, $repr:ty, [$($variant:ident = $bit:expr),* $(,)?]) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        #[allow(missing_docs)]
        pub struct $name(pub $repr);

        impl $name {
            $(
                #[allow(non_upper_case_globals, missing_docs)]
                pub const $variant: $name = $name(1 << $bit);
            )*

            /// Bitwise OR.
            pub fn with(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }

            /// `(self & other) == other`, the `Contains` comparator for flags.
            pub fn contains_mask(self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                self.with(rhs)
            }
        }
    };
}

bitflags_like!(ModifierFlags, u32, [SHIFT = 0, CTRL = 1, ALT = 2, META = 3]);
bitflags_like!(DeviceTypeFlags, u32, [KEYBOARD = 0, MOUSE = 1, TOUCHPAD = 2, TOUCHSCREEN = 3]);

/// Cursor shape enumeration (subset relevant to condition matching).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CursorShape {
    Default,
    Pointer,
    Text,
    Grab,
    Grabbing,
    NotAllowed,
    ResizeHorizontal,
    ResizeVertical,
}

type RemoteGetter = Arc<dyn Fn() -> Option<TypedValue> + Send + Sync>;

enum Storage {
    Local(Mutex<Option<TypedValue>>),
    Remote(RemoteGetter),
}

/// A single named, typed cell.
pub struct Variable {
    storage: Storage,
}

impl Variable {
    fn local() -> Self {
        Self {
            storage: Storage::Local(Mutex::new(None)),
        }
    }

    fn remote(getter: RemoteGetter) -> Self {
        Self {
            storage: Storage::Remote(getter),
        }
    }

    /// Reads the current value. For a remote variable this invokes the
    /// getter closure; for a local one it reads the stored cell.
    pub fn get(&self) -> Option<TypedValue> {
        match &self.storage {
            Storage::Local(cell) => cell.lock().unwrap().clone(),
            Storage::Remote(getter) => getter(),
        }
    }

    /// Sets a local variable. No-op (with a debug log) on a remote variable,
    /// since remote variables are read-only from the event thread's point of
    /// view — only their backing system can change them.
    pub fn set(&self, value: Option<TypedValue>) {
        match &self.storage {
            Storage::Local(cell) => *cell.lock().unwrap() = value,
            Storage::Remote(_) => {
                log::debug!(target: "inputactions::variable", "attempted to set a remote variable");
            }
        }
    }
}

/// Registry of all variables known to the running daemon.
///
/// Built-in registrations mirror `VariableManager::VariableManager()`:
/// device name, per-finger position/pressure, keyboard modifiers, window
/// attributes (active + under-pointer), pointer position percentages, and
/// the thumb variables. For every registered `Point` variable we also
/// register synthetic `<name>_x` / `<name>_y` number variables, exactly as
/// the original does after its constructor body runs.
pub struct VariableStore {
    variables: AHashMap<String, Variable>,
}

/// Number of per-finger variable slots the original registers
/// (`finger_1..finger_5`).
pub const FINGER_VARIABLE_COUNT: usize = 5;

impl VariableStore {
    /// Builds a store with only the always-present local variables
    /// registered (no remote collaborators wired in yet); callers add remote
    /// variables with [`VariableStore::register_remote`] once the
    /// window/cursor/pointer providers are available.
    pub fn new() -> Self {
        let mut store = Self {
            variables: AHashMap::new(),
        };
        store.register_local("device_name");
        for i in 1..=FINGER_VARIABLE_COUNT {
            store.register_local(&format!("finger_{i}_initial_position_percentage"));
            store.register_local(&format!("finger_{i}_position_percentage"));
            store.register_local(&format!("finger_{i}_pressure"));
        }
        store.register_local("fingers");
        store.register_local("keyboard_modifiers");
        store.register_local("last_trigger_id");
        store.register_local("thumb_initial_position_percentage");
        store.register_local("thumb_position_percentage");
        store.register_local("thumb_present");
        store.register_local("time_since_last_trigger");
        store
    }

    /// Registers a local (in-process) variable, replacing any existing
    /// registration with the same name.
    pub fn register_local(&mut self, name: &str) {
        self.variables.insert(name.to_owned(), Variable::local());
    }

    /// Registers a remote (getter-backed) variable. If the variable is a
    /// `Point`, also synthesizes `<name>_x`/`<name>_y` number variables, as
    /// `VariableManager` does for every `QPointF` variable after
    /// registration.
    pub fn register_remote(
        &mut self,
        name: &str,
        getter: impl Fn() -> Option<TypedValue> + Send + Sync + 'static,
    ) {
        let getter: RemoteGetter = Arc::new(getter);
        self.variables
            .insert(name.to_owned(), Variable::remote(getter.clone()));

        let x_name = format!("{name}_x");
        let y_name = format!("{name}_y");
        let getter_x = getter.clone();
        let getter_y = getter;
        self.variables.insert(
            x_name,
            Variable::remote(Arc::new(move || match getter_x() {
                Some(TypedValue::Point(x, _)) => Some(TypedValue::Number(x)),
                _ => None,
            })),
        );
        self.variables.insert(
            y_name,
            Variable::remote(Arc::new(move || match getter_y() {
                Some(TypedValue::Point(_, y)) => Some(TypedValue::Number(y)),
                _ => None,
            })),
        );
    }

    /// Looks up a variable by name.
    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Convenience: reads a variable's current value directly.
    pub fn get(&self, name: &str) -> Option<TypedValue> {
        self.variables.get(name).and_then(Variable::get)
    }

    /// Sets a local variable's value, if registered.
    pub fn set(&self, name: &str, value: Option<TypedValue>) {
        if let Some(var) = self.variables.get(name) {
            var.set(value);
        }
    }

    /// Snapshot of all registered variable names and their current values,
    /// used by the IPC `variable-list` contract (spec.md §6).
    pub fn snapshot(&self) -> BTreeMap<String, Option<TypedValue>> {
        self.variables
            .iter()
            .map(|(name, var)| (name.clone(), var.get()))
            .collect()
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_variable_round_trips() {
        let mut store = VariableStore::new();
        store.register_local("test_var");
        assert_eq!(store.get("test_var"), None);
        store.set("test_var", Some(TypedValue::Number(3.0)));
        assert_eq!(store.get("test_var"), Some(TypedValue::Number(3.0)));
    }

    #[test]
    fn remote_variable_reflects_getter() {
        let mut store = VariableStore::new();
        store.register_remote("remote_flag", || Some(TypedValue::Bool(true)));
        assert_eq!(store.get("remote_flag"), Some(TypedValue::Bool(true)));
        // Setting a remote variable is a no-op.
        store.set("remote_flag", Some(TypedValue::Bool(false)));
        assert_eq!(store.get("remote_flag"), Some(TypedValue::Bool(true)));
    }

    #[test]
    fn point_variable_synthesizes_components() {
        let mut store = VariableStore::new();
        store.register_remote("pos", || Some(TypedValue::Point(1.0, 2.0)));
        assert_eq!(store.get("pos_x"), Some(TypedValue::Number(1.0)));
        assert_eq!(store.get("pos_y"), Some(TypedValue::Number(2.0)));
    }

    #[test]
    fn modifier_flags_contains_mask() {
        let mask = ModifierFlags::SHIFT.with(ModifierFlags::CTRL);
        assert!(mask.contains_mask(ModifierFlags::SHIFT));
        assert!(!mask.contains_mask(ModifierFlags::ALT));
    }
}
