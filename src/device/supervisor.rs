//! Enumerates, tracks, and proxies kernel input devices (spec.md §4.1).
//!
//! Grounded on `examples/aecsocket-fukomaster/src/main.rs`'s `/dev/input`
//! enumeration + `notify` hotplug loop, generalized from "one hardcoded
//! virtual trackpad" to the three-endpoint grab-and-mirror pipeline spec.md
//! §4.1 describes, and on
//! `original_source/src/libinputactions/input/backends/InputBackend.cpp`
//! for the frame-handling algorithm and emergency-release chord.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ahash::AHashMap;
use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::variable::ModifierFlags;

use super::{
    open_real, DeviceProperties, DeviceType, GrabbedEndpoints, TrackedDevice, EMERGENCY_RELEASE_CHORD,
    EMERGENCY_RELEASE_HOLD, MAX_GRAB_RETRIES,
};

/// A device file appearing or disappearing under `/dev/input`, mirroring
/// `examples/aecsocket-fukomaster/src/main.rs::DeviceEvent`.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device node appeared (or was present at startup).
    Added(PathBuf),
    /// A device node disappeared.
    Removed(PathBuf),
}

/// One device waiting to be grabbed once it returns to a neutral state
/// (spec.md §4.1, "Neutrality check for grabbing").
struct PendingGrab {
    path: PathBuf,
    name: String,
    device_type: DeviceType,
    properties: DeviceProperties,
    attempts: u32,
}

/// Outcome of [`DeviceSupervisor::handle_frame`]: whether the frame's
/// events should be considered consumed by a handler (spec.md §4.1 step 3).
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameResult {
    /// Whether at least one handler blocked the frame.
    pub block: bool,
    /// How many libinput-level events the frame produced.
    pub event_count: u32,
}

/// Owns every tracked device and the grab/mirror bookkeeping spec.md §4.1
/// describes. Does not itself parse evdev frames into trigger events — that
/// is [`crate::handler::Chain`]'s job; the supervisor's `handle_frame` is
/// the seam between "bytes off the wire" and "handler chain sees events".
pub struct DeviceSupervisor {
    devices: AHashMap<PathBuf, TrackedDevice>,
    pending: Vec<PendingGrab>,
    rules: Vec<(Option<DeviceType>, DeviceProperties)>,
    emergency_chord_since: Option<Instant>,
    suspended: bool,
}

impl Default for DeviceSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceSupervisor {
    /// Builds an empty supervisor with no device rules applied yet.
    pub fn new() -> Self {
        Self {
            devices: AHashMap::new(),
            pending: Vec::new(),
            rules: Vec::new(),
            emergency_chord_since: None,
            suspended: false,
        }
    }

    /// Installs the layered device-rule overlays (spec.md §3's
    /// `device_rules`, later entries win). `rule.0 = None` matches every
    /// device type.
    pub fn set_rules(&mut self, rules: Vec<(Option<DeviceType>, DeviceProperties)>) {
        self.rules = rules;
    }

    fn layered_properties(&self, device_type: DeviceType) -> DeviceProperties {
        let mut properties = DeviceProperties::default();
        for (matches, rule) in &self.rules {
            if matches.is_none_or_eq(device_type) {
                properties.apply(rule);
            }
        }
        properties
    }

    /// Scans `dev_input_dir` (normally `/dev/input`), adding every device
    /// node currently present (spec.md §4.1: "scan the input directory, add
    /// every present device").
    pub fn initialize(&mut self, dev_input_dir: &Path) -> Result<()> {
        for entry in fs::read_dir(dev_input_dir)
            .with_context(|| format!("failed to list {}", dev_input_dir.display()))?
        {
            let entry = entry.with_context(|| format!("failed to read entry under {}", dev_input_dir.display()))?;
            self.handle_device_event(DeviceEvent::Added(entry.path()));
        }
        Ok(())
    }

    /// Processes one hotplug event from the `/dev/input` watcher.
    pub fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Added(path) => self.try_add(&path),
            DeviceEvent::Removed(path) => {
                if self.devices.remove(&path).is_some() {
                    info!(target: "inputactions::device", "{} removed", path.display());
                }
                self.pending.retain(|p| p.path != path);
            }
        }
    }

    fn try_add(&mut self, path: &Path) {
        if self.devices.contains_key(path) || !path.to_string_lossy().contains("event") {
            return;
        }
        let device = match open_real(path, false) {
            Ok(device) => device,
            Err(err) => {
                debug!(target: "inputactions::device", "skipping {}: {err:#}", path.display());
                return;
            }
        };
        let name = device.name().unwrap_or("unknown device").to_owned();
        let device_type = classify_device_type(&device);
        let mut properties = self.layered_properties(device_type);
        if let Some(size) = super::size_mm(&device) {
            properties.set_size(size);
        }

        if properties.ignore() {
            debug!(target: "inputactions::device", "{name} ignored by device rules");
            return;
        }

        if !properties.grab() {
            self.devices.insert(
                path.to_path_buf(),
                TrackedDevice {
                    name,
                    system_path: path.to_path_buf(),
                    device_type,
                    properties,
                    physical: super::PhysicalState::default(),
                    virtual_state: super::VirtualState::default(),
                    endpoints: None,
                    grab_retry_count: 0,
                    current_slot: 0,
                    pending_touch_down: Vec::new(),
                    block_latch: false,
                    blocked_since: None,
                },
            );
            return;
        }

        self.pending.push(PendingGrab {
            path: path.to_path_buf(),
            name,
            device_type,
            properties,
            attempts: 0,
        });
        self.drain_pending();
    }

    /// Retries every device waiting to be grabbed, promoting any that are
    /// now neutral (spec.md §4.1: "A non-neutral device is deferred to a
    /// retry queue").
    pub fn drain_pending(&mut self) {
        let mut still_pending = Vec::new();
        for mut pending in self.pending.drain(..) {
            match open_real(&pending.path, true) {
                Ok(real) => match self.build_mirrors(&real, &pending.name) {
                    Ok((injection, output)) => {
                        info!(target: "inputactions::device", "grabbed {} ({:?})", pending.name, pending.device_type);
                        if let Some(size) = super::size_mm(&real) {
                            pending.properties.set_size(size);
                        }
                        self.devices.insert(
                            pending.path.clone(),
                            TrackedDevice {
                                name: pending.name,
                                system_path: pending.path,
                                device_type: pending.device_type,
                                properties: pending.properties,
                                physical: super::PhysicalState::default(),
                                virtual_state: super::VirtualState::default(),
                                endpoints: Some(GrabbedEndpoints { real, injection, output }),
                                grab_retry_count: pending.attempts,
                                current_slot: 0,
                                pending_touch_down: Vec::new(),
                                block_latch: false,
                                blocked_since: None,
                            },
                        );
                    }
                    Err(err) => {
                        warn!(target: "inputactions::device", "failed to mirror {}: {err:#}", pending.name);
                    }
                },
                Err(_) => {
                    pending.attempts += 1;
                    if pending.attempts < MAX_GRAB_RETRIES {
                        still_pending.push(pending);
                    } else {
                        warn!(
                            target: "inputactions::device",
                            "giving up grabbing {} after {} attempts",
                            pending.name, pending.attempts
                        );
                    }
                }
            }
        }
        self.pending = still_pending;
    }

    fn build_mirrors(
        &self,
        real: &evdev::Device,
        name: &str,
    ) -> Result<(evdev::uinput::VirtualDevice, evdev::uinput::VirtualDevice)> {
        let injection = super::build_mirror(real, name, "internal")?;
        let output = super::build_mirror(real, name, "output")?;
        Ok((injection, output))
    }

    /// Every tracked device, grabbed or not.
    pub fn devices(&self) -> impl Iterator<Item = &TrackedDevice> {
        self.devices.values()
    }

    /// The first tracked touchpad, if any (spec.md §4.1).
    pub fn first_touchpad(&self) -> Option<&TrackedDevice> {
        self.devices.values().find(|d| d.device_type == DeviceType::Touchpad)
    }

    /// The first tracked touchscreen, if any (spec.md §4.1).
    pub fn first_touchscreen(&self) -> Option<&TrackedDevice> {
        self.devices.values().find(|d| d.device_type == DeviceType::Touchscreen)
    }

    /// Combined modifier mask across every tracked keyboard's physical
    /// state (spec.md §4.1).
    pub fn keyboard_modifiers(&self) -> ModifierFlags {
        let mut flags = ModifierFlags::default();
        for device in self.devices.values().filter(|d| d.device_type == DeviceType::Keyboard) {
            flags = ModifierFlags(flags.0 | device.physical.modifiers);
        }
        flags
    }

    /// Clears every tracked keyboard's modifier bitmask (spec.md §4.1).
    pub fn clear_keyboard_modifiers(&mut self) {
        for device in self.devices.values_mut().filter(|d| d.device_type == DeviceType::Keyboard) {
            device.physical.modifiers = 0;
        }
    }

    /// Ingests one syn-delimited evdev frame from the real device,
    /// translating it into zero or more handler-level events and driving
    /// `chain` with them (spec.md §4.1, "Frame handling"). Physical state
    /// (pressed keys, touch slots) is updated first if
    /// `handle_libevdev_events` is set.
    ///
    /// Also drives the rest of the §4.1 frame algorithm for grabbed
    /// devices: the frame is always replayed onto the injection endpoint
    /// before the chain sees it (step 3); once the chain's verdict is in,
    /// an unblocked frame is either forwarded to the output endpoint
    /// verbatim (step 6) or, if the device was blocking a moment ago,
    /// used to restore the output endpoint's state to match reality
    /// (step 4). A blocked touchpad frame arms the reset timer polled by
    /// [`Self::tick_virtual_device_resets`] (step 5).
    ///
    /// Acceleration curves are out of scope (spec.md's Non-goals exclude
    /// pointer-acceleration reimplementation), so `accelerated` deltas equal
    /// `unaccelerated` ones.
    pub fn handle_frame(
        &mut self,
        path: &Path,
        frame: &[evdev::InputEvent],
        chain: &mut crate::handler::Chain,
        executor: &crate::action::ActionExecutor,
        ctx: &crate::condition::EvalContext,
        deps: &crate::action::ActionDeps,
    ) -> FrameResult {
        use evdev::{InputEventKind, RelativeAxisType};

        let Some(device_type) = self.devices.get(path).map(|d| d.device_type) else {
            return FrameResult::default();
        };

        self.emit_to_injection(path, frame);

        let mut translated = Vec::new();
        let mut rel_dx = 0.0_f64;
        let mut rel_dy = 0.0_f64;

        for event in frame {
            let handle_libevdev_events =
                self.devices.get(path).is_some_and(|d| d.properties.handle_libevdev_events());
            if !handle_libevdev_events {
                continue;
            }
            match event.kind() {
                InputEventKind::Key(key) => {
                    let pressed = event.value() != 0;
                    let code = u32::from(key.0);
                    if let Some(device) = self.devices.get_mut(path) {
                        if pressed {
                            if !device.physical.pressed_keys.contains(&key.0) {
                                device.physical.pressed_keys.push(key.0);
                            }
                        } else {
                            device.physical.pressed_keys.retain(|k| *k != key.0);
                        }
                    }
                    let is_pointer_button = matches!(
                        key,
                        evdev::Key::BTN_LEFT | evdev::Key::BTN_RIGHT | evdev::Key::BTN_MIDDLE
                    );
                    if is_pointer_button {
                        translated.push(crate::handler::InputEvent::Button { code, pressed });
                    } else {
                        translated.push(crate::handler::InputEvent::Key { code, pressed });
                    }
                }
                InputEventKind::RelAxis(axis) => match axis {
                    RelativeAxisType::REL_X => rel_dx += f64::from(event.value()),
                    RelativeAxisType::REL_Y => rel_dy += f64::from(event.value()),
                    RelativeAxisType::REL_WHEEL => translated.push(crate::handler::InputEvent::Wheel {
                        delta: f64::from(event.value()),
                        horizontal: false,
                    }),
                    RelativeAxisType::REL_HWHEEL => translated.push(crate::handler::InputEvent::Wheel {
                        delta: f64::from(event.value()),
                        horizontal: true,
                    }),
                    _ => {}
                },
                InputEventKind::AbsAxis(axis) => {
                    self.handle_abs_axis(path, axis, event.value(), &mut translated);
                }
                _ => {}
            }
        }

        if rel_dx != 0.0 || rel_dy != 0.0 {
            translated.push(crate::handler::InputEvent::Motion {
                delta: crate::trigger::PointDelta {
                    unaccelerated: (rel_dx, rel_dy),
                    accelerated: (rel_dx, rel_dy),
                },
            });
        }

        let mut block = false;
        for event in &translated {
            if chain.handle_event(event, executor, ctx, deps) {
                block = true;
            }
        }

        if block {
            if let Some(device) = self.devices.get_mut(path) {
                device.set_blocking(true);
                if device_type == DeviceType::Touchpad && device.blocked_since.is_none() {
                    device.blocked_since = Some(Instant::now());
                }
            }
        } else {
            let was_blocking = self.devices.get(path).is_some_and(TrackedDevice::is_blocking);
            if was_blocking {
                self.restore_output(path);
            } else {
                self.forward_to_output(path, frame);
            }
            if let Some(device) = self.devices.get_mut(path) {
                device.set_blocking(false);
            }
        }

        if let Some(device) = self.devices.get_mut(path) {
            device.clear_block_latch_if_neutral();
        }

        FrameResult { block, event_count: translated.len() as u32 }
    }

    /// Replays `frame` onto the injection endpoint (spec.md §4.1 step 3).
    /// A no-op for ungrabbed devices, which have no endpoints.
    fn emit_to_injection(&mut self, path: &Path, frame: &[evdev::InputEvent]) {
        let Some(device) = self.devices.get_mut(path) else { return };
        let Some(endpoints) = device.endpoints.as_mut() else { return };

        let events = non_sync_events(frame);
        if events.is_empty() {
            return;
        }
        if let Err(err) = endpoints.injection.emit(&events) {
            warn!(target: "inputactions::device", "failed to replay frame onto injection device for {}: {err:#}", device.name);
        }
    }

    /// Forwards `frame` verbatim to the output endpoint (spec.md §4.1
    /// step 6), then brings `virtual_state` in line with `physical`.
    fn forward_to_output(&mut self, path: &Path, frame: &[evdev::InputEvent]) {
        let Some(device) = self.devices.get_mut(path) else { return };
        let Some(endpoints) = device.endpoints.as_mut() else { return };

        let events = non_sync_events(frame);
        if !events.is_empty() {
            if let Err(err) = endpoints.output.emit(&events) {
                warn!(target: "inputactions::device", "failed to forward frame to output device for {}: {err:#}", device.name);
            }
        }
        device.virtual_state.pressed_keys = device.physical.pressed_keys.clone();
        device.virtual_state.touch_points = device.physical.touch_points.clone();
    }

    /// Brings the output endpoint back in line with the real device's
    /// current state in a single frame (spec.md §4.1 step 4): releases
    /// whatever the mirror still holds that the real device doesn't, then
    /// presses/positions whatever the real device currently holds.
    fn restore_output(&mut self, path: &Path) {
        let Some(device) = self.devices.get_mut(path) else { return };
        let Some(endpoints) = device.endpoints.as_mut() else { return };

        let mut events = Vec::new();
        for key in &device.virtual_state.pressed_keys {
            if !device.physical.pressed_keys.contains(key) {
                events.push(evdev::InputEvent::new(evdev::EventType::KEY, *key, 0));
            }
        }
        for slot in device.virtual_state.touch_points.keys() {
            if !device.physical.touch_points.contains_key(slot) {
                events.extend(lift_slot_events(*slot));
            }
        }
        for key in &device.physical.pressed_keys {
            events.push(evdev::InputEvent::new(evdev::EventType::KEY, *key, 1));
        }
        for (slot, point) in &device.physical.touch_points {
            events.extend(touch_point_events(*slot, point));
        }

        if !events.is_empty() {
            if let Err(err) = endpoints.output.emit(&events) {
                warn!(target: "inputactions::device", "failed to restore output device state for {}: {err:#}", device.name);
            }
        }
        device.virtual_state.pressed_keys = device.physical.pressed_keys.clone();
        device.virtual_state.touch_points = device.physical.touch_points.clone();
    }

    /// Lifts every touch point and releases every key the output endpoint
    /// currently mirrors, ignoring the real device's state entirely
    /// (spec.md §4.1 step 5) — this is what defeats libinput's tap
    /// emission on the downstream compositor while a touchpad gesture is
    /// still being recognized.
    fn reset_output(&mut self, path: &Path) {
        let Some(device) = self.devices.get_mut(path) else { return };
        let Some(endpoints) = device.endpoints.as_mut() else { return };

        let mut events = Vec::new();
        for key in &device.virtual_state.pressed_keys {
            events.push(evdev::InputEvent::new(evdev::EventType::KEY, *key, 0));
        }
        for slot in device.virtual_state.touch_points.keys() {
            events.extend(lift_slot_events(*slot));
        }

        if !events.is_empty() {
            if let Err(err) = endpoints.output.emit(&events) {
                warn!(target: "inputactions::device", "failed to reset output device state for {}: {err:#}", device.name);
            }
        }
        device.virtual_state = super::VirtualState::default();
    }

    /// Polls every tracked touchpad for an expired reset timer (spec.md
    /// §4.1 step 5) and resets its output mirror. Call this periodically
    /// from the event loop — the timer fires even if the blocked touchpad
    /// stops sending frames entirely.
    pub fn tick_virtual_device_resets(&mut self) {
        let expired: Vec<PathBuf> = self
            .devices
            .iter()
            .filter(|(_, d)| {
                d.device_type == DeviceType::Touchpad
                    && d.blocked_since.is_some_and(|since| since.elapsed() >= super::VIRTUAL_DEVICE_RESET_TIMEOUT)
            })
            .map(|(path, _)| path.clone())
            .collect();

        for path in expired {
            self.reset_output(&path);
            if let Some(device) = self.devices.get_mut(&path) {
                device.blocked_since = None;
            }
        }
    }

    fn handle_abs_axis(
        &mut self,
        path: &Path,
        axis: evdev::AbsoluteAxisType,
        value: i32,
        translated: &mut Vec<crate::handler::InputEvent>,
    ) {
        use evdev::AbsoluteAxisType as A;
        let Some(device) = self.devices.get_mut(path) else { return };

        match axis {
            A::ABS_MT_SLOT => device.current_slot = value,
            A::ABS_MT_TRACKING_ID => {
                let slot = device.current_slot;
                if value < 0 {
                    device.pending_touch_down.retain(|s| *s != slot);
                    if let Some(point) = device.physical.touch_points.remove(&slot) {
                        translated.push(crate::handler::InputEvent::TouchUp {
                            id: slot,
                            down_timestamp: point.down_timestamp,
                        });
                    }
                } else {
                    let properties = device.properties.clone();
                    device
                        .physical
                        .touch_points
                        .entry(slot)
                        .or_insert_with(|| super::TouchPoint::new(slot, (0.0, 0.0), 0, &properties));
                    if !device.pending_touch_down.contains(&slot) {
                        device.pending_touch_down.push(slot);
                    }
                }
            }
            A::ABS_MT_POSITION_X => {
                let slot = device.current_slot;
                if let Some(point) = device.physical.touch_points.get_mut(&slot) {
                    point.position.0 = f64::from(value);
                }
            }
            A::ABS_MT_POSITION_Y => {
                let slot = device.current_slot;
                if let Some(point) = device.physical.touch_points.get_mut(&slot) {
                    point.position.1 = f64::from(value);
                    let position = point.position;
                    if let Some(at) = device.pending_touch_down.iter().position(|s| *s == slot) {
                        device.pending_touch_down.remove(at);
                        point.initial_position = position;
                        translated.push(crate::handler::InputEvent::TouchDown {
                            id: slot,
                            position,
                            timestamp: point.down_timestamp,
                        });
                    } else {
                        let initial_position = point.initial_position;
                        translated.push(crate::handler::InputEvent::TouchChanged {
                            id: slot,
                            position,
                            initial_position,
                            device_size_mm: device.properties.size(),
                        });
                    }
                }
            }
            A::ABS_MT_PRESSURE => {
                let slot = device.current_slot;
                let properties = device.properties.clone();
                if let Some(point) = device.physical.touch_points.get_mut(&slot) {
                    point.update_pressure(value.max(0) as u32, &properties);
                }
            }
            _ => {}
        }
    }

    /// Drops all handler state and returns every grabbed device to neutral
    /// before releasing it (spec.md §4.1's `reset()`).
    pub fn reset(&mut self) {
        for device in self.devices.values_mut() {
            device.set_blocking(false);
            device.physical = super::PhysicalState::default();
            device.virtual_state = super::VirtualState::default();
            device.current_slot = 0;
            device.pending_touch_down.clear();
        }
        self.emergency_chord_since = None;
        self.suspended = false;
    }

    /// Whether the emergency-release chord has been held long enough to
    /// suspend the pipeline (spec.md §4.1). Callers feed the real
    /// (non-mirrored) key state of every tracked keyboard.
    pub fn update_emergency_release(&mut self, pressed_keys: &[evdev::Key]) -> bool {
        let chord_held = EMERGENCY_RELEASE_CHORD.iter().all(|key| pressed_keys.contains(key));
        if chord_held {
            let since = *self.emergency_chord_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= EMERGENCY_RELEASE_HOLD {
                self.suspended = true;
            }
        } else {
            self.emergency_chord_since = None;
        }
        self.suspended
    }

    /// Whether the pipeline is currently suspended by the emergency
    /// release chord.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Resumes the pipeline after an emergency release (e.g. once the
    /// operator has released the chord and re-armed the daemon).
    pub fn resume(&mut self) {
        self.suspended = false;
        self.emergency_chord_since = None;
    }
}

trait OptionEqExt {
    fn is_none_or_eq(&self, value: DeviceType) -> bool;
}

impl OptionEqExt for Option<DeviceType> {
    fn is_none_or_eq(&self, value: DeviceType) -> bool {
        match self {
            None => true,
            Some(v) => *v == value,
        }
    }
}

/// Strips the trailing `SYN_REPORT` (and any other sync event) out of a
/// frame before re-emitting it — `VirtualDevice::emit` appends its own.
fn non_sync_events(frame: &[evdev::InputEvent]) -> Vec<evdev::InputEvent> {
    frame
        .iter()
        .copied()
        .filter(|event| !matches!(event.kind(), evdev::InputEventKind::Synchronization(_)))
        .collect()
}

fn lift_slot_events(slot: i32) -> [evdev::InputEvent; 2] {
    [
        evdev::InputEvent::new(evdev::EventType::ABSOLUTE, evdev::AbsoluteAxisType::ABS_MT_SLOT.0, slot),
        evdev::InputEvent::new(evdev::EventType::ABSOLUTE, evdev::AbsoluteAxisType::ABS_MT_TRACKING_ID.0, -1),
    ]
}

fn touch_point_events(slot: i32, point: &super::TouchPoint) -> [evdev::InputEvent; 4] {
    [
        evdev::InputEvent::new(evdev::EventType::ABSOLUTE, evdev::AbsoluteAxisType::ABS_MT_SLOT.0, slot),
        evdev::InputEvent::new(evdev::EventType::ABSOLUTE, evdev::AbsoluteAxisType::ABS_MT_TRACKING_ID.0, point.id),
        evdev::InputEvent::new(evdev::EventType::ABSOLUTE, evdev::AbsoluteAxisType::ABS_MT_POSITION_X.0, point.position.0 as i32),
        evdev::InputEvent::new(evdev::EventType::ABSOLUTE, evdev::AbsoluteAxisType::ABS_MT_POSITION_Y.0, point.position.1 as i32),
    ]
}

fn classify_device_type(device: &evdev::Device) -> DeviceType {
    let keys = device.supported_keys();
    let has = |k: evdev::Key| keys.is_some_and(|s| s.contains(k));

    if has(evdev::Key::BTN_TOUCH) && device.supported_absolute_axes().is_some_and(|a| a.contains(evdev::AbsoluteAxisType::ABS_MT_SLOT))
    {
        if has(evdev::Key::BTN_TOOL_PEN) || !has(evdev::Key::BTN_LEFT) {
            DeviceType::Touchscreen
        } else {
            DeviceType::Touchpad
        }
    } else if has(evdev::Key::BTN_LEFT) || has(evdev::Key::BTN_RIGHT) {
        DeviceType::Mouse
    } else {
        DeviceType::Keyboard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layered_properties_matches_device_type_only() {
        let mut supervisor = DeviceSupervisor::new();
        supervisor.set_rules(vec![
            (None, DeviceProperties::default().with_grab(true)),
            (Some(DeviceType::Keyboard), DeviceProperties::default().with_grab(false)),
        ]);

        assert!(!supervisor.layered_properties(DeviceType::Keyboard).grab());
        assert!(supervisor.layered_properties(DeviceType::Mouse).grab());
    }

    #[test]
    fn emergency_release_requires_full_chord() {
        let mut supervisor = DeviceSupervisor::new();
        assert!(!supervisor.update_emergency_release(&[evdev::Key::KEY_BACKSPACE]));
        assert!(!supervisor.is_suspended());
    }

    #[test]
    fn reset_clears_block_latches() {
        let mut supervisor = DeviceSupervisor::new();
        supervisor.devices.insert(
            PathBuf::from("/dev/input/event0"),
            TrackedDevice {
                name: "test".to_owned(),
                system_path: PathBuf::from("/dev/input/event0"),
                device_type: DeviceType::Touchpad,
                properties: DeviceProperties::default(),
                physical: super::super::PhysicalState::default(),
                virtual_state: super::super::VirtualState::default(),
                endpoints: None,
                grab_retry_count: 0,
                current_slot: 0,
                pending_touch_down: Vec::new(),
                block_latch: true,
                blocked_since: None,
            },
        );
        supervisor.reset();
        assert!(!supervisor.devices().next().unwrap().is_blocking());
    }
}
