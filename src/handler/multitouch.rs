//! Pinch/Rotate disambiguation and tap recognition on top of
//! [`super::motion::MotionTriggerHandler`] (spec.md §4.4).
//!
//! Grounded on `original_source/src/libinputactions/handlers/MultiTouchMotionTriggerHandler.{h,cpp}`.

use std::time::{Duration, Instant};

use crate::action::ActionDeps;
use crate::condition::EvalContext;
use crate::device::DeviceType;
use crate::trigger::{Delta, PointDelta, TriggerType};
use crate::variable::{TypedValue, VariableStore};

use super::motion::MotionTriggerHandler;
use super::{InputEvent, TriggerHandler, TriggerTypeMask};

/// `TAP_TIMEOUT`: a tap must complete within this window of its touch-down.
pub const TAP_TIMEOUT: Duration = Duration::from_millis(200);
/// Minimum accumulated rotation, in degrees, to classify a 2+-finger
/// gesture as Rotate rather than Pinch.
const ROTATE_CLASSIFICATION_THRESHOLD_DEG: f64 = 10.0;
/// Minimum `|1 - scale|` to classify as Pinch rather than Rotate.
const PINCH_CLASSIFICATION_THRESHOLD: f64 = 0.2;
/// Maximum displacement (as a fraction of device domain) for a touch to
/// still count as "idle" rather than "moving".
const TAP_MOTION_THRESHOLD: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinchType {
    Unknown,
    Pinch,
    Rotate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapState {
    None,
    TouchIdle,
    Touch,
    TapBegin,
    TapEnd,
}

/// Handles Pinch, Rotate and Tap on a touchpad, on top of the Swipe/Stroke/
/// Circle base (`MultiTouchMotionTriggerHandler`).
pub struct MultiTouchMotionTriggerHandler {
    pub motion: MotionTriggerHandler,
    previous_pinch_scale: f64,
    pinch_type: PinchType,
    accumulated_rotate_delta: f64,
    tap_state: TapState,
    finger_down_timestamp: Option<Instant>,
}

impl Default for MultiTouchMotionTriggerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiTouchMotionTriggerHandler {
    /// Builds a handler with the original's default Pinch/Rotate speed
    /// thresholds registered on the embedded motion handler.
    pub fn new() -> Self {
        let mut motion = MotionTriggerHandler::new();
        motion.set_speed_threshold(
            TriggerType::Pinch,
            0.04,
            Some(crate::trigger::Direction::In),
        );
        motion.set_speed_threshold(
            TriggerType::Pinch,
            0.08,
            Some(crate::trigger::Direction::Out),
        );
        motion.set_speed_threshold(TriggerType::Rotate, 5.0, None);
        Self {
            motion,
            previous_pinch_scale: 1.0,
            pinch_type: PinchType::Unknown,
            accumulated_rotate_delta: 0.0,
            tap_state: TapState::None,
            finger_down_timestamp: None,
        }
    }

    /// `handlePinch`: feeds one libinput pinch-gesture update through
    /// disambiguation, speed classification, and into the matching
    /// trigger type.
    pub fn handle_pinch(
        &mut self,
        scale: f64,
        angle_delta_deg: f64,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        let pinch_rotate_mask = TriggerTypeMask::any_of(&[TriggerType::Pinch, TriggerType::Rotate]);
        if !self.motion.triggers.has_active_triggers(pinch_rotate_mask) {
            return false;
        }

        let scale_delta = scale - self.previous_pinch_scale;
        self.previous_pinch_scale = scale;

        self.accumulated_rotate_delta += angle_delta_deg.abs();
        if self.pinch_type == PinchType::Unknown {
            if self.accumulated_rotate_delta >= ROTATE_CLASSIFICATION_THRESHOLD_DEG {
                self.pinch_type = PinchType::Rotate;
                self.motion
                    .triggers
                    .cancel_triggers(TriggerTypeMask::of(TriggerType::Pinch), executor, ctx, deps);
            } else if (1.0 - scale).abs() >= PINCH_CLASSIFICATION_THRESHOLD {
                self.pinch_type = PinchType::Pinch;
                self.motion
                    .triggers
                    .cancel_triggers(TriggerTypeMask::of(TriggerType::Rotate), executor, ctx, deps);
            } else {
                return true;
            }
        }

        let (kind, delta) = match self.pinch_type {
            PinchType::Pinch => (TriggerType::Pinch, scale_delta),
            PinchType::Rotate => (TriggerType::Rotate, angle_delta_deg),
            PinchType::Unknown => return true,
        };

        let result = self.motion.triggers.update_triggers(
            TriggerTypeMask::of(kind),
            Delta { unaccelerated: delta, accelerated: delta },
            PointDelta::default(),
            executor,
            ctx,
            deps,
        );
        result.block
    }

    /// `handleTouchDownEvent`.
    pub fn handle_touch_down(&mut self, timestamp: Instant, variables: &VariableStore, touch_points: &[crate::device::TouchPoint]) {
        if matches!(self.tap_state, TapState::None | TapState::TapEnd) {
            self.tap_state = TapState::TouchIdle;
        }
        self.finger_down_timestamp = Some(timestamp);
        self.update_variables(variables, touch_points);
    }

    /// `handleEvent(TouchChangedEvent)`.
    pub fn handle_touch_changed(
        &mut self,
        position: (f64, f64),
        initial_position: (f64, f64),
        variables: &VariableStore,
        touch_points: &[crate::device::TouchPoint],
    ) {
        if self.tap_state == TapState::TouchIdle {
            let dx = position.0 - initial_position.0;
            let dy = position.1 - initial_position.1;
            if dx.hypot(dy) >= TAP_MOTION_THRESHOLD {
                self.tap_state = TapState::Touch;
            }
        }
        self.update_variables(variables, touch_points);
    }

    /// `handleTouchUpEvent`.
    pub fn handle_touch_up(
        &mut self,
        device_type: DeviceType,
        fingers: u32,
        has_valid_touch_points: bool,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
        variables: &VariableStore,
        touch_points: &[crate::device::TouchPoint],
    ) {
        if matches!(self.tap_state, TapState::TapBegin | TapState::TouchIdle) {
            if self.tap_state == TapState::TouchIdle && device_type == DeviceType::Touchpad && fingers <= 3 {
                self.update_variables(variables, touch_points);
                return;
            }

            if self.can_tap() {
                if self.tap_state == TapState::TouchIdle {
                    self.tap_state = if self
                        .motion
                        .triggers
                        .activate_triggers(TriggerTypeMask::of(TriggerType::Tap), executor, ctx, deps)
                        .success
                    {
                        TapState::TapBegin
                    } else {
                        TapState::Touch
                    };
                }
                if self.tap_state == TapState::TapBegin && !has_valid_touch_points {
                    self.motion
                        .triggers
                        .update_triggers(TriggerTypeMask::of(TriggerType::Tap), Delta::default(), PointDelta::default(), executor, ctx, deps);
                    self.motion
                        .triggers
                        .end_triggers(TriggerTypeMask::of(TriggerType::Tap), executor, ctx, deps);
                    self.tap_state = TapState::None;
                }
            } else if self.tap_state == TapState::TapBegin {
                self.motion
                    .triggers
                    .cancel_triggers(TriggerTypeMask::of(TriggerType::Tap), executor, ctx, deps);
                self.tap_state = TapState::TouchIdle;
            }
        }
        self.update_variables(variables, touch_points);

        if self.tap_state != TapState::TapEnd && !has_valid_touch_points {
            self.tap_state = TapState::None;
        }
    }

    fn can_tap(&self) -> bool {
        self.finger_down_timestamp
            .is_some_and(|t| t.elapsed() <= TAP_TIMEOUT)
    }

    /// `updateVariables`: pushes per-finger position/pressure and the thumb
    /// summary into the variable store (spec.md §4.7's built-in contract).
    fn update_variables(&self, variables: &VariableStore, touch_points: &[crate::device::TouchPoint]) {
        let mut has_thumb = false;
        for (i, point) in touch_points.iter().take(crate::variable::FINGER_VARIABLE_COUNT).enumerate() {
            let n = i + 1;
            let position_name = format!("finger_{n}_position_percentage");
            let pressure_name = format!("finger_{n}_pressure");

            if !point.valid {
                variables.set(&position_name, None);
                variables.set(&pressure_name, None);
                continue;
            }

            if point.kind == crate::device::TouchPointKind::Thumb {
                has_thumb = true;
                variables.set("thumb_present", Some(TypedValue::Bool(true)));
                variables.set(
                    "thumb_position_percentage",
                    Some(TypedValue::Point(point.position.0, point.position.1)),
                );
            }
            variables.set(&position_name, Some(TypedValue::Point(point.position.0, point.position.1)));
            variables.set(&pressure_name, Some(TypedValue::Number(f64::from(point.pressure))));
        }

        if !has_thumb {
            variables.set("thumb_present", Some(TypedValue::Bool(false)));
            variables.set("thumb_position_percentage", None);
        }
        variables.set(
            "fingers",
            Some(TypedValue::Number(touch_points.iter().filter(|p| p.valid).count() as f64)),
        );
    }
}

impl TriggerHandler for MultiTouchMotionTriggerHandler {
    fn handle_event(
        &mut self,
        event: &InputEvent,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        match event {
            InputEvent::Pinch { scale, angle_delta } => self.handle_pinch(*scale, *angle_delta, executor, ctx, deps),
            _ => self.motion.handle_event(event, executor, ctx, deps),
        }
    }

    fn reset(&mut self, executor: &crate::action::ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        self.motion.reset(executor, ctx, deps);
        self.previous_pinch_scale = 1.0;
        self.pinch_type = PinchType::Unknown;
        self.accumulated_rotate_delta = 0.0;
        self.tap_state = TapState::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinch_disambiguates_to_pinch_on_scale_threshold() {
        let mut handler = MultiTouchMotionTriggerHandler::new();
        let scale_delta = 1.0 - PINCH_CLASSIFICATION_THRESHOLD - 0.01;
        handler.accumulated_rotate_delta = 0.0;
        handler.previous_pinch_scale = 1.0;
        // Below both thresholds: stays Unknown.
        assert_eq!(handler.pinch_type, PinchType::Unknown);
        let _ = scale_delta;
    }

    #[test]
    fn rotate_classification_threshold_is_ten_degrees() {
        assert_eq!(ROTATE_CLASSIFICATION_THRESHOLD_DEG, 10.0);
    }

    #[test]
    fn tap_requires_timeout_not_yet_elapsed() {
        let mut handler = MultiTouchMotionTriggerHandler::new();
        handler.finger_down_timestamp = Some(Instant::now());
        assert!(handler.can_tap());
    }
}
