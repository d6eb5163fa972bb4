//! Touchscreen gesture recognition: libinput exposes only raw touch frames
//! for touchscreens, so this handler derives Hold/Pinch/Swipe itself
//! (spec.md §4.4).
//!
//! Grounded on `original_source/src/libinputactions/handlers/TouchscreenTriggerHandler.{h,cpp}`.
//! One instance exists per touchscreen device.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::action::ActionDeps;
use crate::condition::EvalContext;
use crate::trigger::{Delta, PointDelta, TriggerType};

use super::multitouch::MultiTouchMotionTriggerHandler;
use super::{InputEvent, TriggerHandler, TriggerTypeMask};

/// Per-point displacement, in millimeters, required to leave
/// `WaitingForTouchDowns`/enter `MotionOnePointReachedThreshold`.
pub const MOTION_THRESHOLD_MM: f64 = 4.0;
/// How long touches must stay still before `Touch` escalates to `Hold`.
pub const HOLD_TIMEOUT: Duration = Duration::from_millis(200);
/// Settle window after the first touch-down, before recognition begins.
pub const TOUCH_DOWN_TIMEOUT: Duration = Duration::from_millis(50);
/// Settle window after the last touch-up, before a Tap can be recognized.
pub const TOUCH_UP_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    None,
    WaitingForTouchDowns,
    WaitingForTouchUps,
    Touch,
    MotionOnePointReachedThreshold,
    Motion,
    Hold,
    Pinch,
    Swipe,
}

/// One active touch point tracked purely for gesture-geometry purposes
/// (distinct from [`crate::device::TouchPoint`], which tracks kernel slot
/// state).
#[derive(Debug, Clone, Copy)]
struct TrackedPoint {
    initial_position: (f64, f64),
    position: (f64, f64),
}

/// Recognizes Hold, Pinch, Rotate, single-point Motion and Tap on a
/// touchscreen, on top of the Pinch/Tap base (`TouchscreenTriggerHandler`).
pub struct TouchscreenTriggerHandler {
    pub multitouch: MultiTouchMotionTriggerHandler,
    state: State,
    points: BTreeMap<i32, TrackedPoint>,
    first_touch_down_at: Option<Instant>,
    last_touch_up_at: Option<Instant>,
    last_motion_at: Option<Instant>,
    block: bool,
}

impl Default for TouchscreenTriggerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl TouchscreenTriggerHandler {
    /// Builds a handler in the `None` state with the block-first policy
    /// (events are blocked until a gesture recognizes and says otherwise).
    pub fn new() -> Self {
        Self {
            multitouch: MultiTouchMotionTriggerHandler::new(),
            state: State::None,
            points: BTreeMap::new(),
            first_touch_down_at: None,
            last_touch_up_at: None,
            last_motion_at: None,
            block: true,
        }
    }

    fn set_state(&mut self, state: State) {
        log::debug!(target: "inputactions::handler::touchscreen", "state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// `touchDown`.
    pub fn touch_down(&mut self, id: i32, position: (f64, f64)) -> bool {
        self.points.insert(id, TrackedPoint { initial_position: position, position });
        if self.state == State::None {
            self.first_touch_down_at = Some(Instant::now());
            self.set_state(State::WaitingForTouchDowns);
        }
        self.block
    }

    /// `touchMotion`.
    pub fn touch_motion(&mut self, id: i32, position: (f64, f64), device_size_mm: (f64, f64)) -> bool {
        if let Some(point) = self.points.get_mut(&id) {
            point.position = position;
        }
        self.last_motion_at = Some(Instant::now());

        match self.state {
            State::WaitingForTouchDowns | State::Touch => {
                if self.any_point_exceeds_threshold(device_size_mm) {
                    self.set_state(State::MotionOnePointReachedThreshold);
                }
            }
            State::MotionOnePointReachedThreshold => {
                if self.all_points_exceed_threshold(device_size_mm) {
                    self.set_state(State::Motion);
                }
            }
            _ => {}
        }
        self.block
    }

    /// `touchUp`.
    pub fn touch_up(&mut self, id: i32) -> bool {
        self.points.remove(&id);
        if self.points.is_empty() {
            self.last_touch_up_at = Some(Instant::now());
            self.set_state(State::WaitingForTouchUps);
        }
        self.block
    }

    /// `touchCancel`.
    pub fn touch_cancel(&mut self, executor: &crate::action::ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) -> bool {
        self.points.clear();
        self.multitouch.motion.triggers.reset(executor, ctx, deps);
        self.set_state(State::None);
        true
    }

    /// `touchFrame`: advances settle timers and performs the
    /// geometry-based Swipe/Pinch split once `Motion` is reached; drives the
    /// `Touch -> Hold` idle timeout.
    pub fn touch_frame(
        &mut self,
        device_size_mm: (f64, f64),
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        match self.state {
            State::WaitingForTouchDowns => {
                if self
                    .first_touch_down_at
                    .is_some_and(|t| t.elapsed() >= TOUCH_DOWN_TIMEOUT)
                {
                    self.set_state(State::Touch);
                }
            }
            State::Touch => {
                if self.last_motion_at.map_or(true, |t| t.elapsed() >= HOLD_TIMEOUT) {
                    self.set_state(State::Hold);
                    self.multitouch
                        .motion
                        .triggers
                        .activate_triggers(TriggerTypeMask::of(TriggerType::Hover), executor, ctx, deps);
                }
            }
            State::Motion => {
                self.begin_swipe_or_pinch(device_size_mm, executor, ctx, deps);
            }
            State::WaitingForTouchUps => {
                if self.last_touch_up_at.is_some_and(|t| t.elapsed() >= TOUCH_UP_TIMEOUT) {
                    self.set_state(State::None);
                }
            }
            _ => {}
        }
        self.block
    }

    fn any_point_exceeds_threshold(&self, device_size_mm: (f64, f64)) -> bool {
        self.points.values().any(|p| self.displacement_mm(p, device_size_mm) >= MOTION_THRESHOLD_MM)
    }

    fn all_points_exceed_threshold(&self, device_size_mm: (f64, f64)) -> bool {
        !self.points.is_empty()
            && self.points.values().all(|p| self.displacement_mm(p, device_size_mm) >= MOTION_THRESHOLD_MM)
    }

    fn displacement_mm(&self, point: &TrackedPoint, device_size_mm: (f64, f64)) -> f64 {
        let dx = (point.position.0 - point.initial_position.0) * device_size_mm.0;
        let dy = (point.position.1 - point.initial_position.1) * device_size_mm.1;
        dx.hypot(dy)
    }

    fn begin_swipe_or_pinch(
        &mut self,
        device_size_mm: (f64, f64),
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) {
        let deltas: Vec<(f64, f64)> = self
            .points
            .values()
            .map(|p| {
                (
                    (p.position.0 - p.initial_position.0) * device_size_mm.0,
                    (p.position.1 - p.initial_position.1) * device_size_mm.1,
                )
            })
            .collect();
        if deltas.is_empty() {
            return;
        }

        let octants: Vec<u32> = deltas.iter().map(|d| direction_from_point(*d)).collect();
        let first = octants[0];
        let all_same = octants.iter().all(|o| same_directions(*o, first));

        if all_same {
            self.set_state(State::Swipe);
            self.multitouch
                .motion
                .triggers
                .activate_triggers(TriggerTypeMask::of(TriggerType::Swipe), executor, ctx, deps);
            let avg = average(&deltas);
            self.multitouch.motion.triggers.update_triggers(
                TriggerTypeMask::of(TriggerType::Swipe),
                Delta { unaccelerated: avg.0.hypot(avg.1), accelerated: avg.0.hypot(avg.1) },
                PointDelta { unaccelerated: avg, accelerated: avg },
                executor,
                ctx,
                deps,
            );
        } else {
            self.set_state(State::Pinch);
            let (angle, distance) = self.pinch_info();
            let mask = TriggerTypeMask::any_of(&[TriggerType::Pinch, TriggerType::Rotate]);
            self.multitouch.motion.triggers.activate_triggers(mask, executor, ctx, deps);
            let vector = (distance * angle.cos(), distance * angle.sin());
            self.multitouch.motion.triggers.update_triggers(
                mask,
                Delta { unaccelerated: distance, accelerated: distance },
                PointDelta { unaccelerated: vector, accelerated: vector },
                executor,
                ctx,
                deps,
            );
        }
    }

    /// `pinchInfo`: angle and distance between the first two touch points.
    fn pinch_info(&self) -> (f64, f64) {
        let mut it = self.points.values();
        let Some(a) = it.next() else { return (0.0, 0.0) };
        let Some(b) = it.next() else { return (0.0, 0.0) };
        let dx = b.position.0 - a.position.0;
        let dy = b.position.1 - a.position.1;
        (dy.atan2(dx), dx.hypot(dy))
    }
}

fn average(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let sum = points.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
    (sum.0 / n, sum.1 / n)
}

/// `directionFromPoint`: classifies a delta vector into one of 8 compass
/// octants, as a single set bit (so adjacency is a cheap bitwise check).
fn direction_from_point(point: (f64, f64)) -> u32 {
    let (x, y) = point;
    if x.abs() < 2.0 && y.abs() < 2.0 {
        return 0;
    }
    let angle = y.atan2(x).to_degrees();
    let angle = if angle < 0.0 { angle + 360.0 } else { angle };
    let octant = ((angle + 22.5) / 45.0).floor() as u32 % 8;
    1 << octant
}

/// `sameDirections`: two octant masks are "the same" if they overlap, are
/// 1-bit neighbours, or wrap between bit 7 and bit 0.
fn same_directions(a: u32, b: u32) -> bool {
    if a == 0 || b == 0 {
        return true;
    }
    if a & b != 0 {
        return true;
    }
    let rotated_left = (a << 1 | a >> 7) & 0xFF;
    let rotated_right = (a >> 1 | a << 7) & 0xFF;
    (rotated_left & b != 0) || (rotated_right & b != 0)
}

impl TriggerHandler for TouchscreenTriggerHandler {
    fn handle_event(
        &mut self,
        event: &InputEvent,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        match event {
            InputEvent::TouchDown { id, position, .. } => self.touch_down(*id, *position),
            InputEvent::TouchChanged { id, position, device_size_mm, .. } => self.touch_motion(*id, *position, *device_size_mm),
            InputEvent::TouchUp { id, .. } => self.touch_up(*id),
            InputEvent::TouchCancel => self.touch_cancel(executor, ctx, deps),
            _ => false,
        }
    }

    fn reset(&mut self, executor: &crate::action::ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        self.multitouch.reset(executor, ctx, deps);
        self.points.clear();
        self.set_state(State::None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_from_point_classifies_up_as_octant() {
        let up = direction_from_point((0.0, -10.0));
        assert_ne!(up, 0);
    }

    #[test]
    fn small_delta_has_no_direction() {
        assert_eq!(direction_from_point((0.5, 0.5)), 0);
    }

    #[test]
    fn same_directions_overlapping_masks() {
        assert!(same_directions(0b0001, 0b0001));
    }

    #[test]
    fn same_directions_wraps_bit7_to_bit0() {
        assert!(same_directions(1 << 7, 1 << 0));
    }

    #[test]
    fn same_directions_rejects_opposite_octants() {
        assert!(!same_directions(1 << 0, 1 << 4));
    }

    #[test]
    fn touch_down_enters_waiting_state() {
        let mut handler = TouchscreenTriggerHandler::new();
        handler.touch_down(0, (0.5, 0.5));
        assert_eq!(handler.state, State::WaitingForTouchDowns);
    }
}
