//! Single-point motion gestures: Swipe, Stroke, Circle (spec.md §4.3).
//!
//! Grounded on `original_source/src/libinputactions/handlers/MotionTriggerHandler.{h,cpp}`.

use crate::action::ActionDeps;
use crate::condition::EvalContext;
use crate::trigger::{Delta, Direction, PointDelta, TriggerType};

use super::{TriggerHandler, TriggerResult, TriggerSet, TriggerSpeed, TriggerTypeMask};

const CIRCLE_COASTING_FRICTION: f64 = 0.02;
const PI_2: f64 = std::f64::consts::PI * 2.0;

/// Per-(type, direction) speed threshold (`TriggerSpeedThreshold`).
#[derive(Debug, Clone, Copy)]
struct SpeedThreshold {
    kind: TriggerType,
    threshold: f64,
    /// `None` matches any direction.
    direction: Option<crate::trigger::Direction>,
}

/// Handles Swipe/Stroke/Circle on top of a [`TriggerSet`]
/// (`MotionTriggerHandler`).
pub struct MotionTriggerHandler {
    pub triggers: TriggerSet,

    total_swipe_delta: (f64, f64),
    swipe_deltas: Vec<(f64, f64)>,
    swipe_updates: u32,
    swipe_delta_multiplier: f64,

    is_determining_speed: bool,
    sampled_input_events: u8,
    input_events_to_sample: u8,
    accumulated_absolute_sampled_delta: f64,
    speed: Option<TriggerSpeed>,
    speed_thresholds: Vec<SpeedThreshold>,

    circle_total_delta: f64,
    circle_previous_angle: f64,
    circle_previous_distance: f64,
    circle_filter_delta: f64,
    circle_adaptive_delta: f64,
    circle_is_first_event: bool,

    deltas: Vec<(f64, f64)>,
    motion_threshold_mm: f64,
}

impl Default for MotionTriggerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionTriggerHandler {
    /// Builds a handler with the original's default speed thresholds
    /// (Swipe 20, Rotate 5, Pinch 0.04 in / 0.08 out are registered by the
    /// multitouch subclass; this base class only owns Swipe/Stroke/Circle).
    pub fn new() -> Self {
        Self {
            triggers: TriggerSet::default(),
            total_swipe_delta: (0.0, 0.0),
            swipe_deltas: Vec::new(),
            swipe_updates: 0,
            swipe_delta_multiplier: 1.0,
            is_determining_speed: false,
            sampled_input_events: 0,
            input_events_to_sample: 3,
            accumulated_absolute_sampled_delta: 0.0,
            speed: None,
            speed_thresholds: vec![SpeedThreshold {
                kind: TriggerType::Swipe,
                threshold: 20.0,
                direction: None,
            }],
            circle_total_delta: 0.0,
            circle_previous_angle: 0.0,
            circle_previous_distance: 0.0,
            circle_filter_delta: 0.0,
            circle_adaptive_delta: 0.0,
            circle_is_first_event: true,
            deltas: Vec::new(),
            motion_threshold_mm: 4.0,
        }
    }

    /// Registers (or replaces) a speed threshold for `kind`/`direction`.
    pub fn set_speed_threshold(
        &mut self,
        kind: TriggerType,
        threshold: f64,
        direction: Option<crate::trigger::Direction>,
    ) {
        self.speed_thresholds
            .retain(|t| !(t.kind == kind && t.direction == direction));
        self.speed_thresholds.push(SpeedThreshold { kind, threshold, direction });
    }

    /// Sets the device's physical motion threshold, in millimeters, used to
    /// gate Swipe update emission.
    pub fn set_motion_threshold_mm(&mut self, mm: f64) {
        self.motion_threshold_mm = mm;
    }

    /// Call once a trigger of `kind` activates, to enter the speed-sampling
    /// phase if that trigger declares a speed requirement.
    pub fn on_activating_trigger(&mut self, has_speed: bool) {
        if !self.is_determining_speed && has_speed {
            self.is_determining_speed = true;
        }
    }

    /// `determineSpeed`: accumulates the first `input_events_to_sample`
    /// deltas, then classifies `Fast`/`Slow` once.
    fn determine_speed(&mut self, kind: TriggerType, delta: f64) -> Option<TriggerSpeed> {
        if !self.is_determining_speed {
            return self.speed;
        }

        let threshold = self
            .speed_thresholds
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| t.threshold);
        let Some(threshold) = threshold else {
            log::warn!(target: "inputactions::handler::motion", "no matching speed threshold, assuming fast");
            self.speed = Some(TriggerSpeed::Fast);
            self.is_determining_speed = false;
            return None;
        };

        self.sampled_input_events += 1;
        if self.sampled_input_events != self.input_events_to_sample {
            self.accumulated_absolute_sampled_delta += delta.abs();
            return None;
        }

        self.is_determining_speed = false;
        let average = self.accumulated_absolute_sampled_delta / f64::from(self.input_events_to_sample);
        let speed = if average >= threshold { TriggerSpeed::Fast } else { TriggerSpeed::Slow };
        self.speed = Some(speed);
        Some(speed)
    }

    /// `handleMotion`: feeds one relative-motion event through Circle,
    /// Swipe and Stroke; returns whether the event should be blocked.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_motion(
        &mut self,
        delta: PointDelta,
        is_mouse: bool,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        let single_point_mask =
            TriggerTypeMask::any_of(&[TriggerType::Swipe, TriggerType::Stroke, TriggerType::Circle]);
        if !self.triggers.has_active_triggers(single_point_mask) {
            return false;
        }

        let has_stroke = self.triggers.has_active_triggers(TriggerTypeMask::of(TriggerType::Stroke));
        let has_swipe = self.triggers.has_active_triggers(TriggerTypeMask::of(TriggerType::Swipe));
        let has_circle = self.triggers.has_active_triggers(TriggerTypeMask::of(TriggerType::Circle));

        if has_stroke {
            self.deltas.push(delta.unaccelerated);
        }
        if has_swipe {
            self.swipe_deltas.insert(0, delta.unaccelerated);
        }

        let unaccelerated_hypot = delta.unaccelerated.0.hypot(delta.unaccelerated.1);
        let Some(speed) = self.determine_speed(TriggerType::Swipe, unaccelerated_hypot) else {
            return true;
        };

        let mut block = false;
        let mut updated = false;

        if has_circle {
            block |= self.update_circle(delta, speed, executor, ctx, deps);
            updated = true;
        }

        if has_swipe {
            let motion_threshold = self.motion_threshold_mm;
            let mut total = (0.0, 0.0);
            let mut threshold_reached_at = None;
            for (i, d) in self.swipe_deltas.iter().enumerate() {
                total.0 += d.0;
                total.1 += d.1;
                if total.0.hypot(total.1) >= motion_threshold {
                    threshold_reached_at = Some(i);
                    break;
                }
            }
            let Some(cutoff) = threshold_reached_at else {
                let any_blocking = self.triggers.active_triggers(TriggerTypeMask::of(TriggerType::Swipe)).iter().any(|t| t.block_events);
                return any_blocking;
            };
            self.swipe_deltas.truncate(cutoff + 1);

            let mut total_inverted = total;
            total_inverted.1 = -total_inverted.1;
            let count = self.swipe_deltas.len().max(1) as f64;
            let average = (total_inverted.0 / count, total_inverted.1 / count);

            let direction = Some(direction_from_angle(atan2_deg_360(average)));
            let result = self.triggers.update_triggers_directional(
                TriggerTypeMask::of(TriggerType::Swipe),
                direction,
                Delta {
                    unaccelerated: delta.unaccelerated.0.hypot(delta.unaccelerated.1),
                    accelerated: delta.accelerated.0.hypot(delta.accelerated.1),
                },
                PointDelta {
                    unaccelerated: (
                        delta.unaccelerated.0 * self.swipe_delta_multiplier,
                        delta.unaccelerated.1 * self.swipe_delta_multiplier,
                    ),
                    accelerated: (
                        delta.accelerated.0 * self.swipe_delta_multiplier,
                        delta.accelerated.1 * self.swipe_delta_multiplier,
                    ),
                },
                executor,
                ctx,
                deps,
            );
            block |= result.block;
            updated = true;
            if result.success {
                self.swipe_updates += 1;
            } else if self.swipe_updates > 0 {
                self.triggers.activate_triggers_directional(
                    TriggerTypeMask::of(TriggerType::Swipe),
                    direction,
                    executor,
                    ctx,
                    deps,
                );
                return self.handle_motion(delta, is_mouse, executor, ctx, deps);
            }
        }

        if has_stroke {
            let stroke_delta = if is_mouse {
                delta.accelerated.0.hypot(delta.accelerated.1)
            } else {
                delta.unaccelerated.0.hypot(delta.unaccelerated.1)
            };
            let result = self.triggers.update_triggers(
                TriggerTypeMask::of(TriggerType::Stroke),
                Delta { unaccelerated: stroke_delta, accelerated: stroke_delta },
                PointDelta::default(),
                executor,
                ctx,
                deps,
            );
            block |= result.block;
            updated = true;
        }

        let _ = updated;
        block
    }

    fn update_circle(
        &mut self,
        delta: PointDelta,
        speed: TriggerSpeed,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        let d = delta.unaccelerated;
        let angle = d.1.atan2(d.0);

        let mut angle_delta = angle - self.circle_previous_angle;
        angle_delta -= (angle_delta / PI_2).trunc() * PI_2;
        if angle_delta < 0.0 {
            angle_delta += PI_2;
        }
        if angle_delta > std::f64::consts::PI {
            angle_delta -= PI_2;
        }

        let abs_angle_delta = angle_delta.abs();
        let distance = d.0.hypot(d.1);

        if abs_angle_delta > 0.5 {
            angle_delta = 0.5 * angle_delta.signum();
        }

        let angle_delta_error = (angle_delta - self.circle_filter_delta).powi(2);
        self.circle_filter_delta = (angle_delta + self.circle_filter_delta) / 2.0;

        let min_distance = distance.min(self.circle_previous_distance);
        let distance_factor = (1.0 + min_distance / 10.0).ln();

        let weight = (abs_angle_delta * distance_factor / (1.0 + angle_delta_error * 100.0)).min(1.0);
        self.circle_adaptive_delta = angle_delta * weight + self.circle_adaptive_delta * (1.0 - weight);

        self.circle_previous_angle = angle;
        self.circle_previous_distance = distance;

        if self.circle_is_first_event {
            self.circle_is_first_event = false;
            return self.any_blocking(TriggerType::Circle);
        }

        let cubed_angle_delta = self.circle_adaptive_delta.powi(3) * 10_000.0;
        self.circle_total_delta += cubed_angle_delta;

        if self.circle_total_delta == 0.0 {
            return self.any_blocking(TriggerType::Circle);
        }

        let circle_delta = Delta { unaccelerated: cubed_angle_delta, accelerated: cubed_angle_delta };
        let result = self
            .triggers
            .update_triggers(TriggerTypeMask::of(TriggerType::Circle), circle_delta, PointDelta::default(), executor, ctx, deps);
        let _ = speed;
        result.block
    }

    /// `onCircleCoastingTimerTick`: decays the adaptive filter toward zero
    /// after motion stops. Call from a 30ms interval timer while a Circle
    /// trigger is active.
    pub fn on_circle_coasting_tick(&mut self) -> bool {
        let mut keep_running = true;
        if self.circle_adaptive_delta > CIRCLE_COASTING_FRICTION {
            self.circle_adaptive_delta -= CIRCLE_COASTING_FRICTION;
        } else if self.circle_adaptive_delta < -CIRCLE_COASTING_FRICTION {
            self.circle_adaptive_delta += CIRCLE_COASTING_FRICTION;
        } else {
            self.circle_adaptive_delta = 0.0;
            keep_running = false;
        }
        self.circle_filter_delta = 0.0;
        keep_running
    }

    fn any_blocking(&self, kind: TriggerType) -> bool {
        self.triggers
            .active_triggers(TriggerTypeMask::of(kind))
            .iter()
            .any(|t| t.block_events)
    }

    /// Called when triggers of `types` are ending, so Stroke-bound motion
    /// can be handed off to [`crate::stroke`] matching.
    pub fn on_ending_triggers(&mut self, types: TriggerTypeMask) -> Option<Vec<(f64, f64)>> {
        if self.deltas.is_empty() || !types.contains(TriggerType::Stroke) {
            return None;
        }
        Some(std::mem::take(&mut self.deltas))
    }
}

/// `atan2deg360`: angle in `[0, 360)` with Y inverted so "up" reads as 90°.
fn atan2_deg_360(point: (f64, f64)) -> f64 {
    let degrees = point.1.atan2(point.0).to_degrees();
    if degrees < 0.0 {
        degrees + 360.0
    } else {
        degrees
    }
}

/// Classifies a swipe's smoothed angle (as returned by [`atan2_deg_360`])
/// into one of the four cardinal [`Direction`]s a `Swipe` trigger can
/// require, splitting the circle into four 90°-wide quadrants centered on
/// each axis.
fn direction_from_angle(angle_deg: f64) -> Direction {
    match angle_deg {
        a if (45.0..135.0).contains(&a) => Direction::Up,
        a if (135.0..225.0).contains(&a) => Direction::Left,
        a if (225.0..315.0).contains(&a) => Direction::Down,
        _ => Direction::Right,
    }
}

impl TriggerHandler for MotionTriggerHandler {
    fn handle_event(
        &mut self,
        event: &super::InputEvent,
        executor: &crate::action::ActionExecutor,
        ctx: &EvalContext,
        deps: &ActionDeps,
    ) -> bool {
        match event {
            super::InputEvent::Motion { delta } => self.handle_motion(*delta, false, executor, ctx, deps),
            _ => false,
        }
    }

    fn reset(&mut self, executor: &crate::action::ActionExecutor, ctx: &EvalContext, deps: &ActionDeps) {
        self.triggers.reset(executor, ctx, deps);
        self.speed = None;
        self.is_determining_speed = false;
        self.circle_is_first_event = true;
        self.deltas.clear();
        self.sampled_input_events = 0;
        self.accumulated_absolute_sampled_delta = 0.0;
        self.circle_previous_angle = 0.0;
        self.circle_previous_distance = 0.0;
        self.circle_filter_delta = 0.0;
        self.circle_adaptive_delta = 0.0;
        self.circle_total_delta = 0.0;
        self.swipe_deltas.clear();
        self.swipe_updates = 0;
        self.total_swipe_delta = (0.0, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atan2_deg_360_maps_up_to_90() {
        let angle = atan2_deg_360((0.0, 1.0));
        assert!((angle - 90.0).abs() < 1e-9);
    }

    #[test]
    fn atan2_deg_360_stays_non_negative() {
        let angle = atan2_deg_360((0.0, -1.0));
        assert!((0.0..360.0).contains(&angle));
    }

    #[test]
    fn circle_coasting_tick_decays_to_zero() {
        let mut handler = MotionTriggerHandler::new();
        handler.circle_adaptive_delta = 0.05;
        assert!(handler.on_circle_coasting_tick());
        assert!(handler.circle_adaptive_delta < 0.05);
        // Eventually settles and reports it should stop.
        for _ in 0..10 {
            if !handler.on_circle_coasting_tick() {
                break;
            }
        }
        assert_eq!(handler.circle_adaptive_delta, 0.0);
    }

    #[test]
    fn handle_motion_is_noop_without_active_triggers() {
        let mut handler = MotionTriggerHandler::new();
        let executor = crate::action::ActionExecutor::new();
        let ctx = crate::condition::EvalContext::new(
            std::sync::Arc::new(crate::variable::VariableStore::new()),
            std::sync::Arc::new(crate::condition::NoCommands),
        );
        let deps = super::super::tests::test_deps();
        let blocked = handler.handle_motion(PointDelta::default(), false, &executor, &ctx, &deps);
        assert!(!blocked);
    }
}
