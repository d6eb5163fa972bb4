//! Stroke construction, the base64 wire format, and template matching
//! (spec.md §4.8).
//!
//! The upstream `Stroke` class itself did not survive `original_source`'s
//! filter (only `StrokeRecorder` did), so the exact resample count and
//! scoring formula below are this crate's own closed-form choice,
//! documented as an Open Question decision in `DESIGN.md`; every invariant
//! spec.md states is honored exactly: unit-square normalization, 4-channel
//! `(x, y, t, alpha)` quadruples, `[-100, 100]` byte quantization, and
//! best-of-templates matching with ties broken by first-in-active-set.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Canonical number of points every `Stroke` is resampled to before
/// comparison. Chosen to be dense enough for `compare`'s point-to-point
/// distance metric to discriminate between common arc/line/zigzag
/// templates while keeping the base64 wire payload small (this crate's own
/// choice; see `DESIGN.md`).
pub const RESAMPLE_POINT_COUNT: usize = 32;

/// Minimum similarity score (spec.md §4.8's `min_matching_score`) for a
/// Stroke comparison to count as a match at all.
pub const MIN_MATCHING_SCORE: f64 = 0.7;

/// One `(x, y, t, alpha)` sample of a normalized stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadruple {
    /// Unit-square x coordinate, in `[0, 1]`.
    pub x: f64,
    /// Unit-square y coordinate, in `[0, 1]`.
    pub y: f64,
    /// Cumulative arc-length fraction since the stroke start, in `[0, 1]`.
    pub t: f64,
    /// Local tangent angle in radians, in `(-pi, pi]`.
    pub alpha: f64,
}

/// A recognized motion gesture: a canonicalized sequence of
/// [`Quadruple`]s (spec.md §3, "Stroke").
#[derive(Debug, Clone, Default)]
pub struct Stroke {
    points: Vec<Quadruple>,
}

impl Stroke {
    /// Builds a `Stroke` from a raw delta stream (spec.md §4.8 steps 1-4):
    /// integrate into a point path, resample to [`RESAMPLE_POINT_COUNT`],
    /// normalize into the unit square preserving aspect ratio, then compute
    /// arc-length fraction and tangent angle per point.
    pub fn from_deltas(deltas: &[(f64, f64)]) -> Self {
        if deltas.is_empty() {
            return Self::default();
        }

        let mut path = Vec::with_capacity(deltas.len() + 1);
        let mut cursor = (0.0, 0.0);
        path.push(cursor);
        for delta in deltas {
            cursor = (cursor.0 + delta.0, cursor.1 + delta.1);
            path.push(cursor);
        }

        let resampled = resample(&path, RESAMPLE_POINT_COUNT);
        let normalized = normalize_unit_square(&resampled);
        let points = compute_quadruples(&normalized);
        Self { points }
    }

    /// Reconstructs a `Stroke` directly from already-computed quadruples
    /// (used when decoding a stored template).
    pub fn from_quadruples(points: Vec<Quadruple>) -> Self {
        Self { points }
    }

    /// The canonical point sequence.
    pub fn points(&self) -> &[Quadruple] {
        &self.points
    }

    /// `min_matching_score()`.
    pub fn min_matching_score() -> f64 {
        MIN_MATCHING_SCORE
    }

    /// Similarity score in `[0, 1]` against `template`, 1 being identical.
    /// Point-for-point (both sequences share [`RESAMPLE_POINT_COUNT`]
    /// samples), combining positional distance and tangent-angle
    /// divergence, each normalized to `[0, 1]` before averaging.
    pub fn compare(&self, template: &Stroke) -> f64 {
        if self.points.is_empty() || template.points.is_empty() {
            return 0.0;
        }
        let n = self.points.len().min(template.points.len());
        if n == 0 {
            return 0.0;
        }

        let mut position_error = 0.0;
        let mut angle_error = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = template.points[i];
            position_error += (a.x - b.x).hypot(a.y - b.y);
            let mut delta_angle = (a.alpha - b.alpha).abs();
            if delta_angle > std::f64::consts::PI {
                delta_angle = 2.0 * std::f64::consts::PI - delta_angle;
            }
            angle_error += delta_angle;
        }
        let n = n as f64;
        // Max possible per-point position error in the unit square is the
        // diagonal, sqrt(2); max angle error is pi.
        let avg_position_error = (position_error / n) / std::f64::consts::SQRT_2;
        let avg_angle_error = (angle_error / n) / std::f64::consts::PI;

        let score = 1.0 - (0.5 * avg_position_error + 0.5 * avg_angle_error);
        score.clamp(0.0, 1.0)
    }

    /// Encodes this stroke to the base64 wire format (spec.md §6): each
    /// `(x, y, t, alpha)` channel quantized to a signed byte in
    /// `[-100, 100]` (alpha scaled from radians by `100 / pi`).
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(self.points.len() * 4);
        for point in &self.points {
            bytes.push(quantize(point.x * 2.0 - 1.0));
            bytes.push(quantize(point.y * 2.0 - 1.0));
            bytes.push(quantize(point.t * 2.0 - 1.0));
            bytes.push(quantize(point.alpha / std::f64::consts::PI));
        }
        BASE64.encode(bytes)
    }

    /// Decodes a base64-encoded quadruple array (spec.md §6). Returns
    /// `None` if the decoded length isn't a multiple of 4.
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = BASE64.decode(encoded).ok()?;
        if bytes.len() % 4 != 0 {
            return None;
        }
        let points = bytes
            .chunks_exact(4)
            .map(|chunk| Quadruple {
                x: (dequantize(chunk[0]) + 1.0) / 2.0,
                y: (dequantize(chunk[1]) + 1.0) / 2.0,
                t: (dequantize(chunk[2]) + 1.0) / 2.0,
                alpha: dequantize(chunk[3]) * std::f64::consts::PI,
            })
            .collect();
        Some(Self { points })
    }
}

fn quantize(unit_value: f64) -> u8 {
    let clamped = unit_value.clamp(-1.0, 1.0) * 100.0;
    (clamped.round() as i8) as u8
}

fn dequantize(byte: u8) -> f64 {
    f64::from(byte as i8) / 100.0
}

/// Resamples `path` to exactly `count` evenly-arc-length-spaced points via
/// linear interpolation, marching along cumulative arc length.
fn resample(path: &[(f64, f64)], count: usize) -> Vec<(f64, f64)> {
    if path.len() < 2 || count < 2 {
        return vec![path.first().copied().unwrap_or((0.0, 0.0)); count];
    }

    let total_length: f64 = path
        .windows(2)
        .map(|w| (w[1].0 - w[0].0).hypot(w[1].1 - w[0].1))
        .sum();
    if total_length == 0.0 {
        return vec![path[0]; count];
    }

    let step = total_length / (count - 1) as f64;
    let mut resampled = Vec::with_capacity(count);
    resampled.push(path[0]);

    let mut segment_index = 0;
    let mut distance_into_segment = 0.0;

    for i in 1..count - 1 {
        let mut target = step * i as f64;
        loop {
            let (a, b) = (path[segment_index], path[segment_index + 1]);
            let segment_length = (b.0 - a.0).hypot(b.1 - a.1);
            let remaining_in_segment = segment_length - distance_into_segment;
            if target <= remaining_in_segment || segment_index + 2 >= path.len() {
                let fraction = if segment_length > 0.0 {
                    (distance_into_segment + target) / segment_length
                } else {
                    1.0
                };
                let fraction = fraction.min(1.0);
                resampled.push((a.0 + (b.0 - a.0) * fraction, a.1 + (b.1 - a.1) * fraction));
                distance_into_segment += target;
                break;
            }
            target -= remaining_in_segment;
            distance_into_segment = 0.0;
            segment_index += 1;
        }
    }

    resampled.push(*path.last().unwrap());
    resampled
}

/// Scales `path` into `[0, 1] x [0, 1]`, preserving aspect ratio by
/// dividing both axes by the larger of the two spans.
fn normalize_unit_square(path: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in path {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let span = (max_x - min_x).max(max_y - min_y).max(f64::EPSILON);
    path.iter()
        .map(|&(x, y)| ((x - min_x) / span, (y - min_y) / span))
        .collect()
}

fn compute_quadruples(path: &[(f64, f64)]) -> Vec<Quadruple> {
    if path.is_empty() {
        return Vec::new();
    }

    let segment_lengths: Vec<f64> = path
        .windows(2)
        .map(|w| (w[1].0 - w[0].0).hypot(w[1].1 - w[0].1))
        .collect();
    let total_length: f64 = segment_lengths.iter().sum();

    let mut quadruples = Vec::with_capacity(path.len());
    let mut accumulated = 0.0;
    for (i, &(x, y)) in path.iter().enumerate() {
        let t = if total_length > 0.0 { accumulated / total_length } else { 0.0 };
        let alpha = tangent_angle(path, i);
        quadruples.push(Quadruple { x, y, t, alpha });
        if i < segment_lengths.len() {
            accumulated += segment_lengths[i];
        }
    }
    quadruples
}

fn tangent_angle(path: &[(f64, f64)], index: usize) -> f64 {
    let prev = if index == 0 { path[index] } else { path[index - 1] };
    let next = if index + 1 < path.len() { path[index + 1] } else { path[index] };
    (next.1 - prev.1).atan2(next.0 - prev.0)
}

/// Picks, among `templates` grouped per-trigger-id, the globally best
/// match above [`Stroke::min_matching_score`] — spec.md §4.8: "the trigger
/// with the globally best score... ends; all others cancel. Ties broken by
/// first in the Active set."
pub fn best_match<'a>(live: &Stroke, candidates: &'a [(String, Vec<Stroke>)]) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for (trigger_id, templates) in candidates {
        for template in templates {
            let score = live.compare(template);
            if score <= Stroke::min_matching_score() {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((trigger_id, score)),
            }
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_resamples_to_requested_count() {
        let deltas = vec![(1.0, 0.0); 10];
        let stroke = Stroke::from_deltas(&deltas);
        assert_eq!(stroke.points().len(), RESAMPLE_POINT_COUNT);
    }

    #[test]
    fn normalization_keeps_points_in_unit_square() {
        let deltas = vec![(3.0, 0.0), (0.0, 1.0), (-3.0, 0.0), (0.0, -1.0)];
        let stroke = Stroke::from_deltas(&deltas);
        for point in stroke.points() {
            assert!((0.0..=1.0).contains(&point.x), "x out of range: {}", point.x);
            assert!((0.0..=1.0).contains(&point.y), "y out of range: {}", point.y);
        }
    }

    #[test]
    fn identical_strokes_score_near_one() {
        let deltas = vec![(1.0, 0.5), (1.0, -0.5), (1.0, 0.5), (1.0, -0.5)];
        let a = Stroke::from_deltas(&deltas);
        let b = Stroke::from_deltas(&deltas);
        assert!(a.compare(&b) > 0.99);
    }

    #[test]
    fn orthogonal_strokes_score_lower_than_identical() {
        let horizontal = Stroke::from_deltas(&vec![(1.0, 0.0); 10]);
        let vertical = Stroke::from_deltas(&vec![(0.0, 1.0); 10]);
        let self_score = horizontal.compare(&horizontal);
        let cross_score = horizontal.compare(&vertical);
        assert!(self_score > cross_score);
    }

    #[test]
    fn encode_decode_round_trips_within_quantization_error() {
        let deltas = vec![(1.0, 0.3), (0.8, -0.2), (1.0, 0.1), (0.5, 0.4)];
        let stroke = Stroke::from_deltas(&deltas);
        let encoded = stroke.encode();
        let decoded = Stroke::decode(&encoded).expect("valid base64 quadruple array");
        assert_eq!(decoded.points().len(), stroke.points().len());
        for (original, round_tripped) in stroke.points().iter().zip(decoded.points()) {
            assert!((original.x - round_tripped.x).abs() <= 0.011);
            assert!((original.y - round_tripped.y).abs() <= 0.011);
        }
    }

    #[test]
    fn decode_rejects_length_not_multiple_of_four() {
        let bad = base64::engine::general_purpose::STANDARD.encode([1, 2, 3]);
        assert!(Stroke::decode(&bad).is_none());
    }

    #[test]
    fn best_match_picks_globally_highest_scoring_trigger() {
        let line = Stroke::from_deltas(&vec![(1.0, 0.0); 10]);
        let candidates = vec![
            ("near-perfect".to_owned(), vec![Stroke::from_deltas(&vec![(1.0, 0.0); 10])]),
            ("orthogonal".to_owned(), vec![Stroke::from_deltas(&vec![(0.0, 1.0); 10])]),
        ];
        assert_eq!(best_match(&line, &candidates), Some("near-perfect"));
    }

    #[test]
    fn best_match_returns_none_below_min_score() {
        let line = Stroke::from_deltas(&vec![(1.0, 0.0); 10]);
        let candidates = vec![("orthogonal".to_owned(), vec![Stroke::from_deltas(&vec![(0.0, 1.0); 10])])];
        assert_eq!(best_match(&line, &candidates), None);
    }
}
