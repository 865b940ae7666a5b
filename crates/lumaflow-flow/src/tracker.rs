//! Aging, eviction and weighted aggregation of tracked points.

use glam::Vec2;
use lumaflow_tracking::PyrLKResult;

/// Smallest tracking error used when weighting a point.
///
/// Keeps the weight of a perfectly matched window finite.
pub const MIN_TRACKING_ERROR: f32 = 1.0 / 256.0;

/// Tracking history of one point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointInfo {
    /// Total path length travelled, in pixels.
    pub distance_traveled: f32,
    /// Fields this point has been tracked through.
    pub age: u32,
}

impl PointInfo {
    /// Average speed in pixels per field, zero before the first field.
    pub fn average_speed(&self) -> f32 {
        if self.age == 0 {
            return 0.0;
        }
        self.distance_traveled / self.age as f32
    }
}

/// A feature point followed from field to field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoint {
    /// Location in the decimated field image.
    pub position: Vec2,
    /// Tracking history.
    pub info: PointInfo,
}

impl TrackedPoint {
    /// A freshly discovered point with no history.
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            info: PointInfo::default(),
        }
    }
}

/// Where a point was found in the next image, and how well it matched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// New location.
    pub position: Vec2,
    /// Mean absolute residual over the tracking window.
    pub error: f32,
}

/// Convert LK output into per-point observations, `None` for lost points.
pub fn observations(result: &PyrLKResult) -> Vec<Option<Observation>> {
    result
        .next_pts
        .iter()
        .zip(&result.status)
        .zip(&result.error)
        .map(|((&position, &found), &error)| found.then_some(Observation { position, error }))
        .collect()
}

/// Rules deciding which points survive a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionPolicy {
    /// Points younger than this are always kept and never weighted.
    pub trial_period: u32,
    /// Points this old are always evicted.
    pub max_age: u32,
    /// Points past their trial period must average more than this speed.
    pub min_speed: f32,
}

impl RetentionPolicy {
    /// Whether a point with this history is kept.
    pub fn keeps(&self, info: &PointInfo) -> bool {
        info.age < self.trial_period
            || (info.age < self.max_age && info.average_speed() > self.min_speed)
    }

    /// Aggregation weight of a retained point, `None` if it does not count.
    ///
    /// The weight is `(age - trial_period) / error`. The error is floored at
    /// [`MIN_TRACKING_ERROR`], so a point tracked with zero error still
    /// counts, at 256 times its age weight, rather than being dropped for an
    /// infinite weight. A NaN error never counts.
    pub fn weight(&self, info: &PointInfo, error: f32) -> Option<f32> {
        if info.age <= self.trial_period || error.is_nan() {
            return None;
        }
        let weight = (info.age - self.trial_period) as f32 / error.max(MIN_TRACKING_ERROR);
        (weight.is_finite() && weight > 0.0).then_some(weight)
    }
}

/// What one field of tracking measured.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldMotion {
    /// Weighted mean displacement, `None` when no point qualified.
    pub displacement: Option<Vec2>,
    /// Mean step length over tracked points, `None` when none was tracked.
    pub motion_length: Option<f32>,
    /// Points found in the next image.
    pub tracked: usize,
    /// Points the tracker lost.
    pub lost: usize,
    /// Tracked points dropped by the retention policy.
    pub evicted: usize,
}

/// Advance `points` with one field of observations.
///
/// Lost and evicted points are removed from `points`; survivors are moved to
/// their observed position with their history updated.
pub fn advance_points(
    points: &mut Vec<TrackedPoint>,
    observations: &[Option<Observation>],
    policy: &RetentionPolicy,
) -> FieldMotion {
    let mut motion = FieldMotion::default();
    let mut weighted_sum = Vec2::ZERO;
    let mut total_weight = 0.0f32;
    let mut length_sum = 0.0f32;

    let mut obs = observations.iter();
    points.retain_mut(|point| {
        let Some(observation) = obs.next().copied().flatten() else {
            motion.lost += 1;
            return false;
        };

        let step = observation.position - point.position;
        let length = step.length();
        motion.tracked += 1;
        length_sum += length;

        point.position = observation.position;
        point.info.age += 1;
        point.info.distance_traveled += length;

        if !policy.keeps(&point.info) {
            motion.evicted += 1;
            return false;
        }

        if let Some(weight) = policy.weight(&point.info, observation.error) {
            weighted_sum += step * weight;
            total_weight += weight;
        }
        true
    });

    if total_weight > 0.0 {
        motion.displacement = Some(weighted_sum / total_weight);
    }
    if motion.tracked > 0 {
        motion.motion_length = Some(length_sum / motion.tracked as f32);
    }
    motion
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::FlowSource;
    use approx::assert_relative_eq;

    const POLICY: RetentionPolicy = RetentionPolicy {
        trial_period: 15,
        max_age: 300,
        min_speed: 0.1,
    };

    fn point_at(x: f32, y: f32, age: u32, distance_traveled: f32) -> TrackedPoint {
        TrackedPoint {
            position: Vec2::new(x, y),
            info: PointInfo {
                distance_traveled,
                age,
            },
        }
    }

    fn seen(x: f32, y: f32, error: f32) -> Option<Observation> {
        Some(Observation {
            position: Vec2::new(x, y),
            error,
        })
    }

    #[test]
    fn test_young_points_survive_without_motion() {
        let mut points = vec![point_at(10.0, 10.0, POLICY.trial_period - 2, 0.0)];

        let motion = advance_points(&mut points, &[seen(10.0, 10.0, 1.0)], &POLICY);

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].info.age, POLICY.trial_period - 1);
        assert_eq!(motion.evicted, 0);
        assert_eq!(motion.motion_length, Some(0.0));
    }

    #[test]
    fn test_slow_points_evicted_after_trial() {
        let mut points = vec![point_at(10.0, 10.0, POLICY.trial_period - 1, 0.0)];

        let motion = advance_points(&mut points, &[seen(10.0, 10.0, 1.0)], &POLICY);

        assert!(points.is_empty());
        assert_eq!(motion.evicted, 1);
        assert_eq!(motion.displacement, None);
    }

    #[test]
    fn test_old_points_always_evicted() {
        let policy = RetentionPolicy {
            trial_period: 2,
            max_age: 5,
            min_speed: 0.1,
        };
        let info = PointInfo {
            distance_traveled: 1000.0,
            age: 5,
        };
        assert!(!policy.keeps(&info));
        assert!(!policy.keeps(&PointInfo { age: 6, ..info }));
    }

    #[test]
    fn test_lost_points_dropped() {
        let mut points = vec![
            point_at(1.0, 1.0, 3, 0.0),
            point_at(2.0, 2.0, 3, 0.0),
            point_at(3.0, 3.0, 3, 0.0),
        ];

        let motion = advance_points(&mut points, &[None, seen(2.5, 2.0, 1.0), None], &POLICY);

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].position, Vec2::new(2.5, 2.0));
        assert_relative_eq!(points[0].info.distance_traveled, 0.5);
        assert_eq!(motion.lost, 2);
        assert_eq!(motion.tracked, 1);
        assert_eq!(motion.motion_length, Some(0.5));
    }

    #[test]
    fn test_weighted_displacement_is_convex_combination() {
        let t = POLICY.trial_period;
        let mut points = vec![
            // weight 1
            point_at(10.0, 10.0, t, 10.0),
            // weight 3
            point_at(20.0, 20.0, t + 2, 10.0),
            // still in trial: moves far but does not count
            point_at(30.0, 30.0, 0, 0.0),
        ];

        let motion = advance_points(
            &mut points,
            &[
                seen(12.0, 10.0, 1.0),
                seen(20.0, 22.0, 1.0),
                seen(130.0, 130.0, 1.0),
            ],
            &POLICY,
        );

        let displacement = motion.displacement.unwrap_or_default();
        assert_relative_eq!(displacement.x, 0.5);
        assert_relative_eq!(displacement.y, 1.5);
        assert_eq!(points.len(), 3);

        // motion length averages every tracked point, trial or not
        let expected = (2.0 + 2.0 + 100.0 * 2f32.sqrt()) / 3.0;
        assert_relative_eq!(motion.motion_length.unwrap_or_default(), expected, epsilon = 1e-4);
    }

    #[test]
    fn test_error_weighting() {
        let t = POLICY.trial_period;
        let mut points = vec![point_at(0.0, 0.0, t, 10.0), point_at(0.0, 0.0, t, 10.0)];

        // the well matched point dominates
        let motion = advance_points(
            &mut points,
            &[seen(1.0, 0.0, 1.0), seen(0.0, 1.0, 3.0)],
            &POLICY,
        );

        let displacement = motion.displacement.unwrap_or_default();
        assert_relative_eq!(displacement.x, 0.75, epsilon = 1e-6);
        assert_relative_eq!(displacement.y, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_error_counts() {
        let policy = POLICY;
        let info = PointInfo {
            distance_traveled: 20.0,
            age: policy.trial_period + 1,
        };
        assert_eq!(policy.weight(&info, 0.0), Some(256.0));
        assert_eq!(policy.weight(&info, f32::NAN), None);
        assert_eq!(policy.weight(&info, f32::INFINITY), None);
    }

    #[test]
    fn test_nothing_tracked() {
        let mut points = vec![point_at(1.0, 1.0, 40, 40.0)];
        let motion = advance_points(&mut points, &[None], &POLICY);

        assert!(points.is_empty());
        assert_eq!(motion.displacement, None);
        assert_eq!(motion.motion_length, None);

        let source = FlowSource::new();
        let before = source.snapshot();
        source.accumulate(motion.displacement, motion.motion_length);
        assert_eq!(source.snapshot(), before);
    }

    #[test]
    fn test_constant_velocity_integrates_after_trial() {
        let source = FlowSource::new();
        let mut points = vec![TrackedPoint::new(Vec2::new(20.0, 40.0))];
        let trial = POLICY.trial_period;

        for field in 1..=trial + 5 {
            let before = source.snapshot();
            let next = points[0].position + Vec2::X;
            let motion = advance_points(&mut points, &[seen(next.x, next.y, 0.0)], &POLICY);
            source.accumulate(motion.displacement, motion.motion_length);
            let after = source.snapshot();

            assert_eq!(after.length.wrapping_sub(before.length), 0x10000);
            if field > trial {
                assert_eq!(after.x.wrapping_sub(before.x), 0x10000, "field {field}");
            } else {
                assert_eq!(after.x, before.x, "field {field}");
            }
            assert_eq!(after.y, before.y);
        }
        assert_eq!(points[0].info.age, trial + 5);
    }

    #[test]
    fn test_observations_from_lk() {
        let result = PyrLKResult {
            next_pts: vec![Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0)],
            status: vec![true, false],
            error: vec![0.5, 9.0],
        };

        assert_eq!(observations(&result), vec![seen(1.0, 2.0, 0.5), None]);
    }
}
