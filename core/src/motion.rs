//! Motion model and the ground-truth vehicle.
//!
//! The motion model turns a desired move into a realized one. The desired move carries an absolute target
//! heading; the realized heading is sampled around it, and the horizontal length of the move is laid out
//! along the *sampled* heading before positional noise is added. The particle filter's prediction step uses
//! the same noise parameters so that the hypotheses spread the way the real vehicle does.
use crate::{FilterError, Noise, Pose};

use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use std::fmt::{self, Display};

/// Realize a desired move from `current` under `noise`.
///
/// Returns the new pose and the Euclidean length of the realized displacement.
///
/// # Errors
/// Returns [`FilterError::InvalidConfiguration`] if the noise standard deviations are invalid.
pub fn apply_move<R: Rng + ?Sized>(
    current: &Pose,
    desired: &Pose,
    noise: &Noise,
    rng: &mut R,
) -> Result<(Pose, f64), FilterError> {
    noise.validate()?;
    let heading = Normal::new(desired.heading, noise.heading_std)
        .map_err(|e| FilterError::InvalidConfiguration(format!("motion heading noise: {e}")))?
        .sample(rng);
    let position_noise = Normal::new(0.0, noise.position_std)
        .map_err(|e| FilterError::InvalidConfiguration(format!("motion position noise: {e}")))?;

    let horizontal_length = desired.x.hypot(desired.y);
    let dx = heading.cos() * horizontal_length + position_noise.sample(rng);
    let dy = heading.sin() * horizontal_length + position_noise.sample(rng);
    let dz = desired.z + position_noise.sample(rng);

    let moved = Pose::new(current.x + dx, current.y + dy, current.z + dz, heading);
    let length = (dx * dx + dy * dy + dz * dz).sqrt();
    Ok((moved, length))
}

/// Issues mover identifiers. Owned by whoever creates movers.
#[derive(Clone, Debug, Default)]
pub struct MoverIds {
    next: u64,
}
impl MoverIds {
    pub fn new() -> Self {
        Self::default()
    }
    /// Start issuing identifiers at `first`.
    pub fn starting_at(first: u64) -> Self {
        MoverIds { next: first }
    }
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// The true vehicle: its pose and how far it has flown.
#[derive(Clone, Debug, PartialEq)]
pub struct Mover {
    pub id: u64,
    pub pose: Pose,
    pub distance_traveled: f64,
}
impl Display for Mover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mover #{} at {} after {:.2} m",
            self.id, self.pose, self.distance_traveled
        )
    }
}
impl Mover {
    pub fn new(id: u64, pose: Pose) -> Mover {
        Mover {
            id,
            pose,
            distance_traveled: 0.0,
        }
    }

    /// Place a mover at a random starting pose.
    ///
    /// x and y are each drawn from [-100, -90] or [90, 100] with equal probability, z from [50, 60] and
    /// heading from [-pi, pi).
    pub fn spawn<R: Rng + ?Sized>(id: u64, rng: &mut R) -> Mover {
        let side = |rng: &mut R| {
            if rng.random_bool(0.5) {
                rng.random_range(-100.0..=-90.0)
            } else {
                rng.random_range(90.0..=100.0)
            }
        };
        let x = side(rng);
        let y = side(rng);
        let z = rng.random_range(50.0..=60.0);
        let heading = rng.random_range(-PI..PI);
        Mover::new(id, Pose::new(x, y, z, heading))
    }

    /// Execute a desired move with motion noise, accumulating the distance traveled.
    pub fn apply<R: Rng + ?Sized>(
        &mut self,
        desired: &Pose,
        noise: &Noise,
        rng: &mut R,
    ) -> Result<(), FilterError> {
        let (pose, length) = apply_move(&self.pose, desired, noise, rng)?;
        self.pose = pose;
        self.distance_traveled += length;
        Ok(())
    }

    pub fn distance_to(&self, target: &Pose) -> f64 {
        self.pose.distance_to(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn noiseless_move_follows_desired_heading() {
        let mut rng = StdRng::seed_from_u64(0);
        let start = Pose::new(1.0, 1.0, 10.0, 0.3);
        let heading = (-4.0f64).atan2(-3.0);
        let desired = Pose::new(-0.6, -0.8, -0.5, heading);
        let (moved, length) = apply_move(&start, &desired, &Noise::default(), &mut rng).unwrap();
        assert_approx_eq!(moved.x, 0.4, 1e-12);
        assert_approx_eq!(moved.y, 0.2, 1e-12);
        assert_approx_eq!(moved.z, 9.5, 1e-12);
        assert_approx_eq!(moved.heading, heading, 1e-12);
        assert_approx_eq!(length, (1.0f64 + 0.25).sqrt(), 1e-12);
    }

    #[test]
    fn horizontal_length_is_laid_along_sampled_heading() {
        let mut rng = StdRng::seed_from_u64(0);
        // desired xy points along +x but the requested heading is +y
        let desired = Pose::new(2.0, 0.0, 0.0, PI / 2.0);
        let (moved, _) = apply_move(&Pose::default(), &desired, &Noise::default(), &mut rng).unwrap();
        assert_approx_eq!(moved.x, 0.0, 1e-12);
        assert_approx_eq!(moved.y, 2.0, 1e-12);
    }

    #[test]
    fn noisy_heading_is_sampled_around_desired() {
        let mut rng = StdRng::seed_from_u64(11);
        let noise = Noise::new(0.0, 0.2);
        let desired = Pose::new(1.0, 0.0, 0.0, 0.5);
        let trials = 2000;
        let mean_heading: f64 = (0..trials)
            .map(|_| {
                apply_move(&Pose::default(), &desired, &noise, &mut rng)
                    .unwrap()
                    .0
                    .heading
            })
            .sum::<f64>()
            / trials as f64;
        assert_approx_eq!(mean_heading, 0.5, 0.03);
    }

    #[test]
    fn apply_move_rejects_invalid_noise() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = apply_move(
            &Pose::default(),
            &Pose::at(1.0, 0.0, 0.0),
            &Noise::new(0.1, -0.1),
            &mut rng,
        );
        assert!(result.is_err());
    }

    #[test]
    fn mover_accumulates_distance() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut mover = Mover::new(0, Pose::at(0.0, 0.0, 10.0));
        for _ in 0..4 {
            mover.apply(&Pose::new(0.0, 0.0, -1.0, 0.0), &Noise::default(), &mut rng)
                .unwrap();
        }
        assert_approx_eq!(mover.pose.z, 6.0, 1e-12);
        assert_approx_eq!(mover.distance_traveled, 4.0, 1e-12);
        assert_approx_eq!(mover.distance_to(&Pose::default()), 6.0, 1e-12);
    }

    #[test]
    fn spawn_stays_in_start_box() {
        let mut rng = StdRng::seed_from_u64(99);
        for id in 0..200 {
            let mover = Mover::spawn(id, &mut rng);
            assert_eq!(mover.id, id);
            assert_eq!(mover.distance_traveled, 0.0);
            for coord in [mover.pose.x, mover.pose.y] {
                assert!((90.0..=100.0).contains(&coord.abs()), "coordinate {coord}");
            }
            assert!((50.0..=60.0).contains(&mover.pose.z));
            assert!(mover.pose.heading >= -PI && mover.pose.heading < PI);
        }
    }

    #[test]
    fn mover_ids_are_sequential() {
        let mut ids = MoverIds::new();
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        let mut offset = MoverIds::starting_at(10);
        assert_eq!(offset.next_id(), 10);
    }
}
