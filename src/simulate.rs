use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::exercise::Exercise;
use crate::geometry::Detection;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub reps: u32,
    pub exercise: Exercise,
    pub seed: u64,
    pub frame_interval_ms: u64,
    /// Frames spent on each of the two halves of a rep
    pub frames_per_phase: usize,
    /// Gap between the last frame of one rep and the first of the next
    pub rest_ms: u64,
    /// Uniform noise added to both coordinates
    pub jitter: f64,
    pub start_ms: u64,
    pub x: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            reps: 5,
            exercise: Exercise::Squat,
            seed: 42,
            frame_interval_ms: 105,
            frames_per_phase: 10,
            rest_ms: 2500,
            jitter: 0.004,
            start_ms: 0,
            x: 0.5,
        }
    }
}

/// Start and turning heights of a clean rep against a line at mid-screen.
fn rep_heights(exercise: Exercise) -> (f64, f64) {
    match exercise {
        Exercise::Squat => (0.2, 0.8),
        Exercise::BenchPress
        | Exercise::Deadlift
        | Exercise::OverheadPress
        | Exercise::BarbellRow => (0.8, 0.2),
    }
}

/// Generates `reps` clean repetitions separated by rests, in timestamp order.
pub fn generate(config: &SimulationConfig) -> Vec<Detection> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (start_y, turn_y) = rep_heights(config.exercise);
    let steps = config.frames_per_phase.max(2);
    let step_y = (turn_y - start_y) / (steps - 1) as f64;

    let noise = |rng: &mut StdRng| {
        if config.jitter > 0.0 {
            rng.gen_range(-config.jitter..=config.jitter)
        } else {
            0.0
        }
    };

    let mut detections = Vec::with_capacity(config.reps as usize * steps * 2);
    let mut t = config.start_ms;
    for rep in 0..config.reps {
        if rep > 0 {
            t += config.rest_ms;
        }
        let outbound = (0..steps).map(|i| start_y + i as f64 * step_y);
        let inbound = (0..steps).map(|i| turn_y - i as f64 * step_y);
        for (frame, y) in outbound.chain(inbound).enumerate() {
            if frame > 0 {
                t += config.frame_interval_ms;
            }
            let x = config.x + noise(&mut rng);
            let y = y + noise(&mut rng);
            detections.push(Detection::centered_at(x, y, t));
        }
    }
    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn run(config: &SimulationConfig) -> Session {
        let mut session = Session::default();
        session.start_session(config.start_ms);
        let mut overlay = session.overlay().clone();
        overlay.exercise = config.exercise;
        session.set_overlay(overlay).unwrap();

        let detections = generate(config);
        for d in &detections {
            session.add_detection(d, d.timestamp_ms);
        }
        if let Some(last) = detections.last() {
            session.finish(last.timestamp_ms);
        }
        session
    }

    #[test]
    fn test_generate_is_deterministic_per_seed() {
        let config = SimulationConfig::default();
        assert_eq!(generate(&config), generate(&config));

        let other = SimulationConfig {
            seed: 7,
            ..config.clone()
        };
        assert_ne!(generate(&config), generate(&other));
    }

    #[test]
    fn test_generate_shape() {
        let config = SimulationConfig {
            reps: 2,
            jitter: 0.0,
            ..Default::default()
        };
        let detections = generate(&config);
        assert_eq!(detections.len(), 40);
        assert!(detections
            .windows(2)
            .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
        // Second rep begins after the rest gap
        assert_eq!(detections[20].timestamp_ms, 19 * 105 + 2500);
        let bottom = detections[9].to_point();
        assert!((bottom.y - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_every_exercise_is_recognized() {
        for exercise in [
            Exercise::Squat,
            Exercise::BenchPress,
            Exercise::Deadlift,
            Exercise::OverheadPress,
            Exercise::BarbellRow,
        ] {
            let config = SimulationConfig {
                reps: 3,
                exercise,
                start_ms: 1_000,
                ..Default::default()
            };
            let session = run(&config);
            assert_eq!(session.completed_reps().len(), 3, "{exercise}");
        }
    }

    #[test]
    fn test_zero_reps_is_empty() {
        let config = SimulationConfig {
            reps: 0,
            ..Default::default()
        };
        assert!(generate(&config).is_empty());
    }
}
