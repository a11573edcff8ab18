//! Bad-posture verdicts and how long they last.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::pose::PoseEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureThresholds {
    /// Largest downward head tilt, in degrees below the baseline.
    pub max_pitch_drop_deg: i32,
    /// Largest forward lean, in centimetres closer than the baseline.
    pub max_lean_in_cm: f64,
}

impl Default for PostureThresholds {
    fn default() -> Self {
        Self {
            max_pitch_drop_deg: 10,
            max_lean_in_cm: 10.0,
        }
    }
}

/// Bad if the head dropped or the user leaned in past the thresholds.
/// Both comparisons are strict.
pub fn is_bad(
    adjusted: &PoseEstimate,
    distance_cm: f64,
    baseline_distance_cm: f64,
    thresholds: &PostureThresholds,
) -> bool {
    adjusted.pitch < -thresholds.max_pitch_drop_deg
        || baseline_distance_cm - distance_cm > thresholds.max_lean_in_cm
}

/// Side effects for sustained bad posture. Both methods default to no-ops.
pub trait PostureHooks {
    /// Called once per episode, when bad posture first lasts longer than
    /// the sustained threshold.
    fn on_sustained_bad_posture(&mut self, _elapsed: Duration) {}

    /// Called when an episode that reached the sustained threshold ends.
    fn on_posture_restored(&mut self) {}
}

impl PostureHooks for () {}

impl<H: PostureHooks + ?Sized> PostureHooks for Box<H> {
    fn on_sustained_bad_posture(&mut self, elapsed: Duration) {
        (**self).on_sustained_bad_posture(elapsed)
    }

    fn on_posture_restored(&mut self) {
        (**self).on_posture_restored()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

impl PostureHooks for LoggingHooks {
    fn on_sustained_bad_posture(&mut self, elapsed: Duration) {
        log::warn!("Bad posture for {:.1}s", elapsed.as_secs_f32());
    }

    fn on_posture_restored(&mut self) {
        log::info!("Posture restored");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    NotAccumulating,
    Accumulating { since: Instant, sustained_fired: bool },
}

/// Accumulates how long bad posture has lasted without interruption.
#[derive(Debug, Clone)]
pub struct PostureTimer {
    state: TimerState,
    elapsed: Duration,
    sustained_after: Duration,
}

impl PostureTimer {
    pub fn new(sustained_after: Duration) -> Self {
        Self {
            state: TimerState::NotAccumulating,
            elapsed: Duration::ZERO,
            sustained_after,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Current bad-posture duration; zero while posture is good.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Feeds one verdict. Frames must arrive in capture order.
    pub fn update<H: PostureHooks + ?Sized>(
        &mut self,
        bad: bool,
        now: Instant,
        hooks: &mut H,
    ) -> Duration {
        match (self.state, bad) {
            (TimerState::NotAccumulating, true) => {
                self.state = TimerState::Accumulating {
                    since: now,
                    sustained_fired: false,
                };
                self.elapsed = Duration::ZERO;
            }
            (TimerState::Accumulating { since, sustained_fired }, true) => {
                self.elapsed = now.saturating_duration_since(since);

                if !sustained_fired && self.elapsed > self.sustained_after {
                    hooks.on_sustained_bad_posture(self.elapsed);
                    self.state = TimerState::Accumulating {
                        since,
                        sustained_fired: true,
                    };
                }
            }
            (TimerState::Accumulating { sustained_fired, .. }, false) => {
                if sustained_fired {
                    hooks.on_posture_restored();
                }
                self.state = TimerState::NotAccumulating;
                self.elapsed = Duration::ZERO;
            }
            (TimerState::NotAccumulating, false) => {}
        }

        self.elapsed
    }
}

impl Default for PostureTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sustained: Vec<Duration>,
        restored: usize,
    }

    impl PostureHooks for Recorder {
        fn on_sustained_bad_posture(&mut self, elapsed: Duration) {
            self.sustained.push(elapsed);
        }

        fn on_posture_restored(&mut self) {
            self.restored += 1;
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn pitch_threshold_is_strict() {
        let t = PostureThresholds::default();
        assert!(!is_bad(&PoseEstimate::new(-10, 0, 0), 50.0, 50.0, &t));
        assert!(is_bad(&PoseEstimate::new(-11, 0, 0), 50.0, 50.0, &t));
        assert!(!is_bad(&PoseEstimate::new(30, 0, 0), 50.0, 50.0, &t));
    }

    #[test]
    fn lean_threshold_is_strict() {
        let t = PostureThresholds::default();
        let level = PoseEstimate::default();
        assert!(!is_bad(&level, 40.0, 50.0, &t));
        assert!(is_bad(&level, 39.0, 50.0, &t));
        // moving away is never bad
        assert!(!is_bad(&level, 80.0, 50.0, &t));
    }

    #[test]
    fn accumulates_then_resets() {
        let mut timer = PostureTimer::default();
        let t0 = Instant::now();

        assert_eq!(timer.update(true, t0, &mut ()), Duration::ZERO);
        assert_eq!(timer.update(true, t0 + secs(1), &mut ()), secs(1));
        assert_eq!(timer.update(true, t0 + secs(3), &mut ()), secs(3));

        assert_eq!(timer.update(false, t0 + secs(4), &mut ()), Duration::ZERO);
        assert_eq!(timer.state(), TimerState::NotAccumulating);

        // a new episode starts from its own first frame
        timer.update(true, t0 + secs(10), &mut ());
        assert_eq!(timer.update(true, t0 + secs(12), &mut ()), secs(2));
    }

    #[test]
    fn sustained_hook_fires_once_per_episode() {
        let mut timer = PostureTimer::new(secs(15));
        let mut hooks = Recorder::default();
        let t0 = Instant::now();

        for s in [0, 5, 15, 16, 20, 30] {
            timer.update(true, t0 + secs(s), &mut hooks);
        }
        assert_eq!(hooks.sustained, vec![secs(16)]);
        assert_eq!(hooks.restored, 0);

        timer.update(false, t0 + secs(31), &mut hooks);
        assert_eq!(hooks.restored, 1);
    }

    #[test]
    fn short_episode_is_not_restored() {
        let mut timer = PostureTimer::new(secs(15));
        let mut hooks = Recorder::default();
        let t0 = Instant::now();

        timer.update(true, t0, &mut hooks);
        timer.update(true, t0 + secs(5), &mut hooks);
        timer.update(false, t0 + secs(6), &mut hooks);

        assert!(hooks.sustained.is_empty());
        assert_eq!(hooks.restored, 0);
    }

    #[test]
    fn boxed_hooks_forward() {
        let mut hooks: Box<dyn PostureHooks> = Box::new(LoggingHooks);
        let mut timer = PostureTimer::new(Duration::ZERO);
        let t0 = Instant::now();

        timer.update(true, t0, &mut hooks);
        timer.update(true, t0 + secs(1), &mut hooks);
        timer.update(false, t0 + secs(2), &mut hooks);
    }
}
