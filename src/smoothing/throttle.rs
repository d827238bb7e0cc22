use std::time::{Duration, Instant};

/// Bounds how often a channel's level is forwarded to the player.
///
/// The first change is forwarded immediately, later ones at most once per
/// interval. A settled value is always forwarded so the final level is never
/// lost to the throttle.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_emit: Option<Instant>,
    last_value: Option<f32>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            last_value: None,
        }
    }

    pub fn offer(&mut self, now: Instant, value: f32, settled: bool) -> Option<f32> {
        if self.last_value == Some(value) {
            return None;
        }
        let due = self
            .last_emit
            .is_none_or(|at| now.saturating_duration_since(at) >= self.interval);
        if !(settled || due) {
            return None;
        }
        self.last_emit = Some(now);
        self.last_value = Some(value);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_edge_then_spaced() {
        let start = Instant::now();
        let mut t = Throttle::new(Duration::from_millis(50));

        assert_eq!(t.offer(start, 0.1, false), Some(0.1));
        assert_eq!(t.offer(start + Duration::from_millis(16), 0.2, false), None);
        assert_eq!(t.offer(start + Duration::from_millis(50), 0.3, false), Some(0.3));
    }

    #[test]
    fn settled_value_always_passes() {
        let start = Instant::now();
        let mut t = Throttle::new(Duration::from_millis(50));

        t.offer(start, 0.1, false);
        assert_eq!(t.offer(start + Duration::from_millis(1), 0.0, true), Some(0.0));
        assert_eq!(t.offer(start + Duration::from_millis(2), 0.0, true), None);
    }
}
