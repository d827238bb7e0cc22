use std::time::{Duration, Instant};

/// Trailing debounce: fires once `delay` after the most recent touch.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Restart the quiet period.
    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// `true` exactly once per quiet period that has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_quiet_period() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(350));

        d.touch(start);
        d.touch(start + Duration::from_millis(200));
        assert!(!d.poll(start + Duration::from_millis(400)));
        assert!(d.poll(start + Duration::from_millis(550)));
        assert!(!d.poll(start + Duration::from_millis(900)));
    }
}
