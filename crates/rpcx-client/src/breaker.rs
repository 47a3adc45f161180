use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Ratio-based circuit breaker guarding one endpoint.
///
/// Tracks a rolling window of outcomes; once the window has at least
/// `min_samples` entries and the failure ratio exceeds `threshold`, the
/// breaker opens for `cooldown` before allowing a single trial call through
/// (half-open). A successful trial closes the breaker and clears the window.
pub struct Breaker {
    threshold: f64,
    min_samples: usize,
    cooldown: Duration,
    window: Mutex<Vec<bool>>,
    opened_at: Mutex<Option<Instant>>,
    half_open_in_flight: AtomicUsize,
    generation: AtomicU64,
}

impl Default for Breaker {
    fn default() -> Self {
        Breaker::new(0.95, 100, Duration::from_secs(10))
    }
}

impl Breaker {
    pub fn new(threshold: f64, min_samples: usize, cooldown: Duration) -> Self {
        Breaker {
            threshold,
            min_samples,
            cooldown,
            window: Mutex::new(Vec::with_capacity(min_samples.max(1))),
            opened_at: Mutex::new(None),
            half_open_in_flight: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Whether a call is currently allowed through. Returns `true` exactly
    /// once per cooldown expiry for a half-open trial, then `false` again
    /// until that trial reports back.
    pub fn ready(&self) -> bool {
        let opened_at = *self.opened_at.lock().unwrap();
        match opened_at {
            None => true,
            Some(opened) => {
                if opened.elapsed() < self.cooldown {
                    return false;
                }
                // half-open: allow exactly one trial through at a time.
                self.half_open_in_flight.compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst).is_ok()
            }
        }
    }

    pub fn success(&self) {
        let was_half_open = self.half_open_in_flight.swap(0, Ordering::SeqCst) == 1;
        if was_half_open {
            self.close();
            return;
        }
        let mut window = self.window.lock().unwrap();
        window.push(true);
        self.trim(&mut window);
    }

    pub fn fail(&self) {
        let was_half_open = self.half_open_in_flight.swap(0, Ordering::SeqCst) == 1;
        if was_half_open {
            self.open();
            return;
        }
        let should_open = {
            let mut window = self.window.lock().unwrap();
            window.push(false);
            self.trim(&mut window);
            window.len() >= self.min_samples && self.failure_ratio(&window) > self.threshold
        };
        if should_open {
            self.open();
        }
    }

    fn failure_ratio(&self, window: &[bool]) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        let failures = window.iter().filter(|ok| !**ok).count();
        failures as f64 / window.len() as f64
    }

    fn trim(&self, window: &mut Vec<bool>) {
        let cap = self.min_samples.max(1) * 2;
        if window.len() > cap {
            let drop = window.len() - cap;
            window.drain(0..drop);
        }
    }

    fn open(&self) {
        *self.opened_at.lock().unwrap() = Some(Instant::now());
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        *self.opened_at.lock().unwrap() = None;
        self.window.lock().unwrap().clear();
    }

    pub fn is_open(&self) -> bool {
        self.opened_at.lock().unwrap().is_some() && !self.ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_below_min_samples() {
        let breaker = Breaker::new(0.5, 10, Duration::from_secs(60));
        for _ in 0..9 {
            breaker.fail();
        }
        assert!(breaker.ready());
    }

    #[test]
    fn opens_once_the_failure_ratio_crosses_the_threshold() {
        let breaker = Breaker::new(0.5, 10, Duration::from_secs(60));
        for _ in 0..6 {
            breaker.fail();
        }
        for _ in 0..4 {
            breaker.success();
        }
        assert!(breaker.ready());
        breaker.fail();
        assert!(!breaker.ready());
    }

    #[test]
    fn half_open_trial_failure_reopens_for_another_cooldown() {
        let breaker = Breaker::new(0.1, 2, Duration::from_millis(10));
        breaker.fail();
        breaker.fail();
        assert!(!breaker.ready());
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.ready());
        breaker.fail();
        assert!(!breaker.ready());
    }

    #[test]
    fn half_open_trial_success_closes_the_breaker() {
        let breaker = Breaker::new(0.1, 2, Duration::from_millis(10));
        breaker.fail();
        breaker.fail();
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.ready());
        breaker.success();
        assert!(breaker.ready());
        assert!(!breaker.is_open());
    }
}
