//! Token bucket speed limit for a single transfer
//!
//! The bucket holds at most one second of tokens. Workers call
//! [`Throttle::acquire`] before writing a chunk and sleep on their own thread
//! until enough tokens have accumulated.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Largest slice taken from the bucket in one step
const SLICE_BYTES: u64 = 16 * 1024;

/// Longest single sleep, so cancellation stays responsive
const MAX_WAIT: Duration = Duration::from_millis(50);

pub struct Throttle {
    state: Option<Mutex<Bucket>>,
}

struct Bucket {
    /// Bytes per second, also the bucket capacity
    rate: u64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.001 {
            self.tokens = (self.tokens + elapsed * self.rate as f64).min(self.rate as f64);
            self.last_refill = now;
        }
    }
}

impl Throttle {
    /// Limit to `bytes_per_second`. Zero means unlimited.
    pub fn new(bytes_per_second: u64) -> Self {
        if bytes_per_second == 0 {
            return Self::unlimited();
        }
        Self {
            state: Some(Mutex::new(Bucket {
                rate: bytes_per_second,
                tokens: bytes_per_second as f64,
                last_refill: Instant::now(),
            })),
        }
    }

    pub fn unlimited() -> Self {
        Self { state: None }
    }

    pub fn from_limit(limit: Option<u64>) -> Self {
        limit.map(Self::new).unwrap_or_else(Self::unlimited)
    }

    pub fn is_unlimited(&self) -> bool {
        self.state.is_none()
    }

    /// Block the calling thread until `bytes` may be written
    pub fn acquire(&self, bytes: u64) {
        let Some(state) = &self.state else {
            return;
        };

        let mut remaining = bytes;
        while remaining > 0 {
            let slice = remaining.min(SLICE_BYTES);
            let wait = {
                let mut bucket = state.lock();
                bucket.refill();
                // Never ask for more than the bucket can hold
                let slice = slice.min(bucket.rate) as f64;
                if bucket.tokens >= slice {
                    bucket.tokens -= slice;
                    remaining -= slice as u64;
                    Duration::ZERO
                } else {
                    let needed = slice - bucket.tokens;
                    Duration::from_secs_f64(needed / bucket.rate as f64).min(MAX_WAIT)
                }
            };

            if wait > Duration::ZERO {
                std::thread::sleep(wait);
            }
        }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            Some(state) => write!(f, "Throttle({} B/s)", state.lock().rate),
            None => write!(f, "Throttle(unlimited)"),
        }
    }
}
