//! Atomic register for the previous tick boundary

use std::sync::atomic::{AtomicU64, Ordering};

/// Bit pattern marking the register as unset
///
/// A quiet NaN with a payload no clock reading or arithmetic produces.
const UNSET: u64 = 0x7ff8_dead_beef_0001;

/// Millisecond timestamp shared between the tick and GC paths
///
/// The tick path swaps in the new boundary and reads the previous one in a
/// single atomic step, so a concurrent [`AtomicTimestamp::poison`] is seen
/// either by this interval or by the next one, never lost.
#[derive(Debug)]
pub struct AtomicTimestamp {
    bits: AtomicU64,
}

impl AtomicTimestamp {
    pub fn unset() -> Self {
        Self {
            bits: AtomicU64::new(UNSET),
        }
    }

    pub fn new(millis: f64) -> Self {
        Self {
            bits: AtomicU64::new(encode(millis)),
        }
    }

    pub fn load(&self) -> Option<f64> {
        decode(self.bits.load(Ordering::Acquire))
    }

    pub fn store(&self, millis: f64) {
        self.bits.store(encode(millis), Ordering::Release);
    }

    /// Store `millis` and return the previous value
    pub fn swap(&self, millis: f64) -> Option<f64> {
        decode(self.bits.swap(encode(millis), Ordering::AcqRel))
    }

    /// Mark the register as unset
    pub fn poison(&self) {
        self.bits.store(UNSET, Ordering::Release);
    }

    pub fn is_unset(&self) -> bool {
        self.bits.load(Ordering::Acquire) == UNSET
    }
}

impl Default for AtomicTimestamp {
    fn default() -> Self {
        Self::unset()
    }
}

fn encode(millis: f64) -> u64 {
    let bits = millis.to_bits();
    // Never let a real value alias the sentinel
    if bits == UNSET {
        f64::NAN.to_bits()
    } else {
        bits
    }
}

fn decode(bits: u64) -> Option<f64> {
    if bits == UNSET {
        None
    } else {
        Some(f64::from_bits(bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_unset() {
        let ts = AtomicTimestamp::unset();
        assert!(ts.is_unset());
        assert_eq!(ts.load(), None);
    }

    #[test]
    fn test_zero_is_a_valid_timestamp() {
        let ts = AtomicTimestamp::new(0.0);
        assert!(!ts.is_unset());
        assert_eq!(ts.load(), Some(0.0));
    }

    #[test]
    fn test_swap_returns_previous() {
        let ts = AtomicTimestamp::new(10.0);
        assert_eq!(ts.swap(25.0), Some(10.0));
        assert_eq!(ts.load(), Some(25.0));

        ts.poison();
        assert_eq!(ts.swap(30.0), None);
        assert_eq!(ts.load(), Some(30.0));
    }

    #[test]
    fn test_poison_is_never_lost_under_contention() {
        // The last poison must be observed by some swap
        let ts = Arc::new(AtomicTimestamp::new(0.0));
        let poisoner = {
            let ts = ts.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    ts.poison();
                }
            })
        };

        let mut seen_unset = 0u64;
        for i in 0..10_000 {
            if ts.swap(i as f64).is_none() {
                seen_unset += 1;
            }
        }
        poisoner.join().unwrap();
        if ts.swap(0.0).is_none() {
            seen_unset += 1;
        }

        assert!(seen_unset >= 1);
    }
}
