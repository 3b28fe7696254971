//! Structural fingerprint of a document
//!
//! Cheap counters used to approximate "did the shape of the document change
//! enough that patching is unsafe". The thresholds are tunable and the
//! detector is approximate: a stray `$` in prose moves the math count too.

use crate::constants::render::{MAX_LENGTH_RATIO, MIN_LENGTH_RATIO, PIPE_COUNT_TOLERANCE};

use super::oracle::{count_display_delimiters, count_fence_lines};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub fences: usize,
    pub pipes: usize,
    pub display_math: usize,
    pub len: usize,
}

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        Self {
            fences: count_fence_lines(text),
            pipes: text.matches('|').count(),
            display_math: count_display_delimiters(text),
            len: text.len(),
        }
    }

    /// Whether `self` differs from `previous` enough to require a full render
    pub fn differs_materially(&self, previous: &Fingerprint) -> bool {
        if self.fences != previous.fences {
            return true;
        }
        if self.pipes.abs_diff(previous.pipes) > PIPE_COUNT_TOLERANCE {
            return true;
        }
        if self.display_math != previous.display_math {
            return true;
        }
        if previous.len == 0 {
            return self.len != 0;
        }
        let ratio = self.len as f64 / previous.len as f64;
        !(MIN_LENGTH_RATIO..=MAX_LENGTH_RATIO).contains(&ratio)
    }
}
