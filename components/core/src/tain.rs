// Copyright (c) 2026 the anopa contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `Tain`: a monotonic-plus-wall timestamp comparable with
//! supervisor-emitted timestamps.
//!
//! Wall-clock seconds give a timestamp that's meaningful across
//! process restarts (and comparable with what the supervisor emits);
//! the nanosecond component is padded out from a monotonic clock so
//! that two `Tain`s taken in the same wall-clock second still order
//! correctly within a single run.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// On-disk width of a packed `Tain`: `stamp:tain(12B)`.
pub const ENCODED_LEN: usize = 12;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Tain {
    secs: u64,
    nanos: u32,
}

impl Tain {
    /// Capture the current time. `monotonic_nanos` should be derived
    /// from a shared `Instant` baseline so that timestamps taken
    /// within the same run order correctly even if the wall clock
    /// doesn't advance between them (see `Clock`).
    pub fn new(secs: u64, nanos: u32) -> Self {
        Tain { secs, nanos }
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut buf = [0u8; ENCODED_LEN];
        buf[0..8].copy_from_slice(&self.secs.to_be_bytes());
        buf[8..12].copy_from_slice(&self.nanos.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; ENCODED_LEN]) -> Self {
        let mut secs_bytes = [0u8; 8];
        secs_bytes.copy_from_slice(&buf[0..8]);
        let mut nanos_bytes = [0u8; 4];
        nanos_bytes.copy_from_slice(&buf[8..12]);
        Tain {
            secs: u64::from_be_bytes(secs_bytes),
            nanos: u32::from_be_bytes(nanos_bytes),
        }
    }
}

/// A baseline pairing `SystemTime::now()` with `Instant::now()` at
/// process start, so repeated calls to `now()` give monotonically
/// non-decreasing `Tain`s even across a wall-clock step backwards.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    wall_origin: SystemTime,
    mono_origin: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Clock {
            wall_origin: SystemTime::now(),
            mono_origin: Instant::now(),
        }
    }

    pub fn now(&self) -> Tain {
        let elapsed = self.mono_origin.elapsed();
        let wall = self
            .wall_origin
            .checked_add(elapsed)
            .unwrap_or(self.wall_origin)
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Tain::new(wall.as_secs(), wall.subsec_nanos())
    }

    pub fn elapsed_since(&self, t: &Tain) -> Duration {
        let now = self.now();
        let now_nanos = now.secs as i128 * 1_000_000_000 + now.nanos as i128;
        let then_nanos = t.secs as i128 * 1_000_000_000 + t.nanos as i128;
        let diff = (now_nanos - then_nanos).max(0) as u128;
        Duration::from_nanos(diff as u64)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let t = Tain::new(1_700_000_000, 123_456);
        let bytes = t.to_bytes();
        assert_eq!(Tain::from_bytes(&bytes), t);
    }

    #[test]
    fn ordering_is_monotonic_within_a_run() {
        let clock = Clock::start();
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        let b = clock.now();
        assert!(b >= a);
    }
}
