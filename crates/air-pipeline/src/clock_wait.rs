//! Wall-clock waiting on top of `air_core::clock::OutputClock`. Kept out of
//! `air-core` because it needs real `Instant`/`thread::sleep`.

use std::time::{Duration, Instant};

use air_core::clock::OutputClock;
use air_core::model::SessionFrameIndex;

pub enum WaitOutcome {
    OnTime,
    Late(Duration),
}

pub struct ClockWait {
    session_start: Instant,
}

impl ClockWait {
    pub fn start_now() -> Self {
        Self { session_start: Instant::now() }
    }

    pub fn wait_for_frame(&self, clock: &OutputClock, index: SessionFrameIndex) -> WaitOutcome {
        let deadline = clock.deadline(index);
        let target = self.session_start + deadline;
        let now = Instant::now();
        if target > now {
            std::thread::sleep(target - now);
            WaitOutcome::OnTime
        } else {
            WaitOutcome::Late(now - target)
        }
    }
}
