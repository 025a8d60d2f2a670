use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous frame tick, in seconds.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Frame clock producing `FrameTime` snapshots and capping the frame rate.
///
/// Delta time is clamped so a debugger pause or a minimized window does not feed a
/// huge step into the application.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_start: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
    min_frame: Option<Duration>,
}

impl FrameClock {
    /// Creates an uncapped clock with default clamps.
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates an uncapped clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        let now = Instant::now();
        Self {
            last: now,
            frame_start: now,
            frame_index: 0,
            dt_min,
            dt_max,
            min_frame: None,
        }
    }

    /// Caps the frame rate at `fps`. Zero removes the cap.
    pub fn with_max_frame_rate(mut self, fps: u32) -> Self {
        self.set_max_frame_rate(fps);
        self
    }

    pub fn set_max_frame_rate(&mut self, fps: u32) {
        self.min_frame = (fps > 0).then(|| Duration::from_nanos(1_000_000_000 / u64::from(fps)));
    }

    /// Shortest frame the clock allows, if capped.
    pub fn min_frame_duration(&self) -> Option<Duration> {
        self.min_frame
    }

    /// Resets the clock baseline, e.g. after the window is restored.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.last = now;
        self.frame_start = now;
    }

    /// Advances the clock and returns a new `FrameTime`.
    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);

        self.last = now;
        self.frame_start = now;

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }

    /// Time left in the current frame under the cap, measured from the last `tick`.
    pub fn remaining(&self) -> Duration {
        match self.min_frame {
            Some(min) => min.saturating_sub(self.frame_start.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Sleeps out the rest of the frame. Returns how long it slept.
    pub fn pace(&self) -> Duration {
        let wait = self.remaining();
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        wait
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
