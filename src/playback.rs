//! Playback scheduling.
//!
//! Buffers arrive from the network at irregular intervals but must sound
//! back-to-back. The scheduler keeps a single monotonically non-decreasing
//! cursor marking the next free playback slot: each buffer starts at
//! `max(cursor, now)` and advances the cursor by its duration. Buffers in
//! flight form the active set; when it drains, a short debounce keeps the
//! speaking indicator from flickering across a gap between two chunks of
//! the same utterance.
//!
//! All of this is plain state over an injected clock, so the timing
//! properties are testable without an audio device. The engine executes the
//! decisions (sink appends, timers).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::pcm::PlaybackBuffer;

/// How long the active set must stay empty before the assistant is
/// considered done speaking.
pub const SPEAKING_GAP_DEBOUNCE: Duration = Duration::from_millis(200);

/// Monotonic output-clock abstraction. Production counts from engine
/// start; tests inject a fake.
pub trait OutputClock: Send {
    fn now(&self) -> Duration;
}

/// Real clock: elapsed time since creation.
#[derive(Debug)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock for WallClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A scheduling decision for one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub id: u64,
    pub start: Duration,
    pub end: Duration,
}

/// Tracks the cursor, the active buffer set, and the end-of-speech
/// debounce epoch.
#[derive(Debug)]
pub struct PlaybackScheduler<C: OutputClock> {
    clock: C,
    cursor: Duration,
    /// id -> scheduled end time, for every buffer currently sounding or
    /// queued.
    active: HashMap<u64, Duration>,
    next_id: u64,
    /// Bumped whenever the set changes in a way that invalidates a pending
    /// gap timer. A timer firing with a stale epoch is ignored.
    epoch: u64,
}

impl<C: OutputClock> PlaybackScheduler<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            cursor: Duration::ZERO,
            active: HashMap::new(),
            next_id: 0,
            epoch: 0,
        }
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn cursor(&self) -> Duration {
        self.cursor
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Slot a buffer in at the next free instant and add it to the active
    /// set. Also invalidates any pending gap timer so a chunk landing inside
    /// the debounce window keeps the speaking indicator on.
    pub fn schedule(&mut self, buffer: &PlaybackBuffer) -> Scheduled {
        let start = self.cursor.max(self.clock.now());
        let end = start + buffer.duration();
        self.cursor = end;

        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(id, end);
        self.epoch += 1;

        Scheduled { id, start, end }
    }

    /// A buffer finished sounding. If that drained the set, returns the
    /// epoch to arm the gap debounce timer with. Unknown ids (already
    /// cleared by an interruption) are ignored.
    pub fn on_playback_ended(&mut self, id: u64) -> Option<u64> {
        self.active.remove(&id)?;
        if self.active.is_empty() {
            self.epoch += 1;
            Some(self.epoch)
        } else {
            None
        }
    }

    /// The gap debounce fired. True if it is still current and nothing is
    /// sounding, i.e. the assistant really is done speaking.
    pub fn gap_elapsed(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.active.is_empty()
    }

    /// Interruption or teardown: discard every active buffer and rewind the
    /// cursor to zero. The caller stops the audible output.
    pub fn clear(&mut self) {
        self.active.clear();
        self.cursor = Duration::ZERO;
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct FakeClock(Arc<AtomicU64>);

    impl FakeClock {
        fn advance(&self, d: Duration) {
            self.0.fetch_add(d.as_micros() as u64, Ordering::Relaxed);
        }
    }

    impl OutputClock for FakeClock {
        fn now(&self) -> Duration {
            Duration::from_micros(self.0.load(Ordering::Relaxed))
        }
    }

    fn buffer_of(duration: Duration) -> PlaybackBuffer {
        let samples = (duration.as_secs_f64() * 24_000.0) as usize;
        PlaybackBuffer {
            samples: vec![0.0; samples],
            sample_rate: 24_000,
        }
    }

    #[test]
    fn buffers_arriving_faster_than_real_time_schedule_gapless() {
        let clock = FakeClock::default();
        let mut scheduler = PlaybackScheduler::new(clock);
        let d = Duration::from_millis(250);

        let starts: Vec<Duration> = (0..5)
            .map(|_| scheduler.schedule(&buffer_of(d)).start)
            .collect();

        for pair in starts.windows(2) {
            assert_eq!(pair[1], pair[0] + d, "gapless: no gap, no overlap");
        }
        assert_eq!(scheduler.cursor(), d * 5);
        assert_eq!(scheduler.active_count(), 5);
    }

    #[test]
    fn stalled_stream_restarts_at_current_time() {
        let clock = FakeClock::default();
        let mut scheduler = PlaybackScheduler::new(clock.clone());
        let d = Duration::from_millis(100);

        let first = scheduler.schedule(&buffer_of(d));
        assert_eq!(first.start, Duration::ZERO);

        // Playback drained and time moved past the cursor.
        scheduler.on_playback_ended(first.id);
        clock.advance(Duration::from_millis(500));

        let second = scheduler.schedule(&buffer_of(d));
        assert_eq!(second.start, Duration::from_millis(500));
        assert_eq!(scheduler.cursor(), Duration::from_millis(600));
    }

    #[test]
    fn cursor_never_decreases_while_scheduling() {
        let clock = FakeClock::default();
        let mut scheduler = PlaybackScheduler::new(clock.clone());
        let mut previous = scheduler.cursor();
        for i in 0..10 {
            if i % 3 == 0 {
                clock.advance(Duration::from_millis(40));
            }
            scheduler.schedule(&buffer_of(Duration::from_millis(30)));
            assert!(scheduler.cursor() >= previous);
            previous = scheduler.cursor();
        }
    }

    #[test]
    fn clear_empties_set_and_rewinds_cursor() {
        let clock = FakeClock::default();
        let mut scheduler = PlaybackScheduler::new(clock);
        scheduler.schedule(&buffer_of(Duration::from_millis(300)));
        scheduler.schedule(&buffer_of(Duration::from_millis(300)));

        scheduler.clear();
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.cursor(), Duration::ZERO);
    }

    #[test]
    fn gap_timer_armed_only_when_set_drains() {
        let clock = FakeClock::default();
        let mut scheduler = PlaybackScheduler::new(clock);
        let a = scheduler.schedule(&buffer_of(Duration::from_millis(100)));
        let b = scheduler.schedule(&buffer_of(Duration::from_millis(100)));

        assert_eq!(scheduler.on_playback_ended(a.id), None);
        let epoch = scheduler.on_playback_ended(b.id).expect("set drained");
        assert!(scheduler.gap_elapsed(epoch));
    }

    #[test]
    fn chunk_within_debounce_window_invalidates_pending_gap() {
        let clock = FakeClock::default();
        let mut scheduler = PlaybackScheduler::new(clock);
        let a = scheduler.schedule(&buffer_of(Duration::from_millis(100)));
        let epoch = scheduler.on_playback_ended(a.id).expect("set drained");

        // Next chunk lands before the 200 ms debounce fires.
        scheduler.schedule(&buffer_of(Duration::from_millis(100)));
        assert!(!scheduler.gap_elapsed(epoch), "stale timer must be inert");
    }

    #[test]
    fn ended_id_after_clear_is_ignored() {
        let clock = FakeClock::default();
        let mut scheduler = PlaybackScheduler::new(clock);
        let a = scheduler.schedule(&buffer_of(Duration::from_millis(100)));
        scheduler.clear();
        assert_eq!(scheduler.on_playback_ended(a.id), None);
    }
}
