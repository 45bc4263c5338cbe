use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{ interval_at, Instant, Interval, MissedTickBehavior };

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(20);
pub const DEFAULT_CHARS_PER_TICK: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub tick_interval: Duration,
    pub chars_per_tick: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            chars_per_tick: DEFAULT_CHARS_PER_TICK,
        }
    }
}

/// FIFO of characters received but not yet shown.
#[derive(Debug, Default)]
pub struct CharacterQueue {
    chars: VecDeque<char>,
}

impl CharacterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, text: &str) {
        self.chars.extend(text.chars());
    }

    /// Removes up to `max` characters from the front.
    pub fn take(&mut self, max: usize) -> String {
        let n = max.min(self.chars.len());
        self.chars.drain(..n).collect()
    }

    pub fn drain_all(&mut self) -> String {
        self.chars.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// Repeating timer that only exists while started. A stopped timer's
/// `tick` never resolves, so it can sit in a `select!` unconditionally.
#[derive(Debug)]
pub struct PacingTimer {
    period: Duration,
    interval: Option<Interval>,
}

impl PacingTimer {
    pub fn new(period: Duration) -> Self {
        Self { period, interval: None }
    }

    /// No-op when already running. The first tick fires one period from now.
    pub fn start(&mut self) {
        if self.interval.is_some() {
            return;
        }
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
