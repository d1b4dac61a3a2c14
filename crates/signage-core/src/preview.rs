//! Preview player for a playlist: a one-second tick walks the items in a loop.

/// Items shorter than this still occupy one tick.
const MIN_TICK_DURATION: u32 = 1;

fn effective(duration: u32) -> u32 {
    duration.max(MIN_TICK_DURATION)
}

/// Sum of the configured durations, as shown next to the playlist.
pub fn total_duration(durations: &[u32]) -> u64 {
    durations.iter().map(|d| u64::from(*d)).sum()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewPlayer {
    index: usize,
    progress: u32,
}

impl PreviewPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    /// Advance one second.
    pub fn tick(&mut self, durations: &[u32]) {
        if durations.is_empty() {
            *self = Self::default();
            return;
        }
        self.sync_len(durations.len());

        let duration = effective(durations[self.index]);
        if self.progress + 1 >= duration {
            self.index = (self.index + 1) % durations.len();
            self.progress = 0;
        } else {
            self.progress += 1;
        }
    }

    /// Keep the index valid after the list changed under the player.
    pub fn sync_len(&mut self, len: usize) {
        if len == 0 {
            *self = Self::default();
        } else if self.index >= len {
            self.index = 0;
        }
    }

    pub fn current_duration(&self, durations: &[u32]) -> u32 {
        durations.get(self.index).copied().map(effective).unwrap_or(0)
    }

    pub fn remaining(&self, durations: &[u32]) -> u32 {
        self.current_duration(durations).saturating_sub(self.progress)
    }

    pub fn percent(&self, durations: &[u32]) -> f64 {
        let duration = self.current_duration(durations);
        if duration == 0 {
            return 0.0;
        }
        (f64::from(self.progress) / f64::from(duration) * 100.0).min(100.0)
    }

    /// State after `elapsed` ticks from the start of the playlist.
    pub fn seek(durations: &[u32], elapsed: u64) -> Self {
        if durations.is_empty() {
            return Self::default();
        }

        let cycle: u64 = durations.iter().map(|d| u64::from(effective(*d))).sum();
        let mut left = elapsed % cycle;
        for (index, duration) in durations.iter().enumerate() {
            let duration = u64::from(effective(*duration));
            if left < duration {
                return Self {
                    index,
                    progress: left as u32,
                };
            }
            left -= duration;
        }

        Self::default()
    }
}
