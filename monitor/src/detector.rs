use tracing::debug;

/// Outcome of one detector observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSignal {
    /// True while the counter is at or above the episode threshold.
    pub episode: bool,
    /// Current value of the hysteresis counter.
    pub counter: u32,
}

/// Hysteresis detector over successive brightness samples.
///
/// Each tick the absolute delta to the previous sample is compared against
/// `flash_threshold`: a breach increments the counter, a stable tick
/// decrements it by one instead of clearing it, so a single quiet frame in
/// the middle of a strobe does not reset a building signal. A flash episode
/// is declared while the counter sits at `max_flash_count` or above, which
/// debounces one-off transitions like a cursor blink or a window switch.
pub struct FlashDetector {
    previous: Option<u8>,
    counter: u32,
    flash_threshold: u8,
    max_flash_count: u32,
}

impl FlashDetector {
    pub fn new(flash_threshold: u8, max_flash_count: u32) -> Self {
        Self {
            previous: None,
            counter: 0,
            flash_threshold,
            max_flash_count,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Feed one brightness sample. The very first sample only records the
    /// baseline and never reports an episode.
    pub fn observe(&mut self, current: u8) -> FlashSignal {
        let previous = match self.previous {
            Some(p) => p,
            None => {
                debug!(brightness = current, "first sample, baseline recorded");
                self.previous = Some(current);
                return FlashSignal {
                    episode: false,
                    counter: 0,
                };
            }
        };

        let diff = current.abs_diff(previous);
        if diff > self.flash_threshold {
            self.counter += 1;
        } else {
            self.counter = self.counter.saturating_sub(1);
        }
        self.previous = Some(current);

        let episode = self.counter >= self.max_flash_count;
        debug!(
            brightness = current,
            diff,
            counter = self.counter,
            episode,
            "brightness delta"
        );
        FlashSignal {
            episode,
            counter: self.counter,
        }
    }
}
