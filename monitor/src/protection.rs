use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::detector::FlashSignal;
use crate::overlay::OverlaySink;

/// Shield state. The recovery deadline only exists while engaged; returning
/// to `Disengaged` drops it with the variant.
#[derive(Debug, Clone, Copy)]
enum ProtectionState {
    Disengaged,
    Engaged { recovery_deadline: Instant },
}

/// Drives overlay visibility from the detector's output.
///
/// Engages the shield when a flash episode is reported and lifts it once the
/// scene has been quiet for the full recovery window. While flashing
/// persists the deadline keeps being pushed forward, so protection never
/// lapses mid-episode.
pub struct ProtectionController {
    state: ProtectionState,
    recovery: Duration,
}

impl ProtectionController {
    pub fn new(recovery: Duration) -> Self {
        Self {
            state: ProtectionState::Disengaged,
            recovery,
        }
    }

    pub fn is_engaged(&self) -> bool {
        matches!(self.state, ProtectionState::Engaged { .. })
    }

    /// Advance the state machine by one tick.
    ///
    /// Engaging only fires from `Disengaged`, so an episode reported while
    /// the shield is already up never re-issues the show command or resets
    /// the window spuriously. Overlay commands are fire-and-forget.
    pub fn observe(&mut self, signal: &FlashSignal, sink: &mut impl OverlaySink) {
        match self.state {
            ProtectionState::Disengaged => {
                if signal.episode {
                    info!(counter = signal.counter, "flash episode detected, engaging shield");
                    sink.set_visible(true);
                    self.state = ProtectionState::Engaged {
                        recovery_deadline: Instant::now() + self.recovery,
                    };
                }
            }
            ProtectionState::Engaged { recovery_deadline } => {
                if signal.counter > 0 {
                    // still flashing, push the deadline forward
                    self.state = ProtectionState::Engaged {
                        recovery_deadline: Instant::now() + self.recovery,
                    };
                } else if Instant::now() >= recovery_deadline {
                    info!("flashing subsided, disengaging shield");
                    sink.set_visible(false);
                    self.state = ProtectionState::Disengaged;
                }
            }
        }
    }

    /// Drop the shield immediately, ignoring the recovery timer.
    ///
    /// Backs the frontend's suppress control; detection keeps running and
    /// may re-engage on the next episode. No-op when already disengaged.
    pub fn force_disengage(&mut self, sink: &mut impl OverlaySink) {
        if self.is_engaged() {
            info!("shield suppressed");
            sink.set_visible(false);
            self.state = ProtectionState::Disengaged;
        }
    }
}
