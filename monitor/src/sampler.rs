use std::time::Duration;

use flash_shield_common::config::Config;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::capture::FrameSource;
use crate::detector::FlashDetector;
use crate::luma;
use crate::overlay::OverlaySink;
use crate::protection::ProtectionController;

/// Frontend controls that steer the loop without stopping the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Drop the shield now; sampling continues and may re-engage.
    Suppress,
}

/// The cooperative sampling loop: one tick grabs a frame, reduces it to a
/// brightness sample, advances the detector and the protection state
/// machine, and publishes the status readout. Ticks never overlap; the only
/// suspension point is the wait between them.
pub struct SampleLoop<F, O> {
    source: F,
    sink: O,
    detector: FlashDetector,
    controller: ProtectionController,
    interval: Duration,
    retry_backoff: Duration,
    ticks: u64,
    consecutive_failures: u32,
}

impl<F: FrameSource, O: OverlaySink> SampleLoop<F, O> {
    pub fn new(source: F, sink: O, config: &Config) -> Self {
        Self {
            source,
            sink,
            detector: FlashDetector::new(
                config.detector.flash_threshold,
                config.detector.max_flash_count,
            ),
            controller: ProtectionController::new(Duration::from_secs_f64(
                config.protection.recovery_secs,
            )),
            interval: Duration::from_millis(config.sampling.interval_ms),
            retry_backoff: Duration::from_millis(config.sampling.retry_backoff_ms),
            ticks: 0,
            consecutive_failures: 0,
        }
    }

    /// Process one sample and return the delay before the next tick.
    ///
    /// A failed grab skips analysis for this tick only and switches to the
    /// retry backoff; detector and protection state are left untouched.
    fn tick(&mut self) -> Duration {
        let frame = match self.source.grab() {
            Ok(frame) => frame,
            Err(e) => {
                if self.consecutive_failures == 0 {
                    warn!(error = %e, "frame capture failed, skipping tick");
                } else {
                    debug!(
                        error = %e,
                        failures = self.consecutive_failures + 1,
                        "frame capture still failing"
                    );
                }
                self.consecutive_failures += 1;
                return self.retry_backoff;
            }
        };
        if self.consecutive_failures > 0 {
            info!(failures = self.consecutive_failures, "frame capture recovered");
            self.consecutive_failures = 0;
        }

        let brightness = luma::mean_brightness(&frame);
        let signal = self.detector.observe(brightness);
        self.controller.observe(&signal, &mut self.sink);
        self.sink.set_status_text(&format!(
            "Brightness: {brightness}\nFlashes: {}\nProtected: {}",
            signal.counter,
            self.controller.is_engaged()
        ));

        self.ticks += 1;
        if self.ticks % 500 == 0 {
            debug!(ticks = self.ticks, brightness, counter = signal.counter, "sampling");
        }
        self.interval
    }

    /// Run until `shutdown` flips true (or its sender goes away).
    ///
    /// The stop is honored between ticks, never mid-tick, so a pending
    /// overlay command is always delivered before the loop returns. If the
    /// shield is up when the loop stops it is lowered on the way out, so the
    /// user is never left behind an opaque window.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        mut controls: mpsc::UnboundedReceiver<ControlCommand>,
    ) {
        'ticks: loop {
            if *shutdown.borrow() {
                break;
            }
            let delay = self.tick();
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break 'ticks;
                        }
                    }
                    Some(command) = controls.recv() => match command {
                        ControlCommand::Suppress => {
                            self.controller.force_disengage(&mut self.sink);
                        }
                    },
                }
            }
        }

        self.controller.force_disengage(&mut self.sink);
        info!(ticks = self.ticks, "sample loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use crate::overlay::{OverlayCommand, OverlaySink};
    use flash_shield_common::config::Config;
    use flash_shield_common::frame::{ChannelOrder, Frame};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays a scripted sequence of grab results, then repeats the last
    /// frame forever.
    struct ScriptedSource {
        script: VecDeque<Result<Frame, CaptureError>>,
        last: Option<Frame>,
        grabs: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Frame, CaptureError>>) -> (Self, Arc<AtomicUsize>) {
            let grabs = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    script: script.into(),
                    last: None,
                    grabs: Arc::clone(&grabs),
                },
                grabs,
            )
        }
    }

    impl FrameSource for ScriptedSource {
        fn grab(&mut self) -> Result<Frame, CaptureError> {
            self.grabs.fetch_add(1, Ordering::Relaxed);
            match self.script.pop_front() {
                Some(Ok(frame)) => {
                    self.last = Some(frame.clone());
                    Ok(frame)
                }
                Some(Err(e)) => Err(e),
                None => match &self.last {
                    Some(frame) => Ok(frame.clone()),
                    None => Err(CaptureError::Capture("script exhausted".into())),
                },
            }
        }
    }

    /// Shared recording sink so tests can inspect commands while the loop
    /// owns the other handle.
    #[derive(Clone, Default)]
    struct SharedSink {
        commands: Arc<Mutex<Vec<OverlayCommand>>>,
    }

    impl SharedSink {
        fn commands(&self) -> Vec<OverlayCommand> {
            self.commands.lock().unwrap().clone()
        }

        fn visibility(&self) -> Vec<bool> {
            self.commands()
                .into_iter()
                .filter_map(|c| match c {
                    OverlayCommand::SetVisible(v) => Some(v),
                    _ => None,
                })
                .collect()
        }
    }

    impl OverlaySink for SharedSink {
        fn set_visible(&mut self, opaque: bool) {
            self.commands
                .lock()
                .unwrap()
                .push(OverlayCommand::SetVisible(opaque));
        }

        fn set_status_text(&mut self, text: &str) {
            self.commands
                .lock()
                .unwrap()
                .push(OverlayCommand::SetStatus(text.to_string()));
        }
    }

    /// 1x1 gray frame. Truncation can land the measured brightness one unit
    /// below `level`, but the shift is the same for every frame, so the
    /// deltas the detector sees match the scripted levels.
    fn frame(level: u8) -> Frame {
        Frame::from_raw(vec![level, level, level], 1, 1, ChannelOrder::Rgb, 0).unwrap()
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.sampling.interval_ms = 20;
        config.sampling.retry_backoff_ms = 100;
        config.detector.flash_threshold = 2;
        config.detector.max_flash_count = 2;
        config.protection.recovery_secs = 2.0;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn successful_tick_publishes_status_and_uses_interval() {
        let (source, _) = ScriptedSource::new(vec![Ok(frame(100))]);
        let sink = SharedSink::default();
        let mut sample_loop = SampleLoop::new(source, sink.clone(), &test_config());

        let delay = sample_loop.tick();

        assert_eq!(delay, Duration::from_millis(20));
        let commands = sink.commands();
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            &commands[0],
            OverlayCommand::SetStatus(text) if text.starts_with("Brightness: ") && text.contains("Protected: false")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_grab_skips_tick_and_backs_off() {
        let (source, _) = ScriptedSource::new(vec![
            Err(CaptureError::Capture("device busy".into())),
            Ok(frame(100)),
        ]);
        let sink = SharedSink::default();
        let mut sample_loop = SampleLoop::new(source, sink.clone(), &test_config());

        let delay = sample_loop.tick();
        assert_eq!(delay, Duration::from_millis(100));
        assert!(sink.commands().is_empty(), "failed tick publishes nothing");

        let delay = sample_loop.tick();
        assert_eq!(delay, Duration::from_millis(20));
        assert_eq!(sink.commands().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn strobe_engages_and_quiet_recovery_disengages() {
        // steady baseline, two breaches, then quiet until recovery
        let script = vec![
            Ok(frame(100)),
            Ok(frame(100)),
            Ok(frame(150)),
            Ok(frame(100)),
        ];
        let (source, _) = ScriptedSource::new(script);
        let sink = SharedSink::default();
        let mut sample_loop = SampleLoop::new(source, sink.clone(), &test_config());

        for _ in 0..4 {
            sample_loop.tick();
        }
        assert_eq!(sink.visibility(), vec![true], "second breach engages");

        // scripted frames repeat 100 from here on: counter decays to zero,
        // then the recovery window must elapse
        sample_loop.tick();
        sample_loop.tick();
        tokio::time::advance(Duration::from_secs(2)).await;
        sample_loop.tick();

        assert_eq!(sink.visibility(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_spike_never_engages() {
        let script = vec![Ok(frame(100)), Ok(frame(150))];
        let (source, _) = ScriptedSource::new(script);
        let sink = SharedSink::default();
        let mut sample_loop = SampleLoop::new(source, sink.clone(), &test_config());

        for _ in 0..10 {
            sample_loop.tick();
        }
        assert!(sink.visibility().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_loop() {
        let (source, grabs) = ScriptedSource::new(vec![Ok(frame(100))]);
        let sink = SharedSink::default();
        let sample_loop = SampleLoop::new(source, sink.clone(), &test_config());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(sample_loop.run(shutdown_rx, control_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(grabs.load(Ordering::Relaxed) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_engaged_lowers_the_shield() {
        // strobe forever: 100/150 alternation keeps the counter climbing
        let script: Vec<_> = (0..2)
            .flat_map(|_| [Ok(frame(100)), Ok(frame(150))])
            .collect();
        let (source, _) = ScriptedSource::new(script);
        let sink = SharedSink::default();
        let mut sample_loop = SampleLoop::new(source, sink.clone(), &test_config());

        for _ in 0..4 {
            sample_loop.tick();
        }
        assert_eq!(sink.visibility(), vec![true]);

        let (shutdown_tx, shutdown_rx) = watch::channel(true);
        let (_control_tx, control_rx) = mpsc::unbounded_channel();
        drop(shutdown_tx);
        sample_loop.run(shutdown_rx, control_rx).await;

        assert_eq!(sink.visibility(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn suppress_control_lowers_shield_while_loop_runs() {
        // a short strobe engages the shield, then the scene goes quiet so
        // only the recovery timer (not a fresh episode) is in play
        let script = vec![
            Ok(frame(100)),
            Ok(frame(150)),
            Ok(frame(100)),
            Ok(frame(150)),
        ];
        let (source, _) = ScriptedSource::new(script);
        let sink = SharedSink::default();
        let sample_loop = SampleLoop::new(source, sink.clone(), &test_config());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(sample_loop.run(shutdown_rx, control_rx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.visibility(), vec![true]);

        control_tx.send(ControlCommand::Suppress).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.visibility(), vec![true, false]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
