//! Trigger loop with state machine.
//!
//! IDLE → TRIGGERING → IDLE
//!
//! Every poll the loop checks the trigger time. A due cycle runs inline
//! (generate → synthesize → resolve sink → play); whatever happens inside it,
//! the schedule advances and the loop goes back to polling.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use rand::rngs::StdRng;
use tracing::{error, info, warn};

use crate::audio::player::AudioPlayer;
use crate::audio::sink::{SinkHandle, SinkResolver};
use crate::config::ScheduleConfig;
use crate::error::Result;
use crate::generator::MessageGenerator;
use crate::schedule::{TimeOfDay, TriggerSchedule};
use crate::synthesis::{AudioArtifact, SpeechSynthesizer};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Triggering,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Triggering => write!(f, "TRIGGERING"),
        }
    }
}

/// The external pieces one cycle talks to.
pub struct Collaborators {
    pub generator: Box<dyn MessageGenerator>,
    pub synthesizer: Box<dyn SpeechSynthesizer>,
    pub resolver: SinkResolver,
    pub player: AudioPlayer,
}

/// What a successful cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub category: TimeOfDay,
    pub message: String,
    pub artifact: AudioArtifact,
    pub sink: Option<SinkHandle>,
}

pub struct Scheduler {
    state: SchedulerState,
    schedule: TriggerSchedule,
    poll: Duration,
    bluetooth: bool,
    reference_voice: Option<PathBuf>,
    collaborators: Collaborators,
    rng: StdRng,
}

impl Scheduler {
    pub fn new(
        config: &ScheduleConfig,
        bluetooth: bool,
        collaborators: Collaborators,
        mut rng: StdRng,
        now: DateTime<Local>,
    ) -> Self {
        let schedule = TriggerSchedule::new(
            config.min_interval_hours,
            config.max_interval_hours,
            now,
            &mut rng,
        );

        Self {
            state: SchedulerState::Idle,
            schedule,
            poll: Duration::from_secs(config.poll_secs),
            bluetooth,
            reference_voice: None,
            collaborators,
            rng,
        }
    }

    /// Speak in the voice of this sample instead of the configured one.
    pub fn with_reference_voice(mut self, reference: Option<PathBuf>) -> Self {
        self.reference_voice = reference;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn next_trigger_time(&self) -> DateTime<Local> {
        self.schedule.next_trigger_time()
    }

    /// Poll until `shutdown` resolves, which also abandons a running cycle.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        info!(
            "Scheduler started; next trigger at {}",
            self.next_trigger_time().format(TIME_FORMAT)
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Scheduler stopped");
                    break;
                }
                () = tokio::time::sleep(self.poll) => {}
            }

            // Dropping an in-flight cycle kills its child processes and removes the temp source.
            tokio::select! {
                () = &mut shutdown => {
                    warn!("Scheduler stopped during a cycle");
                    self.state = SchedulerState::Idle;
                    break;
                }
                _ = self.tick(Local::now()) => {}
            }
        }
    }

    /// Run one cycle if `now` has reached the trigger time.
    ///
    /// Returns `None` when nothing was due. A cycle error is logged here and
    /// handed back for inspection only; the schedule has already moved on.
    pub async fn tick(&mut self, now: DateTime<Local>) -> Option<Result<CycleReport>> {
        if !self.schedule.is_due(now) {
            return None;
        }

        self.state = SchedulerState::Triggering;
        info!("State: IDLE → TRIGGERING at {}", now.format(TIME_FORMAT));

        let outcome = self.run_cycle(now).await;
        match &outcome {
            Ok(report) => info!(
                "Cycle complete: played \"{}\" from {}",
                report.message,
                report.artifact.path().display()
            ),
            Err(e) => error!("Cycle failed: {e}"),
        }

        let interval = self.schedule.advance(now, &mut self.rng);
        info!(
            "Next trigger scheduled at {} (in {:.2} hours)",
            self.next_trigger_time().format(TIME_FORMAT),
            interval.as_secs_f64() / 3600.0
        );

        self.state = SchedulerState::Idle;
        info!("State: TRIGGERING → IDLE");
        Some(outcome)
    }

    /// Generate, synthesize and play one message for the time of day at `now`.
    pub async fn run_cycle(&self, now: DateTime<Local>) -> Result<CycleReport> {
        let category = TimeOfDay::from_hour(now.hour());
        let message = self.collaborators.generator.generate(category, now).await?;
        let (artifact, sink) = self.speak(&message).await?;

        Ok(CycleReport {
            category,
            message,
            artifact,
            sink,
        })
    }

    /// Synthesize `text` and play it, skipping generation.
    pub async fn speak(&self, text: &str) -> Result<(AudioArtifact, Option<SinkHandle>)> {
        let artifact = self
            .collaborators
            .synthesizer
            .synthesize(text, self.reference_voice.as_deref())
            .await?;
        info!("Audio file generated: {}", artifact.path().display());

        // Devices come and go between cycles, so resolve right before playing.
        let sink = if self.bluetooth {
            self.collaborators.resolver.resolve().await
        } else {
            None
        };

        self.collaborators
            .player
            .play(artifact.path(), sink.as_ref())
            .await?;
        Ok((artifact, sink))
    }
}
