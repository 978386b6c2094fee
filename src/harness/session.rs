//! Race Session Management
//!
//! Drives one race from commitment to terminal record. Owns the
//! [`RaceEngine`] exclusively; observers only ever see shared snapshots.
//!
//! Paced and batch mode share [`RaceHandle::advance`], so both produce
//! identical histories for the same inputs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::seed::Seed;
use crate::proof::commitment::{RaceCommitment, RaceReveal};
use crate::proof::transcript::{RaceMetadata, RaceTranscript};
use crate::race::config::RaceConfig;
use crate::race::events::RaceEvent;
use crate::race::resolver::TerminalRecord;
use crate::race::roster::{ParticipantId, Roster};
use crate::race::state::TickSnapshot;
use crate::race::tick::{RaceEngine, RaceError};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Committed, not started.
    Committed,
    /// Pre-race countdown.
    Countdown,
    /// Ticks in progress.
    Running,
    /// Terminal record emitted.
    Ended,
}

/// Harness configuration. Nothing here affects the outcome.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Countdown before tick 1 in paced mode.
    pub countdown: Duration,
    /// Capacity of the snapshot and event channels.
    pub channel_capacity: usize,
    /// Record a proof transcript.
    pub record_transcript: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(3),
            channel_capacity: 256,
            record_transcript: true,
        }
    }
}

/// Cancellation flag, checked before every tick.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Fresh, untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has an abort been requested?
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Called once with the terminal record.
pub type CompletionCallback = Box<dyn FnOnce(&TerminalRecord) + Send + 'static>;

/// Validate inputs, commit to the seed, and return a handle at tick 0.
pub fn start_race(ids: &[ParticipantId], seed: Seed, config: RaceConfig) -> Result<RaceHandle, RaceError> {
    start_race_with(ids, seed, config, HarnessConfig::default())
}

/// [`start_race`] with explicit harness settings.
pub fn start_race_with(
    ids: &[ParticipantId],
    seed: Seed,
    config: RaceConfig,
    harness: HarnessConfig,
) -> Result<RaceHandle, RaceError> {
    let roster = Roster::new(ids)?;
    let race_id = Uuid::new_v4();
    let commitment = RaceCommitment::new(race_id, &seed, &roster, &config);
    let engine = RaceEngine::new(roster.clone(), seed, config.clone())?;

    let transcript = harness.record_transcript.then(|| {
        RaceTranscript::new(RaceMetadata {
            race_id,
            seed,
            roster: roster.clone(),
            config,
            commitment: commitment.clone(),
        })
    });

    info!(
        "Race {} committed: {} entrants, commitment {}",
        race_id,
        roster.len(),
        commitment.short_hash()
    );

    // Receivers are created on subscribe
    let (snapshot_tx, _) = broadcast::channel(harness.channel_capacity.max(1));
    let (event_tx, _) = broadcast::channel(harness.channel_capacity.max(1));

    Ok(RaceHandle {
        race_id,
        commitment,
        engine,
        harness,
        state: SessionState::Committed,
        abort: AbortSignal::new(),
        snapshot_tx,
        event_tx,
        transcript,
        on_complete: None,
        terminal: None,
    })
}

/// A committed race.
pub struct RaceHandle {
    race_id: Uuid,
    commitment: RaceCommitment,
    engine: RaceEngine,
    harness: HarnessConfig,
    state: SessionState,
    abort: AbortSignal,
    snapshot_tx: broadcast::Sender<Arc<TickSnapshot>>,
    event_tx: broadcast::Sender<RaceEvent>,
    transcript: Option<RaceTranscript>,
    on_complete: Option<CompletionCallback>,
    terminal: Option<TerminalRecord>,
}

impl RaceHandle {
    /// Race identifier.
    pub fn race_id(&self) -> Uuid {
        self.race_id
    }

    /// Commitment published before tick 1.
    pub fn commitment(&self) -> &RaceCommitment {
        &self.commitment
    }

    /// Session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Read-only engine access.
    pub fn engine(&self) -> &RaceEngine {
        &self.engine
    }

    /// Terminal record, once emitted.
    pub fn terminal_record(&self) -> Option<&TerminalRecord> {
        self.terminal.as_ref()
    }

    /// A clone of the abort flag for other tasks.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Receive every snapshot from tick 1 onwards.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TickSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Receive race events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RaceEvent> {
        self.event_tx.subscribe()
    }

    /// Register the completion callback. Replaces any earlier one.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce(&TerminalRecord) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
    }

    /// Transcript so far (finalized once the race ends).
    pub fn transcript(&self) -> Option<&RaceTranscript> {
        self.transcript.as_ref()
    }

    /// Take the transcript out of the handle.
    pub fn take_transcript(&mut self) -> Option<RaceTranscript> {
        self.transcript.take()
    }

    /// Seed reveal. Only available after the race has ended.
    pub fn reveal(&self) -> Option<RaceReveal> {
        self.terminal.as_ref()?;
        Some(RaceReveal::new(
            self.race_id,
            *self.engine.seed(),
            self.engine.roster().clone(),
            self.engine.config().clone(),
        ))
    }

    /// Cancel immediately. No winner, no payout.
    pub fn abort(&mut self) -> Result<TerminalRecord, RaceError> {
        self.abort.trigger();
        let record = self.engine.abort()?;
        self.complete(record.clone());
        Ok(record)
    }

    /// Batch mode: run every tick back to back.
    pub fn run_batch(&mut self) -> Result<TerminalRecord, RaceError> {
        self.ensure_live()?;
        self.state = SessionState::Running;
        loop {
            if let Some(record) = self.advance()? {
                return Ok(record);
            }
        }
    }

    /// Paced mode: countdown, then one tick per `tick_duration_ms`.
    ///
    /// Missed deadlines are caught up in a burst; no tick is ever skipped.
    pub async fn run_paced(&mut self) -> Result<TerminalRecord, RaceError> {
        self.ensure_live()?;
        self.state = SessionState::Countdown;
        let whole_secs = self.harness.countdown.as_secs();
        for remaining in (1..=whole_secs).rev() {
            if self.abort.is_triggered() {
                break;
            }
            debug!("Race {} starts in {}", self.race_id, remaining);
            sleep(Duration::from_secs(1)).await;
        }
        let rest = self.harness.countdown.saturating_sub(Duration::from_secs(whole_secs));
        if !rest.is_zero() && !self.abort.is_triggered() {
            sleep(rest).await;
        }

        self.state = SessionState::Running;
        info!("Race {} started", self.race_id);

        let mut ticker = interval(self.engine.config().tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            if let Some(record) = self.advance()? {
                return Ok(record);
            }
            ticker.tick().await;
        }
    }

    fn ensure_live(&self) -> Result<(), RaceError> {
        if self.engine.is_terminal() {
            return Err(RaceError::AlreadyTerminal {
                tick: self.engine.current_tick(),
                status: self.engine.state().status.name(),
            });
        }
        Ok(())
    }

    /// Process one tick, or the pending abort. Returns the terminal record
    /// when the race ends.
    fn advance(&mut self) -> Result<Option<TerminalRecord>, RaceError> {
        if self.abort.is_triggered() {
            let record = self.engine.abort()?;
            self.complete(record.clone());
            return Ok(Some(record));
        }

        let result = self.engine.step()?;

        for event in &result.events {
            debug!("Race {} tick {}: {:?}", self.race_id, event.tick, event.data);
            // No receivers is fine
            let _ = self.event_tx.send(event.clone());
        }

        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record_tick(result.tick, self.engine.state_hash(), &result.events);
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(
            "Race {} tick {} state {}",
            self.race_id,
            result.tick,
            hex::encode(self.engine.state_hash())
        );

        let resolved = result.resolved();
        let _ = self.snapshot_tx.send(Arc::new(result.snapshot));

        if !resolved {
            return Ok(None);
        }

        match self.engine.terminal_record() {
            Some(record) => {
                self.complete(record.clone());
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Emit the terminal record exactly once.
    fn complete(&mut self, record: TerminalRecord) {
        match &record {
            TerminalRecord::Resolved(result) => info!(
                "Race {} resolved: winner {} at tick {} ({:?})",
                self.race_id, result.winner, result.final_tick, result.resolution_reason
            ),
            TerminalRecord::Aborted(aborted) => {
                warn!("Race {} aborted at tick {}", self.race_id, aborted.tick);
                let _ = self.event_tx.send(RaceEvent::aborted(aborted.tick));
            }
        }

        if let Some(transcript) = self.transcript.as_mut() {
            if let Err(e) = transcript.finalize(&record, self.engine.history(), self.engine.state_hash()) {
                error!("Race {} transcript not finalized: {}", self.race_id, e);
            }
        }

        self.state = SessionState::Ended;
        if let Some(callback) = self.on_complete.take() {
            callback(&record);
        }
        self.terminal = Some(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::verify::verify_transcript;
    use crate::race::roster::RosterError;
    use std::sync::atomic::AtomicUsize;

    fn ids(count: u32) -> Vec<ParticipantId> {
        (0..count).map(ParticipantId).collect()
    }

    fn quiet_harness() -> HarnessConfig {
        HarnessConfig {
            channel_capacity: 1024,
            ..HarnessConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_matches_batch() {
        let seed = Seed::from_bytes([12; 32]);
        let config = RaceConfig::default();

        let mut batch = start_race_with(&ids(5), seed, config.clone(), quiet_harness()).unwrap();
        let mut paced = start_race_with(&ids(5), seed, config, quiet_harness()).unwrap();

        let batch_record = batch.run_batch().unwrap();
        let paced_record = paced.run_paced().await.unwrap();

        assert_eq!(batch_record, paced_record);
        assert_eq!(batch.engine().state_hash(), paced.engine().state_hash());
        assert_eq!(paced.state(), SessionState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_run_takes_race_time() {
        let mut handle = start_race_with(&ids(3), Seed::from_bytes([1; 32]), RaceConfig::default(), quiet_harness()).unwrap();
        let started = tokio::time::Instant::now();
        let record = handle.run_paced().await.unwrap();

        // Countdown plus one interval per tick after the first
        let expected = Duration::from_secs(3) + Duration::from_millis(50) * (record.final_tick() - 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= expected && elapsed < expected + Duration::from_millis(50), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers_see_every_tick() {
        let mut handle = start_race_with(&ids(4), Seed::from_bytes([3; 32]), RaceConfig::default(), quiet_harness()).unwrap();
        let mut rx = handle.subscribe();

        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(snapshot) = rx.recv().await {
                seen.push(snapshot);
            }
            seen
        });

        let record = handle.run_paced().await.unwrap();
        let history = handle.engine().history().to_vec();
        drop(handle);

        let seen = observer.await.unwrap();
        assert_eq!(seen.len() as u32, record.final_tick());
        for snapshot in &seen {
            assert_eq!(**snapshot, history[snapshot.tick as usize]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_signal_mid_race() {
        let mut handle = start_race_with(&ids(5), Seed::from_bytes([4; 32]), RaceConfig::default(), quiet_harness()).unwrap();
        let signal = handle.abort_signal();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        handle.on_complete(move |record| {
            assert!(record.is_aborted());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::spawn(async move {
            sleep(Duration::from_millis(3_500)).await;
            signal.trigger();
        });

        let record = handle.run_paced().await.unwrap();
        assert!(record.is_aborted());
        assert!(record.winner().is_none());
        assert!(record.final_tick() > 0 && record.final_tick() < 50);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Terminal: no more ticks, no second callback
        assert!(matches!(handle.run_batch(), Err(RaceError::AlreadyTerminal { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_during_countdown() {
        let mut handle = start_race(&ids(2), Seed::from_bytes([5; 32]), RaceConfig::default()).unwrap();
        handle.abort_signal().trigger();
        let record = handle.run_paced().await.unwrap();
        assert_eq!(record, TerminalRecord::aborted(0));
    }

    #[test]
    fn test_completion_callback_once() {
        let mut handle = start_race(&ids(3), Seed::from_bytes([6; 32]), RaceConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        handle.on_complete(move |record| {
            assert!(record.winner().is_some());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let record = handle.run_batch().unwrap();
        assert_eq!(handle.terminal_record(), Some(&record));
        assert!(handle.run_batch().is_err());
        assert!(handle.abort().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_direct_abort() {
        let mut handle = start_race(&ids(3), Seed::from_bytes([6; 32]), RaceConfig::default()).unwrap();
        assert!(handle.reveal().is_none());
        assert_eq!(handle.abort().unwrap(), TerminalRecord::aborted(0));
        assert!(handle.reveal().is_some());
    }

    #[test]
    fn test_transcript_and_reveal_verify() {
        let mut handle = start_race(&ids(5), Seed::from_bytes([7; 32]), RaceConfig::default()).unwrap();
        handle.run_batch().unwrap();

        let reveal = handle.reveal().unwrap();
        assert_eq!(reveal.verify(handle.commitment()), Ok(()));

        let transcript = handle.take_transcript().unwrap();
        let result = verify_transcript(&transcript);
        assert!(result.valid, "{:?}", result.error);
    }

    #[test]
    fn test_invalid_roster_rejected() {
        let err = start_race(&[ParticipantId(0), ParticipantId(2)], Seed::from_bytes([0; 32]), RaceConfig::default());
        assert!(matches!(err, Err(RaceError::Roster(RosterError::Gap { .. }))));

        let err = start_race(&[], Seed::from_bytes([0; 32]), RaceConfig::default());
        assert!(matches!(err, Err(RaceError::Roster(RosterError::Empty))));
    }
}
