//! Verification API
//!
//! Verify races by deterministic replay. `(seed, roster, config)` is the
//! whole audit contract; anything else a transcript claims is checked
//! against what the replay produces.

use std::collections::BTreeMap;

use crate::core::hash::StateHash;
use crate::core::seed::Seed;
use crate::proof::commitment::CommitmentError;
use crate::proof::transcript::{
    history_root, RaceTranscript, TranscriptError, TranscriptOutcome, TRANSCRIPT_VERSION,
};
use crate::race::config::RaceConfig;
use crate::race::resolver::TerminalRecord;
use crate::race::roster::Roster;
use crate::race::tick::{replay_race, RaceEngine, RaceError};

/// Verification result.
#[derive(Debug)]
pub struct VerificationResult {
    /// Did verification pass?
    pub valid: bool,

    /// Final state hash (from replay).
    pub computed_final_hash: StateHash,

    /// Expected final hash (from transcript).
    pub expected_final_hash: StateHash,

    /// Checkpoint verification results.
    pub checkpoint_results: Vec<CheckpointResult>,

    /// Detailed error if verification failed.
    pub error: Option<VerificationError>,
}

/// Result of verifying a single checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointResult {
    /// Tick number.
    pub tick: u32,
    /// Expected hash from transcript.
    pub expected: StateHash,
    /// Computed hash from replay.
    pub computed: StateHash,
    /// Did this checkpoint match?
    pub valid: bool,
}

/// Errors that can occur during verification.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerificationError {
    /// Transcript version mismatch.
    #[error("transcript version {got}, expected {expected}")]
    VersionMismatch {
        /// Expected version.
        expected: u8,
        /// Actual version.
        got: u8,
    },

    /// Transcript was never finalized.
    #[error("transcript has no result")]
    Incomplete,

    /// Revealed inputs do not match the commitment.
    #[error(transparent)]
    Commitment(#[from] CommitmentError),

    /// Inputs cannot start a race.
    #[error(transparent)]
    Race(#[from] RaceError),

    /// Encoding failure while hashing history.
    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    /// Checkpoint hash mismatch.
    #[error("checkpoint mismatch at tick {tick}")]
    CheckpointMismatch {
        /// Tick of the failed checkpoint.
        tick: u32,
    },

    /// Checkpoint recorded for a tick the replay never reached.
    #[error("checkpoint at tick {tick} is past the end of the race")]
    UnreachedCheckpoint {
        /// Tick of the orphan checkpoint.
        tick: u32,
    },

    /// Claimed outcome differs from the replay.
    #[error("outcome mismatch: claimed {claimed:?}, replay produced {computed:?}")]
    OutcomeMismatch {
        /// From the transcript or record.
        claimed: TranscriptOutcome,
        /// From the replay.
        computed: TranscriptOutcome,
    },

    /// Claimed terminal record is not byte-identical to the replay's.
    #[error("terminal record differs from replay")]
    RecordMismatch,

    /// History Merkle root mismatch.
    #[error("history root mismatch")]
    HistoryRootMismatch,

    /// Final state hash mismatch.
    #[error("final state hash mismatch")]
    FinalHashMismatch,
}

/// Recompute the terminal record of a race from its public inputs.
pub fn audit_race(seed: Seed, roster: &Roster, config: &RaceConfig) -> Result<TerminalRecord, RaceError> {
    replay_race(roster, seed, config)
}

/// Check a claimed terminal record against a replay.
///
/// Resolved records must be byte-identical to the replay's. An aborted
/// record is valid only if the replay was still pending at the abort tick.
pub fn verify_result(
    claimed: &TerminalRecord,
    seed: Seed,
    roster: &Roster,
    config: &RaceConfig,
) -> Result<(), VerificationError> {
    let mut engine = RaceEngine::new(roster.clone(), seed, config.clone())?;
    let computed = run_replay(&mut engine, abort_tick(claimed), |_, _| Ok(()))?;

    let claimed_outcome = TranscriptOutcome::from_record(claimed);
    let computed_outcome = TranscriptOutcome::from_record(&computed);
    if claimed_outcome != computed_outcome {
        return Err(VerificationError::OutcomeMismatch {
            claimed: claimed_outcome,
            computed: computed_outcome,
        });
    }

    if record_bytes(claimed)? != record_bytes(&computed)? {
        return Err(VerificationError::RecordMismatch);
    }
    Ok(())
}

/// Verify a full transcript by replay.
pub fn verify_transcript(transcript: &RaceTranscript) -> VerificationResult {
    let mut result = VerificationResult {
        valid: false,
        computed_final_hash: [0; 32],
        expected_final_hash: [0; 32],
        checkpoint_results: Vec::new(),
        error: None,
    };

    match check_transcript(transcript, &mut result) {
        Ok(()) => result.valid = true,
        Err(e) => result.error = Some(e),
    }
    result
}

fn check_transcript(transcript: &RaceTranscript, out: &mut VerificationResult) -> Result<(), VerificationError> {
    if transcript.version != TRANSCRIPT_VERSION {
        return Err(VerificationError::VersionMismatch {
            expected: TRANSCRIPT_VERSION,
            got: transcript.version,
        });
    }

    let claimed = transcript.result.ok_or(VerificationError::Incomplete)?;
    out.expected_final_hash = claimed.final_state_hash;

    let meta = &transcript.metadata;
    meta.commitment.verify_inputs(meta.race_id, &meta.seed, &meta.roster, &meta.config)?;

    let abort_at = match claimed.outcome {
        TranscriptOutcome::Aborted { tick } => Some(tick),
        TranscriptOutcome::Resolved { .. } => None,
    };

    let mut pending: BTreeMap<u32, StateHash> = transcript
        .checkpoints
        .iter()
        .map(|c| (c.tick, c.state_hash))
        .collect();

    let mut engine = RaceEngine::new(meta.roster.clone(), meta.seed, meta.config.clone())?;
    let computed = run_replay(&mut engine, abort_at, |tick, hash| {
        let Some(expected) = pending.remove(&tick) else {
            return Ok(());
        };
        let valid = expected == hash;
        out.checkpoint_results.push(CheckpointResult { tick, expected, computed: hash, valid });
        if valid {
            Ok(())
        } else {
            Err(VerificationError::CheckpointMismatch { tick })
        }
    })?;

    if let Some(tick) = pending.keys().next() {
        return Err(VerificationError::UnreachedCheckpoint { tick: *tick });
    }

    let computed_outcome = TranscriptOutcome::from_record(&computed);
    if computed_outcome != claimed.outcome {
        return Err(VerificationError::OutcomeMismatch {
            claimed: claimed.outcome,
            computed: computed_outcome,
        });
    }

    if history_root(engine.history())? != claimed.history_root {
        return Err(VerificationError::HistoryRootMismatch);
    }

    out.computed_final_hash = engine.state_hash();
    if out.computed_final_hash != out.expected_final_hash {
        return Err(VerificationError::FinalHashMismatch);
    }
    Ok(())
}

/// Step to completion, aborting at `abort_at` if the race is still pending.
fn run_replay<F>(engine: &mut RaceEngine, abort_at: Option<u32>, mut on_tick: F) -> Result<TerminalRecord, VerificationError>
where
    F: FnMut(u32, StateHash) -> Result<(), VerificationError>,
{
    while !engine.is_terminal() {
        if abort_at == Some(engine.current_tick()) {
            engine.abort()?;
            break;
        }
        let step = engine.step()?;
        on_tick(step.tick, engine.state_hash())?;
    }

    engine.terminal_record().ok_or(VerificationError::Incomplete)
}

fn abort_tick(record: &TerminalRecord) -> Option<u32> {
    match record {
        TerminalRecord::Aborted(aborted) => Some(aborted.tick),
        TerminalRecord::Resolved(_) => None,
    }
}

fn record_bytes(record: &TerminalRecord) -> Result<Vec<u8>, VerificationError> {
    bincode::serialize(record).map_err(|e| VerificationError::Transcript(TranscriptError::Encode(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::commitment::{RaceCommitment, RaceReveal};
    use crate::proof::transcript::RaceMetadata;
    use crate::race::roster::ParticipantId;
    use uuid::Uuid;

    fn inputs() -> (Seed, Roster, RaceConfig) {
        (Seed::from_bytes([21; 32]), Roster::with_count(5).unwrap(), RaceConfig::default())
    }

    fn record_transcript(abort_at: Option<u32>) -> RaceTranscript {
        let (seed, roster, config) = inputs();
        let race_id = Uuid::from_bytes([7; 16]);
        let commitment = RaceCommitment::new(race_id, &seed, &roster, &config);
        let mut transcript = RaceTranscript::new(RaceMetadata {
            race_id,
            seed,
            roster: roster.clone(),
            config: config.clone(),
            commitment,
        });

        let mut engine = RaceEngine::new(roster, seed, config).unwrap();
        while !engine.is_terminal() {
            if abort_at == Some(engine.current_tick()) {
                engine.abort().unwrap();
                break;
            }
            let step = engine.step().unwrap();
            transcript.record_tick(step.tick, engine.state_hash(), &step.events);
        }
        let record = engine.terminal_record().unwrap();
        transcript.finalize(&record, engine.history(), engine.state_hash()).unwrap();
        transcript
    }

    #[test]
    fn test_audit_matches_live_record() {
        let (seed, roster, config) = inputs();
        let mut live = RaceEngine::new(roster.clone(), seed, config.clone()).unwrap();
        let record = live.run_to_completion().unwrap();

        assert_eq!(audit_race(seed, &roster, &config).unwrap(), record);
        assert_eq!(verify_result(&record, seed, &roster, &config), Ok(()));
    }

    #[test]
    fn test_audit_from_published_json() {
        let (seed, roster, config) = inputs();
        let race_id = Uuid::from_bytes([3; 16]);
        let commitment = RaceCommitment::new(race_id, &seed, &roster, &config);
        let mut live = RaceEngine::new(roster.clone(), seed, config.clone()).unwrap();
        let record = live.run_to_completion().unwrap();

        // Published before tick 1, then after resolution
        let commitment_json = serde_json::to_string(&commitment).unwrap();
        let reveal_json = serde_json::to_string(&RaceReveal::new(race_id, seed, roster, config)).unwrap();
        let record_json = serde_json::to_string(&record).unwrap();

        let commitment: RaceCommitment = serde_json::from_str(&commitment_json).unwrap();
        let reveal: RaceReveal = serde_json::from_str(&reveal_json).unwrap();
        let record: TerminalRecord = serde_json::from_str(&record_json).unwrap();

        assert_eq!(reveal.verify(&commitment), Ok(()));
        assert_eq!(verify_result(&record, reveal.seed, &reveal.roster, &reveal.config), Ok(()));

        let aborted: TerminalRecord = serde_json::from_str(r#"{"aborted":true,"tick":12}"#).unwrap();
        assert_eq!(verify_result(&aborted, reveal.seed, &reveal.roster, &reveal.config), Ok(()));
    }

    #[test]
    fn test_forged_winner_rejected() {
        let (seed, roster, config) = inputs();
        let mut record = audit_race(seed, &roster, &config).unwrap();
        if let TerminalRecord::Resolved(result) = &mut record {
            result.winner = ParticipantId((result.winner.0 + 1) % 5);
        }
        assert!(matches!(
            verify_result(&record, seed, &roster, &config),
            Err(VerificationError::OutcomeMismatch { .. })
        ));
    }

    #[test]
    fn test_forged_history_rejected() {
        let (seed, roster, config) = inputs();
        let mut record = audit_race(seed, &roster, &config).unwrap();
        if let TerminalRecord::Resolved(result) = &mut record {
            result.history[10].positions.insert(ParticipantId(2), 150.0);
        }
        assert_eq!(
            verify_result(&record, seed, &roster, &config),
            Err(VerificationError::RecordMismatch)
        );
    }

    #[test]
    fn test_abort_record_checks_pending() {
        let (seed, roster, config) = inputs();
        assert_eq!(verify_result(&TerminalRecord::aborted(12), seed, &roster, &config), Ok(()));

        // The race resolves long before tick 10_000
        assert!(matches!(
            verify_result(&TerminalRecord::aborted(10_000), seed, &roster, &config),
            Err(VerificationError::OutcomeMismatch { .. })
        ));
    }

    #[test]
    fn test_valid_transcript() {
        let transcript = record_transcript(None);
        let result = verify_transcript(&transcript);

        assert!(result.valid, "{:?}", result.error);
        assert_eq!(result.computed_final_hash, result.expected_final_hash);
        assert_eq!(result.checkpoint_results.len(), transcript.checkpoints.len());
        assert!(result.checkpoint_results.iter().all(|c| c.valid));
    }

    #[test]
    fn test_valid_aborted_transcript() {
        let result = verify_transcript(&record_transcript(Some(45)));
        assert!(result.valid, "{:?}", result.error);
    }

    #[test]
    fn test_tampered_checkpoint_detected() {
        let mut transcript = record_transcript(None);
        transcript.checkpoints[1].state_hash[0] ^= 0xFF;
        let tick = transcript.checkpoints[1].tick;

        let result = verify_transcript(&transcript);
        assert!(!result.valid);
        assert_eq!(result.error, Some(VerificationError::CheckpointMismatch { tick }));
        assert!(!result.checkpoint_results.last().unwrap().valid);
    }

    #[test]
    fn test_swapped_seed_detected() {
        let mut transcript = record_transcript(None);
        transcript.metadata.seed = Seed::from_bytes([22; 32]);

        let result = verify_transcript(&transcript);
        assert_eq!(
            result.error,
            Some(VerificationError::Commitment(CommitmentError::SeedMismatch))
        );
    }

    #[test]
    fn test_tampered_result_detected() {
        let mut transcript = record_transcript(None);
        if let Some(result) = transcript.result.as_mut() {
            result.history_root[0] ^= 1;
        }
        assert_eq!(
            verify_transcript(&transcript).error,
            Some(VerificationError::HistoryRootMismatch)
        );

        let mut transcript = record_transcript(None);
        if let Some(result) = transcript.result.as_mut() {
            result.final_state_hash[31] ^= 1;
        }
        assert_eq!(
            verify_transcript(&transcript).error,
            Some(VerificationError::FinalHashMismatch)
        );
    }

    #[test]
    fn test_incomplete_and_version() {
        let mut transcript = record_transcript(None);
        transcript.version = 99;
        assert!(matches!(
            verify_transcript(&transcript).error,
            Some(VerificationError::VersionMismatch { got: 99, .. })
        ));

        let mut transcript = record_transcript(None);
        transcript.result = None;
        assert_eq!(verify_transcript(&transcript).error, Some(VerificationError::Incomplete));
    }
}
