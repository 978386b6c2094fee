//! Marble Race Server
//!
//! Runs one paced race for the five-seat lobby, then settles and
//! verifies it exactly as an auditor would.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use marble_race::{
    VERSION,
    core::seed::SeedGenerator,
    harness::{
        observer::{DisplayProfile, LaneView, StaticProfiles},
        payout::{settle, PaymentCollaborator, PayoutError, PayoutInstruction, PotConfig},
        protocol::RaceMessage,
        session::start_race,
    },
    proof::{verify::verify_transcript, verify_result},
    race::{ParticipantId, RaceConfig, Roster},
};

/// Environment variable naming a JSON race config.
const CONFIG_ENV: &str = "MARBLE_RACE_CONFIG";

/// Log standings every N ticks.
const STANDINGS_EVERY: u32 = 20;

/// Payment collaborator that only logs.
struct LoggingPayments;

impl PaymentCollaborator for LoggingPayments {
    fn pay(&self, instruction: &PayoutInstruction) -> Result<(), PayoutError> {
        info!(
            "PAYOUT race={} winner={} amount={} gross={} fee={}",
            instruction.race_id,
            instruction.winner,
            instruction.pot_amount,
            instruction.gross_pot,
            instruction.house_fee
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Marble Race Server v{}", VERSION);

    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => RaceConfig::from_path(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => RaceConfig::default(),
    };
    info!(
        "Track {} units, {} ms ticks, timeout {} ticks",
        config.track_length, config.tick_duration_ms, config.race_timeout_ticks
    );

    let profiles = lobby_profiles();
    let roster = Roster::with_count(5)?;

    let generated = SeedGenerator::new()
        .generate(&roster.fingerprint())
        .context("seed generation failed")?;
    if !generated.is_secure() {
        bail!("refusing to race on a {} seed", generated.provenance);
    }

    let mut handle = start_race(roster.ids(), generated.seed, config.clone())?;
    let race_id = handle.race_id();
    info!("{}", RaceMessage::commit(handle.commitment()).to_json()?);

    handle.on_complete(move |record| {
        info!("Race {} complete at tick {}", race_id, record.final_tick());
    });

    // Observer task: read-only views
    let mut snapshots = handle.subscribe();
    let track_length = config.track_length;
    let observer = tokio::spawn(async move {
        while let Ok(snapshot) = snapshots.recv().await {
            debug!("{}", RaceMessage::tick(race_id, &snapshot).to_json().unwrap_or_default());
            if snapshot.tick % STANDINGS_EVERY == 0 {
                let view = LaneView::from_snapshot(&snapshot, track_length, &profiles);
                if let Some(leader) = view.leader() {
                    info!(
                        "Tick {}: {} leads at {:.0}%",
                        view.tick,
                        leader.profile.handle,
                        leader.position / track_length * 100.0
                    );
                }
            }
        }
    });

    // Ctrl-C aborts: no winner, no payout
    let abort = handle.abort_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.trigger();
        }
    });

    let record = handle.run_paced().await?;
    let reveal = handle.reveal().context("race ended without a reveal")?;
    let transcript = handle.take_transcript();
    let commitment = handle.commitment().clone();
    drop(handle);
    let _ = tokio::time::timeout(Duration::from_secs(1), observer).await;

    info!("{}", RaceMessage::terminal(race_id, &record, reveal.seed).to_json()?);

    settle(race_id, &record, roster.len(), &PotConfig::default(), &LoggingPayments)?;

    // Audit exactly as a third party would
    reveal.verify(&commitment)?;
    verify_result(&record, reveal.seed, &reveal.roster, &reveal.config)?;
    if let Some(transcript) = transcript {
        let result = verify_transcript(&transcript);
        if !result.valid {
            bail!("transcript failed verification: {:?}", result.error);
        }
        info!(
            "Transcript verified: {} checkpoints, {} bytes, final hash {}",
            result.checkpoint_results.len(),
            transcript.to_bytes()?.len(),
            hex::encode(result.computed_final_hash)
        );
    }

    info!("Seed revealed: {}", reveal.seed);
    Ok(())
}

/// The default lobby.
fn lobby_profiles() -> StaticProfiles {
    let seats = [
        ("you", "#FF3B30"),
        ("dwr", "#007AFF"),
        ("vitalik", "#34C759"),
        ("jessepollak", "#FF9500"),
        ("ted", "#AF52DE"),
    ];

    let mut profiles = StaticProfiles::new();
    for (i, (name, color)) in seats.iter().enumerate() {
        profiles.insert(
            ParticipantId(i as u32),
            DisplayProfile {
                name: name.to_string(),
                handle: format!("@{}", name),
                color: color.to_string(),
            },
        );
    }
    profiles
}
