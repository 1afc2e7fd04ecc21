//! The per-round pick ticker.
//!
//! One ticker lives for exactly one round. It counts the picks the director
//! reports and drives a one-second heartbeat; the round ends when every seat
//! has picked or, with the timer active, when the budget runs out. Either way
//! it signals `StartNextRound` exactly once and returns, which also closes
//! the pick channel.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::director::DirectorHandle;

const TICK: Duration = Duration::from_secs(1);

/// Spawns the ticker for one round and hands back the pick-increment sender.
/// The channel is sized to the seat count so the director can report every
/// concurrent pick without ever blocking. `timeout` is the round budget and
/// is only set when both the timer and server force-pick are active.
pub fn start(
    director: DirectorHandle,
    seats: usize,
    round: u32,
    timeout: Option<Duration>,
) -> mpsc::Sender<()> {
    let (pick_tx, pick_rx) = mpsc::channel(seats.max(1));
    tokio::spawn(run(director, seats, round, timeout, pick_rx));
    pick_tx
}

async fn run(
    director: DirectorHandle,
    seats: usize,
    round: u32,
    timeout: Option<Duration>,
    mut picks_rx: mpsc::Receiver<()>,
) {
    let mut heartbeat = time::interval_at(Instant::now() + TICK, TICK);
    let mut ticks: u64 = 0;
    let mut picks: usize = 0;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                ticks += 1;
                if timeout.is_some_and(|budget| ticks >= budget.as_secs()) {
                    tracing::info!(round, "times up, forcing autopicks and ending round");
                    director.start_next_round().await;
                    return;
                }
                if picks == seats {
                    tracing::info!(round, "all players have picked, ending round");
                    director.start_next_round().await;
                    return;
                }
            }
            received = picks_rx.recv() => match received {
                Some(()) => {
                    picks += 1;
                    if picks == seats {
                        tracing::info!(round, "all players have picked, ending round");
                        director.start_next_round().await;
                        return;
                    }
                }
                // The director dropped its sender; the game is over.
                None => return,
            }
        }
    }
}
