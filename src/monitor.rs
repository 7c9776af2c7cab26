//! Draw coordinator - a single task that serializes every mutation of the
//! shared draw state.
//!
//! Connection workers enqueue actions (store a batch, confirm readiness,
//! shut down) on an unbounded channel; one consumer task owns the ready
//! set outright and is the only writer of the winners map. The winners
//! map sits behind one mutex because workers read-and-remove from it
//! directly, bypassing the queue so result requests never wait behind an
//! in-flight draw.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bet::{Bet, has_won};
use crate::store::{BetStore, StoreError};

type AgencyId = u32;
type WinnersMap = HashMap<AgencyId, Vec<Bet>>;

#[derive(Debug)]
enum Action {
    StoreBatch(Vec<Bet>),
    RegisterReady(AgencyId),
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// No entry for the agency: either no draw has happened since it
    /// confirmed, or its winners were already delivered.
    #[error("no pending winners for agency {agency}")]
    NoPendingWinners { agency: AgencyId },

    /// The coordinator has shut down and accepts no more actions.
    #[error("draw monitor is shut down")]
    Closed,
}

/// Owning side of the coordinator: spawns the consumer task and joins it
/// on shutdown. Workers interact through cloned [`MonitorHandle`]s.
pub struct DrawMonitor {
    handle: MonitorHandle,
    worker: JoinHandle<()>,
}

impl DrawMonitor {
    pub fn spawn(store: Arc<dyn BetStore>, expected_agencies: usize) -> Self {
        let (actions, action_rx) = mpsc::unbounded_channel();
        let winners = Arc::new(StdMutex::new(WinnersMap::new()));

        let worker = tokio::spawn(run(
            store,
            expected_agencies,
            Arc::clone(&winners),
            action_rx,
        ));

        Self {
            handle: MonitorHandle { actions, winners },
            worker,
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Stop the consumer loop and wait for it to exit.
    ///
    /// Every action enqueued before this call is processed first; nothing
    /// is processed after the join returns.
    pub async fn shutdown(self) {
        let _ = self.handle.actions.send(Action::Shutdown);
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "draw monitor task panicked");
        }
    }
}

/// Cloneable handle used by connection workers.
#[derive(Clone)]
pub struct MonitorHandle {
    actions: mpsc::UnboundedSender<Action>,
    winners: Arc<StdMutex<WinnersMap>>,
}

impl MonitorHandle {
    /// Enqueue a batch for the durable store. Order within the batch and
    /// across calls from one worker is preserved.
    pub fn submit_bets(&self, batch: Vec<Bet>) -> Result<(), MonitorError> {
        self.actions
            .send(Action::StoreBatch(batch))
            .map_err(|_| MonitorError::Closed)
    }

    /// Confirm an agency's readiness for the draw. Idempotent.
    pub fn register_ready(&self, agency: AgencyId) -> Result<(), MonitorError> {
        self.actions
            .send(Action::RegisterReady(agency))
            .map_err(|_| MonitorError::Closed)
    }

    /// Atomically remove and return the agency's winners.
    ///
    /// Races only against the coordinator writing a draw's partitions;
    /// both sides take the same lock.
    pub fn request_winners(&self, agency: AgencyId) -> Result<Vec<Bet>, MonitorError> {
        lock_winners(&self.winners)
            .remove(&agency)
            .ok_or(MonitorError::NoPendingWinners { agency })
    }
}

fn lock_winners(winners: &StdMutex<WinnersMap>) -> MutexGuard<'_, WinnersMap> {
    winners.lock().unwrap_or_else(|poisoned| {
        tracing::error!("winners map mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

async fn run(
    store: Arc<dyn BetStore>,
    expected_agencies: usize,
    winners: Arc<StdMutex<WinnersMap>>,
    mut actions: mpsc::UnboundedReceiver<Action>,
) {
    let mut ready: HashSet<AgencyId> = HashSet::new();

    while let Some(action) = actions.recv().await {
        match action {
            Action::StoreBatch(batch) => {
                let count = batch.len();
                match store.append(&batch).await {
                    Ok(()) => tracing::info!(count, "bet batch stored"),
                    Err(e) => tracing::error!(error = %e, count, "failed to store bet batch"),
                }
            }
            Action::RegisterReady(agency) => {
                if !ready.insert(agency) {
                    tracing::debug!(agency, "agency already confirmed for this draw");
                }
                // >= so a draw that failed on a store error retries on
                // the next confirmation instead of wedging the round.
                if ready.len() >= expected_agencies {
                    match execute_draw(store.as_ref(), &ready, &winners).await {
                        Ok(()) => ready.clear(),
                        Err(e) => tracing::error!(error = %e, "draw failed"),
                    }
                }
            }
            Action::Shutdown => break,
        }
    }

    tracing::info!("draw monitor exiting");
}

/// Read the full store, partition winners per confirmed agency, and
/// publish the partitions. Runs inside the consumer loop, so the trigger
/// check and the draw itself are atomic with respect to all other
/// actions. The lock is taken only after the store read completes and is
/// never held across an await.
async fn execute_draw(
    store: &dyn BetStore,
    ready: &HashSet<AgencyId>,
    winners: &StdMutex<WinnersMap>,
) -> Result<(), StoreError> {
    let bets = store.read_all().await?;
    let winning: Vec<Bet> = bets.into_iter().filter(has_won).collect();

    let mut map = lock_winners(winners);
    for &agency in ready {
        let partition: Vec<Bet> = winning
            .iter()
            .filter(|bet| bet.agency == agency)
            .cloned()
            .collect();
        map.insert(agency, partition);
    }
    drop(map);

    tracing::info!(
        agencies = ready.len(),
        winners = winning.len(),
        "draw complete"
    );
    Ok(())
}
