//! Single owner of the escrow engine.
//!
//! Every mutation takes the write lock, runs to completion and journals the
//! events it produced before the lock is released, so callers observe a
//! linear history. Reads share the lock. Events are acknowledged to the
//! engine only after SQLite accepts them; a failed write is retried with the
//! next mutation or sweep.

use std::sync::Arc;
use std::time::Duration;

use blockfund_escrow::{Clock, EscrowEngine, Timestamp};
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db;
use crate::errors::Result;

pub type SharedClock = Arc<dyn Clock>;
pub type Engine = EscrowEngine<SharedClock>;

/// Wall clock in whole UTC seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcClock;

impl Clock for UtcClock {
    fn now(&self) -> Timestamp {
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

pub struct Sequencer {
    engine: RwLock<Engine>,
    pool: SqlitePool,
    session: i64,
}

impl Sequencer {
    pub fn new(engine: Engine, pool: SqlitePool, session: i64) -> Self {
        Self {
            engine: RwLock::new(engine),
            pool,
            session,
        }
    }

    /// Run one mutating engine call under the write lock.
    pub async fn apply<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Engine) -> blockfund_escrow::Result<T> + Send,
        T: Send,
    {
        let mut engine = self.engine.write().await;
        let outcome = op(&mut *engine);
        self.flush(&mut *engine).await;
        Ok(outcome?)
    }

    /// Run a read-only engine call under the shared lock.
    pub async fn read<T, F>(&self, op: F) -> T
    where
        F: FnOnce(&Engine) -> T + Send,
    {
        let engine = self.engine.read().await;
        op(&*engine)
    }

    /// Settle every project past its expiry. Returns how many were settled.
    pub async fn sweep(&self) -> Result<usize> {
        let settled = self.apply(|engine| engine.settle_expired()).await?;
        for (project, status) in &settled {
            debug!(project, status = status.as_str(), "sweeper settled project");
        }
        Ok(settled.len())
    }

    /// Events committed by the engine but not yet journaled.
    pub async fn unjournaled(&self) -> usize {
        self.engine.read().await.pending_events().len()
    }

    async fn flush(&self, engine: &mut Engine) {
        let Some(last) = engine.pending_events().last().map(|e| e.seq) else {
            return;
        };
        match db::insert_events(&self.pool, self.session, engine.pending_events()).await {
            Ok(inserted) => {
                engine.acknowledge(last);
                debug!(inserted, through_seq = last, "events journaled");
            }
            Err(e) => {
                warn!(
                    pending = engine.pending_events().len(),
                    "Journal write failed, will retry: {e}"
                );
            }
        }
    }
}

/// Background task that settles expired projects until `shutdown` fires.
pub async fn run_sweeper(sequencer: Arc<Sequencer>, interval: Duration, shutdown: CancellationToken) {
    info!("Expiry sweeper starting, interval {}s", interval.as_secs());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        match sequencer.sweep().await {
            Ok(0) => {}
            Ok(n) => info!("Sweeper settled {n} expired project(s)"),
            Err(e) => error!("Sweeper error: {e}"),
        }
    }
    info!("Expiry sweeper stopped");
}
