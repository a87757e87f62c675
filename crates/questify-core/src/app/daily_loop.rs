//! DailyGenerationLoop - 毎日決まった時刻に翌日分を生成する常駐タスク
//!
//! - プロセスが所有するタイマー（リクエストのライフサイクルとは無関係）
//! - `LoopTrigger`（RunTrigger 実装）で次回時刻を前倒し・変更できる
//! - shutdown は watch チャネル。`shutdown_and_join` で終了を待つ

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::app::scheduler::{BatchScheduler, ScheduleError};
use crate::domain::BatchStats;
use crate::ports::{Clock, RunTrigger, TriggerError};

/// Loop handle.
/// - `request_shutdown()` で次の待機から抜ける（実行中のバッチは最後まで走る）
/// - `shutdown_and_join()` でタスクの終了を待てる
pub struct DailyGenerationLoop {
    shutdown_tx: watch::Sender<bool>,
    rearm_tx: Arc<watch::Sender<Option<DateTime<Utc>>>>,
    batches_rx: watch::Receiver<Option<BatchStats>>,
    join: JoinHandle<()>,
}

/// Re-arms a running loop. Cheap to clone.
#[derive(Clone)]
pub struct LoopTrigger {
    rearm_tx: Arc<watch::Sender<Option<DateTime<Utc>>>>,
}

#[async_trait]
impl RunTrigger for LoopTrigger {
    async fn arm(&self, at: DateTime<Utc>) -> Result<(), TriggerError> {
        self.rearm_tx
            .send(Some(at))
            .map_err(|_| TriggerError::Closed)
    }
}

impl DailyGenerationLoop {
    pub fn spawn(scheduler: Arc<BatchScheduler>, clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (rearm_tx, rearm_rx) = watch::channel(None);
        let (batches_tx, batches_rx) = watch::channel(None);

        let join = tokio::spawn(async move {
            daily_loop(scheduler, clock, rearm_rx, shutdown_rx, batches_tx).await;
        });

        Self {
            shutdown_tx,
            rearm_tx: Arc::new(rearm_tx),
            batches_rx,
            join,
        }
    }

    pub fn trigger(&self) -> LoopTrigger {
        LoopTrigger {
            rearm_tx: Arc::clone(&self.rearm_tx),
        }
    }

    /// Receives the stats of every finished run.
    pub fn subscribe(&self) -> watch::Receiver<Option<BatchStats>> {
        self.batches_rx.clone()
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the task may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            error!(error = %e, "daily generation loop panicked");
        }
    }

    /// One run fired at `fired_at`: generate the next local day for every user.
    pub async fn run_once(
        scheduler: &BatchScheduler,
        fired_at: DateTime<Utc>,
    ) -> Result<BatchStats, ScheduleError> {
        let today = scheduler.local_date(fired_at);
        let target = today.checked_add_days(Days::new(1)).unwrap_or(today);
        scheduler.run_for_all_users(target).await
    }
}

async fn daily_loop(
    scheduler: Arc<BatchScheduler>,
    clock: Arc<dyn Clock>,
    mut rearm_rx: watch::Receiver<Option<DateTime<Utc>>>,
    mut shutdown_rx: watch::Receiver<bool>,
    batches_tx: watch::Sender<Option<BatchStats>>,
) {
    let mut next = scheduler.next_run_after(clock.now());
    let mut rearm_open = true;
    info!(next_run = %next, "daily generation loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let wait = (next - clock.now()).to_std().unwrap_or_default();
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            changed = rearm_rx.changed(), if rearm_open => {
                match changed {
                    Ok(()) => {
                        if let Some(at) = *rearm_rx.borrow_and_update() {
                            debug!(next_run = %at, "daily generation loop re-armed");
                            next = at;
                        }
                    }
                    Err(_) => rearm_open = false,
                }
                continue;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        match DailyGenerationLoop::run_once(&scheduler, next).await {
            Ok(stats) => {
                // nobody listening is fine
                let _ = batches_tx.send(Some(stats));
            }
            Err(e) => error!(error = %e, "daily generation run failed"),
        }

        next = scheduler.next_run_after(clock.now().max(next));
        info!(next_run = %next, "daily generation loop sleeping");
    }

    info!("daily generation loop stopped");
}
