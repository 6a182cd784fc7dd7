//! Action timing scheduler
//!
//! Keeps every stored action timing in a queue ordered by next run time and
//! executes them as they come due. One-time and `*asap` timings are taken
//! out of storage when queued and run exactly once; recurring timings are
//! queued again at their next calendar start.

use chrono::{DateTime, Duration, Utc};
use futures::future::FutureExt;
use parking_lot::Mutex;
use rater_core::{
    config::SchedulerConfig,
    models::{compare_timings, ActionTiming},
    traits::DataStorage,
    AppError, AppResult,
};
use rater_store::keys;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{debug, error, info, instrument, warn};

use crate::constants::SCHEDULER_SOURCE;
use crate::engine::Engine;

/// Queue entry
#[derive(Debug, Clone)]
struct Scheduled {
    at: DateTime<Utc>,
    plan: String,
    timing: ActionTiming,
}

impl Scheduled {
    fn runs_once(&self) -> bool {
        self.timing.is_asap() || self.timing.is_one_time_run()
    }
}

pub struct Scheduler<S: DataStorage> {
    engine: Arc<Engine<S>>,
    config: SchedulerConfig,
    queue: Mutex<Vec<Scheduled>>,
    notify: Notify,
    reload_lock: AsyncMutex<()>,
}

impl<S: DataStorage + 'static> Scheduler<S> {
    pub fn new(engine: Arc<Engine<S>>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            config,
            queue: Mutex::new(Vec::new()),
            notify: Notify::new(),
            reload_lock: AsyncMutex::new(()),
        }
    }

    /// `(run time, timing id)` of every queued timing, in run order
    pub fn queued(&self) -> Vec<(DateTime<Utc>, String)> {
        self.queue
            .lock()
            .iter()
            .map(|s| (s.at, s.timing.id.clone()))
            .collect()
    }

    fn asap_delay(&self) -> Duration {
        Duration::seconds(self.config.asap_delay_secs as i64)
    }

    fn sort_queue(queue: &mut [Scheduled]) {
        queue.sort_by(|a, b| compare_timings((&a.at, &a.timing), (&b.at, &b.timing)));
    }

    pub async fn reload(&self, force: bool) -> AppResult<usize> {
        self.reload_at(force, Utc::now()).await
    }

    /// Rebuilds the queue from storage.
    ///
    /// Without `force` an already armed queue is kept as is. Run-once
    /// timings still waiting in the old queue survive a forced rebuild, as
    /// they are no longer in storage.
    #[instrument(skip(self))]
    pub async fn reload_at(&self, force: bool, now: DateTime<Utc>) -> AppResult<usize> {
        let _reload = self.reload_lock.lock().await;

        if !force {
            let len = self.queue.lock().len();
            if len > 0 {
                debug!("Queue already armed with {} timings", len);
                self.notify.notify_one();
                return Ok(len);
            }
        }

        let mut loaded = Vec::new();
        let mut taken: HashMap<String, HashSet<String>> = HashMap::new();
        for (plan, timings) in self.engine.storage().get_all_action_timings().await? {
            for timing in timings {
                if let Err(e) = timing.validate() {
                    warn!(plan = %plan, timing = %timing.id, "Skipping invalid timing: {}", e);
                    continue;
                }
                let Some(at) = timing.first_run(now, self.asap_delay()) else {
                    warn!(plan = %plan, timing = %timing.id, "Timing has no future run");
                    continue;
                };
                let entry = Scheduled {
                    at,
                    plan: plan.clone(),
                    timing,
                };
                if entry.runs_once() {
                    taken
                        .entry(plan.clone())
                        .or_default()
                        .insert(entry.timing.id.clone());
                }
                loaded.push(entry);
            }
        }

        for (plan, ids) in &taken {
            self.take_from_storage(plan, ids).await?;
        }

        let len = {
            let mut queue = self.queue.lock();
            let pending_once: Vec<Scheduled> = queue.drain(..).filter(Scheduled::runs_once).collect();
            loaded.extend(pending_once);
            Self::sort_queue(&mut loaded);
            *queue = loaded;
            queue.len()
        };

        info!("Scheduler loaded {} action timings", len);
        self.notify.notify_one();
        Ok(len)
    }

    /// Removes run-once timings from their stored plan
    async fn take_from_storage(&self, plan: &str, ids: &HashSet<String>) -> AppResult<()> {
        let storage = self.engine.storage();
        let key = keys::action_timings_key(plan);

        self.engine
            .guard()
            .guard(&[key], move || async move {
                let remaining: Vec<ActionTiming> = storage
                    .get_action_timings(plan)
                    .await?
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|t| !ids.contains(&t.id))
                    .collect();
                storage.set_action_timings(plan, &remaining).await.map_err(|e| {
                    error!(plan = %plan, "Failed to remove queued timings: {}", e);
                    e
                })?;
                debug!(plan = %plan, removed = ids.len(), "Removed run-once timings from storage");
                Ok::<(), AppError>(())
            })
            .await
    }

    /// Pops every timing due at `now`, queueing recurring ones again
    fn take_due(&self, now: DateTime<Utc>) -> Vec<Scheduled> {
        let mut queue = self.queue.lock();
        let split = queue.iter().take_while(|s| s.at <= now).count();
        let due: Vec<Scheduled> = queue.drain(..split).collect();

        for entry in due.iter().filter(|s| !s.runs_once()) {
            let after = entry.at.max(now) + Duration::seconds(1);
            match entry.timing.next_start_time(after) {
                Some(at) => queue.push(Scheduled { at, ..entry.clone() }),
                None => info!(timing = %entry.timing.id, "Timing has no further runs"),
            }
        }
        Self::sort_queue(&mut queue);
        due
    }

    fn next_run(&self) -> Option<DateTime<Utc>> {
        self.queue.lock().first().map(|s| s.at)
    }

    /// Runs the timings due at `now` to completion, returning how many ran
    pub async fn run_pending(&self, now: DateTime<Utc>) -> usize {
        let due = self.take_due(now);
        for entry in &due {
            if let Err(e) = self.execute(&entry.plan, &entry.timing).await {
                warn!(timing = %entry.timing.id, "Action timing failed: {}", e);
            }
        }
        due.len()
    }

    /// Runs one timing's bundle against each of its accounts. An account
    /// whose actions fail is left as stored; the others still run.
    #[instrument(skip(self, timing), fields(timing = %timing.id))]
    pub async fn execute(&self, plan: &str, timing: &ActionTiming) -> AppResult<()> {
        let storage = self.engine.storage();
        let actions = storage
            .get_actions(&timing.actions_id)
            .await?
            .ok_or_else(|| AppError::ActionsNotFound(timing.actions_id.clone()))?;

        for account_id in &timing.account_ids {
            if let Err(e) = self.engine.apply_actions(account_id, &actions).await {
                warn!(account = %account_id, "Skipping account: {}", e);
            }
        }
        info!(
            accounts = timing.account_ids.len(),
            "Executed action timing {} of plan {}", timing.id, plan
        );

        let storage = storage.clone();
        let timing = timing.clone();
        tokio::spawn(async move {
            if let Err(e) = storage
                .log_action_timing(SCHEDULER_SOURCE, &timing, &actions)
                .await
            {
                warn!(timing = %timing.id, "Failed to log action timing: {}", e);
            }
        });
        Ok(())
    }

    /// Runs the queue until `shutdown` resolves
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let shutdown = shutdown.fuse();
        tokio::pin!(shutdown);
        info!("Scheduler started");

        loop {
            let wait = self
                .next_run()
                .map(|at| (at - Utc::now()).to_std().unwrap_or_default());
            let sleep = async {
                match wait {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.notify.notified() => continue,
                _ = sleep => {
                    for entry in self.take_due(Utc::now()) {
                        let scheduler = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = scheduler.execute(&entry.plan, &entry.timing).await {
                                warn!(timing = %entry.timing.id, "Action timing failed: {}", e);
                            }
                        });
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }
}
