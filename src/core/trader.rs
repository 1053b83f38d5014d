//! Per-coin trade history refresh
//!
//! Keeps one scheduler job per cached, non-banned coin. Each tick fetches
//! the daily history from the `CoinService`, upserts it and announces
//! `trades.updated`. Jobs follow the bus:
//!
//! | event                 | action                                   |
//! |-----------------------|------------------------------------------|
//! | `coin.created`        | add job, run now                         |
//! | `coin.deleted`        | remove job, drop cached trades           |
//! | `banned_coin.created` | remove job                               |
//! | `banned_coin.deleted` | add job and run now if the coin remains  |

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, info, warn};

use super::bus::{EventBus, HandlerOutcome};
use super::events::{
    topics, BannedCoinCreated, BannedCoinDeleted, CoinCreated, CoinDeleted, Event, TradesDeleted,
    TradesUpdated,
};
use super::scheduler::{JobId, Scheduler};
use super::types::CoinId;
use crate::adapters::traits::CoinService;
use crate::error::Result;
use crate::storage::CoinRepository;

pub struct Trader {
    service: Arc<dyn CoinService>,
    repo: Arc<dyn CoinRepository>,
    bus: Arc<EventBus>,
    interval: Duration,
    scheduler: Scheduler,
    jobs: Mutex<HashMap<CoinId, JobId>>,
    weak: Weak<Trader>,
}

impl Trader {
    /// Register a job for every cached coin that is not banned. Nothing runs
    /// until [`Trader::start`].
    pub fn new(
        service: Arc<dyn CoinService>,
        repo: Arc<dyn CoinRepository>,
        bus: Arc<EventBus>,
        interval: Duration,
    ) -> Result<Arc<Self>> {
        let trader = Arc::new_cyclic(|weak| Self {
            service,
            repo,
            bus,
            interval,
            scheduler: Scheduler::new("trader"),
            jobs: Mutex::new(HashMap::new()),
            weak: weak.clone(),
        });

        let mut added = 0;
        for coin in trader.repo.list_coins()? {
            if !trader.is_banned(&coin.id)? {
                trader.add_job(&coin.id)?;
                added += 1;
            }
        }
        debug!(jobs = added, "Trader jobs registered");
        Ok(trader)
    }

    /// Follow coin and ban events, start the scheduler and fire every job once
    pub fn start(&self) {
        self.subscribe();
        self.scheduler.start();
        self.scheduler.run_all_now();
        info!(jobs = self.job_count(), interval_secs = self.interval.as_secs(), "Trader started");
    }

    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        self.scheduler.shutdown(timeout).await?;
        self.jobs().clear();
        Ok(())
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<CoinId, JobId>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscribe(&self) {
        let this = self.weak.clone();
        self.bus.subscribe(topics::COIN_CREATED, move |event: Event| {
            let this = this.clone();
            async move {
                let Some(trader) = this.upgrade() else {
                    return HandlerOutcome::Handled;
                };
                HandlerOutcome::from(trader.on_coin_created(&event))
            }
        });

        let this = self.weak.clone();
        self.bus.subscribe(topics::COIN_DELETED, move |event: Event| {
            let this = this.clone();
            async move {
                let Some(trader) = this.upgrade() else {
                    return HandlerOutcome::Handled;
                };
                HandlerOutcome::from(trader.on_coin_deleted(&event).await)
            }
        });

        let this = self.weak.clone();
        self.bus.subscribe(topics::BANNED_COIN_CREATED, move |event: Event| {
            let this = this.clone();
            async move {
                let Some(trader) = this.upgrade() else {
                    return HandlerOutcome::Handled;
                };
                HandlerOutcome::from(trader.on_banned(&event))
            }
        });

        let this = self.weak.clone();
        self.bus.subscribe(topics::BANNED_COIN_DELETED, move |event: Event| {
            let this = this.clone();
            async move {
                let Some(trader) = this.upgrade() else {
                    return HandlerOutcome::Handled;
                };
                HandlerOutcome::from(trader.on_unbanned(&event))
            }
        });
    }

    fn on_coin_created(&self, event: &Event) -> Result<()> {
        let payload: CoinCreated = event.decode()?;
        // The status rule may already have banned it
        if self.is_banned(&payload.coin_id)? {
            debug!(coin_id = %payload.coin_id, "New coin already banned, no job");
            return Ok(());
        }
        let job = self.add_job(&payload.coin_id)?;
        self.scheduler.run_now(job);
        Ok(())
    }

    async fn on_coin_deleted(&self, event: &Event) -> Result<()> {
        let payload: CoinDeleted = event.decode()?;
        self.remove_job(&payload.coin_id);

        match self.repo.delete_trades(&payload.coin_id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        debug!(coin_id = %payload.coin_id, "Cached trades dropped");
        self.bus
            .publish(Event::new(&TradesDeleted {
                coin_id: payload.coin_id,
            })?)
            .await;
        Ok(())
    }

    fn on_banned(&self, event: &Event) -> Result<()> {
        let payload: BannedCoinCreated = event.decode()?;
        self.remove_job(&payload.coin_id);
        Ok(())
    }

    fn on_unbanned(&self, event: &Event) -> Result<()> {
        let payload: BannedCoinDeleted = event.decode()?;
        if !self.coin_exists(&payload.coin_id)? {
            debug!(coin_id = %payload.coin_id, "Unbanned coin no longer cached, no job");
            return Ok(());
        }
        let job = self.add_job(&payload.coin_id)?;
        self.scheduler.run_now(job);
        Ok(())
    }

    fn coin_exists(&self, id: &CoinId) -> Result<bool> {
        match self.repo.get_coin(id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn is_banned(&self, id: &CoinId) -> Result<bool> {
        match self.repo.get_banned_coin(id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Install the refresh job for `id`, replacing any existing one
    pub fn add_job(&self, id: &CoinId) -> Result<JobId> {
        let mut jobs = self.jobs();
        if let Some(old) = jobs.remove(id) {
            self.scheduler.remove_job(old);
        }

        let this = self.weak.clone();
        let coin_id = id.clone();
        let job = self.scheduler.add_job(format!("trades:{}", id), self.interval, move || {
            let this = this.clone();
            let coin_id = coin_id.clone();
            async move {
                if let Some(trader) = this.upgrade() {
                    trader.refresh_logged(&coin_id).await;
                }
            }
            .boxed()
        })?;
        jobs.insert(id.clone(), job);

        debug!(coin_id = %id, job_id = %job, "Refresh job added");
        Ok(job)
    }

    /// Drop the refresh job for `id`. Returns whether one existed.
    pub fn remove_job(&self, id: &CoinId) -> bool {
        let removed = self.jobs().remove(id);
        match removed {
            Some(job) => {
                self.scheduler.remove_job(job);
                debug!(coin_id = %id, job_id = %job, "Refresh job removed");
                true
            }
            None => false,
        }
    }

    pub fn has_job(&self, id: &CoinId) -> bool {
        self.jobs().contains_key(id)
    }

    pub fn job_count(&self) -> usize {
        self.jobs().len()
    }

    async fn refresh_logged(&self, id: &CoinId) {
        if let Err(e) = self.refresh_trades(id).await {
            warn!(coin_id = %id, error = %e, "Trade refresh failed");
        }
    }

    /// Fetch, persist and announce the latest history for `id`.
    ///
    /// The fetch can outlive the coin: if its job was removed while the
    /// request was in flight (coin deleted or banned), the result is dropped.
    #[tracing::instrument(skip(self, id), fields(coin_id = %id))]
    pub async fn refresh_trades(&self, id: &CoinId) -> Result<()> {
        let trades = self.service.list_trades(id).await?;
        {
            // Job map held across check and save; removal waits on it
            let jobs = self.jobs();
            if !jobs.contains_key(id) || !self.coin_exists(id)? {
                debug!("Coin dropped during refresh, trades discarded");
                return Ok(());
            }
            self.repo.save_trades(&trades)?;
        }
        debug!(days = trades.len(), "Trades refreshed");

        self.bus
            .publish(Event::new(&TradesUpdated { coin_id: id.clone() })?)
            .await;
        Ok(())
    }
}
