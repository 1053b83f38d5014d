//! Reconciliation engine
//!
//! Diffs the remote listing against the cached coins and applies the
//! difference: creates what only the remote has, deletes what only the cache
//! has, and re-stamps stale coins present on both sides. Banned coins are
//! frozen and excluded from both sides.
//!
//! A pass is not transactional. On error it stops where it is; the next
//! pass starts from scratch and converges.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tracing::{debug, error, info};

use super::bus::EventBus;
use super::events::{CoinCreated, CoinDeleted, CoinUpdated, Event};
use super::scheduler::Scheduler;
use super::types::{Coin, CoinId};
use crate::adapters::traits::CoinService;
use crate::error::Result;
use crate::storage::CoinRepository;

/// Counts of what one reconciliation pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

pub struct Miner {
    service: Arc<dyn CoinService>,
    repo: Arc<dyn CoinRepository>,
    bus: Arc<EventBus>,
    scheduler: Scheduler,
}

impl Miner {
    pub fn new(service: Arc<dyn CoinService>, repo: Arc<dyn CoinRepository>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            service,
            repo,
            bus,
            scheduler: Scheduler::new("miner"),
        })
    }

    /// Run one pass now, then every `interval`. Pass failures are logged.
    pub async fn start(self: &Arc<Self>, interval: Duration) -> Result<()> {
        self.reconcile_logged().await;

        let this: Weak<Self> = Arc::downgrade(self);
        self.scheduler.add_job("reconcile", interval, move || {
            let this = this.clone();
            async move {
                if let Some(miner) = this.upgrade() {
                    miner.reconcile_logged().await;
                }
            }
            .boxed()
        })?;
        self.scheduler.start();

        info!(interval_secs = interval.as_secs(), "Miner started");
        Ok(())
    }

    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        self.scheduler.shutdown(timeout).await?;
        Ok(())
    }

    async fn reconcile_logged(&self) {
        match self.reconcile(Utc::now()).await {
            Ok(report) if report.is_noop() => debug!("Reconcile: nothing to do"),
            Ok(report) => info!(
                created = report.created,
                updated = report.updated,
                deleted = report.deleted,
                "Reconcile pass applied"
            ),
            Err(e) => error!(error = %e, "Reconcile pass failed"),
        }
    }

    /// One reconciliation pass as of `now`
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let banned: HashSet<CoinId> = self
            .repo
            .list_banned_coins()?
            .into_iter()
            .map(|b| b.coin_id)
            .collect();

        let cached = without_banned(self.repo.list_coins()?, &banned);
        if !cached.is_empty() && !cached.values().any(|c| c.is_old(now)) {
            return Ok(ReconcileReport::default());
        }

        let remote = without_banned(self.service.list_coins().await?, &banned);
        let mut report = ReconcileReport::default();

        for (id, coin) in &remote {
            if cached.contains_key(id) {
                continue;
            }
            self.repo.create_coin(&coin.with_modified_at(now))?;
            self.publish(Event::new(&CoinCreated {
                coin_id: id.clone(),
                created_at: now,
            })?)
            .await;
            report.created += 1;
        }

        for (id, coin) in &cached {
            match remote.get(id) {
                Some(listed) if coin.is_old(now) => {
                    // Stale: take the listing's current risk flag, stamp now
                    self.repo.update_coin(&Coin::new(id.clone(), listed.danger, now))?;
                    self.publish(Event::new(&CoinUpdated {
                        coin_id: id.clone(),
                        updated_at: now,
                    })?)
                    .await;
                    report.updated += 1;
                }
                Some(_) => {}
                None => {
                    self.repo.delete_coin(id)?;
                    self.publish(Event::new(&CoinDeleted {
                        coin_id: id.clone(),
                        deleted_at: now,
                    })?)
                    .await;
                    report.deleted += 1;
                }
            }
        }

        Ok(report)
    }

    async fn publish(&self, event: Event) {
        self.bus.publish(event).await;
    }
}

fn without_banned(coins: Vec<Coin>, banned: &HashSet<CoinId>) -> HashMap<CoinId, Coin> {
    coins
        .into_iter()
        .filter(|c| !banned.contains(&c.id))
        .map(|c| (c.id.clone(), c))
        .collect()
}
