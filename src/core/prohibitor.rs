//! Ban/unban state machine
//!
//! Per coin: `Allowed` (no ban record) or `Banned` (record present).
//!
//! - coin created/updated: status rule, a coin flagged as dangerous is banned for a day
//! - trades updated: trade rule, see [`trade_ban_period`]
//! - coin deleted / trades deleted: unban immediately
//! - periodic sweep: unban every ban past its expiry
//!
//! Every decision re-reads the repository; nothing is cached between events.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::FutureExt;
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use super::bus::{EventBus, HandlerOutcome};
use super::events::{
    topics, BannedCoinCreated, BannedCoinDeleted, CoinCreated, CoinDeleted, CoinUpdated, Event,
    TradesDeleted, TradesUpdated,
};
use super::scheduler::Scheduler;
use super::types::{BannedCoin, CoinId, Trades};
use crate::error::Result;
use crate::storage::CoinRepository;

/// Ban length for coins flagged by the listing source
pub fn status_ban_period() -> ChronoDuration {
    ChronoDuration::days(1)
}

/// Ban length for coins with fewer than 20 days of history
fn thin_history_ban_period() -> ChronoDuration {
    ChronoDuration::days(1)
}

/// Ban length for coins priced outside the tradable band
fn price_ban_period() -> ChronoDuration {
    ChronoDuration::days(10)
}

const PRICE_CEILING: i64 = 100_000;
const PRICE_FLOOR: i64 = 100;

/// Longest ban any trade sub-rule asks for; zero when none fires.
///
/// - fewer than 20 entries: 1 day
/// - integer part of the latest last price above 100,000: 10 days
/// - integer part of the latest last price below 100: 10 days
pub fn trade_ban_period(trades: &Trades) -> Result<ChronoDuration> {
    let mut period = ChronoDuration::zero();

    if !trades.is_enough_trade() {
        period = period.max(thin_history_ban_period());
    }

    if let Some(last) = trades.last_price() {
        let integer = last.integer_part()?;
        if integer > Decimal::from(PRICE_CEILING) || integer < Decimal::from(PRICE_FLOOR) {
            period = period.max(price_ban_period());
        }
    }

    Ok(period)
}

pub struct Prohibitor {
    repo: Arc<dyn CoinRepository>,
    bus: Arc<EventBus>,
    scheduler: Scheduler,
}

impl Prohibitor {
    pub fn new(repo: Arc<dyn CoinRepository>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            repo,
            bus,
            scheduler: Scheduler::new("prohibitor"),
        })
    }

    /// Bring bans up to date, then follow events and sweep every `sweep_interval`
    pub async fn start(self: &Arc<Self>, sweep_interval: Duration) -> Result<()> {
        self.catch_up(Utc::now()).await?;
        self.subscribe();

        let this: Weak<Self> = Arc::downgrade(self);
        self.scheduler.add_job("ban-sweep", sweep_interval, move || {
            let this = this.clone();
            async move {
                if let Some(prohibitor) = this.upgrade() {
                    if let Err(e) = prohibitor.sweep(Utc::now()).await {
                        error!(error = %e, "Ban sweep failed");
                    }
                }
            }
            .boxed()
        })?;
        self.scheduler.start();

        info!(sweep_interval_secs = sweep_interval.as_secs(), "Prohibitor started");
        Ok(())
    }

    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        self.scheduler.shutdown(timeout).await?;
        Ok(())
    }

    /// Startup pass: lift expired bans, then check every cached coin by
    /// status and by trade history.
    pub async fn catch_up(&self, now: DateTime<Utc>) -> Result<()> {
        let lifted = self.sweep(now).await?;

        let coins = self.repo.list_coins()?;
        for coin in &coins {
            self.prohibit_by_status(&coin.id, now).await?;
            // A bad price in one history must not block the rest
            if let Err(e) = self.prohibit_by_trades(&coin.id, now).await {
                error!(coin_id = %coin.id, error = %e, "Trade rule check failed");
            }
        }

        info!(lifted, checked = coins.len(), "Ban state caught up");
        Ok(())
    }

    fn subscribe(self: &Arc<Self>) {
        let this = Arc::downgrade(self);
        self.bus.subscribe(topics::COIN_CREATED, handler(&this, |p, event| async move {
            let payload: CoinCreated = event.decode()?;
            p.prohibit_by_status(&payload.coin_id, Utc::now()).await.map(|_| ())
        }));
        self.bus.subscribe(topics::COIN_UPDATED, handler(&this, |p, event| async move {
            let payload: CoinUpdated = event.decode()?;
            p.prohibit_by_status(&payload.coin_id, Utc::now()).await.map(|_| ())
        }));
        self.bus.subscribe(topics::TRADES_UPDATED, handler(&this, |p, event| async move {
            let payload: TradesUpdated = event.decode()?;
            p.prohibit_by_trades(&payload.coin_id, Utc::now()).await.map(|_| ())
        }));
        self.bus.subscribe(topics::COIN_DELETED, handler(&this, |p, event| async move {
            let payload: CoinDeleted = event.decode()?;
            p.allow(&payload.coin_id).await.map(|_| ())
        }));
        self.bus.subscribe(topics::TRADES_DELETED, handler(&this, |p, event| async move {
            let payload: TradesDeleted = event.decode()?;
            p.allow(&payload.coin_id).await.map(|_| ())
        }));
    }

    async fn is_banned(&self, id: &CoinId) -> Result<bool> {
        match self.repo.get_banned_coin(id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Status rule. Returns whether a new ban was created.
    #[tracing::instrument(skip(self, id), fields(coin_id = %id))]
    pub async fn prohibit_by_status(&self, id: &CoinId, now: DateTime<Utc>) -> Result<bool> {
        if self.is_banned(id).await? {
            return Ok(false);
        }

        let coin = match self.repo.get_coin(id) {
            Ok(coin) => coin,
            Err(e) if e.is_not_found() => {
                debug!(coin_id = %id, "Coin gone before status check");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if !coin.is_danger() {
            return Ok(false);
        }
        self.ban(BannedCoin::new(id.clone(), now, status_ban_period())).await
    }

    /// Trade rule. Returns whether a new ban was created.
    #[tracing::instrument(skip(self, id), fields(coin_id = %id))]
    pub async fn prohibit_by_trades(&self, id: &CoinId, now: DateTime<Utc>) -> Result<bool> {
        if self.is_banned(id).await? {
            return Ok(false);
        }

        let trades = match self.repo.list_trades(id) {
            Ok(trades) => trades,
            Err(e) if e.is_not_found() => {
                debug!(coin_id = %id, "No trades cached yet");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let period = trade_ban_period(&trades)?;
        if period <= ChronoDuration::zero() {
            return Ok(false);
        }
        self.ban(BannedCoin::new(id.clone(), now, period)).await
    }

    async fn ban(&self, banned: BannedCoin) -> Result<bool> {
        match self.repo.create_banned_coin(&banned) {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                debug!(coin_id = %banned.coin_id, "Already banned");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            coin_id = %banned.coin_id,
            period_hours = banned.period.num_hours(),
            expired_at = %banned.expired_at(),
            "Coin banned"
        );
        self.bus
            .publish(Event::new(&BannedCoinCreated {
                coin_id: banned.coin_id.clone(),
                expired_at: banned.expired_at(),
            })?)
            .await;
        Ok(true)
    }

    /// Lift the ban on `id` whatever its expiry. Returns whether one existed.
    #[tracing::instrument(skip(self, id), fields(coin_id = %id))]
    pub async fn allow(&self, id: &CoinId) -> Result<bool> {
        match self.repo.delete_banned_coin(id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        info!(coin_id = %id, "Coin unbanned");
        self.bus
            .publish(Event::new(&BannedCoinDeleted { coin_id: id.clone() })?)
            .await;
        Ok(true)
    }

    /// Lift every ban that is over at `now`. Returns how many were lifted.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut lifted = 0;
        for banned in self.repo.list_banned_coins()? {
            if banned.is_ban_over(now) && self.allow(&banned.coin_id).await? {
                lifted += 1;
            }
        }
        if lifted > 0 {
            debug!(lifted, "Expired bans lifted");
        }
        Ok(lifted)
    }
}

/// Adapt a `(prohibitor, event) -> Result` body into a bus handler that
/// holds the prohibitor weakly.
fn handler<F, Fut>(
    this: &Weak<Prohibitor>,
    body: F,
) -> impl Fn(Event) -> futures_util::future::BoxFuture<'static, HandlerOutcome> + Send + Sync + 'static
where
    F: Fn(Arc<Prohibitor>, Event) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let this = this.clone();
    let body = Arc::new(body);
    move |event: Event| {
        let this = this.clone();
        let body = body.clone();
        async move {
            match this.upgrade() {
                Some(p) => HandlerOutcome::from(body(p, event).await),
                None => HandlerOutcome::Handled,
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{fixtures, Coin};
    use crate::storage::{KvRepository, SqliteStore};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    struct Harness {
        repo: Arc<KvRepository<SqliteStore>>,
        bus: Arc<EventBus>,
        prohibitor: Arc<Prohibitor>,
        events: Arc<Mutex<Vec<(String, String)>>>,
    }

    fn harness() -> Harness {
        let repo = Arc::new(KvRepository::new(SqliteStore::open_in_memory().unwrap()));
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        for topic in [topics::BANNED_COIN_CREATED, topics::BANNED_COIN_DELETED] {
            let events = events.clone();
            bus.subscribe(topic, move |event: Event| {
                let events = events.clone();
                async move {
                    let payload: serde_json::Value = serde_json::from_slice(event.payload()).unwrap();
                    let id = payload["coin_id"].as_str().unwrap().to_string();
                    events.lock().unwrap().push((event.topic().to_string(), id));
                    HandlerOutcome::Handled
                }
            });
        }
        let prohibitor = Prohibitor::new(repo.clone(), bus.clone());
        Harness {
            repo,
            bus,
            prohibitor,
            events,
        }
    }

    fn id(s: &str) -> CoinId {
        CoinId::new(s)
    }

    fn ev(topic: &str, id: &str) -> (String, String) {
        (topic.to_string(), id.to_string())
    }

    #[test]
    fn test_trade_rule_high_price_dominates_thin_history() {
        let trades = fixtures::trades("A", 5, "150000.5", t0());
        assert_eq!(trade_ban_period(&trades).unwrap(), ChronoDuration::days(10));
    }

    #[test]
    fn test_trade_rule_low_price_with_full_history() {
        let trades = fixtures::trades("A", 20, "50", t0());
        assert_eq!(trade_ban_period(&trades).unwrap(), ChronoDuration::days(10));
    }

    #[test]
    fn test_trade_rule_thin_history_only() {
        let trades = fixtures::trades("A", 19, "5000", t0());
        assert_eq!(trade_ban_period(&trades).unwrap(), ChronoDuration::days(1));
    }

    #[test]
    fn test_trade_rule_band_edges_do_not_fire() {
        assert_eq!(
            trade_ban_period(&fixtures::trades("A", 20, "100", t0())).unwrap(),
            ChronoDuration::zero()
        );
        assert_eq!(
            trade_ban_period(&fixtures::trades("A", 20, "100000.99", t0())).unwrap(),
            ChronoDuration::zero()
        );
        assert_eq!(
            trade_ban_period(&fixtures::trades("A", 20, "99.99", t0())).unwrap(),
            ChronoDuration::days(10)
        );
    }

    #[test]
    fn test_trade_rule_bad_price_is_error() {
        let trades = fixtures::trades("A", 20, "n/a", t0());
        assert!(trade_ban_period(&trades).is_err());
    }

    proptest! {
        #[test]
        fn prop_trade_rule_is_max_of_sub_rules(count in 0usize..40, price in 0u64..1_000_000) {
            let trades = fixtures::trades("A", count, &price.to_string(), t0());
            let thin = if count < 20 { ChronoDuration::days(1) } else { ChronoDuration::zero() };
            let band = if count > 0 && (price > 100_000 || price < 100) {
                ChronoDuration::days(10)
            } else {
                ChronoDuration::zero()
            };
            prop_assert_eq!(trade_ban_period(&trades).unwrap(), thin.max(band));
        }
    }

    #[tokio::test]
    async fn test_status_rule_bans_dangerous_coin() {
        let h = harness();
        h.repo.create_coin(&Coin::new("A", true, t0())).unwrap();

        assert!(h.prohibitor.prohibit_by_status(&id("A"), t0()).await.unwrap());

        let ban = h.repo.get_banned_coin(&id("A")).unwrap();
        assert_eq!(ban.period, ChronoDuration::days(1));
        assert_eq!(ban.banned_at, t0());
        assert_eq!(*h.events.lock().unwrap(), vec![ev("banned_coin.created", "A")]);
    }

    #[tokio::test]
    async fn test_status_rule_ignores_safe_or_missing_coin() {
        let h = harness();
        h.repo.create_coin(&Coin::new("SAFE", false, t0())).unwrap();

        assert!(!h.prohibitor.prohibit_by_status(&id("SAFE"), t0()).await.unwrap());
        assert!(!h.prohibitor.prohibit_by_status(&id("MISSING"), t0()).await.unwrap());
        assert!(h.repo.list_banned_coins().unwrap().is_empty());
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_banning_is_idempotent() {
        let h = harness();
        h.repo.create_coin(&Coin::new("A", true, t0())).unwrap();

        assert!(h.prohibitor.prohibit_by_status(&id("A"), t0()).await.unwrap());
        assert!(!h
            .prohibitor
            .prohibit_by_status(&id("A"), t0() + ChronoDuration::hours(1))
            .await
            .unwrap());

        assert_eq!(h.repo.list_banned_coins().unwrap().len(), 1);
        assert_eq!(h.repo.get_banned_coin(&id("A")).unwrap().banned_at, t0());
        assert_eq!(h.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trade_rule_bans_with_computed_period() {
        let h = harness();
        h.repo.save_trades(&fixtures::trades("A", 20, "50", t0())).unwrap();

        assert!(h.prohibitor.prohibit_by_trades(&id("A"), t0()).await.unwrap());
        assert_eq!(
            h.repo.get_banned_coin(&id("A")).unwrap().period,
            ChronoDuration::days(10)
        );
    }

    #[tokio::test]
    async fn test_trade_rule_without_trades_is_noop() {
        let h = harness();
        assert!(!h.prohibitor.prohibit_by_trades(&id("A"), t0()).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_lifts_only_expired_bans() {
        let h = harness();
        let day = ChronoDuration::days(1);
        h.repo.create_banned_coin(&BannedCoin::new(id("OLD"), t0() - day * 2, day)).unwrap();
        h.repo.create_banned_coin(&BannedCoin::new(id("EXACT"), t0() - day, day)).unwrap();
        h.repo.create_banned_coin(&BannedCoin::new(id("ACTIVE"), t0(), day)).unwrap();

        assert_eq!(h.prohibitor.sweep(t0()).await.unwrap(), 2);

        let remaining: Vec<String> = h
            .repo
            .list_banned_coins()
            .unwrap()
            .into_iter()
            .map(|b| b.coin_id.to_string())
            .collect();
        assert_eq!(remaining, vec!["ACTIVE"]);
        assert_eq!(h.events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_allow_missing_ban_is_noop() {
        let h = harness();
        assert!(!h.prohibitor.allow(&id("A")).await.unwrap());
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catch_up_sweeps_then_checks_every_coin() {
        let h = harness();
        let day = ChronoDuration::days(1);
        h.repo.create_banned_coin(&BannedCoin::new(id("EXPIRED"), t0() - day * 3, day)).unwrap();
        h.repo.create_coin(&Coin::new("DANGER", true, t0())).unwrap();
        h.repo.create_coin(&Coin::new("CHEAP", false, t0())).unwrap();
        h.repo.create_coin(&Coin::new("FINE", false, t0())).unwrap();
        h.repo.save_trades(&fixtures::trades("CHEAP", 20, "3", t0())).unwrap();
        h.repo.save_trades(&fixtures::trades("FINE", 20, "5000", t0())).unwrap();

        h.prohibitor.catch_up(t0()).await.unwrap();

        let mut banned: Vec<String> = h
            .repo
            .list_banned_coins()
            .unwrap()
            .into_iter()
            .map(|b| b.coin_id.to_string())
            .collect();
        banned.sort();
        assert_eq!(banned, vec!["CHEAP", "DANGER"]);
    }

    #[tokio::test]
    async fn test_events_drive_transitions() {
        let h = harness();
        h.prohibitor.start(Duration::from_secs(3600)).await.unwrap();
        h.repo.create_coin(&Coin::new("A", true, t0())).unwrap();

        h.bus
            .publish(Event::new(&CoinCreated { coin_id: id("A"), created_at: t0() }).unwrap())
            .await;
        assert!(h.repo.get_banned_coin(&id("A")).is_ok());

        h.bus
            .publish(Event::new(&CoinDeleted { coin_id: id("A"), deleted_at: t0() }).unwrap())
            .await;
        assert!(h.repo.get_banned_coin(&id("A")).unwrap_err().is_not_found());

        h.repo.save_trades(&fixtures::trades("B", 3, "1000", t0())).unwrap();
        h.bus
            .publish(Event::new(&TradesUpdated { coin_id: id("B") }).unwrap())
            .await;
        assert_eq!(
            h.repo.get_banned_coin(&id("B")).unwrap().period,
            ChronoDuration::days(1)
        );

        h.bus
            .publish(Event::new(&TradesDeleted { coin_id: id("B") }).unwrap())
            .await;
        assert!(h.repo.get_banned_coin(&id("B")).unwrap_err().is_not_found());

        assert_eq!(
            *h.events.lock().unwrap(),
            vec![
                ev("banned_coin.created", "A"),
                ev("banned_coin.deleted", "A"),
                ev("banned_coin.created", "B"),
                ev("banned_coin.deleted", "B"),
            ]
        );
        h.prohibitor.stop(Duration::from_secs(1)).await.unwrap();
    }
}
