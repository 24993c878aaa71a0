use chrono::Duration;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::binder::{HookAction, OrderLifecycleBinder};
use super::decision::{decide_entry, plan_time_exit, protective_stop, Thresholds};
use super::gate::{Gate, GateLatch, GateSchedule};
use super::ledger::ActiveTradeLedger;
use super::pending::PendingEntries;
use crate::adapters::PriceSnapshotSource;
use crate::config::StrategyConfig;
use crate::domain::{
    Instrument, OrderRequest, OrderTag, OrderUpdate, SnapshotMap, TimeFrameEvent, VolumeTable,
};
use crate::error::{CloseRtsError, Result};
use crate::exchange::OrderGateway;

/// Sessions back for the prior-day close
const PRIOR_CLOSE_SESSIONS_AGO: u32 = 1;
/// Sessions back for today's evening close
const EVENING_SESSIONS_AGO: u32 = 0;

/// Outcome of one time-frame event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Gate that ran, None when the event matched no gate or the gate already fired today
    pub gate: Option<Gate>,
    /// Client order ids submitted during the cycle
    pub submitted: Vec<String>,
    /// Instruments skipped because of an error
    pub failed: Vec<String>,
}

impl CycleReport {
    fn for_gate(gate: Gate) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }
}

/// Time-gated decision engine
pub struct DecisionEngine {
    name: String,
    instruments: Vec<Instrument>,
    volumes: VolumeTable,
    thresholds: Thresholds,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
    schedule: GateSchedule,
    latch: Mutex<GateLatch>,
    ledger: ActiveTradeLedger,
    pending: Arc<PendingEntries>,
    binder: OrderLifecycleBinder,
    prices: Arc<dyn PriceSnapshotSource>,
    gateway: Arc<dyn OrderGateway>,
}

impl DecisionEngine {
    /// Create a new decision engine
    pub fn new(
        config: &StrategyConfig,
        schedule: GateSchedule,
        ledger: ActiveTradeLedger,
        prices: Arc<dyn PriceSnapshotSource>,
        gateway: Arc<dyn OrderGateway>,
    ) -> Result<Self> {
        let instruments = config.instruments();
        let volumes = config.volume_table()?;
        if let Some(missing) = instruments.iter().find(|i| volumes.get(&i.code).is_none()) {
            return Err(CloseRtsError::Validation(format!(
                "no volume configured for {}",
                missing.code
            )));
        }

        let pending = Arc::new(PendingEntries::new());
        let binder =
            OrderLifecycleBinder::new(config.name.clone(), ledger.clone(), Arc::clone(&pending));

        Ok(Self {
            name: config.name.clone(),
            instruments,
            volumes,
            thresholds: config.thresholds(),
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            schedule,
            latch: Mutex::new(GateLatch::new()),
            ledger,
            pending,
            binder,
            prices,
            gateway,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ledger(&self) -> &ActiveTradeLedger {
        &self.ledger
    }

    pub fn pending(&self) -> &PendingEntries {
        &self.pending
    }

    pub fn binder(&self) -> &OrderLifecycleBinder {
        &self.binder
    }

    /// True when orders go to a simulated venue
    pub fn is_dry_run(&self) -> bool {
        self.gateway.is_dry_run()
    }

    /// Log parameters and the prior-day closes the entry gate will use
    pub async fn log_startup(&self) {
        if self.is_dry_run() {
            info!("{} running in DRY RUN mode, orders stay on the paper gateway", self.name);
        }
        info!(
            "{} starting: stop-loss {}%, take-profit {}%, day rate {} pt, evening rate {} pt",
            self.name,
            self.stop_loss_pct,
            self.take_profit_pct,
            self.thresholds.day_rate,
            self.thresholds.evening_rate
        );
        info!(
            "Gates: time exit at {}, entry at {}",
            self.schedule.exit_at().format("%H:%M"),
            self.schedule.entry_at().format("%H:%M")
        );

        match self.prices.closing_prices(PRIOR_CLOSE_SESSIONS_AGO).await {
            Ok(closing) => {
                for instrument in &self.instruments {
                    match closing.get(&instrument.code) {
                        Some(snap) => info!(
                            "Prior close {}: {} at {}",
                            instrument.code, snap.price, snap.time
                        ),
                        None => warn!("Prior close {}: not available", instrument.code),
                    }
                }
            }
            Err(e) => error!("Could not read prior-day closing prices: {}", e),
        }
    }

    /// Handle one time-frame event. Errors are contained per instrument.
    pub async fn on_time_frame(&self, event: &TimeFrameEvent) -> CycleReport {
        let Some(gate) = self.schedule.classify(event.market_time) else {
            return CycleReport::default();
        };

        let day = self.schedule.trading_day(event.market_time);
        if !self.latch.lock().await.try_fire(gate, day) {
            debug!(
                "{} gate already fired on {}, ignoring event at {}",
                gate, day, event.market_time
            );
            return CycleReport::default();
        }

        match gate {
            Gate::TimeExit => self.run_time_exit().await,
            Gate::Entry => self.run_entry(event).await,
        }
    }

    /// Apply an order lifecycle notification
    pub async fn on_order_update(&self, update: &OrderUpdate) -> Result<Vec<HookAction>> {
        self.binder.dispatch(update).await
    }

    async fn run_time_exit(&self) -> CycleReport {
        let mut report = CycleReport::for_gate(Gate::TimeExit);

        for instrument in &self.instruments {
            if self.ledger.count(&instrument.code).await == 0 {
                continue;
            }

            info!(
                "TIME EXIT {}: market time {}, exiting at market",
                instrument.code,
                self.schedule.exit_at().format("%H:%M")
            );
            match self.exit_by_time(instrument).await {
                Ok(Some(order_id)) => report.submitted.push(order_id),
                Ok(None) => {}
                Err(e) => {
                    error!("TIME EXIT {}: {}", instrument.code, e);
                    report.failed.push(instrument.code.clone());
                }
            }
        }

        report
    }

    /// Flatten the instrument's position against the opposing best price
    async fn exit_by_time(&self, instrument: &Instrument) -> Result<Option<String>> {
        let position = self.gateway.net_position(&instrument.code).await?;
        let Some(plan) = plan_time_exit(position) else {
            debug!("TIME EXIT {}: flat, nothing to exit", instrument.code);
            return Ok(None);
        };

        let best = if plan.hits_bid() {
            self.gateway.best_bid(&instrument.code).await?
        } else {
            self.gateway.best_ask(&instrument.code).await?
        };
        let price = best.ok_or_else(|| CloseRtsError::QuoteUnavailable {
            code: instrument.code.clone(),
        })?;

        let request = OrderRequest::limit(
            &self.name,
            instrument,
            plan.side,
            price,
            plan.volume,
            OrderTag::TimeExit,
        );
        info!(
            "TIME EXIT {}: registering {} {} @ {}",
            instrument.code, request.side, request.volume, request.price
        );

        self.submit_bound(&request).await?;
        Ok(Some(request.client_order_id))
    }

    async fn run_entry(&self, event: &TimeFrameEvent) -> CycleReport {
        let mut report = CycleReport::for_gate(Gate::Entry);

        let mut candidates = Vec::new();
        for instrument in &self.instruments {
            if self.ledger.count(&instrument.code).await != 0 {
                continue;
            }
            if !self.pending.try_reserve(&instrument.code).await {
                debug!("ENTRY {}: entry order already pending", instrument.code);
                continue;
            }
            candidates.push(instrument);
        }

        if candidates.is_empty() {
            return report;
        }

        let closing = self
            .fetch_session(
                "prior-day closing",
                self.prices.closing_prices(PRIOR_CLOSE_SESSIONS_AGO),
            )
            .await;
        let evening = self
            .fetch_session("evening-session", self.prices.evening_prices(EVENING_SESSIONS_AGO))
            .await;

        for instrument in candidates {
            info!(
                "ENTRY {}: market time {}, checking day and evening gaps",
                instrument.code,
                self.schedule.entry_at().format("%H:%M")
            );
            match self.evaluate_entry(instrument, event, &closing, &evening).await {
                Ok(Some(order_id)) => report.submitted.push(order_id),
                Ok(None) => {
                    self.pending.release(&instrument.code).await;
                }
                Err(e) => {
                    self.pending.release(&instrument.code).await;
                    error!("ENTRY {}: {}", instrument.code, e);
                    report.failed.push(instrument.code.clone());
                }
            }
        }

        report
    }

    async fn fetch_session(
        &self,
        label: &str,
        fetch: impl std::future::Future<Output = Result<SnapshotMap>>,
    ) -> SnapshotMap {
        match fetch.await {
            Ok(map) => map,
            Err(e) => {
                warn!("Could not read {} prices: {}", label, e);
                SnapshotMap::new()
            }
        }
    }

    async fn evaluate_entry(
        &self,
        instrument: &Instrument,
        event: &TimeFrameEvent,
        closing: &SnapshotMap,
        evening: &SnapshotMap,
    ) -> Result<Option<String>> {
        let code = &instrument.code;
        let close = closing.get(code).ok_or_else(|| {
            CloseRtsError::MarketDataUnavailable(format!("no prior-day close for {}", code))
        })?;
        let evening = evening.get(code).ok_or_else(|| {
            CloseRtsError::MarketDataUnavailable(format!("no evening-session close for {}", code))
        })?;
        let last = event.last_close(code).ok_or_else(|| {
            CloseRtsError::MarketDataUnavailable(format!("no last bar for {}", code))
        })?;

        info!(
            "ENTRY {}: prior close {}, evening close {}, last {}",
            code, close.price, evening.price, last
        );

        let Some(decision) = decide_entry(close.price, evening.price, last, &self.thresholds)
        else {
            debug!("ENTRY {}: no signal", code);
            return Ok(None);
        };

        let volume = self.volumes.volume_for(code)?;
        let request = OrderRequest::limit(
            &self.name,
            instrument,
            decision.side,
            last,
            volume,
            OrderTag::Entry,
        )
        .with_expiry(event.market_time + Duration::days(1));
        let stop = protective_stop(instrument, decision.side, request.price, self.stop_loss_pct);

        info!(
            "ENTRY {}: registering {} {} @ {} ({:?}), stop at {}",
            code, request.side, request.volume, request.price, decision.branch, stop
        );

        self.pending.attach(code, &request.client_order_id).await;
        self.submit_bound(&request).await?;
        Ok(Some(request.client_order_id))
    }

    /// Bind lifecycle hooks, then submit. The binding is dropped if submission fails.
    async fn submit_bound(&self, request: &OrderRequest) -> Result<()> {
        self.binder.bind(request).await;
        match self.gateway.submit_order(request).await {
            Ok(venue_id) => {
                debug!(
                    "Order {} accepted by gateway as {}",
                    request.client_order_id, venue_id
                );
                Ok(())
            }
            Err(e) => {
                self.binder.unbind(&request.client_order_id).await;
                Err(e)
            }
        }
    }

    async fn handle_update(&self, update: &OrderUpdate) {
        if let Err(e) = self.on_order_update(update).await {
            warn!("Order update for {} not applied: {}", update.order_id, e);
        }
    }

    /// Re-read the status of every tracked order from the gateway and apply
    /// any change the update stream did not deliver. Returns how many orders
    /// moved.
    pub async fn reconcile_orders(&self) -> usize {
        let mut applied = 0;
        for (order_id, known) in self.binder.live_orders().await {
            let status = match self.gateway.order_status(&order_id).await {
                Ok(Some(status)) => status,
                Ok(None) => {
                    warn!("Order {} unknown to the gateway", order_id);
                    continue;
                }
                Err(e) => {
                    error!("Could not read status of order {}: {}", order_id, e);
                    continue;
                }
            };
            if status == known {
                continue;
            }

            info!("Order {} is {} at the gateway, was {}", order_id, status, known);
            match self.on_order_update(&OrderUpdate::new(order_id.as_str(), status)).await {
                Ok(_) => applied += 1,
                Err(e) => warn!("Order {} not reconciled: {}", order_id, e),
            }
        }
        applied
    }

    /// Main run loop.
    ///
    /// Order updates already queued are applied before the next time-frame
    /// event. Returns when the time-frame stream ends or shutdown is
    /// signalled; dropping the shutdown sender also stops the loop.
    pub async fn run(
        &self,
        mut time_frames: mpsc::Receiver<TimeFrameEvent>,
        mut updates: broadcast::Receiver<OrderUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("{} engine running", self.name);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutting down {} engine", self.name);
                        break;
                    }
                }
                update = updates.recv() => match update {
                    Ok(update) => self.handle_update(&update).await,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Missed {} order updates, reconciling with the gateway", n);
                        self.reconcile_orders().await;
                    }
                    Err(RecvError::Closed) => {
                        error!("Order update channel closed");
                        return Err(CloseRtsError::ChannelClosed("order updates".to_string()));
                    }
                },
                event = time_frames.recv() => match event {
                    Some(event) => {
                        let report = self.on_time_frame(&event).await;
                        if let Some(gate) = report.gate {
                            info!(
                                "{} gate done: {} submitted, {} failed",
                                gate,
                                report.submitted.len(),
                                report.failed.len()
                            );
                        }
                    }
                    None => {
                        info!("Time-frame stream ended");
                        break;
                    }
                },
            }
        }

        self.drain_updates(&mut updates).await;
        Ok(())
    }

    /// Apply whatever updates are still queued
    async fn drain_updates(&self, updates: &mut broadcast::Receiver<OrderUpdate>) {
        loop {
            match updates.try_recv() {
                Ok(update) => self.handle_update(&update).await,
                Err(TryRecvError::Lagged(n)) => {
                    warn!("Missed {} order updates, reconciling with the gateway", n);
                    self.reconcile_orders().await;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}
