use chrono::{NaiveDate, NaiveDateTime};
use closerts::adapters::StaticSnapshotSource;
use closerts::config::{InstrumentConfig, StrategyConfig};
use closerts::domain::{
    Bar, Instrument, OrderRequest, OrderSide, OrderStatus, OrderTag, OrderUpdate, PriceSnapshot,
    TimeFrameEvent,
};
use closerts::exchange::{OrderGateway, PaperGateway};
use closerts::strategy::{ActiveTrade, ActiveTradeLedger, DecisionEngine, Gate, GateSchedule};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, day)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

fn strategy() -> StrategyConfig {
    StrategyConfig {
        name: "CloseRts".to_string(),
        instruments: vec![InstrumentConfig {
            code: "RIZ5".to_string(),
            volume: dec!(2),
            price_step: dec!(1),
        }],
        stop_loss_pct: dec!(1),
        take_profit_pct: dec!(2),
        day_rate: dec!(5),
        evening_rate: dec!(3),
        load_active_trades: false,
    }
}

fn snap(price: Decimal) -> Vec<PriceSnapshot> {
    vec![PriceSnapshot {
        code: "RIZ5".to_string(),
        price,
        time: at(4, 18, 45, 0),
    }]
}

/// Prior close 110, evening 100: a gap down, so a last price of 96 buys
fn gap_down_prices() -> StaticSnapshotSource {
    StaticSnapshotSource::new()
        .with_closing(1, snap(dec!(110)))
        .with_evening(0, snap(dec!(100)))
}

fn entry_event(day: u32, last: Decimal) -> TimeFrameEvent {
    TimeFrameEvent::new(at(day, 23, 44, 58))
        .with_bar("RIZ5", Bar::flat(at(day, 23, 44, 0), last))
}

fn exit_event(day: u32) -> TimeFrameEvent {
    TimeFrameEvent::new(at(day, 10, 4, 58))
}

struct Harness {
    engine: DecisionEngine,
    gateway: Arc<PaperGateway>,
    updates: broadcast::Receiver<OrderUpdate>,
}

impl Harness {
    fn new(ledger: ActiveTradeLedger) -> Self {
        let gateway = Arc::new(PaperGateway::new(false));
        let updates = gateway.subscribe();
        let engine = DecisionEngine::new(
            &strategy(),
            GateSchedule::default(),
            ledger,
            Arc::new(gap_down_prices()),
            gateway.clone(),
        )
        .unwrap();
        Self {
            engine,
            gateway,
            updates,
        }
    }

    /// Feed every queued gateway update to the engine
    async fn pump(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            self.engine.on_order_update(&update).await.unwrap();
        }
    }
}

#[tokio::test]
async fn entry_then_next_morning_exit() {
    let mut h = Harness::new(ActiveTradeLedger::new());

    let report = h.engine.on_time_frame(&entry_event(4, dec!(96))).await;
    assert_eq!(report.gate, Some(Gate::Entry));
    assert_eq!(report.submitted.len(), 1);
    let entry_id = report.submitted[0].clone();

    h.pump().await;
    assert_eq!(h.engine.binder().status(&entry_id).await, Some(OrderStatus::Registered));
    assert!(h.engine.ledger().is_empty().await);

    h.gateway.match_order(&entry_id).unwrap();
    h.pump().await;
    assert!(h.engine.ledger().contains("RIZ5").await);
    assert!(!h.engine.pending().contains("RIZ5").await);
    assert_eq!(h.gateway.net_position("RIZ5").await.unwrap(), dec!(2));

    h.gateway.set_quote("RIZ5", Some(dec!(97)), Some(dec!(98)));
    let report = h.engine.on_time_frame(&exit_event(5)).await;
    assert_eq!(report.gate, Some(Gate::TimeExit));
    assert_eq!(report.submitted.len(), 1);
    let exit_id = report.submitted[0].clone();

    let sent = h.gateway.submitted().await;
    let exit = sent.iter().find(|o| o.client_order_id == exit_id).unwrap();
    assert_eq!(exit.side, OrderSide::Sell);
    assert_eq!(exit.price, dec!(97));
    assert_eq!(exit.volume, dec!(2));
    assert_eq!(exit.tag, OrderTag::TimeExit);
    assert_eq!(exit.comment(), "CloseRts, t");

    h.pump().await;
    // registered, not filled yet
    assert!(h.engine.ledger().contains("RIZ5").await);

    h.gateway.match_order(&exit_id).unwrap();
    h.pump().await;
    assert!(h.engine.ledger().is_empty().await);
    assert_eq!(h.gateway.net_position("RIZ5").await.unwrap(), Decimal::ZERO);
    assert!(h.engine.binder().is_empty().await);
}

#[tokio::test]
async fn repeated_exit_fill_clears_ledger_once() {
    let ledger = ActiveTradeLedger::with_trades([ActiveTrade::new("RIZ5", "CloseRts")]);
    let mut h = Harness::new(ledger.clone());
    h.gateway.set_position("RIZ5", dec!(-1));
    h.gateway.set_quote("RIZ5", Some(dec!(97)), Some(dec!(98)));

    let report = h.engine.on_time_frame(&exit_event(5)).await;
    let exit_id = report.submitted[0].clone();
    let exit = h.gateway.submitted().await.remove(0);
    assert_eq!(exit.side, OrderSide::Buy);
    assert_eq!(exit.price, dec!(98));
    h.pump().await;

    let mut changes = ledger.subscribe();
    let matched = OrderUpdate::new(exit_id.as_str(), OrderStatus::Matched);
    h.engine.on_order_update(&matched).await.unwrap();
    let again = h.engine.on_order_update(&matched).await.unwrap();

    assert!(again.is_empty());
    assert!(ledger.is_empty().await);
    assert!(changes.try_recv().is_ok());
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn rejected_entry_is_retried_next_day() {
    let mut h = Harness::new(ActiveTradeLedger::new());

    let first = h.engine.on_time_frame(&entry_event(4, dec!(96))).await;
    let entry_id = first.submitted[0].clone();
    h.pump().await;

    // a second event inside the same gate minute does nothing
    let dup = h.engine.on_time_frame(&entry_event(4, dec!(95))).await;
    assert_eq!(dup.gate, None);

    h.gateway.reject_order(&entry_id, "not enough margin").unwrap();
    h.pump().await;
    assert!(h.engine.ledger().is_empty().await);
    assert!(!h.engine.pending().contains("RIZ5").await);

    let retry = h.engine.on_time_frame(&entry_event(5, dec!(96))).await;
    assert_eq!(retry.gate, Some(Gate::Entry));
    assert_eq!(retry.submitted.len(), 1);
    assert_eq!(h.gateway.submitted().await.len(), 2);
}

#[tokio::test]
async fn working_entry_blocks_a_second_entry() {
    let mut h = Harness::new(ActiveTradeLedger::new());

    h.engine.on_time_frame(&entry_event(4, dec!(96))).await;
    h.pump().await;

    // still registered the next evening
    let next = h.engine.on_time_frame(&entry_event(5, dec!(96))).await;
    assert_eq!(next.gate, Some(Gate::Entry));
    assert!(next.submitted.is_empty());
    assert_eq!(h.gateway.submitted().await.len(), 1);
}

#[tokio::test]
async fn flat_position_exit_sends_nothing() {
    let ledger = ActiveTradeLedger::with_trades([ActiveTrade::new("RIZ5", "CloseRts")]);
    let h = Harness::new(ledger);

    let report = h.engine.on_time_frame(&exit_event(5)).await;
    assert_eq!(report.gate, Some(Gate::TimeExit));
    assert!(report.submitted.is_empty());
    assert!(report.failed.is_empty());
    assert!(h.gateway.submitted().await.is_empty());
    assert!(h.engine.ledger().contains("RIZ5").await);
}

#[tokio::test]
async fn run_loop_applies_fills_between_time_frames() {
    let gateway = Arc::new(PaperGateway::new(true));
    gateway.set_quote("RIZ5", Some(dec!(97)), Some(dec!(98)));
    let updates = gateway.subscribe();
    let engine = Arc::new(
        DecisionEngine::new(
            &strategy(),
            GateSchedule::default(),
            ActiveTradeLedger::new(),
            Arc::new(gap_down_prices()),
            gateway.clone(),
        )
        .unwrap(),
    );

    let (tx, rx) = mpsc::channel(4);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tx.send(entry_event(4, dec!(96))).await.unwrap();
    tx.send(exit_event(5)).await.unwrap();
    drop(tx);

    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(rx, updates, shutdown_rx).await })
    };
    task.await.unwrap().unwrap();

    let sent = gateway.submitted().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].side, OrderSide::Buy);
    assert_eq!(sent[1].side, OrderSide::Sell);
    assert_eq!(sent[1].price, dec!(97));
    assert!(engine.ledger().is_empty().await);
    assert_eq!(gateway.net_position("RIZ5").await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let gateway = Arc::new(PaperGateway::new(false));
    let engine = Arc::new(
        DecisionEngine::new(
            &strategy(),
            GateSchedule::default(),
            ActiveTradeLedger::new(),
            Arc::new(gap_down_prices()),
            gateway.clone(),
        )
        .unwrap(),
    );

    let (_tx, rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = {
        let engine = Arc::clone(&engine);
        let updates = gateway.subscribe();
        tokio::spawn(async move { engine.run(rx, updates, shutdown_rx).await })
    };

    shutdown_tx.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn fill_lost_in_an_update_burst_is_still_recorded() {
    let h = Harness::new(ActiveTradeLedger::new());

    let report = h.engine.on_time_frame(&entry_event(4, dec!(96))).await;
    let entry_id = report.submitted[0].clone();
    h.gateway.match_order(&entry_id).unwrap();

    // more traffic than the update channel holds, before the engine reads any of it
    let other = Instrument::new("SiZ5", dec!(1));
    for _ in 0..300 {
        let request = OrderRequest::limit(
            "Other",
            &other,
            OrderSide::Buy,
            dec!(90000),
            dec!(1),
            OrderTag::Entry,
        );
        h.gateway.submit_order(&request).await.unwrap();
    }

    let (tx, rx) = mpsc::channel(4);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tx.send(entry_event(5, dec!(96))).await.unwrap();
    tx.send(entry_event(6, dec!(96))).await.unwrap();
    drop(tx);

    let Harness {
        engine,
        gateway,
        updates,
    } = h;
    engine.run(rx, updates, shutdown_rx).await.unwrap();

    assert_eq!(gateway.net_position("RIZ5").await.unwrap(), dec!(2));
    assert!(engine.ledger().contains("RIZ5").await);
    assert!(!engine.pending().contains("RIZ5").await);
    let riz5 = gateway
        .submitted()
        .await
        .iter()
        .filter(|o| o.code == "RIZ5")
        .count();
    assert_eq!(riz5, 1);
}
