//! Margin trading core simulation.
//!
//! Walks the engine through the full lifecycle: market and pending orders,
//! quote-driven repricing, take profit, and a stop-out cascade.

use margin_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Margin Trading Core Simulation");
    println!("Single Instrument, Cross Margin, Full Lifecycle\n");

    scenario_1_market_order();
    scenario_2_pending_trigger();
    scenario_3_take_profit();
    scenario_4_stop_out();

    println!("\nAll simulations completed successfully.");
}

struct Sim {
    engine: TradingEngine,
    venue: Arc<InMemoryVenue>,
    dispatcher: Arc<RecordingDispatcher>,
    events: Arc<EventCollector>,
}

fn setup(balance: Decimal) -> Sim {
    let config = Arc::new(demo_config());
    let accounts = Arc::new(AccountRegistry::new());
    accounts.init(vec![MarginAccount::new(
        ClientId(1),
        AccountId(1),
        TradingConditionId(1),
        AssetId(1),
        balance,
    )]);

    let quotes = Arc::new(QuoteCache::new());
    let venue = Arc::new(InMemoryVenue::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let events = Arc::new(EventCollector::new());

    let engine = TradingEngine::new(
        config,
        accounts,
        quotes,
        venue.clone(),
        dispatcher.clone(),
        events.clone(),
    );
    Sim {
        engine,
        venue,
        dispatcher,
        events,
    }
}

fn quote(bid: Decimal, ask: Decimal) -> InstrumentBidAskPair {
    InstrumentBidAskPair {
        instrument: InstrumentId(1),
        bid,
        ask,
        timestamp: Timestamp::now(),
    }
}

fn market_buy(volume: Decimal) -> OrderRequest {
    OrderRequest {
        client_id: ClientId(1),
        account_id: AccountId(1),
        instrument: InstrumentId(1),
        volume: SignedVolume::new(volume),
        kind: OrderKind::Market,
        expected_open_price: None,
        take_profit: None,
        stop_loss: None,
        fill_policy: FillPolicy::FillOrKill,
        validity: None,
        parent_order_id: None,
        parent_position_id: None,
    }
}

/// Market order against configured liquidity.
fn scenario_1_market_order() {
    println!("Scenario 1: Market Order Execution\n");

    let sim = setup(dec!(10000));
    sim.engine.on_quote(quote(dec!(1.1995), dec!(1.2005))).unwrap();
    sim.venue.set_liquidity(
        InstrumentId(1),
        vec![
            LiquidityLevel { price: dec!(1.2005), volume: dec!(60000) },
            LiquidityLevel { price: dec!(1.2010), volume: dec!(100000) },
        ],
    );

    let order = sim.engine.place_order(market_buy(dec!(100000))).unwrap();
    println!("  BUY 100,000 @ market");
    println!("  Status: {:?}, open price: {}", order.status, order.open_price);

    let account = sim.engine.accounts().get(ClientId(1), AccountId(1)).unwrap();
    println!(
        "  Used margin: {}, margin level: {}\n",
        account.fpl.figures().used_margin,
        account.margin_level()
    );
}

/// Pending sell that waits for its trigger price.
fn scenario_2_pending_trigger() {
    println!("Scenario 2: Pending Order Trigger\n");

    let sim = setup(dec!(10000));
    sim.engine.on_quote(quote(dec!(1.1900), dec!(1.1910))).unwrap();
    sim.venue.set_liquidity(
        InstrumentId(1),
        vec![LiquidityLevel { price: dec!(1.2000), volume: dec!(200000) }],
    );

    let mut request = market_buy(dec!(-50000));
    request.kind = OrderKind::Limit;
    request.expected_open_price = Some(dec!(1.2000));
    request.fill_policy = FillPolicy::PartialFill;

    let order = sim.engine.place_order(request).unwrap();
    println!("  Pending SELL 50,000 @ 1.2000, status: {:?}", order.status);

    sim.engine.on_quote(quote(dec!(1.1950), dec!(1.1960))).unwrap();
    println!("  Bid 1.1950: still {:?}", sim.engine.find_order(order.id).unwrap().status);

    sim.engine.on_quote(quote(dec!(1.2001), dec!(1.2011))).unwrap();
    let order = sim.engine.find_order(order.id).unwrap();
    println!("  Bid 1.2001: {:?} @ {}\n", order.status, order.open_price);
}

/// Take profit closes the position and realizes the gain.
fn scenario_3_take_profit() {
    println!("Scenario 3: Take Profit\n");

    let sim = setup(dec!(10000));
    sim.engine.on_quote(quote(dec!(1.1995), dec!(1.2005))).unwrap();
    sim.venue.set_liquidity(
        InstrumentId(1),
        vec![LiquidityLevel { price: dec!(1.2005), volume: dec!(400000) }],
    );

    let mut request = market_buy(dec!(100000));
    request.take_profit = Some(dec!(1.2100));
    let order = sim.engine.place_order(request).unwrap();
    println!("  BUY 100,000 @ {}, TP 1.2100", order.open_price);

    sim.venue.set_liquidity(
        InstrumentId(1),
        vec![LiquidityLevel { price: dec!(1.2100), volume: dec!(400000) }],
    );
    sim.engine.on_quote(quote(dec!(1.2100), dec!(1.2110))).unwrap();

    let closed = sim.engine.find_order(order.id).unwrap();
    let account = sim.engine.accounts().get(ClientId(1), AccountId(1)).unwrap();
    println!(
        "  Bid reaches 1.2100: {:?} ({:?}), balance: {}\n",
        closed.status,
        closed.close_reason,
        account.balance()
    );
}

/// Falling prices push the account through margin call into stop out.
fn scenario_4_stop_out() {
    println!("Scenario 4: Stop Out Cascade\n");

    let sim = setup(dec!(1300));
    sim.engine.on_quote(quote(dec!(1.1995), dec!(1.2005))).unwrap();
    sim.venue.set_liquidity(
        InstrumentId(1),
        vec![LiquidityLevel { price: dec!(1.2005), volume: dec!(400000) }],
    );

    sim.engine.place_order(market_buy(dec!(100000))).unwrap();
    println!("  BUY 100,000 on a 1,300 balance (leverage 100)");

    for (bid, ask) in [
        (dec!(1.1960), dec!(1.1970)),
        (dec!(1.1930), dec!(1.1940)),
        (dec!(1.1900), dec!(1.1910)),
    ] {
        sim.engine.on_quote(quote(bid, ask)).unwrap();
        let account = sim.engine.accounts().get(ClientId(1), AccountId(1)).unwrap();
        println!(
            "  Bid {}: margin level {}, risk {:?}",
            bid,
            account.margin_level().round_dp(4),
            account.risk_level()
        );
    }

    let commands = sim.dispatcher.commands();
    println!("  Liquidation commands queued: {}", commands.len());
    println!("  Events generated: {}", sim.events.events().len());
}
