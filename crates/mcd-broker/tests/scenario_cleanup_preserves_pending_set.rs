//! Scenario: cleanup removes exactly the resolved orders, once, and keeps
//! the survivors in placement order.
//!
//! # Invariants under test
//!
//! 1. Steps with no fills leave the pending set identical — cleanup is
//!    idempotent.
//! 2. When some orders resolve and some do not, survivors keep their
//!    relative order.
//! 3. An order's status never leaves a terminal state across any number of
//!    later steps.

use mcd_broker::{marks, Account, Broker, FeeSchedule, Micros, OrderId, StepContext, StepId};

fn ctx(step: usize, close: i64) -> StepContext {
    StepContext::new(
        StepId::new(step),
        marks([("close", Micros::from_whole(close))]),
    )
}

fn broker() -> Broker {
    Broker::new(
        vec![
            Account::cash("USD", Micros::from_whole(10_000)),
            Account::priced("BTC", Micros::from_whole(10), "close"),
        ],
        FeeSchedule::zero(),
    )
    .unwrap()
}

fn pending_ids(b: &Broker) -> Vec<OrderId> {
    b.pending_orders().iter().map(|o| o.id).collect()
}

#[test]
fn no_fills_leave_the_pending_set_untouched() {
    let mut b = broker();
    let c0 = ctx(0, 100);
    b.process_step(&c0).unwrap();

    // None of these cross at mark 100.
    b.buy_limit(&c0, "BTC", "USD", Micros::from_whole(80), Micros::from_whole(1))
        .unwrap()
        .unwrap();
    b.buy_limit(&c0, "BTC", "USD", Micros::from_whole(85), Micros::from_whole(1))
        .unwrap()
        .unwrap();
    b.sell_limit(&c0, "BTC", "USD", Micros::from_whole(120), Micros::from_whole(1))
        .unwrap()
        .unwrap();

    let ids = pending_ids(&b);
    assert_eq!(ids.len(), 3);

    b.process_step(&ctx(1, 100)).unwrap();
    assert_eq!(pending_ids(&b), ids);

    b.process_step(&ctx(2, 100)).unwrap();
    assert_eq!(pending_ids(&b), ids);
}

#[test]
fn survivors_keep_their_relative_order() {
    let mut b = broker();
    let c0 = ctx(0, 100);
    b.process_step(&c0).unwrap();

    let deep_buy = b
        .buy_limit(&c0, "BTC", "USD", Micros::from_whole(70), Micros::from_whole(1))
        .unwrap()
        .unwrap();
    let near_buy = b
        .buy_limit(&c0, "BTC", "USD", Micros::from_whole(95), Micros::from_whole(1))
        .unwrap()
        .unwrap();
    let high_sell = b
        .sell_limit(&c0, "BTC", "USD", Micros::from_whole(130), Micros::from_whole(1))
        .unwrap()
        .unwrap();

    // Mark 95 fills only the near buy; the deep buy and the sell survive
    // in their original order.
    b.process_step(&ctx(1, 95)).unwrap();
    assert_eq!(pending_ids(&b), vec![deep_buy, high_sell]);
    assert!(b.order(near_buy).is_none());
}

#[test]
fn terminal_orders_stay_terminal() {
    let mut b = broker();
    let c0 = ctx(0, 100);
    b.process_step(&c0).unwrap();

    let id = b
        .buy_limit(&c0, "BTC", "USD", Micros::from_whole(95), Micros::from_whole(1))
        .unwrap()
        .unwrap();

    b.process_step(&ctx(1, 95)).unwrap(); // fills and cleans
    assert!(b.order(id).is_none());

    // Later marks that would "cross" again change nothing: the order is
    // gone and BTC was credited exactly once.
    let btc_after_fill = b
        .balance(&ctx(1, 95), "BTC")
        .unwrap();
    for step in 2..5 {
        b.process_step(&ctx(step, 95)).unwrap();
    }
    let c4 = ctx(4, 95);
    assert_eq!(b.balance(&c4, "BTC").unwrap(), btc_after_fill);
}
