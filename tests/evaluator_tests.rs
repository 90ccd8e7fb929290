//! Evaluator and depth-curve laws over synthesized books.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use spreadrunner::domain::{DepthCurve, PriceLevel};
use spreadrunner::engine::{Evaluator, EvaluatorConfig, FeeSchedule};
use spreadrunner::testkit::{bingx_book, mexc_book};

fn evaluator(min_profit_quote: Decimal, min_profit_pct: Decimal) -> Evaluator {
    Evaluator::new(
        EvaluatorConfig {
            min_profit_quote,
            min_profit_pct,
            max_base_per_trade: dec!(10),
            max_slippage_bps: dec!(200),
            fees: FeeSchedule::zero(),
        },
        dec!(0.0001),
    )
}

#[test]
fn emitted_plans_satisfy_the_profit_floor() {
    // Sweep balances and thresholds; every emitted plan must clear both
    // the absolute and the percentage floor it was configured with.
    let buy = mexc_book(&[("39990", "2")], &[("40000", "2")], 1);
    let sell = bingx_book(
        &[("40100", "0.5"), ("40050", "0.5"), ("40025", "1")],
        &[("40120", "1")],
        1,
    );

    for min_quote in [dec!(1), dec!(25), dec!(60)] {
        for min_pct in [dec!(0), dec!(0.05), dec!(0.15)] {
            for balance in [dec!(4000), dec!(20000), dec!(40000), dec!(90000)] {
                let result = evaluator(min_quote, min_pct).evaluate(&buy, &sell, balance);
                if let Ok(plan) = result {
                    assert!(
                        plan.expected_profit >= min_quote,
                        "profit {} under floor {min_quote}",
                        plan.expected_profit
                    );
                    assert!(
                        plan.profit_bps >= min_pct * dec!(100),
                        "bps {} under floor {}",
                        plan.profit_bps,
                        min_pct * dec!(100)
                    );
                }
            }
        }
    }
}

#[test]
fn plan_vwap_is_bounded_by_touched_prices() {
    let buy = mexc_book(&[], &[("40000", "5")], 1);
    let sell = bingx_book(
        &[("40100", "0.5"), ("40050", "0.5"), ("40025", "2")],
        &[],
        1,
    );

    for balance in [dec!(10000), dec!(40000), dec!(120000)] {
        if let Ok(plan) = evaluator(dec!(1), dec!(0)).evaluate(&buy, &sell, balance) {
            assert!(plan.expected_sell_vwap <= dec!(40100));
            assert!(plan.expected_sell_vwap >= dec!(40025));
        }
    }
}

#[test]
fn proceeds_for_exact_level_boundaries_are_exact_sums() {
    // Consuming exactly the top k levels must equal the literal sum.
    let levels = vec![
        PriceLevel::new(dec!(40100), dec!(0.5)),
        PriceLevel::new(dec!(40050), dec!(0.25)),
        PriceLevel::new(dec!(40000), dec!(1.25)),
    ];
    let curve = DepthCurve::from_side(&levels);

    let expected = [
        (dec!(0.5), dec!(0.5) * dec!(40100)),
        (dec!(0.75), dec!(0.5) * dec!(40100) + dec!(0.25) * dec!(40050)),
        (
            dec!(2),
            dec!(0.5) * dec!(40100) + dec!(0.25) * dec!(40050) + dec!(1.25) * dec!(40000),
        ),
    ];
    for (size, proceeds) in expected {
        let fill = curve.fill_for_base(size).unwrap();
        assert_eq!(fill.quote, proceeds);
        assert_eq!(fill.base, size);
        assert!(!fill.depth_limited);
    }
}

#[test]
fn depth_limited_size_never_exceeds_the_ladder() {
    let levels = vec![
        PriceLevel::new(dec!(40100), dec!(0.3)),
        PriceLevel::new(dec!(40050), dec!(0.2)),
    ];
    let curve = DepthCurve::from_side(&levels);

    let fill = curve.fill_for_base(dec!(9)).unwrap();
    assert!(fill.depth_limited);
    assert_eq!(fill.base, dec!(0.5));
    assert_eq!(fill.quote, dec!(0.3) * dec!(40100) + dec!(0.2) * dec!(40050));
}

#[test]
fn plan_candidate_is_bounded_by_every_constraint() {
    let buy = mexc_book(&[], &[("40000", "5")], 1);
    let sell = bingx_book(&[("40100", "0.4")], &[], 1);

    // Depth (0.4) binds against a huge balance and a 10 BTC cap.
    let plan = evaluator(dec!(1), dec!(0))
        .evaluate(&buy, &sell, dec!(1000000))
        .unwrap();
    assert_eq!(plan.base_amount, dec!(0.4));

    // Balance binds when it affords less than the depth.
    let plan = evaluator(dec!(1), dec!(0))
        .evaluate(&buy, &sell, dec!(8000))
        .unwrap();
    assert_eq!(plan.base_amount, dec!(0.2));
}
