//! Integration test: deposit, price aggregation, and withdrawal.
//!
//! Exercises the complete accounting lifecycle:
//! 1. Bootstrap deposit at a validated price
//! 2. Observation recording as prices move (2000 -> 2100 -> 2200)
//! 3. TWAP over the buffered window
//! 4. Full withdrawal within floor-rounding tolerance
//! 5. Event emission ordering and exactly-once discipline
//!
//! This test uses caldera-vault, caldera-oracle, and caldera-types.

use caldera_oracle::{pipeline::PricePipeline, source::FixedSource, validator::OracleConfig};
use caldera_types::{events::VaultEvent, price::Price, AccountId};
use caldera_vault::{auth::SingleAdmin, ledger::InMemoryLedger, vault::Vault};

const ADMIN: AccountId = 99;
const ALICE: AccountId = 1;

/// Base timestamp for test scenarios.
const BASE_TIME: u64 = 1_700_000_000;
const HOUR: u64 = 3600;

fn oracle_config() -> OracleConfig {
    OracleConfig {
        max_staleness_secs: HOUR,
        max_deviation_bps: 500,
        min_price: Price::from_units(1),
        max_price: Price::from_units(1_000_000),
        grace_period_secs: 2 * HOUR,
        fallback_extends_baseline: false,
    }
}

fn vault_with_primary(units: u64, updated_at: u64) -> Vault<InMemoryLedger, SingleAdmin> {
    let pipeline = PricePipeline::new(
        Box::new(FixedSource::with_price(Price::from_units(units), updated_at)),
        Box::new(FixedSource::new()),
        oracle_config(),
    )
    .expect("pipeline config should validate");
    let mut ledger = InMemoryLedger::new();
    ledger.credit(ALICE, 1_000_000);
    Vault::new(ledger, SingleAdmin::new(ADMIN), pipeline)
}

#[test]
fn deposit_track_prices_withdraw() {
    let mut vault = vault_with_primary(2000, BASE_TIME);

    // 1. Bootstrap: 1000 assets at price 2000 mint exactly 1000 shares.
    let shares = vault
        .deposit(ALICE, 1000, BASE_TIME)
        .expect("bootstrap deposit");
    assert_eq!(shares, 1000);

    // 2. Prices advance hourly: 2100, then 2200 (each within the 5%
    //    deviation gate of the previous observation).
    vault
        .set_sources(
            ADMIN,
            Box::new(FixedSource::with_price(
                Price::from_units(2100),
                BASE_TIME + HOUR,
            )),
            Box::new(FixedSource::new()),
        )
        .expect("set sources");
    vault
        .validated_price(BASE_TIME + HOUR)
        .expect("record 2100");

    vault
        .set_sources(
            ADMIN,
            Box::new(FixedSource::with_price(
                Price::from_units(2200),
                BASE_TIME + 2 * HOUR,
            )),
            Box::new(FixedSource::new()),
        )
        .expect("set sources");
    vault
        .validated_price(BASE_TIME + 2 * HOUR)
        .expect("record 2200");

    // 3. TWAP over the 2-hour window sits strictly between the endpoints.
    let twap = vault
        .twap(BASE_TIME + 2 * HOUR, 2 * HOUR)
        .expect("twap over buffered window");
    assert!(twap > Price::from_units(2000), "twap {twap} too low");
    assert!(twap < Price::from_units(2200), "twap {twap} too high");
    assert_eq!(twap, Price::from_units(2150)); // 2100 and 2200, an hour each

    // 4. Full withdrawal at the final price returns the deposit within
    //    floor tolerance (sole depositor: exactly).
    let assets = vault
        .withdraw(ALICE, 1000, BASE_TIME + 2 * HOUR)
        .expect("withdraw all");
    assert!(assets <= 1000, "withdraw manufactured value");
    assert!(assets >= 999, "withdraw lost more than rounding");
    assert_eq!(vault.total_shares(), 0);
    assert_eq!(vault.assets().balance_of(ALICE), 1_000_000 - 1000 + assets);
}

#[test]
fn event_stream_matches_transitions() {
    let mut vault = vault_with_primary(2000, BASE_TIME);
    vault
        .deposit(ALICE, 1000, BASE_TIME)
        .expect("bootstrap deposit");

    let events = vault.take_events();
    assert_eq!(events.len(), 2, "one price append, one deposit");
    match &events[0] {
        VaultEvent::PriceUpdated {
            price,
            timestamp,
            cumulative_price,
        } => {
            assert_eq!(*price, Price::from_units(2000));
            assert_eq!(*timestamp, BASE_TIME);
            assert_eq!(*cumulative_price, 0, "first observation starts at 0");
        }
        other => panic!("expected PriceUpdated, got {other:?}"),
    }
    match &events[1] {
        VaultEvent::Deposit {
            account,
            assets,
            shares,
            price_used,
        } => {
            assert_eq!(*account, ALICE);
            assert_eq!(*assets, 1000);
            assert_eq!(*shares, 1000);
            assert_eq!(*price_used, Price::from_units(2000));
        }
        other => panic!("expected Deposit, got {other:?}"),
    }

    // Events serialize with snake_case tags for downstream consumers.
    let json = serde_json::to_string(&events[1]).expect("serialize event");
    assert!(json.contains(r#""event":"deposit""#));

    // A second drain yields nothing; a failed operation adds nothing.
    assert!(vault.take_events().is_empty());
    vault.deposit(ALICE, 0, BASE_TIME).expect_err("zero deposit");
    assert!(vault.take_events().is_empty());
}

#[test]
fn snapshot_survives_restart_mid_lifecycle() {
    let mut vault = vault_with_primary(2000, BASE_TIME);
    vault
        .deposit(ALICE, 1000, BASE_TIME)
        .expect("bootstrap deposit");

    let json = serde_json::to_string(&vault.snapshot()).expect("serialize snapshot");
    let snapshot = serde_json::from_str(&json).expect("deserialize snapshot");

    let mut restored = Vault::restore(
        snapshot,
        vault.assets().clone(),
        SingleAdmin::new(ADMIN),
        Box::new(FixedSource::with_price(
            Price::from_units(2050),
            BASE_TIME + HOUR,
        )),
        Box::new(FixedSource::new()),
    )
    .expect("restore");

    // The restored vault carries the deviation baseline: a 2050 reading is
    // judged against the persisted 2000 observation and accepted.
    let price = restored
        .validated_price(BASE_TIME + HOUR)
        .expect("resolve after restore");
    assert_eq!(price, Price::from_units(2050));
    assert_eq!(restored.share_balance(ALICE), 1000);

    let assets = restored
        .withdraw(ALICE, 1000, BASE_TIME + HOUR)
        .expect("withdraw after restore");
    assert!(assets >= 999 && assets <= 1000);
}
