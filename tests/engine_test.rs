// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine public API integration tests.

use potion_shop::{
    Barrel, CapacityResource, CartId, CartStatus, Customer, Engine, EntryType, ErrorCategory,
    ShopConfig, ShopError, Sku, TimeId, VisitId,
};

fn engine() -> Engine {
    Engine::new(ShopConfig::default()).unwrap()
}

fn rich_engine(gold: i64) -> Engine {
    Engine::new(ShopConfig {
        initial_gold: gold,
        ..ShopConfig::default()
    })
    .unwrap()
}

fn customer(name: &str) -> Customer {
    Customer {
        customer_name: name.to_string(),
        character_class: "Ranger".to_string(),
        level: 5,
    }
}

fn free_barrel(color: [i64; 4], ml: i64) -> Barrel {
    Barrel {
        sku: "TEST_BARREL".to_string(),
        ml_per_barrel: ml,
        potion_type: color,
        price: 0,
        quantity: 1,
    }
}

/// Stocks single-color potions by delivering free barrels and bottling them.
fn stock(engine: &Engine, sku: &str, quantity: u32) {
    let color = match sku {
        "RED_POTION" => [1, 0, 0, 0],
        "GREEN_POTION" => [0, 1, 0, 0],
        "BLUE_POTION" => [0, 0, 1, 0],
        "DARK_POTION" => [0, 0, 0, 1],
        other => panic!("no single-color recipe for {other}"),
    };
    let now = engine.current_time().unwrap();
    engine
        .deliver_barrels(&[free_barrel(color, i64::from(quantity) * 100)], now)
        .unwrap();
    engine
        .bottle_potions(&Sku::from(sku), quantity, now)
        .unwrap();
}

fn open_cart(engine: &Engine, name: &str) -> CartId {
    let now = engine.current_time().unwrap();
    let visit = engine.record_visit(1, &[customer(name)], now).unwrap();
    engine.create_cart(customer(name), now, visit).unwrap()
}

fn set(engine: &Engine, cart: CartId, sku: &str, quantity: u32) -> Result<(), ShopError> {
    let now = engine.current_time().unwrap();
    engine.set_item_quantity(cart, &Sku::from(sku), quantity, now)
}

fn checkout(engine: &Engine, cart: CartId) -> Result<potion_shop::CheckoutResult, ShopError> {
    let now = engine.current_time().unwrap();
    engine.checkout(cart, "gold", now)
}

fn quantity(engine: &Engine, sku: &str) -> i64 {
    engine.potion(&Sku::from(sku)).unwrap().current_quantity
}

#[test]
fn checkout_charges_and_decrements() {
    let engine = engine();
    stock(&engine, "RED_POTION", 3);
    stock(&engine, "GREEN_POTION", 2);
    let gold_before = engine.state().unwrap().gold;
    let entries_before = engine.ledger().unwrap().len();

    let cart = open_cart(&engine, "Ada");
    set(&engine, cart, "RED_POTION", 2).unwrap();
    set(&engine, cart, "GREEN_POTION", 1).unwrap();
    let result = checkout(&engine, cart).unwrap();

    assert_eq!(result.total_gold_paid, 150);
    assert_eq!(result.total_potions_bought, 3);
    assert_eq!(quantity(&engine, "RED_POTION"), 1);
    assert_eq!(quantity(&engine, "GREEN_POTION"), 1);
    assert_eq!(engine.state().unwrap().gold, gold_before + 150);

    let ledger = engine.ledger().unwrap();
    // The visit adds a zero-valued entry before the checkout.
    assert_eq!(ledger.len(), entries_before + 2);
    let checkouts: Vec<_> = ledger
        .iter()
        .filter(|entry| entry.entry_type == EntryType::CartCheckout)
        .collect();
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].gold_change, 150);
    assert_eq!(checkouts[0].potion_change, -3);

    let cart = engine.cart(cart).unwrap();
    assert_eq!(cart.status, CartStatus::CheckedOut);
    assert_eq!(cart.payment_method.as_deref(), Some("gold"));
    assert_eq!(engine.line_items().len(), 2);
}

#[test]
fn insufficient_stock_changes_nothing() {
    let engine = engine();
    stock(&engine, "RED_POTION", 3);
    stock(&engine, "BLUE_POTION", 1);

    let cart = open_cart(&engine, "Brom");
    set(&engine, cart, "RED_POTION", 2).unwrap();
    set(&engine, cart, "BLUE_POTION", 2).unwrap();

    let potions = engine.potions();
    let snapshot = engine.snapshot().unwrap();
    let ledger = engine.ledger().unwrap();

    let err = checkout(&engine, cart).unwrap_err();
    assert_eq!(
        err,
        ShopError::InsufficientStock {
            sku: Sku::from("BLUE_POTION"),
            requested: 2,
            available: 1,
        }
    );
    assert_eq!(err.category(), ErrorCategory::InsufficientStock);

    assert_eq!(engine.potions(), potions);
    assert_eq!(engine.snapshot().unwrap(), snapshot);
    assert_eq!(engine.ledger().unwrap(), ledger);
    assert!(engine.line_items().is_empty());
    assert_eq!(engine.cart(cart).unwrap().status, CartStatus::Open);
}

#[test]
fn zero_quantity_on_missing_line_is_noop() {
    let engine = engine();
    let cart = open_cart(&engine, "Cid");

    set(&engine, cart, "RED_POTION", 0).unwrap();
    assert!(engine.cart_items(cart).unwrap().is_empty());
}

#[test]
fn zero_quantity_removes_line() {
    let engine = engine();
    let cart = open_cart(&engine, "Cid");

    set(&engine, cart, "RED_POTION", 2).unwrap();
    set(&engine, cart, "RED_POTION", 5).unwrap();
    let items = engine.cart_items(cart).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 5);

    set(&engine, cart, "RED_POTION", 0).unwrap();
    assert!(engine.cart_items(cart).unwrap().is_empty());
}

#[test]
fn setting_items_does_not_touch_inventory() {
    let engine = engine();
    let cart = open_cart(&engine, "Dee");
    let snapshot = engine.snapshot().unwrap();
    let entries = engine.ledger().unwrap().len();

    set(&engine, cart, "TEAL_POTION", 4).unwrap();
    assert_eq!(engine.snapshot().unwrap(), snapshot);
    assert_eq!(engine.ledger().unwrap().len(), entries);
}

#[test]
fn checked_out_cart_is_terminal() {
    let engine = engine();
    stock(&engine, "DARK_POTION", 1);
    let cart = open_cart(&engine, "Eve");
    set(&engine, cart, "DARK_POTION", 1).unwrap();
    checkout(&engine, cart).unwrap();

    assert_eq!(
        set(&engine, cart, "DARK_POTION", 2),
        Err(ShopError::CartAlreadyCheckedOut(cart))
    );
    assert_eq!(
        checkout(&engine, cart),
        Err(ShopError::CartAlreadyCheckedOut(cart))
    );
    assert_eq!(engine.state().unwrap().gold, 150);
}

#[test]
fn empty_cart_cannot_check_out() {
    let engine = engine();
    let cart = open_cart(&engine, "Fin");
    let err = checkout(&engine, cart).unwrap_err();
    assert_eq!(err, ShopError::EmptyCart(cart));
    assert_eq!(err.category(), ErrorCategory::InvalidState);
}

#[test]
fn unknown_references_are_not_found() {
    let engine = engine();
    let now = engine.current_time().unwrap();
    let cart = open_cart(&engine, "Gus");

    assert_eq!(
        set(&engine, CartId(404), "RED_POTION", 1),
        Err(ShopError::CartNotFound(CartId(404)))
    );
    assert_eq!(
        set(&engine, cart, "MUD_POTION", 1),
        Err(ShopError::UnknownSku(Sku::from("MUD_POTION")))
    );
    assert_eq!(
        engine.create_cart(customer("Gus"), TimeId(9_999), VisitId(1)),
        Err(ShopError::InvalidTimeReference(TimeId(9_999)))
    );
    assert_eq!(
        engine.create_cart(customer("Gus"), now, VisitId(404)),
        Err(ShopError::VisitNotFound(VisitId(404)))
    );
    assert_eq!(
        checkout(&engine, CartId(404)).unwrap_err().category(),
        ErrorCategory::NotFound
    );
}

#[test]
fn reset_restores_initial_state() {
    let engine = engine();
    stock(&engine, "RED_POTION", 4);
    let cart = open_cart(&engine, "Hal");
    set(&engine, cart, "RED_POTION", 1).unwrap();
    checkout(&engine, cart).unwrap();
    engine.set_current_time("Soulday", 12).unwrap();

    engine.reset().unwrap();

    let state = engine.state().unwrap();
    assert_eq!(state.gold, 100);
    assert_eq!(state.total_potions, 0);
    assert_eq!(state.total_ml, 0);

    let ledger = engine.ledger().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].entry_type, EntryType::AdminChange);
    assert_eq!(ledger[0].gold_change, 100);

    assert_eq!(engine.cart(cart), Err(ShopError::CartNotFound(cart)));
    assert_eq!(engine.latest_visit(), Err(ShopError::NoVisitRecorded));
    assert!(engine.line_items().is_empty());
    assert_eq!(engine.current_time(), Ok(TimeId(1)));
    assert_eq!(engine.active_strategy().unwrap().name, "PREMIUM");

    let potions = engine.potions();
    let skus: Vec<&str> = potions.iter().map(|potion| potion.sku.as_str()).collect();
    assert_eq!(
        skus,
        [
            "BLUE_POTION",
            "DARK_POTION",
            "GREEN_POTION",
            "PURPLE_POTION",
            "RED_POTION",
            "TEAL_POTION",
            "YELLOW_POTION",
        ]
    );
    assert!(potions.iter().all(|potion| potion.current_quantity == 0));
    assert!(engine.verify_reset_state());
}

#[test]
fn reconciliation_holds_after_mixed_operations() {
    let engine = rich_engine(5_000);
    let now = engine.current_time().unwrap();
    engine.purchase_capacity(1, 1, now).unwrap();
    engine
        .deliver_barrels(
            &[
                Barrel {
                    sku: "MEDIUM_RED_BARREL".to_string(),
                    ml_per_barrel: 2_500,
                    potion_type: [1, 0, 0, 0],
                    price: 250,
                    quantity: 2,
                },
                Barrel {
                    sku: "MEDIUM_BLUE_BARREL".to_string(),
                    ml_per_barrel: 2_500,
                    potion_type: [0, 0, 1, 0],
                    price: 300,
                    quantity: 1,
                },
            ],
            now,
        )
        .unwrap();
    engine.bottle_potions(&Sku::from("PURPLE_POTION"), 20, now).unwrap();
    engine.bottle_potions(&Sku::from("RED_POTION"), 10, now).unwrap();

    let cart = open_cart(&engine, "Ivy");
    set(&engine, cart, "PURPLE_POTION", 3).unwrap();
    set(&engine, cart, "RED_POTION", 1).unwrap();
    checkout(&engine, cart).unwrap();

    let reconciliation = engine.reconcile().unwrap();
    assert!(
        reconciliation.is_consistent(),
        "{:?}",
        reconciliation.discrepancies
    );
    let state = engine.snapshot().unwrap();
    assert_eq!(state.gold, 5_000 - 2_000 - 800 + 200);
    assert_eq!(state.red_ml, 5_000 - 1_000 - 1_000);
    assert_eq!(state.blue_ml, 2_500 - 1_000);
    assert_eq!(state.total_potions, 26);
    assert_eq!(state.potion_capacity_units, 2);

    let ids: Vec<u64> = engine
        .ledger()
        .unwrap()
        .iter()
        .map(|entry| entry.entry_id.0)
        .collect();
    assert_eq!(ids, (1..=ids.len() as u64).collect::<Vec<_>>());
}

#[test]
fn barrel_over_capacity_is_rejected() {
    let engine = engine();
    let now = engine.current_time().unwrap();
    let before = engine.snapshot().unwrap();

    let err = engine
        .deliver_barrels(&[free_barrel([0, 1, 0, 0], 10_001)], now)
        .unwrap_err();
    assert!(matches!(
        err,
        ShopError::CapacityExceeded(exceeded) if exceeded.resource == CapacityResource::Ml
    ));
    assert_eq!(engine.snapshot().unwrap(), before);
    assert_eq!(engine.ledger().unwrap().len(), 1);
}

#[test]
fn bottling_over_capacity_is_rejected() {
    let engine = engine();
    let now = engine.current_time().unwrap();
    engine
        .deliver_barrels(&[free_barrel([1, 0, 0, 0], 6_000)], now)
        .unwrap();
    let before = engine.snapshot().unwrap();

    let err = engine
        .bottle_potions(&Sku::from("RED_POTION"), 51, now)
        .unwrap_err();
    assert!(matches!(
        err,
        ShopError::CapacityExceeded(exceeded) if exceeded.resource == CapacityResource::Potions
    ));
    assert_eq!(engine.snapshot().unwrap(), before);
    assert_eq!(quantity(&engine, "RED_POTION"), 0);
}

#[test]
fn barrels_need_gold() {
    let engine = engine();
    let now = engine.current_time().unwrap();
    let barrel = Barrel {
        price: 101,
        ..free_barrel([1, 0, 0, 0], 100)
    };
    assert_eq!(
        engine.deliver_barrels(&[barrel], now),
        Err(ShopError::InsufficientGold {
            needed: 101,
            available: 100
        })
    );
}

#[test]
fn catalog_lists_best_stocked_first() {
    let engine = engine();
    stock(&engine, "RED_POTION", 3);
    stock(&engine, "GREEN_POTION", 5);

    let catalog = engine.catalog();
    assert_eq!(catalog.len(), 6);
    assert_eq!(catalog[0].sku, Sku::from("GREEN_POTION"));
    assert_eq!(catalog[0].quantity, 5);
    assert_eq!(catalog[0].potion_type, [0, 100, 0, 0]);
    assert_eq!(catalog[1].sku, Sku::from("RED_POTION"));
    assert_eq!(catalog[2].sku, Sku::from("BLUE_POTION"));
    assert!(catalog.iter().all(|item| item.price == 50));
}

#[test]
fn strategies_can_be_switched() {
    let engine = engine();
    let now = engine.current_time().unwrap();
    engine.activate_strategy("VALUE", now).unwrap();
    assert_eq!(engine.active_strategy().unwrap().name, "VALUE");
    assert_eq!(
        engine.activate_strategy("HOARD", now),
        Err(ShopError::StrategyNotFound("HOARD".to_string()))
    );
    assert!(!engine.verify_reset_state());
}
