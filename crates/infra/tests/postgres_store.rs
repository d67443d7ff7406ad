//! Scenario: the commerce pipeline against a real Postgres database.
//!
//! DB-backed tests. Each test returns early (and passes) if `DATABASE_URL` is
//! not set. Records are tagged with a per-test marker so filters do not see
//! rows written by other tests or earlier runs.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use orderlink_infra::{Commerce, CommerceError};
use orderlink_infra::store::{EntityStore, PostgresEntityStore, ProductFilter, StoreError};
use orderlink_orders::OrderDraft;
use orderlink_products::{Product, ProductDraft};

async fn store() -> Option<Arc<PostgresEntityStore>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping Postgres test");
        return None;
    };
    let store = PostgresEntityStore::connect(&url, 8)
        .await
        .expect("failed to connect to Postgres");
    store.migrate().await.expect("db migrate failed");
    Some(Arc::new(store))
}

fn marker(test: &str) -> String {
    format!("{test}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn product(
    commerce: &Commerce<PostgresEntityStore>,
    name: &str,
    price: Decimal,
    stock: i64,
) -> Product {
    commerce
        .create_product(ProductDraft::new(name, "", price, stock).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn link_and_unlink_round_trip() {
    let Some(store) = store().await else { return };
    let commerce = Commerce::new(store);

    let p = product(&commerce, &marker("link"), dec!(5.0), 10).await;
    let o = commerce
        .create_order(OrderDraft::new("postgres order").unwrap())
        .await
        .unwrap();

    let link = commerce.add_product_to_order(o.id, p.id, 4).await.unwrap();
    assert_eq!(link.unit_price.amount(), dec!(5.00));
    assert_eq!(commerce.get_product(p.id).await.unwrap().stock, 6);

    let dup = commerce.add_product_to_order(o.id, p.id, 1).await.unwrap_err();
    assert!(dup.is_conflict());
    assert_eq!(commerce.get_product(p.id).await.unwrap().stock, 6);

    commerce.remove_product_from_order(o.id, p.id).await.unwrap();
    assert_eq!(commerce.get_product(p.id).await.unwrap().stock, 6);
    assert!(
        commerce
            .remove_product_from_order(o.id, p.id)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_links_never_oversell() {
    let Some(store) = store().await else { return };
    let commerce = Commerce::new(store);

    let p = product(&commerce, &marker("race"), dec!(1.00), 10).await;
    let mut handles = Vec::new();
    for i in 0..6 {
        let order = commerce
            .create_order(OrderDraft::new(format!("race order {i}")).unwrap())
            .await
            .unwrap();
        let commerce = commerce.clone();
        let product_id = p.id;
        handles.push(tokio::spawn(async move {
            commerce.add_product_to_order(order.id, product_id, 6).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert!(err.is_conflict(), "unexpected error: {err}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(commerce.get_product(p.id).await.unwrap().stock, 4);
}

#[tokio::test]
async fn filters_bind_user_values_literally() {
    let Some(store) = store().await else { return };
    let commerce = Commerce::new(store);
    let tag = marker("filter");

    product(&commerce, &format!("{tag} a"), dec!(2), 5).await;
    product(&commerce, &format!("{tag} b"), dec!(5), 0).await;
    let third = product(&commerce, &format!("{tag} c"), dec!(7), 3).await;
    product(&commerce, &format!("{tag}%"), dec!(7), 3).await;

    let filter = ProductFilter::new()
        .name_contains(format!("{tag} "))
        .min_price(dec!(3))
        .max_price(dec!(10))
        .min_stock(1);
    let found = commerce.list_products(&filter).await.unwrap();
    assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![third.id]);

    // `%` is matched literally, not as a wildcard.
    let literal = ProductFilter::new().name_contains(format!("{tag}%"));
    assert_eq!(commerce.list_products(&literal).await.unwrap().len(), 1);
}

#[tokio::test]
async fn read_only_transaction_rejects_writes() {
    let Some(store) = store().await else { return };

    let mut tx = store.begin_read_only().await.unwrap();
    let err = tx
        .insert_order(OrderDraft::new("never stored").unwrap(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ReadOnly("insert_order")));
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn tombstoned_product_stays_visible_through_joins() {
    let Some(store) = store().await else { return };
    let commerce = Commerce::new(store);

    let p = product(&commerce, &marker("tombstone"), dec!(3.50), 2).await;
    let o = commerce
        .create_order(OrderDraft::new("tombstone order").unwrap())
        .await
        .unwrap();
    commerce.add_product_to_order(o.id, p.id, 1).await.unwrap();
    commerce.delete_product(p.id).await.unwrap();

    assert!(commerce.get_product(p.id).await.unwrap_err().is_not_found());
    let lines = commerce.lines_for_order(o.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].product.deleted_at.is_some());
}

#[tokio::test]
async fn out_of_range_numbers_are_validation_errors() {
    let Some(store) = store().await else { return };
    let commerce = Commerce::new(store);

    let p = product(&commerce, &marker("bounds"), dec!(9999999999.99), 5).await;
    assert_eq!(commerce.get_product(p.id).await.unwrap().price.amount(), dec!(9999999999.99));
    assert!(ProductDraft::new("Pricey", "", dec!(100000000000.00), 1).is_err());

    let err = commerce.adjust_stock(p.id, i64::MAX).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)), "unexpected error: {err:?}");
    assert_eq!(commerce.get_product(p.id).await.unwrap().stock, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_order_deletes_tombstone_once() {
    let Some(store) = store().await else { return };
    let commerce = Commerce::new(store);

    for _ in 0..25 {
        let o = commerce
            .create_order(OrderDraft::new("contested delete").unwrap())
            .await
            .unwrap();
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let commerce = commerce.clone();
                let order_id = o.id;
                tokio::spawn(async move { commerce.delete_order(order_id).await })
            })
            .collect();

        let mut deleted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => deleted += 1,
                Err(err) => assert!(err.is_not_found(), "unexpected error: {err}"),
            }
        }
        assert_eq!(deleted, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn update_racing_delete_never_resurrects() {
    let Some(store) = store().await else { return };
    let commerce = Commerce::new(store);

    for _ in 0..25 {
        let o = commerce
            .create_order(OrderDraft::new("contested update").unwrap())
            .await
            .unwrap();
        let order_id = o.id;
        let delete = {
            let commerce = commerce.clone();
            tokio::spawn(async move { commerce.delete_order(order_id).await })
        };
        let update = {
            let commerce = commerce.clone();
            tokio::spawn(async move {
                commerce
                    .update_order(order_id, OrderDraft::new("renamed").unwrap())
                    .await
            })
        };

        delete.await.unwrap().unwrap();
        if let Err(err) = update.await.unwrap() {
            assert!(err.is_not_found(), "unexpected error: {err}");
        }
        assert!(commerce.get_order(order_id).await.unwrap_err().is_not_found());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn link_racing_order_delete_never_targets_a_tombstone() {
    let Some(store) = store().await else { return };
    let commerce = Commerce::new(store);
    let p = product(&commerce, &marker("link-delete"), dec!(1.00), 1_000).await;

    for _ in 0..25 {
        let o = commerce
            .create_order(OrderDraft::new("contested link").unwrap())
            .await
            .unwrap();
        let order_id = o.id;
        let product_id = p.id;
        let delete = {
            let commerce = commerce.clone();
            tokio::spawn(async move { commerce.delete_order(order_id).await })
        };
        let link = {
            let commerce = commerce.clone();
            tokio::spawn(async move { commerce.add_product_to_order(order_id, product_id, 1).await })
        };

        delete.await.unwrap().unwrap();
        let linked = match link.await.unwrap() {
            Ok(association) => association.linked_at,
            Err(err) => {
                assert!(err.is_not_found(), "unexpected error: {err}");
                continue;
            }
        };
        // A link that got through was committed before the tombstone.
        assert!(commerce.lines_for_order(order_id).await.unwrap_err().is_not_found());
        let orders = commerce.orders_for_product(product_id).await.unwrap();
        let tombstoned = orders.iter().find(|order| order.id == order_id).unwrap();
        assert!(tombstoned.deleted_at.unwrap() >= linked);
    }
}
