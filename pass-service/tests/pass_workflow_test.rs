//! Live-database tests for the transactional add/remove workflows.
//!
//! These need a running PostgreSQL. Point `PASS_TEST_DATABASE_URL` at a
//! scratch database and run with `cargo test -- --ignored`.

use chrono::NaiveDate;
use pass_service::models::{
    BoardingPass, CreateBoardingPass, CreatePassInstallment, CreateProduct, PassStatus,
};
use pass_service::services::Database;
use rust_decimal::Decimal;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn test_database() -> Database {
    let url = std::env::var("PASS_TEST_DATABASE_URL")
        .expect("PASS_TEST_DATABASE_URL must point at a scratch database");
    let database = Database::new(&url, 5, 1).await.expect("connect");
    database.run_migrations().await.expect("migrate");
    database
}

async fn seed_partial_pass(database: &Database, tenant_id: Uuid) -> BoardingPass {
    let product = database
        .create_product(&CreateProduct {
            tenant_id,
            name: "Quarterly pass".to_string(),
            description: None,
            category: "permanent".to_string(),
            price: dec("900"),
            active: true,
            valid_from: Some(date(2025, 1, 1)),
            valid_to: Some(date(2025, 12, 31)),
            partial_payments_enabled: true,
            installment_count: Some(3),
            installment_valid_from: Some(date(2025, 1, 1)),
            installment_valid_to: Some(date(2025, 12, 31)),
        })
        .await
        .expect("create product");

    database
        .create_pass(&CreateBoardingPass {
            tenant_id,
            user_id: Uuid::new_v4(),
            product_id: product.product_id,
            status: PassStatus::Partial,
            amount: Decimal::ZERO,
            amount_paid: Decimal::ZERO,
            valid_from: Some(date(2025, 1, 1)),
            valid_to: None,
            partial_payments_enabled: true,
        })
        .await
        .expect("create pass")
}

fn installment_input(
    pass: &BoardingPass,
    sequence_number: i32,
    amount: &str,
    starts_on: NaiveDate,
    ends_on: NaiveDate,
) -> CreatePassInstallment {
    CreatePassInstallment {
        installment_id: Uuid::new_v4(),
        pass_id: pass.pass_id,
        sequence_number,
        amount: dec(amount),
        starts_on,
        ends_on,
    }
}

#[tokio::test]
#[ignore = "needs a running PostgreSQL (PASS_TEST_DATABASE_URL)"]
async fn concurrent_adds_serialize_on_the_pass_row() {
    let database = test_database().await;
    let tenant_id = Uuid::new_v4();
    let pass = seed_partial_pass(&database, tenant_id).await;

    let first = installment_input(&pass, 1, "300", date(2025, 1, 1), date(2025, 5, 1));
    let second = installment_input(&pass, 2, "300", date(2025, 5, 1), date(2025, 9, 1));

    let (a, b) = tokio::join!(
        database.add_pass_installment(tenant_id, &first),
        database.add_pass_installment(tenant_id, &second),
    );
    a.expect("first add");
    b.expect("second add");

    // Both reconciliations landed: neither totals write overwrote the other.
    let reloaded = database
        .get_pass(tenant_id, pass.pass_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.partial_payment_total, dec("600"));
    assert_eq!(reloaded.amount_paid, dec("600"));
    assert_eq!(reloaded.valid_to, Some(date(2025, 9, 1)));
}

#[tokio::test]
#[ignore = "needs a running PostgreSQL (PASS_TEST_DATABASE_URL)"]
async fn duplicate_add_conflicts_without_touching_totals() {
    let database = test_database().await;
    let tenant_id = Uuid::new_v4();
    let pass = seed_partial_pass(&database, tenant_id).await;

    let row = installment_input(&pass, 1, "300", date(2025, 1, 1), date(2025, 5, 1));
    database
        .add_pass_installment(tenant_id, &row)
        .await
        .expect("first add");

    // Same sequence number again: the unique index rejects it inside the
    // transaction, so neither the insert nor a totals write survives.
    let duplicate = installment_input(&pass, 1, "300", date(2025, 1, 1), date(2025, 5, 1));
    let result = database.add_pass_installment(tenant_id, &duplicate).await;
    assert!(result.is_err());

    let reloaded = database
        .get_pass(tenant_id, pass.pass_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.partial_payment_total, dec("300"));
    assert_eq!(
        database
            .list_pass_installments(pass.pass_id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
#[ignore = "needs a running PostgreSQL (PASS_TEST_DATABASE_URL)"]
async fn add_then_remove_round_trips_the_stored_pass() {
    let database = test_database().await;
    let tenant_id = Uuid::new_v4();
    let pass = seed_partial_pass(&database, tenant_id).await;

    let row = installment_input(&pass, 1, "300", date(2025, 1, 1), date(2025, 5, 1));
    let (after_add, installment) = database
        .add_pass_installment(tenant_id, &row)
        .await
        .expect("add");
    assert_eq!(after_add.valid_to, Some(date(2025, 5, 1)));

    let (after_remove, removed, remaining) = database
        .remove_pass_installment(tenant_id, pass.pass_id, installment.installment_id, None)
        .await
        .expect("remove");

    assert_eq!(removed.installment_id, installment.installment_id);
    assert!(remaining.is_empty());
    assert_eq!(after_remove.partial_payment_total, Decimal::ZERO);
    assert_eq!(after_remove.amount_paid, Decimal::ZERO);
    assert_eq!(after_remove.valid_to, None);
    assert_eq!(after_remove.active_installment_id, None);
}
