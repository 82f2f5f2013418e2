mod common;

use common::*;
use payorder_core::models::{OrderId, OrderStatus};
use payorder_core::repository::OrderRepository;
use payorder_core::OrderError;
use payorder_order::memory::RowCounts;
use payorder_order::WriteStage;
use rust_decimal_macros::dec;
use std::collections::HashSet;

#[tokio::test]
async fn test_unbalanced_order_is_rejected_without_writes() {
    let h = harness();
    let mut order = balanced_order();
    order.line_items = vec![item("Servico", dec!(1000))];
    order.allocations = vec![allocation("ADM", dec!(850))];

    let err = h.service.create_order(&order).await.unwrap_err();

    match err {
        OrderError::InvariantViolation { expected, allocated } => {
            assert_eq!(expected, dec!(900));
            assert_eq!(allocated, dec!(850));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.repo.row_counts().await, RowCounts::default());
}

#[tokio::test]
async fn test_order_without_items_is_structural() {
    let h = harness();
    let mut order = balanced_order();
    order.line_items.clear();
    order.allocations.clear();

    let err = h.service.create_order(&order).await.unwrap_err();
    assert!(matches!(err, OrderError::Structural(_)));
    assert_eq!(h.repo.row_counts().await, RowCounts::default());
}

#[tokio::test]
async fn test_sub_cent_amounts_are_rejected_without_writes() {
    let h = harness();
    let mut order = balanced_order();
    order.header.tax_amount = dec!(0);
    order.line_items = vec![item("Clips", dec!(0.005)), item("Elasticos", dec!(0.005))];
    order.allocations = vec![allocation("ADM", dec!(0.01))];

    let err = h.service.create_order(&order).await.unwrap_err();
    assert!(matches!(err, OrderError::Structural(_)));
    assert_eq!(h.repo.row_counts().await, RowCounts::default());
}

#[tokio::test]
async fn test_failed_installment_insert_rolls_back_everything() {
    let h = harness();
    h.repo.fail_at(Some(WriteStage::Installments)).await;

    let err = h.service.create_order(&balanced_order()).await.unwrap_err();

    assert!(matches!(err, OrderError::Transaction(_)));
    assert_eq!(h.repo.row_counts().await, RowCounts::default());
    assert!(h.service.list_pending().await.unwrap().is_empty());

    h.repo.fail_at(None).await;
    let id = h.service.create_order(&balanced_order()).await.unwrap();
    let counts = h.repo.row_counts().await;
    assert_eq!(counts.orders, 1);
    assert_eq!(counts.installments, 2);
    assert!(h.service.order_exists(id).await.unwrap());
}

#[tokio::test]
async fn test_create_then_read_details_round_trips() {
    let h = harness();
    let order = balanced_order();

    let id = h.service.create_order(&order).await.unwrap();
    let details = h.service.get_order_details(id).await.unwrap();

    assert_eq!(details.order_id, id);
    assert_eq!(
        details.line_items.into_iter().collect::<HashSet<_>>(),
        order.line_items.iter().cloned().collect::<HashSet<_>>()
    );
    assert_eq!(
        details.allocations.into_iter().collect::<HashSet<_>>(),
        order.allocations.iter().cloned().collect::<HashSet<_>>()
    );
    assert_eq!(
        details.installments.into_iter().collect::<HashSet<_>>(),
        order.installments.iter().cloned().collect::<HashSet<_>>()
    );
}

#[tokio::test]
async fn test_view_projection() {
    let h = harness();
    let id = h.service.create_order(&balanced_order()).await.unwrap();

    let view = h.service.get_order(id).await.unwrap();

    assert_eq!(view.id, id);
    assert_eq!(view.status, OrderStatus::Open);
    assert_eq!(view.total_amount, dec!(1000));
    assert_eq!(view.tax_amount, dec!(100));
    assert_eq!(view.supplier_name, "ACME PAPELARIA");
    assert_eq!(view.cnpj.as_deref(), Some("12.345.678/0001-90"));
    assert_eq!(view.signatures.len(), 3);
    assert!(view.signatures.iter().all(|s| s.signer.is_none()));
}

#[tokio::test]
async fn test_update_replaces_children() {
    let h = harness();
    let id = h.service.create_order(&balanced_order()).await.unwrap();

    let mut replacement = balanced_order();
    replacement.header.invoice_number = "000999".to_string();
    replacement.header.tax_amount = dec!(0);
    // overlaps one old item on purpose
    replacement.line_items = vec![item("Papel A4", dec!(600)), item("Grampos", dec!(50))];
    replacement.allocations = vec![allocation("ADM-RH", dec!(650))];
    replacement.installments = vec![installment(30, "341")];

    let view = h.service.update_order(id, &replacement).await.unwrap();
    assert_eq!(view.invoice_number, "000999");
    assert_eq!(view.total_amount, dec!(650));

    let details = h.service.get_order_details(id).await.unwrap();
    assert_eq!(details.line_items.len(), 2);
    assert_eq!(
        details.line_items.into_iter().collect::<HashSet<_>>(),
        replacement.line_items.iter().cloned().collect::<HashSet<_>>()
    );
    assert_eq!(details.allocations, replacement.allocations);
    assert_eq!(details.installments, replacement.installments);
}

#[tokio::test]
async fn test_update_leaves_other_orders_alone() {
    let h = harness();
    let first = h.service.create_order(&balanced_order()).await.unwrap();
    let second = h.service.create_order(&balanced_order()).await.unwrap();

    let mut replacement = balanced_order();
    replacement.installments.clear();
    h.service.update_order(first, &replacement).await.unwrap();

    let untouched = h.service.get_order_details(second).await.unwrap();
    assert_eq!(untouched.installments.len(), 2);
    assert_eq!(untouched.line_items.len(), 2);
}

#[tokio::test]
async fn test_failed_update_keeps_previous_state() {
    let h = harness();
    let original = balanced_order();
    let id = h.service.create_order(&original).await.unwrap();

    let mut replacement = balanced_order();
    replacement.header.invoice_number = "777".to_string();
    h.repo.fail_at(Some(WriteStage::LineItems)).await;

    let err = h.service.update_order(id, &replacement).await.unwrap_err();
    assert!(matches!(err, OrderError::Transaction(_)));

    h.repo.fail_at(None).await;
    let view = h.service.get_order(id).await.unwrap();
    assert_eq!(view.invoice_number, original.header.invoice_number);
    let details = h.service.get_order_details(id).await.unwrap();
    assert_eq!(details.line_items.len(), original.line_items.len());
    assert_eq!(details.allocations.len(), original.allocations.len());
}

#[tokio::test]
async fn test_update_unknown_order_is_not_found() {
    let h = harness();
    let err = h
        .service
        .update_order(OrderId(404), &balanced_order())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NotFound(OrderId(404))));
}

#[tokio::test]
async fn test_update_is_validated_too() {
    let h = harness();
    let id = h.service.create_order(&balanced_order()).await.unwrap();

    let mut replacement = balanced_order();
    replacement.allocations.pop();

    let err = h.service.update_order(id, &replacement).await.unwrap_err();
    assert!(matches!(err, OrderError::InvariantViolation { .. }));
    assert_eq!(h.service.get_order_details(id).await.unwrap().allocations.len(), 2);
}

#[tokio::test]
async fn test_unknown_order_reads_are_not_found() {
    let h = harness();
    assert!(matches!(
        h.service.get_order(OrderId(9)).await,
        Err(OrderError::NotFound(OrderId(9)))
    ));
    assert!(matches!(
        h.service.get_order_details(OrderId(9)).await,
        Err(OrderError::NotFound(_))
    ));
    assert!(!h.service.order_exists(OrderId(9)).await.unwrap());
}

#[tokio::test]
async fn test_cancel_keeps_history() {
    let h = harness();
    let id = h.service.create_order(&balanced_order()).await.unwrap();

    let view = h.service.cancel_order(id).await.unwrap();
    assert_eq!(view.status, OrderStatus::Cancelled);

    // children survive a cancellation
    let details = h.service.get_order_details(id).await.unwrap();
    assert_eq!(details.line_items.len(), 2);

    // idempotent
    let again = h.service.cancel_order(id).await.unwrap();
    assert_eq!(again.status, OrderStatus::Cancelled);

    assert!(matches!(
        h.service.cancel_order(OrderId(77)).await,
        Err(OrderError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_pending_lists_open_orders_newest_first() {
    let h = harness();
    let first = h.service.create_order(&balanced_order()).await.unwrap();
    let second = h.service.create_order(&balanced_order()).await.unwrap();
    let third = h.service.create_order(&balanced_order()).await.unwrap();
    let fourth = h.service.create_order(&balanced_order()).await.unwrap();

    for n in 1..=3 {
        h.service.sign(second, "diretor", n).await.unwrap();
    }
    h.service.cancel_order(third).await.unwrap();
    // partially signed orders are still pending
    h.service.sign(fourth, "diretor", 1).await.unwrap();

    let pending: Vec<OrderId> = h
        .service
        .list_pending()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(pending, vec![fourth, first]);
}

#[tokio::test]
async fn test_directory_lookups() {
    let h = harness();

    assert_eq!(
        h.service.lookup_management_accounts(Some("3.1.02")).await.unwrap(),
        vec!["3.1.02"]
    );
    assert_eq!(
        h.service.lookup_management_accounts(Some("3.1")).await.unwrap(),
        vec!["3.1.01", "3.1.02"]
    );
    assert_eq!(h.service.lookup_cost_centers(None).await.unwrap().len(), 3);
    assert_eq!(
        h.service.lookup_suppliers("acme").await.unwrap(),
        vec!["Acme Papelaria - CNPJ 12.345.678/0001-90"]
    );
    assert_eq!(
        h.service.lookup_branches(Some("norte")).await.unwrap(),
        vec!["LOJA NORTE"]
    );
}

#[tokio::test]
async fn test_repository_is_usable_directly() {
    let h = harness();
    let id = h.repo.create(&balanced_order()).await.unwrap();
    // the repository itself does not reconcile; that is the service's job
    assert!(h.repo.get_by_id(id).await.unwrap().is_some());
}
