#![allow(dead_code)]

use chrono::NaiveDate;
use payorder_core::models::{
    CostCenterAllocation, InstallmentEntry, LineItem, OrderHeader, PaymentOrder, SlotNumber,
};
use payorder_core::supplier::Supplier;
use payorder_order::{InMemoryDirectory, InMemoryOrderRepository, OrderService, SlotSecrets};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub fn slot(n: i64) -> SlotNumber {
    SlotNumber::try_from(n).unwrap()
}

pub fn secrets() -> SlotSecrets {
    SlotSecrets::new([
        "slot-one-secret".to_string(),
        "slot-two-secret".to_string(),
        "slot-three-secret".to_string(),
    ])
}

pub fn header() -> OrderHeader {
    OrderHeader {
        branch: "LOJA CENTRO".to_string(),
        supplier: Supplier::new("Acme Papelaria", Some("12.345.678/0001-90".to_string())),
        management_account: "3.1.02".to_string(),
        invoice_number: "000123".to_string(),
        invoice_series: "1".to_string(),
        payment_method: "BOLETO".to_string(),
        installment_count: 2,
        item_count: 2,
        tax_amount: dec!(100),
        posting_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        note: Some("material de escritorio".to_string()),
        posting_type: "DESPESA".to_string(),
        created_by: "ana".to_string(),
    }
}

pub fn item(name: &str, amount: Decimal) -> LineItem {
    LineItem {
        product_name: name.to_string(),
        amount,
        cost_center_ref: "ADM".to_string(),
    }
}

pub fn allocation(cost_center: &str, amount: Decimal) -> CostCenterAllocation {
    CostCenterAllocation {
        cost_center: cost_center.to_string(),
        amount,
    }
}

pub fn installment(day: u32, bank: &str) -> InstallmentEntry {
    InstallmentEntry {
        due_date: NaiveDate::from_ymd_opt(2024, 4, day).unwrap(),
        bank: bank.to_string(),
        branch_code: "0001".to_string(),
        account: "12345-6".to_string(),
        pix_type: Some("CNPJ".to_string()),
        pix_key: Some("12345678000190".to_string()),
    }
}

/// Items 600 + 400, tax 100, allocations 500 + 400.
pub fn balanced_order() -> PaymentOrder {
    PaymentOrder {
        header: header(),
        line_items: vec![item("Papel A4", dec!(600)), item("Toner", dec!(400))],
        allocations: vec![allocation("ADM", dec!(500)), allocation("COMERCIAL", dec!(400))],
        installments: vec![installment(10, "001"), installment(25, "001")],
    }
}

pub struct Harness {
    pub repo: Arc<InMemoryOrderRepository>,
    pub service: OrderService,
}

pub fn harness() -> Harness {
    let directory = InMemoryDirectory::new()
        .with_management_accounts(["3.1.01", "3.1.02", "4.2.10"])
        .with_cost_centers(["ADM", "ADM-RH", "COMERCIAL"])
        .with_suppliers([
            Supplier::new("Acme Papelaria", Some("12.345.678/0001-90".to_string())),
            Supplier::new("Transportes Silva", None),
        ])
        .with_branches(["Loja Centro", "Loja Norte"])
        .grant("diretor", slot(1))
        .grant("diretor", slot(2))
        .grant("diretor", slot(3))
        .grant("gerente", slot(1));
    harness_with(directory)
}

pub fn harness_with(directory: InMemoryDirectory) -> Harness {
    let repo = Arc::new(InMemoryOrderRepository::new());
    let directory = Arc::new(directory);
    let service = OrderService::new(repo.clone(), directory.clone(), directory, secrets());
    Harness { repo, service }
}
