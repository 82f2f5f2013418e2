use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::supplier::Supplier;
use crate::OrderError;

/// Database-assigned payment order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(OrderError::structural(format!("'{}' is not a valid order id", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(OrderStatus::Open),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItem {
    pub product_name: String,
    pub amount: Decimal,
    pub cost_center_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CostCenterAllocation {
    pub cost_center: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallmentEntry {
    pub due_date: NaiveDate,
    pub bank: String,
    pub branch_code: String,
    pub account: String,
    pub pix_type: Option<String>,
    pub pix_key: Option<String>,
}

/// Header fields of a payment order, everything except the child collections
/// and the signature slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub branch: String,
    pub supplier: Supplier,
    pub management_account: String,
    pub invoice_number: String,
    pub invoice_series: String,
    pub payment_method: String,
    pub installment_count: i32,
    pub item_count: i32,
    pub tax_amount: Decimal,
    pub posting_date: NaiveDate,
    pub note: Option<String>,
    pub posting_type: String,
    pub created_by: String,
}

/// Inbound order payload: header plus the three owned child collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub header: OrderHeader,
    pub line_items: Vec<LineItem>,
    pub allocations: Vec<CostCenterAllocation>,
    pub installments: Vec<InstallmentEntry>,
}

/// One of the three approval positions on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SlotNumber(u8);

impl SlotNumber {
    pub const ALL: [SlotNumber; 3] = [SlotNumber(1), SlotNumber(2), SlotNumber(3)];

    pub fn get(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<i64> for SlotNumber {
    type Error = OrderError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1..=3 => Ok(SlotNumber(value as u8)),
            other => Err(OrderError::InvalidSlot(other)),
        }
    }
}

impl From<SlotNumber> for i64 {
    fn from(slot: SlotNumber) -> Self {
        i64::from(slot.0)
    }
}

impl fmt::Display for SlotNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureSlot {
    #[default]
    Empty,
    Signed {
        token: String,
        signer: String,
        signed_at: DateTime<Utc>,
    },
}

impl SignatureSlot {
    /// Rebuild a slot from its three nullable columns. Anything short of a
    /// complete triple reads as empty.
    pub fn from_columns(
        token: Option<String>,
        signer: Option<String>,
        signed_at: Option<DateTime<Utc>>,
    ) -> Self {
        match (token, signer, signed_at) {
            (Some(token), Some(signer), Some(signed_at)) if !token.is_empty() => {
                SignatureSlot::Signed {
                    token,
                    signer,
                    signed_at,
                }
            }
            _ => SignatureSlot::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SignatureSlot::Empty)
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            SignatureSlot::Empty => None,
            SignatureSlot::Signed { token, .. } => Some(token),
        }
    }
}

/// Fixed-cardinality set of signature slots carried by every order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Signatures([SignatureSlot; 3]);

impl Signatures {
    pub fn new(slots: [SignatureSlot; 3]) -> Self {
        Self(slots)
    }

    pub fn slot(&self, slot: SlotNumber) -> &SignatureSlot {
        &self.0[slot.index()]
    }

    pub fn set(&mut self, slot: SlotNumber, value: SignatureSlot) {
        self.0[slot.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotNumber, &SignatureSlot)> {
        SlotNumber::ALL.into_iter().zip(self.0.iter())
    }

    /// An order is pending while any slot is still empty.
    pub fn is_pending(&self) -> bool {
        self.0.iter().any(SignatureSlot::is_empty)
    }
}

/// Display projection of a signature slot. Tokens are never projected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureView {
    pub slot: SlotNumber,
    pub signer: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
}

/// Read projection returned by `get_by_id`, `list_pending` and searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub status: OrderStatus,
    pub branch: String,
    pub supplier_name: String,
    pub cnpj: Option<String>,
    pub management_account: String,
    pub invoice_number: String,
    pub invoice_series: String,
    pub payment_method: String,
    pub installment_count: i32,
    pub item_count: i32,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub posting_date: NaiveDate,
    pub note: Option<String>,
    pub posting_type: String,
    pub created_by: String,
    pub signatures: Vec<SignatureView>,
}

impl OrderView {
    /// Apply the display transforms: uppercase supplier and signer names and
    /// split the supplier identity.
    pub fn project(
        id: OrderId,
        status: OrderStatus,
        header: &OrderHeader,
        total_amount: Decimal,
        signatures: &Signatures,
    ) -> Self {
        let signatures = signatures
            .iter()
            .map(|(slot, state)| match state {
                SignatureSlot::Empty => SignatureView {
                    slot,
                    signer: None,
                    signed_at: None,
                },
                SignatureSlot::Signed {
                    signer, signed_at, ..
                } => SignatureView {
                    slot,
                    signer: Some(signer.to_uppercase()),
                    signed_at: Some(*signed_at),
                },
            })
            .collect();

        Self {
            id,
            status,
            branch: header.branch.clone(),
            supplier_name: header.supplier.display_name(),
            cnpj: header.supplier.cnpj.clone(),
            management_account: header.management_account.clone(),
            invoice_number: header.invoice_number.clone(),
            invoice_series: header.invoice_series.clone(),
            payment_method: header.payment_method.clone(),
            installment_count: header.installment_count,
            item_count: header.item_count,
            tax_amount: header.tax_amount,
            total_amount,
            posting_date: header.posting_date,
            note: header.note.clone(),
            posting_type: header.posting_type.clone(),
            created_by: header.created_by.clone(),
            signatures,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.signatures.iter().any(|s| s.signer.is_none())
    }
}

/// Child collections of an order as currently stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order_id: OrderId,
    pub line_items: Vec<LineItem>,
    pub allocations: Vec<CostCenterAllocation>,
    pub installments: Vec<InstallmentEntry>,
}
