use chrono::{DateTime, Utc};
use payorder_core::models::{OrderId, OrderStatus, SignatureSlot, Signatures, SlotNumber};
use payorder_core::pii::Masked;
use payorder_core::repository::{OrderRepository, PermissionDirectory};
use payorder_core::{OrderError, OrderResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// The three per-slot constant secrets. A slot's token is the SHA-256 of its
/// secret, identical for every order and every signer.
#[derive(Clone, Debug)]
pub struct SlotSecrets([Masked<String>; 3]);

impl SlotSecrets {
    pub fn new(secrets: [String; 3]) -> Self {
        Self(secrets.map(Masked))
    }

    pub fn expected_token(&self, slot: SlotNumber) -> String {
        let secret = &self.0[usize::from(slot.get() - 1)];
        let digest = Sha256::digest(secret.expose().as_bytes());
        format!("{:x}", digest)
    }
}

impl TryFrom<Vec<String>> for SlotSecrets {
    type Error = OrderError;

    fn try_from(secrets: Vec<String>) -> Result<Self, Self::Error> {
        let secrets: [String; 3] = secrets.try_into().map_err(|v: Vec<String>| {
            OrderError::structural(format!("expected 3 slot secrets, got {}", v.len()))
        })?;
        Ok(Self::new(secrets))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Signed,
    Unsigned,
    /// Token present but not the slot's expected value.
    Inconsistent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureReceipt {
    pub order_id: OrderId,
    pub slot: SlotNumber,
    pub signer: String,
    pub signed_at: DateTime<Utc>,
    pub slots: [SlotStatus; 3],
}

/// Three independent approval slots per order, each `Empty -> Signed` with
/// no way back.
pub struct SignatureWorkflow {
    orders: Arc<dyn OrderRepository>,
    permissions: Arc<dyn PermissionDirectory>,
    secrets: SlotSecrets,
}

impl SignatureWorkflow {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        permissions: Arc<dyn PermissionDirectory>,
        secrets: SlotSecrets,
    ) -> Self {
        Self {
            orders,
            permissions,
            secrets,
        }
    }

    /// Sign `slot` of an order on behalf of `signer`.
    ///
    /// Slot bounds are checked before any storage access, then the signer's
    /// per-slot permission, then the order itself. After the write the slots
    /// are re-read and classified against the expected tokens.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn sign(
        &self,
        order_id: OrderId,
        signer: &str,
        slot: i64,
    ) -> OrderResult<SignatureReceipt> {
        let slot = SlotNumber::try_from(slot)?;
        let signer = signer.trim();
        if signer.is_empty() {
            return Err(OrderError::structural("signer name is required"));
        }

        if !self.permissions.has_signature_permission(signer, slot).await? {
            warn!(signer, %slot, "Signature permission denied");
            return Err(OrderError::PermissionDenied {
                signer: signer.to_string(),
                slot,
            });
        }

        let order = self
            .orders
            .get_by_id(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;
        if order.status == OrderStatus::Cancelled {
            return Err(OrderError::structural(format!(
                "order {} is cancelled and cannot be signed",
                order_id
            )));
        }

        let current = self
            .orders
            .signatures(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;
        if !current.slot(slot).is_empty() {
            return Err(OrderError::structural(format!(
                "slot {} of order {} is already signed",
                slot, order_id
            )));
        }

        let signed_at = Utc::now();
        let token = self.secrets.expected_token(slot);
        self.orders
            .record_signature(order_id, slot, &token, signer, signed_at)
            .await?;

        let slots = self.verify(order_id).await?;
        info!(signer, %slot, ?slots, "Payment order signed");

        Ok(SignatureReceipt {
            order_id,
            slot,
            signer: signer.to_string(),
            signed_at,
            slots,
        })
    }

    /// Re-read an order's slots and classify each one.
    pub async fn verify(&self, order_id: OrderId) -> OrderResult<[SlotStatus; 3]> {
        let signatures = self
            .orders
            .signatures(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;
        Ok(self.classify(&signatures))
    }

    pub fn classify(&self, signatures: &Signatures) -> [SlotStatus; 3] {
        SlotNumber::ALL.map(|slot| match signatures.slot(slot) {
            SignatureSlot::Empty => SlotStatus::Unsigned,
            SignatureSlot::Signed { token, .. } if *token == self.secrets.expected_token(slot) => {
                SlotStatus::Signed
            }
            SignatureSlot::Signed { .. } => SlotStatus::Inconsistent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> SlotSecrets {
        SlotSecrets::new(["alpha".to_string(), "beta".to_string(), "gamma".to_string()])
    }

    fn signed(token: &str) -> SignatureSlot {
        SignatureSlot::Signed {
            token: token.to_string(),
            signer: "ana".to_string(),
            signed_at: Utc::now(),
        }
    }

    #[test]
    fn test_expected_token_is_sha256_hex() {
        let slot = SlotNumber::try_from(1).unwrap();
        // sha256("alpha")
        assert_eq!(
            secrets().expected_token(slot),
            "8ed3f6ad685b959ead7022518e1af76cd816f8e8ec7ccdda1ed4018e8f2223f8"
        );
    }

    #[test]
    fn test_tokens_differ_per_slot() {
        let s = secrets();
        let [a, b, c] = SlotNumber::ALL.map(|slot| s.expected_token(slot));
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_secret_count_checked() {
        let err = SlotSecrets::try_from(vec!["a".to_string(), "b".to_string()]);
        assert!(matches!(err, Err(OrderError::Structural(_))));
    }

    #[test]
    fn test_secrets_are_masked_in_debug() {
        let rendered = format!("{:?}", secrets());
        assert!(!rendered.contains("alpha"));
    }
}
