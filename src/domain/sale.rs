//! Sale lifecycle: payment status/method enums and the transition guards.
//! The guards are pure so the rules can be tested without a database; the
//! handlers apply them inside the owning transaction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Payment status of a sale. CANCELED is a reserved value: no exposed
/// operation transitions into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PaymentStatus::Pending),
            "PAID" => Some(PaymentStatus::Paid),
            "CANCELED" => Some(PaymentStatus::Canceled),
            _ => None,
        }
    }
}

/// Closed set of accepted payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Pix,
    CreditCard,
    DebitCard,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Pix => "PIX",
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
        }
    }
}

/// Items may be replaced only while the sale has not been paid.
pub fn ensure_items_mutable(status: PaymentStatus) -> Result<(), AppError> {
    if status == PaymentStatus::Paid {
        return Err(AppError::invalid_state("Cannot alter items of a paid sale"));
    }
    Ok(())
}

/// Payment requires a pending sale with a positive total. The positive-total
/// rule is what forces the wizard ordering: paying is unreachable until item
/// replacement has produced a total.
pub fn ensure_payable(status: PaymentStatus, total_value: Decimal) -> Result<(), AppError> {
    if status == PaymentStatus::Paid {
        return Err(AppError::invalid_state("Sale already paid"));
    }
    if total_value <= Decimal::ZERO {
        return Err(AppError::invalid_state("Cannot pay a sale with no items"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_roundtrips_through_strings() {
        for status in [PaymentStatus::Pending, PaymentStatus::Paid, PaymentStatus::Canceled] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("paid"), None);
    }

    #[test]
    fn payment_method_deserializes_from_wire_names() {
        let method: PaymentMethod = serde_json::from_str("\"PIX\"").unwrap();
        assert_eq!(method, PaymentMethod::Pix);
        assert_eq!(method.as_str(), "PIX");
        assert!(serde_json::from_str::<PaymentMethod>("\"CHECK\"").is_err());
    }

    #[test]
    fn paid_sale_items_are_frozen() {
        assert!(ensure_items_mutable(PaymentStatus::Pending).is_ok());
        assert!(matches!(
            ensure_items_mutable(PaymentStatus::Paid),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn zero_total_sale_cannot_be_paid() {
        assert!(matches!(
            ensure_payable(PaymentStatus::Pending, dec!(0)),
            Err(AppError::InvalidState(_))
        ));
        assert!(ensure_payable(PaymentStatus::Pending, dec!(41.00)).is_ok());
    }

    #[test]
    fn paying_twice_is_rejected() {
        assert!(matches!(
            ensure_payable(PaymentStatus::Paid, dec!(41.00)),
            Err(AppError::InvalidState(_))
        ));
    }
}
