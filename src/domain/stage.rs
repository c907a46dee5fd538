//! Wizard stage derivation. A stage is never persisted: it is recomputed
//! from a fresh sale snapshot after every mutation, mirroring the server
//! guards exactly. The server embeds this view in each sale projection so
//! the wizard only displays it and never gates a mutation by itself.

use rust_decimal::Decimal;
use serde::Serialize;

use super::sale::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Client,
    Items,
    Payment,
    Summary,
}

/// The facts of a sale snapshot that stage derivation looks at.
#[derive(Debug, Clone, Copy)]
pub struct StageInput {
    pub has_client: bool,
    pub item_count: i64,
    pub total_value: Decimal,
    pub payment_status: PaymentStatus,
    pub has_payment_method: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageCompletion {
    pub client: bool,
    pub items: bool,
    pub payment: bool,
    pub summary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub stage: Stage,
    pub completed: StageCompletion,
}

/// First incomplete stage in [client, items, payment] becomes active; when
/// all three are complete the sale sits on the summary.
pub fn derive_stage(input: &StageInput) -> StageView {
    let client = input.has_client;
    let items = input.item_count > 0 && input.total_value > Decimal::ZERO;
    let payment = input.payment_status == PaymentStatus::Paid && input.has_payment_method;
    let summary = client && items && payment;

    let stage = if !client {
        Stage::Client
    } else if !items {
        Stage::Items
    } else if !payment {
        Stage::Payment
    } else {
        Stage::Summary
    };

    StageView {
        stage,
        completed: StageCompletion { client, items, payment, summary },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(
        has_client: bool,
        item_count: i64,
        total_value: Decimal,
        payment_status: PaymentStatus,
        has_payment_method: bool,
    ) -> StageInput {
        StageInput { has_client, item_count, total_value, payment_status, has_payment_method }
    }

    #[test]
    fn no_client_means_client_stage() {
        let view = derive_stage(&snapshot(false, 0, dec!(0), PaymentStatus::Pending, false));
        assert_eq!(view.stage, Stage::Client);
        assert!(!view.completed.client);
    }

    #[test]
    fn fresh_sale_sits_on_items_stage() {
        let view = derive_stage(&snapshot(true, 0, dec!(0), PaymentStatus::Pending, false));
        assert_eq!(view.stage, Stage::Items);
        assert!(view.completed.client);
        assert!(!view.completed.items);
    }

    #[test]
    fn items_require_count_and_positive_total() {
        // item rows but a zero total do not complete the items stage
        let view = derive_stage(&snapshot(true, 2, dec!(0), PaymentStatus::Pending, false));
        assert_eq!(view.stage, Stage::Items);

        let view = derive_stage(&snapshot(true, 2, dec!(41.00), PaymentStatus::Pending, false));
        assert_eq!(view.stage, Stage::Payment);
        assert!(view.completed.items);
        assert!(!view.completed.payment);
    }

    #[test]
    fn payment_requires_paid_status_and_method() {
        let view = derive_stage(&snapshot(true, 2, dec!(41.00), PaymentStatus::Paid, false));
        assert_eq!(view.stage, Stage::Payment);

        let view = derive_stage(&snapshot(true, 2, dec!(41.00), PaymentStatus::Paid, true));
        assert_eq!(view.stage, Stage::Summary);
        assert!(view.completed.summary);
    }

    #[test]
    fn summary_only_when_everything_is_complete() {
        let view = derive_stage(&snapshot(true, 1, dec!(10.00), PaymentStatus::Paid, true));
        assert_eq!(
            view.completed,
            StageCompletion { client: true, items: true, payment: true, summary: true }
        );
    }

    #[test]
    fn stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Payment).unwrap(), "\"payment\"");
    }
}
