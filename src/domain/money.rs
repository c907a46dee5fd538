//! Money arithmetic over `rust_decimal::Decimal`. Every computed step is
//! rounded to 2 decimal places, not only at display time. Native floats are
//! never used for money anywhere in this crate.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round to 2 decimal places, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Subtotal of one sale line: `unit_price * quantity`, rounded.
pub fn line_subtotal(unit_price: Decimal, quantity: i32) -> Decimal {
    round2(unit_price * Decimal::from(quantity))
}

/// Total of a sale: sum of already-rounded subtotals, rounded again.
pub fn items_total(subtotals: impl IntoIterator<Item = Decimal>) -> Decimal {
    round2(subtotals.into_iter().sum())
}

/// Commission owed at payment time. `percent` is a percentage figure
/// (5.00 means 5%), exactly as stored on the sale snapshot.
pub fn commission(total_value: Decimal, percent: Decimal) -> Decimal {
    round2(total_value * percent / Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn subtotal_is_price_times_quantity() {
        assert_eq!(line_subtotal(dec!(10.00), 3), dec!(30.00));
        assert_eq!(line_subtotal(dec!(5.50), 2), dec!(11.00));
    }

    #[test]
    fn subtotal_rounds_to_two_places() {
        // 3.333 * 3 = 9.999 -> 10.00
        assert_eq!(line_subtotal(dec!(3.333), 3), dec!(10.00));
        // midpoint rounds away from zero: 0.125 * 1 -> 0.13
        assert_eq!(line_subtotal(dec!(0.125), 1), dec!(0.13));
    }

    #[test]
    fn total_is_sum_of_subtotals() {
        assert_eq!(items_total([dec!(30.00), dec!(11.00)]), dec!(41.00));
        assert_eq!(items_total(std::iter::empty::<Decimal>()), dec!(0));
    }

    #[test]
    fn commission_uses_percent_figure() {
        // 41.00 at 5% -> 2.05
        assert_eq!(commission(dec!(41.00), dec!(5.00)), dec!(2.05));
        // 99.99 at 2.5% -> 2.49975 -> 2.50
        assert_eq!(commission(dec!(99.99), dec!(2.50)), dec!(2.50));
        assert_eq!(commission(dec!(100.00), dec!(0)), dec!(0.00));
    }

    #[test]
    fn replacement_computation_is_idempotent() {
        let lines = [(dec!(10.00), 3), (dec!(5.50), 2)];
        let run = || items_total(lines.iter().map(|&(p, q)| line_subtotal(p, q)));
        assert_eq!(run(), run());
        assert_eq!(run(), dec!(41.00));
    }
}
