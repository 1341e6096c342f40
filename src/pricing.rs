use rust_decimal::{Decimal, RoundingStrategy};

/// Round a money amount to 2 decimal places, half away from zero.
/// `round_dp` alone would use banker's rounding and drift from the
/// storefront's totals.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Effective unit price: the discount price when one is set, else the list
/// price. Product validation guarantees a stored discount is below the list
/// price.
pub fn effective_price(price: Decimal, discount_price: Option<Decimal>) -> Decimal {
    discount_price.unwrap_or(price)
}

/// One cart line priced for checkout.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Product-level shipping add-on, when the producer sets one.
    pub shipping_cost: Option<Decimal>,
}

impl PricedLine {
    pub fn subtotal(&self) -> Decimal {
        round_money(Decimal::from(self.quantity) * self.unit_price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutTotals {
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
}

/// Compute checkout money fields from priced lines and the city base rate.
///
/// Product shipping add-ons are charged once per line, not per unit.
pub fn checkout_totals(lines: &[PricedLine], base_shipping: Decimal) -> CheckoutTotals {
    let mut subtotal = Decimal::ZERO;
    let mut product_shipping = Decimal::ZERO;

    for line in lines {
        subtotal += Decimal::from(line.quantity) * line.unit_price;
        if let Some(cost) = line.shipping_cost {
            product_shipping += cost;
        }
    }

    let subtotal = round_money(subtotal);
    let shipping_cost = round_money(product_shipping + base_shipping);
    let total_amount = round_money(subtotal + shipping_cost);

    CheckoutTotals {
        subtotal,
        shipping_cost,
        total_amount,
    }
}
