//! Custom field validators shared by the request types.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use validator::ValidationError;

use crate::entity::orders::PaymentMethod;

/// Gabonese numbers: optional `+241` / `00241` prefix, then 8 or 9 digits.
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\+241|00241)?[0-9]{8,9}$").unwrap());

pub fn gabon_phone(phone: &str) -> Result<(), ValidationError> {
    if PHONE_RE.is_match(phone) {
        return Ok(());
    }
    let mut err = ValidationError::new("phone");
    err.message = Some("Phone must be a valid Gabonese number (e.g. +24107123456)".into());
    Err(err)
}

pub fn payment_method(method: &str) -> Result<(), ValidationError> {
    if PaymentMethod::from_str(method).is_ok() {
        return Ok(());
    }
    let mut err = ValidationError::new("payment_method");
    err.message = Some(
        "Payment method must be one of card, mobile_money, bank_transfer, cash_on_delivery".into(),
    );
    Err(err)
}

pub fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        return Ok(());
    }
    let mut err = ValidationError::new("range");
    err.message = Some("Amount must be greater than 0".into());
    Err(err)
}

pub fn non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        return Ok(());
    }
    let mut err = ValidationError::new("range");
    err.message = Some("Amount must not be negative".into());
    Err(err)
}
