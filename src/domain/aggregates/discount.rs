//! Discount code Aggregate

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Percentage;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub code: String,
    pub percentage: Percentage,
    pub expires: NaiveDate,
}

impl DiscountCode {
    pub fn new(code: impl Into<String>, percentage: Percentage, expires: NaiveDate) -> Self {
        Self { code: code.into(), percentage, expires }
    }

    /// Valid strictly before its expiry date; on the expiry date itself it is already dead.
    pub fn is_valid_on(&self, today: NaiveDate) -> bool { self.expires > today }
}
