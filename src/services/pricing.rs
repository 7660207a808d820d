//! Pricing engine: subtotals, discount codes and currency rounding.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::Storefront;
use crate::domain::aggregates::Cart;
use crate::domain::value_objects::{round_currency, Percentage};
use crate::{Result, ShopError};

/// `total - total * pct / 100`, rounded to cents. Rounds even without a discount.
pub fn discounted_total(total: Decimal, discount: Option<Percentage>) -> Decimal {
    let discounted = match discount {
        Some(pct) => total - pct.of(total),
        None => total,
    };
    round_currency(discounted)
}

impl Storefront {
    /// Sum of `unit_price * quantity` at current prices, unrounded.
    pub async fn total(&self, cart: &Cart) -> Result<Decimal> {
        let mut sum = Decimal::ZERO;
        for line in cart.lines() {
            if let Some(product) = self.ledger.fetch_product(line.product_id).await? {
                sum += product.line_total(line.quantity);
            }
        }
        Ok(sum)
    }

    pub async fn final_total(&self, cart: &Cart) -> Result<Decimal> {
        Ok(discounted_total(self.total(cart).await?, cart.discount()))
    }

    /// Validates `code` against today's UTC date and activates it on the cart.
    pub async fn apply_discount(&self, cart: &mut Cart, code: &str) -> Result<Percentage> {
        self.apply_discount_on(cart, code, Utc::now().date_naive()).await
    }

    #[instrument(skip(self, cart))]
    pub async fn apply_discount_on(&self, cart: &mut Cart, code: &str, today: NaiveDate) -> Result<Percentage> {
        let discount = self.ledger.fetch_discount(code).await?.ok_or(ShopError::DiscountCodeNotFound)?;
        if !discount.is_valid_on(today) {
            return Err(ShopError::DiscountCodeExpired { expires: discount.expires });
        }
        cart.set_discount(discount.percentage);
        debug!(percentage = %discount.percentage, "discount applied");
        Ok(discount.percentage)
    }

    pub fn clear_discount(&self, cart: &mut Cart) {
        cart.clear_discount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::DiscountCode;
    use crate::domain::value_objects::ProductId;
    use crate::services::fixtures::shop_with;

    fn pct(n: i64) -> Percentage { Percentage::new(Decimal::from(n)).unwrap() }

    #[test]
    fn test_half_cent_rounds_away_from_zero() {
        assert_eq!(discounted_total(Decimal::new(19995, 3), Some(pct(10))), Decimal::new(1800, 2));
        assert_eq!(discounted_total(Decimal::new(10005, 3), None), Decimal::new(1001, 2));
        assert_eq!(discounted_total(Decimal::new(2000, 2), Some(pct(100))), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_totals_use_fresh_prices() {
        let (shop, ledger) = shop_with(&[(1, 1000, 10), (2, 333, 10)]).await;
        let mut cart = Cart::new();
        assert_eq!(shop.total(&cart).await.unwrap(), Decimal::ZERO);

        shop.add_to_cart(&mut cart, ProductId::new(1), 2).await.unwrap();
        shop.add_to_cart(&mut cart, ProductId::new(2), 1).await.unwrap();
        assert_eq!(shop.total(&cart).await.unwrap(), Decimal::new(2333, 2));

        ledger.set_unit_price(ProductId::new(2), Decimal::new(500, 2)).await;
        assert_eq!(shop.final_total(&cart).await.unwrap(), Decimal::new(2500, 2));
    }

    #[tokio::test]
    async fn test_discount_expiry_boundary() {
        let (shop, ledger) = shop_with(&[(1, 1000, 10)]).await;
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        ledger.insert_discount(DiscountCode::new("TODAY", pct(10), today)).await;
        ledger.insert_discount(DiscountCode::new("TOMORROW", pct(25), today.succ_opt().unwrap())).await;

        let mut cart = Cart::new();
        let err = shop.apply_discount_on(&mut cart, "TODAY", today).await.unwrap_err();
        assert!(matches!(err, ShopError::DiscountCodeExpired { expires } if expires == today));
        assert_eq!(cart.discount(), None);

        assert_eq!(shop.apply_discount_on(&mut cart, "TOMORROW", today).await.unwrap(), pct(25));
        assert_eq!(cart.discount(), Some(pct(25)));
    }

    #[tokio::test]
    async fn test_unknown_code_keeps_active_discount() {
        let (shop, ledger) = shop_with(&[(1, 1000, 10)]).await;
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        ledger.insert_discount(DiscountCode::new("SAVE10", pct(10), NaiveDate::from_ymd_opt(2030, 1, 1).unwrap())).await;

        let mut cart = Cart::new();
        shop.apply_discount_on(&mut cart, "SAVE10", today).await.unwrap();
        assert!(matches!(shop.apply_discount_on(&mut cart, "NOPE", today).await, Err(ShopError::DiscountCodeNotFound)));
        assert_eq!(cart.discount(), Some(pct(10)));

        shop.add_to_cart(&mut cart, ProductId::new(1), 1).await.unwrap();
        assert_eq!(shop.final_total(&cart).await.unwrap(), Decimal::new(900, 2));
        shop.clear_discount(&mut cart);
        assert_eq!(shop.final_total(&cart).await.unwrap(), Decimal::new(1000, 2));
    }
}
