//! Cart items, derived totals, and the cart lifecycle phase.
//!
//! The server owns the cart; these types mirror the last item list it
//! returned. Totals are always derived from that list, never tracked on
//! their own.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ProductId, StoreId};

/// A line in the cart, as returned by the delivery backend.
///
/// All items in one cart share a `store_id`. The server enforces that; the
/// client never checks it before sending an add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product ID. Some endpoints call this `productId`.
    #[serde(alias = "productId")]
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Quantity in the cart (at least 1 for items the server returns).
    pub quantity: u32,
    /// Image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Price before discount, when the product is on sale.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub original_price: Option<Decimal>,
    /// Store the product is sold by.
    pub store_id: StoreId,
    /// Store category (restaurant, grocery, ...).
    #[serde(default)]
    pub store_type: String,
}

impl CartItem {
    /// Price of this line (`price * quantity`).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Totals derived from a list of cart items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    /// Sum of `price * quantity` over all items.
    pub total_price: Decimal,
    /// Sum of quantities over all items.
    pub total_quantity: u64,
}

impl CartTotals {
    /// Compute totals for an item list.
    #[must_use]
    pub fn from_items(items: &[CartItem]) -> Self {
        items.iter().fold(Self::default(), |acc, item| Self {
            total_price: acc.total_price + item.line_total(),
            total_quantity: acc.total_quantity + u64::from(item.quantity),
        })
    }
}

/// Where the cart currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartPhase {
    /// No cart has been created or loaded.
    #[default]
    NoCart,
    /// Cart keyed by the anonymous guest identifier.
    Anonymous,
    /// Cart keyed by the signed-in user's ID.
    User,
    /// A guest cart is being merged into the user's cart.
    Merging,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(id: &str, price: i64, quantity: u32) -> CartItem {
        CartItem {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            price: Decimal::from(price),
            quantity,
            image: None,
            original_price: None,
            store_id: StoreId::new("s1"),
            store_type: "restaurant".to_string(),
        }
    }

    #[test]
    fn test_totals_empty() {
        let totals = CartTotals::from_items(&[]);
        assert_eq!(totals.total_price, Decimal::ZERO);
        assert_eq!(totals.total_quantity, 0);
    }

    #[test]
    fn test_totals_sum_lines() {
        let totals = CartTotals::from_items(&[item("p1", 10, 2), item("p2", 3, 5)]);
        assert_eq!(totals.total_price, Decimal::from(35));
        assert_eq!(totals.total_quantity, 7);
    }

    #[test]
    fn test_totals_fractional_prices() {
        let mut line = item("p1", 0, 3);
        line.price = Decimal::new(1999, 2);
        let totals = CartTotals::from_items(&[line]);
        assert_eq!(totals.total_price, Decimal::new(5997, 2));
    }

    #[test]
    fn test_cart_item_accepts_product_id_alias() {
        let json = r#"{
            "productId": "p1",
            "name": "Falafel wrap",
            "price": 10,
            "quantity": 2,
            "storeId": "s1"
        }"#;
        let parsed: CartItem = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, ProductId::new("p1"));
        assert_eq!(parsed.price, Decimal::from(10));
        assert_eq!(parsed.image, None);
        assert_eq!(parsed.original_price, None);
        assert!(parsed.store_type.is_empty());
    }

    #[test]
    fn test_cart_item_serializes_camel_case_numbers() {
        let mut line = item("p1", 10, 2);
        line.original_price = Some(Decimal::from(12));
        let value = serde_json::to_value(&line).unwrap();
        assert_eq!(value["storeId"], "s1");
        assert_eq!(value["storeType"], "restaurant");
        assert!(value["price"].is_number());
        assert!(value["originalPrice"].is_number());
    }

    #[test]
    fn test_cart_phase_default() {
        assert_eq!(CartPhase::default(), CartPhase::NoCart);
    }
}
