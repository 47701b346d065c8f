//! Cart stored in local storage (`bakeryCart`).
//!
//! The cart is advisory: prices are re-read from the catalog at checkout.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bakery_points_core::{Price, VirtualCardProductId};

use super::VirtualCardProduct;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Errors returned by cart mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Quantity outside `1..=MAX_LINE_QUANTITY`.
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY} (got {0})")]
    InvalidQuantity(u32),

    /// Product is not active in the catalog.
    #[error("product {0} is not available")]
    NotPurchasable(VirtualCardProductId),

    /// No cart line for the product.
    #[error("product {0} is not in the cart")]
    ItemNotFound(VirtualCardProductId),
}

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: VirtualCardProductId,
    pub name: String,
    pub unit_price: Price,
    pub points_value: i64,
    pub quantity: u32,
}

impl CartItem {
    /// Price of the whole line.
    #[must_use]
    pub fn line_price(&self) -> Price {
        self.unit_price * self.quantity
    }

    /// Points of the whole line.
    #[must_use]
    pub fn line_points(&self) -> i64 {
        self.points_value * i64::from(self.quantity)
    }
}

/// Aggregate totals of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub amount: Price,
    pub points: i64,
    pub item_count: u32,
}

/// The cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Cart {
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `quantity` of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `NotPurchasable` for inactive products and `InvalidQuantity`
    /// when the resulting line quantity is out of bounds.
    pub fn add(&mut self, product: &VirtualCardProduct, quantity: u32) -> Result<(), CartError> {
        if !product.is_purchasable() {
            return Err(CartError::NotPurchasable(product.id));
        }
        validate_quantity(quantity)?;

        if let Some(line) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            let merged = line.quantity.saturating_add(quantity);
            validate_quantity(merged)?;
            line.quantity = merged;
            line.unit_price = product.price;
            line.points_value = product.points_value;
            line.name.clone_from(&product.name);
        } else {
            self.items.push(CartItem {
                product_id: product.id,
                name: product.name.clone(),
                unit_price: product.price,
                points_value: product.points_value,
                quantity,
            });
        }
        Ok(())
    }

    /// Set the quantity of a line. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` if the product is not in the cart and
    /// `InvalidQuantity` if the quantity exceeds the line limit.
    pub fn set_quantity(
        &mut self,
        product_id: VirtualCardProductId,
        quantity: u32,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove(product_id);
        }
        validate_quantity(quantity)?;
        let line = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(CartError::ItemNotFound(product_id))?;
        line.quantity = quantity;
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` if the product is not in the cart.
    pub fn remove(&mut self, product_id: VirtualCardProductId) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before {
            return Err(CartError::ItemNotFound(product_id));
        }
        Ok(())
    }

    /// Take `quantity` units of a product out of the cart, dropping the line
    /// when nothing is left. A product no longer in the cart is ignored.
    pub fn deduct(&mut self, product_id: VirtualCardProductId, quantity: u32) {
        if let Some(line) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            line.quantity = line.quantity.saturating_sub(quantity);
        }
        self.items.retain(|i| i.quantity > 0);
    }

    /// Totals over all lines.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        CartTotals {
            amount: self.items.iter().map(CartItem::line_price).sum(),
            points: self.items.iter().map(CartItem::line_points).sum(),
            item_count: self.items.iter().map(|i| i.quantity).sum(),
        }
    }
}

const fn validate_quantity(quantity: u32) -> Result<(), CartError> {
    if quantity == 0 || quantity > MAX_LINE_QUANTITY {
        Err(CartError::InvalidQuantity(quantity))
    } else {
        Ok(())
    }
}
