//! Cart kept in local storage (`bakeryCart`).

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use bakery_points_core::VirtualCardProductId;

use crate::models::cart::CartError;
use crate::models::{Cart, CartItem, CartTotals, VirtualCardProduct, storage_keys};
use crate::services::points::PurchasedLine;
use crate::storage::{CachedRecord, LocalStore, StorageError};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("failed to save cart: {0}")]
    Storage(#[from] StorageError),
}

/// Reads and writes the cart of one browser.
#[derive(Debug, Clone)]
pub struct CartService {
    record: CachedRecord<Cart>,
}

impl CartService {
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            record: CachedRecord::new(store, storage_keys::BAKERY_CART),
        }
    }

    /// The stored cart; empty when nothing (or nothing readable) is stored.
    pub async fn load(&self) -> Cart {
        self.record.get_cached().await.unwrap_or_default()
    }

    /// The stored cart lines.
    pub async fn items(&self) -> Vec<CartItem> {
        self.load().await.items
    }

    /// Add a product.
    ///
    /// # Errors
    ///
    /// Returns the cart validation error or a storage error.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add(
        &self,
        product: &VirtualCardProduct,
        quantity: u32,
    ) -> Result<Cart, CartServiceError> {
        self.update(|cart| cart.add(product, quantity)).await
    }

    /// Change a line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns the cart validation error or a storage error.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        product_id: VirtualCardProductId,
        quantity: u32,
    ) -> Result<Cart, CartServiceError> {
        self.update(|cart| cart.set_quantity(product_id, quantity))
            .await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` or a storage error.
    #[instrument(skip(self))]
    pub async fn remove(&self, product_id: VirtualCardProductId) -> Result<Cart, CartServiceError> {
        self.update(|cart| cart.remove(product_id)).await
    }

    /// Take units the backend already accepted out of the cart.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    #[instrument(skip_all, fields(lines = purchased.len()))]
    pub async fn remove_purchased(
        &self,
        purchased: &[PurchasedLine],
    ) -> Result<Cart, CartServiceError> {
        self.update(|cart| {
            for line in purchased {
                cart.deduct(line.product_id, line.quantity);
            }
            Ok(())
        })
        .await
    }

    /// Empty the cart.
    pub async fn clear(&self) {
        self.record.invalidate().await;
    }

    /// Totals of the stored cart.
    pub async fn totals(&self) -> CartTotals {
        self.load().await.totals()
    }

    async fn update<F>(&self, mutate: F) -> Result<Cart, CartServiceError>
    where
        F: FnOnce(&mut Cart) -> Result<(), CartError>,
    {
        let mut cart = self.load().await;
        mutate(&mut cart)?;
        if cart.is_empty() {
            self.record.invalidate().await;
        } else {
            self.record.store(&cart).await?;
        }
        Ok(cart)
    }
}
