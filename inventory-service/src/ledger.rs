use anyhow::{Context, Result as AnyResult};
use bigdecimal::BigDecimal;
use parking_lot::{Mutex, MutexGuard, RwLock};
use shared::{ProductId, ShopError};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{Product, Reservation};

type Record = Arc<Mutex<Product>>;

/// Authoritative stock per product.
///
/// Every record sits behind its own lock, so operations on different products
/// never contend. Batch reservations take the locks of all involved products in
/// ascending id order before touching any of them.
#[derive(Default)]
pub struct InventoryLedger {
    products: RwLock<HashMap<ProductId, Record>>,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let ledger = Self::new();
        for product in products {
            ledger.add_product(product);
        }
        ledger
    }

    /// Seeds a ledger from a JSON array of products.
    pub fn from_catalog_file(path: &Path) -> AnyResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let products: Vec<Product> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        info!("Loaded {} products from {}", products.len(), path.display());
        Ok(Self::with_products(products))
    }

    /// Inserts a product, or overwrites name, price and stock of an existing one in place.
    pub fn add_product(&self, product: Product) {
        let mut products = self.products.write();
        match products.get(&product.id) {
            Some(record) => *record.lock() = product,
            None => {
                products.insert(product.id, Arc::new(Mutex::new(product)));
            }
        }
    }

    pub fn get_product(&self, product_id: ProductId) -> Result<Product, ShopError> {
        Ok(self.record(product_id)?.lock().clone())
    }

    pub fn list_products(&self) -> Vec<Product> {
        let records: Vec<Record> = self.products.read().values().cloned().collect();
        let mut products: Vec<Product> = records.iter().map(|r| r.lock().clone()).collect();
        products.sort_by_key(|p| p.id);
        products
    }

    pub fn get_stock(&self, product_id: ProductId) -> Result<u32, ShopError> {
        Ok(self.record(product_id)?.lock().stock)
    }

    pub fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<Reservation, ShopError> {
        ensure_positive(product_id, quantity)?;
        let record = self.record(product_id)?;
        let mut product = record.lock();

        if product.stock < quantity {
            return Err(ShopError::InsufficientStock {
                product_id,
                requested: u64::from(quantity),
                available: product.stock,
            });
        }

        product.stock -= quantity;
        debug!("Reserved {} of product {}, {} left", quantity, product_id, product.stock);

        Ok(Reservation {
            product_id,
            quantity,
            unit_price: product.price.clone(),
        })
    }

    /// All-or-nothing reservation across several lines.
    ///
    /// Lines naming the same product are summed before the availability check.
    /// On failure the error names the first line, in request order, that cannot
    /// be covered and no stock has been touched.
    pub fn reserve_batch(&self, items: &[(ProductId, u32)]) -> Result<Vec<Reservation>, ShopError> {
        let mut demand: BTreeMap<ProductId, u64> = BTreeMap::new();
        for &(product_id, quantity) in items {
            ensure_positive(product_id, quantity)?;
            *demand.entry(product_id).or_default() += u64::from(quantity);
        }

        let records: Vec<(ProductId, Record)> = {
            let products = self.products.read();
            for &(product_id, _) in items {
                if !products.contains_key(&product_id) {
                    return Err(ShopError::product_not_found(product_id));
                }
            }
            demand
                .keys()
                .filter_map(|id| products.get(id).map(|record| (*id, Arc::clone(record))))
                .collect()
        };

        // BTreeMap iteration gives the ascending lock order.
        let mut held: BTreeMap<ProductId, MutexGuard<'_, Product>> = records
            .iter()
            .map(|(id, record)| (*id, record.lock()))
            .collect();

        for &(product_id, _) in items {
            let requested = demand.get(&product_id).copied().unwrap_or_default();
            let available = held.get(&product_id).map(|p| p.stock).unwrap_or_default();
            if u64::from(available) < requested {
                return Err(ShopError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                });
            }
        }

        for (product_id, requested) in &demand {
            if let Some(product) = held.get_mut(product_id) {
                // requested <= stock, which is a u32
                product.stock -= *requested as u32;
            }
        }

        let reservations = items
            .iter()
            .filter_map(|&(product_id, quantity)| {
                held.get(&product_id).map(|product| Reservation {
                    product_id,
                    quantity,
                    unit_price: product.price.clone(),
                })
            })
            .collect();

        debug!("Reserved batch of {} lines over {} products", items.len(), demand.len());
        Ok(reservations)
    }

    /// Puts stock back, e.g. when an order is cancelled. Returns the new quantity on hand.
    pub fn release(&self, product_id: ProductId, quantity: u32) -> Result<u32, ShopError> {
        let record = self.record(product_id)?;
        let mut product = record.lock();
        product.stock = product.stock.saturating_add(quantity);
        debug!("Released {} of product {}, {} on hand", quantity, product_id, product.stock);
        Ok(product.stock)
    }

    pub fn set_stock(&self, product_id: ProductId, quantity: i64) -> Result<(), ShopError> {
        let stock = u32::try_from(quantity).map_err(|_| {
            ShopError::InvalidArgument(format!(
                "stock for product {} must be between 0 and {}, got {}",
                product_id,
                u32::MAX,
                quantity
            ))
        })?;
        let record = self.record(product_id)?;
        record.lock().stock = stock;
        info!("Stock of product {} set to {}", product_id, stock);
        Ok(())
    }

    pub fn set_price(&self, product_id: ProductId, price: BigDecimal) -> Result<(), ShopError> {
        if price < BigDecimal::from(0) {
            return Err(ShopError::InvalidArgument(format!(
                "price for product {} must not be negative",
                product_id
            )));
        }
        let record = self.record(product_id)?;
        record.lock().price = price;
        Ok(())
    }

    fn record(&self, product_id: ProductId) -> Result<Record, ShopError> {
        self.products
            .read()
            .get(&product_id)
            .cloned()
            .ok_or_else(|| ShopError::product_not_found(product_id))
    }
}

fn ensure_positive(product_id: ProductId, quantity: u32) -> Result<(), ShopError> {
    if quantity == 0 {
        return Err(ShopError::InvalidArgument(format!(
            "quantity for product {} must be at least 1",
            product_id
        )));
    }
    Ok(())
}
