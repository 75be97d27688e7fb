//! Cart Aggregate
//!
//! The shopping session's cart. Every mutation writes the whole snapshot back
//! to [`CartStorage`] so the cart survives a restart of the session.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::domain::pricing::{PricingPolicy, ShippingOption, Totals};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: i64,
    pub name: String,
    pub unit_price: Money,
    pub image_ref: Option<String>,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

/// Durable slot holding the serialized cart, analogous to browser local storage.
pub trait CartStorage {
    fn load(&self) -> io::Result<Option<String>>;
    fn save(&self, snapshot: &str) -> io::Result<()>;
}

/// Stores the snapshot as a JSON file.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    path: PathBuf,
}

impl FileCartStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl CartStorage for FileCartStorage {
    fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, snapshot: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, snapshot)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryCartStorage {
    pub fn with_snapshot(snapshot: impl Into<String>) -> Self {
        Self { slot: Mutex::new(Some(snapshot.into())) }
    }

    pub fn snapshot(&self) -> Option<String> {
        self.slot.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl CartStorage for MemoryCartStorage {
    fn load(&self) -> io::Result<Option<String>> { Ok(self.snapshot()) }

    fn save(&self, snapshot: &str) -> io::Result<()> {
        let mut slot = self.slot.lock().map_err(|_| io::Error::new(io::ErrorKind::Other, "cart storage poisoned"))?;
        *slot = Some(snapshot.to_string());
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    items: Vec<CartItem>,
}

#[derive(Debug)]
pub struct Cart<S: CartStorage> {
    items: Vec<CartItem>,
    storage: S,
}

impl<S: CartStorage> Cart<S> {
    /// Hydrates the cart from storage. A missing, unreadable or corrupt
    /// snapshot yields an empty cart.
    pub fn load(storage: S) -> Self {
        let items = match storage.load() {
            Ok(Some(raw)) => match serde_json::from_str::<Snapshot>(&raw) {
                Ok(snapshot) => snapshot.items.into_iter().filter(|i| i.quantity > 0).collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding corrupt cart snapshot");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "cart storage unreadable, starting with an empty cart");
                Vec::new()
            }
        };
        Self { items, storage }
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn subtotal(&self) -> Money { self.items.iter().map(CartItem::line_total).sum() }
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).fold(0, u32::saturating_add) }

    pub fn totals(&self, pricing: &PricingPolicy, option: ShippingOption) -> Totals {
        pricing.quote(self.items.iter().map(|i| (i.unit_price, i.quantity)), option)
    }

    /// Adds the item, merging into an existing entry for the same product.
    /// A zero quantity adds nothing.
    pub fn add_item(&mut self, item: CartItem) {
        if item.quantity == 0 {
            return;
        }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            self.items.push(item);
        }
        self.persist();
    }

    /// Sets the quantity outright; zero or below removes the entry.
    pub fn update_quantity(&mut self, product_id: i64, quantity: i64) {
        if quantity <= 0 {
            self.remove_item(product_id);
            return;
        }
        if let Some(item) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            item.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
            self.persist();
        }
    }

    pub fn remove_item(&mut self, product_id: i64) {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() != before {
            self.persist();
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.persist();
    }

    pub fn storage(&self) -> &S { &self.storage }

    fn persist(&self) {
        let snapshot = Snapshot { items: self.items.clone() };
        let result = serde_json::to_string(&snapshot)
            .map_err(io::Error::from)
            .and_then(|raw| self.storage.save(&raw));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist cart snapshot");
        }
    }
}
