//! Lineage SKUs: entity codes prefixed to a product SKU
//!
//! `ORGORG-WBUTS-WB500L` is product `WB500L` sold through entity path
//! `ORGORG/WBUTS`. Product SKUs may themselves contain hyphens, so the split
//! between lineage and product is ambiguous; [`SkuLineage::resolve`] searches
//! it in a fixed order and returns the first match.

use serde::{Deserialize, Serialize};

use crate::constants::{NEXT_PRODUCT_ID, PATH_SEPARATOR, SEGMENT_SEPARATOR};
use crate::error::{Error, Result};
use crate::hierarchy::{Entity, EntityHierarchy};
use crate::keys::{check_part, id_key, owned_key};
use crate::store::{get_json, scan_json, Store};

/// Naive split of a lineage SKU: last token is the base, the rest are entity codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageSku {
    pub entity_codes: Vec<String>,
    pub base_sku: String,
    /// Entity codes joined as a hierarchy path
    pub full_path: String,
}

pub fn parse_lineage(full_sku: &str) -> LineageSku {
    let mut tokens: Vec<String> = full_sku.trim().split(SEGMENT_SEPARATOR).map(str::to_string).collect();
    let base_sku = tokens.pop().unwrap_or_default();
    let full_path = tokens.join(&PATH_SEPARATOR.to_string());
    LineageSku { entity_codes: tokens, base_sku, full_path }
}

/// A catalog entry owned by one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub entity_id: u64,
    pub sku: String,
    pub name: String,
}

/// Product lookup by owner and SKU
pub trait ProductCatalog {
    /// `sku` is matched case-insensitively
    fn product(&self, entity_id: u64, sku: &str) -> Result<Option<Product>>;
}

/// A successful lineage resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Entity named by the lineage prefix
    pub entity: Entity,
    /// Matched product; its `entity_id` is the entity or one of its ancestors
    pub product: Product,
}

/// Resolves lineage SKUs against a hierarchy and a catalog
pub struct SkuLineage<H, C> {
    hierarchy: H,
    catalog: C,
}

impl SkuLineage<Store, Store> {
    pub fn with_store(store: Store) -> Self {
        SkuLineage::new(store.clone(), store)
    }
}

impl<H: EntityHierarchy, C: ProductCatalog> SkuLineage<H, C> {
    pub fn new(hierarchy: H, catalog: C) -> Self {
        SkuLineage { hierarchy, catalog }
    }

    /// Best-effort resolution. `Ok(None)` when no entity path and product combine.
    ///
    /// Search order:
    /// 1. entity split points, longest path first
    /// 2. product SKU from the last token alone, extending leftward
    /// 3. owner: the entity, then its ancestors nearest first
    pub fn resolve(&self, full_sku: &str) -> Result<Option<Resolution>> {
        let tokens: Vec<String> = full_sku.trim().split(SEGMENT_SEPARATOR).map(str::to_uppercase).collect();
        if tokens.iter().any(String::is_empty) {
            return Ok(None);
        }
        for split in (1..tokens.len()).rev() {
            let path = tokens[..split].join(&PATH_SEPARATOR.to_string());
            let Some(entity) = self.hierarchy.entity_by_path(&path)? else {
                continue;
            };
            let mut owners = self.hierarchy.ancestors(&entity)?;
            owners.push(entity.clone());
            owners.reverse();
            for start in (split..tokens.len()).rev() {
                let sku = tokens[start..].join(&SEGMENT_SEPARATOR.to_string());
                for owner in &owners {
                    if let Some(product) = self.catalog.product(owner.id, &sku)? {
                        tracing::debug!(full_sku, entity = %entity.path, sku, owner = %owner.code, "resolved lineage SKU");
                        return Ok(Some(Resolution { entity, product }));
                    }
                }
            }
        }
        tracing::debug!(full_sku, "lineage SKU unresolved");
        Ok(None)
    }
}

fn normalize_sku(sku: &str) -> Result<String> {
    let sku = sku.trim().to_uppercase();
    if sku.is_empty() {
        return Err(Error::InvalidKey("product SKU cannot be empty".into()));
    }
    check_part(&sku)?;
    Ok(sku)
}

impl Store {
    /// Add or replace `entity_id`'s product with this SKU
    pub fn put_product(&self, entity_id: u64, sku: &str, name: &str) -> Result<Product> {
        let sku = normalize_sku(sku)?;
        self.transact(|tx| {
            let d = tx.dbs();
            if tx.get_json::<Entity>(&d.entities, &id_key(entity_id))?.is_none() {
                return Err(Error::EntityNotFound(entity_id.to_string()));
            }
            let k = owned_key(entity_id, &[&sku]);
            let id = match tx.get_json::<Product>(&d.products, &k)? {
                Some(existing) => existing.id,
                None => tx.next_id(NEXT_PRODUCT_ID)?,
            };
            let product = Product { id, entity_id, sku: sku.clone(), name: name.to_string() };
            tx.put_json(&d.products, &k, &product)?;
            Ok(product)
        })
    }

    /// Every product owned by one entity, in SKU order
    pub fn products_of(&self, entity_id: u64) -> Result<Vec<Product>> {
        self.read(|d, tx| scan_json(&d.products, tx, &id_key(entity_id)))
    }
}

impl ProductCatalog for Store {
    fn product(&self, entity_id: u64, sku: &str) -> Result<Option<Product>> {
        let sku = sku.trim().to_uppercase();
        if sku.is_empty() {
            return Ok(None);
        }
        check_part(&sku)?;
        let k = owned_key(entity_id, &[&sku]);
        self.read(|d, tx| get_json(&d.products, tx, &k))
    }
}
