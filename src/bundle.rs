//! Bundle discounts keyed by bundle hash
//!
//! A discount belongs to one entity. Lookups fall back through the entity's
//! ancestors, nearest first, so a master can define a discount every facade
//! below it inherits unless the facade defines its own.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::NEXT_BUNDLE_ID;
use crate::error::{Error, Result};
use crate::hierarchy::{Entity, EntityHierarchy};
use crate::keys::{check_part, id_key, owned_key};
use crate::sku::bundle_hash;
use crate::store::{get_json, now_millis, Store};

/// Pricing rule of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountRule {
    /// Price per bundle
    FixedPrice(#[serde(with = "rust_decimal::serde::str")] Decimal),
    /// Percent off the subtotal
    Percent(#[serde(with = "rust_decimal::serde::str")] Decimal),
    /// Amount off per bundle
    Amount(#[serde(with = "rust_decimal::serde::str")] Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDiscount {
    pub id: u64,
    pub entity_id: u64,
    pub hash: String,
    pub name: String,
    pub rule: DiscountRule,
    pub valid_from: Option<u64>,
    pub valid_until: Option<u64>,
    pub min_quantity: u32,
    pub max_uses: Option<u32>,
    pub uses: u32,
}

impl BundleDiscount {
    /// Inside the validity window and under `max_uses`
    pub fn is_active(&self, now: u64) -> bool {
        self.valid_from.map_or(true, |t| now >= t)
            && self.valid_until.map_or(true, |t| now <= t)
            && self.max_uses.map_or(true, |m| self.uses < m)
    }

    /// Price of `quantity` bundles whose undiscounted total is `subtotal`.
    /// `None` when the arithmetic overflows.
    pub fn apply(&self, subtotal: Decimal, quantity: u32) -> Option<Decimal> {
        if quantity < self.min_quantity {
            return Some(subtotal);
        }
        let q = Decimal::from(quantity);
        let price = match self.rule {
            DiscountRule::FixedPrice(p) => p.checked_mul(q)?,
            DiscountRule::Percent(pct) => {
                let off = subtotal.checked_mul(pct)?.checked_div(Decimal::ONE_HUNDRED)?;
                subtotal.checked_sub(off)?
            }
            DiscountRule::Amount(a) => subtotal.checked_sub(a.checked_mul(q)?)?,
        };
        Some(price.max(Decimal::ZERO).round_dp(2))
    }
}

/// Fields of a discount before an id is assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBundleDiscount {
    pub entity_id: u64,
    pub hash: String,
    pub name: String,
    pub rule: DiscountRule,
    #[serde(default)]
    pub valid_from: Option<u64>,
    #[serde(default)]
    pub valid_until: Option<u64>,
    #[serde(default)]
    pub min_quantity: u32,
    #[serde(default)]
    pub max_uses: Option<u32>,
}

impl NewBundleDiscount {
    /// Discount for the bundle made of `base_skus` (options do not matter)
    pub fn for_skus<S: AsRef<str>>(entity_id: u64, name: &str, base_skus: &[S], rule: DiscountRule) -> Self {
        NewBundleDiscount {
            entity_id,
            hash: bundle_hash(base_skus),
            name: name.to_string(),
            rule,
            valid_from: None,
            valid_until: None,
            min_quantity: 1,
            max_uses: None,
        }
    }
}

/// Discount lookup by owner and bundle hash
pub trait BundleStore {
    fn bundle_discount(&self, entity_id: u64, hash: &str) -> Result<Option<BundleDiscount>>;
}

/// First active discount for `hash` on `entity` or its nearest ancestor
pub fn find_bundle_discount<H, B>(
    hierarchy: &H,
    bundles: &B,
    entity: &Entity,
    hash: &str,
    now: u64,
) -> Result<Option<BundleDiscount>>
where
    H: EntityHierarchy,
    B: BundleStore,
{
    let mut chain = hierarchy.ancestors(entity)?;
    chain.push(entity.clone());
    for owner in chain.iter().rev() {
        match bundles.bundle_discount(owner.id, hash)? {
            Some(d) if d.is_active(now) => return Ok(Some(d)),
            Some(d) => tracing::debug!(owner = %owner.code, id = d.id, "skipping inactive bundle discount"),
            None => {}
        }
    }
    Ok(None)
}

impl Store {
    /// Define (or replace) an entity's discount for one bundle hash
    pub fn put_bundle_discount(&self, new: NewBundleDiscount) -> Result<BundleDiscount> {
        check_part(&new.hash)?;
        self.transact(|tx| {
            let d = tx.dbs();
            if tx.get_json::<Entity>(&d.entities, &id_key(new.entity_id))?.is_none() {
                return Err(Error::EntityNotFound(new.entity_id.to_string()));
            }
            let k = owned_key(new.entity_id, &[&new.hash]);
            let (id, uses) = match tx.get_json::<BundleDiscount>(&d.bundles, &k)? {
                Some(existing) => (existing.id, existing.uses),
                None => (tx.next_id(NEXT_BUNDLE_ID)?, 0),
            };
            let discount = BundleDiscount {
                id,
                entity_id: new.entity_id,
                hash: new.hash,
                name: new.name,
                rule: new.rule,
                valid_from: new.valid_from,
                valid_until: new.valid_until,
                min_quantity: new.min_quantity,
                max_uses: new.max_uses,
                uses,
            };
            tx.put_json(&d.bundles, &k, &discount)?;
            Ok(discount)
        })
    }

    /// Count one use of a discount. `Ok(None)` if it does not exist.
    pub fn record_bundle_use(&self, entity_id: u64, hash: &str) -> Result<Option<BundleDiscount>> {
        check_part(hash)?;
        let k = owned_key(entity_id, &[hash]);
        self.transact(|tx| {
            let d = tx.dbs();
            let Some(mut discount) = tx.get_json::<BundleDiscount>(&d.bundles, &k)? else {
                return Ok(None);
            };
            discount.uses = discount.uses.saturating_add(1);
            tx.put_json(&d.bundles, &k, &discount)?;
            tracing::debug!(entity_id, id = discount.id, uses = discount.uses, "recorded bundle use");
            Ok(Some(discount))
        })
    }

    /// [`find_bundle_discount`] against this store at the current time
    pub fn find_bundle_discount(&self, entity: &Entity, hash: &str) -> Result<Option<BundleDiscount>> {
        find_bundle_discount(self, self, entity, hash, now_millis())
    }
}

impl BundleStore for Store {
    fn bundle_discount(&self, entity_id: u64, hash: &str) -> Result<Option<BundleDiscount>> {
        check_part(hash)?;
        let k = owned_key(entity_id, &[hash]);
        self.read(|d, tx| get_json(&d.bundles, tx, &k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discount(rule: DiscountRule) -> BundleDiscount {
        BundleDiscount {
            id: 1,
            entity_id: 1,
            hash: "h".into(),
            name: "test".into(),
            rule,
            valid_from: None,
            valid_until: None,
            min_quantity: 1,
            max_uses: None,
            uses: 0,
        }
    }

    #[test]
    fn test_apply_rules() {
        let sub = Decimal::new(20000, 2);
        assert_eq!(discount(DiscountRule::FixedPrice(Decimal::new(150, 0))).apply(sub, 1), Some(Decimal::new(150, 0)));
        assert_eq!(discount(DiscountRule::Percent(Decimal::new(10, 0))).apply(sub, 1), Some(Decimal::new(180, 0)));
        assert_eq!(discount(DiscountRule::Amount(Decimal::new(25, 0))).apply(sub, 2), Some(Decimal::new(150, 0)));
    }

    #[test]
    fn test_apply_never_negative() {
        let d = discount(DiscountRule::Amount(Decimal::new(500, 0)));
        assert_eq!(d.apply(Decimal::new(100, 0), 1), Some(Decimal::ZERO));
    }

    #[test]
    fn test_apply_below_min_quantity() {
        let mut d = discount(DiscountRule::Percent(Decimal::new(50, 0)));
        d.min_quantity = 3;
        assert_eq!(d.apply(Decimal::new(100, 0), 2), Some(Decimal::new(100, 0)));
    }

    #[test]
    fn test_apply_overflow_is_none() {
        let huge = Decimal::MAX / Decimal::TEN;
        assert_eq!(discount(DiscountRule::FixedPrice(huge)).apply(Decimal::ONE_HUNDRED, 100), None);
        assert_eq!(discount(DiscountRule::Percent(Decimal::ONE_HUNDRED)).apply(Decimal::MAX, 1), None);
        assert_eq!(discount(DiscountRule::Amount(huge)).apply(Decimal::MIN, 100), None);
    }

    #[test]
    fn test_is_active_window_and_uses() {
        let mut d = discount(DiscountRule::Percent(Decimal::ONE));
        d.valid_from = Some(100);
        d.valid_until = Some(200);
        assert!(!d.is_active(99));
        assert!(d.is_active(150));
        assert!(!d.is_active(201));
        d.max_uses = Some(2);
        d.uses = 2;
        assert!(!d.is_active(150));
    }
}
