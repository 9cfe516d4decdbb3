//! Tierbit - multi-tenant permission matrix and compound SKU codec
//!
//! Two independent cores over one LMDB store:
//!
//! - [`PermissionMatrix`]: top-down policy evaluation across an M1 → M2 → M3
//!   tenant hierarchy, immutable lock cascades and strict/training/permissive
//!   handling of undefined permissions.
//! - [`sku`] / [`builder`]: the compound SKU mini-language
//!   (`LAPTOP-ram~16gb-cover~black*2|MOUSE,PAD`), bundle hashing, lineage
//!   resolution and bundle discounts.

pub mod builder;
pub mod bundle;
pub mod config;
pub mod constants;
pub mod error;
pub mod hierarchy;
pub mod keys;
pub mod lineage;
pub mod matrix;
pub mod permission;
pub mod sku;
pub mod store;

pub use builder::{add_lineage, build, build_item, generate_bundle_hash, LineItem};
pub use bundle::{find_bundle_discount, BundleDiscount, BundleStore, DiscountRule, NewBundleDiscount};
pub use config::{MatrixConfig, Mode};
pub use error::{Error, Result};
pub use hierarchy::{Entity, EntityHierarchy, EntityType};
pub use lineage::{parse_lineage, LineageSku, Product, ProductCatalog, Resolution, SkuLineage};
pub use matrix::{LockOutcome, PermissionMatrix, UnlockOutcome};
pub use permission::{
    NewPermissionRequest, PermissionRecord, PermissionRequest, PermissionResult, PermissionSource,
    PermissionStore, PermissionWriter, RequestContext, RequestStatus,
};
pub use sku::{
    bundle_hash, parse, validate, BundleItem, ParsedItem, SkuEntry, SkuOption, SkuParseResult, SkuValidation,
};
pub use store::{now_millis, Store, Tx};
