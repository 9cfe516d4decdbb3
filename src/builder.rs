//! Compound SKU builder, the inverse of [`crate::sku::parse`]
//!
//! Base SKUs are uppercased and option codes lowercased on output. Items that
//! share a `bundle_group` are joined with `|` and emitted at the position of
//! the group's first member; a group with one member is emitted as a plain
//! item.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{BUNDLE_SEPARATOR, ITEM_SEPARATOR, SEGMENT_SEPARATOR};
use crate::sku::{bundle_hash, SkuEntry, SkuOption, SkuParseResult};

/// Cart line to encode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub base_sku: String,
    #[serde(default)]
    pub options: Vec<SkuOption>,
    #[serde(default)]
    pub bundle_group: Option<String>,
}

impl LineItem {
    pub fn new(base_sku: impl Into<String>) -> Self {
        LineItem { base_sku: base_sku.into(), ..Default::default() }
    }

    pub fn option(self, code: impl Into<String>, value: impl Into<String>) -> Self {
        self.option_qty(code, value, 1)
    }

    pub fn option_qty(mut self, code: impl Into<String>, value: impl Into<String>, quantity: u32) -> Self {
        self.options.push(SkuOption::new(code, value, quantity));
        self
    }

    pub fn in_bundle(mut self, group: impl Into<String>) -> Self {
        self.bundle_group = Some(group.into());
        self
    }
}

/// Encode one item: `BASE-code~value[*qty]...`
pub fn build_item(base_sku: &str, options: &[SkuOption]) -> String {
    let mut s = base_sku.to_uppercase();
    for o in options {
        let option = SkuOption { code: o.code.to_lowercase(), ..o.clone() };
        s.push(SEGMENT_SEPARATOR);
        s.push_str(&option.to_string());
    }
    s
}

/// Encode a cart as a compound SKU
pub fn build(items: &[LineItem]) -> String {
    let mut entries: Vec<Vec<String>> = Vec::new();
    let mut groups: HashMap<&str, usize> = HashMap::new();
    for item in items {
        let sku = build_item(&item.base_sku, &item.options);
        match item.bundle_group.as_deref().filter(|g| !g.is_empty()) {
            Some(group) => match groups.get(group) {
                Some(&i) => entries[i].push(sku),
                None => {
                    groups.insert(group, entries.len());
                    entries.push(vec![sku]);
                }
            },
            None => entries.push(vec![sku]),
        }
    }
    entries
        .iter()
        .map(|members| members.join(&BUNDLE_SEPARATOR.to_string()))
        .collect::<Vec<_>>()
        .join(&ITEM_SEPARATOR.to_string())
}

/// Prefix a base SKU with uppercased entity codes: `(WB500L, [orgorg, wbuts])` → `ORGORG-WBUTS-WB500L`
pub fn add_lineage<S: AsRef<str>>(base_sku: &str, entity_codes: &[S]) -> String {
    let mut segments: Vec<String> = entity_codes.iter().map(|c| c.as_ref().to_uppercase()).collect();
    segments.push(base_sku.to_string());
    segments.join(&SEGMENT_SEPARATOR.to_string())
}

/// Same hash the parser attaches to a bundle with these base SKUs
pub fn generate_bundle_hash<S: AsRef<str>>(base_skus: &[S]) -> String {
    bundle_hash(base_skus)
}

impl SkuParseResult {
    /// Line items that [`build`] turns back into an equivalent compound SKU.
    /// Bundles get group names `bundle-1`, `bundle-2`, ... in order.
    pub fn to_line_items(&self) -> Vec<LineItem> {
        let mut r = Vec::new();
        let mut bundles = 0;
        for entry in &self.entries {
            match entry {
                SkuEntry::Item(i) => r.push(LineItem {
                    base_sku: i.base_sku.clone(),
                    options: i.options.clone(),
                    bundle_group: None,
                }),
                SkuEntry::Bundle(b) => {
                    bundles += 1;
                    let group = format!("bundle-{}", bundles);
                    r.extend(b.items.iter().map(|i| LineItem {
                        base_sku: i.base_sku.clone(),
                        options: i.options.clone(),
                        bundle_group: Some(group.clone()),
                    }));
                }
            }
        }
        r
    }
}
