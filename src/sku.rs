//! Compound SKU parser
//!
//! ```text
//! compound := item (',' item)*
//! item     := bundle | single
//! bundle   := single ('|' single)+
//! single   := base_sku ('-' option)*
//! option   := code '~' value ('*' quantity)?
//! ```
//!
//! Base SKUs may contain hyphens themselves (lineage prefixes such as
//! `ORGORG-WBUTS-WB500L`). A single is split on `-`; every leading segment
//! without `~` belongs to the base SKU, the first segment with `~` and all
//! following segments are options. A base segment that accidentally contains
//! `~` is therefore read as an option.
//!
//! Parsing is lenient: option segments that do not match the option grammar
//! are dropped and empty items still yield a `ParsedItem` with an empty base.
//! Use [`validate`] to find out what `parse` skipped over.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{
    BUNDLE_SEPARATOR, ITEM_SEPARATOR, OPTION_VALUE_SEPARATOR, QUANTITY_SEPARATOR, SEGMENT_SEPARATOR,
};

/// One chosen option: `code~value*quantity`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkuOption {
    pub code: String,
    pub value: String,
    pub quantity: u32,
}

impl SkuOption {
    pub fn new(code: impl Into<String>, value: impl Into<String>, quantity: u32) -> Self {
        SkuOption { code: code.into(), value: value.into(), quantity }
    }
}

impl fmt::Display for SkuOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.code, OPTION_VALUE_SEPARATOR, self.value)?;
        if self.quantity > 1 {
            write!(f, "{}{}", QUANTITY_SEPARATOR, self.quantity)?;
        }
        Ok(())
    }
}

/// A base SKU with its options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub base_sku: String,
    pub options: Vec<SkuOption>,
}

impl ParsedItem {
    pub fn new(base_sku: impl Into<String>, options: Vec<SkuOption>) -> Self {
        ParsedItem { base_sku: base_sku.into(), options }
    }
}

impl fmt::Display for ParsedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_sku)?;
        for o in &self.options {
            write!(f, "{}{}", SEGMENT_SEPARATOR, o)?;
        }
        Ok(())
    }
}

/// Items grouped for a bundle-discount lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleItem {
    pub items: Vec<ParsedItem>,
    /// [`bundle_hash`] of the members' base SKUs
    pub hash: String,
}

impl BundleItem {
    pub fn new(items: Vec<ParsedItem>) -> Self {
        let hash = bundle_hash(&items.iter().map(|i| i.base_sku.as_str()).collect::<Vec<_>>());
        BundleItem { items, hash }
    }
}

impl fmt::Display for BundleItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", BUNDLE_SEPARATOR)?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

/// One comma-separated entry of a compound SKU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkuEntry {
    Item(ParsedItem),
    Bundle(BundleItem),
}

impl fmt::Display for SkuEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkuEntry::Item(i) => i.fmt(f),
            SkuEntry::Bundle(b) => b.fmt(f),
        }
    }
}

/// Parsed compound SKU, entries in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuParseResult {
    pub entries: Vec<SkuEntry>,
}

impl SkuParseResult {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Every item, bundle members included, in input order
    pub fn items(&self) -> impl Iterator<Item = &ParsedItem> {
        self.entries.iter().flat_map(|e| match e {
            SkuEntry::Item(i) => std::slice::from_ref(i).iter(),
            SkuEntry::Bundle(b) => b.items.iter(),
        })
    }

    pub fn bundles(&self) -> impl Iterator<Item = &BundleItem> {
        self.entries.iter().filter_map(|e| match e {
            SkuEntry::Bundle(b) => Some(b),
            SkuEntry::Item(_) => None,
        })
    }

    pub fn base_skus(&self) -> Vec<&str> {
        self.items().map(|i| i.base_sku.as_str()).collect()
    }
}

impl fmt::Display for SkuParseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", ITEM_SEPARATOR)?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl FromStr for SkuParseResult {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse(s))
    }
}

/// Parse a compound SKU. Empty or blank input yields an empty result.
pub fn parse(input: &str) -> SkuParseResult {
    let input = input.trim();
    if input.is_empty() {
        return SkuParseResult::default();
    }
    let entries = input
        .split(ITEM_SEPARATOR)
        .map(|segment| {
            let segment = segment.trim();
            if segment.contains(BUNDLE_SEPARATOR) {
                SkuEntry::Bundle(BundleItem::new(segment.split(BUNDLE_SEPARATOR).map(parse_single).collect()))
            } else {
                SkuEntry::Item(parse_single(segment))
            }
        })
        .collect();
    SkuParseResult { entries }
}

/// Parse one `base-opt~val-...` segment
pub fn parse_single(s: &str) -> ParsedItem {
    let (base_sku, option_segments) = split_single(s.trim());
    let options = option_segments.into_iter().filter_map(parse_option).collect();
    ParsedItem { base_sku, options }
}

/// Split a single into its base SKU and raw option segments
fn split_single(s: &str) -> (String, Vec<&str>) {
    let segments: Vec<&str> = s.split(SEGMENT_SEPARATOR).collect();
    let first_option = segments
        .iter()
        .position(|seg| seg.contains(OPTION_VALUE_SEPARATOR))
        .unwrap_or(segments.len());
    let base = segments[..first_option].join(&SEGMENT_SEPARATOR.to_string());
    (base, segments[first_option..].to_vec())
}

/// `code~value` or `code~value*quantity`; codes are case-insensitive and stored lowercase
pub fn parse_option(segment: &str) -> Option<SkuOption> {
    let (code, rest) = segment.split_once(OPTION_VALUE_SEPARATOR)?;
    if !is_option_code(code) {
        return None;
    }
    let (value, quantity) = match rest.split_once(QUANTITY_SEPARATOR) {
        Some((value, qty)) => {
            if qty.is_empty() || !qty.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (value, qty.parse::<u32>().ok().filter(|q| *q >= 1)?)
        }
        None => (rest, 1),
    };
    if value.is_empty() {
        return None;
    }
    Some(SkuOption { code: code.to_ascii_lowercase(), value: value.to_string(), quantity })
}

fn is_option_code(code: &str) -> bool {
    let mut chars = code.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Option-independent bundle identity: uppercase, sort, join with `|`, SHA-256 hex
pub fn bundle_hash<S: AsRef<str>>(base_skus: &[S]) -> String {
    let mut skus: Vec<String> = base_skus.iter().map(|s| s.as_ref().to_uppercase()).collect();
    skus.sort();
    let mut hasher = Sha256::new();
    hasher.update(skus.join(&BUNDLE_SEPARATOR.to_string()).as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex encode
mod hex {
    pub fn encode(data: impl AsRef<[u8]>) -> String {
        data.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Outcome of [`validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Strict check of everything [`parse`] tolerates
pub fn validate(input: &str) -> SkuValidation {
    let mut errors = Vec::new();
    let input = input.trim();
    if input.is_empty() {
        errors.push("SKU is empty".to_string());
    } else {
        for (i, segment) in input.split(ITEM_SEPARATOR).enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                errors.push(format!("item {}: empty item", i + 1));
                continue;
            }
            let members: Vec<&str> = segment.split(BUNDLE_SEPARATOR).collect();
            for (j, member) in members.iter().enumerate() {
                let label = if members.len() > 1 {
                    format!("item {} bundle member {}", i + 1, j + 1)
                } else {
                    format!("item {}", i + 1)
                };
                validate_single(member.trim(), &label, &mut errors);
            }
        }
    }
    SkuValidation { valid: errors.is_empty(), errors }
}

fn validate_single(s: &str, label: &str, errors: &mut Vec<String>) {
    if s.is_empty() {
        errors.push(format!("{}: empty SKU", label));
        return;
    }
    let (base, options) = split_single(s);
    if base.is_empty() {
        errors.push(format!("{}: missing base SKU", label));
    } else if !base.chars().all(|c| c.is_ascii_alphanumeric() || c == SEGMENT_SEPARATOR) {
        errors.push(format!("{}: base SKU {:?} contains invalid characters", label, base));
    } else if base.split(SEGMENT_SEPARATOR).any(str::is_empty) {
        errors.push(format!("{}: base SKU {:?} has an empty segment", label, base));
    }
    for segment in options {
        if parse_option(segment).is_none() {
            errors.push(format!("{}: invalid option segment {:?}", label, segment));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_single_keeps_lineage_hyphens() {
        let (base, opts) = split_single("ORGORG-WBUTS-WB500L-ram~16gb-color~red");
        assert_eq!(base, "ORGORG-WBUTS-WB500L");
        assert_eq!(opts, vec!["ram~16gb", "color~red"]);
    }

    #[test]
    fn test_parse_option_grammar() {
        assert_eq!(parse_option("RAM~16gb"), Some(SkuOption::new("ram", "16gb", 1)));
        assert_eq!(parse_option("cover~black*2"), Some(SkuOption::new("cover", "black", 2)));
        assert_eq!(parse_option("_x1~v"), Some(SkuOption::new("_x1", "v", 1)));
        assert_eq!(parse_option("1ram~16gb"), None);
        assert_eq!(parse_option("ram~"), None);
        assert_eq!(parse_option("ram16gb"), None);
        assert_eq!(parse_option("ram~16gb*"), None);
        assert_eq!(parse_option("ram~16gb*0"), None);
        assert_eq!(parse_option("ram~16gb*+2"), None);
        assert_eq!(parse_option("r-m~x"), None);
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex::encode([0x00u8, 0xab, 0xff]), "00abff");
    }

    #[test]
    fn test_bundle_hash_of_known_input() {
        // SHA-256("A")
        assert_eq!(
            bundle_hash(&["a"]),
            "559aead08264d5795d3909718cdd05abd49572e84fe55590eef31a88a08fdffd"
        );
    }
}
