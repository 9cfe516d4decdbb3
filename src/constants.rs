//! Limits, storage sizing and SKU grammar characters

/// Maximum byte length of a single key part (length prefix is one byte)
pub const MAX_KEY_PART_LEN: usize = 255;

/// LMDB map size
pub const MAP_SIZE: usize = 1 << 30;

/// Number of named LMDB databases opened by the store
pub const MAX_DBS: u32 = 8;

/// Separator between ancestor codes in an entity path
pub const PATH_SEPARATOR: char = '/';

// Compound SKU grammar
pub const ITEM_SEPARATOR: char = ',';
pub const BUNDLE_SEPARATOR: char = '|';
pub const SEGMENT_SEPARATOR: char = '-';
pub const OPTION_VALUE_SEPARATOR: char = '~';
pub const QUANTITY_SEPARATOR: char = '*';

// Meta counters
pub const NEXT_ENTITY_ID: &str = "next_entity_id";
pub const NEXT_REQUEST_ID: &str = "next_request_id";
pub const NEXT_PRODUCT_ID: &str = "next_product_id";
pub const NEXT_BUNDLE_ID: &str = "next_bundle_id";
