//! Lineage SKU resolution tests

use tempfile::TempDir;
use tierbit::{Entity, EntityType, Error, ProductCatalog, SkuLineage, Store};

struct Tree {
    org: Entity,
    shop: Entity,
    drop: Entity,
}

/// ORGORG (M1) ── WBUTS (M2) ── DROP1 (M3)
fn setup() -> (TempDir, Store, SkuLineage<Store, Store>, Tree) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let org = store.create_entity("ORGORG", EntityType::M1, None).unwrap();
    let shop = store.create_entity("WBUTS", EntityType::M2, Some(org.id)).unwrap();
    let drop = store.create_entity("DROP1", EntityType::M3, Some(shop.id)).unwrap();
    store.put_product(org.id, "WB500L", "Water bottle 500ml").unwrap();
    let lineage = SkuLineage::with_store(store.clone());
    (dir, store, lineage, Tree { org, shop, drop })
}

#[test]
fn resolves_master_product_through_facade() {
    let (_dir, _store, l, t) = setup();
    let r = l.resolve("ORGORG-WBUTS-WB500L").unwrap().unwrap();
    assert_eq!(r.entity, t.shop);
    assert_eq!(r.product.entity_id, t.org.id);
    assert_eq!(r.product.sku, "WB500L");
}

#[test]
fn resolves_from_deepest_entity() {
    let (_dir, _store, l, t) = setup();
    let r = l.resolve("orgorg-wbuts-drop1-wb500l").unwrap().unwrap();
    assert_eq!(r.entity, t.drop);
    assert_eq!(r.product.entity_id, t.org.id);
}

#[test]
fn nearest_owner_wins() {
    let (_dir, store, l, t) = setup();
    store.put_product(t.shop.id, "WB500L", "Facade bottle").unwrap();
    let r = l.resolve("ORGORG-WBUTS-DROP1-WB500L").unwrap().unwrap();
    assert_eq!(r.product.entity_id, t.shop.id);
    assert_eq!(r.product.name, "Facade bottle");
}

#[test]
fn hyphenated_product_sku() {
    let (_dir, store, l, t) = setup();
    store.put_product(t.shop.id, "SPECIAL-X", "Special").unwrap();
    let r = l.resolve("ORGORG-WBUTS-SPECIAL-X").unwrap().unwrap();
    assert_eq!(r.entity, t.shop);
    assert_eq!(r.product.sku, "SPECIAL-X");
}

/// A product whose own SKU starts with a lineage code falls back to a shorter path
#[test]
fn product_sku_containing_lineage_code() {
    let (_dir, store, l, t) = setup();
    store.put_product(t.org.id, "WBUTS-KIT", "Kit").unwrap();
    let r = l.resolve("ORGORG-WBUTS-KIT").unwrap().unwrap();
    assert_eq!(r.entity, t.org);
    assert_eq!(r.product.sku, "WBUTS-KIT");
}

#[test]
fn shorter_product_sku_preferred() {
    let (_dir, store, l, t) = setup();
    store.put_product(t.shop.id, "X", "Short").unwrap();
    store.put_product(t.shop.id, "SPECIAL-X", "Long").unwrap();
    let r = l.resolve("ORGORG-WBUTS-SPECIAL-X");
    // Path ORGORG/WBUTS/SPECIAL does not exist, so the split stays at WBUTS
    assert_eq!(r.unwrap().unwrap().product.name, "Short");
}

#[test]
fn unresolvable_is_none() {
    let (_dir, _store, l, _t) = setup();
    assert_eq!(l.resolve("ORGORG-WBUTS-NOPE").unwrap(), None);
    assert_eq!(l.resolve("NOBODY-WB500L").unwrap(), None);
    assert_eq!(l.resolve("WB500L").unwrap(), None);
    assert_eq!(l.resolve("ORGORG--WB500L").unwrap(), None);
    assert_eq!(l.resolve("").unwrap(), None);
}

#[test]
fn catalog_lookup_is_case_insensitive() {
    let (_dir, store, _l, t) = setup();
    let p = store.product(t.org.id, "wb500l").unwrap().unwrap();
    assert_eq!(p.sku, "WB500L");
    assert_eq!(store.product(t.shop.id, "WB500L").unwrap(), None);
}

#[test]
fn put_product_replaces_in_place() {
    let (_dir, store, _l, t) = setup();
    let before = store.product(t.org.id, "WB500L").unwrap().unwrap();
    let after = store.put_product(t.org.id, "wb500l", "Renamed").unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(store.products_of(t.org.id).unwrap(), vec![after]);
}

#[test]
fn put_product_needs_entity_and_sku() {
    let (_dir, store, _l, t) = setup();
    assert!(matches!(store.put_product(99, "A", "a"), Err(Error::EntityNotFound(_))));
    assert!(matches!(store.put_product(t.org.id, " ", "a"), Err(Error::InvalidKey(_))));
}
