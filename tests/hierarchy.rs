//! Entity hierarchy tests
//!
//! Paths, tier rules, ancestor order and descendant prefix scans.

use tempfile::TempDir;
use tierbit::{EntityHierarchy, EntityType, Error, Store};

fn setup() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn paths_and_depths_follow_parents() {
    let (_dir, store) = setup();
    let org = store.create_entity("org", EntityType::M1, None).unwrap();
    let shop = store.create_entity("Shop", EntityType::M2, Some(org.id)).unwrap();
    let drop = store.create_entity("drop", EntityType::M3, Some(shop.id)).unwrap();

    assert_eq!(org.path, "ORG");
    assert_eq!(shop.path, "ORG/SHOP");
    assert_eq!(drop.path, "ORG/SHOP/DROP");
    assert_eq!((org.depth, shop.depth, drop.depth), (0, 1, 2));
    assert!(org.is_root());
    assert_eq!(drop.parent_id, Some(shop.id));
}

#[test]
fn roots_must_be_masters() {
    let (_dir, store) = setup();
    assert!(matches!(
        store.create_entity("SHOP", EntityType::M2, None),
        Err(Error::InvalidKey(_))
    ));
    let org = store.create_entity("ORG", EntityType::M1, None).unwrap();
    assert!(matches!(
        store.create_entity("SUB", EntityType::M1, Some(org.id)),
        Err(Error::InvalidKey(_))
    ));
}

/// Children sit exactly one tier below their parent: M1, then M2, then M3
#[test]
fn tiers_follow_parent_tier() {
    let (_dir, store) = setup();
    let org = store.create_entity("ORG", EntityType::M1, None).unwrap();
    assert!(matches!(
        store.create_entity("DROP", EntityType::M3, Some(org.id)),
        Err(Error::InvalidKey(_))
    ));

    let shop = store.create_entity("SHOP", EntityType::M2, Some(org.id)).unwrap();
    assert!(matches!(
        store.create_entity("SUB", EntityType::M2, Some(shop.id)),
        Err(Error::InvalidKey(_))
    ));

    let drop = store.create_entity("DROP", EntityType::M3, Some(shop.id)).unwrap();
    for tier in [EntityType::M1, EntityType::M2, EntityType::M3] {
        assert!(matches!(
            store.create_entity("LEAF", tier, Some(drop.id)),
            Err(Error::InvalidKey(_))
        ));
    }
    // Rejected creations leave no trace
    assert_eq!(store.descendants(&org).unwrap(), vec![shop, drop]);
}

#[test]
fn codes_cannot_carry_separators() {
    let (_dir, store) = setup();
    assert!(store.create_entity("A-B", EntityType::M1, None).is_err());
    assert!(store.create_entity("A/B", EntityType::M1, None).is_err());
    assert!(store.create_entity("  ", EntityType::M1, None).is_err());
}

#[test]
fn duplicate_paths_rejected() {
    let (_dir, store) = setup();
    let a = store.create_entity("A", EntityType::M1, None).unwrap();
    let b = store.create_entity("B", EntityType::M1, None).unwrap();
    store.create_entity("SHOP", EntityType::M2, Some(a.id)).unwrap();

    assert!(store.create_entity("shop", EntityType::M2, Some(a.id)).is_err());
    // Same code under another parent is a different path
    store.create_entity("SHOP", EntityType::M2, Some(b.id)).unwrap();
}

#[test]
fn missing_parent_is_not_found() {
    let (_dir, store) = setup();
    assert!(matches!(
        store.create_entity("SHOP", EntityType::M2, Some(99)),
        Err(Error::EntityNotFound(_))
    ));
}

// ============================================================================
// Lookups
// ============================================================================

#[test]
fn ancestors_root_first() {
    let (_dir, store) = setup();
    let org = store.create_entity("ORG", EntityType::M1, None).unwrap();
    let shop = store.create_entity("SHOP", EntityType::M2, Some(org.id)).unwrap();
    let drop = store.create_entity("DROP", EntityType::M3, Some(shop.id)).unwrap();

    let codes: Vec<String> = store.ancestors(&drop).unwrap().into_iter().map(|e| e.code).collect();
    assert_eq!(codes, vec!["ORG", "SHOP"]);
    assert!(store.ancestors(&org).unwrap().is_empty());
}

#[test]
fn descendants_exclude_prefix_siblings() {
    let (_dir, store) = setup();
    let org = store.create_entity("ORG", EntityType::M1, None).unwrap();
    let shop = store.create_entity("SHOP", EntityType::M2, Some(org.id)).unwrap();
    let shop2 = store.create_entity("SHOP2", EntityType::M2, Some(org.id)).unwrap();
    let drop = store.create_entity("DROP", EntityType::M3, Some(shop.id)).unwrap();
    store.create_entity("DROP", EntityType::M3, Some(shop2.id)).unwrap();

    let under_shop = store.descendants(&shop).unwrap();
    assert_eq!(under_shop, vec![drop]);
    assert_eq!(store.descendants(&org).unwrap().len(), 4);
}

#[test]
fn lookup_by_id_and_path() {
    let (_dir, store) = setup();
    let org = store.create_entity("ORG", EntityType::M1, None).unwrap();
    let shop = store.create_entity("SHOP", EntityType::M2, Some(org.id)).unwrap();

    assert_eq!(store.entity(shop.id).unwrap(), Some(shop.clone()));
    assert_eq!(store.entity_by_path("ORG/SHOP").unwrap(), Some(shop));
    assert_eq!(store.entity_by_path("ORG/NOPE").unwrap(), None);
    assert!(matches!(store.require_entity(42), Err(Error::EntityNotFound(_))));
}

#[test]
fn clear_empties_everything() {
    let (_dir, store) = setup();
    let org = store.create_entity("ORG", EntityType::M1, None).unwrap();
    store.clear().unwrap();
    assert_eq!(store.entity(org.id).unwrap(), None);
    // Counters restart
    let again = store.create_entity("ORG", EntityType::M1, None).unwrap();
    assert_eq!(again.id, org.id);
}
