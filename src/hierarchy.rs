//! Tenant hierarchy: M1 master → M2 facade → M3 dropshipper
//!
//! Every entity carries its materialized `path` (slash-joined ancestor codes
//! ending in its own code), so ancestors are derived by splitting the path and
//! descendants by a prefix scan on `path/`.

use heed::RoTxn;
use serde::{Deserialize, Serialize};

use crate::constants::{NEXT_ENTITY_ID, PATH_SEPARATOR};
use crate::error::{err, Error, Result};
use crate::keys::{check_part, id_key};
use crate::store::{get_json, Dbs, Store, Tx};

/// Tier of a tenant entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// Master: catalog owner, always a root
    M1,
    /// Facade / storefront
    M2,
    /// Dropshipper
    M3,
}

/// A node of the tenant forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u64,
    pub code: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub parent_id: Option<u64>,
    pub path: String,
    pub depth: u32,
}

impl Entity {
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Paths of all ancestors, root first, excluding self
    pub fn ancestor_paths(&self) -> Vec<String> {
        let codes: Vec<&str> = self.path.split(PATH_SEPARATOR).collect();
        (1..codes.len())
            .map(|i| codes[..i].join(&PATH_SEPARATOR.to_string()))
            .collect()
    }

    /// Prefix every descendant path starts with
    #[inline]
    pub fn descendant_prefix(&self) -> String {
        format!("{}{}", self.path, PATH_SEPARATOR)
    }
}

/// Read access to the tenant hierarchy
pub trait EntityHierarchy {
    fn entity(&self, id: u64) -> Result<Option<Entity>>;

    fn entity_by_path(&self, path: &str) -> Result<Option<Entity>>;

    /// Ancestors ordered root → parent, excluding the entity itself
    fn ancestors(&self, entity: &Entity) -> Result<Vec<Entity>>;

    /// Every entity whose path starts with `{entity.path}/`
    fn descendants(&self, entity: &Entity) -> Result<Vec<Entity>>;

    /// Like [`entity`](Self::entity) but absence is an error
    fn require_entity(&self, id: u64) -> Result<Entity> {
        self.entity(id)?
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))
    }
}

/// Validate and normalize an entity code (codes become path and lineage SKU segments)
pub fn normalize_code(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return Err(Error::InvalidKey("entity code cannot be empty".into()));
    }
    if let Some(c) = code.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(Error::InvalidKey(format!(
            "entity code {:?} contains reserved character {:?}",
            code, c
        )));
    }
    check_part(&code)?;
    Ok(code)
}

impl EntityType {
    /// Tier a child of this tier must have
    pub fn child_type(self) -> Option<EntityType> {
        match self {
            EntityType::M1 => Some(EntityType::M2),
            EntityType::M2 => Some(EntityType::M3),
            EntityType::M3 => None,
        }
    }
}

impl Store {
    /// Create an entity under `parent`. Roots are M1, an M1's children are M2
    /// and an M2's children are M3; M3 entities have no children.
    pub fn create_entity(&self, code: &str, entity_type: EntityType, parent: Option<u64>) -> Result<Entity> {
        let code = normalize_code(code)?;
        if parent.is_none() && entity_type != EntityType::M1 {
            return Err(Error::InvalidKey(format!("root entity must be M1, got {:?}", entity_type)));
        }
        let entity = self.transact(|tx| {
            let d = tx.dbs();
            let (path, depth) = match parent {
                Some(pid) => {
                    let p = entity_in(d, tx.ro(), pid)?.ok_or_else(|| Error::EntityNotFound(pid.to_string()))?;
                    if p.entity_type.child_type() != Some(entity_type) {
                        return Err(Error::InvalidKey(format!(
                            "{:?} entity cannot be placed under {:?} {}",
                            entity_type, p.entity_type, p.code
                        )));
                    }
                    (format!("{}{}{}", p.path, PATH_SEPARATOR, code), p.depth + 1)
                }
                None => (code.clone(), 0),
            };
            if d.paths.get(tx.ro(), &path).map_err(err)?.is_some() {
                return Err(Error::InvalidKey(format!("entity path {} already exists", path)));
            }
            let id = tx.next_id(NEXT_ENTITY_ID)?;
            let entity = Entity { id, code, entity_type, parent_id: parent, path, depth };
            tx.put_json(&d.entities, &id_key(id), &entity)?;
            d.paths.put(tx.tx(), &entity.path, &id).map_err(err)?;
            Ok(entity)
        })?;
        tracing::debug!(id = entity.id, path = %entity.path, "created entity");
        Ok(entity)
    }
}

fn entity_in(d: &Dbs, tx: &RoTxn, id: u64) -> Result<Option<Entity>> {
    get_json(&d.entities, tx, &id_key(id))
}

fn entity_by_path_in(d: &Dbs, tx: &RoTxn, path: &str) -> Result<Option<Entity>> {
    match d.paths.get(tx, path).map_err(err)? {
        Some(id) => entity_in(d, tx, id),
        None => Ok(None),
    }
}

fn ancestors_in(d: &Dbs, tx: &RoTxn, entity: &Entity) -> Result<Vec<Entity>> {
    let mut r = Vec::with_capacity(entity.depth as usize);
    for path in entity.ancestor_paths() {
        let a = entity_by_path_in(d, tx, &path)?.ok_or_else(|| Error::EntityNotFound(path.clone()))?;
        r.push(a);
    }
    Ok(r)
}

fn descendants_in(d: &Dbs, tx: &RoTxn, entity: &Entity) -> Result<Vec<Entity>> {
    let mut ids = Vec::new();
    for item in d.paths.prefix_iter(tx, &entity.descendant_prefix()).map_err(err)? {
        let (_, id) = item.map_err(err)?;
        ids.push(id);
    }
    let mut r = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(e) = entity_in(d, tx, id)? {
            r.push(e);
        }
    }
    Ok(r)
}

impl EntityHierarchy for Store {
    fn entity(&self, id: u64) -> Result<Option<Entity>> {
        self.read(|d, tx| entity_in(d, tx, id))
    }

    fn entity_by_path(&self, path: &str) -> Result<Option<Entity>> {
        self.read(|d, tx| entity_by_path_in(d, tx, path))
    }

    fn ancestors(&self, entity: &Entity) -> Result<Vec<Entity>> {
        self.read(|d, tx| ancestors_in(d, tx, entity))
    }

    fn descendants(&self, entity: &Entity) -> Result<Vec<Entity>> {
        self.read(|d, tx| descendants_in(d, tx, entity))
    }
}

/// The hierarchy as seen from inside a write transaction
impl EntityHierarchy for Tx<'_> {
    fn entity(&self, id: u64) -> Result<Option<Entity>> {
        entity_in(self.dbs(), self.ro(), id)
    }

    fn entity_by_path(&self, path: &str) -> Result<Option<Entity>> {
        entity_by_path_in(self.dbs(), self.ro(), path)
    }

    fn ancestors(&self, entity: &Entity) -> Result<Vec<Entity>> {
        ancestors_in(self.dbs(), self.ro(), entity)
    }

    fn descendants(&self, entity: &Entity) -> Result<Vec<Entity>> {
        descendants_in(self.dbs(), self.ro(), entity)
    }
}
