//! Permission records, evaluation results and the storage interface
//!
//! Storage contract:
//! - A record is keyed by `(entity_id, key, scope)`; `scope = None` is the wildcard record.
//! - `find(entity, key, Some(s))` tries the exact scope first, then falls back to
//!   the wildcard record. `find(entity, key, None)` only sees the wildcard record.
//! - `atomically` runs the closure in one serializable write transaction:
//!   everything it writes commits together or not at all, and no other writer
//!   interleaves between its reads and its writes.

use serde::{Deserialize, Serialize};

use crate::constants::NEXT_REQUEST_ID;
use crate::error::{err, Result};
use crate::hierarchy::EntityHierarchy;
use crate::keys::{check_part, id_key, normalize_scope, owned_key, record_key};
use crate::store::{get_json, now_millis, scan_json, Store, Tx};

/// How a record came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSource {
    /// Written by an ancestor's lock cascade
    Inherited,
    Explicit,
    /// Learned in training mode
    Trained,
}

/// Stored allow/deny decision of one entity for one permission key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub entity_id: u64,
    pub key: String,
    pub scope: Option<String>,
    pub allowed: bool,
    pub locked: bool,
    pub source: PermissionSource,
    pub set_by_entity_id: Option<u64>,
    /// Route the permission was learned on (training only)
    pub route: Option<String>,
    pub trained_at: Option<u64>,
    pub updated_at: u64,
}

impl PermissionRecord {
    pub fn new(entity_id: u64, key: &str, scope: Option<&str>, allowed: bool, source: PermissionSource) -> Self {
        PermissionRecord {
            entity_id,
            key: key.to_string(),
            scope: normalize_scope(scope).map(str::to_string),
            allowed,
            locked: false,
            source,
            set_by_entity_id: None,
            route: None,
            trained_at: None,
            updated_at: now_millis(),
        }
    }

    /// A locked denial binds every descendant
    #[inline]
    pub fn is_locked_denial(&self) -> bool {
        self.locked && !self.allowed
    }
}

/// Outcome of a permission evaluation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PermissionResult {
    Allowed,
    Denied {
        reason: String,
        locked_by: Option<String>,
    },
    Pending {
        key: String,
        scope: Option<String>,
        training_url: String,
    },
    Undefined {
        key: String,
        scope: Option<String>,
    },
}

impl PermissionResult {
    pub fn denied(reason: impl Into<String>) -> Self {
        PermissionResult::Denied { reason: reason.into(), locked_by: None }
    }

    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionResult::Allowed)
    }

    #[inline]
    pub fn is_denied(&self) -> bool {
        matches!(self, PermissionResult::Denied { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            PermissionResult::Denied { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Status of an audited permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Allowed,
    Denied,
    /// Waiting for an operator decision (training mode)
    Pending,
    Approved,
    Rejected,
}

impl From<&PermissionResult> for RequestStatus {
    fn from(r: &PermissionResult) -> Self {
        match r {
            PermissionResult::Allowed => RequestStatus::Allowed,
            PermissionResult::Denied { .. } => RequestStatus::Denied,
            PermissionResult::Pending { .. } | PermissionResult::Undefined { .. } => RequestStatus::Pending,
        }
    }
}

/// The caller-side request being gated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub method: String,
    pub route: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, route: impl Into<String>) -> Self {
        RequestContext { method: method.into(), route: route.into(), scope: None }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Audit / training row for an evaluated action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: u64,
    pub entity_id: u64,
    pub method: String,
    pub route: String,
    pub action: String,
    pub scope: Option<String>,
    pub status: RequestStatus,
    pub was_trained: bool,
    pub created_at: u64,
}

/// Fields of a request row before an id is assigned
#[derive(Debug, Clone)]
pub struct NewPermissionRequest {
    pub entity_id: u64,
    pub method: String,
    pub route: String,
    pub action: String,
    pub scope: Option<String>,
    pub status: RequestStatus,
}

/// Exact scope first, then the wildcard record
fn scoped_lookup<F>(scope: Option<&str>, mut exact: F) -> Result<Option<PermissionRecord>>
where
    F: FnMut(Option<&str>) -> Result<Option<PermissionRecord>>,
{
    if let Some(s) = normalize_scope(scope) {
        if let Some(r) = exact(Some(s))? {
            return Ok(Some(r));
        }
    }
    exact(None)
}

/// Operations available inside a write transaction
pub trait PermissionWriter {
    fn find_exact(&self, entity_id: u64, key: &str, scope: Option<&str>) -> Result<Option<PermissionRecord>>;

    /// Records of one entity for `key` in every scope, wildcard first
    fn find_all_scopes(&self, entity_id: u64, key: &str) -> Result<Vec<PermissionRecord>>;

    fn upsert(&mut self, record: &PermissionRecord) -> Result<()>;

    /// Delete the exact `(entity, key, scope)` record if `predicate` accepts it
    fn delete_where(
        &mut self,
        entity_id: u64,
        key: &str,
        scope: Option<&str>,
        predicate: &dyn Fn(&PermissionRecord) -> bool,
    ) -> Result<bool>;

    fn request(&self, id: u64) -> Result<Option<PermissionRequest>>;

    fn append_request(&mut self, request: NewPermissionRequest) -> Result<PermissionRequest>;

    fn update_request(&mut self, request: &PermissionRequest) -> Result<()>;

    /// Entity hierarchy read through this transaction, when the backend stores both
    fn hierarchy(&self) -> Option<&dyn EntityHierarchy> {
        None
    }

    fn find(&self, entity_id: u64, key: &str, scope: Option<&str>) -> Result<Option<PermissionRecord>> {
        scoped_lookup(scope, |s| self.find_exact(entity_id, key, s))
    }
}

/// Persistent permission records and the request log
pub trait PermissionStore {
    fn find_exact(&self, entity_id: u64, key: &str, scope: Option<&str>) -> Result<Option<PermissionRecord>>;

    /// Run `f` in one serializable, all-or-nothing write transaction
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn PermissionWriter) -> Result<T>;

    fn request(&self, id: u64) -> Result<Option<PermissionRequest>>;

    /// Request rows in id order, optionally filtered by status
    fn requests(&self, status: Option<RequestStatus>) -> Result<Vec<PermissionRequest>>;

    fn find(&self, entity_id: u64, key: &str, scope: Option<&str>) -> Result<Option<PermissionRecord>> {
        scoped_lookup(scope, |s| self.find_exact(entity_id, key, s))
    }

    fn append_request(&self, request: NewPermissionRequest) -> Result<PermissionRequest> {
        self.atomically(|w| w.append_request(request))
    }
}

impl PermissionWriter for Tx<'_> {
    fn find_exact(&self, entity_id: u64, key: &str, scope: Option<&str>) -> Result<Option<PermissionRecord>> {
        let k = record_key(entity_id, key, normalize_scope(scope))?;
        self.get_json(&self.dbs().records, &k)
    }

    fn find_all_scopes(&self, entity_id: u64, key: &str) -> Result<Vec<PermissionRecord>> {
        check_part(key)?;
        self.scan_json(&self.dbs().records, &owned_key(entity_id, &[key]))
    }

    fn upsert(&mut self, record: &PermissionRecord) -> Result<()> {
        let k = record_key(record.entity_id, &record.key, record.scope.as_deref())?;
        let d = self.dbs();
        self.put_json(&d.records, &k, record)
    }

    fn delete_where(
        &mut self,
        entity_id: u64,
        key: &str,
        scope: Option<&str>,
        predicate: &dyn Fn(&PermissionRecord) -> bool,
    ) -> Result<bool> {
        match PermissionWriter::find_exact(self, entity_id, key, scope)? {
            Some(r) if predicate(&r) => {
                let k = record_key(entity_id, key, normalize_scope(scope))?;
                let d = self.dbs();
                self.delete(&d.records, &k)
            }
            _ => Ok(false),
        }
    }

    fn request(&self, id: u64) -> Result<Option<PermissionRequest>> {
        self.get_json(&self.dbs().requests, &id_key(id))
    }

    fn append_request(&mut self, request: NewPermissionRequest) -> Result<PermissionRequest> {
        let id = self.next_id(NEXT_REQUEST_ID)?;
        let row = PermissionRequest {
            id,
            entity_id: request.entity_id,
            method: request.method,
            route: request.route,
            action: request.action,
            scope: request.scope,
            status: request.status,
            was_trained: false,
            created_at: now_millis(),
        };
        let d = self.dbs();
        self.put_json(&d.requests, &id_key(id), &row)?;
        Ok(row)
    }

    fn update_request(&mut self, request: &PermissionRequest) -> Result<()> {
        let d = self.dbs();
        self.put_json(&d.requests, &id_key(request.id), request)
    }

    fn hierarchy(&self) -> Option<&dyn EntityHierarchy> {
        Some(self)
    }
}

impl PermissionStore for Store {
    fn find_exact(&self, entity_id: u64, key: &str, scope: Option<&str>) -> Result<Option<PermissionRecord>> {
        let k = record_key(entity_id, key, normalize_scope(scope))?;
        self.read(|d, tx| get_json(&d.records, tx, &k))
    }

    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn PermissionWriter) -> Result<T>,
    {
        self.transact(|tx| f(tx))
    }

    fn request(&self, id: u64) -> Result<Option<PermissionRequest>> {
        self.read(|d, tx| get_json(&d.requests, tx, &id_key(id)))
    }

    fn requests(&self, status: Option<RequestStatus>) -> Result<Vec<PermissionRequest>> {
        self.read(|d, tx| {
            let mut r = Vec::new();
            for item in d.requests.iter(tx).map_err(err)? {
                let (_, v) = item.map_err(err)?;
                let row: PermissionRequest = serde_json::from_str(v).map_err(err)?;
                if status.map_or(true, |s| row.status == s) {
                    r.push(row);
                }
            }
            Ok(r)
        })
    }
}

impl Store {
    /// Every permission record held by one entity, in key order
    pub fn records_for(&self, entity_id: u64) -> Result<Vec<PermissionRecord>> {
        self.read(|d, tx| scan_json(&d.records, tx, &id_key(entity_id)))
    }
}
