//! Permission matrix engine
//!
//! Evaluation is top-down: an entity's ancestors are consulted root first
//! before its own record.
//!
//! - A locked denial at any ancestor denies unconditionally.
//! - An unlocked denial at an ancestor also ends evaluation with a denial,
//!   so an M2 that says no for itself says no for its M3s too.
//! - An ancestor allow only lets evaluation continue; it never answers for a
//!   descendant that has no record of its own (the result is `Undefined`).
//!
//! Writes that must respect ancestor locks (`train`, `set_permission`, allow
//! locks) do their lock check inside the same store transaction as the write.
//! An ancestor's locked denial of the key in any scope blocks them.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{MatrixConfig, Mode};
use crate::error::{Error, Result};
use crate::hierarchy::{Entity, EntityHierarchy};
use crate::keys::normalize_scope;
use crate::permission::{
    NewPermissionRequest, PermissionRecord, PermissionRequest, PermissionResult, PermissionSource,
    PermissionStore, PermissionWriter, RequestContext, RequestStatus,
};
use crate::store::{now_millis, Store};

/// Result of [`PermissionMatrix::lock`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockOutcome {
    /// The locking entity's own record
    pub record: PermissionRecord,
    /// Number of descendant records written
    pub cascaded: usize,
}

/// Result of [`PermissionMatrix::unlock`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockOutcome {
    /// The unlocked own record, if the entity had one
    pub record: Option<PermissionRecord>,
    /// Number of cascaded descendant records removed
    pub removed: usize,
}

/// Policy decision point over an entity hierarchy and a permission store
pub struct PermissionMatrix<H, S> {
    hierarchy: H,
    store: S,
    config: MatrixConfig,
}

impl PermissionMatrix<Store, Store> {
    /// Engine backed entirely by one LMDB store
    pub fn with_store(store: Store, config: MatrixConfig) -> Self {
        PermissionMatrix::new(store.clone(), store, config)
    }
}

impl<H: EntityHierarchy, S: PermissionStore> PermissionMatrix<H, S> {
    pub fn new(hierarchy: H, store: S, config: MatrixConfig) -> Self {
        PermissionMatrix { hierarchy, store, config }
    }

    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Can `entity` perform `key` in `scope`? Pure read.
    pub fn can(&self, entity: &Entity, key: &str, scope: Option<&str>) -> Result<PermissionResult> {
        check_key(key)?;
        let scope = normalize_scope(scope);
        for ancestor in self.hierarchy.ancestors(entity)? {
            match self.store.find(ancestor.id, key, scope)? {
                Some(r) if r.is_locked_denial() => {
                    debug!(entity = %entity.path, key, locked_by = %ancestor.code, "denied by ancestor lock");
                    return Ok(PermissionResult::Denied {
                        reason: format!("Locked by {}", ancestor.code),
                        locked_by: Some(ancestor.code),
                    });
                }
                Some(r) if !r.allowed => {
                    debug!(entity = %entity.path, key, denied_by = %ancestor.code, "denied by ancestor");
                    return Ok(PermissionResult::denied(format!("Denied by {}", ancestor.code)));
                }
                _ => {}
            }
        }
        Ok(match self.store.find(entity.id, key, scope)? {
            Some(r) if r.allowed => PermissionResult::Allowed,
            Some(_) => PermissionResult::denied("Denied by own policy"),
            None => PermissionResult::Undefined {
                key: key.to_string(),
                scope: scope.map(str::to_string),
            },
        })
    }

    /// Evaluate `action` for a caller request, resolve undefined permissions
    /// according to the configured mode and write audit rows.
    pub fn gate_request(&self, request: &RequestContext, entity: &Entity, action: &str) -> Result<PermissionResult> {
        let scope = normalize_scope(request.scope.as_deref());
        let new_request = |status| NewPermissionRequest {
            entity_id: entity.id,
            method: request.method.clone(),
            route: request.route.clone(),
            action: action.to_string(),
            scope: scope.map(str::to_string),
            status,
        };

        let result = match self.can(entity, action, scope)? {
            PermissionResult::Undefined { key, scope } => match self.config.mode {
                Mode::Training => {
                    let row = self.store.append_request(new_request(RequestStatus::Pending))?;
                    info!(entity = %entity.path, action, request_id = row.id, "permission pending training");
                    return Ok(PermissionResult::Pending {
                        key,
                        scope,
                        training_url: self.config.training_url_for(row.id),
                    });
                }
                Mode::Permissive { default_allow: true } => PermissionResult::Allowed,
                Mode::Strict | Mode::Permissive { default_allow: false } => {
                    PermissionResult::denied(format!("No permission defined for {}", action))
                }
            },
            other => other,
        };

        if self.config.log_all_checks || (self.config.log_denials && result.is_denied()) {
            self.store.append_request(new_request(RequestStatus::from(&result)))?;
        }
        Ok(result)
    }

    /// Record a learned decision (training mode). Fails with [`Error::Locked`]
    /// when an ancestor holds a locked denial; nothing is written then.
    pub fn train(
        &self,
        entity: &Entity,
        key: &str,
        scope: Option<&str>,
        allow: bool,
        route: Option<&str>,
    ) -> Result<PermissionRecord> {
        check_key(key)?;
        let scope = normalize_scope(scope);
        let ancestors = self.hierarchy.ancestors(entity)?;
        self.store
            .atomically(|w| train_in(w, entity, &ancestors, key, scope, allow, route))
    }

    /// Set an explicit decision. Only allowing is subject to ancestor locks.
    pub fn set_permission(
        &self,
        entity: &Entity,
        key: &str,
        allowed: bool,
        scope: Option<&str>,
    ) -> Result<PermissionRecord> {
        check_key(key)?;
        let scope = normalize_scope(scope);
        let ancestors = self.hierarchy.ancestors(entity)?;
        self.store.atomically(|w| {
            if allowed {
                guard_ancestor_locks(w, &ancestors, key)?;
            }
            let mut record = PermissionRecord::new(entity.id, key, scope, allowed, PermissionSource::Explicit);
            record.set_by_entity_id = Some(entity.id);
            w.upsert(&record)?;
            Ok(record)
        })
    }

    /// Lock a decision on `entity` and cascade it to every current descendant.
    /// All rows are written in one transaction.
    pub fn lock(&self, entity: &Entity, key: &str, allowed: bool, scope: Option<&str>) -> Result<LockOutcome> {
        check_key(key)?;
        let scope = normalize_scope(scope);
        let ancestors = self.hierarchy.ancestors(entity)?;
        let outcome = self.store.atomically(|w| {
            if allowed {
                guard_ancestor_locks(w, &ancestors, key)?;
            }
            let descendants = self.descendants_in(w, entity)?;
            let mut own = PermissionRecord::new(entity.id, key, scope, allowed, PermissionSource::Explicit);
            own.locked = true;
            own.set_by_entity_id = Some(entity.id);
            w.upsert(&own)?;
            for d in &descendants {
                let mut r = PermissionRecord::new(d.id, key, scope, allowed, PermissionSource::Inherited);
                r.locked = true;
                r.set_by_entity_id = Some(entity.id);
                w.upsert(&r)?;
            }
            Ok(LockOutcome { record: own, cascaded: descendants.len() })
        })?;
        info!(entity = %entity.path, key, allowed, cascaded = outcome.cascaded, "locked permission");
        Ok(outcome)
    }

    /// Release `entity`'s lock and remove the descendant rows its cascade wrote.
    /// Descendant records set by anyone else are left alone.
    pub fn unlock(&self, entity: &Entity, key: &str, scope: Option<&str>) -> Result<UnlockOutcome> {
        check_key(key)?;
        let scope = normalize_scope(scope);
        let outcome = self.store.atomically(|w| {
            let descendants = self.descendants_in(w, entity)?;
            let record = match w.find_exact(entity.id, key, scope)? {
                Some(mut r) => {
                    r.locked = false;
                    r.source = PermissionSource::Explicit;
                    r.updated_at = now_millis();
                    w.upsert(&r)?;
                    Some(r)
                }
                None => None,
            };
            let set_by_self = |r: &PermissionRecord| r.set_by_entity_id == Some(entity.id);
            let mut removed = 0;
            for d in &descendants {
                if w.delete_where(d.id, key, scope, &set_by_self)? {
                    removed += 1;
                }
            }
            Ok(UnlockOutcome { record, removed })
        })?;
        info!(entity = %entity.path, key, removed = outcome.removed, "unlocked permission");
        Ok(outcome)
    }

    /// Descendants as of the open transaction when the store also holds the
    /// hierarchy, otherwise from the hierarchy collaborator
    fn descendants_in(&self, w: &dyn PermissionWriter, entity: &Entity) -> Result<Vec<Entity>> {
        match w.hierarchy() {
            Some(h) => h.descendants(entity),
            None => self.hierarchy.descendants(entity),
        }
    }

    /// Pending training requests, oldest first
    pub fn pending_requests(&self) -> Result<Vec<PermissionRequest>> {
        self.store.requests(Some(RequestStatus::Pending))
    }

    /// Operator decision on a pending request: trains the permission and
    /// marks the request approved (allow) or rejected (deny).
    pub fn approve_request(&self, id: u64, allow: bool) -> Result<PermissionRecord> {
        let request = self.store.request(id)?.ok_or(Error::RequestNotFound(id))?;
        let entity = self.hierarchy.require_entity(request.entity_id)?;
        let ancestors = self.hierarchy.ancestors(&entity)?;
        self.store.atomically(|w| {
            let mut request = pending_request(w, id)?;
            let record = train_in(
                w,
                &entity,
                &ancestors,
                &request.action,
                request.scope.as_deref(),
                allow,
                Some(&request.route),
            )?;
            request.status = if allow { RequestStatus::Approved } else { RequestStatus::Rejected };
            request.was_trained = true;
            w.update_request(&request)?;
            Ok(record)
        })
    }

    /// Dismiss a pending request without writing a permission
    pub fn reject_request(&self, id: u64) -> Result<PermissionRequest> {
        self.store.atomically(|w| {
            let mut request = pending_request(w, id)?;
            request.status = RequestStatus::Rejected;
            w.update_request(&request)?;
            Ok(request)
        })
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::InvalidKey("permission key cannot be empty".into()));
    }
    Ok(())
}

fn pending_request(w: &dyn PermissionWriter, id: u64) -> Result<PermissionRequest> {
    let request = w.request(id)?.ok_or(Error::RequestNotFound(id))?;
    if request.status != RequestStatus::Pending {
        return Err(Error::RequestNotPending(id));
    }
    Ok(request)
}

/// Fail if any ancestor holds a locked denial for `key` in any scope
fn guard_ancestor_locks(w: &dyn PermissionWriter, ancestors: &[Entity], key: &str) -> Result<()> {
    for ancestor in ancestors {
        if let Some(r) = w
            .find_all_scopes(ancestor.id, key)?
            .into_iter()
            .find(PermissionRecord::is_locked_denial)
        {
            warn!(key, scope = ?r.scope, locked_by = %ancestor.code, "write rejected by ancestor lock");
            return Err(Error::Locked {
                key: key.to_string(),
                scope: r.scope,
                locked_by: ancestor.code.clone(),
            });
        }
    }
    Ok(())
}

fn train_in(
    w: &mut dyn PermissionWriter,
    entity: &Entity,
    ancestors: &[Entity],
    key: &str,
    scope: Option<&str>,
    allow: bool,
    route: Option<&str>,
) -> Result<PermissionRecord> {
    guard_ancestor_locks(w, ancestors, key)?;
    let mut record = PermissionRecord::new(entity.id, key, scope, allow, PermissionSource::Trained);
    record.set_by_entity_id = Some(entity.id);
    record.route = route.map(str::to_string);
    record.trained_at = Some(record.updated_at);
    w.upsert(&record)?;
    debug!(entity = %entity.path, key, allow, "trained permission");
    Ok(record)
}
