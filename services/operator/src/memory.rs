//! In-memory store, event sink, and switchover actuator.
//!
//! Backs integration tests and local runs. Faithful to the real
//! boundary: resource versions are checked on every conditional write,
//! creations fail on duplicates, and claim deletion is idempotent. Test
//! helpers inject role reports and readiness the way a live workload's
//! side channel would.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use iset_identity::{ClaimName, InstanceName, SetRef};

use crate::instance::{Claim, Instance, InstancePhase};
use crate::spec::{InstanceSet, InstanceSetSpec, SwitchoverSpec};
use crate::status::InstanceSetStatus;
use crate::store::{EventKind, EventSink, ObjectStore, StoreError, SwitchoverActuator};

fn key(set: &SetRef) -> String {
    set.to_string()
}

#[derive(Default)]
struct Inner {
    sets: BTreeMap<String, InstanceSet>,
    instances: BTreeMap<String, BTreeMap<InstanceName, Instance>>,
    claims: BTreeMap<String, BTreeMap<ClaimName, Claim>>,
    next_version: u64,
    unavailable: bool,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

/// In-memory [`ObjectStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a set object, assigning its first resource version.
    pub fn insert_set(&self, mut set: InstanceSet) -> u64 {
        let mut inner = self.inner.lock().expect("store poisoned");
        let version = inner.bump();
        set.meta.resource_version = version;
        let k = key(&set.set_ref());
        inner.sets.insert(k, set);
        version
    }

    /// Edit the spec in place, bumping generation and resource version
    /// like a declarative API server would.
    pub fn update_spec(&self, set: &SetRef, edit: impl FnOnce(&mut InstanceSetSpec)) {
        let mut inner = self.inner.lock().expect("store poisoned");
        let version = inner.bump();
        if let Some(stored) = inner.sets.get_mut(&key(set)) {
            edit(&mut stored.spec);
            stored.meta.generation += 1;
            stored.meta.resource_version = version;
        }
    }

    /// Mark the set for cascading deletion.
    pub fn request_deletion(&self, set: &SetRef) {
        let mut inner = self.inner.lock().expect("store poisoned");
        let version = inner.bump();
        if let Some(stored) = inner.sets.get_mut(&key(set)) {
            stored.meta.deletion_requested = true;
            stored.meta.resource_version = version;
        }
    }

    /// Inject a role report, as the workload's side channel would.
    pub fn set_role(&self, set: &SetRef, name: &InstanceName, role: Option<&str>) {
        let mut inner = self.inner.lock().expect("store poisoned");
        if let Some(instance) = inner
            .instances
            .get_mut(&key(set))
            .and_then(|m| m.get_mut(name))
        {
            instance.reported_role = role.map(str::to_string);
        }
    }

    /// Mark one instance running and ready.
    pub fn mark_ready(&self, set: &SetRef, name: &InstanceName) {
        let mut inner = self.inner.lock().expect("store poisoned");
        if let Some(instance) = inner
            .instances
            .get_mut(&key(set))
            .and_then(|m| m.get_mut(name))
        {
            instance.phase = InstancePhase::Running;
            instance.ready = true;
            instance.ready_since = Some(Utc::now());
        }
    }

    /// Mark every instance of the set running and ready.
    pub fn mark_all_ready(&self, set: &SetRef) {
        let mut inner = self.inner.lock().expect("store poisoned");
        if let Some(instances) = inner.instances.get_mut(&key(set)) {
            for instance in instances.values_mut() {
                instance.phase = InstancePhase::Running;
                instance.ready = true;
                instance.ready_since = Some(Utc::now());
            }
        }
    }

    /// Simulate a store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().expect("store poisoned").unavailable = unavailable;
    }

    /// Sorted instance names, for assertions.
    pub fn instance_names(&self, set: &SetRef) -> Vec<String> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .instances
            .get(&key(set))
            .map(|m| m.keys().map(|n| n.to_string()).collect())
            .unwrap_or_default()
    }

    /// Sorted claim names, for assertions.
    pub fn claim_names(&self, set: &SetRef) -> Vec<String> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .claims
            .get(&key(set))
            .map(|m| m.keys().map(|n| n.to_string()).collect())
            .unwrap_or_default()
    }

    /// Resource version of one claim, if present.
    pub fn claim_version(&self, set: &SetRef, name: &str) -> Option<u64> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .claims
            .get(&key(set))?
            .iter()
            .find(|(claim_name, _)| claim_name.to_string() == name)
            .map(|(_, claim)| claim.resource_version)
    }

    /// Current status of a set, if it still exists.
    pub fn status_of(&self, set: &SetRef) -> Option<InstanceSetStatus> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.sets.get(&key(set)).map(|s| s.status.clone())
    }

    /// True when the set object has been removed.
    pub fn set_exists(&self, set: &SetRef) -> bool {
        let inner = self.inner.lock().expect("store poisoned");
        inner.sets.contains_key(&key(set))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_sets(&self) -> Result<Vec<InstanceSet>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        Ok(inner.sets.values().cloned().collect())
    }

    async fn get_set(&self, set: &SetRef) -> Result<InstanceSet, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        inner
            .sets
            .get(&key(set))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(set.to_string()))
    }

    async fn update_status(
        &self,
        set: &SetRef,
        expected_version: u64,
        status: InstanceSetStatus,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        let version = inner.bump();
        let stored = inner
            .sets
            .get_mut(&key(set))
            .ok_or_else(|| StoreError::NotFound(set.to_string()))?;
        if stored.meta.resource_version != expected_version {
            return Err(StoreError::Conflict(set.to_string()));
        }
        stored.status = status;
        stored.meta.resource_version = version;
        Ok(version)
    }

    async fn remove_set(&self, set: &SetRef, expected_version: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        let k = key(set);
        let stored = inner
            .sets
            .get(&k)
            .ok_or_else(|| StoreError::NotFound(set.to_string()))?;
        if stored.meta.resource_version != expected_version {
            return Err(StoreError::Conflict(set.to_string()));
        }
        inner.sets.remove(&k);
        inner.instances.remove(&k);
        // Retained claims survive the set object, addressable by name.
        Ok(())
    }

    async fn list_instances(
        &self,
        set: &SetRef,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Instance>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        Ok(inner
            .instances
            .get(&key(set))
            .map(|instances| {
                instances
                    .values()
                    .filter(|i| {
                        selector
                            .iter()
                            .all(|(k, v)| i.labels.get(k) == Some(v))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_instance(&self, set: &SetRef, mut instance: Instance) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        let version = inner.bump();
        let instances = inner.instances.entry(key(set)).or_default();
        if instances.contains_key(&instance.name) {
            return Err(StoreError::AlreadyExists(instance.name.to_string()));
        }
        instance.resource_version = version;
        instance.phase = InstancePhase::Pending;
        instance.ready = false;
        instance.ready_since = None;
        instances.insert(instance.name.clone(), instance);
        Ok(())
    }

    async fn patch_instance(
        &self,
        set: &SetRef,
        name: &InstanceName,
        expected_version: u64,
        patched: Instance,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        let version = inner.bump();
        let instance = inner
            .instances
            .get_mut(&key(set))
            .and_then(|m| m.get_mut(name))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if instance.resource_version != expected_version {
            return Err(StoreError::Conflict(name.to_string()));
        }
        instance.spec = patched.spec;
        instance.revision = patched.revision;
        instance.placement = patched.placement;
        instance.labels = patched.labels;
        instance.resource_version = version;
        // The workload restarts with the new spec; readiness resets.
        instance.ready = false;
        instance.ready_since = None;
        Ok(())
    }

    async fn delete_instance(
        &self,
        set: &SetRef,
        name: &InstanceName,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        let instances = inner
            .instances
            .get_mut(&key(set))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let instance = instances
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if instance.resource_version != expected_version {
            return Err(StoreError::Conflict(name.to_string()));
        }
        instances.remove(name);
        Ok(())
    }

    async fn list_claims(&self, set: &SetRef) -> Result<Vec<Claim>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        Ok(inner
            .claims
            .get(&key(set))
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_claim(&self, set: &SetRef, mut claim: Claim) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        let version = inner.bump();
        let claims = inner.claims.entry(key(set)).or_default();
        if claims.contains_key(&claim.name) {
            return Err(StoreError::AlreadyExists(claim.name.to_string()));
        }
        claim.resource_version = version;
        claims.insert(claim.name.clone(), claim);
        Ok(())
    }

    async fn delete_claim(&self, set: &SetRef, name: &ClaimName) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.check_available()?;
        if let Some(claims) = inner.claims.get_mut(&key(set)) {
            claims.remove(name);
        }
        Ok(())
    }
}

/// One recorded switchover invocation.
#[derive(Debug, Clone)]
pub struct SwitchoverCall {
    pub set: SetRef,
    pub from: InstanceName,
    pub to: Option<InstanceName>,
}

/// Actuator that records invocations; tests complete the move by
/// injecting new role reports into the store.
#[derive(Default)]
pub struct RecordingSwitchover {
    calls: Mutex<Vec<SwitchoverCall>>,
}

impl RecordingSwitchover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SwitchoverCall> {
        self.calls.lock().expect("actuator poisoned").clone()
    }
}

#[async_trait]
impl SwitchoverActuator for RecordingSwitchover {
    async fn begin_switchover(
        &self,
        set: &SetRef,
        from: &InstanceName,
        to: Option<&InstanceName>,
        _spec: &SwitchoverSpec,
    ) -> Result<(), StoreError> {
        self.calls.lock().expect("actuator poisoned").push(SwitchoverCall {
            set: set.clone(),
            from: from.clone(),
            to: to.cloned(),
        });
        Ok(())
    }
}

/// A recorded operational notice.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

/// Event sink that keeps everything for assertions.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("sink poisoned").clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|e| e.reason)
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, _set: &SetRef, kind: EventKind, reason: &str, message: &str) {
        self.events.lock().expect("sink poisoned").push(RecordedEvent {
            kind,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}
