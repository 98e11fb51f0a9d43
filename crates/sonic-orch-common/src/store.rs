//! Shared object registry.
//!
//! One `ObjectRegistry` per object type deduplicates hardware objects by
//! their logical identity. The first `acquire` of an identity creates the
//! object (or adopts a warm-boot survivor); later ones only take a
//! reference. The last `release` deletes it. The registry owns every
//! object it hands out; callers hold plain copyable ids.

use crate::error::{classify_remove, OrchError, OrchResult, RemoveOutcome};
use crate::ref_map::{RefMap, Released};
use crate::warm_boot::WarmBootCache;
use sonic_sai::{MatchKey, SaiAttribute, SaiDriver, SaiDriverExt, SaiObjectId, SaiObjectKind};
use sonic_types::{AggregatePortId, InterfaceId, PortId, RouterId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// A logical identity that determines a hardware object.
///
/// `match_key` is stored on the object as its label so the next agent
/// instance can find it again.
pub trait RegistryKey: Clone + Eq + Hash + Debug + Send {
    fn match_key(&self) -> MatchKey;
}

impl RegistryKey for AggregatePortId {
    fn match_key(&self) -> MatchKey {
        MatchKey::new(self.to_string())
    }
}

impl RegistryKey for RouterId {
    fn match_key(&self) -> MatchKey {
        MatchKey::new(self.to_string())
    }
}

impl RegistryKey for PortId {
    fn match_key(&self) -> MatchKey {
        MatchKey::new(self.to_string())
    }
}

impl RegistryKey for InterfaceId {
    fn match_key(&self) -> MatchKey {
        MatchKey::new(self.to_string())
    }
}

/// Where an acquired handle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A new hardware object was created.
    Created,
    /// A warm-boot survivor was taken over.
    Adopted,
    /// Another holder already had it.
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired<T: SaiObjectKind> {
    pub oid: SaiObjectId<T>,
    pub origin: Origin,
}

impl<T: SaiObjectKind> Acquired<T> {
    /// True when this call brought the object under management.
    pub fn is_first(&self) -> bool {
        self.origin != Origin::Shared
    }
}

/// Result of a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome<I> {
    /// Other holders remain.
    Retained(u32),
    /// The last reference went away and the object was deleted.
    Destroyed(I),
}

/// Reference-counted registry of one object type.
pub struct ObjectRegistry<I, T: SaiObjectKind> {
    name: &'static str,
    driver: Arc<dyn SaiDriver>,
    entries: RefMap<I, SaiObjectId<T>>,
    by_oid: HashMap<SaiObjectId<T>, I>,
    warm_boot: Option<Arc<WarmBootCache>>,
}

impl<I, T> ObjectRegistry<I, T>
where
    I: RegistryKey,
    T: SaiObjectKind,
{
    pub fn new(name: &'static str, driver: Arc<dyn SaiDriver>) -> Self {
        Self {
            name,
            driver,
            entries: RefMap::new(),
            by_oid: HashMap::new(),
            warm_boot: None,
        }
    }

    /// Consults `cache` for survivors before creating new objects.
    pub fn with_warm_boot(mut self, cache: Arc<WarmBootCache>) -> Self {
        self.warm_boot = Some(cache);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Takes a reference on the object for `identity`, creating it with
    /// `attrs` if nobody holds it yet.
    ///
    /// A failed create leaves the registry untouched.
    pub fn acquire(&mut self, identity: &I, attrs: &[SaiAttribute]) -> OrchResult<Acquired<T>> {
        if let Some(&oid) = self.entries.get(identity) {
            let count = self
                .entries
                .increment_ref(identity)
                .map_err(|e| OrchError::precondition(format!("{}: {e}", self.name)))?;
            tracing::debug!(registry = self.name, ?identity, %oid, count, "shared");
            return Ok(Acquired {
                oid,
                origin: Origin::Shared,
            });
        }

        let key = identity.match_key();
        let claimed = self
            .warm_boot
            .as_ref()
            .and_then(|cache| cache.claim(T::OBJECT_TYPE, &key))
            .and_then(SaiObjectId::<T>::from_raw);
        if let Some(oid) = claimed {
            self.install(identity.clone(), oid)?;
            tracing::info!(registry = self.name, ?identity, %oid, "adopted warm boot object");
            return Ok(Acquired {
                oid,
                origin: Origin::Adopted,
            });
        }

        let mut create_attrs = attrs.to_vec();
        create_attrs.push(SaiAttribute::Label(key.as_str().to_string()));
        let oid = self
            .driver
            .create_object::<T>(&create_attrs)
            .map_err(|e| OrchError::resource(format!("{}: create {identity:?}", self.name), e))?;
        self.install(identity.clone(), oid)?;
        tracing::debug!(registry = self.name, ?identity, %oid, "created");
        Ok(Acquired {
            oid,
            origin: Origin::Created,
        })
    }

    /// Installs an existing hardware object under `identity` with one
    /// reference.
    ///
    /// Returns `false` without touching anything if the same object is
    /// already installed under that identity, so adoption can be replayed.
    pub fn adopt(&mut self, identity: I, oid: SaiObjectId<T>) -> OrchResult<bool> {
        match self.entries.get(&identity) {
            Some(&existing) if existing == oid => Ok(false),
            Some(&existing) => Err(OrchError::precondition(format!(
                "{}: {identity:?} already backed by {existing}, cannot adopt {oid}",
                self.name
            ))),
            None => {
                self.install(identity, oid)?;
                Ok(true)
            }
        }
    }

    fn install(&mut self, identity: I, oid: SaiObjectId<T>) -> OrchResult<()> {
        if let Some(owner) = self.by_oid.get(&oid) {
            return Err(OrchError::precondition(format!(
                "{}: {oid} already owned by {owner:?}",
                self.name
            )));
        }
        self.entries
            .insert_new(identity.clone(), oid)
            .map_err(|e| OrchError::precondition(format!("{}: {e}", self.name)))?;
        self.by_oid.insert(oid, identity);
        Ok(())
    }

    /// Drops a reference; deletes the object when it was the last one.
    pub fn release(&mut self, oid: SaiObjectId<T>) -> OrchResult<ReleaseOutcome<I>> {
        self.release_with(oid, |_, _| Ok(()))
    }

    /// Like [`ObjectRegistry::release`], but runs `teardown` right before
    /// the object is deleted so dependents can be removed first.
    ///
    /// If `teardown` or the delete fails the entry keeps its last reference.
    pub fn release_with<F>(
        &mut self,
        oid: SaiObjectId<T>,
        teardown: F,
    ) -> OrchResult<ReleaseOutcome<I>>
    where
        F: FnOnce(&I, SaiObjectId<T>) -> OrchResult<()>,
    {
        let Some(identity) = self.by_oid.get(&oid).cloned() else {
            return Err(OrchError::precondition(format!(
                "{}: release of unknown handle {oid}",
                self.name
            )));
        };

        if self.entries.ref_count(&identity).unwrap_or(0) > 1 {
            return match self.entries.decrement_ref(&identity) {
                Ok(Released::Retained(count)) => Ok(ReleaseOutcome::Retained(count)),
                Ok(Released::Last(_)) | Err(_) => Err(OrchError::precondition(format!(
                    "{}: reference count of {identity:?} changed under release",
                    self.name
                ))),
            };
        }

        teardown(&identity, oid)?;
        let outcome = classify_remove(self.driver.remove_object(oid), || {
            format!("{}: delete {identity:?}", self.name)
        })?;
        self.entries.remove(&identity);
        self.by_oid.remove(&oid);
        match outcome {
            RemoveOutcome::Removed => {
                tracing::debug!(registry = self.name, ?identity, %oid, "destroyed")
            }
            RemoveOutcome::AlreadyGone => {
                tracing::info!(registry = self.name, ?identity, %oid, "object was already gone")
            }
        }
        Ok(ReleaseOutcome::Destroyed(identity))
    }

    /// Current reference count; zero when absent.
    pub fn ref_count(&self, identity: &I) -> u32 {
        self.entries.ref_count(identity).unwrap_or(0)
    }

    pub fn handle_of(&self, identity: &I) -> Option<SaiObjectId<T>> {
        self.entries.get(identity).copied()
    }

    pub fn identity_of(&self, oid: SaiObjectId<T>) -> Option<&I> {
        self.by_oid.get(&oid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries with their reference counts.
    pub fn entries(&self) -> impl Iterator<Item = (&I, SaiObjectId<T>, u32)> + '_ {
        self.entries
            .iter()
            .map(|(identity, oid)| (identity, *oid, self.entries.ref_count(identity).unwrap_or(0)))
    }
}

impl<I, T: SaiObjectKind> std::fmt::Debug for ObjectRegistry<I, T>
where
    I: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("name", &self.name)
            .field("entries", &self.by_oid.len())
            .finish()
    }
}
