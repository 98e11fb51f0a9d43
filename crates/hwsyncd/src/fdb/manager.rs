//! FDB manager.
//!
//! Entries point at bridge ports, which are shared per front-panel port and
//! live as long as some entry uses them.

use super::types::{FdbKey, MacEntry};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::ports::PortTable;
use crate::{audit_log, debug_log, warn_log};
use serde::Serialize;
use sonic_orch_common::{classify_remove, ObjectRegistry, OrchError, WarmBootCache};
use sonic_sai::types::{BridgePortKind, FdbEntryKind};
use sonic_sai::{
    BridgePortOid, FdbEntryOid, SaiAttribute, SaiDriver, SaiDriverExt, SaiObjectId,
    SaiObjectType,
};
use sonic_types::PortId;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FdbError {
    #[error("FDB entry {0} already exists")]
    EntryExists(FdbKey),

    #[error("FDB entry {0} not found")]
    EntryNotFound(FdbKey),

    #[error(transparent)]
    Orch(#[from] OrchError),
}

impl From<FdbError> for OrchError {
    fn from(e: FdbError) -> Self {
        match e {
            FdbError::Orch(inner) => inner,
            FdbError::EntryExists(key) => OrchError::InvalidConfig(format!("FDB entry {key} already exists")),
            FdbError::EntryNotFound(key) => OrchError::unknown(format!("FDB entry {key}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FdbStats {
    pub entries_added: u64,
    pub entries_adopted: u64,
    pub entries_updated: u64,
    pub entries_removed: u64,
}

#[derive(Debug, Clone, Copy)]
struct FdbState {
    oid: FdbEntryOid,
    port: PortId,
    bridge_port: BridgePortOid,
    metadata: u32,
}

pub struct FdbManager {
    driver: Arc<dyn SaiDriver>,
    warm_boot: Arc<WarmBootCache>,
    bridge_ports: ObjectRegistry<PortId, BridgePortKind>,
    entries: BTreeMap<FdbKey, FdbState>,
    stats: FdbStats,
}

impl FdbManager {
    pub fn new(driver: Arc<dyn SaiDriver>, warm_boot: Arc<WarmBootCache>) -> Self {
        Self {
            bridge_ports: ObjectRegistry::new("bridge_port", driver.clone())
                .with_warm_boot(warm_boot.clone()),
            driver,
            warm_boot,
            entries: BTreeMap::new(),
            stats: FdbStats::default(),
        }
    }

    fn acquire_bridge_port(&mut self, port: PortId, ports: &PortTable) -> Result<BridgePortOid, FdbError> {
        let port_oid = ports.port_oid(port)?;
        let acquired = self
            .bridge_ports
            .acquire(&port, &[SaiAttribute::PortId(port_oid.as_raw())])?;
        Ok(acquired.oid)
    }

    fn release_bridge_port(&mut self, bridge_port: BridgePortOid) {
        if let Err(e) = self.bridge_ports.release(bridge_port) {
            warn_log!("FdbManager", bridge_port = %bridge_port, error = %e, "failed to release bridge port");
        }
    }

    fn set(&self, oid: FdbEntryOid, attr: SaiAttribute, key: &FdbKey) -> Result<(), FdbError> {
        self.driver
            .set_attribute(oid.as_raw(), attr)
            .map_err(|e| FdbError::from(OrchError::resource(format!("update FDB entry {key}"), e)))
    }

    pub fn add(&mut self, entry: MacEntry, ports: &PortTable) -> Result<FdbEntryOid, FdbError> {
        let key = entry.key;
        if self.entries.contains_key(&key) {
            return Err(FdbError::EntryExists(key));
        }
        let bridge_port = self.acquire_bridge_port(entry.port, ports)?;

        let claimed = self
            .warm_boot
            .claim(SaiObjectType::FdbEntry, &key.match_key())
            .and_then(SaiObjectId::from_raw);
        let result = match claimed {
            Some(oid) => self
                .set(oid, SaiAttribute::BridgePortId(bridge_port.as_raw()), &key)
                .and_then(|()| self.set(oid, SaiAttribute::Metadata(entry.metadata), &key))
                .map(|()| (oid, true)),
            None => self
                .driver
                .create_object::<FdbEntryKind>(&[
                    SaiAttribute::Vlan(key.vlan),
                    SaiAttribute::MacAddress(key.mac),
                    SaiAttribute::BridgePortId(bridge_port.as_raw()),
                    SaiAttribute::Metadata(entry.metadata),
                    SaiAttribute::Label(key.match_key().as_str().to_string()),
                ])
                .map(|oid| (oid, false))
                .map_err(|e| FdbError::from(OrchError::resource(format!("create FDB entry {key}"), e))),
        };
        let (oid, adopted) = match result {
            Ok(done) => done,
            Err(e) => {
                self.release_bridge_port(bridge_port);
                return Err(e);
            }
        };

        if adopted {
            self.stats.entries_adopted += 1;
        } else {
            self.stats.entries_added += 1;
        }
        self.entries.insert(
            key,
            FdbState {
                oid,
                port: entry.port,
                bridge_port,
                metadata: entry.metadata,
            },
        );
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "FdbManager",
            if adopted { "adopt_fdb_entry" } else { "create_fdb_entry" }
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(key.to_string())
        .with_object_type("fdb_entry")
        .with_details(serde_json::json!({ "port": entry.port.to_string() })));
        Ok(oid)
    }

    /// Moves an entry to another port and/or changes its metadata in place.
    pub fn update(
        &mut self,
        key: FdbKey,
        port: Option<PortId>,
        metadata: Option<u32>,
        ports: &PortTable,
    ) -> Result<(), FdbError> {
        let Some(state) = self.entries.get(&key).copied() else {
            return Err(FdbError::EntryNotFound(key));
        };
        let mut next = state;

        if let Some(port) = port.filter(|p| *p != state.port) {
            let bridge_port = self.acquire_bridge_port(port, ports)?;
            if let Err(e) = self.set(state.oid, SaiAttribute::BridgePortId(bridge_port.as_raw()), &key) {
                self.release_bridge_port(bridge_port);
                return Err(e);
            }
            self.release_bridge_port(state.bridge_port);
            next.port = port;
            next.bridge_port = bridge_port;
        }

        if let Some(metadata) = metadata.filter(|m| *m != state.metadata) {
            self.entries.insert(key, next);
            self.set(state.oid, SaiAttribute::Metadata(metadata), &key)?;
            next.metadata = metadata;
        }

        if next.port != state.port || next.metadata != state.metadata {
            self.stats.entries_updated += 1;
            debug_log!("FdbManager", entry = %key, port = %next.port, metadata = next.metadata, "entry updated");
            audit_log!(update_record(
                MacEntry::new(key, state.port).with_metadata(state.metadata),
                MacEntry::new(key, next.port).with_metadata(next.metadata),
            ));
        }
        self.entries.insert(key, next);
        Ok(())
    }

    pub fn remove(&mut self, key: FdbKey) -> Result<(), FdbError> {
        let Some(state) = self.entries.get(&key).copied() else {
            return Err(FdbError::EntryNotFound(key));
        };
        classify_remove(self.driver.remove_object(state.oid), || {
            format!("remove FDB entry {key}")
        })?;
        self.entries.remove(&key);
        self.bridge_ports.release(state.bridge_port)?;
        self.stats.entries_removed += 1;
        audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, "FdbManager", "remove_fdb_entry")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(key.to_string())
            .with_object_type("fdb_entry"));
        Ok(())
    }

    pub fn entry(&self, key: &FdbKey) -> Option<MacEntry> {
        self.entries.get(key).map(|state| MacEntry {
            key: *key,
            port: state.port,
            metadata: state.metadata,
        })
    }

    pub fn entry_oid(&self, key: &FdbKey) -> Option<FdbEntryOid> {
        self.entries.get(key).map(|state| state.oid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bridge_port_count(&self) -> usize {
        self.bridge_ports.len()
    }

    pub fn stats(&self) -> &FdbStats {
        &self.stats
    }
}

fn update_record(before: MacEntry, after: MacEntry) -> AuditRecord {
    AuditRecord::new(AuditCategory::ResourceModify, "FdbManager", "update_fdb_entry")
        .with_outcome(AuditOutcome::Success)
        .with_object_id(after.key.to_string())
        .with_object_type("fdb_entry")
        .with_details(serde_json::json!({
            "port": { "from": before.port.to_string(), "to": after.port.to_string() },
            "metadata": { "from": before.metadata, "to": after.metadata },
        }))
}
