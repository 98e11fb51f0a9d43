//! Route types.

use crate::nhg::NextHopSet;
use serde::{Deserialize, Serialize};
use sonic_sai::{PacketAction, RawSaiObjectId, SaiAttribute};
use sonic_types::{ClientId, IpPrefix, RouterId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Where a route sends matching packets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteNextHopEntry {
    Drop,
    ToCpu,
    NextHops(NextHopSet),
}

impl RouteNextHopEntry {
    pub fn next_hops(&self) -> Option<&NextHopSet> {
        match self {
            RouteNextHopEntry::NextHops(set) => Some(set),
            _ => None,
        }
    }

    pub(crate) fn attributes(&self, group: Option<RawSaiObjectId>) -> Vec<SaiAttribute> {
        let action = match self {
            RouteNextHopEntry::Drop => PacketAction::Drop,
            RouteNextHopEntry::ToCpu => PacketAction::Trap,
            RouteNextHopEntry::NextHops(_) => PacketAction::Forward,
        };
        vec![
            SaiAttribute::PacketAction(action),
            SaiAttribute::NextHopId(group.unwrap_or(0)),
        ]
    }
}

impl fmt::Display for RouteNextHopEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteNextHopEntry::Drop => f.write_str("drop"),
            RouteNextHopEntry::ToCpu => f.write_str("to-cpu"),
            RouteNextHopEntry::NextHops(set) => write!(f, "{set}"),
        }
    }
}

/// Queued changes of one `(router, client)`.
///
/// A prefix is in at most one of the two sets; the latest call wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddDelRoutes {
    pub to_add: BTreeMap<IpPrefix, RouteNextHopEntry>,
    pub to_del: BTreeSet<IpPrefix>,
}

impl AddDelRoutes {
    pub fn add(&mut self, prefix: IpPrefix, entry: RouteNextHopEntry) {
        self.to_del.remove(&prefix);
        self.to_add.insert(prefix, entry);
    }

    pub fn delete(&mut self, prefix: IpPrefix) {
        self.to_add.remove(&prefix);
        self.to_del.insert(prefix);
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_del.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_del.is_empty()
    }
}

/// A prefix the standalone backend could not program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteFailure {
    pub router: RouterId,
    pub client: ClientId,
    pub prefix: IpPrefix,
    pub error: String,
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgramReport {
    pub applied: usize,
    pub failed: Vec<RouteFailure>,
}

impl ProgramReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
