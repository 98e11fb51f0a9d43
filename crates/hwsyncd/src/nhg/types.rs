//! Next-hop group types.

use crate::neigh::NeighborKey;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sonic_orch_common::RegistryKey;
use sonic_sai::{MatchKey, NextHopGroupOid};
use sonic_types::{InterfaceId, IpAddress};
use std::collections::BTreeSet;
use std::fmt;

/// A next hop as route producers describe it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolvedNextHop {
    pub ip: IpAddress,
    pub interface: InterfaceId,
    /// ECMP weight; zero means unweighted.
    #[serde(default)]
    pub weight: u32,
    /// MPLS labels to push, outermost first. Empty for plain IP.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<u32>,
}

impl ResolvedNextHop {
    pub fn new(ip: IpAddress, interface: InterfaceId) -> Self {
        Self {
            ip,
            interface,
            weight: 0,
            labels: Vec::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_labels(mut self, labels: Vec<u32>) -> Self {
        self.labels = labels;
        self
    }

    /// The neighbor this next hop depends on.
    pub fn neighbor(&self) -> NeighborKey {
        NeighborKey::new(self.ip, self.interface)
    }

    pub fn is_mpls(&self) -> bool {
        !self.labels.is_empty()
    }
}

impl fmt::Display for ResolvedNextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ip, self.interface)?;
        if self.weight > 0 {
            write!(f, "x{}", self.weight)?;
        }
        if self.is_mpls() {
            write!(f, "[{}]", self.labels.iter().join("/"))?;
        }
        Ok(())
    }
}

/// The logical identity of a next-hop group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NextHopSet(BTreeSet<ResolvedNextHop>);

impl NextHopSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, next_hop: ResolvedNextHop) -> bool {
        self.0.insert(next_hop)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedNextHop> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, next_hop: &ResolvedNextHop) -> bool {
        self.0.contains(next_hop)
    }
}

impl FromIterator<ResolvedNextHop> for NextHopSet {
    fn from_iter<I: IntoIterator<Item = ResolvedNextHop>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for NextHopSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(","))
    }
}

impl RegistryKey for NextHopSet {
    fn match_key(&self) -> MatchKey {
        MatchKey::new(format!("nhg:{self}"))
    }
}

/// MPLS next hops are shared per neighbor and label stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MplsNextHopKey {
    pub neighbor: NeighborKey,
    pub labels: Vec<u32>,
}

impl RegistryKey for MplsNextHopKey {
    fn match_key(&self) -> MatchKey {
        MatchKey::new(format!(
            "mpls:{}[{}]",
            self.neighbor,
            self.labels.iter().join("/")
        ))
    }
}

/// Memberships are deduplicated per group and next hop.
pub type MemberKey = (NextHopGroupOid, ResolvedNextHop);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nh(ip: &str) -> ResolvedNextHop {
        ResolvedNextHop::new(ip.parse().unwrap(), InterfaceId(1))
    }

    #[test]
    fn test_set_identity_ignores_order() {
        let a: NextHopSet = [nh("10.0.0.2"), nh("10.0.0.1")].into_iter().collect();
        let b: NextHopSet = [nh("10.0.0.1"), nh("10.0.0.2")].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.match_key(), b.match_key());
        assert_eq!(a.match_key().as_str(), "nhg:{10.0.0.1@intf1,10.0.0.2@intf1}");
    }

    #[test]
    fn test_weight_and_labels_change_identity() {
        let plain: NextHopSet = [nh("10.0.0.1")].into_iter().collect();
        let weighted: NextHopSet = [nh("10.0.0.1").with_weight(3)].into_iter().collect();
        let labeled: NextHopSet = [nh("10.0.0.1").with_labels(vec![100, 200])]
            .into_iter()
            .collect();

        assert_ne!(plain, weighted);
        assert_ne!(plain, labeled);
        assert_eq!(labeled.to_string(), "{10.0.0.1@intf1[100/200]}");
    }

    #[test]
    fn test_flavor_selection() {
        assert!(!nh("10.0.0.1").is_mpls());
        assert!(nh("10.0.0.1").with_labels(vec![16]).is_mpls());
        assert_eq!(
            nh("10.0.0.1").neighbor(),
            NeighborKey::new("10.0.0.1".parse().unwrap(), InterfaceId(1))
        );
    }

    #[test]
    fn test_serde_shape() {
        let json = r#"[{"ip": "10.0.0.1", "interface": 1, "weight": 2}]"#;
        let set: NextHopSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(&nh("10.0.0.1").with_weight(2)));
    }
}
