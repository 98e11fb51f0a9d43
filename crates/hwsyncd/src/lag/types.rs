//! Aggregate port types.

use serde::{Deserialize, Serialize};
use sonic_types::{AggregatePortId, PortId};
use std::collections::BTreeSet;
use std::fmt;

/// Software intent for one subport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingState {
    Enabled,
    #[default]
    Disabled,
}

impl ForwardingState {
    pub fn is_enabled(self) -> bool {
        self == ForwardingState::Enabled
    }
}

impl fmt::Display for ForwardingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardingState::Enabled => f.write_str("enabled"),
            ForwardingState::Disabled => f.write_str("disabled"),
        }
    }
}

/// Whether a subport is a member of the hardware group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemberState {
    #[default]
    Absent,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subport {
    pub port: PortId,
    #[serde(default)]
    pub state: ForwardingState,
}

impl Subport {
    pub fn enabled(port: PortId) -> Self {
        Self {
            port,
            state: ForwardingState::Enabled,
        }
    }

    pub fn disabled(port: PortId) -> Self {
        Self {
            port,
            state: ForwardingState::Disabled,
        }
    }
}

/// Desired state of one aggregate port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatePort {
    pub id: AggregatePortId,
    pub name: String,
    #[serde(default)]
    pub subports: Vec<Subport>,
}

impl AggregatePort {
    pub fn new(id: AggregatePortId, name: impl Into<String>, subports: Vec<Subport>) -> Self {
        Self {
            id,
            name: name.into(),
            subports,
        }
    }

    pub fn subport(&self, port: PortId) -> Option<&Subport> {
        self.subports.iter().find(|s| s.port == port)
    }

    pub fn enabled_ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.subports
            .iter()
            .filter(|s| s.state.is_enabled())
            .map(|s| s.port)
    }

    pub fn ports(&self) -> BTreeSet<PortId> {
        self.subports.iter().map(|s| s.port).collect()
    }

    /// True when both describe the same member list, whatever the states.
    pub fn same_members(&self, other: &AggregatePort) -> bool {
        self.ports() == other.ports()
    }

    /// Copy of `self` with one subport's state replaced.
    pub fn with_state(&self, port: PortId, state: ForwardingState) -> Self {
        let mut next = self.clone();
        for subport in next.subports.iter_mut().filter(|s| s.port == port) {
            subport.state = state;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_defaults_to_disabled() {
        let json = r#"{"id": 1, "name": "PortChannel1", "subports": [{"port": 1}, {"port": 2, "state": "enabled"}]}"#;
        let agg: AggregatePort = serde_json::from_str(json).unwrap();
        assert_eq!(agg.subports[0], Subport::disabled(PortId(1)));
        assert_eq!(agg.enabled_ports().collect::<Vec<_>>(), vec![PortId(2)]);
    }

    #[test]
    fn test_same_members_ignores_state_and_order() {
        let a = AggregatePort::new(
            AggregatePortId(1),
            "PortChannel1",
            vec![Subport::enabled(PortId(1)), Subport::disabled(PortId(2))],
        );
        let b = AggregatePort::new(
            AggregatePortId(1),
            "PortChannel1",
            vec![Subport::enabled(PortId(2)), Subport::enabled(PortId(1))],
        );
        assert!(a.same_members(&b));
        assert!(!a.same_members(&AggregatePort::new(AggregatePortId(1), "x", vec![])));
    }

    #[test]
    fn test_with_state() {
        let a = AggregatePort::new(
            AggregatePortId(1),
            "PortChannel1",
            vec![Subport::enabled(PortId(1))],
        );
        let b = a.with_state(PortId(1), ForwardingState::Disabled);
        assert_eq!(b.subport(PortId(1)), Some(&Subport::disabled(PortId(1))));
        assert_eq!(a.subport(PortId(3)), None);
    }
}
