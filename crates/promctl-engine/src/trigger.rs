//! The closed set of events that start a reconciliation pass.

use serde::{Deserialize, Serialize};

use promctl_core::peer_data::PeerData;
use promctl_core::{OperatorOptions, PeerId, Relation};

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Operator options were (re)loaded.
    OperatorChanged(OperatorOptions),
    PeerJoined { relation: Relation, peer: PeerId },
    PeerDataChanged {
        relation: Relation,
        peer: PeerId,
        data: PeerData,
    },
    PeerLeft { relation: Relation, peer: PeerId },
    /// The supervisor's control channel came up.
    SupervisorReachable,
    /// The unit is shutting down. No reconciliation.
    Stop,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::OperatorChanged(_) => "operator-changed",
            Trigger::PeerJoined { .. } => "peer-joined",
            Trigger::PeerDataChanged { .. } => "peer-changed",
            Trigger::PeerLeft { .. } => "peer-left",
            Trigger::SupervisorReachable => "supervisor-reachable",
            Trigger::Stop => "stop",
        }
    }
}

/// Wire form of a peer lifecycle event, one JSON object per line:
///
/// ```json
/// {"event":"changed","relation":"monitoring","peer":"node-exporter/0","data":{"scrape_jobs":"[...]"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PeerEvent {
    Joined {
        relation: Relation,
        peer: PeerId,
    },
    Changed {
        relation: Relation,
        peer: PeerId,
        #[serde(default)]
        data: PeerData,
    },
    Left {
        relation: Relation,
        peer: PeerId,
    },
}

impl From<PeerEvent> for Trigger {
    fn from(event: PeerEvent) -> Self {
        match event {
            PeerEvent::Joined { relation, peer } => Trigger::PeerJoined { relation, peer },
            PeerEvent::Changed {
                relation,
                peer,
                data,
            } => Trigger::PeerDataChanged {
                relation,
                peer,
                data,
            },
            PeerEvent::Left { relation, peer } => Trigger::PeerLeft { relation, peer },
        }
    }
}
