//! Per-connection replication handshake state machine (part of component
//! C7). Transitions only move forward through a fixed order; skipping or
//! going backward is a handshake violation that closes the connection.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationState {
    None,
    InitialPing,
    FirstReplconf { port: u16 },
    SecondReplconf { port: u16, capa: String },
    ReceivingSync { port: u16, capa: String },
    ConnectedReplica { port: u16, capa: String },
}

impl Default for ReplicationState {
    fn default() -> Self {
        ReplicationState::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeViolation {
    #[error("handshake command received out of order for the current replication state")]
    OutOfOrder,
    #[error("REPLCONF/PSYNC is not supported on a node running as a replica")]
    NotMaster,
}

impl ReplicationState {
    pub fn on_ping(&self) -> Result<Self, HandshakeViolation> {
        match self {
            ReplicationState::None => Ok(ReplicationState::InitialPing),
            _ => Err(HandshakeViolation::OutOfOrder),
        }
    }

    pub fn on_replconf_listening_port(&self, port: u16) -> Result<Self, HandshakeViolation> {
        match self {
            ReplicationState::InitialPing => Ok(ReplicationState::FirstReplconf { port }),
            _ => Err(HandshakeViolation::OutOfOrder),
        }
    }

    pub fn on_replconf_capa(&self, capa: String) -> Result<Self, HandshakeViolation> {
        match self {
            ReplicationState::FirstReplconf { port } => Ok(ReplicationState::SecondReplconf {
                port: *port,
                capa,
            }),
            _ => Err(HandshakeViolation::OutOfOrder),
        }
    }

    pub fn on_psync(&self) -> Result<Self, HandshakeViolation> {
        match self {
            ReplicationState::SecondReplconf { port, capa } => Ok(ReplicationState::ReceivingSync {
                port: *port,
                capa: capa.clone(),
            }),
            _ => Err(HandshakeViolation::OutOfOrder),
        }
    }

    pub fn on_rdb_sent(&self) -> Result<Self, HandshakeViolation> {
        match self {
            ReplicationState::ReceivingSync { port, capa } => Ok(ReplicationState::ConnectedReplica {
                port: *port,
                capa: capa.clone(),
            }),
            _ => Err(HandshakeViolation::OutOfOrder),
        }
    }

    pub fn is_connected_replica(&self) -> bool {
        matches!(self, ReplicationState::ConnectedReplica { .. })
    }
}
