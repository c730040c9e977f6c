//! Per-connection state (component C4). Ground: teacher
//! `network/connection.rs`'s `Connection` wrapper around a raw socket,
//! rewritten over `tokio::net::tcp::OwnedWriteHalf` and a `BytesMut` read
//! scratch buffer (the teacher depends on `bytes` but never uses it).

use bytes::BytesMut;
use thiserror::Error;
use tokio::net::tcp::OwnedWriteHalf;

use crate::protocol::command::RequestError;
use crate::protocol::resp::ParseError;
use crate::replication::state::{HandshakeViolation, ReplicationState};

/// Read buffers grow up to this cap before a connection is closed with
/// `MessageTooLarge` (SPEC_FULL.md §4.4).
pub const MAX_READ_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnRole {
    Client,
    ReplicaBeingSynced,
    ConnectedReplica,
    UpstreamMaster,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("io error on connection: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("request validation error: {0}")]
    Request(#[from] RequestError),
    #[error("replication handshake violation: {0}")]
    Handshake(#[from] HandshakeViolation),
    #[error("read buffer exceeded {MAX_READ_BUFFER_BYTES} bytes without a complete message")]
    MessageTooLarge,
}

/// One live TCP session and everything the event loop needs to drive it.
/// Connections never touch another connection's buffers; the registry that
/// owns them lives exclusively on the actor task.
pub struct Connection {
    pub id: u64,
    pub write_half: OwnedWriteHalf,
    pub read_buffer: BytesMut,
    pub replication_state: ReplicationState,
    pub is_upstream_master: bool,
}

impl Connection {
    pub fn new(id: u64, write_half: OwnedWriteHalf, is_upstream_master: bool) -> Self {
        Connection {
            id,
            write_half,
            read_buffer: BytesMut::with_capacity(512),
            replication_state: ReplicationState::default(),
            is_upstream_master,
        }
    }

    /// True only for connections the master has fully synced via PSYNC;
    /// these are the sole targets of write-command propagation.
    pub fn is_connected_replica(&self) -> bool {
        !self.is_upstream_master && self.replication_state.is_connected_replica()
    }

    pub fn role(&self) -> ConnRole {
        if self.is_upstream_master {
            ConnRole::UpstreamMaster
        } else if self.replication_state.is_connected_replica() {
            ConnRole::ConnectedReplica
        } else if self.replication_state == ReplicationState::None {
            ConnRole::Client
        } else {
            ConnRole::ReplicaBeingSynced
        }
    }
}
