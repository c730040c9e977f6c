//! Process-wide server state (part of the data model in SPEC_FULL.md §3).
//! Ground: teacher `server/metadata.rs`'s `MasterInfo`/`ReplicaInfo` split,
//! generalized into one flat struct the dispatcher borrows mutably instead
//! of a `Mutex`-guarded `Server` with separate `live_data`/`store` locks.

use rand::Rng;

use crate::config::{MasterAddr, StartupConfig};
use crate::store::keyspace::Keyspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Master,
    Slave,
}

pub struct ServerState {
    pub role: ServerRole,
    pub listen_port: u16,
    pub replicaof: Option<MasterAddr>,
    pub master_replid: Option<String>,
    pub master_repl_offset: i64,
    pub keyspace: Keyspace,
    next_conn_id: u64,
}

impl ServerState {
    pub fn new(config: &StartupConfig) -> Self {
        let role = if config.is_master() {
            ServerRole::Master
        } else {
            ServerRole::Slave
        };
        let master_replid = match role {
            ServerRole::Master => Some(generate_replid()),
            ServerRole::Slave => None,
        };
        ServerState {
            role,
            listen_port: config.listen_port,
            replicaof: config.replicaof.clone(),
            master_replid,
            master_repl_offset: 0,
            keyspace: Keyspace::new(),
            next_conn_id: 0,
        }
    }

    /// Allocates the next connection id for the registry. Ids are never
    /// reused within a process lifetime.
    pub fn next_connection_id(&mut self) -> u64 {
        let id = self.next_conn_id;
        self.next_conn_id += 1;
        id
    }

    /// Body of the `replication` `INFO` section, field order as pinned by
    /// spec.md §4.6.
    pub fn replication_info(&self) -> String {
        match self.role {
            ServerRole::Master => format!(
                "role:master\nmaster_replid:{}\nmaster_repl_offset:{}\n",
                self.master_replid.as_deref().unwrap_or(""),
                self.master_repl_offset
            ),
            ServerRole::Slave => format!(
                "role:slave\nmaster_repl_offset:{}\n",
                self.master_repl_offset
            ),
        }
    }
}

fn generate_replid() -> String {
    let mut rng = rand::thread_rng();
    (0..40)
        .map(|_| {
            let nibble: u8 = rng.gen_range(0..16);
            std::char::from_digit(nibble as u32, 16).expect("nibble is always a valid hex digit")
        })
        .collect()
}
