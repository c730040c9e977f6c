//! Master-side propagation fan-out (part of component C7). Ground: teacher
//! `replication/replica_manager.rs`'s `propagate_message_to_replicas`,
//! generalized to work over whatever connection registry the event loop
//! keeps rather than owning a second, parallel map of sockets.

/// Given the full connection registry as `(id, is_connected_replica)`
/// pairs, returns the ids that should receive a propagated write command.
/// Kept as a pure selection function so the event loop (which alone holds
/// the write halves) performs the actual sends; this just encodes "who".
pub fn select_propagation_targets<I>(connections: I) -> Vec<u64>
where
    I: IntoIterator<Item = (u64, bool)>,
{
    connections
        .into_iter()
        .filter_map(|(id, is_connected_replica)| is_connected_replica.then_some(id))
        .collect()
}
