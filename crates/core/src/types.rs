//! Shared identifier types.

/// Identifier for a physical node in the cluster.
///
/// Node ids are small integers assigned by the operator (1, 2, 3, ...).
/// The consistent hash ring expands each id into virtual positions, so the
/// id itself carries no placement information.
pub type NodeId = u32;
