//! Core state-engine types: hashes, headers, paths, changes, state sets.
//!
//! Every record that the engine persists in the content-address store
//! carries serde and bincode derives; bincode with the standard config is
//! the canonical on-disk encoding.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// A 32-byte hash value.
///
/// Used for chain ids, block hashes, path hashes, and pointers into the
/// content-address store.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Doubles as the genesis sentinel:
    /// an empty chain's last block hash is `ZERO`.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Block header as seen by the state engine.
///
/// Hash is computed as double SHA-256 over a fixed byte layout. The
/// `changes_root` is an opaque Merkle root supplied by the tree builder;
/// the engine never recomputes it.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u64,
    /// Chain this header belongs to.
    pub chain_id: Hash256,
    /// Height of the block. Genesis is index 0.
    pub index: u64,
    /// Hash of the previous block header. `Hash256::ZERO` for genesis.
    pub previous_hash: Hash256,
    /// Merkle root over the block's state changes (opaque to this engine).
    pub changes_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing (3 u64 fields + 3 * 32-byte hashes).
    const HASH_SIZE: usize = 3 * 8 + 3 * 32;

    /// Compute the block header hash (double SHA-256).
    ///
    /// Uses an explicit fixed byte layout: version || chain_id || index ||
    /// previous_hash || changes_root || timestamp, all little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.chain_id.as_bytes());
        data.extend_from_slice(&self.index.to_le_bytes());
        data.extend_from_slice(self.previous_hash.as_bytes());
        data.extend_from_slice(self.changes_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }
}

/// Semantic address of one piece of state: which chain, which account,
/// which variable.
///
/// The block context of a write never enters the path hash — it is
/// supplied separately as the previous block hash and folded into the
/// *pointer* (see [`derive_pointer`](crate::pointer::derive_pointer)), so
/// index lookups for a path stay stable across blocks while the stored
/// bytes for competing forks land under distinct pointers.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct Path {
    /// Chain the state belongs to.
    pub chain_id: Hash256,
    /// Account (contract) address owning the state.
    pub address: Hash256,
    /// Variable name within the account's state.
    pub variable: String,
}

impl Path {
    /// Create a path.
    pub fn new(chain_id: Hash256, address: Hash256, variable: impl Into<String>) -> Self {
        Self {
            chain_id,
            address,
            variable: variable.into(),
        }
    }

    /// Compute the path hash (BLAKE3 over a fixed layout).
    ///
    /// Layout: chain_id || address || variable bytes. The variable is
    /// length-unambiguous because it is the final field.
    pub fn path_hash(&self) -> Hash256 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.chain_id.as_bytes());
        hasher.update(self.address.as_bytes());
        hasher.update(self.variable.as_bytes());
        Hash256(hasher.finalize().into())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.chain_id, self.address, self.variable)
    }
}

/// The undo-capable record of a path's pointer history within the current
/// uncommitted block-building window.
///
/// `before` is chronologically ordered, oldest first: `before[0]` is the
/// pointer the path held before the first write of the window and is the
/// rollback target. The list is cleared whenever a write arrives from a
/// different window than the last recorded one.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Change {
    /// Pointer history within the active window, oldest first.
    pub before: Vec<Hash256>,
    /// Pointer under which the path's current value is stored.
    pub after: Hash256,
    /// Previous-block hash of the window the last write belonged to.
    pub latest_changed_block_hash: Hash256,
}

impl Change {
    /// Create a fresh change for a path's first recorded write.
    pub fn new(after: Hash256, latest_changed_block_hash: Hash256) -> Self {
        Self {
            before: Vec::new(),
            after,
            latest_changed_block_hash,
        }
    }

    /// Record a pointer transition: the current `after` joins the history
    /// and the new pointer takes its place.
    pub fn push_transition(&mut self, new_after: Hash256) {
        self.before.push(self.after);
        self.after = new_after;
    }

    /// Drop accumulated history. Called on window boundaries and under the
    /// discard-immediately retention policy.
    pub fn clear_befores(&mut self) {
        self.before.clear();
    }

    /// The rollback target: the pointer held before the first write of the
    /// window, if any history was kept.
    pub fn rollback_target(&self) -> Option<Hash256> {
        self.before.first().copied()
    }
}

/// The immutable, sealed collection of all changes produced while
/// executing one block.
///
/// Persisted keyed by `block_hash`; forms a singly linked list backward
/// through `previous_hash` to ancestor sets, terminating at genesis or at
/// a height already folded into the committed best-chain value.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockStateSet {
    /// Hash of the block whose execution produced these changes.
    pub block_hash: Hash256,
    /// Hash of the parent block.
    pub previous_hash: Hash256,
    /// Height of the block.
    pub block_height: u64,
    /// Every path touched by the block, with its change record.
    pub changes: HashMap<Hash256, Change>,
}

impl BlockStateSet {
    /// Look up the change for a path hash, if the block touched it.
    pub fn get_change(&self, path_hash: &Hash256) -> Option<&Change> {
        self.changes.get(path_hash)
    }

    /// Number of paths touched by the block.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the block touched no state at all.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// The canonical, committed value for a key once its block is part of the
/// best chain.
///
/// One row per path; overwritten as the best chain advances. Never holds
/// fork history.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct VersionedState {
    /// Raw value bytes.
    pub value: Vec<u8>,
    /// Block whose commit produced this value.
    pub block_hash: Hash256,
    /// Height of that block.
    pub block_height: u64,
}

/// Chain bookkeeping record maintained by the chain manager.
///
/// Mutated only by accepting a header whose index equals `current_height`
/// and whose previous hash matches `last_block_hash`.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Chain {
    /// Chain identity.
    pub chain_id: Hash256,
    /// Next expected block index. 0 for an empty chain.
    pub current_height: u64,
    /// Hash of the last accepted block. `Hash256::ZERO` for an empty chain.
    pub last_block_hash: Hash256,
}

impl Chain {
    /// Create an empty chain record.
    pub fn new(chain_id: Hash256) -> Self {
        Self {
            chain_id,
            current_height: 0,
            last_block_hash: Hash256::ZERO,
        }
    }

    /// Whether no block has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.last_block_hash.is_zero()
    }
}
