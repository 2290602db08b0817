//! Pointer derivation and storage-key composition.
//!
//! The content-address store is a flat hash→bytes map, so every record
//! family the engine persists gets its own domain prefix folded into the
//! key hash. Distinct prefixes keep a chain record from ever colliding
//! with, say, a pointer row for a path that happens to share bytes.

use crate::types::Hash256;

// --- Key domain prefixes ---

const DOMAIN_POINTER: &[u8] = b"terrace/pointer";
const DOMAIN_CHANGE: &[u8] = b"terrace/change";
const DOMAIN_CHANGED_PATH: &[u8] = b"terrace/changed-path";
const DOMAIN_CHANGED_COUNT: &[u8] = b"terrace/changed-count";
const DOMAIN_STATE_SET: &[u8] = b"terrace/state-set";
const DOMAIN_VERSIONED: &[u8] = b"terrace/versioned";
const DOMAIN_CHAIN: &[u8] = b"terrace/chain";
const DOMAIN_HEIGHT_INDEX: &[u8] = b"terrace/height-index";

/// BLAKE3 over a domain prefix and a list of byte slices.
fn compose(domain: &[u8], parts: &[&[u8]]) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    Hash256(hasher.finalize().into())
}

/// Derive the pointer under which a path's value bytes are stored.
///
/// Deterministic hash-combine of the path hash and the previous block
/// hash known to the writer. The same logical write in two competing
/// blocks at the same height produces two different pointers, so forks
/// never clobber each other's data.
pub fn derive_pointer(path_hash: &Hash256, previous_block_hash: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path_hash.as_bytes());
    hasher.update(previous_block_hash.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Key of the current-pointer row for a path.
pub fn pointer_key(chain_id: &Hash256, path_hash: &Hash256) -> Hash256 {
    compose(DOMAIN_POINTER, &[chain_id.as_ref(), path_hash.as_ref()])
}

/// Key of the change record for a path.
pub fn change_key(chain_id: &Hash256, path_hash: &Hash256) -> Hash256 {
    compose(DOMAIN_CHANGE, &[chain_id.as_ref(), path_hash.as_ref()])
}

/// Key of the `index`-th entry in a window's ordered changed-path list.
pub fn changed_path_key(chain_id: &Hash256, window: &Hash256, index: u64) -> Hash256 {
    compose(
        DOMAIN_CHANGED_PATH,
        &[chain_id.as_ref(), window.as_ref(), &index.to_le_bytes()],
    )
}

/// Key of a window's changed-path count row.
pub fn changed_count_key(chain_id: &Hash256, window: &Hash256) -> Hash256 {
    compose(DOMAIN_CHANGED_COUNT, &[chain_id.as_ref(), window.as_ref()])
}

/// Key of a sealed block state set.
pub fn state_set_key(chain_id: &Hash256, block_hash: &Hash256) -> Hash256 {
    compose(DOMAIN_STATE_SET, &[chain_id.as_ref(), block_hash.as_ref()])
}

/// Key of the committed versioned-state row for a path.
pub fn versioned_key(chain_id: &Hash256, path_hash: &Hash256) -> Hash256 {
    compose(DOMAIN_VERSIONED, &[chain_id.as_ref(), path_hash.as_ref()])
}

/// Key of a chain's bookkeeping record.
pub fn chain_key(chain_id: &Hash256) -> Hash256 {
    compose(DOMAIN_CHAIN, &[chain_id.as_ref()])
}

/// Key of the height→block-hash index row.
pub fn height_index_key(chain_id: &Hash256, height: u64) -> Hash256 {
    compose(
        DOMAIN_HEIGHT_INDEX,
        &[chain_id.as_ref(), &height.to_le_bytes()],
    )
}
