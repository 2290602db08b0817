//! Protocol constants for state versioning and retention.

/// Number of most recent heights for which the canonical height cache
/// keeps entries. A header referencing a block more than this many
/// heights behind the tip cannot be validated against the cache.
pub const REFERENCE_BLOCK_VALID_PERIOD: u64 = 64;

/// Hard bound on how many block state sets the resolver will walk
/// backward before giving up with `HistoryUnavailable`. Keeps a query
/// against a very stale committed checkpoint from scanning the whole
/// chain.
pub const DEFAULT_MAX_HISTORY_WALK: u64 = 64;
