//! # Engine Primitives
//!
//! Fixed constants for the kgraph engine: property keys, schema version,
//! input limits and bootstrap defaults. These are compiled in and never
//! change at runtime.

/// Property key holding an entity or topic name.
pub const NAME_PROPERTY: &str = "name";

/// Property key holding a statement's text.
pub const TEXT_PROPERTY: &str = "text";

/// Current on-disk schema version.
///
/// Increment this when making breaking changes to stored record layouts.
pub const SCHEMA_VERSION: u64 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a statement's text (64KB).
pub const MAX_TEXT_LENGTH: usize = 65536;

/// Maximum length of an entity or topic name.
pub const MAX_NAME_LENGTH: usize = 1024;

/// Maximum length of a single label.
pub const MAX_LABEL_LENGTH: usize = 64;

/// Maximum number of labels an entity can carry, base tag included.
pub const MAX_LABELS: usize = 32;

/// Maximum number of ids in a single mention replacement.
///
/// Derivation is quadratic in the participant count, so this bounds the
/// number of derived edges one call can create.
pub const MAX_MENTIONS: usize = 1024;

// =============================================================================
// BOOTSTRAP DEFAULTS
// =============================================================================

/// Default number of attempts to reach the store during schema setup.
pub const DEFAULT_BOOTSTRAP_ATTEMPTS: u32 = 5;

/// Default fixed wait between schema setup attempts, in milliseconds.
pub const DEFAULT_BOOTSTRAP_BACKOFF_MS: u64 = 2000;
