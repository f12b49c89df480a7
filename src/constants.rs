//! Global constants used throughout the hbscope codebase.
//!
//! This module contains reserved helper names, recursion limits, and other
//! values that are used across multiple modules. Defining them centrally
//! makes the reserved parts of the template language discoverable.

/// Reserved partial name that renders the body of the enclosing partial block.
pub const PARTIAL_BLOCK_NAME: &str = "@partial-block";

/// Raw block helper that records bindings into a `ContextCapturer`.
pub const CAPTURE_HELPER: &str = "capture";

/// Block helper emitted by `capture` that restores recorded bindings in a later pass.
pub const CAPTURED_HELPER: &str = "captured";

/// Raw block helper that outputs its body verbatim.
pub const RAW_HELPER: &str = "raw";

/// Name used for the template passed directly to `compile()` in error chains.
pub const ROOT_TEMPLATE_NAME: &str = "<root>";

/// Maximum nesting of partial invocations during a single render.
///
/// Partials may recurse through data (a tree template invoking itself per child).
/// The limit turns runaway recursion into a `RenderError::RecursionLimit` instead
/// of a stack overflow.
pub const MAX_PARTIAL_DEPTH: usize = 128;

/// Maximum allowed Levenshtein distance as a percentage of target length for suggestions.
pub const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Maximum number of "did you mean" suggestions attached to an error.
pub const MAX_SUGGESTIONS: usize = 3;

/// File extension appended to remote identifiers by `DirectoryFetcher`.
pub const DEFAULT_TEMPLATE_EXTENSION: &str = "hbs";

/// Configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "hbscope.toml";

/// Environment variable overriding the configuration file path.
pub const ENV_CONFIG_PATH: &str = "HBSCOPE_CONFIG";

/// Environment variable overriding `remote.template_dir`.
pub const ENV_TEMPLATE_DIR: &str = "HBSCOPE_TEMPLATE_DIR";
