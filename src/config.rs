//! Engine configuration for pattern compilation and pipeline evaluation.
//!
//! These knobs are owned by the embedding application, not by the operator
//! settings file: they bound how much work a single operator pattern may cost
//! and decide a couple of policy questions the settings cannot express.
//!
//! Every type deserializes with defaults for missing fields, so an embedding
//! application can keep the configuration next to its own:
//!
//! ```rust
//! use remoteuser_identity::{EmptyPatternPolicy, IdentityConfig};
//!
//! let config: IdentityConfig = serde_yaml::from_str(
//!     "limits: {size_limit: 65536}\nempty_patterns: match_everything\n",
//! )
//! .unwrap();
//! assert_eq!(config.limits.size_limit, 65536);
//! assert_eq!(config.limits.nest_limit, 64);
//! assert_eq!(config.empty_patterns, EmptyPatternPolicy::MatchEverything);
//! ```

use serde::{Deserialize, Serialize};

/// What to do with an empty search pattern or name at registration time.
///
/// An empty pattern normalizes to `//`, which matches at every position of
/// every identity. In a rewrite rule that inserts the replacement between every
/// character; in a match gate it matches every identity.
///
/// # Examples
///
/// ```rust
/// use remoteuser_identity::EmptyPatternPolicy;
///
/// // Drop empty entries with a warning (default)
/// let policy = EmptyPatternPolicy::Ignore;
///
/// // Keep the historical behaviour
/// let historical = EmptyPatternPolicy::MatchEverything;
/// assert_ne!(policy, historical);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPatternPolicy {
    /// Skip empty entries and log a warning.
    #[default]
    Ignore,
    /// Register `//` like any other pattern.
    MatchEverything,
}

/// Limits applied when compiling operator patterns.
///
/// The regex engine guarantees linear-time matching, so the only resource an
/// operator pattern can blow up is the size of the compiled program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternLimits {
    /// Maximum size of a compiled regex program in bytes.
    ///
    /// **Default**: 1MB
    pub size_limit: usize,

    /// Maximum size of the lazy DFA cache per regex in bytes.
    ///
    /// **Default**: 2MB
    pub dfa_size_limit: usize,

    /// Maximum nesting depth of a pattern.
    ///
    /// **Default**: 64
    pub nest_limit: u32,
}

impl Default for PatternLimits {
    fn default() -> Self {
        Self {
            size_limit: 1024 * 1024,
            dfa_size_limit: 2 * 1024 * 1024,
            nest_limit: 64,
        }
    }
}

/// Batch evaluation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Evaluate batches in parallel at all.
    pub enable_parallelism: bool,
    /// Minimum batch size before work is spread across the rayon pool.
    pub min_batch_size_for_parallelism: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enable_parallelism: true,
            min_batch_size_for_parallelism: 64,
        }
    }
}

/// Complete configuration for building and evaluating identity pipelines.
///
/// # Example
/// ```rust
/// use remoteuser_identity::{EmptyPatternPolicy, IdentityConfig};
///
/// let config = IdentityConfig::new()
///     .with_size_limit(256 * 1024)
///     .with_empty_pattern_policy(EmptyPatternPolicy::MatchEverything)
///     .with_parallelism(false);
///
/// assert_eq!(config.limits.size_limit, 256 * 1024);
/// assert!(!config.batch.enable_parallelism);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Compile limits for operator patterns
    pub limits: PatternLimits,
    /// Policy for empty search patterns and names
    pub empty_patterns: EmptyPatternPolicy,
    /// Batch evaluation configuration
    pub batch: BatchConfig,
}

impl IdentityConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight limits for deployments that load settings from less trusted places.
    pub fn strict() -> Self {
        Self {
            limits: PatternLimits {
                size_limit: 64 * 1024,
                dfa_size_limit: 256 * 1024,
                nest_limit: 16,
            },
            empty_patterns: EmptyPatternPolicy::Ignore,
            batch: BatchConfig::default(),
        }
    }

    /// Reproduce the historical behaviour as closely as possible.
    pub fn compatible() -> Self {
        Self {
            empty_patterns: EmptyPatternPolicy::MatchEverything,
            ..Default::default()
        }
    }

    pub fn with_size_limit(mut self, bytes: usize) -> Self {
        self.limits.size_limit = bytes;
        self
    }

    pub fn with_dfa_size_limit(mut self, bytes: usize) -> Self {
        self.limits.dfa_size_limit = bytes;
        self
    }

    pub fn with_nest_limit(mut self, limit: u32) -> Self {
        self.limits.nest_limit = limit;
        self
    }

    pub fn with_empty_pattern_policy(mut self, policy: EmptyPatternPolicy) -> Self {
        self.empty_patterns = policy;
        self
    }

    pub fn with_parallelism(mut self, enable: bool) -> Self {
        self.batch.enable_parallelism = enable;
        self
    }

    pub fn with_min_batch_size_for_parallelism(mut self, min_size: usize) -> Self {
        self.batch.min_batch_size_for_parallelism = min_size;
        self
    }
}
