//! Match gate: accept or reject the working identity by name or pattern.

use crate::config::{EmptyPatternPolicy, IdentityConfig};
use crate::error::Result;
use crate::pattern::{CompiledPattern, Pattern};
use std::collections::HashSet;

/// Whether listed names are allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Listed names pass, everything else is rejected.
    Allow,
    /// Listed names are rejected, everything else passes.
    Deny,
}

impl Polarity {
    pub fn from_allow(allow: bool) -> Self {
        if allow {
            Self::Allow
        } else {
            Self::Deny
        }
    }

    pub fn allows(self) -> bool {
        self == Self::Allow
    }
}

/// A list of names, each usable both as an exact name and as a pattern.
///
/// Exact, case-sensitive membership is checked first; the normalized patterns
/// are then scanned in order. A hit yields the gate's polarity, a miss the
/// opposite.
///
/// # Example
/// ```rust
/// use remoteuser_identity::{IdentityConfig, MatchGate};
///
/// let gate = MatchGate::new(["bob", "/^admin/"], false, &IdentityConfig::default());
/// assert!(!gate.decide("bob").unwrap());
/// assert!(!gate.decide("administrator").unwrap());
/// assert!(gate.decide("alice").unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct MatchGate {
    names: HashSet<String>,
    patterns: Vec<CompiledPattern>,
    polarity: Polarity,
}

impl MatchGate {
    pub fn new<I, S>(names: I, allow: bool, config: &IdentityConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut exact = HashSet::new();
        let mut patterns = Vec::new();

        for name in names {
            let name = name.into();
            let pattern = Pattern::normalize(&name);
            if pattern.is_empty() && config.empty_patterns == EmptyPatternPolicy::Ignore {
                tracing::warn!("Ignoring empty name {:?} in match filter", name);
                continue;
            }
            patterns.push(CompiledPattern::new(pattern, &config.limits));
            exact.insert(name);
        }

        Self {
            names: exact,
            patterns,
            polarity: Polarity::from_allow(allow),
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter().map(CompiledPattern::pattern)
    }

    /// Number of registered entries, one per name kept at construction.
    ///
    /// Every name is also compiled as a pattern, so a name listed twice counts
    /// twice here even though exact membership holds it once.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when no entry survived construction; such a gate never matches.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// `Ok(true)` accepts, `Ok(false)` rejects.
    ///
    /// Errors when the scan reaches a pattern that failed to compile.
    pub fn decide(&self, identity: &str) -> Result<bool> {
        let allow = self.polarity.allows();

        if self.names.contains(identity) {
            return Ok(allow);
        }

        for pattern in &self.patterns {
            if pattern.regex()?.is_match(identity) {
                tracing::trace!("{:?} matched {}", identity, pattern.pattern());
                return Ok(allow);
            }
        }

        Ok(!allow)
    }
}
