//! Rewrite stage: ordered search and replace over the working identity.

use crate::config::{EmptyPatternPolicy, IdentityConfig};
use crate::error::Result;
use crate::pattern::{CompiledPattern, Pattern};

/// One search pattern and its replacement.
///
/// Replacements reference capture groups as `$N`, `${N}` or `\N`, where `N`
/// is one or two digits (`$1x` is group 1 followed by `x`, `$123` is group 12
/// followed by `3`). Everything else, `$` and `\` included, is literal text.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    search: CompiledPattern,
    replacement: String,
    template: String,
}

impl RewriteRule {
    pub fn search(&self) -> &Pattern {
        self.search.pattern()
    }

    /// The replacement as the operator wrote it.
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// The replacement in the regex engine's expansion syntax.
    pub fn template(&self) -> &str {
        &self.template
    }
}

/// Rewrite group references into `${N}` and escape every other `$`.
fn expansion_template(replacement: &str) -> String {
    let chars: Vec<char> = replacement.chars().collect();
    let mut template = String::with_capacity(replacement.len() + 4);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '$' || c == '\\' {
            let braced = c == '$' && chars.get(i + 1) == Some(&'{');
            let start = if braced { i + 2 } else { i + 1 };
            let digits = chars
                .get(start..)
                .unwrap_or_default()
                .iter()
                .take_while(|d| d.is_ascii_digit())
                .take(2)
                .count();
            let closed = !braced || chars.get(start + digits) == Some(&'}');
            if digits > 0 && closed {
                let group: String = chars[start..start + digits].iter().collect();
                template.push_str(&format!("${{{group}}}"));
                i = start + digits + usize::from(braced);
                continue;
            }
        }
        if c == '$' {
            template.push_str("$$");
        } else {
            template.push(c);
        }
        i += 1;
    }

    template
}

/// Rules applied in order, each one to the output of the previous one.
#[derive(Debug, Clone, Default)]
pub struct RewriteStage {
    rules: Vec<RewriteRule>,
}

impl RewriteStage {
    /// Normalize and compile `(search, replacement)` pairs.
    ///
    /// # Example
    /// ```rust
    /// use remoteuser_identity::{IdentityConfig, RewriteStage};
    ///
    /// let rules = [("@example.org$", ""), ("/^(\\w+)\\.(\\w+)$/", "$2")];
    /// let stage = RewriteStage::new(rules, &IdentityConfig::default());
    /// assert_eq!(stage.apply("john.doe@example.org").unwrap(), "doe");
    /// ```
    pub fn new<I, S, R>(rules: I, config: &IdentityConfig) -> Self
    where
        I: IntoIterator<Item = (S, R)>,
        S: AsRef<str>,
        R: Into<String>,
    {
        let mut compiled = Vec::new();
        for (search, replacement) in rules {
            let pattern = Pattern::normalize(search.as_ref());
            if pattern.is_empty() && config.empty_patterns == EmptyPatternPolicy::Ignore {
                tracing::warn!(
                    "Ignoring rewrite rule with empty search pattern {:?}",
                    search.as_ref()
                );
                continue;
            }
            let replacement = replacement.into();
            compiled.push(RewriteRule {
                search: CompiledPattern::new(pattern, &config.limits),
                template: expansion_template(&replacement),
                replacement,
            });
        }
        Self { rules: compiled }
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order.
    ///
    /// Fails on the first rule whose pattern is unusable; that rule leaves the
    /// identity untouched and the caller discards the partial result.
    pub fn apply(&self, identity: &str) -> Result<String> {
        let mut current = identity.to_string();
        for rule in &self.rules {
            let regex = rule.search.regex()?;
            let replaced = regex
                .replace_all(&current, rule.template.as_str())
                .into_owned();
            if replaced != current {
                tracing::trace!("{} rewrote {:?} to {:?}", rule.search(), current, replaced);
                current = replaced;
            }
        }
        Ok(current)
    }
}
