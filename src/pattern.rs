//! Operator pattern normalization.
//!
//! Operators write search patterns and names either as plain text
//! (`example.org`) or as delimited regular expressions (`/^ex.*$/i`). This
//! module turns both forms into one unambiguous delimited pattern so the filter
//! stages only ever deal with regexes.
//!
//! ## Normalization
//!
//! 1. Try the raw text as a delimited regex: optional leading whitespace, a
//!    delimiter that is neither alphanumeric, a backslash nor whitespace, the
//!    body, the closing delimiter, then modifier letters. Bracket delimiters
//!    (`()`, `[]`, `{}`, `<>`) pair up and may nest.
//! 2. If that succeeds the raw text is the pattern.
//! 3. Otherwise the text is a literal: every `\` becomes `\\`, every `/`
//!    becomes `\/`, and the result is wrapped in `/`.
//! 4. If that wrapped literal is still not a valid regex (say an unbalanced
//!    `(`), the body is fully escaped instead.
//!
//! Only `\` and `/` are escaped in step 3, so `example.org` keeps its `.`
//! wildcard. Normalization is idempotent.
//!
//! ## Modifiers
//!
//! | Modifier | Effect |
//! |----------|--------|
//! | `i` | case insensitive |
//! | `m` | `^`/`$` match at line boundaries |
//! | `s` | `.` matches `\n` |
//! | `x` | whitespace and `#` comments ignored |
//! | `U` | swap greedy and lazy quantifiers |
//! | `A` | anchored at the start of the identity |
//! | `u`, `D`, `S` | accepted, no effect |

use crate::config::PatternLimits;
use crate::error::{IdentityError, Result};
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::fmt;

/// The delimiter used when wrapping literals.
const LITERAL_DELIMITER: char = '/';

/// A normalized, delimited pattern.
///
/// The only way to obtain one is [`Pattern::normalize`], so the source is
/// always a delimited regex that the engine accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    source: String,
}

impl Pattern {
    /// Normalize operator text into a delimited pattern.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use remoteuser_identity::Pattern;
    ///
    /// assert_eq!(Pattern::normalize("/^ex.*$/i").as_str(), "/^ex.*$/i");
    /// assert_eq!(Pattern::normalize("example.org").as_str(), "/example.org/");
    /// assert_eq!(Pattern::normalize(r"DOM\user").as_str(), r"/DOM\\user/");
    /// assert_eq!(Pattern::normalize("").as_str(), "//");
    /// ```
    pub fn normalize(raw: &str) -> Self {
        match check_delimited(raw) {
            Ok(()) => {
                return Self {
                    source: raw.to_string(),
                }
            }
            Err(DelimitedError::Unsupported(reason)) => tracing::warn!(
                "Pattern {:?} uses syntax the regex engine does not support ({}); \
                 matching it as literal text",
                raw,
                reason
            ),
            Err(DelimitedError::NotDelimited) => {}
        }

        let escaped = raw.replace('\\', "\\\\").replace('/', "\\/");
        let wrapped = format!("{LITERAL_DELIMITER}{escaped}{LITERAL_DELIMITER}");
        if check_delimited(&wrapped).is_ok() {
            return Self { source: wrapped };
        }

        // Still not a regex: match the text verbatim.
        let verbatim = regex::escape(raw).replace('/', "\\/");
        Self {
            source: format!("{LITERAL_DELIMITER}{verbatim}{LITERAL_DELIMITER}"),
        }
    }

    /// Why `raw` is shaped like a delimited regex that the engine cannot
    /// compile, or `None` when it compiles or is not delimited at all.
    ///
    /// Such text is normalized into a literal, so a host may want to surface
    /// this when validating settings.
    ///
    /// ```rust
    /// use remoteuser_identity::Pattern;
    ///
    /// assert!(Pattern::unsupported_syntax("/^(?!corp_)/").is_some());
    /// assert!(Pattern::unsupported_syntax("/^corp_/").is_none());
    /// assert!(Pattern::unsupported_syntax("corp_").is_none());
    /// ```
    pub fn unsupported_syntax(raw: &str) -> Option<String> {
        match check_delimited(raw) {
            Err(DelimitedError::Unsupported(reason)) => Some(reason),
            _ => None,
        }
    }

    /// The normalized delimited source.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the pattern body is empty and therefore matches everywhere.
    pub fn is_empty(&self) -> bool {
        parse_delimited(&self.source)
            .map(|delimited| delimited.body.is_empty())
            .unwrap_or(false)
    }

    /// Compile into a regex, honouring the configured limits.
    pub fn compile(&self, limits: &PatternLimits) -> Result<Regex> {
        let delimited = parse_delimited(&self.source)
            .map_err(|reason| IdentityError::invalid_pattern(&self.source, reason))?;
        delimited
            .builder()
            .size_limit(limits.size_limit)
            .dfa_size_limit(limits.dfa_size_limit)
            .nest_limit(limits.nest_limit)
            .build()
            .map_err(|e| IdentityError::invalid_pattern(&self.source, e))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A pattern together with its compilation outcome.
///
/// Compilation failures are kept rather than returned so a stage built from a
/// broken pattern still exists in the pipeline and can fail closed when it
/// runs.
#[derive(Clone)]
pub struct CompiledPattern {
    pattern: Pattern,
    regex: std::result::Result<Regex, IdentityError>,
}

impl CompiledPattern {
    pub fn new(pattern: Pattern, limits: &PatternLimits) -> Self {
        let regex = pattern.compile(limits);
        if let Err(e) = &regex {
            tracing::warn!("Pattern {} will reject every identity: {}", pattern, e);
        }
        Self { pattern, regex }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn regex(&self) -> Result<&Regex> {
        self.regex.as_ref().map_err(Clone::clone)
    }

    pub fn is_valid(&self) -> bool {
        self.regex.is_ok()
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("pattern", &self.pattern.source)
            .field("valid", &self.regex.is_ok())
            .finish()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Modifiers {
    case_insensitive: bool,
    multi_line: bool,
    dot_matches_new_line: bool,
    ignore_whitespace: bool,
    swap_greed: bool,
    anchored: bool,
}

impl Modifiers {
    fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut modifiers = Self::default();
        for c in text.chars() {
            match c {
                'i' => modifiers.case_insensitive = true,
                'm' => modifiers.multi_line = true,
                's' => modifiers.dot_matches_new_line = true,
                'x' => modifiers.ignore_whitespace = true,
                'U' => modifiers.swap_greed = true,
                'A' => modifiers.anchored = true,
                'u' | 'D' | 'S' => {}
                ' ' | '\n' | '\r' => {}
                other => return Err(format!("unknown modifier '{other}'")),
            }
        }
        Ok(modifiers)
    }
}

#[derive(Debug)]
struct Delimited<'a> {
    body: Cow<'a, str>,
    modifiers: Modifiers,
}

impl Delimited<'_> {
    fn builder(&self) -> RegexBuilder {
        let body = if self.modifiers.anchored {
            if self.modifiers.ignore_whitespace {
                // A trailing `#` comment would otherwise swallow the `)`.
                Cow::Owned(format!("\\A(?:{}\n)", self.body))
            } else {
                Cow::Owned(format!("\\A(?:{})", self.body))
            }
        } else {
            Cow::Borrowed(self.body.as_ref())
        };

        let mut builder = RegexBuilder::new(&body);
        builder
            .case_insensitive(self.modifiers.case_insensitive)
            .multi_line(self.modifiers.multi_line)
            .dot_matches_new_line(self.modifiers.dot_matches_new_line)
            .ignore_whitespace(self.modifiers.ignore_whitespace)
            .swap_greed(self.modifiers.swap_greed);
        builder
    }
}

enum DelimitedError {
    /// Not shaped like a delimited regex.
    NotDelimited,
    /// Delimited, but the engine rejects the body.
    Unsupported(String),
}

/// Check whether `raw` is already a delimited regex the engine accepts.
fn check_delimited(raw: &str) -> std::result::Result<(), DelimitedError> {
    let delimited = parse_delimited(raw).map_err(|_| DelimitedError::NotDelimited)?;
    delimited
        .builder()
        .build()
        .map(|_| ())
        .map_err(|e| DelimitedError::Unsupported(e.to_string()))
}

fn closing_delimiter(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        '<' => '>',
        other => other,
    }
}

/// True when the character has no special meaning inside a regex body.
fn is_plain(c: char) -> bool {
    let mut buf = [0u8; 4];
    regex::escape(c.encode_utf8(&mut buf)).len() == c.len_utf8()
}

/// Split a delimited pattern into body and modifiers.
fn parse_delimited(raw: &str) -> std::result::Result<Delimited<'_>, String> {
    let trimmed = raw.trim_start();
    let mut chars = trimmed.char_indices();

    let (_, open) = chars
        .next()
        .ok_or_else(|| "empty regular expression".to_string())?;
    if open.is_alphanumeric() || open == '\\' {
        return Err("delimiter must not be alphanumeric or backslash".to_string());
    }
    let close = closing_delimiter(open);
    let nests = open != close;
    let unescape_delimiter = is_plain(close) && (!nests || is_plain(open));

    let body_start = open.len_utf8();
    let mut depth = 1usize;
    let mut needs_rewrite = false;
    let mut body_end = None;
    let mut escaped = false;

    for (idx, c) in chars {
        if escaped {
            if (c == close || c == open) && unescape_delimiter {
                needs_rewrite = true;
            }
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                body_end = Some(idx);
                break;
            }
        } else if nests && c == open {
            depth += 1;
        }
    }

    let body_end =
        body_end.ok_or_else(|| format!("no ending delimiter '{close}' found"))?;
    let body = &trimmed[body_start..body_end];
    let modifiers = Modifiers::parse(&trimmed[body_end + close.len_utf8()..])?;

    let body = if needs_rewrite {
        Cow::Owned(unescape(body, open, close))
    } else {
        Cow::Borrowed(body)
    };

    Ok(Delimited { body, modifiers })
}

/// Drop the backslash in front of escaped delimiters that are not regex
/// metacharacters (`\/` becomes `/`).
fn unescape(body: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next) if next == open || next == close => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(raw: &str) -> Regex {
        Pattern::normalize(raw)
            .compile(&PatternLimits::default())
            .unwrap()
    }

    #[test]
    fn test_delimited_regex_kept() {
        for raw in ["/^ex.*$/i", "#^admin#", "/a\\/b/", "{a{2}}", "(foo)", "  /x/"] {
            assert_eq!(Pattern::normalize(raw).as_str(), raw, "pattern {raw}");
        }
    }

    #[test]
    fn test_literals_wrapped() {
        assert_eq!(Pattern::normalize("example.org").as_str(), "/example.org/");
        assert_eq!(Pattern::normalize("a/b").as_str(), "/a\\/b/");
        assert_eq!(Pattern::normalize("^DOM\\").as_str(), "/^DOM\\\\/");
        assert_eq!(Pattern::normalize("@example.org$").as_str(), "/@example.org$/");
    }

    #[test]
    fn test_unknown_modifier_is_literal() {
        // `q` is not a modifier, so this is text.
        assert_eq!(Pattern::normalize("/abc/q").as_str(), "/\\/abc\\/q/");
    }

    #[test]
    fn test_unsupported_syntax_is_literal() {
        // Look-behind is not supported by the engine.
        let pattern = Pattern::normalize("/(?<=a)b/");
        assert_ne!(pattern.as_str(), "/(?<=a)b/");
        assert!(compile("/(?<=a)b/").is_match("/(?<=a)b/"));
    }

    #[test]
    fn test_unsupported_syntax_reported() {
        let reason = Pattern::unsupported_syntax("/^(?!corp_)/").unwrap();
        assert!(!reason.is_empty());
        assert!(Pattern::unsupported_syntax("/(a)\\1/").is_some());
        assert!(Pattern::unsupported_syntax("/^corp_/i").is_none());
        assert!(Pattern::unsupported_syntax("corp_").is_none());
        assert!(Pattern::unsupported_syntax("/abc/q").is_none());

        // The literal it falls back to is a plain, supported pattern.
        let literal = Pattern::normalize("/^(?!corp_)/");
        assert!(Pattern::unsupported_syntax(literal.as_str()).is_none());
    }

    #[test]
    fn test_invalid_literal_fully_escaped() {
        let pattern = Pattern::normalize("a(b");
        assert_eq!(pattern.as_str(), "/a\\(b/");
        let regex = compile("a(b");
        assert!(regex.is_match("xa(by"));
        assert!(!regex.is_match("ab"));
    }

    #[test]
    fn test_empty_input() {
        let pattern = Pattern::normalize("");
        assert_eq!(pattern.as_str(), "//");
        assert!(pattern.is_empty());
        assert!(compile("").is_match("anything"));
        assert!(!Pattern::normalize("x").is_empty());
    }

    #[test]
    fn test_normalization_idempotent() {
        let inputs = [
            "",
            "bob",
            "example.org",
            "a/b",
            "a\\b",
            "a(b",
            "/^ex.*$/i",
            "/abc/q",
            "/(?<=a)b/",
            "{a{2}}",
            "^DOMAIN\\",
            "@corp$",
            "\\/\\\\/",
            "[unclosed",
            "ünïcødé/ß",
        ];
        for raw in inputs {
            let once = Pattern::normalize(raw);
            let twice = Pattern::normalize(once.as_str());
            assert_eq!(once, twice, "normalizing {raw:?} twice");
            assert!(once.compile(&PatternLimits::default()).is_ok(), "{raw:?}");
        }
    }

    #[test]
    fn test_literal_matches_only_itself() {
        for literal in ["bob", "alice", "jdoe", "user_01", "DOMAIN"] {
            let regex = compile(&format!("^{literal}$"));
            assert!(regex.is_match(literal));
            assert!(!regex.is_match(&format!("{literal}x")));
            assert!(!regex.is_match(""));
        }
    }

    #[test]
    fn test_modifiers() {
        assert!(compile("/^ADMIN/i").is_match("administrator"));
        assert!(!compile("/^ADMIN/").is_match("administrator"));
        assert!(compile("/^b$/m").is_match("a\nb"));
        assert!(compile("/a.b/s").is_match("a\nb"));
        assert!(compile("/a b # comment/x").is_match("ab"));
        assert!(compile("/b/A").is_match("bc"));
        assert!(!compile("/b/A").is_match("abc"));
        assert!(compile("/b # trailing/Ax").is_match("bc"));
        assert_eq!(compile("/a+/U").find("aaa").unwrap().as_str(), "a");
        assert!(compile("/x/uDS").is_match("x"));
    }

    #[test]
    fn test_bracket_delimiters_nest() {
        let regex = compile("(a(b)c)");
        assert!(regex.is_match("abc"));
        assert!(compile("[a[0-9]]").is_match("a7"));
    }

    #[test]
    fn test_escaped_meta_delimiter_kept_escaped() {
        // `|` is a metacharacter, so `\|` stays escaped in the body.
        let regex = compile("|a\\|b|");
        assert!(regex.is_match("a|b"));
        assert!(!regex.is_match("a"));
    }

    #[test]
    fn test_size_limit_reported() {
        let limits = PatternLimits {
            size_limit: 16,
            ..Default::default()
        };
        let result = Pattern::normalize("/a{100}/").compile(&limits);
        assert!(matches!(result, Err(IdentityError::InvalidPattern { .. })));
    }

    #[test]
    fn test_compiled_pattern_keeps_error() {
        let limits = PatternLimits {
            size_limit: 16,
            ..Default::default()
        };
        let compiled = CompiledPattern::new(Pattern::normalize("/a{100}/"), &limits);
        assert!(!compiled.is_valid());
        assert!(compiled.regex().is_err());
        assert_eq!(compiled.pattern().as_str(), "/a{100}/");
        assert!(format!("{compiled:?}").contains("valid: false"));
    }
}
