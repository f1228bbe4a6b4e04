//! Operator settings.
//!
//! Operators write a flat mapping of setting names to values, usually YAML:
//!
//! ```yaml
//! UserName:
//!   - env: REMOTE_USER
//! UserNameReplaceFilter:
//!   "@EXAMPLE.ORG$": ""
//! UserNameBlacklistFilter: [guest, "/^svc_/"]
//! AllowUserSwitch: true
//! # deprecated
//! MailDomain: example.org
//! ```
//!
//! [`Settings`] keeps that raw mapping. The legacy translator folds it into a
//! [`ProviderSettings`] value plus filter stages before anything is evaluated.

use crate::error::{IdentityError, Result};
use crate::prefs::UserPreferences;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Setting names.
pub mod keys {
    pub const USER_NAME: &str = "UserName";
    pub const USER_NAME_REPLACE_FILTER: &str = "UserNameReplaceFilter";
    pub const USER_NAME_BLACKLIST_FILTER: &str = "UserNameBlacklistFilter";
    pub const USER_NAME_WHITELIST_FILTER: &str = "UserNameWhitelistFilter";
    pub const USER_PREFS: &str = "UserPrefs";
    pub const USER_PREFS_FORCED: &str = "UserPrefsForced";
    pub const USER_URLS: &str = "UserUrls";
    pub const ALLOW_USER_SWITCH: &str = "AllowUserSwitch";
    pub const REMOVE_AUTH_PAGES_AND_LINKS: &str = "RemoveAuthPagesAndLinks";
    pub const PRIORITY: &str = "Priority";

    /// Deprecated: falsy disables automatic login.
    pub const AUTHZ: &str = "Authz";
    /// Deprecated: superseded by `UserPrefs.realname`.
    pub const NAME: &str = "Name";
    /// Deprecated: superseded by `UserPrefs.email`.
    pub const MAIL: &str = "Mail";
    /// Deprecated: superseded by the `enotif*` preferences.
    pub const NOTIFY: &str = "Notify";
    /// Deprecated: superseded by `UserNameReplaceFilter`.
    pub const DOMAIN: &str = "Domain";
    /// Deprecated: superseded by a deferred `UserPrefs.email`.
    pub const MAIL_DOMAIN: &str = "MailDomain";

    pub const CURRENT: &[&str] = &[
        USER_NAME,
        USER_NAME_REPLACE_FILTER,
        USER_NAME_BLACKLIST_FILTER,
        USER_NAME_WHITELIST_FILTER,
        USER_PREFS,
        USER_PREFS_FORCED,
        USER_URLS,
        ALLOW_USER_SWITCH,
        REMOVE_AUTH_PAGES_AND_LINKS,
        PRIORITY,
    ];

    pub const LEGACY: &[&str] = &[AUTHZ, NAME, MAIL, NOTIFY, DOMAIN, MAIL_DOMAIN];
}

/// Environment variables consulted when `UserName` is not set.
pub const DEFAULT_REMOTE_USER_VARIABLES: &[&str] = &["REMOTE_USER", "REDIRECT_REMOTE_USER"];

/// Logout target added to the user URLs when user switching is allowed.
pub const DEFAULT_LOGOUT_URL: &str = "Special:UserLogin";

/// Raw operator settings in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: Mapping,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        match value {
            Value::Mapping(values) => Ok(Self { values }),
            Value::Null => Ok(Self::new()),
            _ => Err(IdentityError::Yaml(
                "settings must be a mapping of names to values".to_string(),
            )),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!("Loaded settings from {}", path.as_ref().display());
        Self::from_yaml_str(&content)
    }

    /// Set a value, builder style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(Value::String(key.to_string()), value.into());
    }

    /// Whether the key is present, even with a null value.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The value when present and not null.
    pub fn get_non_null(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|value| !value.is_null())
    }

    /// Keys that are neither current nor legacy setting names.
    pub fn unknown_keys(&self) -> Vec<String> {
        self.values
            .keys()
            .filter_map(|key| match key.as_str() {
                Some(name) if keys::CURRENT.contains(&name) || keys::LEGACY.contains(&name) => {
                    None
                }
                Some(name) => Some(name.to_string()),
                None => Some(format!("{key:?}")),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Where a remote user name is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUserSource {
    /// An environment (or server) variable looked up per request.
    Env(String),
    /// A fixed value supplied by the operator.
    Value(String),
}

impl RemoteUserSource {
    pub fn env(name: impl Into<String>) -> Self {
        Self::Env(name.into())
    }

    /// The default `REMOTE_USER` / `REDIRECT_REMOTE_USER` pair.
    pub fn defaults() -> Vec<Self> {
        DEFAULT_REMOTE_USER_VARIABLES
            .iter()
            .map(|name| Self::env(*name))
            .collect()
    }

    /// Parse one entry: a string is a value, `{env: NAME}` a variable.
    ///
    /// `null` and `false` entries stand for sources that yield nothing.
    fn from_yaml(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null | Value::Bool(false) => Ok(None),
            Value::String(name) => Ok(Some(Self::Value(name.clone()))),
            Value::Mapping(mapping) => match mapping.get("env").and_then(Value::as_str) {
                Some(variable) if mapping.len() == 1 => Ok(Some(Self::env(variable))),
                _ => Err(IdentityError::configuration(
                    keys::USER_NAME,
                    "sources must look like {env: VARIABLE}",
                )),
            },
            other => Err(IdentityError::configuration(
                keys::USER_NAME,
                format!("unsupported source {other:?}"),
            )),
        }
    }

    /// Parse `UserName`: a single source or a list of them.
    pub(crate) fn list_from_yaml(value: &Value) -> Result<Vec<Self>> {
        let entries: Vec<&Value> = match value {
            Value::Sequence(entries) => entries.iter().collect(),
            single => vec![single],
        };
        let mut sources = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(source) = Self::from_yaml(entry)? {
                sources.push(source);
            }
        }
        Ok(sources)
    }
}

/// Canonical settings after translation.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Sources tried in order; the first non-empty name wins.
    pub remote_user_names: Vec<RemoteUserSource>,
    /// Preferences applied when an account is created.
    pub user_prefs: Option<UserPreferences>,
    /// Preferences applied on every login.
    pub user_prefs_forced: Option<UserPreferences>,
    /// Named URLs the host should use (`logout`, `login`, ...).
    pub user_urls: BTreeMap<String, String>,
    /// Allow a different remote user to replace the current session user.
    pub switch_user: bool,
    /// Hide the host's own login/logout pages and links.
    pub remove_auth_pages_and_links: bool,
    /// Host session provider priority, `None` for the host default.
    pub priority: Option<i64>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            remote_user_names: RemoteUserSource::defaults(),
            user_prefs: None,
            user_prefs_forced: None,
            user_urls: BTreeMap::new(),
            switch_user: false,
            remove_auth_pages_and_links: true,
            priority: None,
        }
    }
}

/// Loose truthiness used by flag settings.
///
/// `null`, `false`, `0`, `""`, `"0"` and empty collections are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => is_truthy(&tagged.value),
    }
}

/// A non-empty string setting; empty strings and nulls mean "not set".
pub(crate) fn non_empty_string<'a>(key: &str, value: &'a Value) -> Result<Option<&'a str>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(IdentityError::configuration(
            key,
            format!("expected a string, found {}", type_name(other)),
        )),
    }
}

/// A scalar rendered as text (replacement strings may be written as numbers).
pub(crate) fn scalar_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "1".to_string() } else { String::new() }),
        Value::Null => Ok(String::new()),
        other => Err(IdentityError::configuration(
            key,
            format!("expected a scalar, found {}", type_name(other)),
        )),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
