//! User preferences with static and deferred values.
//!
//! Some preference values cannot be known when settings are translated; the
//! legacy mail-domain setting, for example, needs the resolved user name. Those
//! are stored as [`DeferredValue`]s and computed once the host has resolved the
//! identity and built its [`IdentityMetadata`].

use crate::error::{IdentityError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Metadata key for the accepted (filtered) user name.
pub const REMOTE_USER_NAME: &str = "remoteUserName";

/// Metadata key for the user name as read from its source.
pub const RAW_REMOTE_USER_NAME: &str = "rawRemoteUserName";

/// String metadata describing a resolved identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMetadata {
    entries: BTreeMap<String, String>,
}

impl IdentityMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata holding only the accepted user name.
    pub fn for_user(remote_user_name: impl Into<String>) -> Self {
        let mut metadata = Self::new();
        metadata.insert(REMOTE_USER_NAME, remote_user_name);
        metadata
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Like [`get`](Self::get) but a missing key is an error.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| IdentityError::MissingMetadata(key.to_string()))
    }

    pub fn remote_user_name(&self) -> Option<&str> {
        self.get(REMOTE_USER_NAME)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Pure function computing a preference from identity metadata.
///
/// # Example
/// ```rust,ignore
/// let shout: DeferredFn = Arc::new(|metadata| {
///     Ok(metadata.require("remoteUserName")?.to_uppercase())
/// });
/// ```
pub type DeferredFn = Arc<dyn Fn(&IdentityMetadata) -> Result<String> + Send + Sync>;

/// A preference value computed after identity resolution.
#[derive(Clone)]
pub struct DeferredValue {
    description: String,
    compute: DeferredFn,
}

impl DeferredValue {
    pub fn new<F>(description: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&IdentityMetadata) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            compute: Arc::new(compute),
        }
    }

    /// `<remoteUserName>@<domain>`.
    ///
    /// # Example
    /// ```rust
    /// use remoteuser_identity::{DeferredValue, IdentityMetadata};
    ///
    /// let email = DeferredValue::mail_domain("example.org");
    /// let metadata = IdentityMetadata::for_user("jdoe");
    /// assert_eq!(email.compute(&metadata).unwrap(), "jdoe@example.org");
    /// ```
    pub fn mail_domain(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self::new(format!("<{REMOTE_USER_NAME}>@{domain}"), move |metadata| {
            Ok(format!("{}@{}", metadata.require(REMOTE_USER_NAME)?, domain))
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn compute(&self, metadata: &IdentityMetadata) -> Result<String> {
        (self.compute)(metadata)
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeferredValue")
            .field(&self.description)
            .finish()
    }
}

/// A preference value.
#[derive(Debug, Clone)]
pub enum PreferenceValue {
    Static(Value),
    Deferred(DeferredValue),
}

impl PreferenceValue {
    pub fn resolve(&self, metadata: &IdentityMetadata) -> Result<Value> {
        match self {
            PreferenceValue::Static(value) => Ok(value.clone()),
            PreferenceValue::Deferred(deferred) => deferred.compute(metadata).map(Value::String),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, PreferenceValue::Deferred(_))
    }
}

impl From<Value> for PreferenceValue {
    fn from(value: Value) -> Self {
        PreferenceValue::Static(value)
    }
}

impl From<&str> for PreferenceValue {
    fn from(value: &str) -> Self {
        PreferenceValue::Static(Value::String(value.to_string()))
    }
}

impl From<DeferredValue> for PreferenceValue {
    fn from(value: DeferredValue) -> Self {
        PreferenceValue::Deferred(value)
    }
}

/// Preferences in insertion order.
#[derive(Debug, Clone, Default)]
pub struct UserPreferences {
    entries: Vec<(String, PreferenceValue)>,
}

impl UserPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a settings mapping of preference name to scalar value.
    pub fn from_yaml(key: &str, mapping: &serde_yaml::Mapping) -> Result<Self> {
        let mut prefs = Self::new();
        for (name, value) in mapping {
            let name = name.as_str().ok_or_else(|| {
                IdentityError::configuration(key, "preference names must be strings")
            })?;
            let value = serde_json::to_value(value)
                .map_err(|e| IdentityError::configuration(key, e))?;
            prefs.insert(name, value);
        }
        Ok(prefs)
    }

    /// Set `name`, replacing any existing value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PreferenceValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Set `name` only if it is not present yet; returns whether it was set.
    pub fn insert_if_absent(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PreferenceValue>,
    ) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, value.into()));
        true
    }

    pub fn get(&self, name: &str) -> Option<&PreferenceValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PreferenceValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Compute every value against `metadata`.
    ///
    /// A deferred value that fails is left out and logged; the remaining
    /// preferences are still returned.
    pub fn resolve(&self, metadata: &IdentityMetadata) -> Map<String, Value> {
        let mut resolved = Map::new();
        for (name, value) in &self.entries {
            match value.resolve(metadata) {
                Ok(value) => {
                    resolved.insert(name.clone(), value);
                }
                Err(e) => tracing::warn!("Skipping preference '{}': {}", name, e),
            }
        }
        resolved
    }
}
