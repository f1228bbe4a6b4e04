//! Provider facade: sources, filter pipeline and preferences in one call.
//!
//! A [`RemoteUserProvider`] is built once from operator settings. Per request
//! it reads the first non-empty remote user name from its sources, runs the
//! filter pipeline and, on acceptance, builds the identity metadata and
//! resolves preferences (deferred values included).

use crate::config::IdentityConfig;
use crate::error::{IdentityError, Result};
use crate::legacy::{translate, Translation};
use crate::pipeline::{FilterPipeline, PipelineResult, Rejection};
use crate::prefs::{IdentityMetadata, UserPreferences, RAW_REMOTE_USER_NAME};
use crate::settings::{ProviderSettings, RemoteUserSource, Settings};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Lookup of request variables such as `REMOTE_USER`.
pub trait IdentitySource {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads variables from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentSource;

impl IdentitySource for EnvironmentSource {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl IdentitySource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl IdentitySource for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<T: IdentitySource + ?Sized> IdentitySource for &T {
    fn lookup(&self, name: &str) -> Option<String> {
        (**self).lookup(name)
    }
}

/// An accepted identity with everything the host needs to log it in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub user_name: String,
    pub metadata: IdentityMetadata,
    /// Preferences for a newly created account.
    pub preferences: Map<String, Value>,
    /// Preferences to apply on every login.
    pub forced_preferences: Map<String, Value>,
}

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Accepted(ResolvedIdentity),
    Rejected {
        remote_user_name: String,
        reason: Rejection,
    },
    /// No source produced a non-empty name.
    NoRemoteUser,
}

impl Resolution {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Resolution::Accepted(_))
    }

    pub fn user_name(&self) -> Option<&str> {
        match self {
            Resolution::Accepted(identity) => Some(&identity.user_name),
            _ => None,
        }
    }
}

/// Resolves remote users into local identities.
///
/// # Example
/// ```rust
/// use remoteuser_identity::{RemoteUserProvider, Resolution};
/// use std::collections::HashMap;
///
/// let provider = RemoteUserProvider::from_yaml_str(
///     r#"
/// UserNameReplaceFilter:
///   "/^DOMAIN\\\\/": ""
/// UserNameBlacklistFilter: [guest]
/// MailDomain: example.org
/// "#,
/// )
/// .unwrap();
///
/// let request = HashMap::from([("REMOTE_USER".to_string(), "DOMAIN\\jdoe".to_string())]);
/// match provider.resolve(&request) {
///     Resolution::Accepted(identity) => {
///         assert_eq!(identity.user_name, "jdoe");
///         assert_eq!(identity.preferences["email"], "jdoe@example.org");
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RemoteUserProvider {
    settings: ProviderSettings,
    pipeline: FilterPipeline,
    skipped: Vec<IdentityError>,
}

impl RemoteUserProvider {
    pub fn new(settings: ProviderSettings, pipeline: FilterPipeline) -> Self {
        Self {
            settings,
            pipeline,
            skipped: Vec::new(),
        }
    }

    /// Translate `settings` with the default engine configuration.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::from_settings_with_config(settings, &IdentityConfig::default())
    }

    pub fn from_settings_with_config(settings: &Settings, config: &IdentityConfig) -> Self {
        let Translation {
            settings,
            pipeline,
            skipped,
        } = translate(settings, config);
        if !skipped.is_empty() {
            tracing::warn!("{} setting(s) were skipped during translation", skipped.len());
        }
        Self {
            settings,
            pipeline,
            skipped,
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(Self::from_settings(&Settings::from_yaml_str(yaml)?))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_settings(&Settings::from_file(path)?))
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn pipeline(&self) -> &FilterPipeline {
        &self.pipeline
    }

    /// Errors for settings skipped during translation.
    pub fn skipped(&self) -> &[IdentityError] {
        &self.skipped
    }

    /// First non-empty name produced by the configured sources.
    pub fn remote_user_name<S: IdentitySource + ?Sized>(&self, source: &S) -> Option<String> {
        self.settings
            .remote_user_names
            .iter()
            .filter_map(|candidate| match candidate {
                RemoteUserSource::Env(variable) => source.lookup(variable),
                RemoteUserSource::Value(value) => Some(value.clone()),
            })
            .find(|name| !name.is_empty())
    }

    /// Resolve the remote user of one request.
    pub fn resolve<S: IdentitySource + ?Sized>(&self, source: &S) -> Resolution {
        match self.remote_user_name(source) {
            Some(raw) => self.resolve_name(&raw),
            None => {
                tracing::debug!("No remote user name available");
                Resolution::NoRemoteUser
            }
        }
    }

    /// Resolve an already extracted remote user name.
    pub fn resolve_name(&self, raw: &str) -> Resolution {
        if raw.is_empty() {
            return Resolution::NoRemoteUser;
        }
        match self.pipeline.evaluate(raw) {
            PipelineResult::Accepted(user_name) if user_name.is_empty() => {
                tracing::debug!("{:?} was filtered down to an empty name", raw);
                Resolution::NoRemoteUser
            }
            PipelineResult::Accepted(user_name) => {
                Resolution::Accepted(self.accept(raw, user_name))
            }
            PipelineResult::Rejected(reason) => Resolution::Rejected {
                remote_user_name: raw.to_string(),
                reason,
            },
        }
    }

    /// Resolve many names, preserving input order.
    pub fn resolve_batch<S>(&self, raws: &[S]) -> Vec<Resolution>
    where
        S: AsRef<str> + Sync,
    {
        let batch = &self.pipeline.config().batch;
        if batch.enable_parallelism && raws.len() >= batch.min_batch_size_for_parallelism {
            raws.par_iter()
                .map(|raw| self.resolve_name(raw.as_ref()))
                .collect()
        } else {
            raws.iter().map(|raw| self.resolve_name(raw.as_ref())).collect()
        }
    }

    fn accept(&self, raw: &str, user_name: String) -> ResolvedIdentity {
        let mut metadata = IdentityMetadata::for_user(user_name.clone());
        metadata.insert(RAW_REMOTE_USER_NAME, raw);

        let resolve = |prefs: Option<&UserPreferences>| {
            prefs
                .map(|prefs| prefs.resolve(&metadata))
                .unwrap_or_default()
        };
        let preferences = resolve(self.settings.user_prefs.as_ref());
        let forced_preferences = resolve(self.settings.user_prefs_forced.as_ref());

        ResolvedIdentity {
            user_name,
            metadata,
            preferences,
            forced_preferences,
        }
    }
}
