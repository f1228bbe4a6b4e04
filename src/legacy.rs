//! Translation of operator settings, legacy keys included.
//!
//! Translation runs once per configuration lifetime and produces the canonical
//! [`ProviderSettings`] together with the [`FilterPipeline`] built from the
//! filter settings. Steps run in a fixed order because later rewrite stages see
//! the output of earlier ones and because preference insertion never replaces
//! an existing key:
//!
//! | Step | Setting | Effect |
//! |------|---------|--------|
//! | 1 | `UserNameReplaceFilter` | rewrite stage |
//! | 2 | `UserNameBlacklistFilter` | deny-list stage |
//! | 3 | `UserNameWhitelistFilter` | allow-list stage |
//! | 4 | `UserName`, `UserPrefs`, `UserPrefsForced`, `UserUrls`, `AllowUserSwitch`, `RemoveAuthPagesAndLinks`, `Priority` | canonical settings |
//! | 5 | (`AllowUserSwitch`) | `logout` URL defaults to `Special:UserLogin` |
//! | 6 | `Authz` | falsy (null included) clears the remote user sources |
//! | 7 | `Name` | `realname` preference |
//! | 8 | `Mail` | `email` preference |
//! | 9 | `Notify` | `enotif*` preferences, `0` when null |
//! | 10 | `Domain` | rewrite stage stripping `@domain` and `domain\` |
//! | 11 | `MailDomain` | deferred `email` preference |
//!
//! Deprecated keys set to null count as present, so `Authz: ~` disables
//! automatic login. The string-valued ones treat null like an empty string.
//! A malformed value only skips its own key; the error is logged and kept in
//! [`Translation::skipped`].

use crate::config::IdentityConfig;
use crate::error::{IdentityError, Result};
use crate::pipeline::FilterPipeline;
use crate::prefs::{DeferredValue, UserPreferences};
use crate::settings::{
    is_truthy, keys, non_empty_string, scalar_string, type_name, ProviderSettings,
    RemoteUserSource, Settings, DEFAULT_LOGOUT_URL,
};
use serde_json::json;
use serde_yaml::Value;

/// Preferences derived from the legacy `Notify` flag.
pub const NOTIFY_PREFERENCES: &[&str] = &[
    "enotifminoredits",
    "enotifrevealaddr",
    "enotifusertalkpages",
    "enotifwatchlistpages",
];

/// Result of translating settings.
#[derive(Debug)]
pub struct Translation {
    pub settings: ProviderSettings,
    pub pipeline: FilterPipeline,
    /// Settings that were skipped because their values were malformed.
    pub skipped: Vec<IdentityError>,
}

/// Translate `settings` with the given engine configuration.
///
/// # Example
/// ```rust
/// use remoteuser_identity::{translate, IdentityConfig, IdentityMetadata, Settings};
///
/// let settings = Settings::from_yaml_str("Domain: EXAMPLE\nMailDomain: example.org").unwrap();
/// let translation = translate(&settings, &IdentityConfig::default());
///
/// let name = translation.pipeline.evaluate("EXAMPLE\\jdoe").into_identity().unwrap();
/// assert_eq!(name, "jdoe");
///
/// let prefs = translation.settings.user_prefs.unwrap();
/// let resolved = prefs.resolve(&IdentityMetadata::for_user(name));
/// assert_eq!(resolved["email"], "jdoe@example.org");
/// ```
pub fn translate(settings: &Settings, config: &IdentityConfig) -> Translation {
    Translator::new(settings, config).run()
}

struct Translator<'a> {
    source: &'a Settings,
    pipeline: FilterPipeline,
    settings: ProviderSettings,
    prefs: UserPreferences,
    skipped: Vec<IdentityError>,
}

impl<'a> Translator<'a> {
    fn new(source: &'a Settings, config: &IdentityConfig) -> Self {
        Self {
            source,
            pipeline: FilterPipeline::with_config(config.clone()),
            settings: ProviderSettings::default(),
            prefs: UserPreferences::new(),
            skipped: Vec::new(),
        }
    }

    fn run(mut self) -> Translation {
        for key in self.source.unknown_keys() {
            tracing::debug!("Ignoring unknown setting '{}'", key);
        }

        self.step(keys::USER_NAME_REPLACE_FILTER, Self::replace_filter);
        self.step(keys::USER_NAME_BLACKLIST_FILTER, |t, v| {
            t.match_filter(keys::USER_NAME_BLACKLIST_FILTER, v, false)
        });
        self.step(keys::USER_NAME_WHITELIST_FILTER, |t, v| {
            t.match_filter(keys::USER_NAME_WHITELIST_FILTER, v, true)
        });

        self.step(keys::USER_NAME, Self::user_name);
        self.step(keys::USER_PREFS, Self::user_prefs);
        self.step(keys::USER_PREFS_FORCED, Self::user_prefs_forced);
        self.step(keys::USER_URLS, Self::user_urls);
        self.step(keys::ALLOW_USER_SWITCH, |t, v| {
            t.settings.switch_user = is_truthy(v);
            Ok(())
        });
        self.step(keys::REMOVE_AUTH_PAGES_AND_LINKS, |t, v| {
            t.settings.remove_auth_pages_and_links = is_truthy(v);
            Ok(())
        });
        self.step(keys::PRIORITY, Self::priority);

        if self.settings.switch_user {
            self.settings
                .user_urls
                .entry("logout".to_string())
                .or_insert_with(|| DEFAULT_LOGOUT_URL.to_string());
        }

        self.legacy(keys::AUTHZ, Self::authz);
        self.legacy(keys::NAME, |t, v| t.string_pref(keys::NAME, v, "realname"));
        self.legacy(keys::MAIL, |t, v| t.string_pref(keys::MAIL, v, "email"));
        self.legacy(keys::NOTIFY, Self::notify);
        self.legacy(keys::DOMAIN, Self::domain);
        self.legacy(keys::MAIL_DOMAIN, Self::mail_domain);

        if !self.prefs.is_empty() {
            self.settings.user_prefs = Some(self.prefs);
        }

        Translation {
            settings: self.settings,
            pipeline: self.pipeline,
            skipped: self.skipped,
        }
    }

    /// Run `apply` for a current-form key that is present and not null.
    fn step<F>(&mut self, key: &str, apply: F)
    where
        F: FnOnce(&mut Self, &Value) -> Result<()>,
    {
        let source = self.source;
        let Some(value) = source.get_non_null(key) else {
            return;
        };
        if let Err(e) = apply(self, value) {
            tracing::warn!("Skipping setting '{}': {}", key, e);
            self.skipped.push(e);
        }
    }

    /// Run `apply` for a deprecated key that is present, even when null.
    fn legacy<F>(&mut self, key: &str, apply: F)
    where
        F: FnOnce(&mut Self, &Value) -> Result<()>,
    {
        let source = self.source;
        let Some(value) = source.get(key) else {
            return;
        };
        tracing::debug!("Translating deprecated setting '{}'", key);
        if let Err(e) = apply(self, value) {
            tracing::warn!("Skipping deprecated setting '{}': {}", key, e);
            self.skipped.push(e);
        }
    }

    fn replace_filter(&mut self, value: &Value) -> Result<()> {
        let key = keys::USER_NAME_REPLACE_FILTER;
        let Value::Mapping(mapping) = value else {
            return Err(IdentityError::configuration(
                key,
                format!(
                    "expected a mapping of pattern to replacement, found {}",
                    type_name(value)
                ),
            ));
        };

        let mut rules = Vec::with_capacity(mapping.len());
        for (search, replacement) in mapping {
            rules.push((scalar_string(key, search)?, scalar_string(key, replacement)?));
        }
        self.pipeline.register_rewrite(rules);
        Ok(())
    }

    fn match_filter(&mut self, key: &str, value: &Value, allow: bool) -> Result<()> {
        let names = match value {
            Value::Sequence(entries) => entries
                .iter()
                .map(|entry| scalar_string(key, entry))
                .collect::<Result<Vec<_>>>()?,
            Value::String(name) => vec![name.clone()],
            other => {
                return Err(IdentityError::configuration(
                    key,
                    format!("expected a list of names, found {}", type_name(other)),
                ))
            }
        };
        self.pipeline.register_match_gate(names, allow);
        Ok(())
    }

    fn user_name(&mut self, value: &Value) -> Result<()> {
        self.settings.remote_user_names = RemoteUserSource::list_from_yaml(value)?;
        Ok(())
    }

    fn user_prefs(&mut self, value: &Value) -> Result<()> {
        self.prefs = preferences(keys::USER_PREFS, value)?;
        Ok(())
    }

    fn user_prefs_forced(&mut self, value: &Value) -> Result<()> {
        let prefs = preferences(keys::USER_PREFS_FORCED, value)?;
        if !prefs.is_empty() {
            self.settings.user_prefs_forced = Some(prefs);
        }
        Ok(())
    }

    fn user_urls(&mut self, value: &Value) -> Result<()> {
        let key = keys::USER_URLS;
        let Value::Mapping(mapping) = value else {
            return Err(IdentityError::configuration(
                key,
                format!("expected a mapping, found {}", type_name(value)),
            ));
        };
        for (name, url) in mapping {
            self.settings
                .user_urls
                .insert(scalar_string(key, name)?, scalar_string(key, url)?);
        }
        Ok(())
    }

    fn priority(&mut self, value: &Value) -> Result<()> {
        let priority = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        match priority {
            Some(priority) => {
                self.settings.priority = Some(priority);
                Ok(())
            }
            None => Err(IdentityError::configuration(
                keys::PRIORITY,
                "expected an integer",
            )),
        }
    }

    fn authz(&mut self, value: &Value) -> Result<()> {
        if !is_truthy(value) {
            tracing::debug!("Automatic login disabled by '{}'", keys::AUTHZ);
            self.settings.remote_user_names.clear();
        }
        Ok(())
    }

    fn string_pref(&mut self, key: &str, value: &Value, pref: &str) -> Result<()> {
        if let Some(text) = non_empty_string(key, value)? {
            self.prefs.insert_if_absent(pref, text);
        }
        Ok(())
    }

    fn notify(&mut self, value: &Value) -> Result<()> {
        let notify = if is_truthy(value) { 1 } else { 0 };
        for pref in NOTIFY_PREFERENCES {
            self.prefs.insert_if_absent(*pref, json!(notify));
        }
        Ok(())
    }

    fn domain(&mut self, value: &Value) -> Result<()> {
        if let Some(domain) = non_empty_string(keys::DOMAIN, value)? {
            self.pipeline.register_rewrite([
                (format!("@{domain}$"), String::new()),
                (format!("^{domain}\\"), String::new()),
            ]);
        }
        Ok(())
    }

    fn mail_domain(&mut self, value: &Value) -> Result<()> {
        if let Some(domain) = non_empty_string(keys::MAIL_DOMAIN, value)? {
            self.prefs
                .insert_if_absent("email", DeferredValue::mail_domain(domain));
        }
        Ok(())
    }
}

fn preferences(key: &str, value: &Value) -> Result<UserPreferences> {
    match value {
        Value::Mapping(mapping) => UserPreferences::from_yaml(key, mapping),
        other => Err(IdentityError::configuration(
            key,
            format!("expected a mapping, found {}", type_name(other)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::StageKind;
    use crate::prefs::IdentityMetadata;
    use serde_json::json;

    fn run(yaml: &str) -> Translation {
        translate(
            &Settings::from_yaml_str(yaml).unwrap(),
            &IdentityConfig::default(),
        )
    }

    #[test]
    fn test_empty_settings() {
        let translation = run("");
        assert!(translation.pipeline.is_empty());
        assert!(translation.skipped.is_empty());
        assert_eq!(
            translation.settings.remote_user_names,
            RemoteUserSource::defaults()
        );
        assert!(translation.settings.user_prefs.is_none());
    }

    #[test]
    fn test_filter_registration_order() {
        let translation = run(
            r#"
Domain: CORP
UserNameWhitelistFilter: [jdoe]
UserNameBlacklistFilter: [guest]
UserNameReplaceFilter:
  "/^x_/": ""
"#,
        );
        let kinds: Vec<StageKind> = translation
            .pipeline
            .stages()
            .iter()
            .map(|stage| stage.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Rewrite,
                StageKind::DenyList,
                StageKind::AllowList,
                StageKind::Rewrite
            ]
        );
    }

    #[test]
    fn test_replace_filter_keeps_rule_order() {
        let translation = run(
            r#"
UserNameReplaceFilter:
  a: b
  b: c
"#,
        );
        assert_eq!(translation.pipeline.evaluate("a").identity(), Some("c"));
    }

    #[test]
    fn test_domain_rewrite() {
        let translation = run("Domain: EXAMPLE");
        let pipeline = &translation.pipeline;
        assert_eq!(pipeline.evaluate("jdoe@EXAMPLE").identity(), Some("jdoe"));
        assert_eq!(pipeline.evaluate("EXAMPLE\\jdoe").identity(), Some("jdoe"));
        assert_eq!(pipeline.evaluate("jdoe").identity(), Some("jdoe"));
    }

    #[test]
    fn test_authz_false_clears_sources() {
        let translation = run("UserName: jdoe\nAuthz: false");
        assert!(translation.settings.remote_user_names.is_empty());

        let translation = run("Authz: ~");
        assert!(translation.settings.remote_user_names.is_empty());
        assert!(translation.skipped.is_empty());

        let translation = run("Authz: 0");
        assert!(translation.settings.remote_user_names.is_empty());

        let translation = run("Authz: true");
        assert_eq!(
            translation.settings.remote_user_names,
            RemoteUserSource::defaults()
        );
    }

    #[test]
    fn test_name_and_mail() {
        let translation = run("Name: John Doe\nMail: jdoe@example.org");
        let prefs = translation.settings.user_prefs.unwrap();
        let resolved = prefs.resolve(&IdentityMetadata::new());
        assert_eq!(resolved["realname"], json!("John Doe"));
        assert_eq!(resolved["email"], json!("jdoe@example.org"));
    }

    #[test]
    fn test_current_prefs_win_over_legacy() {
        let translation = run(
            r#"
UserPrefs:
  email: current@example.org
Mail: legacy@example.org
MailDomain: example.org
"#,
        );
        let prefs = translation.settings.user_prefs.unwrap();
        assert_eq!(prefs.len(), 1);
        let resolved = prefs.resolve(&IdentityMetadata::for_user("jdoe"));
        assert_eq!(resolved["email"], json!("current@example.org"));
    }

    #[test]
    fn test_mail_wins_over_mail_domain() {
        let translation = run("Mail: legacy@example.org\nMailDomain: example.org");
        let prefs = translation.settings.user_prefs.unwrap();
        assert!(!prefs.get("email").unwrap().is_deferred());
    }

    #[test]
    fn test_mail_domain_deferred() {
        let translation = run("MailDomain: example.org");
        let prefs = translation.settings.user_prefs.unwrap();
        assert!(prefs.get("email").unwrap().is_deferred());
        let resolved = prefs.resolve(&IdentityMetadata::for_user("jdoe"));
        assert_eq!(resolved["email"], json!("jdoe@example.org"));
    }

    #[test]
    fn test_notify() {
        let on = run("Notify: true").settings.user_prefs.unwrap();
        let off = run("Notify: false").settings.user_prefs.unwrap();
        let null = run("Notify: ~").settings.user_prefs.unwrap();
        let metadata = IdentityMetadata::new();
        for pref in NOTIFY_PREFERENCES {
            assert_eq!(on.resolve(&metadata)[*pref], json!(1));
            assert_eq!(off.resolve(&metadata)[*pref], json!(0));
            assert_eq!(null.resolve(&metadata)[*pref], json!(0));
        }
    }

    #[test]
    fn test_absent_notify_sets_nothing() {
        let translation = run("Name: John Doe");
        let prefs = translation.settings.user_prefs.unwrap();
        for pref in NOTIFY_PREFERENCES {
            assert!(prefs.get(pref).is_none());
        }
    }

    #[test]
    fn test_empty_legacy_values_are_noops() {
        let translation = run("Name: ''\nMail: ~\nDomain: ''\nMailDomain: ''");
        assert!(translation.pipeline.is_empty());
        assert!(translation.settings.user_prefs.is_none());
        assert!(translation.skipped.is_empty());
    }

    #[test]
    fn test_malformed_value_skipped() {
        let translation = run(
            r#"
Domain: [not, a, string]
MailDomain: example.org
UserNameBlacklistFilter: {bob: 1}
Priority: high
"#,
        );
        assert_eq!(translation.skipped.len(), 3);
        assert!(translation.pipeline.is_empty());
        assert!(translation.settings.priority.is_none());
        let prefs = translation.settings.user_prefs.unwrap();
        assert!(prefs.get("email").unwrap().is_deferred());
        for error in &translation.skipped {
            assert!(matches!(error, IdentityError::Configuration { .. }));
        }
    }

    #[test]
    fn test_switch_user_sets_logout_url() {
        let translation = run("AllowUserSwitch: true");
        assert!(translation.settings.switch_user);
        assert_eq!(
            translation.settings.user_urls.get("logout").map(String::as_str),
            Some(DEFAULT_LOGOUT_URL)
        );

        let translation = run("AllowUserSwitch: true\nUserUrls: {logout: 'https://sso/logout'}");
        assert_eq!(
            translation.settings.user_urls.get("logout").map(String::as_str),
            Some("https://sso/logout")
        );

        let translation = run("UserUrls: {login: 'https://sso/login'}");
        assert!(translation.settings.user_urls.get("logout").is_none());
    }

    #[test]
    fn test_scalar_settings() {
        let translation = run(
            r#"
RemoveAuthPagesAndLinks: false
Priority: "42"
UserPrefsForced:
  language: en
"#,
        );
        assert!(!translation.settings.remove_auth_pages_and_links);
        assert_eq!(translation.settings.priority, Some(42));
        let forced = translation.settings.user_prefs_forced.unwrap();
        assert_eq!(
            forced.resolve(&IdentityMetadata::new())["language"],
            json!("en")
        );
    }

    #[test]
    fn test_null_filters_are_not_registered() {
        let translation = run("UserNameWhitelistFilter: ~\nUserNameReplaceFilter: ~");
        assert!(translation.pipeline.is_empty());
    }

    #[test]
    fn test_empty_whitelist_rejects_everyone() {
        let translation = run("UserNameWhitelistFilter: []");
        assert_eq!(translation.pipeline.len(), 1);
        assert!(translation.pipeline.evaluate("anyone").is_rejected());
    }
}
