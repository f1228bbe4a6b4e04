//! # Remote User Identity
//!
//! Resolves a trusted local account name from an identity asserted by an
//! upstream authentication layer (for example a web server setting
//! `REMOTE_USER`), applying operator policy through an ordered filter pipeline.
//!
//! Operators write filter patterns either as plain strings or as delimited
//! regular expressions (`/^admin/i`); both forms are normalized into a single
//! compiled representation when the pipeline is built.
//!
//! ## Quick Start
//!
//! ### Filter Pipeline
//!
//! ```rust
//! use remoteuser_identity::{FilterPipeline, PipelineResult};
//!
//! let mut pipeline = FilterPipeline::new();
//! pipeline
//!     // Strip a Kerberos realm
//!     .register_rewrite([("@EXAMPLE.ORG$", "")])
//!     // Nobody called guest, nor any service account
//!     .register_match_gate(["guest", "/^svc_/"], false);
//!
//! assert_eq!(
//!     pipeline.evaluate("jdoe@EXAMPLE.ORG"),
//!     PipelineResult::Accepted("jdoe".to_string())
//! );
//! assert!(pipeline.evaluate("svc_backup@EXAMPLE.ORG").is_rejected());
//! ```
//!
//! ### Operator Settings
//!
//! ```rust
//! use remoteuser_identity::{RemoteUserProvider, Resolution};
//! use std::collections::HashMap;
//!
//! let provider = RemoteUserProvider::from_yaml_str(
//!     r#"
//! UserNameBlacklistFilter: [guest]
//! UserPrefs:
//!   language: en
//! Domain: EXAMPLE
//! MailDomain: example.org
//! "#,
//! )?;
//!
//! let request = HashMap::from([("REMOTE_USER".to_string(), "jdoe@EXAMPLE".to_string())]);
//! let Resolution::Accepted(identity) = provider.resolve(&request) else {
//!     panic!("jdoe should be accepted");
//! };
//! assert_eq!(identity.user_name, "jdoe");
//! assert_eq!(identity.preferences["language"], "en");
//! assert_eq!(identity.preferences["email"], "jdoe@example.org");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Batch Processing
//!
//! ```rust
//! use remoteuser_identity::{FilterPipeline, IdentityConfig};
//!
//! let config = IdentityConfig::new().with_min_batch_size_for_parallelism(2);
//! let mut pipeline = FilterPipeline::with_config(config);
//! pipeline.register_match_gate(["/^[a-z]+$/"], true);
//!
//! let results = pipeline.evaluate_batch(&["alice", "Bob", "carol"]);
//! let accepted = results.iter().filter(|r| r.is_accepted()).count();
//! assert_eq!(accepted, 2);
//! ```
//!
//! ## Evaluation
//!
//! Stages run in registration order. A rewrite stage replaces the working
//! identity; a match gate either passes it on unchanged or rejects it, which
//! ends evaluation. A stage whose pattern failed to compile rejects every
//! identity that reaches it.
//!
//! The pipeline and everything it holds is immutable after construction and
//! can be shared across threads.

pub mod config;
pub mod error;
pub mod filter;
pub mod legacy;
pub mod pattern;
pub mod pipeline;
pub mod prefs;
pub mod provider;
pub mod settings;

// Configuration
pub use config::{BatchConfig, EmptyPatternPolicy, IdentityConfig, PatternLimits};

// Core types and errors
pub use error::{IdentityError, Result};
pub use pattern::{CompiledPattern, Pattern};

// Filter pipeline
pub use filter::{MatchGate, Polarity, RewriteRule, RewriteStage, Stage, StageKind};
pub use pipeline::{FilterPipeline, PipelineResult, Rejection};

// Settings and legacy translation
pub use legacy::{translate, Translation};
pub use settings::{ProviderSettings, RemoteUserSource, Settings};

// Preferences
pub use prefs::{DeferredValue, IdentityMetadata, PreferenceValue, UserPreferences};

// Provider
pub use provider::{
    EnvironmentSource, IdentitySource, RemoteUserProvider, Resolution, ResolvedIdentity,
};
