//! Rewrite strategy selection.
//!
//! A strategy is either named (`"laravel"`) or given inline as
//! `{ base = "codeigniter", options = { ... } }`. Names are parsed into the
//! closed [`Strategy`] enum at startup; unknown names are rejected there.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Known rewrite strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Serve `/about` from `about.php` when it exists.
    ExtensionHiding,
    /// Redirect `/about.php` to `/about`.
    PrettyUrls,
    /// Route unmatched paths to the front controller as path segments.
    FrontController,
    /// WordPress permalinks.
    WordPress,
    /// Laravel `public/index.php` routing.
    Laravel,
    /// CodeIgniter `index.php?url=...` routing.
    CodeIgniter,
    /// Symfony front controller routing.
    Symfony,
    /// Fully option-driven handler.
    Custom,
}

impl Strategy {
    /// All strategies, in the order they are documented.
    pub const ALL: [Strategy; 8] = [
        Strategy::ExtensionHiding,
        Strategy::PrettyUrls,
        Strategy::FrontController,
        Strategy::WordPress,
        Strategy::Laravel,
        Strategy::CodeIgniter,
        Strategy::Symfony,
        Strategy::Custom,
    ];

    /// The configuration name of this strategy.
    pub const fn as_str(self) -> &'static str {
        match self {
            Strategy::ExtensionHiding => "extension-hiding",
            Strategy::PrettyUrls => "pretty-urls",
            Strategy::FrontController => "front-controller",
            Strategy::WordPress => "wordpress",
            Strategy::Laravel => "laravel",
            Strategy::CodeIgniter => "codeigniter",
            Strategy::Symfony => "symfony",
            Strategy::Custom => "custom",
        }
    }

    /// Options this strategy applies before user-supplied options.
    pub fn defaults(self) -> RewriteOptions {
        match self {
            Strategy::ExtensionHiding => RewriteOptions {
                extension_hiding: Some(true),
                rewrite_method: Some(RewriteMethod::Nothing),
                ..RewriteOptions::default()
            },
            Strategy::FrontController
            | Strategy::WordPress
            | Strategy::Laravel
            | Strategy::Symfony => RewriteOptions {
                front_controller: Some("index.php".into()),
                rewrite_method: Some(RewriteMethod::Path),
                ..RewriteOptions::default()
            },
            Strategy::CodeIgniter => RewriteOptions {
                front_controller: Some("index.php".into()),
                rewrite_method: Some(RewriteMethod::Query),
                query_param: Some("url".into()),
                ..RewriteOptions::default()
            },
            Strategy::PrettyUrls | Strategy::Custom => RewriteOptions::default(),
        }
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ConfigError::unknown_strategy(s))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How unmatched paths are handed to the front controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMethod {
    /// `/blog/1` becomes `/index.php/blog/1`.
    #[default]
    Path,
    /// `/blog/1` becomes `/index.php` with `PATH_INFO=/blog/1`.
    PathInfo,
    /// Leave the URL alone.
    Nothing,
    /// `/blog/1` becomes `/index.php?url=blog%2F1`.
    Query,
}

/// Rewrite options as they appear in configuration.
///
/// Every field is optional so that strategy defaults can be layered under
/// user-supplied values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteOptions {
    /// Directory that request paths are resolved against.
    #[serde(default, alias = "baseDir", skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// Front controller script name, relative to `base_dir`.
    #[serde(
        default,
        alias = "frontController",
        skip_serializing_if = "Option::is_none"
    )]
    pub front_controller: Option<String>,

    /// Script file extension, including the dot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    /// Try `url + extension` before falling back.
    #[serde(
        default,
        alias = "extensionHiding",
        skip_serializing_if = "Option::is_none"
    )]
    pub extension_hiding: Option<bool>,

    /// Redirect URLs that carry the extension.
    #[serde(default, alias = "prettyUrls", skip_serializing_if = "Option::is_none")]
    pub pretty_urls: Option<bool>,

    /// Front controller hand-off style.
    #[serde(
        default,
        alias = "rewriteMethod",
        skip_serializing_if = "Option::is_none"
    )]
    pub rewrite_method: Option<RewriteMethod>,

    /// Query parameter name for [`RewriteMethod::Query`].
    #[serde(default, alias = "queryParam", skip_serializing_if = "Option::is_none")]
    pub query_param: Option<String>,
}

impl RewriteOptions {
    /// Fill every unset field from `defaults`.
    #[must_use]
    pub fn or(self, defaults: RewriteOptions) -> RewriteOptions {
        RewriteOptions {
            base_dir: self.base_dir.or(defaults.base_dir),
            front_controller: self.front_controller.or(defaults.front_controller),
            extension: self.extension.or(defaults.extension),
            extension_hiding: self.extension_hiding.or(defaults.extension_hiding),
            pretty_urls: self.pretty_urls.or(defaults.pretty_urls),
            rewrite_method: self.rewrite_method.or(defaults.rewrite_method),
            query_param: self.query_param.or(defaults.query_param),
        }
    }
}

/// Strategy selector as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StrategyConfig {
    /// A bare strategy name.
    Named(String),
    /// An inline `{ base, options }` object.
    Inline {
        /// Strategy name the options apply to.
        #[serde(default)]
        base: Option<String>,
        /// Overrides for the strategy's defaults.
        #[serde(default)]
        options: Option<RewriteOptions>,
    },
}

impl StrategyConfig {
    /// Resolve the selector into a strategy and the user's options.
    ///
    /// # Errors
    ///
    /// Fails if the name is unknown or an inline object has no `base`.
    pub fn resolve(&self) -> Result<(Strategy, RewriteOptions), ConfigError> {
        match self {
            StrategyConfig::Named(name) => Ok((name.parse()?, RewriteOptions::default())),
            StrategyConfig::Inline { base, options } => {
                let base = base
                    .as_deref()
                    .ok_or_else(|| ConfigError::missing_field("rewrite.base"))?;
                Ok((base.parse()?, options.clone().unwrap_or_default()))
            }
        }
    }
}

impl From<Strategy> for StrategyConfig {
    fn from(strategy: Strategy) -> Self {
        StrategyConfig::Named(strategy.as_str().to_string())
    }
}
