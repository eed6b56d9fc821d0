//! URL rewrite engine.
//!
//! A [`Rewriter`] turns a request path into a [`RouteDecision`]. It is built
//! once from configuration and shared across requests. Strategy names map to
//! three handler shapes:
//!
//! - `pretty-urls`: redirect `*.php` to the bare path, pass everything else
//! - every other strategy: the option-driven custom handler, with the
//!   strategy's own defaults layered under the user's options
//! - no strategy at all: direct addressing of scripts and directory indexes
//!
//! Paths are resolved lexically under the base directory. A path whose `..`
//! segments would climb above it is answered with [`RouteDecision::NotFound`].

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tracing::{debug, info};

use script_gateway_common::{ConfigError, RewriteMethod, RewriteOptions, Strategy, StrategyConfig};

use crate::lookup;

/// Characters `encodeURIComponent` leaves alone, everything else is escaped.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Characters escaped when a decoded path is put back into a URL.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const DEFAULT_FRONT_CONTROLLER: &str = "index.php";
const DEFAULT_EXTENSION: &str = ".php";
const DEFAULT_QUERY_PARAM: &str = "url";

/// Outcome of evaluating a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Run `script_path`, presenting `url` to the interpreter.
    Execute {
        /// Resolved script file.
        script_path: PathBuf,
        /// Rewritten request URL (path and optional query).
        url: String,
        /// Original path for PATH_INFO style hand-off.
        path_info: Option<String>,
    },
    /// Redirect the client.
    Redirect {
        /// Target location, used verbatim.
        location: String,
    },
    /// Serve from the static file layer, which 404s if nothing is there.
    Static {
        /// The request path, unchanged.
        url: String,
    },
    /// Answer with the standard not-found response.
    NotFound,
}

impl RouteDecision {
    fn execute(script_path: PathBuf, url: impl Into<String>) -> Self {
        RouteDecision::Execute {
            script_path,
            url: url.into(),
            path_info: None,
        }
    }

    fn fallthrough(url: &str) -> Self {
        RouteDecision::Static {
            url: url.to_string(),
        }
    }

    /// Re-attach the inbound query string to the rewritten URL.
    ///
    /// The engine only sees the path. Execute URLs and redirect locations get
    /// the query appended, joined with `&` when the rewrite already added one.
    /// Static URLs are left alone; the static layer reads the original URI.
    #[must_use]
    pub fn with_query(self, query: Option<&str>) -> Self {
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return self;
        };

        match self {
            RouteDecision::Execute {
                script_path,
                url,
                path_info,
            } => RouteDecision::Execute {
                script_path,
                url: append_query(&url, query),
                path_info,
            },
            RouteDecision::Redirect { location } => RouteDecision::Redirect {
                location: append_query(&location, query),
            },
            other => other,
        }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RouteDecision::Execute { .. } => "execute",
            RouteDecision::Redirect { .. } => "redirect",
            RouteDecision::Static { .. } => "static",
            RouteDecision::NotFound => "not_found",
        }
    }
}

fn append_query(url: &str, query: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

/// Fully resolved options for the custom handler.
#[derive(Debug, Clone)]
struct CustomRules {
    base_dir: PathBuf,
    front_controller: String,
    extension: String,
    extension_hiding: bool,
    pretty_urls: bool,
    rewrite_method: RewriteMethod,
    query_param: String,
}

#[derive(Debug, Clone)]
enum Mode {
    PrettyUrls { extension: String },
    Custom(CustomRules),
    Direct {
        base_dir: PathBuf,
        front_controller: String,
        extension: String,
    },
}

/// URL rewrite handler.
///
/// # Example
///
/// ```ignore
/// use script_gateway_common::{RewriteOptions, Strategy};
/// use script_gateway_core::{Rewriter, RouteDecision};
///
/// let options = RewriteOptions {
///     base_dir: Some("/srv/www".into()),
///     ..Default::default()
/// };
/// let rewriter = Rewriter::create(Strategy::Laravel, options)?;
///
/// let decision = rewriter.rewrite("/blog/post/123").await;
/// // Execute { script_path: "/srv/www/index.php", url: "/index.php/blog/post/123", .. }
/// ```
#[derive(Debug, Clone)]
pub struct Rewriter {
    strategy: Option<Strategy>,
    mode: Mode,
}

impl Rewriter {
    /// Build a handler for a named strategy.
    ///
    /// User options override the strategy's defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] if a filesystem-backed strategy
    /// has no `base_dir`, or [`ConfigError::InvalidOption`] for empty names.
    pub fn create(strategy: Strategy, options: RewriteOptions) -> Result<Self, ConfigError> {
        let options = options.or(strategy.defaults());

        let mode = if strategy == Strategy::PrettyUrls {
            Mode::PrettyUrls {
                extension: validated_extension(options.extension)?,
            }
        } else {
            Mode::Custom(CustomRules {
                base_dir: options
                    .base_dir
                    .ok_or_else(|| ConfigError::missing_field("rewrite.options.base_dir"))?,
                front_controller: validated_front_controller(options.front_controller)?,
                extension: validated_extension(options.extension)?,
                extension_hiding: options.extension_hiding.unwrap_or(false),
                pretty_urls: options.pretty_urls.unwrap_or(false),
                rewrite_method: options.rewrite_method.unwrap_or_default(),
                query_param: validated_query_param(options.query_param)?,
            })
        };

        info!(strategy = %strategy, "Rewrite strategy configured");

        Ok(Self {
            strategy: Some(strategy),
            mode,
        })
    }

    /// Build a handler from a configuration selector.
    ///
    /// `base_dir` defaults to `docroot` when the options leave it unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown, the inline object has no
    /// `base`, or the options are invalid.
    pub fn from_config(config: &StrategyConfig, docroot: &Path) -> Result<Self, ConfigError> {
        let (strategy, options) = config.resolve()?;
        let options = options.or(RewriteOptions {
            base_dir: Some(docroot.to_path_buf()),
            ..RewriteOptions::default()
        });
        Self::create(strategy, options)
    }

    /// Build the handler used when no strategy is configured.
    ///
    /// Existing scripts are executed where they are addressed, and a
    /// directory URL runs that directory's `index.php` if there is one.
    pub fn direct(docroot: impl Into<PathBuf>) -> Self {
        Self {
            strategy: None,
            mode: Mode::Direct {
                base_dir: docroot.into(),
                front_controller: DEFAULT_FRONT_CONTROLLER.to_string(),
                extension: DEFAULT_EXTENSION.to_string(),
            },
        }
    }

    /// The configured strategy, or `None` in direct mode.
    pub fn strategy(&self) -> Option<Strategy> {
        self.strategy
    }

    /// The script file extension, including the dot.
    pub fn extension(&self) -> &str {
        match &self.mode {
            Mode::PrettyUrls { extension }
            | Mode::Direct { extension, .. }
            | Mode::Custom(CustomRules { extension, .. }) => extension,
        }
    }

    /// Returns `true` if `path` names a script rather than a static asset.
    ///
    /// The path is percent-decoded first, so `/x.ph%70` is a script too.
    /// `.php` files count as scripts even when another extension is
    /// configured.
    pub fn is_script_path(&self, path: &str) -> bool {
        let decoded = decode_path(path);
        decoded.ends_with(self.extension()) || decoded.ends_with(DEFAULT_EXTENSION)
    }

    /// Evaluate a request path (no query string).
    pub async fn rewrite(&self, url: &str) -> RouteDecision {
        let decision = match &self.mode {
            Mode::PrettyUrls { extension } => pretty_urls(url, extension),
            Mode::Custom(rules) => rules.rewrite(url).await,
            Mode::Direct {
                base_dir,
                front_controller,
                extension,
            } => direct(url, base_dir, front_controller, extension).await,
        };

        debug!(url = %url, decision = decision.kind(), "Rewrite evaluated");
        decision
    }
}

impl CustomRules {
    /// Every check runs on the decoded path; URLs handed on keep the
    /// request's own encoding.
    async fn rewrite(&self, url: &str) -> RouteDecision {
        let path = decode_path(url);
        let Some(requested) = resolve_under(&self.base_dir, &path) else {
            return RouteDecision::NotFound;
        };

        // Script addressed with its extension.
        if let Some(clean) = path.strip_suffix(self.extension.as_str()) {
            if self.pretty_urls {
                return RouteDecision::Redirect {
                    location: encode_path(clean),
                };
            }
            if lookup::is_file(&requested).await {
                return RouteDecision::execute(requested, url);
            }
        }

        let front_controller = self.base_dir.join(&self.front_controller);

        // Direct hits on the front controller bypass all rewriting.
        if path.strip_prefix('/') == Some(self.front_controller.as_str()) {
            return RouteDecision::execute(front_controller, url);
        }

        if self.extension_hiding {
            let with_extension = format!("{path}{}", self.extension);
            if let Some(script) = resolve_under(&self.base_dir, &with_extension) {
                if lookup::is_file(&script).await {
                    return RouteDecision::execute(script, format!("{url}{}", self.extension));
                }
            }
        }

        let status = lookup::check_path(&requested).await;
        if status.exists && status.is_file {
            return RouteDecision::fallthrough(url);
        }

        let controller_url = format!("/{}", self.front_controller);
        match self.rewrite_method {
            RewriteMethod::Path => {
                RouteDecision::execute(front_controller, format!("{controller_url}{url}"))
            }
            RewriteMethod::PathInfo => RouteDecision::Execute {
                script_path: front_controller,
                url: controller_url,
                path_info: Some(path.into_owned()),
            },
            RewriteMethod::Nothing => RouteDecision::fallthrough(url),
            RewriteMethod::Query => {
                let route = path.strip_prefix('/').unwrap_or(&path);
                let encoded = utf8_percent_encode(route, URI_COMPONENT);
                RouteDecision::execute(
                    front_controller,
                    format!("{controller_url}?{}={encoded}", self.query_param),
                )
            }
        }
    }
}

fn pretty_urls(url: &str, extension: &str) -> RouteDecision {
    match decode_path(url).strip_suffix(extension) {
        Some(clean) => RouteDecision::Redirect {
            location: encode_path(clean),
        },
        None => RouteDecision::fallthrough(url),
    }
}

async fn direct(
    url: &str,
    base_dir: &Path,
    front_controller: &str,
    extension: &str,
) -> RouteDecision {
    let path = decode_path(url);
    let Some(requested) = resolve_under(base_dir, &path) else {
        return RouteDecision::NotFound;
    };

    let status = lookup::check_path(&requested).await;
    if status.is_file && path.ends_with(extension) {
        return RouteDecision::execute(requested, url);
    }

    if status.is_dir {
        let index = requested.join(front_controller);
        if lookup::is_file(&index).await {
            let index_url = format!("{}/{front_controller}", url.trim_end_matches('/'));
            return RouteDecision::execute(index, index_url);
        }
    }

    RouteDecision::fallthrough(url)
}

fn decode_path(url: &str) -> Cow<'_, str> {
    percent_decode_str(url).decode_utf8_lossy()
}

fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH).to_string()
}

/// Resolve a decoded URL path under `base`.
///
/// Returns `None` if `..` segments would leave `base`.
fn resolve_under(base: &Path, path: &str) -> Option<PathBuf> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s if s.contains('\0') => return None,
            s => segments.push(s),
        }
    }

    let mut resolved = base.to_path_buf();
    resolved.extend(segments);
    Some(resolved)
}

fn validated_extension(extension: Option<String>) -> Result<String, ConfigError> {
    let extension = extension.unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    if extension.is_empty() {
        return Err(ConfigError::invalid_option("extension must not be empty"));
    }
    Ok(extension)
}

fn validated_front_controller(front_controller: Option<String>) -> Result<String, ConfigError> {
    let front_controller =
        front_controller.unwrap_or_else(|| DEFAULT_FRONT_CONTROLLER.to_string());
    if front_controller.is_empty() || front_controller.starts_with('/') {
        return Err(ConfigError::invalid_option(format!(
            "front_controller must be a relative file name, got '{front_controller}'"
        )));
    }
    Ok(front_controller)
}

fn validated_query_param(query_param: Option<String>) -> Result<String, ConfigError> {
    let query_param = query_param.unwrap_or_else(|| DEFAULT_QUERY_PARAM.to_string());
    if query_param.is_empty() {
        return Err(ConfigError::invalid_option("query_param must not be empty"));
    }
    Ok(query_param)
}
