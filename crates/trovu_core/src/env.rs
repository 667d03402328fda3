use std::env;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{self, Diagnostic};
use crate::fetch::{CacheMode, ShortcutFetch, fetch_all};
use crate::fragment;
use crate::namespaces::{self, Namespace, NamespaceRef};
use crate::settings::Settings;
use crate::shortcuts;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_COUNTRY: &str = "us";
pub const DEFAULT_SITE_NAMESPACE: &str = "o";

/// Environment parameters as decoded from a URL fragment, before defaults
/// and the remote user config are applied. Absent is not the same as empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvParams {
    pub language: Option<String>,
    pub country: Option<String>,
    pub namespaces: Option<Vec<NamespaceRef>>,
    pub github: Option<String>,
    pub debug: bool,
    pub query: Option<String>,
    pub default_keyword: Option<String>,
    pub status: Option<String>,
}

impl EnvParams {
    pub fn from_fragment(fragment_str: &str) -> Self {
        let mut flat = fragment::decode_flat(fragment_str);
        // `namespaces=o,en,.us` or the structured `namespaces[]=o&namespaces[]=en`
        let namespaces = match flat.remove("namespaces") {
            Some(raw) => Some(namespaces::refs_from_comma_list(&raw)),
            None => bracket_namespace_refs(fragment_str),
        };
        Self {
            language: flat.remove("language"),
            country: flat.remove("country"),
            namespaces,
            github: flat.remove("github").filter(|value| !value.is_empty()),
            debug: flat.remove("debug").is_some_and(|value| !value.is_empty()),
            query: flat.remove("query"),
            default_keyword: flat.remove("defaultKeyword"),
            status: flat.remove("status"),
        }
    }

    // A query starting with "debug:" turns debug mode on and is stripped.
    fn promote_debug_query(mut self) -> Self {
        let stripped = self
            .query
            .as_deref()
            .and_then(|query| query.strip_prefix("debug:"))
            .map(str::to_string);
        if let Some(stripped) = stripped {
            self.debug = true;
            self.query = Some(stripped);
        }
        self
    }

    // Explicit params keep precedence over the user's remote config.
    fn overlay_config(self, config: UserConfig) -> Self {
        Self {
            language: self.language.or(config.language),
            country: self.country.or(config.country),
            namespaces: self.namespaces.or(config.namespaces),
            github: self.github,
            debug: self.debug,
            query: self.query,
            default_keyword: self.default_keyword.or(config.default_keyword),
            status: self.status,
        }
    }
}

/// The remote per-user config document, a flat mapping overlaid onto the
/// environment.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserConfig {
    pub language: Option<String>,
    pub country: Option<String>,
    pub namespaces: Option<Vec<NamespaceRef>>,
    #[serde(rename = "defaultKeyword")]
    pub default_keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpInfo {
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

/// A fully populated environment: effective parameters plus the ordered,
/// fetched, decorated namespace sequence.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Environment {
    pub language: String,
    pub country: String,
    pub github: Option<String>,
    pub debug: bool,
    pub query: Option<String>,
    pub default_keyword: Option<String>,
    pub status: Option<String>,
    pub namespaces: Vec<Namespace>,
}

impl Environment {
    /// Effective parameters for re-encoding into the address fragment. With
    /// a Github user set, language/country/defaultKeyword are implied by the
    /// remote config and left out.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let github = self.github.as_deref().filter(|value| !value.is_empty());
        match github {
            Some(github) => params.push(("github".to_string(), github.to_string())),
            None => {
                params.push(("language".to_string(), self.language.clone()));
                params.push(("country".to_string(), self.country.clone()));
            }
        }
        if self.debug {
            params.push(("debug".to_string(), "1".to_string()));
        }
        if let Some(default_keyword) = self
            .default_keyword
            .as_deref()
            .filter(|value| !value.is_empty())
        {
            if github.is_none() {
                params.push(("defaultKeyword".to_string(), default_keyword.to_string()));
            }
        }
        if let Some(status) = self.status.as_deref().filter(|value| !value.is_empty()) {
            params.push(("status".to_string(), status.to_string()));
        }
        if let Some(query) = self.query.as_deref().filter(|value| !value.is_empty()) {
            params.push(("query".to_string(), query.to_string()));
        }
        params
    }

    pub fn param_str(&self) -> String {
        fragment::encode_pairs(&self.to_params())
    }
}

#[derive(Debug, Serialize)]
pub struct Resolution {
    pub env: Environment,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Resolver<'a> {
    fetcher: &'a dyn ShortcutFetch,
    settings: &'a Settings,
    locale: Option<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(fetcher: &'a dyn ShortcutFetch, settings: &'a Settings) -> Self {
        Self {
            fetcher,
            settings,
            locale: system_locale(),
        }
    }

    /// Override the detected system locale (tests, CLI flags).
    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    pub fn resolve_fragment(&self, fragment_str: &str, reload: bool) -> Result<Resolution> {
        self.resolve(EnvParams::from_fragment(fragment_str), reload)
    }

    /// Populate the environment: user config, defaults, namespace
    /// resolution, concurrent fetch, merge. Always returns a best-effort
    /// result; per-namespace failures are collected as diagnostics.
    pub fn resolve(&self, params: EnvParams, reload: bool) -> Result<Resolution> {
        let cache = CacheMode::from_reload(reload);
        let mut diagnostics = Vec::new();

        let params = params.promote_debug_query();
        // The config fetch must finish before defaults are computed; it can
        // change which namespaces get resolved below.
        let params = self.apply_user_config(params, cache, &mut diagnostics);
        let (language, country) = self.effective_language_and_country(&params, &mut diagnostics);

        let refs = params
            .namespaces
            .clone()
            .unwrap_or_else(|| default_namespace_refs(&language, &country));

        let mut resolved = Vec::with_capacity(refs.len());
        for reference in &refs {
            resolved.push(namespaces::resolve(
                reference,
                params.github.as_deref(),
                self.settings,
            )?);
        }

        let mut namespaces = fetch_all(resolved, self.fetcher, cache, &mut diagnostics);
        shortcuts::decorate_namespaces(&mut namespaces);

        Ok(Resolution {
            env: Environment {
                language,
                country,
                github: params.github,
                debug: params.debug,
                query: params.query,
                default_keyword: params.default_keyword,
                status: params.status,
                namespaces,
            },
            diagnostics,
        })
    }

    fn apply_user_config(
        &self,
        params: EnvParams,
        cache: CacheMode,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> EnvParams {
        let Some(github) = params.github.clone() else {
            return params;
        };
        let url = namespaces::config_url_for_github(&github, self.settings);
        let body = match self.fetcher.fetch(&url, cache) {
            Ok(body) => body,
            Err(error) => {
                diagnostics::record(
                    diagnostics,
                    Diagnostic::ConfigFetchFailed {
                        url,
                        detail: format!("{error:#}"),
                    },
                );
                return params;
            }
        };
        match serde_yaml::from_str::<UserConfig>(&body) {
            Ok(config) => params.overlay_config(config),
            Err(error) => {
                diagnostics::record(
                    diagnostics,
                    Diagnostic::ConfigFetchFailed {
                        url,
                        detail: error.to_string(),
                    },
                );
                params
            }
        }
    }

    // Explicit values win untouched; detected ones are lowercased.
    fn effective_language_and_country(
        &self,
        params: &EnvParams,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> (String, String) {
        let mut language = params.language.clone();
        let mut country = params.country.clone();
        if language.is_none() || country.is_none() {
            let (detected_language, detected_country) =
                self.detect_language_and_country(country.is_none(), diagnostics);
            language = language.or(Some(detected_language));
            country = country.or(Some(detected_country));
        }
        (
            language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            country.unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
        )
    }

    fn detect_language_and_country(
        &self,
        need_ip_country: bool,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> (String, String) {
        let (language, mut country) = locale_language_and_country(self.locale.as_deref());
        if country.is_none() && need_ip_country {
            country = self.country_from_ip(diagnostics);
        }
        (
            language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
                .to_lowercase(),
            country
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string())
                .to_lowercase(),
        )
    }

    fn country_from_ip(&self, diagnostics: &mut Vec<Diagnostic>) -> Option<String> {
        let url = self.settings.ip_info_url();
        let body = match self.fetcher.fetch(&url, CacheMode::ForceCache) {
            Ok(body) => body,
            Err(error) => {
                diagnostics::record(
                    diagnostics,
                    Diagnostic::IpLookupFailed {
                        url,
                        detail: format!("{error:#}"),
                    },
                );
                return None;
            }
        };
        match serde_json::from_str::<IpInfo>(&body) {
            Ok(info) => info.country_code,
            Err(error) => {
                diagnostics::record(
                    diagnostics,
                    Diagnostic::IpLookupFailed {
                        url,
                        detail: error.to_string(),
                    },
                );
                None
            }
        }
    }
}

fn bracket_namespace_refs(fragment_str: &str) -> Option<Vec<NamespaceRef>> {
    let nested = fragment::decode_nested(fragment_str);
    let fragment::ParamNode::List(items) = nested.get("namespaces")? else {
        return None;
    };
    Some(
        items
            .iter()
            .filter_map(|item| item.as_text())
            .map(|token| NamespaceRef::Token(token.to_string()))
            .collect(),
    )
}

pub fn default_namespace_refs(language: &str, country: &str) -> Vec<NamespaceRef> {
    vec![
        NamespaceRef::Token(DEFAULT_SITE_NAMESPACE.to_string()),
        NamespaceRef::Token(language.to_string()),
        NamespaceRef::Token(format!(".{country}")),
    ]
}

pub fn system_locale() -> Option<String> {
    for name in ["LC_ALL", "LANG"] {
        if let Ok(value) = env::var(name) {
            let trimmed = value.trim();
            if !trimmed.is_empty() && trimmed != "C" && trimmed != "POSIX" {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

// "en_US.UTF-8" or "en-US" -> ("en", "US")
fn locale_language_and_country(locale: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(locale) = locale else {
        return (None, None);
    };
    let base = locale.split('.').next().unwrap_or(locale);
    let mut parts = base.splitn(2, ['_', '-']);
    let language = parts
        .next()
        .filter(|part| !part.is_empty())
        .map(str::to_string);
    let country = parts
        .next()
        .filter(|part| !part.is_empty())
        .map(str::to_string);
    (language, country)
}
