use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;

use crate::diagnostics::{self, Diagnostic};
use crate::namespaces::Namespace;
use crate::settings::Settings;
use crate::shortcuts::{self, RawShortcut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    ForceCache,
    Reload,
}

impl CacheMode {
    pub fn from_reload(reload: bool) -> Self {
        if reload { Self::Reload } else { Self::ForceCache }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::ForceCache => "cache",
        }
    }
}

/// Transport seam for every remote document the resolver reads. Ok is a 200
/// body; anything else (transport error, other status) is Err.
pub trait ShortcutFetch: Send + Sync {
    fn fetch(&self, url: &str, cache: CacheMode) -> Result<String>;
}

pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms()))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            user_agent: settings.user_agent(),
        })
    }
}

impl ShortcutFetch for HttpFetcher {
    fn fetch(&self, url: &str, cache: CacheMode) -> Result<String> {
        let mut request = self.client.get(url).header("User-Agent", self.user_agent.clone());
        if cache == CacheMode::Reload {
            request = request.header("Cache-Control", "no-cache");
        }
        let response = request
            .send()
            .with_context(|| format!("failed to fetch {url}"))?;
        let status = response.status();
        if status.as_u16() != 200 {
            bail!("HTTP {} while fetching {}", status.as_u16(), url);
        }
        response
            .text()
            .with_context(|| format!("failed to read response body from {url}"))
    }
}

/// Fetch every namespace's shortcut document, normalize the survivors, drop
/// the failures.
///
/// All requests are issued before any result is collected; a failure in one
/// neither cancels nor reorders the others. Namespaces with no URL pass
/// through untouched. Survivor order matches the input order.
pub fn fetch_all(
    namespaces: Vec<Namespace>,
    fetcher: &dyn ShortcutFetch,
    cache: CacheMode,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Namespace> {
    let bodies: Vec<Option<Result<String>>> = thread::scope(|scope| {
        let handles: Vec<_> = namespaces
            .iter()
            .map(|namespace| {
                namespace
                    .url
                    .as_deref()
                    .map(|url| scope.spawn(move || fetcher.fetch(url, cache)))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("fetch thread panicked")))
                })
            })
            .collect()
    });

    let mut survivors = Vec::with_capacity(namespaces.len());
    for (mut namespace, body) in namespaces.into_iter().zip(bodies) {
        let Some(body) = body else {
            survivors.push(namespace);
            continue;
        };
        let url = namespace.url.clone().unwrap_or_default();
        let text = match body {
            Ok(text) => {
                tracing::debug!("{} Success: {}", cache.label(), url);
                text
            }
            Err(error) => {
                diagnostics::record(
                    diagnostics,
                    Diagnostic::FetchFailed {
                        namespace: namespace.name.clone(),
                        url,
                        detail: format!("{error:#}"),
                    },
                );
                continue;
            }
        };
        // An empty document is an empty namespace, not a decode failure; the
        // namespace stays in the sequence.
        let raw: Option<BTreeMap<String, RawShortcut>> = match serde_yaml::from_str(&text) {
            Ok(raw) => raw,
            Err(error) => {
                diagnostics::record(
                    diagnostics,
                    Diagnostic::ParseFailed {
                        namespace: namespace.name.clone(),
                        url,
                        detail: error.to_string(),
                    },
                );
                continue;
            }
        };
        let name = namespace.name.clone();
        namespace.shortcuts = shortcuts::normalize(raw.unwrap_or_default(), &name, diagnostics);
        survivors.push(namespace);
    }
    survivors
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;
    use crate::namespaces::{Namespace, NamespaceKind};

    #[derive(Default)]
    struct MockFetch {
        responses: BTreeMap<String, std::result::Result<String, String>>,
        calls: Mutex<Vec<(String, CacheMode)>>,
    }

    impl MockFetch {
        fn with(responses: &[(&str, std::result::Result<&str, &str>)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .copied()
                    .map(|(url, body)| {
                        (
                            url.to_string(),
                            body.map(str::to_string).map_err(str::to_string),
                        )
                    })
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ShortcutFetch for MockFetch {
        fn fetch(&self, url: &str, cache: CacheMode) -> Result<String> {
            self.calls
                .lock()
                .expect("mock lock")
                .push((url.to_string(), cache));
            match self.responses.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(detail)) => Err(anyhow!("{detail}")),
                None => Err(anyhow!("HTTP 404 while fetching {url}")),
            }
        }
    }

    fn remote_namespace(name: &str, url: &str) -> Namespace {
        Namespace {
            name: name.to_string(),
            kind: NamespaceKind::Site,
            url: Some(url.to_string()),
            shortcuts: BTreeMap::new(),
        }
    }

    #[test]
    fn failed_namespace_is_dropped_and_order_preserved() {
        let fetcher = MockFetch::with(&[
            ("https://example.test/a.yml", Ok("\"a 0\": https://a.test\n")),
            ("https://example.test/c.yml", Ok("\"c 0\": https://c.test\n")),
        ]);
        let namespaces = vec![
            remote_namespace("a", "https://example.test/a.yml"),
            remote_namespace("b", "https://example.test/b.yml"),
            remote_namespace("c", "https://example.test/c.yml"),
        ];
        let mut diagnostics = Vec::new();
        let survivors = fetch_all(namespaces, &fetcher, CacheMode::ForceCache, &mut diagnostics);

        let names: Vec<_> = survivors.iter().map(|ns| ns.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(matches!(
            diagnostics.as_slice(),
            [Diagnostic::FetchFailed { namespace, .. }] if namespace == "b"
        ));
    }

    #[test]
    fn unparsable_document_drops_the_namespace() {
        let fetcher = MockFetch::with(&[(
            "https://example.test/a.yml",
            Ok("\"a 0\": [unclosed\n  nope"),
        )]);
        let namespaces = vec![remote_namespace("a", "https://example.test/a.yml")];
        let mut diagnostics = Vec::new();
        let survivors = fetch_all(namespaces, &fetcher, CacheMode::ForceCache, &mut diagnostics);

        assert!(survivors.is_empty());
        assert!(matches!(
            diagnostics.as_slice(),
            [Diagnostic::ParseFailed { namespace, .. }] if namespace == "a"
        ));
    }

    #[test]
    fn empty_document_yields_an_empty_surviving_namespace() {
        let fetcher = MockFetch::with(&[("https://example.test/a.yml", Ok(""))]);
        let namespaces = vec![remote_namespace("a", "https://example.test/a.yml")];
        let mut diagnostics = Vec::new();
        let survivors = fetch_all(namespaces, &fetcher, CacheMode::ForceCache, &mut diagnostics);

        assert_eq!(survivors.len(), 1);
        assert!(survivors[0].shortcuts.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn namespace_without_url_passes_through_untouched() {
        let mut shortcuts = BTreeMap::new();
        shortcuts.insert(
            "x 0".to_string(),
            crate::shortcuts::Shortcut {
                url: "https://x.test".to_string(),
                ..Default::default()
            },
        );
        let namespaces = vec![Namespace::in_memory("local", shortcuts)];
        let fetcher = MockFetch::default();
        let mut diagnostics = Vec::new();
        let survivors = fetch_all(namespaces, &fetcher, CacheMode::Reload, &mut diagnostics);

        assert_eq!(survivors.len(), 1);
        assert!(survivors[0].shortcuts.contains_key("x 0"));
        assert!(fetcher.calls.lock().expect("mock lock").is_empty());
    }

    #[test]
    fn reload_flag_selects_the_reload_cache_mode() {
        let fetcher = MockFetch::with(&[("https://example.test/a.yml", Ok(""))]);
        let namespaces = vec![remote_namespace("a", "https://example.test/a.yml")];
        let mut diagnostics = Vec::new();
        fetch_all(
            namespaces,
            &fetcher,
            CacheMode::from_reload(true),
            &mut diagnostics,
        );
        let calls = fetcher.calls.lock().expect("mock lock");
        assert_eq!(
            *calls,
            vec![("https://example.test/a.yml".to_string(), CacheMode::Reload)]
        );
    }

    #[test]
    fn normalization_diagnostics_surface_from_fetch() {
        let fetcher = MockFetch::with(&[(
            "https://example.test/a.yml",
            Ok("badkey: https://a.test\n\"g 1\": https://a.test/{%q}\n"),
        )]);
        let namespaces = vec![remote_namespace("a", "https://example.test/a.yml")];
        let mut diagnostics = Vec::new();
        let survivors = fetch_all(namespaces, &fetcher, CacheMode::ForceCache, &mut diagnostics);

        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].shortcuts.len(), 2);
        assert!(matches!(
            diagnostics.as_slice(),
            [Diagnostic::MalformedKeys { namespace, keys }]
                if namespace == "a" && keys == &vec!["badkey".to_string()]
        ));
    }
}
