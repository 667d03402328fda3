use std::fmt;

use serde::Serialize;

/// Recoverable failure collected during environment resolution.
///
/// Resolution never aborts on these; they degrade coverage (fewer namespaces
/// or shortcuts) and are carried alongside the merged result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    FetchFailed {
        namespace: String,
        url: String,
        detail: String,
    },
    ParseFailed {
        namespace: String,
        url: String,
        detail: String,
    },
    MalformedKeys {
        namespace: String,
        keys: Vec<String>,
    },
    ArgumentCountMismatch {
        namespace: String,
        key: String,
        declared: u32,
        found: usize,
    },
    ConfigFetchFailed {
        url: String,
        detail: String,
    },
    IpLookupFailed {
        url: String,
        detail: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed {
                namespace,
                url,
                detail,
            } => {
                write!(f, "failed to fetch namespace '{namespace}' from {url}: {detail}")
            }
            Self::ParseFailed {
                namespace,
                url,
                detail,
            } => {
                write!(f, "error parsing {url} for namespace '{namespace}': {detail}")
            }
            Self::MalformedKeys { namespace, keys } => {
                write!(
                    f,
                    "incorrect keys found in namespace '{namespace}'; keys must have the form 'KEYWORD ARGCOUNT', e.g. 'foo 0': {}",
                    keys.join(", ")
                )
            }
            Self::ArgumentCountMismatch {
                namespace,
                key,
                declared,
                found,
            } => {
                write!(
                    f,
                    "shortcut '{key}' in namespace '{namespace}' declares {declared} argument(s) but its url template names {found}"
                )
            }
            Self::ConfigFetchFailed { url, detail } => {
                write!(f, "failed to read user config from {url}: {detail}")
            }
            Self::IpLookupFailed { url, detail } => {
                write!(f, "failed to look up country from {url}: {detail}")
            }
        }
    }
}

/// Record a diagnostic: emit it on the log channel and keep it for the caller.
pub fn record(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    tracing::warn!("{}", diagnostic);
    diagnostics.push(diagnostic);
}
