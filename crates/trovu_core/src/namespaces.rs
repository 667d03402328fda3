use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;
use crate::shortcuts::Shortcut;

/// `github: "."` in a namespace reference means "the current Github user".
pub const CURRENT_USER_TOKEN: &str = ".";

/// Tokens up to this many characters name a site namespace; longer bare
/// tokens are Github handles.
const SITE_TOKEN_MAX_CHARS: usize = 3;

/// A namespace as the user wrote it: a short token, a Github reference, or a
/// fully spelled-out custom source.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NamespaceRef {
    Token(String),
    Github {
        github: String,
        #[serde(default)]
        name: Option<String>,
    },
    Custom {
        url: String,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    Site,
    User,
}

/// A resolved namespace. `shortcuts` stays empty until the fetch stage fills
/// it; a namespace whose fetch or parse fails is dropped from the sequence
/// entirely, never left half-populated.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Namespace {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NamespaceKind,
    pub url: Option<String>,
    pub shortcuts: BTreeMap<String, Shortcut>,
}

impl Namespace {
    /// An in-memory namespace: no URL, passed through the fetch stage
    /// untouched.
    pub fn in_memory(name: &str, shortcuts: BTreeMap<String, Shortcut>) -> Self {
        Self {
            name: name.to_string(),
            kind: NamespaceKind::User,
            url: None,
            shortcuts,
        }
    }
}

/// Resolve a reference into a fetchable namespace record.
///
/// Malformed references (a `.` handle without a current Github user) are a
/// caller contract violation and terminate resolution.
pub fn resolve(
    reference: &NamespaceRef,
    current_github: Option<&str>,
    settings: &Settings,
) -> Result<Namespace> {
    match reference {
        NamespaceRef::Token(token) if token.chars().count() <= SITE_TOKEN_MAX_CHARS => {
            Ok(site_namespace(token, settings))
        }
        NamespaceRef::Token(token) => github_namespace(token, None, current_github, settings),
        NamespaceRef::Github { github, name } => {
            github_namespace(github, name.as_deref(), current_github, settings)
        }
        NamespaceRef::Custom { url, name } => Ok(Namespace {
            name: name.clone(),
            kind: NamespaceKind::User,
            url: Some(url.clone()),
            shortcuts: BTreeMap::new(),
        }),
    }
}

/// Split a comma-joined fragment value (`o,en,.us`) into references.
pub fn refs_from_comma_list(raw: &str) -> Vec<NamespaceRef> {
    raw.split(',')
        .map(|token| NamespaceRef::Token(token.to_string()))
        .collect()
}

pub fn config_url_for_github(handle: &str, settings: &Settings) -> String {
    format!(
        "{}/{}/trovu-data-user/master/config.yml",
        settings.raw_github_base_url(),
        handle
    )
}

fn shortcuts_url_for_github(handle: &str, settings: &Settings) -> String {
    format!(
        "{}/{}/trovu-data-user/master/shortcuts.yml",
        settings.raw_github_base_url(),
        handle
    )
}

fn site_namespace(name: &str, settings: &Settings) -> Namespace {
    Namespace {
        name: name.to_string(),
        kind: NamespaceKind::Site,
        url: Some(format!("{}/shortcuts/{}.yml", settings.site_base_url(), name)),
        shortcuts: BTreeMap::new(),
    }
}

fn github_namespace(
    handle: &str,
    name: Option<&str>,
    current_github: Option<&str>,
    settings: &Settings,
) -> Result<Namespace> {
    let handle = if handle == CURRENT_USER_TOKEN {
        match current_github {
            Some(current) => current,
            None => bail!("namespace reference '.' requires a github user in the environment"),
        }
    } else {
        handle
    };
    Ok(Namespace {
        name: name.unwrap_or(handle).to_string(),
        kind: NamespaceKind::User,
        url: Some(shortcuts_url_for_github(handle, settings)),
        shortcuts: BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn short_token_resolves_to_site_namespace() {
        let namespace = resolve(&NamespaceRef::Token("en".to_string()), None, &settings())
            .expect("resolve");
        assert_eq!(namespace.name, "en");
        assert_eq!(namespace.kind, NamespaceKind::Site);
        let url = namespace.url.expect("url");
        assert!(url.ends_with("/shortcuts/en.yml"));
    }

    #[test]
    fn dot_prefixed_country_token_is_a_site_namespace() {
        let namespace = resolve(&NamespaceRef::Token(".us".to_string()), None, &settings())
            .expect("resolve");
        assert_eq!(namespace.kind, NamespaceKind::Site);
        assert!(namespace.url.expect("url").ends_with("/shortcuts/.us.yml"));
    }

    #[test]
    fn long_token_resolves_to_github_user_namespace() {
        let namespace = resolve(
            &NamespaceRef::Token("octocat".to_string()),
            None,
            &settings(),
        )
        .expect("resolve");
        assert_eq!(namespace.name, "octocat");
        assert_eq!(namespace.kind, NamespaceKind::User);
        assert!(
            namespace
                .url
                .expect("url")
                .ends_with("octocat/trovu-data-user/master/shortcuts.yml")
        );
    }

    #[test]
    fn dot_github_reference_resolves_to_current_user() {
        let namespace = resolve(
            &NamespaceRef::Github {
                github: ".".to_string(),
                name: None,
            },
            Some("alice"),
            &settings(),
        )
        .expect("resolve");
        assert_eq!(namespace.name, "alice");
        assert!(
            namespace
                .url
                .expect("url")
                .contains("/alice/trovu-data-user/")
        );
    }

    #[test]
    fn dot_github_reference_without_current_user_is_an_error() {
        let error = resolve(
            &NamespaceRef::Github {
                github: ".".to_string(),
                name: None,
            },
            None,
            &settings(),
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("requires a github user"));
    }

    #[test]
    fn custom_reference_passes_url_through() {
        let namespace = resolve(
            &NamespaceRef::Custom {
                url: "https://example.test/mine.yml".to_string(),
                name: "mine".to_string(),
            },
            None,
            &settings(),
        )
        .expect("resolve");
        assert_eq!(namespace.name, "mine");
        assert_eq!(namespace.kind, NamespaceKind::User);
        assert_eq!(
            namespace.url.as_deref(),
            Some("https://example.test/mine.yml")
        );
    }

    #[test]
    fn github_reference_uses_explicit_name() {
        let namespace = resolve(
            &NamespaceRef::Github {
                github: "octocat".to_string(),
                name: Some("work".to_string()),
            },
            None,
            &settings(),
        )
        .expect("resolve");
        assert_eq!(namespace.name, "work");
    }

    #[test]
    fn refs_parse_from_comma_list() {
        let refs = refs_from_comma_list("o,en,.us");
        assert_eq!(
            refs,
            vec![
                NamespaceRef::Token("o".to_string()),
                NamespaceRef::Token("en".to_string()),
                NamespaceRef::Token(".us".to_string()),
            ]
        );
    }

    #[test]
    fn refs_deserialize_from_yaml_list() {
        let refs: Vec<NamespaceRef> = serde_yaml::from_str(
            r#"
- o
- github: "."
- url: https://example.test/custom.yml
  name: custom
"#,
        )
        .expect("parse refs");
        assert_eq!(refs[0], NamespaceRef::Token("o".to_string()));
        assert_eq!(
            refs[1],
            NamespaceRef::Github {
                github: ".".to_string(),
                name: None,
            }
        );
        assert_eq!(
            refs[2],
            NamespaceRef::Custom {
                url: "https://example.test/custom.yml".to_string(),
                name: "custom".to_string(),
            }
        );
    }
}
