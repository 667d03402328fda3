use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{self, Diagnostic};
use crate::namespaces::Namespace;

/// A parsed `"KEYWORD ARGCOUNT"` composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShortcutKey {
    pub keyword: String,
    pub argument_count: u32,
}

impl ShortcutKey {
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((keyword, count)) = raw.split_once(' ') else {
            bail!("shortcut key '{raw}' must have the form 'KEYWORD ARGCOUNT'");
        };
        if keyword.is_empty() || keyword.contains(char::is_whitespace) {
            bail!("shortcut key '{raw}' must start with a single non-space keyword");
        }
        let argument_count = count
            .parse::<u32>()
            .with_context(|| format!("shortcut key '{raw}' has a non-numeric argument count"))?;
        Ok(Self {
            keyword: keyword.to_string(),
            argument_count,
        })
    }

    pub fn raw(&self) -> String {
        format!("{} {}", self.keyword, self.argument_count)
    }
}

/// One shortcut definition. Deserialized from YAML with only `url` and
/// `title`; the remaining fields are decoration filled in by the merge.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct Shortcut {
    pub url: String,
    pub title: String,
    #[serde(skip_deserializing)]
    pub keyword: String,
    #[serde(skip_deserializing)]
    pub argument_count: Option<u32>,
    #[serde(skip_deserializing)]
    pub arguments: Vec<String>,
    #[serde(skip_deserializing)]
    pub namespace: String,
    #[serde(skip_deserializing)]
    pub reachable: bool,
}

/// A shortcut as it appears in a remote YAML document: either a bare URL
/// template string or a mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawShortcut {
    Url(String),
    Entry(Shortcut),
}

/// Validate a raw namespace map and coerce bare-string shortcuts into
/// objects.
///
/// Malformed keys are reported once per namespace and the entries are kept;
/// downstream decoration leaves their argument count unset.
pub fn normalize(
    raw: BTreeMap<String, RawShortcut>,
    namespace: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> BTreeMap<String, Shortcut> {
    let mut incorrect_keys = Vec::new();
    let mut shortcuts = BTreeMap::new();
    for (key, value) in raw {
        if !key_matches_pattern(&key) {
            incorrect_keys.push(key.clone());
        }
        let shortcut = match value {
            RawShortcut::Url(url) => Shortcut {
                url,
                ..Shortcut::default()
            },
            RawShortcut::Entry(entry) => entry,
        };
        if let Ok(parsed) = ShortcutKey::parse(&key) {
            let found = extract_template_arguments(&shortcut.url);
            if found.len() as u32 != parsed.argument_count {
                diagnostics::record(
                    diagnostics,
                    Diagnostic::ArgumentCountMismatch {
                        namespace: namespace.to_string(),
                        key: key.clone(),
                        declared: parsed.argument_count,
                        found: found.len(),
                    },
                );
            }
        }
        shortcuts.insert(key, shortcut);
    }
    if !incorrect_keys.is_empty() {
        diagnostics::record(
            diagnostics,
            Diagnostic::MalformedKeys {
                namespace: namespace.to_string(),
                keys: incorrect_keys,
            },
        );
    }
    shortcuts
}

/// Decorate every shortcut with its parsed keyword, argument count,
/// namespace, extracted argument names, and reachability.
///
/// The walk runs in reverse declared order and marks the first occurrence of
/// each raw key reachable. Because the walk starts at the lowest-precedence
/// namespace, it is that namespace's definition that ends up reachable and
/// higher-precedence duplicates that end up unreachable. Downstream behavior
/// depends on this; keep it.
pub fn decorate_namespaces(namespaces: &mut [Namespace]) {
    let mut found_shortcuts: HashSet<String> = HashSet::new();
    for namespace in namespaces.iter_mut().rev() {
        let namespace_name = namespace.name.clone();
        for (key, shortcut) in namespace.shortcuts.iter_mut() {
            let mut parts = key.split(' ');
            shortcut.keyword = parts.next().unwrap_or_default().to_string();
            shortcut.argument_count = parts.next().and_then(|count| count.parse::<u32>().ok());
            shortcut.namespace = namespace_name.clone();
            shortcut.arguments = extract_template_arguments(&shortcut.url);
            shortcut.reachable = !found_shortcuts.contains(key.as_str());
            found_shortcuts.insert(key.clone());
        }
    }
}

/// Find the reachable definition for a key across the merged table.
pub fn find_reachable<'a>(namespaces: &'a [Namespace], key: &ShortcutKey) -> Option<&'a Shortcut> {
    let raw = key.raw();
    namespaces
        .iter()
        .filter_map(|namespace| namespace.shortcuts.get(&raw))
        .find(|shortcut| shortcut.reachable)
}

/// Extract placeholder names (`{%name}` or `{%name|modifier}`) from a URL
/// template, ordered, first occurrence wins.
pub fn extract_template_arguments(url: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = url;
    while let Some(start) = rest.find("{%") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let inner = &after[..end];
                let name = inner.split('|').next().unwrap_or("").trim();
                if !name.is_empty() && !names.iter().any(|existing| existing == name) {
                    names.push(name.to_string());
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

// Unanchored, like the original check: a non-space run, one space, then a
// digit, anywhere in the key.
fn key_matches_pattern(key: &str) -> bool {
    let chars: Vec<char> = key.chars().collect();
    chars
        .windows(3)
        .any(|window| !window[0].is_whitespace() && window[1] == ' ' && window[2].is_ascii_digit())
}
