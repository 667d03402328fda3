use std::collections::BTreeMap;

/// One node of a decoded query-string structure.
///
/// Bracket indices select mappings, an empty index (`foo[]`) selects a
/// sequence. The variant is chosen explicitly from the path shape instead of
/// coercing one container into the other at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamNode {
    Text(String),
    Map(BTreeMap<String, ParamNode>),
    List(Vec<ParamNode>),
}

impl ParamNode {
    fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamNode> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }
}

/// Decode a bracket-aware fragment (`a[b][c]=1&a[]=2`) into a nested
/// structure.
///
/// Per pair, left to right: the name is percent-decoded and trimmed, the
/// value is plus-then-percent-decoded; pairs whose trimmed name is empty are
/// skipped. Anything after a second `=` in a pair is discarded. Later
/// duplicate keys overwrite earlier ones at the same path.
pub fn decode_nested(fragment: &str) -> BTreeMap<String, ParamNode> {
    let mut params = BTreeMap::new();
    for piece in fragment.split('&') {
        let mut parts = piece.split('=');
        let raw_name = parts.next().unwrap_or("");
        let raw_value = parts.next().unwrap_or("");

        let name = percent_decode(raw_name);
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = decode_component_with_plus(raw_value);

        let (root, indices) = split_bracket_indices(name);
        insert_path(&mut params, &root, &indices, value);
    }
    params
}

/// Decode a flat fragment, splitting each pair on the *first* `=` only so
/// that values may contain literal `=` characters.
pub fn decode_flat(fragment: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for piece in fragment.split('&') {
        if piece.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = match piece.split_once('=') {
            Some((key, value)) => (key, value),
            None => (piece, ""),
        };
        params.insert(
            decode_component_with_plus(raw_key),
            decode_component_with_plus(raw_value),
        );
    }
    params
}

/// Encode ordered pairs back into a fragment. Absent fields are the caller's
/// concern; a present key with an empty value is still emitted.
pub fn encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn percent_decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn decode_component_with_plus(raw: &str) -> String {
    percent_decode(&raw.replace('+', "%20"))
}

/// Extract `[idx]` groups from a name in scan order; text outside brackets
/// concatenates into the root key. An unterminated bracket stays literal.
fn split_bracket_indices(name: &str) -> (String, Vec<String>) {
    let mut root = String::new();
    let mut indices = Vec::new();
    let mut rest = name;
    while let Some(open) = rest.find('[') {
        match rest[open + 1..].find(']') {
            Some(close) => {
                root.push_str(&rest[..open]);
                indices.push(rest[open + 1..open + 1 + close].to_string());
                rest = &rest[open + 2 + close..];
            }
            None => break,
        }
    }
    root.push_str(rest);
    (root, indices)
}

fn as_map_mut(node: &mut ParamNode) -> &mut BTreeMap<String, ParamNode> {
    if !matches!(node, ParamNode::Map(_)) {
        *node = ParamNode::empty_map();
    }
    match node {
        ParamNode::Map(map) => map,
        _ => unreachable!(),
    }
}

fn insert_path(
    params: &mut BTreeMap<String, ParamNode>,
    root: &str,
    indices: &[String],
    value: String,
) {
    if indices.is_empty() {
        params.insert(root.to_string(), ParamNode::Text(value));
        return;
    }
    let Some((leaf, spine)) = indices.split_last() else {
        return;
    };

    let mut node = params
        .entry(root.to_string())
        .or_insert_with(ParamNode::empty_map);
    for segment in spine {
        node = as_map_mut(node)
            .entry(segment.clone())
            .or_insert_with(ParamNode::empty_map);
    }

    if leaf.is_empty() {
        if !matches!(node, ParamNode::List(_)) {
            *node = ParamNode::List(Vec::new());
        }
        if let ParamNode::List(items) = node {
            items.push(ParamNode::Text(value));
        }
    } else {
        as_map_mut(node).insert(leaf.clone(), ParamNode::Text(value));
    }
}
