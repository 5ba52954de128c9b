//! # View Node Domain Types
//!
//! A [`ViewNode`] is one UI element parsed from a ViewServer `DUMP` line.
//!
//! ## Dump line format
//!
//! ```text
//! android.widget.TextView@41a3c2e8 text:mText=5,Hello getVisibility()=7,VISIBLE mID=16,id/action_title
//! ```
//!
//! Everything after the first space is a run of length-prefixed records,
//! `[group:]key=<len>,<value>`. The length is mandatory: values routinely contain
//! `,`, `=` and spaces. The device measures `<len>` with Java's `String.length()`,
//! so it counts UTF-16 code units rather than bytes or chars.
//!
//! Parsing produces the flat `properties` map, the grouped `properties_group` map,
//! and a small set of [`DerivedProps`] looked up from well-known keys.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Class name of the synthetic node every [`crate::ViewTree`] is rooted at.
pub const ROOT_CLASS_NAME: &str = "Root";

/// Group assigned to records whose key carries no `group:` prefix.
pub const DEFAULT_GROUP: &str = "miscellaneous";

/// Text color reported when the dump has no `text:mCurTextColor` record.
pub const TRANSPARENT_COLOR: &str = "#00000000";

/// Visibility reported when the dump has no `visibility` record.
pub const DEFAULT_VISIBILITY: &str = "GONE";

// ============================================================================
// NodeId
// ============================================================================

/// Index of a node inside its owning [`crate::ViewTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The synthetic root is always the first node allocated.
    pub const ROOT: NodeId = NodeId(0);
}

// ============================================================================
// ViewNode
// ============================================================================

/// One UI element snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewNode {
    /// Runtime type name (e.g. `android.widget.Button`)
    pub class_name: String,

    /// Opaque hash code identifying the view within one dump
    pub address: String,

    /// Depth from the synthetic root (root = 0)
    pub level: usize,

    /// Flattened property name → raw value
    pub properties: BTreeMap<String, String>,

    /// Capitalized group name → property name → raw value
    pub properties_group: BTreeMap<String, BTreeMap<String, String>>,

    /// Typed view over well-known properties
    pub props: DerivedProps,

    /// Parent in the owning tree; `None` for the root and for detached nodes
    #[serde(skip)]
    pub parent: Option<NodeId>,

    /// Children in dump order
    #[serde(skip)]
    pub children: Vec<NodeId>,
}

impl ViewNode {
    /// Create a node with no properties.
    pub fn new(class_name: impl Into<String>, address: impl Into<String>) -> Self {
        let mut node = Self {
            class_name: class_name.into(),
            address: address.into(),
            level: 0,
            properties: BTreeMap::new(),
            properties_group: BTreeMap::new(),
            props: DerivedProps::default(),
            parent: None,
            children: Vec::new(),
        };
        node.fill_derived();
        node
    }

    /// Create the synthetic root marker node.
    pub fn root() -> Self {
        Self::new(ROOT_CLASS_NAME, "")
    }

    /// Whether this is the synthetic root marker.
    pub fn is_root(&self) -> bool {
        self.class_name == ROOT_CLASS_NAME && self.address.is_empty()
    }

    /// Parse one raw dump line.
    ///
    /// Leading indentation is ignored; the caller tracks depth separately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the class/address separator, a `=` or the
    /// value-length `,` is missing, if a length is not a decimal number, or if a
    /// declared length runs past the end of the line.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_start().trim_end_matches(['\r', '\n']);
        Self::parse_trimmed(line).map_err(|e| e.with_line(line))
    }

    fn parse_trimmed(line: &str) -> Result<Self> {
        let (head, body) = line.split_once(' ').unwrap_or((line, ""));
        let (class_name, address) = head
            .split_once('@')
            .ok_or_else(|| Error::parse(head, "missing '@' between class name and address"))?;

        let mut node = Self {
            class_name: class_name.to_string(),
            address: address.to_string(),
            level: 0,
            properties: BTreeMap::new(),
            properties_group: BTreeMap::new(),
            props: DerivedProps::default(),
            parent: None,
            children: Vec::new(),
        };

        let mut rest = body;
        while !rest.trim().is_empty() {
            // Some devices pad records with more than one space.
            rest = rest.trim_start_matches(' ');
            let (raw_key, after_key) = rest
                .split_once('=')
                .ok_or_else(|| Error::parse(preview(rest), "missing '=' after property key"))?;

            let (len_str, after_len) = after_key
                .split_once(',')
                .ok_or_else(|| Error::parse(raw_key, "missing ',' after value length"))?;

            if len_str.is_empty() || !len_str.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::parse(
                    raw_key,
                    format!("value length '{}' is not a decimal number", preview(len_str)),
                ));
            }
            let len: usize = len_str.parse().map_err(|_| {
                Error::parse(raw_key, format!("value length '{len_str}' is out of range"))
            })?;

            let (value, remaining) = split_utf16(after_len, len).ok_or_else(|| {
                Error::parse(
                    raw_key,
                    format!(
                        "declared length {} exceeds remaining {}",
                        len,
                        after_len.encode_utf16().count()
                    ),
                )
            })?;

            let (group, key) = raw_key.split_once(':').unwrap_or((DEFAULT_GROUP, raw_key));
            node.add_property(key, value, group);

            rest = remaining;
        }

        node.fill_derived();
        Ok(node)
    }

    /// Store a property under its normalized name in both maps.
    ///
    /// Accessor keys are normalized: `getText()` → `text`, `isClickable()` →
    /// `isClickable`. The group name is capitalized (`text` → `Text`).
    pub fn add_property(&mut self, key: &str, value: impl Into<String>, group: &str) {
        let key = normalize_key(key);
        let value = value.into();

        self.properties_group
            .entry(capitalize(group))
            .or_default()
            .insert(key.clone(), value.clone());
        self.properties.insert(key, value);
    }

    /// Look up a raw property value.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Look up a raw property value inside a (capitalized) group.
    pub fn group_property(&self, group: &str, key: &str) -> Option<&str> {
        self.properties_group
            .get(group)
            .and_then(|props| props.get(key))
            .map(String::as_str)
    }

    /// The `text` property, if the view has one.
    pub fn text(&self) -> Option<&str> {
        self.property("text")
    }

    /// Recompute [`DerivedProps`] after properties were added by hand.
    pub fn fill_derived(&mut self) {
        self.props = DerivedProps::from_node(self);
    }
}

impl fmt::Display for ViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.is_empty() {
            write!(f, "{}", self.class_name)
        } else {
            write!(f, "{}@{}", self.class_name, self.address)
        }
    }
}

// ============================================================================
// DerivedProps
// ============================================================================

/// Typed view over the raw properties every dumped view carries.
///
/// Missing or unparsable numbers become `0`, a missing visibility becomes
/// `"GONE"`, a boolean is only `true` when its raw value is `true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedProps {
    /// Resource id (`mID`), e.g. `id/action_bar`
    pub id: Option<String>,
    /// Left edge on screen (`locationOnScreen_x`)
    pub x: i32,
    /// Top edge on screen (`locationOnScreen_y`)
    pub y: i32,
    /// Content description (`contentDescription`)
    pub description: Option<String>,
    pub width: i32,
    pub height: i32,
    /// `VISIBLE`, `INVISIBLE` or `GONE`
    pub visibility: String,
    pub clickable: bool,
    pub enabled: bool,
    pub will_not_draw: bool,
    /// ARGB text color, e.g. `#ff000000`
    pub text_color: String,
}

impl Default for DerivedProps {
    fn default() -> Self {
        Self {
            id: None,
            x: 0,
            y: 0,
            description: None,
            width: 0,
            height: 0,
            visibility: DEFAULT_VISIBILITY.to_string(),
            clickable: false,
            enabled: false,
            will_not_draw: false,
            text_color: TRANSPARENT_COLOR.to_string(),
        }
    }
}

impl DerivedProps {
    fn from_node(node: &ViewNode) -> Self {
        let prop = |key: &str| node.property(key);

        Self {
            id: prop("mID").map(str::to_string),
            x: parse_number(prop("locationOnScreen_x")),
            y: parse_number(prop("locationOnScreen_y")),
            description: prop("contentDescription").map(str::to_string),
            width: parse_number(prop("width")),
            height: parse_number(prop("height")),
            visibility: prop("visibility")
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_VISIBILITY)
                .to_string(),
            clickable: parse_bool(prop("isClickable")),
            enabled: parse_bool(prop("isEnabled")),
            will_not_draw: parse_bool(prop("willNotDraw")),
            text_color: node
                .group_property("Text", "mCurTextColor")
                .filter(|v| !v.is_empty())
                .map(format_color)
                .unwrap_or_else(|| TRANSPARENT_COLOR.to_string()),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Split `s` after exactly `units` UTF-16 code units.
///
/// Returns `None` if `s` is too short or the boundary falls inside a surrogate pair.
fn split_utf16(s: &str, units: usize) -> Option<(&str, &str)> {
    let mut consumed = 0;
    for (idx, ch) in s.char_indices() {
        if consumed == units {
            return Some(s.split_at(idx));
        }
        consumed += ch.len_utf16();
        if consumed > units {
            return None;
        }
    }
    (consumed == units).then_some((s, ""))
}

fn normalize_key(key: &str) -> String {
    let Some(stripped) = key.strip_suffix("()") else {
        return key.to_string();
    };

    match stripped.strip_prefix("get") {
        Some(rest) if !rest.is_empty() => {
            let mut chars = rest.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        _ => stripped.to_string(),
    }
}

fn capitalize(group: &str) -> String {
    let mut chars = group.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_number(raw: Option<&str>) -> i32 {
    let Some(raw) = raw.map(str::trim) else {
        return 0;
    };
    raw.parse::<i32>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i32))
        .unwrap_or(0)
}

fn parse_bool(raw: Option<&str>) -> bool {
    raw.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Format a signed Java color int as `#aarrggbb`.
fn format_color(raw: &str) -> String {
    let value = raw
        .trim()
        .parse::<i64>()
        .ok()
        .or_else(|| raw.trim().parse::<f64>().ok().map(|v| v as i64))
        .unwrap_or(0);
    format!("#{:x}", value as u32)
}

fn preview(s: &str) -> &str {
    match s.char_indices().nth(24) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ============================================================================
// Tests
// ============================================================================
