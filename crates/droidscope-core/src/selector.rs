//! # Selector Engine
//!
//! A [`Selector`] is a UI query: a bitmask of constrained fields, one value slot per
//! field, and an optional chain of `child`/`sibling` sub-selectors. The mask bits and
//! field names match what the on-device UiAutomator server expects, so a selector
//! serializes straight into an RPC argument.
//!
//! Locally a selector compiles into a [`CompiledSelector`], a reusable predicate over
//! [`ViewNode`]s. A compiled selector matches a node when *any* set field matches,
//! checked in bit order.

use std::fmt;

use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::view_node::ViewNode;

// ============================================================================
// Field Table
// ============================================================================

/// Value type a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Pattern,
    Bool,
    /// Non-negative integer
    Int,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "a string",
            FieldKind::Pattern => "a regular expression",
            FieldKind::Bool => "a boolean",
            FieldKind::Int => "a non-negative integer",
        };
        f.write_str(name)
    }
}

type Accessor = fn(&ViewNode) -> Option<&str>;

/// How a field is tested against a node.
#[derive(Debug, Clone, Copy)]
enum Rule {
    Equals(Accessor),
    Contains(Accessor),
    StartsWith(Accessor),
    Matches(Accessor),
    /// Raw `<name>` or `is<Name>` property parsed as a boolean
    Flag,
    /// Raw `<name>` property parsed as an integer
    Number,
}

/// One row of the static field table.
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub bit: u32,
    pub kind: FieldKind,
    rule: Rule,
}

fn text_of(node: &ViewNode) -> Option<&str> {
    node.property("text")
}

fn class_name_of(node: &ViewNode) -> Option<&str> {
    Some(node.class_name.as_str())
}

fn description_of(node: &ViewNode) -> Option<&str> {
    node.props.description.as_deref()
}

fn resource_id_of(node: &ViewNode) -> Option<&str> {
    node.props.id.as_deref()
}

fn package_name_of(node: &ViewNode) -> Option<&str> {
    node.property("packageName")
}

const fn spec(name: &'static str, bit: u32, kind: FieldKind, rule: Rule) -> FieldSpec {
    FieldSpec {
        name,
        bit,
        kind,
        rule,
    }
}

const FIELD_COUNT: usize = 25;

/// Every selectable field, in bit order.
pub static FIELDS: [FieldSpec; FIELD_COUNT] = {
    use FieldKind::*;
    use Rule::*;
    [
        spec("text", 0x01, String, Equals(text_of)),
        spec("textContains", 0x02, String, Contains(text_of)),
        spec("textMatches", 0x04, Pattern, Matches(text_of)),
        spec("textStartsWith", 0x08, String, StartsWith(text_of)),
        spec("className", 0x10, String, Equals(class_name_of)),
        spec("classNameMatches", 0x20, Pattern, Matches(class_name_of)),
        spec("description", 0x40, String, Equals(description_of)),
        spec("descriptionContains", 0x80, String, Contains(description_of)),
        spec("descriptionMatches", 0x0100, Pattern, Matches(description_of)),
        spec("descriptionStartsWith", 0x0200, String, StartsWith(description_of)),
        spec("checkable", 0x0400, Bool, Flag),
        spec("checked", 0x0800, Bool, Flag),
        spec("clickable", 0x1000, Bool, Flag),
        spec("longClickable", 0x2000, Bool, Flag),
        spec("scrollable", 0x4000, Bool, Flag),
        spec("enabled", 0x8000, Bool, Flag),
        spec("focusable", 0x01_0000, Bool, Flag),
        spec("focused", 0x02_0000, Bool, Flag),
        spec("selected", 0x04_0000, Bool, Flag),
        spec("packageName", 0x08_0000, String, Equals(package_name_of)),
        spec("packageNameMatches", 0x10_0000, Pattern, Matches(package_name_of)),
        spec("resourceId", 0x20_0000, String, Equals(resource_id_of)),
        spec("resourceIdMatches", 0x40_0000, Pattern, Matches(resource_id_of)),
        spec("index", 0x80_0000, Int, Number),
        spec("instance", 0x0100_0000, Int, Number),
    ]
};

/// Look up a field by its wire name.
pub fn field(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.name == name)
}

fn slot_of(name: &str) -> Result<(usize, &'static FieldSpec)> {
    FIELDS
        .iter()
        .enumerate()
        .find(|(_, spec)| spec.name == name)
        .ok_or_else(|| Error::invalid_query(name, "not a selectable field"))
}

impl Rule {
    fn matches(&self, name: &str, node: &ViewNode, value: &FieldValue) -> bool {
        match (self, value) {
            (Rule::Equals(get), FieldValue::Str(expected)) => get(node) == Some(expected.as_str()),
            (Rule::Contains(get), FieldValue::Str(needle)) => {
                get(node).is_some_and(|v| v.contains(needle.as_str()))
            }
            (Rule::StartsWith(get), FieldValue::Str(prefix)) => {
                get(node).is_some_and(|v| v.starts_with(prefix.as_str()))
            }
            (Rule::Matches(get), FieldValue::Pattern(re)) => get(node).is_some_and(|v| re.is_match(v)),
            (Rule::Flag, FieldValue::Bool(expected)) => flag_property(node, name) == Some(*expected),
            (Rule::Number, FieldValue::Int(expected)) => node
                .property(name)
                .and_then(|v| v.trim().parse::<i64>().ok())
                == Some(*expected),
            _ => false,
        }
    }
}

fn flag_property(node: &ViewNode, name: &str) -> Option<bool> {
    let raw = node.property(name).or_else(|| {
        let mut chars = name.chars();
        let accessor: String = match chars.next() {
            Some(first) => "is".chars().chain(first.to_uppercase()).chain(chars).collect(),
            None => return None,
        };
        node.property(&accessor)
    })?;

    match raw.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

// ============================================================================
// FieldValue
// ============================================================================

/// A value stored in one selector slot.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Str(String),
    Pattern(Regex),
    Bool(bool),
    Int(i64),
}

impl FieldValue {
    /// Compile a pattern value.
    pub fn pattern(source: &str) -> Result<Self> {
        Regex::new(source)
            .map(FieldValue::Pattern)
            .map_err(|e| Error::invalid_query(source, format!("invalid pattern: {e}")))
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Str(_) => FieldKind::String,
            FieldValue::Pattern(_) => FieldKind::Pattern,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Int(_) => FieldKind::Int,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Str(a), FieldValue::Str(b)) => a == b,
            (FieldValue::Pattern(a), FieldValue::Pattern(b)) => a.as_str() == b.as_str(),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<Regex> for FieldValue {
    fn from(value: Regex) -> Self {
        FieldValue::Pattern(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldValue::Str(s) => serializer.serialize_str(s),
            FieldValue::Pattern(re) => serializer.serialize_str(re.as_str()),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Int(i) => serializer.serialize_i64(*i),
        }
    }
}

// ============================================================================
// Selector
// ============================================================================

/// Relation between a selector and the next selector in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Child,
    Sibling,
}

/// A UI query.
///
/// `Clone` is a deep copy: the chain's sub-selectors are cloned too, so changing
/// a clone never affects the original.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    mask: u32,
    values: [Option<FieldValue>; FIELD_COUNT],
    chain: Vec<(Relation, Selector)>,
}

impl Selector {
    /// An empty selector. It matches nothing until a field is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selector by setting each `(field, value)` pair in order.
    pub fn from_query<'a, I, V>(query: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<FieldValue>,
    {
        let mut selector = Self::new();
        for (name, value) in query {
            selector.set(name, value)?;
        }
        Ok(selector)
    }

    /// Constrain `name` to `value`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidQuery`] if the field is unknown, the value kind does not
    /// match the field, or an `index`/`instance` is negative.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        let (slot, spec) = slot_of(name)?;
        let value = value.into();

        if value.kind() != spec.kind {
            return Err(Error::invalid_query(
                name,
                format!("expects {}, got {}", spec.kind, value.kind()),
            ));
        }
        if let FieldValue::Int(n) = value {
            if n < 0 {
                return Err(Error::invalid_query(name, format!("must not be negative, got {n}")));
            }
        }

        self.values[slot] = Some(value);
        self.mask |= spec.bit;
        Ok(())
    }

    /// Constrain `name` with a textual value converted to the field's kind.
    ///
    /// Used for command-line `NAME=VALUE` queries.
    pub fn set_parsed(&mut self, name: &str, raw: &str) -> Result<()> {
        let spec = field(name).ok_or_else(|| Error::invalid_query(name, "not a selectable field"))?;
        let value = match spec.kind {
            FieldKind::String => FieldValue::from(raw),
            FieldKind::Pattern => FieldValue::pattern(raw)?,
            FieldKind::Bool => match raw {
                "true" => FieldValue::Bool(true),
                "false" => FieldValue::Bool(false),
                other => {
                    return Err(Error::invalid_query(
                        name,
                        format!("expects true or false, got '{other}'"),
                    ))
                }
            },
            FieldKind::Int => raw.parse::<i64>().map(FieldValue::Int).map_err(|_| {
                Error::invalid_query(name, format!("expects an integer, got '{raw}'"))
            })?,
        };
        self.set(name, value)
    }

    /// Clear `name`. Clearing an unset field is a no-op.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let (slot, spec) = slot_of(name)?;
        self.values[slot] = None;
        self.mask &= !spec.bit;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        let (slot, _) = slot_of(name).ok()?;
        self.values[slot].as_ref()
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// No field is constrained.
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Append a child query to the chain.
    pub fn child(&mut self, query: Selector) -> &mut Self {
        self.chain.push((Relation::Child, query));
        self
    }

    /// Append a sibling query to the chain.
    pub fn sibling(&mut self, query: Selector) -> &mut Self {
        self.chain.push((Relation::Sibling, query));
        self
    }

    pub fn chain(&self) -> &[(Relation, Selector)] {
        &self.chain
    }

    /// Compile the set fields into a node predicate.
    ///
    /// Only this selector's own fields take part; the chain is evaluated by the
    /// device, not locally.
    pub fn compile(&self) -> CompiledSelector {
        let tests = FIELDS
            .iter()
            .zip(&self.values)
            .filter(|(spec, _)| self.mask & spec.bit != 0)
            .filter_map(|(spec, value)| value.clone().map(|v| (spec, v)))
            .collect();
        CompiledSelector { tests }
    }

    /// Wire form sent to the UiAutomator server.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("mask", &self.mask)?;

        let relations: Vec<Relation> = self.chain.iter().map(|(relation, _)| *relation).collect();
        map.serialize_entry("childOrSibling", &relations)?;

        let selectors: Vec<&Selector> = self.chain.iter().map(|(_, selector)| selector).collect();
        map.serialize_entry("childOrSiblingSelector", &selectors)?;

        for (spec, value) in FIELDS.iter().zip(&self.values) {
            if let Some(value) = value {
                map.serialize_entry(spec.name, value)?;
            }
        }
        map.end()
    }
}

// ============================================================================
// CompiledSelector
// ============================================================================

/// Node predicate produced by [`Selector::compile`].
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    tests: Vec<(&'static FieldSpec, FieldValue)>,
}

impl CompiledSelector {
    /// True if any constrained field matches. The synthetic root never matches.
    pub fn matches(&self, node: &ViewNode) -> bool {
        if node.is_root() {
            return false;
        }
        self.tests
            .iter()
            .any(|(spec, value)| spec.rule.matches(spec.name, node, value))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(line: &str) -> ViewNode {
        ViewNode::parse(line).unwrap()
    }

    #[test]
    fn test_field_table_bits_are_unique_and_ordered() {
        let mut previous = 0;
        for spec in FIELDS.iter() {
            assert!(spec.bit > previous, "{} out of order", spec.name);
            assert_eq!(spec.bit.count_ones(), 1);
            previous = spec.bit;
        }
        assert_eq!(field("instance").unwrap().bit, 0x0100_0000);
        assert_eq!(field("resourceIdMatches").unwrap().kind, FieldKind::Pattern);
    }

    #[test]
    fn test_set_then_remove_restores_mask() {
        let mut selector = Selector::from_query([("text", "OK")]).unwrap();
        let before = selector.mask();

        selector.set("clickable", true).unwrap();
        assert_eq!(selector.mask(), before | 0x1000);

        selector.remove("clickable").unwrap();
        assert_eq!(selector.mask(), before);
        assert!(selector.get("clickable").is_none());
        assert_eq!(selector.get("text"), Some(&FieldValue::from("OK")));
    }

    #[test]
    fn test_remove_unset_field_is_noop() {
        let mut selector = Selector::new();
        selector.remove("text").unwrap();
        assert!(selector.is_empty());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = Selector::new().set("textMatche", "x").unwrap_err();
        match err {
            Error::InvalidQuery { field, .. } => assert_eq!(field, "textMatche"),
            other => panic!("expected invalid query, got {other:?}"),
        }
        assert!(Selector::new().remove("bogus").is_err());
    }

    #[test]
    fn test_matches_field_requires_pattern() {
        let err = Selector::new().set("textMatches", "^OK$").unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));

        let mut selector = Selector::new();
        selector
            .set("textMatches", Regex::new("^OK$").unwrap())
            .unwrap();
        assert_eq!(selector.mask(), 0x04);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        assert!(Selector::new().set("clickable", "true").is_err());
        assert!(Selector::new().set("text", true).is_err());
        assert!(Selector::new().set("index", "0").is_err());
    }

    #[test]
    fn test_negative_index_is_rejected() {
        let err = Selector::new().set("index", -1).unwrap_err();
        assert!(err.to_string().contains("negative"));
        assert!(Selector::new().set("instance", -3).is_err());
        assert!(Selector::new().set("instance", 0).is_ok());
    }

    #[test]
    fn test_set_parsed_converts_by_kind() {
        let mut selector = Selector::new();
        selector.set_parsed("clickable", "true").unwrap();
        selector.set_parsed("index", "2").unwrap();
        selector.set_parsed("resourceIdMatches", "id/.*_button").unwrap();
        selector.set_parsed("text", "OK").unwrap();

        assert_eq!(selector.get("clickable"), Some(&FieldValue::Bool(true)));
        assert_eq!(selector.get("index"), Some(&FieldValue::Int(2)));
        assert!(matches!(
            selector.get("resourceIdMatches"),
            Some(FieldValue::Pattern(_))
        ));

        assert!(selector.set_parsed("checked", "yes").is_err());
        assert!(selector.set_parsed("index", "-1").is_err());
        assert!(selector.set_parsed("textMatches", "(").is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = Selector::from_query([("className", "android.widget.ListView")]).unwrap();
        original.child(Selector::from_query([("text", "Item")]).unwrap());

        let mut copy = original.clone();
        copy.set("text", "Other").unwrap();
        copy.sibling(Selector::new());
        copy.chain[0].1.set("clickable", true).unwrap();

        assert!(original.get("text").is_none());
        assert_eq!(original.chain().len(), 1);
        assert!(original.chain()[0].1.get("clickable").is_none());
        assert_eq!(copy.chain().len(), 2);
    }

    #[test]
    fn test_child_does_not_touch_own_fields() {
        let mut selector = Selector::from_query([("text", "A")]).unwrap();
        let mask = selector.mask();
        selector.child(Selector::from_query([("text", "B")]).unwrap());
        assert_eq!(selector.mask(), mask);
        assert_eq!(selector.chain()[0].0, Relation::Child);
    }

    #[test]
    fn test_class_name_match() {
        let compiled = Selector::from_query([("className", "android.widget.Button")])
            .unwrap()
            .compile();
        assert!(compiled.matches(&node("android.widget.Button@1")));
        assert!(!compiled.matches(&node("android.widget.TextView@2")));
    }

    #[test]
    fn test_empty_selector_matches_nothing() {
        let compiled = Selector::new().compile();
        assert!(!compiled.matches(&node("android.widget.Button@1 text:getText()=2,OK")));
    }

    #[test]
    fn test_root_never_matches() {
        let compiled = Selector::from_query([("className", "Root")]).unwrap().compile();
        assert!(!compiled.matches(&ViewNode::root()));
    }

    #[test]
    fn test_text_rules() {
        let button = node("android.widget.Button@1 text:getText()=11,Sign in now");
        let label = node("android.view.View@2");

        let contains = Selector::from_query([("textContains", "in n")]).unwrap().compile();
        assert!(contains.matches(&button));
        assert!(!contains.matches(&label));

        let starts = Selector::from_query([("textStartsWith", "Sign")]).unwrap().compile();
        assert!(starts.matches(&button));
        assert!(!starts.matches(&label));

        let pattern = Selector::from_query([("textMatches", Regex::new("now$").unwrap())])
            .unwrap()
            .compile();
        assert!(pattern.matches(&button));
        assert!(!pattern.matches(&label));

        let exact = Selector::from_query([("text", "Sign in")]).unwrap().compile();
        assert!(!exact.matches(&button));
    }

    #[test]
    fn test_description_and_resource_id_rules() {
        let view = node(
            "android.widget.ImageButton@1 mID=11,id/settings accessibility:contentDescription=8,Settings",
        );

        let by_id = Selector::from_query([("resourceId", "id/settings")]).unwrap().compile();
        assert!(by_id.matches(&view));

        let by_desc = Selector::from_query([("descriptionContains", "ttings")])
            .unwrap()
            .compile();
        assert!(by_desc.matches(&view));

        let by_id_pattern = Selector::from_query([("resourceIdMatches", Regex::new("^id/s").unwrap())])
            .unwrap()
            .compile();
        assert!(by_id_pattern.matches(&view));
    }

    #[test]
    fn test_flag_rule_reads_accessor_form() {
        let clickable = node("android.widget.Button@1 isClickable()=4,true");
        let plain = node("android.widget.Button@2 isClickable()=5,false");
        let unknown = node("android.widget.Button@3");

        let compiled = Selector::from_query([("clickable", true)]).unwrap().compile();
        assert!(compiled.matches(&clickable));
        assert!(!compiled.matches(&plain));
        assert!(!compiled.matches(&unknown));

        let not_clickable = Selector::from_query([("clickable", false)]).unwrap().compile();
        assert!(not_clickable.matches(&plain));
        assert!(!not_clickable.matches(&unknown));
    }

    #[test]
    fn test_number_rule() {
        let view = node("A@1 index=1,3");
        let compiled = Selector::from_query([("index", 3)]).unwrap().compile();
        assert!(compiled.matches(&view));
        let compiled = Selector::from_query([("index", 4)]).unwrap().compile();
        assert!(!compiled.matches(&view));
    }

    #[test]
    fn test_any_field_matches() {
        let mut selector = Selector::new();
        selector.set("text", "nope").unwrap();
        selector.set("className", "android.widget.Switch").unwrap();
        let compiled = selector.compile();
        assert!(compiled.matches(&node("android.widget.Switch@1")));
    }

    #[test]
    fn test_wire_form() {
        let mut selector = Selector::from_query([("className", "android.widget.ListView")]).unwrap();
        selector.set("textMatches", Regex::new("^Item \\d+$").unwrap()).unwrap();
        selector.child(Selector::from_query([("index", 0)]).unwrap());

        assert_eq!(
            selector.to_json().unwrap(),
            json!({
                "mask": 0x14,
                "childOrSibling": ["child"],
                "childOrSiblingSelector": [{
                    "mask": 0x80_0000,
                    "childOrSibling": [],
                    "childOrSiblingSelector": [],
                    "index": 0
                }],
                "className": "android.widget.ListView",
                "textMatches": "^Item \\d+$"
            })
        );
    }
}
