use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

pub mod build;
pub mod keywords;
pub mod resolve;

pub use build::{compile, Compiled, Error as BuildError};

/// Handle of a Node within its owning Tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

/// Tree is a compiled schema: an arena of Nodes rooted at |root|.
/// Ownership of the arena is acyclic; `parent` and `resolved_ref` handles
/// are non-owning and may form cycles. A Tree is immutable once compilation
/// returns, so any number of validations may share it concurrently.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    /// Root of the schema, or None if the root could not be built.
    pub root: Option<NodeId>,
    /// Anchor names bound at the root, fed by `$anchor` and `$id` keywords.
    /// `#name` references resolve through this map.
    pub anchors: BTreeMap<String, NodeId>,
}

/// Node is a single schema of the compiled tree: the shared composition
/// keywords, plus a Kind carrying the type tag and type-specific constraints.
#[derive(Debug)]
pub struct Node {
    /// `$id` of this schema, or empty.
    pub id: String,
    /// Literal text of the `type` keyword, or empty. When empty the type
    /// check is skipped and only keyword-implied shape is enforced.
    pub type_str: String,
    /// `default` value. Informational only; never enforced.
    pub default_value: Option<Value>,
    /// `enum` members, free of structural duplicates.
    pub enum_values: Vec<Value>,
    /// Whether this node's slot is required by its parent's `required` list.
    pub required: bool,
    /// Owning parent; None iff this node is the tree root.
    pub parent: Option<NodeId>,
    /// Decoded `$ref` text, or empty.
    pub ref_ptr: String,
    /// Referent of `ref_ptr`, populated by resolution when reachable.
    pub resolved_ref: Option<NodeId>,
    pub all_of: Vec<NodeId>,
    pub any_of: Vec<NodeId>,
    pub one_of: Vec<NodeId>,
    pub not: Option<NodeId>,
    /// `$defs`: schema-local definitions addressable by reference.
    pub defs: BTreeMap<String, NodeId>,
    pub kind: Kind,
}

/// Kind discriminates a Node by instance type and carries its constraints.
#[derive(Debug)]
pub enum Kind {
    Null,
    Boolean(BooleanNode),
    Number(NumberNode),
    String(StringNode),
    Object(ObjectNode),
    Array(ArrayNode),
    /// No `type` and no type-implying keywords: shared checks only.
    Undefined,
}

#[derive(Debug, Default)]
pub struct BooleanNode {
    /// Fixed verdict encoding schema `true` / schema `false`. When set,
    /// validation returns it unconditionally, regardless of the instance.
    pub value: Option<bool>,
}

#[derive(Debug, Default)]
pub struct NumberNode {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    /// Strictly positive.
    pub multiple_of: Option<f64>,
    /// True when `type` is "integer": instances must have no fractional part.
    pub is_integer: bool,
}

#[derive(Debug, Default)]
pub struct StringNode {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Pattern>,
}

#[derive(Debug, Default)]
pub struct ObjectNode {
    pub properties: BTreeMap<String, NodeId>,
    /// Ordered pattern-property schemas, each bound to its compiled pattern.
    pub pattern_properties: Vec<(Pattern, NodeId)>,
    /// Schema for properties matched by neither `properties` nor
    /// `patternProperties`. Defaults to a schema-true Boolean node.
    pub additional_properties: Option<NodeId>,
    pub property_names: Option<NodeId>,
    /// Property names which must be present in the instance.
    pub required: BTreeSet<String>,
    /// Trigger name => names which must also be present when it is.
    pub dependent_required: BTreeMap<String, BTreeSet<String>>,
    /// Trigger name => schema applied to the whole object when present.
    pub dependent_schemas: BTreeMap<String, NodeId>,
    pub min_properties: usize,
    pub max_properties: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ArrayNode {
    pub items: Vec<NodeId>,
    /// Distinguishes tuple-form `items: [..]` from single-form `items: {..}`.
    pub items_is_array: bool,
    /// Applies to elements beyond the tuple, when `items_is_array`.
    pub additional_items: Option<NodeId>,
    pub contains: Option<NodeId>,
    pub min_items: usize,
    pub max_items: Option<usize>,
    pub unique_items: bool,
}

/// Pattern is the abstracted regular-expression capability: a compiled
/// matcher paired with its source text.
#[derive(Debug)]
pub struct Pattern(regex::Regex);

impl Pattern {
    pub fn compile(source: &str) -> Result<Pattern, regex::Error> {
        Ok(Pattern(regex::Regex::new(source)?))
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn source(&self) -> &str {
        self.0.as_str()
    }
}

impl Kind {
    /// Instance-type name of this Kind, as it appears in `type` keywords.
    pub fn type_name(&self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Boolean(_) => "boolean",
            Kind::Number(_) => "number",
            Kind::String(_) => "string",
            Kind::Object(_) => "object",
            Kind::Array(_) => "array",
            Kind::Undefined => "undefined",
        }
    }
}

impl Node {
    pub(crate) fn new(kind: Kind, parent: Option<NodeId>) -> Node {
        Node {
            id: String::new(),
            type_str: String::new(),
            default_value: None,
            enum_values: Vec::new(),
            required: false,
            parent,
            ref_ptr: String::new(),
            resolved_ref: None,
            all_of: Vec::new(),
            any_of: Vec::new(),
            one_of: Vec::new(),
            not: None,
            defs: BTreeMap::new(),
            kind,
        }
    }
}

impl Tree {
    pub(crate) fn new() -> Tree {
        Tree {
            nodes: Vec::new(),
            root: None,
            anchors: BTreeMap::new(),
        }
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.root == Some(id)
    }

    /// All allocated node handles, in allocation (pre-)order.
    pub(crate) fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// json_pointer reconstructs the schema location of |id| from parent
    /// links, e.g. `#/properties/city/anyOf/1`.
    pub fn json_pointer(&self, id: NodeId) -> String {
        let node = self.node(id);
        let Some(parent_id) = node.parent else {
            return "#".to_string();
        };
        let mut ptr = self.json_pointer(parent_id);
        ptr.push('/');
        ptr.push_str(&self.slot(parent_id, id));
        ptr
    }

    // slot names the keyword location of |id| within |parent_id|.
    fn slot(&self, parent_id: NodeId, id: NodeId) -> String {
        let parent = self.node(parent_id);

        match &parent.kind {
            Kind::Object(obj) => {
                for (name, child) in &obj.properties {
                    if *child == id {
                        return format!("properties/{}", escape_token(name));
                    }
                }
                if obj.pattern_properties.iter().any(|(_, child)| *child == id) {
                    return "patternProperties".to_string();
                }
                if obj.additional_properties == Some(id) {
                    return "additionalProperties".to_string();
                }
                if obj.property_names == Some(id) {
                    return "propertyNames".to_string();
                }
                for (name, child) in &obj.dependent_schemas {
                    if *child == id {
                        return format!("dependentSchemas/{}", escape_token(name));
                    }
                }
            }
            Kind::Array(arr) => {
                if let Some(index) = arr.items.iter().position(|child| *child == id) {
                    return format!("items/{}", index);
                }
                if arr.additional_items == Some(id) {
                    return "additionalItems".to_string();
                }
                if arr.contains == Some(id) {
                    return "contains".to_string();
                }
            }
            _ => (),
        }

        for (keyword, children) in [
            ("allOf", &parent.all_of),
            ("anyOf", &parent.any_of),
            ("oneOf", &parent.one_of),
        ] {
            if let Some(index) = children.iter().position(|child| *child == id) {
                return format!("{}/{}", keyword, index);
            }
        }
        if parent.not == Some(id) {
            return "not".to_string();
        }
        for (name, child) in &parent.defs {
            if *child == id {
                return format!("$defs/{}", escape_token(name));
            }
        }
        // Every owned child occupies exactly one slot of its parent.
        String::new()
    }

    /// dump renders the compiled tree for inspection, one node per line with
    /// two-space indentation.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.dump_node(root, 0, &mut out);
        }
        out
    }

    fn dump_node(&self, id: NodeId, indent: usize, out: &mut String) {
        let node = self.node(id);
        let pad = "  ".repeat(indent);

        write!(
            out,
            "{}{} ({}{})",
            pad,
            node.id,
            node.kind.type_name(),
            if node.required { " *" } else { "" }
        )
        .unwrap();
        if !node.ref_ptr.is_empty() {
            let decoded = node.ref_ptr.replace("~1", "/").replace("~0", "~");
            write!(
                out,
                " -> {}{}",
                decoded,
                if node.resolved_ref.is_some() {
                    " (resolved)"
                } else {
                    ""
                }
            )
            .unwrap();
        }
        out.push('\n');

        for (keyword, children) in [
            ("allOf", &node.all_of),
            ("anyOf", &node.any_of),
            ("oneOf", &node.one_of),
        ] {
            if !children.is_empty() {
                writeln!(out, "{}  {}:", pad, keyword).unwrap();
                for child in children {
                    self.dump_node(*child, indent + 2, out);
                }
            }
        }
        if let Some(not) = node.not {
            writeln!(out, "{}  not:", pad).unwrap();
            self.dump_node(not, indent + 2, out);
        }
        if !node.defs.is_empty() {
            writeln!(out, "{}  $defs:", pad).unwrap();
            for (name, child) in &node.defs {
                writeln!(out, "{}    {}:", pad, name).unwrap();
                self.dump_node(*child, indent + 3, out);
            }
        }

        match &node.kind {
            Kind::Object(obj) => {
                if obj.min_properties > 0 {
                    writeln!(out, "{}  minProperties: {}", pad, obj.min_properties).unwrap();
                }
                if let Some(max) = obj.max_properties {
                    writeln!(out, "{}  maxProperties: {}", pad, max).unwrap();
                }
                for (name, child) in &obj.properties {
                    writeln!(out, "{}  {}:", pad, name).unwrap();
                    self.dump_node(*child, indent + 1, out);
                }
                for (pattern, child) in &obj.pattern_properties {
                    writeln!(out, "{}  {}:", pad, pattern.source()).unwrap();
                    self.dump_node(*child, indent + 1, out);
                }
                if let Some(child) = obj.additional_properties {
                    writeln!(out, "{}  additionalProperties:", pad).unwrap();
                    self.dump_node(child, indent + 1, out);
                }
                if let Some(child) = obj.property_names {
                    writeln!(out, "{}  propertyNames:", pad).unwrap();
                    self.dump_node(child, indent + 1, out);
                }
                if !obj.dependent_schemas.is_empty() {
                    writeln!(out, "{}  dependentSchemas:", pad).unwrap();
                    for (name, child) in &obj.dependent_schemas {
                        writeln!(out, "{}    {}:", pad, name).unwrap();
                        self.dump_node(*child, indent + 2, out);
                    }
                }
            }
            Kind::Array(arr) => {
                for child in &arr.items {
                    self.dump_node(*child, indent + 1, out);
                }
                if let Some(child) = arr.additional_items {
                    writeln!(out, "{}  additionalItems:", pad).unwrap();
                    self.dump_node(child, indent + 1, out);
                }
                if let Some(child) = arr.contains {
                    writeln!(out, "{}  contains:", pad).unwrap();
                    self.dump_node(child, indent + 1, out);
                }
            }
            _ => (),
        }
    }
}

// escape_token applies JSON-Pointer escaping to a path segment.
fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
