use super::{
    keywords, resolve, ArrayNode, BooleanNode, Kind, Node, NodeId, NumberNode, ObjectNode,
    Pattern, StringNode, Tree,
};
use crate::compare::json_eq;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// The only meta-schema this crate understands.
pub const DRAFT_2019_09: &str = "https://json-schema.org/draft/2019-09/schema";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("root schema is not a JSON object or boolean")]
    ExpectedRootSchema,
    #[error("unsupported $schema '{0}': only the draft 2019-09 meta-schema is understood")]
    UnknownMetaSchema(String),
    #[error("multiple types for a schema are not supported")]
    TypeArrayUnsupported,
    #[error("'items' value is not a schema or array of schemas")]
    ExpectedSchemaOrArrayOfSchemas,
    #[error("'{0}' value is not a JSON array")]
    ExpectedArray(&'static str),
    #[error("'{0}' value is not a JSON object")]
    ExpectedObject(&'static str),
    #[error("'{0}' value is not a JSON string")]
    ExpectedString(&'static str),
    #[error("'{0}' value is not a JSON number")]
    ExpectedNumber(&'static str),
    #[error("'{0}' value is not a non-negative integer")]
    ExpectedUnsigned(&'static str),
    #[error("'{0}' value is not a JSON boolean")]
    ExpectedBool(&'static str),
    #[error("'{0}' element is not a JSON string")]
    ExpectedStringElement(&'static str),
    #[error("'multipleOf' value is not strictly positive")]
    NonPositiveMultipleOf,
    #[error("failed to compile pattern '{pattern}': {detail}")]
    PatternError {
        pattern: String,
        #[source]
        detail: regex::Error,
    },
}

/// Result of compiling a schema document: a best-effort Tree, plus every
/// structural defect encountered along the way. Callers treat a non-empty
/// error list as compilation failure; the partial tree remains available
/// for diagnostics.
#[derive(Debug)]
pub struct Compiled {
    pub tree: Tree,
    pub errors: Vec<Error>,
}

impl Compiled {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// compile translates a JSON schema document into a Tree of typed constraint
/// nodes, with `$ref`s resolved against the built tree.
pub fn compile(schema: &Value) -> Compiled {
    let mut builder = Builder {
        tree: Tree::new(),
        errors: Vec::new(),
        anchors: Vec::new(),
    };

    let root = match schema {
        Value::Bool(verdict) => Some(builder.tree.alloc(Node::new(
            Kind::Boolean(BooleanNode {
                value: Some(*verdict),
            }),
            None,
        ))),
        Value::Object(obj) => {
            if let Some(meta) = obj.get(keywords::SCHEMA) {
                let meta = meta.as_str().unwrap_or_default();
                if meta != DRAFT_2019_09 {
                    builder.errors.push(Error::UnknownMetaSchema(meta.to_owned()));
                }
            }
            builder.build_node(schema, None)
        }
        _ => {
            builder.errors.push(Error::ExpectedRootSchema);
            None
        }
    };

    let Builder {
        mut tree,
        errors,
        anchors,
    } = builder;
    tree.root = root;
    for (name, id) in anchors {
        tree.anchors.entry(name).or_insert(id);
    }
    resolve::resolve_references(&mut tree);

    Compiled { tree, errors }
}

// Keyword families implying a node variant when `type` is absent.
const NUMBER_TRIGGERS: &[&str] = &[
    keywords::MINIMUM,
    keywords::MAXIMUM,
    keywords::EXCLUSIVE_MINIMUM,
    keywords::EXCLUSIVE_MAXIMUM,
    keywords::MULTIPLE_OF,
];
const ARRAY_TRIGGERS: &[&str] = &[
    keywords::ITEMS,
    keywords::UNEVALUATED_ITEMS,
    keywords::MAX_ITEMS,
    keywords::MIN_ITEMS,
    keywords::UNIQUE_ITEMS,
    keywords::CONTAINS,
    keywords::MAX_CONTAINS,
    keywords::MIN_CONTAINS,
];
const STRING_TRIGGERS: &[&str] = &[
    keywords::MAX_LENGTH,
    keywords::MIN_LENGTH,
    keywords::PATTERN,
];
const OBJECT_TRIGGERS: &[&str] = &[
    keywords::PROPERTIES,
    keywords::ADDITIONAL_PROPERTIES,
    keywords::PATTERN_PROPERTIES,
    keywords::MIN_PROPERTIES,
    keywords::MAX_PROPERTIES,
    keywords::REQUIRED,
    keywords::DEPENDENT_REQUIRED,
    keywords::DEPENDENT_SCHEMAS,
];

fn has_any(obj: &Map<String, Value>, triggers: &[&str]) -> bool {
    triggers.iter().any(|k| obj.contains_key(*k))
}

struct Builder {
    tree: Tree,
    errors: Vec<Error>,
    // (name, node) pairs bound by $anchor and $id, folded into the root
    // anchors map once the build completes.
    anchors: Vec<(String, NodeId)>,
}

impl Builder {
    // build_node compiles |v| into a typed node owned by |parent|.
    // JSON values which cannot denote a schema compile to nothing.
    fn build_node(&mut self, v: &Value, parent: Option<NodeId>) -> Option<NodeId> {
        match v {
            Value::Bool(verdict) => Some(self.tree.alloc(Node::new(
                Kind::Boolean(BooleanNode {
                    value: Some(*verdict),
                }),
                parent,
            ))),
            Value::Null => Some(self.tree.alloc(Node::new(Kind::Null, parent))),
            Value::Array(members) => {
                let id = self
                    .tree
                    .alloc(Node::new(Kind::Array(ArrayNode::default()), parent));
                let mut items = Vec::new();
                for member in members {
                    if let Some(child) = self.build_node(member, Some(id)) {
                        items.push(child);
                    }
                }
                if let Kind::Array(arr) = &mut self.tree.node_mut(id).kind {
                    arr.items = items;
                }
                Some(id)
            }
            Value::Object(obj) => Some(self.build_schema_object(obj, parent)),
            _ => None,
        }
    }

    fn build_schema_object(&mut self, obj: &Map<String, Value>, parent: Option<NodeId>) -> NodeId {
        let type_val = obj.get(keywords::TYPE);
        if matches!(type_val, Some(Value::Array(_))) {
            self.errors.push(Error::TypeArrayUnsupported);
        }
        let type_str = type_val.and_then(Value::as_str).unwrap_or("");

        // Pick the node variant: an explicit `type` decides directly, else
        // the first matching keyword family. An empty schema object is the
        // schema `true`.
        let kind = if type_str == "null" {
            Kind::Null
        } else if type_str == "boolean" {
            Kind::Boolean(BooleanNode::default())
        } else if type_str == "number" || type_str == "integer" || has_any(obj, NUMBER_TRIGGERS) {
            Kind::Number(self.number_node(obj, type_str == "integer"))
        } else if type_str == "array" || has_any(obj, ARRAY_TRIGGERS) {
            Kind::Array(ArrayNode::default())
        } else if type_str == "string" || has_any(obj, STRING_TRIGGERS) {
            Kind::String(self.string_node(obj))
        } else if obj.is_empty() {
            Kind::Boolean(BooleanNode { value: Some(true) })
        } else if type_str == "object" || has_any(obj, OBJECT_TRIGGERS) {
            Kind::Object(ObjectNode::default())
        } else {
            Kind::Undefined
        };

        let id = self.tree.alloc(Node::new(kind, parent));
        self.tree.node_mut(id).type_str = type_str.to_owned();

        // Shared keywords.
        if let Some(v) = obj.get(keywords::ID) {
            match v.as_str() {
                Some(s) => {
                    self.tree.node_mut(id).id = s.to_owned();
                    if !s.is_empty() {
                        self.anchors.push((s.to_owned(), id));
                    }
                }
                None => self.errors.push(Error::ExpectedString(keywords::ID)),
            }
        }
        if let Some(v) = obj.get(keywords::ANCHOR) {
            match v.as_str() {
                Some(s) => self.anchors.push((s.to_owned(), id)),
                None => self.errors.push(Error::ExpectedString(keywords::ANCHOR)),
            }
        }
        if let Some(v) = obj.get(keywords::REF) {
            match v.as_str() {
                Some(s) if !s.is_empty() => self.tree.node_mut(id).ref_ptr = decode_ref(s),
                Some(_) => (),
                None => self.errors.push(Error::ExpectedString(keywords::REF)),
            }
        }
        if let Some(v) = obj.get(keywords::DEFAULT) {
            self.tree.node_mut(id).default_value = Some(v.clone());
        }
        if let Some(v) = obj.get(keywords::ENUM) {
            match v {
                Value::Array(members) => {
                    for member in members {
                        // Duplicates are suppressed on insertion.
                        let node = self.tree.node(id);
                        if !node.enum_values.iter().any(|m| json_eq(m, member)) {
                            self.tree.node_mut(id).enum_values.push(member.clone());
                        }
                    }
                }
                _ => self.errors.push(Error::ExpectedArray(keywords::ENUM)),
            }
        }

        // Composition keywords.
        let all_of = self.build_schema_list(keywords::ALL_OF, obj, id);
        self.tree.node_mut(id).all_of = all_of;
        let any_of = self.build_schema_list(keywords::ANY_OF, obj, id);
        self.tree.node_mut(id).any_of = any_of;
        let one_of = self.build_schema_list(keywords::ONE_OF, obj, id);
        self.tree.node_mut(id).one_of = one_of;

        if let Some(v) = obj.get(keywords::NOT) {
            let child = self.build_node(v, Some(id));
            self.tree.node_mut(id).not = child;
        }
        if let Some(v) = obj.get(keywords::DEFS) {
            match v {
                Value::Object(members) => {
                    for (name, member) in members {
                        if let Some(child) = self.build_node(member, Some(id)) {
                            self.tree.node_mut(id).defs.insert(name.clone(), child);
                        }
                    }
                }
                _ => self.errors.push(Error::ExpectedObject(keywords::DEFS)),
            }
        }

        // Variant-specific keywords of the recursive variants. Number and
        // String payloads were already extracted above.
        if matches!(self.tree.node(id).kind, Kind::Array(_)) {
            let payload = self.array_node(obj, id);
            self.tree.node_mut(id).kind = Kind::Array(payload);
        } else if matches!(self.tree.node(id).kind, Kind::Object(_)) {
            let payload = self.object_node(obj, id);
            self.tree.node_mut(id).kind = Kind::Object(payload);
        }

        id
    }

    // build_schema_list compiles a schema-array keyword (allOf / anyOf /
    // oneOf), returning the compiled children.
    fn build_schema_list(
        &mut self,
        keyword: &'static str,
        obj: &Map<String, Value>,
        parent: NodeId,
    ) -> Vec<NodeId> {
        let mut children = Vec::new();
        match obj.get(keyword) {
            None => (),
            Some(Value::Array(members)) => {
                for member in members {
                    if let Some(child) = self.build_node(member, Some(parent)) {
                        children.push(child);
                    }
                }
            }
            Some(_) => self.errors.push(Error::ExpectedArray(keyword)),
        }
        children
    }

    fn number_node(&mut self, obj: &Map<String, Value>, is_integer: bool) -> NumberNode {
        let mut node = NumberNode {
            is_integer,
            ..NumberNode::default()
        };
        node.minimum = self.float_keyword(obj, keywords::MINIMUM);
        node.maximum = self.float_keyword(obj, keywords::MAXIMUM);
        node.exclusive_minimum = self.float_keyword(obj, keywords::EXCLUSIVE_MINIMUM);
        node.exclusive_maximum = self.float_keyword(obj, keywords::EXCLUSIVE_MAXIMUM);
        match self.float_keyword(obj, keywords::MULTIPLE_OF) {
            Some(multiple) if multiple > 0.0 => node.multiple_of = Some(multiple),
            Some(_) => self.errors.push(Error::NonPositiveMultipleOf),
            None => (),
        }
        node
    }

    fn string_node(&mut self, obj: &Map<String, Value>) -> StringNode {
        let mut node = StringNode::default();
        if let Some(v) = obj.get(keywords::PATTERN) {
            match v.as_str() {
                Some(source) => match Pattern::compile(source) {
                    Ok(pattern) => node.pattern = Some(pattern),
                    Err(detail) => self.errors.push(Error::PatternError {
                        pattern: source.to_owned(),
                        detail,
                    }),
                },
                None => self.errors.push(Error::ExpectedString(keywords::PATTERN)),
            }
        }
        node.min_length = self.unsigned_keyword(obj, keywords::MIN_LENGTH);
        node.max_length = self.unsigned_keyword(obj, keywords::MAX_LENGTH);
        node
    }

    fn array_node(&mut self, obj: &Map<String, Value>, id: NodeId) -> ArrayNode {
        let mut node = ArrayNode::default();
        node.min_items = self.unsigned_keyword(obj, keywords::MIN_ITEMS).unwrap_or(0);
        node.max_items = self.unsigned_keyword(obj, keywords::MAX_ITEMS);

        match obj.get(keywords::UNIQUE_ITEMS) {
            None => (),
            Some(Value::Bool(unique)) => node.unique_items = *unique,
            Some(_) => self.errors.push(Error::ExpectedBool(keywords::UNIQUE_ITEMS)),
        }
        if let Some(v) = obj.get(keywords::ADDITIONAL_ITEMS) {
            node.additional_items = self.build_node(v, Some(id));
        }
        if let Some(v) = obj.get(keywords::CONTAINS) {
            node.contains = self.build_node(v, Some(id));
        }
        match obj.get(keywords::ITEMS) {
            None => (),
            // Tuple form: element i of the instance validates against
            // schema i, with additionalItems applying beyond the tuple.
            Some(Value::Array(members)) => {
                node.items_is_array = true;
                for member in members {
                    if let Some(child) = self.build_node(member, Some(id)) {
                        node.items.push(child);
                    }
                }
            }
            // Single form: one schema applying to every element.
            Some(v @ (Value::Object(_) | Value::Bool(_))) => {
                node.items.extend(self.build_node(v, Some(id)));
            }
            Some(_) => self.errors.push(Error::ExpectedSchemaOrArrayOfSchemas),
        }
        node
    }

    fn object_node(&mut self, obj: &Map<String, Value>, id: NodeId) -> ObjectNode {
        let mut node = ObjectNode::default();
        node.min_properties = self
            .unsigned_keyword(obj, keywords::MIN_PROPERTIES)
            .unwrap_or(0);
        node.max_properties = self.unsigned_keyword(obj, keywords::MAX_PROPERTIES);

        match obj.get(keywords::PROPERTIES) {
            None => (),
            Some(Value::Object(members)) => {
                for (name, member) in members {
                    if let Some(child) = self.build_node(member, Some(id)) {
                        node.properties.insert(name.clone(), child);
                    }
                }
            }
            Some(_) => self.errors.push(Error::ExpectedObject(keywords::PROPERTIES)),
        }
        match obj.get(keywords::PATTERN_PROPERTIES) {
            None => (),
            Some(Value::Object(members)) => {
                for (source, member) in members {
                    let pattern = match Pattern::compile(source) {
                        Ok(pattern) => pattern,
                        Err(detail) => {
                            self.errors.push(Error::PatternError {
                                pattern: source.clone(),
                                detail,
                            });
                            continue;
                        }
                    };
                    if let Some(child) = self.build_node(member, Some(id)) {
                        node.pattern_properties.push((pattern, child));
                    }
                }
            }
            Some(_) => self
                .errors
                .push(Error::ExpectedObject(keywords::PATTERN_PROPERTIES)),
        }
        if let Some(v) = obj.get(keywords::ADDITIONAL_PROPERTIES) {
            node.additional_properties = self.build_node(v, Some(id));
        }
        if node.additional_properties.is_none() {
            // Unmatched properties are allowed unless the schema says otherwise.
            node.additional_properties = Some(self.tree.alloc(Node::new(
                Kind::Boolean(BooleanNode { value: Some(true) }),
                Some(id),
            )));
        }
        if let Some(v) = obj.get(keywords::PROPERTY_NAMES) {
            node.property_names = self.build_node(v, Some(id));
        }

        match obj.get(keywords::REQUIRED) {
            None => (),
            Some(Value::Array(members)) => {
                for member in members {
                    match member.as_str() {
                        Some(name) => {
                            if let Some(child) = node.properties.get(name) {
                                self.tree.node_mut(*child).required = true;
                            }
                            node.required.insert(name.to_owned());
                        }
                        None => self
                            .errors
                            .push(Error::ExpectedStringElement(keywords::REQUIRED)),
                    }
                }
            }
            Some(_) => self.errors.push(Error::ExpectedArray(keywords::REQUIRED)),
        }
        match obj.get(keywords::DEPENDENT_REQUIRED) {
            None => (),
            Some(Value::Object(members)) => {
                for (name, deps) in members {
                    let mut then = BTreeSet::new();
                    match deps {
                        Value::Array(deps) => {
                            for dep in deps {
                                match dep.as_str() {
                                    Some(dep) => {
                                        then.insert(dep.to_owned());
                                    }
                                    None => self.errors.push(Error::ExpectedStringElement(
                                        keywords::DEPENDENT_REQUIRED,
                                    )),
                                }
                            }
                        }
                        _ => self
                            .errors
                            .push(Error::ExpectedArray(keywords::DEPENDENT_REQUIRED)),
                    }
                    node.dependent_required.insert(name.clone(), then);
                }
            }
            Some(_) => self
                .errors
                .push(Error::ExpectedObject(keywords::DEPENDENT_REQUIRED)),
        }
        match obj.get(keywords::DEPENDENT_SCHEMAS) {
            None => (),
            Some(Value::Object(members)) => {
                for (name, member) in members {
                    if let Some(child) = self.build_node(member, Some(id)) {
                        node.dependent_schemas.insert(name.clone(), child);
                    }
                }
            }
            Some(_) => self
                .errors
                .push(Error::ExpectedObject(keywords::DEPENDENT_SCHEMAS)),
        }
        node
    }

    fn float_keyword(&mut self, obj: &Map<String, Value>, keyword: &'static str) -> Option<f64> {
        match obj.get(keyword) {
            None => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(_) => {
                self.errors.push(Error::ExpectedNumber(keyword));
                None
            }
        }
    }

    fn unsigned_keyword(&mut self, obj: &Map<String, Value>, keyword: &'static str) -> Option<usize> {
        match obj.get(keyword) {
            None => None,
            Some(v) => match v.as_u64() {
                Some(bound) => Some(bound as usize),
                None => {
                    self.errors.push(Error::ExpectedUnsigned(keyword));
                    None
                }
            },
        }
    }
}

// decode_ref decodes %HH escapes of a raw $ref. An escaped '/' or '~'
// becomes its JSON-Pointer escape sequence, so that it survives later
// segmentation on '/'; every other escape decodes to its byte. The decoded
// buffer is re-read as UTF-8 in one pass, so multi-byte escape sequences
// (and literal multi-byte characters elsewhere in the string) come through
// intact; malformed sequences are replaced rather than dropped.
fn decode_ref(raw: &str) -> String {
    if !raw.contains('%') {
        return raw.to_owned();
    }
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let byte = u8::from_str_radix(&raw[i + 1..i + 3], 16).unwrap_or_default();
            match byte {
                b'/' => out.extend_from_slice(b"~1"),
                b'~' => out.extend_from_slice(b"~0"),
                byte => out.push(byte),
            }
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
