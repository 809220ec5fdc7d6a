use super::{Kind, NodeId, Tree};

// Expect is the context in which the next reference segment is interpreted.
// A `$defs`, `properties`, or `items` segment stays on the current node and
// switches the context for the segment that follows.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Expect {
    Any,
    DefKey,
    PropertyKey,
    ItemIndex,
}

/// resolve_references walks every node of the built tree and links each
/// non-empty `$ref` to its referent. Unresolvable references are left
/// unlinked; the walk always continues.
pub fn resolve_references(tree: &mut Tree) {
    let Some(root) = tree.root else {
        return;
    };

    for id in tree.node_ids().collect::<Vec<_>>() {
        if tree.node(id).ref_ptr.is_empty() {
            continue;
        }
        let target = resolve_pointer(tree, root, &tree.node(id).ref_ptr);
        tree.node_mut(id).resolved_ref = target;
    }
}

// resolve_pointer resolves a decoded reference against the tree root,
// one `/`-separated segment at a time.
fn resolve_pointer(tree: &Tree, root: NodeId, ptr: &str) -> Option<NodeId> {
    let mut node = root;
    let mut expect = Expect::Any;

    for raw in ptr.split('/') {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        (node, expect) = step(tree, root, node, &segment, expect)?;
    }
    Some(node)
}

fn step(
    tree: &Tree,
    root: NodeId,
    node: NodeId,
    segment: &str,
    expect: Expect,
) -> Option<(NodeId, Expect)> {
    match expect {
        Expect::DefKey => tree
            .node(node)
            .defs
            .get(segment)
            .map(|child| (*child, Expect::Any)),
        Expect::PropertyKey => match &tree.node(node).kind {
            Kind::Object(obj) => obj
                .properties
                .get(segment)
                .map(|child| (*child, Expect::Any)),
            _ => None,
        },
        Expect::ItemIndex => match &tree.node(node).kind {
            Kind::Array(arr) => {
                let index = segment.parse::<usize>().ok()?;
                arr.items.get(index).map(|child| (*child, Expect::Any))
            }
            _ => None,
        },
        Expect::Any => {
            if segment == "#" && node == root {
                Some((node, Expect::Any))
            } else if let Some(name) = segment.strip_prefix('#') {
                tree.anchors.get(name).map(|anchor| (*anchor, Expect::Any))
            } else if segment == "$defs" {
                Some((node, Expect::DefKey))
            } else if segment == "properties" && matches!(tree.node(node).kind, Kind::Object(_)) {
                Some((node, Expect::PropertyKey))
            } else if segment == "items" && matches!(tree.node(node).kind, Kind::Array(_)) {
                Some((node, Expect::ItemIndex))
            } else if !tree.node(node).id.is_empty() && tree.node(node).id == segment {
                Some((node, Expect::Any))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::schema::{compile, Kind};
    use serde_json::json;

    #[test]
    fn test_defs_reference_resolves() {
        let compiled = compile(&json!({
            "$defs": {"pos": {"type": "integer", "minimum": 0}},
            "$ref": "#/$defs/pos",
        }));
        assert!(compiled.ok());
        let tree = compiled.tree;
        let root = tree.root.unwrap();

        let target = tree.node(root).resolved_ref.expect("reference resolves");
        assert_eq!(Some(target), tree.node(root).defs.get("pos").copied());
    }

    #[test]
    fn test_property_and_item_references_resolve() {
        let compiled = compile(&json!({
            "type": "object",
            "properties": {
                "foo": {"type": "integer"},
                "bar": {"$ref": "#/properties/foo"},
                "baz": {"$ref": "#/properties/foo/junk"},
            },
        }));
        let tree = compiled.tree;
        let Kind::Object(obj) = &tree.node(tree.root.unwrap()).kind else {
            panic!("expected an object node");
        };
        assert_eq!(
            tree.node(obj.properties["bar"]).resolved_ref,
            Some(obj.properties["foo"])
        );
        // A failed segment leaves the reference unlinked.
        assert_eq!(tree.node(obj.properties["baz"]).resolved_ref, None);

        let compiled = compile(&json!({
            "items": [
                {"type": "integer"},
                {"$ref": "#/items/0"},
                {"$ref": "#/items/12"},
            ],
        }));
        let tree = compiled.tree;
        let Kind::Array(arr) = &tree.node(tree.root.unwrap()).kind else {
            panic!("expected an array node");
        };
        assert_eq!(tree.node(arr.items[1]).resolved_ref, Some(arr.items[0]));
        assert_eq!(tree.node(arr.items[2]).resolved_ref, None);
    }

    #[test]
    fn test_root_and_anchor_references() {
        let compiled = compile(&json!({
            "type": "object",
            "properties": {
                "self": {"$ref": "#"},
                "named": {"$ref": "#two"},
            },
            "$defs": {
                "two": {"$anchor": "two", "type": "integer"},
            },
        }));
        let tree = compiled.tree;
        let root = tree.root.unwrap();
        let Kind::Object(obj) = &tree.node(root).kind else {
            panic!("expected an object node");
        };
        assert_eq!(tree.node(obj.properties["self"]).resolved_ref, Some(root));
        assert_eq!(
            tree.node(obj.properties["named"]).resolved_ref,
            tree.node(root).defs.get("two").copied()
        );
    }

    #[test]
    fn test_escaped_segments() {
        let compiled = compile(&json!({
            "$defs": {
                "tilde~field": {"type": "integer"},
                "slash/field": {"type": "string"},
            },
            "type": "object",
            "properties": {
                "a": {"$ref": "#/$defs/tilde~0field"},
                "b": {"$ref": "#/$defs/slash~1field"},
                "c": {"$ref": "#/$defs/slash%2Ffield"},
            },
        }));
        let tree = compiled.tree;
        let root = tree.root.unwrap();
        let Kind::Object(obj) = &tree.node(root).kind else {
            panic!("expected an object node");
        };
        let defs = &tree.node(root).defs;
        assert_eq!(
            tree.node(obj.properties["a"]).resolved_ref,
            defs.get("tilde~field").copied()
        );
        assert_eq!(
            tree.node(obj.properties["b"]).resolved_ref,
            defs.get("slash/field").copied()
        );
        assert_eq!(
            tree.node(obj.properties["c"]).resolved_ref,
            defs.get("slash/field").copied()
        );
    }
}
