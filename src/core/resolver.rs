//! AZ-003: Reference token resolution and cycle detection.
//!
//! Tokens resolve to the literal they point at (following chains of tokens),
//! or to a deferred marker (the provisioning engine's interpolation
//! expression) when the attribute is only known at provisioning time.
//! The token graph is checked for cycles once before anything resolves.

use super::error::{ComposeError, ComposeResult};
use super::hasher::short_hash;
use super::tree::ConstructTree;
use super::types::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static UNSAFE_CHARS: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[^A-Za-z0-9_-]").expect("static pattern"));

/// Outcome of resolving one token or value.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Concrete value known at synthesis time
    Literal(serde_json::Value),
    /// Engine interpolation expression, e.g. `${azurerm_subnet.net_a_1f2e3d4c.id}`
    Deferred(String),
}

impl Resolved {
    /// JSON form emitted into the document. Deferred markers become strings.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Literal(v) => v,
            Self::Deferred(marker) => serde_json::Value::String(marker),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// String form used inside a concatenation.
    fn as_fragment(&self) -> String {
        match self {
            Self::Deferred(marker) => marker.clone(),
            Self::Literal(serde_json::Value::String(s)) => s.clone(),
            Self::Literal(serde_json::Value::Null) => String::new(),
            Self::Literal(other) => other.to_string(),
        }
    }
}

/// Replace characters the engine rejects in identifiers.
pub fn sanitize(segment: &str) -> String {
    UNSAFE_CHARS.replace_all(segment, "_").into_owned()
}

/// Stable logical id of the node at `path`.
///
/// The readable prefix joins the sanitized segments below the stack root;
/// the suffix is a short BLAKE3 of the full rendered path, so the id depends
/// only on the path.
pub fn logical_id(path: &NodePath) -> String {
    let segments = path.segments();
    let readable = if segments.len() > 1 {
        &segments[1..]
    } else {
        segments
    };
    let prefix: Vec<String> = readable.iter().map(|s| sanitize(s)).collect();
    format!("{}_{}", prefix.join("_"), short_hash(&path.to_string()))
}

/// Engine interpolation expression for an attribute of an emitted node.
fn deferred_marker(node: &ResourceNode, attribute: &str) -> Option<String> {
    let lid = logical_id(node.path());
    match node.node_type() {
        NodeType::Scope => None,
        NodeType::Resource(t) => Some(format!("${{{}.{}.{}}}", t, lid, attribute)),
        NodeType::Data(t) => Some(format!("${{data.{}.{}.{}}}", t, lid, attribute)),
    }
}

/// An attribute "holds a value" when it is present and not null.
fn held_value<'a>(tree: &'a ConstructTree, id: NodeId, attribute: &str) -> Option<&'a Value> {
    tree.attribute(id, attribute)
        .filter(|v| !matches!(v, Value::Null))
}

/// Engine address of an emitted node, as written in `depends_on`.
pub fn dependency_key(node: &ResourceNode) -> Option<String> {
    let lid = logical_id(node.path());
    match node.node_type() {
        NodeType::Scope => None,
        NodeType::Resource(t) => Some(format!("{}.{}", t, lid)),
        NodeType::Data(t) => Some(format!("data.{}.{}", t, lid)),
    }
}

fn render_vertex(tree: &ConstructTree, vertex: &(NodeId, String)) -> String {
    format!("{}.{}", tree.path(vertex.0), vertex.1)
}

// ============================================================================
// Cycle detection
// ============================================================================

/// Fail with `ReferenceCycle` if any chain of tokens loops back on itself.
///
/// Vertices are `(node, attribute)` pairs holding a value; edges follow every
/// token inside that value. Depth-first with an in-progress set, visiting
/// nodes in traversal order and attributes in insertion order.
pub fn detect_cycles(tree: &ConstructTree) -> ComposeResult<()> {
    let mut done: FxHashSet<(NodeId, String)> = FxHashSet::default();
    let mut trail: Vec<(NodeId, String)> = Vec::new();

    for id in tree.walk() {
        for name in tree.node(id).attributes().keys() {
            let vertex = (id, name.clone());
            if !done.contains(&vertex) {
                visit(tree, vertex, &mut trail, &mut done)?;
            }
        }
    }
    Ok(())
}

fn visit(
    tree: &ConstructTree,
    vertex: (NodeId, String),
    trail: &mut Vec<(NodeId, String)>,
    done: &mut FxHashSet<(NodeId, String)>,
) -> ComposeResult<()> {
    if let Some(pos) = trail.iter().position(|v| *v == vertex) {
        let mut cycle: Vec<String> = trail[pos..]
            .iter()
            .map(|v| render_vertex(tree, v))
            .collect();
        cycle.push(render_vertex(tree, &vertex));
        return Err(ComposeError::ReferenceCycle { cycle });
    }
    if done.contains(&vertex) {
        return Ok(());
    }
    let Some(value) = held_value(tree, vertex.0, &vertex.1) else {
        return Ok(());
    };

    trail.push(vertex.clone());
    for reference in value.references() {
        let Some(target) = tree.find(&reference.source) else {
            continue;
        };
        if held_value(tree, target, &reference.attribute).is_some() {
            visit(tree, (target, reference.attribute.clone()), trail, done)?;
        }
    }
    trail.pop();
    done.insert(vertex);
    Ok(())
}

// ============================================================================
// Resolution
// ============================================================================

/// Memoizing resolver bound to one tree. Each `(node, attribute)` resolves
/// at most once per resolver.
///
/// Every emitted node a token passes through is recorded, including nodes
/// whose literal was substituted, so callers can declare the dependency.
pub struct Resolver<'a> {
    tree: &'a ConstructTree,
    memo: FxHashMap<(NodeId, String), (Resolved, BTreeSet<String>)>,
    in_progress: FxHashSet<(NodeId, String)>,
    touched: BTreeSet<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(tree: &'a ConstructTree) -> Self {
        Self {
            tree,
            memo: FxHashMap::default(),
            in_progress: FxHashSet::default(),
            touched: BTreeSet::new(),
        }
    }

    /// Drain the dependency keys recorded since the last call, sorted.
    pub fn take_dependencies(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.touched)
    }

    /// Number of distinct tokens resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.memo.len()
    }

    /// Resolve a single reference token.
    pub fn resolve(&mut self, reference: &Reference) -> ComposeResult<Resolved> {
        let id = self
            .tree
            .find(&reference.source)
            .ok_or_else(|| unresolved(reference))?;
        let key = (id, reference.attribute.clone());
        if let Some((hit, deps)) = self.memo.get(&key) {
            self.touched.extend(deps.iter().cloned());
            return Ok(hit.clone());
        }

        let outer = std::mem::take(&mut self.touched);
        let outcome = self.resolve_uncached(id, reference);
        let mut deps = std::mem::replace(&mut self.touched, outer);
        let resolved = outcome?;
        deps.extend(dependency_key(self.tree.node(id)));
        self.touched.extend(deps.iter().cloned());
        self.memo.insert(key, (resolved.clone(), deps));
        Ok(resolved)
    }

    fn resolve_uncached(&mut self, id: NodeId, reference: &Reference) -> ComposeResult<Resolved> {
        let Some(value) = held_value(self.tree, id, &reference.attribute) else {
            return deferred_marker(self.tree.node(id), &reference.attribute)
                .map(Resolved::Deferred)
                .ok_or_else(|| unresolved(reference));
        };
        let key = (id, reference.attribute.clone());
        if !self.in_progress.insert(key.clone()) {
            return Err(ComposeError::ReferenceCycle {
                cycle: vec![reference.to_string(), reference.to_string()],
            });
        }
        let outcome = self.resolve_value(value);
        self.in_progress.remove(&key);
        outcome
    }

    /// Resolve every token inside a value.
    ///
    /// Composite values resolve to literals; deferred parts are embedded as
    /// marker strings. A bare token keeps its own outcome.
    pub fn resolve_value(&mut self, value: &Value) -> ComposeResult<Resolved> {
        let json = match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Ref(r) => return self.resolve(r),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_value(item)?.into_json());
                }
                serde_json::Value::Array(out)
            }
            Value::Map(entries) => {
                let mut out = serde_json::Map::new();
                for (k, v) in entries.iter().filter(|(_, v)| !matches!(v, Value::Null)) {
                    out.insert(k.clone(), self.resolve_value(v)?.into_json());
                }
                serde_json::Value::Object(out)
            }
            Value::Concat(parts) => {
                let mut joined = String::new();
                let mut deferred = false;
                for part in parts {
                    let resolved = self.resolve_value(part)?;
                    deferred |= resolved.is_deferred();
                    joined.push_str(&resolved.as_fragment());
                }
                return Ok(if deferred {
                    Resolved::Deferred(joined)
                } else {
                    Resolved::Literal(serde_json::Value::String(joined))
                });
            }
        };
        Ok(Resolved::Literal(json))
    }
}

fn unresolved(reference: &Reference) -> ComposeError {
    ComposeError::UnresolvedReference {
        path: reference.source.to_string(),
        attribute: reference.attribute.clone(),
    }
}

/// Resolve one token against `tree` without sharing a memo.
pub fn resolve(reference: &Reference, tree: &ConstructTree) -> ComposeResult<Resolved> {
    Resolver::new(tree).resolve(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::StackContext;
    use serde_json::json;

    fn tree() -> ConstructTree {
        ConstructTree::new("s", StackContext::placeholder()).unwrap()
    }

    fn resource(t: &mut ConstructTree, seg: &str, attrs: Attributes) -> NodeId {
        let root = t.root();
        t.create_node(root, seg, NodeType::resource("azurerm_thing"), attrs)
            .unwrap()
    }

    #[test]
    fn test_az003_logical_id_shape() {
        let path = NodePath::parse("demo/net/vnet");
        let lid = logical_id(&path);
        assert!(lid.starts_with("net_vnet_"));
        assert_eq!(lid.len(), "net_vnet_".len() + 8);
        assert_eq!(lid, logical_id(&path));
        assert_ne!(lid, logical_id(&NodePath::parse("other/net/vnet")));
    }

    #[test]
    fn test_az003_sanitize() {
        assert_eq!(sanitize("10.0.0.0"), "10_0_0_0");
        assert_eq!(sanitize("sub-net_1"), "sub-net_1");
        assert_eq!(sanitize("a b@c"), "a_b_c");
    }

    #[test]
    fn test_az003_literal_and_chain() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::from([("name".into(), Value::from("alpha"))]));
        let name_a = t.reference(a, "name");
        let b = resource(&mut t, "b", Attributes::from([("label".into(), name_a)]));
        let label_b = t.reference(b, "label");
        let c = resource(&mut t, "c", Attributes::from([("copy".into(), label_b)]));

        let Value::Ref(r) = t.reference(c, "copy") else {
            panic!("expected token");
        };
        assert_eq!(resolve(&r, &t).unwrap(), Resolved::Literal(json!("alpha")));
    }

    #[test]
    fn test_az003_unset_attribute_defers() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::new());
        let Value::Ref(r) = t.reference(a, "id") else {
            panic!("expected token");
        };
        let lid = logical_id(t.path(a));
        assert_eq!(
            resolve(&r, &t).unwrap(),
            Resolved::Deferred(format!("${{azurerm_thing.{}.id}}", lid))
        );
    }

    #[test]
    fn test_az003_data_source_marker() {
        let mut t = tree();
        let root = t.root();
        let d = t
            .create_node(root, "cfg", NodeType::data("azurerm_client_config"), Attributes::new())
            .unwrap();
        let Value::Ref(r) = t.reference(d, "tenant_id") else {
            panic!("expected token");
        };
        let marker = resolve(&r, &t).unwrap().into_json();
        assert!(marker
            .as_str()
            .unwrap()
            .starts_with("${data.azurerm_client_config.cfg_"));
    }

    #[test]
    fn test_az003_unset_scope_attribute_is_unresolved() {
        let mut t = tree();
        let root = t.root();
        let scope = t.create_scope(root, "group").unwrap();
        let Value::Ref(r) = t.reference(scope, "id") else {
            panic!("expected token");
        };
        assert!(matches!(
            resolve(&r, &t),
            Err(ComposeError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_az003_missing_path_names_path() {
        let t = tree();
        let r = Reference::new(NodePath::parse("s/ghost"), "id");
        match resolve(&r, &t).unwrap_err() {
            ComposeError::UnresolvedReference { path, attribute } => {
                assert_eq!(path, "s/ghost");
                assert_eq!(attribute, "id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_az003_concat_embeds_markers() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::from([("name".into(), Value::from("va"))]));
        let b = resource(&mut t, "b", Attributes::new());
        let v = Value::concat([t.reference(a, "name"), Value::from("to"), t.reference(b, "name")]);
        let resolved = Resolver::new(&t).resolve_value(&v).unwrap();
        let lid_b = logical_id(t.path(b));
        assert_eq!(
            resolved,
            Resolved::Deferred(format!("vato${{azurerm_thing.{}.name}}", lid_b))
        );

        let literal = Value::concat([Value::from("n-"), Value::from(3u32), Value::from(true)]);
        assert_eq!(
            Resolver::new(&t).resolve_value(&literal).unwrap(),
            Resolved::Literal(json!("n-3true"))
        );
    }

    #[test]
    fn test_az003_nested_composites() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::from([("loc".into(), Value::from("eastus"))]));
        let v = Value::map([
            ("where", t.reference(a, "loc")),
            ("ids", Value::list([t.reference(a, "id")])),
        ]);
        let out = Resolver::new(&t).resolve_value(&v).unwrap().into_json();
        assert_eq!(out["where"], json!("eastus"));
        assert!(out["ids"][0].as_str().unwrap().ends_with(".id}"));
    }

    #[test]
    fn test_az003_null_map_entries_dropped() {
        let t = tree();
        let v = Value::map([("size", Value::from(30u32)), ("extra", Value::Null)]);
        let out = Resolver::new(&t).resolve_value(&v).unwrap().into_json();
        assert_eq!(out, json!({ "size": 30 }));
    }

    #[test]
    fn test_az003_memoized() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::from([("name".into(), Value::from("x"))]));
        let Value::Ref(r) = t.reference(a, "name") else {
            panic!("expected token");
        };
        let mut resolver = Resolver::new(&t);
        resolver.resolve(&r).unwrap();
        resolver.resolve(&r).unwrap();
        assert_eq!(resolver.resolved_count(), 1);
    }

    #[test]
    fn test_az003_records_substituted_sources() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::from([("name".into(), Value::from("alpha"))]));
        let name_a = t.reference(a, "name");
        let b = resource(&mut t, "b", Attributes::from([("label".into(), name_a)]));
        let label_b = t.reference(b, "label");

        let mut resolver = Resolver::new(&t);
        let resolved = resolver.resolve_value(&label_b).unwrap();
        assert_eq!(resolved, Resolved::Literal(json!("alpha")));
        let expected: BTreeSet<String> = [
            format!("azurerm_thing.{}", logical_id(t.path(a))),
            format!("azurerm_thing.{}", logical_id(t.path(b))),
        ]
        .into();
        assert_eq!(resolver.take_dependencies(), expected);
        assert!(resolver.take_dependencies().is_empty());

        // A memo hit still reports the chain.
        resolver.resolve_value(&label_b).unwrap();
        assert_eq!(resolver.take_dependencies(), expected);
    }

    #[test]
    fn test_az003_two_node_cycle() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::new());
        let b = resource(&mut t, "b", Attributes::new());
        let to_b = t.reference(b, "id");
        let to_a = t.reference(a, "id");
        t.set_attribute(a, "id", to_b);
        t.set_attribute(b, "id", to_a);

        match detect_cycles(&t).unwrap_err() {
            ComposeError::ReferenceCycle { cycle } => {
                assert_eq!(cycle, vec!["s/a.id", "s/b.id", "s/a.id"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_az003_self_cycle() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::new());
        let me = t.reference(a, "name");
        t.set_attribute(a, "name", Value::concat([Value::from("x"), me]));
        assert!(matches!(
            detect_cycles(&t),
            Err(ComposeError::ReferenceCycle { .. })
        ));
    }

    #[test]
    fn test_az003_mutual_deferred_is_not_a_cycle() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::new());
        let b = resource(&mut t, "b", Attributes::new());
        let b_id = t.reference(b, "id");
        let a_id = t.reference(a, "id");
        t.set_attribute(a, "peer", b_id);
        t.set_attribute(b, "peer", a_id);
        assert!(detect_cycles(&t).is_ok());
    }

    #[test]
    fn test_az003_resolver_guards_reentry() {
        let mut t = tree();
        let a = resource(&mut t, "a", Attributes::new());
        let me = t.reference(a, "id");
        t.set_attribute(a, "id", me.clone());
        let Value::Ref(r) = me else {
            panic!("expected token");
        };
        assert!(matches!(
            resolve(&r, &t),
            Err(ComposeError::ReferenceCycle { .. })
        ));
    }
}
