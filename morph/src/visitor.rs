use std::{collections::HashMap, sync::Arc};

use ahash::RandomState;

use crate::{ClassRef, ObjectRef, Value};

/// A node of the object graph: anything with identity.
#[derive(Debug, Clone)]
pub enum GraphNode {
    Object(ObjectRef),
    Class(ClassRef),
}

impl GraphNode {
    /// The node a value refers to. Immediates are not nodes.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(object) => Some(GraphNode::Object(object.clone())),
            Value::Class(class) => Some(GraphNode::Class(class.clone())),
            _ => None,
        }
    }

    #[inline]
    pub fn identity(&self) -> usize {
        match self {
            GraphNode::Object(object) => Arc::as_ptr(object) as *const () as usize,
            GraphNode::Class(class) => Arc::as_ptr(class) as *const () as usize,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            GraphNode::Object(object) => Value::Object(object.clone()),
            GraphNode::Class(class) => Value::Class(class.clone()),
        }
    }
}

/// Exposes the direct outgoing references of a node.
pub trait Visitable {
    fn visit_edges(&self, visitor: &mut impl FnMut(GraphNode));
}

impl Visitable for GraphNode {
    #[inline]
    fn visit_edges(&self, visitor: &mut impl FnMut(GraphNode)) {
        match self {
            GraphNode::Object(object) => object.visit_edges(visitor),
            GraphNode::Class(class) => class.visit_edges(visitor),
        }
    }
}

/// Called once per reachable node. Returning `false` skips the node's
/// children.
pub trait Visitor {
    fn visit(&mut self, node: &GraphNode) -> bool;
}

impl<F> Visitor for F
where
    F: FnMut(&GraphNode) -> bool,
{
    #[inline]
    fn visit(&mut self, node: &GraphNode) -> bool {
        self(node)
    }
}

/// Depth-first traversal from `root`, visiting each node at most once.
///
/// Terminates on cyclic graphs. Visited nodes are held until the walk ends
/// so no identity is reused while it runs.
pub fn visit_graph(root: GraphNode, visitor: &mut impl Visitor) {
    let mut visited = HashMap::<usize, GraphNode, RandomState>::default();
    let mut stack = vec![root];
    let mut children = Vec::new();
    while let Some(node) = stack.pop() {
        let identity = node.identity();
        if visited.contains_key(&identity) {
            continue;
        }
        let descend = visitor.visit(&node);
        if descend {
            node.visit_edges(&mut |child| children.push(child));
            stack.extend(children.drain(..).rev());
        }
        visited.insert(identity, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, ContextCreateInfo};

    fn collect(root: &ObjectRef) -> Vec<GraphNode> {
        let mut nodes = Vec::new();
        root.visit_graph(&mut |node: &GraphNode| {
            nodes.push(node.clone());
            true
        });
        nodes
    }

    fn contains(nodes: &[GraphNode], object: &ObjectRef) -> bool {
        nodes.iter().any(|n| matches!(n, GraphNode::Object(o) if Arc::ptr_eq(o, object)))
    }

    #[test]
    fn visits_object_class_and_properties() {
        let ctx = Context::new(ContextCreateInfo::default());
        let point = ctx.define_class("Point", &ctx.core().object);
        let a = ctx.allocate(&point);
        let b = ctx.allocate(&point);
        a.set_property("@x", Value::from(1)).expect("ok");
        a.set_property("@next", Value::Object(b.clone()))
            .expect("ok");
        let nodes = collect(&a);
        assert!(matches!(&nodes[0], GraphNode::Object(o) if Arc::ptr_eq(o, &a)));
        assert!(contains(&nodes, &b));
        assert!(nodes.iter().any(|n| matches!(n, GraphNode::Class(c) if Arc::ptr_eq(c, &point))));
    }

    #[test]
    fn terminates_on_cycles() {
        let ctx = Context::new(ContextCreateInfo::default());
        let point = ctx.define_class("Point", &ctx.core().object);
        let a = ctx.allocate(&point);
        let b = ctx.allocate(&point);
        a.set_property("@self", Value::Object(a.clone()))
            .expect("ok");
        a.set_property("@other", Value::Object(b.clone()))
            .expect("ok");
        b.set_property("@other", Value::Object(a.clone()))
            .expect("ok");
        a.get_or_assign_singleton_class(&ctx).expect("allowed");
        let nodes = collect(&a);
        let objects = nodes
            .iter()
            .filter(|n| matches!(n, GraphNode::Object(_)))
            .count();
        assert_eq!(objects, 2, "each object is visited exactly once");
    }

    #[test]
    fn false_prunes_children() {
        let ctx = Context::new(ContextCreateInfo::default());
        let point = ctx.define_class("Point", &ctx.core().object);
        let a = ctx.allocate(&point);
        let b = ctx.allocate(&point);
        let c = ctx.allocate(&point);
        a.set_property("@b", Value::Object(b.clone())).expect("ok");
        b.set_property("@c", Value::Object(c.clone())).expect("ok");
        let mut seen = Vec::new();
        a.visit_graph(&mut |node: &GraphNode| {
            seen.push(node.clone());
            !matches!(node, GraphNode::Object(o) if Arc::ptr_eq(o, &b))
        });
        assert!(contains(&seen, &b));
        assert!(!contains(&seen, &c));
    }

    #[test]
    fn reaches_array_elements() {
        let ctx = Context::new(ContextCreateInfo::default());
        let point = ctx.define_class("Point", &ctx.core().object);
        let element = ctx.allocate(&point);
        let array = ctx.new_array(vec![Value::from(1), Value::Object(element.clone())]);
        let nodes = collect(&array);
        assert!(contains(&nodes, &element));
    }

    #[test]
    fn node_identity_is_pointer_identity() {
        let ctx = Context::new(ContextCreateInfo::default());
        let a: ObjectRef = ctx.allocate(&ctx.core().object);
        let node = GraphNode::Object(a.clone());
        assert_eq!(node.identity(), GraphNode::Object(a).identity());
        assert!(GraphNode::from_value(&Value::from(1)).is_none());
        assert!(matches!(node.to_value(), Value::Object(_)));
    }
}
