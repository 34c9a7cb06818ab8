//! The test-group tree and attribute resolution.
//!
//! Every describe block owns a [`GroupNode`] linked to its parent. Attribute
//! configuration is stored locally on the node that declared it and read by
//! walking up to the nearest ancestor that holds a value; a child never writes
//! to its parent.

use crate::attributes::AttributeMap;
use crate::subject::ModelInfo;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Produces a subject for the example running in the given group.
pub type SubjectBuilder = Rc<dyn Fn(&GroupNode) -> Box<dyn Any>>;

/// Where a group's default subject attributes come from.
#[derive(Clone)]
pub enum DefaultAttributes {
    /// A fixed mapping.
    Literal(AttributeMap),
    /// A producer evaluated afresh every time the attributes are resolved.
    Producer(Rc<dyn Fn() -> AttributeMap>),
}

impl DefaultAttributes {
    pub fn producer(f: impl Fn() -> AttributeMap + 'static) -> Self {
        DefaultAttributes::Producer(Rc::new(f))
    }

    /// Evaluate the source into a mapping. Panics raised by a producer
    /// propagate to the running example.
    pub fn resolve(&self) -> AttributeMap {
        match self {
            DefaultAttributes::Literal(map) => map.clone(),
            DefaultAttributes::Producer(f) => f(),
        }
    }
}

impl From<AttributeMap> for DefaultAttributes {
    fn from(map: AttributeMap) -> Self {
        DefaultAttributes::Literal(map)
    }
}

impl fmt::Debug for DefaultAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultAttributes::Literal(map) => f.debug_tuple("Literal").field(map).finish(),
            DefaultAttributes::Producer(_) => f.write_str("Producer(<fn>)"),
        }
    }
}

/// A describe/context node.
pub struct GroupNode {
    name: String,
    parent: Option<Rc<GroupNode>>,
    model: Option<ModelInfo>,
    described: Option<AttributeMap>,
    defaults: RefCell<Option<DefaultAttributes>>,
    subject: RefCell<Option<SubjectBuilder>>,
}

impl GroupNode {
    pub fn root() -> Rc<GroupNode> {
        Rc::new(GroupNode {
            name: String::new(),
            parent: None,
            model: None,
            described: None,
            defaults: RefCell::new(None),
            subject: RefCell::new(None),
        })
    }

    /// Start a child of `parent`. Finish with [`build`](GroupNodeBuilder::build).
    pub fn child(parent: &Rc<GroupNode>, name: impl Into<String>) -> GroupNodeBuilder {
        GroupNodeBuilder {
            node: GroupNode {
                name: name.into(),
                parent: Some(Rc::clone(parent)),
                model: None,
                described: None,
                defaults: RefCell::new(None),
                subject: RefCell::new(None),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<GroupNode>> {
        self.parent.as_ref()
    }

    /// Names from the outermost group down to this one, joined by `" > "`.
    pub fn full_name(&self) -> String {
        let mut names = Vec::new();
        self.walk(|node| {
            if !node.name.is_empty() {
                names.push(node.name.clone());
            }
            None::<()>
        });
        names.reverse();
        names.join(" > ")
    }

    /// The model type described by this group or its nearest ancestor.
    pub fn model(&self) -> Option<ModelInfo> {
        self.walk(|node| node.model)
    }

    /// Attributes declared by the parameterized describe form, from this
    /// group or the nearest ancestor that declared some.
    pub fn described_attributes(&self) -> Option<AttributeMap> {
        self.walk(|node| node.described.clone())
    }

    pub fn has_described_attributes(&self) -> bool {
        self.walk(|node| node.described.as_ref().map(|_| ())).is_some()
    }

    /// The nearest default attribute source.
    pub fn default_attributes(&self) -> Option<DefaultAttributes> {
        self.walk(|node| node.defaults.borrow().clone())
    }

    pub fn set_default_attributes(&self, source: DefaultAttributes) {
        *self.defaults.borrow_mut() = Some(source);
    }

    pub fn subject_builder(&self) -> Option<SubjectBuilder> {
        self.walk(|node| node.subject.borrow().clone())
    }

    pub fn set_subject_builder(&self, builder: SubjectBuilder) {
        *self.subject.borrow_mut() = Some(builder);
    }

    /// The effective attributes for a subject built in this group: the
    /// nearest default source, evaluated now, with the described attributes
    /// layered on top.
    pub fn subject_attributes(&self) -> AttributeMap {
        let defaults = self
            .default_attributes()
            .map(|source| source.resolve())
            .unwrap_or_default();
        let merged = match self.described_attributes() {
            Some(described) => defaults.merge(&described),
            None => defaults,
        };
        tracing::debug!(
            group = %self.full_name(),
            attributes = ?merged,
            "resolved subject attributes"
        );
        merged
    }

    fn walk<T>(&self, mut f: impl FnMut(&GroupNode) -> Option<T>) -> Option<T> {
        let mut current = Some(self);
        while let Some(node) = current {
            if let Some(found) = f(node) {
                return Some(found);
            }
            current = node.parent.as_deref();
        }
        None
    }
}

impl fmt::Debug for GroupNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupNode")
            .field("name", &self.name)
            .field("model", &self.model.map(|m| m.type_name()))
            .field("described", &self.described)
            .field("defaults", &self.defaults.borrow())
            .finish_non_exhaustive()
    }
}

/// Configures a child [`GroupNode`] before it is shared.
pub struct GroupNodeBuilder {
    node: GroupNode,
}

impl GroupNodeBuilder {
    pub fn model(mut self, model: ModelInfo) -> Self {
        self.node.model = Some(model);
        self
    }

    pub fn described(mut self, attributes: AttributeMap) -> Self {
        self.node.described = Some(attributes);
        self
    }

    pub fn build(self) -> Rc<GroupNode> {
        Rc::new(self.node)
    }
}
