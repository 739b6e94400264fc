//! Runtime value model.
//!
//! Inline values (leaves, arrays, records) are held directly in a [`Value`]. Reference-like
//! values (single references, ordered sequences, maps) live on a [`Heap`] and are addressed by
//! [`NodeId`]; two positions holding the same `NodeId` alias the same node.

use std::fmt;

use crate::types::ShapeId;

/// Identity of a reference-like node on a [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node on its heap.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent reference, sequence, map or dynamic slot.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Fixed-size sequence, stored inline.
    Array(Vec<Value>),
    /// Record, stored inline; one value per field in declaration order.
    Record(Vec<Value>),
    /// Reference-like value stored on the heap.
    Ref(NodeId),
    /// Value boxed together with its dynamic shape.
    Any(Box<Dynamic>),
}

impl Value {
    /// Short kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int64(_) => "i64",
            Self::UInt64(_) => "u64",
            Self::Float64(_) => "f64",
            Self::Utf8(_) => "string",
            Self::Array(_) => "array",
            Self::Record(_) => "record",
            Self::Ref(_) => "ref",
            Self::Any(_) => "any",
        }
    }

    /// Box `value` of shape `shape` into a dynamic slot.
    pub fn any(shape: ShapeId, value: Value) -> Self {
        Self::Any(Box::new(Dynamic::new(shape, value)))
    }

    /// Returns the node id if this is a reference-like value.
    pub fn as_ref_node(&self) -> Option<NodeId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the record fields if this is a record value.
    pub fn as_record(&self) -> Option<&[Value]> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v:?}"),
            Self::Array(items) => write!(f, "array(len={})", items.len()),
            Self::Record(fields) => write!(f, "record(fields={})", fields.len()),
            Self::Ref(id) => write!(f, "&#{}", id.0),
            Self::Any(d) => write!(f, "any({})", d.value),
        }
    }
}

/// A value together with the shape it was built against.
#[derive(Debug, Clone, PartialEq)]
pub struct Dynamic {
    /// Dynamic shape of `value`.
    pub shape: ShapeId,
    /// The value itself.
    pub value: Value,
}

impl Dynamic {
    /// Pair a value with its shape.
    pub fn new(shape: ShapeId, value: Value) -> Self {
        Self { shape, value }
    }
}

/// Map storage. Entries keep insertion order; keys are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapNode {
    entries: Vec<(Value, Value)>,
}

impl MapNode {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map with room for `n` entries.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Insert an entry. An existing entry with an equal key gets its value replaced.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl FromIterator<(Value, Value)> for MapNode {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// A heap cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Referent of a single reference.
    Pointee(Value),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Associative map.
    Map(MapNode),
}

impl Node {
    /// Short kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pointee(_) => "pointee",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

/// Arena of reference-like nodes.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    nodes: Vec<Node>,
}

impl Heap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes on the heap.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the heap holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a node and return a reference to it.
    pub fn alloc(&mut self, node: Node) -> Value {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        Value::Ref(id)
    }

    /// Allocate a single reference to `value`.
    pub fn pointer(&mut self, value: Value) -> Value {
        self.alloc(Node::Pointee(value))
    }

    /// Allocate an ordered sequence.
    pub fn list(&mut self, items: Vec<Value>) -> Value {
        self.alloc(Node::List(items))
    }

    /// Allocate a map.
    pub fn map(&mut self, entries: impl IntoIterator<Item = (Value, Value)>) -> Value {
        self.alloc(Node::Map(entries.into_iter().collect()))
    }

    /// Look up a node.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Look up a node for mutation.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Replace the content of an existing node, returning the previous content.
    ///
    /// Used to close cycles: allocate first, then fill in once the referents exist.
    pub fn set(&mut self, id: NodeId, node: Node) -> Option<Node> {
        self.nodes
            .get_mut(id.0)
            .map(|slot| std::mem::replace(slot, node))
    }

    /// Follow a reference value to its referent value.
    pub fn deref(&self, value: &Value) -> Option<&Value> {
        match self.get(value.as_ref_node()?)? {
            Node::Pointee(v) => Some(v),
            _ => None,
        }
    }

    /// Follow a reference value to its list items.
    pub fn items(&self, value: &Value) -> Option<&[Value]> {
        match self.get(value.as_ref_node()?)? {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Follow a reference value to its map.
    pub fn entries(&self, value: &Value) -> Option<&MapNode> {
        match self.get(value.as_ref_node()?)? {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }
}
