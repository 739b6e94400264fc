//! Runtime shape model.
//!
//! Shapes live in a [`Shapes`] arena and are addressed by [`ShapeId`]. Shape identity is id
//! equality: leaves, [`Shape::Any`] and containers are interned (asking for the same container
//! twice yields the same id), while records are nominal and get a fresh id every time.
//!
//! Self-referential shapes are built by declaring an id first and defining it afterwards:
//!
//! ```rust
//! use structfilter::types::{DataType, RecordField, Shape, Shapes};
//!
//! let mut shapes = Shapes::new();
//! let node = shapes.declare("Node");
//! let next = shapes.optional(node);
//! let value = shapes.leaf(DataType::Int64);
//! shapes
//!     .define_record(node, vec![
//!         RecordField::new("Value", value),
//!         RecordField::new("Next", next),
//!     ])
//!     .unwrap();
//! assert!(matches!(shapes.get(node), Some(Shape::Record(_))));
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, FilterResult};
use crate::filter::Tag;

/// Primitive leaf kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit unsigned integer.
    UInt64,
    /// 64-bit floating point number.
    Float64,
    /// UTF-8 string.
    Utf8,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Float64 => "f64",
            Self::Utf8 => "string",
        };
        f.write_str(name)
    }
}

/// Identity of a shape inside a [`Shapes`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeId(usize);

impl ShapeId {
    /// Position of the shape in its arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Whether rules may see a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Visible to rules and copied into filtered shapes.
    #[default]
    Public,
    /// Dropped unconditionally; never handed to rules.
    Hidden,
}

/// A single named, shaped field of a [`RecordShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    /// Field name.
    pub name: String,
    /// Declared shape of the field.
    pub shape: ShapeId,
    /// Field metadata.
    pub tag: Tag,
    /// Whether rules see this field.
    pub visibility: Visibility,
}

impl RecordField {
    /// Create a new public field with an empty tag.
    pub fn new(name: impl Into<String>, shape: ShapeId) -> Self {
        Self {
            name: name.into(),
            shape,
            tag: Tag::default(),
            visibility: Visibility::Public,
        }
    }

    /// Set the field's tag.
    pub fn with_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Mark the field as hidden.
    pub fn hidden(mut self) -> Self {
        self.visibility = Visibility::Hidden;
        self
    }

    /// Returns `true` unless the field is hidden.
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// A named aggregate of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    /// Display name.
    pub name: String,
    /// Ordered list of fields.
    pub fields: Vec<RecordField>,
}

impl RecordShape {
    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns a field by name, if present.
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A structural type description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Primitive value.
    Leaf(DataType),
    /// Dynamic slot holding a value of any shape.
    Any,
    /// Fixed-size sequence.
    Array { len: usize, elem: ShapeId },
    /// Single, possibly absent reference.
    Optional(ShapeId),
    /// Ordered sequence.
    List(ShapeId),
    /// Associative map.
    Map { key: ShapeId, value: ShapeId },
    /// Record.
    Record(RecordShape),
    /// Forward declaration that has not been defined yet.
    Declared(String),
}

impl Shape {
    /// Short kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Leaf(_) => "leaf",
            Self::Any => "any",
            Self::Array { .. } => "array",
            Self::Optional(_) => "optional",
            Self::List(_) => "list",
            Self::Map { .. } => "map",
            Self::Record(_) => "record",
            Self::Declared(_) => "declared",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum InternKey {
    Leaf(DataType),
    Any,
    Array(usize, ShapeId),
    Optional(ShapeId),
    List(ShapeId),
    Map(ShapeId, ShapeId),
}

/// Append-only arena of shapes.
#[derive(Debug, Clone, Default)]
pub struct Shapes {
    shapes: Vec<Shape>,
    interned: HashMap<InternKey, ShapeId>,
}

impl Shapes {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shapes in the arena.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Returns `true` if the arena holds no shapes.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Look up a shape. Returns `None` for ids that do not belong to this arena.
    pub fn get(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(id.0)
    }

    /// Look up a shape, reporting unknown ids as [`FilterError::AbsentShape`].
    pub fn resolve(&self, id: ShapeId) -> FilterResult<&Shape> {
        self.get(id).ok_or(FilterError::AbsentShape { id: id.0 })
    }

    /// Returns the record behind `id`, if it is a record shape.
    pub fn record(&self, id: ShapeId) -> Option<&RecordShape> {
        match self.get(id) {
            Some(Shape::Record(r)) => Some(r),
            _ => None,
        }
    }

    fn push(&mut self, shape: Shape) -> ShapeId {
        let id = ShapeId(self.shapes.len());
        self.shapes.push(shape);
        id
    }

    fn intern(&mut self, key: InternKey, shape: Shape) -> ShapeId {
        if let Some(id) = self.interned.get(&key) {
            return *id;
        }
        let id = self.push(shape);
        self.interned.insert(key, id);
        id
    }

    /// The leaf shape for `data_type`.
    pub fn leaf(&mut self, data_type: DataType) -> ShapeId {
        self.intern(InternKey::Leaf(data_type), Shape::Leaf(data_type))
    }

    /// The dynamic slot shape.
    pub fn any(&mut self) -> ShapeId {
        self.intern(InternKey::Any, Shape::Any)
    }

    /// Fixed-size sequence of `len` elements.
    pub fn array(&mut self, len: usize, elem: ShapeId) -> ShapeId {
        self.intern(InternKey::Array(len, elem), Shape::Array { len, elem })
    }

    /// Single reference to `elem`.
    pub fn optional(&mut self, elem: ShapeId) -> ShapeId {
        self.intern(InternKey::Optional(elem), Shape::Optional(elem))
    }

    /// Ordered sequence of `elem`.
    pub fn list(&mut self, elem: ShapeId) -> ShapeId {
        self.intern(InternKey::List(elem), Shape::List(elem))
    }

    /// Map from `key` to `value`.
    pub fn map(&mut self, key: ShapeId, value: ShapeId) -> ShapeId {
        self.intern(InternKey::Map(key, value), Shape::Map { key, value })
    }

    /// A new record shape with its own identity.
    pub fn new_record(&mut self, name: impl Into<String>, fields: Vec<RecordField>) -> ShapeId {
        self.push(Shape::Record(RecordShape {
            name: name.into(),
            fields,
        }))
    }

    /// Reserve an id for a shape that will be defined later.
    ///
    /// Declared ids are never interned, so a declared container has its own identity.
    pub fn declare(&mut self, name: impl Into<String>) -> ShapeId {
        self.push(Shape::Declared(name.into()))
    }

    /// Define a previously declared shape.
    pub fn define(&mut self, id: ShapeId, shape: Shape) -> FilterResult<()> {
        let slot = self
            .shapes
            .get_mut(id.0)
            .ok_or(FilterError::AbsentShape { id: id.0 })?;
        match slot {
            Shape::Declared(_) => {
                *slot = shape;
                Ok(())
            }
            other => Err(FilterError::Redefined {
                name: describe(other),
            }),
        }
    }

    /// Define a previously declared record; the declared name becomes the record name.
    pub fn define_record(&mut self, id: ShapeId, fields: Vec<RecordField>) -> FilterResult<()> {
        let name = match self.resolve(id)? {
            Shape::Declared(name) => name.clone(),
            other => {
                return Err(FilterError::Redefined {
                    name: describe(other),
                });
            }
        };
        self.define(id, Shape::Record(RecordShape { name, fields }))
    }

    /// Human-readable name of a shape, one level deep.
    pub fn display(&self, id: ShapeId) -> String {
        match self.get(id) {
            None => format!("#{}", id.0),
            Some(shape) => match shape {
                Shape::Array { len, elem } => format!("[{}; {len}]", self.short(*elem)),
                Shape::Optional(elem) => format!("&{}", self.short(*elem)),
                Shape::List(elem) => format!("[{}]", self.short(*elem)),
                Shape::Map { key, value } => {
                    format!("map[{}]{}", self.short(*key), self.short(*value))
                }
                other => describe(other),
            },
        }
    }

    fn short(&self, id: ShapeId) -> String {
        match self.get(id) {
            Some(Shape::Leaf(_)) | Some(Shape::Any) | Some(Shape::Record(_)) | Some(Shape::Declared(_)) => {
                self.display(id)
            }
            Some(shape) => format!("<{}#{}>", shape.kind(), id.0),
            None => format!("#{}", id.0),
        }
    }
}

fn describe(shape: &Shape) -> String {
    match shape {
        Shape::Leaf(dt) => dt.to_string(),
        Shape::Any => "any".to_string(),
        Shape::Record(r) => r.name.clone(),
        Shape::Declared(name) => name.clone(),
        other => other.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containers_and_leaves_are_interned() {
        let mut shapes = Shapes::new();
        let int = shapes.leaf(DataType::Int64);
        assert_eq!(shapes.leaf(DataType::Int64), int);
        assert_ne!(shapes.leaf(DataType::Utf8), int);

        let list = shapes.list(int);
        assert_eq!(shapes.list(int), list);
        let map = shapes.map(int, list);
        assert_eq!(shapes.map(int, list), map);
        let array = shapes.array(3, int);
        assert_eq!(shapes.array(3, int), array);
        assert_ne!(shapes.array(4, int), array);
        let any = shapes.any();
        assert_eq!(shapes.any(), any);
    }

    #[test]
    fn records_are_nominal() {
        let mut shapes = Shapes::new();
        let int = shapes.leaf(DataType::Int64);
        let a = shapes.new_record("A", vec![RecordField::new("X", int)]);
        let b = shapes.new_record("A", vec![RecordField::new("X", int)]);
        assert_ne!(a, b);
        assert_eq!(shapes.record(a), shapes.record(b));
    }

    #[test]
    fn declare_then_define_builds_self_reference() {
        let mut shapes = Shapes::new();
        let node = shapes.declare("Node");
        let next = shapes.optional(node);
        shapes
            .define_record(node, vec![RecordField::new("Next", next)])
            .unwrap();

        let record = shapes.record(node).unwrap();
        assert_eq!(record.name, "Node");
        assert_eq!(record.fields[0].shape, next);
        assert_eq!(shapes.display(next), "&Node");

        let err = shapes.define_record(node, vec![]).unwrap_err();
        assert!(matches!(err, FilterError::Redefined { .. }));
    }

    #[test]
    fn record_field_lookup() {
        let mut shapes = Shapes::new();
        let int = shapes.leaf(DataType::Int64);
        let id = shapes.new_record(
            "R",
            vec![
                RecordField::new("a", int),
                RecordField::new("b", int).hidden(),
            ],
        );
        let record = shapes.record(id).unwrap();
        assert_eq!(record.index_of("b"), Some(1));
        assert_eq!(record.index_of("missing"), None);
        assert!(!record.field("b").unwrap().is_public());
        assert_eq!(record.field_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn unknown_ids_are_absent() {
        let shapes = Shapes::new();
        let err = shapes.resolve(ShapeId(7)).unwrap_err();
        assert!(matches!(err, FilterError::AbsentShape { id: 7 }));
    }
}
