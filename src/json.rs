//! Render (filtered) values as JSON.
//!
//! Record keys come from the `json` tag of each field: `json:"name"` renames the field,
//! `json:"-"` omits it, `json:",omitempty"` omits empty values, and a missing tag keeps the
//! field name. Shared nodes are rendered once per position; a reference cycle cannot be
//! expressed as a JSON tree and is reported as [`FilterError::Cycle`].

use std::collections::HashSet;

use serde_json::{Map, Number, Value as Json};

use crate::error::{FilterError, FilterResult, PathSegment};
use crate::types::{Shape, ShapeId, Shapes};
use crate::value::{Dynamic, Heap, Node, NodeId, Value};

/// Render `input` as a JSON value.
pub fn to_json(shapes: &Shapes, heap: &Heap, input: &Dynamic) -> FilterResult<Json> {
    let mut renderer = Renderer {
        shapes,
        heap,
        active: HashSet::new(),
    };
    renderer.render(input.shape, &input.value)
}

/// Render `input` as a pretty-printed JSON string.
pub fn to_json_string_pretty(shapes: &Shapes, heap: &Heap, input: &Dynamic) -> FilterResult<String> {
    let json = to_json(shapes, heap, input)?;
    serde_json::to_string_pretty(&json).map_err(|e| FilterError::Internal {
        message: format!("json encoding failed: {e}"),
    })
}

/// Key options parsed from a `json` tag value.
struct JsonKey {
    name: Option<String>,
    omit_empty: bool,
}

fn json_key(tag_value: Option<String>) -> Option<JsonKey> {
    let Some(value) = tag_value else {
        return Some(JsonKey {
            name: None,
            omit_empty: false,
        });
    };
    if value == "-" {
        return None;
    }
    let mut parts = value.split(',');
    let name = parts.next().filter(|n| !n.is_empty()).map(str::to_string);
    let omit_empty = parts.any(|opt| opt == "omitempty");
    Some(JsonKey { name, omit_empty })
}

fn is_empty(json: &Json) -> bool {
    match json {
        Json::Null => true,
        Json::Bool(b) => !b,
        Json::Number(n) => n.as_f64() == Some(0.0),
        Json::String(s) => s.is_empty(),
        Json::Array(items) => items.is_empty(),
        Json::Object(map) => map.is_empty(),
    }
}

struct Renderer<'a> {
    shapes: &'a Shapes,
    heap: &'a Heap,
    // Nodes on the current rendering path.
    active: HashSet<NodeId>,
}

impl Renderer<'_> {
    fn render(&mut self, shape: ShapeId, value: &Value) -> FilterResult<Json> {
        if let Value::Any(inner) = value {
            return self.render(inner.shape, &inner.value);
        }
        let shapes = self.shapes;
        match (shapes.resolve(shape)?, value) {
            (_, Value::Null) => Ok(Json::Null),
            (Shape::Leaf(_), leaf) => leaf_json(leaf),
            (Shape::Array { elem, .. }, Value::Array(items)) => {
                let elem = *elem;
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.render(elem, item).map_err(|e| e.at(PathSegment::Array(i)))?);
                }
                Ok(Json::Array(out))
            }
            (Shape::Record(record), Value::Record(values)) => {
                if values.len() != record.fields.len() {
                    return Err(FilterError::mismatch(&record.name, value));
                }
                let mut out = Map::new();
                for (field, v) in record.fields.iter().zip(values) {
                    if !field.is_public() {
                        continue;
                    }
                    let Some(key) = json_key(field.tag.lookup("json")) else {
                        continue;
                    };
                    let rendered = self
                        .render(field.shape, v)
                        .map_err(|e| e.at(PathSegment::Field(field.name.clone())))?;
                    if key.omit_empty && is_empty(&rendered) {
                        continue;
                    }
                    out.insert(key.name.unwrap_or_else(|| field.name.clone()), rendered);
                }
                Ok(Json::Object(out))
            }
            (Shape::Optional(elem), Value::Ref(node)) => {
                let elem = *elem;
                self.with_node(*node, |r, n| match n {
                    Node::Pointee(v) => r.render(elem, v).map_err(|e| e.at(PathSegment::Pointer)),
                    other => Err(FilterError::mismatch("pointee", other.kind())),
                })
            }
            (Shape::List(elem), Value::Ref(node)) => {
                let elem = *elem;
                self.with_node(*node, |r, n| match n {
                    Node::List(items) => {
                        let mut out = Vec::with_capacity(items.len());
                        for (i, item) in items.iter().enumerate() {
                            out.push(r.render(elem, item).map_err(|e| e.at(PathSegment::List(i)))?);
                        }
                        Ok(Json::Array(out))
                    }
                    other => Err(FilterError::mismatch("list", other.kind())),
                })
            }
            (Shape::Map { value: value_shape, .. }, Value::Ref(node)) => {
                let value_shape = *value_shape;
                self.with_node(*node, |r, n| match n {
                    Node::Map(map) => {
                        let mut out = Map::new();
                        for (k, v) in map.iter() {
                            let key = map_key(k)?;
                            let rendered = r
                                .render(value_shape, v)
                                .map_err(|e| e.at(PathSegment::MapValue(key.clone())))?;
                            out.insert(key, rendered);
                        }
                        Ok(Json::Object(out))
                    }
                    other => Err(FilterError::mismatch("map", other.kind())),
                })
            }
            (Shape::Declared(name), _) => Err(FilterError::Undeclared { name: name.clone() }),
            (shape, other) => Err(FilterError::mismatch(shape.kind(), other.kind())),
        }
    }

    /// Render the content of `node`, failing if it is already on the current path.
    fn with_node<F>(&mut self, node: NodeId, render: F) -> FilterResult<Json>
    where
        F: FnOnce(&mut Self, &Node) -> FilterResult<Json>,
    {
        let heap = self.heap;
        let content = heap
            .get(node)
            .ok_or_else(|| FilterError::mismatch("heap node", format!("dangling #{}", node.index())))?;
        if !self.active.insert(node) {
            return Err(FilterError::cycle(node));
        }
        let result = render(self, content);
        self.active.remove(&node);
        result
    }
}

fn leaf_json(value: &Value) -> FilterResult<Json> {
    Ok(match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Int64(i) => Json::Number((*i).into()),
        Value::UInt64(u) => Json::Number((*u).into()),
        Value::Float64(f) => Json::Number(
            Number::from_f64(*f).ok_or_else(|| FilterError::mismatch("finite float", value))?,
        ),
        Value::Utf8(s) => Json::String(s.clone()),
        other => return Err(FilterError::mismatch("leaf", other.kind())),
    })
}

fn map_key(key: &Value) -> FilterResult<String> {
    match key {
        Value::Utf8(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int64(i) => Ok(i.to_string()),
        Value::UInt64(u) => Ok(u.to_string()),
        Value::Any(inner) => map_key(&inner.value),
        other => Err(FilterError::mismatch("string or integer map key", other.kind())),
    }
}
