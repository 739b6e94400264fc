//! Value conversion: populating filtered values from original ones.
//!
//! Reference-like nodes (single references, ordered sequences, maps) are tracked per call by
//! [`NodeId`]. A filtered node is allocated and registered before its content is converted, so a
//! back-edge to a node that is still being converted resolves to the same filtered node.

use std::collections::HashMap;

use crate::error::{FilterError, FilterResult, PathSegment};
use crate::types::{Shape, ShapeId, Shapes};
use crate::value::{Dynamic, Heap, MapNode, Node, NodeId, Value};

use super::Filter;

/// Filtered stand-ins for the nodes visited during one conversion, with their filtered shapes.
type Seen = HashMap<NodeId, (ShapeId, Value)>;

#[derive(Debug, Clone, Copy)]
enum Layout {
    Leaf,
    Any,
    Array(ShapeId),
    Optional(ShapeId),
    List(ShapeId),
    Map(ShapeId, ShapeId),
    Record,
}

impl Layout {
    fn kind(self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Any => "any",
            Self::Array(_) => "array",
            Self::Optional(_) => "pointee",
            Self::List(_) => "list",
            Self::Map(..) => "map",
            Self::Record => "record",
        }
    }
}

fn layout(shapes: &Shapes, id: ShapeId) -> FilterResult<Layout> {
    Ok(match shapes.resolve(id)? {
        Shape::Leaf(_) => Layout::Leaf,
        Shape::Any => Layout::Any,
        Shape::Array { elem, .. } => Layout::Array(*elem),
        Shape::Optional(elem) => Layout::Optional(*elem),
        Shape::List(elem) => Layout::List(*elem),
        Shape::Map { key, value } => Layout::Map(*key, *value),
        Shape::Record(_) => Layout::Record,
        Shape::Declared(name) => return Err(FilterError::Undeclared { name: name.clone() }),
    })
}

impl Filter {
    pub(super) fn convert_root(
        &mut self,
        shapes: &mut Shapes,
        heap: &mut Heap,
        input: &Dynamic,
    ) -> FilterResult<Dynamic> {
        let filtered = self.concrete_shape(shapes, input.shape)?;
        let mut seen = Seen::new();
        let value = self.convert_value(shapes, heap, &mut seen, input.shape, &input.value, filtered)?;
        Ok(Dynamic::new(filtered, value))
    }

    /// The filtered shape of `orig`. Only derivations that already finished are visible during
    /// conversion, so this never runs into the cycle placeholder.
    fn concrete_shape(&mut self, shapes: &mut Shapes, orig: ShapeId) -> FilterResult<ShapeId> {
        self.map_shape(shapes, orig)?.ok_or_else(|| FilterError::Internal {
            message: format!("no concrete filtered shape for '{}'", shapes.display(orig)),
        })
    }

    /// Convert `value` of shape `orig` into a value for a slot of shape `slot`.
    fn convert_value(
        &mut self,
        shapes: &mut Shapes,
        heap: &mut Heap,
        seen: &mut Seen,
        orig: ShapeId,
        value: &Value,
        slot: ShapeId,
    ) -> FilterResult<Value> {
        if let Layout::Any = layout(shapes, orig)? {
            return match value {
                Value::Null => Ok(Value::Null),
                Value::Any(inner) => self.convert_value(shapes, heap, seen, inner.shape, &inner.value, slot),
                other => Err(FilterError::mismatch("any", other.kind())),
            };
        }
        if orig == slot {
            return Ok(value.clone());
        }

        // A placeholder slot holds a value of the concrete filtered shape of the original.
        let boxed = matches!(layout(shapes, slot)?, Layout::Any);
        let target = if boxed {
            self.concrete_shape(shapes, orig)?
        } else {
            slot
        };
        let wrap = |v: Value| if boxed { Value::any(target, v) } else { v };

        if target == orig {
            return Ok(wrap(value.clone()));
        }
        if let Value::Ref(node) = value {
            if let Some((shape, filtered)) = seen.get(node) {
                return Ok(if boxed {
                    Value::any(*shape, filtered.clone())
                } else {
                    filtered.clone()
                });
            }
        }

        let converted = match (layout(shapes, orig)?, layout(shapes, target)?) {
            (Layout::Leaf, _) | (Layout::Any, _) => value.clone(),
            (Layout::Array(orig_elem), Layout::Array(target_elem)) => {
                self.convert_array(shapes, heap, seen, value, orig_elem, target_elem)?
            }
            (Layout::Record, Layout::Record) => self.convert_record(shapes, heap, seen, value, orig, target)?,
            (
                orig_layout @ (Layout::Optional(_) | Layout::List(_) | Layout::Map(..)),
                target_layout,
            ) => self.convert_node(shapes, heap, seen, value, orig_layout, target_layout, target)?,
            _ => {
                return Err(FilterError::Internal {
                    message: format!(
                        "filtered shape '{}' does not fit '{}'",
                        shapes.display(target),
                        shapes.display(orig)
                    ),
                });
            }
        };
        Ok(wrap(converted))
    }

    fn convert_array(
        &mut self,
        shapes: &mut Shapes,
        heap: &mut Heap,
        seen: &mut Seen,
        value: &Value,
        orig_elem: ShapeId,
        target_elem: ShapeId,
    ) -> FilterResult<Value> {
        let Value::Array(items) = value else {
            return Err(FilterError::mismatch("array", value.kind()));
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let v = self
                .convert_value(shapes, heap, seen, orig_elem, item, target_elem)
                .map_err(|e| e.at(PathSegment::Array(i)))?;
            out.push(v);
        }
        Ok(Value::Array(out))
    }

    /// Copy the fields that survived derivation, by name. Dropped and hidden fields are skipped.
    fn convert_record(
        &mut self,
        shapes: &mut Shapes,
        heap: &mut Heap,
        seen: &mut Seen,
        value: &Value,
        orig: ShapeId,
        target: ShapeId,
    ) -> FilterResult<Value> {
        let (plan, width, values) = {
            let (Some(orig_rec), Some(target_rec)) = (shapes.record(orig), shapes.record(target)) else {
                return Err(FilterError::Internal {
                    message: "record conversion without record shapes".to_string(),
                });
            };
            let Value::Record(values) = value else {
                return Err(FilterError::mismatch(&orig_rec.name, value.kind()));
            };
            if values.len() != orig_rec.fields.len() {
                return Err(FilterError::mismatch(
                    format!("{} with {} fields", orig_rec.name, orig_rec.fields.len()),
                    value,
                ));
            }
            let plan: Vec<_> = orig_rec
                .fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.is_public())
                .filter_map(|(i, f)| {
                    let j = target_rec.index_of(&f.name)?;
                    Some((i, j, f.shape, target_rec.fields[j].shape, f.name.clone()))
                })
                .collect();
            (plan, target_rec.fields.len(), values)
        };

        let mut out = vec![Value::Null; width];
        for (i, j, orig_field, target_field, name) in plan {
            out[j] = self
                .convert_value(shapes, heap, seen, orig_field, &values[i], target_field)
                .map_err(|e| e.at(PathSegment::Field(name)))?;
        }
        Ok(Value::Record(out))
    }

    /// Convert a reference-like value. The filtered node is registered before its content is
    /// converted.
    #[allow(clippy::too_many_arguments)]
    fn convert_node(
        &mut self,
        shapes: &mut Shapes,
        heap: &mut Heap,
        seen: &mut Seen,
        value: &Value,
        orig_layout: Layout,
        target_layout: Layout,
        target: ShapeId,
    ) -> FilterResult<Value> {
        let node = match value {
            Value::Null => return Ok(Value::Null),
            Value::Ref(node) => *node,
            other => return Err(FilterError::mismatch("reference", other.kind())),
        };
        let content = heap
            .get(node)
            .cloned()
            .ok_or_else(|| FilterError::mismatch("heap node", value))?;

        let placeholder = match content {
            Node::Pointee(_) => Node::Pointee(Value::Null),
            Node::List(_) => Node::List(Vec::new()),
            Node::Map(_) => Node::Map(MapNode::new()),
        };
        let filtered = heap.alloc(placeholder);
        let filtered_id = filtered.as_ref_node().ok_or_else(|| FilterError::Internal {
            message: "heap allocation did not yield a reference".to_string(),
        })?;
        seen.insert(node, (target, filtered.clone()));

        let filled = match (content, orig_layout, target_layout) {
            (Node::Pointee(v), Layout::Optional(orig_elem), Layout::Optional(target_elem)) => {
                let v = self
                    .convert_value(shapes, heap, seen, orig_elem, &v, target_elem)
                    .map_err(|e| e.at(PathSegment::Pointer))?;
                Node::Pointee(v)
            }
            (Node::List(items), Layout::List(orig_elem), Layout::List(target_elem)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let v = self
                        .convert_value(shapes, heap, seen, orig_elem, item, target_elem)
                        .map_err(|e| e.at(PathSegment::List(i)))?;
                    out.push(v);
                }
                Node::List(out)
            }
            (Node::Map(map), Layout::Map(orig_key, orig_value), Layout::Map(target_key, target_value)) => {
                let mut out = MapNode::with_capacity(map.len());
                for (k, v) in map.iter() {
                    let label = k.to_string();
                    let fk = self
                        .convert_value(shapes, heap, seen, orig_key, k, target_key)
                        .map_err(|e| e.at(PathSegment::MapKey(label.clone())))?;
                    let fv = self
                        .convert_value(shapes, heap, seen, orig_value, v, target_value)
                        .map_err(|e| e.at(PathSegment::MapValue(label)))?;
                    out.insert(fk, fv);
                }
                Node::Map(out)
            }
            (content, orig_layout, _) => {
                return Err(FilterError::mismatch(orig_layout.kind(), content.kind()));
            }
        };
        heap.set(filtered_id, filled);
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, RecordField};

    #[test]
    fn leaves_are_copied() {
        let mut shapes = Shapes::new();
        let mut heap = Heap::new();
        let int = shapes.leaf(DataType::Int64);
        let mut filter = Filter::default();
        let out = filter
            .convert(&mut shapes, &mut heap, Some(&Dynamic::new(int, Value::Int64(42))))
            .unwrap()
            .unwrap();
        assert_eq!(out, Dynamic::new(int, Value::Int64(42)));
    }

    #[test]
    fn record_values_must_match_their_shape() {
        let mut shapes = Shapes::new();
        let mut heap = Heap::new();
        let int = shapes.leaf(DataType::Int64);
        let rec = shapes.new_record("R", vec![RecordField::new("A", int), RecordField::new("B", int)]);
        let mut filter = Filter::default();

        let err = filter
            .convert(&mut shapes, &mut heap, Some(&Dynamic::new(rec, Value::Record(vec![Value::Int64(1)]))))
            .unwrap_err();
        assert!(matches!(err, FilterError::ValueMismatch { .. }));

        let err = filter
            .convert(&mut shapes, &mut heap, Some(&Dynamic::new(rec, Value::Int64(1))))
            .unwrap_err();
        assert_eq!(err.to_string(), "value mismatch: expected R, found i64");
    }

    #[test]
    fn null_references_stay_null() {
        let mut shapes = Shapes::new();
        let mut heap = Heap::new();
        let int = shapes.leaf(DataType::Int64);
        let rec = shapes.new_record("R", vec![RecordField::new("A", int)]);
        let ptr = shapes.optional(rec);
        let holder = shapes.new_record("Holder", vec![RecordField::new("Ptr", ptr)]);
        let mut filter = Filter::default();

        let out = filter
            .convert(&mut shapes, &mut heap, Some(&Dynamic::new(holder, Value::Record(vec![Value::Null]))))
            .unwrap()
            .unwrap();
        assert_eq!(out.value, Value::Record(vec![Value::Null]));
        assert!(heap.is_empty());
    }

    #[test]
    fn nested_mismatch_reports_breadcrumbs() {
        let mut shapes = Shapes::new();
        let mut heap = Heap::new();
        let int = shapes.leaf(DataType::Int64);
        let inner = shapes.new_record("Inner", vec![RecordField::new("A", int)]);
        let inner_list = shapes.list(inner);
        let outer = shapes.new_record("Outer", vec![RecordField::new("Items", inner_list)]);
        let items = heap.list(vec![Value::Record(vec![Value::Int64(1)]), Value::Bool(true)]);
        let mut filter = Filter::default();

        let err = filter
            .convert(&mut shapes, &mut heap, Some(&Dynamic::new(outer, Value::Record(vec![items]))))
            .unwrap_err();
        assert_eq!(
            err.path(),
            vec![&PathSegment::Field("Items".to_string()), &PathSegment::List(1)]
        );
    }
}
