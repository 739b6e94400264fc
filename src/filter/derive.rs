//! Type derivation: computing filtered shapes.
//!
//! Every record shape moves through `not seen -> in progress -> resolved`. A failed derivation
//! is evicted back to `not seen`, so a retry with corrected rules starts cleanly. Re-entering a
//! record that is still in progress is a cycle: the field that closes it gets the [`Shape::Any`]
//! placeholder instead of a concrete shape.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{FilterError, FilterResult, RuleError, RulePanic};
use crate::types::{RecordField, Shape, ShapeId, Shapes, Visibility};

use super::{Derivation, Field, Filter};

/// Resolve `orig` through references to a record, returning the record and the number of
/// references passed.
pub(crate) fn record_root(shapes: &Shapes, orig: ShapeId) -> FilterResult<(ShapeId, usize)> {
    let mut id = orig;
    let mut depth = 0;
    let mut seen = HashSet::new();
    loop {
        match shapes.resolve(id)? {
            Shape::Record(_) => return Ok((id, depth)),
            Shape::Optional(elem) if seen.insert(id) => {
                id = *elem;
                depth += 1;
            }
            Shape::Declared(name) => return Err(FilterError::Undeclared { name: name.clone() }),
            _ => {
                return Err(FilterError::NotRecord {
                    shape: shapes.display(orig),
                });
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Filter {
    pub(super) fn derive_root(&mut self, shapes: &mut Shapes, orig: ShapeId) -> FilterResult<ShapeId> {
        let (record, depth) = record_root(shapes, orig)?;
        if depth > 1 {
            return Err(FilterError::Depth { depth });
        }
        if self.exempt.contains(&record) {
            return Ok(record);
        }
        match self.types.get(&record) {
            Some(Derivation::Resolved(filtered)) => {
                self.stats.cache_hits += 1;
                Ok(*filtered)
            }
            Some(Derivation::InProgress) => Err(FilterError::Internal {
                message: format!("derivation of '{}' re-entered", shapes.display(record)),
            }),
            None => self.filter_record(shapes, record),
        }
    }

    /// Map an original shape to its filtered counterpart.
    ///
    /// Returns `Ok(None)` when the mapping runs into a record that is still being resolved; the
    /// caller substitutes the placeholder. A container that is re-entered while it is being
    /// mapped becomes the placeholder in that element position, so the enclosing container
    /// still maps to a concrete shape. Shapes that reach no rewritable record map to themselves.
    pub(super) fn map_shape(&mut self, shapes: &mut Shapes, orig: ShapeId) -> FilterResult<Option<ShapeId>> {
        if !self.needs_rewrite(shapes, orig) {
            return Ok(Some(orig));
        }
        let shape = match shapes.resolve(orig)? {
            Shape::Record(_) => None,
            other => Some(other.clone()),
        };
        let Some(shape) = shape else {
            return match self.types.get(&orig) {
                Some(Derivation::Resolved(filtered)) => {
                    self.stats.cache_hits += 1;
                    Ok(Some(*filtered))
                }
                Some(Derivation::InProgress) => Ok(None),
                None => self.filter_record(shapes, orig).map(Some),
            };
        };
        if let Shape::Declared(name) = shape {
            return Err(FilterError::Undeclared { name });
        }

        if !self.mapping.insert(orig) {
            return Ok(Some(shapes.any()));
        }
        let result = self.map_container(shapes, orig, &shape);
        self.mapping.remove(&orig);
        result
    }

    fn map_container(
        &mut self,
        shapes: &mut Shapes,
        orig: ShapeId,
        shape: &Shape,
    ) -> FilterResult<Option<ShapeId>> {
        let mapped = match *shape {
            Shape::Array { len, elem } => {
                let Some(e) = self.map_shape(shapes, elem)? else {
                    return Ok(None);
                };
                if e == elem { orig } else { shapes.array(len, e) }
            }
            Shape::Optional(elem) => {
                let Some(e) = self.map_shape(shapes, elem)? else {
                    return Ok(None);
                };
                if e == elem { orig } else { shapes.optional(e) }
            }
            Shape::List(elem) => {
                let Some(e) = self.map_shape(shapes, elem)? else {
                    return Ok(None);
                };
                if e == elem { orig } else { shapes.list(e) }
            }
            Shape::Map { key, value } => {
                let (Some(k), Some(v)) = (self.map_shape(shapes, key)?, self.map_shape(shapes, value)?) else {
                    return Ok(None);
                };
                if k == key && v == value { orig } else { shapes.map(k, v) }
            }
            Shape::Leaf(_) | Shape::Any | Shape::Record(_) | Shape::Declared(_) => orig,
        };
        Ok(Some(mapped))
    }

    /// Whether `root` reaches a record that is not exempt (or a shape that cannot be resolved).
    fn needs_rewrite(&mut self, shapes: &Shapes, root: ShapeId) -> bool {
        if let Some(known) = self.rewrites.get(&root) {
            return *known;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        let mut found = false;
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(known) = self.rewrites.get(&id) {
                if *known {
                    found = true;
                    break;
                }
                continue;
            }
            match shapes.get(id) {
                None | Some(Shape::Declared(_)) => {
                    found = true;
                    break;
                }
                Some(Shape::Record(_)) => {
                    if !self.exempt.contains(&id) {
                        found = true;
                        break;
                    }
                }
                Some(Shape::Leaf(_)) | Some(Shape::Any) => {}
                Some(Shape::Array { elem, .. }) | Some(Shape::Optional(elem)) | Some(Shape::List(elem)) => {
                    stack.push(*elem);
                }
                Some(Shape::Map { key, value }) => {
                    stack.push(*key);
                    stack.push(*value);
                }
            }
        }
        self.rewrites.insert(root, found);
        found
    }

    /// Derive the filtered shape of a record that is not in the memo yet.
    fn filter_record(&mut self, shapes: &mut Shapes, orig: ShapeId) -> FilterResult<ShapeId> {
        self.types.insert(orig, Derivation::InProgress);
        match self.build_record(shapes, orig) {
            Ok(filtered) => {
                self.types.insert(orig, Derivation::Resolved(filtered));
                self.stats.shapes_derived += 1;
                Ok(filtered)
            }
            Err(e) => {
                self.types.remove(&orig);
                Err(e)
            }
        }
    }

    fn build_record(&mut self, shapes: &mut Shapes, orig: ShapeId) -> FilterResult<ShapeId> {
        let record = shapes
            .record(orig)
            .cloned()
            .ok_or_else(|| FilterError::Internal {
                message: format!("shape '{}' is not a record", shapes.display(orig)),
            })?;

        let mut fields = Vec::with_capacity(record.fields.len());
        let mut kept = HashSet::new();
        for orig_field in record.fields.iter().filter(|f| f.is_public()) {
            let mut field = Field::new(orig_field.name.clone(), orig_field.tag.clone());
            self.run_rule(&mut field)?;
            if !field.is_kept() {
                self.stats.fields_removed += 1;
                continue;
            }
            if !kept.insert(orig_field.name.as_str()) {
                return Err(FilterError::DuplicateField {
                    record: record.name.clone(),
                    name: orig_field.name.clone(),
                });
            }
            let shape = match self
                .map_shape(shapes, orig_field.shape)
                .map_err(|e| e.under_field(&orig_field.name))?
            {
                Some(shape) => shape,
                None => shapes.any(),
            };
            let (name, tag) = field.into_parts();
            fields.push(RecordField {
                name,
                shape,
                tag,
                visibility: Visibility::Public,
            });
        }
        Ok(shapes.new_record(record.name, fields))
    }

    /// Run the rule chain on one field. Panics escaping a rule are reported as rule failures.
    fn run_rule(&mut self, field: &mut Field) -> FilterResult<()> {
        let rule = &mut self.rule;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*rule)(&mut *field)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(Box::new(RulePanic {
                message: panic_message(payload.as_ref()),
            }) as RuleError),
        };
        result.map_err(|source| FilterError::Rule {
            field: field.name().to_string(),
            source,
        })
    }
}
