//! The filter engine.
//!
//! A [`Filter`] owns a composed rule chain, a memo of derived shapes and a set of exempt shapes.
//! It exposes three operations:
//!
//! - [`Filter::derive_type`]: compute (and memoize) the filtered shape of a record shape
//! - [`Filter::convert`]: convert a value into a value of its filtered shape
//! - [`Filter::register_exempt`]: let a record shape pass through untouched
//!
//! The methods of [`Filter`] take `&mut self`; share a filter across threads only behind a lock,
//! or build one filter per thread. A filter must always be used with the same [`Shapes`] arena.
//!
//! ## Example
//!
//! ```rust
//! use regex::Regex;
//! use structfilter::filter::{remove_field_filter, Filter};
//! use structfilter::types::{DataType, RecordField, Shapes};
//! use structfilter::value::{Dynamic, Heap, Value};
//!
//! let mut shapes = Shapes::new();
//! let text = shapes.leaf(DataType::Utf8);
//! let user = shapes.new_record(
//!     "User",
//!     vec![RecordField::new("Name", text), RecordField::new("Password", text)],
//! );
//!
//! let mut filter = Filter::new(vec![remove_field_filter(Some(
//!     Regex::new("^Password").unwrap(),
//! ))]);
//!
//! let mut heap = Heap::new();
//! let input = Dynamic::new(
//!     user,
//!     Value::Record(vec![
//!         Value::Utf8("Alice".to_string()),
//!         Value::Utf8("hunter2".to_string()),
//!     ]),
//! );
//! let out = filter.convert(&mut shapes, &mut heap, Some(&input)).unwrap().unwrap();
//! assert_eq!(out.value, Value::Record(vec![Value::Utf8("Alice".to_string())]));
//! ```

mod convert;
mod derive;
pub mod field;
pub mod rules;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{ChainError, FilterError, FilterResult, RuleError};
use crate::observability::{FilterContext, FilterObserver, FilterSeverity, FilterStats, Operation};
use crate::types::{Shape, ShapeId, Shapes};
use crate::value::{Dynamic, Heap, Value};

pub use field::{Field, Tag};
pub use rules::{insert_tag_filter, remove_field_filter, FnMatcher, Matcher, NameSet};

/// A filter rule. It is called once per candidate field per shape derivation and may edit the
/// field's tag or decide whether the field is kept.
pub type FilterFn = Box<dyn FnMut(&mut Field) -> Result<(), RuleError> + Send>;

/// Combine rules into one rule that applies them in order.
///
/// With two or more rules, a failure of rule `i` is reported as `filter[i]: <cause>`.
pub fn combine_filters(mut filters: Vec<FilterFn>) -> FilterFn {
    match filters.len() {
        0 => Box::new(|_: &mut Field| Ok(())),
        1 => filters.remove(0),
        _ => Box::new(move |field: &mut Field| {
            for (index, filter) in filters.iter_mut().enumerate() {
                filter(field).map_err(|source| Box::new(ChainError { index, source }) as RuleError)?;
            }
            Ok(())
        }),
    }
}

/// Options controlling filter behavior.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct FilterOptions {
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn FilterObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: FilterSeverity,
}

impl fmt::Debug for FilterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterOptions")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: FilterSeverity::Critical,
        }
    }
}

/// Memo entry for one original record shape. Absence from the memo means "not seen".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Derivation {
    InProgress,
    Resolved(ShapeId),
}

/// Derives filtered shapes and converts values into them.
pub struct Filter {
    rule: FilterFn,
    types: HashMap<ShapeId, Derivation>,
    exempt: HashSet<ShapeId>,
    // Whether a shape reaches a non-exempt record; cleared when exemptions change.
    rewrites: HashMap<ShapeId, bool>,
    // Non-record shapes currently being mapped.
    mapping: HashSet<ShapeId>,
    stats: FilterStats,
    options: FilterOptions,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("cached_shapes", &self.cached_shapes())
            .field("exempt", &self.exempt.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Filter {
    /// Create a filter applying `filters` in order to every field.
    pub fn new(filters: Vec<FilterFn>) -> Self {
        Self::with_options(filters, FilterOptions::default())
    }

    /// Create a filter with explicit options.
    pub fn with_options(filters: Vec<FilterFn>, options: FilterOptions) -> Self {
        Self {
            rule: combine_filters(filters),
            types: HashMap::new(),
            exempt: HashSet::new(),
            rewrites: HashMap::new(),
            mapping: HashSet::new(),
            stats: FilterStats::default(),
            options,
        }
    }

    /// Options this filter was built with.
    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Compute the filtered shape of `orig`.
    ///
    /// `orig` must be a record shape or a single reference to one. The result is always a
    /// record shape. Deriving the same shape twice yields the same id; the rules run only once
    /// per record shape.
    ///
    /// When an observer is configured, the outcome is reported to it.
    pub fn derive_type(&mut self, shapes: &mut Shapes, orig: ShapeId) -> FilterResult<ShapeId> {
        self.stats = FilterStats::default();
        let result = self.derive_root(shapes, orig);
        self.report(Operation::Derive, shapes, orig, result.as_ref().err());
        result
    }

    /// Convert `input` into a value of its filtered shape.
    ///
    /// Returns `Ok(None)` for `None`. New reference-like nodes are allocated on `heap`; sharing
    /// and cycles between nodes of the input are reproduced in the output.
    pub fn convert(
        &mut self,
        shapes: &mut Shapes,
        heap: &mut Heap,
        input: Option<&Dynamic>,
    ) -> FilterResult<Option<Dynamic>> {
        let Some(input) = input else {
            return Ok(None);
        };
        self.stats = FilterStats::default();
        let result = self.convert_root(shapes, heap, input);
        self.report(Operation::Convert, shapes, input.shape, result.as_ref().err());
        result.map(Some)
    }

    /// Let `shape` pass through derivation and conversion unchanged.
    ///
    /// `shape` is resolved through references to a record; registering anything that does not
    /// lead to a record has no effect.
    pub fn register_exempt(&mut self, shapes: &Shapes, shape: ShapeId) {
        if let Ok((record, _)) = derive::record_root(shapes, shape) {
            self.exempt.insert(record);
            self.rewrites.clear();
        }
    }

    /// Exempt the dynamic shape of a sample value. `None` has no effect.
    pub fn register_exempt_value(&mut self, shapes: &Shapes, sample: Option<&Dynamic>) {
        let Some(mut sample) = sample else {
            return;
        };
        while let (Some(Shape::Any), Value::Any(inner)) = (shapes.get(sample.shape), &sample.value) {
            sample = &**inner;
        }
        self.register_exempt(shapes, sample.shape);
    }

    /// Returns `true` if `shape` is registered as exempt.
    pub fn is_exempt(&self, shape: ShapeId) -> bool {
        self.exempt.contains(&shape)
    }

    /// Number of record shapes with a memoized filtered shape.
    pub fn cached_shapes(&self) -> usize {
        self.types
            .values()
            .filter(|d| matches!(d, Derivation::Resolved(_)))
            .count()
    }

    /// The memoized filtered shape of `orig`, without deriving it.
    pub fn filtered_shape(&self, orig: ShapeId) -> Option<ShapeId> {
        if self.exempt.contains(&orig) {
            return Some(orig);
        }
        match self.types.get(&orig) {
            Some(Derivation::Resolved(id)) => Some(*id),
            _ => None,
        }
    }

    /// Counters collected during the most recent call.
    pub fn last_stats(&self) -> FilterStats {
        self.stats
    }

    fn report(
        &self,
        operation: Operation,
        shapes: &Shapes,
        shape: ShapeId,
        error: Option<&FilterError>,
    ) {
        let Some(obs) = self.options.observer.as_ref() else {
            return;
        };
        let ctx = FilterContext {
            operation,
            shape: shapes.display(shape),
        };
        match error {
            None => obs.on_success(&ctx, self.stats),
            Some(e) => {
                let sev = e.severity();
                obs.on_failure(&ctx, sev, e);
                if sev >= self.options.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
    }
}
