use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::observability::FilterSeverity;
use crate::value::NodeId;

/// Convenience result type for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;

/// Error reported by a filter rule.
///
/// Rules may return any error type; it is boxed so that the chain can be inspected with
/// [`FilterError::rule_cause`].
pub type RuleError = Box<dyn StdError + Send + Sync + 'static>;

/// A rule panicked while inspecting a field.
#[derive(Debug, Error)]
#[error("panic in filter rule: {message}")]
pub struct RulePanic {
    /// Panic payload, if it was a string.
    pub message: String,
}

/// A rule at position `index` of a composed chain failed.
#[derive(Debug, Error)]
#[error("filter[{index}]: {source}")]
pub struct ChainError {
    /// Position of the failing rule in registration order.
    pub index: usize,
    /// Error reported by the rule.
    pub source: RuleError,
}

/// One breadcrumb in the path to a failing position during value conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A record field, by name.
    Field(String),
    /// An element of a fixed-size array.
    Array(usize),
    /// An element of an ordered sequence.
    List(usize),
    /// The referent of a single reference.
    Pointer,
    /// The key of a map entry (rendered key).
    MapKey(String),
    /// The value of a map entry (rendered key).
    MapValue(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "field {name}"),
            Self::Array(i) => write!(f, "array[{i}]"),
            Self::List(i) => write!(f, "list[{i}]"),
            Self::Pointer => f.write_str("pointer"),
            Self::MapKey(k) => write!(f, "map[{k}] key"),
            Self::MapValue(k) => write!(f, "map[{k}] value"),
        }
    }
}

/// Error type returned by type derivation and value conversion.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The shape id does not exist in the shape arena. This is the null-shape case: derivation
    /// reports it instead of a depth error, since a [`ShapeId`](crate::types::ShapeId) can never
    /// be null.
    #[error("shape #{id} is absent")]
    AbsentShape { id: usize },

    /// The shape is neither a record nor a reference to a record.
    #[error("not a record shape or reference to a record shape: {shape}")]
    NotRecord { shape: String },

    /// More than one reference indirection in front of a record.
    #[error("at most one reference indirection allowed, got {depth}")]
    Depth { depth: usize },

    /// A declared shape was used before it was defined.
    #[error("shape '{name}' is declared but not defined")]
    Undeclared { name: String },

    /// A declared shape was defined twice.
    #[error("shape '{name}' is already defined")]
    Redefined { name: String },

    /// A filtered record would carry two fields with the same name.
    #[error("record '{record}' has duplicate field '{name}'")]
    DuplicateField { record: String, name: String },

    /// A rule failed for the named field.
    #[error("{field}: {source}")]
    Rule { field: String, source: RuleError },

    /// Deriving the shape of the named field failed further down.
    #[error("{field}: {source}")]
    Field {
        field: String,
        source: Box<FilterError>,
    },

    /// Converting a nested position failed.
    #[error("{segment}: {source}")]
    Path {
        segment: PathSegment,
        source: Box<FilterError>,
    },

    /// A value does not fit the shape it is declared with.
    #[error("value mismatch: expected {expected}, found {found}")]
    ValueMismatch { expected: String, found: String },

    /// A value graph contains a reference cycle and cannot be rendered as a tree.
    #[error("cycle through node #{node} cannot be rendered")]
    Cycle { node: usize },

    /// An engine invariant was violated.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl FilterError {
    pub(crate) fn at(self, segment: PathSegment) -> Self {
        Self::Path {
            segment,
            source: Box::new(self),
        }
    }

    pub(crate) fn under_field(self, field: &str) -> Self {
        Self::Field {
            field: field.to_string(),
            source: Box::new(self),
        }
    }

    pub(crate) fn mismatch(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Self::ValueMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn cycle(node: NodeId) -> Self {
        Self::Cycle { node: node.index() }
    }

    /// Returns the innermost error reported by a rule, if this error was caused by one.
    ///
    /// Chain wrappers ([`ChainError`]) are skipped, so the returned error is the one the rule
    /// itself produced (or a [`RulePanic`]).
    pub fn rule_cause(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Rule { source, .. } => {
                let mut cur: &(dyn StdError + 'static) = source.as_ref();
                while let Some(chain) = cur.downcast_ref::<ChainError>() {
                    cur = chain.source.as_ref();
                }
                Some(cur)
            }
            Self::Field { source, .. } | Self::Path { source, .. } => source.rule_cause(),
            _ => None,
        }
    }

    /// Field names leading to the failing rule, outermost first.
    pub fn field_path(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut cur = self;
        loop {
            match cur {
                Self::Field { field, source } => {
                    out.push(field.as_str());
                    cur = source;
                }
                Self::Path { source, .. } => cur = source,
                Self::Rule { field, .. } => {
                    out.push(field.as_str());
                    return out;
                }
                _ => return out,
            }
        }
    }

    /// Conversion breadcrumbs leading to the failing position, outermost first.
    pub fn path(&self) -> Vec<&PathSegment> {
        let mut out = Vec::new();
        let mut cur = self;
        while let Self::Path { segment, source } = cur {
            out.push(segment);
            cur = source;
        }
        out
    }

    /// Severity classification used when reporting this error to an observer.
    pub fn severity(&self) -> FilterSeverity {
        match self {
            Self::Internal { .. } => FilterSeverity::Critical,
            Self::Rule { source, .. } if is_panic(source.as_ref()) => FilterSeverity::Critical,
            Self::Field { source, .. } | Self::Path { source, .. } => source.severity(),
            _ => FilterSeverity::Error,
        }
    }
}

fn is_panic(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<RulePanic>() {
            return true;
        }
        cur = match err.downcast_ref::<ChainError>() {
            Some(chain) => Some(chain.source.as_ref()),
            None => err.source(),
        };
    }
    false
}
