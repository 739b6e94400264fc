//! `structfilter` derives filtered variants of record shapes and converts values into them.
//!
//! A [`Filter`] is built from a chain of rules. Each rule sees every field of a record shape and
//! may drop it or rewrite its tag. The filtered shape is derived once per record shape and
//! memoized; values are converted by copying the surviving fields, recursing through arrays,
//! references, lists and maps.
//!
//! Shapes and values are runtime data: shapes live in a [`types::Shapes`] arena, reference-like
//! values (single references, lists, maps) live on a [`value::Heap`]. This makes recursive shapes
//! and cyclic value graphs first-class:
//!
//! - a record field whose shape closes a cycle back to a record still being derived gets the
//!   [`types::Shape::Any`] placeholder; the converted value is boxed with its concrete shape
//! - converting a value graph reproduces its sharing: two positions referring to the same node
//!   refer to the same filtered node afterwards, and cycles stay cycles
//!
//! ## Quick example: drop secrets, rename for JSON
//!
//! ```rust
//! use regex::Regex;
//! use serde_json::json;
//! use structfilter::filter::{remove_field_filter, Field, FilterFn};
//! use structfilter::types::{DataType, RecordField, Shapes};
//! use structfilter::value::{Dynamic, Heap, Value};
//! use structfilter::{json, Filter};
//!
//! # fn main() -> Result<(), structfilter::FilterError> {
//! let mut shapes = Shapes::new();
//! let text = shapes.leaf(DataType::Utf8);
//! let int = shapes.leaf(DataType::Int64);
//! let user = shapes.new_record(
//!     "User",
//!     vec![
//!         RecordField::new("Name", text),
//!         RecordField::new("Password", text),
//!         RecordField::new("LoginTime", int),
//!     ],
//! );
//!
//! let lowercase_json: FilterFn = Box::new(|f: &mut Field| {
//!     f.tag = format!("json:\"{}\"", f.name().to_lowercase()).into();
//!     Ok(())
//! });
//! let mut filter = Filter::new(vec![
//!     remove_field_filter(Some(Regex::new("^Password.*$").unwrap())),
//!     lowercase_json,
//! ]);
//!
//! let mut heap = Heap::new();
//! let alice = Dynamic::new(
//!     user,
//!     Value::Record(vec![
//!         Value::Utf8("Alice".to_string()),
//!         Value::Utf8("$6$sensitive".to_string()),
//!         Value::Int64(1234567890),
//!     ]),
//! );
//! let filtered = filter.convert(&mut shapes, &mut heap, Some(&alice))?.unwrap();
//! let rendered = json::to_json(&shapes, &heap, &filtered)?;
//! assert_eq!(rendered, json!({"name": "Alice", "logintime": 1234567890}));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`filter`]: the engine, rule composition and ready-made rules
//! - [`types`]: shape arena and record shapes
//! - [`value`]: values and the heap of reference-like nodes
//! - [`json`]: JSON rendering driven by `json` tags
//! - [`observability`]: observers for derivation/conversion outcomes
//! - [`error`]: error types used across the crate

pub mod error;
pub mod filter;
pub mod json;
pub mod observability;
pub mod types;
pub mod value;

pub use error::{FilterError, FilterResult};
pub use filter::{Filter, FilterFn, FilterOptions};
