//! Per-field editing context handed to filter rules, and the field metadata ([`Tag`]) they edit.

use std::fmt;

/// Field metadata: an ordered list of `key:"value"` entries separated by spaces.
///
/// Lookup follows the usual struct-tag conventions: the key runs up to the colon, the value is a
/// double-quoted string with backslash escapes, and scanning stops at the first malformed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    /// Wrap a raw tag string. No validation is performed.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw tag string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the tag is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the unquoted value stored under `key`, if present and well-formed.
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.entries()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Returns `true` if an entry with `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries().any(|(k, _)| k == key)
    }

    /// Iterate well-formed entries as `(key, unquoted value)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, String)> {
        let mut rest = self.0.as_str();
        std::iter::from_fn(move || {
            let (key, quoted, tail) = split_entry(rest.trim_start_matches(' '))?;
            rest = tail;
            Some((key, unquote(quoted)?))
        })
    }

    /// Parse a single well-formed `key:"value"` entry, returning its key.
    ///
    /// Returns `None` unless `entry` consists of exactly one entry and nothing else.
    pub fn entry_key(entry: &str) -> Option<&str> {
        let (key, quoted, tail) = split_entry(entry)?;
        unquote(quoted)?;
        tail.is_empty().then_some(key)
    }

    /// Insert `entry` in front of the existing entries.
    pub fn prepend(&mut self, entry: &str) {
        self.0 = if self.0.is_empty() {
            entry.to_string()
        } else {
            format!("{entry} {}", self.0)
        };
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Tag {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Split `key:"value"` off the front of `s`, returning the key, the quoted value (with quotes)
/// and the remainder.
fn split_entry(s: &str) -> Option<(&str, &str, &str)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] > b' ' && bytes[i] != b':' && bytes[i] != b'"' && bytes[i] != 0x7f {
        i += 1;
    }
    if i == 0 || i + 1 >= bytes.len() || bytes[i] != b':' || bytes[i + 1] != b'"' {
        return None;
    }
    let key = &s[..i];
    let value = &s[i + 1..];

    let bytes = value.as_bytes();
    let mut j = 1;
    while j < bytes.len() && bytes[j] != b'"' {
        if bytes[j] == b'\\' {
            j += 1;
        }
        j += 1;
    }
    if j >= bytes.len() {
        return None;
    }
    Some((key, &value[..=j], &value[j + 1..]))
}

fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            other @ ('"' | '\\' | '\'') => out.push(other),
            _ => return None,
        }
    }
    Some(out)
}

/// One candidate field while a record shape is being filtered.
///
/// Rules may edit [`Field::tag`] and decide inclusion with [`Field::keep`] / [`Field::remove`].
/// The last decision wins; the name cannot be changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    /// Metadata of the field in the filtered shape.
    pub tag: Tag,
    keep: bool,
}

impl Field {
    /// Create a descriptor for a field that is kept by default.
    pub fn new(name: impl Into<String>, tag: impl Into<Tag>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            keep: true,
        }
    }

    /// Name of the field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclude this field from the filtered shape. A later rule may call [`Field::keep`].
    pub fn remove(&mut self) {
        self.keep = false;
    }

    /// Include this field in the filtered shape (the default). Countermands an earlier
    /// [`Field::remove`].
    pub fn keep(&mut self) {
        self.keep = true;
    }

    /// Whether the field is currently kept.
    pub fn is_kept(&self) -> bool {
        self.keep
    }

    pub(crate) fn into_parts(self) -> (String, Tag) {
        (self.name, self.tag)
    }
}
