//! Ready-made filter rules driven by a name [`Matcher`].

use regex::Regex;

use super::field::{Field, Tag};
use super::FilterFn;

/// Name predicate used by the convenience rules.
pub trait Matcher {
    /// Returns `true` if `name` matches.
    fn is_match(&self, name: &str) -> bool;
}

impl Matcher for Regex {
    fn is_match(&self, name: &str) -> bool {
        Regex::is_match(self, name)
    }
}

impl<M: Matcher + ?Sized> Matcher for &M {
    fn is_match(&self, name: &str) -> bool {
        (**self).is_match(name)
    }
}

impl<M: Matcher + ?Sized> Matcher for Box<M> {
    fn is_match(&self, name: &str) -> bool {
        (**self).is_match(name)
    }
}

/// Adapts a closure into a [`Matcher`].
#[derive(Debug, Clone, Copy)]
pub struct FnMatcher<F>(pub F);

impl<F: Fn(&str) -> bool> Matcher for FnMatcher<F> {
    fn is_match(&self, name: &str) -> bool {
        (self.0)(name)
    }
}

/// Matches a fixed set of names exactly.
#[derive(Debug, Clone, Default)]
pub struct NameSet(Vec<String>);

impl NameSet {
    /// Create a matcher for the given names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl Matcher for NameSet {
    fn is_match(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }
}

/// Returns a rule that removes every field whose name matches.
///
/// `None` yields a rule that does nothing.
pub fn remove_field_filter<M>(matcher: Option<M>) -> FilterFn
where
    M: Matcher + Send + 'static,
{
    match matcher {
        None => Box::new(|_: &mut Field| Ok(())),
        Some(m) => Box::new(move |field: &mut Field| {
            if m.is_match(field.name()) {
                field.remove();
            }
            Ok(())
        }),
    }
}

/// Returns a rule that prepends `entry` to the tag of every matching field, unless the tag already
/// has an entry with the same key.
///
/// `None` yields a rule that does nothing.
///
/// # Panics
///
/// Panics if `entry` is not a single well-formed `key:"value"` pair.
pub fn insert_tag_filter<M>(matcher: Option<M>, entry: &str) -> FilterFn
where
    M: Matcher + Send + 'static,
{
    let key = Tag::entry_key(entry)
        .unwrap_or_else(|| panic!("malformed tag entry '{entry}', expected key:\"value\""))
        .to_string();
    let entry = entry.to_string();
    match matcher {
        None => Box::new(|_: &mut Field| Ok(())),
        Some(m) => Box::new(move |field: &mut Field| {
            if m.is_match(field.name()) && !field.tag.contains_key(&key) {
                field.tag.prepend(&entry);
            }
            Ok(())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_matching_fields() {
        let re = Regex::new("^Remove.*$").unwrap();
        let mut rule = remove_field_filter(Some(re));

        let mut keep = Field::new("Keep1", "");
        let mut remove = Field::new("Remove1", "");
        rule(&mut keep).unwrap();
        rule(&mut remove).unwrap();
        assert!(keep.is_kept());
        assert!(!remove.is_kept());
    }

    #[test]
    fn none_matcher_is_noop() {
        let mut remove = remove_field_filter(None::<Regex>);
        let mut insert = insert_tag_filter(None::<Regex>, r#"test:"foo""#);
        let mut field = Field::new("Anything", "");
        remove(&mut field).unwrap();
        insert(&mut field).unwrap();
        assert!(field.is_kept());
        assert!(field.tag.is_empty());
    }

    #[test]
    fn insert_tag_respects_existing_key() {
        let mut rule = insert_tag_filter(Some(NameSet::new(["A", "B"])), r#"test:"inserted""#);

        let mut a = Field::new("A", "");
        let mut b = Field::new("B", r#"test:"present""#);
        let mut c = Field::new("C", "");
        for f in [&mut a, &mut b, &mut c] {
            rule(f).unwrap();
        }
        assert_eq!(a.tag.as_str(), r#"test:"inserted""#);
        assert_eq!(b.tag.lookup("test").as_deref(), Some("present"));
        assert!(c.tag.is_empty());
    }

    #[test]
    fn closures_match_via_adapter() {
        let mut rule = remove_field_filter(Some(FnMatcher(|name: &str| name.ends_with("Secret"))));
        let mut field = Field::new("ApiSecret", "");
        rule(&mut field).unwrap();
        assert!(!field.is_kept());
    }

    #[test]
    #[should_panic(expected = "malformed tag entry")]
    fn insert_tag_panics_on_malformed_entry() {
        let _ = insert_tag_filter(Some(NameSet::new(["A"])), "badtag");
    }
}
