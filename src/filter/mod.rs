//! Policy-driven redaction of record values.
//!
//! Types opt in through [`loggable!`](crate::loggable), which declares the
//! struct as usual and records per-field inclusion tags:
//!
//! ```
//! use logshape::{FilterPolicy, filter, loggable};
//!
//! loggable! {
//!     pub struct Login {
//!         pub user: String,
//!         #[log = false]
//!         pub password: String,
//!         pub otp: Option<String>,
//!     }
//! }
//!
//! let login = Login { user: "ada".into(), password: "hunter2".into(), otp: None };
//! let filtered = filter(&login, FilterPolicy::discard_nil());
//! assert_eq!(filtered.to_string(), r#"{"user":"ada"}"#);
//! ```
//!
//! Filtering walks the fields in declaration order:
//!
//! - a field tagged `false` is dropped;
//! - a nil pointer-like field (`None`) is dropped when the policy says so;
//! - a nested struct is filtered recursively;
//! - everything else, including a non-nil pointer to a struct, is kept as is.
//!
//! The result is a fresh [`Filtered`] value. The input is never modified.

mod leaf;

use std::fmt;

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};

pub use leaf::Verbatim;

use crate::config::parse_bool;

/// A value the filter can look inside.
pub trait Loggable {
    fn log_value(&self) -> LogValue<'_>;
}

/// How a [`Loggable`] presents itself to the filter.
pub enum LogValue<'a> {
    /// A struct declared with `loggable!`, fields in declaration order.
    Struct(Vec<FieldView<'a>>),
    /// A nullable indirection. `None` is nil.
    Pointer(Option<&'a dyn Loggable>),
    /// Anything else, already in its serialized form.
    Leaf(Value),
}

/// One field of a struct as seen by the filter.
pub struct FieldView<'a> {
    pub name: &'static str,
    pub tag: Option<&'static str>,
    pub value: &'a dyn Loggable,
}

impl FieldView<'_> {
    /// Whether the tag allows the field. Absent or unparseable tags include.
    pub fn included(&self) -> bool {
        self.tag.and_then(parse_bool).unwrap_or(true)
    }
}

/// Values accepted in a `#[log = ...]` field attribute.
#[doc(hidden)]
pub trait TagLiteral {
    fn as_tag(self) -> &'static str;
}

impl TagLiteral for &'static str {
    fn as_tag(self) -> &'static str {
        self
    }
}

impl TagLiteral for bool {
    fn as_tag(self) -> &'static str {
        if self { "true" } else { "false" }
    }
}

/// Per-call filtering options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    pub discard_nil_pointers: bool,
}

impl FilterPolicy {
    /// Keep nil pointers.
    pub fn keep_nil() -> Self {
        Self {
            discard_nil_pointers: false,
        }
    }

    /// Drop nil pointers.
    pub fn discard_nil() -> Self {
        Self {
            discard_nil_pointers: true,
        }
    }
}

/// Result of [`filter`]: surviving fields only, original names and order.
#[derive(Debug, Clone, PartialEq)]
pub enum Filtered {
    Value(Value),
    Struct(Vec<FilteredField>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredField {
    pub name: &'static str,
    pub tag: Option<&'static str>,
    pub value: Filtered,
}

impl Filtered {
    /// Field by name, for structs.
    pub fn get(&self, name: &str) -> Option<&Filtered> {
        match self {
            Filtered::Struct(fields) => fields
                .iter()
                .find(|field| field.name == name)
                .map(|field| &field.value),
            Filtered::Value(_) => None,
        }
    }

    /// Names of the surviving fields. Empty for non-structs.
    pub fn field_names(&self) -> Vec<&'static str> {
        match self {
            Filtered::Struct(fields) => fields.iter().map(|field| field.name).collect(),
            Filtered::Value(_) => Vec::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Filtered::Value(value) => value.clone(),
            Filtered::Struct(fields) => Value::Object(
                fields
                    .iter()
                    .map(|field| (field.name.to_string(), field.value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl Serialize for Filtered {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Filtered::Value(value) => value.serialize(serializer),
            Filtered::Struct(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for field in fields {
                    map.serialize_entry(field.name, &field.value)?;
                }
                map.end()
            }
        }
    }
}

/// Compact JSON, suitable as a `%`-recorded tracing field.
impl fmt::Display for Filtered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl Loggable for Filtered {
    fn log_value(&self) -> LogValue<'_> {
        match self {
            // Nil pointers that survived a keep-nil pass stay nil.
            Filtered::Value(Value::Null) => LogValue::Pointer(None),
            Filtered::Value(value) => LogValue::Leaf(value.clone()),
            Filtered::Struct(fields) => LogValue::Struct(
                fields
                    .iter()
                    .map(|field| FieldView {
                        name: field.name,
                        tag: field.tag,
                        value: &field.value,
                    })
                    .collect(),
            ),
        }
    }
}

/// Produce a redacted copy of `value` according to `policy`.
///
/// Non-struct values pass through unchanged; a pointer to a struct is
/// dereferenced first.
pub fn filter<T: Loggable + ?Sized>(value: &T, policy: FilterPolicy) -> Filtered {
    match value.log_value() {
        LogValue::Struct(fields) => filter_fields(fields, policy),
        LogValue::Pointer(Some(inner)) => match inner.log_value() {
            LogValue::Struct(fields) => filter_fields(fields, policy),
            other => Filtered::Value(verbatim_value(other)),
        },
        LogValue::Pointer(None) => Filtered::Value(Value::Null),
        LogValue::Leaf(value) => Filtered::Value(value),
    }
}

fn filter_fields(fields: Vec<FieldView<'_>>, policy: FilterPolicy) -> Filtered {
    let mut kept = Vec::with_capacity(fields.len());

    for field in fields {
        if !field.included() {
            continue;
        }

        let value = match field.value.log_value() {
            LogValue::Pointer(None) if policy.discard_nil_pointers => continue,
            LogValue::Struct(nested) => filter_fields(nested, policy),
            other => Filtered::Value(verbatim_value(other)),
        };

        kept.push(FilteredField {
            name: field.name,
            tag: field.tag,
            value,
        });
    }

    Filtered::Struct(kept)
}

/// Full serialization of a value, ignoring tags.
pub fn verbatim<T: Loggable + ?Sized>(value: &T) -> Value {
    verbatim_value(value.log_value())
}

fn verbatim_value(value: LogValue<'_>) -> Value {
    match value {
        LogValue::Leaf(value) => value,
        LogValue::Pointer(None) => Value::Null,
        LogValue::Pointer(Some(inner)) => verbatim_value(inner.log_value()),
        LogValue::Struct(fields) => Value::Object(
            fields
                .into_iter()
                .map(|field| (field.name.to_string(), verbatim_value(field.value.log_value())))
                .collect(),
        ),
    }
}

/// Declare a struct and implement [`Loggable`] for it.
///
/// Fields may carry `#[log = false]` or `#[log = "false"]` to be excluded
/// from filtered output. The tag goes after any doc comments. Any
/// struct-level attributes (derives included) are passed through.
#[macro_export]
macro_rules! loggable {
    (@tag) => {
        ::core::option::Option::None
    };
    (@tag $tag:literal) => {
        ::core::option::Option::Some($crate::filter::TagLiteral::as_tag($tag))
    };
    (
        $(#[$smeta:meta])*
        $svis:vis struct $name:ident {
            $(
                $(#[doc = $fdoc:literal])*
                $(#[log = $tag:literal])?
                $fvis:vis $field:ident : $fty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$smeta])*
        $svis struct $name {
            $(
                $(#[doc = $fdoc])*
                $fvis $field: $fty,
            )*
        }

        impl $crate::filter::Loggable for $name {
            fn log_value(&self) -> $crate::filter::LogValue<'_> {
                $crate::filter::LogValue::Struct(::std::vec![
                    $(
                        $crate::filter::FieldView {
                            name: ::core::stringify!($field),
                            tag: $crate::loggable!(@tag $($tag)?),
                            value: &self.$field,
                        },
                    )*
                ])
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    loggable! {
        #[derive(Debug, Clone, Default)]
        struct Inner {
            #[log = false]
            a: String,
            #[log = true]
            b: String,
        }
    }

    loggable! {
        #[derive(Debug, Clone, Default)]
        struct Record {
            #[log = "false"]
            a: String,
            #[log = "true"]
            b: String,
            c: Option<String>,
            d: Option<String>,
            #[log = "true"]
            e: Option<String>,
            inner: Inner,
        }
    }

    loggable! {
        /// Redaction scenario: excluded, included, nil.
        struct Scenario {
            #[log = false]
            a: String,
            b: String,
            c: Option<String>,
        }
    }

    loggable! {
        struct Tagged {
            #[log = "maybe"]
            odd: u32,
            #[log = "0"]
            zero: u32,
            #[log = "T"]
            short: u32,
        }
    }

    loggable! {
        struct Holder {
            pointer: Option<Box<Inner>>,
            shared: Arc<Inner>,
            inner: Inner,
        }
    }

    loggable! {
        struct Composed {
            label: String,
            inner: Filtered,
        }
    }

    loggable! {
        struct Plain {
            label: String,
            inner: Inner,
        }
    }

    fn record() -> Record {
        Record {
            a: "A".into(),
            b: "B".into(),
            c: Some("C".into()),
            d: None,
            e: None,
            inner: Inner {
                a: String::new(),
                b: "B".into(),
            },
        }
    }

    #[test]
    fn test_scenario_keeps_only_included_non_nil() {
        let value = Scenario {
            a: "secret".into(),
            b: "visible".into(),
            c: None,
        };

        let filtered = filter(&value, FilterPolicy::discard_nil());

        assert_eq!(filtered.field_names(), vec!["b"]);
        assert_eq!(filtered.to_string(), r#"{"b":"visible"}"#);
    }

    #[test]
    fn test_struct_keeps_nil_pointers_by_default() {
        let filtered = filter(&record(), FilterPolicy::default());

        assert_eq!(filtered.field_names(), vec!["b", "c", "d", "e", "inner"]);
        assert_eq!(
            filtered.to_json(),
            json!({"b": "B", "c": "C", "d": null, "e": null, "inner": {"b": "B"}})
        );
        assert_eq!(filtered.get("inner").unwrap().field_names(), vec!["b"]);
    }

    #[test]
    fn test_struct_discards_nil_pointers() {
        let filtered = filter(&record(), FilterPolicy::discard_nil());

        assert_eq!(filtered.field_names(), vec!["b", "c", "inner"]);
        assert_eq!(
            filtered.to_string(),
            r#"{"b":"B","c":"C","inner":{"b":"B"}}"#
        );
    }

    #[test]
    fn test_tags_are_preserved() {
        let Filtered::Struct(fields) = filter(&record(), FilterPolicy::default()) else {
            panic!("expected a struct");
        };
        let tags: Vec<_> = fields.iter().map(|field| field.tag).collect();
        assert_eq!(tags, vec![Some("true"), None, None, Some("true"), None]);
    }

    #[rstest]
    #[case(FilterPolicy::keep_nil())]
    #[case(FilterPolicy::discard_nil())]
    fn test_nil_passes_through(#[case] policy: FilterPolicy) {
        assert_eq!(filter(&None::<Inner>, policy), Filtered::Value(Value::Null));
    }

    #[rstest]
    #[case(json!(42), &42_u32 as &dyn Loggable)]
    #[case(json!("text"), &"text" as &dyn Loggable)]
    #[case(json!([1, 2, 3]), &[1, 2, 3] as &dyn Loggable)]
    #[case(json!(true), &true as &dyn Loggable)]
    fn test_non_struct_passes_through(#[case] expected: Value, #[case] value: &dyn Loggable) {
        assert_eq!(
            filter(value, FilterPolicy::discard_nil()),
            Filtered::Value(expected)
        );
    }

    #[test]
    fn test_pointer_to_struct_is_dereferenced() {
        let boxed = Box::new(record());
        assert_eq!(
            filter(&boxed, FilterPolicy::default()),
            filter(&record(), FilterPolicy::default())
        );

        let some = Some(record());
        assert_eq!(
            filter(&some, FilterPolicy::discard_nil()),
            filter(&record(), FilterPolicy::discard_nil())
        );
    }

    #[test]
    fn test_unparseable_tag_includes() {
        let value = Tagged {
            odd: 1,
            zero: 2,
            short: 3,
        };

        let filtered = filter(&value, FilterPolicy::default());
        assert_eq!(filtered.to_string(), r#"{"odd":1,"short":3}"#);
    }

    #[test]
    fn test_non_nil_pointers_are_verbatim() {
        let inner = Inner {
            a: "hidden".into(),
            b: "shown".into(),
        };
        let value = Holder {
            pointer: Some(Box::new(inner.clone())),
            shared: Arc::new(inner.clone()),
            inner,
        };

        let filtered = filter(&value, FilterPolicy::discard_nil());

        assert_eq!(
            filtered.to_json(),
            json!({
                "pointer": {"a": "hidden", "b": "shown"},
                "shared": {"a": "hidden", "b": "shown"},
                "inner": {"b": "shown"},
            })
        );
    }

    #[test]
    fn test_filtering_is_compositional() {
        let inner = Inner {
            a: "x".into(),
            b: "y".into(),
        };
        let policy = FilterPolicy::discard_nil();

        let direct = filter(
            &Plain {
                label: "outer".into(),
                inner: inner.clone(),
            },
            policy,
        );
        let composed = filter(
            &Composed {
                label: "outer".into(),
                inner: filter(&inner, policy),
            },
            policy,
        );

        assert_eq!(direct, composed);
    }

    #[rstest]
    #[case(FilterPolicy::keep_nil())]
    #[case(FilterPolicy::discard_nil())]
    fn test_refiltering_is_stable(#[case] policy: FilterPolicy) {
        let once = filter(&record(), policy);
        assert_eq!(filter(&once, policy), once);
    }

    #[test]
    fn test_input_is_untouched() {
        let value = record();
        let _ = filter(&value, FilterPolicy::discard_nil());
        assert_eq!(value.a, "A");
        assert_eq!(value.d, None);
        assert_eq!(value.inner.a, "");
    }

    #[test]
    fn test_verbatim_ignores_tags() {
        assert_eq!(
            verbatim(&record()),
            json!({
                "a": "A", "b": "B", "c": "C", "d": null, "e": null,
                "inner": {"a": "", "b": "B"},
            })
        );
    }

    proptest! {
        #[test]
        fn prop_excluded_field_never_survives(
            a in ".*",
            b in ".*",
            c in proptest::option::of(".*"),
            discard in any::<bool>(),
        ) {
            let value = Scenario { a, b: b.clone(), c: c.clone() };
            let policy = FilterPolicy { discard_nil_pointers: discard };

            let filtered = filter(&value, policy);

            prop_assert!(filtered.get("a").is_none());
            prop_assert_eq!(filtered.get("b"), Some(&Filtered::Value(Value::String(b))));
            match c {
                Some(text) => prop_assert_eq!(
                    filtered.get("c"),
                    Some(&Filtered::Value(Value::String(text)))
                ),
                None if discard => prop_assert!(filtered.get("c").is_none()),
                None => prop_assert_eq!(filtered.get("c"), Some(&Filtered::Value(Value::Null))),
            }
        }
    }
}
