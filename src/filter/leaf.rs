//! [`Loggable`] for standard and common third-party types.
//!
//! Scalars, strings and collections are leaves. `Option` is the nullable
//! pointer; `Box`, `Rc` and `Arc` are pointers that are never nil.

use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
    rc::Rc,
    sync::Arc,
};

use serde::Serialize;
use serde_json::Value;

use super::{LogValue, Loggable};

/// Serialized form of `value`. A value serde_json cannot represent becomes
/// a string carrying the error, so the failure shows up in the record.
fn leaf<T: Serialize + ?Sized>(value: &T) -> LogValue<'_> {
    let value = serde_json::to_value(value)
        .unwrap_or_else(|err| Value::String(format!("!ERROR: {err}")));
    LogValue::Leaf(value)
}

macro_rules! serialize_leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Loggable for $ty {
                fn log_value(&self) -> LogValue<'_> {
                    leaf(self)
                }
            }
        )*
    };
}

serialize_leaf!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, str, Value,
);

impl<T: Serialize> Loggable for [T] {
    fn log_value(&self) -> LogValue<'_> {
        leaf(self)
    }
}

impl<T, const N: usize> Loggable for [T; N]
where
    [T; N]: Serialize,
{
    fn log_value(&self) -> LogValue<'_> {
        leaf(self)
    }
}

impl<T: Serialize> Loggable for Vec<T> {
    fn log_value(&self) -> LogValue<'_> {
        leaf(self)
    }
}

impl<K: Serialize, V: Serialize> Loggable for BTreeMap<K, V> {
    fn log_value(&self) -> LogValue<'_> {
        leaf(self)
    }
}

impl<K: Serialize, V: Serialize, S: BuildHasher> Loggable for HashMap<K, V, S> {
    fn log_value(&self) -> LogValue<'_> {
        leaf(self)
    }
}

impl<Tz: chrono::TimeZone> Loggable for chrono::DateTime<Tz>
where
    chrono::DateTime<Tz>: Serialize,
{
    fn log_value(&self) -> LogValue<'_> {
        leaf(self)
    }
}

impl<T: Loggable + ?Sized> Loggable for &T {
    fn log_value(&self) -> LogValue<'_> {
        (**self).log_value()
    }
}

impl<T: Loggable> Loggable for Option<T> {
    fn log_value(&self) -> LogValue<'_> {
        LogValue::Pointer(self.as_ref().map(|value| value as &dyn Loggable))
    }
}

impl<T: Loggable> Loggable for Box<T> {
    fn log_value(&self) -> LogValue<'_> {
        LogValue::Pointer(Some(&**self))
    }
}

impl<T: Loggable> Loggable for Rc<T> {
    fn log_value(&self) -> LogValue<'_> {
        LogValue::Pointer(Some(&**self))
    }
}

impl<T: Loggable> Loggable for Arc<T> {
    fn log_value(&self) -> LogValue<'_> {
        LogValue::Pointer(Some(&**self))
    }
}

/// Log any serializable value as a leaf, without looking inside it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verbatim<T>(pub T);

impl<T: Serialize> Loggable for Verbatim<T> {
    fn log_value(&self) -> LogValue<'_> {
        leaf(&self.0)
    }
}
