use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A value bound to a named SQL parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    List(Vec<SqlValue>),
}

impl SqlValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Render the value as a cache/lock key segment. Lists and nulls have no key form.
    pub fn to_key(&self) -> Option<String> {
        match self {
            SqlValue::Text(text) => Some(text.clone()),
            SqlValue::Int(number) => Some(number.to_string()),
            SqlValue::Float(number) => Some(number.to_string()),
            SqlValue::Bool(flag) => Some(flag.to_string()),
            SqlValue::Timestamp(ts) => Some(ts.to_rfc3339()),
            SqlValue::Date(date) => Some(date.to_string()),
            SqlValue::Null | SqlValue::List(_) => None,
        }
    }
}

macro_rules! sql_value_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for SqlValue {
            fn from(value: $ty) -> Self {
                SqlValue::Int(i64::from(value))
            }
        })*
    };
}

sql_value_from_int!(i8, i16, i32, i64, u8, u16, u32);

// Values outside the `i64` range are bound as text.
macro_rules! sql_value_from_wide_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for SqlValue {
            fn from(value: $ty) -> Self {
                i64::try_from(value).map_or_else(|_| SqlValue::Text(value.to_string()), SqlValue::Int)
            }
        })*
    };
}

sql_value_from_wide_int!(i128, isize, u64, u128, usize);

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        SqlValue::Float(f64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<char> for SqlValue {
    fn from(value: char) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

impl<T> From<Vec<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(values: Vec<T>) -> Self {
        SqlValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// The shape and current value of one field, as described by the entity itself.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A non-nullable primitive; it can never express "unset" so it is never bound.
    Primitive,
    /// A scalar value, `None` when unset.
    Scalar(Option<SqlValue>),
    /// A list of strings rendered as `IN (...)`, `None` when unset.
    List(Option<Vec<SqlValue>>),
    /// The fields of a nested entity, `None` when the nested value is unset.
    Nested(Option<Vec<QueryField>>),
}

/// One entry of an entity's self-description, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryField {
    pub name: &'static str,
    pub key: bool,
    pub value: FieldValue,
}

impl QueryField {
    pub fn primitive(name: &'static str, key: bool) -> Self {
        Self {
            name,
            key,
            value: FieldValue::Primitive,
        }
    }

    pub fn scalar(name: &'static str, key: bool, value: Option<SqlValue>) -> Self {
        Self {
            name,
            key,
            value: FieldValue::Scalar(value),
        }
    }

    pub fn list(name: &'static str, key: bool, values: Option<Vec<SqlValue>>) -> Self {
        Self {
            name,
            key,
            value: FieldValue::List(values),
        }
    }

    pub fn nested(name: &'static str, key: bool, fields: Option<Vec<QueryField>>) -> Self {
        Self {
            name,
            key,
            value: FieldValue::Nested(fields),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.value, FieldValue::Primitive)
    }

    /// Whether the field currently carries a value.
    pub fn is_set(&self) -> bool {
        match &self.value {
            FieldValue::Primitive => true,
            FieldValue::Scalar(value) => value.is_some(),
            FieldValue::List(values) => values.is_some(),
            FieldValue::Nested(fields) => fields.is_some(),
        }
    }
}

/// Implemented by every type that can be turned into SQL.
///
/// Normally produced by `#[derive(QueryEntity)]`; the derive decides each field's
/// [`FieldValue`] shape from its Rust type so no runtime reflection is involved.
pub trait QueryEntity {
    /// Target table, `None` for types that only appear nested inside other entities.
    fn table_name() -> Option<&'static str>
    where
        Self: Sized;

    /// The entity's fields in declaration order with their current values.
    fn query_fields(&self) -> Vec<QueryField>;

    /// Current value of a top-level scalar column, looked up by column name.
    fn column_value(&self, column: &str) -> Option<SqlValue>;
}

impl<T> QueryEntity for &T
where
    T: QueryEntity,
{
    fn table_name() -> Option<&'static str> {
        T::table_name()
    }

    fn query_fields(&self) -> Vec<QueryField> {
        (**self).query_fields()
    }

    fn column_value(&self, column: &str) -> Option<SqlValue> {
        (**self).column_value(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_conversion_maps_none_to_null() {
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(7_i32)), SqlValue::Int(7));
    }

    #[test]
    fn wide_integers_fall_back_to_text() {
        assert_eq!(SqlValue::from(Some(42_u64)), SqlValue::Int(42));
        assert_eq!(SqlValue::from(7_usize), SqlValue::Int(7));
        assert_eq!(SqlValue::from(u64::MAX), SqlValue::Text(u64::MAX.to_string()));
    }

    #[test]
    fn key_form_skips_lists_and_nulls() {
        assert_eq!(SqlValue::from("abc").to_key().as_deref(), Some("abc"));
        assert_eq!(SqlValue::Int(42).to_key().as_deref(), Some("42"));
        assert!(SqlValue::Null.to_key().is_none());
        assert!(SqlValue::from(vec!["a", "b"]).to_key().is_none());
    }

    #[test]
    fn unset_fields_report_not_set() {
        assert!(!QueryField::scalar("a", false, None).is_set());
        assert!(QueryField::primitive("b", false).is_set());
        assert!(!QueryField::nested("c", false, None).is_set());
    }
}
