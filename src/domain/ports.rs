use crate::domain::model::Record;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Key-indexed access required by the record-editing combinators and the join.
pub trait Keyed: Sized {
    type Value;

    /// A record with no fields.
    fn empty() -> Self;
    fn get_key(&self, key: &str) -> Option<&Self::Value>;
    fn put_key(&mut self, key: String, value: Self::Value) -> Option<Self::Value>;
    fn take_key(&mut self, key: &str) -> Option<Self::Value>;

    fn has_key(&self, key: &str) -> bool {
        self.get_key(key).is_some()
    }

    /// Copies every field of `other` into `self`, overwriting on collision.
    fn merge(&mut self, other: Self);
}

impl Keyed for Record {
    type Value = Value;

    fn empty() -> Self {
        Record::new()
    }

    fn get_key(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    fn put_key(&mut self, key: String, value: Value) -> Option<Value> {
        self.data.insert(key, value)
    }

    fn take_key(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    fn merge(&mut self, other: Self) {
        self.data.extend(other.data);
    }
}

impl Keyed for Map<String, Value> {
    type Value = Value;

    fn empty() -> Self {
        Map::new()
    }

    fn get_key(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }

    fn put_key(&mut self, key: String, value: Value) -> Option<Value> {
        self.insert(key, value)
    }

    fn take_key(&mut self, key: &str) -> Option<Value> {
        self.remove(key)
    }

    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

impl<V> Keyed for HashMap<String, V> {
    type Value = V;

    fn empty() -> Self {
        HashMap::new()
    }

    fn get_key(&self, key: &str) -> Option<&V> {
        self.get(key)
    }

    fn put_key(&mut self, key: String, value: V) -> Option<V> {
        self.insert(key, value)
    }

    fn take_key(&mut self, key: &str) -> Option<V> {
        self.remove(key)
    }

    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

impl<V> Keyed for BTreeMap<String, V> {
    type Value = V;

    fn empty() -> Self {
        BTreeMap::new()
    }

    fn get_key(&self, key: &str) -> Option<&V> {
        self.get(key)
    }

    fn put_key(&mut self, key: String, value: V) -> Option<V> {
        self.insert(key, value)
    }

    fn take_key(&mut self, key: &str) -> Option<V> {
        self.remove(key)
    }

    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

/// Elements that may or may not hold children of their own type.
pub trait Nested: Sized {
    /// Splits a container into its children, or hands a leaf back unchanged.
    fn into_children(self) -> Result<Vec<Self>, Self>;

    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl Nested for Value {
    fn into_children(self) -> Result<Vec<Self>, Self> {
        match self {
            Value::Array(items) => Ok(items),
            leaf => Err(leaf),
        }
    }

    fn describe(&self) -> String {
        let text = self.to_string();
        if text.chars().count() > 40 {
            format!("{}...", text.chars().take(40).collect::<String>())
        } else {
            text
        }
    }
}

/// One key or a list of keys.
pub trait IntoKeys {
    fn into_keys(self) -> Vec<String>;
}

impl IntoKeys for &str {
    fn into_keys(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoKeys for String {
    fn into_keys(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoKeys for &String {
    fn into_keys(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl IntoKeys for Vec<String> {
    fn into_keys(self) -> Vec<String> {
        self
    }
}

impl IntoKeys for Vec<&str> {
    fn into_keys(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoKeys for &[&str] {
    fn into_keys(self) -> Vec<String> {
        self.iter().map(|key| key.to_string()).collect()
    }
}

impl IntoKeys for &[String] {
    fn into_keys(self) -> Vec<String> {
        self.to_vec()
    }
}

impl<const N: usize> IntoKeys for [&str; N] {
    fn into_keys(self) -> Vec<String> {
        self.iter().map(|key| key.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_merge_overwrites() {
        let mut left = Record::from_value(json!({"k": 1, "a": "x"})).unwrap();
        let right = Record::from_value(json!({"k": 1, "a": "y", "b": "p"})).unwrap();
        left.merge(right);
        assert_eq!(left.into_value(), json!({"k": 1, "a": "y", "b": "p"}));
    }

    #[test]
    fn test_value_children() {
        assert_eq!(json!([1, 2]).into_children(), Ok(vec![json!(1), json!(2)]));
        assert_eq!(json!(3).into_children(), Err(json!(3)));
    }

    #[test]
    fn test_into_keys_shorthand() {
        assert_eq!("a".into_keys(), vec!["a".to_string()]);
        assert_eq!(["a", "b"].into_keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
