use crate::core::chain::Chain;
use crate::domain::ports::{IntoKeys, Keyed};
use crate::utils::error::ChainError;

impl<'a, S: 'a, T: Keyed + 'a> Chain<'a, S, T> {
    /// Sets `key` to a clone of `value` on every record.
    pub fn set_key<K, V>(self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<T::Value> + Clone + 'a,
    {
        let key = key.into();
        self.stage("set_key", move |stream| {
            stream.map(move |item| {
                item.map(|mut record| {
                    record.put_key(key.clone(), value.clone().into());
                    record
                })
            })
        })
    }

    /// Same as [`Chain::set_key`].
    pub fn add_key<K, V>(self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<T::Value> + Clone + 'a,
    {
        self.set_key(key, value)
    }

    /// Sets `key` to whatever `f` computes from the record.
    pub fn set_key_with<K, V, F>(self, key: K, mut f: F) -> Self
    where
        K: Into<String>,
        V: Into<T::Value>,
        F: FnMut(&T) -> V + 'a,
    {
        let key = key.into();
        self.stage("set_key", move |stream| {
            stream.map(move |item| {
                item.map(|mut record| {
                    let value = f(&record).into();
                    record.put_key(key.clone(), value);
                    record
                })
            })
        })
    }

    /// Removes `key`; a record without it fails with [`ChainError::MissingKey`].
    pub fn drop_key<K: Into<String>>(self, key: K) -> Self {
        let key = key.into();
        self.stage("drop_key", move |stream| {
            stream.map(move |item| {
                item.and_then(|mut record| match record.take_key(&key) {
                    Some(_) => Ok(record),
                    None => Err(ChainError::missing_key(&key)),
                })
            })
        })
    }

    /// Moves the value at `old` to `new`.
    ///
    /// Records lacking `old` fail with [`ChainError::MissingKey`] when
    /// `strict`, and pass through untouched otherwise.
    pub fn rename_key<K1, K2>(self, old: K1, new: K2, strict: bool) -> Self
    where
        K1: Into<String>,
        K2: Into<String>,
    {
        let (old, new) = (old.into(), new.into());
        self.stage("rename_key", move |stream| {
            stream.map(move |item| {
                item.and_then(|mut record| match record.take_key(&old) {
                    Some(value) => {
                        record.put_key(new.clone(), value);
                        Ok(record)
                    }
                    None if strict => Err(ChainError::missing_key(&old)),
                    None => Ok(record),
                })
            })
        })
    }

    /// Replaces each record with a new one holding only `keys`.
    ///
    /// Accepts a single key or a list. Requested keys the record lacks are
    /// left out.
    pub fn keep_keys<K: IntoKeys>(self, keys: K) -> Self {
        let keys = keys.into_keys();
        self.stage("keep_keys", move |stream| {
            stream.map(move |item| {
                item.map(|mut record| {
                    let mut kept = T::empty();
                    for key in &keys {
                        if let Some(value) = record.take_key(key) {
                            kept.put_key(key.clone(), value);
                        }
                    }
                    kept
                })
            })
        })
    }

    /// Passes the value at each of `keys` through `f`.
    pub fn map_key<K, F>(self, keys: K, mut f: F) -> Self
    where
        K: IntoKeys,
        F: FnMut(T::Value) -> T::Value + 'a,
    {
        let keys = keys.into_keys();
        self.stage("map_key", move |stream| {
            stream.map(move |item| {
                item.and_then(|mut record| {
                    for key in &keys {
                        let value = record.take_key(key).ok_or_else(|| ChainError::missing_key(key))?;
                        record.put_key(key.clone(), f(value));
                    }
                    Ok(record)
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::core::chain::Chain;
    use crate::domain::model::Record;
    use crate::utils::error::{ChainError, Result};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn drain(chain: Chain<'_, Record>) -> Result<Vec<Value>> {
        chain.into_iter().map(|item| item.map(Record::into_value)).collect()
    }

    #[test]
    fn test_set_key_constant_and_computed() {
        let out = drain(
            Chain::new(vec![record(json!({"n": 2})), record(json!({"n": 3}))])
                .set_key("flag", true)
                .set_key_with("double", |r: &Record| r.get("n").and_then(Value::as_i64).unwrap_or(0) * 2),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                json!({"n": 2, "flag": true, "double": 4}),
                json!({"n": 3, "flag": true, "double": 6}),
            ]
        );
    }

    #[test]
    fn test_drop_key_requires_key() {
        let out = drain(Chain::new(vec![record(json!({"a": 1, "b": 2}))]).drop_key("b")).unwrap();
        assert_eq!(out, vec![json!({"a": 1})]);

        let err = drain(Chain::new(vec![record(json!({"a": 1}))]).drop_key("b")).unwrap_err();
        assert!(matches!(err, ChainError::MissingKey { key } if key == "b"));
    }

    #[test]
    fn test_rename_key_strictness() {
        let source = || vec![record(json!({"a": 1})), record(json!({"b": 2}))];

        let lenient = drain(Chain::new(source()).rename_key("a", "z", false)).unwrap();
        assert_eq!(lenient, vec![json!({"z": 1}), json!({"b": 2})]);

        let mut strict = Chain::new(source()).rename_key("a", "z", true).into_iter();
        assert_eq!(strict.next().unwrap().unwrap().into_value(), json!({"z": 1}));
        assert!(matches!(strict.next(), Some(Err(ChainError::MissingKey { .. }))));
        assert!(strict.next().is_none());
    }

    #[test]
    fn test_missing_key_is_not_handled() {
        let mut handled = 0;
        let result = drain(
            Chain::new(vec![record(json!({"b": 2}))])
                .rename_key("a", "z", true)
                .on_error(|_, _| {
                    handled += 1;
                    Ok(())
                }),
        );
        assert!(result.is_err());
        assert_eq!(handled, 0);
    }

    #[test]
    fn test_keep_keys_single_and_list() {
        let source = || vec![record(json!({"a": 1, "b": 2}))];
        assert_eq!(drain(Chain::new(source()).keep_keys(vec!["a"])).unwrap(), vec![json!({"a": 1})]);
        assert_eq!(drain(Chain::new(source()).keep_keys("a")).unwrap(), vec![json!({"a": 1})]);
        assert_eq!(
            drain(Chain::new(source()).keep_keys(["a", "b", "c"])).unwrap(),
            vec![json!({"a": 1, "b": 2})]
        );
    }

    #[test]
    fn test_map_key_over_several_keys() {
        let out = drain(
            Chain::new(vec![record(json!({"x": 1, "y": 2, "z": 3}))])
                .map_key(["x", "y"], |v| json!(v.as_i64().unwrap_or(0) * 10)),
        )
        .unwrap();
        assert_eq!(out, vec![json!({"x": 10, "y": 20, "z": 3})]);
    }

    #[test]
    fn test_key_edits_on_hash_maps() {
        let source = (0..3).map(|k| HashMap::from([("k".to_string(), k)]));
        let out: Vec<i32> = Chain::new(source)
            .map_key("k", |v| v * 2)
            .into_iter()
            .map(|item| item.map(|m| m["k"]))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out, vec![0, 2, 4]);
    }
}
