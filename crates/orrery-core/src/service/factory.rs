// Value construction for replicated objects
// A factory seeds the local value and adapts every value received from the wire

use std::{collections::HashMap, marker::PhantomData};

use serde::de::DeserializeOwned;
use serde_json::Value;

use orrery_common::{OrreryError, Result};

use crate::value::{ConcurrentList, ConcurrentMap};

/// Plain JSON map payload
pub type ObjectMap = HashMap<String, Value>;

/// Produces a value from an optional prior representation.
///
/// `None` asks for a fresh default instance. Implementations must not have
/// side effects and must fail with `InvalidArgument` for representations
/// they cannot adapt.
pub trait ObjectFactory<T>: Send + Sync {
    fn new_object(&self, representation: Option<Value>) -> Result<T>;
}

impl<T, F> ObjectFactory<T> for F
where
    F: Fn(Option<Value>) -> Result<T> + Send + Sync,
{
    fn new_object(&self, representation: Option<Value>) -> Result<T> {
        self(representation)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn decode<E: DeserializeOwned>(value: Value) -> Result<E> {
    serde_json::from_value(value).map_err(|e| OrreryError::invalid_argument(e.to_string()))
}

/// Factory for `ObjectMap` values
#[derive(Clone, Copy, Debug, Default)]
pub struct MapFactory;

impl ObjectFactory<ObjectMap> for MapFactory {
    fn new_object(&self, representation: Option<Value>) -> Result<ObjectMap> {
        match representation {
            None => Ok(HashMap::new()),
            Some(Value::Object(map)) => Ok(map.into_iter().collect()),
            Some(other) => Err(OrreryError::invalid_argument(format!(
                "map factory cannot adapt type '{}'",
                kind_of(&other)
            ))),
        }
    }
}

/// Factory for `ConcurrentList` values
pub struct ConcurrentListFactory<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E> ConcurrentListFactory<E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E> Default for ConcurrentListFactory<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DeserializeOwned> ObjectFactory<ConcurrentList<E>> for ConcurrentListFactory<E> {
    fn new_object(&self, representation: Option<Value>) -> Result<ConcurrentList<E>> {
        match representation {
            None => Ok(ConcurrentList::new()),
            Some(Value::Array(elements)) => elements
                .into_iter()
                .map(decode)
                .collect::<Result<Vec<E>>>()
                .map(ConcurrentList::from),
            Some(other) => Err(OrreryError::invalid_argument(format!(
                "list factory cannot adapt type '{}'",
                kind_of(&other)
            ))),
        }
    }
}

/// Factory for `ConcurrentMap` values
pub struct ConcurrentMapFactory<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> ConcurrentMapFactory<V> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for ConcurrentMapFactory<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: DeserializeOwned> ObjectFactory<ConcurrentMap<V>> for ConcurrentMapFactory<V> {
    fn new_object(&self, representation: Option<Value>) -> Result<ConcurrentMap<V>> {
        match representation {
            None => Ok(ConcurrentMap::new()),
            Some(Value::Object(entries)) => {
                let map = ConcurrentMap::new();
                for (key, value) in entries {
                    map.insert(key, decode(value)?);
                }
                Ok(map)
            }
            Some(other) => Err(OrreryError::invalid_argument(format!(
                "concurrent map factory cannot adapt type '{}'",
                kind_of(&other)
            ))),
        }
    }
}

/// Factory for any serde type with a default instance
pub struct SerdeFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeFactory<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Default> ObjectFactory<T> for SerdeFactory<T> {
    fn new_object(&self, representation: Option<Value>) -> Result<T> {
        match representation {
            None => Ok(T::default()),
            Some(value) => decode(value),
        }
    }
}
