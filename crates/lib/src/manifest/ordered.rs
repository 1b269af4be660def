//! An insertion-ordered string-keyed map.
//!
//! Manifest maps (`dependencies`, `buildEnv`, `exportedEnv`, …) keep their
//! declaration order because environment composition is last-writer-wins in
//! that order.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
  fn default() -> Self {
    Self(Vec::new())
  }
}

impl<V> OrderedMap<V> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<&V> {
    self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  /// Insert or replace a value. Replacing keeps the key's original position.
  pub fn insert(&mut self, key: impl Into<String>, value: V) {
    let key = key.into();
    match self.0.iter_mut().find(|(k, _)| *k == key) {
      Some(slot) => slot.1 = value,
      None => self.0.push((key, value)),
    }
  }

  pub fn remove(&mut self, key: &str) -> Option<V> {
    let pos = self.0.iter().position(|(k, _)| k == key)?;
    Some(self.0.remove(pos).1)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(|(k, _)| k.as_str())
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut map = Self::new();
    for (k, v) in iter {
      map.insert(k, v);
    }
    map
  }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.0.len()))?;
    for (k, v) in &self.0 {
      map.serialize_entry(k, v)?;
    }
    map.end()
  }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct OrderedVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
      type Value = OrderedMap<V>;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map")
      }

      fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(OrderedMap::new())
      }

      fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
          map.insert(key, value);
        }
        Ok(map)
      }
    }

    deserializer.deserialize_any(OrderedVisitor(PhantomData))
  }
}
