//! Route parameters extracted from dynamic path segments.

/// A map of the dynamic parameters of a matched route.
///
/// Implemented over a `Vec`: `n` is small enough that O(n) scans over a
/// vectorized map beat hashing, and insertion order (outermost segment first)
/// is meaningful. Serializes as a JSON object, preserving encounter order on
/// the way in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamsMap(Vec<(String, String)>);

impl ParamsMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates an empty map with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Inserts a value, replacing (and returning) an existing value with the
    /// same key.
    pub fn insert(&mut self, key: String, value: String) -> Option<String> {
        for (k, v) in &mut self.0 {
            if *k == key {
                return Some(std::mem::replace(v, value));
            }
        }
        self.0.push((key, value));
        None
    }

    /// Returns the value with the given key, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v.as_str()))
    }

    /// The number of parameters in the map.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map contains no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl serde::Serialize for ParamsMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> serde::Deserialize<'de> for ParamsMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> serde::de::Visitor<'de> for MapVisitor {
            type Value = ParamsMap;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of route params")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Self::Value, A::Error> {
                let mut map = ParamsMap::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

impl FromIterator<(String, String)> for ParamsMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = ParamsMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Constructs a [`ParamsMap`] from a list of `"key" => "value"` pairs.
#[macro_export]
macro_rules! params_map {
    ($($key:expr => $val:expr),* ,) => (
        $crate::params_map!($($key => $val),*)
    );
    ($($key:expr => $val:expr),*) => ({
        #[allow(unused_mut)]
        let mut map = $crate::params::ParamsMap::new();
        $( map.insert($key.to_string(), $val.to_string()); )*
        map
    });
}

#[cfg(test)]
mod tests {
    use super::ParamsMap;

    #[test]
    fn insert_replaces_existing_keys() {
        let mut map = ParamsMap::new();
        assert_eq!(map.insert("id".into(), "1".into()), None);
        assert_eq!(map.insert("id".into(), "2".into()), Some("1".into()));
        assert_eq!(map.get("id"), Some("2"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn preserves_insertion_order() {
        let map = params_map!("a" => "1", "b" => "2", "c" => "3");
        let keys: Vec<_> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }
}
