use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Parameters = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// Parameter bag of the request currently being dispatched.
///
/// Query string and form body are merged into one map. Keys written as
/// `outer[inner]` are decoded into nested objects, so `event[venue_id]=3`
/// becomes `{"event": {"venue_id": "3"}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormRequest {
    parameters: Parameters,
    method: Method,
}

impl FormRequest {
    pub fn new(method: Method) -> Self {
        Self {
            parameters: Parameters::new(),
            method,
        }
    }

    pub fn from_pairs<I, K, V>(method: Method, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut request = Self::new(method);
        for (key, value) in pairs {
            request.insert_pair(key.as_ref(), value.into());
        }
        request
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn has(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }

    /// Nested `outer[inner]` value, when `outer` decoded to an object.
    pub fn get_nested(&self, outer: &str, inner: &str) -> Option<&Value> {
        self.parameters.get(outer)?.as_object()?.get(inner)
    }

    pub fn get_all(&self) -> Parameters {
        self.parameters.clone()
    }

    pub fn replace_all(&mut self, parameters: Parameters) {
        self.parameters = parameters;
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(name.into(), value.into());
    }

    fn insert_pair(&mut self, key: &str, value: String) {
        let Some((outer, inner)) = split_bracketed(key) else {
            self.parameters.insert(key.to_string(), Value::String(value));
            return;
        };

        let slot = self
            .parameters
            .entry(outer.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(map) = slot {
            map.insert(inner.to_string(), Value::String(value));
        }
    }
}

fn split_bracketed(key: &str) -> Option<(&str, &str)> {
    let (outer, rest) = key.split_once('[')?;
    let inner = rest.strip_suffix(']')?;
    if outer.is_empty() || inner.contains('[') || inner.contains(']') {
        return None;
    }
    Some((outer, inner))
}

#[cfg(test)]
#[path = "tests/params_tests.rs"]
mod tests;
