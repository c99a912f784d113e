//! Scripting runtime interface.
//!
//! The service description, characteristic values, and user callbacks cross
//! the runtime boundary as [`Value`] trees. A runtime binding converts its own
//! objects into these values and receives events through [`EventTarget`].

use std::fmt::{Debug, Formatter};
use std::io::Read;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::gatts::MAX_ATTR_LEN;

use crate::name_of;

/// Event argument list. Events carry at most one argument.
pub type Args = SmallVec<[Value; 1]>;

/// Well-known event target of the scripting runtime.
pub trait EventTarget {
    /// Queues `event` with `args` for the runtime. Returns `false` if the
    /// runtime has no event target object to deliver it to.
    fn emit(&mut self, event: &str, args: Args) -> bool;
}

/// Callable runtime value.
#[derive(Clone)]
#[repr(transparent)]
pub struct Function(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Function {
    /// Invokes the function and returns its result.
    #[inline]
    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }
}

impl Debug for Function {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple(name_of!(Function)).field(&Arc::as_ptr(&self.0).cast::<()>())).finish()
    }
}

impl PartialEq for Function {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.0).cast::<()>() == Arc::as_ptr(&other.0).cast::<()>()
    }
}

impl<T: Fn(&[Value]) -> Value + Send + Sync + 'static> From<T> for Function {
    #[inline(always)]
    fn from(f: T) -> Self {
        Self(Arc::new(f))
    }
}

/// Runtime value.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Byte string.
    Str(Vec<u8>),
    /// Array buffer or typed array view.
    Buffer(Vec<u8>),
    Array(Vec<Value>),
    Object(Object),
    Function(Function),
}

impl Value {
    /// Parses a JSON document into a value tree, preserving key order.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<serde_json::Value>(s).map(Self::from)
    }

    /// Reads a JSON document into a value tree, preserving key order.
    pub fn from_json_reader(r: impl Read) -> serde_json::Result<Self> {
        serde_json::from_reader::<_, serde_json::Value>(r).map(Self::from)
    }

    /// Returns whether the value is an object.
    #[inline]
    #[must_use]
    pub const fn is_object(&self) -> bool {
        matches!(*self, Self::Object(_))
    }

    /// Returns the object representation, if any.
    #[inline]
    #[must_use]
    pub const fn as_object(&self) -> Option<&Object> {
        match *self {
            Self::Object(ref o) => Some(o),
            _ => None,
        }
    }

    /// Returns the mutable object representation, if any.
    #[inline]
    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match *self {
            Self::Object(ref mut o) => Some(o),
            _ => None,
        }
    }

    /// Returns the function, if any.
    #[inline]
    #[must_use]
    pub const fn as_function(&self) -> Option<&Function> {
        match *self {
            Self::Function(ref f) => Some(f),
            _ => None,
        }
    }

    /// Returns the value of a non-empty string.
    #[inline]
    #[must_use]
    pub fn as_nonempty_str(&self) -> Option<&[u8]> {
        match *self {
            Self::Str(ref s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean interpretation of the value.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match *self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => b,
            Self::Number(n) => n != 0.0 && !n.is_nan(),
            Self::Str(ref s) => !s.is_empty(),
            Self::Buffer(_) | Self::Array(_) | Self::Object(_) | Self::Function(_) => true,
        }
    }

    /// Flattens the value into bytes. Strings and buffers contribute their
    /// contents, numbers and booleans one byte each, and arrays their elements
    /// in order. An object of the form `{data, count}` repeats `data` `count`
    /// times, stopping once the output reaches the maximum attribute length.
    /// Other values contribute nothing.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.append_bytes(&mut v);
        v
    }

    fn append_bytes(&self, out: &mut Vec<u8>) {
        match *self {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Self::Number(n) => out.push(n as i64 as u8),
            Self::Bool(b) => out.push(u8::from(b)),
            Self::Str(ref b) | Self::Buffer(ref b) => out.extend_from_slice(b),
            Self::Array(ref a) => a.iter().for_each(|v| v.append_bytes(out)),
            Self::Object(ref o) => {
                let Some(data) = o.get("data") else { return };
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let count = match o.get("count") {
                    Some(&Self::Number(n)) if n >= 0.0 => n as usize,
                    _ => 1,
                };
                for _ in 0..count {
                    let n = out.len();
                    if n >= MAX_ATTR_LEN {
                        break;
                    }
                    data.append_bytes(out);
                    if out.len() == n {
                        break;
                    }
                }
            }
            Self::Undefined | Self::Null | Self::Function(_) => {}
        }
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(s: &str) -> Self {
        Self::Str(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(s: String) -> Self {
        Self::Str(s.into_bytes())
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<Object> for Value {
    #[inline]
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}

impl From<Function> for Value {
    #[inline]
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::from(s),
            Json::Array(a) => Self::Array(a.into_iter().map(Self::from).collect()),
            Json::Object(m) => Self::Object(m.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

/// Runtime object with keys in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
#[repr(transparent)]
pub struct Object(Vec<(String, Value)>);

impl Object {
    /// Creates an empty object.
    #[inline(always)]
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the number of keys.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the object has no keys.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the child value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Returns the mutable child value for `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.iter_mut().find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Sets the child value for `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, v: Value) -> Option<Value> {
        let key = key.into();
        if let Some(old) = self.get_mut(&key) {
            return Some(std::mem::replace(old, v));
        }
        self.0.push((key, v));
        None
    }

    /// Returns an iterator over keyed children in insertion order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a mutable iterator over keyed children in insertion order.
    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.0.iter_mut().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(it: I) -> Self {
        let mut o = Self::new();
        for (k, v) in it {
            o.insert(k, v);
        }
        o
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn bytes() {
        assert_eq!(Value::from("HELLO").to_bytes(), b"HELLO");
        assert_eq!(Value::Number(100.0).to_bytes(), [0x64]);
        assert_eq!(Value::Number(-1.0).to_bytes(), [0xFF]);
        assert_eq!(Value::Bool(true).to_bytes(), [1]);
        assert_eq!(
            Value::Array(vec![1.0.into(), "ab".into(), Value::Buffer(vec![9])]).to_bytes(),
            [1, b'a', b'b', 9]
        );
        let rep: Object = [("data", Value::from(7.0)), ("count", Value::from(3.0))]
            .into_iter()
            .collect();
        assert_eq!(Value::from(rep).to_bytes(), [7, 7, 7]);
        let huge: Object = [("data", Value::from("ab")), ("count", Value::from(1e12))]
            .into_iter()
            .collect();
        let v = Value::from(huge).to_bytes();
        assert_eq!(v.len(), MAX_ATTR_LEN);
        assert!(v.chunks(2).all(|c| c == b"ab"));
        let empty: Object = [("data", Value::Null), ("count", Value::from(1e12))]
            .into_iter()
            .collect();
        assert!(Value::from(empty).to_bytes().is_empty());
        assert!(Value::Undefined.to_bytes().is_empty());
        assert!(Value::Function(Function::from(|_: &[Value]| Value::Null))
            .to_bytes()
            .is_empty());
    }

    #[test]
    fn truthy() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Object(Object::new()).is_truthy());
    }

    #[test]
    fn object_order() {
        let mut o: Object = [("b", Value::Null), ("a", Value::Null)].into_iter().collect();
        assert_eq!(o.insert("b", Value::Bool(true)), Some(Value::Null));
        o.insert("c", Value::Null);
        let keys: Vec<_> = o.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b", "a", "c"]);
        assert_eq!(o.get("b"), Some(&Value::Bool(true)));
    }

    #[test]
    fn json() -> anyhow::Result<()> {
        let v = Value::from_json_str(r#"{"180F": {"2A19": {"notify": true, "value": [100]}}, "180A": {}}"#)?;
        let o = v.as_object().unwrap();
        let keys: Vec<_> = o.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["180F", "180A"]);
        let c = o.get("180F").and_then(Value::as_object).and_then(|s| s.get("2A19")).unwrap();
        let c = c.as_object().unwrap();
        assert!(c.get("notify").unwrap().is_truthy());
        assert_eq!(c.get("value").unwrap().to_bytes(), [100]);

        let mut f = tempfile::NamedTempFile::new()?;
        f.write_all(br#"{"180D": {"2A37": {"readable": true, "value": "HELLO"}}}"#)?;
        let v = Value::from_json_reader(std::fs::File::open(f.path())?)?;
        assert!(v.as_object().unwrap().get("180D").unwrap().is_object());
        Ok(())
    }

    #[test]
    fn function_identity() {
        let f = Function::from(|args: &[Value]| args.first().cloned().unwrap_or_default());
        let g = f.clone();
        assert_eq!(f, g);
        assert_ne!(f, Function::from(|_: &[Value]| Value::Null));
        assert_eq!(f.call(&[Value::from(1.0)]), Value::Number(1.0));
    }
}
