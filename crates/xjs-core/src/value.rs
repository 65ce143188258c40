use crate::runtime::{EvalError, EvalResult};
use serde_json::{Number, Value};
use std::fmt;
use std::rc::Rc;

/// Native callable exposed to expressions (method helpers, `parseFloat`, ...).
pub type NativeFn = Rc<dyn Fn(Vec<Val>) -> EvalResult>;

/// An object owned by the host environment (an element, an event, a lazy
/// lookup table) that expressions can read, write and call into.
pub trait HostObject {
    fn type_name(&self) -> &'static str;

    fn get(&self, key: &str) -> Option<Val>;

    fn set(&self, key: &str, value: Val) -> EvalResult<()> {
        let _ = value;
        Err(EvalError::Type(format!(
            "cannot assign '{key}' on {}",
            self.type_name()
        )))
    }

    fn call(&self, method: &str, args: Vec<Val>) -> EvalResult {
        let _ = args;
        Err(EvalError::NotCallable(format!("{}.{method}", self.type_name())))
    }

    /// Plain-data projection used when the object flows into the data store.
    fn to_data(&self) -> Value {
        Value::Null
    }
}

/// Expression value: plain data, a host object, or a native function.
///
/// `undefined` has no separate representation and reads as JSON `null`.
#[derive(Clone)]
pub enum Val {
    Data(Value),
    Host(Rc<dyn HostObject>),
    Func(NativeFn),
}

impl Val {
    pub fn null() -> Self {
        Val::Data(Value::Null)
    }

    pub fn host(object: impl HostObject + 'static) -> Self {
        Val::Host(Rc::new(object))
    }

    pub fn func(f: impl Fn(Vec<Val>) -> EvalResult + 'static) -> Self {
        Val::Func(Rc::new(f))
    }

    pub fn number(n: f64) -> Self {
        Val::Data(number_value(n))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Val::Data(Value::Null))
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Val::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_data(self) -> Value {
        match self {
            Val::Data(v) => v,
            Val::Host(h) => h.to_data(),
            Val::Func(_) => Value::Null,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Data(v) => truthy(v),
            Val::Host(_) | Val::Func(_) => true,
        }
    }

    /// JS `ToNumber` for the supported value shapes.
    pub fn to_number(&self) -> f64 {
        match self {
            Val::Data(v) => to_number(v),
            _ => f64::NAN,
        }
    }

    /// JS `ToString` as used by `+` concatenation.
    pub fn to_js_string(&self) -> String {
        match self {
            Val::Data(Value::Null) => "null".to_string(),
            Val::Data(v) => display_string(v),
            Val::Host(h) => format!("[object {}]", h.type_name()),
            Val::Func(_) => "function () { [native code] }".to_string(),
        }
    }

    /// String projected into the DOM (text content, input values); `null` is empty.
    pub fn display_string(&self) -> String {
        match self {
            Val::Data(v) => display_string(v),
            other => other.to_js_string(),
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Val::Data(Value::Null) => "object",
            Val::Data(Value::Bool(_)) => "boolean",
            Val::Data(Value::Number(_)) => "number",
            Val::Data(Value::String(_)) => "string",
            Val::Data(_) | Val::Host(_) => "object",
            Val::Func(_) => "function",
        }
    }

    pub fn strict_eq(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Data(a), Val::Data(b)) => data_strict_eq(a, b),
            (Val::Host(a), Val::Host(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            (Val::Func(a), Val::Func(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            _ => false,
        }
    }

    pub fn loose_eq(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Data(a), Val::Data(b)) => match (a, b) {
                (Value::Null, Value::Null) => true,
                (Value::Null, _) | (_, Value::Null) => false,
                (Value::String(_), Value::String(_)) => a == b,
                (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
                    data_strict_eq(a, b)
                }
                _ => to_number(a) == to_number(b),
            },
            _ => self.strict_eq(other),
        }
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Data(v) => write!(f, "Data({v})"),
            Val::Host(h) => write!(f, "Host({})", h.type_name()),
            Val::Func(_) => write!(f, "Func"),
        }
    }
}

impl From<Value> for Val {
    fn from(v: Value) -> Self {
        Val::Data(v)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Data(Value::String(s.to_string()))
    }
}

impl From<String> for Val {
    fn from(s: String) -> Self {
        Val::Data(Value::String(s))
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Data(Value::Bool(b))
    }
}

impl From<f64> for Val {
    fn from(n: f64) -> Self {
        Val::number(n)
    }
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn to_number(v: &Value) -> f64 {
    match v {
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                0.0
            } else {
                t.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Array(a) if a.is_empty() => 0.0,
        Value::Array(a) if a.len() == 1 => to_number(&a[0]),
        _ => f64::NAN,
    }
}

/// Integral finite numbers become JSON integers; NaN and infinities become `null`.
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub fn format_f64(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{:.0}", f)
    } else {
        f.to_string()
    }
}

pub fn display_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n
            .as_i64()
            .map(|i| i.to_string())
            .unwrap_or_else(|| format_f64(n.as_f64().unwrap_or(f64::NAN))),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn data_strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
