//! Native methods on data values and the handful of global functions
//! expressions may call (`parseFloat`, `String`, `JSON.stringify`, ...).

use crate::runtime::{EvalError, EvalResult};
use crate::value::{HostObject, Val, display_string, format_f64, number_value};
use serde_json::Value;

/// Global names resolved after the expression scope.
pub fn global(name: &str) -> Option<Val> {
    let v = match name {
        "parseFloat" => Val::func(|args| Ok(Val::number(parse_float(&arg_string(&args, 0))))),
        "parseInt" => Val::func(|args| {
            let radix = args.get(1).map_or(0, |r| r.to_number() as u32);
            Ok(Val::number(parse_int(&arg_string(&args, 0), radix)))
        }),
        "String" => Val::func(|args| Ok(Val::from(args.first().map(Val::display_string).unwrap_or_default()))),
        "Number" => Val::func(|args| Ok(Val::number(args.first().map_or(0.0, Val::to_number)))),
        "Boolean" => Val::func(|args| Ok(Val::from(args.first().is_some_and(Val::is_truthy)))),
        "isNaN" => Val::func(|args| Ok(Val::from(args.first().map_or(f64::NAN, Val::to_number).is_nan()))),
        "JSON" => Val::host(Json),
        "Math" => Val::host(Math),
        _ => return None,
    };
    Some(v)
}

/// Methods callable on plain data values.
pub fn call_method(target: &Value, method: &str, args: Vec<Val>) -> EvalResult {
    match target {
        Value::String(s) => string_method(s, method, &args),
        Value::Array(items) => array_method(items, method, &args),
        Value::Number(n) => number_method(n.as_f64().unwrap_or(f64::NAN), method, &args),
        _ if method == "toString" => Ok(Val::from(display_string(target))),
        _ => Err(not_callable(target, method)),
    }
}

fn not_callable(target: &Value, method: &str) -> EvalError {
    let kind = match target {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    EvalError::NotCallable(format!("{kind}.{method}"))
}

fn arg_string(args: &[Val], i: usize) -> String {
    args.get(i).map(Val::display_string).unwrap_or_default()
}

fn arg_index(args: &[Val], i: usize, len: usize, default: usize) -> usize {
    match args.get(i) {
        None => default,
        Some(v) if v.is_null() => default,
        Some(v) => {
            let n = v.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                len.saturating_sub((-n) as usize)
            } else {
                (n as usize).min(len)
            }
        }
    }
}

/// Longest string `repeat` may build.
const MAX_STRING_BYTES: usize = 1 << 28;

fn string_method(s: &str, method: &str, args: &[Val]) -> EvalResult {
    let chars: Vec<char> = s.chars().collect();
    let out = match method {
        "toUpperCase" => Val::from(s.to_uppercase()),
        "toLowerCase" => Val::from(s.to_lowercase()),
        "trim" => Val::from(s.trim()),
        "trimStart" => Val::from(s.trim_start()),
        "trimEnd" => Val::from(s.trim_end()),
        "toString" => Val::from(s),
        "includes" => Val::from(s.contains(&arg_string(args, 0))),
        "startsWith" => Val::from(s.starts_with(&arg_string(args, 0))),
        "endsWith" => Val::from(s.ends_with(&arg_string(args, 0))),
        "indexOf" => {
            let needle = arg_string(args, 0);
            Val::number(
                s.find(&needle)
                    .map_or(-1.0, |byte| s[..byte].chars().count() as f64),
            )
        }
        "slice" | "substring" => {
            let start = arg_index(args, 0, chars.len(), 0);
            let end = arg_index(args, 1, chars.len(), chars.len());
            Val::from(chars[start..end.max(start)].iter().collect::<String>())
        }
        "charAt" => Val::from(
            chars
                .get(arg_index(args, 0, chars.len(), 0))
                .map(char::to_string)
                .unwrap_or_default(),
        ),
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None => vec![Value::String(s.to_string())],
                Some(_) => {
                    let sep = arg_string(args, 0);
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str())
                            .map(|p| Value::String(p.to_string()))
                            .collect()
                    }
                }
            };
            Val::Data(Value::Array(parts))
        }
        "replace" => Val::from(s.replacen(&arg_string(args, 0), &arg_string(args, 1), 1)),
        "replaceAll" => Val::from(s.replace(&arg_string(args, 0), &arg_string(args, 1))),
        "repeat" => {
            let n = args.first().map_or(0.0, Val::to_number);
            if n < 0.0 || n.is_infinite() {
                return Err(EvalError::Type(format!("invalid count value: {}", format_f64(n))));
            }
            let count = n as usize;
            if s.len().saturating_mul(count) > MAX_STRING_BYTES {
                return Err(EvalError::Type("invalid string length".to_string()));
            }
            Val::from(s.repeat(count))
        }
        "padStart" | "padEnd" => {
            let width = args.first().map_or(0.0, Val::to_number).max(0.0) as usize;
            if width > MAX_STRING_BYTES {
                return Err(EvalError::Type("invalid string length".to_string()));
            }
            let fill = args.get(1).map_or(" ".to_string(), Val::display_string);
            let missing = width.saturating_sub(chars.len());
            let pad: String = fill.chars().cycle().take(if fill.is_empty() { 0 } else { missing }).collect();
            if method == "padStart" {
                Val::from(format!("{pad}{s}"))
            } else {
                Val::from(format!("{s}{pad}"))
            }
        }
        "concat" => Val::from(format!(
            "{s}{}",
            args.iter().map(Val::display_string).collect::<String>()
        )),
        _ => return Err(not_callable(&Value::String(String::new()), method)),
    };
    Ok(out)
}

fn array_method(items: &[Value], method: &str, args: &[Val]) -> EvalResult {
    let out = match method {
        "includes" => {
            let needle = args.first().cloned().unwrap_or_else(Val::null);
            Val::from(items.iter().any(|v| Val::Data(v.clone()).strict_eq(&needle)))
        }
        "indexOf" => {
            let needle = args.first().cloned().unwrap_or_else(Val::null);
            Val::number(
                items
                    .iter()
                    .position(|v| Val::Data(v.clone()).strict_eq(&needle))
                    .map_or(-1.0, |i| i as f64),
            )
        }
        "join" => {
            let sep = args
                .first()
                .filter(|v| !v.is_null())
                .map_or(",".to_string(), Val::display_string);
            Val::from(items.iter().map(display_string).collect::<Vec<_>>().join(&sep))
        }
        "toString" => Val::from(display_string(&Value::Array(items.to_vec()))),
        "slice" => {
            let start = arg_index(args, 0, items.len(), 0);
            let end = arg_index(args, 1, items.len(), items.len());
            Val::Data(Value::Array(items[start..end.max(start)].to_vec()))
        }
        "concat" => {
            let mut out = items.to_vec();
            for arg in args {
                match arg.clone().into_data() {
                    Value::Array(more) => out.extend(more),
                    other => out.push(other),
                }
            }
            Val::Data(Value::Array(out))
        }
        "at" => {
            let n = args.first().map_or(0.0, Val::to_number);
            let i = if n < 0.0 { items.len() as f64 + n } else { n };
            Val::Data(
                (i >= 0.0)
                    .then(|| items.get(i as usize).cloned())
                    .flatten()
                    .unwrap_or(Value::Null),
            )
        }
        "reverse" => Val::Data(Value::Array(items.iter().rev().cloned().collect())),
        "push" | "pop" | "shift" | "unshift" | "splice" | "sort" => {
            return Err(EvalError::Type(format!(
                "array.{method} would mutate in place; assign a new array instead"
            )));
        }
        _ => return Err(not_callable(&Value::Array(Vec::new()), method)),
    };
    Ok(out)
}

fn number_method(n: f64, method: &str, args: &[Val]) -> EvalResult {
    match method {
        "toFixed" => {
            let digits = args.first().map_or(0.0, Val::to_number).clamp(0.0, 100.0) as usize;
            Ok(Val::from(format!("{n:.digits$}")))
        }
        "toString" => Ok(Val::from(format_f64(n))),
        _ => Err(not_callable(&number_value(n), method)),
    }
}

/// JS `parseFloat`: the longest numeric prefix after leading whitespace.
pub fn parse_float(input: &str) -> f64 {
    let s = input.trim_start();
    for word in ["Infinity", "+Infinity"] {
        if s.starts_with(word) {
            return f64::INFINITY;
        }
    }
    if s.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }

    let bytes = s.as_bytes();
    let mut end = 0;
    let mut best = None;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {
                seen_digit = true;
                end += 1;
                best = Some(end);
            }
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            b'e' | b'E' if seen_digit => {
                let mut exp_end = end + 1;
                if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
                    exp_end += 1;
                }
                let digits_start = exp_end;
                while matches!(bytes.get(exp_end), Some(b'0'..=b'9')) {
                    exp_end += 1;
                }
                if exp_end > digits_start {
                    best = Some(exp_end);
                }
                break;
            }
            _ => break,
        }
    }
    best.and_then(|e| s[..e].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

/// JS `parseInt` for radixes 2 through 36; radix 0 detects a `0x` prefix.
pub fn parse_int(input: &str, radix: u32) -> f64 {
    let mut s = input.trim_start();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    let hex = s.starts_with("0x") || s.starts_with("0X");
    let radix = match radix {
        0 if hex => 16,
        0 => 10,
        r => r,
    };
    if radix == 16 && hex {
        s = &s[2..];
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut value: Option<f64> = None;
    for c in s.chars() {
        let Some(d) = c.to_digit(radix) else {
            break;
        };
        value = Some(value.unwrap_or(0.0) * radix as f64 + d as f64);
    }
    value.map_or(f64::NAN, |v| sign * v)
}

struct Json;

impl HostObject for Json {
    fn type_name(&self) -> &'static str {
        "JSON"
    }

    fn get(&self, _key: &str) -> Option<Val> {
        None
    }

    fn call(&self, method: &str, args: Vec<Val>) -> EvalResult {
        match method {
            "stringify" => {
                let value = args.into_iter().next().map_or(Value::Null, Val::into_data);
                serde_json::to_string(&value)
                    .map(Val::from)
                    .map_err(|e| EvalError::Host(e.to_string()))
            }
            "parse" => serde_json::from_str::<Value>(&arg_string(&args, 0))
                .map(Val::Data)
                .map_err(|e| EvalError::new(format!("JSON.parse: {e}"))),
            _ => Err(EvalError::NotCallable(format!("JSON.{method}"))),
        }
    }
}

struct Math;

impl HostObject for Math {
    fn type_name(&self) -> &'static str {
        "Math"
    }

    fn get(&self, key: &str) -> Option<Val> {
        match key {
            "PI" => Some(Val::number(std::f64::consts::PI)),
            "E" => Some(Val::number(std::f64::consts::E)),
            _ => None,
        }
    }

    fn call(&self, method: &str, args: Vec<Val>) -> EvalResult {
        let first = args.first().map_or(f64::NAN, Val::to_number);
        let numbers = args.iter().map(Val::to_number);
        let out = match method {
            "floor" => first.floor(),
            "ceil" => first.ceil(),
            "round" => (first + 0.5).floor(),
            "abs" => first.abs(),
            "trunc" => first.trunc(),
            "sqrt" => first.sqrt(),
            "sign" => {
                if first == 0.0 || first.is_nan() {
                    first
                } else {
                    first.signum()
                }
            }
            "min" => numbers.fold(f64::INFINITY, |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }),
            "max" => numbers.fold(f64::NEG_INFINITY, |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }),
            "pow" => first.powf(args.get(1).map_or(f64::NAN, Val::to_number)),
            _ => return Err(EvalError::NotCallable(format!("Math.{method}"))),
        };
        Ok(Val::number(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(target: Value, method: &str, args: Vec<Val>) -> Value {
        call_method(&target, method, args)
            .expect("method call")
            .into_data()
    }

    #[test]
    fn parse_float_reads_numeric_prefix() {
        assert_eq!(parse_float("3.5kg"), 3.5);
        assert_eq!(parse_float("  -2e3x"), -2000.0);
        assert_eq!(parse_float(".5"), 0.5);
        assert_eq!(parse_float("1e"), 1.0);
        assert!(parse_float("abc").is_nan());
        assert!(parse_float("").is_nan());
    }

    #[test]
    fn parse_int_truncates() {
        assert_eq!(parse_int("42px", 10), 42.0);
        assert_eq!(parse_int("-7.9", 10), -7.0);
        assert_eq!(parse_int("ff", 16), 255.0);
        assert_eq!(parse_int("0x10", 0), 16.0);
        assert_eq!(parse_int("0x10", 10), 0.0);
        assert!(parse_int("px", 10).is_nan());
    }

    #[test]
    fn string_methods() {
        assert_eq!(call(json!("Hello"), "toUpperCase", vec![]), json!("HELLO"));
        assert_eq!(call(json!("a,b"), "split", vec![Val::from(",")]), json!(["a", "b"]));
        assert_eq!(call(json!("hello"), "slice", vec![Val::number(-3.0)]), json!("llo"));
        assert_eq!(
            call(json!("5"), "padStart", vec![Val::number(3.0), Val::from("0")]),
            json!("005")
        );
        assert_eq!(call(json!("abc"), "indexOf", vec![Val::from("c")]), json!(2));
    }

    #[test]
    fn oversized_strings_are_type_errors() {
        let err = call_method(&json!("x"), "repeat", vec![Val::number(1e15)]).expect_err("too long");
        assert!(matches!(err, EvalError::Type(_)));
        let err = call_method(&json!("x"), "padEnd", vec![Val::number(1e15)]).expect_err("too long");
        assert!(matches!(err, EvalError::Type(_)));
        assert_eq!(call(json!("ab"), "repeat", vec![Val::number(3.0)]), json!("ababab"));
    }

    #[test]
    fn array_methods() {
        let tags = json!(["a", "b", "c"]);
        assert_eq!(call(tags.clone(), "includes", vec![Val::from("b")]), json!(true));
        assert_eq!(call(tags.clone(), "join", vec![Val::from("-")]), json!("a-b-c"));
        assert_eq!(call(tags.clone(), "at", vec![Val::number(-1.0)]), json!("c"));
        assert_eq!(
            call(tags.clone(), "concat", vec![Val::Data(json!(["d"]))]),
            json!(["a", "b", "c", "d"])
        );
        assert!(matches!(
            call_method(&tags, "push", vec![Val::from("d")]),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn number_methods() {
        assert_eq!(call(json!(2.5), "toFixed", vec![Val::number(2.0)]), json!("2.50"));
        assert!(matches!(
            call_method(&json!(1), "nope", vec![]),
            Err(EvalError::NotCallable(_))
        ));
    }

    #[test]
    fn json_global_round_trips_text() {
        let Some(Val::Host(json)) = global("JSON") else {
            panic!("JSON global");
        };
        let text = json
            .call("stringify", vec![Val::Data(json!({"a": [1]}))])
            .expect("stringify")
            .into_data();
        assert_eq!(text, json!("{\"a\":[1]}"));
        assert!(json.call("parse", vec![Val::from("{oops")]).is_err());
    }
}
