use crate::builtins;
use crate::compiler::{BinaryOp, Expr, UnaryOp};
use crate::runtime::{EvalError, EvalResult};
use crate::value::{Val, format_f64};
use serde_json::{Map, Value};

/// Name resolution for free identifiers.
pub trait Scope {
    fn lookup(&mut self, name: &str) -> Option<Val>;
    fn assign(&mut self, name: &str, value: Val) -> EvalResult<()>;
}

/// Evaluate a parsed expression against a scope.
///
/// Identifiers resolve through the scope first and the builtin globals
/// second. Anything else is an undefined reference.
pub fn eval_expr(expr: &Expr, scope: &mut dyn Scope) -> EvalResult {
    match expr {
        // === Literals ===
        Expr::Literal(v) => Ok(Val::Data(v.clone())),
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, scope)?.into_data());
            }
            Ok(Val::Data(Value::Array(out)))
        }
        Expr::Object(entries) => {
            let mut out = Map::new();
            for (key, value) in entries {
                out.insert(key.to_string(), eval_expr(value, scope)?.into_data());
            }
            Ok(Val::Data(Value::Object(out)))
        }

        // === Access ===
        Expr::Ident(name) => lookup(name, scope),
        Expr::Member(object, name) => {
            let target = eval_expr(object, scope)?;
            get_member(&target, name)
        }
        Expr::Index(object, key) => {
            let target = eval_expr(object, scope)?;
            let key = property_key(&eval_expr(key, scope)?);
            get_member(&target, &key)
        }
        Expr::Call(callee, args) => eval_call(callee, args, scope),

        // === Operators ===
        Expr::Unary(op, operand) => {
            if let (UnaryOp::TypeOf, Expr::Ident(name)) = (op, operand.as_ref()) {
                return Ok(match lookup(name, scope) {
                    Ok(v) => Val::from(v.type_of()),
                    Err(EvalError::UndefinedReference(_)) => Val::from("undefined"),
                    Err(e) => return Err(e),
                });
            }
            let v = eval_expr(operand, scope)?;
            Ok(match op {
                UnaryOp::Not => Val::from(!v.is_truthy()),
                UnaryOp::Neg => Val::number(-v.to_number()),
                UnaryOp::Plus => Val::number(v.to_number()),
                UnaryOp::TypeOf => Val::from(v.type_of()),
            })
        }
        Expr::Binary(op, a, b) => {
            let a = eval_expr(a, scope)?;
            let b = eval_expr(b, scope)?;
            Ok(binary(*op, &a, &b))
        }
        Expr::And(a, b) => {
            let left = eval_expr(a, scope)?;
            if left.is_truthy() {
                eval_expr(b, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(a, b) => {
            let left = eval_expr(a, scope)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval_expr(b, scope)
            }
        }
        Expr::Coalesce(a, b) => {
            let left = eval_expr(a, scope)?;
            if left.is_null() {
                eval_expr(b, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Conditional(cond, then, otherwise) => {
            if eval_expr(cond, scope)?.is_truthy() {
                eval_expr(then, scope)
            } else {
                eval_expr(otherwise, scope)
            }
        }

        // === Writes ===
        Expr::Assign(target, op, value) => {
            let next = match op {
                Some(op) => {
                    let current = eval_expr(target, scope)?;
                    binary(*op, &current, &eval_expr(value, scope)?)
                }
                None => eval_expr(value, scope)?,
            };
            write_target(target, next.clone(), scope)?;
            Ok(next)
        }
        Expr::Update {
            target,
            delta,
            prefix,
        } => {
            let old = eval_expr(target, scope)?.to_number();
            let next = Val::number(old + delta);
            write_target(target, next.clone(), scope)?;
            Ok(if *prefix { next } else { Val::number(old) })
        }

        Expr::Sequence(parts) => {
            let mut last = Val::null();
            for part in parts {
                last = eval_expr(part, scope)?;
            }
            Ok(last)
        }
    }
}

fn lookup(name: &str, scope: &mut dyn Scope) -> EvalResult {
    scope
        .lookup(name)
        .or_else(|| builtins::global(name))
        .ok_or_else(|| EvalError::UndefinedReference(name.to_string()))
}

fn eval_call(callee: &Expr, args: &[Expr], scope: &mut dyn Scope) -> EvalResult {
    let (receiver, method) = match callee {
        Expr::Member(object, name) => (Some(eval_expr(object, scope)?), name.to_string()),
        Expr::Index(object, key) => {
            let target = eval_expr(object, scope)?;
            let key = property_key(&eval_expr(key, scope)?);
            (Some(target), key)
        }
        _ => (None, String::new()),
    };

    let Some(receiver) = receiver else {
        let f = eval_expr(callee, scope)?;
        let args = eval_args(args, scope)?;
        return match f {
            Val::Func(f) => f(args),
            _ => Err(EvalError::NotCallable(callee_name(callee))),
        };
    };

    let args = eval_args(args, scope)?;
    match receiver {
        Val::Data(Value::Null) => Err(EvalError::Type(format!(
            "cannot read properties of null (reading '{method}')"
        ))),
        Val::Data(v) => builtins::call_method(&v, &method, args),
        Val::Host(h) => match h.get(&method) {
            Some(Val::Func(f)) => f(args),
            _ => h.call(&method, args),
        },
        Val::Func(_) => Err(EvalError::NotCallable(method)),
    }
}

fn eval_args(args: &[Expr], scope: &mut dyn Scope) -> EvalResult<Vec<Val>> {
    args.iter().map(|a| eval_expr(a, scope)).collect()
}

fn callee_name(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        _ => "expression".to_string(),
    }
}

/// Property read with JS-like results for the supported value shapes.
pub fn get_member(target: &Val, key: &str) -> EvalResult {
    match target {
        Val::Data(Value::Null) => Err(EvalError::Type(format!(
            "cannot read properties of null (reading '{key}')"
        ))),
        Val::Data(Value::Object(map)) => Ok(map.get(key).cloned().map_or_else(Val::null, Val::Data)),
        Val::Data(Value::Array(items)) => {
            if key == "length" {
                return Ok(Val::number(items.len() as f64));
            }
            Ok(key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .map_or_else(Val::null, Val::Data))
        }
        Val::Data(Value::String(s)) => {
            if key == "length" {
                return Ok(Val::number(s.chars().count() as f64));
            }
            Ok(key
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map_or_else(Val::null, |c| Val::from(c.to_string())))
        }
        Val::Data(_) | Val::Func(_) => Ok(Val::null()),
        Val::Host(h) => Ok(h.get(key).unwrap_or_else(Val::null)),
    }
}

fn property_key(v: &Val) -> String {
    match v {
        Val::Data(Value::Number(n)) => n
            .as_i64()
            .map(|i| i.to_string())
            .unwrap_or_else(|| format_f64(n.as_f64().unwrap_or(f64::NAN))),
        other => other.to_js_string(),
    }
}

fn write_target(target: &Expr, value: Val, scope: &mut dyn Scope) -> EvalResult<()> {
    let (object, key) = match target {
        Expr::Ident(name) => return scope.assign(name, value),
        Expr::Member(object, name) => (object, name.to_string()),
        Expr::Index(object, key) => {
            let key = property_key(&eval_expr(key, scope)?);
            (object, key)
        }
        _ => return Err(EvalError::Type("invalid assignment target".to_string())),
    };
    match eval_expr(object, scope)? {
        Val::Host(h) => h.set(&key, value),
        Val::Data(Value::Null) => Err(EvalError::Type(format!(
            "cannot set properties of null (setting '{key}')"
        ))),
        _ => Err(EvalError::Type(format!(
            "cannot assign '{key}' inside a data value; assign the whole value instead"
        ))),
    }
}

pub fn binary(op: BinaryOp, a: &Val, b: &Val) -> Val {
    match op {
        BinaryOp::Add => {
            if is_stringish(a) || is_stringish(b) {
                Val::from(format!("{}{}", a.to_js_string(), b.to_js_string()))
            } else {
                Val::number(a.to_number() + b.to_number())
            }
        }
        BinaryOp::Sub => Val::number(a.to_number() - b.to_number()),
        BinaryOp::Mul => Val::number(a.to_number() * b.to_number()),
        BinaryOp::Div => Val::number(a.to_number() / b.to_number()),
        BinaryOp::Mod => Val::number(a.to_number() % b.to_number()),
        BinaryOp::Lt => Val::from(compare(a, b, |o| o.is_lt())),
        BinaryOp::Lte => Val::from(compare(a, b, |o| o.is_le())),
        BinaryOp::Gt => Val::from(compare(a, b, |o| o.is_gt())),
        BinaryOp::Gte => Val::from(compare(a, b, |o| o.is_ge())),
        BinaryOp::Eq => Val::from(a.loose_eq(b)),
        BinaryOp::Neq => Val::from(!a.loose_eq(b)),
        BinaryOp::StrictEq => Val::from(a.strict_eq(b)),
        BinaryOp::StrictNeq => Val::from(!a.strict_eq(b)),
    }
}

fn is_stringish(v: &Val) -> bool {
    !matches!(
        v,
        Val::Data(Value::Null | Value::Bool(_) | Value::Number(_))
    )
}

fn compare(a: &Val, b: &Val, test: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    if let (Val::Data(Value::String(x)), Val::Data(Value::String(y))) = (a, b) {
        return test(x.cmp(y));
    }
    a.to_number()
        .partial_cmp(&b.to_number())
        .is_some_and(test)
}
