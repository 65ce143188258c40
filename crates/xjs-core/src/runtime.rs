use crate::compiler::{Expr, compile};
use crate::value::Val;
use crate::vm::{Scope, eval_expr};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;

pub type EvalResult<T = Val> = Result<T, EvalError>;

/// Extra names visible to an expression. They shadow data keys and are
/// never recorded as dependencies.
pub type Bindings = HashMap<String, Val>;

/// Data keys read during one evaluation, in first-access order.
pub type Dependencies = IndexSet<String>;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum EvalError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("{0} is not defined")]
    UndefinedReference(String),
    #[error("{0} is not a function")]
    NotCallable(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("host error: {0}")]
    Host(String),
    #[error("{0}")]
    Runtime(String),
}

impl EvalError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn syntax(offset: usize, msg: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: msg.into(),
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
}

/// The data an expression resolves free identifiers against.
pub trait DataContext {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl DataContext for RefCell<Map<String, Value>> {
    fn get(&self, key: &str) -> Option<Value> {
        self.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.borrow_mut().insert(key.to_string(), value);
    }
}

/// Read-tracking view over a [`DataContext`], alive for a single evaluation.
///
/// Every key successfully read through it lands in the caller's accumulator.
/// Writes pass straight through to the wrapped context.
pub struct Tracked<'a, D: DataContext + ?Sized> {
    inner: &'a D,
    reads: RefCell<&'a mut Dependencies>,
}

impl<'a, D: DataContext + ?Sized> Tracked<'a, D> {
    pub fn new(inner: &'a D, reads: &'a mut Dependencies) -> Self {
        Self {
            inner,
            reads: RefCell::new(reads),
        }
    }
}

impl<D: DataContext + ?Sized> DataContext for Tracked<'_, D> {
    fn get(&self, key: &str) -> Option<Value> {
        let value = self.inner.get(key)?;
        let mut reads = self.reads.borrow_mut();
        if !reads.contains(key) {
            reads.insert(key.to_string());
        }
        Some(value)
    }

    fn set(&self, key: &str, value: Value) {
        self.inner.set(key, value);
    }

    fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub value: Val,
    pub dependencies: Dependencies,
}

struct ContextScope<'a> {
    data: &'a dyn DataContext,
    extra: &'a Bindings,
}

impl Scope for ContextScope<'_> {
    fn lookup(&mut self, name: &str) -> Option<Val> {
        if let Some(v) = self.extra.get(name) {
            return Some(v.clone());
        }
        self.data.get(name).map(Val::Data)
    }

    fn assign(&mut self, name: &str, value: Val) -> EvalResult<()> {
        if self.extra.contains_key(name) {
            return Err(EvalError::Type(format!(
                "cannot assign to scope variable '{name}'"
            )));
        }
        self.data.set(name, value.into_data());
        Ok(())
    }
}

/// Evaluate an expression for its value, capturing every data key it reads.
pub fn evaluate<D: DataContext + ?Sized>(
    expression: &str,
    data: &D,
    extra: &Bindings,
) -> EvalResult<Evaluation> {
    let expr = compile(expression)?;
    evaluate_expr(&expr, data, extra)
}

pub fn evaluate_expr<D: DataContext + ?Sized>(
    expr: &Expr,
    data: &D,
    extra: &Bindings,
) -> EvalResult<Evaluation> {
    let mut dependencies = Dependencies::new();
    let value = {
        let tracked = Tracked::new(data, &mut dependencies);
        let mut scope = ContextScope {
            data: &tracked,
            extra,
        };
        eval_expr(expr, &mut scope)?
    };
    Ok(Evaluation {
        value,
        dependencies,
    })
}

/// Execute a statement for its side effects only. Reads are not tracked.
pub fn run<D: DataContext + ?Sized>(expression: &str, data: &D, extra: &Bindings) -> EvalResult<()> {
    let expr = compile(expression)?;
    run_expr(&expr, data, extra)
}

pub fn run_expr<D: DataContext + ?Sized>(expr: &Expr, data: &D, extra: &Bindings) -> EvalResult<()> {
    let data: &dyn DataContext = &DynData(data);
    let mut scope = ContextScope { data, extra };
    eval_expr(expr, &mut scope)?;
    Ok(())
}

struct DynData<'a, D: DataContext + ?Sized>(&'a D);

impl<D: DataContext + ?Sized> DataContext for DynData<'_, D> {
    fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: Value) {
        self.0.set(key, value);
    }

    fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

/// Evaluate a data literal such as `{ open: false, tags: [] }` into an object map.
///
/// Non-object results yield an empty map.
pub fn read_data_literal(expression: &str) -> EvalResult<Map<String, Value>> {
    let source = if expression.trim().is_empty() {
        "{}"
    } else {
        expression
    };
    let empty = RefCell::new(Map::new());
    let out = evaluate(source, &empty, &Bindings::new())?;
    match out.value.into_data() {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}
