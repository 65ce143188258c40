use crate::compiler::{Expr, compile};
use crate::runtime::{
    Bindings, DataContext, EvalResult, Evaluation, evaluate_expr, read_data_literal, run_expr,
};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Instance-scoped evaluation surface with a parse cache.
///
/// Attribute expressions are re-evaluated on every refresh, so each source
/// string is parsed once and the tree reused. Failed parses are not cached.
#[derive(Default)]
pub struct Engine {
    cache: RefCell<HashMap<String, Rc<Expr>>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse once, reuse afterwards.
    pub fn compile(&self, source: &str) -> EvalResult<Rc<Expr>> {
        if let Some(expr) = self.cache.borrow().get(source) {
            return Ok(expr.clone());
        }
        let expr = Rc::new(compile(source)?);
        self.cache
            .borrow_mut()
            .insert(source.to_string(), expr.clone());
        Ok(expr)
    }

    /// Evaluate for a value, tracking the data keys read.
    pub fn evaluate<D: DataContext + ?Sized>(
        &self,
        source: &str,
        data: &D,
        extra: &Bindings,
    ) -> EvalResult<Evaluation> {
        let expr = self.compile(source)?;
        evaluate_expr(&expr, data, extra)
    }

    /// Execute for side effects.
    pub fn run<D: DataContext + ?Sized>(
        &self,
        source: &str,
        data: &D,
        extra: &Bindings,
    ) -> EvalResult<()> {
        let expr = self.compile(source)?;
        run_expr(&expr, data, extra)
    }

    pub fn read_data(&self, source: &str) -> EvalResult<Map<String, Value>> {
        read_data_literal(source)
    }

    /// Number of distinct sources parsed so far.
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_cache_reuses_trees() {
        let engine = Engine::new();
        let data = RefCell::new(json!({"n": 2}).as_object().cloned().unwrap_or_default());
        let extra = Bindings::new();
        for _ in 0..3 {
            let out = engine.evaluate("n * 2", &data, &extra).expect("evaluates");
            assert_eq!(out.value.into_data(), json!(4));
        }
        assert_eq!(engine.cached(), 1);
        assert!(engine.evaluate("n *", &data, &extra).is_err());
        assert_eq!(engine.cached(), 1);
    }

    #[test]
    fn test_run_mutates_data() {
        let engine = Engine::new();
        let data = RefCell::new(Map::new());
        engine
            .run("open = true", &data, &Bindings::new())
            .expect("runs");
        assert_eq!(data.borrow()["open"], json!(true));
    }
}
