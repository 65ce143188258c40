use indexmap::IndexSet;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use xjs_core::DataContext;

type WriteHook = Box<dyn Fn(&str)>;

/// Observable component data.
///
/// Every top-level write is recorded in the mutated set and reported to the
/// write hook. Nested values are plain copies: changing `tags[0]` in place is
/// not observable, replacing `tags` is.
pub struct Store {
    data: RefCell<Map<String, Value>>,
    mutated: RefCell<IndexSet<String>>,
    on_write: RefCell<Option<WriteHook>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("data", &self.data.borrow())
            .field("mutated", &self.mutated.borrow())
            .finish()
    }
}

impl Store {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data: RefCell::new(data),
            mutated: RefCell::new(IndexSet::new()),
            on_write: RefCell::new(None),
        }
    }

    /// Install the callback run after each write.
    pub fn on_write(&self, hook: impl Fn(&str) + 'static) {
        self.on_write.replace(Some(Box::new(hook)));
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.borrow().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.data.borrow_mut().insert(key.to_string(), value);
        self.mutated.borrow_mut().insert(key.to_string());
        let hook = self.on_write.borrow();
        if let Some(hook) = hook.as_ref() {
            hook(key);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.borrow().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.data.borrow().clone()
    }

    /// Keys written since the last [`Store::take_mutated`], in write order.
    pub fn mutated(&self) -> IndexSet<String> {
        self.mutated.borrow().clone()
    }

    /// Swap the mutated set out; later writes accumulate into a fresh one.
    pub fn take_mutated(&self) -> IndexSet<String> {
        std::mem::take(&mut *self.mutated.borrow_mut())
    }
}

impl DataContext for Store {
    fn get(&self, key: &str) -> Option<Value> {
        Store::get(self, key)
    }

    fn set(&self, key: &str, value: Value) {
        Store::set(self, key, value);
    }

    fn contains(&self, key: &str) -> bool {
        self.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;
    use xjs_core::{Bindings, run};

    fn store(v: Value) -> Store {
        Store::new(v.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn writes_are_recorded_once_in_order() {
        let s = store(json!({"a": 1, "b": 2}));
        s.set("b", json!(3));
        s.set("a", json!(4));
        s.set("b", json!(5));
        let keys: Vec<String> = s.mutated().into_iter().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(s.get("b"), Some(json!(5)));
    }

    #[test]
    fn take_mutated_starts_a_new_cycle() {
        let s = store(json!({}));
        s.set("x", json!(1));
        assert_eq!(s.take_mutated().len(), 1);
        assert!(s.mutated().is_empty());
        s.set("y", json!(1));
        assert!(s.mutated().contains("y"));
    }

    #[test]
    fn hook_sees_each_write_and_may_read_back() {
        let s = Rc::new(store(json!({"n": 0})));
        let calls = Rc::new(Cell::new(0));
        let (counter, weak) = (calls.clone(), Rc::downgrade(&s));
        s.on_write(move |key| {
            assert_eq!(key, "n");
            if let Some(s) = weak.upgrade() {
                assert!(s.get("n").is_some());
            }
            counter.set(counter.get() + 1);
        });
        run("n++; n = n + 1", &*s, &Bindings::new()).expect("runs");
        assert_eq!(calls.get(), 2);
        assert_eq!(s.get("n"), Some(json!(2)));
    }

    #[test]
    fn nested_changes_need_a_top_level_write() {
        let s = store(json!({"tags": ["a"]}));
        let mut tags = s.get("tags").expect("present");
        if let Some(items) = tags.as_array_mut() {
            items.push(json!("b"));
        }
        assert_eq!(s.get("tags"), Some(json!(["a"])));
        assert!(s.mutated().is_empty());
        s.set("tags", tags);
        assert_eq!(s.get("tags"), Some(json!(["a", "b"])));
    }
}
