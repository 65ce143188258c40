use indexmap::IndexSet;
use proptest::prelude::*;
use serde_json::{Map, Value, json};
use std::rc::Rc;
use xjs_core::{Bindings, Engine};
use xjs_web::{Component, Document, Registries, RuntimeConfig, Store};

const KEYS: [&str; 5] = ["a", "b", "c", "d", "e"];

fn store() -> Store {
    let mut data = Map::new();
    for (i, key) in KEYS.iter().enumerate() {
        data.insert(key.to_string(), json!(i + 1));
    }
    Store::new(data)
}

fn mount(expression: &str) -> (Document, Component) {
    let data = KEYS
        .iter()
        .map(|k| format!("{k}: 1"))
        .collect::<Vec<_>>()
        .join(", ");
    let html = format!(r#"<div x-data="{{ {data} }}"><p x-text="{expression}"></p></div>"#);
    let doc = Document::parse(&html).expect("parses");
    let root = doc.body().children()[0].clone();
    let component = Component::new(
        &root,
        Rc::new(Registries::with_builtins()),
        Rc::new(RuntimeConfig::default()),
    )
    .expect("mounts");
    (doc, component)
}

fn key_subset() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::sample::subsequence(KEYS.to_vec(), 1..=KEYS.len())
}

fn join_with(keys: &[&str], ops: &[&str]) -> String {
    let mut out = String::new();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push_str(ops[i % ops.len()]);
        }
        out.push_str(key);
    }
    out
}

proptest! {
    #[test]
    fn every_read_key_is_a_dependency(
        keys in key_subset(),
        ops in proptest::collection::vec(prop_oneof![Just(" + "), Just(" * "), Just(" - ")], 1..4),
    ) {
        let expression = join_with(&keys, &ops);
        let out = Engine::new()
            .evaluate(&expression, &store(), &Bindings::new())
            .expect("evaluates");
        for key in &keys {
            prop_assert!(out.dependencies.contains(*key), "{key} missing from {expression}");
        }
    }

    #[test]
    fn writes_outside_the_dependencies_do_not_reapply(
        keys in key_subset(),
        write in proptest::sample::select(KEYS.to_vec()),
    ) {
        let (doc, c) = mount(&join_with(&keys, &[" + "]));
        let p = c.root().children()[0].clone();
        p.set_text_content("sentinel");
        c.set(write, json!(10));
        doc.event_loop().run_until_idle();
        if keys.contains(&write) {
            prop_assert_ne!(p.text_content(), "sentinel");
        } else {
            prop_assert_eq!(p.text_content(), "sentinel");
        }
    }

    #[test]
    fn a_burst_of_writes_is_one_refresh_over_their_union(
        writes in proptest::collection::vec((proptest::sample::select(KEYS.to_vec()), 0i64..100), 1..20),
    ) {
        let (doc, c) = mount("a + b + c + d + e");
        for (key, value) in &writes {
            c.set(key, json!(value));
        }
        let expected: IndexSet<String> = writes.iter().map(|(k, _)| k.to_string()).collect();
        prop_assert_eq!(c.store().mutated(), expected);

        doc.event_loop().run_until_idle();
        prop_assert_eq!(c.refresh_count(), 1);
        prop_assert!(c.store().mutated().is_empty());

        let total: i64 = KEYS
            .iter()
            .map(|k| c.get(k).and_then(|v: Value| v.as_i64()).unwrap_or_default())
            .sum();
        prop_assert_eq!(c.root().children()[0].text_content(), total.to_string());
    }
}
