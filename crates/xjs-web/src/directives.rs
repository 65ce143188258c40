//! Built-in directives and methods.

use crate::attributes::AttributeDescriptor;
use crate::component::Component;
use crate::dom::{Element, Event, IterationScope};
use crate::props::update_attribute;
use crate::registry::{Directive, DirectiveOutput, Method, Registries};
use serde_json::{Map, Value};
use xjs_core::{EvalError, Val};

pub const FOR_ATTRIBUTE: &str = "x-for";

const DIRECTIVES: &[(&str, Directive)] = &[
    ("bind", bind),
    ("show", show),
    ("hide", hide),
    ("cloak", hide),
    ("text", text),
    ("html", html),
    ("for", iterate),
];

const METHODS: &[(&str, Method)] = &[("dispatch", dispatch)];

pub fn register_builtins(registries: &Registries) {
    for (name, directive) in DIRECTIVES {
        if let Err(err) = registries.register_directive(name, *directive) {
            tracing::debug!(%err, "built-in directive not registered");
        }
    }
    for (name, method) in METHODS {
        if let Err(err) = registries.register_method(name, *method) {
            tracing::debug!(%err, "built-in method not registered");
        }
    }
}

/// `:attr` / `x-bind:attr`: project the value onto `attr`.
fn bind(el: &Element, output: DirectiveOutput, attr: &AttributeDescriptor, _: &Registries, _: &Component) {
    let Some(target) = attr.modifiers.first() else {
        tracing::warn!(attribute = %attr.attribute, "bind without a target attribute");
        return;
    };
    update_attribute(el, target, &output.into_data());
}

fn show(el: &Element, output: DirectiveOutput, _: &AttributeDescriptor, _: &Registries, _: &Component) {
    el.set_display(Some(if output.is_truthy() { "block" } else { "none" }));
}

/// `x-hide` and `x-cloak`: hide once and drop the attribute.
fn hide(el: &Element, _: DirectiveOutput, attr: &AttributeDescriptor, _: &Registries, _: &Component) {
    el.set_display(Some("none"));
    el.remove_attribute(&attr.attribute);
}

fn text(el: &Element, output: DirectiveOutput, _: &AttributeDescriptor, _: &Registries, _: &Component) {
    el.set_text_content(&output.display_string());
}

fn html(el: &Element, output: DirectiveOutput, attr: &AttributeDescriptor, _: &Registries, _: &Component) {
    if let Err(err) = el.set_inner_html(&output.display_string()) {
        tracing::warn!(attribute = %attr.attribute, %err, "x-html fragment rejected");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iteration {
    pub item: String,
    pub index: Option<String>,
    pub items: String,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// `item in items` or `(item, index) in items`.
pub fn parse_iteration(source: &str) -> Option<Iteration> {
    let (lhs, rhs) = source.split_once(" in ")?;
    let items = rhs.trim();
    if items.is_empty() {
        return None;
    }
    let lhs = lhs.trim();
    let lhs = lhs
        .strip_prefix('(')
        .and_then(|l| l.strip_suffix(')'))
        .unwrap_or(lhs);
    let mut names = lhs.split(',').map(str::trim);
    let item = names.next().filter(|n| is_identifier(n))?.to_string();
    let index = match names.next() {
        Some(n) if is_identifier(n) => Some(n.to_string()),
        Some(_) => return None,
        None => None,
    };
    if names.next().is_some() {
        return None;
    }
    Some(Iteration {
        item,
        index,
        items: items.to_string(),
    })
}

/// `x-for`: the element is a hidden template. Each pass removes the clones
/// it stamped before, then stamps one clone per item right after it. Clones
/// carry the loop variables as their iteration scope and are initialized by
/// the component like any other markup.
fn iterate(el: &Element, _: DirectiveOutput, attr: &AttributeDescriptor, _: &Registries, component: &Component) {
    let Some(iteration) = parse_iteration(&attr.expression) else {
        tracing::warn!(expression = %attr.expression, "x-for expects `item in items`");
        return;
    };
    let Some(parent) = el.parent() else {
        tracing::warn!(element = ?el, "x-for template has no parent");
        return;
    };
    el.set_display(Some("none"));
    let template_id = el.id();
    for child in parent.children() {
        if child.scope().is_some_and(|s| s.template == template_id) {
            child.remove();
        }
    }

    let items = match component.evaluate(&iteration.items, el) {
        Ok(out) => match out.value.into_data() {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                tracing::warn!(items = %iteration.items, value = %other, "x-for source is not an array");
                return;
            }
        },
        Err(err) => {
            tracing::warn!(items = %iteration.items, %err, "x-for source did not evaluate");
            return;
        }
    };

    let inherited: Vec<(String, Value)> = el
        .inherited_scope()
        .map(|s| s.vars.clone())
        .unwrap_or_default();
    let mut anchor = el.clone();
    for (i, item) in items.into_iter().enumerate() {
        let clone = el.clone_node(true);
        clone.remove_attribute(FOR_ATTRIBUTE);
        clone.set_display(None);

        let mut vars: Vec<(String, Value)> = inherited
            .iter()
            .filter(|(name, _)| *name != iteration.item && Some(name) != iteration.index.as_ref())
            .cloned()
            .collect();
        vars.push((iteration.item.clone(), item));
        if let Some(index) = &iteration.index {
            vars.push((index.clone(), Value::from(i)));
        }
        clone.set_scope(Some(IterationScope {
            vars,
            template: template_id,
        }));

        anchor.insert_after(&clone);
        component.initialize_subtree(&clone);
        anchor = clone;
    }
}

/// `$dispatch(name, detail)`: a bubbling custom event from the handler's
/// target element.
fn dispatch(_: &Event, target: Option<&Element>) -> Val {
    let target = target.cloned();
    Val::func(move |args: Vec<Val>| {
        let Some(target) = &target else {
            return Err(EvalError::Host("$dispatch has no target element".to_string()));
        };
        let name = args.first().map(Val::display_string).unwrap_or_default();
        if name.is_empty() {
            return Err(EvalError::Type("$dispatch needs an event name".to_string()));
        }
        let detail = args
            .get(1)
            .cloned()
            .map_or_else(|| Value::Object(Map::new()), Val::into_data);
        target.dispatch_event(&Event::custom(&name, detail));
        Ok(Val::null())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::dom::Document;
    use serde_json::json;
    use std::rc::Rc;

    fn mount(html: &str) -> (Document, Component) {
        let doc = Document::parse(html).expect("parses");
        let root = doc.body().children()[0].clone();
        let component = Component::new(
            &root,
            Rc::new(Registries::with_builtins()),
            Rc::new(RuntimeConfig::default()),
        )
        .expect("mounts");
        (doc, component)
    }

    fn texts(el: &Element) -> Vec<String> {
        el.children()
            .iter()
            .filter(|c| c.is_rendered())
            .map(Element::text_content)
            .collect()
    }

    #[test]
    fn parses_iteration_sources() {
        assert_eq!(
            parse_iteration("dog in dogs"),
            Some(Iteration {
                item: "dog".to_string(),
                index: None,
                items: "dogs".to_string()
            })
        );
        let with_index = parse_iteration("(dog, i) in pack.dogs").expect("parses");
        assert_eq!(with_index.index.as_deref(), Some("i"));
        assert_eq!(with_index.items, "pack.dogs");
        assert_eq!(parse_iteration("dogs"), None);
        assert_eq!(parse_iteration("1dog in dogs"), None);
        assert_eq!(parse_iteration("(a, b, c) in xs"), None);
    }

    #[test]
    fn show_text_bind_and_cloak() {
        let (_doc, c) = mount(
            r#"<div x-data="{ open: false, label: 'hi', cls: ['a', 'b'] }" x-cloak>
                 <p x-show="open"></p><span x-text="label"></span><i :class="cls"></i>
               </div>"#,
        );
        let kids = c.root().children();
        assert_eq!(kids[0].display().as_deref(), Some("none"));
        assert_eq!(kids[1].text_content(), "hi");
        assert_eq!(kids[2].get_attribute("class").as_deref(), Some("a b"));
        assert!(!c.root().has_attribute("x-cloak"));
        assert_eq!(c.root().display().as_deref(), Some("none"));
    }

    #[test]
    fn html_replaces_children() {
        let (_doc, c) = mount(r#"<div x-data="{ markup: '<b>bold</b>' }"><p x-html="markup">old</p></div>"#);
        assert_eq!(c.root().children()[0].inner_html(), "<b>bold</b>");
    }

    #[test]
    fn iteration_stamps_clones_after_the_template() {
        let (doc, c) = mount(
            r#"<ul x-data="{ dogs: ['rex', 'fido'] }"><li x-for="(dog, i) in dogs" x-text="i + ':' + dog"></li><li>tail</li></ul>"#,
        );
        assert_eq!(texts(c.root()), vec!["0:rex", "1:fido", "tail"]);
        c.set("dogs", json!(["a", "b", "c"]));
        doc.event_loop().run_until_idle();
        assert_eq!(texts(c.root()), vec!["0:a", "1:b", "2:c", "tail"]);
        c.set("dogs", json!([]));
        doc.event_loop().run_until_idle();
        assert_eq!(texts(c.root()), vec!["tail"]);
    }

    #[test]
    fn clone_handlers_see_their_item() {
        let (_doc, c) = mount(
            r#"<div x-data="{ picked: '', items: ['x', 'y'] }"><button x-for="item in items" @click="picked = item"></button></div>"#,
        );
        let buttons: Vec<Element> = c.root().children().into_iter().filter(|b| b.is_rendered()).collect();
        assert_eq!(buttons.len(), 2);
        buttons[1].click();
        assert_eq!(c.get("picked"), Some(json!("y")));
    }

    #[test]
    fn nested_iterations_inherit_outer_variables() {
        let (_doc, c) = mount(
            r#"<div x-data="{ rows: [[1, 2], [3]] }"><section x-for="row in rows"><i x-for="cell in row" x-text="cell + row.length"></i></section></div>"#,
        );
        let cells: Vec<String> = c
            .root()
            .descendants()
            .into_iter()
            .filter(|el| el.tag_name() == "i" && el.is_rendered())
            .map(|el| el.text_content())
            .collect();
        assert_eq!(cells, vec!["3", "4", "4"]);
    }

    #[test]
    fn dispatch_bubbles_a_custom_event() {
        let (_doc, c) = mount(
            r#"<div x-data="{ got: null }" @picked="got = $event.detail.id"><a @click="$dispatch('picked', { id: 7 })">x</a></div>"#,
        );
        c.root().children()[0].click();
        assert_eq!(c.get("got"), Some(json!(7)));
    }

    #[test]
    fn dispatch_without_a_name_fails_softly() {
        let (doc, c) = mount(r#"<div x-data="{ n: 0 }"><a @click="$dispatch(''); n = 1">x</a></div>"#);
        c.root().children()[0].click();
        assert_eq!(c.get("n"), Some(json!(0)));
        assert!(doc.event_loop().is_idle());
    }
}
