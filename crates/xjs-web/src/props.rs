//! Two-way bindings between form fields and component data.
//!
//! `fetch_props` scrapes initial values out of the markup, `read_prop_value`
//! reads one field for write-back, and `update_attribute` projects a data
//! value onto an element.

use crate::attributes::{AttributeDescriptor, AttributeKind, parse_attributes};
use crate::dom::Element;
use crate::walk::walk;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use xjs_core::builtins::parse_float;
use xjs_core::value::{display_string, number_value, truthy};

/// Attributes toggled by presence rather than value.
pub const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "disabled",
    "readonly",
    "required",
    "checked",
    "autofocus",
    "autoplay",
    "hidden",
];

/// `change` for discrete controls and `lazy` bindings, `input` otherwise.
pub fn event_for_prop(el: &Element, modifiers: &[String]) -> &'static str {
    if el.tag_name() == "select" || el.is_checkable() || modifiers.iter().any(|m| m == "lazy") {
        "change"
    } else {
        "input"
    }
}

/// Give a bound field its prop name as `name` when it has none, so radio
/// groups and checkbox groups work without repeating it.
pub fn ensure_name(el: &Element, prop: &str) {
    if el.is_form_field() && !el.has_attribute("name") {
        el.set_attribute("name", prop);
    }
}

/// Merge form-field values found under `root` into `data`.
///
/// Returns every scraped `(element, descriptor)` pair in document order.
pub fn fetch_props(
    root: &Element,
    marker: &str,
    data: &mut Map<String, Value>,
) -> Vec<(Element, AttributeDescriptor)> {
    let mut scraped = Vec::new();
    let mut groups: IndexMap<String, Vec<(String, bool)>> = IndexMap::new();

    walk(root, marker, |el| {
        for attr in parse_attributes(el) {
            if attr.kind != AttributeKind::Prop {
                continue;
            }
            ensure_name(el, &attr.name);
            if el.input_type() == "checkbox" {
                let group = groups.entry(attr.name.clone()).or_default();
                group.push((el.value(), el.checked()));
                let value = if group.len() > 1 {
                    Value::Array(
                        group
                            .iter()
                            .filter(|(_, checked)| *checked)
                            .map(|(v, _)| Value::String(v.clone()))
                            .collect(),
                    )
                } else {
                    Value::Bool(el.checked())
                };
                data.insert(attr.name.clone(), value);
            } else if el.input_type() == "radio" {
                if el.checked() {
                    data.insert(attr.name.clone(), scalar(el.value(), &attr.modifiers));
                } else {
                    data.entry(attr.name.clone()).or_insert(Value::Null);
                }
            } else if el.is_form_field() {
                if !has_own_value(el) && data.contains_key(&attr.name) {
                    tracing::trace!(element = ?el, prop = %attr.name, "empty field keeps the declared value");
                } else if let Some(value) = field_value(el, &attr.modifiers) {
                    data.insert(attr.name.clone(), value);
                }
            } else {
                tracing::trace!(element = ?el, prop = %attr.name, "prop on a non-form element");
            }
            scraped.push((el.clone(), attr));
        }
    });
    scraped
}

/// Value a bound field contributes to `prop` after user input, or `None`
/// when the field has nothing to write (an unchecked radio).
///
/// `group` lists the checkbox elements bound to the same prop, in document
/// order; it is consulted when the current data value is an array.
pub fn read_prop_value(
    el: &Element,
    modifiers: &[String],
    current: Option<&Value>,
    group: &[Element],
) -> Option<Value> {
    match el.input_type().as_str() {
        "checkbox" => {
            if matches!(current, Some(Value::Array(_))) {
                Some(Value::Array(
                    group
                        .iter()
                        .filter(|cb| cb.checked())
                        .map(|cb| Value::String(cb.value()))
                        .collect(),
                ))
            } else {
                Some(Value::Bool(el.checked()))
            }
        }
        "radio" => el.checked().then(|| scalar(el.value(), modifiers)),
        _ => field_value(el, modifiers),
    }
}

/// Whether markup gave the field a value: a `value` attribute on inputs,
/// text in a textarea. Selects always have one.
fn has_own_value(el: &Element) -> bool {
    match el.tag_name().as_str() {
        "input" => el.has_attribute("value"),
        "textarea" => !el.value().is_empty(),
        _ => true,
    }
}

fn field_value(el: &Element, modifiers: &[String]) -> Option<Value> {
    if el.tag_name() == "select" && el.multiple() {
        return Some(Value::Array(
            el.selected_values()
                .into_iter()
                .map(|v| scalar(v, modifiers))
                .collect(),
        ));
    }
    el.is_form_field().then(|| scalar(el.value(), modifiers))
}

fn scalar(raw: String, modifiers: &[String]) -> Value {
    if modifiers.iter().any(|m| m == "number") {
        number_value(parse_float(&raw))
    } else if modifiers.iter().any(|m| m == "trim") {
        Value::String(raw.trim().to_string())
    } else {
        Value::String(raw)
    }
}

/// Project `value` onto `el`'s attribute or live state named `name`.
///
/// Writing an unchanged value leaves the element untouched.
pub fn update_attribute(el: &Element, name: &str, value: &Value) {
    match name {
        "value" => update_value(el, value),
        "class" => match value {
            Value::Array(items) => {
                let classes: Vec<String> = items.iter().map(display_string).collect();
                el.set_attribute("class", &classes.join(" "));
            }
            Value::Object(toggles) => {
                for (class, on) in toggles {
                    el.toggle_class(class, truthy(on));
                }
            }
            other => el.set_attribute("class", &display_string(other)),
        },
        _ if BOOLEAN_ATTRIBUTES.contains(&name) => {
            if truthy(value) {
                el.set_attribute(name, "");
            } else {
                el.remove_attribute(name);
            }
            if name == "checked" {
                el.set_checked(truthy(value));
            }
        }
        _ => match value {
            Value::Null => {
                el.remove_attribute(name);
            }
            other => el.set_attribute(name, &display_string(other)),
        },
    }
}

fn update_value(el: &Element, value: &Value) {
    match el.input_type().as_str() {
        "radio" => el.set_checked(el.value() == display_string(value)),
        "checkbox" => {
            let checked = match value {
                Value::Array(items) => {
                    let own = el.value();
                    items.iter().any(|v| display_string(v) == own)
                }
                other => truthy(other),
            };
            el.set_checked(checked);
        }
        _ if el.tag_name() == "select" => update_select(el, value),
        _ => el.set_value(&display_string(value)),
    }
}

/// Select the options whose values appear in `value` (a scalar or array).
pub fn update_select(el: &Element, value: &Value) {
    let wanted: Vec<String> = match value {
        Value::Array(items) => items.iter().map(display_string).collect(),
        other => vec![display_string(other)],
    };
    let single = !el.multiple();
    let mut matched = false;
    for option in el.options() {
        let hit = wanted.contains(&option.value()) && !(single && matched);
        matched |= hit;
        option.set_selected(hit);
    }
}

/// Checkbox elements under `root` bound to `prop`, in document order.
pub fn checkbox_group(root: &Element, marker: &str, prop: &str) -> Vec<Element> {
    let mut out = Vec::new();
    walk(root, marker, |el| {
        if el.input_type() == "checkbox"
            && parse_attributes(el)
                .iter()
                .any(|a| a.kind == AttributeKind::Prop && a.name == prop)
        {
            out.push(el.clone());
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use serde_json::json;

    fn first(doc: &Document) -> Element {
        doc.body().children()[0].clone()
    }

    #[test]
    fn empty_fields_keep_declared_values() {
        let doc = Document::parse(
            r#"<form x-data><input x.name><input x.city value="Oslo"><textarea x.bio></textarea><input x.fresh></form>"#,
        )
        .expect("parses");
        let mut data = Map::new();
        data.insert("name".to_string(), json!("start"));
        data.insert("city".to_string(), json!("Rome"));
        data.insert("bio".to_string(), json!("hi"));
        fetch_props(&first(&doc), "x-data", &mut data);
        assert_eq!(data["name"], json!("start"));
        assert_eq!(data["city"], json!("Oslo"));
        assert_eq!(data["bio"], json!("hi"));
        assert_eq!(data["fresh"], json!(""));
    }

    #[test]
    fn fetch_collects_fields_and_checkbox_groups() {
        let doc = Document::parse(
            r#"<form x-data>
                 <input x.name value="Ada">
                 <input x.age.number value="36">
                 <input type="checkbox" x.tags value="a" checked>
                 <input type="checkbox" x.tags value="b">
                 <input type="checkbox" x.tags value="c" checked>
                 <input type="checkbox" x.agree>
                 <input type="radio" x.size value="s">
                 <input type="radio" x.size value="m" checked>
                 <select x.picks multiple><option selected>x</option><option>y</option><option selected>z</option></select>
                 <div x.ignored></div>
               </form>"#,
        )
        .expect("parses");
        let mut data = Map::new();
        let scraped = fetch_props(&first(&doc), "x-data", &mut data);
        assert_eq!(scraped.len(), 10);
        assert_eq!(
            Value::Object(data),
            json!({
                "name": "Ada",
                "age": 36,
                "tags": ["a", "c"],
                "agree": false,
                "size": "m",
                "picks": ["x", "z"],
            })
        );
    }

    #[test]
    fn fetch_names_unnamed_fields() {
        let doc = Document::parse(r#"<div x-data><input x.email><input x.other name="keep"></div>"#)
            .expect("parses");
        let root = first(&doc);
        fetch_props(&root, "x-data", &mut Map::new());
        let inputs = root.children();
        assert_eq!(inputs[0].get_attribute("name").as_deref(), Some("email"));
        assert_eq!(inputs[1].get_attribute("name").as_deref(), Some("keep"));
    }

    #[test]
    fn unchecked_radio_group_keeps_the_prior_value() {
        let doc = Document::parse(r#"<div x-data><input type="radio" x.size value="s"></div>"#)
            .expect("parses");
        let mut data = Map::new();
        data.insert("size".to_string(), json!("xl"));
        fetch_props(&first(&doc), "x-data", &mut data);
        assert_eq!(data["size"], json!("xl"));
        let mut empty = Map::new();
        fetch_props(&first(&doc), "x-data", &mut empty);
        assert_eq!(empty["size"], Value::Null);
    }

    #[test]
    fn change_event_for_discrete_controls() {
        let doc = Document::parse(r#"<input><input type="checkbox"><select></select>"#).expect("parses");
        let kids = doc.body().children();
        assert_eq!(event_for_prop(&kids[0], &[]), "input");
        assert_eq!(event_for_prop(&kids[0], &["lazy".to_string()]), "change");
        assert_eq!(event_for_prop(&kids[1], &[]), "change");
        assert_eq!(event_for_prop(&kids[2], &[]), "change");
    }

    #[test]
    fn read_value_applies_modifiers() {
        let doc = Document::parse(r#"<input value="  42px "><input type="radio" value="r">"#)
            .expect("parses");
        let kids = doc.body().children();
        assert_eq!(read_prop_value(&kids[0], &[], None, &[]), Some(json!("  42px ")));
        assert_eq!(read_prop_value(&kids[0], &["trim".to_string()], None, &[]), Some(json!("42px")));
        assert_eq!(read_prop_value(&kids[0], &["number".to_string()], None, &[]), Some(json!(42)));
        assert_eq!(read_prop_value(&kids[1], &[], None, &[]), None);
        kids[1].set_checked(true);
        assert_eq!(read_prop_value(&kids[1], &[], None, &[]), Some(json!("r")));
    }

    #[test]
    fn checkbox_group_write_back_follows_document_order() {
        let doc = Document::parse(
            r#"<div x-data><input type="checkbox" x.tags value="a"><input type="checkbox" x.tags value="b"><input type="checkbox" x.tags value="c"></div>"#,
        )
        .expect("parses");
        let root = first(&doc);
        let group = checkbox_group(&root, "x-data", "tags");
        assert_eq!(group.len(), 3);
        group[2].set_checked(true);
        group[0].set_checked(true);
        let current = json!([]);
        assert_eq!(
            read_prop_value(&group[0], &[], Some(&current), &group),
            Some(json!(["a", "c"]))
        );
    }

    #[test]
    fn update_value_is_idempotent() {
        let doc = Document::parse("<input>").expect("parses");
        let input = first(&doc);
        update_attribute(&input, "value", &json!("hello"));
        let rev = input.revision();
        update_attribute(&input, "value", &json!("hello"));
        assert_eq!(input.revision(), rev);
        assert_eq!(input.value(), "hello");
    }

    #[test]
    fn update_class_accepts_array_object_and_string() {
        let doc = Document::parse(r#"<p class="keep"></p>"#).expect("parses");
        let p = first(&doc);
        update_attribute(&p, "class", &json!({"on": true, "keep": false}));
        assert_eq!(p.class_list(), vec!["on"]);
        update_attribute(&p, "class", &json!(["x", "y"]));
        assert_eq!(p.get_attribute("class").as_deref(), Some("x y"));
        update_attribute(&p, "class", &json!("z"));
        assert_eq!(p.class_list(), vec!["z"]);
    }

    #[test]
    fn boolean_and_plain_attributes() {
        let doc = Document::parse("<button></button>").expect("parses");
        let b = first(&doc);
        update_attribute(&b, "disabled", &json!(1));
        assert_eq!(b.get_attribute("disabled").as_deref(), Some(""));
        update_attribute(&b, "disabled", &json!(false));
        assert!(!b.has_attribute("disabled"));
        update_attribute(&b, "title", &json!(3));
        assert_eq!(b.get_attribute("title").as_deref(), Some("3"));
        update_attribute(&b, "title", &Value::Null);
        assert!(!b.has_attribute("title"));
    }

    #[test]
    fn update_select_and_checkables() {
        let doc = Document::parse(
            r#"<select multiple><option>a</option><option>b</option></select><input type="checkbox" value="b"><input type="radio" value="b">"#,
        )
        .expect("parses");
        let kids = doc.body().children();
        update_attribute(&kids[0], "value", &json!(["b"]));
        assert_eq!(kids[0].selected_values(), vec!["b"]);
        update_attribute(&kids[1], "value", &json!(["a", "b"]));
        assert!(kids[1].checked());
        update_attribute(&kids[2], "value", &json!("b"));
        assert!(kids[2].checked());
        update_attribute(&kids[2], "value", &json!("c"));
        assert!(!kids[2].checked());
    }
}
