//! DOM objects as seen from expressions: `$el`, `$event` and `$refs`.

use crate::component::WeakComponent;
use crate::dom::{Element, Event};
use serde_json::Value;
use xjs_core::{EvalError, EvalResult, HostObject, Val};

pub struct ElementHost(pub Element);

impl ElementHost {
    pub fn val(el: &Element) -> Val {
        Val::host(ElementHost(el.clone()))
    }
}

fn arg_string(args: &[Val], i: usize) -> String {
    args.get(i).map(Val::display_string).unwrap_or_default()
}

impl HostObject for ElementHost {
    fn type_name(&self) -> &'static str {
        "Element"
    }

    fn get(&self, key: &str) -> Option<Val> {
        let el = &self.0;
        Some(match key {
            "value" => Val::from(el.value()),
            "checked" => Val::from(el.checked()),
            "selected" => Val::from(el.selected()),
            "tagName" => Val::from(el.tag_name().to_ascii_uppercase()),
            "id" => Val::from(el.get_attribute("id").unwrap_or_default()),
            "name" => Val::from(el.get_attribute("name").unwrap_or_default()),
            "type" => Val::from(el.input_type()),
            "className" => Val::from(el.get_attribute("class").unwrap_or_default()),
            "textContent" => Val::from(el.text_content()),
            "innerHTML" => Val::from(el.inner_html()),
            "offsetWidth" => Val::number(el.offset_width()),
            "offsetHeight" => Val::number(el.offset_height()),
            "selectedValues" => Val::Data(Value::Array(
                el.selected_values().into_iter().map(Value::String).collect(),
            )),
            "parentElement" => el.parent().map_or_else(Val::null, |p| ElementHost::val(&p)),
            _ => return None,
        })
    }

    fn set(&self, key: &str, value: Val) -> EvalResult<()> {
        let el = &self.0;
        match key {
            "value" => el.set_value(&value.display_string()),
            "checked" => el.set_checked(value.is_truthy()),
            "selected" => el.set_selected(value.is_truthy()),
            "id" => el.set_attribute("id", &value.display_string()),
            "className" => el.set_attribute("class", &value.display_string()),
            "textContent" => el.set_text_content(&value.display_string()),
            "innerHTML" => el
                .set_inner_html(&value.display_string())
                .map_err(|e| EvalError::Host(e.to_string()))?,
            _ => {
                return Err(EvalError::Type(format!("cannot assign '{key}' on Element")));
            }
        }
        Ok(())
    }

    fn call(&self, method: &str, args: Vec<Val>) -> EvalResult {
        let el = &self.0;
        match method {
            "getAttribute" => Ok(el
                .get_attribute(&arg_string(&args, 0))
                .map_or_else(Val::null, Val::from)),
            "hasAttribute" => Ok(Val::from(el.has_attribute(&arg_string(&args, 0)))),
            "setAttribute" => {
                el.set_attribute(&arg_string(&args, 0), &arg_string(&args, 1));
                Ok(Val::null())
            }
            "removeAttribute" => {
                el.remove_attribute(&arg_string(&args, 0));
                Ok(Val::null())
            }
            "toggleClass" => {
                let on = args.get(1).is_none_or(Val::is_truthy);
                el.toggle_class(&arg_string(&args, 0), on);
                Ok(Val::null())
            }
            "click" => Ok(Val::from(el.click())),
            _ => Err(EvalError::NotCallable(format!("Element.{method}"))),
        }
    }
}

pub struct EventHost(pub Event);

impl HostObject for EventHost {
    fn type_name(&self) -> &'static str {
        "Event"
    }

    fn get(&self, key: &str) -> Option<Val> {
        let event = &self.0;
        Some(match key {
            "type" => Val::from(event.event_type()),
            "target" => event.target().map_or_else(Val::null, |t| ElementHost::val(&t)),
            "detail" => Val::Data(event.detail().to_json()),
            "bubbles" => Val::from(event.bubbles()),
            "defaultPrevented" => Val::from(event.default_prevented()),
            _ => return None,
        })
    }

    fn call(&self, method: &str, _args: Vec<Val>) -> EvalResult {
        match method {
            "preventDefault" => self.0.prevent_default(),
            "stopPropagation" => self.0.stop_propagation(),
            _ => return Err(EvalError::NotCallable(format!("Event.{method}"))),
        }
        Ok(Val::null())
    }

    fn to_data(&self) -> Value {
        serde_json::json!({
            "type": self.0.event_type(),
            "detail": self.0.detail().to_json(),
        })
    }
}

/// `$refs`: each read walks the component's own subtree.
pub struct RefsHost(pub WeakComponent);

impl HostObject for RefsHost {
    fn type_name(&self) -> &'static str {
        "Refs"
    }

    fn get(&self, key: &str) -> Option<Val> {
        let component = self.0.upgrade()?;
        Some(component.refs(key).map_or_else(Val::null, |el| ElementHost::val(&el)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, EventDetail};
    use serde_json::json;

    #[test]
    fn element_properties_read_and_write_the_dom() {
        let doc = Document::parse(r#"<input id="a" value="1">"#).expect("parses");
        let input = doc.body().children()[0].clone();
        let host = ElementHost(input.clone());
        assert_eq!(host.get("tagName").map(Val::into_data), Some(json!("INPUT")));
        assert_eq!(host.get("value").map(Val::into_data), Some(json!("1")));
        host.set("value", Val::from("2")).expect("sets");
        assert_eq!(input.value(), "2");
        assert!(host.set("bogus", Val::null()).is_err());
        host.call("setAttribute", vec![Val::from("title"), Val::from("t")])
            .expect("calls");
        assert_eq!(input.get_attribute("title").as_deref(), Some("t"));
    }

    #[test]
    fn event_methods_reach_the_event() {
        let event = Event::new("submit", true, EventDetail::Data(json!({"n": 1})));
        let host = EventHost(event.clone());
        host.call("preventDefault", Vec::new()).expect("calls");
        assert!(event.default_prevented());
        assert_eq!(host.get("detail").map(Val::into_data), Some(json!({"n": 1})));
        assert!(host.call("explode", Vec::new()).is_err());
    }
}
