use crate::dom::Element;
use serde::Serialize;

/// Event listener attribute prefix: `@click.prevent`.
pub const EVENT_PREFIX: &str = "@";
/// Shorthand for the `bind` directive: `:class`.
pub const BIND_PREFIX: &str = ":";
/// Two-way binding namespace: `x.name.lazy`.
pub const PROP_PREFIX: &str = "x.";
/// Directive namespace: `x-show`.
pub const DIRECTIVE_PREFIX: &str = "x-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Event,
    Prop,
    Directive,
}

/// One recognized attribute of an element.
///
/// Derived from the live attribute set on every pass and never cached, since
/// directives rewrite attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDescriptor {
    /// Attribute name as written in the markup.
    pub attribute: String,
    pub kind: AttributeKind,
    /// Event type, prop name or directive name (without the `x-` prefix).
    pub name: String,
    pub expression: String,
    pub modifiers: Vec<String>,
}

impl AttributeDescriptor {
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    /// Token following `modifier`, e.g. `500ms` in `delay.500ms`.
    pub fn modifier_argument(&self, modifier: &str) -> Option<&str> {
        let at = self.modifiers.iter().position(|m| m == modifier)?;
        self.modifiers.get(at + 1).map(String::as_str)
    }

    /// Registry key of a directive attribute, `x-<name>`.
    pub fn directive_key(&self) -> Option<String> {
        (self.kind == AttributeKind::Directive).then(|| format!("{DIRECTIVE_PREFIX}{}", self.name))
    }
}

/// Classify one attribute. Returns `None` for attributes outside the
/// recognized namespaces.
pub fn parse_attribute(attribute: &str, expression: &str) -> Option<AttributeDescriptor> {
    let descriptor = |kind, name: &str, modifiers: Vec<String>| {
        (!name.is_empty()).then(|| AttributeDescriptor {
            attribute: attribute.to_string(),
            kind,
            name: name.to_string(),
            expression: expression.to_string(),
            modifiers,
        })
    };

    if let Some(rest) = attribute.strip_prefix(EVENT_PREFIX) {
        let (name, modifiers) = split_modifiers(rest);
        return descriptor(AttributeKind::Event, name, modifiers);
    }
    if let Some(rest) = attribute.strip_prefix(BIND_PREFIX) {
        if rest.is_empty() {
            return None;
        }
        return descriptor(AttributeKind::Directive, "bind", vec![rest.to_string()]);
    }
    if let Some(rest) = attribute.strip_prefix(PROP_PREFIX) {
        let (name, modifiers) = split_modifiers(rest);
        return descriptor(AttributeKind::Prop, name, modifiers);
    }
    if let Some(rest) = attribute.strip_prefix(DIRECTIVE_PREFIX) {
        if let Some(target) = rest.strip_prefix("bind:") {
            return descriptor(AttributeKind::Directive, "bind", vec![target.to_string()]);
        }
        let (name, modifiers) = split_modifiers(rest);
        return descriptor(AttributeKind::Directive, name, modifiers);
    }
    None
}

/// Descriptors for every recognized attribute of `el`, in attribute order.
pub fn parse_attributes(el: &Element) -> Vec<AttributeDescriptor> {
    el.attributes()
        .iter()
        .filter_map(|(name, value)| parse_attribute(name, value))
        .collect()
}

fn split_modifiers(rest: &str) -> (&str, Vec<String>) {
    let mut parts = rest.split('.');
    let name = parts.next().unwrap_or_default();
    (name, parts.map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn classifies_each_namespace() {
        let ev = parse_attribute("@click.outside.prevent", "open = false").expect("event");
        assert_eq!(ev.kind, AttributeKind::Event);
        assert_eq!(ev.name, "click");
        assert_eq!(ev.modifiers, vec!["outside", "prevent"]);

        let prop = parse_attribute("x.name.lazy.trim", "").expect("prop");
        assert_eq!(prop.kind, AttributeKind::Prop);
        assert_eq!(prop.name, "name");
        assert_eq!(prop.modifiers, vec!["lazy", "trim"]);

        let dir = parse_attribute("x-show", "open").expect("directive");
        assert_eq!(dir.kind, AttributeKind::Directive);
        assert_eq!(dir.directive_key().as_deref(), Some("x-show"));
    }

    #[test]
    fn colon_shorthand_becomes_bind_with_the_attribute_as_modifier() {
        let bind = parse_attribute(":class", "{ active: on }").expect("bind");
        assert_eq!(bind.kind, AttributeKind::Directive);
        assert_eq!(bind.name, "bind");
        assert_eq!(bind.modifiers, vec!["class"]);
        assert_eq!(bind.attribute, ":class");

        let long = parse_attribute("x-bind:title", "t").expect("bind");
        assert_eq!((long.name.as_str(), long.modifiers.clone()), ("bind", vec!["title".to_string()]));
    }

    #[test]
    fn modifiers_keep_order_and_duplicates() {
        let ev = parse_attribute("@keyup.stop.delay.500ms.stop", "").expect("event");
        assert_eq!(ev.modifiers, vec!["stop", "delay", "500ms", "stop"]);
        assert_eq!(ev.modifier_argument("delay"), Some("500ms"));
        assert!(ev.has_modifier("stop"));
        assert_eq!(ev.modifier_argument("missing"), None);
    }

    #[test]
    fn plain_and_degenerate_attributes_are_ignored() {
        assert!(parse_attribute("class", "a").is_none());
        assert!(parse_attribute("data-x", "a").is_none());
        assert!(parse_attribute("@", "a").is_none());
        assert!(parse_attribute(":", "a").is_none());
        assert!(parse_attribute("x-", "a").is_none());
    }

    #[test]
    fn reads_the_live_attribute_set() {
        let doc = Document::parse(r#"<div id="a" x-data="{}" @click="n++" :title="t"></div>"#)
            .expect("parses");
        let el = doc.body().children()[0].clone();
        let names: Vec<String> = parse_attributes(&el).into_iter().map(|a| a.attribute).collect();
        assert_eq!(names, vec!["x-data", "@click", ":title"]);
        el.remove_attribute("@click");
        assert_eq!(parse_attributes(&el).len(), 2);
    }
}
