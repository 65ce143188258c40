//! Forgiving HTML fragment reader and serializer.
//!
//! Covers elements, quoted and unquoted attributes, void elements, raw-text
//! elements (`script`, `style`, `textarea`), text with the common entities,
//! comments and doctypes. Stray closing tags are ignored and open elements
//! are closed at the end of input. Attribute names are lowercased.

use super::{Document, Element};
use thiserror::Error;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HtmlError {
    #[error("unterminated tag at offset {offset}")]
    UnterminatedTag { offset: usize },
    #[error("unterminated comment at offset {offset}")]
    UnterminatedComment { offset: usize },
    #[error("unterminated value for attribute '{name}' at offset {offset}")]
    UnterminatedAttribute { offset: usize, name: String },
    #[error("invalid tag name at offset {offset}")]
    InvalidTagName { offset: usize },
    #[error("node is not owned by a live document")]
    NoDocument,
}

pub fn parse_fragment(doc: &Document, input: &str) -> Result<Vec<Element>, HtmlError> {
    let mut reader = Reader {
        doc,
        input,
        pos: 0,
    };
    reader.parse()
}

struct Reader<'a> {
    doc: &'a Document,
    input: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn parse(&mut self) -> Result<Vec<Element>, HtmlError> {
        let mut top: Vec<Element> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();

        let push = |node: Element, stack: &Vec<Element>, top: &mut Vec<Element>| match stack.last() {
            Some(parent) => parent.append_child(&node),
            None => top.push(node),
        };

        while self.pos < self.input.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                let start = self.pos;
                let Some(end) = rest[4..].find("-->") else {
                    return Err(HtmlError::UnterminatedComment { offset: start });
                };
                let text = rest[4..4 + end].to_string();
                self.pos += 4 + end + 3;
                push(self.doc_comment(&text), &stack, &mut top);
            } else if rest.starts_with("<!") {
                let start = self.pos;
                let Some(end) = rest.find('>') else {
                    return Err(HtmlError::UnterminatedTag { offset: start });
                };
                self.pos += end + 1;
            } else if rest.starts_with("</") {
                let start = self.pos;
                let Some(end) = rest.find('>') else {
                    return Err(HtmlError::UnterminatedTag { offset: start });
                };
                let name = rest[2..end].trim().to_ascii_lowercase();
                self.pos += end + 1;
                if let Some(i) = stack.iter().rposition(|el| el.tag_name() == name) {
                    let closed = stack.split_off(i);
                    for el in closed {
                        finish(&el);
                    }
                }
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                let (el, self_closing) = self.read_open_tag()?;
                let tag = el.tag_name();
                push(el.clone(), &stack, &mut top);
                if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
                    finish(&el);
                } else if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                    let text = self.read_raw_text(&tag);
                    if !text.is_empty() {
                        el.append_child(&self.doc.create_text_node(&decode_entities(&text)));
                    }
                    finish(&el);
                } else {
                    stack.push(el);
                }
            } else {
                let end = rest
                    .char_indices()
                    .skip(1)
                    .find(|(_, c)| *c == '<')
                    .map_or(rest.len(), |(i, _)| i);
                let text = decode_entities(&rest[..end]);
                self.pos += end;
                push(self.doc.create_text_node(&text), &stack, &mut top);
            }
        }

        for el in stack.into_iter().rev() {
            finish(&el);
        }
        Ok(top)
    }

    fn doc_comment(&self, text: &str) -> Element {
        Element::create_comment(self.doc.downgrade(), text)
    }

    fn read_open_tag(&mut self) -> Result<(Element, bool), HtmlError> {
        let start = self.pos;
        self.pos += 1;
        let name = self.take_while(|c| !c.is_whitespace() && c != '>' && c != '/');
        if name.is_empty() {
            return Err(HtmlError::InvalidTagName { offset: start });
        }
        let el = self.doc.create_element(&name);

        loop {
            self.take_while(char::is_whitespace);
            let rest = self.rest();
            if rest.is_empty() {
                return Err(HtmlError::UnterminatedTag { offset: start });
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok((el, true));
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok((el, false));
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }

            let attr_start = self.pos;
            let attr = self
                .take_while(|c| !c.is_whitespace() && c != '=' && c != '>')
                .to_ascii_lowercase();
            if attr.is_empty() {
                return Err(HtmlError::UnterminatedTag { offset: attr_start });
            }
            self.take_while(char::is_whitespace);
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.take_while(char::is_whitespace);
                self.read_attr_value(&attr)?
            } else {
                String::new()
            };
            el.set_attribute(&attr, &value);
        }
    }

    fn read_attr_value(&mut self, name: &str) -> Result<String, HtmlError> {
        let start = self.pos;
        let rest = self.rest();
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            let raw = self.take_while(|c| !c.is_whitespace() && c != '>');
            return Ok(decode_entities(&raw));
        };
        let Some(end) = rest[1..].find(quote) else {
            return Err(HtmlError::UnterminatedAttribute {
                offset: start,
                name: name.to_string(),
            });
        };
        let raw = rest[1..1 + end].to_string();
        self.pos += end + 2;
        Ok(decode_entities(&raw))
    }

    fn read_raw_text(&mut self, tag: &str) -> String {
        let close = format!("</{tag}");
        let rest = self.rest();
        let lower = rest.to_ascii_lowercase();
        let end = lower.find(&close).unwrap_or(rest.len());
        let text = rest[..end].to_string();
        self.pos += end;
        if let Some(gt) = self.rest().find('>') {
            self.pos += gt + 1;
        }
        text
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let rest = self.rest();
        let end = rest.find(|c: char| !keep(c)).unwrap_or(rest.len());
        let out = rest[..end].to_string();
        self.pos += end;
        out
    }
}

fn finish(el: &Element) {
    el.init_form_state();
    if el.tag_name() == "textarea" {
        el.init_textarea();
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

/// Append the markup of `el` to `out`. Inline `display` state is folded into
/// the `style` attribute.
pub(crate) fn serialize(el: &Element, out: &mut String) {
    if let Some((is_text, text)) = el.text_of_kind() {
        if is_text {
            out.push_str(&escape_text(&text));
        } else {
            out.push_str("<!--");
            out.push_str(&text);
            out.push_str("-->");
        }
        return;
    }

    let tag = el.tag_name();
    out.push('<');
    out.push_str(&tag);
    let display = el.display();
    let mut wrote_style = false;
    for (name, value) in el.attributes() {
        let value = if name == "style" {
            wrote_style = true;
            merge_display(&value, display.as_deref())
        } else {
            value
        };
        push_attr(out, &name, &value);
    }
    if !wrote_style && let Some(d) = display.as_deref() {
        push_attr(out, "style", &format!("display: {d};"));
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&tag.as_str()) {
        return;
    }
    for child in el.child_nodes() {
        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            out.push_str(&child.text_content());
        } else {
            serialize(&child, out);
        }
    }
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    if !value.is_empty() {
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
}

fn merge_display(style: &str, display: Option<&str>) -> String {
    let mut decls: Vec<String> = style
        .split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .filter(|d| {
            !d.split_once(':')
                .is_some_and(|(p, _)| p.trim().eq_ignore_ascii_case("display"))
        })
        .map(str::to_string)
        .collect();
    if let Some(d) = display {
        decls.push(format!("display: {d}"));
    }
    if decls.is_empty() {
        String::new()
    } else {
        format!("{};", decls.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let doc = Document::new();
        let nodes = parse_fragment(
            &doc,
            r#"<div x-data="{ open: false }" @click.outside=close><span :class='cls'>Hi &amp; bye</span><br></div>"#,
        )
        .expect("parses");
        assert_eq!(nodes.len(), 1);
        let div = &nodes[0];
        assert_eq!(div.get_attribute("x-data").as_deref(), Some("{ open: false }"));
        assert_eq!(div.get_attribute("@click.outside").as_deref(), Some("close"));
        let kids = div.children();
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[0].get_attribute(":class").as_deref(), Some("cls"));
        assert_eq!(kids[0].text_content(), "Hi & bye");
        assert_eq!(kids[1].tag_name(), "br");
    }

    #[test]
    fn boolean_attributes_and_lowercasing() {
        let doc = Document::new();
        let nodes = parse_fragment(&doc, r#"<INPUT Type="checkbox" CHECKED value=a>"#).expect("parses");
        let input = &nodes[0];
        assert_eq!(input.tag_name(), "input");
        assert!(input.checked());
        assert_eq!(input.input_type(), "checkbox");
        assert_eq!(input.value(), "a");
    }

    #[test]
    fn stray_close_tags_are_ignored_and_open_tags_closed() {
        let doc = Document::new();
        let nodes = parse_fragment(&doc, "</b><p>one<p>two").expect("parses");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text_content(), "onetwo");
    }

    #[test]
    fn textarea_and_script_keep_raw_text() {
        let doc = Document::new();
        let nodes = parse_fragment(&doc, "<textarea>a <b> c</textarea><script>if (a < b) {}</script>")
            .expect("parses");
        assert_eq!(nodes[0].value(), "a <b> c");
        assert_eq!(nodes[1].text_content(), "if (a < b) {}");
    }

    #[test]
    fn reports_unterminated_input() {
        let doc = Document::new();
        assert!(matches!(
            parse_fragment(&doc, "<div class=\"x"),
            Err(HtmlError::UnterminatedAttribute { .. })
        ));
        assert!(matches!(
            parse_fragment(&doc, "<!-- open"),
            Err(HtmlError::UnterminatedComment { offset: 0 })
        ));
        assert!(matches!(
            parse_fragment(&doc, "<div"),
            Err(HtmlError::UnterminatedTag { offset: 0 })
        ));
    }

    #[test]
    fn serializes_with_escaping_and_display() {
        let doc = Document::parse(r#"<p title="a &quot;q&quot;">x &lt; y</p><hr>"#).expect("parses");
        let p = doc.body().children()[0].clone();
        p.set_display(Some("none"));
        assert_eq!(
            doc.body().inner_html(),
            r#"<p title="a &quot;q&quot;" style="display: none;">x &lt; y</p><hr>"#
        );
    }
}
