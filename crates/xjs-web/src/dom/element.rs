use super::event::{self, Event, EventDetail};
use super::html::{self, HtmlError};
use super::{Document, DocumentInner, Handler, Listener, ListenerId, ListenerOptions, MutationRecord, next_id};
use indexmap::IndexMap;
use serde_json::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

/// Variables an iteration clone exposes to the expressions inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationScope {
    pub vars: Vec<(String, Value)>,
    /// Id of the template element the clone was stamped from.
    pub template: u64,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element(String),
    Text(String),
    Comment(String),
}

pub(crate) struct Node {
    id: u64,
    kind: NodeKind,
    attributes: IndexMap<String, String>,
    children: Vec<Element>,
    parent: Weak<RefCell<Node>>,
    document: Weak<DocumentInner>,
    value: String,
    checked: bool,
    selected: bool,
    display: Option<String>,
    size: (f64, f64),
    revision: u64,
    scope: Option<Rc<IterationScope>>,
    pub(crate) listeners: Vec<Listener>,
}

impl Node {
    fn touch(&mut self) {
        self.revision += 1;
    }
}

/// Handle to a node in a [`Document`] tree. Text and comment nodes share the
/// handle type; [`Element::is_element`] tells them apart.
#[derive(Clone)]
pub struct Element(Rc<RefCell<Node>>);

#[derive(Clone, Default)]
pub struct WeakElement(Weak<RefCell<Node>>);

impl WeakElement {
    pub fn upgrade(&self) -> Option<Element> {
        self.0.upgrade().map(Element)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node();
        match &node.kind {
            NodeKind::Element(tag) => write!(f, "<{tag}#{}>", node.id),
            NodeKind::Text(text) => write!(f, "#text({text:?})"),
            NodeKind::Comment(_) => write!(f, "#comment"),
        }
    }
}

impl Element {
    fn from_kind(document: Weak<DocumentInner>, kind: NodeKind) -> Self {
        Element(Rc::new(RefCell::new(Node {
            id: next_id(),
            kind,
            attributes: IndexMap::new(),
            children: Vec::new(),
            parent: Weak::new(),
            document,
            value: String::new(),
            checked: false,
            selected: false,
            display: None,
            size: (1.0, 1.0),
            revision: 0,
            scope: None,
            listeners: Vec::new(),
        })))
    }

    pub(crate) fn create(document: Weak<DocumentInner>, tag: &str) -> Self {
        Self::from_kind(document, NodeKind::Element(tag.to_ascii_lowercase()))
    }

    pub(crate) fn create_text(document: Weak<DocumentInner>, text: &str) -> Self {
        Self::from_kind(document, NodeKind::Text(text.to_string()))
    }

    pub(crate) fn create_comment(document: Weak<DocumentInner>, text: &str) -> Self {
        Self::from_kind(document, NodeKind::Comment(text.to_string()))
    }

    pub(crate) fn node(&self) -> Ref<'_, Node> {
        self.0.borrow()
    }

    pub(crate) fn node_mut(&self) -> RefMut<'_, Node> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakElement {
        WeakElement(Rc::downgrade(&self.0))
    }

    /// Process-unique node id.
    pub fn id(&self) -> u64 {
        self.node().id
    }

    pub fn is_element(&self) -> bool {
        matches!(self.node().kind, NodeKind::Element(_))
    }

    /// Lowercase tag name; `#text` and `#comment` for other nodes.
    pub fn tag_name(&self) -> String {
        match &self.node().kind {
            NodeKind::Element(tag) => tag.clone(),
            NodeKind::Text(_) => "#text".to_string(),
            NodeKind::Comment(_) => "#comment".to_string(),
        }
    }

    pub fn owner_document(&self) -> Option<Document> {
        self.node().document.upgrade().map(Document)
    }

    /// Bumped on every observable change to this node (attributes, text,
    /// form state, display, children). Writes of an unchanged value leave it.
    pub fn revision(&self) -> u64 {
        self.node().revision
    }

    // === Attributes ===

    pub fn attributes(&self) -> Vec<(String, String)> {
        self.node()
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.node().attributes.get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.node().attributes.contains_key(name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        let mut node = self.node_mut();
        if node.attributes.get(name).map(String::as_str) == Some(value) {
            return;
        }
        node.attributes.insert(name.to_string(), value.to_string());
        node.touch();
    }

    pub fn remove_attribute(&self, name: &str) -> bool {
        let mut node = self.node_mut();
        let removed = node.attributes.shift_remove(name).is_some();
        if removed {
            node.touch();
        }
        removed
    }

    pub fn class_list(&self) -> Vec<String> {
        self.get_attribute("class")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    pub fn toggle_class(&self, class: &str, on: bool) {
        let mut classes = self.class_list();
        let present = classes.iter().any(|c| c == class);
        if on == present {
            return;
        }
        if on {
            classes.push(class.to_string());
        } else {
            classes.retain(|c| c != class);
        }
        self.set_attribute("class", &classes.join(" "));
    }

    // === Tree ===

    pub fn parent(&self) -> Option<Element> {
        self.node().parent.upgrade().map(Element)
    }

    /// Element children only.
    pub fn children(&self) -> Vec<Element> {
        self.node()
            .children
            .iter()
            .filter(|c| c.is_element())
            .cloned()
            .collect()
    }

    pub fn child_nodes(&self) -> Vec<Element> {
        self.node().children.clone()
    }

    /// Element descendants in pre-order, excluding `self`.
    pub fn descendants(&self) -> Vec<Element> {
        let mut out = Vec::new();
        fn collect(el: &Element, out: &mut Vec<Element>) {
            for child in el.children() {
                out.push(child.clone());
                collect(&child, out);
            }
        }
        collect(self, &mut out);
        out
    }

    /// Inclusive descendant test.
    pub fn contains(&self, other: &Element) -> bool {
        let mut cursor = Some(other.clone());
        while let Some(el) = cursor {
            if el.ptr_eq(self) {
                return true;
            }
            cursor = el.parent();
        }
        false
    }

    pub fn is_connected(&self) -> bool {
        let Some(doc) = self.owner_document() else {
            return false;
        };
        doc.document_element().contains(self)
    }

    pub fn append_child(&self, child: &Element) {
        self.insert_at(child, None);
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// not a child of `self`.
    pub fn insert_before(&self, child: &Element, reference: Option<&Element>) {
        self.insert_at(child, reference);
    }

    /// Insert `sibling` right after `self` in its parent.
    pub fn insert_after(&self, sibling: &Element) {
        let Some(parent) = self.parent() else {
            tracing::warn!(node = ?self, "insert_after on a node without a parent");
            return;
        };
        let next = {
            let siblings = parent.node();
            let pos = siblings.children.iter().position(|c| c.ptr_eq(self));
            pos.and_then(|i| siblings.children.get(i + 1).cloned())
        };
        parent.insert_at(sibling, next.as_ref());
    }

    fn insert_at(&self, child: &Element, reference: Option<&Element>) {
        if child.contains(self) {
            tracing::warn!(parent = ?self, child = ?child, "refusing to insert a node into itself");
            return;
        }
        child.remove();
        {
            let mut node = self.node_mut();
            let index = reference
                .and_then(|r| node.children.iter().position(|c| c.ptr_eq(r)))
                .unwrap_or(node.children.len());
            node.children.insert(index, child.clone());
            node.touch();
        }
        child.node_mut().parent = Rc::downgrade(&self.0);
        self.notify(vec![child.clone()], Vec::new());
    }

    /// Detach from the parent, if any.
    pub fn remove(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        {
            let mut node = parent.node_mut();
            node.children.retain(|c| !c.ptr_eq(self));
            node.touch();
        }
        self.node_mut().parent = Weak::new();
        parent.notify(Vec::new(), vec![self.clone()]);
    }

    fn replace_children(&self, children: Vec<Element>) {
        let old = std::mem::take(&mut self.node_mut().children);
        for child in &old {
            child.node_mut().parent = Weak::new();
        }
        for child in &children {
            child.remove();
            child.node_mut().parent = Rc::downgrade(&self.0);
        }
        {
            let mut node = self.node_mut();
            node.children = children.clone();
            node.touch();
        }
        if !old.is_empty() || !children.is_empty() {
            self.notify(children, old);
        }
    }

    fn notify(&self, added: Vec<Element>, removed: Vec<Element>) {
        if !self.is_connected() {
            return;
        }
        if let Some(doc) = self.owner_document() {
            doc.record_mutation(MutationRecord {
                target: self.clone(),
                added,
                removed,
            });
        }
    }

    /// Copy of this node; `deep` also copies descendants. Listeners and
    /// iteration scopes are not copied.
    pub fn clone_node(&self, deep: bool) -> Element {
        let node = self.node();
        let copy = Element::from_kind(node.document.clone(), node.kind.clone());
        {
            let mut c = copy.node_mut();
            c.attributes = node.attributes.clone();
            c.value = node.value.clone();
            c.checked = node.checked;
            c.selected = node.selected;
            c.display = node.display.clone();
            c.size = node.size;
        }
        if deep {
            for child in &node.children {
                let child_copy = child.clone_node(true);
                child_copy.node_mut().parent = Rc::downgrade(&copy.0);
                copy.node_mut().children.push(child_copy);
            }
        }
        copy
    }

    // === Content ===

    pub fn text_content(&self) -> String {
        let node = self.node();
        match &node.kind {
            NodeKind::Text(t) => t.clone(),
            NodeKind::Comment(_) => String::new(),
            NodeKind::Element(_) => node.children.iter().map(|c| c.text_content()).collect(),
        }
    }

    pub fn set_text_content(&self, text: &str) {
        {
            let mut node = self.node_mut();
            if let NodeKind::Text(t) | NodeKind::Comment(t) = &mut node.kind {
                if *t != text {
                    *t = text.to_string();
                    node.touch();
                }
                return;
            }
        }
        if self.text_content() == text && self.node().children.iter().all(|c| !c.is_element()) {
            return;
        }
        let children = if text.is_empty() {
            Vec::new()
        } else {
            vec![Element::create_text(self.node().document.clone(), text)]
        };
        self.replace_children(children);
    }

    pub fn inner_html(&self) -> String {
        self.node().children.iter().map(|c| c.outer_html()).collect()
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        html::serialize(self, &mut out);
        out
    }

    pub fn set_inner_html(&self, fragment: &str) -> Result<(), HtmlError> {
        let doc = self.owner_document().ok_or(HtmlError::NoDocument)?;
        let nodes = html::parse_fragment(&doc, fragment)?;
        self.replace_children(nodes);
        Ok(())
    }

    pub(crate) fn text_of_kind(&self) -> Option<(bool, String)> {
        match &self.node().kind {
            NodeKind::Text(t) => Some((true, t.clone())),
            NodeKind::Comment(t) => Some((false, t.clone())),
            NodeKind::Element(_) => None,
        }
    }

    // === Form state ===

    /// Lowercased `type` attribute of an `<input>`; `text` when absent.
    pub fn input_type(&self) -> String {
        if self.tag_name() != "input" {
            return String::new();
        }
        self.get_attribute("type")
            .map(|t| t.to_ascii_lowercase())
            .unwrap_or_else(|| "text".to_string())
    }

    pub fn is_checkable(&self) -> bool {
        matches!(self.input_type().as_str(), "checkbox" | "radio")
    }

    pub fn is_form_field(&self) -> bool {
        matches!(self.tag_name().as_str(), "input" | "select" | "textarea")
    }

    pub fn multiple(&self) -> bool {
        self.has_attribute("multiple")
    }

    /// `<option>` descendants of a `<select>`.
    pub fn options(&self) -> Vec<Element> {
        self.descendants()
            .into_iter()
            .filter(|el| el.tag_name() == "option")
            .collect()
    }

    pub fn value(&self) -> String {
        match self.tag_name().as_str() {
            "option" => self
                .get_attribute("value")
                .unwrap_or_else(|| self.text_content().trim().to_string()),
            "select" => {
                let options = self.options();
                options
                    .iter()
                    .find(|o| o.selected())
                    .or(if self.multiple() { None } else { options.first() })
                    .map(Element::value)
                    .unwrap_or_default()
            }
            "input" if self.is_checkable() => {
                self.get_attribute("value").unwrap_or_else(|| "on".to_string())
            }
            _ => self.node().value.clone(),
        }
    }

    pub fn set_value(&self, value: &str) {
        match self.tag_name().as_str() {
            "select" => {
                let mut matched = false;
                for option in self.options() {
                    let hit = !matched && option.value() == value;
                    matched |= hit;
                    option.set_selected(hit);
                }
            }
            "input" if self.is_checkable() => self.set_attribute("value", value),
            _ => {
                let mut node = self.node_mut();
                if node.value != value {
                    node.value = value.to_string();
                    node.touch();
                }
            }
        }
    }

    /// Values of the selected options of a `<select>`, in document order.
    pub fn selected_values(&self) -> Vec<String> {
        self.options()
            .iter()
            .filter(|o| o.selected())
            .map(Element::value)
            .collect()
    }

    pub fn checked(&self) -> bool {
        self.node().checked
    }

    /// Checking a radio unchecks the other radios of its group in the same tree.
    pub fn set_checked(&self, checked: bool) {
        {
            let mut node = self.node_mut();
            if node.checked == checked {
                return;
            }
            node.checked = checked;
            node.touch();
        }
        if checked && self.input_type() == "radio" {
            let Some(name) = self.get_attribute("name") else {
                return;
            };
            let mut top = self.clone();
            while let Some(parent) = top.parent() {
                top = parent;
            }
            for other in top.descendants() {
                if !other.ptr_eq(self)
                    && other.input_type() == "radio"
                    && other.get_attribute("name").as_deref() == Some(name.as_str())
                {
                    other.set_checked(false);
                }
            }
        }
    }

    pub fn selected(&self) -> bool {
        self.node().selected
    }

    pub fn set_selected(&self, selected: bool) {
        let mut node = self.node_mut();
        if node.selected != selected {
            node.selected = selected;
            node.touch();
        }
    }

    /// Derive live form state from the markup attributes, as a freshly
    /// parsed document would.
    pub(crate) fn init_form_state(&self) {
        let tag = self.tag_name();
        let mut node = self.node_mut();
        node.checked = node.attributes.contains_key("checked");
        node.selected = node.attributes.contains_key("selected");
        if tag == "input" {
            node.value = node.attributes.get("value").cloned().unwrap_or_default();
        }
        if let Some(style) = node.attributes.get("style") {
            node.display = display_from_style(style);
        }
    }

    pub(crate) fn init_textarea(&self) {
        let text = self.text_content();
        self.node_mut().value = text;
    }

    // === Style & layout ===

    /// Inline `display` value.
    pub fn display(&self) -> Option<String> {
        self.node().display.clone()
    }

    pub fn set_display(&self, display: Option<&str>) {
        let mut node = self.node_mut();
        if node.display.as_deref() == display {
            return;
        }
        node.display = display.map(str::to_string);
        node.touch();
    }

    /// Nominal layout box reported while the element is rendered.
    pub fn set_layout_size(&self, width: f64, height: f64) {
        self.node_mut().size = (width, height);
    }

    /// Connected, and neither it nor an ancestor has `display: none`.
    pub fn is_rendered(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        let mut cursor = Some(self.clone());
        while let Some(el) = cursor {
            if el.display().as_deref() == Some("none") {
                return false;
            }
            cursor = el.parent();
        }
        true
    }

    pub fn offset_width(&self) -> f64 {
        if self.is_rendered() { self.node().size.0 } else { 0.0 }
    }

    pub fn offset_height(&self) -> f64 {
        if self.is_rendered() { self.node().size.1 } else { 0.0 }
    }

    // === Iteration scope ===

    pub fn scope(&self) -> Option<Rc<IterationScope>> {
        self.node().scope.clone()
    }

    pub fn set_scope(&self, scope: Option<IterationScope>) {
        self.node_mut().scope = scope.map(Rc::new);
    }

    /// Scope of the nearest inclusive ancestor carrying one.
    pub fn inherited_scope(&self) -> Option<Rc<IterationScope>> {
        let mut cursor = Some(self.clone());
        while let Some(el) = cursor {
            if let Some(scope) = el.scope() {
                return Some(scope);
            }
            cursor = el.parent();
        }
        None
    }

    // === Events ===

    pub fn add_event_listener(
        &self,
        event_type: &str,
        options: ListenerOptions,
        handler: Handler,
    ) -> ListenerId {
        let listener = Listener::new(event_type, options, handler);
        let id = listener.id;
        self.node_mut().listeners.push(listener);
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut node = self.node_mut();
        let before = node.listeners.len();
        node.listeners.retain(|l| l.id != id);
        node.listeners.len() != before
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.node()
            .listeners
            .iter()
            .filter(|l| l.event_type == event_type)
            .count()
    }

    pub(crate) fn has_listener(&self, id: ListenerId) -> bool {
        self.node().listeners.iter().any(|l| l.id == id)
    }

    /// Dispatch with this element as the target. Returns false when a
    /// listener prevented the default action.
    pub fn dispatch_event(&self, event: &Event) -> bool {
        event::dispatch(self, event);
        !event.default_prevented()
    }

    /// Simulated user click, including checkbox and radio activation and the
    /// `input`/`change` events that follow it.
    pub fn click(&self) -> bool {
        let kind = self.input_type();
        let before = self.checked();
        match kind.as_str() {
            "checkbox" => self.set_checked(!before),
            "radio" => self.set_checked(true),
            _ => {}
        }
        let proceed = self.dispatch_event(&Event::new("click", true, EventDetail::None));
        if !proceed && matches!(kind.as_str(), "checkbox" | "radio") {
            self.node_mut().checked = before;
            return false;
        }
        if matches!(kind.as_str(), "checkbox" | "radio") && self.checked() != before {
            self.dispatch_event(&Event::new("input", true, EventDetail::None));
            self.dispatch_event(&Event::new("change", true, EventDetail::None));
        }
        proceed
    }

    /// Set the value as typing would and fire `input`.
    pub fn type_text(&self, value: &str) {
        self.set_value(value);
        self.dispatch_event(&Event::new("input", true, EventDetail::None));
    }
}

fn display_from_style(style: &str) -> Option<String> {
    style.split(';').find_map(|decl| {
        let (prop, value) = decl.split_once(':')?;
        (prop.trim().eq_ignore_ascii_case("display")).then(|| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::parse(
            r#"<div id="root" class="a b">
                <input type="text" value="hi">
                <input type="radio" name="r" value="1" checked>
                <input type="radio" name="r" value="2">
                <select><option>x</option><option value="y" selected>Y</option></select>
                <p style="display: none"><span>deep</span></p>
            </div>"#,
        )
        .expect("parses")
    }

    fn root(doc: &Document) -> Element {
        doc.body().children()[0].clone()
    }

    #[test]
    fn form_state_comes_from_markup() {
        let doc = doc();
        let kids = root(&doc).children();
        assert_eq!(kids[0].value(), "hi");
        assert!(kids[1].checked());
        assert_eq!(kids[3].value(), "y");
    }

    #[test]
    fn checking_a_radio_unchecks_its_group() {
        let doc = doc();
        let kids = root(&doc).children();
        kids[2].set_checked(true);
        assert!(!kids[1].checked());
    }

    #[test]
    fn writes_of_equal_values_keep_the_revision() {
        let doc = doc();
        let input = root(&doc).children()[0].clone();
        let rev = input.revision();
        input.set_value("hi");
        input.set_attribute("type", "text");
        assert_eq!(input.revision(), rev);
        input.set_value("changed");
        assert_eq!(input.revision(), rev + 1);
    }

    #[test]
    fn hidden_ancestors_collapse_the_layout_box() {
        let doc = doc();
        let p = root(&doc).children()[4].clone();
        let span = p.children()[0].clone();
        assert_eq!(span.offset_width(), 0.0);
        p.set_display(None);
        assert_eq!(span.offset_width(), 1.0);
        span.remove();
        assert_eq!(span.offset_height(), 0.0);
    }

    #[test]
    fn class_toggling_preserves_order() {
        let doc = doc();
        let el = root(&doc);
        el.toggle_class("c", true);
        el.toggle_class("a", false);
        assert_eq!(el.class_list(), vec!["b", "c"]);
    }

    #[test]
    fn clone_node_copies_state_but_not_listeners() {
        let doc = doc();
        let el = root(&doc);
        el.add_event_listener("click", ListenerOptions::default(), Rc::new(|_: &Event| {}));
        let copy = el.clone_node(true);
        assert_eq!(copy.listener_count("click"), 0);
        assert_eq!(copy.children().len(), el.children().len());
        assert!(copy.parent().is_none());
        assert_eq!(copy.children()[0].value(), "hi");
    }

    #[test]
    fn insert_after_keeps_sibling_order() {
        let doc = Document::parse("<ul><li>a</li><li>c</li></ul>").expect("parses");
        let ul = doc.body().children()[0].clone();
        let b = doc.create_element("li");
        b.set_text_content("b");
        ul.children()[0].insert_after(&b);
        let texts: Vec<String> = ul.children().iter().map(Element::text_content).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn checkbox_click_toggles_and_fires_change() {
        let doc = Document::parse(r#"<input type="checkbox" value="a">"#).expect("parses");
        let input = doc.body().children()[0].clone();
        let changes = Rc::new(std::cell::Cell::new(0));
        let counter = changes.clone();
        input.add_event_listener(
            "change",
            ListenerOptions::default(),
            Rc::new(move |_: &Event| counter.set(counter.get() + 1)),
        );
        input.click();
        assert!(input.checked());
        assert_eq!(changes.get(), 1);
    }
}
