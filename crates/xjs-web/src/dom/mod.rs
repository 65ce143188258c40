//! In-memory host DOM.
//!
//! Element handles are reference counted with weak parent links, so a
//! subtree removed from its parent stays usable for as long as someone holds
//! it. Structural changes on connected nodes produce mutation records that
//! are delivered to observers as a microtask on the document's event loop.

mod element;
mod event;
pub mod html;

pub use element::{Element, IterationScope, WeakElement};
pub use event::{Event, EventDetail, EventPhase};
pub use html::HtmlError;

use crate::event_loop::EventLoop;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub type Handler = Rc<dyn Fn(&Event)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub passive: bool,
}

#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) id: ListenerId,
    pub(crate) event_type: String,
    pub(crate) options: ListenerOptions,
    pub(crate) handler: Handler,
}

impl Listener {
    pub(crate) fn new(event_type: &str, options: ListenerOptions, handler: Handler) -> Self {
        Self {
            id: ListenerId(next_id()),
            event_type: event_type.to_string(),
            options,
            handler,
        }
    }
}

/// Where a non-element listener lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerTarget {
    Document,
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Complete,
}

#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub target: Element,
    pub added: Vec<Element>,
    pub removed: Vec<Element>,
}

#[derive(Debug, Clone)]
pub struct IntersectionEntry {
    pub target: Element,
    pub is_intersecting: bool,
}

type MutationCallback = Rc<dyn Fn(&[MutationRecord])>;
type IntersectionCallback = Rc<dyn Fn(&IntersectionEntry)>;

struct Observation {
    id: ObserverId,
    target: WeakElement,
    callback: IntersectionCallback,
}

pub(crate) struct DocumentInner {
    root: Element,
    head: Element,
    body: Element,
    ready: Cell<ReadyState>,
    event_loop: EventLoop,
    pub(crate) document_listeners: RefCell<Vec<Listener>>,
    pub(crate) window_listeners: RefCell<Vec<Listener>>,
    intersections: RefCell<Vec<Observation>>,
    mutation_observers: RefCell<Vec<(ObserverId, MutationCallback)>>,
    pending_mutations: RefCell<Vec<MutationRecord>>,
    flush_queued: Cell<bool>,
}

/// Cheap handle to a shared document.
#[derive(Clone)]
pub struct Document(pub(crate) Rc<DocumentInner>);

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty `<html><head></head><body></body></html>` in the loading state.
    pub fn new() -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<DocumentInner>| {
            let root = Element::create(weak.clone(), "html");
            let head = Element::create(weak.clone(), "head");
            let body = Element::create(weak.clone(), "body");
            root.append_child(&head);
            root.append_child(&body);
            DocumentInner {
                root,
                head,
                body,
                ready: Cell::new(ReadyState::Loading),
                event_loop: EventLoop::new(),
                document_listeners: RefCell::new(Vec::new()),
                window_listeners: RefCell::new(Vec::new()),
                intersections: RefCell::new(Vec::new()),
                mutation_observers: RefCell::new(Vec::new()),
                pending_mutations: RefCell::new(Vec::new()),
                flush_queued: Cell::new(false),
            }
        });
        Document(inner)
    }

    /// A loading document whose body holds the parsed fragment.
    pub fn parse(body_html: &str) -> Result<Self, HtmlError> {
        let doc = Self::new();
        doc.body().set_inner_html(body_html)?;
        Ok(doc)
    }

    pub(crate) fn downgrade(&self) -> Weak<DocumentInner> {
        Rc::downgrade(&self.0)
    }

    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn document_element(&self) -> Element {
        self.0.root.clone()
    }

    pub fn head(&self) -> Element {
        self.0.head.clone()
    }

    pub fn body(&self) -> Element {
        self.0.body.clone()
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.0.event_loop
    }

    pub fn create_element(&self, tag: &str) -> Element {
        Element::create(self.downgrade(), tag)
    }

    pub fn create_text_node(&self, text: &str) -> Element {
        Element::create_text(self.downgrade(), text)
    }

    /// Parse a fragment into detached nodes owned by this document.
    pub fn parse_html(&self, fragment: &str) -> Result<Vec<Element>, HtmlError> {
        html::parse_fragment(self, fragment)
    }

    pub fn ready_state(&self) -> ReadyState {
        self.0.ready.get()
    }

    /// Mark the document loaded and fire `DOMContentLoaded`.
    pub fn finish_loading(&self) {
        if self.0.ready.replace(ReadyState::Complete) == ReadyState::Complete {
            return;
        }
        self.dispatch_event(&Event::new("DOMContentLoaded", true, EventDetail::None));
    }

    /// Connected elements carrying `attribute`, in document order.
    pub fn query_attribute_all(&self, attribute: &str) -> Vec<Element> {
        let root = self.document_element();
        let mut out = Vec::new();
        if root.has_attribute(attribute) {
            out.push(root.clone());
        }
        out.extend(
            root.descendants()
                .into_iter()
                .filter(|el| el.has_attribute(attribute)),
        );
        out
    }

    pub fn add_event_listener(
        &self,
        target: ListenerTarget,
        event_type: &str,
        options: ListenerOptions,
        handler: Handler,
    ) -> ListenerId {
        let listener = Listener::new(event_type, options, handler);
        let id = listener.id;
        self.listeners(target).borrow_mut().push(listener);
        id
    }

    pub fn remove_event_listener(&self, target: ListenerTarget, id: ListenerId) -> bool {
        let mut listeners = self.listeners(target).borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self, target: ListenerTarget, event_type: &str) -> usize {
        self.listeners(target)
            .borrow()
            .iter()
            .filter(|l| l.event_type == event_type)
            .count()
    }

    pub(crate) fn listeners(&self, target: ListenerTarget) -> &RefCell<Vec<Listener>> {
        match target {
            ListenerTarget::Document => &self.0.document_listeners,
            ListenerTarget::Window => &self.0.window_listeners,
        }
    }

    /// Dispatch an event targeted at the document itself; it reaches
    /// document listeners and then, when bubbling, window listeners.
    pub fn dispatch_event(&self, event: &Event) -> bool {
        event::dispatch_document(self, event);
        !event.default_prevented()
    }

    pub fn observe_intersection(
        &self,
        target: &Element,
        callback: impl Fn(&IntersectionEntry) + 'static,
    ) -> ObserverId {
        let id = ObserverId(next_id());
        self.0.intersections.borrow_mut().push(Observation {
            id,
            target: target.downgrade(),
            callback: Rc::new(callback),
        });
        id
    }

    pub fn unobserve_intersection(&self, id: ObserverId) -> bool {
        let mut observations = self.0.intersections.borrow_mut();
        let before = observations.len();
        observations.retain(|o| o.id != id);
        observations.len() != before
    }

    pub fn intersection_observers(&self) -> usize {
        self.0.intersections.borrow().len()
    }

    /// Report a visibility change for `target` to its observers.
    pub fn set_intersecting(&self, target: &Element, is_intersecting: bool) {
        let callbacks: Vec<(ObserverId, IntersectionCallback)> = self
            .0
            .intersections
            .borrow()
            .iter()
            .filter(|o| o.target.upgrade().is_some_and(|t| t.ptr_eq(target)))
            .map(|o| (o.id, o.callback.clone()))
            .collect();
        let entry = IntersectionEntry {
            target: target.clone(),
            is_intersecting,
        };
        for (id, callback) in callbacks {
            let still_observed = self.0.intersections.borrow().iter().any(|o| o.id == id);
            if still_observed {
                callback(&entry);
            }
        }
    }

    pub fn observe_mutations(&self, callback: impl Fn(&[MutationRecord]) + 'static) -> ObserverId {
        let id = ObserverId(next_id());
        self.0
            .mutation_observers
            .borrow_mut()
            .push((id, Rc::new(callback)));
        id
    }

    pub fn disconnect_mutations(&self, id: ObserverId) -> bool {
        let mut observers = self.0.mutation_observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub(crate) fn record_mutation(&self, record: MutationRecord) {
        if self.0.mutation_observers.borrow().is_empty() {
            return;
        }
        self.0.pending_mutations.borrow_mut().push(record);
        if self.0.flush_queued.replace(true) {
            return;
        }
        let weak = self.downgrade();
        self.0.event_loop.queue_microtask(move || {
            if let Some(inner) = weak.upgrade() {
                Document(inner).deliver_mutations();
            }
        });
    }

    fn deliver_mutations(&self) {
        self.0.flush_queued.set(false);
        let records = std::mem::take(&mut *self.0.pending_mutations.borrow_mut());
        if records.is_empty() {
            return;
        }
        let observers: Vec<MutationCallback> = self
            .0
            .mutation_observers
            .borrow()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for observer in observers {
            observer(&records);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_body_and_is_loading() {
        let doc = Document::new();
        assert_eq!(doc.ready_state(), ReadyState::Loading);
        assert!(doc.body().is_connected());
        assert_eq!(doc.body().tag_name(), "body");
    }

    #[test]
    fn finish_loading_fires_dom_content_loaded_once() {
        let doc = Document::new();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        doc.add_event_listener(
            ListenerTarget::Document,
            "DOMContentLoaded",
            ListenerOptions::default(),
            Rc::new(move |_: &Event| counter.set(counter.get() + 1)),
        );
        doc.finish_loading();
        doc.finish_loading();
        assert_eq!(hits.get(), 1);
        assert_eq!(doc.ready_state(), ReadyState::Complete);
    }

    #[test]
    fn mutation_records_arrive_as_one_microtask_batch() {
        let doc = Document::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        doc.observe_mutations(move |records| {
            sink.borrow_mut().push(records.len());
        });
        doc.body().append_child(&doc.create_element("div"));
        doc.body().append_child(&doc.create_element("span"));
        assert!(seen.borrow().is_empty());
        doc.event_loop().run_microtasks();
        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn detached_subtrees_produce_no_records() {
        let doc = Document::new();
        let seen = Rc::new(Cell::new(0));
        let sink = seen.clone();
        doc.observe_mutations(move |records| sink.set(sink.get() + records.len()));
        let detached = doc.create_element("div");
        detached.append_child(&doc.create_element("p"));
        doc.event_loop().run_microtasks();
        assert_eq!(seen.get(), 0);
    }

    #[test]
    fn intersection_reaches_only_observers_of_the_target() {
        let doc = Document::parse("<div id=a></div><div id=b></div>").expect("parses");
        let kids = doc.body().children();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let id = doc.observe_intersection(&kids[0], move |entry| {
            if entry.is_intersecting {
                counter.set(counter.get() + 1);
            }
        });
        doc.set_intersecting(&kids[1], true);
        doc.set_intersecting(&kids[0], true);
        assert_eq!(hits.get(), 1);
        assert!(doc.unobserve_intersection(id));
        doc.set_intersecting(&kids[0], true);
        assert_eq!(hits.get(), 1);
    }
}
