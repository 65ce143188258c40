use super::{Document, Element, Listener, ListenerTarget};
use crate::component::{FetchedDetail, RefreshedDetail};
use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum EventDetail {
    None,
    Data(Value),
    Fetched(FetchedDetail),
    Refreshed(RefreshedDetail),
}

impl EventDetail {
    /// Plain-data view exposed to expressions as `$event.detail`.
    pub fn to_json(&self) -> Value {
        match self {
            EventDetail::None => Value::Null,
            EventDetail::Data(v) => v.clone(),
            EventDetail::Fetched(f) => json!({
                "data": Value::Object(f.data.clone()),
                "props": f.props.iter().map(|(_, a)| a.attribute.clone()).collect::<Vec<_>>(),
            }),
            EventDetail::Refreshed(r) => json!({
                "attribute": serde_json::to_value(&r.attribute).unwrap_or(Value::Null),
                "output": r.output.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

struct EventState {
    event_type: String,
    bubbles: bool,
    detail: EventDetail,
    target: RefCell<Option<Element>>,
    phase: Cell<EventPhase>,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
    in_passive: Cell<bool>,
}

/// Shared event handle; clones observe the same flags.
#[derive(Clone)]
pub struct Event(Rc<EventState>);

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.0.event_type)
            .field("target", &self.target())
            .finish()
    }
}

impl Event {
    pub fn new(event_type: &str, bubbles: bool, detail: EventDetail) -> Self {
        Event(Rc::new(EventState {
            event_type: event_type.to_string(),
            bubbles,
            detail,
            target: RefCell::new(None),
            phase: Cell::new(EventPhase::None),
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
            in_passive: Cell::new(false),
        }))
    }

    /// Bubbling custom event carrying JSON detail.
    pub fn custom(event_type: &str, detail: Value) -> Self {
        Self::new(event_type, true, EventDetail::Data(detail))
    }

    /// Event that is never dispatched, handed straight to a handler.
    pub fn synthetic(event_type: &str, target: Option<&Element>) -> Self {
        let event = Self::new(event_type, false, EventDetail::None);
        event.0.target.replace(target.cloned());
        event
    }

    pub fn event_type(&self) -> &str {
        &self.0.event_type
    }

    pub fn bubbles(&self) -> bool {
        self.0.bubbles
    }

    pub fn detail(&self) -> &EventDetail {
        &self.0.detail
    }

    pub fn target(&self) -> Option<Element> {
        self.0.target.borrow().clone()
    }

    pub fn phase(&self) -> EventPhase {
        self.0.phase.get()
    }

    /// No effect inside a passive listener.
    pub fn prevent_default(&self) {
        if !self.0.in_passive.get() {
            self.0.default_prevented.set(true);
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.0.default_prevented.get()
    }

    pub fn stop_propagation(&self) {
        self.0.propagation_stopped.set(true);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.0.propagation_stopped.get()
    }

    pub fn ptr_eq(&self, other: &Event) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Pass {
    Capture,
    Target,
    Bubble,
}

enum Stop {
    Element(Element),
    Global(Document, ListenerTarget),
}

impl Stop {
    fn listeners(&self, event_type: &str, pass: Pass) -> Vec<Listener> {
        let keep = |l: &&Listener| {
            l.event_type == event_type
                && match pass {
                    Pass::Capture => l.options.capture,
                    Pass::Target => true,
                    Pass::Bubble => !l.options.capture,
                }
        };
        match self {
            Stop::Element(el) => el.node().listeners.iter().filter(keep).cloned().collect(),
            Stop::Global(doc, target) => doc.listeners(*target).borrow().iter().filter(keep).cloned().collect(),
        }
    }

    fn still_registered(&self, listener: &Listener) -> bool {
        match self {
            Stop::Element(el) => el.has_listener(listener.id),
            Stop::Global(doc, target) => doc
                .listeners(*target)
                .borrow()
                .iter()
                .any(|l| l.id == listener.id),
        }
    }
}

/// Invoke the listeners of one stop. Returns false once propagation stopped.
fn invoke(stop: &Stop, event: &Event, pass: Pass) -> bool {
    event.0.phase.set(match pass {
        Pass::Capture => EventPhase::Capturing,
        Pass::Target => EventPhase::AtTarget,
        Pass::Bubble => EventPhase::Bubbling,
    });
    for listener in stop.listeners(&event.0.event_type, pass) {
        if !stop.still_registered(&listener) {
            continue;
        }
        event.0.in_passive.set(listener.options.passive);
        (listener.handler)(event);
        event.0.in_passive.set(false);
    }
    !event.propagation_stopped()
}

/// Capture from the window down to the target's parent, the target itself,
/// then bubble back up when the event bubbles.
pub(crate) fn dispatch(target: &Element, event: &Event) {
    event.0.target.replace(Some(target.clone()));
    let mut ancestors = Vec::new();
    let mut cursor = target.parent();
    while let Some(el) = cursor {
        cursor = el.parent();
        ancestors.push(el);
    }
    let globals: Vec<Stop> = match target.owner_document() {
        Some(doc) if target.is_connected() => vec![
            Stop::Global(doc.clone(), ListenerTarget::Window),
            Stop::Global(doc, ListenerTarget::Document),
        ],
        _ => Vec::new(),
    };

    let mut capture_path: Vec<Stop> = globals;
    capture_path.extend(ancestors.iter().rev().cloned().map(Stop::Element));

    let completed = capture_path.iter().all(|stop| invoke(stop, event, Pass::Capture))
        && invoke(&Stop::Element(target.clone()), event, Pass::Target);

    if completed && event.bubbles() {
        for stop in capture_path.iter().rev() {
            if !invoke(stop, event, Pass::Bubble) {
                break;
            }
        }
    }
    event.0.phase.set(EventPhase::None);
}

/// Events aimed at the document: document listeners, then window.
pub(crate) fn dispatch_document(doc: &Document, event: &Event) {
    let proceed = invoke(&Stop::Global(doc.clone(), ListenerTarget::Document), event, Pass::Target);
    if proceed && event.bubbles() {
        invoke(&Stop::Global(doc.clone(), ListenerTarget::Window), event, Pass::Bubble);
    }
    event.0.phase.set(EventPhase::None);
}
