//! The component orchestrator.
//!
//! A component owns one root element and its observable [`Store`]. On
//! creation it scrapes form fields, then walks its subtree once to bind
//! listeners, push prop values into fields and run directives. Every store
//! write requests a debounced refresh; a refresh re-walks the subtree and
//! re-applies only the bindings whose dependencies intersect the keys
//! written since the previous pass.

use crate::attributes::{AttributeDescriptor, AttributeKind, parse_attributes};
use crate::config::RuntimeConfig;
use crate::directives::FOR_ATTRIBUTE;
use crate::dom::{
    Document, Element, Event, EventDetail, ListenerId, ListenerTarget, ObserverId, WeakElement,
};
use crate::event_loop::Debouncer;
use crate::host::{ElementHost, EventHost, RefsHost};
use crate::listeners::{self, ListenerAction};
use crate::props::{checkbox_group, ensure_name, event_for_prop, fetch_props, read_prop_value, update_attribute};
use crate::registry::{DirectiveOutput, Registries};
use crate::store::Store;
use crate::walk::walk_with;
use indexmap::IndexSet;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;
use xjs_core::{Bindings, Dependencies, Engine, EvalResult, Evaluation, Val, identifiers, read_data_literal};

pub const FETCHED_EVENT: &str = "x:fetched";
pub const REFRESHED_EVENT: &str = "x:refreshed";

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("component root is not owned by a live document")]
    NoDocument,
}

/// Detail of [`FETCHED_EVENT`]: the scraped data and the bindings it came from.
#[derive(Debug, Clone)]
pub struct FetchedDetail {
    pub data: Map<String, Value>,
    pub props: Vec<(Element, AttributeDescriptor)>,
}

/// Detail of [`REFRESHED_EVENT`], one per prop binding updated by a refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshedDetail {
    pub attribute: AttributeDescriptor,
    pub output: Value,
}

/// Document- and window-level registrations a component made; they outlive
/// the elements that asked for them unless removed.
#[derive(Clone)]
pub(crate) enum GlobalBinding {
    Listener {
        target: ListenerTarget,
        id: ListenerId,
        owner: WeakElement,
    },
    Intersection {
        id: ObserverId,
        owner: WeakElement,
    },
}

impl GlobalBinding {
    fn owner(&self) -> Option<Element> {
        match self {
            GlobalBinding::Listener { owner, .. } | GlobalBinding::Intersection { owner, .. } => {
                owner.upgrade()
            }
        }
    }

    fn release(&self, document: &Document) {
        match self {
            GlobalBinding::Listener { target, id, .. } => {
                document.remove_event_listener(*target, *id);
            }
            GlobalBinding::Intersection { id, .. } => {
                document.unobserve_intersection(*id);
            }
        }
    }
}

struct ComponentInner {
    root: Element,
    document: Document,
    store: Store,
    registries: Rc<Registries>,
    config: Rc<RuntimeConfig>,
    engine: Engine,
    dependency_log: RefCell<Dependencies>,
    debouncer: Debouncer,
    refreshing: Cell<bool>,
    refresh_count: Cell<u64>,
    globals: RefCell<Vec<GlobalBinding>>,
    torn_down: Cell<bool>,
}

#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

#[derive(Clone)]
pub struct WeakComponent(Weak<ComponentInner>);

impl WeakComponent {
    pub fn upgrade(&self) -> Option<Component> {
        self.0.upgrade().map(Component)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("root", &self.0.root)
            .field("data", &self.0.store.snapshot())
            .finish()
    }
}

impl Component {
    /// Create and initialize the component rooted at `root`.
    ///
    /// The data literal in the component attribute is evaluated, form-field
    /// values are merged over it and [`FETCHED_EVENT`] is dispatched on the
    /// document before the first walk.
    pub fn new(
        root: &Element,
        registries: Rc<Registries>,
        config: Rc<RuntimeConfig>,
    ) -> Result<Self, ComponentError> {
        let document = root.owner_document().ok_or(ComponentError::NoDocument)?;
        let literal = root
            .get_attribute(&config.component_attribute)
            .unwrap_or_default();
        let mut data = read_data_literal(&literal).unwrap_or_else(|err| {
            tracing::warn!(element = ?root, %err, "unreadable component data, starting empty");
            Map::new()
        });
        let props = fetch_props(root, &config.component_attribute, &mut data);

        let inner = Rc::new_cyclic(|weak: &Weak<ComponentInner>| {
            let store = Store::new(data.clone());
            let weak = WeakComponent(weak.clone());
            store.on_write(move |_| {
                if let Some(component) = weak.upgrade() {
                    component.request_refresh();
                }
            });
            ComponentInner {
                root: root.clone(),
                document: document.clone(),
                store,
                registries,
                config,
                engine: Engine::new(),
                dependency_log: RefCell::new(Dependencies::new()),
                debouncer: Debouncer::new(),
                refreshing: Cell::new(false),
                refresh_count: Cell::new(0),
                globals: RefCell::new(Vec::new()),
                torn_down: Cell::new(false),
            }
        });
        let component = Component(inner);

        document.dispatch_event(&Event::new(
            FETCHED_EVENT,
            true,
            EventDetail::Fetched(FetchedDetail { data, props }),
        ));
        tracing::debug!(root = ?root, "initializing component");
        component.initialize_subtree(root);
        Ok(component)
    }

    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn root(&self) -> &Element {
        &self.0.root
    }

    pub fn document(&self) -> &Document {
        &self.0.document
    }

    pub fn store(&self) -> &Store {
        &self.0.store
    }

    pub fn registries(&self) -> &Registries {
        &self.0.registries
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.0.config
    }

    /// Shorthand for reading one data key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.store.get(key)
    }

    /// Shorthand for an observable write.
    pub fn set(&self, key: &str, value: Value) {
        self.0.store.set(key, value);
    }

    /// Data keys read during the current or most recent pass.
    pub fn dependency_log(&self) -> Dependencies {
        self.0.dependency_log.borrow().clone()
    }

    /// Completed refresh passes.
    pub fn refresh_count(&self) -> u64 {
        self.0.refresh_count.get()
    }

    pub fn is_torn_down(&self) -> bool {
        self.0.torn_down.get()
    }

    fn marker(&self) -> &str {
        &self.0.config.component_attribute
    }

    // === Evaluation ===

    /// Bindings for expressions on `el`: iteration variables inherited from
    /// the nearest clone, `$el` and `$refs`.
    fn bindings_for(&self, el: &Element) -> Bindings {
        let mut bindings = Bindings::new();
        if let Some(scope) = el.inherited_scope() {
            for (name, value) in &scope.vars {
                bindings.insert(name.clone(), Val::Data(value.clone()));
            }
        }
        bindings.insert("$el".to_string(), ElementHost::val(el));
        bindings.insert("$refs".to_string(), Val::host(RefsHost(self.downgrade())));
        bindings
    }

    /// Evaluate `expression` in the context of `el` and log its reads.
    pub fn evaluate(&self, expression: &str, el: &Element) -> EvalResult<Evaluation> {
        let out = self
            .0
            .engine
            .evaluate(expression, &self.0.store, &self.bindings_for(el))?;
        self.0
            .dependency_log
            .borrow_mut()
            .extend(out.dependencies.iter().cloned());
        Ok(out)
    }

    /// Run an event-handler expression for side effects.
    ///
    /// `$el` is the event target (the bound element for synthetic events)
    /// and `$event` the event. Every registered method is bound under its
    /// name for this run.
    pub fn run_handler(&self, el: &Element, event: &Event, expression: &str) {
        let target = event.target().unwrap_or_else(|| el.clone());
        let mut bindings = self.bindings_for(el);
        bindings.insert("$el".to_string(), ElementHost::val(&target));
        bindings.insert("$event".to_string(), Val::host(EventHost(event.clone())));
        for (name, method) in self.0.registries.methods() {
            bindings.insert(name, method(event, Some(&target)));
        }
        if let Err(err) = self.0.engine.run(expression, &self.0.store, &bindings) {
            tracing::warn!(element = ?el, expression, %err, "event handler failed");
        }
    }

    /// First element within this component's own boundary whose ref
    /// attribute equals `name`. Looked up on every call.
    pub fn refs(&self, name: &str) -> Option<Element> {
        let attribute = &self.0.config.ref_attribute;
        let mut found = None;
        walk_with(&self.0.root, self.marker(), &mut |el| {
            if found.is_some() {
                return false;
            }
            if el.get_attribute(attribute).as_deref() == Some(name) {
                found = Some(el.clone());
                return false;
            }
            !el.has_attribute(FOR_ATTRIBUTE)
        });
        found
    }

    pub(crate) fn perform(&self, el: &Element, event: &Event, action: &ListenerAction) {
        match action {
            ListenerAction::Run(expression) => self.run_handler(el, event, expression),
            ListenerAction::WriteProp { prop, modifiers } => self.write_prop(el, prop, modifiers),
        }
    }

    fn write_prop(&self, el: &Element, prop: &str, modifiers: &[String]) {
        let current = self.0.store.get(prop);
        let group = if el.input_type() == "checkbox" && matches!(current, Some(Value::Array(_))) {
            checkbox_group(&self.0.root, self.marker(), prop)
        } else {
            Vec::new()
        };
        if let Some(value) = read_prop_value(el, modifiers, current.as_ref(), &group) {
            self.0.store.set(prop, value);
        }
    }

    // === Initialization ===

    /// Bind and apply every attribute under `start`, which must lie inside
    /// this component. Used for the root and for iteration clones.
    pub fn initialize_subtree(&self, start: &Element) {
        walk_with(start, self.marker(), &mut |el| self.initialize_element(el));
    }

    fn initialize_element(&self, el: &Element) -> bool {
        let template = el.has_attribute(FOR_ATTRIBUTE);
        for attr in parse_attributes(el) {
            if template && attr.attribute != FOR_ATTRIBUTE {
                continue;
            }
            let kind = attr.kind;
            match kind {
                AttributeKind::Event => {
                    listeners::bind(self, el, &attr.name, &attr.modifiers, ListenerAction::Run(attr.expression));
                }
                AttributeKind::Prop => self.initialize_prop(el, attr),
                AttributeKind::Directive => {
                    let Some(key) = attr.directive_key() else {
                        continue;
                    };
                    let Some(directive) = self.0.registries.directive(&key) else {
                        tracing::trace!(directive = %key, "no such directive, skipped");
                        continue;
                    };
                    let output = match self.evaluate(&attr.expression, el) {
                        Ok(out) => DirectiveOutput::Evaluated(out.value),
                        Err(_) => DirectiveOutput::Raw(attr.expression.clone()),
                    };
                    directive(el, output, &attr, &self.0.registries, self);
                }
            }
        }
        !template
    }

    fn initialize_prop(&self, el: &Element, attr: AttributeDescriptor) {
        ensure_name(el, &attr.name);
        let event = event_for_prop(el, &attr.modifiers);
        listeners::bind(
            self,
            el,
            event,
            &attr.modifiers,
            ListenerAction::WriteProp {
                prop: attr.name.clone(),
                modifiers: attr.modifiers.clone(),
            },
        );
        match self.evaluate(&attr.name, el) {
            Ok(out) => update_attribute(el, "value", &out.value.into_data()),
            Err(err) => tracing::warn!(element = ?el, prop = %attr.name, %err, "prop did not evaluate"),
        }
    }

    // === Refresh ===

    /// Schedule a refresh pass. Requests made before it fires, including
    /// ones made while a pass runs, coalesce into the next single pass.
    pub fn request_refresh(&self) {
        if self.0.torn_down.get() {
            return;
        }
        let weak = self.downgrade();
        self.0.debouncer.schedule(
            self.0.document.event_loop(),
            self.0.config.refresh_delay_ms,
            move || {
                if let Some(component) = weak.upgrade() {
                    component.refresh_now();
                }
            },
        );
    }

    /// Run a refresh pass immediately.
    pub fn refresh_now(&self) {
        if self.0.refreshing.get() {
            self.request_refresh();
            return;
        }
        if !self.0.root.is_connected() {
            tracing::debug!(root = ?self.0.root, "root detached, refresh skipped");
            return;
        }
        self.0.refreshing.set(true);
        self.0.dependency_log.borrow_mut().clear();
        let mutated = self.0.store.take_mutated();
        tracing::debug!(root = ?self.0.root, ?mutated, "refreshing");

        walk_with(&self.0.root, self.marker(), &mut |el| self.refresh_element(el, &mutated));

        self.0.refreshing.set(false);
        self.0.refresh_count.set(self.0.refresh_count.get() + 1);
        self.prune_globals();
    }

    fn refresh_element(&self, el: &Element, mutated: &IndexSet<String>) -> bool {
        let template = el.has_attribute(FOR_ATTRIBUTE);
        let touched = |deps: &Dependencies| deps.iter().any(|d| mutated.contains(d));
        for attr in parse_attributes(el) {
            if template && attr.attribute != FOR_ATTRIBUTE {
                continue;
            }
            let kind = attr.kind;
            match kind {
                AttributeKind::Event => {}
                AttributeKind::Prop => match self.evaluate(&attr.name, el) {
                    Ok(out) if touched(&out.dependencies) => {
                        let output = out.value.into_data();
                        update_attribute(el, "value", &output);
                        self.0.document.dispatch_event(&Event::new(
                            REFRESHED_EVENT,
                            true,
                            EventDetail::Refreshed(RefreshedDetail {
                                attribute: attr,
                                output,
                            }),
                        ));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(element = ?el, prop = %attr.name, %err, "prop did not evaluate");
                    }
                },
                AttributeKind::Directive => {
                    let Some(key) = attr.directive_key() else {
                        continue;
                    };
                    let Some(directive) = self.0.registries.directive(&key) else {
                        continue;
                    };
                    // Only source that never parses (`dog in dogs`) travels raw.
                    let (output, deps) = match self.evaluate(&attr.expression, el) {
                        Ok(out) => (DirectiveOutput::Evaluated(out.value), out.dependencies),
                        Err(err) if err.is_syntax() => (
                            DirectiveOutput::Raw(attr.expression.clone()),
                            self.literal_dependencies(&attr.expression),
                        ),
                        Err(err) => {
                            tracing::warn!(element = ?el, directive = %key, %err, "directive did not evaluate");
                            continue;
                        }
                    };
                    if touched(&deps) {
                        directive(el, output, &attr, &self.0.registries, self);
                    }
                }
            }
        }
        !template
    }

    /// Data keys named in a raw expression that does not evaluate.
    fn literal_dependencies(&self, expression: &str) -> Dependencies {
        identifiers(expression)
            .into_iter()
            .filter(|name| self.0.store.contains_key(name))
            .collect()
    }

    // === Teardown ===

    pub(crate) fn track_global(&self, binding: GlobalBinding) {
        self.0.globals.borrow_mut().push(binding);
    }

    /// Number of document/window listeners and intersection observations
    /// this component currently holds.
    pub fn global_bindings(&self) -> usize {
        self.0.globals.borrow().len()
    }

    /// Release global registrations whose element has left this component,
    /// such as those of discarded iteration clones.
    fn prune_globals(&self) {
        let root = &self.0.root;
        let stale: Vec<GlobalBinding> = {
            let mut globals = self.0.globals.borrow_mut();
            let (keep, stale): (Vec<_>, Vec<_>) = globals
                .drain(..)
                .partition(|g| g.owner().is_some_and(|o| root.contains(&o)));
            *globals = keep;
            stale
        };
        for binding in &stale {
            binding.release(&self.0.document);
        }
    }

    /// Remove every global registration and cancel the pending refresh.
    /// The component stays readable but no longer reacts.
    pub fn teardown(&self) {
        if self.0.torn_down.replace(true) {
            return;
        }
        self.0.debouncer.cancel(self.0.document.event_loop());
        let globals = std::mem::take(&mut *self.0.globals.borrow_mut());
        for binding in &globals {
            binding.release(&self.0.document);
        }
        tracing::debug!(root = ?self.0.root, released = globals.len(), "component torn down");
    }
}
