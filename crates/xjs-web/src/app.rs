//! Bootstrap: discover component roots, watch for new ones, prune the
//! detached.

use crate::component::{Component, ComponentError};
use crate::config::RuntimeConfig;
use crate::dom::{
    Document, Element, Event, ListenerId, ListenerOptions, ListenerTarget, MutationRecord,
    ObserverId, ReadyState,
};
use crate::registry::Registries;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct AppInner {
    document: Document,
    registries: Rc<Registries>,
    config: Rc<RuntimeConfig>,
    components: RefCell<Vec<Component>>,
    observer: Cell<Option<ObserverId>>,
    pending_start: Cell<Option<ListenerId>>,
}

/// Owns every component of one document.
#[derive(Clone)]
pub struct App(Rc<AppInner>);

impl App {
    /// An app using the process-wide registries and default configuration.
    pub fn new(document: &Document) -> Self {
        Self::with(document, Registries::from_global(), RuntimeConfig::default())
    }

    pub fn with(document: &Document, registries: Registries, config: RuntimeConfig) -> Self {
        App(Rc::new(AppInner {
            document: document.clone(),
            registries: Rc::new(registries),
            config: Rc::new(config),
            components: RefCell::new(Vec::new()),
            observer: Cell::new(None),
            pending_start: Cell::new(None),
        }))
    }

    fn downgrade(&self) -> Weak<AppInner> {
        Rc::downgrade(&self.0)
    }

    pub fn document(&self) -> &Document {
        &self.0.document
    }

    /// Shared with every component; registrations made here after
    /// [`App::start`] are visible to later initialization and refreshes.
    pub fn registries(&self) -> &Registries {
        &self.0.registries
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.0.config
    }

    /// Boot once the document has loaded: initialize every existing
    /// component root, then watch the document for new ones.
    pub fn start(&self) {
        if self.0.observer.get().is_some() || self.0.pending_start.get().is_some() {
            return;
        }
        if self.0.document.ready_state() == ReadyState::Complete {
            self.boot();
            return;
        }
        let weak = self.downgrade();
        let id = self.0.document.add_event_listener(
            ListenerTarget::Document,
            "DOMContentLoaded",
            ListenerOptions::default(),
            Rc::new(move |_: &Event| {
                if let Some(inner) = weak.upgrade() {
                    let app = App(inner);
                    if let Some(id) = app.0.pending_start.take() {
                        app.0
                            .document
                            .remove_event_listener(ListenerTarget::Document, id);
                    }
                    app.boot();
                }
            }),
        );
        self.0.pending_start.set(Some(id));
        tracing::debug!("waiting for DOMContentLoaded");
    }

    fn boot(&self) {
        let found = self.discover();
        let weak = self.downgrade();
        let id = self.0.document.observe_mutations(move |records| {
            if let Some(inner) = weak.upgrade() {
                App(inner).on_mutations(records);
            }
        });
        self.0.observer.set(Some(id));
        tracing::debug!(components = found, "started");
    }

    /// Whether [`App::start`] has finished booting.
    pub fn is_started(&self) -> bool {
        self.0.observer.get().is_some()
    }

    fn on_mutations(&self, records: &[MutationRecord]) {
        let marker = &self.0.config.component_attribute;
        for record in records {
            for added in record.added.iter().filter(|n| n.is_element()) {
                let mut roots = Vec::new();
                if added.has_attribute(marker) {
                    roots.push(added.clone());
                }
                roots.extend(
                    added
                        .descendants()
                        .into_iter()
                        .filter(|el| el.has_attribute(marker)),
                );
                for root in roots {
                    if root.is_connected() && self.component_for(&root).is_none() {
                        self.log_failure(self.initialize_element(&root));
                    }
                }
            }
        }
        if self.0.config.teardown_on_detach && records.iter().any(|r| !r.removed.is_empty()) {
            self.prune_detached();
        }
    }

    fn log_failure(&self, result: Result<Component, ComponentError>) {
        if let Err(err) = result {
            tracing::warn!(%err, "component not initialized");
        }
    }

    /// Initialize every connected component root not yet known, in
    /// document order. Returns how many were created.
    pub fn discover(&self) -> usize {
        let mut created = 0;
        for root in self
            .0
            .document
            .query_attribute_all(&self.0.config.component_attribute)
        {
            if self.component_for(&root).is_some() {
                continue;
            }
            match self.initialize_element(&root) {
                Ok(_) => created += 1,
                Err(err) => tracing::warn!(%err, "component not initialized"),
            }
        }
        created
    }

    /// Create the component rooted at `root` and keep it.
    pub fn initialize_element(&self, root: &Element) -> Result<Component, ComponentError> {
        let component = Component::new(root, self.0.registries.clone(), self.0.config.clone())?;
        self.0.components.borrow_mut().push(component.clone());
        Ok(component)
    }

    pub fn components(&self) -> Vec<Component> {
        self.0.components.borrow().clone()
    }

    pub fn component_for(&self, root: &Element) -> Option<Component> {
        self.0
            .components
            .borrow()
            .iter()
            .find(|c| c.root().ptr_eq(root))
            .cloned()
    }

    /// Tear down and forget components whose root left the document.
    pub fn prune_detached(&self) -> usize {
        let detached: Vec<Component> = {
            let mut components = self.0.components.borrow_mut();
            let (keep, detached): (Vec<_>, Vec<_>) = components
                .drain(..)
                .partition(|c| c.root().is_connected());
            *components = keep;
            detached
        };
        for component in &detached {
            component.teardown();
        }
        if !detached.is_empty() {
            tracing::debug!(count = detached.len(), "pruned detached components");
        }
        detached.len()
    }

    /// Stop watching the document and tear every component down.
    pub fn stop(&self) {
        if let Some(id) = self.0.observer.take() {
            self.0.document.disconnect_mutations(id);
        }
        if let Some(id) = self.0.pending_start.take() {
            self.0
                .document
                .remove_event_listener(ListenerTarget::Document, id);
        }
        for component in self.0.components.borrow_mut().drain(..) {
            component.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app(html: &str) -> (Document, App) {
        let doc = Document::parse(html).expect("parses");
        let app = App::with(&doc, Registries::with_builtins(), RuntimeConfig::default());
        (doc, app)
    }

    #[test]
    fn start_waits_for_the_document_to_load() {
        let (doc, app) = app(r#"<div x-data="{ a: 1 }"></div>"#);
        app.start();
        assert!(app.components().is_empty());
        doc.finish_loading();
        assert!(app.is_started());
        assert_eq!(app.components().len(), 1);
        assert_eq!(doc.listener_count(ListenerTarget::Document, "DOMContentLoaded"), 0);
    }

    #[test]
    fn nested_roots_become_separate_components() {
        let (doc, app) = app(
            r#"<div x-data="{ a: 1 }"><span x-text="a"></span><section x-data="{ a: 2 }"><span x-text="a"></span></section></div>"#,
        );
        doc.finish_loading();
        app.start();
        assert_eq!(app.components().len(), 2);
        let spans: Vec<String> = doc
            .body()
            .descendants()
            .into_iter()
            .filter(|el| el.tag_name() == "span")
            .map(|el| el.text_content())
            .collect();
        assert_eq!(spans, vec!["1", "2"]);
        assert_eq!(app.discover(), 0);
    }

    #[test]
    fn added_roots_initialize_and_removed_ones_tear_down() {
        let (doc, app) = app("<main></main>");
        doc.finish_loading();
        app.start();
        let main = doc.body().children()[0].clone();
        let added = doc
            .parse_html(r#"<div x-data="{ n: 3 }"><p @keyup.window="n++" x-text="n"></p></div>"#)
            .expect("parses");
        main.append_child(&added[0]);
        doc.event_loop().run_until_idle();
        let components = app.components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].get("n"), Some(json!(3)));
        assert_eq!(doc.listener_count(ListenerTarget::Window, "keyup"), 1);

        added[0].remove();
        doc.event_loop().run_until_idle();
        assert!(app.components().is_empty());
        assert!(components[0].is_torn_down());
        assert_eq!(doc.listener_count(ListenerTarget::Window, "keyup"), 0);
    }

    #[test]
    fn registrations_after_start_reach_later_components() {
        fn shout(el: &Element, output: crate::registry::DirectiveOutput, _: &crate::attributes::AttributeDescriptor, _: &Registries, _: &Component) {
            el.set_text_content(&output.display_string().to_uppercase());
        }
        let (doc, app) = app("<main></main>");
        doc.finish_loading();
        app.start();
        app.registries().register_directive("shout", shout).expect("registers");
        let added = doc
            .parse_html(r#"<p x-data="{ w: 'hey' }" x-shout="w"></p>"#)
            .expect("parses");
        doc.body().children()[0].append_child(&added[0]);
        doc.event_loop().run_until_idle();
        assert_eq!(added[0].text_content(), "HEY");
    }
}
