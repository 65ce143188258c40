//! Event attribute binding and modifier semantics.
//!
//! Modifiers compose freely: `@click.outside.prevent.once`,
//! `@input.delay.300ms`, `@scroll.window.passive`. Two pseudo-events exist:
//! `load` runs the handler right away and `intersect` runs it when the
//! element becomes visible.

use crate::component::{Component, GlobalBinding};
use crate::dom::{Element, Event, Handler, ListenerId, ListenerOptions, ListenerTarget, ObserverId};
use crate::event_loop::Debouncer;
use std::cell::Cell;
use std::rc::Rc;

/// What a bound listener does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerAction {
    /// Run an event-attribute expression.
    Run(String),
    /// Write the field's current value back into a prop.
    WriteProp { prop: String, modifiers: Vec<String> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub prevent: bool,
    pub stop: bool,
    pub once: bool,
    pub outside: bool,
    pub window: bool,
    pub document: bool,
    pub passive: bool,
    pub capture: bool,
    pub delay_ms: Option<u64>,
}

impl Modifiers {
    pub fn parse(modifiers: &[String], default_delay_ms: u64) -> Self {
        let has = |m: &str| modifiers.iter().any(|x| x == m);
        Self {
            prevent: has("prevent"),
            stop: has("stop"),
            once: has("once"),
            outside: has("outside"),
            window: has("window"),
            document: has("document"),
            passive: has("passive"),
            capture: has("capture"),
            delay_ms: delay_ms(modifiers, default_delay_ms),
        }
    }

    fn target(&self) -> Option<ListenerTarget> {
        if self.window {
            Some(ListenerTarget::Window)
        } else if self.document || self.outside {
            Some(ListenerTarget::Document)
        } else {
            None
        }
    }
}

/// `delay.<ms>`: the token after `delay`, with an optional `ms` suffix.
/// A missing or malformed token falls back to `default_ms`.
pub fn delay_ms(modifiers: &[String], default_ms: u64) -> Option<u64> {
    let at = modifiers.iter().position(|m| m == "delay")?;
    let parsed = modifiers.get(at + 1).and_then(|token| {
        token
            .strip_suffix("ms")
            .unwrap_or(token)
            .parse::<u64>()
            .ok()
    });
    Some(parsed.unwrap_or(default_ms))
}

/// Attach `action` to `el` for `event_type` according to `modifiers`.
pub fn bind(
    component: &Component,
    el: &Element,
    event_type: &str,
    modifiers: &[String],
    action: ListenerAction,
) {
    let mods = Modifiers::parse(modifiers, component.config().default_listener_delay_ms);
    tracing::debug!(element = ?el, event = event_type, ?mods, "binding listener");

    let run = invoker(component, el, action, mods.delay_ms);

    match event_type {
        "load" => run(&Event::synthetic("load", Some(el))),
        "intersect" => bind_intersect(component, el, mods, run),
        _ => bind_event(component, el, event_type, mods, run),
    }
}

/// The handler body, debounced when `delay` is present.
fn invoker(component: &Component, el: &Element, action: ListenerAction, delay: Option<u64>) -> Handler {
    let weak_component = component.downgrade();
    let weak_el = el.downgrade();
    let body: Handler = Rc::new(move |event: &Event| {
        let (Some(component), Some(el)) = (weak_component.upgrade(), weak_el.upgrade()) else {
            return;
        };
        component.perform(&el, event, &action);
    });

    let Some(ms) = delay else {
        return body;
    };
    let weak_component = component.downgrade();
    let debouncer = Debouncer::new();
    Rc::new(move |event: &Event| {
        let Some(component) = weak_component.upgrade() else {
            return;
        };
        let (body, event) = (body.clone(), event.clone());
        debouncer.schedule(component.document().event_loop(), ms, move || body(&event));
    })
}

fn bind_intersect(component: &Component, el: &Element, mods: Modifiers, run: Handler) {
    let registration: Rc<Cell<Option<ObserverId>>> = Rc::new(Cell::new(None));
    let weak_component = component.downgrade();
    let slot = registration.clone();
    let id = component.document().observe_intersection(el, move |entry| {
        if !entry.is_intersecting {
            return;
        }
        if mods.once
            && let (Some(component), Some(id)) = (weak_component.upgrade(), slot.take())
        {
            component.document().unobserve_intersection(id);
        }
        run(&Event::synthetic("intersect", Some(&entry.target)));
    });
    registration.set(Some(id));
    component.track_global(GlobalBinding::Intersection {
        id,
        owner: el.downgrade(),
    });
}

fn bind_event(component: &Component, el: &Element, event_type: &str, mods: Modifiers, run: Handler) {
    let registration: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
    let target = mods.target();
    let weak_component = component.downgrade();
    let weak_el = el.downgrade();
    let slot = registration.clone();

    let handler: Handler = Rc::new(move |event: &Event| {
        let Some(el) = weak_el.upgrade() else {
            return;
        };
        if mods.outside {
            if event.target().is_some_and(|t| el.contains(&t)) {
                return;
            }
            if el.offset_width() < 1.0 && el.offset_height() < 1.0 {
                return;
            }
        }
        if mods.prevent {
            event.prevent_default();
        }
        if mods.stop {
            event.stop_propagation();
        }
        if mods.once
            && let Some(id) = slot.take()
        {
            match target {
                Some(t) => {
                    if let Some(component) = weak_component.upgrade() {
                        component.document().remove_event_listener(t, id);
                    }
                }
                None => {
                    el.remove_event_listener(id);
                }
            }
        }
        run(event);
    });

    let options = ListenerOptions {
        capture: mods.capture,
        passive: mods.passive,
    };
    let id = match target {
        Some(t) => {
            let id = component
                .document()
                .add_event_listener(t, event_type, options, handler);
            component.track_global(GlobalBinding::Listener {
                target: t,
                id,
                owner: el.downgrade(),
            });
            id
        }
        None => el.add_event_listener(event_type, options, handler),
    };
    registration.set(Some(id));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mods(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn delay_reads_the_following_token() {
        assert_eq!(delay_ms(&mods(&["delay", "500ms"]), 250), Some(500));
        assert_eq!(delay_ms(&mods(&["delay", "40"]), 250), Some(40));
        assert_eq!(delay_ms(&mods(&["delay", "soon"]), 250), Some(250));
        assert_eq!(delay_ms(&mods(&["prevent", "delay"]), 250), Some(250));
        assert_eq!(delay_ms(&mods(&["prevent"]), 250), None);
    }

    #[test]
    fn modifiers_pick_the_listen_target() {
        let m = Modifiers::parse(&mods(&["outside", "prevent"]), 250);
        assert_eq!(m.target(), Some(ListenerTarget::Document));
        assert!(m.prevent && !m.stop);
        let m = Modifiers::parse(&mods(&["window", "passive"]), 250);
        assert_eq!(m.target(), Some(ListenerTarget::Window));
        assert!(m.passive);
        assert_eq!(Modifiers::parse(&[], 250).target(), None);
    }
}
