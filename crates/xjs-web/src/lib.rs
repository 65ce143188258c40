//! xjs web crate: attribute-driven reactive components.
//!
//! Markup declares a component with `x-data="{ ... }"` and wires it up
//! through three attribute namespaces:
//!
//! - `@event.modifiers="statements"` binds listeners,
//! - `x.prop.modifiers` two-way binds a form field to a data key,
//! - `x-name="expression"` (and `:attr`) runs a registered directive.
//!
//! Everything runs against the in-memory host in [`dom`], driven by the
//! document's [`EventLoop`]. [`App`] is the bootstrap; [`Component`] is the
//! per-root orchestrator.

pub mod app;
pub mod attributes;
pub mod component;
pub mod config;
pub mod directives;
pub mod dom;
pub mod event_loop;
pub mod host;
pub mod listeners;
pub mod props;
pub mod registry;
pub mod store;
pub mod walk;

pub use app::App;
pub use attributes::{AttributeDescriptor, AttributeKind, parse_attribute, parse_attributes};
pub use component::{
    Component, ComponentError, FETCHED_EVENT, FetchedDetail, REFRESHED_EVENT, RefreshedDetail,
    WeakComponent,
};
pub use config::{ConfigError, RuntimeConfig};
pub use dom::{Document, Element, Event, EventDetail, HtmlError, ListenerTarget, ReadyState};
pub use event_loop::{Debouncer, EventLoop, TimerId};
pub use registry::{
    Directive, DirectiveOutput, Method, Registries, RegistryError, register_directive,
    register_method, unregister_directive, unregister_method,
};
pub use store::Store;
pub use xjs_core::{EvalError, EvalResult, Val};
