//! Directive and method tables.
//!
//! A [`Registries`] value is passed explicitly to every component and every
//! directive call. The process-wide default table only seeds new
//! `Registries` through [`Registries::from_global`].

use crate::attributes::AttributeDescriptor;
use crate::component::Component;
use crate::dom::{Element, Event};
use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::sync::{OnceLock, RwLock};
use thiserror::Error;
use xjs_core::Val;

pub const DIRECTIVE_NAMESPACE: &str = "x-";
pub const METHOD_NAMESPACE: &str = "$";

/// What a directive receives: the evaluated expression, or the raw source
/// text when it did not evaluate.
#[derive(Debug, Clone)]
pub enum DirectiveOutput {
    Evaluated(Val),
    Raw(String),
}

impl DirectiveOutput {
    pub fn raw(&self) -> Option<&str> {
        match self {
            DirectiveOutput::Raw(s) => Some(s),
            DirectiveOutput::Evaluated(_) => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            DirectiveOutput::Evaluated(v) => v.is_truthy(),
            DirectiveOutput::Raw(s) => !s.is_empty(),
        }
    }

    pub fn display_string(&self) -> String {
        match self {
            DirectiveOutput::Evaluated(v) => v.display_string(),
            DirectiveOutput::Raw(s) => s.clone(),
        }
    }

    pub fn into_data(self) -> Value {
        match self {
            DirectiveOutput::Evaluated(v) => v.into_data(),
            DirectiveOutput::Raw(s) => Value::String(s),
        }
    }
}

pub type Directive = fn(&Element, DirectiveOutput, &AttributeDescriptor, &Registries, &Component);

/// Called per handler run with the event and its target; returns the value
/// expressions see under the method's name, usually a function.
pub type Method = fn(&Event, Option<&Element>) -> Val;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("'{0}' is already registered")]
    Duplicate(String),
    #[error("'{0}' is not a valid name")]
    InvalidName(String),
    #[error("global registry is poisoned")]
    Poisoned,
}

#[derive(Clone, Default)]
struct Tables {
    directives: IndexMap<String, Directive>,
    methods: IndexMap<String, Method>,
}

fn qualify(namespace: &str, name: &str) -> Result<String, RegistryError> {
    let bare = name.strip_prefix(namespace).unwrap_or(name);
    if bare.is_empty() || !bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(format!("{namespace}{bare}"))
}

fn insert_once<F>(table: &mut IndexMap<String, F>, key: String, entry: F) -> Result<(), RegistryError> {
    if table.contains_key(&key) {
        tracing::warn!(name = %key, "registration ignored, name already taken");
        return Err(RegistryError::Duplicate(key));
    }
    table.insert(key, entry);
    Ok(())
}

impl Tables {
    fn add_directive(&mut self, name: &str, directive: Directive) -> Result<(), RegistryError> {
        let key = qualify(DIRECTIVE_NAMESPACE, name)?;
        insert_once(&mut self.directives, key, directive)
    }

    fn add_method(&mut self, name: &str, method: Method) -> Result<(), RegistryError> {
        let key = qualify(METHOD_NAMESPACE, name)?;
        insert_once(&mut self.methods, key, method)
    }
}

/// Name to callback maps consulted by components. First registration of a
/// name wins; later ones are logged and rejected.
#[derive(Default)]
pub struct Registries {
    tables: RefCell<Tables>,
}

impl Registries {
    /// Empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables holding only the built-in directives and methods.
    pub fn with_builtins() -> Self {
        let registries = Self::new();
        crate::directives::register_builtins(&registries);
        registries
    }

    /// Snapshot of the process-wide default tables.
    pub fn from_global() -> Self {
        let tables = match global_tables().read() {
            Ok(tables) => tables.clone(),
            Err(_) => {
                tracing::warn!("global registry is poisoned; using built-ins only");
                return Self::with_builtins();
            }
        };
        Self {
            tables: RefCell::new(tables),
        }
    }

    /// Register under `x-<name>`; `name` may already carry the prefix.
    pub fn register_directive(&self, name: &str, directive: Directive) -> Result<(), RegistryError> {
        self.tables.borrow_mut().add_directive(name, directive)
    }

    /// Register under `$<name>`; `name` may already carry the prefix.
    pub fn register_method(&self, name: &str, method: Method) -> Result<(), RegistryError> {
        self.tables.borrow_mut().add_method(name, method)
    }

    /// Callback registered under the full key, e.g. `x-show`.
    pub fn directive(&self, key: &str) -> Option<Directive> {
        self.tables.borrow().directives.get(key).copied()
    }

    pub fn has_directive(&self, key: &str) -> bool {
        self.tables.borrow().directives.contains_key(key)
    }

    pub fn method(&self, key: &str) -> Option<Method> {
        self.tables.borrow().methods.get(key).copied()
    }

    pub fn directive_names(&self) -> Vec<String> {
        self.tables.borrow().directives.keys().cloned().collect()
    }

    /// Every method with its full key, in registration order.
    pub fn methods(&self) -> Vec<(String, Method)> {
        self.tables
            .borrow()
            .methods
            .iter()
            .map(|(k, m)| (k.clone(), *m))
            .collect()
    }
}

static GLOBAL_REGISTRIES: OnceLock<RwLock<Tables>> = OnceLock::new();

fn global_tables() -> &'static RwLock<Tables> {
    GLOBAL_REGISTRIES.get_or_init(|| {
        let builtins = Registries::with_builtins();
        RwLock::new(builtins.tables.into_inner())
    })
}

/// Add a directive to the process-wide defaults. Components created from
/// [`Registries::from_global`] afterwards see it.
pub fn register_directive(name: &str, directive: Directive) -> Result<(), RegistryError> {
    let mut tables = global_tables()
        .write()
        .map_err(|_| RegistryError::Poisoned)?;
    tables.add_directive(name, directive)
}

pub fn register_method(name: &str, method: Method) -> Result<(), RegistryError> {
    let mut tables = global_tables()
        .write()
        .map_err(|_| RegistryError::Poisoned)?;
    tables.add_method(name, method)
}

pub fn unregister_directive(name: &str) -> bool {
    let Ok(key) = qualify(DIRECTIVE_NAMESPACE, name) else {
        return false;
    };
    if let Ok(mut tables) = global_tables().write() {
        return tables.directives.shift_remove(&key).is_some();
    }
    false
}

pub fn unregister_method(name: &str) -> bool {
    let Ok(key) = qualify(METHOD_NAMESPACE, name) else {
        return false;
    };
    if let Ok(mut tables) = global_tables().write() {
        return tables.methods.shift_remove(&key).is_some();
    }
    false
}
