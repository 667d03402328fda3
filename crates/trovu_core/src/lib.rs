pub mod diagnostics;
pub mod env;
pub mod fetch;
pub mod fragment;
pub mod namespaces;
pub mod settings;
pub mod shortcuts;

pub use diagnostics::Diagnostic;
pub use env::{EnvParams, Environment, Resolution, Resolver};
pub use fetch::{CacheMode, HttpFetcher, ShortcutFetch};
pub use namespaces::{Namespace, NamespaceKind, NamespaceRef};
pub use settings::{Settings, load_settings};
pub use shortcuts::{Shortcut, ShortcutKey};
