//! JSON Schema documentation generator
//!
//! Loads JSON Schema documents (from files or over HTTP), resolves every
//! `$ref` into a private, merged copy of its target, and renders the result
//! as cross-linked Markdown, either with the built-in layout or through a
//! user-supplied [`PageTemplate`].
//!
//! # Example
//!
//! ```
//! use schemadoc::{Context, FileNaming, LoaderRegistry, Renderer};
//!
//! let mut ctx = Context::with_loaders(LoaderRegistry::empty());
//! let root = ctx
//!     .parse_document(
//!         br#"{"title": "Widget", "type": "object", "properties": {"id": {"type": "string"}}}"#,
//!         "widget.json",
//!     )
//!     .unwrap();
//!
//! let naming = FileNaming::default();
//! let page = Renderer::new(&ctx, &naming).render(root);
//! assert!(page.starts_with("# Widget"));
//! assert!(page.contains("| [`id`](#id) | string | no |  |"));
//! ```
//!
//! # Resolution
//!
//! | Step | Behavior |
//! |------|----------|
//! | Cached reference | Returned as-is (same [`SchemaId`]) |
//! | `base#/pointer`, base cached | Sub-schema derived from the base's raw document |
//! | Unknown document | Loaded, cached by retrieval URI and base URI, then walked |
//! | `$ref` during the walk | Target cloned, local keywords merged over the clone |
//!
//! Only `items`, `definitions`, `properties` and `oneOf` are walked.

mod config;
mod context;
mod error;
mod generate;
mod loader;
mod logging;
mod markdown;
mod render;
mod schema;
mod template;

pub use config::{config_path, Config, ConfigPath, LogLevel, CONFIG_PATH_DEFAULT, CONFIG_PATH_ENV};
pub use context::Context;
pub use error::{ConfigError, GenerateError, LoadError, ResolveError};
pub use generate::{discover_schemas, generate, GenerateOptions};
pub use loader::{location_url, CachedLoader, FileLoader, Loader, LoaderRegistry};
pub use logging::{init as init_logging, level_for};
pub use markdown::{anchor, first_sentence, pascalize, table_cell, underscore, word_sequence, wrap_code};
pub use render::{FileNaming, Renderer};
pub use schema::{parse_types, Members, Schema, SchemaId, Type};
pub use template::{environment as template_environment, MemberView, PageTemplate, SchemaView};

#[cfg(feature = "remote")]
pub use loader::HttpLoader;
