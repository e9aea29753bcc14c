//! User-supplied page templates.
//!
//! Templates use minijinja syntax. The page context is a [`SchemaView`] of
//! the schema being documented, so `{{ entity_name }}`,
//! `{% for prop in properties %}` and friends work at the top level. The
//! Markdown text helpers are available as filters:
//! `underscore`, `pascalize`, `anchor`, `wrap_code`, `first_sentence` and
//! `table_cell`.

use std::path::Path;

use minijinja::Environment;
use serde::Serialize;
use serde_json::Value;

use crate::error::GenerateError;
use crate::markdown::{anchor, first_sentence, pascalize, table_cell, underscore, wrap_code};
use crate::render::{constraints, Renderer};
use crate::schema::SchemaId;

/// Template environment with the text helpers registered as filters.
pub fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_filter("underscore", |value: String| underscore(&value));
    env.add_filter("pascalize", |value: String| pascalize(&value));
    env.add_filter("anchor", |value: String| anchor(&value));
    env.add_filter("wrap_code", |value: String| wrap_code(&value));
    env.add_filter("first_sentence", |value: String| {
        first_sentence(&value).to_string()
    });
    env.add_filter("table_cell", |value: String| table_cell(&value));
    env
}

/// Everything a template can see about one schema node.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaView {
    pub key: Option<String>,
    pub title: Option<String>,
    pub entity_name: String,
    pub entity_link: String,
    pub gen_path: String,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub description_markdown: String,
    pub types: Vec<String>,
    pub type_info_markdown: String,
    pub deprecated: bool,
    pub enum_markdown: String,
    pub examples_markdown: String,
    /// `- **Label:** value` style facts (format, bounds, default, flags).
    pub constraints: Vec<String>,
    pub items: Option<Box<SchemaView>>,
    pub properties: Vec<MemberView>,
    pub definitions: Vec<MemberView>,
    pub one_of: Vec<SchemaView>,
    /// The raw keyword map, for anything not surfaced above.
    pub document: Value,
}

/// A named child: a property or a definition.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub name: String,
    /// Always false for definitions.
    pub required: bool,
    #[serde(flatten)]
    pub schema: SchemaView,
}

impl SchemaView {
    pub fn new(renderer: &Renderer<'_>, id: SchemaId) -> Self {
        let ctx = renderer.context();
        let schema = ctx.schema(id);

        let properties = schema
            .properties
            .iter()
            .map(|(name, child)| MemberView {
                name: name.to_string(),
                required: schema.required_key(name),
                schema: SchemaView::new(renderer, child),
            })
            .collect();
        let definitions = schema
            .definitions
            .iter()
            .map(|(name, child)| MemberView {
                name: name.to_string(),
                required: false,
                schema: SchemaView::new(renderer, child),
            })
            .collect();

        SchemaView {
            key: schema.key.clone(),
            title: schema.title.clone(),
            entity_name: schema.entity_name(),
            entity_link: renderer.entity_link(id),
            gen_path: renderer.gen_path(id),
            reference: schema.reference.clone(),
            description: schema.description.clone(),
            description_markdown: schema.description_markdown().to_string(),
            types: schema.types.iter().map(|t| t.to_string()).collect(),
            type_info_markdown: renderer.type_info_markdown(id),
            deprecated: schema.deprecated == Some(true),
            enum_markdown: schema.enum_markdown(),
            examples_markdown: schema.examples_markdown(),
            constraints: constraints(schema),
            items: schema
                .items
                .map(|items| Box::new(SchemaView::new(renderer, items))),
            properties,
            definitions,
            one_of: schema
                .one_of
                .iter()
                .map(|variant| SchemaView::new(renderer, *variant))
                .collect(),
            document: schema.document().clone(),
        }
    }
}

/// A page template loaded from disk or given inline.
#[derive(Debug, Clone)]
pub struct PageTemplate {
    name: String,
    source: String,
}

impl PageTemplate {
    /// Parse `source`, reporting syntax errors under `name`.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Result<Self, GenerateError> {
        let name = name.into();
        let source = source.into();
        environment()
            .template_from_str(&source)
            .map_err(|e| GenerateError::InvalidTemplate {
                name: name.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { name, source })
    }

    /// Read and parse the template at `path`.
    pub fn from_file(path: &Path) -> Result<Self, GenerateError> {
        let name = path.display().to_string();
        let invalid = |message: &str| GenerateError::InvalidTemplate {
            name: name.clone(),
            message: message.to_string(),
        };

        if !path.exists() {
            return Err(invalid("not found"));
        }
        if path.is_dir() {
            return Err(invalid("must not be a directory"));
        }
        let source = std::fs::read_to_string(path).map_err(|source| GenerateError::ReadTemplate {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(name, source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the page documenting `id`.
    pub fn render(&self, renderer: &Renderer<'_>, id: SchemaId) -> Result<String, GenerateError> {
        let view = SchemaView::new(renderer, id);
        environment()
            .render_str(&self.source, &view)
            .map_err(|source| GenerateError::RenderTemplate {
                template: self.name.clone(),
                page: view.gen_path.clone(),
                source,
            })
    }
}
