//! Markdown rendering of resolved schemas.

use std::fmt::Write as _;

use log::warn;
use minijinja::context;
use serde_json::Value;

use crate::context::Context;
use crate::error::GenerateError;
use crate::markdown::{anchor, first_sentence, table_cell, underscore, word_sequence, wrap_code};
use crate::schema::{Schema, SchemaId, Type};
use crate::template::environment;

/// Output file name pattern.
///
/// Supports two placeholders: `{name}` (the entity name, underscored) and
/// `{root}` (the root entity name, underscored). An empty pattern makes
/// every link page-local.
///
/// A pattern containing `{{` or `{%` is a template instead, rendered with
/// `name`, `root`, `entity_name` and `root_name` in scope and the
/// page template filters available, e.g.
/// `{{ entity_name | underscore }}.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    pattern: String,
    template: bool,
}

impl Default for FileNaming {
    fn default() -> Self {
        Self {
            pattern: "{name}.md".to_string(),
            template: false,
        }
    }
}

impl FileNaming {
    pub fn new(pattern: impl Into<String>) -> Result<Self, GenerateError> {
        let pattern = pattern.into();
        let invalid = |message: &str| GenerateError::InvalidPattern {
            pattern: pattern.clone(),
            message: message.to_string(),
        };

        if pattern.contains("{{") || pattern.contains("{%") {
            // Rendering once with sample names surfaces syntax errors and
            // unknown filters up front.
            environment()
                .render_str(&pattern, naming_context("Sample", "Sample"))
                .map_err(|e| invalid(&e.to_string()))?;
            return Ok(Self {
                pattern,
                template: true,
            });
        }

        let mut rest = pattern.as_str();
        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(invalid("unmatched '}'"));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            match &after[..close] {
                "name" | "root" => {}
                other => {
                    return Err(invalid(&format!(
                        "unknown placeholder {{{}}}, expected {{name}} or {{root}}",
                        other
                    )))
                }
            }
            rest = &after[close + 1..];
        }

        Ok(Self {
            pattern,
            template: false,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// File name for the entity `entity_name` documented under the root
    /// entity `root_name`.
    pub fn apply(&self, entity_name: &str, root_name: &str) -> String {
        if !self.template {
            return self
                .pattern
                .replace("{name}", &underscore(entity_name))
                .replace("{root}", &underscore(root_name));
        }

        match environment().render_str(&self.pattern, naming_context(entity_name, root_name)) {
            Ok(path) => path,
            Err(e) => {
                warn!("cannot render file name for {}: {}", entity_name, e);
                format!("{}.md", underscore(entity_name))
            }
        }
    }
}

fn naming_context(entity_name: &str, root_name: &str) -> minijinja::Value {
    context! {
        name => underscore(entity_name),
        root => underscore(root_name),
        entity_name => entity_name,
        root_name => root_name,
    }
}

/// Renders schemas held by a [`Context`] into Markdown.
pub struct Renderer<'a> {
    ctx: &'a Context,
    naming: &'a FileNaming,
}

impl<'a> Renderer<'a> {
    pub fn new(ctx: &'a Context, naming: &'a FileNaming) -> Self {
        Self { ctx, naming }
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    fn schema(&self, id: SchemaId) -> &'a Schema {
        self.ctx.schema(id)
    }

    /// Output path of the page documenting `id`, relative to the output dir.
    pub fn gen_path(&self, id: SchemaId) -> String {
        let name = self.schema(id).entity_name();
        let root = self.schema(self.ctx.root(id)).entity_name();
        self.naming.apply(&name, &root)
    }

    pub fn entity_link(&self, id: SchemaId) -> String {
        format!(
            "{}#{}",
            self.gen_path(id),
            anchor(&self.schema(id).entity_name())
        )
    }

    /// One entry per declared type: `(type, schema describing it)`.
    ///
    /// Arrays point at their `items`, objects at the node itself.
    pub fn type_info(&self, id: SchemaId) -> Vec<(Type, Option<SchemaId>)> {
        let schema = self.schema(id);
        schema
            .types
            .iter()
            .map(|t| match t {
                Type::Array => (*t, schema.items),
                Type::Object => (*t, Some(id)),
                _ => (*t, None),
            })
            .collect()
    }

    pub fn type_info_markdown(&self, id: SchemaId) -> String {
        self.type_info(id)
            .into_iter()
            .map(|(t, target)| self.type_markdown(t, target))
            .collect::<Vec<_>>()
            .join(" &#124; ")
    }

    fn type_markdown(&self, t: Type, target: Option<SchemaId>) -> String {
        let Some(target) = target else {
            return t.to_string();
        };
        match t {
            Type::Array => match self.schema(target).types.len() {
                0 => t.to_string(),
                1 => format!("{}[]", self.type_info_markdown(target)),
                _ => format!("({})[]", self.type_info_markdown(target)),
            },
            Type::Object => {
                let name = self.schema(target).entity_name();
                if name.is_empty() {
                    t.to_string()
                } else {
                    format!("[{}]({})", name, self.entity_link(target))
                }
            }
            _ => t.to_string(),
        }
    }

    /// Short label for a variant in a `oneOf` list.
    fn variant_markdown(&self, id: SchemaId) -> String {
        let schema = self.schema(id);
        let name = schema.entity_name();
        if !name.is_empty() && (schema.types.is_empty() || schema.types.contains(&Type::Object)) {
            return format!("[{}]({})", name, self.entity_link(id));
        }
        match self.type_info_markdown(id) {
            info if info.is_empty() => "any value".to_string(),
            info => info,
        }
    }

    /// Render the full documentation page for `id`.
    pub fn render(&self, id: SchemaId) -> String {
        let schema = self.schema(id);
        let mut out = String::new();

        let name = schema.entity_name();
        let _ = writeln!(out, "# {}\n", if name.is_empty() { "Schema" } else { name.as_str() });

        let description = schema.description_markdown();
        if !description.is_empty() {
            let _ = writeln!(out, "{}\n", description.trim());
        }
        if !schema.types.is_empty() {
            let _ = writeln!(out, "**Type:** {}\n", self.type_info_markdown(id));
        }
        if schema.deprecated == Some(true) {
            let _ = writeln!(out, "**Deprecated**\n");
        }

        let enum_markdown = schema.enum_markdown();
        if !enum_markdown.is_empty() {
            let _ = writeln!(out, "## Allowed values\n\n{}\n", enum_markdown);
        }

        if !schema.one_of.is_empty() {
            let variants: Vec<String> = schema
                .one_of
                .iter()
                .map(|v| self.variant_markdown(*v))
                .collect();
            let _ = writeln!(out, "One of {}.\n", word_sequence(&variants, "or"));
        }

        let examples = schema.examples_markdown();
        if !examples.is_empty() {
            let _ = writeln!(out, "## Examples\n\n{}\n", examples);
        }

        if !schema.properties.is_empty() {
            self.render_properties(schema, &mut out);
        }

        format!("{}\n", out.trim_end())
    }

    fn render_properties(&self, schema: &Schema, out: &mut String) {
        let _ = writeln!(out, "## Properties\n");
        let _ = writeln!(out, "| Property | Type | Required | Description |");
        let _ = writeln!(out, "| --- | --- | --- | --- |");
        for (key, prop) in schema.properties.iter() {
            let _ = writeln!(
                out,
                "| [{}](#{}) | {} | {} | {} |",
                wrap_code(key),
                anchor(key),
                table_cell(&self.type_info_markdown(prop)),
                if schema.required_key(key) { "yes" } else { "no" },
                table_cell(first_sentence(self.schema(prop).description_markdown())),
            );
        }
        let _ = writeln!(out);

        for (key, prop) in schema.properties.iter() {
            self.render_property(key, prop, schema.required_key(key), out);
        }
    }

    fn render_property(&self, key: &str, id: SchemaId, required: bool, out: &mut String) {
        let prop = self.schema(id);
        let _ = writeln!(out, "### {}\n", wrap_code(key));

        let description = prop.description_markdown();
        if !description.is_empty() {
            let _ = writeln!(out, "{}\n", description.trim());
        }

        let mut facts: Vec<String> = Vec::new();
        let type_info = self.type_info_markdown(id);
        if !type_info.is_empty() {
            facts.push(format!("**Type:** {}", type_info));
        }
        facts.push(format!("**Required:** {}", if required { "yes" } else { "no" }));
        facts.extend(constraints(prop));

        for fact in facts {
            let _ = writeln!(out, "- {}", fact);
        }
        let _ = writeln!(out);

        let enum_markdown = prop.enum_markdown();
        if !enum_markdown.is_empty() {
            let _ = writeln!(out, "Allowed values:\n\n{}\n", enum_markdown);
        }
        let examples = prop.examples_markdown();
        if !examples.is_empty() {
            let _ = writeln!(out, "Examples:\n\n{}\n", examples);
        }
    }
}

/// Validation keywords worth showing next to a property.
pub(crate) fn constraints(schema: &Schema) -> Vec<String> {
    let mut facts = Vec::new();
    let mut push = |label: &str, value: String| facts.push(format!("**{}:** {}", label, value));

    if let Some(format) = &schema.format {
        push("Format", wrap_code(format));
    }
    if let Some(pattern) = &schema.pattern {
        push("Pattern", wrap_code(pattern));
    }
    for (label, value) in [("Minimum", schema.minimum), ("Maximum", schema.maximum)] {
        if let Some(value) = value {
            push(label, value.to_string());
        }
    }
    for (label, value) in [
        ("Exclusive minimum", &schema.exclusive_minimum),
        ("Exclusive maximum", &schema.exclusive_maximum),
    ] {
        if let Some(value) = value {
            push(label, value.to_string());
        }
    }
    if let Some(value) = schema.multiple_of {
        push("Multiple of", value.to_string());
    }
    for (label, value) in [
        ("Min length", schema.min_length),
        ("Max length", schema.max_length),
        ("Min items", schema.min_items),
        ("Max items", schema.max_items),
        ("Min properties", schema.min_properties),
        ("Max properties", schema.max_properties),
    ] {
        if let Some(value) = value {
            push(label, value.to_string());
        }
    }
    if schema.unique_items == Some(true) {
        push("Unique items", "yes".to_string());
    }
    if let Some(default) = &schema.default {
        push("Default", wrap_code(&default.to_string()));
    }
    if let Some(Value::Bool(false)) = &schema.additional_properties {
        push("Additional properties", "not allowed".to_string());
    }

    for (flag, label) in [
        (schema.deprecated, "Deprecated"),
        (schema.read_only, "Read only"),
        (schema.write_only, "Write only"),
    ] {
        if flag == Some(true) {
            facts.push(format!("**{}**", label));
        }
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderRegistry;
    use serde_json::json;

    fn local() -> FileNaming {
        FileNaming::new("").unwrap()
    }

    #[test]
    fn file_naming_patterns() {
        assert_eq!(FileNaming::default().apply("my_schema", "root"), "my_schema.md");
        assert_eq!(
            FileNaming::new("{root}/{name}.md").unwrap().apply("sub", "root"),
            "root/sub.md"
        );
        assert!(FileNaming::new("{title}.md").is_err());
        assert!(FileNaming::new("{name.md").is_err());
        assert!(FileNaming::new("name}.md").is_err());
    }

    #[test]
    fn file_naming_templates() {
        let naming = FileNaming::new("{{ entity_name | underscore }}.md").unwrap();
        assert_eq!(naming.apply("MySchema", "Root"), "my_schema.md");

        let naming = FileNaming::new("{{ root }}/{{ entity_name | anchor }}.markdown").unwrap();
        assert_eq!(naming.apply("Sub Schema", "RootSchema"), "root_schema/sub-schema.markdown");

        let err = FileNaming::new("{{ name | nosuchfilter }}.md").unwrap_err();
        assert!(matches!(err, GenerateError::InvalidPattern { .. }));
        assert!(FileNaming::new("{{ name .md").is_err());
    }

    #[test]
    fn gen_path_uses_underscored_title() {
        let mut ctx = Context::with_loaders(LoaderRegistry::empty());
        let id = ctx.insert(Schema {
            title: Some("MySchema".into()),
            ..Schema::default()
        });
        let naming = FileNaming::default();
        assert_eq!(Renderer::new(&ctx, &naming).gen_path(id), "my_schema.md");
    }

    #[test]
    fn entity_links_share_root_page() {
        let mut ctx = Context::with_loaders(LoaderRegistry::empty());
        let root = ctx.insert(Schema {
            title: Some("RootSchema".into()),
            ..Schema::default()
        });
        let sub = ctx.insert(Schema {
            title: Some("SubSchema".into()),
            ..Schema::default()
        });
        ctx.schema_mut(sub).parent = Some(root);

        let naming = FileNaming::new("{root}.md").unwrap();
        let renderer = Renderer::new(&ctx, &naming);
        assert_eq!(renderer.entity_link(root), "root_schema.md#rootschema");
        assert_eq!(renderer.entity_link(sub), "root_schema.md#subschema");
    }

    #[test]
    fn type_info_markdown() {
        let mut ctx = Context::with_loaders(LoaderRegistry::empty());
        let root = ctx.insert(Schema {
            title: Some("RootSchema".into()),
            types: vec![Type::Object, Type::Null],
            ..Schema::default()
        });
        let naming = local();
        assert_eq!(
            Renderer::new(&ctx, &naming).type_info_markdown(root),
            "[RootSchema](#rootschema) &#124; null"
        );

        let items = ctx.insert(Schema {
            title: Some("SubSchema".into()),
            types: vec![Type::Object],
            ..Schema::default()
        });
        let list = ctx.insert(Schema {
            title: Some("RootSchema".into()),
            types: vec![Type::Array, Type::Object, Type::Null],
            items: Some(items),
            ..Schema::default()
        });
        assert_eq!(
            Renderer::new(&ctx, &naming).type_info_markdown(list),
            "[SubSchema](#subschema)[] &#124; [RootSchema](#rootschema) &#124; null"
        );
    }

    #[test]
    fn type_markdown_variants() {
        let mut ctx = Context::with_loaders(LoaderRegistry::empty());
        let untyped = ctx.insert(Schema::default());
        let mixed = ctx.insert(Schema {
            types: vec![Type::String, Type::Number],
            ..Schema::default()
        });
        let anonymous = ctx.insert(Schema::default());
        let naming = local();
        let renderer = Renderer::new(&ctx, &naming);

        assert_eq!(renderer.type_markdown(Type::Array, None), "array");
        assert_eq!(renderer.type_markdown(Type::Array, Some(untyped)), "array");
        assert_eq!(
            renderer.type_markdown(Type::Array, Some(mixed)),
            "(string &#124; number)[]"
        );
        assert_eq!(renderer.type_markdown(Type::Object, Some(anonymous)), "object");
    }

    #[test]
    fn render_page() {
        let mut ctx = Context::with_loaders(LoaderRegistry::empty());
        let bytes = serde_json::to_vec(&json!({
            "title": "Person",
            "description": "A human being. Possibly fictional.",
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Full name. Given name first.",
                    "minLength": 1,
                    "examples": ["Ada"]
                },
                "kind": { "enum": ["a", "b"], "enumDescriptions": ["first"] }
            }
        }))
        .unwrap();
        let root = ctx.parse_document(&bytes, "mem.json").unwrap();

        let naming = FileNaming::default();
        let page = Renderer::new(&ctx, &naming).render(root);

        assert!(page.starts_with("# Person\n\nA human being. Possibly fictional.\n"));
        assert!(page.contains("**Type:** [Person](person.md#person)"));
        assert!(page.contains("| [`name`](#name) | string | yes | Full name. |"));
        assert!(page.contains("| [`kind`](#kind) |  | no |  |"));
        assert!(page.contains("### `name`"));
        assert!(page.contains("- **Min length:** 1"));
        assert!(page.contains("```yaml\nname: Ada\n```"));
        assert!(page.contains("- `\"a\"`: first\n- `\"b\"`"));
        assert!(page.ends_with("- `\"b\"`\n"));
    }

    #[test]
    fn render_one_of_summary() {
        let mut ctx = Context::with_loaders(LoaderRegistry::empty());
        let bytes = serde_json::to_vec(&json!({
            "title": "Shape",
            "oneOf": [
                { "title": "Circle", "type": "object" },
                { "title": "Square", "type": "object" },
                { "type": "null" }
            ]
        }))
        .unwrap();
        let root = ctx.parse_document(&bytes, "mem.json").unwrap();

        let naming = FileNaming::default();
        let page = Renderer::new(&ctx, &naming).render(root);
        assert!(page.contains(
            "One of [Circle](circle.md#circle), [Square](square.md#square), or null."
        ));
    }
}
