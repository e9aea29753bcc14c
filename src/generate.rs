//! Documentation generation run: discover schema files, resolve, render, write.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::context::Context;
use crate::error::GenerateError;
use crate::render::{FileNaming, Renderer};
use crate::schema::SchemaId;
use crate::template::PageTemplate;

const SCHEMA_SUFFIX: &str = ".schema.json";

/// Options for [`generate`].
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// A schema file, or a directory holding `*.schema.json` files.
    pub input: PathBuf,
    pub out_dir: PathBuf,
    pub naming: FileNaming,
    /// Page template; the built-in layout when unset.
    pub template: Option<PageTemplate>,
}

impl GenerateOptions {
    pub fn new(input: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            out_dir: out_dir.into(),
            naming: FileNaming::default(),
            template: None,
        }
    }

    pub fn naming(mut self, naming: FileNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn template(mut self, template: PageTemplate) -> Self {
        self.template = Some(template);
        self
    }
}

/// Schema documents named by `path`.
///
/// A directory yields every `*.schema.json` directly inside it, sorted. A
/// file yields itself regardless of its name.
pub fn discover_schemas(path: &Path) -> Result<Vec<PathBuf>, GenerateError> {
    if !path.exists() {
        return Err(GenerateError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = std::fs::read_dir(path).map_err(|source| GenerateError::ReadInput {
        path: path.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_schema_file(p))
        .collect();
    files.sort();
    Ok(files)
}

fn is_schema_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(SCHEMA_SUFFIX) && n.len() > SCHEMA_SUFFIX.len())
        .unwrap_or(false)
}

/// File name without `.schema.json` (or without its last extension).
fn document_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    match name.strip_suffix(SCHEMA_SUFFIX) {
        Some(stem) if !stem.is_empty() => Some(stem.to_string()),
        _ => path.file_stem()?.to_str().map(str::to_string),
    }
}

/// Generate one Markdown page per root schema and per root definition.
///
/// Every input document is resolved in its own [`Context`]. Returns the
/// paths written, in generation order.
pub fn generate(options: &GenerateOptions) -> Result<Vec<PathBuf>, GenerateError> {
    let inputs = discover_schemas(&options.input)?;
    debug!(
        "generating {} document(s) into {}",
        inputs.len(),
        options.out_dir.display()
    );

    std::fs::create_dir_all(&options.out_dir).map_err(|source| GenerateError::WriteOutput {
        path: options.out_dir.clone(),
        source,
    })?;

    let mut written = Vec::new();
    for input in &inputs {
        let absolute = if input.is_absolute() {
            input.clone()
        } else {
            std::env::current_dir()
                .map_err(|source| GenerateError::ReadInput {
                    path: input.clone(),
                    source,
                })?
                .join(input)
        };

        let mut ctx = Context::new();
        let root = ctx.get(&absolute.to_string_lossy())?;
        name_untitled_root(&mut ctx, root, &absolute);

        let definitions: Vec<SchemaId> = ctx
            .schema(root)
            .definitions
            .iter()
            .map(|(_, id)| id)
            .collect();

        let renderer = Renderer::new(&ctx, &options.naming);
        for id in std::iter::once(root).chain(definitions) {
            let page = match &options.template {
                Some(template) => template.render(&renderer, id)?,
                None => renderer.render(id),
            };
            written.push(write_page(&renderer, id, &page, &options.out_dir)?);
        }
    }
    Ok(written)
}

fn name_untitled_root(ctx: &mut Context, root: SchemaId, path: &Path) {
    let schema = ctx.schema_mut(root);
    let untitled = schema.title.as_deref().map_or(true, str::is_empty)
        && schema.key.as_deref().map_or(true, str::is_empty);
    if untitled {
        schema.key = document_stem(path);
    }
}

fn write_page(
    renderer: &Renderer<'_>,
    id: SchemaId,
    page: &str,
    out_dir: &Path,
) -> Result<PathBuf, GenerateError> {
    let path = out_dir.join(renderer.gen_path(id));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| GenerateError::WriteOutput {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(&path, page).map_err(|source| GenerateError::WriteOutput {
        path: path.clone(),
        source,
    })?;
    info!("wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discover_directory_sorted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.schema.json"), "{}").unwrap();
        fs::write(dir.path().join("a.schema.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("nested.schema.json")).unwrap();

        let files = discover_schemas(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.schema.json", "b.schema.json"]);
    }

    #[test]
    fn discover_single_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.json");
        fs::write(&file, "{}").unwrap();
        assert_eq!(discover_schemas(&file).unwrap(), vec![file]);
    }

    #[test]
    fn discover_missing_path() {
        let err = discover_schemas(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, GenerateError::InputNotFound { .. }));
        assert!(err.to_string().starts_with("'--in'"));
    }

    #[test]
    fn document_stems() {
        assert_eq!(
            document_stem(Path::new("dir/person.schema.json")).as_deref(),
            Some("person")
        );
        assert_eq!(document_stem(Path::new("plain.json")).as_deref(), Some("plain"));
    }

    #[test]
    fn generate_root_and_definitions() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("shop.schema.json");
        fs::write(
            &input,
            r##"{
                "type": "object",
                "properties": { "item": { "$ref": "#/definitions/item" } },
                "definitions": {
                    "item": { "type": "object", "description": "A thing for sale." }
                }
            }"##,
        )
        .unwrap();
        let out = dir.path().join("out");

        let written = generate(&GenerateOptions::new(&input, &out)).unwrap();
        assert_eq!(written, vec![out.join("shop.md"), out.join("item.md")]);

        let page = fs::read_to_string(out.join("shop.md")).unwrap();
        assert!(page.starts_with("# Shop\n"));
        assert!(page.contains("[Item](item.md#item)"));
        assert!(fs::read_to_string(out.join("item.md"))
            .unwrap()
            .contains("A thing for sale."));
    }

    #[test]
    fn generate_with_template() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("shop.schema.json");
        fs::write(
            &input,
            r#"{"title": "Shop", "definitions": {"item": {"title": "Item"}}}"#,
        )
        .unwrap();
        let out = dir.path().join("out");

        let template = PageTemplate::new("inline", "Custom page for {{ entity_name }}\n").unwrap();
        let naming = FileNaming::new("{{ entity_name | underscore }}.txt").unwrap();
        let options = GenerateOptions::new(&input, &out).naming(naming).template(template);

        let written = generate(&options).unwrap();
        assert_eq!(written, vec![out.join("shop.txt"), out.join("item.txt")]);
        assert_eq!(
            fs::read_to_string(out.join("item.txt")).unwrap(),
            "Custom page for Item\n"
        );
    }

    #[test]
    fn generate_reports_resolution_errors() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("broken.schema.json");
        fs::write(&input, r##"{"properties": {"a": {"$ref": "#/definitions/missing"}}}"##).unwrap();

        let err = generate(&GenerateOptions::new(&input, dir.path().join("out"))).unwrap_err();
        assert!(matches!(err, GenerateError::Resolve(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
