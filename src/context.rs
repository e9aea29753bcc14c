//! The resolution context: a schema arena plus a URI-keyed cache.
//!
//! A [`Context`] owns every [`Schema`] it parses. Callers ask for a schema by
//! location with [`Context::get`]; the context loads the document through its
//! [`LoaderRegistry`], caches it under both its retrieval URI and its base
//! URI, then walks the tree replacing every `$ref` with a private, merged copy
//! of its target.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::error::ResolveError;
use crate::loader::{location_url, LoaderRegistry};
use crate::schema::{json_type_name, Members, Schema, SchemaId};

/// Schema arena and reference cache for one document graph.
#[derive(Debug)]
pub struct Context {
    nodes: Vec<Schema>,
    schemas: HashMap<String, SchemaId>,
    expanding: HashSet<String>,
    loaders: LoaderRegistry,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a context with the default loaders (files, plus HTTP with the
    /// `remote` feature).
    pub fn new() -> Self {
        Self::with_loaders(LoaderRegistry::with_defaults())
    }

    pub fn with_loaders(loaders: LoaderRegistry) -> Self {
        Self {
            nodes: Vec::new(),
            schemas: HashMap::new(),
            expanding: HashSet::new(),
            loaders,
        }
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    pub fn loaders_mut(&mut self) -> &mut LoaderRegistry {
        &mut self.loaders
    }

    /// Borrow a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this context.
    pub fn schema(&self, id: SchemaId) -> &Schema {
        &self.nodes[id.0]
    }

    pub fn schema_mut(&mut self, id: SchemaId) -> &mut Schema {
        &mut self.nodes[id.0]
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node built outside the parser.
    ///
    /// A node without a raw document gets one generated from its fields, so
    /// it can take part in merges like a parsed node.
    pub fn insert(&mut self, schema: Schema) -> SchemaId {
        let id = self.push(schema);
        if self.nodes[id.0].document.is_null() {
            self.nodes[id.0].document = self.to_document(id);
        }
        id
    }

    fn push(&mut self, schema: Schema) -> SchemaId {
        let id = SchemaId(self.nodes.len());
        self.nodes.push(schema);
        id
    }

    /// Get the schema at `reference`, loading and resolving it on first use.
    ///
    /// `reference` is an absolute URI or a filesystem path, optionally with
    /// a `#fragment` JSON pointer. Repeated calls with the same normalized
    /// reference return the same [`SchemaId`].
    pub fn get(&mut self, reference: &str) -> Result<SchemaId, ResolveError> {
        let url = location_url(reference)?;
        let key = url.to_string();

        if let Some(id) = self.lookup(&key) {
            debug!("cache hit for {}", key);
            return Ok(id);
        }

        let fragment = url
            .fragment()
            .map(|f| percent_decode_str(f).decode_utf8_lossy().into_owned())
            .unwrap_or_default();
        let mut base = url;
        base.set_fragment(None);

        let root = match self.lookup(base.as_str()) {
            Some(root) => root,
            None => self.load_root(&base)?,
        };
        if fragment.is_empty() {
            return Ok(root);
        }

        debug!("deriving {} from {}", fragment, base);
        let id = self.parse_sub_schema(root, &fragment)?;
        self.store(&key, id);
        Ok(id)
    }

    /// Cached schema for an already normalized URI, if any.
    pub fn lookup(&self, uri: &str) -> Option<SchemaId> {
        self.schemas.get(uri).copied()
    }

    fn store(&mut self, uri: &str, id: SchemaId) {
        self.schemas.insert(uri.to_string(), id);
    }

    fn load_root(&mut self, url: &Url) -> Result<SchemaId, ResolveError> {
        debug!("loading {}", url);
        let bytes = self
            .loaders
            .load(url)
            .map_err(|source| ResolveError::Load {
                uri: url.to_string(),
                source,
            })?;

        let root = self.parse_document(&bytes, url.as_str())?;
        self.nodes[root.0].retrieval_uri = Some(url.to_string());

        // Both keys must be cached before resolving, or refs back into this
        // document would load it again.
        self.store(url.as_str(), root);
        if let Some(base) = self.nodes[root.0].base_uri() {
            self.store(base.as_str(), root);
        }

        if let Err(e) = self.resolve_sub_schemas(root) {
            self.evict(root);
            return Err(e);
        }
        Ok(root)
    }

    /// Drop every cache entry that belongs to the document rooted at `root`,
    /// including fragments derived from it.
    fn evict(&mut self, root: SchemaId) {
        let nodes = &self.nodes;
        self.schemas.retain(|uri, id| {
            let stale = root_of(nodes, *id) == root;
            if stale {
                debug!("evicting {}", uri);
            }
            !stale
        });
    }

    /// Parse raw bytes into a new root node. `uri` is used in error messages.
    pub fn parse_document(&mut self, bytes: &[u8], uri: &str) -> Result<SchemaId, ResolveError> {
        let document: Value =
            serde_json::from_slice(bytes).map_err(|source| ResolveError::InvalidJson {
                uri: uri.to_string(),
                source,
            })?;
        self.parse_value(&document, None, uri, "")
    }

    fn parse_value(
        &mut self,
        document: &Value,
        parent: Option<SchemaId>,
        uri: &str,
        pointer: &str,
    ) -> Result<SchemaId, ResolveError> {
        let invalid = |message: String| ResolveError::InvalidSchema {
            location: format!("{}#{}", uri, pointer),
            message,
        };

        let mut schema = match document {
            Value::Object(_) => {
                Schema::deserialize(document).map_err(|e| invalid(e.to_string()))?
            }
            Value::Bool(_) => Schema::default(),
            other => {
                return Err(invalid(format!(
                    "expected object or boolean, got {}",
                    json_type_name(other)
                )))
            }
        };
        schema.parent = parent;
        schema.document = document.clone();
        let id = self.push(schema);

        let Value::Object(map) = document else {
            return Ok(id);
        };

        for (keyword, value) in map {
            let at = format!("{}/{}", pointer, escape_token(keyword));
            match keyword.as_str() {
                "items" => match value {
                    Value::Array(list) => {
                        let ids = self.parse_list(list, id, uri, &at)?;
                        self.nodes[id.0].prefix_items = ids;
                    }
                    _ => {
                        let child = self.parse_value(value, Some(id), uri, &at)?;
                        self.nodes[id.0].items = Some(child);
                    }
                },
                "prefixItems" => {
                    let ids = self.parse_array(value, id, uri, &at)?;
                    self.nodes[id.0].prefix_items = ids;
                }
                "allOf" => {
                    let ids = self.parse_array(value, id, uri, &at)?;
                    self.nodes[id.0].all_of = ids;
                }
                "anyOf" => {
                    let ids = self.parse_array(value, id, uri, &at)?;
                    self.nodes[id.0].any_of = ids;
                }
                "oneOf" => {
                    let ids = self.parse_array(value, id, uri, &at)?;
                    self.nodes[id.0].one_of = ids;
                }
                "not" => {
                    let ids = match value {
                        Value::Array(list) => self.parse_list(list, id, uri, &at)?,
                        _ => vec![self.parse_value(value, Some(id), uri, &at)?],
                    };
                    self.nodes[id.0].not = ids;
                }
                "propertyNames" => {
                    let child = self.parse_value(value, Some(id), uri, &at)?;
                    self.nodes[id.0].property_names = Some(child);
                }
                "contains" => {
                    let child = self.parse_value(value, Some(id), uri, &at)?;
                    self.nodes[id.0].contains = Some(child);
                }
                "if" => {
                    let child = self.parse_value(value, Some(id), uri, &at)?;
                    self.nodes[id.0].if_schema = Some(child);
                }
                "then" => {
                    let child = self.parse_value(value, Some(id), uri, &at)?;
                    self.nodes[id.0].then_schema = Some(child);
                }
                "else" => {
                    let child = self.parse_value(value, Some(id), uri, &at)?;
                    self.nodes[id.0].else_schema = Some(child);
                }
                "properties" => {
                    let members = self.parse_members(value, id, uri, &at)?;
                    self.nodes[id.0].properties = members;
                }
                "patternProperties" => {
                    let members = self.parse_members(value, id, uri, &at)?;
                    self.nodes[id.0].pattern_properties = members;
                }
                "definitions" | "$defs" => {
                    let members = self.parse_members(value, id, uri, &at)?;
                    self.nodes[id.0].definitions = members;
                }
                _ => {}
            }
        }

        Ok(id)
    }

    fn parse_array(
        &mut self,
        value: &Value,
        parent: SchemaId,
        uri: &str,
        pointer: &str,
    ) -> Result<Vec<SchemaId>, ResolveError> {
        match value {
            Value::Array(list) => self.parse_list(list, parent, uri, pointer),
            other => Err(ResolveError::InvalidSchema {
                location: format!("{}#{}", uri, pointer),
                message: format!("expected array, got {}", json_type_name(other)),
            }),
        }
    }

    fn parse_list(
        &mut self,
        list: &[Value],
        parent: SchemaId,
        uri: &str,
        pointer: &str,
    ) -> Result<Vec<SchemaId>, ResolveError> {
        list.iter()
            .enumerate()
            .map(|(idx, value)| {
                self.parse_value(value, Some(parent), uri, &format!("{}/{}", pointer, idx))
            })
            .collect()
    }

    fn parse_members(
        &mut self,
        value: &Value,
        parent: SchemaId,
        uri: &str,
        pointer: &str,
    ) -> Result<Members, ResolveError> {
        let Value::Object(map) = value else {
            return Err(ResolveError::InvalidSchema {
                location: format!("{}#{}", uri, pointer),
                message: format!("expected object, got {}", json_type_name(value)),
            });
        };

        let mut members = Members::new();
        for (name, child) in map {
            let at = format!("{}/{}", pointer, escape_token(name));
            let id = self.parse_value(child, Some(parent), uri, &at)?;
            self.nodes[id.0].key = Some(name.clone());
            members.insert(name.clone(), id);
        }
        Ok(members)
    }

    /// Derive the sub-schema at JSON `pointer` within `id`'s raw document.
    ///
    /// The new node's parent is `id` and its key is the pointer's last
    /// segment. An empty pointer returns `id` itself.
    pub fn parse_sub_schema(&mut self, id: SchemaId, pointer: &str) -> Result<SchemaId, ResolveError> {
        if pointer.is_empty() {
            return Ok(id);
        }
        if !pointer.starts_with('/') {
            return Err(ResolveError::InvalidPointer {
                pointer: pointer.to_string(),
            });
        }

        let uri = self.nodes[self.root(id).0]
            .retrieval_uri
            .clone()
            .unwrap_or_default();
        let document = match self.nodes[id.0].document.pointer(pointer) {
            Some(document) => document.clone(),
            None => {
                return Err(ResolveError::PointerNotFound {
                    uri,
                    pointer: pointer.to_string(),
                })
            }
        };

        let sub = self.parse_value(&document, Some(id), &uri, pointer)?;
        let key = pointer.rsplit('/').next().map(unescape_token);
        self.nodes[sub.0].key = key;
        Ok(sub)
    }

    /// Walk `items`, `definitions`, `properties` and `oneOf` of `id`,
    /// replacing every `$ref` child with its resolved copy.
    pub fn resolve_sub_schemas(&mut self, id: SchemaId) -> Result<(), ResolveError> {
        if let Some(items) = self.nodes[id.0].items {
            let resolved = self.resolve_child(id, items, None)?;
            self.nodes[id.0].items = Some(resolved);
        }

        let definitions = member_list(&self.nodes[id.0].definitions);
        for (key, child) in definitions {
            let resolved = self.resolve_child(id, child, Some(&key))?;
            self.nodes[id.0].definitions.insert(key, resolved);
        }

        let properties = member_list(&self.nodes[id.0].properties);
        for (key, child) in properties {
            let resolved = self.resolve_child(id, child, Some(&key))?;
            self.nodes[id.0].properties.insert(key, resolved);
        }

        let one_of = self.nodes[id.0].one_of.clone();
        for (idx, child) in one_of.into_iter().enumerate() {
            let resolved = self.resolve_child(id, child, None)?;
            self.nodes[id.0].one_of[idx] = resolved;
        }

        Ok(())
    }

    fn resolve_child(
        &mut self,
        parent: SchemaId,
        child: SchemaId,
        key: Option<&str>,
    ) -> Result<SchemaId, ResolveError> {
        {
            let node = &mut self.nodes[child.0];
            node.parent = Some(parent);
            if let Some(key) = key {
                node.key = Some(key.to_string());
            }
        }

        let pending = match &self.nodes[child.0] {
            node if node.resolved => None,
            node => node.reference.clone().filter(|r| !r.is_empty()),
        };
        let Some(reference) = pending else {
            let resolved = self.resolve_ref(child)?;
            self.resolve_sub_schemas(resolved)?;
            return Ok(resolved);
        };

        let uri = self.ref_uri(child, &reference)?.to_string();
        if self.expanding.contains(&uri) {
            debug!("{} is already being expanded, leaving reference in place", uri);
            self.nodes[child.0].resolved = true;
            return Ok(child);
        }

        self.expanding.insert(uri.clone());
        let result = self
            .resolve_ref(child)
            .and_then(|resolved| self.resolve_sub_schemas(resolved).map(|()| resolved));
        self.expanding.remove(&uri);
        result
    }

    /// Dereference `id`'s `$ref`.
    ///
    /// Returns `id` unchanged when it has no `$ref` or is already resolved.
    /// Otherwise returns a fresh copy of the target with `id`'s own keywords
    /// merged over it; the cached target itself is not modified.
    pub fn resolve_ref(&mut self, id: SchemaId) -> Result<SchemaId, ResolveError> {
        let node = &self.nodes[id.0];
        if node.resolved {
            return Ok(id);
        }
        let Some(reference) = node.reference.clone().filter(|r| !r.is_empty()) else {
            self.nodes[id.0].resolved = true;
            return Ok(id);
        };

        let uri = self.ref_uri(id, &reference)?;
        trace!("expanding {} as {}", reference, uri);
        let loaded = self.get(uri.as_str())?;

        let resolved = self.clone_schema(loaded);
        self.merge(id, resolved);
        let document = self.to_document(resolved);
        let node = &mut self.nodes[resolved.0];
        node.resolved = true;
        node.document = document;
        Ok(resolved)
    }

    /// Deep-copy the subtree at `id`.
    ///
    /// The copy keeps `id`'s parent and key, is not resolved, and has a
    /// document regenerated from its fields.
    pub fn clone_schema(&mut self, id: SchemaId) -> SchemaId {
        let parent = self.nodes[id.0].parent;
        let copy = self.copy_subtree(id, parent);
        let document = self.to_document(copy);
        let node = &mut self.nodes[copy.0];
        node.resolved = false;
        node.document = document;
        copy
    }

    fn copy_subtree(&mut self, id: SchemaId, parent: Option<SchemaId>) -> SchemaId {
        let mut node = self.nodes[id.0].clone();
        node.parent = parent;
        let copy = self.push(node);

        let children = self.nodes[copy.0].child_ids();
        let mut copies = Vec::with_capacity(children.len());
        for child in children {
            // Children borrowed from elsewhere by a merge keep their own parent.
            let child_parent = match self.nodes[child.0].parent {
                Some(p) if p != id => Some(p),
                _ => Some(copy),
            };
            copies.push(self.copy_subtree(child, child_parent));
        }

        for (slot, new) in self.nodes[copy.0].child_ids_mut().into_iter().zip(copies) {
            *slot = new;
        }
        copy
    }

    /// Overlay every keyword present in `source`'s raw document onto `destination`.
    pub fn merge(&mut self, source: SchemaId, destination: SchemaId) {
        if source == destination {
            return;
        }
        let source = self.nodes[source.0].clone();
        self.nodes[destination.0].merge_from(&source);
    }

    /// Canonical JSON form of the subtree at `id`.
    pub fn to_document(&self, id: SchemaId) -> Value {
        let node = &self.nodes[id.0];
        let mut map = match serde_json::to_value(node) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let single = |child: Option<SchemaId>| child.map(|c| self.to_document(c));
        let list = |children: &[SchemaId]| {
            Value::Array(children.iter().map(|c| self.to_document(*c)).collect())
        };
        let named = |members: &Members| {
            Value::Object(
                members
                    .iter()
                    .map(|(name, c)| (name.to_string(), self.to_document(c)))
                    .collect(),
            )
        };

        if let Some(items) = single(node.items) {
            map.insert("items".into(), items);
        }
        if !node.prefix_items.is_empty() {
            let key = if node.items.is_some() { "prefixItems" } else { "items" };
            map.insert(key.into(), list(node.prefix_items.as_slice()));
        }
        if let Some(v) = single(node.property_names) {
            map.insert("propertyNames".into(), v);
        }
        if let Some(v) = single(node.contains) {
            map.insert("contains".into(), v);
        }
        if let Some(v) = single(node.if_schema) {
            map.insert("if".into(), v);
        }
        if let Some(v) = single(node.then_schema) {
            map.insert("then".into(), v);
        }
        if let Some(v) = single(node.else_schema) {
            map.insert("else".into(), v);
        }
        for (key, children) in [
            ("allOf", &node.all_of),
            ("anyOf", &node.any_of),
            ("oneOf", &node.one_of),
        ] {
            if !children.is_empty() {
                map.insert(key.into(), list(children.as_slice()));
            }
        }
        match node.not.as_slice() {
            [] => {}
            [single_not] => {
                map.insert("not".into(), self.to_document(*single_not));
            }
            many => {
                map.insert("not".into(), list(many));
            }
        }
        for (key, children) in [
            ("properties", &node.properties),
            ("patternProperties", &node.pattern_properties),
            ("definitions", &node.definitions),
        ] {
            if !children.is_empty() {
                map.insert(key.into(), named(children));
            }
        }

        Value::Object(map)
    }

    pub fn parent(&self, id: SchemaId) -> Option<SchemaId> {
        self.nodes[id.0].parent
    }

    /// The top-most ancestor of `id`.
    pub fn root(&self, id: SchemaId) -> SchemaId {
        root_of(&self.nodes, id)
    }

    /// Base URI of `id`'s root. See [`Schema::base_uri`] for panics.
    pub fn base_uri(&self, id: SchemaId) -> Option<Url> {
        self.nodes[self.root(id).0].base_uri()
    }

    /// Resolve `reference` against the base URI of `id`'s root.
    pub fn ref_uri(&self, id: SchemaId, reference: &str) -> Result<Url, ResolveError> {
        self.nodes[self.root(id).0].ref_uri(reference)
    }
}

fn root_of(nodes: &[Schema], id: SchemaId) -> SchemaId {
    let mut current = id;
    while let Some(parent) = nodes[current.0].parent {
        current = parent;
    }
    current
}

fn member_list(members: &Members) -> Vec<(String, SchemaId)> {
    members
        .iter()
        .map(|(name, id)| (name.to_string(), id))
        .collect()
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}
