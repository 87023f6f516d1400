//! Reference graph resolution.
//!
//! `Resolver` owns the fetch capability and a document cache shared by all
//! of its clones, so repeated runs with the same resolver reuse fetched
//! documents. `DocumentInventory` is built per run: it dereferences every
//! `$ref` reachable from a root document and answers provenance queries
//! (`locate`) mapping a resolved path back to its authoring document.

use crate::document::pointer::{path_to_pointer, print_path, PrintStyle, RefPointer};
use crate::document::{child_segment, closest_path, get_value, ref_of, SourceDocument, NULL};
use crate::error::{FetchError, PointerError};
use crate::fetch::{default_fetcher, resolve_uri, Fetcher};
use crate::models::{JsonPath, Segment};
use parking_lot::RwLock;
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

type Registry = HashMap<String, Arc<SourceDocument>>;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A `$ref` that could not be dereferenced.
pub struct ResolutionError {
    /// Location of the reference object in the resolved tree.
    pub path: JsonPath,
    /// Document holding the reference.
    pub source: String,
    /// Location of the reference object inside `source`.
    pub document_path: JsonPath,
    pub message: String,
}

#[derive(Clone)]
/// Fetch capability plus a document cache keyed by URI.
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<RwLock<Registry>>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(default_fetcher())
    }
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Raw text for `uri`, bypassing the document cache.
    pub fn fetch(&self, uri: &str) -> Result<String, FetchError> {
        self.fetcher.fetch(uri)
    }

    /// Parsed document for `uri`, fetched once per resolver.
    pub fn document(&self, uri: &str) -> Result<Arc<SourceDocument>, FetchError> {
        if let Some(doc) = self.cache.read().get(uri) {
            tracing::trace!(uri, "document cache hit");
            return Ok(doc.clone());
        }
        let text = self.fetcher.fetch(uri)?;
        let doc = Arc::new(SourceDocument::from_source(text, Some(uri.to_string())));
        tracing::debug!(uri, diagnostics = doc.diagnostics().len(), "document loaded");
        let mut cache = self.cache.write();
        Ok(cache.entry(uri.to_string()).or_insert(doc).clone())
    }

    /// True when the two handles share one cache.
    pub fn same_cache(&self, other: &Resolver) -> bool {
        Arc::ptr_eq(&self.cache, &other.cache)
    }

    /// Dereference every `$ref` reachable from `root`.
    #[tracing::instrument(skip_all, fields(source = root.key()))]
    pub fn dereference(&self, root: &Arc<SourceDocument>) -> Dereferenced {
        let mut walker = Walker {
            resolver: self,
            documents: HashMap::from([(root.key().to_string(), root.clone())]),
            errors: Vec::new(),
            memo: HashMap::new(),
            stack: Vec::new(),
        };
        let mut resolved_path = Vec::new();
        let mut doc_path = Vec::new();
        let resolved = walker.walk(root, root.data(), &mut resolved_path, &mut doc_path);
        tracing::debug!(
            documents = walker.documents.len(),
            errors = walker.errors.len(),
            "dereference finished"
        );
        Dereferenced {
            resolved,
            documents: walker.documents,
            errors: walker.errors,
        }
    }
}

#[derive(Debug, Clone)]
/// Output of `Resolver::dereference`.
pub struct Dereferenced {
    pub resolved: Json,
    pub documents: HashMap<String, Arc<SourceDocument>>,
    pub errors: Vec<ResolutionError>,
}

#[derive(Debug)]
enum TraceError {
    Cycle(String),
    Malformed(PointerError),
    Fetch { reference: String, message: String },
}

#[derive(Debug)]
struct Traced {
    doc: Arc<SourceDocument>,
    path: JsonPath,
    missing: JsonPath,
}

/// Walk `path` from `start`, following every `$ref` met on the way
/// (including one at the final node) until a literal location is reached.
fn trace(
    start: Arc<SourceDocument>,
    path: &[Segment],
    lookup: &mut dyn FnMut(&str) -> Result<Arc<SourceDocument>, String>,
) -> Result<Traced, TraceError> {
    let mut doc = start;
    let mut cur: JsonPath = Vec::new();
    let mut remaining: VecDeque<Segment> = path.iter().cloned().collect();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    loop {
        let node = get_value(doc.data(), &cur).unwrap_or(&NULL);
        if let Some(reference) = ref_of(node) {
            let reference = reference.to_string();
            let target = RefPointer::parse(&reference).map_err(TraceError::Malformed)?;
            if let Some(source) = &target.source {
                let uri = resolve_uri(doc.source(), source);
                doc = lookup(&uri).map_err(|message| TraceError::Fetch {
                    reference: reference.clone(),
                    message,
                })?;
            }
            if !seen.insert((doc.key().to_string(), target.pointer.clone())) {
                return Err(TraceError::Cycle(reference));
            }
            let wanted = target.path();
            let existing = closest_path(doc.data(), &wanted);
            if existing.len() < wanted.len() {
                let mut missing: JsonPath = wanted[existing.len()..].to_vec();
                missing.extend(remaining);
                return Ok(Traced {
                    doc,
                    path: existing,
                    missing,
                });
            }
            cur = existing;
            continue;
        }
        let Some(seg) = remaining.front() else {
            return Ok(Traced {
                doc,
                path: cur,
                missing: Vec::new(),
            });
        };
        match child_segment(node, seg) {
            Some(s) => {
                cur.push(s);
                remaining.pop_front();
            }
            None => {
                return Ok(Traced {
                    doc,
                    path: cur,
                    missing: remaining.into_iter().collect(),
                })
            }
        }
    }
}

struct Walker<'r> {
    resolver: &'r Resolver,
    documents: Registry,
    errors: Vec<ResolutionError>,
    memo: HashMap<(String, String), Json>,
    stack: Vec<(String, String)>,
}

impl Walker<'_> {
    fn load(&mut self, uri: &str) -> Result<Arc<SourceDocument>, String> {
        if let Some(doc) = self.documents.get(uri) {
            return Ok(doc.clone());
        }
        let doc = self.resolver.document(uri).map_err(|e| e.to_string())?;
        self.documents.insert(uri.to_string(), doc.clone());
        Ok(doc)
    }

    fn record(&mut self, doc: &SourceDocument, resolved_path: &[Segment], doc_path: &[Segment], message: String) {
        tracing::debug!(source = doc.key(), %message, "unresolvable $ref");
        self.errors.push(ResolutionError {
            path: resolved_path.to_vec(),
            source: doc.key().to_string(),
            document_path: doc_path.to_vec(),
            message,
        });
    }

    fn walk(
        &mut self,
        doc: &Arc<SourceDocument>,
        node: &Json,
        resolved_path: &mut JsonPath,
        doc_path: &mut JsonPath,
    ) -> Json {
        if ref_of(node).is_some() {
            return match self.follow(doc, doc_path, resolved_path) {
                Some(value) => value,
                None => node.clone(),
            };
        }
        match node {
            Json::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, child) in map {
                    resolved_path.push(Segment::Key(key.clone()));
                    doc_path.push(Segment::Key(key.clone()));
                    let value = self.walk(doc, child, resolved_path, doc_path);
                    doc_path.pop();
                    resolved_path.pop();
                    out.insert(key.clone(), value);
                }
                Json::Object(out)
            }
            Json::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    resolved_path.push(Segment::Index(i));
                    doc_path.push(Segment::Index(i));
                    let value = self.walk(doc, child, resolved_path, doc_path);
                    doc_path.pop();
                    resolved_path.pop();
                    out.push(value);
                }
                Json::Array(out)
            }
            other => other.clone(),
        }
    }

    /// Dereference the reference object at `doc_path` in `doc`.
    fn follow(
        &mut self,
        doc: &Arc<SourceDocument>,
        doc_path: &[Segment],
        resolved_path: &mut JsonPath,
    ) -> Option<Json> {
        let reference = get_value(doc.data(), doc_path)
            .and_then(ref_of)
            .unwrap_or_default()
            .to_string();
        let traced = {
            let mut lookup = |uri: &str| self.load(uri);
            trace(doc.clone(), doc_path, &mut lookup)
        };
        let traced = match traced {
            Ok(t) => t,
            Err(TraceError::Malformed(e)) => {
                self.record(doc, resolved_path, doc_path, e.to_string());
                return None;
            }
            Err(TraceError::Cycle(_)) => {
                let message = format!(
                    "Circular $ref pointer found at {}",
                    print_path(doc_path, PrintStyle::EscapedPointer)
                );
                self.record(doc, resolved_path, doc_path, message);
                return None;
            }
            Err(TraceError::Fetch { reference, message }) => {
                let message = format!("Could not resolve '{reference}': {message}");
                self.record(doc, resolved_path, doc_path, message);
                return None;
            }
        };
        if !traced.missing.is_empty() {
            let message = format!("'{reference}' does not exist");
            self.record(doc, resolved_path, doc_path, message);
            return None;
        }

        let key = (traced.doc.key().to_string(), path_to_pointer(&traced.path));
        if self.stack.contains(&key) {
            let message = format!(
                "Circular $ref pointer found at {}",
                print_path(doc_path, PrintStyle::EscapedPointer)
            );
            self.record(doc, resolved_path, doc_path, message);
            return None;
        }
        if let Some(value) = self.memo.get(&key) {
            return Some(value.clone());
        }

        let target = get_value(traced.doc.data(), &traced.path)
            .cloned()
            .unwrap_or(Json::Null);
        self.stack.push(key.clone());
        let mut target_path = traced.path.clone();
        let value = self.walk(&traced.doc, &target, resolved_path, &mut target_path);
        self.stack.pop();
        self.memo.insert(key, value.clone());
        Some(value)
    }
}

#[derive(Debug, Clone)]
/// Provenance of a resolved path.
pub struct Location {
    pub document: Arc<SourceDocument>,
    /// Closest existing path inside `document`.
    pub path: JsonPath,
    /// Trailing segments of the query with no literal counterpart.
    pub missing_property_path: JsonPath,
}

#[derive(Debug, Clone)]
/// Per-run view over a root document and everything it references.
pub struct DocumentInventory {
    document: Arc<SourceDocument>,
    resolved: Json,
    documents: Registry,
    errors: Vec<ResolutionError>,
    formats: Option<Vec<String>>,
}

impl DocumentInventory {
    /// Dereference `document` through `resolver`.
    pub fn resolve(document: Arc<SourceDocument>, resolver: &Resolver) -> Self {
        let Dereferenced {
            resolved,
            documents,
            errors,
        } = resolver.dereference(&document);
        Self {
            document,
            resolved,
            documents,
            errors,
            formats: None,
        }
    }

    pub fn document(&self) -> &Arc<SourceDocument> {
        &self.document
    }

    pub fn source(&self) -> Option<&str> {
        self.document.source()
    }

    pub fn unresolved(&self) -> &Json {
        self.document.data()
    }

    pub fn resolved(&self) -> &Json {
        &self.resolved
    }

    pub fn errors(&self) -> &[ResolutionError] {
        &self.errors
    }

    /// Every document visited while dereferencing, root included.
    pub fn documents(&self) -> &HashMap<String, Arc<SourceDocument>> {
        &self.documents
    }

    /// Detected formats; `None` when detection found nothing.
    pub fn formats(&self) -> Option<&[String]> {
        self.formats.as_deref()
    }

    pub fn set_formats(&mut self, formats: Option<Vec<String>>) {
        self.formats = formats;
    }

    /// Whether `reference` (`doc#/pointer`, `#/pointer` or `doc`) names an
    /// existing node among the visited documents.
    pub fn has_node(&self, reference: &str) -> bool {
        let Ok(target) = RefPointer::parse(reference) else {
            return false;
        };
        let doc = match &target.source {
            None => Some(&self.document),
            Some(src) => self
                .documents
                .get(src)
                .or_else(|| self.documents.get(&resolve_uri(self.document.source(), src))),
        };
        doc.is_some_and(|d| get_value(d.data(), &target.path()).is_some())
    }

    /// Find the document and path a resolved (or, with `resolved == false`,
    /// unresolved) path originates from. `None` when a reference on the way
    /// is cyclic, malformed or points at an unvisited document.
    pub fn locate(&self, path: &[Segment], resolved: bool) -> Option<Location> {
        if !resolved {
            let closest = closest_path(self.unresolved(), path);
            let missing = path[closest.len()..].to_vec();
            return Some(Location {
                document: self.document.clone(),
                path: closest,
                missing_property_path: missing,
            });
        }
        let mut lookup = |uri: &str| {
            self.documents
                .get(uri)
                .cloned()
                .ok_or_else(|| format!("{uri} was not visited"))
        };
        trace(self.document.clone(), path, &mut lookup)
            .ok()
            .map(|t| Location {
                document: t.doc,
                path: t.path,
                missing_property_path: t.missing,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticAssets;
    use serde_json::json;

    fn resolver(files: &[(&str, &str)]) -> Resolver {
        let mut assets = StaticAssets::new();
        for (uri, text) in files {
            assets.insert(*uri, *text);
        }
        Resolver::new(Arc::new(assets))
    }

    fn doc(text: &str, source: &str) -> Arc<SourceDocument> {
        Arc::new(SourceDocument::from_source(text, Some(source.to_string())))
    }

    fn p(parts: &[&str]) -> JsonPath {
        parts.iter().map(|s| Segment::from(*s)).collect()
    }

    fn all_paths(value: &Json, prefix: &mut JsonPath, out: &mut Vec<JsonPath>) {
        out.push(prefix.clone());
        match value {
            Json::Object(map) => {
                for (k, v) in map {
                    prefix.push(Segment::Key(k.clone()));
                    all_paths(v, prefix, out);
                    prefix.pop();
                }
            }
            Json::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    prefix.push(Segment::Index(i));
                    all_paths(v, prefix, out);
                    prefix.pop();
                }
            }
            _ => {}
        }
    }

    #[test]
    fn test_local_refs_round_trip_through_locate() {
        let text = r##"{
  "paths": {"/pets": {"get": {"responses": {"200": {"$ref": "#/components/responses/Ok"}}}}},
  "components": {
    "responses": {"Ok": {"description": "fine", "content": {"$ref": "#/components/content"}}},
    "content": {"schema": {"type": "string"}, "tags": ["a", "b"]}
  }
}"##;
        let inv = DocumentInventory::resolve(doc(text, "/api.json"), &resolver(&[]));
        assert!(inv.errors().is_empty());
        assert_eq!(
            inv.resolved()["paths"]["/pets"]["get"]["responses"]["200"]["content"]["schema"],
            json!({"type": "string"})
        );

        let mut paths = Vec::new();
        all_paths(inv.resolved(), &mut Vec::new(), &mut paths);
        for path in paths {
            let loc = inv.locate(&path, true).unwrap();
            assert_eq!(loc.document.source(), Some("/api.json"));
            assert!(loc.missing_property_path.is_empty(), "{path:?}");
            assert_eq!(
                get_value(inv.resolved(), &loc.path),
                get_value(inv.resolved(), &path),
                "{path:?}"
            );
            let original = get_value(inv.unresolved(), &loc.path).unwrap();
            if !original.is_object() && !original.is_array() {
                assert_eq!(Some(original), get_value(inv.resolved(), &path));
            }
        }

        let loc = inv
            .locate(&p(&["paths", "/pets", "get", "responses", "200", "content", "schema", "type"]), true)
            .unwrap();
        assert_eq!(loc.path, p(&["components", "content", "schema", "type"]));
    }

    #[test]
    fn test_cycle_is_recorded_not_followed() {
        let text = "a:\n  $ref: '#/b'\nb:\n  $ref: '#/a'\nc:\n  child:\n    $ref: '#/c'\n";
        let inv = DocumentInventory::resolve(doc(text, "/cyc.yaml"), &resolver(&[]));
        assert_eq!(inv.errors().len(), 3);
        assert!(inv.errors().iter().all(|e| e.message.starts_with("Circular $ref pointer")));
        assert_eq!(inv.resolved()["a"], json!({"$ref": "#/b"}));
        assert_eq!(inv.resolved()["c"]["child"]["child"], json!({"$ref": "#/c"}));
        assert!(inv.locate(&p(&["a"]), true).is_none());
    }

    #[test]
    fn test_cross_file_refs_are_registered_and_located() {
        let r = resolver(&[(
            "/specs/common/defs.yaml",
            "Pet:\n  type: object\n  properties:\n    name:\n      type: string\n",
        )]);
        let root = doc(
            "schema:\n  $ref: './common/defs.yaml#/Pet'\n",
            "/specs/root.yaml",
        );
        let inv = DocumentInventory::resolve(root, &r);
        assert!(inv.errors().is_empty());
        assert_eq!(inv.documents().len(), 2);
        assert!(inv.has_node("/specs/common/defs.yaml#/Pet/properties"));
        assert!(inv.has_node("#/schema"));
        assert!(!inv.has_node("#/nope"));

        let loc = inv
            .locate(&p(&["schema", "properties", "name", "type"]), true)
            .unwrap();
        assert_eq!(loc.document.source(), Some("/specs/common/defs.yaml"));
        assert_eq!(loc.path, p(&["Pet", "properties", "name", "type"]));

        let missing = inv.locate(&p(&["schema", "required"]), true).unwrap();
        assert_eq!(missing.path, p(&["Pet"]));
        assert_eq!(missing.missing_property_path, p(&["required"]));
    }

    #[test]
    fn test_cross_file_cycle_terminates_with_one_error() {
        let r = resolver(&[("/s/b.yaml", "y:\n  $ref: 'a.yaml#/x'\n")]);
        let root = doc("x:\n  $ref: 'b.yaml#/y'\nz: 1\n", "/s/a.yaml");
        let inv = DocumentInventory::resolve(root, &r);
        assert_eq!(inv.errors().len(), 1);
        assert!(inv.errors()[0].message.starts_with("Circular $ref pointer"));
        assert_eq!(inv.errors()[0].path, p(&["x"]));
        assert_eq!(inv.resolved()["x"], json!({"$ref": "b.yaml#/y"}));
        assert_eq!(inv.resolved()["z"], json!(1));
    }

    #[test]
    fn test_locate_follows_ref_chain_across_documents() {
        let r = resolver(&[
            ("/s/b.yaml", "w:\n  $ref: 'c/c.yaml#/u'\n"),
            ("/s/c/c.yaml", "u:\n  $ref: '#/v'\nv:\n  deep: 1\n"),
        ]);
        let root = doc("x:\n  $ref: 'b.yaml#/w'\n", "/s/root.yaml");
        let inv = DocumentInventory::resolve(root, &r);
        assert!(inv.errors().is_empty());
        assert_eq!(inv.resolved()["x"], json!({"deep": 1}));
        assert_eq!(inv.documents().len(), 3);

        let loc = inv.locate(&p(&["x", "deep"]), true).unwrap();
        assert_eq!(loc.document.source(), Some("/s/c/c.yaml"));
        assert_eq!(loc.path, p(&["v", "deep"]));
        assert!(loc.missing_property_path.is_empty());
    }

    #[test]
    fn test_unresolved_locate_stays_in_root() {
        let root = doc("a:\n  $ref: 'other.yaml'\n", "/r.yaml");
        let inv = DocumentInventory::resolve(root, &resolver(&[("/other.yaml", "x: 1\n")]));
        let loc = inv.locate(&p(&["a", "x"]), false).unwrap();
        assert_eq!(loc.document.source(), Some("/r.yaml"));
        assert_eq!(loc.path, p(&["a"]));
        assert_eq!(loc.missing_property_path, p(&["x"]));
    }

    #[test]
    fn test_fetch_failure_and_missing_pointer_are_errors() {
        let root = doc(
            "a:\n  $ref: 'gone.yaml#/x'\nb:\n  $ref: '#/nope'\nc: 1\n",
            "/r.yaml",
        );
        let inv = DocumentInventory::resolve(root, &resolver(&[]));
        assert_eq!(inv.errors().len(), 2);
        assert_eq!(inv.errors()[0].path, p(&["a"]));
        assert!(inv.errors()[0].message.starts_with("Could not resolve 'gone.yaml#/x'"));
        assert_eq!(inv.errors()[1].message, "'#/nope' does not exist");
        assert_eq!(inv.resolved()["c"], json!(1));
        assert_eq!(inv.documents().len(), 1);
    }

    #[test]
    fn test_resolver_cache_is_shared_by_clones() {
        let r = resolver(&[("/d.yaml", "v: 1\n")]);
        let clone = r.clone();
        let first = r.document("/d.yaml").unwrap();
        let second = clone.document("/d.yaml").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(r.same_cache(&clone));
        assert!(!r.same_cache(&resolver(&[])));
    }
}
