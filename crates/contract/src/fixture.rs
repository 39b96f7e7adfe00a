//! Fixture loading and payload composition
//!
//! A fixture is an immutable named request body. Composition is a shallow
//! merge: a patched key replaces the fixture value wholesale, and a key only
//! disappears when the override says [`Patch::Remove`] for it.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ContractError, ContractResult};

/// A flat request body
pub type Payload = Map<String, Value>;

/// Extensions tried, in order, when resolving a fixture name on disk
const FIXTURE_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// A named, read-only request template
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureDocument {
    pub name: String,
    pub fields: Payload,
}

impl FixtureDocument {
    /// Wrap a parsed value; only JSON objects are valid fixtures
    pub fn from_value(name: &str, value: Value) -> ContractResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                name: name.to_string(),
                fields,
            }),
            other => Err(ContractError::FixtureInvalid {
                name: name.to_string(),
                reason: format!("expected an object, found {}", json_kind(&other)),
            }),
        }
    }
}

/// One override operation for a single key
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Replace (or add) the key with this value, `null` included
    Set(Value),
    /// Drop the key from the composed payload
    Remove,
}

/// Ordered set of patches; a later patch for the same key wins
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Override {
    ops: Vec<(String, Patch)>,
}

impl Override {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push((key.into(), Patch::Set(value.into())));
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.ops.push((key.into(), Patch::Remove));
        self
    }

    /// Sets first, then removals
    pub fn from_parts(set: Payload, remove: impl IntoIterator<Item = String>) -> Self {
        let mut ops: Vec<(String, Patch)> = set.into_iter().map(|(k, v)| (k, Patch::Set(v))).collect();
        ops.extend(remove.into_iter().map(|k| (k, Patch::Remove)));
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn patches(&self) -> &[(String, Patch)] {
        &self.ops
    }

    /// Apply the patches over a copy of `base`
    pub fn apply(&self, base: &Payload) -> Payload {
        let mut out = base.clone();
        for (key, patch) in &self.ops {
            match patch {
                Patch::Set(value) => {
                    out.insert(key.clone(), value.clone());
                }
                Patch::Remove => {
                    out.remove(key);
                }
            }
        }
        out
    }
}

/// Where fixture documents come from
pub trait FixtureSource: Send + Sync {
    fn load(&self, name: &str) -> ContractResult<FixtureDocument>;

    /// Names this source can resolve, sorted
    fn names(&self) -> ContractResult<Vec<String>>;
}

/// Fixtures stored as `<root>/<name>.{json,yaml,yml}`
#[derive(Debug, Clone)]
pub struct DirFixtures {
    root: PathBuf,
}

impl DirFixtures {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if name.is_empty() || escapes {
            return None;
        }
        FIXTURE_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", name, ext)))
            .find(|path| path.is_file())
    }
}

impl FixtureSource for DirFixtures {
    fn load(&self, name: &str) -> ContractResult<FixtureDocument> {
        let path = self
            .resolve(name)
            .ok_or_else(|| ContractError::FixtureNotFound(name.to_string()))?;
        debug!("Loading fixture {} from {}", name, path.display());

        let content = std::fs::read_to_string(&path)?;
        let is_json = path.extension().map(|e| e == "json").unwrap_or(false);
        let value: Value = if is_json {
            serde_json::from_str(&content).map_err(|e| ContractError::FixtureInvalid {
                name: name.to_string(),
                reason: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| ContractError::FixtureInvalid {
                name: name.to_string(),
                reason: e.to_string(),
            })?
        };
        FixtureDocument::from_value(name, value)
    }

    fn names(&self) -> ContractResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let known = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FIXTURE_EXTENSIONS.contains(&ext))
                .unwrap_or(false);
            if !known {
                continue;
            }
            if let Ok(relative) = path.with_extension("").strip_prefix(&self.root) {
                names.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// In-memory fixtures, mostly for tests and generated cases
#[derive(Debug, Clone, Default)]
pub struct MemoryFixtures {
    docs: HashMap<String, Payload>,
}

impl MemoryFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, fields: Payload) -> Self {
        self.docs.insert(name.into(), fields);
        self
    }
}

impl FixtureSource for MemoryFixtures {
    fn load(&self, name: &str) -> ContractResult<FixtureDocument> {
        self.docs
            .get(name)
            .map(|fields| FixtureDocument {
                name: name.to_string(),
                fields: fields.clone(),
            })
            .ok_or_else(|| ContractError::FixtureNotFound(name.to_string()))
    }

    fn names(&self) -> ContractResult<Vec<String>> {
        let mut names: Vec<String> = self.docs.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Builds request bodies from fixtures plus overrides
#[derive(Clone)]
pub struct PayloadComposer {
    source: Arc<dyn FixtureSource>,
}

impl PayloadComposer {
    pub fn new(source: impl FixtureSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self::new(DirFixtures::new(root))
    }

    pub fn source(&self) -> &dyn FixtureSource {
        self.source.as_ref()
    }

    /// Load `fixture` and apply `patch` over it
    pub fn compose(&self, fixture: &str, patch: &Override) -> ContractResult<Payload> {
        let document = self.source.load(fixture)?;
        Ok(patch.apply(&document.fields))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn mcq() -> Payload {
        json!({
            "project_id": "P1",
            "language_code": "en",
            "question_type": "mcq",
            "class": "8",
            "stem": "What is 2 + 2?",
            "options": [{"id": "a", "text": "4"}, {"id": "b", "text": "5"}],
            "answer": "a"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn composer() -> PayloadComposer {
        PayloadComposer::new(MemoryFixtures::new().with("mcq_valid", mcq()))
    }

    #[test]
    fn test_empty_override_is_identity() {
        let payload = composer().compose("mcq_valid", &Override::new()).unwrap();
        assert_eq!(payload, mcq());
    }

    #[test]
    fn test_remove_drops_only_that_key() {
        let payload = composer()
            .compose("mcq_valid", &Override::new().remove("stem"))
            .unwrap();
        assert!(!payload.contains_key("stem"));
        assert_eq!(payload.len(), mcq().len() - 1);
    }

    #[test]
    fn test_set_replaces_whole_value() {
        let payload = composer()
            .compose("mcq_valid", &Override::new().set("options", json!([{"id": "z"}])))
            .unwrap();
        assert_eq!(payload["options"], json!([{"id": "z"}]));
        assert_eq!(payload["stem"], mcq()["stem"]);
    }

    #[test]
    fn test_unknown_key_is_added_and_null_is_kept() {
        let payload = composer()
            .compose(
                "mcq_valid",
                &Override::new().set("unexpected", "x").set("class", Value::Null),
            )
            .unwrap();
        assert_eq!(payload["unexpected"], "x");
        assert!(payload.contains_key("class"));
        assert!(payload["class"].is_null());
    }

    #[test]
    fn test_later_patch_wins() {
        let patch = Override::new().remove("stem").set("stem", "back again");
        let payload = composer().compose("mcq_valid", &patch).unwrap();
        assert_eq!(payload["stem"], "back again");

        let patch = Override::new().set("stem", "gone soon").remove("stem");
        let payload = composer().compose("mcq_valid", &patch).unwrap();
        assert!(!payload.contains_key("stem"));
    }

    #[test]
    fn test_composition_is_deterministic() {
        let patch = Override::new().set("stem", "same").remove("answer");
        let a = composer().compose("mcq_valid", &patch).unwrap();
        let b = composer().compose("mcq_valid", &patch).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_fixture() {
        let err = composer().compose("nope", &Override::new()).unwrap_err();
        assert!(matches!(err, ContractError::FixtureNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_dir_fixtures() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("mcq")).unwrap();
        std::fs::write(
            dir.path().join("mcq/valid.json"),
            serde_json::to_string(&mcq()).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("fib_valid.yaml"), "stem: Fill ___\nanswers: [x]\n").unwrap();
        std::fs::write(dir.path().join("list.json"), "[1, 2]").unwrap();
        std::fs::write(dir.path().join("README.md"), "# fixtures").unwrap();

        let source = DirFixtures::new(dir.path());
        assert_eq!(source.load("mcq/valid").unwrap().fields, mcq());
        assert_eq!(source.load("fib_valid").unwrap().fields["answers"], json!(["x"]));
        assert!(matches!(
            source.load("list"),
            Err(ContractError::FixtureInvalid { .. })
        ));
        assert!(matches!(
            source.load("../etc/passwd"),
            Err(ContractError::FixtureNotFound(_))
        ));
        assert_eq!(
            source.names().unwrap(),
            vec!["fib_valid".to_string(), "list".to_string(), "mcq/valid".to_string()]
        );
    }
}
