//! Field paths, equality filters, and partial updates over JSON documents.
//!
//! Updates address individual fields by path so concurrent writers touching
//! different fields of the same document never overwrite each other. A whole
//! [`Update`] either applies completely or not at all.

use crate::error::StoreError;
use serde_json::{Map, Value};
use std::fmt;

pub type Document = Map<String, Value>;

/// Key every document is addressed by in point lookups.
pub const ID_FIELD: &str = "_id";

/// Path to a (possibly nested) document field.
///
/// Built from segments, so a segment may itself contain dots (token card ids
/// are opaque strings).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a dotted path such as `apps.tc-1.status`.
    pub fn parse(dotted: &str) -> Self {
        Self::new(dotted.split('.'))
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn get<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let mut current = doc.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Mutable handle on the slot at this path, creating intermediate objects.
    fn slot_mut<'a>(&self, doc: &'a mut Document) -> Result<&'a mut Value, StoreError> {
        let Some((last, parents)) = self.0.split_last() else {
            return Err(self.invalid("empty field path"));
        };
        let mut current = doc;
        for segment in parents {
            let next = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match next {
                Value::Object(map) => map,
                _ => return Err(self.invalid(format!("'{segment}' is not an object"))),
            };
        }
        Ok(current.entry(last.clone()).or_insert(Value::Null))
    }

    fn invalid(&self, reason: impl Into<String>) -> StoreError {
        StoreError::InvalidUpdate {
            path: self.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Conjunction of field equality clauses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(FieldPath, Value)>,
}

impl Filter {
    pub fn by_id(id: &str) -> Self {
        Self::default().eq(FieldPath::new([ID_FIELD]), Value::String(id.to_string()))
    }

    pub fn eq(mut self, path: FieldPath, value: impl Into<Value>) -> Self {
        self.clauses.push((path, value.into()));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(path, expected)| path.get(doc) == Some(expected))
    }

    /// Starting document for an upsert: the equality fields themselves.
    pub fn seed(&self) -> Result<Document, StoreError> {
        let mut doc = Document::new();
        for (path, value) in &self.clauses {
            *path.slot_mut(&mut doc)? = value.clone();
        }
        Ok(doc)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum UpdateOp {
    Set(FieldPath, Value),
    Unset(FieldPath),
    Push(FieldPath, Value),
}

/// Ordered list of field operations applied to one document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: FieldPath, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(path, value.into()));
        self
    }

    /// Remove a field; removing an absent field is a no-op.
    pub fn unset(mut self, path: FieldPath) -> Self {
        self.ops.push(UpdateOp::Unset(path));
        self
    }

    /// Append to an array field, creating it when absent.
    pub fn push(mut self, path: FieldPath, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Push(path, value.into()));
        self
    }

    /// Apply every operation, leaving `doc` untouched if any of them fails.
    pub fn apply(&self, doc: &mut Document) -> Result<(), StoreError> {
        let mut staged = doc.clone();
        for op in &self.ops {
            match op {
                UpdateOp::Set(path, value) => {
                    if path.segments().first().map(String::as_str) == Some(ID_FIELD) {
                        return Err(path.invalid("the document id is immutable"));
                    }
                    *path.slot_mut(&mut staged)? = value.clone();
                }
                UpdateOp::Unset(path) => unset(&mut staged, path),
                UpdateOp::Push(path, value) => {
                    let slot = path.slot_mut(&mut staged)?;
                    match slot {
                        Value::Array(items) => items.push(value.clone()),
                        Value::Null => *slot = Value::Array(vec![value.clone()]),
                        _ => return Err(path.invalid("not an array")),
                    }
                }
            }
        }
        *doc = staged;
        Ok(())
    }
}

fn unset(doc: &mut Document, path: &FieldPath) {
    let Some((last, parents)) = path.segments().split_last() else {
        return;
    };
    let mut current = doc;
    for segment in parents {
        current = match current.get_mut(segment) {
            Some(Value::Object(map)) => map,
            _ => return,
        };
    }
    current.remove(last);
}

/// Copy only the listed fields of `doc`, preserving their nesting.
pub fn project(doc: &Document, fields: &[FieldPath]) -> Document {
    let mut projected = Document::new();
    for path in fields {
        if let Some(value) = path.get(doc) {
            // Paths come from a document that already holds them as objects.
            if let Ok(slot) = path.slot_mut(&mut projected) {
                *slot = value.clone();
            }
        }
    }
    projected
}
