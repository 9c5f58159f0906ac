// ── RFC-6902 patch operations ──
//
// Applies single add/remove/replace/move/copy/test operations to the
// mirrored state tree in place. The tree only ever holds objects and
// scalars, so pointer segments are always literal object keys: there is
// no array-index or `-` handling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("invalid pointer {pointer:?}: {reason}")]
    InvalidPointer {
        pointer: String,
        reason: &'static str,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("parent of {0} is not an object")]
    InvalidTarget(String),

    #[error("test failed at {0}")]
    TestFailed(String),

    #[error("cannot move {from} into its own child {path}")]
    MoveIntoSelf { from: String, path: String },

    #[error("cannot remove the document root")]
    RemoveRoot,
}

// ── Pointer ─────────────────────────────────────────────────────────

/// A parsed JSON pointer (RFC 6901) restricted to non-empty object keys.
///
/// The empty string is the root. Every other pointer starts with `/`, and
/// `~1` / `~0` decode to `/` / `~`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pointer(Vec<String>);

impl Pointer {
    /// The pointer addressing the whole tree.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a pointer from already-decoded components.
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(components.into_iter().map(Into::into).collect())
    }

    pub fn parse(raw: &str) -> Result<Self, PatchError> {
        if raw.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(invalid_pointer(raw, "must start with '/'"));
        };

        rest.split('/')
            .map(|segment| {
                if segment.is_empty() {
                    return Err(invalid_pointer(raw, "empty segment"));
                }
                unescape(segment).ok_or_else(|| invalid_pointer(raw, "bad '~' escape"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` if `self` equals `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &Pointer) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.0 {
            write!(f, "/{}", component.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

impl FromStr for Pointer {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pointer {
    type Error = PatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pointer> for String {
    fn from(pointer: Pointer) -> Self {
        pointer.to_string()
    }
}

fn invalid_pointer(raw: &str, reason: &'static str) -> PatchError {
    PatchError::InvalidPointer {
        pointer: raw.to_owned(),
        reason,
    }
}

fn unescape(segment: &str) -> Option<String> {
    if !segment.contains('~') {
        return Some(segment.to_owned());
    }
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next()? {
                '0' => out.push('~'),
                '1' => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

// ── PatchOperation ──────────────────────────────────────────────────

/// One operation from an inbound patch frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: Pointer, value: Value },
    Remove { path: Pointer },
    Replace { path: Pointer, value: Value },
    Move { from: Pointer, path: Pointer },
    Copy { from: Pointer, path: Pointer },
    Test { path: Pointer, value: Value },
}

impl PatchOperation {
    /// Decode a raw operation object taken from a frame.
    pub fn from_value(raw: Value) -> Result<Self, PatchError> {
        serde_json::from_value(raw).map_err(|e| PatchError::InvalidOperation(e.to_string()))
    }

    /// The target path: the location whose subtree this operation changes.
    pub fn path(&self) -> &Pointer {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Replace { .. } => "replace",
            Self::Move { .. } => "move",
            Self::Copy { .. } => "copy",
            Self::Test { .. } => "test",
        }
    }
}

// ── Navigation ──────────────────────────────────────────────────────

/// Follow `components` through nested objects.
///
/// Returns `None` if a key is missing or a non-object is crossed.
pub fn resolve<'a>(doc: &'a Value, components: &[String]) -> Option<&'a Value> {
    components
        .iter()
        .try_fold(doc, |node, key| node.as_object()?.get(key))
}

fn resolve_mut<'a>(doc: &'a mut Value, components: &[String]) -> Option<&'a mut Value> {
    components
        .iter()
        .try_fold(doc, |node, key| node.as_object_mut()?.get_mut(key))
}

/// The object holding the last component of `path`, plus that component.
fn parent_mut<'d, 'p>(
    doc: &'d mut Value,
    path: &'p Pointer,
) -> Result<(&'d mut Map<String, Value>, &'p str), PatchError> {
    let (key, parent) = path
        .components()
        .split_last()
        .ok_or(PatchError::RemoveRoot)?;

    match resolve_mut(doc, parent) {
        Some(Value::Object(map)) => Ok((map, key.as_str())),
        Some(_) => Err(PatchError::InvalidTarget(path.to_string())),
        None => Err(PatchError::NotFound(
            Pointer::from_components(parent.iter().cloned()).to_string(),
        )),
    }
}

// ── Applicators ─────────────────────────────────────────────────────

/// Apply one operation to `doc` in place.
///
/// On error the document is left as it was before the call.
pub fn apply(doc: &mut Value, op: &PatchOperation) -> Result<(), PatchError> {
    match op {
        PatchOperation::Add { path, value } => apply_add(doc, path, value.clone()),
        PatchOperation::Remove { path } => apply_remove(doc, path).map(drop),
        PatchOperation::Replace { path, value } => apply_replace(doc, path, value.clone()),
        PatchOperation::Move { from, path } => apply_move(doc, from, path),
        PatchOperation::Copy { from, path } => {
            let src = resolve(doc, from.components())
                .ok_or_else(|| PatchError::NotFound(from.to_string()))?
                .clone();
            apply_add(doc, path, src)
        }
        PatchOperation::Test { path, value } => {
            let actual = resolve(doc, path.components())
                .ok_or_else(|| PatchError::NotFound(path.to_string()))?;
            if actual == value {
                Ok(())
            } else {
                Err(PatchError::TestFailed(path.to_string()))
            }
        }
    }
}

fn apply_add(doc: &mut Value, path: &Pointer, value: Value) -> Result<(), PatchError> {
    if path.is_root() {
        *doc = value;
        return Ok(());
    }
    let (map, key) = parent_mut(doc, path)?;
    map.insert(key.to_owned(), value);
    Ok(())
}

fn apply_remove(doc: &mut Value, path: &Pointer) -> Result<Value, PatchError> {
    let (map, key) = parent_mut(doc, path)?;
    map.remove(key)
        .ok_or_else(|| PatchError::NotFound(path.to_string()))
}

fn apply_replace(doc: &mut Value, path: &Pointer, value: Value) -> Result<(), PatchError> {
    if path.is_root() {
        *doc = value;
        return Ok(());
    }
    let (map, key) = parent_mut(doc, path)?;
    let slot = map
        .get_mut(key)
        .ok_or_else(|| PatchError::NotFound(path.to_string()))?;
    *slot = value;
    Ok(())
}

fn apply_move(doc: &mut Value, from: &Pointer, path: &Pointer) -> Result<(), PatchError> {
    if from == path {
        return resolve(doc, from.components())
            .map(drop)
            .ok_or_else(|| PatchError::NotFound(from.to_string()));
    }
    if path.starts_with(from) {
        return Err(PatchError::MoveIntoSelf {
            from: from.to_string(),
            path: path.to_string(),
        });
    }

    let value = apply_remove(doc, from)?;
    match apply_add(doc, path, value.clone()) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Put the source back so a failed move leaves no trace.
            apply_add(doc, from, value)?;
            Err(e)
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
