use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// The identity component of a key: a string name or a numeric id.
///
/// Ids order before names, and each orders naturally within its own form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyIdentity {
    Id(i64),
    Name(String),
}

impl fmt::Display for KeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// Longest accepted [`Key::decode`] input, in decoded bytes.
pub const MAX_ENCODED_KEY_BYTES: u64 = 64 * 1024;

/// Deepest parent chain [`Key::decode`] accepts.
pub const MAX_KEY_DEPTH: usize = 100;

/// One level of an encoded key path.
#[derive(Serialize, Deserialize)]
struct PathStep<'a> {
    kind: Cow<'a, str>,
    identity: Option<KeyIdentity>,
}

/// Backend-neutral reference to an entity.
///
/// A key is a kind, an optional identity, and an optional parent key. Only
/// the immediate parent is stored; ancestry is found by following parents.
/// A key without an identity is *incomplete* and is completed by the backend
/// when the entity is first written.
///
/// Keys order by their path from the root: parents before children, then
/// kind, then identity (incomplete before ids before names).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    kind: String,
    identity: Option<KeyIdentity>,
    parent: Option<Box<Key>>,
}

impl Key {
    /// A key whose identity the backend will assign on write.
    pub fn incomplete(kind: impl Into<String>, parent: Option<&Key>) -> Self {
        Self {
            kind: kind.into(),
            identity: None,
            parent: parent.map(|p| Box::new(p.clone())),
        }
    }

    /// A key identified by a string name.
    pub fn named(kind: impl Into<String>, name: impl Into<String>, parent: Option<&Key>) -> Self {
        Self {
            kind: kind.into(),
            identity: Some(KeyIdentity::Name(name.into())),
            parent: parent.map(|p| Box::new(p.clone())),
        }
    }

    /// A key identified by a numeric id.
    pub fn with_id(kind: impl Into<String>, id: i64, parent: Option<&Key>) -> Self {
        Self {
            kind: kind.into(),
            identity: Some(KeyIdentity::Id(id)),
            parent: parent.map(|p| Box::new(p.clone())),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn identity(&self) -> Option<&KeyIdentity> {
        self.identity.as_ref()
    }

    /// The string name, if this key is name-identified.
    pub fn name(&self) -> Option<&str> {
        match &self.identity {
            Some(KeyIdentity::Name(name)) => Some(name),
            _ => None,
        }
    }

    /// The numeric id, if this key is id-identified.
    pub fn id(&self) -> Option<i64> {
        match &self.identity {
            Some(KeyIdentity::Id(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// Returns `true` if the key has no identity yet.
    pub fn is_incomplete(&self) -> bool {
        self.identity.is_none()
    }

    /// A copy of this key carrying the given numeric id.
    pub fn completed(&self, id: i64) -> Self {
        Self {
            kind: self.kind.clone(),
            identity: Some(KeyIdentity::Id(id)),
            parent: self.parent.clone(),
        }
    }

    /// Returns `true` if `ancestor` is this key or appears in its parent chain.
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }

    /// Root-first list of the keys along this key's path.
    pub fn path(&self) -> Vec<&Key> {
        let mut path = Vec::new();
        let mut current = Some(self);
        while let Some(key) = current {
            path.push(key);
            current = key.parent();
        }
        path.reverse();
        path
    }

    /// Opaque, round-trippable string form of this key.
    ///
    /// The key is written as its flat root-to-leaf path, so decoding never
    /// recurses.
    pub fn encode(&self) -> String {
        let steps: Vec<PathStep<'_>> = self
            .path()
            .into_iter()
            .map(|k| PathStep {
                kind: Cow::Borrowed(k.kind.as_str()),
                identity: k.identity.clone(),
            })
            .collect();
        // Keys hold only strings and integers; bincode cannot fail on them.
        let bytes = bincode::serialize(&steps).unwrap_or_default();
        hex::encode(bytes)
    }

    /// Parse a string produced by [`Key::encode`].
    ///
    /// Input longer than [`MAX_ENCODED_KEY_BYTES`] or deeper than
    /// [`MAX_KEY_DEPTH`] is rejected.
    pub fn decode(encoded: &str) -> StoreResult<Self> {
        let invalid = |e: String| StoreError::backend(format!("invalid key encoding: {e}"), "decode key");
        if encoded.len() as u64 > 2 * MAX_ENCODED_KEY_BYTES {
            return Err(invalid(format!("longer than {MAX_ENCODED_KEY_BYTES} bytes")));
        }
        let bytes = hex::decode(encoded).map_err(|e| invalid(e.to_string()))?;
        let steps: Vec<PathStep<'static>> = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(MAX_ENCODED_KEY_BYTES)
            .deserialize(&bytes)
            .map_err(|e| invalid(e.to_string()))?;
        if steps.len() > MAX_KEY_DEPTH {
            return Err(invalid(format!("{} levels, over the {MAX_KEY_DEPTH} level limit", steps.len())));
        }
        steps
            .into_iter()
            .fold(None, |parent: Option<Key>, step| {
                Some(Key {
                    kind: step.kind.into_owned(),
                    identity: step.identity,
                    parent: parent.map(Box::new),
                })
            })
            .ok_or_else(|| invalid("empty key path".into()))
    }

    fn cmp_component(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| self.identity.cmp(&other.identity))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.path();
        let rhs = other.path();
        for (a, b) in lhs.iter().zip(rhs.iter()) {
            match a.cmp_component(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        lhs.len().cmp(&rhs.len())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for key in self.path() {
            match &key.identity {
                Some(identity) => write!(f, "/{},{}", key.kind, identity)?,
                None => write!(f, "/{},?", key.kind)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}
