//! Identity-interning tables for objects shared between stream types.

use crate::compile::{CompileErrorKind, CompilerError};

/// Emission handle: the zero-based order in which an identity was first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interned {
    pub handle: Handle,
    /// True when this lookup created the entry; the caller emits the object exactly then.
    pub fresh: bool,
}

#[derive(Debug, Clone)]
struct Entry<K> {
    key: K,
    handle: Handle,
}

/// Association list from object identity to emission handle.
///
/// Membership is identity equality on `K`, never structural equality of the object
/// behind it. Entries are never removed.
#[derive(Debug, Clone)]
pub struct InternTable<K> {
    what: &'static str,
    entries: Vec<Entry<K>>,
}

impl<K: Copy + Eq> InternTable<K> {
    pub fn new(what: &'static str) -> Self {
        InternTable {
            what,
            entries: Vec::new(),
        }
    }

    pub fn lookup(&self, key: K) -> Option<Handle> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == key)
            .map(|e| e.handle)
    }

    pub fn lookup_or_insert(&mut self, key: K) -> Result<Interned, CompilerError> {
        if let Some(handle) = self.lookup(key) {
            return Ok(Interned {
                handle,
                fresh: false,
            });
        }
        self.entries.try_reserve(1).map_err(|e| {
            CompilerError::new(
                CompileErrorKind::Alloc,
                format!("{} map entry: {e}", self.what),
            )
        })?;
        let handle = Handle(self.entries.len());
        self.entries.push(Entry { key, handle });
        Ok(Interned {
            handle,
            fresh: true,
        })
    }

    /// Looks up an identity that an earlier pass must have interned.
    pub fn resolve(&self, key: K) -> Result<Handle, CompilerError>
    where
        K: std::fmt::Debug,
    {
        self.lookup(key).ok_or_else(|| {
            CompilerError::new(
                CompileErrorKind::Unresolved,
                format!("{} {key:?} was referenced but never emitted", self.what),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
