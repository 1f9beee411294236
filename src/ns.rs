//! Namespace repository and per-stream resolution context.
//!
//! The repository interns namespace URIs into dense identifiers that stay
//! valid for its whole life; a context resolves prefix bindings with
//! innermost-wins scoping while one input stream is parsed.

use std::collections::HashMap;

/// Identifier of an interned namespace URI.
///
/// Identifiers are dense small integers usable as array indices. Two ids
/// are equal iff their URIs are equal within one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NsId(u32);

impl NsId {
    /// "No namespace": the reserved id of the empty URI.
    pub const NONE: NsId = NsId(0);

    /// Sentinel returned when a prefix has no binding in scope.
    pub const UNKNOWN: NsId = NsId(u32::MAX);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_unknown(self) -> bool {
        self == NsId::UNKNOWN
    }
}

/// Predefined namespace sets for known dialects.
///
/// Loading one of these right after creating a repository pins the ids of
/// its URIs, so they are stable across sessions.
pub mod dialect {
    /// Microsoft SpreadsheetML (xls-xml) namespaces.
    pub const SPREADSHEET_ML: &[&str] = &[
        "urn:schemas-microsoft-com:office:spreadsheet",
        "urn:schemas-microsoft-com:office:office",
        "urn:schemas-microsoft-com:office:excel",
        "http://www.w3.org/TR/REC-html40",
    ];
}

/// Session-wide intern table mapping namespace URI -> [`NsId`].
#[derive(Debug, Default)]
pub struct NsRepository {
    uris: Vec<String>,
    index: HashMap<String, NsId>,
}

impl NsRepository {
    pub fn new() -> Self {
        let mut repo = NsRepository { uris: Vec::new(), index: HashMap::new() };
        // Id 0 is reserved for "no namespace".
        repo.uris.push(String::new());
        repo.index.insert(String::new(), NsId::NONE);
        repo
    }

    /// Intern a URI, returning its id. Idempotent.
    pub fn intern(&mut self, uri: &str) -> NsId {
        if let Some(&id) = self.index.get(uri) {
            return id;
        }
        let id = NsId(self.uris.len() as u32);
        self.uris.push(uri.to_string());
        self.index.insert(uri.to_string(), id);
        id
    }

    /// Load a predefined dialect set so its ids are assigned up front.
    pub fn add_predefined(&mut self, uris: &[&str]) {
        for uri in uris {
            self.intern(uri);
        }
    }

    /// The URI behind an id; empty for [`NsId::NONE`] or [`NsId::UNKNOWN`].
    pub fn uri(&self, id: NsId) -> &str {
        if id.is_unknown() {
            return "";
        }
        self.uris.get(id.index()).map(String::as_str).unwrap_or("")
    }

    /// Short display name for an id ("ns0", "ns1", ...), used in dumps and
    /// range header captions.
    pub fn short_name(&self, id: NsId) -> String {
        format!("ns{}", id.0)
    }

    /// Number of interned URIs, counting the reserved empty entry.
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.len() <= 1
    }
}

/// One prefix binding in a context.
#[derive(Debug, Clone)]
struct NsBinding {
    prefix: Vec<u8>,
    ns: NsId,
}

/// Per-stream prefix resolution context.
///
/// Bindings form a stack: `push` on element open, `pop` of the same prefix
/// on element close. `resolve` finds the innermost binding. The empty
/// prefix is the default namespace. The aliases a stream actually used
/// are recorded on the linked map-tree nodes as they are matched, which
/// is where the writer replays them from.
#[derive(Debug, Default)]
pub struct NsContext {
    bindings: Vec<NsBinding>,
}

impl NsContext {
    pub fn new() -> Self {
        NsContext::default()
    }

    /// Bind `prefix` to the URI interned through `repo`.
    pub fn push(&mut self, repo: &mut NsRepository, prefix: &[u8], uri: &str) -> NsId {
        let ns = repo.intern(uri);
        self.bindings.push(NsBinding { prefix: prefix.to_vec(), ns });
        ns
    }

    /// Remove the innermost binding for `prefix`, if any.
    pub fn pop(&mut self, prefix: &[u8]) {
        if let Some(pos) = self.bindings.iter().rposition(|b| b.prefix == prefix) {
            self.bindings.remove(pos);
        }
    }

    /// Resolve a prefix to its innermost binding.
    ///
    /// The empty prefix resolves to the default namespace; with no default
    /// declared it is [`NsId::NONE`]. An unbound non-empty prefix yields
    /// [`NsId::UNKNOWN`].
    pub fn resolve(&self, prefix: &[u8]) -> NsId {
        for binding in self.bindings.iter().rev() {
            if binding.prefix == prefix {
                return binding.ns;
            }
        }
        if prefix.is_empty() {
            NsId::NONE
        } else {
            NsId::UNKNOWN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_idempotent() {
        let mut repo = NsRepository::new();
        let a = repo.intern("http://example.com/a");
        let b = repo.intern("http://example.com/a");
        assert_eq!(a, b);
    }

    #[test]
    fn test_dense_ids() {
        let mut repo = NsRepository::new();
        let a = repo.intern("http://example.com/a");
        let b = repo.intern("http://example.com/b");
        assert_eq!(a.index(), 1);
        assert_eq!(b.index(), 2);
    }

    #[test]
    fn test_predefined_ids_stable() {
        let mut r1 = NsRepository::new();
        r1.add_predefined(dialect::SPREADSHEET_ML);
        let mut r2 = NsRepository::new();
        r2.add_predefined(dialect::SPREADSHEET_ML);
        let id1 = r1.intern(dialect::SPREADSHEET_ML[2]);
        let id2 = r2.intern(dialect::SPREADSHEET_ML[2]);
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_default_namespace() {
        let mut repo = NsRepository::new();
        let mut cxt = NsContext::new();
        assert_eq!(cxt.resolve(b""), NsId::NONE);
        let ns = cxt.push(&mut repo, b"", "http://example.com/default");
        assert_eq!(cxt.resolve(b""), ns);
    }

    #[test]
    fn test_innermost_wins_and_pop_restores() {
        let mut repo = NsRepository::new();
        let mut cxt = NsContext::new();
        let u1 = cxt.push(&mut repo, b"p", "http://example.com/1");
        let u2 = cxt.push(&mut repo, b"p", "http://example.com/2");
        assert_eq!(cxt.resolve(b"p"), u2);
        cxt.pop(b"p");
        assert_eq!(cxt.resolve(b"p"), u1);
    }

    #[test]
    fn test_unknown_prefix() {
        let cxt = NsContext::new();
        assert_eq!(cxt.resolve(b"nope"), NsId::UNKNOWN);
    }
}
