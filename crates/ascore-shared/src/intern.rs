use std::collections::HashMap;

/// A handle into an [`InternTable`]. Cheap to copy and compare; equality and
/// hashing never touch the underlying string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternId(u32);

/// Case-sensitive string interner shared by every symbol kind the policy
/// model names (UAG/HAG/ASG names, user names, host literals, method and
/// authority strings).
///
/// The original C implementation keeps one generic hash table (`gphPvt`) for
/// all of these lookups; this is that table's Rust equivalent, with the
/// added benefit that once interned, comparing two names is an integer
/// comparison rather than a string comparison.
#[derive(Debug, Default)]
pub struct InternTable {
    strings: Vec<Box<str>>,
    ids: HashMap<Box<str>, InternId>,
}

impl InternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning its existing id if already present.
    pub fn intern(&mut self, s: &str) -> InternId {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = InternId(self.strings.len() as u32);
        let boxed: Box<str> = s.into();
        self.strings.push(boxed.clone());
        self.ids.insert(boxed, id);
        id
    }

    /// Looks up an already-interned string without inserting it.
    pub fn find(&self, s: &str) -> Option<InternId> {
        self.ids.get(s).copied()
    }

    pub fn resolve(&self, id: InternId) -> &str {
        &self.strings[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_string_twice_returns_the_same_id() {
        let mut table = InternTable::new();
        let a = table.intern("alice");
        let b = table.intern("alice");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_strings_get_distinct_ids() {
        let mut table = InternTable::new();
        let a = table.intern("alice");
        let b = table.intern("bob");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_round_trips() {
        let mut table = InternTable::new();
        let id = table.intern("hostname.example");
        assert_eq!(table.resolve(id), "hostname.example");
    }

    #[test]
    fn find_does_not_insert() {
        let mut table = InternTable::new();
        assert_eq!(table.find("nope"), None);
        assert_eq!(table.len(), 0);
    }
}
