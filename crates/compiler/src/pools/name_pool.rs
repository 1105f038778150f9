//! Name pools (C1, spec §4.1): deduplicated integer ids for strings, class
//! names, method refs, and field refs, referenced by emitted code as dense
//! per-kind array indices.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    StringLiteral,
    ClassInternalName,
    MethodRef,
    FieldRef,
}

impl NameKind {
    /// The array the emitted source addresses this kind's tokens through,
    /// per spec §4.1 "an array-indexed accessor".
    fn accessor_array(self) -> &'static str {
        match self {
            NameKind::StringLiteral => "nv_strings",
            NameKind::ClassInternalName => "nv_classes",
            NameKind::MethodRef => "nv_methods",
            NameKind::FieldRef => "nv_fields",
        }
    }
}

/// One pool per [`NameKind`], each append-only and deduplicated by
/// `(kind, text)` during a single class's compilation.
#[derive(Debug, Default)]
pub struct NamePool {
    entries: HashMap<NameKind, Vec<String>>,
    ids: HashMap<(NameKind, String), u32>,
}

impl NamePool {
    pub fn new() -> Self {
        NamePool::default()
    }

    /// Returns the stable id for `(kind, text)`, assigning a fresh dense id
    /// in first-seen order if this is the first time this pair has been
    /// interned.
    pub fn intern(&mut self, kind: NameKind, text: &str) -> u32 {
        let key = (kind, text.to_string());
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let list = self.entries.entry(kind).or_default();
        let id = list.len() as u32;
        list.push(text.to_string());
        self.ids.insert(key, id);
        id
    }

    /// The source-level expression emitted code uses to reference this
    /// entry: `<accessor_array>[<id>]`. Stable for the lifetime of the
    /// entry; never embeds the id as anything but a decimal array index,
    /// since that's this pool's addressing convention.
    pub fn token(&self, kind: NameKind, id: u32) -> String {
        format!("{}[{}]", kind.accessor_array(), id)
    }

    pub fn size(&self, kind: NameKind) -> usize {
        self.entries.get(&kind).map_or(0, |v| v.len())
    }

    /// Zero all four kinds between classes (spec §4.1 invariant).
    pub fn reset(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }

    pub fn entries(&self, kind: NameKind) -> &[String] {
        self.entries.get(&kind).map_or(&[], |v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_by_kind_and_text() {
        let mut pool = NamePool::new();
        let a = pool.intern(NameKind::StringLiteral, "hello");
        let b = pool.intern(NameKind::StringLiteral, "hello");
        assert_eq!(a, b);
        assert_eq!(pool.size(NameKind::StringLiteral), 1);
    }

    #[test]
    fn ids_are_dense_in_first_seen_order() {
        let mut pool = NamePool::new();
        assert_eq!(pool.intern(NameKind::ClassInternalName, "Foo"), 0);
        assert_eq!(pool.intern(NameKind::ClassInternalName, "Bar"), 1);
        assert_eq!(pool.intern(NameKind::ClassInternalName, "Foo"), 0);
    }

    #[test]
    fn different_kinds_do_not_alias() {
        let mut pool = NamePool::new();
        let a = pool.intern(NameKind::StringLiteral, "X");
        let b = pool.intern(NameKind::ClassInternalName, "X");
        assert_eq!(a, 0);
        assert_eq!(b, 0);
        assert_eq!(pool.size(NameKind::StringLiteral), 1);
        assert_eq!(pool.size(NameKind::ClassInternalName), 1);
    }

    #[test]
    fn token_is_an_array_index_expression() {
        let mut pool = NamePool::new();
        let id = pool.intern(NameKind::MethodRef, "Foo.bar()V");
        assert_eq!(pool.token(NameKind::MethodRef, id), "nv_methods[0]");
    }

    #[test]
    fn reset_clears_all_kinds() {
        let mut pool = NamePool::new();
        pool.intern(NameKind::FieldRef, "Foo.x:I");
        pool.reset();
        assert_eq!(pool.size(NameKind::FieldRef), 0);
        assert_eq!(pool.intern(NameKind::FieldRef, "Foo.x:I"), 0);
    }
}
