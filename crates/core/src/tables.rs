//! Reference tables emitted alongside a translated micro-VM program
//! (spec §3 "Reference tables"). Built by `nv-compiler`'s VM translator,
//! consumed by `nv-runtime`'s interpreter and JIT — hence living here
//! rather than in either crate alone.

/// A typed constant-pool entry. `LDC`'s operand is a dense index into this
/// table rather than an inline literal, so float/double precision is fixed
/// once at translation time (spec §4.5 "float/double constants must be
/// rendered with precision sufficient to round-trip").
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantEntry {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    /// A masked string-pool handle (see `nv-runtime::string_pool`).
    String(u64),
    /// A class-internal-name-pool id (see `nv-core`/name pool conventions).
    Class(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiArrayInfo {
    pub desc: String,
    pub dims: u8,
}

/// `|targets| = high - low + 1`, plus one default target (spec §3
/// invariant on switch table parallelism).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSwitchDescriptor {
    pub low: i32,
    pub high: i32,
    /// VM-instruction indices, one per key in `[low, high]`.
    pub targets: Vec<usize>,
    pub default_target: usize,
}

impl TableSwitchDescriptor {
    pub fn is_well_formed(&self) -> bool {
        self.high >= self.low && self.targets.len() as i64 == (self.high as i64 - self.low as i64 + 1)
    }
}

/// `|targets| = |keys|`, plus one default target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSwitchDescriptor {
    pub keys: Vec<i32>,
    pub targets: Vec<usize>,
    pub default_target: usize,
}

impl LookupSwitchDescriptor {
    pub fn is_well_formed(&self) -> bool {
        self.keys.len() == self.targets.len()
    }
}

/// The full set of auxiliary tables a translated program carries (spec §3
/// "Reference tables emitted alongside VM code").
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub fields: Vec<FieldRef>,
    pub methods: Vec<MethodRef>,
    pub classes: Vec<String>,
    pub multi_arrays: Vec<MultiArrayInfo>,
    pub table_switches: Vec<TableSwitchDescriptor>,
    pub lookup_switches: Vec<LookupSwitchDescriptor>,
    pub constants: Vec<ConstantEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_switch_well_formed_check() {
        let ts = TableSwitchDescriptor {
            low: 0,
            high: 2,
            targets: vec![1, 2, 3],
            default_target: 4,
        };
        assert!(ts.is_well_formed());
        let bad = TableSwitchDescriptor {
            targets: vec![1, 2],
            ..ts
        };
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn lookup_switch_well_formed_check() {
        let ls = LookupSwitchDescriptor {
            keys: vec![1, 5, 9],
            targets: vec![10, 20, 30],
            default_target: 0,
        };
        assert!(ls.is_well_formed());
    }
}
