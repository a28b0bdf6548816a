use std::cmp::Ordering;

use crate::Value;

/// Representation a storage location is currently specialized for.
///
/// The kinds form a lattice: `Uninitialized` is bottom, `Generic` is top,
/// the numeric kinds form the chain `Int32 < Int64 < Float64` and `Boolean`
/// is incomparable with every numeric kind.
#[rustfmt::skip]
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Uninitialized = 0,
    Boolean       = 1,
    Int32         = 2,
    Int64         = 3,
    Float64       = 4,
    Generic       = 5,
}

impl StorageKind {
    pub const ALL: [StorageKind; 6] = [
        StorageKind::Uninitialized,
        StorageKind::Boolean,
        StorageKind::Int32,
        StorageKind::Int64,
        StorageKind::Float64,
        StorageKind::Generic,
    ];

    #[inline]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => StorageKind::Uninitialized,
            1 => StorageKind::Boolean,
            2 => StorageKind::Int32,
            3 => StorageKind::Int64,
            4 => StorageKind::Float64,
            5 => StorageKind::Generic,
            _ => unreachable!("storage kind out of range: {raw}"),
        }
    }

    #[inline]
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            StorageKind::Int32 | StorageKind::Int64 | StorageKind::Float64
        )
    }

    /// Kinds whose payload is an unboxed primitive.
    #[inline]
    pub fn is_primitive(self) -> bool {
        self.is_numeric() || self == StorageKind::Boolean
    }

    /// Least upper bound of two kinds.
    pub fn lub(self, other: StorageKind) -> StorageKind {
        use StorageKind::*;
        match (self, other) {
            (Uninitialized, k) | (k, Uninitialized) => k,
            (Generic, _) | (_, Generic) => Generic,
            (a, b) if a == b => a,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                if a.as_raw() > b.as_raw() { a } else { b }
            }
            _ => Generic,
        }
    }

    /// `true` if a location of kind `self` may be generalized to `other`.
    #[inline]
    pub fn can_generalize_to(self, other: StorageKind) -> bool {
        self.lub(other) == other
    }

    /// Smallest kind at or above `self` that represents `value` exactly.
    ///
    /// This is `lub(self, kind_of(value))` unless the value cannot be held
    /// there as is (an integer in `Float64`), in which case the answer is
    /// `Generic`.
    pub fn fit(self, value: &Value) -> StorageKind {
        let target = self.lub(value.natural_kind());
        if value.fits(target) {
            target
        } else {
            StorageKind::Generic
        }
    }
}

impl PartialOrd for StorageKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.can_generalize_to(*other) {
            Some(Ordering::Less)
        } else if other.can_generalize_to(*self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageKind::Uninitialized => "uninitialized",
            StorageKind::Boolean => "boolean",
            StorageKind::Int32 => "int32",
            StorageKind::Int64 => "int64",
            StorageKind::Float64 => "float64",
            StorageKind::Generic => "generic",
        };
        f.write_str(name)
    }
}
