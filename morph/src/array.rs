use std::{fmt, iter, mem};

use parking_lot::RwLock;

use crate::{
    ContextSettings, GraphNode, RubyError, RubyResult, StorageKind, Value,
};

/// Longest an array may grow; writes at or past it fail with `IndexError`.
pub const ARRAY_MAX_LEN: usize = isize::MAX as usize / mem::size_of::<Value>();

/// Backing buffer of an array, tagged with its element representation.
///
/// Only the numeric kinds and `Object` are used; booleans and every other
/// non-numeric value live in `Object` storage.
#[derive(Debug, Clone)]
pub enum ArrayStore {
    /// no storage committed yet
    Null,
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Object(Vec<Value>),
}

/// Largest magnitude an `i64` can have and still round-trip through `f64`.
const F64_EXACT_INT: i64 = 1 << 53;

/// Kind an array needs to hold `value`.
#[inline]
fn element_kind(value: &Value) -> StorageKind {
    match value.natural_kind() {
        StorageKind::Boolean => StorageKind::Generic,
        kind => kind,
    }
}

/// `true` if storage of `kind` holds `value` without loss.
///
/// Unlike locals and instance variables, float storage also takes integers
/// that convert exactly.
#[inline]
fn element_fits(kind: StorageKind, value: &Value) -> bool {
    match (kind, value) {
        (StorageKind::Float64, Value::Integer(i)) => {
            (-F64_EXACT_INT..=F64_EXACT_INT).contains(i)
        }
        _ => value.fits(kind),
    }
}

fn typed<T>(
    values: &[Value],
    capacity: usize,
    convert: impl Fn(&Value) -> Option<T>,
) -> Vec<T> {
    let mut buffer = Vec::with_capacity(capacity.max(values.len()));
    buffer.extend(values.iter().map(|v| {
        convert(v).unwrap_or_else(|| unreachable!("{v:?} escaped promotion"))
    }));
    buffer
}

impl ArrayStore {
    /// Build storage of `kind` holding `values`, which must all fit `kind`.
    fn build(kind: StorageKind, values: Vec<Value>, capacity: usize) -> Self {
        match kind {
            StorageKind::Uninitialized => ArrayStore::Null,
            StorageKind::Int32 => ArrayStore::Int32(typed(&values, capacity, |v| {
                v.as_i64().and_then(|i| i32::try_from(i).ok())
            })),
            StorageKind::Int64 => {
                ArrayStore::Int64(typed(&values, capacity, Value::as_i64))
            }
            StorageKind::Float64 => {
                ArrayStore::Float64(typed(&values, capacity, Value::as_f64))
            }
            StorageKind::Boolean | StorageKind::Generic => {
                let mut values = values;
                values.reserve(capacity.saturating_sub(values.len()));
                ArrayStore::Object(values)
            }
        }
    }

    /// `Null` reports as `Uninitialized`, `Object` as `Generic`.
    pub fn kind(&self) -> StorageKind {
        match self {
            ArrayStore::Null => StorageKind::Uninitialized,
            ArrayStore::Int32(_) => StorageKind::Int32,
            ArrayStore::Int64(_) => StorageKind::Int64,
            ArrayStore::Float64(_) => StorageKind::Float64,
            ArrayStore::Object(_) => StorageKind::Generic,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayStore::Null => 0,
            ArrayStore::Int32(v) => v.len(),
            ArrayStore::Int64(v) => v.len(),
            ArrayStore::Float64(v) => v.len(),
            ArrayStore::Object(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match self {
            ArrayStore::Null => 0,
            ArrayStore::Int32(v) => v.capacity(),
            ArrayStore::Int64(v) => v.capacity(),
            ArrayStore::Float64(v) => v.capacity(),
            ArrayStore::Object(v) => v.capacity(),
        }
    }

    fn reserve_exact(&mut self, additional: usize) {
        match self {
            ArrayStore::Null => {}
            ArrayStore::Int32(v) => v.reserve_exact(additional),
            ArrayStore::Int64(v) => v.reserve_exact(additional),
            ArrayStore::Float64(v) => v.reserve_exact(additional),
            ArrayStore::Object(v) => v.reserve_exact(additional),
        }
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            ArrayStore::Null => None,
            ArrayStore::Int32(v) => v.get(index).map(|&i| Value::from(i)),
            ArrayStore::Int64(v) => v.get(index).map(|&i| Value::from(i)),
            ArrayStore::Float64(v) => v.get(index).map(|&f| Value::from(f)),
            ArrayStore::Object(v) => v.get(index).cloned(),
        }
    }

    /// `true` if `value` can be stored without promotion.
    pub fn admits(&self, value: &Value) -> bool {
        match self {
            ArrayStore::Null => false,
            ArrayStore::Int32(_) => element_fits(StorageKind::Int32, value),
            ArrayStore::Int64(_) => element_fits(StorageKind::Int64, value),
            ArrayStore::Float64(_) => element_fits(StorageKind::Float64, value),
            ArrayStore::Object(_) => true,
        }
    }

    pub fn to_values(&self) -> Vec<Value> {
        match self {
            ArrayStore::Null => Vec::new(),
            ArrayStore::Int32(v) => v.iter().map(|&i| Value::from(i)).collect(),
            ArrayStore::Int64(v) => v.iter().map(|&i| Value::from(i)).collect(),
            ArrayStore::Float64(v) => v.iter().map(|&f| Value::from(f)).collect(),
            ArrayStore::Object(v) => v.clone(),
        }
    }

    /// A copy of this store generalized far enough to also admit `value`.
    ///
    /// The target is the least upper bound of the current kind and the
    /// value's kind, unless an existing element or the value itself would
    /// lose precision there; then it is `Object`.
    fn promoted(&self, value: &Value, capacity: usize) -> Self {
        let values = self.to_values();
        let mut target = self.kind().lub(element_kind(value));
        if !values.iter().chain(iter::once(value)).all(|v| element_fits(target, v)) {
            target = StorageKind::Generic;
        }
        Self::build(target, values, capacity)
    }

    /// Store into an existing index or append at `len`. The value must be
    /// admitted already.
    fn put(&mut self, index: usize, value: Value) {
        fn place<T>(buffer: &mut Vec<T>, index: usize, element: T) {
            if index == buffer.len() {
                buffer.push(element);
            } else {
                buffer[index] = element;
            }
        }

        match self {
            ArrayStore::Int32(v) => {
                let element = value.as_i64().and_then(|i| i32::try_from(i).ok());
                place(v, index, element.unwrap_or_else(|| unreachable!()));
            }
            ArrayStore::Int64(v) => {
                let element = value.as_i64();
                place(v, index, element.unwrap_or_else(|| unreachable!()));
            }
            ArrayStore::Float64(v) => {
                let element = value.as_f64();
                place(v, index, element.unwrap_or_else(|| unreachable!()));
            }
            ArrayStore::Object(v) => place(v, index, value),
            ArrayStore::Null => unreachable!("null storage admits nothing"),
        }
    }
}

/// A growable array that keeps its elements in the narrowest representation
/// seen so far.
///
/// Storage only ever moves up `Null -> Int32 -> Int64 -> Float64 -> Object`.
/// Promotion copies into a fully built buffer and swaps it in under the
/// write lock, so readers see either the old or the new buffer.
pub struct RubyArray {
    store: RwLock<ArrayStore>,
    min_capacity: usize,
    growth_factor: usize,
}

impl RubyArray {
    pub fn new(settings: &ContextSettings) -> Self {
        let store = if settings.optimistic_arrays {
            ArrayStore::Null
        } else {
            ArrayStore::Object(Vec::new())
        };
        Self::with_store(store, settings)
    }

    /// An array in the narrowest storage that admits every element.
    pub fn from_values(values: Vec<Value>, settings: &ContextSettings) -> Self {
        let kind = if settings.optimistic_arrays {
            let kind = values
                .iter()
                .map(element_kind)
                .fold(StorageKind::Uninitialized, StorageKind::lub);
            if values.iter().all(|v| element_fits(kind, v)) {
                kind
            } else {
                StorageKind::Generic
            }
        } else {
            StorageKind::Generic
        };
        let capacity = values.len();
        Self::with_store(ArrayStore::build(kind, values, capacity), settings)
    }

    fn with_store(store: ArrayStore, settings: &ContextSettings) -> Self {
        Self {
            store: RwLock::new(store),
            min_capacity: settings.array_min_capacity,
            growth_factor: settings.array_growth_factor,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.store.read().capacity()
    }

    #[inline]
    pub fn storage_kind(&self) -> StorageKind {
        self.store.read().kind()
    }

    /// Element at `index`, or `nil` for any index outside `[0, len)`.
    #[inline]
    pub fn read_at(&self, index: i64) -> Value {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.store.read().get(index))
            .unwrap_or(Value::Nil)
    }

    /// Store `value` at `index`, promoting the storage if it cannot hold the
    /// value and growing the array if `index >= len`. Indices past the end
    /// leave `nil` in the gap.
    ///
    /// Fails with `IndexError` and leaves the array untouched if the gap
    /// cannot be allocated.
    pub fn write_at(&self, index: usize, value: Value) -> RubyResult<()> {
        if index >= ARRAY_MAX_LEN {
            return Err(RubyError::index_too_big(index));
        }
        let mut store = self.store.write();
        if index > store.len() {
            self.fill_gap(&mut store, index)?;
        }
        self.store_at(&mut store, index, value);
        Ok(())
    }

    pub fn push(&self, value: Value) {
        let mut store = self.store.write();
        let len = store.len();
        self.store_at(&mut store, len, value);
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.store.read().to_values()
    }

    /// `index` is at most `len`.
    fn store_at(&self, store: &mut ArrayStore, index: usize, value: Value) {
        debug_assert!(index <= store.len());
        if !store.admits(&value) {
            self.promote(store, &value);
        }
        if index >= store.len() {
            self.grow(store);
        }
        store.put(index, value);
    }

    /// Pad with `nil` up to `index`, moving to object storage. The new
    /// buffer is reserved before anything is swapped in.
    #[cold]
    fn fill_gap(&self, store: &mut ArrayStore, index: usize) -> RubyResult<()> {
        let additional = index + 1 - store.len();
        let too_big = |_| RubyError::index_too_big(index);
        if let ArrayStore::Object(values) = store {
            values.try_reserve(additional).map_err(too_big)?;
            values.resize(index, Value::Nil);
            return Ok(());
        }
        let from = store.kind();
        let mut values = store.to_values();
        values.try_reserve_exact(additional).map_err(too_big)?;
        values.resize(index, Value::Nil);
        *store = ArrayStore::Object(values);
        log::debug!("promoted array storage {from} -> object to fill up to {index}");
        Ok(())
    }

    #[cold]
    fn promote(&self, store: &mut ArrayStore, value: &Value) {
        let from = store.kind();
        let capacity = store.capacity().max(self.min_capacity);
        *store = store.promoted(value, capacity);
        log::debug!(
            "promoted array storage {from} -> {} ({} elements)",
            store.kind(),
            store.len()
        );
    }

    fn grow(&self, store: &mut ArrayStore) {
        let len = store.len();
        let capacity = store.capacity();
        if len < capacity {
            return;
        }
        let target = (capacity * self.growth_factor).max(self.min_capacity);
        store.reserve_exact(target - len);
    }

    pub(crate) fn visit_edges(&self, visitor: &mut impl FnMut(GraphNode)) {
        let references = match &*self.store.read() {
            ArrayStore::Object(values) => values
                .iter()
                .filter_map(GraphNode::from_value)
                .collect::<Vec<_>>(),
            _ => return,
        };
        references.into_iter().for_each(visitor);
    }
}

impl fmt::Debug for RubyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.read();
        f.debug_struct("RubyArray")
            .field("kind", &store.kind())
            .field("len", &store.len())
            .field("capacity", &store.capacity())
            .finish()
    }
}
