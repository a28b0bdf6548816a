//! Local variable slots.
//!
//! A `FrameDescriptor` is the static description of a scope and is shared by
//! every activation of it. Each `FrameSlot` in it carries the storage kind
//! learned so far, so what one activation observes benefits all later ones.
//! A `Frame` is one activation and owns only the payloads.
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use crate::{ContextSettings, RepresentationMismatch, StorageKind, Value};

#[derive(Debug)]
pub struct FrameSlot {
    name: Arc<str>,
    index: usize,
    kind: AtomicU8,
}

impl FrameSlot {
    fn new(name: &str, index: usize, kind: StorageKind) -> Self {
        Self {
            name: Arc::from(name),
            index,
            kind: AtomicU8::new(kind.as_raw()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn kind(&self) -> StorageKind {
        StorageKind::from_raw(self.kind.load(Ordering::Acquire))
    }

    /// Move the slot kind up to `lub(kind, target)` and return the result.
    ///
    /// Racing generalizations all end at the least upper bound of every
    /// target requested.
    pub fn generalize(&self, target: StorageKind) -> StorageKind {
        let mut current = self.kind.load(Ordering::Acquire);
        loop {
            let from = StorageKind::from_raw(current);
            let to = from.lub(target);
            if to == from {
                return from;
            }
            match self.kind.compare_exchange_weak(
                current,
                to.as_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    log::debug!(
                        "generalized local {} from {from} to {to}",
                        self.name
                    );
                    return to;
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// Static description of a scope's locals.
#[derive(Debug)]
pub struct FrameDescriptor {
    slots: Vec<FrameSlot>,
}

impl FrameDescriptor {
    /// Fresh slots start `Uninitialized`, or `Generic` when optimistic
    /// locals are disabled.
    pub fn new(names: &[&str], settings: &ContextSettings) -> Arc<Self> {
        let initial = if settings.optimistic_locals {
            StorageKind::Uninitialized
        } else {
            StorageKind::Generic
        };
        let slots = names
            .iter()
            .enumerate()
            .map(|(index, name)| FrameSlot::new(name, index, initial))
            .collect();
        Arc::new(Self { slots })
    }

    #[inline]
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    pub fn find(&self, name: &str) -> Option<&FrameSlot> {
        self.slots.iter().find(|slot| slot.name() == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The raw contents of one slot in one activation, tagged with the kind it
/// was encoded for.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Generic(Value),
}

impl Payload {
    pub fn kind(&self) -> StorageKind {
        match self {
            Payload::Empty => StorageKind::Uninitialized,
            Payload::Boolean(_) => StorageKind::Boolean,
            Payload::Int32(_) => StorageKind::Int32,
            Payload::Int64(_) => StorageKind::Int64,
            Payload::Float64(_) => StorageKind::Float64,
            Payload::Generic(_) => StorageKind::Generic,
        }
    }

    /// Encode `value` for `kind`. `None` if the value does not fit.
    pub fn encode(kind: StorageKind, value: &Value) -> Option<Self> {
        if !value.fits(kind) {
            return None;
        }
        let payload = match kind {
            StorageKind::Uninitialized => return None,
            StorageKind::Boolean => Payload::Boolean(value.as_bool()?),
            StorageKind::Int32 => {
                Payload::Int32(i32::try_from(value.as_i64()?).ok()?)
            }
            StorageKind::Int64 => Payload::Int64(value.as_i64()?),
            StorageKind::Float64 => match value {
                Value::Float(f) => Payload::Float64(*f),
                _ => return None,
            },
            StorageKind::Generic => Payload::Generic(value.clone()),
        };
        Some(payload)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Payload::Empty => Value::Nil,
            Payload::Boolean(b) => Value::Boolean(*b),
            Payload::Int32(i) => Value::from(*i),
            Payload::Int64(i) => Value::Integer(*i),
            Payload::Float64(f) => Value::Float(*f),
            Payload::Generic(value) => value.clone(),
        }
    }
}

/// One activation of a scope.
#[derive(Debug)]
pub struct Frame {
    descriptor: Arc<FrameDescriptor>,
    payloads: Vec<Payload>,
}

impl Frame {
    pub fn new(descriptor: Arc<FrameDescriptor>) -> Self {
        let payloads = vec![Payload::Empty; descriptor.len()];
        Self {
            descriptor,
            payloads,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<FrameDescriptor> {
        &self.descriptor
    }

    /// Shared kind of the slot at `index`.
    #[inline]
    pub fn kind(&self, index: usize) -> StorageKind {
        self.descriptor.slot(index).kind()
    }

    /// Specialized read. Fails if this activation's payload is not encoded
    /// as `expected`.
    #[inline]
    pub fn read(
        &self,
        index: usize,
        expected: StorageKind,
    ) -> Result<Value, RepresentationMismatch> {
        let payload = &self.payloads[index];
        let actual = payload.kind();
        if actual != expected || actual == StorageKind::Uninitialized {
            return Err(RepresentationMismatch { expected, actual });
        }
        Ok(payload.to_value())
    }

    /// Unspecialized read, valid in any state. Unwritten slots read `nil`.
    #[inline]
    pub fn read_generic(&self, index: usize) -> Value {
        self.payloads[index].to_value()
    }

    /// Store `value`, generalizing the shared slot kind first if it cannot
    /// hold the value. Never fails.
    pub fn write(&mut self, index: usize, value: Value) {
        let slot = self.descriptor.slot(index);
        let mut kind = slot.kind();
        loop {
            if let Some(payload) = Payload::encode(kind, &value) {
                self.payloads[index] = payload;
                return;
            }
            kind = slot.generalize(kind.fit(&value));
        }
    }

    /// Widen the shared kind of the slot at `index` to include `target`.
    pub fn generalize(&mut self, index: usize, target: StorageKind) -> StorageKind {
        let kind = self.descriptor.slot(index).generalize(target);
        self.revalidate(index);
        kind
    }

    /// Re-encode this activation's payload for the current shared kind if
    /// another activation widened it in the meantime.
    #[cold]
    pub fn revalidate(&mut self, index: usize) {
        let kind = self.kind(index);
        let payload = &self.payloads[index];
        if matches!(payload, Payload::Empty) || payload.kind() == kind {
            return;
        }
        let value = payload.to_value();
        match Payload::encode(kind, &value) {
            Some(payload) => self.payloads[index] = payload,
            // the value cannot live in the widened kind as is, keep it boxed
            None => {
                let kind = self.descriptor.slot(index).generalize(StorageKind::Generic);
                self.payloads[index] = Payload::encode(kind, &value)
                    .unwrap_or(Payload::Generic(value));
            }
        }
    }
}
