//! Self-specializing local variable access.
//!
//! Nodes may be executed by several threads at once, so the specialization
//! they carry is atomic.
use std::sync::{
    OnceLock,
    atomic::{AtomicU8, Ordering},
};

use crate::{Frame, Operand, RepresentationMismatch, StorageKind, Value};

#[derive(Debug)]
pub struct ReadLocal {
    index: usize,
    expected: AtomicU8,
}

impl ReadLocal {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            expected: AtomicU8::new(StorageKind::Uninitialized.as_raw()),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The kind this node currently reads with.
    #[inline]
    pub fn expected(&self) -> StorageKind {
        StorageKind::from_raw(self.expected.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn execute(&self, frame: &mut Frame) -> Value {
        match frame.read(self.index, self.expected()) {
            Ok(value) => value,
            Err(mismatch) => self.respecialize(frame, mismatch),
        }
    }

    #[cold]
    fn respecialize(
        &self,
        frame: &mut Frame,
        mismatch: RepresentationMismatch,
    ) -> Value {
        frame.revalidate(self.index);
        let kind = frame.kind(self.index);
        self.expected.store(kind.as_raw(), Ordering::Relaxed);
        log::trace!("local {} read respecialized: {mismatch}", self.index);
        frame.read_generic(self.index)
    }
}

#[derive(Debug)]
pub struct WriteLocal {
    index: usize,
    operand: Box<dyn Operand>,
    /// materialized once when the operand has a known value
    constant: OnceLock<Value>,
}

impl WriteLocal {
    pub fn new(index: usize, operand: Box<dyn Operand>) -> Self {
        Self {
            index,
            operand,
            constant: OnceLock::new(),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn execute(&self, frame: &mut Frame) -> Value {
        let value = if self.operand.has_known_value() {
            self.constant
                .get_or_init(|| {
                    let value = self.operand.materialize(frame);
                    let kind = frame.kind(self.index).fit(&value);
                    frame.generalize(self.index, kind);
                    value
                })
                .clone()
        } else {
            self.operand.materialize(frame)
        };
        frame.write(self.index, value.clone());
        value
    }
}
