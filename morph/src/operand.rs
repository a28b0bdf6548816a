use std::fmt;

use crate::{Frame, ReadLocal, Value};

/// Something an access node evaluates to get the value it stores.
///
/// An optimizer outside this crate decides which operands have a value known
/// ahead of execution; the storage layer only asks.
pub trait Operand: fmt::Debug + Send + Sync {
    fn has_known_value(&self) -> bool {
        false
    }

    fn materialize(&self, frame: &mut Frame) -> Value;
}

/// A constant operand.
#[derive(Debug, Clone)]
pub struct Literal(pub Value);

impl Operand for Literal {
    #[inline]
    fn has_known_value(&self) -> bool {
        true
    }

    #[inline]
    fn materialize(&self, _frame: &mut Frame) -> Value {
        self.0.clone()
    }
}

/// Reads another local of the same frame.
#[derive(Debug)]
pub struct LocalOperand(pub ReadLocal);

impl Operand for LocalOperand {
    #[inline]
    fn materialize(&self, frame: &mut Frame) -> Value {
        self.0.execute(frame)
    }
}
