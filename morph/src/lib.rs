mod allocator;
mod array;
mod class;
mod context;
mod error;
mod kind;
mod locals;
mod object;
mod operand;
mod shape;
mod slots;
mod symbols;
mod value;
mod visitor;

pub use allocator::*;
pub use array::*;
pub use class::*;
pub use context::*;
pub use error::*;
pub use kind::*;
pub use locals::*;
pub use object::*;
pub use operand::*;
pub use shape::*;
pub use slots::*;
pub use symbols::*;
pub use value::*;
pub use visitor::*;
