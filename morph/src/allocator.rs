use std::{fmt, sync::Arc};

use crate::{ClassRef, Context, ObjectBody, ObjectRef, RubyArray, RubyObject};

/// Creates fresh instances of a class.
///
/// Supplied per class by whoever defines the class; the storage layer only
/// ever calls it through `Context::allocate`.
pub trait Allocator: fmt::Debug + Send + Sync {
    fn allocate(&self, context: &Context, class: &ClassRef) -> ObjectRef;
}

/// Plain objects with nothing but instance variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicObjectAllocator;

/// Empty arrays with `Null` storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrayAllocator;

/// Arbitrary precision integers, allocated as zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct BignumAllocator;

impl Allocator for BasicObjectAllocator {
    fn allocate(&self, context: &Context, class: &ClassRef) -> ObjectRef {
        Arc::new(RubyObject::new(context, class.clone(), ObjectBody::Basic))
    }
}

impl Allocator for ArrayAllocator {
    fn allocate(&self, context: &Context, class: &ClassRef) -> ObjectRef {
        let array = RubyArray::new(context.settings());
        Arc::new(RubyObject::new(
            context,
            class.clone(),
            ObjectBody::Array(array),
        ))
    }
}

impl Allocator for BignumAllocator {
    fn allocate(&self, context: &Context, class: &ClassRef) -> ObjectRef {
        Arc::new(RubyObject::new(context, class.clone(), ObjectBody::Bignum(0)))
    }
}
