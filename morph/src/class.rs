use std::{
    fmt,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{Allocator, ClassRef, GraphNode, RubyObject, Visitable};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// A class or module. Also used for singleton classes, which are never shared.
pub struct RubyClass {
    id: ClassId,
    name: Arc<str>,
    superclass: Option<ClassRef>,
    allocator: Arc<dyn Allocator>,
    /// object this class is the singleton class of
    attached: Option<Weak<RubyObject>>,
    is_singleton: bool,
    frozen: AtomicBool,
    /// singleton class of the class itself
    meta: OnceLock<ClassRef>,
}

impl RubyClass {
    pub(crate) fn new(
        id: ClassId,
        name: &str,
        superclass: Option<ClassRef>,
        allocator: Arc<dyn Allocator>,
    ) -> Self {
        Self {
            id,
            name: Arc::from(name),
            superclass,
            allocator,
            attached: None,
            is_singleton: false,
            frozen: AtomicBool::new(false),
            meta: OnceLock::new(),
        }
    }

    /// Singleton classes inherit from the class they replace and share its
    /// allocator.
    pub(crate) fn new_singleton(
        id: ClassId,
        name: &str,
        of: &ClassRef,
        attached: Option<Weak<RubyObject>>,
    ) -> Self {
        Self {
            id,
            name: Arc::from(name),
            superclass: Some(of.clone()),
            allocator: of.allocator.clone(),
            attached,
            is_singleton: true,
            frozen: AtomicBool::new(false),
            meta: OnceLock::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    #[inline]
    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.is_singleton
    }

    pub fn attached(&self) -> Option<Arc<RubyObject>> {
        self.attached.as_ref().and_then(Weak::upgrade)
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            log::debug!("froze class {}", self.name);
        }
    }

    /// The singleton class of this class, if one was installed.
    #[inline]
    pub fn installed_meta(&self) -> Option<&ClassRef> {
        self.meta.get()
    }

    pub(crate) fn install_meta(&self, candidate: ClassRef) -> ClassRef {
        match self.meta.set(candidate.clone()) {
            Ok(()) => candidate,
            Err(_) => self
                .meta
                .get()
                .cloned()
                .unwrap_or(candidate),
        }
    }

    /// `true` if `self` is `other` or inherits from it.
    pub fn is_subclass_of(&self, other: &RubyClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.id == other.id {
                return true;
            }
            current = class.superclass.as_deref();
        }
        false
    }
}

impl fmt::Debug for RubyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RubyClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_singleton", &self.is_singleton)
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

impl Visitable for RubyClass {
    fn visit_edges(&self, visitor: &mut impl FnMut(GraphNode)) {
        if let Some(superclass) = &self.superclass {
            visitor(GraphNode::Class(superclass.clone()));
        }
        if let Some(meta) = self.meta.get() {
            visitor(GraphNode::Class(meta.clone()));
        }
        if let Some(attached) = self.attached() {
            visitor(GraphNode::Object(attached));
        }
    }
}
