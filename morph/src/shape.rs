//! Shapes describe the property layout of objects.
//!
//! Objects of the same class that received the same sequence of property
//! additions (same names, same storage kinds) share one `Shape`. Shapes form
//! a transition tree rooted at one empty shape per class:
//!
//! ```text
//!   root(Point)
//!       |  @x: int32
//!     shape 1
//!       |  @y: int32
//!     shape 2 ---- @x: float64 ----> shape 3
//! ```
//!
//! Shapes live in an arena owned by the `ShapeTable` and are addressed by
//! `ShapeId`. They are immutable once minted and never freed; only an
//! object's pointer to its shape moves. The table also interns the property
//! names its shapes refer to, and every object holds the table it was laid
//! out by, so names and shape ids never mix across tables.
use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use ahash::RandomState;
use bitflags::bitflags;
use parking_lot::RwLock;

use crate::{ClassId, StorageKind, Symbol, SymbolTable};

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u8 {
        /// listed by `instance_variable_names`
        const ENUMERABLE = 1 << 0;
        /// may be overwritten once defined
        const WRITABLE = 1 << 1;
    }
}

/// Reserved keys piggy-backing identity metadata on the property mechanism.
/// An object only pays for them once they are set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HiddenKey {
    ObjectId,
    Frozen,
    Tainted,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Name(Symbol),
    Hidden(HiddenKey),
}

impl PropertyKey {
    pub fn flags(self) -> PropertyFlags {
        match self {
            PropertyKey::Name(_) => {
                PropertyFlags::ENUMERABLE | PropertyFlags::WRITABLE
            }
            PropertyKey::Hidden(HiddenKey::ObjectId) => PropertyFlags::empty(),
            PropertyKey::Hidden(_) => PropertyFlags::WRITABLE,
        }
    }
}

/// Where a property lives in an instance's storage block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// unboxed bits in the primitive area
    Primitive(u32),
    /// a `Value` in the reference area
    Reference(u32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub key: PropertyKey,
    pub kind: StorageKind,
    pub location: Location,
    pub flags: PropertyFlags,
}

impl PropertyDescriptor {
    #[inline]
    pub fn is_enumerable(&self) -> bool {
        self.flags.contains(PropertyFlags::ENUMERABLE)
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.flags.contains(PropertyFlags::WRITABLE)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u32);

impl ShapeId {
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
pub struct Shape {
    id: ShapeId,
    parent: Option<ShapeId>,
    /// class the shape tree was rooted at
    class: ClassId,
    /// in insertion order
    properties: Vec<PropertyDescriptor>,
    primitive_slots: u32,
    reference_slots: u32,
}

impl Shape {
    fn root(id: ShapeId, class: ClassId) -> Self {
        Self {
            id,
            parent: None,
            class,
            properties: Vec::new(),
            primitive_slots: 0,
            reference_slots: 0,
        }
    }

    /// Child of `self` where `key` is stored with `kind`.
    ///
    /// An existing property keeps its position and, if the new kind stays in
    /// the same storage area, its location; otherwise it gets a fresh slot
    /// and the old one is left dead.
    fn derive(&self, id: ShapeId, key: PropertyKey, kind: StorageKind) -> Self {
        let mut properties = self.properties.clone();
        let mut primitive_slots = self.primitive_slots;
        let mut reference_slots = self.reference_slots;

        let mut allocate = |kind: StorageKind| {
            if kind.is_primitive() {
                primitive_slots += 1;
                Location::Primitive(primitive_slots - 1)
            } else {
                reference_slots += 1;
                Location::Reference(reference_slots - 1)
            }
        };

        match properties.iter_mut().find(|p| p.key == key) {
            Some(existing) => {
                let same_area = matches!(
                    (existing.location, kind.is_primitive()),
                    (Location::Primitive(_), true)
                        | (Location::Reference(_), false)
                );
                if !same_area {
                    existing.location = allocate(kind);
                }
                existing.kind = kind;
            }
            None => {
                let location = allocate(kind);
                properties.push(PropertyDescriptor {
                    key,
                    kind,
                    location,
                    flags: key.flags(),
                });
            }
        }

        Self {
            id,
            parent: Some(self.id),
            class: self.class,
            properties,
            primitive_slots,
            reference_slots,
        }
    }

    #[inline]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    #[inline]
    pub fn parent(&self) -> Option<ShapeId> {
        self.parent
    }

    #[inline]
    pub fn class_id(&self) -> ClassId {
        self.class
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    #[inline]
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    pub fn primitive_slots(&self) -> usize {
        self.primitive_slots as usize
    }

    #[inline]
    pub fn reference_slots(&self) -> usize {
        self.reference_slots as usize
    }

    #[inline]
    pub fn lookup(&self, key: PropertyKey) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.key == key)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct TransitionKey {
    parent: ShapeId,
    key: PropertyKey,
    kind: StorageKind,
}

/// Arena of every shape plus the shared transition cache.
///
/// Lock order: `transitions`/`roots` before `shapes`; `shapes` is never held
/// while acquiring another lock.
#[derive(Debug, Default)]
pub struct ShapeTable {
    /// property names used as `PropertyKey::Name`
    symbols: SymbolTable,
    shapes: RwLock<Vec<Arc<Shape>>>,
    roots: RwLock<HashMap<ClassId, ShapeId, RandomState>>,
    transitions: RwLock<HashMap<TransitionKey, ShapeId, RandomState>>,
}

impl ShapeTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Mint a new shape in the arena.
    fn mint(&self, build: impl FnOnce(ShapeId) -> Shape) -> ShapeId {
        let mut shapes = self.shapes.write();
        let raw = u32::try_from(shapes.len())
            .expect("shape arena exceeded u32::MAX entries");
        let id = ShapeId(raw);
        shapes.push(Arc::new(build(id)));
        id
    }

    /// # Panics
    /// if `id` was not minted by this table
    pub fn get(&self, id: ShapeId) -> Arc<Shape> {
        self.shapes.read()[id.0 as usize].clone()
    }

    /// The empty shape every instance of `class` starts with.
    pub fn root(&self, class: ClassId) -> Arc<Shape> {
        if let Some(&id) = self.roots.read().get(&class) {
            return self.get(id);
        }
        let id = match self.roots.write().entry(class) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = self.mint(|id| Shape::root(id, class));
                *entry.insert(id)
            }
        };
        self.get(id)
    }

    /// Shape reached from `from` by storing `key` with `kind`.
    ///
    /// Racing threads agree on a single child: the child is minted while the
    /// transition map is write-locked and only if no entry exists.
    pub fn transition(
        &self,
        from: &Shape,
        key: PropertyKey,
        kind: StorageKind,
    ) -> Arc<Shape> {
        let transition = TransitionKey {
            parent: from.id,
            key,
            kind,
        };
        if let Some(&id) = self.transitions.read().get(&transition) {
            log::trace!("cached shape transition {transition:?} -> {id:?}");
            return self.get(id);
        }
        self.transition_slow(from, transition)
    }

    #[cold]
    fn transition_slow(
        &self,
        from: &Shape,
        transition: TransitionKey,
    ) -> Arc<Shape> {
        let id = match self.transitions.write().entry(transition) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = self.mint(|id| {
                    from.derive(id, transition.key, transition.kind)
                });
                log::debug!(
                    "new shape {id:?} from {:?} adding {:?} as {}",
                    from.id,
                    transition.key,
                    transition.kind
                );
                *entry.insert(id)
            }
        };
        self.get(id)
    }

    /// Number of shapes minted, roots included.
    pub fn shape_count(&self) -> usize {
        self.shapes.read().len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.read().len()
    }
}
