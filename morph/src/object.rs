use std::{
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicI64, Ordering},
    },
};

use parking_lot::RwLock;

use crate::{
    ClassRef, Context, GraphNode, HiddenKey, Location, PropertyDescriptor,
    PropertyKey, RubyArray, RubyError, RubyResult, Shape, ShapeTable,
    StorageKind, Value, Visitable, Visitor, visit_graph,
};

/// Object ids are handed out process-wide, in increasing order.
static NEXT_OBJECT_ID: AtomicI64 = AtomicI64::new(1);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadMode {
    /// a missing property reads as `nil`
    ReadOrNil,
    /// a missing property is a `NameError`
    ReadOrFail,
}

/// What an object is besides its instance variables.
#[derive(Debug)]
pub enum ObjectBody {
    Basic,
    Array(RubyArray),
    /// identity and class must coincide, so no singleton classes
    Bignum(i128),
}

/// Per-instance storage block laid out by `shape`.
///
/// Shape and storage are swapped together under one lock, so no reader ever
/// sees a shape whose locations the block does not have yet.
#[derive(Debug)]
pub struct PropertyStore {
    shape: Arc<Shape>,
    primitives: Vec<u64>,
    references: Vec<Value>,
}

pub struct RubyObject {
    /// fixed at construction, owner of method and constant lookup
    logical_class: ClassRef,
    /// the table `properties.shape` was minted by
    shapes: Arc<ShapeTable>,
    singleton: OnceLock<ClassRef>,
    properties: RwLock<PropertyStore>,
    body: ObjectBody,
}

#[inline]
fn encode_primitive(kind: StorageKind, value: &Value) -> u64 {
    match (kind, value) {
        (StorageKind::Boolean, Value::Boolean(b)) => u64::from(*b),
        (StorageKind::Int32 | StorageKind::Int64, Value::Integer(i)) => {
            *i as u64
        }
        (StorageKind::Float64, Value::Float(f)) => f.to_bits(),
        (kind, v) => unreachable!("{v:?} does not fit {kind}"),
    }
}

#[inline]
fn decode_primitive(kind: StorageKind, bits: u64) -> Value {
    match kind {
        StorageKind::Boolean => Value::Boolean(bits != 0),
        StorageKind::Int32 | StorageKind::Int64 => {
            Value::Integer(bits as i64)
        }
        StorageKind::Float64 => Value::Float(f64::from_bits(bits)),
        kind => unreachable!("{kind} is not a primitive kind"),
    }
}

impl PropertyStore {
    fn new(shape: Arc<Shape>) -> Self {
        Self {
            primitives: vec![0; shape.primitive_slots()],
            references: vec![Value::Nil; shape.reference_slots()],
            shape,
        }
    }

    #[inline]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    fn read(&self, descriptor: &PropertyDescriptor) -> Value {
        match descriptor.location {
            Location::Primitive(offset) => decode_primitive(
                descriptor.kind,
                self.primitives[offset as usize],
            ),
            Location::Reference(offset) => {
                self.references[offset as usize].clone()
            }
        }
    }

    fn read_key(&self, key: PropertyKey) -> Option<Value> {
        self.shape.lookup(key).map(|desc| self.read(desc))
    }

    fn store(&mut self, descriptor: &PropertyDescriptor, value: Value) {
        match descriptor.location {
            Location::Primitive(offset) => {
                self.primitives[offset as usize] =
                    encode_primitive(descriptor.kind, &value);
            }
            Location::Reference(offset) => {
                self.references[offset as usize] = value;
            }
        }
    }

    /// Write `value` under `key`, transitioning the shape if the key is new
    /// or its kind cannot hold the value.
    ///
    /// Returns `false` and stores nothing if `key` is already defined and
    /// not writable.
    fn write(
        &mut self,
        shapes: &ShapeTable,
        key: PropertyKey,
        value: Value,
    ) -> bool {
        let kind = match self.shape.lookup(key) {
            Some(desc) if !desc.is_writable() => return false,
            Some(desc) if value.fits(desc.kind) => {
                let desc = *desc;
                self.store(&desc, value);
                return true;
            }
            Some(desc) => desc.kind.fit(&value),
            None => StorageKind::Uninitialized.fit(&value),
        };
        self.transition(shapes, key, kind, value);
        true
    }

    #[cold]
    fn transition(
        &mut self,
        shapes: &ShapeTable,
        key: PropertyKey,
        kind: StorageKind,
        value: Value,
    ) {
        let shape = shapes.transition(&self.shape, key, kind);
        self.primitives.resize(shape.primitive_slots(), 0);
        self.references.resize(shape.reference_slots(), Value::Nil);
        let desc = *shape
            .lookup(key)
            .unwrap_or_else(|| unreachable!("transition must define {key:?}"));
        self.shape = shape;
        self.store(&desc, value);
    }

    fn flag(&self, key: HiddenKey) -> bool {
        self.read_key(PropertyKey::Hidden(key))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Values held in the reference area of live properties.
    fn references(&self) -> impl Iterator<Item = &Value> {
        self.shape.properties().iter().filter_map(|desc| {
            match desc.location {
                Location::Reference(offset) => {
                    Some(&self.references[offset as usize])
                }
                Location::Primitive(_) => None,
            }
        })
    }
}

impl RubyObject {
    /// Construct an instance with the empty shape of `class`.
    ///
    /// Normally reached through `Context::allocate`. The object keeps the
    /// context's shape table for all later property writes.
    pub fn new(context: &Context, class: ClassRef, body: ObjectBody) -> Self {
        let shapes = context.shapes().clone();
        let shape = shapes.root(class.id());
        Self {
            logical_class: class,
            shapes,
            singleton: OnceLock::new(),
            properties: RwLock::new(PropertyStore::new(shape)),
            body,
        }
    }

    #[inline]
    pub fn logical_class(&self) -> &ClassRef {
        &self.logical_class
    }

    /// The singleton class if one was installed, the logical class otherwise.
    #[inline]
    pub fn meta_class(&self) -> ClassRef {
        self.singleton
            .get()
            .unwrap_or(&self.logical_class)
            .clone()
    }

    #[inline]
    pub fn shape(&self) -> Arc<Shape> {
        self.properties.read().shape.clone()
    }

    #[inline]
    pub fn shapes(&self) -> &Arc<ShapeTable> {
        &self.shapes
    }

    #[inline]
    pub fn body(&self) -> &ObjectBody {
        &self.body
    }

    #[inline]
    pub fn as_array(&self) -> Option<&RubyArray> {
        match &self.body {
            ObjectBody::Array(array) => Some(array),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bignum(&self) -> Option<i128> {
        match self.body {
            ObjectBody::Bignum(value) => Some(value),
            _ => None,
        }
    }

    /// Objects whose category forbids singleton classes.
    #[inline]
    pub fn has_no_singleton(&self) -> bool {
        matches!(self.body, ObjectBody::Bignum(_))
    }

    pub fn get_property(&self, name: &str, mode: ReadMode) -> RubyResult<Value> {
        let found = self.shapes.symbols().lookup(name).and_then(|symbol| {
            self.properties.read().read_key(PropertyKey::Name(symbol))
        });
        match (found, mode) {
            (Some(value), _) => Ok(value),
            (None, ReadMode::ReadOrNil) => Ok(Value::Nil),
            (None, ReadMode::ReadOrFail) => Err(RubyError::undefined_property(
                name,
                self.logical_class.name(),
            )),
        }
    }

    pub fn is_property_defined(&self, name: &str) -> bool {
        self.shapes.symbols().lookup(name).is_some_and(|symbol| {
            self.properties
                .read()
                .shape
                .lookup(PropertyKey::Name(symbol))
                .is_some()
        })
    }

    /// Write an instance variable.
    ///
    /// Fails without touching any state if the object is frozen, the
    /// symbol table included.
    pub fn set_property(&self, name: &str, value: Value) -> RubyResult<()> {
        let mut store = self.properties.write();
        if store.flag(HiddenKey::Frozen) {
            return Err(RubyError::frozen(self.logical_class.name()));
        }
        let key = PropertyKey::Name(self.shapes.symbols().intern(name));
        let written = store.write(&self.shapes, key, value);
        debug_assert!(written, "instance variables are writable");
        Ok(())
    }

    /// Enumerable property names in insertion order.
    pub fn instance_variable_names(&self) -> Vec<Arc<str>> {
        let shape = self.shape();
        shape
            .properties()
            .iter()
            .filter(|desc| desc.is_enumerable())
            .filter_map(|desc| match desc.key {
                PropertyKey::Name(symbol) => self.shapes.symbols().name(symbol),
                PropertyKey::Hidden(_) => None,
            })
            .collect()
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.properties.read().flag(HiddenKey::Frozen)
    }

    pub fn check_frozen(&self) -> RubyResult<()> {
        if self.is_frozen() {
            return Err(RubyError::frozen(self.logical_class.name()));
        }
        Ok(())
    }

    /// One way: there is no unfreeze.
    pub fn freeze(&self) {
        {
            let mut store = self.properties.write();
            if store.flag(HiddenKey::Frozen) {
                return;
            }
            store.write(
                &self.shapes,
                PropertyKey::Hidden(HiddenKey::Frozen),
                Value::Boolean(true),
            );
        }
        if let Some(singleton) = self.singleton.get() {
            singleton.freeze();
        }
        log::debug!("froze instance of {}", self.logical_class.name());
    }

    #[inline]
    pub fn is_tainted(&self) -> bool {
        self.properties.read().flag(HiddenKey::Tainted)
    }

    /// Tainting an already tainted object is allowed even when frozen.
    pub fn taint(&self) -> RubyResult<()> {
        let mut store = self.properties.write();
        if store.flag(HiddenKey::Tainted) {
            return Ok(());
        }
        if store.flag(HiddenKey::Frozen) {
            return Err(RubyError::frozen(self.logical_class.name()));
        }
        store.write(
            &self.shapes,
            PropertyKey::Hidden(HiddenKey::Tainted),
            Value::Boolean(true),
        );
        Ok(())
    }

    /// Identifier assigned on first request, stable for the object's lifetime.
    pub fn get_or_assign_object_id(&self) -> i64 {
        let key = PropertyKey::Hidden(HiddenKey::ObjectId);
        if let Some(Value::Integer(id)) = self.properties.read().read_key(key) {
            return id;
        }

        let mut store = self.properties.write();
        if let Some(Value::Integer(id)) = store.read_key(key) {
            return id;
        }
        let id = NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed);
        let assigned = store.write(&self.shapes, key, Value::Integer(id));
        debug_assert!(assigned, "object id written twice");
        id
    }

    /// Install the singleton class on first request and return it.
    ///
    /// Frozen objects get a frozen singleton class.
    pub fn get_or_assign_singleton_class(
        self: &Arc<Self>,
        context: &Context,
    ) -> RubyResult<ClassRef> {
        if self.has_no_singleton() {
            return Err(RubyError::cannot_define_singleton(
                self.logical_class.name(),
            ));
        }
        if let Some(singleton) = self.singleton.get() {
            return Ok(singleton.clone());
        }
        Ok(self.install_singleton_class(context))
    }

    #[cold]
    fn install_singleton_class(self: &Arc<Self>, context: &Context) -> ClassRef {
        let name = format!(
            "#<Class:#<{}:0x{:x}>>",
            self.logical_class.name(),
            self.get_or_assign_object_id()
        );
        let candidate = context.new_singleton_class(
            &name,
            &self.logical_class,
            Some(Arc::downgrade(self)),
        );
        // a racing thread may have won; its class is the one
        let _ = self.singleton.set(candidate);
        let singleton = self.meta_class();
        if self.is_frozen() {
            singleton.freeze();
        }
        singleton
    }

    /// Depth-first walk over everything reachable from this object.
    pub fn visit_graph(self: &Arc<Self>, visitor: &mut impl Visitor) {
        visit_graph(GraphNode::Object(self.clone()), visitor);
    }
}

// shallow, object graphs may be cyclic
impl fmt::Debug for RubyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RubyObject")
            .field("class", &self.logical_class.name())
            .field("shape", &self.properties.read().shape.id())
            .field("singleton", &self.singleton.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Visitable for RubyObject {
    fn visit_edges(&self, visitor: &mut impl FnMut(GraphNode)) {
        visitor(GraphNode::Class(self.meta_class()));
        let references = self
            .properties
            .read()
            .references()
            .cloned()
            .collect::<Vec<_>>();
        references
            .iter()
            .filter_map(GraphNode::from_value)
            .for_each(&mut *visitor);
        if let ObjectBody::Array(array) = &self.body {
            array.visit_edges(visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, thread};

    use super::*;
    use crate::{ContextCreateInfo, ObjectRef};

    fn setup() -> (Arc<Context>, ClassRef) {
        let ctx = Context::new(ContextCreateInfo::default());
        let point = ctx.define_class("Point", &ctx.core().object);
        (ctx, point)
    }

    #[test]
    fn missing_property_read_modes() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        let nil = p.get_property("@x", ReadMode::ReadOrNil);
        assert_eq!(nil, Ok(Value::Nil));
        let err = p
            .get_property("@x", ReadMode::ReadOrFail)
            .expect_err("missing property must fail");
        assert!(matches!(err, RubyError::UndefinedProperty { .. }));
    }

    #[test]
    fn set_then_get() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        p.set_property("@x", Value::from(1)).expect("not frozen");
        p.set_property("@name", Value::string("origin"))
            .expect("not frozen");
        let x = p.get_property("@x", ReadMode::ReadOrFail);
        assert_eq!(x, Ok(Value::from(1)));
        let name = p.get_property("@name", ReadMode::ReadOrFail);
        assert_eq!(name, Ok(Value::string("origin")));
        assert!(p.is_property_defined("@x"));
        assert!(!p.is_property_defined("@y"));
    }

    #[test]
    fn same_history_shares_shape() {
        let (ctx, point) = setup();
        let a = ctx.allocate(&point);
        let b = ctx.allocate(&point);
        for object in [&a, &b] {
            object.set_property("@x", Value::from(1)).expect("ok");
            object.set_property("@y", Value::from(2)).expect("ok");
        }
        assert_eq!(a.shape().id(), b.shape().id());
        assert!(Arc::ptr_eq(&a.shape(), &b.shape()));
    }

    #[test]
    fn repeated_histories_do_not_grow_the_table() {
        let (ctx, point) = setup();
        let first = ctx.allocate(&point);
        first.set_property("@x", Value::from(1)).expect("ok");
        first.set_property("@y", Value::from(2)).expect("ok");
        let shapes = ctx.shapes().shape_count();
        let transitions = ctx.shapes().transition_count();
        for i in 0..100 {
            let p = ctx.allocate(&point);
            p.set_property("@x", Value::from(i)).expect("ok");
            p.set_property("@y", Value::from(i)).expect("ok");
        }
        assert_eq!(ctx.shapes().shape_count(), shapes);
        assert_eq!(ctx.shapes().transition_count(), transitions);
    }

    #[test]
    fn different_order_means_different_shape() {
        let (ctx, point) = setup();
        let a = ctx.allocate(&point);
        let b = ctx.allocate(&point);
        a.set_property("@x", Value::from(1)).expect("ok");
        a.set_property("@y", Value::from(2)).expect("ok");
        b.set_property("@y", Value::from(2)).expect("ok");
        b.set_property("@x", Value::from(1)).expect("ok");
        assert_ne!(a.shape().id(), b.shape().id());
    }

    #[test]
    fn different_classes_do_not_share_shapes() {
        let (ctx, point) = setup();
        let other = ctx.define_class("Vector", &ctx.core().object);
        let a = ctx.allocate(&point);
        let b = ctx.allocate(&other);
        a.set_property("@x", Value::from(1)).expect("ok");
        b.set_property("@x", Value::from(1)).expect("ok");
        assert_ne!(a.shape().id(), b.shape().id());
        assert_eq!(a.shape().class_id(), point.id());
    }

    #[test]
    fn incompatible_write_widens_property_kind() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        p.set_property("@x", Value::from(1)).expect("ok");
        p.set_property("@y", Value::from(7)).expect("ok");
        let x = ctx.symbols().intern("@x");
        let kind_of_x = |p: &ObjectRef| {
            p.shape()
                .lookup(PropertyKey::Name(x))
                .map(|d| d.kind)
                .expect("x defined")
        };
        assert_eq!(kind_of_x(&p), StorageKind::Int32);

        p.set_property("@x", Value::from(2.5)).expect("ok");
        assert_eq!(kind_of_x(&p), StorageKind::Float64);
        p.set_property("@x", Value::string("s")).expect("ok");
        assert_eq!(kind_of_x(&p), StorageKind::Generic);

        assert_eq!(
            p.get_property("@x", ReadMode::ReadOrFail),
            Ok(Value::string("s"))
        );
        assert_eq!(
            p.get_property("@y", ReadMode::ReadOrFail),
            Ok(Value::from(7)),
            "other properties survive the migration"
        );

        // a compatible write afterwards stays in place
        let shape = p.shape().id();
        p.set_property("@x", Value::from(3)).expect("ok");
        assert_eq!(p.shape().id(), shape);
        assert_eq!(
            p.get_property("@x", ReadMode::ReadOrFail),
            Ok(Value::from(3))
        );
    }

    #[test]
    fn large_integers_keep_precision() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        let big = (1i64 << 60) + 1;
        p.set_property("@n", Value::from(1.5)).expect("ok");
        p.set_property("@n", Value::from(big)).expect("ok");
        assert_eq!(
            p.get_property("@n", ReadMode::ReadOrFail)
                .expect("defined")
                .as_i64(),
            Some(big)
        );
    }

    #[test]
    fn integer_after_float_stays_integer() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        p.set_property("@x", Value::from(1.5)).expect("ok");
        p.set_property("@x", Value::from(7)).expect("ok");
        let x = p.get_property("@x", ReadMode::ReadOrFail).expect("defined");
        assert!(matches!(x, Value::Integer(7)), "got {x:?}");
        let kind = p
            .shape()
            .lookup(PropertyKey::Name(ctx.symbols().intern("@x")))
            .map(|d| d.kind);
        assert_eq!(kind, Some(StorageKind::Generic));

        p.set_property("@x", Value::from(0.5)).expect("ok");
        let x = p.get_property("@x", ReadMode::ReadOrFail).expect("defined");
        assert!(matches!(x, Value::Float(f) if f == 0.5));
    }

    #[test]
    fn object_id_property_is_not_writable() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        let id = p.get_or_assign_object_id();
        let shape = p.shape().id();
        let key = PropertyKey::Hidden(HiddenKey::ObjectId);
        for value in [Value::Integer(id + 1), Value::string("forged")] {
            let written = p.properties.write().write(&p.shapes, key, value);
            assert!(!written);
        }
        assert_eq!(p.get_or_assign_object_id(), id);
        assert_eq!(p.shape().id(), shape);
    }

    #[test]
    fn frozen_set_does_not_intern_names() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        p.freeze();
        let symbols = ctx.symbols().len();
        p.set_property("@never_defined", Value::from(1))
            .expect_err("frozen");
        assert_eq!(ctx.symbols().len(), symbols);
        assert!(ctx.symbols().lookup("@never_defined").is_none());
    }

    #[test]
    fn objects_keep_the_shape_table_they_were_allocated_with() {
        let (home, point) = setup();
        let other = Context::new(ContextCreateInfo::default());
        let p = home.allocate(&point);
        assert!(Arc::ptr_eq(p.shapes(), home.shapes()));

        let shapes = other.shapes().shape_count();
        let symbols = other.symbols().len();
        p.set_property("@x", Value::from(1)).expect("ok");
        p.set_property("@x", Value::string("s")).expect("ok");
        assert_eq!(other.shapes().shape_count(), shapes);
        assert_eq!(other.symbols().len(), symbols);

        let found = home.shapes().get(p.shape().id());
        assert!(Arc::ptr_eq(&found, &p.shape()));
        assert_eq!(p.instance_variable_names().len(), 1);
    }

    #[test]
    fn frozen_set_fails_and_leaves_state_unchanged() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        p.set_property("@x", Value::from(1)).expect("ok");
        p.freeze();
        let shape = p.shape().id();

        let err = p
            .set_property("@x", Value::from(2))
            .expect_err("frozen");
        assert!(matches!(err, RubyError::FrozenModification { .. }));
        assert!(err.to_string().contains("Point"));
        let err = p
            .set_property("@new", Value::from(2))
            .expect_err("frozen");
        assert_eq!(err.exception_class(), "FrozenError");

        assert_eq!(p.shape().id(), shape);
        assert_eq!(
            p.get_property("@x", ReadMode::ReadOrFail),
            Ok(Value::from(1))
        );
        assert!(p.is_frozen());
        assert!(p.check_frozen().is_err());
    }

    #[test]
    fn flags_default_to_false_and_cost_nothing() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        assert!(!p.is_frozen());
        assert!(!p.is_tainted());
        assert!(p.shape().is_root(), "queries must not add properties");
    }

    #[test]
    fn hidden_properties_are_not_instance_variables() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        p.set_property("@x", Value::from(1)).expect("ok");
        p.get_or_assign_object_id();
        p.taint().expect("not frozen");
        p.freeze();
        p.set_property("@y", Value::from(1)).expect_err("frozen");
        let names = p.instance_variable_names();
        assert_eq!(names.len(), 1);
        assert_eq!(&*names[0], "@x");
        assert!(p.is_tainted());
    }

    #[test]
    fn taint_on_frozen_object() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        p.freeze();
        assert!(p.taint().is_err());

        let q = ctx.allocate(&point);
        q.taint().expect("not frozen");
        q.freeze();
        assert!(q.taint().is_ok(), "already tainted is a no-op");
    }

    #[test]
    fn object_id_is_stable_and_unique() {
        let (ctx, point) = setup();
        let a = ctx.allocate(&point);
        let b = ctx.allocate(&point);
        let id = a.get_or_assign_object_id();
        a.set_property("@x", Value::from(1)).expect("ok");
        a.set_property("@x", Value::string("now generic"))
            .expect("ok");
        assert_eq!(a.get_or_assign_object_id(), id);
        assert_ne!(b.get_or_assign_object_id(), id);
        a.freeze();
        assert_eq!(a.get_or_assign_object_id(), id);
    }

    #[test]
    fn object_ids_unique_across_threads() {
        let (ctx, point) = setup();
        let objects = (0..64).map(|_| ctx.allocate(&point)).collect::<Vec<_>>();
        let shared = Arc::new(objects);
        let handles = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    shared
                        .iter()
                        .map(|o| o.get_or_assign_object_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();
        let results = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect::<Vec<_>>();
        assert!(
            results.windows(2).all(|w| w[0] == w[1]),
            "every thread must observe the same id per object"
        );
        let unique = results[0].iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), 64);
    }

    #[test]
    fn singleton_class_is_idempotent() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        assert!(Arc::ptr_eq(&p.meta_class(), &point));
        let a = p.get_or_assign_singleton_class(&ctx).expect("allowed");
        let b = p.get_or_assign_singleton_class(&ctx).expect("allowed");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_singleton());
        assert!(Arc::ptr_eq(&p.meta_class(), &a));
        assert!(Arc::ptr_eq(p.logical_class(), &point));
        assert!(a.name().starts_with("#<Class:#<Point:0x"));
        let attached = a.attached().expect("attached object alive");
        assert!(Arc::ptr_eq(&attached, &p));
    }

    #[test]
    fn singletons_are_never_shared() {
        let (ctx, point) = setup();
        let a = ctx.allocate(&point);
        let b = ctx.allocate(&point);
        let sa = a.get_or_assign_singleton_class(&ctx).expect("allowed");
        let sb = b.get_or_assign_singleton_class(&ctx).expect("allowed");
        assert!(!Arc::ptr_eq(&sa, &sb));
    }

    #[test]
    fn bignum_cannot_have_singleton() {
        let (ctx, _) = setup();
        let big = ctx.new_bignum(1 << 100);
        let err = big
            .get_or_assign_singleton_class(&ctx)
            .expect_err("bignums have no singleton");
        assert!(matches!(err, RubyError::CannotDefineSingleton { .. }));
        assert!(Arc::ptr_eq(&big.meta_class(), &ctx.core().integer));
        assert_eq!(big.as_bignum(), Some(1 << 100));
    }

    #[test]
    fn frozen_object_gets_frozen_singleton() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        p.freeze();
        let singleton = p.get_or_assign_singleton_class(&ctx).expect("allowed");
        assert!(singleton.is_frozen());
        assert!(!point.is_frozen(), "logical class is untouched");
    }

    #[test]
    fn freezing_later_freezes_installed_singleton() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        let singleton = p.get_or_assign_singleton_class(&ctx).expect("allowed");
        assert!(!singleton.is_frozen());
        p.freeze();
        assert!(singleton.is_frozen());
    }

    #[test]
    fn concurrent_singleton_installation_agrees() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        let handles = (0..8)
            .map(|_| {
                let ctx = ctx.clone();
                let p = p.clone();
                thread::spawn(move || {
                    p.get_or_assign_singleton_class(&ctx).expect("allowed")
                })
            })
            .collect::<Vec<_>>();
        let classes = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect::<Vec<_>>();
        assert!(classes.iter().all(|c| Arc::ptr_eq(c, &classes[0])));
    }

    #[test]
    fn concurrent_writers_see_consistent_shape() {
        let (ctx, point) = setup();
        let p = ctx.allocate(&point);
        let handles = (0..4)
            .map(|t| {
                let p = p.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let name = format!("@v{}", (i + t) % 10);
                        p.set_property(&name, Value::from(i))
                            .expect("not frozen");
                    }
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .for_each(|h| h.join().expect("thread panicked"));
        assert_eq!(p.instance_variable_names().len(), 10);
    }
}
