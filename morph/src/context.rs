use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use crate::{
    Allocator, ArrayAllocator, BasicObjectAllocator, BignumAllocator, ClassId,
    ClassRef, ObjectBody, ObjectRef, RubyArray, RubyClass, RubyError,
    RubyObject, RubyResult, ShapeTable, SymbolTable, Value,
};

pub const DEFAULT_ARRAY_MIN_CAPACITY: usize = 16;
pub const DEFAULT_ARRAY_GROWTH_FACTOR: usize = 2;

// TODO: expose a per-class switch so hot classes can opt out of optimistic
// property kinds once polymorphism is observed
#[derive(Debug, Clone, Default)]
pub struct ContextCreateInfo {
    /// start fresh local slots uninitialized (specializable) or generic
    pub optimistic_locals: Option<bool>,
    /// start arrays with the narrowest storage or always with objects
    pub optimistic_arrays: Option<bool>,
    pub array_min_capacity: Option<usize>,
    pub array_growth_factor: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSettings {
    pub optimistic_locals: bool,
    pub optimistic_arrays: bool,
    pub array_min_capacity: usize,
    pub array_growth_factor: usize,
}

impl From<&ContextCreateInfo> for ContextSettings {
    fn from(info: &ContextCreateInfo) -> Self {
        Self {
            optimistic_locals: info.optimistic_locals.unwrap_or(true),
            optimistic_arrays: info.optimistic_arrays.unwrap_or(true),
            array_min_capacity: info
                .array_min_capacity
                .unwrap_or(DEFAULT_ARRAY_MIN_CAPACITY)
                .max(1),
            // anything below 2 would not be geometric
            array_growth_factor: info
                .array_growth_factor
                .unwrap_or(DEFAULT_ARRAY_GROWTH_FACTOR)
                .max(2),
        }
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self::from(&ContextCreateInfo::default())
    }
}

/// Classes the storage layer needs to know about.
#[derive(Debug)]
pub struct CoreClasses {
    pub basic_object: ClassRef,
    pub object: ClassRef,
    pub class: ClassRef,
    pub array: ClassRef,
    pub integer: ClassRef,
    pub float: ClassRef,
    pub string: ClassRef,
    pub symbol: ClassRef,
    pub nil_class: ClassRef,
    pub true_class: ClassRef,
    pub false_class: ClassRef,
}

/// Runtime state shared by every thread: settings, the shape table with its
/// property names, and the core classes.
#[derive(Debug)]
pub struct Context {
    settings: ContextSettings,
    /// handed to every object allocated here
    shapes: Arc<ShapeTable>,
    core: CoreClasses,
    next_class_id: AtomicU32,
}

impl CoreClasses {
    fn bootstrap(next_id: &AtomicU32) -> Self {
        let define = |name: &str,
                      superclass: Option<&ClassRef>,
                      allocator: Arc<dyn Allocator>| {
            let id = ClassId(next_id.fetch_add(1, Ordering::Relaxed));
            Arc::new(RubyClass::new(id, name, superclass.cloned(), allocator))
        };

        let basic: Arc<dyn Allocator> = Arc::new(BasicObjectAllocator);
        let arrays: Arc<dyn Allocator> = Arc::new(ArrayAllocator);
        let bignums: Arc<dyn Allocator> = Arc::new(BignumAllocator);
        let basic_object = define("BasicObject", None, basic.clone());
        let object = define("Object", Some(&basic_object), basic.clone());
        let class = define("Class", Some(&object), basic.clone());
        let array = define("Array", Some(&object), arrays);
        let integer = define("Integer", Some(&object), bignums);
        let float = define("Float", Some(&object), basic.clone());
        let string = define("String", Some(&object), basic.clone());
        let symbol = define("Symbol", Some(&object), basic.clone());
        let nil_class = define("NilClass", Some(&object), basic.clone());
        let true_class = define("TrueClass", Some(&object), basic.clone());
        let false_class = define("FalseClass", Some(&object), basic);

        Self {
            basic_object,
            object,
            class,
            array,
            integer,
            float,
            string,
            symbol,
            nil_class,
            true_class,
            false_class,
        }
    }
}

impl Context {
    pub fn new(info: ContextCreateInfo) -> Arc<Self> {
        let settings = ContextSettings::from(&info);
        let next_class_id = AtomicU32::new(0);
        let core = CoreClasses::bootstrap(&next_class_id);
        log::debug!("created context with {settings:?}");
        Arc::new(Self {
            settings,
            shapes: Arc::new(ShapeTable::new()),
            core,
            next_class_id,
        })
    }

    #[inline]
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    #[inline]
    pub fn symbols(&self) -> &SymbolTable {
        self.shapes.symbols()
    }

    #[inline]
    pub fn shapes(&self) -> &Arc<ShapeTable> {
        &self.shapes
    }

    #[inline]
    pub fn core(&self) -> &CoreClasses {
        &self.core
    }

    fn next_class_id(&self) -> ClassId {
        ClassId(self.next_class_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Define a class inheriting its superclass's allocator.
    pub fn define_class(&self, name: &str, superclass: &ClassRef) -> ClassRef {
        let allocator = superclass.allocator().clone();
        self.define_class_with_allocator(name, superclass, allocator)
    }

    pub fn define_class_with_allocator(
        &self,
        name: &str,
        superclass: &ClassRef,
        allocator: Arc<dyn Allocator>,
    ) -> ClassRef {
        Arc::new(RubyClass::new(
            self.next_class_id(),
            name,
            Some(superclass.clone()),
            allocator,
        ))
    }

    pub(crate) fn new_singleton_class(
        &self,
        name: &str,
        of: &ClassRef,
        attached: Option<std::sync::Weak<RubyObject>>,
    ) -> ClassRef {
        let class = Arc::new(RubyClass::new_singleton(
            self.next_class_id(),
            name,
            of,
            attached,
        ));
        log::debug!("created singleton class {name}");
        class
    }

    pub fn allocate(&self, class: &ClassRef) -> ObjectRef {
        class.allocator().allocate(self, class)
    }

    /// A new instance of `Array` holding `values`.
    pub fn new_array(&self, values: Vec<Value>) -> ObjectRef {
        let array = RubyArray::from_values(values, &self.settings);
        Arc::new(RubyObject::new(
            self,
            self.core.array.clone(),
            ObjectBody::Array(array),
        ))
    }

    pub fn new_bignum(&self, value: i128) -> ObjectRef {
        Arc::new(RubyObject::new(
            self,
            self.core.integer.clone(),
            ObjectBody::Bignum(value),
        ))
    }

    /// The class method lookup starts from: the singleton class if one was
    /// installed, the logical class otherwise.
    pub fn meta_class_of(&self, value: &Value) -> ClassRef {
        match value {
            Value::Nil => self.core.nil_class.clone(),
            Value::Boolean(true) => self.core.true_class.clone(),
            Value::Boolean(false) => self.core.false_class.clone(),
            Value::Integer(_) => self.core.integer.clone(),
            Value::Float(_) => self.core.float.clone(),
            Value::Symbol(_) => self.core.symbol.clone(),
            Value::String(_) => self.core.string.clone(),
            Value::Object(object) => object.meta_class(),
            Value::Class(class) => class
                .installed_meta()
                .cloned()
                .unwrap_or_else(|| self.core.class.clone()),
        }
    }

    /// Singleton class for any value.
    ///
    /// `nil`, `true` and `false` answer their own class; other immediates
    /// cannot have one.
    pub fn singleton_class_of(&self, value: &Value) -> RubyResult<ClassRef> {
        match value {
            v if v.has_class_as_singleton() => Ok(self.meta_class_of(v)),
            Value::Nil
            | Value::Boolean(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::Symbol(_)
            | Value::String(_) => {
                let class = self.meta_class_of(value);
                Err(RubyError::cannot_define_singleton(class.name()))
            }
            Value::Object(object) => object.get_or_assign_singleton_class(self),
            Value::Class(class) => Ok(self.singleton_class_of_class(class)),
        }
    }

    fn singleton_class_of_class(&self, class: &ClassRef) -> ClassRef {
        if let Some(meta) = class.installed_meta() {
            return meta.clone();
        }
        let name = format!("#<Class:{}>", class.name());
        let candidate = self.new_singleton_class(&name, &self.core.class, None);
        let meta = class.install_meta(candidate);
        if class.is_frozen() {
            meta.freeze();
        }
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults() {
        let settings = ContextSettings::default();
        assert!(settings.optimistic_locals);
        assert!(settings.optimistic_arrays);
        assert_eq!(settings.array_min_capacity, DEFAULT_ARRAY_MIN_CAPACITY);
        assert_eq!(settings.array_growth_factor, DEFAULT_ARRAY_GROWTH_FACTOR);
    }

    #[test]
    fn settings_clamp_growth() {
        let settings = ContextSettings::from(&ContextCreateInfo {
            array_growth_factor: Some(1),
            array_min_capacity: Some(0),
            ..Default::default()
        });
        assert_eq!(settings.array_growth_factor, 2);
        assert_eq!(settings.array_min_capacity, 1);
    }

    #[test]
    fn core_classes_have_distinct_ids() {
        let ctx = Context::new(ContextCreateInfo::default());
        let core = ctx.core();
        assert_ne!(core.object.id(), core.array.id());
        assert!(core.array.is_subclass_of(&core.basic_object));
        let point = ctx.define_class("Point", &core.object);
        assert!(point.id() > core.false_class.id());
    }

    #[test]
    fn nil_true_false_answer_their_class_as_singleton() {
        let ctx = Context::new(ContextCreateInfo::default());
        let nil = ctx.singleton_class_of(&Value::Nil).expect("nil");
        assert!(Arc::ptr_eq(&nil, &ctx.core().nil_class));
        let t = ctx.singleton_class_of(&Value::Boolean(true)).expect("true");
        assert!(Arc::ptr_eq(&t, &ctx.core().true_class));
    }

    #[test]
    fn immediates_cannot_have_singletons() {
        let ctx = Context::new(ContextCreateInfo::default());
        for value in [Value::from(1), Value::from(1.5)] {
            let err = ctx.singleton_class_of(&value).expect_err("immediate");
            assert!(matches!(err, RubyError::CannotDefineSingleton { .. }));
        }
    }

    #[test]
    fn class_singleton_is_idempotent() {
        let ctx = Context::new(ContextCreateInfo::default());
        let point = ctx.define_class("Point", &ctx.core().object);
        let value = Value::Class(point.clone());
        let a = ctx.singleton_class_of(&value).expect("class singleton");
        let b = ctx.singleton_class_of(&value).expect("class singleton");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "#<Class:Point>");
        assert!(Arc::ptr_eq(&ctx.meta_class_of(&value), &a));
    }

    #[test]
    fn allocate_uses_class_allocator() {
        let ctx = Context::new(ContextCreateInfo::default());
        let array = ctx.allocate(&ctx.core().array);
        assert!(array.as_array().is_some());
        let point = ctx.define_class("Point", &ctx.core().object);
        let object = ctx.allocate(&point);
        assert!(object.as_array().is_none());
        assert!(Arc::ptr_eq(object.logical_class(), &point));
    }
}
