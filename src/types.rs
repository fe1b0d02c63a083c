use crate::ast::{Ast, NodeId, NodeKind};
use la_arena::{Arena, Idx};
use std::collections::{BTreeMap, HashMap};

pub type TypeId = Idx<Type>;
pub type InstanceId = Idx<MethodInstance>;

/// A type in the lattice. All values are interned in a [`Module`] and
/// compared by id: two structurally equal types are the same `TypeId`.
#[derive(Clone, Debug)]
pub enum Type {
    Object(ObjectType),
    /// A class together with all its transitive subclasses, as one type.
    Hierarchy { base: TypeId },
    /// Unordered set of ≥ 2 distinct member types. Members are kept sorted
    /// by id and never contain nested unions.
    Union { members: Vec<TypeId> },
}

/// A nominal class: primitive, user-defined, generic, or a generic
/// instantiation.
#[derive(Clone, Debug)]
pub struct ObjectType {
    pub name: String,
    /// `None` only for the root class `Object`.
    pub superclass: Option<TypeId>,
    pub subclasses: Vec<TypeId>,
    /// Ordered type parameter names; non-empty marks a generic class.
    pub type_params: Vec<String>,
    /// Bindings of a generic instantiation (`T → Int`); empty otherwise.
    pub type_vars: BTreeMap<String, TypeId>,
    /// The uninstantiated generic class an instantiation was built from.
    pub generic_root: Option<TypeId>,
    /// `@name → type`; every entry is a union including `Nil`.
    pub instance_vars: BTreeMap<String, TypeId>,
    /// Instance-side methods; redefinitions append, lookup prefers the most
    /// recent.
    pub methods: BTreeMap<String, Vec<NodeId>>,
    /// Class-side methods (`def self.x`).
    pub class_methods: BTreeMap<String, Vec<NodeId>>,
}

impl ObjectType {
    fn new(name: &str, superclass: Option<TypeId>) -> Self {
        Self {
            name: name.to_string(),
            superclass,
            subclasses: Vec::new(),
            type_params: Vec::new(),
            type_vars: BTreeMap::new(),
            generic_root: None,
            instance_vars: BTreeMap::new(),
            methods: BTreeMap::new(),
            class_methods: BTreeMap::new(),
        }
    }
}

/// A monomorphized method: one typed clone of a `Def` body per distinct
/// `(def, receiver, argument types, block arity)` combination.
#[derive(Clone, Debug)]
pub struct MethodInstance {
    /// The original `Def` node the instance was cloned from.
    pub def: NodeId,
    /// The typed clone of the def's body.
    pub body: NodeId,
    pub receiver: Option<TypeId>,
    pub arg_types: Vec<TypeId>,
    /// Provisionally `Nil` while the body is being inferred, so recursive
    /// self-calls terminate; widened once inference of the body finishes.
    pub return_type: TypeId,
    /// Per-position unions of the values the body yields; empty when the
    /// method never yields. Block parameters bind to these.
    pub yield_types: Vec<TypeId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct InstanceKey {
    pub(crate) def: NodeId,
    pub(crate) receiver: Option<TypeId>,
    pub(crate) args: Vec<TypeId>,
    pub(crate) block_arity: Option<usize>,
}

/// Outcome of method lookup along a superclass chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MethodLookup {
    Found(NodeId),
    /// The name exists somewhere on the chain, but never with this arity.
    WrongArity,
    Missing,
}

/// The root environment of one compilation: the type arena, the constant
/// registry seeded with the primitive classes, the interning tables, the
/// top-level method table and the method-instantiation cache. Created once,
/// passed explicitly through inference, discarded when the backend is done.
#[derive(Debug)]
pub struct Module {
    types: Arena<Type>,
    constants: BTreeMap<String, TypeId>,
    unions: HashMap<Vec<TypeId>, TypeId>,
    hierarchies: HashMap<TypeId, TypeId>,
    generics: HashMap<(TypeId, Vec<(String, TypeId)>), TypeId>,

    /// Top-level defs, callable without a receiver.
    pub(crate) module_methods: BTreeMap<String, Vec<NodeId>>,

    pub(crate) instances: Arena<MethodInstance>,
    pub(crate) instance_cache: HashMap<InstanceKey, InstanceId>,

    object: TypeId,
    nil: TypeId,
    bool_: TypeId,
    int: TypeId,
    float: TypeId,
    double: TypeId,
    char_: TypeId,
}

impl Module {
    pub fn new() -> Self {
        let mut types = Arena::new();
        let object = types.alloc(Type::Object(ObjectType::new("Object", None)));

        let mut module = Self {
            types,
            constants: BTreeMap::new(),
            unions: HashMap::new(),
            hierarchies: HashMap::new(),
            generics: HashMap::new(),
            module_methods: BTreeMap::new(),
            instances: Arena::new(),
            instance_cache: HashMap::new(),
            object,
            nil: object,
            bool_: object,
            int: object,
            float: object,
            double: object,
            char_: object,
        };
        module.constants.insert("Object".to_string(), object);

        module.nil = module.define_class("Nil", object, Vec::new());
        module.bool_ = module.define_class("Bool", object, Vec::new());
        module.int = module.define_class("Int", object, Vec::new());
        module.float = module.define_class("Float", object, Vec::new());
        module.double = module.define_class("Double", object, Vec::new());
        module.char_ = module.define_class("Char", object, Vec::new());
        module
    }

    // Primitive accessors.

    pub fn object(&self) -> TypeId {
        self.object
    }

    pub fn nil_type(&self) -> TypeId {
        self.nil
    }

    pub fn bool_type(&self) -> TypeId {
        self.bool_
    }

    pub fn int(&self) -> TypeId {
        self.int
    }

    pub fn float(&self) -> TypeId {
        self.float
    }

    pub fn double(&self) -> TypeId {
        self.double
    }

    pub fn char_type(&self) -> TypeId {
        self.char_
    }

    pub fn lookup_const(&self, name: &str) -> Option<TypeId> {
        self.constants.get(name).copied()
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id]
    }

    /// Registers a new class under `name` and links it into the hierarchy.
    pub fn define_class(
        &mut self,
        name: &str,
        superclass: TypeId,
        type_params: Vec<String>,
    ) -> TypeId {
        let mut object = ObjectType::new(name, Some(superclass));
        object.type_params = type_params;
        let id = self.types.alloc(Type::Object(object));
        self.constants.insert(name.to_string(), id);
        self.object_type_mut(superclass).subclasses.push(id);
        id
    }

    fn object_type(&self, id: TypeId) -> &ObjectType {
        match &self.types[id] {
            Type::Object(object) => object,
            other => unreachable!("expected an object type, got {other:?}"),
        }
    }

    fn object_type_mut(&mut self, id: TypeId) -> &mut ObjectType {
        match &mut self.types[id] {
            Type::Object(object) => object,
            other => unreachable!("expected an object type, got {other:?}"),
        }
    }

    pub fn is_object_type(&self, id: TypeId) -> bool {
        matches!(self.types[id], Type::Object(_))
    }

    /// True for an uninstantiated generic class (`Foo(T)` as declared).
    pub fn is_generic_class(&self, id: TypeId) -> bool {
        match &self.types[id] {
            Type::Object(object) => {
                !object.type_params.is_empty() && object.generic_root.is_none()
            }
            _ => false,
        }
    }

    // Per-object-type environment (object types only).

    pub fn superclass(&self, id: TypeId) -> Option<TypeId> {
        self.object_type(id).superclass
    }

    pub fn type_params(&self, id: TypeId) -> &[String] {
        &self.object_type(id).type_params
    }

    pub fn generic_root(&self, id: TypeId) -> Option<TypeId> {
        self.object_type(id).generic_root
    }

    pub fn type_vars(&self, id: TypeId) -> &BTreeMap<String, TypeId> {
        &self.object_type(id).type_vars
    }

    pub fn instance_vars(&self, id: TypeId) -> &BTreeMap<String, TypeId> {
        &self.object_type(id).instance_vars
    }

    pub fn lookup_instance_var(&self, id: TypeId, name: &str) -> Option<TypeId> {
        self.object_type(id).instance_vars.get(name).copied()
    }

    pub(crate) fn set_instance_var(&mut self, id: TypeId, name: &str, ty: TypeId) {
        self.object_type_mut(id)
            .instance_vars
            .insert(name.to_string(), ty);
    }

    pub fn methods(&self, id: TypeId) -> &BTreeMap<String, Vec<NodeId>> {
        &self.object_type(id).methods
    }

    pub(crate) fn add_method(&mut self, owner: TypeId, name: &str, def: NodeId) {
        self.object_type_mut(owner)
            .methods
            .entry(name.to_string())
            .or_default()
            .push(def);
    }

    pub(crate) fn add_class_method(&mut self, owner: TypeId, name: &str, def: NodeId) {
        self.object_type_mut(owner)
            .class_methods
            .entry(name.to_string())
            .or_default()
            .push(def);
    }

    pub(crate) fn add_module_method(&mut self, name: &str, def: NodeId) {
        self.module_methods
            .entry(name.to_string())
            .or_default()
            .push(def);
    }

    /// Walks the superclass chain (instantiations delegate to their generic
    /// root first) looking for a def matching name and arity. Most recent
    /// redefinition wins.
    pub(crate) fn find_method(
        &self,
        ast: &Ast,
        receiver: TypeId,
        name: &str,
        arity: usize,
    ) -> MethodLookup {
        self.find_in_tables(ast, receiver, name, arity, false)
    }

    pub(crate) fn find_class_method(
        &self,
        ast: &Ast,
        receiver: TypeId,
        name: &str,
        arity: usize,
    ) -> MethodLookup {
        self.find_in_tables(ast, receiver, name, arity, true)
    }

    fn find_in_tables(
        &self,
        ast: &Ast,
        receiver: TypeId,
        name: &str,
        arity: usize,
        class_side: bool,
    ) -> MethodLookup {
        let mut saw_name = false;
        let mut current = Some(receiver);
        while let Some(id) = current {
            let object = self.object_type(id);
            let table = if class_side {
                &object.class_methods
            } else {
                &object.methods
            };
            if let Some(defs) = table.get(name) {
                saw_name = saw_name || !defs.is_empty();
                for &def in defs.iter().rev() {
                    if def_arity(ast, def) == arity {
                        return MethodLookup::Found(def);
                    }
                }
            }
            current = object.generic_root.or(object.superclass);
        }
        if saw_name {
            MethodLookup::WrongArity
        } else {
            MethodLookup::Missing
        }
    }

    pub(crate) fn find_module_method(&self, ast: &Ast, name: &str, arity: usize) -> MethodLookup {
        let Some(defs) = self.module_methods.get(name) else {
            return MethodLookup::Missing;
        };
        for &def in defs.iter().rev() {
            if def_arity(ast, def) == arity {
                return MethodLookup::Found(def);
            }
        }
        if defs.is_empty() {
            MethodLookup::Missing
        } else {
            MethodLookup::WrongArity
        }
    }

    // Lattice operations.

    /// True when `sub`'s superclass chain reaches `ancestor`.
    pub fn is_subclass_of(&self, sub: TypeId, ancestor: TypeId) -> bool {
        if !self.is_object_type(sub) || !self.is_object_type(ancestor) {
            return false;
        }
        let mut current = self.object_type(sub).superclass;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.object_type(id).superclass;
        }
        false
    }

    /// The tagged union of `members`, flattened and deduplicated. A single
    /// surviving member is returned as-is; a member set spanning one class
    /// and its transitive subclasses collapses to that class's hierarchy
    /// type.
    pub fn union_of(&mut self, members: &[TypeId]) -> TypeId {
        let mut flat = Vec::new();
        for &member in members {
            match &self.types[member] {
                Type::Union { members } => flat.extend(members.iter().copied()),
                _ => flat.push(member),
            }
        }
        flat.sort_by_key(|&id| u32::from(id.into_raw()));
        flat.dedup();

        match flat.len() {
            0 => return self.nil,
            1 => return flat[0],
            _ => {}
        }

        for &candidate in &flat {
            if flat
                .iter()
                .all(|&other| other == candidate || self.is_subclass_of(other, candidate))
            {
                return self.hierarchy_of(candidate);
            }
        }

        if let Some(&id) = self.unions.get(&flat) {
            return id;
        }
        let id = self.types.alloc(Type::Union {
            members: flat.clone(),
        });
        self.unions.insert(flat, id);
        id
    }

    /// The hierarchy type rooted at `base`, created lazily and cached.
    pub fn hierarchy_of(&mut self, base: TypeId) -> TypeId {
        if let Some(&id) = self.hierarchies.get(&base) {
            return id;
        }
        let id = self.types.alloc(Type::Hierarchy { base });
        self.hierarchies.insert(base, id);
        id
    }

    /// `base` plus its transitive subclasses, in registration order.
    pub fn hierarchy_members(&self, base: TypeId) -> Vec<TypeId> {
        let mut members = vec![base];
        let mut index = 0;
        while index < members.len() {
            members.extend(self.object_type(members[index]).subclasses.iter().copied());
            index += 1;
        }
        members
    }

    /// The interned instantiation of generic class `class` under `bindings`.
    /// Equal bindings return the identical `TypeId`; a fresh instantiation
    /// starts with an empty ivar map of its own.
    pub fn generic_of(&mut self, class: TypeId, bindings: &BTreeMap<String, TypeId>) -> TypeId {
        let root = self.object_type(class);
        let name = root.name.clone();
        let superclass = root.superclass;
        let type_params = root.type_params.clone();

        let key_vars: Vec<(String, TypeId)> = type_params
            .iter()
            .map(|param| {
                (
                    param.clone(),
                    bindings.get(param).copied().unwrap_or(self.nil),
                )
            })
            .collect();
        let key = (class, key_vars.clone());
        if let Some(&id) = self.generics.get(&key) {
            return id;
        }

        let mut object = ObjectType::new(&name, superclass);
        object.type_params = type_params;
        object.type_vars = key_vars.into_iter().collect();
        object.generic_root = Some(class);
        let id = self.types.alloc(Type::Object(object));
        self.generics.insert(key, id);
        id
    }

    pub fn instance_return_type(&self, id: InstanceId) -> TypeId {
        self.instances[id].return_type
    }

    pub fn instance_body(&self, id: InstanceId) -> NodeId {
        self.instances[id].body
    }

    /// Renders a type for diagnostics: `Foo`, `Foo(Int)`, `Nil | Int`,
    /// `Foo+`.
    pub fn type_name(&self, id: TypeId) -> String {
        match &self.types[id] {
            Type::Object(object) => match object.generic_root {
                Some(_) if !object.type_vars.is_empty() => {
                    let args: Vec<String> = object
                        .type_params
                        .iter()
                        .map(|param| self.type_name(object.type_vars[param]))
                        .collect();
                    format!("{}({})", object.name, args.join(", "))
                }
                _ => object.name.clone(),
            },
            Type::Hierarchy { base } => format!("{}+", self.object_type(*base).name),
            Type::Union { members } => {
                let names: Vec<String> = members.iter().map(|&m| self.type_name(m)).collect();
                names.join(" | ")
            }
        }
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

fn def_arity(ast: &Ast, def: NodeId) -> usize {
    match ast.kind(def) {
        NodeKind::Def { params, .. } => params.len(),
        other => unreachable!("method table entry is not a def: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_of_one_is_identity() {
        let mut module = Module::new();
        let int = module.int();
        assert_eq!(module.union_of(&[int]), int);
        assert_eq!(module.union_of(&[int, int]), int);
    }

    #[test]
    fn union_of_flattens_nested_unions() {
        let mut module = Module::new();
        let (int, nil, bool_) = (module.int(), module.nil_type(), module.bool_type());
        let inner = module.union_of(&[int, nil]);
        let outer = module.union_of(&[inner, bool_]);
        assert_eq!(outer, module.union_of(&[int, nil, bool_]));
        let Type::Union { members } = module.ty(outer) else {
            panic!("expected a union");
        };
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn union_order_is_irrelevant() {
        let mut module = Module::new();
        let (int, nil) = (module.int(), module.nil_type());
        assert_eq!(module.union_of(&[int, nil]), module.union_of(&[nil, int]));
    }

    #[test]
    fn union_of_related_classes_collapses_to_hierarchy() {
        let mut module = Module::new();
        let object = module.object();
        let foo = module.define_class("Foo", object, Vec::new());
        let bar = module.define_class("Bar", foo, Vec::new());
        let union = module.union_of(&[foo, bar]);
        assert_eq!(union, module.hierarchy_of(foo));
    }

    #[test]
    fn union_of_unrelated_classes_stays_a_union() {
        let mut module = Module::new();
        let object = module.object();
        let node = module.define_class("Node", object, Vec::new());
        let nil = module.nil_type();
        let union = module.union_of(&[nil, node]);
        assert!(matches!(module.ty(union), Type::Union { .. }));
    }

    #[test]
    fn hierarchy_types_are_interned_per_root() {
        let mut module = Module::new();
        let object = module.object();
        let foo = module.define_class("Foo", object, Vec::new());
        assert_eq!(module.hierarchy_of(foo), module.hierarchy_of(foo));
    }

    #[test]
    fn generic_instantiations_are_interned_by_bindings() {
        let mut module = Module::new();
        let object = module.object();
        let boxed = module.define_class("Box", object, vec!["T".to_string()]);

        let mut int_binding = BTreeMap::new();
        int_binding.insert("T".to_string(), module.int());
        let a = module.generic_of(boxed, &int_binding);
        let b = module.generic_of(boxed, &int_binding);
        assert_eq!(a, b);

        let mut double_binding = BTreeMap::new();
        double_binding.insert("T".to_string(), module.double());
        let c = module.generic_of(boxed, &double_binding);
        assert_ne!(a, c);
    }

    #[test]
    fn type_names_render_for_diagnostics() {
        let mut module = Module::new();
        let object = module.object();
        let boxed = module.define_class("Box", object, vec!["T".to_string()]);
        let mut binding = BTreeMap::new();
        binding.insert("T".to_string(), module.int());
        let inst = module.generic_of(boxed, &binding);
        assert_eq!(module.type_name(inst), "Box(Int)");

        let nil = module.nil_type();
        let int = module.int();
        let union = module.union_of(&[nil, int]);
        assert_eq!(module.type_name(union), "Nil | Int");

        let hierarchy = module.hierarchy_of(boxed);
        assert_eq!(module.type_name(hierarchy), "Box+");
    }

    #[test]
    fn hierarchy_members_include_transitive_subclasses() {
        let mut module = Module::new();
        let object = module.object();
        let a = module.define_class("A", object, Vec::new());
        let b = module.define_class("B", a, Vec::new());
        let c = module.define_class("C", b, Vec::new());
        assert_eq!(module.hierarchy_members(a), vec![a, b, c]);
    }
}
