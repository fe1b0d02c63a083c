use crate::ast::{Ast, ExitKind, NodeId, NodeKind};
use crate::error::InferError;
use crate::types::{InstanceId, InstanceKey, MethodInstance, MethodLookup, Module, Type, TypeId};
use crate::visitor::{VisitControl, VisitResult, Visitor, accept};
use std::collections::{BTreeMap, HashMap};

/// Runs the inference pass over the subtree rooted at `root` (normally the
/// program's top-level `Expressions`), decorating every reachable node with
/// a type and binding every call's `target_def`. Returns the root's type.
///
/// The pass is fatal on the first fault; the AST and Module are left
/// partially decorated in that case and must not be reused.
pub fn infer_program(
    module: &mut Module,
    ast: &mut Ast,
    root: NodeId,
) -> Result<TypeId, InferError> {
    let mut pass = TypeInference {
        module,
        frames: vec![Frame::new(None, BTreeMap::new())],
        class_stack: Vec::new(),
    };
    accept(ast, root, &mut pass)?;
    Ok(ast.type_of(root).expect("root typed after inference"))
}

/// One lexical activation: the top level, or one method instantiation.
struct Frame {
    /// Innermost scope last; blocks push a child scope.
    scopes: Vec<HashMap<String, TypeId>>,
    self_type: Option<TypeId>,
    /// Type-variable bindings visible in this body (the receiver
    /// instantiation's map, plus vars solved from arguments).
    type_vars: BTreeMap<String, TypeId>,
    /// Types contributed by explicit `return`s.
    return_types: Vec<TypeId>,
    /// Per-position types contributed by `yield`s.
    yield_exps: Vec<Vec<TypeId>>,
}

impl Frame {
    fn new(self_type: Option<TypeId>, type_vars: BTreeMap<String, TypeId>) -> Self {
        Self {
            scopes: vec![HashMap::new()],
            self_type,
            type_vars,
            return_types: Vec::new(),
            yield_exps: Vec::new(),
        }
    }
}

/// The flow-insensitive inference visitor. Holds the Module as explicit
/// context; all AST access flows through the visitor parameters.
struct TypeInference<'m> {
    module: &'m mut Module,
    frames: Vec<Frame>,
    /// Enclosing `ClassDef`s, innermost last; drives def registration and
    /// constant resolution.
    class_stack: Vec<TypeId>,
}

impl TypeInference<'_> {
    fn err(&self, ast: &Ast, at: NodeId, message: impl Into<String>) -> InferError {
        InferError::new(message, ast.location_of(at))
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("at least the top-level frame")
    }

    fn self_type(&self) -> Option<TypeId> {
        self.frames.last().and_then(|frame| frame.self_type)
    }

    fn node_type(&self, ast: &Ast, id: NodeId) -> TypeId {
        ast.type_of(id).expect("node typed by inference")
    }

    fn lookup_local(&self, name: &str) -> Option<TypeId> {
        let frame = self.frames.last()?;
        frame
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn bind_local(&mut self, name: &str, ty: TypeId) {
        self.frame()
            .scopes
            .last_mut()
            .expect("at least one scope per frame")
            .insert(name.to_string(), ty);
    }

    /// Constant resolution: the enclosing class chain first (type variables
    /// of the current instantiation count as innermost), then the Module
    /// registry.
    fn lookup_constant(&self, name: &str) -> Option<TypeId> {
        if let Some(frame) = self.frames.last()
            && let Some(&bound) = frame.type_vars.get(name)
        {
            return Some(bound);
        }
        self.module.lookup_const(name)
    }

    fn resolve_var(&mut self, ast: &Ast, id: NodeId, name: &str) -> Result<TypeId, InferError> {
        if name == "self" {
            return self
                .self_type()
                .ok_or_else(|| self.err(ast, id, "undefined local variable or method 'self'"));
        }
        if name.starts_with('@') {
            let owner = self.self_type().ok_or_else(|| {
                self.err(ast, id, format!("undefined local variable or method '{name}'"))
            })?;
            return Ok(match self.module.lookup_instance_var(owner, name) {
                Some(ty) => ty,
                None => {
                    // first read: the ivar exists but is unset
                    let nil = self.module.nil_type();
                    self.module.set_instance_var(owner, name, nil);
                    nil
                }
            });
        }
        if is_constant_name(name) {
            return self
                .lookup_constant(name)
                .ok_or_else(|| self.err(ast, id, format!("uninitialized constant {name}")));
        }
        self.lookup_local(name)
            .ok_or_else(|| self.err(ast, id, format!("undefined local variable or method '{name}'")))
    }

    /// Resolves a node that syntactically names a type: a constant `Var` or
    /// a `Generic` reference. Returns `None` for anything else (a value
    /// receiver).
    fn resolve_type_reference(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
    ) -> Result<Option<TypeId>, InferError> {
        match ast.kind(id).clone() {
            NodeKind::Var { name } if is_constant_name(&name) => {
                let ty = self
                    .lookup_constant(&name)
                    .ok_or_else(|| self.err(ast, id, format!("uninitialized constant {name}")))?;
                ast.set_type(id, ty);
                Ok(Some(ty))
            }
            NodeKind::Generic { .. } => Ok(Some(self.resolve_generic(ast, id)?)),
            _ => Ok(None),
        }
    }

    fn resolve_generic(&mut self, ast: &mut Ast, id: NodeId) -> Result<TypeId, InferError> {
        let NodeKind::Generic { name, args } = ast.kind(id).clone() else {
            unreachable!("resolve_generic on a non-generic node");
        };
        let class = self
            .lookup_constant(&name)
            .ok_or_else(|| self.err(ast, id, format!("uninitialized constant {name}")))?;
        let params: Vec<String> = self.module.type_params(class).to_vec();
        if params.len() != args.len() {
            return Err(self.err(ast, id, "wrong number of arguments"));
        }

        let mut bindings = BTreeMap::new();
        for (param, &arg) in params.iter().zip(&args) {
            let ty = self
                .resolve_type_reference(ast, arg)?
                .ok_or_else(|| self.err(ast, arg, "type argument must be a constant"))?;
            bindings.insert(param.clone(), ty);
        }
        let instantiation = self.module.generic_of(class, &bindings);
        ast.set_type(id, instantiation);
        Ok(instantiation)
    }

    fn infer_args(&mut self, ast: &mut Ast, args: &[NodeId]) -> Result<Vec<TypeId>, InferError> {
        let mut types = Vec::with_capacity(args.len());
        for &arg in args {
            accept(ast, arg, self)?;
            types.push(self.node_type(ast, arg));
        }
        Ok(types)
    }

    /// `Foo.new`, `Foo.allocate`, and class-side method calls.
    fn resolve_class_call(
        &mut self,
        ast: &mut Ast,
        call: NodeId,
        class: TypeId,
        name: &str,
        arg_types: &[TypeId],
        block: Option<NodeId>,
    ) -> Result<TypeId, InferError> {
        match name {
            "allocate" => {
                if !arg_types.is_empty() {
                    return Err(self.err(ast, call, "wrong number of arguments"));
                }
                let instance_ty = self.allocated_type(ast, class, &[]);
                let def = self.ensure_allocate_def(ast, class);
                let instance = self.instantiate_method(ast, def, Some(instance_ty), &[], None, call)?;
                self.module.instances[instance].return_type = instance_ty;
                ast.set_target_def(call, instance);
                Ok(instance_ty)
            }
            "new" => {
                let instance_ty = self.allocated_type(ast, class, arg_types);
                let init = match self
                    .module
                    .find_method(ast, instance_ty, "initialize", arg_types.len())
                {
                    MethodLookup::Found(def) => def,
                    MethodLookup::WrongArity => {
                        return Err(self.err(ast, call, "wrong number of arguments"));
                    }
                    MethodLookup::Missing => {
                        if !arg_types.is_empty() {
                            return Err(self.err(ast, call, "wrong number of arguments"));
                        }
                        self.ensure_initialize_def(ast, class)
                    }
                };
                let instance =
                    self.instantiate_method(ast, init, Some(instance_ty), arg_types, block, call)?;
                ast.set_target_def(call, instance);
                Ok(instance_ty)
            }
            _ => match self.module.find_class_method(ast, class, name, arg_types.len()) {
                MethodLookup::Found(def) => {
                    let instance =
                        self.instantiate_method(ast, def, Some(class), arg_types, block, call)?;
                    ast.set_target_def(call, instance);
                    Ok(self.module.instances[instance].return_type)
                }
                MethodLookup::WrongArity => {
                    Err(self.err(ast, call, "wrong number of arguments"))
                }
                MethodLookup::Missing => Err(self.err(
                    ast,
                    call,
                    format!(
                        "undefined method '{name}' for {}",
                        self.module.type_name(class)
                    ),
                )),
            },
        }
    }

    /// The type `allocate`/`new` produces for `class`: the class itself, or
    /// a generic instantiation with type vars solved from the arguments to
    /// `initialize`.
    fn allocated_type(&mut self, ast: &Ast, class: TypeId, arg_types: &[TypeId]) -> TypeId {
        if !self.module.is_generic_class(class) {
            return class;
        }
        let mut bindings = BTreeMap::new();
        if let MethodLookup::Found(init) =
            self.module
                .find_method(ast, class, "initialize", arg_types.len())
            && let NodeKind::Def { params, .. } = ast.kind(init)
        {
            let type_params = self.module.type_params(class);
            for (param, &arg_ty) in params.iter().zip(arg_types) {
                // later bindings of the same var win
                if let Some(restriction) = &param.restriction
                    && type_params.contains(restriction)
                {
                    bindings.insert(restriction.clone(), arg_ty);
                }
            }
        }
        self.module.generic_of(class, &bindings)
    }

    fn ensure_initialize_def(&mut self, ast: &mut Ast, class: TypeId) -> NodeId {
        let owner = self.module.generic_root(class).unwrap_or(class);
        match self.module.find_method(ast, owner, "initialize", 0) {
            MethodLookup::Found(def) => def,
            _ => {
                let def = ast.def(None, "initialize", Vec::new(), Vec::new());
                self.module.add_method(owner, "initialize", def);
                def
            }
        }
    }

    fn ensure_allocate_def(&mut self, ast: &mut Ast, class: TypeId) -> NodeId {
        let owner = self.module.generic_root(class).unwrap_or(class);
        match self.module.find_class_method(ast, owner, "allocate", 0) {
            MethodLookup::Found(def) => def,
            _ => {
                let def = ast.def(None, "allocate", Vec::new(), Vec::new());
                self.module.add_class_method(owner, "allocate", def);
                def
            }
        }
    }

    /// The concrete object types a receiver dispatches over.
    fn receiver_variants(&self, receiver: TypeId) -> Vec<TypeId> {
        match self.module.ty(receiver) {
            Type::Object(_) => vec![receiver],
            Type::Hierarchy { base } => self.module.hierarchy_members(*base),
            Type::Union { members } => members
                .iter()
                .flat_map(|&member| self.receiver_variants(member))
                .collect(),
        }
    }

    fn dispatch_call(
        &mut self,
        ast: &mut Ast,
        call: NodeId,
        receiver: TypeId,
        name: &str,
        arg_types: &[TypeId],
        block: Option<NodeId>,
    ) -> Result<TypeId, InferError> {
        let variants = self.receiver_variants(receiver);
        let mut targets = Vec::new();
        for &variant in &variants {
            match self.module.find_method(ast, variant, name, arg_types.len()) {
                MethodLookup::Found(def) => targets.push((variant, def)),
                MethodLookup::WrongArity => {
                    return Err(self.err(ast, call, "wrong number of arguments"));
                }
                MethodLookup::Missing => {
                    // a multi-variant receiver dispatches over the variants
                    // that define the method; a plain receiver must define it
                    if variants.len() == 1 {
                        return Err(self.err(
                            ast,
                            call,
                            format!(
                                "undefined method '{name}' for {}",
                                self.module.type_name(receiver)
                            ),
                        ));
                    }
                }
            }
        }
        if targets.is_empty() {
            return Err(self.err(
                ast,
                call,
                format!(
                    "undefined method '{name}' for {}",
                    self.module.type_name(receiver)
                ),
            ));
        }

        let mut returns = Vec::new();
        let mut first_instance = None;
        for (variant, def) in targets {
            let instance =
                self.instantiate_method(ast, def, Some(variant), arg_types, block, call)?;
            returns.push(self.module.instances[instance].return_type);
            first_instance.get_or_insert(instance);
        }
        ast.set_target_def(call, first_instance.expect("at least one target"));
        Ok(self.module.union_of(&returns))
    }

    fn resolve_receiverless(
        &mut self,
        ast: &mut Ast,
        call: NodeId,
        name: &str,
        arg_types: &[TypeId],
        block: Option<NodeId>,
    ) -> Result<TypeId, InferError> {
        if let Some(self_ty) = self.self_type() {
            match self.module.find_method(ast, self_ty, name, arg_types.len()) {
                MethodLookup::Found(def) => {
                    let instance =
                        self.instantiate_method(ast, def, Some(self_ty), arg_types, block, call)?;
                    ast.set_target_def(call, instance);
                    return Ok(self.module.instances[instance].return_type);
                }
                MethodLookup::WrongArity => {
                    return Err(self.err(ast, call, "wrong number of arguments"));
                }
                MethodLookup::Missing => {}
            }
        }
        match self.module.find_module_method(ast, name, arg_types.len()) {
            MethodLookup::Found(def) => {
                let instance = self.instantiate_method(ast, def, None, arg_types, block, call)?;
                ast.set_target_def(call, instance);
                Ok(self.module.instances[instance].return_type)
            }
            MethodLookup::WrongArity => Err(self.err(ast, call, "wrong number of arguments")),
            MethodLookup::Missing => Err(self.err(
                ast,
                call,
                format!("undefined local variable or method '{name}'"),
            )),
        }
    }

    /// Monomorphization. One typed clone of the def body per distinct
    /// `(def, receiver, argument types, block arity)` key. The instance is
    /// installed in the cache with a `Nil` return type before its body is
    /// inferred, so recursive calls resolve against a sound placeholder;
    /// the return type is widened to the union of `return` expressions and
    /// the body tail once inference finishes.
    fn instantiate_method(
        &mut self,
        ast: &mut Ast,
        def: NodeId,
        receiver: Option<TypeId>,
        arg_types: &[TypeId],
        block: Option<NodeId>,
        error_at: NodeId,
    ) -> Result<InstanceId, InferError> {
        let NodeKind::Def { params, body, .. } = ast.kind(def).clone() else {
            unreachable!("instantiating a non-def node");
        };
        if params.len() != arg_types.len() {
            return Err(self.err(ast, error_at, "wrong number of arguments"));
        }

        let block_arity = block.map(|b| match ast.kind(b) {
            NodeKind::Block { params, .. } => params.len(),
            _ => 0,
        });
        let key = InstanceKey {
            def,
            receiver,
            args: arg_types.to_vec(),
            block_arity,
        };
        if let Some(&instance) = self.module.instance_cache.get(&key) {
            if let Some(b) = block {
                let yields = self.module.instances[instance].yield_types.clone();
                self.type_block(ast, b, &yields)?;
            }
            return Ok(instance);
        }

        let cloned = ast.clone_subtree(body);
        let nil = self.module.nil_type();
        let instance = self.module.instances.alloc(MethodInstance {
            def,
            body: cloned,
            receiver,
            arg_types: arg_types.to_vec(),
            return_type: nil,
            yield_types: Vec::new(),
        });
        self.module.instance_cache.insert(key, instance);

        let mut type_vars = receiver
            .map(|r| self.module.type_vars(r).clone())
            .unwrap_or_default();
        let mut scope = HashMap::new();
        for (param, &arg_ty) in params.iter().zip(arg_types) {
            let param_ty = match &param.restriction {
                Some(restriction) => self.resolve_restriction(
                    ast,
                    error_at,
                    restriction,
                    receiver,
                    &mut type_vars,
                    arg_ty,
                )?,
                None => arg_ty,
            };
            scope.insert(param.name.clone(), param_ty);
        }

        let mut frame = Frame::new(receiver, type_vars);
        frame.scopes = vec![scope];
        self.frames.push(frame);

        // Seed instance-variable types from every assignment in the body
        // before reads are typed; the main pass below reports real faults.
        self.prescan_ivar_assignments(ast, cloned);
        let walked = accept(ast, cloned, self);
        let frame = self.frames.pop().expect("instance frame pushed above");
        walked?;

        let tail = ast.type_of(cloned).unwrap_or(nil);
        let mut returns = frame.return_types;
        returns.push(tail);
        let return_type = self.module.union_of(&returns);
        let yields: Vec<TypeId> = frame
            .yield_exps
            .iter()
            .map(|types| {
                if types.is_empty() {
                    nil
                } else {
                    self.module.union_of(types)
                }
            })
            .collect();
        {
            let inst = &mut self.module.instances[instance];
            inst.return_type = return_type;
            inst.yield_types = yields.clone();
        }
        if let Some(b) = block {
            self.type_block(ast, b, &yields)?;
        }
        Ok(instance)
    }

    /// Parameter restriction resolution: the receiver's type-var bindings
    /// win, then registered constants; an unknown name is a fault.
    fn resolve_restriction(
        &mut self,
        ast: &Ast,
        at: NodeId,
        restriction: &str,
        receiver: Option<TypeId>,
        type_vars: &mut BTreeMap<String, TypeId>,
        arg_ty: TypeId,
    ) -> Result<TypeId, InferError> {
        if let Some(&bound) = type_vars.get(restriction) {
            return Ok(bound);
        }
        if let Some(receiver) = receiver
            && self
                .module
                .type_params(receiver)
                .contains(&restriction.to_string())
        {
            // an unbound type variable solves from the argument
            type_vars.insert(restriction.to_string(), arg_ty);
            return Ok(arg_ty);
        }
        if let Some(ty) = self.module.lookup_const(restriction) {
            return Ok(ty);
        }
        Err(self.err(ast, at, format!("uninitialized constant {restriction}")))
    }

    /// Error-tolerant pre-pass over a freshly instantiated body: infers the
    /// `Assign` subtrees (descending through sequencing and branching) so
    /// instance-variable entries accumulate before any read is typed.
    fn prescan_ivar_assignments(&mut self, ast: &mut Ast, id: NodeId) {
        match ast.kind(id).clone() {
            NodeKind::Assign { .. } => {
                let _ = accept(ast, id, self);
            }
            NodeKind::Expressions { children } => {
                for child in children {
                    self.prescan_ivar_assignments(ast, child);
                }
            }
            NodeKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.prescan_ivar_assignments(ast, cond);
                self.prescan_ivar_assignments(ast, then_body);
                self.prescan_ivar_assignments(ast, else_body);
            }
            NodeKind::While { cond, body } => {
                self.prescan_ivar_assignments(ast, cond);
                self.prescan_ivar_assignments(ast, body);
            }
            NodeKind::ControlExit { exps, .. } => {
                for exp in exps {
                    self.prescan_ivar_assignments(ast, exp);
                }
            }
            _ => {}
        }
    }

    /// Types a block against the yield unions its method accumulated.
    /// Parameters bind positionally in a child scope of the calling frame.
    fn type_block(&mut self, ast: &mut Ast, block: NodeId, yields: &[TypeId]) -> VisitResult {
        let NodeKind::Block { params, body } = ast.kind(block).clone() else {
            unreachable!("typing a non-block node");
        };
        let nil = self.module.nil_type();
        let mut scope = HashMap::new();
        for (position, param) in params.iter().enumerate() {
            scope.insert(
                param.clone(),
                yields.get(position).copied().unwrap_or(nil),
            );
        }
        self.frame().scopes.push(scope);
        let walked = accept(ast, body, self);
        self.frame().scopes.pop();
        walked?;
        let ty = ast.type_of(body).unwrap_or(nil);
        ast.set_type(block, ty);
        Ok(())
    }
}

fn is_constant_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

impl Visitor for TypeInference<'_> {
    fn end_visit_expressions(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let NodeKind::Expressions { children } = ast.kind(id) else {
            unreachable!()
        };
        let ty = children
            .last()
            .and_then(|&child| ast.type_of(child))
            .unwrap_or_else(|| self.module.nil_type());
        ast.set_type(id, ty);
        Ok(())
    }

    fn end_visit_nil_literal(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let ty = self.module.nil_type();
        ast.set_type(id, ty);
        Ok(())
    }

    fn end_visit_bool_literal(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let ty = self.module.bool_type();
        ast.set_type(id, ty);
        Ok(())
    }

    fn end_visit_int_literal(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let ty = self.module.int();
        ast.set_type(id, ty);
        Ok(())
    }

    fn end_visit_float_literal(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let ty = self.module.float();
        ast.set_type(id, ty);
        Ok(())
    }

    fn end_visit_char_literal(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let ty = self.module.char_type();
        ast.set_type(id, ty);
        Ok(())
    }

    fn end_visit_var(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let NodeKind::Var { name } = ast.kind(id).clone() else {
            unreachable!()
        };
        let ty = self.resolve_var(ast, id, &name)?;
        ast.set_type(id, ty);
        Ok(())
    }

    fn visit_generic(&mut self, ast: &mut Ast, id: NodeId) -> VisitControl {
        self.resolve_generic(ast, id)?;
        Ok(false)
    }

    fn visit_class_def(&mut self, ast: &mut Ast, id: NodeId) -> VisitControl {
        let NodeKind::ClassDef {
            name,
            type_params,
            superclass,
            body,
        } = ast.kind(id).clone()
        else {
            unreachable!()
        };

        let parent = match &superclass {
            Some(parent_name) => self.module.lookup_const(parent_name).ok_or_else(|| {
                self.err(ast, id, format!("uninitialized constant {parent_name}"))
            })?,
            None => self.module.object(),
        };

        let class = match self.module.lookup_const(&name) {
            Some(existing) => {
                if superclass.is_some() {
                    let previous = self.module.superclass(existing).unwrap_or(parent);
                    if previous != parent {
                        return Err(self.err(
                            ast,
                            id,
                            format!(
                                "superclass mismatch for class {name} ({} for {})",
                                self.module.type_name(parent),
                                self.module.type_name(previous)
                            ),
                        ));
                    }
                }
                existing
            }
            None => self.module.define_class(&name, parent, type_params),
        };

        self.class_stack.push(class);
        let walked = accept(ast, body, self);
        self.class_stack.pop();
        walked?;

        let nil = self.module.nil_type();
        ast.set_type(id, nil);
        Ok(false)
    }

    fn visit_def(&mut self, ast: &mut Ast, id: NodeId) -> VisitControl {
        let NodeKind::Def { receiver, name, .. } = ast.kind(id).clone() else {
            unreachable!()
        };
        match receiver {
            Some(recv) => {
                let owner = match ast.kind(recv).clone() {
                    NodeKind::Var { name: recv_name } if recv_name == "self" => self
                        .class_stack
                        .last()
                        .copied()
                        .ok_or_else(|| {
                            self.err(ast, recv, "undefined local variable or method 'self'")
                        })?,
                    NodeKind::Var { name: recv_name } if is_constant_name(&recv_name) => {
                        self.module.lookup_const(&recv_name).ok_or_else(|| {
                            self.err(ast, recv, format!("uninitialized constant {recv_name}"))
                        })?
                    }
                    _ => {
                        return Err(self.err(ast, recv, "def receiver must be self or a class name"));
                    }
                };
                self.module.add_class_method(owner, &name, id);
            }
            None => match self.class_stack.last() {
                Some(&class) => self.module.add_method(class, &name, id),
                None => self.module.add_module_method(&name, id),
            },
        }
        let nil = self.module.nil_type();
        ast.set_type(id, nil);
        Ok(false)
    }

    fn visit_call(&mut self, ast: &mut Ast, id: NodeId) -> VisitControl {
        let NodeKind::Call {
            obj,
            name,
            args,
            block,
            ..
        } = ast.kind(id).clone()
        else {
            unreachable!()
        };

        let receiver = match obj {
            Some(obj_id) => match self.resolve_type_reference(ast, obj_id)? {
                Some(class) => {
                    let arg_types = self.infer_args(ast, &args)?;
                    let result =
                        self.resolve_class_call(ast, id, class, &name, &arg_types, block)?;
                    ast.set_type(id, result);
                    return Ok(false);
                }
                None => {
                    accept(ast, obj_id, self)?;
                    Some(self.node_type(ast, obj_id))
                }
            },
            None => None,
        };

        let arg_types = self.infer_args(ast, &args)?;
        let result = match receiver {
            Some(receiver) => self.dispatch_call(ast, id, receiver, &name, &arg_types, block)?,
            None => self.resolve_receiverless(ast, id, &name, &arg_types, block)?,
        };
        ast.set_type(id, result);
        Ok(false)
    }

    fn end_visit_if(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let NodeKind::If {
            then_body,
            else_body,
            ..
        } = *ast.kind(id)
        else {
            unreachable!()
        };
        let then_ty = self.node_type(ast, then_body);
        let else_ty = self.node_type(ast, else_body);
        let ty = self.module.union_of(&[then_ty, else_ty]);
        ast.set_type(id, ty);
        Ok(())
    }

    fn end_visit_while(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let nil = self.module.nil_type();
        ast.set_type(id, nil);
        Ok(())
    }

    fn visit_assign(&mut self, ast: &mut Ast, id: NodeId) -> VisitControl {
        let NodeKind::Assign { target, value } = *ast.kind(id) else {
            unreachable!()
        };
        accept(ast, value, self)?;
        let value_ty = self.node_type(ast, value);

        match ast.kind(target).clone() {
            NodeKind::Var { name } if name.starts_with('@') => {
                let owner = self.self_type().ok_or_else(|| {
                    self.err(
                        ast,
                        target,
                        format!("undefined local variable or method '{name}'"),
                    )
                })?;
                // accumulate: the entry stays "possibly unset" forever
                let entry = match self.module.lookup_instance_var(owner, &name) {
                    Some(previous) => self.module.union_of(&[previous, value_ty]),
                    None => {
                        let nil = self.module.nil_type();
                        self.module.union_of(&[nil, value_ty])
                    }
                };
                self.module.set_instance_var(owner, &name, entry);
                ast.set_type(target, entry);
            }
            NodeKind::Var { name } => {
                self.bind_local(&name, value_ty);
                ast.set_type(target, value_ty);
            }
            _ => {
                return Err(self.err(ast, target, "assignment target must be a variable"));
            }
        }
        ast.set_type(id, value_ty);
        Ok(false)
    }

    fn visit_block(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        // blocks are typed by call resolution, against their method's yields
        Ok(false)
    }

    fn end_visit_control_exit(&mut self, ast: &mut Ast, id: NodeId) -> VisitResult {
        let NodeKind::ControlExit { kind, exps } = ast.kind(id).clone() else {
            unreachable!()
        };
        let nil = self.module.nil_type();
        match kind {
            ExitKind::Return => {
                let exp_types: Vec<TypeId> =
                    exps.iter().map(|&exp| self.node_type(ast, exp)).collect();
                let combined = match exp_types.len() {
                    0 => nil,
                    1 => exp_types[0],
                    _ => self.module.union_of(&exp_types),
                };
                self.frame().return_types.push(combined);
            }
            ExitKind::Yield => {
                for (position, &exp) in exps.iter().enumerate() {
                    let ty = self.node_type(ast, exp);
                    let frame = self.frame();
                    while frame.yield_exps.len() <= position {
                        frame.yield_exps.push(Vec::new());
                    }
                    frame.yield_exps[position].push(ty);
                }
            }
            ExitKind::Break | ExitKind::Next => {}
        }
        ast.set_type(id, nil);
        Ok(())
    }
}
