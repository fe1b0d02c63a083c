use crate::source::Location;
use crate::types::{InstanceId, TypeId};
use la_arena::{Arena, Idx};

pub type NodeId = Idx<Node>;

/// One AST node, allocated in an [`Ast`] arena.
///
/// `parent` is a back-link for scope walking, never an ownership edge; the
/// arena owns every node. `ty` stays unset until inference decorates the
/// node.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub location: Option<Location>,
    pub parent: Option<NodeId>,
    pub ty: Option<TypeId>,
}

/// A method parameter, optionally restricted to a named type or to one of
/// the enclosing class's type parameters (`value : T`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub restriction: Option<String>,
}

impl Param {
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            restriction: None,
        }
    }

    pub fn restricted(name: &str, restriction: &str) -> Self {
        Self {
            name: name.to_string(),
            restriction: Some(restriction.to_string()),
        }
    }
}

/// Discriminates the four control-flow exits, which share one node shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    Return,
    Break,
    Next,
    Yield,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Ordered sequence of expressions; the program root and every body.
    Expressions { children: Vec<NodeId> },

    NilLiteral,
    BoolLiteral { value: bool },
    IntLiteral { value: i64 },
    FloatLiteral { value: f64 },
    CharLiteral { value: char },

    /// A local (`x`), instance variable (`@x`) or constant (`Foo`) read.
    Var { name: String },

    /// Explicit generic instantiation reference, `Foo(Int)`.
    ///
    /// Arguments are themselves type references (`Var` constants or nested
    /// `Generic` nodes).
    Generic { name: String, args: Vec<NodeId> },

    ClassDef {
        name: String,
        type_params: Vec<String>,
        superclass: Option<String>,
        body: NodeId,
    },

    /// Method declaration. A `self` receiver registers the method on the
    /// class side. The body is typed per instantiation, never in place.
    Def {
        receiver: Option<NodeId>,
        name: String,
        params: Vec<Param>,
        body: NodeId,
    },

    /// Invocation. `target_def` is bound by inference to the monomorphized
    /// method instance the call resolved to.
    Call {
        obj: Option<NodeId>,
        name: String,
        args: Vec<NodeId>,
        block: Option<NodeId>,
        target_def: Option<InstanceId>,
    },

    If {
        cond: NodeId,
        then_body: NodeId,
        else_body: NodeId,
    },

    While { cond: NodeId, body: NodeId },

    Assign { target: NodeId, value: NodeId },

    /// A block argument to a call (`do |x| ... end`).
    Block { params: Vec<String>, body: NodeId },

    ControlExit { kind: ExitKind, exps: Vec<NodeId> },
}

/// The node arena plus the constructors that keep its invariants: every
/// child's `parent` is set at construction time.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Arena<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.alloc(Node {
            kind,
            location: None,
            parent: None,
            ty: None,
        });
        for child in self.child_ids(id) {
            self.nodes[child].parent = Some(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn location_of(&self, id: NodeId) -> Option<Location> {
        self.nodes[id].location
    }

    pub fn set_location(&mut self, id: NodeId, location: Location) {
        self.nodes[id].location = Some(location);
    }

    pub fn type_of(&self, id: NodeId) -> Option<TypeId> {
        self.nodes[id].ty
    }

    pub fn set_type(&mut self, id: NodeId, ty: TypeId) {
        self.nodes[id].ty = Some(ty);
    }

    pub fn set_target_def(&mut self, id: NodeId, instance: InstanceId) {
        match &mut self.nodes[id].kind {
            NodeKind::Call { target_def, .. } => *target_def = Some(instance),
            _ => unreachable!("target_def on a non-call node"),
        }
    }

    /// The node's children in traversal order.
    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        match &self.nodes[id].kind {
            NodeKind::Expressions { children } => children.clone(),
            NodeKind::NilLiteral
            | NodeKind::BoolLiteral { .. }
            | NodeKind::IntLiteral { .. }
            | NodeKind::FloatLiteral { .. }
            | NodeKind::CharLiteral { .. }
            | NodeKind::Var { .. } => Vec::new(),
            NodeKind::Generic { args, .. } => args.clone(),
            NodeKind::ClassDef { body, .. } => vec![*body],
            NodeKind::Def { receiver, body, .. } => {
                receiver.iter().copied().chain([*body]).collect()
            }
            NodeKind::Call {
                obj, args, block, ..
            } => obj
                .iter()
                .copied()
                .chain(args.iter().copied())
                .chain(block.iter().copied())
                .collect(),
            NodeKind::If {
                cond,
                then_body,
                else_body,
            } => vec![*cond, *then_body, *else_body],
            NodeKind::While { cond, body } => vec![*cond, *body],
            NodeKind::Assign { target, value } => vec![*target, *value],
            NodeKind::Block { body, .. } => vec![*body],
            NodeKind::ControlExit { exps, .. } => exps.clone(),
        }
    }

    // Constructors.

    pub fn expressions(&mut self, children: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::Expressions { children })
    }

    /// Normalizes a node sequence into a single `Expressions` node: empty
    /// input becomes an empty sequence, a lone `Expressions` passes through,
    /// anything else is wrapped.
    pub fn expressions_from(&mut self, nodes: Vec<NodeId>) -> NodeId {
        if nodes.len() == 1
            && let NodeKind::Expressions { .. } = self.nodes[nodes[0]].kind
        {
            return nodes[0];
        }
        self.expressions(nodes)
    }

    pub fn nil(&mut self) -> NodeId {
        self.alloc(NodeKind::NilLiteral)
    }

    pub fn bool_lit(&mut self, value: bool) -> NodeId {
        self.alloc(NodeKind::BoolLiteral { value })
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.alloc(NodeKind::IntLiteral { value })
    }

    pub fn float(&mut self, value: f64) -> NodeId {
        self.alloc(NodeKind::FloatLiteral { value })
    }

    pub fn char_lit(&mut self, value: char) -> NodeId {
        self.alloc(NodeKind::CharLiteral { value })
    }

    pub fn var(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Var {
            name: name.to_string(),
        })
    }

    pub fn generic(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::Generic {
            name: name.to_string(),
            args,
        })
    }

    pub fn class_def(
        &mut self,
        name: &str,
        type_params: Vec<&str>,
        superclass: Option<&str>,
        body: Vec<NodeId>,
    ) -> NodeId {
        let body = self.expressions_from(body);
        self.alloc(NodeKind::ClassDef {
            name: name.to_string(),
            type_params: type_params.iter().map(|p| p.to_string()).collect(),
            superclass: superclass.map(str::to_string),
            body,
        })
    }

    pub fn def(
        &mut self,
        receiver: Option<NodeId>,
        name: &str,
        params: Vec<Param>,
        body: Vec<NodeId>,
    ) -> NodeId {
        let body = self.expressions_from(body);
        self.alloc(NodeKind::Def {
            receiver,
            name: name.to_string(),
            params,
            body,
        })
    }

    pub fn call(
        &mut self,
        obj: Option<NodeId>,
        name: &str,
        args: Vec<NodeId>,
        block: Option<NodeId>,
    ) -> NodeId {
        self.alloc(NodeKind::Call {
            obj,
            name: name.to_string(),
            args,
            block,
            target_def: None,
        })
    }

    pub fn if_expr(&mut self, cond: NodeId, then_body: NodeId, else_body: Option<NodeId>) -> NodeId {
        let else_body = match else_body {
            Some(node) => node,
            None => self.expressions(Vec::new()),
        };
        self.alloc(NodeKind::If {
            cond,
            then_body,
            else_body,
        })
    }

    pub fn while_expr(&mut self, cond: NodeId, body: Vec<NodeId>) -> NodeId {
        let body = self.expressions_from(body);
        self.alloc(NodeKind::While { cond, body })
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.alloc(NodeKind::Assign { target, value })
    }

    pub fn block(&mut self, params: Vec<&str>, body: Vec<NodeId>) -> NodeId {
        let body = self.expressions_from(body);
        self.alloc(NodeKind::Block {
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        })
    }

    pub fn control_exit(&mut self, kind: ExitKind, exps: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::ControlExit { kind, exps })
    }

    pub fn ret(&mut self, exps: Vec<NodeId>) -> NodeId {
        self.control_exit(ExitKind::Return, exps)
    }

    pub fn yield_exit(&mut self, exps: Vec<NodeId>) -> NodeId {
        self.control_exit(ExitKind::Yield, exps)
    }

    /// Deep copy of a subtree: locations are preserved, parent links are
    /// rebuilt within the copy, and inference results (`ty`, `target_def`)
    /// are cleared so the copy can be typed independently.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let location = self.nodes[id].location;
        let kind = match self.nodes[id].kind.clone() {
            NodeKind::Expressions { children } => NodeKind::Expressions {
                children: children.iter().map(|&c| self.clone_subtree(c)).collect(),
            },
            leaf @ (NodeKind::NilLiteral
            | NodeKind::BoolLiteral { .. }
            | NodeKind::IntLiteral { .. }
            | NodeKind::FloatLiteral { .. }
            | NodeKind::CharLiteral { .. }
            | NodeKind::Var { .. }) => leaf,
            NodeKind::Generic { name, args } => NodeKind::Generic {
                name,
                args: args.iter().map(|&a| self.clone_subtree(a)).collect(),
            },
            NodeKind::ClassDef {
                name,
                type_params,
                superclass,
                body,
            } => NodeKind::ClassDef {
                name,
                type_params,
                superclass,
                body: self.clone_subtree(body),
            },
            NodeKind::Def {
                receiver,
                name,
                params,
                body,
            } => NodeKind::Def {
                receiver: receiver.map(|r| self.clone_subtree(r)),
                name,
                params,
                body: self.clone_subtree(body),
            },
            NodeKind::Call {
                obj,
                name,
                args,
                block,
                ..
            } => NodeKind::Call {
                obj: obj.map(|o| self.clone_subtree(o)),
                name,
                args: args.iter().map(|&a| self.clone_subtree(a)).collect(),
                block: block.map(|b| self.clone_subtree(b)),
                target_def: None,
            },
            NodeKind::If {
                cond,
                then_body,
                else_body,
            } => NodeKind::If {
                cond: self.clone_subtree(cond),
                then_body: self.clone_subtree(then_body),
                else_body: self.clone_subtree(else_body),
            },
            NodeKind::While { cond, body } => NodeKind::While {
                cond: self.clone_subtree(cond),
                body: self.clone_subtree(body),
            },
            NodeKind::Assign { target, value } => NodeKind::Assign {
                target: self.clone_subtree(target),
                value: self.clone_subtree(value),
            },
            NodeKind::Block { params, body } => NodeKind::Block {
                params,
                body: self.clone_subtree(body),
            },
            NodeKind::ControlExit { kind, exps } => NodeKind::ControlExit {
                kind,
                exps: exps.iter().map(|&e| self.clone_subtree(e)).collect(),
            },
        };
        let copy = self.nodes.alloc(Node {
            kind,
            location,
            parent: None,
            ty: None,
        });
        for child in self.child_ids(copy) {
            self.nodes[child].parent = Some(copy);
        }
        copy
    }

    /// Structural equality: compares shapes and values, ignoring locations,
    /// parent links and inference results.
    pub fn structurally_eq(&self, a: NodeId, b: NodeId) -> bool {
        use NodeKind::*;

        let all_eq = |xs: &[NodeId], ys: &[NodeId]| {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(&x, &y)| self.structurally_eq(x, y))
        };
        let opt_eq = |x: &Option<NodeId>, y: &Option<NodeId>| match (x, y) {
            (Some(x), Some(y)) => self.structurally_eq(*x, *y),
            (None, None) => true,
            _ => false,
        };

        match (&self.nodes[a].kind, &self.nodes[b].kind) {
            (Expressions { children: ca }, Expressions { children: cb }) => all_eq(ca, cb),
            (NilLiteral, NilLiteral) => true,
            (BoolLiteral { value: va }, BoolLiteral { value: vb }) => va == vb,
            (IntLiteral { value: va }, IntLiteral { value: vb }) => va == vb,
            (FloatLiteral { value: va }, FloatLiteral { value: vb }) => va == vb,
            (CharLiteral { value: va }, CharLiteral { value: vb }) => va == vb,
            (Var { name: na }, Var { name: nb }) => na == nb,
            (Generic { name: na, args: aa }, Generic { name: nb, args: ab }) => {
                na == nb && all_eq(aa, ab)
            }
            (
                ClassDef {
                    name: na,
                    type_params: ta,
                    superclass: sa,
                    body: ba,
                },
                ClassDef {
                    name: nb,
                    type_params: tb,
                    superclass: sb,
                    body: bb,
                },
            ) => na == nb && ta == tb && sa == sb && self.structurally_eq(*ba, *bb),
            (
                Def {
                    receiver: ra,
                    name: na,
                    params: pa,
                    body: ba,
                },
                Def {
                    receiver: rb,
                    name: nb,
                    params: pb,
                    body: bb,
                },
            ) => na == nb && pa == pb && opt_eq(ra, rb) && self.structurally_eq(*ba, *bb),
            (
                Call {
                    obj: oa,
                    name: na,
                    args: aa,
                    block: ka,
                    ..
                },
                Call {
                    obj: ob,
                    name: nb,
                    args: ab,
                    block: kb,
                    ..
                },
            ) => na == nb && opt_eq(oa, ob) && all_eq(aa, ab) && opt_eq(ka, kb),
            (
                If {
                    cond: ca,
                    then_body: ta,
                    else_body: ea,
                },
                If {
                    cond: cb,
                    then_body: tb,
                    else_body: eb,
                },
            ) => {
                self.structurally_eq(*ca, *cb)
                    && self.structurally_eq(*ta, *tb)
                    && self.structurally_eq(*ea, *eb)
            }
            (While { cond: ca, body: ba }, While { cond: cb, body: bb }) => {
                self.structurally_eq(*ca, *cb) && self.structurally_eq(*ba, *bb)
            }
            (
                Assign {
                    target: ta,
                    value: va,
                },
                Assign {
                    target: tb,
                    value: vb,
                },
            ) => self.structurally_eq(*ta, *tb) && self.structurally_eq(*va, *vb),
            (Block { params: pa, body: ba }, Block { params: pb, body: bb }) => {
                pa == pb && self.structurally_eq(*ba, *bb)
            }
            (
                ControlExit {
                    kind: ka,
                    exps: ea,
                },
                ControlExit {
                    kind: kb,
                    exps: eb,
                },
            ) => ka == kb && all_eq(ea, eb),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_bind_parent_links() {
        let mut ast = Ast::new();
        let one = ast.int(1);
        let two = ast.int(2);
        let cond = ast.bool_lit(true);
        let node = ast.if_expr(cond, one, Some(two));

        assert_eq!(ast.parent_of(cond), Some(node));
        assert_eq!(ast.parent_of(one), Some(node));
        assert_eq!(ast.parent_of(two), Some(node));
        assert_eq!(ast.parent_of(node), None);
    }

    #[test]
    fn expressions_from_normalizes() {
        let mut ast = Ast::new();

        let empty = ast.expressions_from(Vec::new());
        assert!(matches!(
            ast.kind(empty),
            NodeKind::Expressions { children } if children.is_empty()
        ));

        let inner = ast.expressions(Vec::new());
        assert_eq!(ast.expressions_from(vec![inner]), inner);

        let lit = ast.int(5);
        let wrapped = ast.expressions_from(vec![lit]);
        assert!(matches!(
            ast.kind(wrapped),
            NodeKind::Expressions { children } if children == &[lit]
        ));
    }

    #[test]
    fn clone_preserves_structure_and_location() {
        let mut ast = Ast::new();
        let value = ast.int(42);
        let target = ast.var("@coco");
        ast.set_location(target, crate::source::Location::new(2, 3));
        let assign = ast.assign(target, value);

        let copy = ast.clone_subtree(assign);
        assert_ne!(copy, assign);
        assert!(ast.structurally_eq(assign, copy));

        let NodeKind::Assign {
            target: copy_target,
            ..
        } = *ast.kind(copy)
        else {
            panic!("clone changed the node kind");
        };
        assert_eq!(
            ast.location_of(copy_target),
            Some(crate::source::Location::new(2, 3))
        );
        assert_eq!(ast.parent_of(copy_target), Some(copy));
        assert_eq!(ast.parent_of(copy), None);
    }

    #[test]
    fn structural_equality_ignores_location() {
        let mut ast = Ast::new();
        let a = ast.var("x");
        let b = ast.var("x");
        ast.set_location(b, crate::source::Location::new(9, 9));
        assert!(ast.structurally_eq(a, b));

        let c = ast.var("y");
        assert!(!ast.structurally_eq(a, c));
    }
}
