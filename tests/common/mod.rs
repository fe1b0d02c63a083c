#![allow(dead_code)]

use beryl::{Ast, InferError, Module, NodeId, TypeId, infer_program};

/// Runs inference over `root` with a fresh Module and returns both.
pub fn infer(ast: &mut Ast, root: NodeId) -> (Module, Result<TypeId, InferError>) {
    let mut module = Module::new();
    let result = infer_program(&mut module, ast, root);
    (module, result)
}

pub fn infer_ok(ast: &mut Ast, root: NodeId) -> (Module, TypeId) {
    let (module, result) = infer(ast, root);
    let ty = result.expect("expected inference to succeed");
    (module, ty)
}

pub fn infer_err(ast: &mut Ast, root: NodeId) -> InferError {
    let (_, result) = infer(ast, root);
    result.expect_err("expected an inference fault")
}

/// `Receiver.new(args)` with a constant receiver.
pub fn new_call(ast: &mut Ast, class: &str, args: Vec<NodeId>) -> NodeId {
    let receiver = ast.var(class);
    ast.call(Some(receiver), "new", args, None)
}
