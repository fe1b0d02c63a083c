#![forbid(unsafe_code)]

/// Source location utilities used by the front-end.
pub mod source;

/// The arena-backed AST the parser hands to inference.
pub mod ast;

/// Double-dispatch traversal over the AST.
pub mod visitor;

/// The type lattice and the Module root environment.
pub mod types;

/// The type inference pass: typed AST, monomorphization, ivar accumulation.
pub mod infer;

/// Inference faults.
pub mod error;

pub use ast::{Ast, ExitKind, NodeId, NodeKind, Param};
pub use error::InferError;
pub use infer::infer_program;
pub use source::Location;
pub use types::{InstanceId, MethodInstance, Module, Type, TypeId};
pub use visitor::{Visitor, accept};
