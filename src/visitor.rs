use crate::ast::{Ast, NodeId, NodeKind};
use crate::error::InferError;

/// Pre-order hook result: `Ok(true)` descends into the node's children.
pub type VisitControl = Result<bool, InferError>;
pub type VisitResult = Result<(), InferError>;

/// Double-dispatch interface over the AST: one `visit_*` / `end_visit_*`
/// pair per node variant. `visit_*` runs pre-order and decides whether to
/// descend; `end_visit_*` runs post-order. Defaults descend and do nothing,
/// so a pass only overrides the variants it cares about.
pub trait Visitor {
    fn visit_expressions(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_expressions(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_nil_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_nil_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_bool_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_bool_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_int_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_int_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_float_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_float_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_char_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_char_literal(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_var(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_var(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_generic(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_generic(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_class_def(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_class_def(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_def(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_def(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_call(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_call(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_if(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_if(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_while(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_while(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_assign(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_assign(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_block(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_block(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }

    fn visit_control_exit(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitControl {
        Ok(true)
    }
    fn end_visit_control_exit(&mut self, _ast: &mut Ast, _id: NodeId) -> VisitResult {
        Ok(())
    }
}

/// Drives a visitor over a subtree: pre-order `visit_*`, children in the
/// order defined per variant, post-order `end_visit_*`.
pub fn accept<V: Visitor + ?Sized>(ast: &mut Ast, id: NodeId, visitor: &mut V) -> VisitResult {
    // Child ids are copied out before the pre-order hook runs; hooks may
    // allocate new nodes but never rewrite an existing node's child list.
    match ast.kind(id).clone() {
        NodeKind::Expressions { children } => {
            if visitor.visit_expressions(ast, id)? {
                for child in children {
                    accept(ast, child, visitor)?;
                }
            }
            visitor.end_visit_expressions(ast, id)
        }
        NodeKind::NilLiteral => {
            visitor.visit_nil_literal(ast, id)?;
            visitor.end_visit_nil_literal(ast, id)
        }
        NodeKind::BoolLiteral { .. } => {
            visitor.visit_bool_literal(ast, id)?;
            visitor.end_visit_bool_literal(ast, id)
        }
        NodeKind::IntLiteral { .. } => {
            visitor.visit_int_literal(ast, id)?;
            visitor.end_visit_int_literal(ast, id)
        }
        NodeKind::FloatLiteral { .. } => {
            visitor.visit_float_literal(ast, id)?;
            visitor.end_visit_float_literal(ast, id)
        }
        NodeKind::CharLiteral { .. } => {
            visitor.visit_char_literal(ast, id)?;
            visitor.end_visit_char_literal(ast, id)
        }
        NodeKind::Var { .. } => {
            visitor.visit_var(ast, id)?;
            visitor.end_visit_var(ast, id)
        }
        NodeKind::Generic { args, .. } => {
            if visitor.visit_generic(ast, id)? {
                for arg in args {
                    accept(ast, arg, visitor)?;
                }
            }
            visitor.end_visit_generic(ast, id)
        }
        NodeKind::ClassDef { body, .. } => {
            if visitor.visit_class_def(ast, id)? {
                accept(ast, body, visitor)?;
            }
            visitor.end_visit_class_def(ast, id)
        }
        NodeKind::Def { receiver, body, .. } => {
            if visitor.visit_def(ast, id)? {
                if let Some(receiver) = receiver {
                    accept(ast, receiver, visitor)?;
                }
                accept(ast, body, visitor)?;
            }
            visitor.end_visit_def(ast, id)
        }
        NodeKind::Call {
            obj, args, block, ..
        } => {
            if visitor.visit_call(ast, id)? {
                if let Some(obj) = obj {
                    accept(ast, obj, visitor)?;
                }
                for arg in args {
                    accept(ast, arg, visitor)?;
                }
                if let Some(block) = block {
                    accept(ast, block, visitor)?;
                }
            }
            visitor.end_visit_call(ast, id)
        }
        NodeKind::If {
            cond,
            then_body,
            else_body,
        } => {
            if visitor.visit_if(ast, id)? {
                accept(ast, cond, visitor)?;
                accept(ast, then_body, visitor)?;
                accept(ast, else_body, visitor)?;
            }
            visitor.end_visit_if(ast, id)
        }
        NodeKind::While { cond, body } => {
            if visitor.visit_while(ast, id)? {
                accept(ast, cond, visitor)?;
                accept(ast, body, visitor)?;
            }
            visitor.end_visit_while(ast, id)
        }
        NodeKind::Assign { target, value } => {
            if visitor.visit_assign(ast, id)? {
                accept(ast, target, visitor)?;
                accept(ast, value, visitor)?;
            }
            visitor.end_visit_assign(ast, id)
        }
        NodeKind::Block { body, .. } => {
            if visitor.visit_block(ast, id)? {
                accept(ast, body, visitor)?;
            }
            visitor.end_visit_block(ast, id)
        }
        NodeKind::ControlExit { exps, .. } => {
            if visitor.visit_control_exit(ast, id)? {
                for exp in exps {
                    accept(ast, exp, visitor)?;
                }
            }
            visitor.end_visit_control_exit(ast, id)
        }
    }
}
