mod common;

use beryl::{Ast, NodeKind};
use common::{infer_ok, new_call};

#[test]
fn self_recursive_methods_terminate_on_the_placeholder() {
    // class Node; def add; if @next; @next.add; else; @next = Node.new; end; end; end
    // n = Node.new; n.add; n
    let mut ast = Ast::new();
    let cond_read = ast.var("@next");
    let recv_read = ast.var("@next");
    let recurse = ast.call(Some(recv_read), "add", vec![], None);
    let inner_new = new_call(&mut ast, "Node", vec![]);
    let next_target = ast.var("@next");
    let assign = ast.assign(next_target, inner_new);
    let branch = ast.if_expr(cond_read, recurse, Some(assign));
    let add = ast.def(None, "add", vec![], vec![branch]);
    let class = ast.class_def("Node", vec![], None, vec![add]);

    let n_target = ast.var("n");
    let n_new = new_call(&mut ast, "Node", vec![]);
    let n_assign = ast.assign(n_target, n_new);
    let n_recv = ast.var("n");
    let n_add = ast.call(Some(n_recv), "add", vec![], None);
    let n_read = ast.var("n");
    let root = ast.expressions(vec![class, n_assign, n_add, n_read]);

    let (mut module, ty) = infer_ok(&mut ast, root);
    let node = module.lookup_const("Node").expect("Node registered");
    assert_eq!(ty, node);

    // the recursive ivar closes over Nil | Node
    let nil = module.nil_type();
    let expected = module.union_of(&[nil, node]);
    assert_eq!(module.lookup_instance_var(node, "@next"), Some(expected));

    // the recursive call resolved against the cached instance
    let NodeKind::Call { target_def, .. } = ast.kind(recurse) else {
        panic!("not a call");
    };
    assert!(target_def.is_some());
}

#[test]
fn mutually_recursive_methods_terminate() {
    // class Chatter; def ping; pong; end; def pong; ping; end; end
    // Chatter.new.ping
    let mut ast = Ast::new();
    let pong_call = ast.call(None, "pong", vec![], None);
    let ping = ast.def(None, "ping", vec![], vec![pong_call]);
    let ping_call = ast.call(None, "ping", vec![], None);
    let pong = ast.def(None, "pong", vec![], vec![ping_call]);
    let class = ast.class_def("Chatter", vec![], None, vec![ping, pong]);
    let new = new_call(&mut ast, "Chatter", vec![]);
    let call = ast.call(Some(new), "ping", vec![], None);
    let root = ast.expressions(vec![class, call]);

    let (module, ty) = infer_ok(&mut ast, root);
    // ping's body bottoms out on pong's placeholder
    assert_eq!(ty, module.nil_type());
}

#[test]
fn repeated_calls_reuse_the_cached_instance() {
    // class Foo; def coco; 1; end; end; a = Foo.new.coco; b = Foo.new.coco
    let mut ast = Ast::new();
    let one = ast.int(1);
    let coco = ast.def(None, "coco", vec![], vec![one]);
    let class = ast.class_def("Foo", vec![], None, vec![coco]);
    let new_a = new_call(&mut ast, "Foo", vec![]);
    let call_a = ast.call(Some(new_a), "coco", vec![], None);
    let new_b = new_call(&mut ast, "Foo", vec![]);
    let call_b = ast.call(Some(new_b), "coco", vec![], None);
    let root = ast.expressions(vec![class, call_a, call_b]);

    let (_, _) = infer_ok(&mut ast, root);

    let NodeKind::Call { target_def: a, .. } = ast.kind(call_a) else {
        panic!("not a call");
    };
    let NodeKind::Call { target_def: b, .. } = ast.kind(call_b) else {
        panic!("not a call");
    };
    assert_eq!(a.expect("bound"), b.expect("bound"));
}
