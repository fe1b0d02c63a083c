mod common;

use beryl::{Ast, NodeKind, Param};
use common::{infer_ok, new_call};
use std::collections::BTreeMap;

#[test]
fn instantiations_accumulate_ivars_separately() {
    // class Foo(T); def set(v : T); @coco = v; end; end
    // f = Foo(Int).new; f.set 2; g = Foo(Double).new; g.set 2.5
    let mut ast = Ast::new();
    let coco = ast.var("@coco");
    let v = ast.var("v");
    let body = ast.assign(coco, v);
    let set = ast.def(None, "set", vec![Param::restricted("v", "T")], vec![body]);
    let class = ast.class_def("Foo", vec!["T"], None, vec![set]);

    let int_ref = ast.var("Int");
    let foo_int = ast.generic("Foo", vec![int_ref]);
    let f_new = ast.call(Some(foo_int), "new", vec![], None);
    let f_target = ast.var("f");
    let f_assign = ast.assign(f_target, f_new);
    let f_recv = ast.var("f");
    let two = ast.int(2);
    let f_set = ast.call(Some(f_recv), "set", vec![two], None);

    let double_ref = ast.var("Double");
    let foo_double = ast.generic("Foo", vec![double_ref]);
    let g_new = ast.call(Some(foo_double), "new", vec![], None);
    let g_target = ast.var("g");
    let g_assign = ast.assign(g_target, g_new);
    let g_recv = ast.var("g");
    let half = ast.float(2.5);
    let g_set = ast.call(Some(g_recv), "set", vec![half], None);

    let root = ast.expressions(vec![class, f_assign, f_set, g_assign, g_set]);
    let (mut module, _) = infer_ok(&mut ast, root);

    let foo = module.lookup_const("Foo").expect("Foo registered");
    let mut int_binding = BTreeMap::new();
    int_binding.insert("T".to_string(), module.int());
    let foo_of_int = module.generic_of(foo, &int_binding);
    let mut double_binding = BTreeMap::new();
    double_binding.insert("T".to_string(), module.double());
    let foo_of_double = module.generic_of(foo, &double_binding);
    assert_ne!(foo_of_int, foo_of_double);

    assert_eq!(ast.type_of(f_new), Some(foo_of_int));
    assert_eq!(ast.type_of(g_new), Some(foo_of_double));

    let nil = module.nil_type();
    let int = module.int();
    let double = module.double();
    assert_eq!(
        module.lookup_instance_var(foo_of_int, "@coco"),
        Some(module.union_of(&[nil, int]))
    );
    assert_eq!(
        module.lookup_instance_var(foo_of_double, "@coco"),
        Some(module.union_of(&[nil, double]))
    );
}

#[test]
fn new_solves_type_vars_from_constructor_restrictions() {
    // class Box(T); def initialize(x, value : T); @value = value; end; end
    // Box.new(1, false)
    let mut ast = Ast::new();
    let value_ivar = ast.var("@value");
    let value_read = ast.var("value");
    let body = ast.assign(value_ivar, value_read);
    let init = ast.def(
        None,
        "initialize",
        vec![Param::plain("x"), Param::restricted("value", "T")],
        vec![body],
    );
    let class = ast.class_def("Box", vec!["T"], None, vec![init]);
    let one = ast.int(1);
    let falsy = ast.bool_lit(false);
    let new = new_call(&mut ast, "Box", vec![one, falsy]);
    let root = ast.expressions(vec![class, new]);

    let (mut module, ty) = infer_ok(&mut ast, root);

    let boxed = module.lookup_const("Box").expect("Box registered");
    let mut binding = BTreeMap::new();
    binding.insert("T".to_string(), module.bool_type());
    assert_eq!(ty, module.generic_of(boxed, &binding));

    let nil = module.nil_type();
    let bool_ = module.bool_type();
    assert_eq!(
        module.lookup_instance_var(ty, "@value"),
        Some(module.union_of(&[nil, bool_]))
    );
}

#[test]
fn later_bindings_of_the_same_var_win() {
    // class Pair(T); def initialize(a : T, b : T); end; end; Pair.new(1, false)
    let mut ast = Ast::new();
    let init = ast.def(
        None,
        "initialize",
        vec![Param::restricted("a", "T"), Param::restricted("b", "T")],
        vec![],
    );
    let class = ast.class_def("Pair", vec!["T"], None, vec![init]);
    let one = ast.int(1);
    let falsy = ast.bool_lit(false);
    let new = new_call(&mut ast, "Pair", vec![one, falsy]);
    let root = ast.expressions(vec![class, new]);

    let (mut module, ty) = infer_ok(&mut ast, root);
    let pair = module.lookup_const("Pair").expect("Pair registered");
    let mut binding = BTreeMap::new();
    binding.insert("T".to_string(), module.bool_type());
    assert_eq!(ty, module.generic_of(pair, &binding));
}

#[test]
fn equal_instantiations_are_identity_equal() {
    // f = Foo(Int).new; g = Foo(Int).new
    let mut ast = Ast::new();
    let class = ast.class_def("Foo", vec!["T"], None, vec![]);
    let int_a = ast.var("Int");
    let ref_a = ast.generic("Foo", vec![int_a]);
    let new_a = ast.call(Some(ref_a), "new", vec![], None);
    let int_b = ast.var("Int");
    let ref_b = ast.generic("Foo", vec![int_b]);
    let new_b = ast.call(Some(ref_b), "new", vec![], None);
    let root = ast.expressions(vec![class, new_a, new_b]);

    let (_, _) = infer_ok(&mut ast, root);
    assert_eq!(ast.type_of(new_a), ast.type_of(new_b));
}

#[test]
fn methods_monomorphize_per_argument_types() {
    // def identity(x); x; end; identity(1); identity(1.5)
    let mut ast = Ast::new();
    let x = ast.var("x");
    let identity = ast.def(None, "identity", vec![Param::plain("x")], vec![x]);
    let one = ast.int(1);
    let int_call = ast.call(None, "identity", vec![one], None);
    let half = ast.float(1.5);
    let float_call = ast.call(None, "identity", vec![half], None);
    let root = ast.expressions(vec![identity, int_call, float_call]);

    let (module, _) = infer_ok(&mut ast, root);
    assert_eq!(ast.type_of(int_call), Some(module.int()));
    assert_eq!(ast.type_of(float_call), Some(module.float()));

    let NodeKind::Call {
        target_def: int_target,
        ..
    } = ast.kind(int_call)
    else {
        panic!("not a call");
    };
    let NodeKind::Call {
        target_def: float_target,
        ..
    } = ast.kind(float_call)
    else {
        panic!("not a call");
    };
    assert_ne!(
        int_target.expect("bound"),
        float_target.expect("bound"),
        "distinct argument types must produce distinct instances"
    );
}
