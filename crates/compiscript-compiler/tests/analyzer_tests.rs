//! Semantic analysis over hand-built parse trees.

use compiscript_compiler::SemanticAnalyzer;
use compiscript_core::parse_tree::Rule;
use compiscript_core::parse_tree::build::*;
use compiscript_core::{
    ClassState, CompileError, DataType, SymbolId, SymbolKind, SymbolTable, SymbolTag,
};

fn find(table: &SymbolTable, name: &str, tag: SymbolTag) -> SymbolId {
    table
        .ids()
        .find(|&id| table.symbol(id).name == name && table.symbol(id).tag() == tag)
        .unwrap_or_else(|| panic!("symbol '{name}' not in table"))
}

#[test]
fn analysis_is_deterministic() {
    let build = || {
        program(vec![
            var_decl("x", Some(number_expr(1))),
            fun_decl("f", &["a"], vec![return_stmt(Some(ident_expr("a")))]),
            print_stmt(ident_expr("x")),
        ])
    };
    let first = SemanticAnalyzer::analyze(&build()).unwrap();
    let second = SemanticAnalyzer::analyze(&build()).unwrap();
    assert_eq!(first.render_table(), second.render_table());
}

#[test]
fn offsets_accumulate_declared_sizes() {
    let tree = program(vec![
        var_decl("a", Some(number_expr(1))),
        var_decl("b", Some(bool_expr(true))),
        var_decl("c", Some(number_expr(2))),
    ]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    assert_eq!(table.symbol(find(&table, "a", SymbolTag::Variable)).offset, 0);
    assert_eq!(table.symbol(find(&table, "b", SymbolTag::Variable)).offset, 4);
    assert_eq!(table.symbol(find(&table, "c", SymbolTag::Variable)).offset, 5);
}

#[test]
fn nested_declaration_shadows_outer() {
    let tree = program(vec![
        var_decl("x", Some(number_expr(1))),
        if_stmt(
            bool_expr(true),
            block_stmt(vec![
                var_decl("x", Some(string_expr("s"))),
                print_stmt(ident_expr("x")),
            ]),
            None,
        ),
    ]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    let shadows: Vec<SymbolId> = table
        .ids()
        .filter(|&id| table.symbol(id).name == "x")
        .collect();
    assert_eq!(shadows.len(), 2);
    assert_eq!(table.symbol(shadows[0]).data_type, DataType::Number);
    assert_eq!(table.symbol(shadows[1]).data_type, DataType::String);
    assert_ne!(table.symbol(shadows[0]).scope, table.symbol(shadows[1]).scope);
}

#[test]
fn redeclaration_in_same_scope_is_rejected() {
    let tree = program(vec![
        var_decl("x", Some(number_expr(1))),
        var_decl("x", Some(number_expr(2))),
    ]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::DuplicateSymbol { name, .. } if name == "x"));
}

// ----------------------------------------------------------------------
// Expression typing
// ----------------------------------------------------------------------

#[test]
fn comparison_yields_boolean() {
    let tree = program(vec![var_decl(
        "b",
        Some(binary_expr(
            Rule::Comparison,
            number_primary(1),
            "<",
            number_primary(2),
        )),
    )]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    let b = find(&table, "b", SymbolTag::Variable);
    assert_eq!(table.symbol(b).data_type, DataType::Boolean);
}

#[test]
fn chained_comparison_is_rejected() {
    // 1 < 2 < 3 parses, but relational operators do not chain.
    let chain = wrap(
        Rule::Comparison,
        rule(
            Rule::Comparison,
            vec![
                wrap_between(Rule::Primary, Rule::Term, number_primary(1)),
                sym("<"),
                wrap_between(Rule::Primary, Rule::Term, number_primary(2)),
                sym("<"),
                wrap_between(Rule::Primary, Rule::Term, number_primary(3)),
            ],
        ),
    );
    let tree = program(vec![expr_stmt(chain)]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn chained_equality_is_rejected() {
    let chain = wrap(
        Rule::Equality,
        rule(
            Rule::Equality,
            vec![
                wrap_between(Rule::Primary, Rule::Comparison, number_primary(1)),
                sym("=="),
                wrap_between(Rule::Primary, Rule::Comparison, number_primary(1)),
                sym("=="),
                wrap_between(Rule::Primary, Rule::Comparison, number_primary(1)),
            ],
        ),
    );
    let tree = program(vec![expr_stmt(chain)]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn plus_concatenates_strings() {
    let tree = program(vec![var_decl(
        "s",
        Some(binary_expr(
            Rule::Term,
            string_primary("a"),
            "+",
            string_primary("b"),
        )),
    )]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    let s = find(&table, "s", SymbolTag::Variable);
    assert_eq!(table.symbol(s).data_type, DataType::String);
}

#[test]
fn plus_adds_numbers() {
    let tree = program(vec![var_decl(
        "n",
        Some(binary_expr(
            Rule::Term,
            number_primary(1),
            "+",
            number_primary(2),
        )),
    )]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    let n = find(&table, "n", SymbolTag::Variable);
    assert_eq!(table.symbol(n).data_type, DataType::Number);
}

#[test]
fn minus_rejects_string_operand() {
    let tree = program(vec![expr_stmt(binary_expr(
        Rule::Term,
        number_primary(1),
        "-",
        string_primary("a"),
    ))]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn not_rejects_number_operand() {
    let tree = program(vec![expr_stmt(unary_expr("!", number_primary(1)))]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn not_negates_boolean() {
    let tree = program(vec![var_decl(
        "b",
        Some(unary_expr("!", bool_primary(true))),
    )]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    let b = find(&table, "b", SymbolTag::Variable);
    assert_eq!(table.symbol(b).data_type, DataType::Boolean);
}

#[test]
fn minus_inside_print_is_rejected() {
    let tree = program(vec![print_stmt(binary_expr(
        Rule::Term,
        number_primary(3),
        "-",
        number_primary(1),
    ))]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::InvalidPrintOperator));
}

#[test]
fn assignment_to_undeclared_name_is_rejected() {
    let tree = program(vec![expr_stmt(assign_expr("nope", number_expr(1)))]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(
        matches!(err, CompileError::UndefinedSymbol { kind, name } if kind == "variable" && name == "nope")
    );
}

#[test]
fn assignment_refines_uninitialized_variable() {
    let tree = program(vec![
        var_decl("x", None),
        expr_stmt(assign_expr("x", number_expr(1))),
    ]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    let x = find(&table, "x", SymbolTag::Variable);
    assert_eq!(table.symbol(x).data_type, DataType::Number);
    match &table.symbol(x).kind {
        SymbolKind::Variable { initialized, .. } => assert!(initialized),
        _ => unreachable!(),
    }
}

// ----------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------

#[test]
fn call_with_wrong_argument_count_is_rejected() {
    let tree = program(vec![
        fun_decl("f", &["a"], vec![]),
        expr_stmt(call_expr("f", vec![])),
    ]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Arity {
            name,
            expected: 1,
            found: 0,
        } if name == "f"
    ));
}

#[test]
fn first_return_fixes_the_type() {
    let tree = program(vec![fun_decl(
        "f",
        &[],
        vec![
            return_stmt(Some(number_expr(1))),
            return_stmt(Some(string_expr("s"))),
        ],
    )]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    let f = find(&table, "f", SymbolTag::Function);
    match &table.symbol(f).kind {
        SymbolKind::Function {
            return_type,
            return_fixed,
            ..
        } => {
            assert_eq!(*return_type, DataType::Number);
            assert!(return_fixed);
        }
        _ => unreachable!(),
    }
}

#[test]
fn recursive_call_types_as_any() {
    // fun f(n) { return f(n); } must not cycle; the self-call is Any,
    // then the return fixes f to Any.
    let tree = program(vec![fun_decl(
        "f",
        &["n"],
        vec![return_stmt(Some(call_expr("f", vec![ident_expr("n")])))],
    )]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    let f = find(&table, "f", SymbolTag::Function);
    match &table.symbol(f).kind {
        SymbolKind::Function { return_type, .. } => assert_eq!(*return_type, DataType::Any),
        _ => unreachable!(),
    }
}

#[test]
fn return_outside_function_is_rejected() {
    let tree = program(vec![return_stmt(None)]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::InvalidContext { .. }));
}

#[test]
fn return_inside_constructor_is_rejected() {
    let tree = program(vec![class_decl(
        "P",
        None,
        vec![function("init", &[], vec![return_stmt(Some(number_expr(1)))])],
    )]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::InvalidContext { .. }));
}

// ----------------------------------------------------------------------
// Classes
// ----------------------------------------------------------------------

#[test]
fn undeclared_parent_is_rejected() {
    let tree = program(vec![class_decl("A", Some("B"), vec![])]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::UnknownClass { name } if name == "B"));
}

#[test]
fn first_instantiation_binds_attribute_types() {
    let tree = program(vec![
        class_decl(
            "P",
            None,
            vec![function(
                "init",
                &["a"],
                vec![expr_stmt(attr_assign_expr(
                    this_primary(),
                    "x",
                    ident_expr("a"),
                ))],
            )],
        ),
        var_decl("p", Some(expr(instantiation_primary("P", vec![number_expr(1)])))),
        // A later heterogeneous instantiation does not retype x.
        var_decl("q", Some(expr(instantiation_primary("P", vec![string_expr("s")])))),
    ]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();

    let x = find(&table, "x", SymbolTag::Variable);
    assert_eq!(table.symbol(x).data_type, DataType::Number);

    let class = find(&table, "P", SymbolTag::Class);
    match &table.symbol(class).kind {
        SymbolKind::Class { state, .. } => {
            assert_eq!(*state, ClassState::Complete { size: 4 });
        }
        _ => unreachable!(),
    }

    let p = find(&table, "p", SymbolTag::Variable);
    assert_eq!(table.symbol(p).data_type, DataType::Instance(class));
}

#[test]
fn constructor_arity_is_checked() {
    let tree = program(vec![
        class_decl(
            "P",
            None,
            vec![function("init", &["a"], vec![])],
        ),
        var_decl("p", Some(expr(instantiation_primary("P", vec![])))),
    ]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Arity {
            expected: 1,
            found: 0,
            ..
        }
    ));
}

#[test]
fn instantiating_an_unknown_class_is_rejected() {
    let tree = program(vec![expr_stmt(expr(instantiation_primary(
        "Ghost",
        vec![],
    )))]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(matches!(err, CompileError::UnknownClass { name } if name == "Ghost"));
}

#[test]
fn members_are_inherited_except_the_constructor() {
    let tree = program(vec![
        class_decl(
            "A",
            None,
            vec![
                function(
                    "init",
                    &[],
                    vec![expr_stmt(attr_assign_expr(
                        this_primary(),
                        "v",
                        number_expr(1),
                    ))],
                ),
                function("getv", &[], vec![return_stmt(Some(attr_expr(
                    this_primary(),
                    "v",
                )))]),
            ],
        ),
        class_decl("B", Some("A"), vec![]),
    ]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();

    let b = find(&table, "B", SymbolTag::Class);
    let SymbolKind::Class {
        attributes,
        methods,
        ..
    } = &table.symbol(b).kind
    else {
        unreachable!()
    };
    let attr_names: Vec<&str> = attributes
        .iter()
        .map(|&id| table.symbol(id).name.as_str())
        .collect();
    let method_names: Vec<&str> = methods
        .iter()
        .map(|&id| table.symbol(id).name.as_str())
        .collect();
    assert_eq!(attr_names, ["v"]);
    assert_eq!(method_names, ["getv"]);
    assert!(table.symbol(methods[0]).inherited);
}

#[test]
fn overriding_an_inherited_method_keeps_one_entry() {
    let tree = program(vec![
        class_decl(
            "A",
            None,
            vec![function("m", &[], vec![return_stmt(Some(number_expr(1)))])],
        ),
        class_decl(
            "B",
            Some("A"),
            vec![function("m", &[], vec![return_stmt(Some(string_expr("s")))])],
        ),
    ]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();

    let b = find(&table, "B", SymbolTag::Class);
    let SymbolKind::Class { methods, .. } = &table.symbol(b).kind else {
        unreachable!()
    };
    assert_eq!(methods.len(), 1);
    let m = methods[0];
    assert!(!table.symbol(m).inherited);
    match &table.symbol(m).kind {
        SymbolKind::Function { return_type, .. } => assert_eq!(*return_type, DataType::String),
        _ => unreachable!(),
    }
}

#[test]
fn super_resolves_to_the_parent_method() {
    let call_super = wrap(
        Rule::Call,
        rule(
            Rule::Call,
            vec![super_primary("m"), sym("("), sym(")")],
        ),
    );
    let tree = program(vec![
        class_decl(
            "A",
            None,
            vec![function("m", &[], vec![return_stmt(Some(number_expr(1)))])],
        ),
        class_decl(
            "B",
            Some("A"),
            vec![function(
                "m",
                &[],
                vec![return_stmt(Some(call_super))],
            )],
        ),
    ]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();

    // B.m returns what A.m returns.
    let b = find(&table, "B", SymbolTag::Class);
    let SymbolKind::Class { methods, .. } = &table.symbol(b).kind else {
        unreachable!()
    };
    match &table.symbol(methods[0]).kind {
        SymbolKind::Function { return_type, .. } => assert_eq!(*return_type, DataType::Number),
        _ => unreachable!(),
    }
}

#[test]
fn attribute_access_through_an_instance() {
    let tree = program(vec![
        class_decl(
            "P",
            None,
            vec![function(
                "init",
                &["a"],
                vec![expr_stmt(attr_assign_expr(
                    this_primary(),
                    "x",
                    ident_expr("a"),
                ))],
            )],
        ),
        var_decl("p", Some(expr(instantiation_primary("P", vec![number_expr(1)])))),
        var_decl("y", Some(attr_expr(ident_primary("p"), "x"))),
    ]);
    let table = SemanticAnalyzer::analyze(&tree).unwrap();
    let y = find(&table, "y", SymbolTag::Variable);
    assert_eq!(table.symbol(y).data_type, DataType::Number);
}

#[test]
fn unknown_attribute_is_rejected() {
    let tree = program(vec![
        class_decl("P", None, vec![function("init", &[], vec![])]),
        var_decl("p", Some(expr(instantiation_primary("P", vec![])))),
        var_decl("y", Some(attr_expr(ident_primary("p"), "ghost"))),
    ]);
    let err = SemanticAnalyzer::analyze(&tree).unwrap_err();
    assert!(
        matches!(err, CompileError::UndefinedSymbol { kind, name } if kind == "attribute" && name == "ghost")
    );
}
