//! Parse-tree construction helpers.
//!
//! The front-end is external; embedders (and the test suites) assemble
//! trees through these constructors so that wrapper-node chains and
//! terminal placement match what the grammar produces.

use super::{Node, Rule, TokenKind};

/// Precedence levels from the expression root down to primary. Each level
/// with a single child is a wrapper the passes skip through.
const LEVELS: [Rule; 11] = [
    Rule::Expression,
    Rule::Assignment,
    Rule::LogicOr,
    Rule::LogicAnd,
    Rule::Equality,
    Rule::Comparison,
    Rule::Term,
    Rule::Factor,
    Rule::Unary,
    Rule::Call,
    Rule::Primary,
];

fn level_position(rule: Rule) -> usize {
    LEVELS
        .iter()
        .position(|&l| l == rule)
        .expect("not an expression precedence level")
}

/// A rule node with the given children.
pub fn rule(rule: Rule, children: Vec<Node>) -> Node {
    Node::Rule { rule, children }
}

/// An identifier terminal.
pub fn ident(text: &str) -> Node {
    Node::Terminal {
        kind: TokenKind::Identifier,
        text: text.into(),
    }
}

/// A numeric-literal terminal.
pub fn number(value: i64) -> Node {
    Node::Terminal {
        kind: TokenKind::Number,
        text: value.to_string(),
    }
}

/// A string-literal terminal (text excludes the quotes).
pub fn string(text: &str) -> Node {
    Node::Terminal {
        kind: TokenKind::Str,
        text: text.into(),
    }
}

/// A keyword/operator/punctuation terminal.
pub fn sym(text: &str) -> Node {
    Node::Terminal {
        kind: TokenKind::Symbol,
        text: text.into(),
    }
}

/// Wrap a node of precedence level `from` upward until it becomes a
/// node of level `to` (single-child wrappers at every level between).
pub fn wrap_between(from: Rule, to: Rule, node: Node) -> Node {
    let from = level_position(from);
    let to = level_position(to);
    debug_assert!(to <= from, "wrap_between must wrap upward");
    LEVELS[to..from]
        .iter()
        .rev()
        .fold(node, |inner, &level| rule(level, vec![inner]))
}

/// Wrap a node of precedence level `from` into a full Expression.
pub fn wrap(from: Rule, node: Node) -> Node {
    wrap_between(from, Rule::Expression, node)
}

// ----------------------------------------------------------------------
// Primaries and expressions
// ----------------------------------------------------------------------

pub fn number_primary(value: i64) -> Node {
    rule(Rule::Primary, vec![number(value)])
}

pub fn string_primary(text: &str) -> Node {
    rule(Rule::Primary, vec![string(text)])
}

pub fn bool_primary(value: bool) -> Node {
    rule(Rule::Primary, vec![sym(if value { "true" } else { "false" })])
}

pub fn nil_primary() -> Node {
    rule(Rule::Primary, vec![sym("nil")])
}

pub fn this_primary() -> Node {
    rule(Rule::Primary, vec![sym("this")])
}

pub fn ident_primary(name: &str) -> Node {
    rule(Rule::Primary, vec![ident(name)])
}

/// `( expression )`
pub fn grouping_primary(expr: Node) -> Node {
    rule(Rule::Primary, vec![sym("("), expr, sym(")")])
}

/// `super.name`
pub fn super_primary(name: &str) -> Node {
    rule(Rule::Primary, vec![sym("super"), sym("."), ident(name)])
}

/// `new Class(args)` wrapped as a primary.
pub fn instantiation_primary(class: &str, args: Vec<Node>) -> Node {
    let mut children = vec![sym("new"), ident(class), sym("(")];
    if !args.is_empty() {
        children.push(arguments(args));
    }
    children.push(sym(")"));
    rule(Rule::Primary, vec![rule(Rule::Instantiation, children)])
}

/// An `arguments` node from full Expression nodes, comma-separated.
pub fn arguments(args: Vec<Node>) -> Node {
    let mut children = Vec::new();
    for (i, arg) in args.into_iter().enumerate() {
        if i > 0 {
            children.push(sym(","));
        }
        children.push(arg);
    }
    rule(Rule::Arguments, children)
}

/// A full Expression from a primary.
pub fn expr(primary: Node) -> Node {
    wrap(Rule::Primary, primary)
}

pub fn number_expr(value: i64) -> Node {
    expr(number_primary(value))
}

pub fn string_expr(text: &str) -> Node {
    expr(string_primary(text))
}

pub fn bool_expr(value: bool) -> Node {
    expr(bool_primary(value))
}

pub fn ident_expr(name: &str) -> Node {
    expr(ident_primary(name))
}

/// A binary expression at the given precedence level, e.g.
/// `binary_expr(Rule::Term, number_primary(1), "+", number_primary(2))`.
/// Operands are primaries wrapped up to the level below.
pub fn binary_expr(level: Rule, lhs: Node, op: &str, rhs: Node) -> Node {
    let operand_level = LEVELS[level_position(level) + 1];
    let lhs = wrap_between(Rule::Primary, operand_level, lhs);
    let rhs = wrap_between(Rule::Primary, operand_level, rhs);
    wrap(level, rule(level, vec![lhs, sym(op), rhs]))
}

/// A unary expression: `!x` or `-x`.
pub fn unary_expr(op: &str, operand: Node) -> Node {
    let operand = wrap_between(Rule::Primary, Rule::Unary, operand);
    wrap(Rule::Unary, rule(Rule::Unary, vec![sym(op), operand]))
}

/// A free-function call: `name(args)`.
pub fn call_expr(name: &str, args: Vec<Node>) -> Node {
    let mut children = vec![ident_primary(name), sym("(")];
    if !args.is_empty() {
        children.push(arguments(args));
    }
    children.push(sym(")"));
    wrap(Rule::Call, rule(Rule::Call, children))
}

/// An attribute access: `recv.name` with a primary receiver.
pub fn attr_expr(receiver: Node, name: &str) -> Node {
    wrap(
        Rule::Call,
        rule(Rule::Call, vec![receiver, sym("."), ident(name)]),
    )
}

/// A method call: `recv.name(args)` with a primary receiver.
pub fn method_call_expr(receiver: Node, name: &str, args: Vec<Node>) -> Node {
    let mut children = vec![receiver, sym("."), ident(name), sym("(")];
    if !args.is_empty() {
        children.push(arguments(args));
    }
    children.push(sym(")"));
    wrap(Rule::Call, rule(Rule::Call, children))
}

fn as_assignment(expr: Node) -> Node {
    match expr {
        Node::Rule {
            rule: Rule::Expression,
            mut children,
        } => children.remove(0),
        other => wrap_between(
            other.rule().expect("expression node"),
            Rule::Assignment,
            other,
        ),
    }
}

/// A simple assignment expression: `name = value`.
pub fn assign_expr(name: &str, value: Node) -> Node {
    wrap(
        Rule::Assignment,
        rule(
            Rule::Assignment,
            vec![ident(name), sym("="), as_assignment(value)],
        ),
    )
}

/// An attribute assignment: `recv.name = value` with a primary receiver.
pub fn attr_assign_expr(receiver: Node, name: &str, value: Node) -> Node {
    let call = rule(Rule::Call, vec![receiver]);
    wrap(
        Rule::Assignment,
        rule(
            Rule::Assignment,
            vec![call, sym("."), ident(name), sym("="), as_assignment(value)],
        ),
    )
}

// ----------------------------------------------------------------------
// Statements and declarations
// ----------------------------------------------------------------------

/// Wrap a concrete statement rule node into a `statement`.
pub fn statement(inner: Node) -> Node {
    rule(Rule::Statement, vec![inner])
}

/// Wrap a declaration-level node (classDecl/funDecl/varDecl/statement)
/// into a `declaration`.
pub fn declaration(inner: Node) -> Node {
    rule(Rule::Declaration, vec![inner])
}

/// An expression statement as a declaration.
pub fn expr_stmt(expr: Node) -> Node {
    declaration(statement(rule(Rule::ExprStmt, vec![expr, sym(";")])))
}

/// A print statement as a declaration.
pub fn print_stmt(expr: Node) -> Node {
    declaration(statement(rule(
        Rule::PrintStmt,
        vec![sym("print"), expr, sym(";")],
    )))
}

/// A return statement as a declaration.
pub fn return_stmt(expr: Option<Node>) -> Node {
    let mut children = vec![sym("return")];
    if let Some(expr) = expr {
        children.push(expr);
    }
    children.push(sym(";"));
    declaration(statement(rule(Rule::ReturnStmt, children)))
}

/// An if statement as a declaration. Branch arguments are declarations
/// produced by the other helpers; their inner statement node is used.
pub fn if_stmt(cond: Node, then_branch: Node, else_branch: Option<Node>) -> Node {
    let mut children = vec![sym("if"), sym("("), cond, sym(")"), inner_statement(then_branch)];
    if let Some(else_branch) = else_branch {
        children.push(sym("else"));
        children.push(inner_statement(else_branch));
    }
    declaration(statement(rule(Rule::IfStmt, children)))
}

/// A while statement as a declaration.
pub fn while_stmt(cond: Node, body: Node) -> Node {
    declaration(statement(rule(
        Rule::WhileStmt,
        vec![sym("while"), sym("("), cond, sym(")"), inner_statement(body)],
    )))
}

/// A for statement as a declaration. `init` is a varDecl or exprStmt
/// declaration; `cond` and `increment` are Expressions.
pub fn for_stmt(init: Node, cond: Node, increment: Node, body: Node) -> Node {
    // The initializer slot holds a bare varDecl or exprStmt node.
    let init = match inner_of(init) {
        Node::Rule {
            rule: Rule::Statement,
            mut children,
        } => children.remove(0),
        other => other,
    };
    declaration(statement(rule(
        Rule::ForStmt,
        vec![
            sym("for"),
            sym("("),
            init,
            cond,
            sym(";"),
            increment,
            sym(")"),
            inner_statement(body),
        ],
    )))
}

/// A block statement as a declaration.
pub fn block_stmt(decls: Vec<Node>) -> Node {
    declaration(statement(block(decls)))
}

/// A raw block node: `{ declaration* }`.
pub fn block(decls: Vec<Node>) -> Node {
    let mut children = vec![sym("{")];
    children.extend(decls);
    children.push(sym("}"));
    rule(Rule::Block, children)
}

/// A variable declaration: `var name = init;`.
pub fn var_decl(name: &str, init: Option<Node>) -> Node {
    let mut children = vec![sym("var"), ident(name)];
    if let Some(init) = init {
        children.push(sym("="));
        children.push(init);
    }
    children.push(sym(";"));
    declaration(rule(Rule::VarDecl, children))
}

/// A `function` node: `name(params) block`.
pub fn function(name: &str, params: &[&str], body: Vec<Node>) -> Node {
    let mut children = vec![ident(name), sym("(")];
    if !params.is_empty() {
        let mut plist = Vec::new();
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                plist.push(sym(","));
            }
            plist.push(ident(param));
        }
        children.push(rule(Rule::Parameters, plist));
    }
    children.push(sym(")"));
    children.push(block(body));
    rule(Rule::Function, children)
}

/// A function declaration: `fun name(params) { body }`.
pub fn fun_decl(name: &str, params: &[&str], body: Vec<Node>) -> Node {
    declaration(rule(
        Rule::FunDecl,
        vec![sym("fun"), function(name, params, body)],
    ))
}

/// A class declaration with optional parent and `function` methods.
pub fn class_decl(name: &str, parent: Option<&str>, methods: Vec<Node>) -> Node {
    let mut children = vec![sym("class"), ident(name)];
    if let Some(parent) = parent {
        children.push(sym("<"));
        children.push(ident(parent));
    }
    children.push(sym("{"));
    children.extend(methods);
    children.push(sym("}"));
    declaration(rule(Rule::ClassDecl, children))
}

/// A program from declarations.
pub fn program(decls: Vec<Node>) -> Node {
    rule(Rule::Program, decls)
}

/// Unwrap `declaration(statement(x))` down to the statement node, so the
/// statement helpers compose with `if`/`while`/`for` bodies.
fn inner_statement(decl: Node) -> Node {
    match inner_of(decl) {
        stmt @ Node::Rule {
            rule: Rule::Statement,
            ..
        } => stmt,
        other => statement(other),
    }
}

/// Unwrap a `declaration` wrapper to its single payload node.
fn inner_of(node: Node) -> Node {
    match node {
        Node::Rule {
            rule: Rule::Declaration,
            mut children,
        } => children.remove(0),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_chain_is_all_wrappers() {
        let mut node = &number_expr(7);
        while node.child_count() == 1 {
            node = node.child(0).unwrap();
        }
        assert_eq!(node.terminal_text(), Some("7"));
    }

    #[test]
    fn binary_expr_places_operator_between_operands() {
        let expr = binary_expr(Rule::Term, number_primary(1), "+", number_primary(2));
        // Descend wrappers until the term node.
        let mut node = &expr;
        while node.rule() != Some(Rule::Term) {
            node = node.child(0).unwrap();
        }
        assert_eq!(node.child_count(), 3);
        assert_eq!(node.child_text(1), Some("+"));
    }

    #[test]
    fn if_helper_embeds_statement_nodes() {
        let tree = if_stmt(
            bool_expr(true),
            print_stmt(string_expr("x")),
            Some(print_stmt(string_expr("y"))),
        );
        let if_node = inner_of(tree);
        let if_node = match if_node {
            Node::Rule {
                rule: Rule::Statement,
                mut children,
            } => children.remove(0),
            _ => panic!("expected statement wrapper"),
        };
        assert_eq!(if_node.rule(), Some(Rule::IfStmt));
        assert_eq!(if_node.rule_children(Rule::Statement).count(), 2);
    }
}
