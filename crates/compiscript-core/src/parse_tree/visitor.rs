//! Visitor dispatch over the parse tree.
//!
//! One callback per grammar rule; the default behavior for every rule is
//! to visit all children. Both compilation passes are separate concrete
//! visitors over this shared node-kind set.

use super::{Node, Rule, TokenKind};

/// Fallible parse-tree visitor with default child traversal.
pub trait Visitor {
    type Error;

    /// Dispatch on the node kind.
    fn visit(&mut self, node: &Node) -> Result<(), Self::Error> {
        match node {
            Node::Terminal { kind, text } => self.visit_terminal(*kind, text),
            Node::Rule { rule, .. } => match rule {
                Rule::Program => self.visit_program(node),
                Rule::Declaration => self.visit_declaration(node),
                Rule::ClassDecl => self.visit_class_decl(node),
                Rule::FunDecl => self.visit_fun_decl(node),
                Rule::Function => self.visit_function(node),
                Rule::Parameters => self.visit_parameters(node),
                Rule::VarDecl => self.visit_var_decl(node),
                Rule::Statement => self.visit_statement(node),
                Rule::ExprStmt => self.visit_expr_stmt(node),
                Rule::IfStmt => self.visit_if_stmt(node),
                Rule::WhileStmt => self.visit_while_stmt(node),
                Rule::ForStmt => self.visit_for_stmt(node),
                Rule::ReturnStmt => self.visit_return_stmt(node),
                Rule::PrintStmt => self.visit_print_stmt(node),
                Rule::Block => self.visit_block(node),
                Rule::Expression => self.visit_expression(node),
                Rule::Assignment => self.visit_assignment(node),
                Rule::LogicOr => self.visit_logic_or(node),
                Rule::LogicAnd => self.visit_logic_and(node),
                Rule::Equality => self.visit_equality(node),
                Rule::Comparison => self.visit_comparison(node),
                Rule::Term => self.visit_term(node),
                Rule::Factor => self.visit_factor(node),
                Rule::Unary => self.visit_unary(node),
                Rule::Call => self.visit_call(node),
                Rule::Primary => self.visit_primary(node),
                Rule::Instantiation => self.visit_instantiation(node),
                Rule::Arguments => self.visit_arguments(node),
            },
        }
    }

    /// Visit every child in order.
    fn visit_children(&mut self, node: &Node) -> Result<(), Self::Error> {
        for child in node.children() {
            self.visit(child)?;
        }
        Ok(())
    }

    fn visit_program(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_declaration(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_class_decl(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_fun_decl(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_function(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_parameters(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_var_decl(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_statement(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_expr_stmt(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_if_stmt(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_while_stmt(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_for_stmt(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_return_stmt(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_print_stmt(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_block(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_expression(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_assignment(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_logic_or(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_logic_and(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_equality(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_comparison(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_term(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_factor(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_unary(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_call(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_primary(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_instantiation(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_arguments(&mut self, node: &Node) -> Result<(), Self::Error> {
        self.visit_children(node)
    }
    fn visit_terminal(&mut self, _kind: TokenKind, _text: &str) -> Result<(), Self::Error> {
        Ok(())
    }
}
