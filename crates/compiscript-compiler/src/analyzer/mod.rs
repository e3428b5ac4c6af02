//! Semantic analysis: pass 1 of the backend.
//!
//! A single pre-order traversal that builds the scope structure and the
//! flat symbol table while type-checking every expression and resolving
//! single inheritance. The first error aborts the pass; there is no
//! recovery and no accumulation.

mod ctx;
mod expr;

pub use ctx::Ctx;

use compiscript_core::parse_tree::{Node, Rule, TokenKind, Visitor};
use compiscript_core::{
    ClassState, CompileError, DataType, ScopeId, Symbol, SymbolId, SymbolKind, SymbolTable,
    SymbolTag, VarRole,
};

use crate::Result;

/// The semantic analyzer. One instance per compilation.
pub struct SemanticAnalyzer {
    table: SymbolTable,
    /// Currently open scopes, outermost first. Strict stack discipline:
    /// popping an empty stack is an implementation defect and panics.
    open: Vec<ScopeId>,
    /// Explicit traversal context stack; the top is the current context.
    ctx: Vec<Ctx>,
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            table: SymbolTable::new(),
            open: Vec::new(),
            ctx: vec![Ctx::default()],
        }
    }

    /// Run the analysis over a program tree and hand back the finished
    /// symbol table.
    pub fn analyze(tree: &Node) -> Result<SymbolTable> {
        let mut analyzer = Self::new();
        analyzer.visit(tree)?;
        debug_assert!(analyzer.open.is_empty(), "unbalanced scope stack");
        Ok(analyzer.table)
    }

    pub(crate) fn table(&self) -> &SymbolTable {
        &self.table
    }

    // ------------------------------------------------------------------
    // Scopes and contexts
    // ------------------------------------------------------------------

    fn enter_scope(&mut self, name: &str) {
        let id = self.table.new_scope(name);
        log::debug!("entering scope '{name}' ({id})");
        self.open.push(id);
    }

    fn exit_scope(&mut self) {
        let id = self
            .open
            .pop()
            .expect("scope stack underflow: exit_scope without enter_scope");
        log::debug!("exiting scope '{}' ({id})", self.table.scope(id).name);
    }

    fn current_scope(&self) -> ScopeId {
        *self
            .open
            .last()
            .expect("no open scope: traversal outside the program scope")
    }

    pub(crate) fn ctx(&self) -> Ctx {
        *self.ctx.last().expect("context stack is never empty")
    }

    fn with_ctx<R>(&mut self, ctx: Ctx, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.ctx.push(ctx);
        let result = f(self);
        self.ctx.pop();
        result
    }

    // ------------------------------------------------------------------
    // Declarations and lookups
    // ------------------------------------------------------------------

    /// Declare a symbol in `scope`.
    ///
    /// Re-declaring a name+kind already present in the scope is a
    /// [`CompileError::DuplicateSymbol`] — unless the existing symbol was
    /// copied in from a parent class, in which case the declaration
    /// overrides it in place, keeping its position.
    fn declare(&mut self, symbol: Symbol, scope: ScopeId) -> Result<SymbolId> {
        if let Some(existing) = self.table.find_in_scope(scope, &symbol.name, symbol.tag()) {
            let record = self.table.symbol_mut(existing);
            if record.inherited {
                record.inherited = false;
                record.data_type = symbol.data_type;
                record.kind = symbol.kind;
                log::debug!("overriding inherited member '{}'", record.name);
                return Ok(existing);
            }
            return Err(CompileError::DuplicateSymbol {
                name: symbol.name,
                scope: self.table.scope(scope).name.clone(),
            });
        }
        log::debug!(
            "declaring {} '{}' in scope '{}'",
            symbol.tag(),
            symbol.name,
            self.table.scope(scope).name
        );
        Ok(self.table.declare(symbol, scope))
    }

    /// Resolve a name against the currently open scopes, innermost first.
    pub(crate) fn resolve(&self, name: &str, tag: SymbolTag) -> Option<SymbolId> {
        self.table.resolve(&self.open, name, tag)
    }

    fn mark_initialized(&mut self, id: SymbolId) {
        if let SymbolKind::Variable { initialized, .. } = &mut self.table.symbol_mut(id).kind {
            *initialized = true;
        }
    }

    /// Find a class member by name in the class's attribute or method list.
    pub(crate) fn class_member(
        &self,
        class: SymbolId,
        name: &str,
        tag: SymbolTag,
    ) -> Option<SymbolId> {
        let SymbolKind::Class {
            attributes,
            methods,
            ..
        } = &self.table.symbol(class).kind
        else {
            panic!("class_member called on non-class symbol");
        };
        let members = match tag {
            SymbolTag::Variable => attributes,
            SymbolTag::Function => methods,
            SymbolTag::Class => return None,
        };
        members
            .iter()
            .copied()
            .find(|&m| self.table.symbol(m).name == name)
    }

    fn missing(&self, what: &str, node: &Node) -> CompileError {
        CompileError::malformed(format!("{what} missing in '{}'", node.text()))
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for SemanticAnalyzer {
    type Error = CompileError;

    fn visit_program(&mut self, node: &Node) -> Result<()> {
        log::debug!("starting semantic analysis");
        self.enter_scope("global");
        self.visit_children(node)?;
        self.exit_scope();
        Ok(())
    }

    fn visit_class_decl(&mut self, node: &Node) -> Result<()> {
        let name = node
            .token(TokenKind::Identifier, 0)
            .ok_or_else(|| self.missing("class name", node))?
            .to_string();

        let parent = match node.token(TokenKind::Identifier, 1) {
            Some(parent_name) => Some(
                self.resolve(parent_name, SymbolTag::Class)
                    .ok_or_else(|| CompileError::UnknownClass {
                        name: parent_name.to_string(),
                    })?,
            ),
            None => None,
        };

        let class = self.declare(Symbol::class(name.clone(), parent), self.current_scope())?;
        self.enter_scope(&name);

        if let Some(parent) = parent {
            self.copy_inherited_members(class, parent)?;
        }

        let ctx = self.ctx().in_class(class, self.current_scope());
        self.with_ctx(ctx, |a| {
            for method in node.rule_children(Rule::Function) {
                a.visit_function(method)?;
            }
            Ok(())
        })?;

        self.exit_scope();

        // The layout is final once every attribute type is concrete;
        // otherwise the first instantiation binds the placeholders.
        if self.attributes_concrete(class) {
            self.table.complete_class(class);
        }
        Ok(())
    }

    fn visit_function(&mut self, node: &Node) -> Result<()> {
        let name = node
            .token(TokenKind::Identifier, 0)
            .ok_or_else(|| self.missing("function name", node))?
            .to_string();

        let ctx = self.ctx();
        let is_init = ctx.class.is_some() && name == "init";

        let function = self.declare(Symbol::function(name.clone()), self.current_scope())?;
        if let Some(class) = ctx.class {
            self.add_method(class, function);
        }

        self.enter_scope(&name);

        let mut params = Vec::new();
        if let Some(parameters) = node.rule_child(Rule::Parameters, 0) {
            let names: Vec<String> = parameters
                .children()
                .iter()
                .filter_map(|c| match c {
                    Node::Terminal {
                        kind: TokenKind::Identifier,
                        text,
                    } => Some(text.clone()),
                    _ => None,
                })
                .collect();
            for param_name in names {
                // Parameters are untyped in the source; they enter as Any
                // and count as initialized.
                let param = self.declare(
                    Symbol::variable(param_name, DataType::Any, VarRole::Parameter),
                    self.current_scope(),
                )?;
                self.mark_initialized(param);
                params.push(param);
            }
        }
        if let SymbolKind::Function {
            params: declared, ..
        } = &mut self.table.symbol_mut(function).kind
        {
            *declared = params;
        }

        let body = node
            .rule_child(Rule::Block, 0)
            .ok_or_else(|| self.missing("function body", node))?;
        let fctx = ctx.in_function(function, is_init);
        self.with_ctx(fctx, |a| a.visit_block(body))?;

        self.exit_scope();
        Ok(())
    }

    fn visit_var_decl(&mut self, node: &Node) -> Result<()> {
        let name = node
            .token(TokenKind::Identifier, 0)
            .ok_or_else(|| self.missing("variable name", node))?
            .to_string();

        // Without an initializer the type cannot be inferred yet.
        let (data_type, initialized) = match node.rule_child(Rule::Expression, 0) {
            Some(init) => (self.expr_type(init, self.ctx())?, true),
            None => (DataType::Any, false),
        };

        let variable = self.declare(
            Symbol::variable(name, data_type, VarRole::Local),
            self.current_scope(),
        )?;
        if initialized {
            self.mark_initialized(variable);
        }
        Ok(())
    }

    fn visit_expr_stmt(&mut self, node: &Node) -> Result<()> {
        let expr = node
            .rule_child(Rule::Expression, 0)
            .ok_or_else(|| self.missing("expression", node))?;
        self.expr_type(expr, self.ctx())?;
        Ok(())
    }

    fn visit_expression(&mut self, node: &Node) -> Result<()> {
        // Reached when an expression appears outside a dedicated
        // statement callback; type it for its side effects.
        self.expr_type(node, self.ctx())?;
        Ok(())
    }

    fn visit_if_stmt(&mut self, node: &Node) -> Result<()> {
        self.enter_scope("if");
        let cond = node
            .rule_child(Rule::Expression, 0)
            .ok_or_else(|| self.missing("if condition", node))?;
        self.expr_type(cond, self.ctx())?;
        let then_branch = node
            .rule_child(Rule::Statement, 0)
            .ok_or_else(|| self.missing("if body", node))?;
        self.visit(then_branch)?;
        self.exit_scope();

        if let Some(else_branch) = node.rule_child(Rule::Statement, 1) {
            self.enter_scope("else");
            self.visit(else_branch)?;
            self.exit_scope();
        }
        Ok(())
    }

    fn visit_while_stmt(&mut self, node: &Node) -> Result<()> {
        self.enter_scope("while");
        let cond = node
            .rule_child(Rule::Expression, 0)
            .ok_or_else(|| self.missing("while condition", node))?;
        self.expr_type(cond, self.ctx())?;
        let body = node
            .rule_child(Rule::Statement, 0)
            .ok_or_else(|| self.missing("while body", node))?;
        self.visit(body)?;
        self.exit_scope();
        Ok(())
    }

    fn visit_for_stmt(&mut self, node: &Node) -> Result<()> {
        self.enter_scope("for");
        if let Some(init) = node.rule_child(Rule::VarDecl, 0) {
            self.visit_var_decl(init)?;
        } else if let Some(init) = node.rule_child(Rule::ExprStmt, 0) {
            self.visit_expr_stmt(init)?;
        } else {
            return Err(self.missing("for initializer", node));
        }
        let cond = node
            .rule_child(Rule::Expression, 0)
            .ok_or_else(|| self.missing("for condition", node))?;
        self.expr_type(cond, self.ctx())?;
        let increment = node
            .rule_child(Rule::Expression, 1)
            .ok_or_else(|| self.missing("for increment", node))?;
        self.expr_type(increment, self.ctx())?;
        let body = node
            .rule_child(Rule::Statement, 0)
            .ok_or_else(|| self.missing("for body", node))?;
        self.visit(body)?;
        self.exit_scope();
        Ok(())
    }

    fn visit_return_stmt(&mut self, node: &Node) -> Result<()> {
        let ctx = self.ctx();
        let Some(function) = ctx.function else {
            return Err(CompileError::invalid_context(
                "'return' outside of a function",
            ));
        };
        if ctx.in_init {
            return Err(CompileError::invalid_context(
                "'return' inside a constructor",
            ));
        }

        let return_type = match node.rule_child(Rule::Expression, 0) {
            Some(expr) => self.expr_type(expr, ctx)?,
            None => DataType::Nil,
        };

        // The first return fixes the type; later returns are not
        // re-validated against it (preserved source behavior).
        if let SymbolKind::Function {
            return_type: declared,
            return_fixed,
            ..
        } = &mut self.table.symbol_mut(function).kind
            && !*return_fixed
        {
            *declared = return_type;
            *return_fixed = true;
        }
        Ok(())
    }

    fn visit_print_stmt(&mut self, node: &Node) -> Result<()> {
        let expr = node
            .rule_child(Rule::Expression, 0)
            .ok_or_else(|| self.missing("print expression", node))?;
        let ctx = self.ctx().in_print();
        self.expr_type(expr, ctx)?;
        Ok(())
    }
}

impl SemanticAnalyzer {
    /// Copy the parent's attributes and methods into the freshly opened
    /// class scope. The constructor is never inherited; everything else
    /// may be overridden by a declaration with the same name.
    fn copy_inherited_members(&mut self, class: SymbolId, parent: SymbolId) -> Result<()> {
        let SymbolKind::Class {
            attributes,
            methods,
            ..
        } = &self.table.symbol(parent).kind
        else {
            panic!("parent of class is not a class symbol");
        };
        let parent_attributes = attributes.clone();
        let parent_methods = methods.clone();
        let class_scope = self.current_scope();

        for attr in parent_attributes {
            let mut copy = self.table.symbol(attr).clone();
            copy.inherited = true;
            let id = self.table.declare(copy, class_scope);
            self.add_attribute(class, id);
        }
        for method in parent_methods {
            if self.table.symbol(method).name == "init" {
                continue;
            }
            let mut copy = self.table.symbol(method).clone();
            copy.inherited = true;
            let id = self.table.declare(copy, class_scope);
            self.add_method(class, id);
        }
        Ok(())
    }

    pub(crate) fn add_attribute(&mut self, class: SymbolId, attribute: SymbolId) {
        if let SymbolKind::Class { attributes, .. } = &mut self.table.symbol_mut(class).kind
            && !attributes.contains(&attribute)
        {
            attributes.push(attribute);
        }
    }

    fn add_method(&mut self, class: SymbolId, method: SymbolId) {
        if let SymbolKind::Class { methods, .. } = &mut self.table.symbol_mut(class).kind
            && !methods.contains(&method)
        {
            methods.push(method);
        }
    }

    fn attributes_concrete(&self, class: SymbolId) -> bool {
        let SymbolKind::Class { attributes, .. } = &self.table.symbol(class).kind else {
            unreachable!()
        };
        attributes
            .iter()
            .all(|&a| !self.table.symbol(a).data_type.is_any())
    }

    pub(crate) fn table_mut(&mut self) -> &mut SymbolTable {
        &mut self.table
    }

    /// Transition an incomplete class whose placeholder attributes were
    /// just bound by its first instantiation.
    pub(crate) fn complete_if_incomplete(&mut self, class: SymbolId) {
        if let SymbolKind::Class { state, .. } = &self.table.symbol(class).kind
            && matches!(state, ClassState::Incomplete)
        {
            self.table.complete_class(class);
        }
    }
}
