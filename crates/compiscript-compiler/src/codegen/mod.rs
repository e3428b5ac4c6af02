//! Intermediate code generation: pass 2 of the backend.
//!
//! A second traversal over the validated tree, reading the finished
//! symbol table and emitting the data section plus the instruction
//! streams. Scopes are not created again; the generator replays the
//! scope list in the order analysis recorded it, so every name resolves
//! to exactly the symbol analysis resolved it to.
//!
//! Nothing in this pass reports user errors. A failed lookup after a
//! successful analysis is an implementation defect and panics.

mod branch;
mod builder;
mod expr;
mod operand;
mod registers;

pub use branch::BranchTargets;
pub use builder::{Context, InstructionBuilder};
pub use operand::{Lowered, Operand, Value};
pub use registers::{RegisterController, Slot};

use compiscript_core::parse_tree::{Node, Rule, TokenKind, Visitor};
use compiscript_core::{
    CompileError, DataType, ScopeId, SymbolId, SymbolKind, SymbolTable, SymbolTag, VarRole,
};

use crate::Result;
use crate::analyzer::Ctx;

/// The intermediate code generator. One instance per compilation,
/// consuming the symbol table the analyzer produced.
pub struct IntermediateCodeGenerator<'t> {
    table: &'t SymbolTable,
    open: Vec<ScopeId>,
    /// Next scope to replay, in analysis creation order.
    cursor: u32,
    registers: RegisterController,
    builder: InstructionBuilder,
    ctx: Vec<Ctx>,
    /// Whether the function body being lowered has emitted an explicit
    /// return; reset at every function entry.
    fn_returned: bool,
}

impl<'t> IntermediateCodeGenerator<'t> {
    pub fn new(table: &'t SymbolTable) -> Self {
        Self {
            table,
            open: Vec::new(),
            cursor: 0,
            registers: RegisterController::new(),
            builder: InstructionBuilder::new(),
            ctx: vec![Ctx::default()],
            fn_returned: false,
        }
    }

    /// Lower a validated program tree to the final instruction set.
    pub fn generate(tree: &Node, table: &'t SymbolTable) -> Result<String> {
        let mut generator = Self::new(table);
        generator.visit(tree)?;
        debug_assert!(generator.open.is_empty(), "unbalanced scope replay");
        Ok(generator.builder.finish())
    }

    // ------------------------------------------------------------------
    // Scope replay and contexts
    // ------------------------------------------------------------------

    /// Re-open the next scope analysis created. The traversal order is
    /// identical across both passes, so the cursor walks the scope list
    /// exactly as it was built.
    fn enter_scope(&mut self) {
        let id = ScopeId(self.cursor);
        assert!(
            (id.index()) < self.table.scope_count(),
            "defect: scope replay ran past the recorded scope list"
        );
        self.cursor += 1;
        self.open.push(id);
    }

    fn exit_scope(&mut self) {
        self.open
            .pop()
            .expect("scope stack underflow: exit_scope without enter_scope");
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
    // Lookups (misses are defects, not user errors)
    // ------------------------------------------------------------------

    pub(crate) fn resolve(&self, name: &str, tag: SymbolTag) -> SymbolId {
        self.table
            .resolve(&self.open, name, tag)
            .unwrap_or_else(|| panic!("defect: {tag} '{name}' unresolved after analysis"))
    }

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
            panic!("defect: class_member on non-class symbol");
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

    // ------------------------------------------------------------------
    // Memory naming
    // ------------------------------------------------------------------

    /// The data-section label backing a variable. Attributes are
    /// qualified by their class scope; everything else by the scope's
    /// creation index, which keeps shadowed names distinct.
    pub(crate) fn memory_name(&self, id: SymbolId) -> String {
        let symbol = self.table.symbol(id);
        let scope = self.table.scope(symbol.scope);
        match &symbol.kind {
            SymbolKind::Variable {
                role: VarRole::Attribute,
                ..
            } => format!("{}_{}", scope.name, symbol.name),
            _ => format!("{}_{}", symbol.name, scope.index),
        }
    }

    /// The text-section label for a function or method block.
    pub(crate) fn function_label(&self, id: SymbolId) -> String {
        let symbol = self.table.symbol(id);
        let scope = self.table.scope(symbol.scope);
        if scope.name == "global" {
            symbol.name.clone()
        } else {
            format!("{}_{}", scope.name, symbol.name)
        }
    }

    /// Reserve data-section storage for a variable: strings get inline
    /// character storage, everything else a zeroed word.
    fn declare_storage(&mut self, id: SymbolId) {
        let mem = self.memory_name(id);
        match self.table.symbol(id).data_type {
            DataType::String => self.builder.space(&mem, 10),
            _ => self.builder.word(&mem, 0),
        }
    }
}

impl Visitor for IntermediateCodeGenerator<'_> {
    type Error = CompileError;

    fn visit_program(&mut self, node: &Node) -> Result<()> {
        log::debug!("starting code generation");
        self.enter_scope();
        self.visit_children(node)?;
        self.exit_scope();
        Ok(())
    }

    fn visit_class_decl(&mut self, node: &Node) -> Result<()> {
        let name = node
            .token(TokenKind::Identifier, 0)
            .expect("class name validated by analysis");
        let class = self.resolve(name, SymbolTag::Class);
        self.enter_scope();

        let SymbolKind::Class {
            attributes,
            methods,
            parent,
            ..
        } = &self.table.symbol(class).kind
        else {
            unreachable!()
        };
        let attributes = attributes.clone();
        let methods = methods.clone();
        let parent = *parent;

        for attribute in attributes {
            self.declare_storage(attribute);
        }

        let ctx = self.ctx().in_class(class, self.current_scope());
        self.with_ctx(ctx, |g| {
            for method in node.rule_children(Rule::Function) {
                g.visit_function(method)?;
            }
            Ok(())
        })?;

        // Inherited methods have no block of their own; alias their
        // label to the parent's block.
        if let Some(parent) = parent {
            let previous = self.builder.context();
            self.builder.switch_context(Context::Local);
            for method in methods {
                if !self.table.symbol(method).inherited {
                    continue;
                }
                let method_name = self.table.symbol(method).name.clone();
                let target = self
                    .class_member(parent, &method_name, SymbolTag::Function)
                    .unwrap_or_else(|| {
                        panic!("defect: inherited method '{method_name}' missing on parent")
                    });
                let alias = self.function_label(method);
                let target_label = self.function_label(target);
                self.builder.label(&alias);
                self.builder.jump(&target_label);
            }
            self.builder.switch_context(previous);
        }

        self.exit_scope();
        Ok(())
    }

    fn visit_function(&mut self, node: &Node) -> Result<()> {
        let name = node
            .token(TokenKind::Identifier, 0)
            .expect("function name validated by analysis");
        let function = self.resolve(name, SymbolTag::Function);
        let label = self.function_label(function);
        log::debug!("lowering function '{label}'");

        self.enter_scope();
        let previous = self.builder.context();
        self.builder.switch_context(Context::Local);
        // A function declared inside another function's body must not
        // interleave with the enclosing block mid-stream; each block is
        // staged whole and appended on completion.
        self.builder.begin_block();
        self.builder.label(&label);

        // Arguments arrive in $a0..$a2 (stack slots past that). Spill
        // each to its memory slot so later reads behave like any local,
        // and keep the register binding for cheap immediate reuse.
        let SymbolKind::Function { params, .. } = &self.table.symbol(function).kind else {
            unreachable!()
        };
        let params = params.clone();
        self.registers.clear_live();
        for (position, &param) in params.iter().enumerate() {
            let size = self.table.type_size(self.table.symbol(param).data_type);
            let slot = self.registers.argument_slot(position, size);
            let mem = self.memory_name(param);
            self.builder.word(&mem, 0);
            self.builder.save(slot, &mem);
            self.registers.bind(slot, param);
        }

        let ctx = self.ctx();
        let is_init = ctx.class.is_some() && name == "init";
        let fctx = ctx.in_function(function, is_init);
        let enclosing_returned = self.fn_returned;
        self.fn_returned = false;
        let body = node
            .rule_child(Rule::Block, 0)
            .expect("function body validated by analysis");
        self.with_ctx(fctx, |g| g.visit_block(body))?;
        if !self.fn_returned {
            self.builder.ret();
        }
        self.fn_returned = enclosing_returned;

        // Bindings made inside the block (parameters included) do not
        // survive past it.
        self.registers.clear_live();
        self.exit_scope();
        self.builder.end_block();
        self.builder.switch_context(previous);
        Ok(())
    }

    fn visit_var_decl(&mut self, node: &Node) -> Result<()> {
        let name = node
            .token(TokenKind::Identifier, 0)
            .expect("variable name validated by analysis");
        let variable = self.resolve(name, SymbolTag::Variable);
        let mem = self.memory_name(variable);

        match node.rule_child(Rule::Expression, 0) {
            None => self.declare_storage(variable),
            Some(init) => {
                let lowered = self.lower_expr(init);
                match lowered.operand {
                    // Literal initializers embed directly in the directive.
                    Operand::Literal(Value::Number(n)) => self.builder.word(&mem, n),
                    Operand::Literal(Value::Bool(b)) => self.builder.word(&mem, i64::from(b)),
                    Operand::Literal(Value::Nil) => self.builder.word(&mem, 0),
                    Operand::Literal(Value::Str(s)) => self.builder.asciiz(&mem, &s),
                    operand => {
                        self.builder.word(&mem, 0);
                        let reg = self.into_register(operand);
                        self.builder.save(reg, &mem);
                        self.release(reg);
                    }
                }
            }
        }
        Ok(())
    }

    fn visit_expr_stmt(&mut self, node: &Node) -> Result<()> {
        let expr = node
            .rule_child(Rule::Expression, 0)
            .expect("expression validated by analysis");
        let lowered = self.lower_expr(expr);
        if let Operand::Register(slot) = lowered.operand {
            self.release(slot);
        }
        Ok(())
    }

    fn visit_expression(&mut self, node: &Node) -> Result<()> {
        let lowered = self.lower_expr(node);
        if let Operand::Register(slot) = lowered.operand {
            self.release(slot);
        }
        Ok(())
    }

    fn visit_if_stmt(&mut self, node: &Node) -> Result<()> {
        self.enter_scope();
        let true_label = self.builder.new_label("true");
        let false_label = self.builder.new_label("false");
        let has_else = node.rule_child(Rule::Statement, 1).is_some();
        let end_label = if has_else {
            self.builder.new_label("end")
        } else {
            false_label.clone()
        };

        let cond = node
            .rule_child(Rule::Expression, 0)
            .expect("if condition validated by analysis");
        self.lower_condition(
            cond,
            BranchTargets::both(true_label.clone(), false_label.clone()),
        );

        self.builder.label(&true_label);
        let then_branch = node
            .rule_child(Rule::Statement, 0)
            .expect("if body validated by analysis");
        self.visit(then_branch)?;
        self.exit_scope();

        if has_else {
            self.builder.jump(&end_label);
            self.builder.label(&false_label);
            self.enter_scope();
            let else_branch = node.rule_child(Rule::Statement, 1).expect("checked above");
            self.visit(else_branch)?;
            self.exit_scope();
            self.builder.label(&end_label);
        } else {
            self.builder.label(&false_label);
        }
        Ok(())
    }

    fn visit_while_stmt(&mut self, node: &Node) -> Result<()> {
        self.enter_scope();
        let start = self.builder.new_label("while");
        let end = self.builder.new_label("end");

        self.builder.label(&start);
        let cond = node
            .rule_child(Rule::Expression, 0)
            .expect("while condition validated by analysis");
        self.lower_condition(cond, BranchTargets::on_false(end.clone()));

        let body = node
            .rule_child(Rule::Statement, 0)
            .expect("while body validated by analysis");
        self.visit(body)?;
        self.builder.jump(&start);
        self.builder.label(&end);
        self.exit_scope();
        Ok(())
    }

    fn visit_for_stmt(&mut self, node: &Node) -> Result<()> {
        self.enter_scope();
        if let Some(init) = node.rule_child(Rule::VarDecl, 0) {
            self.visit_var_decl(init)?;
        } else {
            let init = node
                .rule_child(Rule::ExprStmt, 0)
                .expect("for initializer validated by analysis");
            self.visit_expr_stmt(init)?;
        }

        let start = self.builder.new_label("for");
        let end = self.builder.new_label("end");
        self.builder.label(&start);
        let cond = node
            .rule_child(Rule::Expression, 0)
            .expect("for condition validated by analysis");
        self.lower_condition(cond, BranchTargets::on_false(end.clone()));

        // The increment is lowered in source order but staged, then
        // flushed after the body so it executes at the loop's tail.
        let increment = node
            .rule_child(Rule::Expression, 1)
            .expect("for increment validated by analysis");
        let previous = self.builder.context();
        self.builder.switch_context(Context::Staging);
        let lowered = self.lower_expr(increment);
        if let Operand::Register(slot) = lowered.operand {
            self.release(slot);
        }
        self.builder.switch_context(previous);

        let body = node
            .rule_child(Rule::Statement, 0)
            .expect("for body validated by analysis");
        self.visit(body)?;
        self.builder.flush_staging();
        self.builder.jump(&start);
        self.builder.label(&end);
        self.exit_scope();
        Ok(())
    }

    fn visit_return_stmt(&mut self, node: &Node) -> Result<()> {
        if let Some(expr) = node.rule_child(Rule::Expression, 0) {
            let lowered = self.lower_expr(expr);
            match lowered.operand {
                Operand::Literal(Value::Number(n)) => self.builder.load(Slot::Return, n),
                Operand::Literal(Value::Bool(b)) => self.builder.load(Slot::Return, i64::from(b)),
                Operand::Literal(Value::Nil) => self.builder.load(Slot::Return, 0),
                Operand::Literal(Value::Str(s)) => {
                    let label = self.builder.intern_string(&s);
                    self.builder.load(Slot::Return, label);
                }
                operand => {
                    let reg = self.into_register(operand);
                    self.builder.move_to(Slot::Return, reg);
                    self.release(reg);
                }
            }
        }
        self.builder.ret();
        self.fn_returned = true;
        Ok(())
    }

    fn visit_print_stmt(&mut self, node: &Node) -> Result<()> {
        let expr = node
            .rule_child(Rule::Expression, 0)
            .expect("print expression validated by analysis");
        let lowered = self.lower_expr(expr);

        // $a0 may hold a parameter binding; it is clobbered here.
        self.registers.free(Slot::Arg(0));

        if lowered.data_type == DataType::String {
            match lowered.operand {
                Operand::Literal(Value::Str(s)) => {
                    let label = self.builder.intern_string(&s);
                    self.builder.load(Slot::Arg(0), label);
                }
                Operand::Symbol(id) => {
                    let mem = self.memory_name(id);
                    self.builder.load(Slot::Arg(0), mem);
                }
                Operand::Register(slot) => {
                    self.builder.move_to(Slot::Arg(0), slot);
                    self.release(slot);
                }
                other => panic!("defect: string print from {other:?}"),
            }
            self.builder.print_syscall(4);
        } else {
            let reg = self.into_register(lowered.operand);
            self.builder.move_to(Slot::Arg(0), reg);
            self.release(reg);
            self.builder.print_syscall(1);
        }
        Ok(())
    }
}
