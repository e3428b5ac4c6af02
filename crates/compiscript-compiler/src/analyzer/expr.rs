//! Bottom-up expression typing.
//!
//! Each precedence level gets one method. A node with a single child is
//! a wrapper produced by a pass-through derivation; the methods descend
//! through wrappers without doing any work, so only nodes that actually
//! apply an operator carry checks.
//!
//! `Any` is a universal pass: it satisfies every operand requirement and
//! surfaces wherever the type genuinely cannot be known yet (parameters,
//! uninitialized variables, recursion cycles).

use compiscript_core::parse_tree::{Node, Rule, TokenKind};
use compiscript_core::{
    ClassState, CompileError, DataType, Symbol, SymbolId, SymbolKind, SymbolTag, VarRole,
};

use crate::Result;

use super::{Ctx, SemanticAnalyzer};

impl SemanticAnalyzer {
    /// Type an `expression` node.
    pub(crate) fn expr_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        let assignment = node
            .rule_child(Rule::Assignment, 0)
            .ok_or_else(|| CompileError::malformed("expression without assignment child"))?;
        self.assignment_type(assignment, ctx)
    }

    fn assignment_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if node.child_count() == 1 {
            let inner = node.child(0).expect("wrapper child");
            return self.logic_or_type(inner, ctx);
        }

        let value = node
            .rule_child(Rule::Assignment, 0)
            .ok_or_else(|| CompileError::malformed("assignment without value"))?;

        if let Some(call) = node.rule_child(Rule::Call, 0) {
            // `receiver.attr = value`
            let attr = node
                .token(TokenKind::Identifier, 0)
                .ok_or_else(|| CompileError::malformed("attribute assignment without name"))?
                .to_string();
            let value_type = self.assignment_type(value, ctx)?;
            self.assign_attribute(call, &attr, value_type, ctx)?;
            return Ok(value_type);
        }

        // `name = value`
        let name = node
            .token(TokenKind::Identifier, 0)
            .ok_or_else(|| CompileError::malformed("assignment without target"))?
            .to_string();
        let value_type = self.assignment_type(value, ctx)?;
        let variable = self
            .resolve(&name, SymbolTag::Variable)
            .ok_or(CompileError::UndefinedSymbol {
                kind: "variable",
                name,
            })?;
        self.refine_variable(variable, value_type);
        Ok(value_type)
    }

    /// Handle the `receiver.attr = value` form. In a constructor the
    /// first assignment to `this.attr` defines the attribute on the
    /// class scope one level below; its position fixes the offset.
    fn assign_attribute(
        &mut self,
        call: &Node,
        attr: &str,
        value_type: DataType,
        ctx: Ctx,
    ) -> Result<()> {
        let primary = call
            .rule_child(Rule::Primary, 0)
            .ok_or_else(|| CompileError::malformed("attribute assignment without receiver"))?;

        if primary.child_text(0) == Some("this") {
            let class = ctx.class.ok_or_else(|| {
                CompileError::invalid_context("'this' outside of a class")
            })?;

            if ctx.in_init {
                let class_scope = ctx
                    .class_scope
                    .expect("constructor context without a class scope");
                if let Some(existing) =
                    self.table()
                        .find_in_scope(class_scope, attr, SymbolTag::Variable)
                {
                    let record = self.table_mut().symbol_mut(existing);
                    if record.inherited {
                        record.inherited = false;
                        record.data_type = value_type;
                    } else if record.data_type.is_any() {
                        record.data_type = value_type;
                    }
                    self.refine_variable(existing, value_type);
                } else {
                    let symbol = Symbol::variable(attr, value_type, VarRole::Attribute);
                    let id = self.table_mut().declare(symbol, class_scope);
                    self.refine_variable(id, value_type);
                    self.add_attribute(class, id);
                }
                return Ok(());
            }

            let attribute = self
                .class_member(class, attr, SymbolTag::Variable)
                .ok_or(CompileError::UndefinedSymbol {
                    kind: "attribute",
                    name: attr.to_string(),
                })?;
            self.refine_variable(attribute, value_type);
            return Ok(());
        }

        // `instance.attr = value`
        let receiver = self.primary_type(primary, ctx)?;
        match receiver {
            DataType::Instance(class) => {
                let attribute = self
                    .class_member(class, attr, SymbolTag::Variable)
                    .ok_or(CompileError::UndefinedSymbol {
                        kind: "attribute",
                        name: attr.to_string(),
                    })?;
                self.refine_variable(attribute, value_type);
                Ok(())
            }
            DataType::Any => Ok(()),
            other => Err(CompileError::type_mismatch(format!(
                "cannot assign attribute on a value of type {other}"
            ))),
        }
    }

    /// Mark a variable initialized and lift an `Any` placeholder to the
    /// assigned type.
    fn refine_variable(&mut self, id: SymbolId, value_type: DataType) {
        let record = self.table_mut().symbol_mut(id);
        if let SymbolKind::Variable { initialized, .. } = &mut record.kind {
            *initialized = true;
        }
        if record.data_type.is_any() && !value_type.is_any() {
            record.data_type = value_type;
        }
    }

    fn logic_or_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if node.child_count() == 1 {
            return self.logic_and_type(node.child(0).expect("wrapper child"), ctx);
        }
        for operand in node.rule_children(Rule::LogicAnd) {
            let t = self.logic_and_type(operand, ctx)?;
            if !t.is_boolean() {
                return Err(CompileError::type_mismatch(format!(
                    "'or' requires boolean operands, got {t}"
                )));
            }
        }
        Ok(DataType::Boolean)
    }

    fn logic_and_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if node.child_count() == 1 {
            return self.equality_type(node.child(0).expect("wrapper child"), ctx);
        }
        for operand in node.rule_children(Rule::Equality) {
            let t = self.equality_type(operand, ctx)?;
            if !t.is_boolean() {
                return Err(CompileError::type_mismatch(format!(
                    "'and' requires boolean operands, got {t}"
                )));
            }
        }
        Ok(DataType::Boolean)
    }

    fn equality_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if node.child_count() == 1 {
            return self.comparison_type(node.child(0).expect("wrapper child"), ctx);
        }
        let operands: Vec<&Node> = node.rule_children(Rule::Comparison).collect();
        if operands.len() > 2 {
            return Err(CompileError::type_mismatch(
                "equality does not chain; parenthesize one side",
            ));
        }
        let mut known: Option<DataType> = None;
        for operand in operands {
            let t = self.comparison_type(operand, ctx)?;
            if t.is_any() {
                continue;
            }
            match known {
                Some(k) if k != t => {
                    return Err(CompileError::type_mismatch(format!(
                        "cannot compare {k} and {t} for equality"
                    )));
                }
                Some(_) => {}
                None => known = Some(t),
            }
        }
        Ok(DataType::Boolean)
    }

    fn comparison_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if node.child_count() == 1 {
            return self.term_type(node.child(0).expect("wrapper child"), ctx);
        }
        let operands: Vec<&Node> = node.rule_children(Rule::Term).collect();
        if operands.len() > 2 {
            return Err(CompileError::type_mismatch(
                "comparison does not chain; parenthesize one side",
            ));
        }
        for operand in operands {
            let t = self.term_type(operand, ctx)?;
            if !t.is_numeric() {
                return Err(CompileError::type_mismatch(format!(
                    "comparison requires numeric operands, got {t}"
                )));
            }
        }
        Ok(DataType::Boolean)
    }

    fn term_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if node.child_count() == 1 {
            return self.factor_type(node.child(0).expect("wrapper child"), ctx);
        }

        let has_minus = node
            .children()
            .iter()
            .any(|c| c.terminal_text() == Some("-"));

        // Preserved source rule: print expressions may not subtract.
        if has_minus && ctx.in_print {
            return Err(CompileError::InvalidPrintOperator);
        }

        let mut saw_string = false;
        for operand in node.rule_children(Rule::Factor) {
            let t = self.factor_type(operand, ctx)?;
            if has_minus {
                if !t.is_numeric() {
                    return Err(CompileError::type_mismatch(format!(
                        "'-' requires numeric operands, got {t}"
                    )));
                }
            } else {
                match t {
                    DataType::Number | DataType::Any => {}
                    DataType::String => saw_string = true,
                    other => {
                        return Err(CompileError::type_mismatch(format!(
                            "'+' requires numeric or string operands, got {other}"
                        )));
                    }
                }
            }
        }

        // `+` overloads addition and concatenation purely by operand
        // type: any string operand makes the whole term a string.
        if saw_string {
            Ok(DataType::String)
        } else {
            Ok(DataType::Number)
        }
    }

    fn factor_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if node.child_count() == 1 {
            return self.unary_type(node.child(0).expect("wrapper child"), ctx);
        }
        for operand in node.rule_children(Rule::Unary) {
            let t = self.unary_type(operand, ctx)?;
            if !t.is_numeric() {
                return Err(CompileError::type_mismatch(format!(
                    "'*', '/' and '%' require numeric operands, got {t}"
                )));
            }
        }
        Ok(DataType::Number)
    }

    fn unary_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if node.child_count() == 1 {
            return self.call_type(node.child(0).expect("wrapper child"), ctx);
        }
        let operator = node.child_text(0).unwrap_or_default();
        let operand = node
            .rule_child(Rule::Unary, 0)
            .ok_or_else(|| CompileError::malformed("unary operator without operand"))?;
        let t = self.unary_type(operand, ctx)?;
        match operator {
            "!" => {
                if !t.is_boolean() {
                    return Err(CompileError::type_mismatch(format!(
                        "'!' requires a boolean operand, got {t}"
                    )));
                }
                Ok(DataType::Boolean)
            }
            "-" => {
                if !t.is_numeric() {
                    return Err(CompileError::type_mismatch(format!(
                        "unary '-' requires a numeric operand, got {t}"
                    )));
                }
                Ok(DataType::Number)
            }
            other => Err(CompileError::malformed(format!(
                "invalid unary operator '{other}'"
            ))),
        }
    }

    fn call_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if node.child_count() == 1 {
            return self.primary_type(node.child(0).expect("wrapper child"), ctx);
        }

        let primary = node
            .rule_child(Rule::Primary, 0)
            .ok_or_else(|| CompileError::malformed("call without callee"))?;
        let suffix = node.child_text(1).unwrap_or_default();

        match suffix {
            "(" => self.invocation_type(node, primary, ctx),
            "." => self.member_access_type(node, primary, ctx),
            other => Err(CompileError::malformed(format!(
                "invalid call suffix '{other}'"
            ))),
        }
    }

    /// `callee(args)` where the callee is a bare identifier or a
    /// `super.method` primary.
    fn invocation_type(&mut self, node: &Node, primary: &Node, ctx: Ctx) -> Result<DataType> {
        let args = self.argument_types(node, ctx)?;

        if primary.child_text(0) == Some("super") {
            let method_name = primary
                .token(TokenKind::Identifier, 0)
                .ok_or_else(|| CompileError::malformed("'super' without member name"))?
                .to_string();
            let method = self.super_member(&method_name, ctx)?;
            return self.finish_call(method, args.len(), ctx);
        }

        let name = primary
            .token(TokenKind::Identifier, 0)
            .ok_or_else(|| CompileError::malformed("call target is not a name"))?
            .to_string();
        let function =
            self.resolve(&name, SymbolTag::Function)
                .ok_or(CompileError::UndefinedSymbol {
                    kind: "function",
                    name,
                })?;
        self.finish_call(function, args.len(), ctx)
    }

    /// `receiver.member` and `receiver.member(args)`.
    fn member_access_type(&mut self, node: &Node, primary: &Node, ctx: Ctx) -> Result<DataType> {
        let member = node
            .token(TokenKind::Identifier, 0)
            .ok_or_else(|| CompileError::malformed("member access without name"))?
            .to_string();
        let is_call = node
            .children()
            .iter()
            .any(|c| c.terminal_text() == Some("("));
        let args = if is_call {
            Some(self.argument_types(node, ctx)?)
        } else {
            None
        };

        let class = if primary.child_text(0) == Some("this") {
            ctx.class
                .ok_or_else(|| CompileError::invalid_context("'this' outside of a class"))?
        } else {
            let receiver = self.primary_type(primary, ctx)?;
            match receiver {
                DataType::Instance(class) => class,
                DataType::Any => return Ok(DataType::Any),
                other => {
                    return Err(CompileError::type_mismatch(format!(
                        "cannot access member '{member}' on a value of type {other}"
                    )));
                }
            }
        };

        match args {
            Some(args) => {
                let method = self.class_member(class, &member, SymbolTag::Function).ok_or(
                    CompileError::UndefinedSymbol {
                        kind: "method",
                        name: member,
                    },
                )?;
                self.finish_call(method, args.len(), ctx)
            }
            None => {
                let attribute = self.class_member(class, &member, SymbolTag::Variable).ok_or(
                    CompileError::UndefinedSymbol {
                        kind: "attribute",
                        name: member,
                    },
                )?;
                Ok(self.table().symbol(attribute).data_type)
            }
        }
    }

    /// Arity check plus return type, with the recursion escape hatch: a
    /// function calling itself before its return type is fixed types as
    /// `Any` to break the inference cycle.
    fn finish_call(&mut self, function: SymbolId, arg_count: usize, ctx: Ctx) -> Result<DataType> {
        let SymbolKind::Function {
            params,
            return_type,
            return_fixed,
        } = &self.table().symbol(function).kind
        else {
            panic!("finish_call on non-function symbol");
        };
        let expected = params.len();
        let return_type = *return_type;
        let return_fixed = *return_fixed;

        if arg_count != expected {
            return Err(CompileError::Arity {
                name: self.table().symbol(function).name.clone(),
                expected,
                found: arg_count,
            });
        }
        if ctx.function == Some(function) && !return_fixed {
            return Ok(DataType::Any);
        }
        Ok(return_type)
    }

    /// Type every expression in the call's argument list, in order.
    fn argument_types(&mut self, node: &Node, ctx: Ctx) -> Result<Vec<DataType>> {
        let mut types = Vec::new();
        if let Some(arguments) = node.rule_child(Rule::Arguments, 0) {
            for expr in arguments.rule_children(Rule::Expression) {
                types.push(self.expr_type(expr, ctx)?);
            }
        }
        Ok(types)
    }

    fn super_member(&mut self, name: &str, ctx: Ctx) -> Result<SymbolId> {
        let class = ctx
            .class
            .ok_or_else(|| CompileError::invalid_context("'super' outside of a class"))?;
        let SymbolKind::Class { parent, .. } = &self.table().symbol(class).kind else {
            panic!("class context is not a class symbol");
        };
        let parent = parent.ok_or_else(|| {
            CompileError::invalid_context("'super' in a class without a parent")
        })?;
        self.class_member(parent, name, SymbolTag::Function)
            .ok_or(CompileError::UndefinedSymbol {
                kind: "method",
                name: name.to_string(),
            })
    }

    pub(crate) fn primary_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        if let Some(instantiation) = node.rule_child(Rule::Instantiation, 0) {
            return self.instantiation_type(instantiation, ctx);
        }
        if node.token(TokenKind::Number, 0).is_some() {
            return Ok(DataType::Number);
        }
        if node.token(TokenKind::Str, 0).is_some() {
            return Ok(DataType::String);
        }

        match node.child_text(0) {
            Some("true") | Some("false") => Ok(DataType::Boolean),
            Some("nil") => Ok(DataType::Nil),
            Some("this") => {
                let class = ctx
                    .class
                    .ok_or_else(|| CompileError::invalid_context("'this' outside of a class"))?;
                Ok(DataType::Instance(class))
            }
            Some("super") => {
                let name = node
                    .token(TokenKind::Identifier, 0)
                    .ok_or_else(|| CompileError::malformed("'super' without member name"))?
                    .to_string();
                let method = self.super_member(&name, ctx)?;
                match &self.table().symbol(method).kind {
                    SymbolKind::Function { return_type, .. } => Ok(*return_type),
                    _ => unreachable!(),
                }
            }
            Some("(") => {
                let inner = node
                    .rule_child(Rule::Expression, 0)
                    .ok_or_else(|| CompileError::malformed("empty grouping"))?;
                self.expr_type(inner, ctx)
            }
            _ => {
                let name = node
                    .token(TokenKind::Identifier, 0)
                    .ok_or_else(|| {
                        CompileError::malformed(format!("invalid primary '{}'", node.text()))
                    })?
                    .to_string();
                let variable = self.resolve(&name, SymbolTag::Variable).ok_or(
                    CompileError::UndefinedSymbol {
                        kind: "variable",
                        name,
                    },
                )?;
                Ok(self.table().symbol(variable).data_type)
            }
        }
    }

    /// `new Class(args)`: resolve the class, check constructor arity, and
    /// run the one-time attribute binding if the class is incomplete.
    fn instantiation_type(&mut self, node: &Node, ctx: Ctx) -> Result<DataType> {
        let name = node
            .token(TokenKind::Identifier, 0)
            .ok_or_else(|| CompileError::malformed("instantiation without class name"))?
            .to_string();
        let class = self
            .resolve(&name, SymbolTag::Class)
            .ok_or(CompileError::UnknownClass { name: name.clone() })?;

        let args = self.argument_types(node, ctx)?;

        let expected = match self.class_member(class, "init", SymbolTag::Function) {
            Some(init) => match &self.table().symbol(init).kind {
                SymbolKind::Function { params, .. } => params.len(),
                _ => unreachable!(),
            },
            None => 0,
        };
        if args.len() != expected {
            return Err(CompileError::Arity {
                name,
                expected,
                found: args.len(),
            });
        }

        // First instantiation wins: bind placeholder attribute types in
        // declaration order against the argument types, then fix the
        // layout. Later instantiations never re-infer.
        let pending = match &self.table().symbol(class).kind {
            SymbolKind::Class {
                state: ClassState::Incomplete,
                attributes,
                ..
            } => Some(attributes.clone()),
            _ => None,
        };
        if let Some(attributes) = pending {
            for (position, attribute) in attributes.into_iter().enumerate() {
                if self.table().symbol(attribute).data_type.is_any()
                    && let Some(&bound) = args.get(position)
                {
                    self.table_mut().symbol_mut(attribute).data_type = bound;
                }
            }
            self.complete_if_incomplete(class);
        }

        Ok(DataType::Instance(class))
    }
}
