//! Expression lowering.
//!
//! Value context and branch context are separate entry points. A value
//! lowering returns a [`Lowered`] operand; a condition lowering emits
//! branches against the threaded [`BranchTargets`] and returns nothing.
//! Booleans cross from branch context into value context only through
//! [`materialize_bool`](IntermediateCodeGenerator::materialize_bool),
//! which spends a true/false/end label triple to produce a 0/1 register.

use compiscript_core::parse_tree::{Node, Rule, TokenKind};
use compiscript_core::{DataType, SymbolId, SymbolKind, SymbolTag};

use super::{BranchTargets, IntermediateCodeGenerator, Lowered, Operand, Slot, Value};

impl IntermediateCodeGenerator<'_> {
    /// Lower an `expression` node in value context.
    pub(crate) fn lower_expr(&mut self, node: &Node) -> Lowered {
        let assignment = node
            .rule_child(Rule::Assignment, 0)
            .expect("expression shape validated by analysis");
        self.lower_assignment(assignment)
    }

    fn lower_assignment(&mut self, node: &Node) -> Lowered {
        if node.child_count() == 1 {
            return self.lower_value(node.child(0).expect("wrapper child"));
        }

        let value_node = node
            .rule_child(Rule::Assignment, 0)
            .expect("assignment value validated by analysis");
        let value = self.lower_assignment(value_node);

        let target = if let Some(call) = node.rule_child(Rule::Call, 0) {
            let attr = node
                .token(TokenKind::Identifier, 0)
                .expect("attribute name validated by analysis");
            self.attribute_symbol(call, attr)
        } else {
            let name = node
                .token(TokenKind::Identifier, 0)
                .expect("assignment target validated by analysis");
            self.resolve(name, SymbolTag::Variable)
        };

        let mem = self.memory_name(target);
        let reg = self.into_register(value.operand);
        self.builder.save(reg, &mem);
        self.registers.bind(reg, target);
        Lowered::register(reg, value.data_type)
    }

    /// The attribute symbol a `receiver.attr` store resolves to.
    fn attribute_symbol(&mut self, call: &Node, attr: &str) -> SymbolId {
        let primary = call
            .rule_child(Rule::Primary, 0)
            .expect("store receiver validated by analysis");
        let class = if primary.child_text(0) == Some("this") {
            self.ctx()
                .class
                .expect("defect: 'this' store outside a class after analysis")
        } else {
            let name = primary
                .token(TokenKind::Identifier, 0)
                .expect("store receiver validated by analysis");
            let receiver = self.resolve(name, SymbolTag::Variable);
            match self.table.symbol(receiver).data_type {
                DataType::Instance(class) => class,
                other => panic!("defect: attribute store through {other} receiver"),
            }
        };
        self.class_member(class, attr, SymbolTag::Variable)
            .unwrap_or_else(|| panic!("defect: attribute '{attr}' unresolved after analysis"))
    }

    /// Lower any precedence-level node in value context.
    fn lower_value(&mut self, node: &Node) -> Lowered {
        let rule = node.rule().expect("value nodes are rule nodes");
        if node.child_count() == 1
            && !matches!(rule, Rule::Primary | Rule::Expression | Rule::Assignment)
        {
            return self.lower_value(node.child(0).expect("wrapper child"));
        }
        match rule {
            Rule::Expression => self.lower_expr(node),
            Rule::Assignment => self.lower_assignment(node),
            Rule::LogicOr | Rule::LogicAnd | Rule::Equality | Rule::Comparison => {
                self.materialize_bool(node)
            }
            Rule::Term => self.lower_term(node),
            Rule::Factor => self.lower_factor(node),
            Rule::Unary => self.lower_unary(node),
            Rule::Call => self.lower_call(node),
            Rule::Primary => self.lower_primary(node),
            other => panic!("defect: cannot lower {other:?} in value context"),
        }
    }

    /// Produce a 0/1 register for a boolean expression used as a value.
    fn materialize_bool(&mut self, node: &Node) -> Lowered {
        let true_label = self.builder.new_label("true");
        let false_label = self.builder.new_label("false");
        let end_label = self.builder.new_label("end");
        self.lower_condition(
            node,
            BranchTargets::both(true_label.clone(), false_label.clone()),
        );
        let dst = self.registers.new_temp(1);
        self.builder.label(&true_label);
        self.builder.load(dst, 1);
        self.builder.jump(&end_label);
        self.builder.label(&false_label);
        self.builder.load(dst, 0);
        self.builder.label(&end_label);
        Lowered::register(dst, DataType::Boolean)
    }

    // ------------------------------------------------------------------
    // Branch context
    // ------------------------------------------------------------------

    /// Lower a condition, branching to whichever targets are set.
    pub(crate) fn lower_condition(&mut self, node: &Node, targets: BranchTargets) {
        match node.rule() {
            Some(Rule::Expression) => {
                let inner = node
                    .rule_child(Rule::Assignment, 0)
                    .expect("expression shape validated by analysis");
                self.lower_condition(inner, targets);
            }
            Some(Rule::LogicOr) if node.child_count() > 1 => self.lower_or(node, targets),
            Some(Rule::LogicAnd) if node.child_count() > 1 => self.lower_and(node, targets),
            Some(Rule::Equality) if node.child_count() > 1 => {
                self.lower_equality_branch(node, targets)
            }
            Some(Rule::Comparison) if node.child_count() > 1 => {
                self.lower_comparison_branch(node, targets)
            }
            Some(Rule::Unary) if node.child_text(0) == Some("!") => {
                // `!` is free: swap the destinations and descend.
                let operand = node
                    .rule_child(Rule::Unary, 0)
                    .expect("unary operand validated by analysis");
                self.lower_condition(operand, targets.swapped());
            }
            Some(
                Rule::Assignment
                | Rule::LogicOr
                | Rule::LogicAnd
                | Rule::Equality
                | Rule::Comparison
                | Rule::Term
                | Rule::Factor
                | Rule::Unary
                | Rule::Call,
            ) if node.child_count() == 1 => {
                self.lower_condition(node.child(0).expect("wrapper child"), targets);
            }
            _ => {
                // Not a short-circuit shape: evaluate and test against zero.
                let lowered = self.lower_value(node);
                let reg = self.into_register(lowered.operand);
                if let Some(on_true) = &targets.on_true {
                    self.builder.bne(reg, Slot::Zero, on_true);
                }
                if let Some(on_false) = &targets.on_false {
                    self.builder.beq(reg, Slot::Zero, on_false);
                }
                self.release(reg);
            }
        }
    }

    /// `a or b or c`: any true operand jumps to the true target; only
    /// the last operand may branch false.
    fn lower_or(&mut self, node: &Node, targets: BranchTargets) {
        let operands: Vec<&Node> = node.rule_children(Rule::LogicAnd).collect();
        let (last, rest) = operands.split_last().expect("or has operands");

        let shortcut = targets
            .on_true
            .clone()
            .unwrap_or_else(|| self.builder.new_label("true"));
        for operand in rest {
            self.lower_condition(operand, BranchTargets::on_true(shortcut.clone()));
        }
        self.lower_condition(last, targets.clone());
        // A synthesized true target is the fall-through point right
        // after the whole disjunction.
        if targets.on_true.is_none() {
            self.builder.label(&shortcut);
        }
    }

    /// `a and b and c`: any false operand jumps to the false target;
    /// only the last operand may branch true.
    fn lower_and(&mut self, node: &Node, targets: BranchTargets) {
        let operands: Vec<&Node> = node.rule_children(Rule::Equality).collect();
        let (last, rest) = operands.split_last().expect("and has operands");

        let shortcut = targets
            .on_false
            .clone()
            .unwrap_or_else(|| self.builder.new_label("false"));
        for operand in rest {
            self.lower_condition(operand, BranchTargets::on_false(shortcut.clone()));
        }
        self.lower_condition(last, targets.clone());
        if targets.on_false.is_none() {
            self.builder.label(&shortcut);
        }
    }

    fn lower_equality_branch(&mut self, node: &Node, targets: BranchTargets) {
        let lhs = self.lower_value(
            node.rule_child(Rule::Comparison, 0)
                .expect("equality operand validated by analysis"),
        );
        let rhs = self.lower_value(
            node.rule_child(Rule::Comparison, 1)
                .expect("equality operand validated by analysis"),
        );
        let l = self.into_register(lhs.operand);
        let r = self.into_register(rhs.operand);
        let op = node.child_text(1).expect("equality operator");

        match op {
            "==" => {
                if let Some(on_true) = &targets.on_true {
                    self.builder.beq(l, r, on_true);
                }
                if let Some(on_false) = &targets.on_false {
                    self.builder.bne(l, r, on_false);
                }
            }
            "!=" => {
                if let Some(on_true) = &targets.on_true {
                    self.builder.bne(l, r, on_true);
                }
                if let Some(on_false) = &targets.on_false {
                    self.builder.beq(l, r, on_false);
                }
            }
            other => panic!("defect: invalid equality operator '{other}'"),
        }
        if r != l {
            self.release(r);
        }
        self.release(l);
    }

    /// Relational branch. `<` maps to `slt` directly; `>` flips the
    /// operands; `<=`/`>=` use the flipped `slt` with inverted branch
    /// senses.
    fn lower_comparison_branch(&mut self, node: &Node, targets: BranchTargets) {
        let lhs = self.lower_value(
            node.rule_child(Rule::Term, 0)
                .expect("comparison operand validated by analysis"),
        );
        let rhs = self.lower_value(
            node.rule_child(Rule::Term, 1)
                .expect("comparison operand validated by analysis"),
        );
        let l = self.into_register(lhs.operand);
        let r = self.into_register(rhs.operand);
        let op = node.child_text(1).expect("comparison operator");

        let inverted = matches!(op, "<=" | ">=");
        let builder = &mut self.builder;
        self.registers.with_temp(1, |_, flag| {
            match op {
                "<" | ">=" => builder.binary("slt", flag, l, r),
                ">" | "<=" => builder.binary("slt", flag, r, l),
                other => panic!("defect: invalid comparison operator '{other}'"),
            }

            if let Some(on_true) = &targets.on_true {
                if inverted {
                    builder.beq(flag, Slot::Zero, on_true);
                } else {
                    builder.bne(flag, Slot::Zero, on_true);
                }
            }
            if let Some(on_false) = &targets.on_false {
                if inverted {
                    builder.bne(flag, Slot::Zero, on_false);
                } else {
                    builder.beq(flag, Slot::Zero, on_false);
                }
            }
        });

        if r != l {
            self.release(r);
        }
        self.release(l);
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    fn lower_term(&mut self, node: &Node) -> Lowered {
        let operands: Vec<&Node> = node.rule_children(Rule::Factor).collect();
        let ops: Vec<String> = node
            .children()
            .iter()
            .filter_map(|c| c.terminal_text().map(str::to_string))
            .collect();

        let mut acc = self.lower_value(operands[0]);
        for (i, operand) in operands.iter().enumerate().skip(1) {
            let op = ops[i - 1].as_str();
            let rhs = self.lower_value(operand);
            let concat = op == "+"
                && (acc.data_type == DataType::String || rhs.data_type == DataType::String);

            let l = self.into_register(acc.operand);
            let r = self.into_register(rhs.operand);
            let dst = self.registers.new_temp(4);
            if concat {
                self.builder.ensure_buffer();
                self.builder.concat(dst, l, r);
            } else {
                let alu = if op == "+" { "add" } else { "sub" };
                self.builder.binary(alu, dst, l, r);
            }
            if r != l {
                self.release(r);
            }
            self.release(l);

            let data_type = if concat {
                DataType::String
            } else {
                DataType::Number
            };
            acc = Lowered::register(dst, data_type);
        }
        acc
    }

    fn lower_factor(&mut self, node: &Node) -> Lowered {
        let operands: Vec<&Node> = node.rule_children(Rule::Unary).collect();
        let ops: Vec<String> = node
            .children()
            .iter()
            .filter_map(|c| c.terminal_text().map(str::to_string))
            .collect();

        let mut acc = self.lower_value(operands[0]);
        for (i, operand) in operands.iter().enumerate().skip(1) {
            let op = ops[i - 1].as_str();
            let rhs = self.lower_value(operand);
            let l = self.into_register(acc.operand);
            let r = self.into_register(rhs.operand);
            let dst = self.registers.new_temp(4);
            match op {
                "*" => self.builder.binary("mult", dst, l, r),
                // Quotient and remainder come from the dedicated result
                // locations of the two-instruction divide idiom.
                "/" => {
                    self.builder.div(l, r);
                    self.builder.mflo(dst);
                }
                "%" => {
                    self.builder.div(l, r);
                    self.builder.mfhi(dst);
                }
                other => panic!("defect: invalid factor operator '{other}'"),
            }
            if r != l {
                self.release(r);
            }
            self.release(l);
            acc = Lowered::register(dst, DataType::Number);
        }
        acc
    }

    fn lower_unary(&mut self, node: &Node) -> Lowered {
        let op = node.child_text(0).expect("unary operator");
        match op {
            "-" => {
                let operand = node
                    .rule_child(Rule::Unary, 0)
                    .expect("unary operand validated by analysis");
                let value = self.lower_value(operand);
                let r = self.into_register(value.operand);
                let dst = self.registers.new_temp(4);
                self.builder.binary("sub", dst, Slot::Zero, r);
                self.release(r);
                Lowered::register(dst, DataType::Number)
            }
            "!" => self.materialize_bool(node),
            other => panic!("defect: invalid unary operator '{other}'"),
        }
    }

    // ------------------------------------------------------------------
    // Calls, members, instantiation
    // ------------------------------------------------------------------

    fn lower_call(&mut self, node: &Node) -> Lowered {
        let primary = node
            .rule_child(Rule::Primary, 0)
            .expect("callee validated by analysis");
        let suffix = node.child_text(1).expect("call suffix");
        match suffix {
            "(" => self.lower_invocation(node, primary),
            "." => self.lower_member_access(node, primary),
            other => panic!("defect: invalid call suffix '{other}'"),
        }
    }

    fn lower_invocation(&mut self, node: &Node, primary: &Node) -> Lowered {
        let function = if primary.child_text(0) == Some("super") {
            let method = primary
                .token(TokenKind::Identifier, 0)
                .expect("'super' member validated by analysis");
            self.super_method(method)
        } else {
            let name = primary
                .token(TokenKind::Identifier, 0)
                .expect("call target validated by analysis");
            self.resolve(name, SymbolTag::Function)
        };
        // The receiver of a super call is the current one; $a3 is
        // already set.
        self.emit_arguments(node);
        let label = self.function_label(function);
        self.builder.call(&label);
        self.call_result(function)
    }

    fn lower_member_access(&mut self, node: &Node, primary: &Node) -> Lowered {
        let member = node
            .token(TokenKind::Identifier, 0)
            .expect("member name validated by analysis");
        let is_call = node
            .children()
            .iter()
            .any(|c| c.terminal_text() == Some("("));

        let (class, receiver) = if primary.child_text(0) == Some("this") {
            let class = self
                .ctx()
                .class
                .expect("defect: 'this' outside a class after analysis");
            (class, None)
        } else {
            let name = primary
                .token(TokenKind::Identifier, 0)
                .expect("receiver validated by analysis");
            let variable = self.resolve(name, SymbolTag::Variable);
            match self.table.symbol(variable).data_type {
                DataType::Instance(class) => (class, Some(variable)),
                other => panic!("defect: member access through {other} receiver"),
            }
        };

        if is_call {
            let method = self
                .class_member(class, member, SymbolTag::Function)
                .unwrap_or_else(|| panic!("defect: method '{member}' unresolved after analysis"));
            // Receiver into the self slot first; `this` calls inherit
            // the current one.
            if let Some(variable) = receiver {
                let mem = self.memory_name(variable);
                self.registers.free(Slot::SelfRef);
                self.builder.load(Slot::SelfRef, mem);
            }
            self.emit_arguments(node);
            let label = self.function_label(method);
            self.builder.call(&label);
            self.call_result(method)
        } else {
            let attribute = self
                .class_member(class, member, SymbolTag::Variable)
                .unwrap_or_else(|| {
                    panic!("defect: attribute '{member}' unresolved after analysis")
                });
            Lowered::new(
                Operand::Symbol(attribute),
                self.table.symbol(attribute).data_type,
            )
        }
    }

    fn super_method(&mut self, name: &str) -> SymbolId {
        let class = self
            .ctx()
            .class
            .expect("defect: 'super' outside a class after analysis");
        let SymbolKind::Class { parent, .. } = &self.table.symbol(class).kind else {
            unreachable!()
        };
        let parent = parent.expect("defect: 'super' without a parent after analysis");
        self.class_member(parent, name, SymbolTag::Function)
            .unwrap_or_else(|| panic!("defect: super method '{name}' unresolved after analysis"))
    }

    /// Evaluate each argument and place it per the call convention:
    /// `$a0..$a2`, then stack slots. Slots follow argument position, so
    /// a call lowered inside an argument cannot shift the slots of the
    /// call being assembled.
    fn emit_arguments(&mut self, node: &Node) {
        let Some(arguments) = node.rule_child(Rule::Arguments, 0) else {
            return;
        };
        let args: Vec<&Node> = arguments.rule_children(Rule::Expression).collect();
        for (position, arg) in args.into_iter().enumerate() {
            let lowered = self.lower_expr(arg);
            let size = self.table.type_size(lowered.data_type);
            let slot = self.registers.argument_slot(position, size);
            self.place_argument(slot, lowered.operand);
        }
    }

    fn place_argument(&mut self, slot: Slot, operand: Operand) {
        if let Slot::Stack(_) = slot {
            let reg = self.into_register(operand);
            self.builder.save(reg, slot);
            self.release(reg);
            return;
        }
        match operand {
            Operand::Literal(Value::Number(n)) => self.builder.load(slot, n),
            Operand::Literal(Value::Bool(b)) => self.builder.load(slot, i64::from(b)),
            Operand::Literal(Value::Nil) => self.builder.load(slot, 0),
            Operand::Literal(Value::Str(s)) => {
                let label = self.builder.intern_string(&s);
                self.builder.load(slot, label);
            }
            Operand::Symbol(id) => match self.registers.register_holding(id) {
                Some(held) if held == slot => {}
                Some(held) => self.builder.move_to(slot, held),
                None => {
                    let mem = self.memory_name(id);
                    self.builder.load(slot, mem);
                }
            },
            Operand::Register(reg) => {
                if reg != slot {
                    self.builder.move_to(slot, reg);
                    self.release(reg);
                }
            }
        }
    }

    /// Copy `$v0` into a fresh temporary after a call.
    fn call_result(&mut self, function: SymbolId) -> Lowered {
        let SymbolKind::Function { return_type, .. } = &self.table.symbol(function).kind else {
            unreachable!()
        };
        let return_type = *return_type;
        let dst = self.registers.new_temp(4);
        self.builder.move_to(dst, Slot::Return);
        Lowered::register(dst, return_type)
    }

    fn lower_primary(&mut self, node: &Node) -> Lowered {
        if let Some(instantiation) = node.rule_child(Rule::Instantiation, 0) {
            return self.lower_instantiation(instantiation);
        }
        if let Some(text) = node.token(TokenKind::Number, 0) {
            let value = text
                .parse::<i64>()
                .unwrap_or_else(|_| panic!("defect: unparsable number literal '{text}'"));
            return Lowered::new(Operand::Literal(Value::Number(value)), DataType::Number);
        }
        if let Some(text) = node.token(TokenKind::Str, 0) {
            return Lowered::new(
                Operand::Literal(Value::Str(text.to_string())),
                DataType::String,
            );
        }

        match node.child_text(0) {
            Some("true") => Lowered::new(Operand::Literal(Value::Bool(true)), DataType::Boolean),
            Some("false") => Lowered::new(Operand::Literal(Value::Bool(false)), DataType::Boolean),
            Some("nil") => Lowered::new(Operand::Literal(Value::Nil), DataType::Nil),
            Some("this") => {
                let class = self
                    .ctx()
                    .class
                    .expect("defect: 'this' outside a class after analysis");
                Lowered::new(
                    Operand::Register(Slot::SelfRef),
                    DataType::Instance(class),
                )
            }
            Some("(") => {
                let inner = node
                    .rule_child(Rule::Expression, 0)
                    .expect("grouping validated by analysis");
                self.lower_expr(inner)
            }
            _ => {
                let name = node
                    .token(TokenKind::Identifier, 0)
                    .unwrap_or_else(|| panic!("defect: invalid primary '{}'", node.text()));
                let variable = self.resolve(name, SymbolTag::Variable);
                Lowered::new(
                    Operand::Symbol(variable),
                    self.table.symbol(variable).data_type,
                )
            }
        }
    }

    /// `new Class(args)`: constructor protocol, result handle in a
    /// fresh temporary.
    fn lower_instantiation(&mut self, node: &Node) -> Lowered {
        let name = node
            .token(TokenKind::Identifier, 0)
            .expect("class name validated by analysis");
        let class = self.resolve(name, SymbolTag::Class);
        self.emit_arguments(node);
        if let Some(init) = self.class_member(class, "init", SymbolTag::Function) {
            let label = self.function_label(init);
            self.builder.call(&label);
        }
        let dst = self.registers.new_temp(4);
        self.builder.move_to(dst, Slot::Return);
        Lowered::register(dst, DataType::Instance(class))
    }

    // ------------------------------------------------------------------
    // Operand normalization
    // ------------------------------------------------------------------

    /// Normalize an operand to a register: symbols reuse their resident
    /// slot or are `load`ed on a miss; literals are loaded as immediates
    /// (strings through the constant pool).
    pub(crate) fn into_register(&mut self, operand: Operand) -> Slot {
        match operand {
            Operand::Register(slot) => slot,
            Operand::Symbol(id) => {
                if let Some(slot) = self.registers.register_holding(id) {
                    return slot;
                }
                let size = self.table.type_size(self.table.symbol(id).data_type);
                let dst = self.registers.new_temp(size);
                let mem = self.memory_name(id);
                self.builder.load(dst, mem);
                self.registers.bind(dst, id);
                dst
            }
            Operand::Literal(Value::Number(n)) => {
                let dst = self.registers.new_temp(4);
                self.builder.load(dst, n);
                dst
            }
            Operand::Literal(Value::Bool(b)) => {
                let dst = self.registers.new_temp(1);
                self.builder.load(dst, i64::from(b));
                dst
            }
            Operand::Literal(Value::Nil) => Slot::Zero,
            Operand::Literal(Value::Str(s)) => {
                let label = self.builder.intern_string(&s);
                let dst = self.registers.new_temp(4);
                self.builder.load(dst, label);
                dst
            }
        }
    }

    /// Release a pooled register; argument and special slots keep their
    /// bindings until overwritten.
    pub(crate) fn release(&mut self, slot: Slot) {
        if matches!(slot, Slot::Temp(_) | Slot::Save(_)) {
            self.registers.free(slot);
        }
    }
}
