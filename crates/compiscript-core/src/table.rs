//! The flat symbol table.
//!
//! One arena for symbols and one for scope records, both addressed by
//! typed indices. The analyzer is the only writer; the code generator
//! reads the finished table and replays scope creation order to resolve
//! the same names to the same symbols.

use crate::{
    ClassState, DataType, Scope, ScopeId, Symbol, SymbolId, SymbolKind, SymbolTag,
};

/// Flat symbol table plus the scope records created during analysis.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new scope record; its index is the creation-order index.
    pub fn new_scope(&mut self, name: impl Into<String>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(name, id.0));
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// All symbol ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        (0..self.symbols.len() as u32).map(SymbolId)
    }

    /// Add a symbol to `scope`.
    ///
    /// Variables take their offset from the scope's running counter and
    /// bump it by the value size, keeping per-scope offsets monotonically
    /// non-decreasing.
    pub fn declare(&mut self, mut symbol: Symbol, scope: ScopeId) -> SymbolId {
        symbol.scope = scope;
        if matches!(symbol.kind, SymbolKind::Variable { .. }) {
            let size = self.type_size(symbol.data_type);
            let record = &mut self.scopes[scope.index()];
            symbol.offset = record.offset;
            record.offset += size;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    /// Most recent symbol with this name and kind declared in `scope`.
    pub fn find_in_scope(&self, scope: ScopeId, name: &str, tag: SymbolTag) -> Option<SymbolId> {
        self.symbols
            .iter()
            .enumerate()
            .rev()
            .find(|(_, s)| s.scope == scope && s.tag() == tag && s.name == name)
            .map(|(i, _)| SymbolId(i as u32))
    }

    /// Resolve a name against the currently open scopes, innermost first.
    ///
    /// Closed scopes are invisible: a symbol is only reachable while its
    /// scope is on the traversal stack.
    pub fn resolve(&self, open: &[ScopeId], name: &str, tag: SymbolTag) -> Option<SymbolId> {
        open.iter()
            .rev()
            .find_map(|&scope| self.find_in_scope(scope, name, tag))
    }

    /// Byte size of a value of `data_type`, resolving instance layouts.
    pub fn type_size(&self, data_type: DataType) -> u32 {
        match data_type {
            DataType::Instance(class) => self.class_size(class),
            other => other.scalar_size(),
        }
    }

    /// Size of an instance of `class`.
    ///
    /// A completed class has its size fixed; an incomplete one is
    /// measured from its current attribute types (placeholders included).
    pub fn class_size(&self, class: SymbolId) -> u32 {
        match &self.symbol(class).kind {
            SymbolKind::Class {
                state: ClassState::Complete { size },
                ..
            } => *size,
            SymbolKind::Class { attributes, .. } => attributes
                .iter()
                .map(|&attr| self.type_size(self.symbol(attr).data_type))
                .sum(),
            _ => panic!("class_size called on non-class symbol '{}'", self.symbol(class).name),
        }
    }

    /// Recompute attribute offsets and total size for `class`, then mark
    /// it complete. Called once all attribute types are concrete.
    pub fn complete_class(&mut self, class: SymbolId) {
        let attributes = match &self.symbol(class).kind {
            SymbolKind::Class { attributes, .. } => attributes.clone(),
            _ => panic!("complete_class called on non-class symbol"),
        };
        let mut offset = 0;
        for attr in attributes {
            let size = self.type_size(self.symbol(attr).data_type);
            self.symbol_mut(attr).offset = offset;
            offset += size;
        }
        match &mut self.symbol_mut(class).kind {
            SymbolKind::Class { state, .. } => *state = ClassState::Complete { size: offset },
            _ => unreachable!(),
        }
    }

    /// Tabular rendering of the table: name, kind, scope, scope index,
    /// data type, size, offset. Informational only; nothing reads it.
    pub fn render_table(&self) -> String {
        let header = ["name", "kind", "scope", "idx", "type", "size", "offset"];
        let rows: Vec<[String; 7]> = self
            .symbols
            .iter()
            .map(|s| {
                let scope = self.scope(s.scope);
                [
                    s.name.clone(),
                    s.tag().to_string(),
                    scope.name.clone(),
                    scope.index.to_string(),
                    s.data_type.to_string(),
                    self.type_size(s.data_type).to_string(),
                    s.offset.to_string(),
                ]
            })
            .collect();

        let mut widths: [usize; 7] = header.map(str::len);
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row.iter()) {
                *w = (*w).max(cell.len());
            }
        }

        let mut out = String::new();
        let render_row = |cells: &[String; 7]| -> String {
            let mut line = String::new();
            for (cell, &w) in cells.iter().zip(widths.iter()) {
                line.push_str(&format!("| {cell:w$} "));
            }
            line.push_str("|\n");
            line
        };
        let rule: String = {
            let mut line = String::new();
            for w in widths {
                line.push_str(&format!("+{}", "-".repeat(w + 2)));
            }
            line.push_str("+\n");
            line
        };

        out.push_str(&rule);
        out.push_str(&render_row(&header.map(String::from)));
        out.push_str(&rule);
        for row in &rows {
            out.push_str(&render_row(row));
        }
        out.push_str(&rule);
        out
    }
}
