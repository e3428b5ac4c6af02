//! The parse-tree contract with the external front-end.
//!
//! The lexer/parser is an external collaborator; the backend only sees a
//! tree of rule nodes and terminals matching the CompiScript grammar:
//!
//! ```text
//! program     : declaration* ;
//! declaration : classDecl | funDecl | varDecl | statement ;
//! classDecl   : 'class' ID ('<' ID)? '{' function* '}' ;
//! funDecl     : 'fun' function ;
//! function    : ID '(' parameters? ')' block ;
//! varDecl     : 'var' ID ('=' expression)? ';' ;
//! statement   : exprStmt | ifStmt | whileStmt | forStmt
//!             | returnStmt | printStmt | block ;
//! expression  : assignment ;
//! assignment  : (call '.')? ID '=' assignment | logic_or ;
//! logic_or    : logic_and ('or' logic_and)* ;
//! logic_and   : equality ('and' equality)* ;
//! equality    : comparison (('==' | '!=') comparison)* ;
//! comparison  : term (('<' | '>' | '<=' | '>=') term)* ;
//! term        : factor (('+' | '-') factor)* ;
//! factor      : unary (('*' | '/' | '%') unary)* ;
//! unary       : ('!' | '-') unary | call ;
//! call        : primary ('(' arguments? ')' | '.' ID)* ;
//! primary     : NUMBER | STRING | 'true' | 'false' | 'nil' | 'this'
//!             | ID | 'new' ID '(' arguments? ')' | '(' expression ')'
//!             | 'super' '.' ID ;
//! ```
//!
//! Precedence rules produced by a pass-through derivation have exactly
//! one child; both passes treat those as wrapper nodes and descend
//! without doing any work, matching the front-end's dispatch convention.

mod visitor;

pub mod build;

pub use visitor::Visitor;

/// Grammar-rule kinds, one per parser rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Program,
    Declaration,
    ClassDecl,
    FunDecl,
    Function,
    Parameters,
    VarDecl,
    Statement,
    ExprStmt,
    IfStmt,
    WhileStmt,
    ForStmt,
    ReturnStmt,
    PrintStmt,
    Block,
    Expression,
    Assignment,
    LogicOr,
    LogicAnd,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
    Instantiation,
    Arguments,
}

/// Terminal token kinds.
///
/// Keywords, operators, and punctuation all arrive as [`TokenKind::Symbol`]
/// terminals and are distinguished by their literal text, the way the
/// front-end's visitor API exposes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// An identifier.
    Identifier,
    /// A numeric literal.
    Number,
    /// A string literal (text excludes the quotes).
    Str,
    /// Any keyword, operator, or punctuation lexeme.
    Symbol,
}

/// A parse-tree node: either a rule with ordered children or a terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Rule {
        rule: Rule,
        children: Vec<Node>,
    },
    Terminal {
        kind: TokenKind,
        text: String,
    },
}

impl Node {
    /// The rule kind, if this is a rule node.
    pub fn rule(&self) -> Option<Rule> {
        match self {
            Node::Rule { rule, .. } => Some(*rule),
            Node::Terminal { .. } => None,
        }
    }

    /// Whether this node is the given rule.
    pub fn is(&self, rule: Rule) -> bool {
        self.rule() == Some(rule)
    }

    /// Direct children (empty for terminals).
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Rule { children, .. } => children,
            Node::Terminal { .. } => &[],
        }
    }

    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.children().get(index)
    }

    /// The n-th direct child with the given rule kind.
    pub fn rule_child(&self, rule: Rule, n: usize) -> Option<&Node> {
        self.rule_children(rule).nth(n)
    }

    /// All direct children with the given rule kind, in order.
    pub fn rule_children(&self, rule: Rule) -> impl Iterator<Item = &Node> {
        self.children().iter().filter(move |c| c.is(rule))
    }

    /// The text of the n-th terminal child of the given token kind.
    pub fn token(&self, kind: TokenKind, n: usize) -> Option<&str> {
        self.children()
            .iter()
            .filter_map(|c| match c {
                Node::Terminal { kind: k, text } if *k == kind => Some(text.as_str()),
                _ => None,
            })
            .nth(n)
    }

    /// Literal text, if this node is a terminal.
    pub fn terminal_text(&self) -> Option<&str> {
        match self {
            Node::Terminal { text, .. } => Some(text),
            Node::Rule { .. } => None,
        }
    }

    /// Literal text of the direct child at `index`, if it is a terminal.
    pub fn child_text(&self, index: usize) -> Option<&str> {
        self.child(index).and_then(Node::terminal_text)
    }

    /// Concatenated source text of the whole subtree. Used for logs and
    /// error messages only.
    pub fn text(&self) -> String {
        match self {
            Node::Terminal { text, .. } => text.clone(),
            Node::Rule { children, .. } => children.iter().map(Node::text).collect(),
        }
    }
}
