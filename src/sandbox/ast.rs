//! Syntax tree for the sandboxed expression language.

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Empty,
    Expr(Expr),
    Decl(DeclKind, Vec<(String, Option<Expr>)>),
    Function(String, Rc<FunctionDef>),
    Return(Option<Expr>),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    Block(Vec<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    /// `for (<decl> x of/in expr)`; `of == false` iterates keys.
    ForEach {
        kind: Option<DeclKind>,
        name: String,
        of: bool,
        iterable: Expr,
        body: Box<Stmt>,
    },
    While(Expr, Box<Stmt>),
    DoWhile(Box<Stmt>, Expr),
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<String>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub rest: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_arrow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    Typeof,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Assign,
    Binary(BinaryOp),
    Logical(LogicalOp),
}

#[derive(Debug, Clone)]
pub(crate) enum PropKey {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone)]
pub(crate) enum ObjectProp {
    KeyValue(PropKey, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub(crate) enum ArrayElem {
    Hole,
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Number(f64),
    Str(String),
    Template(Vec<String>, Vec<Expr>),
    Bool(bool),
    Null,
    Ident(String),
    This,
    Array(Vec<ArrayElem>),
    Object(Vec<ObjectProp>),
    Function(Rc<FunctionDef>),
    Unary(UnaryOp, Box<Expr>),
    Delete(Box<Expr>),
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Assign(AssignOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<ArrayElem>,
        optional: bool,
    },
    New(Box<Expr>, Vec<ArrayElem>),
    Member {
        object: Box<Expr>,
        property: Box<PropKey>,
        optional: bool,
    },
    /// Boundary of an optional chain; a short-circuit inside yields `undefined`.
    OptionalChain(Box<Expr>),
    Sequence(Vec<Expr>),
}
