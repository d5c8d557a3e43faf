/// Abstract syntax tree for Mica.
///
/// The parser builds these nodes with `ty: None` everywhere; the resolver
/// binds names, rewrites surface references (`Name`, `Member`, unresolved
/// callees) into their resolved forms and fills in every expression type.
/// After resolution the tree is read-only: code generation never mutates it.
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub decls: Vec<Decl>,
    /// Resource name -> file bytes, loaded by the driver after resolution.
    pub resources: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Enum(EnumDecl),
    Class(Class),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub doc: Option<CodeDoc>,
    pub constants: Vec<EnumConstant>,
    /// From a `-r` reference file: resolved but not emitted.
    pub reference: bool,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstant {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: String,
    pub base: Option<String>,
    pub is_abstract: bool,
    pub doc: Option<CodeDoc>,
    pub consts: Vec<ConstDecl>,
    pub fields: Vec<Field>,
    /// Zero-argument constructor body, if declared.
    pub ctor: Option<Vec<Stmt>>,
    pub methods: Vec<Method>,
    pub reference: bool,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
    pub doc: Option<CodeDoc>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub ty: Type,
    pub value: Expr,
    pub is_public: bool,
    pub doc: Option<CodeDoc>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub doc: Option<CodeDoc>,
    pub is_public: bool,
    pub is_static: bool,
    pub is_abstract: bool,
    pub return_type: Type,
    pub params: Vec<Param>,
    /// Method-local constants, hoisted out of the body by the resolver.
    pub consts: Vec<ConstDecl>,
    pub body: Option<Vec<Stmt>>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// Type system
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Bool,
    Str,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    F32,
    F64,
    /// Integer type with concrete bounds, `lo <= hi`. Picks the narrowest
    /// storage on targets with fixed-width integers; untyped int literals
    /// get the degenerate range `[v .. v]`.
    Range { lo: i64, hi: i64 },
    List(Box<Type>),
    Stack(Box<Type>),
    Set(Box<Type>),
    Dict {
        sorted: bool,
        key: Box<Type>,
        value: Box<Type>,
    },
    /// Fixed-length array storage.
    Array { elem: Box<Type>, len: usize },
    /// Array view of unknown length.
    Slice(Box<Type>),
    /// Class storage: the declaration owns a fresh instance.
    Class(String),
    /// Non-owning class reference.
    ClassPtr(String),
    Enum(String),
    Regex,
    Match,
    /// Type of the `null` literal.
    Null,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::Range { .. }
                | Type::Enum(_)
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) | Type::ClassPtr(name) => Some(name),
            _ => None,
        }
    }

    /// Element type of any sequence container.
    pub fn elem(&self) -> Option<&Type> {
        match self {
            Type::List(t) | Type::Stack(t) | Type::Set(t) | Type::Slice(t) => Some(t),
            Type::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// Filled in by the resolver; `None` only before resolution.
    pub ty: Option<Type>,
    pub line: u32,
}

impl Expr {
    pub fn new(kind: ExprKind, line: u32) -> Expr {
        Expr {
            kind,
            ty: None,
            line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
    Bool(bool),
    Null,
    /// `$"..."` interpolated string.
    Interp(Vec<InterpPart>),
    /// `resource("name")` embedded byte blob.
    Resource(String),

    // Surface references, rewritten by the resolver
    Name(String),
    Member { target: Box<Expr>, name: String },

    // Resolved references
    Local(String),
    /// Field of the current instance: `this.<name>`.
    FieldRef(String),
    /// Named constant; `method` is set for method-local constants.
    ConstRef {
        class: String,
        method: Option<String>,
        name: String,
    },
    EnumRef { enum_name: String, constant: String },
    /// Builtin property or field access on a value.
    Prop { target: Box<Expr>, name: String },

    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Postfix {
        op: PostfixOp,
        operand: Box<Expr>,
    },
    Cond {
        cond: Box<Expr>,
        on_true: Box<Expr>,
        on_false: Box<Expr>,
    },
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// Aggregate initializer `{ a, b, c }`.
    ArrayLit(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// Surface form, rewritten by the resolver.
    Unresolved {
        target: Option<Box<Expr>>,
        name: String,
    },
    /// Instance method of the current class.
    This(String),
    /// Static method: `Class.method`.
    Static { class: String, name: String },
    /// `base.m(...)`; `class` is the base class that defines the chain.
    Base { class: String, name: String },
    /// User or builtin instance method on a value.
    Method { target: Box<Expr>, name: String },
    /// Static method of a builtin class.
    Builtin { class: BuiltinClass, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuiltinClass {
    Regex,
    Utf8,
    Console,
    ConsoleError,
    Environment,
}

/// One `{argument, width : format precision}` part of an interpolated
/// string, with the literal text that precedes it. A trailing literal run is
/// a part with `arg: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpPart {
    pub prefix: String,
    pub arg: Option<Expr>,
    pub width: Option<i32>,
    pub format: Option<char>,
    pub precision: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
    NotEq,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Less
                | BinOp::LessEq
                | BinOp::Greater
                | BinOp::GreaterEq
                | BinOp::Eq
                | BinOp::NotEq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
    PreInc,
    PreDec,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PostfixOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
}

/// Statements
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: u32) -> Stmt {
        Stmt { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    Expr(Expr),
    Var(VarDecl),
    /// Method-local constant; hoisted into `Method::consts` by the resolver.
    Const(ConstDecl),
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        advance: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    Foreach {
        key: IterVar,
        value: Option<IterVar>,
        collection: Expr,
        body: Box<Stmt>,
    },
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Throw(Expr),
    Lock {
        body: Box<Stmt>,
    },
    Assert {
        cond: Expr,
        msg: Option<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterVar {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub body: Vec<Stmt>,
}

/// Documentation comment attached to a declaration: a summary paragraph
/// followed by detail blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeDoc {
    pub summary: DocPara,
    pub details: Vec<DocBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocPara {
    pub runs: Vec<DocRun>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocRun {
    Text(String),
    Code(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocBlock {
    Para(DocPara),
    Bullets(Vec<DocPara>),
}
