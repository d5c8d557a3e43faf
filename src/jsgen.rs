/// JavaScript backend: lowers a resolved program to `"use strict"` source.
///
/// The target has no classes (constructor functions and prototype chains are
/// emitted instead), no fixed-width integers (32-bit semantics are restored
/// with `| 0`, `>>> 0` and `>>>`) and no dedicated collection types beyond
/// arrays, Set and plain objects. Runtime helpers and embedded resources are
/// collected into a single `Ci` object at the end of the file.
use std::collections::{BTreeMap, BTreeSet};

use crate::ast::*;
use crate::emitter::{array_element_type, camel_case, type_code, upper_snake, Emitter, Prec, TypeCode};
use crate::error::CompileError;

/// Reserved words that trigger the `_` suffix on mangled identifiers.
const JS_KEYWORDS: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Runtime helpers, in the lexicographic order of their emitted names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Helper {
    CopyArray,
    RegexEscape,
    SortListPart,
}

enum BreakScope {
    Loop,
    Switch,
    StrSwitch(String),
}

pub fn generate(program: &Program) -> Result<String, CompileError> {
    let mut gen = JsGen {
        e: Emitter::new(),
        current_class: String::new(),
        helpers: BTreeSet::new(),
        switch_labels: 0,
        break_stack: Vec::new(),
    };
    gen.write_program(program)?;
    Ok(gen.e.finish())
}

struct JsGen {
    e: Emitter,
    current_class: String,
    helpers: BTreeSet<Helper>,
    switch_labels: u32,
    break_stack: Vec<BreakScope>,
}

static VOID: Type = Type::Void;

fn expr_type(e: &Expr) -> &Type {
    e.ty.as_ref().unwrap_or(&VOID)
}

fn is_uint32(ty: &Type) -> bool {
    type_code(ty, true) == Some(TypeCode::UInt32)
}

fn mangle(name: &str) -> String {
    let mut n = camel_case(name);
    if JS_KEYWORDS.contains(&n.as_str()) {
        n.push('_');
    }
    n
}

fn const_attr_name(method: Option<&str>, name: &str) -> String {
    match method {
        Some(m) => format!("{}_{}", upper_snake(m), upper_snake(name)),
        None => upper_snake(name),
    }
}

fn mangle_resource(name: &str) -> String {
    name.bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() {
                b as char
            } else {
                '_'
            }
        })
        .collect()
}

/// Constants whose value is a plain scalar literal are inlined at use sites;
/// everything else must exist as a class attribute.
fn const_needs_attr(k: &ConstDecl) -> bool {
    k.is_public
        || !matches!(
            k.value.kind,
            ExprKind::Int(_)
                | ExprKind::Float(_)
                | ExprKind::Str(_)
                | ExprKind::Bool(_)
                | ExprKind::Char(_)
        )
}

fn needs_storage_init(ty: &Type) -> bool {
    matches!(
        ty,
        Type::List(_)
            | Type::Stack(_)
            | Type::Set(_)
            | Type::Dict { .. }
            | Type::Array { .. }
            | Type::Class(_)
    )
}

fn assign_bin_op(op: AssignOp) -> Option<BinOp> {
    Some(match op {
        AssignOp::Set => return None,
        AssignOp::Add => BinOp::Add,
        AssignOp::Sub => BinOp::Sub,
        AssignOp::Mul => BinOp::Mul,
        AssignOp::Div => BinOp::Div,
        AssignOp::Mod => BinOp::Mod,
        AssignOp::Shl => BinOp::Shl,
        AssignOp::Shr => BinOp::Shr,
        AssignOp::BitAnd => BinOp::BitAnd,
        AssignOp::BitOr => BinOp::BitOr,
        AssignOp::BitXor => BinOp::BitXor,
    })
}

fn op_text(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::Less => "<",
        BinOp::LessEq => "<=",
        BinOp::Greater => ">",
        BinOp::GreaterEq => ">=",
        BinOp::Eq => "===",
        BinOp::NotEq => "!==",
        BinOp::BitAnd => "&",
        BinOp::BitXor => "^",
        BinOp::BitOr => "|",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}

fn op_prec(op: BinOp) -> Prec {
    match op {
        BinOp::Or => Prec::CondOr,
        BinOp::And => Prec::CondAnd,
        BinOp::BitOr => Prec::Or,
        BinOp::BitXor => Prec::Xor,
        BinOp::BitAnd => Prec::And,
        BinOp::Eq | BinOp::NotEq => Prec::Equality,
        BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq => Prec::Rel,
        BinOp::Shl | BinOp::Shr => Prec::Shift,
        BinOp::Add | BinOp::Sub => Prec::Add,
        BinOp::Mul | BinOp::Div | BinOp::Mod => Prec::Mul,
    }
}

/// Post-coercion required to keep a 32-bit arithmetic result integral.
enum Coerce {
    /// `| 0`
    Or0,
    /// `>>> 0`
    Shr0,
    /// `Math.trunc(...)`
    Trunc,
}

/// Unsigned 32-bit operations coerce their results; of the signed ones only
/// division needs help, to truncate the quotient. Signed multiplication is
/// exact below 2^53 and left alone, as is 64-bit arithmetic apart from
/// division (the documented precision limitation).
fn arith_coercion(op: BinOp, lty: &Type) -> Option<Coerce> {
    let code = type_code(lty, true);
    match op {
        BinOp::Mul => match code {
            Some(TypeCode::UInt32) => Some(Coerce::Or0),
            _ => None,
        },
        BinOp::Div => match code {
            Some(TypeCode::UInt32) => Some(Coerce::Shr0),
            Some(TypeCode::Int32) => Some(Coerce::Or0),
            Some(TypeCode::Int64) => Some(Coerce::Trunc),
            _ => None,
        },
        BinOp::Mod => match code {
            Some(TypeCode::UInt32) => Some(Coerce::Shr0),
            _ => None,
        },
        _ => None,
    }
}

fn escaped_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\u{:04x}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Literal text inside a template literal: escape backquotes, backslashes
/// and `${`.
fn template_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

impl JsGen {
    fn write_program(&mut self, program: &Program) -> Result<(), CompileError> {
        self.e.write_line("\"use strict\";");
        for decl in &program.decls {
            match decl {
                Decl::Enum(en) => {
                    if !en.reference {
                        self.write_enum(en);
                    }
                }
                Decl::Class(c) => {
                    if !c.reference {
                        self.current_class = c.name.clone();
                        self.write_class(c)?;
                    }
                }
            }
        }
        self.write_support_object(program)
    }

    fn write_enum(&mut self, en: &EnumDecl) {
        self.e.blank_line();
        if let Some(doc) = &en.doc {
            self.e.write_doc(doc);
        }
        self.e.write(&format!("const {} = Object.freeze(", en.name));
        self.e.open_block();
        for (i, c) in en.constants.iter().enumerate() {
            self.e
                .write(&format!("{} : {}", upper_snake(&c.name), c.value));
            if i + 1 < en.constants.len() {
                self.e.write(",");
            }
            self.e.newline();
        }
        self.e.close_block(");");
    }

    fn write_class(&mut self, c: &Class) -> Result<(), CompileError> {
        self.e.blank_line();
        if let Some(doc) = &c.doc {
            self.e.write_doc(doc);
        }
        self.e.write(&format!("function {}() ", c.name));
        self.e.open_block();
        for f in &c.fields {
            self.write_field_init(f)?;
        }
        if let Some(body) = &c.ctor {
            for s in body {
                self.write_stmt(s)?;
            }
        }
        self.e.close_block("");
        if let Some(base) = &c.base {
            self.e
                .write_line(&format!("{}.prototype = new {}();", c.name, base));
        }
        for k in &c.consts {
            if const_needs_attr(k) {
                self.write_const_attr(None, k)?;
            }
        }
        for m in &c.methods {
            for k in &m.consts {
                self.write_const_attr(Some(&m.name), k)?;
            }
        }
        for m in &c.methods {
            if m.is_abstract {
                continue;
            }
            let Some(body) = &m.body else { continue };
            if let Some(doc) = &m.doc {
                self.e.write_doc(doc);
            }
            let qualifier = if m.is_static {
                format!("{}.{}", c.name, mangle(&m.name))
            } else {
                format!("{}.prototype.{}", c.name, mangle(&m.name))
            };
            self.e.write(&format!("{qualifier} = function("));
            for (i, p) in m.params.iter().enumerate() {
                if i > 0 {
                    self.e.write(", ");
                }
                self.e.write(&mangle(&p.name));
            }
            self.e.write(") ");
            self.e.open_block();
            self.break_stack.clear();
            for s in body {
                self.write_stmt(s)?;
            }
            self.e.close_block(";");
        }
        Ok(())
    }

    fn write_field_init(&mut self, f: &Field) -> Result<(), CompileError> {
        let target = format!("this.{}", mangle(&f.name));
        if let Some(init) = &f.init {
            self.e.write(&format!("{target} = "));
            self.write_init_value(&f.ty, init)?;
            self.e.write_line(";");
            return Ok(());
        }
        if needs_storage_init(&f.ty) {
            self.write_storage_init(&target, &target, &f.ty, 0)?;
        }
        Ok(())
    }

    fn write_const_attr(&mut self, method: Option<&str>, k: &ConstDecl) -> Result<(), CompileError> {
        if let Some(doc) = &k.doc {
            self.e.write_doc(doc);
        }
        self.e.write(&format!(
            "{}.{} = ",
            self.current_class,
            const_attr_name(method, &k.name)
        ));
        self.write_init_value(&k.ty, &k.value)?;
        self.e.write_line(";");
        Ok(())
    }

    /// Initializer expression; aggregate literals for numeric arrays become
    /// typed-array constructions.
    fn write_init_value(&mut self, ty: &Type, init: &Expr) -> Result<(), CompileError> {
        if let ExprKind::ArrayLit(elems) = &init.kind {
            if let Some(ctor) = ty.elem().and_then(array_element_type) {
                self.e.write(&format!("new {ctor}("));
                self.write_array_lit(elems)?;
                self.e.write(")");
                return Ok(());
            }
            return self.write_array_lit(elems);
        }
        self.write_expr(init, Prec::Assign)
    }

    fn write_array_lit(&mut self, elems: &[Expr]) -> Result<(), CompileError> {
        if elems.is_empty() {
            self.e.write("[]");
            return Ok(());
        }
        self.e.write("[ ");
        for (i, el) in elems.iter().enumerate() {
            if i > 0 {
                self.e.write(", ");
            }
            self.write_expr(el, Prec::Statement)?;
        }
        self.e.write(" ]");
        Ok(())
    }

    /// Default construction for storage types. `decl` is the left side of
    /// the first assignment (`let x` or `this.x`), `access` the expression
    /// used for element writes in nested loops.
    fn write_storage_init(
        &mut self,
        decl: &str,
        access: &str,
        ty: &Type,
        depth: usize,
    ) -> Result<(), CompileError> {
        match ty {
            Type::List(_) | Type::Stack(_) => self.e.write_line(&format!("{decl} = [];")),
            Type::Set(_) => self.e.write_line(&format!("{decl} = new Set();")),
            Type::Dict { .. } => self.e.write_line(&format!("{decl} = {{}};")),
            Type::Class(name) => self.e.write_line(&format!("{decl} = new {name}();")),
            Type::Array { elem, len } => {
                if let Some(ctor) = array_element_type(elem) {
                    self.e.write_line(&format!("{decl} = new {ctor}({len});"));
                    return Ok(());
                }
                self.e.write_line(&format!("{decl} = new Array({len});"));
                if matches!(**elem, Type::Class(_) | Type::Array { .. }) {
                    self.e.open_loop("let", depth, *len);
                    let slot = format!("{access}[_i{depth}]");
                    self.write_storage_init(&slot, &slot, elem, depth + 1)?;
                    self.e.close_block("");
                }
            }
            other => {
                return Err(CompileError::Unsupported(format!(
                    "default construction of {other:?}"
                )))
            }
        }
        Ok(())
    }

    // ---- statements ----

    fn write_stmt(&mut self, s: &Stmt) -> Result<(), CompileError> {
        match &s.kind {
            StmtKind::Block(body) => {
                self.e.open_block();
                for s in body {
                    self.write_stmt(s)?;
                }
                self.e.close_block("");
            }
            StmtKind::Expr(e) => {
                if self.write_dict_clear(e)? {
                    return Ok(());
                }
                self.write_expr(e, Prec::Statement)?;
                self.e.write_line(";");
            }
            StmtKind::Var(decl) => self.write_var(decl)?,
            // hoisted into Method::consts by the resolver
            StmtKind::Const(_) => {}
            StmtKind::Assign { target, op, value } => {
                self.write_assign(target, *op, value)?;
                self.e.write_line(";");
            }
            StmtKind::If { .. } => self.write_if(s)?,
            StmtKind::While { cond, body } => {
                self.e.write("while (");
                self.write_expr(cond, Prec::Statement)?;
                self.e.write(") ");
                self.break_stack.push(BreakScope::Loop);
                self.write_body(body)?;
                self.break_stack.pop();
                self.e.newline();
            }
            StmtKind::DoWhile { body, cond } => {
                self.e.write("do ");
                self.break_stack.push(BreakScope::Loop);
                self.write_body(body)?;
                self.break_stack.pop();
                self.e.write(" while (");
                self.write_expr(cond, Prec::Statement)?;
                self.e.write_line(");");
            }
            StmtKind::For {
                init,
                cond,
                advance,
                body,
            } => {
                self.e.write("for (");
                if let Some(init) = init {
                    self.write_clause(init)?;
                }
                self.e.write("; ");
                if let Some(cond) = cond {
                    self.write_expr(cond, Prec::Statement)?;
                }
                self.e.write("; ");
                if let Some(advance) = advance {
                    self.write_clause(advance)?;
                }
                self.e.write(") ");
                self.break_stack.push(BreakScope::Loop);
                self.write_body(body)?;
                self.break_stack.pop();
                self.e.newline();
            }
            StmtKind::Foreach {
                key,
                value,
                collection,
                body,
            } => self.write_foreach(key, value.as_ref(), collection, body)?,
            StmtKind::Switch {
                value,
                cases,
                default,
            } => {
                if *expr_type(value) == Type::Str {
                    self.write_string_switch(value, cases, default.as_deref())?;
                } else {
                    self.write_int_switch(value, cases, default.as_deref())?;
                }
            }
            StmtKind::Break => match self.break_stack.last() {
                Some(BreakScope::StrSwitch(label)) => {
                    self.e.write_line(&format!("break {label};"))
                }
                _ => self.e.write_line("break;"),
            },
            StmtKind::Continue => self.e.write_line("continue;"),
            StmtKind::Return(None) => self.e.write_line("return;"),
            StmtKind::Return(Some(e)) => {
                self.e.write("return ");
                self.write_expr(e, Prec::Statement)?;
                self.e.write_line(";");
            }
            StmtKind::Throw(e) => {
                self.e.write("throw ");
                self.write_expr(e, Prec::Statement)?;
                self.e.write_line(";");
            }
            StmtKind::Lock { .. } => {
                return Err(CompileError::Unsupported("lock".to_string()));
            }
            StmtKind::Assert { cond, msg } => {
                self.e.write("console.assert(");
                self.write_expr(cond, Prec::Statement)?;
                if let Some(msg) = msg {
                    self.e.write(", ");
                    self.write_expr(msg, Prec::Statement)?;
                }
                self.e.write_line(");");
            }
        }
        Ok(())
    }

    /// Body of a structured statement, always braced. Leaves the cursor on
    /// the closing brace for `else` / `while` continuations.
    fn write_body(&mut self, s: &Stmt) -> Result<(), CompileError> {
        self.e.open_block();
        match &s.kind {
            StmtKind::Block(body) => {
                for s in body {
                    self.write_stmt(s)?;
                }
            }
            _ => self.write_stmt(s)?,
        }
        self.e.close_block_inline();
        Ok(())
    }

    fn write_if(&mut self, s: &Stmt) -> Result<(), CompileError> {
        let StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } = &s.kind
        else {
            return Ok(());
        };
        self.e.write("if (");
        self.write_expr(cond, Prec::Statement)?;
        self.e.write(") ");
        self.write_body(then_branch)?;
        match else_branch {
            None => self.e.newline(),
            Some(else_branch) => {
                self.e.write(" else ");
                if matches!(else_branch.kind, StmtKind::If { .. }) {
                    self.write_if(else_branch)?;
                } else {
                    self.write_body(else_branch)?;
                    self.e.newline();
                }
            }
        }
        Ok(())
    }

    /// `for` header clause: a statement without the trailing `;`.
    fn write_clause(&mut self, s: &Stmt) -> Result<(), CompileError> {
        match &s.kind {
            StmtKind::Var(decl) => {
                self.e.write(&format!("let {}", mangle(&decl.name)));
                if let Some(init) = &decl.init {
                    self.e.write(" = ");
                    self.write_init_value(&decl.ty, init)?;
                }
                Ok(())
            }
            StmtKind::Assign { target, op, value } => self.write_assign(target, *op, value),
            StmtKind::Expr(e) => self.write_expr(e, Prec::Statement),
            _ => Err(CompileError::Unsupported(
                "statement kind in for header".to_string(),
            )),
        }
    }

    fn write_var(&mut self, decl: &VarDecl) -> Result<(), CompileError> {
        let name = mangle(&decl.name);
        if let Some(init) = &decl.init {
            self.e.write(&format!("let {name} = "));
            self.write_init_value(&decl.ty, init)?;
            self.e.write_line(";");
        } else if needs_storage_init(&decl.ty) {
            self.write_storage_init(&format!("let {name}"), &name, &decl.ty, 0)?;
        } else {
            self.e.write_line(&format!("let {name};"));
        }
        Ok(())
    }

    fn write_assign(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
    ) -> Result<(), CompileError> {
        let Some(bop) = assign_bin_op(op) else {
            self.write_expr(target, Prec::Assign)?;
            self.e.write(" = ");
            return self.write_init_value(expr_type(target), value);
        };
        let lty = expr_type(target);
        let decompose = match bop {
            BinOp::Mul | BinOp::Div | BinOp::Mod => arith_coercion(bop, lty).is_some(),
            BinOp::Shr => is_uint32(lty),
            _ => false,
        };
        self.write_expr(target, Prec::Assign)?;
        if decompose {
            self.e.write(" = ");
            self.write_binary(bop, target, value, Prec::Assign)?;
        } else {
            self.e.write(&format!(" {}= ", op_text(bop)));
            self.write_expr(value, Prec::Assign)?;
        }
        Ok(())
    }

    /// `dict.Clear()` has no expression form: deletes every key in place.
    fn write_dict_clear(&mut self, e: &Expr) -> Result<bool, CompileError> {
        let ExprKind::Call {
            callee: Callee::Method { target, name },
            ..
        } = &e.kind
        else {
            return Ok(false);
        };
        if name != "Clear" || !matches!(expr_type(target), Type::Dict { .. }) {
            return Ok(false);
        }
        self.e.write("for (const key in ");
        self.write_expr(target, Prec::Statement)?;
        self.e.write(") ");
        self.e.open_block();
        self.e.write("delete ");
        self.write_expr(target, Prec::Primary)?;
        self.e.write_line("[key];");
        self.e.close_block("");
        Ok(true)
    }

    fn write_foreach(
        &mut self,
        key: &IterVar,
        value: Option<&IterVar>,
        collection: &Expr,
        body: &Stmt,
    ) -> Result<(), CompileError> {
        match (expr_type(collection).clone(), value) {
            (Type::Dict { sorted, key: kt, .. }, Some(v)) => {
                self.e.write(&format!(
                    "for (const [{}, {}] of Object.entries(",
                    mangle(&key.name),
                    mangle(&v.name)
                ));
                self.write_expr(collection, Prec::Statement)?;
                self.e.write(")");
                let numeric_key = kt.is_numeric();
                if numeric_key {
                    self.e.write(".map(e => [+e[0], e[1]])");
                }
                if sorted {
                    if numeric_key {
                        self.e.write(".sort((a, b) => a[0] - b[0])");
                    } else {
                        self.e.write(".sort((a, b) => a[0].localeCompare(b[0]))");
                    }
                }
                self.e.write(") ");
            }
            _ => {
                self.e
                    .write(&format!("for (const {} of ", mangle(&key.name)));
                self.write_expr(collection, Prec::Statement)?;
                self.e.write(") ");
            }
        }
        self.break_stack.push(BreakScope::Loop);
        self.write_body(body)?;
        self.break_stack.pop();
        self.e.newline();
        Ok(())
    }

    fn write_int_switch(
        &mut self,
        value: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
    ) -> Result<(), CompileError> {
        self.e.write("switch (");
        self.write_expr(value, Prec::Statement)?;
        self.e.write_line(") {");
        self.break_stack.push(BreakScope::Switch);
        for case in cases {
            for v in &case.values {
                self.e.write("case ");
                self.write_expr(v, Prec::Statement)?;
                self.e.write_line(":");
            }
            self.e.indent();
            for s in &case.body {
                self.write_stmt(s)?;
            }
            self.e.dedent();
        }
        if let Some(body) = default {
            self.e.write_line("default:");
            self.e.indent();
            for s in body {
                self.write_stmt(s)?;
            }
            self.e.dedent();
        }
        self.break_stack.pop();
        self.e.write_line("}");
        Ok(())
    }

    /// Strings compare by identity in a native switch; emit an `if` chain
    /// instead. Early breaks out of a case turn into jumps to a forward
    /// label on the surrounding block.
    fn write_string_switch(
        &mut self,
        value: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
    ) -> Result<(), CompileError> {
        let early = cases.iter().any(|c| case_has_early_break(&c.body))
            || default.is_some_and(case_has_early_break);
        let label = if early {
            let label = format!("ciafterswitch{}", self.switch_labels);
            self.switch_labels += 1;
            Some(label)
        } else {
            None
        };
        if let Some(label) = &label {
            self.e.write(&format!("{label}: "));
            self.e.open_block();
        }
        self.break_stack.push(match &label {
            Some(label) => BreakScope::StrSwitch(label.clone()),
            None => BreakScope::Switch,
        });
        for (i, case) in cases.iter().enumerate() {
            // the ` else ` separator is written at the end of the previous arm
            self.e.write("if (");
            for (j, v) in case.values.iter().enumerate() {
                if j > 0 {
                    self.e.write(" || ");
                }
                self.write_expr(value, Prec::Equality)?;
                self.e.write(" === ");
                self.write_expr(v, Prec::Equality.tighter())?;
            }
            self.e.write(") ");
            self.write_case_body(&case.body)?;
            if i + 1 < cases.len() || default.is_some() {
                self.e.write(" else ");
            } else {
                self.e.newline();
            }
        }
        if let Some(body) = default {
            self.write_case_body(body)?;
            self.e.newline();
        }
        self.break_stack.pop();
        if label.is_some() {
            self.e.close_block("");
        }
        Ok(())
    }

    /// Case body as a brace block, without the trailing `break`.
    fn write_case_body(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        let trimmed = match body.last() {
            Some(s) if matches!(s.kind, StmtKind::Break) => &body[..body.len() - 1],
            _ => body,
        };
        self.e.open_block();
        for s in trimmed {
            self.write_stmt(s)?;
        }
        self.e.close_block_inline();
        Ok(())
    }

    // ---- expressions ----

    fn write_expr(&mut self, e: &Expr, parent: Prec) -> Result<(), CompileError> {
        match &e.kind {
            ExprKind::Int(v) => self.e.write(&v.to_string()),
            ExprKind::Float(v) => self.e.write(&v.to_string()),
            ExprKind::Char(c) => self.e.write(&(*c as i64).to_string()),
            ExprKind::Str(s) => self.e.write(&escaped_string(s)),
            ExprKind::Bool(b) => self.e.write(if *b { "true" } else { "false" }),
            ExprKind::Null => self.e.write("null"),
            ExprKind::Interp(parts) => self.write_interp(parts)?,
            ExprKind::Resource(name) => self.e.write(&format!("Ci.{}", mangle_resource(name))),
            ExprKind::Local(name) => self.e.write(&mangle(name)),
            ExprKind::FieldRef(name) => self.e.write(&format!("this.{}", mangle(name))),
            ExprKind::ConstRef {
                class,
                method,
                name,
            } => self.e.write(&format!(
                "{}.{}",
                class,
                const_attr_name(method.as_deref(), name)
            )),
            ExprKind::EnumRef {
                enum_name,
                constant,
            } => self
                .e
                .write(&format!("{}.{}", enum_name, upper_snake(constant))),
            ExprKind::Prop { target, name } => self.write_prop(target, name, parent)?,
            ExprKind::Binary { op, lhs, rhs } => self.write_binary(*op, lhs, rhs, parent)?,
            ExprKind::Unary { op, operand } => {
                let text = match op {
                    UnOp::Neg => "-",
                    UnOp::Not => "!",
                    UnOp::BitNot => "~",
                    UnOp::PreInc => "++",
                    UnOp::PreDec => "--",
                };
                self.e.write(text);
                let guard = matches!(op, UnOp::Neg)
                    && matches!(
                        &operand.kind,
                        ExprKind::Unary {
                            op: UnOp::Neg | UnOp::PreDec,
                            ..
                        } | ExprKind::Int(i64::MIN..=-1)
                    );
                if guard {
                    self.e.write("(");
                    self.write_expr(operand, Prec::Statement)?;
                    self.e.write(")");
                } else {
                    self.write_expr(operand, Prec::Primary)?;
                }
            }
            ExprKind::Postfix { op, operand } => {
                self.write_expr(operand, Prec::Primary)?;
                self.e.write(match op {
                    PostfixOp::Inc => "++",
                    PostfixOp::Dec => "--",
                });
            }
            ExprKind::Cond {
                cond,
                on_true,
                on_false,
            } => {
                let wrap = Prec::Select < parent;
                if wrap {
                    self.e.write("(");
                }
                self.write_expr(cond, Prec::CondOr)?;
                self.e.write(" ? ");
                self.write_expr(on_true, Prec::Select)?;
                self.e.write(" : ");
                self.write_expr(on_false, Prec::Select)?;
                if wrap {
                    self.e.write(")");
                }
            }
            ExprKind::Call { callee, args } => self.write_call(callee, args, parent)?,
            ExprKind::Index { target, index } => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write("[");
                self.write_expr(index, Prec::Statement)?;
                self.e.write("]");
            }
            ExprKind::ArrayLit(elems) => self.write_array_lit(elems)?,
            ExprKind::Name(_) | ExprKind::Member { .. } => {
                return Err(CompileError::Unsupported(
                    "unresolved reference in code generation".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn write_plain_binary(
        &mut self,
        text: &str,
        own: Prec,
        lhs: &Expr,
        rhs: &Expr,
        parent: Prec,
    ) -> Result<(), CompileError> {
        let wrap = own < parent;
        if wrap {
            self.e.write("(");
        }
        self.write_expr(lhs, own)?;
        self.e.write(&format!(" {text} "));
        self.write_expr(rhs, own.tighter())?;
        if wrap {
            self.e.write(")");
        }
        Ok(())
    }

    fn write_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        parent: Prec,
    ) -> Result<(), CompileError> {
        match op {
            BinOp::Shr => {
                let text = if is_uint32(expr_type(lhs)) { ">>>" } else { ">>" };
                self.write_plain_binary(text, Prec::Shift, lhs, rhs, parent)
            }
            BinOp::Mul | BinOp::Div | BinOp::Mod => {
                match arith_coercion(op, expr_type(lhs)) {
                    None => self.write_plain_binary(op_text(op), Prec::Mul, lhs, rhs, parent),
                    Some(Coerce::Trunc) => {
                        self.e.write("Math.trunc(");
                        self.write_expr(lhs, Prec::Mul)?;
                        self.e.write(&format!(" {} ", op_text(op)));
                        self.write_expr(rhs, Prec::Mul.tighter())?;
                        self.e.write(")");
                        Ok(())
                    }
                    Some(coerce) => {
                        // the coercion is part of the value: parenthesize
                        // everywhere except at statement level
                        let wrap = parent > Prec::Statement;
                        if wrap {
                            self.e.write("(");
                        }
                        self.write_expr(lhs, Prec::Mul)?;
                        self.e.write(&format!(" {} ", op_text(op)));
                        self.write_expr(rhs, Prec::Mul.tighter())?;
                        self.e.write(match coerce {
                            Coerce::Or0 => " | 0",
                            _ => " >>> 0",
                        });
                        if wrap {
                            self.e.write(")");
                        }
                        Ok(())
                    }
                }
            }
            op if op.is_comparison() => {
                if is_uint32(expr_type(lhs)) || is_uint32(expr_type(rhs)) {
                    let own = op_prec(op);
                    let wrap = own < parent;
                    if wrap {
                        self.e.write("(");
                    }
                    self.e.write("(");
                    self.write_expr(lhs, Prec::Shift)?;
                    self.e.write(&format!(" >>> 0) {} (", op_text(op)));
                    self.write_expr(rhs, Prec::Shift)?;
                    self.e.write(" >>> 0)");
                    if wrap {
                        self.e.write(")");
                    }
                    Ok(())
                } else {
                    self.write_plain_binary(op_text(op), op_prec(op), lhs, rhs, parent)
                }
            }
            _ => self.write_plain_binary(op_text(op), op_prec(op), lhs, rhs, parent),
        }
    }

    fn write_prop(&mut self, target: &Expr, name: &str, parent: Prec) -> Result<(), CompileError> {
        let tty = expr_type(target).clone();
        match (&tty, name) {
            (Type::Str, "Length")
            | (Type::List(_) | Type::Stack(_), "Count")
            | (Type::Array { .. } | Type::Slice(_), "Length") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".length");
            }
            (Type::Set(_), "Count") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".size");
            }
            (Type::Dict { .. }, "Count") => {
                self.e.write("Object.keys(");
                self.write_expr(target, Prec::Statement)?;
                self.e.write(").length");
            }
            (Type::Match, "Start") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".index");
            }
            (Type::Match, "Value") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write("[0]");
            }
            (Type::Match, "Length") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write("[0].length");
            }
            (Type::Match, "End") => {
                let wrap = Prec::Add < parent;
                if wrap {
                    self.e.write("(");
                }
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".index + ");
                self.write_expr(target, Prec::Primary)?;
                self.e.write("[0].length");
                if wrap {
                    self.e.write(")");
                }
            }
            (Type::Class(_) | Type::ClassPtr(_), _) => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(&format!(".{}", mangle(name)));
            }
            _ => {
                return Err(CompileError::Unsupported(format!(
                    "property {name} on {tty:?}"
                )))
            }
        }
        Ok(())
    }

    fn write_args(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.e.write(", ");
            }
            self.write_expr(arg, Prec::Statement)?;
        }
        Ok(())
    }

    fn write_call(
        &mut self,
        callee: &Callee,
        args: &[Expr],
        parent: Prec,
    ) -> Result<(), CompileError> {
        match callee {
            Callee::This(name) => {
                self.e.write(&format!("this.{}(", mangle(name)));
                self.write_args(args)?;
                self.e.write(")");
            }
            Callee::Static { class, name } => {
                self.e.write(&format!("{}.{}(", class, mangle(name)));
                self.write_args(args)?;
                self.e.write(")");
            }
            Callee::Base { class, name } => {
                self.e
                    .write(&format!("{}.prototype.{}.call(this", class, mangle(name)));
                for arg in args {
                    self.e.write(", ");
                    self.write_expr(arg, Prec::Statement)?;
                }
                self.e.write(")");
            }
            Callee::Builtin { class, name } => {
                self.write_builtin_call(*class, name, args)?;
            }
            Callee::Method { target, name } => {
                self.write_method_call(target, name, args, parent)?;
            }
            Callee::Unresolved { .. } => {
                return Err(CompileError::Unsupported(
                    "unresolved call in code generation".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn write_builtin_call(
        &mut self,
        class: BuiltinClass,
        name: &str,
        args: &[Expr],
    ) -> Result<(), CompileError> {
        match class {
            BuiltinClass::Regex => match name {
                "IsMatch" => {
                    self.write_regex(&args[1], args.get(2))?;
                    self.e.write(".test(");
                    self.write_expr(&args[0], Prec::Statement)?;
                    self.e.write(")");
                }
                "Compile" => self.write_regex(&args[0], args.get(1))?,
                "Escape" => {
                    self.helpers.insert(Helper::RegexEscape);
                    self.e.write("Ci.regexEscape(");
                    self.write_expr(&args[0], Prec::Statement)?;
                    self.e.write(")");
                }
                _ => {
                    return Err(CompileError::Unsupported(format!("Regex.{name}")));
                }
            },
            BuiltinClass::Utf8 => match name {
                "GetByteCount" => {
                    self.e.write("new TextEncoder().encode(");
                    self.write_expr(&args[0], Prec::Statement)?;
                    self.e.write(").length");
                }
                "GetBytes" => {
                    self.e.write("new TextEncoder().encodeInto(");
                    self.write_expr(&args[0], Prec::Statement)?;
                    self.e.write(", ");
                    if matches!(args[2].kind, ExprKind::Int(0)) {
                        self.write_expr(&args[1], Prec::Statement)?;
                    } else {
                        self.write_expr(&args[1], Prec::Primary)?;
                        self.e.write(".subarray(");
                        self.write_expr(&args[2], Prec::Statement)?;
                        self.e.write(")");
                    }
                    self.e.write(")");
                }
                "GetString" => {
                    self.e.write("new TextDecoder().decode(");
                    self.write_expr(&args[0], Prec::Primary)?;
                    self.e.write(".subarray(");
                    self.write_expr(&args[1], Prec::Statement)?;
                    self.e.write(", ");
                    self.write_expr(&args[1], Prec::Add)?;
                    self.e.write(" + ");
                    self.write_expr(&args[2], Prec::Add.tighter())?;
                    self.e.write("))");
                }
                _ => {
                    return Err(CompileError::Unsupported(format!("UTF8.{name}")));
                }
            },
            BuiltinClass::Console | BuiltinClass::ConsoleError => {
                let sink = if class == BuiltinClass::ConsoleError {
                    "console.error"
                } else {
                    "console.log"
                };
                self.e.write(&format!("{sink}("));
                self.write_args(args)?;
                self.e.write(")");
            }
            BuiltinClass::Environment => {
                if let ExprKind::Str(name) = &args[0].kind {
                    let plain = !name.is_empty()
                        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                    if plain {
                        self.e.write(&format!("process.env.{name}"));
                        return Ok(());
                    }
                }
                self.e.write("process.env[");
                self.write_expr(&args[0], Prec::Statement)?;
                self.e.write("]");
            }
        }
        Ok(())
    }

    fn write_method_call(
        &mut self,
        target: &Expr,
        name: &str,
        args: &[Expr],
        parent: Prec,
    ) -> Result<(), CompileError> {
        let tty = expr_type(target).clone();
        if let Type::Class(_) | Type::ClassPtr(_) = tty {
            self.write_expr(target, Prec::Primary)?;
            self.e.write(&format!(".{}(", mangle(name)));
            self.write_args(args)?;
            self.e.write(")");
            return Ok(());
        }
        match (&tty, name) {
            (Type::List(_), "Add") | (Type::Stack(_), "Push") => {
                self.method(target, "push", args)?;
            }
            (Type::List(_), "Insert") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".splice(");
                self.write_expr(&args[0], Prec::Statement)?;
                self.e.write(", 0, ");
                self.write_expr(&args[1], Prec::Statement)?;
                self.e.write(")");
            }
            (Type::List(_), "Remove") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".splice(");
                self.write_expr(&args[0], Prec::Statement)?;
                self.e.write(", 1)");
            }
            (Type::List(_), "RemoveRange") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".splice(");
                self.write_expr(&args[0], Prec::Statement)?;
                self.e.write(", ");
                self.write_expr(&args[1], Prec::Statement)?;
                self.e.write(")");
            }
            (Type::List(_), "Contains") => self.method(target, "includes", args)?,
            (Type::List(_) | Type::Stack(_), "Clear") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".length = 0");
            }
            (Type::List(_) | Type::Array { .. } | Type::Slice(_), "SortAll") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".sort((a, b) => a - b)");
            }
            (Type::List(_), "SortPart") => {
                self.helpers.insert(Helper::SortListPart);
                self.e.write("Ci.sortListPart(");
                self.write_expr(target, Prec::Statement)?;
                self.e.write(", ");
                self.write_args(args)?;
                self.e.write(")");
            }
            (Type::Array { .. } | Type::Slice(_), "SortPart") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".subarray(");
                self.write_expr(&args[0], Prec::Statement)?;
                self.e.write(", ");
                self.write_expr(&args[0], Prec::Add)?;
                self.e.write(" + ");
                self.write_expr(&args[1], Prec::Add.tighter())?;
                self.e.write(").sort()");
            }
            (Type::List(_) | Type::Array { .. } | Type::Slice(_), "CopyTo") => {
                self.helpers.insert(Helper::CopyArray);
                self.e.write("Ci.copyArray(");
                self.write_expr(target, Prec::Statement)?;
                self.e.write(", ");
                self.write_args(args)?;
                self.e.write(")");
            }
            (Type::Array { .. } | Type::Slice(_), "Fill") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".fill(");
                self.write_expr(&args[0], Prec::Statement)?;
                if args.len() == 3 {
                    self.e.write(", ");
                    self.write_expr(&args[1], Prec::Statement)?;
                    self.e.write(", ");
                    self.write_expr(&args[1], Prec::Add)?;
                    self.e.write(" + ");
                    self.write_expr(&args[2], Prec::Add.tighter())?;
                }
                self.e.write(")");
            }
            (Type::Stack(_), "Pop") => self.method(target, "pop", args)?,
            (Type::Stack(_), "Peek") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".at(-1)");
            }
            (Type::Set(_), "Add") => self.method(target, "add", args)?,
            (Type::Set(_), "Contains") => self.method(target, "has", args)?,
            (Type::Set(_), "Remove") => self.method(target, "delete", args)?,
            (Type::Set(_), "Clear") => self.method(target, "clear", args)?,
            (Type::Dict { .. }, "ContainsKey") => self.method(target, "hasOwnProperty", args)?,
            (Type::Dict { .. }, "Remove") => {
                let wrap = parent > Prec::Statement;
                if wrap {
                    self.e.write("(");
                }
                self.e.write("delete ");
                self.write_expr(target, Prec::Primary)?;
                self.e.write("[");
                self.write_expr(&args[0], Prec::Statement)?;
                self.e.write("]");
                if wrap {
                    self.e.write(")");
                }
            }
            (Type::Regex, "IsMatch") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write(".test(");
                self.write_expr(&args[0], Prec::Statement)?;
                self.e.write(")");
            }
            (Type::Match, "Find") => {
                let wrap = Prec::Equality < parent;
                if wrap {
                    self.e.write("(");
                }
                self.e.write("(");
                self.write_expr(target, Prec::Statement)?;
                self.e.write(" = ");
                self.write_regex(&args[1], args.get(2))?;
                self.e.write(".exec(");
                self.write_expr(&args[0], Prec::Statement)?;
                self.e.write(")) != null");
                if wrap {
                    self.e.write(")");
                }
            }
            (Type::Match, "GetCapture") => {
                self.write_expr(target, Prec::Primary)?;
                self.e.write("[");
                self.write_expr(&args[0], Prec::Statement)?;
                self.e.write("]");
            }
            _ => {
                return Err(CompileError::Unsupported(format!("method {name} on {tty:?}")));
            }
        }
        Ok(())
    }

    /// `target.jsname(args)`
    fn method(&mut self, target: &Expr, js_name: &str, args: &[Expr]) -> Result<(), CompileError> {
        self.write_expr(target, Prec::Primary)?;
        self.e.write(&format!(".{js_name}("));
        self.write_args(args)?;
        self.e.write(")");
        Ok(())
    }

    /// `/pattern/flags` for literal patterns, `new RegExp(...)` otherwise.
    fn write_regex(
        &mut self,
        pattern: &Expr,
        options: Option<&Expr>,
    ) -> Result<(), CompileError> {
        let flags = regex_flags(options)?;
        if let ExprKind::Str(p) = &pattern.kind {
            self.e.write("/");
            if p.is_empty() {
                self.e.write("(?:)");
            } else {
                for c in p.chars() {
                    if c == '/' {
                        self.e.write("\\/");
                    } else {
                        self.e.write_char(c);
                    }
                }
            }
            self.e.write(&format!("/{flags}"));
        } else {
            self.e.write("new RegExp(");
            self.write_expr(pattern, Prec::Statement)?;
            if !flags.is_empty() {
                self.e.write(&format!(", \"{flags}\""));
            }
            self.e.write(")");
        }
        Ok(())
    }

    fn write_interp(&mut self, parts: &[InterpPart]) -> Result<(), CompileError> {
        self.e.write("`");
        for part in parts {
            self.e.write(&template_text(&part.prefix));
            if let Some(arg) = &part.arg {
                self.e.write("${");
                self.write_interp_arg(arg, part)?;
                self.e.write("}");
            }
        }
        self.e.write("`");
        Ok(())
    }

    fn write_interp_arg(&mut self, arg: &Expr, part: &InterpPart) -> Result<(), CompileError> {
        self.write_expr(arg, Prec::Primary)?;
        match part.format {
            Some('E') | Some('e') => {
                match part.precision {
                    Some(p) => self.e.write(&format!(".toExponential({p})")),
                    None => self.e.write(".toExponential()"),
                }
                if part.format == Some('E') {
                    self.e.write(".toUpperCase()");
                }
            }
            Some('F') | Some('f') => {
                self.e
                    .write(&format!(".toFixed({})", part.precision.unwrap_or(6)));
            }
            Some('X') => {
                self.e.write(".toString(16).toUpperCase()");
                self.write_zero_pad(part.precision);
            }
            Some('x') => {
                self.e.write(".toString(16)");
                self.write_zero_pad(part.precision);
            }
            Some('D') | Some('d') => {
                self.e.write(".toString()");
                self.write_zero_pad(part.precision);
            }
            Some(other) => {
                return Err(CompileError::Unsupported(format!(
                    "string format specifier {other}"
                )));
            }
            None => {}
        }
        if let Some(w) = part.width {
            if part.format.is_none() && expr_type(arg).is_numeric() {
                self.e.write(".toString()");
            }
            if w > 0 {
                self.e.write(&format!(".padStart({w})"));
            } else {
                self.e.write(&format!(".padEnd({})", -w));
            }
        }
        Ok(())
    }

    fn write_zero_pad(&mut self, precision: Option<i32>) {
        if let Some(p) = precision {
            self.e.write(&format!(".padStart({p}, \"0\")"));
        }
    }

    // ---- support object ----

    fn write_support_object(&mut self, program: &Program) -> Result<(), CompileError> {
        let resources: BTreeMap<String, &[u8]> = program
            .resources
            .iter()
            .map(|(name, bytes)| (mangle_resource(name), bytes.as_slice()))
            .collect();
        if self.helpers.is_empty() && resources.is_empty() {
            return Ok(());
        }
        self.e.blank_line();
        self.e.write("const Ci = ");
        self.e.open_block();
        for helper in self.helpers.clone() {
            self.write_helper(helper);
        }
        for (name, bytes) in resources {
            self.e.write(&format!("{name} : new Uint8Array(["));
            for (i, b) in bytes.iter().enumerate() {
                if i > 0 {
                    self.e.write(",");
                }
                self.e.write(&format!(" {b}"));
            }
            if bytes.is_empty() {
                self.e.write("]),");
            } else {
                self.e.write(" ]),");
            }
            self.e.newline();
        }
        self.e.close_block(";");
        Ok(())
    }

    fn write_helper(&mut self, helper: Helper) {
        match helper {
            Helper::CopyArray => {
                self.e
                    .write("copyArray : (sa, soffset, da, doffset, length) => ");
                self.e.open_block();
                self.e
                    .write("if (sa.subarray !== undefined && da.set !== undefined) ");
                self.e.open_block();
                self.e
                    .write_line("da.set(sa.subarray(soffset, soffset + length), doffset);");
                self.e.close_block_inline();
                self.e.write(" else ");
                self.e.open_block();
                self.e.write("for (let i = 0; i < length; i++) ");
                self.e.open_block();
                self.e.write_line("da[doffset + i] = sa[soffset + i];");
                self.e.close_block("");
                self.e.close_block("");
                self.e.close_block(",");
            }
            Helper::RegexEscape => {
                self.e.write_line(
                    "regexEscape : s => s.replace(/[-\\/\\\\^$*+?.()|[\\]{}]/g, \"\\\\$&\"),",
                );
            }
            Helper::SortListPart => {
                self.e.write("sortListPart : (a, offset, length) => ");
                self.e.open_block();
                self.e.write_line(
                    "const part = a.slice(offset, offset + length).sort((x, y) => x - y);",
                );
                self.e.write("for (let i = 0; i < length; i++) ");
                self.e.open_block();
                self.e.write_line("a[offset + i] = part[i];");
                self.e.close_block("");
                self.e.close_block(",");
            }
        }
    }
}

fn regex_flags(options: Option<&Expr>) -> Result<String, CompileError> {
    let Some(e) = options else {
        return Ok(String::new());
    };
    let ExprKind::Int(bits) = e.kind else {
        return Err(CompileError::Unsupported(
            "non-constant regex options".to_string(),
        ));
    };
    let mut flags = String::new();
    if bits & 1 != 0 {
        flags.push('i');
    }
    if bits & 2 != 0 {
        flags.push('m');
    }
    if bits & 16 != 0 {
        flags.push('s');
    }
    Ok(flags)
}

/// A `break` that is not the final statement of the case body must jump to
/// the end of the lowered if-chain. Breaks inside nested loops and switches
/// bind to those and do not count.
fn case_has_early_break(body: &[Stmt]) -> bool {
    let n = body.len();
    body.iter().enumerate().any(|(i, s)| {
        if i + 1 == n && matches!(s.kind, StmtKind::Break) {
            false
        } else {
            stmt_breaks(s)
        }
    })
}

fn stmt_breaks(s: &Stmt) -> bool {
    match &s.kind {
        StmtKind::Break => true,
        StmtKind::Block(body) => body.iter().any(stmt_breaks),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            stmt_breaks(then_branch)
                || else_branch.as_ref().is_some_and(|e| stmt_breaks(e))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::resolver;
    use pretty_assertions::assert_eq;

    fn gen_program(src: &str) -> Program {
        let decls = parser::parse("test.mica", src, &[], false).expect("parse");
        let mut program = Program {
            decls,
            resources: BTreeMap::new(),
        };
        resolver::resolve(&mut program).expect("resolve");
        program
    }

    fn gen(src: &str) -> String {
        generate(&gen_program(src)).expect("generate")
    }

    #[test]
    fn output_frame() {
        let out = gen("class T { }");
        assert!(out.starts_with("\"use strict\";\n"));
        assert!(out.ends_with("\n"));
        assert!(out.contains("function T() {\n}\n"));
    }

    #[test]
    fn unsigned_arithmetic_is_coerced() {
        let out = gen(
            "class T { bool M() { uint a = 0xFFFFFFFFu; uint b = a * 2u; return a < b; } }",
        );
        assert!(out.contains("let a = 4294967295;"), "{out}");
        assert!(out.contains("let b = (a * 2 | 0);"), "{out}");
        assert!(out.contains("return (a >>> 0) < (b >>> 0);"), "{out}");
    }

    #[test]
    fn signed_division_truncates() {
        let out = gen("class T { int M(int a, int b) { return a / b; } }");
        assert!(out.contains("return a / b | 0;"), "{out}");
    }

    #[test]
    fn unsigned_division_and_shift() {
        let out = gen("class T { uint M(uint a, uint b) { a /= b; a >>= 1; return a >> 2; } }");
        assert!(out.contains("a = (a / b >>> 0);"), "{out}");
        assert!(out.contains("a = a >>> 1;"), "{out}");
        assert!(out.contains("return a >>> 2;"), "{out}");
    }

    #[test]
    fn long_division_uses_trunc() {
        let out = gen("class T { long M(long a, long b) { return a / b; } }");
        assert!(out.contains("return Math.trunc(a / b);"), "{out}");
    }

    #[test]
    fn class_lowers_to_prototype_chain() {
        let out = gen(
            "class Bar { public void baz() { } }\n\
             class Foo : Bar { int n = 1; public void baz() { base.baz(); } }",
        );
        assert!(out.contains("function Foo() {"), "{out}");
        assert!(out.contains("this.n = 1;"), "{out}");
        assert!(out.contains("Foo.prototype = new Bar();"), "{out}");
        assert!(out.contains("Foo.prototype.baz = function() {"), "{out}");
        assert!(out.contains("Bar.prototype.baz.call(this);"), "{out}");
    }

    #[test]
    fn enums_freeze_constant_objects() {
        let out = gen("enum Season { Winter, Spring }");
        assert!(out.contains("const Season = Object.freeze({"), "{out}");
        assert!(out.contains("\tWINTER : 0,\n\tSPRING : 1\n});"), "{out}");
    }

    #[test]
    fn interpolation_formats_chain() {
        let out = gen("class T { string M(int x) { return $\"x={x,5:X2}\"; } }");
        assert!(
            out.contains("`x=${x.toString(16).toUpperCase().padStart(2, \"0\").padStart(5)}`"),
            "{out}"
        );
    }

    #[test]
    fn interpolation_pads_plain_numbers() {
        let out = gen("class T { string M(int x, string s) { return $\"{x,4}{s,-3}\"; } }");
        assert!(out.contains("${x.toString().padStart(4)}"), "{out}");
        assert!(out.contains("${s.padEnd(3)}"), "{out}");
    }

    #[test]
    fn string_switch_becomes_if_chain() {
        let out = gen(
            "class T { int M(string s) { switch (s) { case \"a\": return 1; \
             case \"b\", \"c\": return 2; default: return 3; } } }",
        );
        assert!(out.contains("if (s === \"a\") {"), "{out}");
        assert!(
            out.contains("} else if (s === \"b\" || s === \"c\") {"),
            "{out}"
        );
        assert!(out.contains("} else {"), "{out}");
        assert!(!out.contains("switch"), "{out}");
    }

    #[test]
    fn string_switch_early_break_gets_label() {
        let out = gen(
            "class T { void M(string s, List<int> a) { do { switch (s) { \
             case \"x\": if (a.Count > 0) { break; } a.Add(1); break; \
             default: continue; } } while (s.Length > 0); } }",
        );
        assert!(out.contains("ciafterswitch0: {"), "{out}");
        assert!(out.contains("break ciafterswitch0;"), "{out}");
        assert!(out.contains("continue;"), "{out}");
    }

    #[test]
    fn int_switch_stays_native() {
        let out = gen(
            "class T { int M(int x) { switch (x) { case 1: case 2: return 1; \
             default: break; } return 0; } }",
        );
        assert!(out.contains("switch (x) {"), "{out}");
        assert!(out.contains("\tcase 1:\n\tcase 2:\n\t\treturn 1;"), "{out}");
        assert!(out.contains("\tdefault:\n\t\tbreak;\n\t}"), "{out}");
    }

    #[test]
    fn sorted_dict_foreach_sorts_numeric_keys() {
        let out = gen(
            "class T { void M(SortedDictionary<int, string> d) { \
             foreach ((int k, string v) in d) { Console.WriteLine(v); } } }",
        );
        assert!(
            out.contains(
                "for (const [k, v] of Object.entries(d).map(e => [+e[0], e[1]]).sort((a, b) => a[0] - b[0])) {"
            ),
            "{out}"
        );
    }

    #[test]
    fn sorted_dict_foreach_with_string_keys_uses_locale_compare() {
        let out = gen(
            "class T { void M(SortedDictionary<string, int> d) { \
             foreach ((string k, int v) in d) { Console.WriteLine(k); } } }",
        );
        assert!(
            out.contains("of Object.entries(d).sort((a, b) => a[0].localeCompare(b[0]))) {"),
            "{out}"
        );
    }

    #[test]
    fn collection_methods_map_to_native_calls() {
        let out = gen(
            "class T { void M(List<int> a, Stack<int> st, HashSet<int> h, Dictionary<string, int> d) { \
             a.Add(1); a.Insert(0, 2); a.Remove(3); a.RemoveRange(1, 2); a.SortAll(); a.SortPart(0, 2); \
             st.Push(1); int x = st.Peek(); h.Add(x); bool has = d.ContainsKey(\"k\"); \
             d.Remove(\"k\"); d.Clear(); a.Clear(); } }",
        );
        assert!(out.contains("a.push(1);"), "{out}");
        assert!(out.contains("a.splice(0, 0, 2);"), "{out}");
        assert!(out.contains("a.splice(3, 1);"), "{out}");
        assert!(out.contains("a.splice(1, 2);"), "{out}");
        assert!(out.contains("a.sort((a, b) => a - b);"), "{out}");
        assert!(out.contains("Ci.sortListPart(a, 0, 2);"), "{out}");
        assert!(out.contains("st.push(1);"), "{out}");
        assert!(out.contains("let x = st.at(-1);"), "{out}");
        assert!(out.contains("h.add(x);"), "{out}");
        assert!(out.contains("let has = d.hasOwnProperty(\"k\");"), "{out}");
        assert!(out.contains("delete d[\"k\"];"), "{out}");
        assert!(out.contains("for (const key in d) {"), "{out}");
        assert!(out.contains("delete d[key];"), "{out}");
        assert!(out.contains("a.length = 0;"), "{out}");
    }

    #[test]
    fn typed_arrays_for_numeric_storage() {
        let out = gen(
            "class T { int[4] nums; byte[] M() { byte[] buf = { 1, 2 }; \
             nums.Fill(0); nums.CopyTo(0, nums, 1, 2); return buf; } }",
        );
        assert!(out.contains("this.nums = new Int32Array(4);"), "{out}");
        assert!(out.contains("let buf = new Uint8Array([ 1, 2 ]);"), "{out}");
        assert!(out.contains("this.nums.fill(0);"), "{out}");
        assert!(
            out.contains("Ci.copyArray(this.nums, 0, this.nums, 1, 2);"),
            "{out}"
        );
    }

    #[test]
    fn class_arrays_construct_elements_in_loops() {
        let out = gen("class Cell { }\nclass Grid { Cell[2][3] cells; }");
        assert!(out.contains("this.cells = new Array(2);"), "{out}");
        assert!(
            out.contains("for (let _i0 = 0; _i0 < 2; _i0++) {"),
            "{out}"
        );
        assert!(out.contains("this.cells[_i0] = new Array(3);"), "{out}");
        assert!(
            out.contains("this.cells[_i0][_i1] = new Cell();"),
            "{out}"
        );
    }

    #[test]
    fn regex_lowers_to_literals_and_helpers() {
        let out = gen(
            "class T { bool M(string s) { Match m; \
             if (m.Find(s, \"a(b)\", RegexOptions.IgnoreCase)) { return true; } \
             return Regex.IsMatch(s, \"x/y\") || Regex.Escape(s).Length > 0; } }",
        );
        assert!(out.contains("(m = /a(b)/i.exec(s)) != null"), "{out}");
        assert!(out.contains("/x\\/y/.test(s)"), "{out}");
        assert!(out.contains("Ci.regexEscape(s)"), "{out}");
        assert!(out.contains("regexEscape : s => s.replace("), "{out}");
    }

    #[test]
    fn match_properties_map_to_exec_results() {
        let out = gen(
            "class T { int M(Match m) { Console.WriteLine(m.Value); \
             Console.WriteLine(m.GetCapture(1)); return m.End - m.Start; } }",
        );
        assert!(out.contains("console.log(m[0]);"), "{out}");
        assert!(out.contains("console.log(m[1]);"), "{out}");
        assert!(out.contains("return m.index + m[0].length - m.index;"), "{out}");
    }

    #[test]
    fn utf8_console_and_environment_bridge() {
        let out = gen(
            "class T { void M(string s, byte[] buf) { int n = UTF8.GetByteCount(s); \
             UTF8.GetBytes(s, buf, 0); UTF8.GetBytes(s, buf, 4); \
             Console.WriteLine(UTF8.GetString(buf, 0, n)); \
             Console.Error.WriteLine(Environment.GetEnvironmentVariable(\"HOME\")); } }",
        );
        assert!(
            out.contains("let n = new TextEncoder().encode(s).length;"),
            "{out}"
        );
        assert!(out.contains("new TextEncoder().encodeInto(s, buf);"), "{out}");
        assert!(
            out.contains("new TextEncoder().encodeInto(s, buf.subarray(4));"),
            "{out}"
        );
        assert!(
            out.contains("console.log(new TextDecoder().decode(buf.subarray(0, 0 + n)));"),
            "{out}"
        );
        assert!(out.contains("console.error(process.env.HOME);"), "{out}");
    }

    #[test]
    fn keywords_get_underscore_suffix() {
        let out = gen("class T { int M(int package) { return package; } }");
        assert!(out.contains("function(package_)"), "{out}");
        assert!(out.contains("return package_;"), "{out}");
    }

    #[test]
    fn consts_hoist_onto_the_class() {
        let out = gen(
            "class T { public const int MaxSize = 10; \
             int M() { const int Limit = 5; return Limit + MaxSize; } }",
        );
        assert!(out.contains("T.MAX_SIZE = 10;"), "{out}");
        assert!(out.contains("T.M_LIMIT = 5;"), "{out}");
        assert!(out.contains("return T.M_LIMIT + T.MAX_SIZE;"), "{out}");
    }

    #[test]
    fn resources_follow_helpers_in_sorted_order() {
        let mut program = gen_program(
            "class T { string M(string s) { byte[] tile = resource(\"data/tile.bin\"); \
             byte[] alpha = resource(\"a.bin\"); return Regex.Escape(s); } }",
        );
        program.resources.insert("data/tile.bin".into(), vec![1, 2, 3]);
        program.resources.insert("a.bin".into(), vec![9]);
        let out = generate(&program).expect("generate");
        assert!(out.contains("data_tile_bin : new Uint8Array([ 1, 2, 3 ]),"), "{out}");
        assert!(out.contains("a_bin : new Uint8Array([ 9 ]),"), "{out}");
        let escape = out.find("regexEscape :").unwrap();
        let a_bin = out.find("a_bin :").unwrap();
        let tile = out.find("data_tile_bin :").unwrap();
        assert!(escape < a_bin && a_bin < tile, "{out}");
    }

    #[test]
    fn helpers_emit_once() {
        let out = gen(
            "class T { void M(int[] a, int[] b) { a.CopyTo(0, b, 0, 1); b.CopyTo(0, a, 0, 1); } }",
        );
        assert_eq!(out.matches("copyArray : (").count(), 1, "{out}");
    }

    #[test]
    fn assert_and_throw_pass_through() {
        let out = gen(
            "class T { void M(bool ok) { assert ok, \"broken\"; \
             if (!ok) { throw \"bad state\"; } } }",
        );
        assert!(out.contains("console.assert(ok, \"broken\");"), "{out}");
        assert!(out.contains("throw \"bad state\";"), "{out}");
    }

    #[test]
    fn lock_is_not_supported() {
        let program = gen_program("class T { void M(T other) { lock (other) { } } }");
        let err = generate(&program).unwrap_err();
        assert!(err.to_string().contains("not implemented: lock"), "{err}");
    }

    #[test]
    fn doc_comments_render_as_block_comments() {
        let out = gen("/// Adds `a` to the total.\nclass T { void M(int a) { M(a); } }");
        assert!(out.contains("/**\n * Adds <code>a</code> to the total.\n */"), "{out}");
    }

    #[test]
    fn parenthesization_is_minimal() {
        let out = gen(
            "class T { int M(int a, int b, int c) { return (a + b) * c - a * (b - c); } }",
        );
        assert!(out.contains("return (a + b) * c - a * (b - c);"), "{out}");
    }

    #[test]
    fn conditional_operator_parenthesizes_nested_condition() {
        let out = gen(
            "class T { int M(bool p, bool q) { return (p ? q : false) ? 1 : q ? 2 : 3; } }",
        );
        assert!(out.contains("return (p ? q : false) ? 1 : q ? 2 : 3;"), "{out}");
    }
}
