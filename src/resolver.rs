/// Name resolution and type annotation for Mica.
///
/// Two passes over the program: the first collects class and enum signatures,
/// the second walks initializers and method bodies, binding every name,
/// folding constants and rewriting surface references (`Name`, `Member`,
/// unresolved callees) into the resolved forms code generation consumes.
/// After a successful resolve every expression carries a type.
use std::collections::HashMap;

use crate::ast::*;
use crate::error::CompileError;

pub fn resolve(program: &mut Program) -> Result<(), CompileError> {
    let mut resolver = Resolver {
        classes: HashMap::new(),
        enums: HashMap::new(),
        resource_names: Vec::new(),
    };
    resolver.collect(program)?;
    resolver.fold_consts(program)?;
    resolver.bodies(program)?;
    for name in resolver.resource_names {
        program.resources.entry(name).or_default();
    }
    Ok(())
}

#[derive(Clone)]
struct MethodSig {
    params: Vec<Type>,
    ret: Type,
    is_static: bool,
}

#[derive(Clone, PartialEq)]
enum ConstVal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

#[derive(Clone)]
struct ConstInfo {
    ty: Type,
    is_public: bool,
    /// Folded scalar value; `None` for array constants.
    value: Option<ConstVal>,
}

struct ClassInfo {
    base: Option<String>,
    is_abstract: bool,
    fields: HashMap<String, Type>,
    methods: HashMap<String, MethodSig>,
    consts: HashMap<String, ConstInfo>,
}

struct Ctx<'a> {
    file: &'a str,
    class: &'a str,
    method: Option<&'a str>,
    is_static: bool,
    scopes: Vec<HashMap<String, Type>>,
    /// Method-local constants seen so far, by source name.
    method_consts: HashMap<String, Type>,
}

impl Ctx<'_> {
    fn err(&self, line: u32, msg: impl Into<String>) -> CompileError {
        CompileError::semantic(self.file, line, msg)
    }

    fn lookup_local(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn declare(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }
}

struct Resolver {
    classes: HashMap<String, ClassInfo>,
    enums: HashMap<String, HashMap<String, i64>>,
    resource_names: Vec<String>,
}

impl Resolver {
    // ---- pass 1: signatures ----

    fn collect(&mut self, program: &mut Program) -> Result<(), CompileError> {
        for decl in &program.decls {
            match decl {
                Decl::Enum(e) => {
                    if self.enums.contains_key(&e.name) {
                        return Err(CompileError::semantic(
                            &e.file,
                            e.line,
                            format!("duplicate enum {}", e.name),
                        ));
                    }
                    let constants = e
                        .constants
                        .iter()
                        .map(|c| (c.name.clone(), c.value))
                        .collect();
                    self.enums.insert(e.name.clone(), constants);
                }
                Decl::Class(c) => {
                    if self.classes.contains_key(&c.name) {
                        return Err(CompileError::semantic(
                            &c.file,
                            c.line,
                            format!("duplicate class {}", c.name),
                        ));
                    }
                    self.classes.insert(
                        c.name.clone(),
                        ClassInfo {
                            base: c.base.clone(),
                            is_abstract: c.is_abstract,
                            fields: HashMap::new(),
                            methods: HashMap::new(),
                            consts: HashMap::new(),
                        },
                    );
                }
            }
        }
        // base links and member tables need the full name set first
        for decl in &mut program.decls {
            let Decl::Class(c) = decl else { continue };
            if let Some(base) = &c.base {
                if !self.classes.contains_key(base) {
                    return Err(CompileError::semantic(
                        &c.file,
                        c.line,
                        format!("unknown base class {base}"),
                    ));
                }
            }
            let mut fields = HashMap::new();
            for f in &mut c.fields {
                self.fix_type(&mut f.ty, &c.file, f.line)?;
                fields.insert(f.name.clone(), f.ty.clone());
            }
            let mut methods = HashMap::new();
            for m in &mut c.methods {
                self.fix_type(&mut m.return_type, &c.file, m.line)?;
                for p in &mut m.params {
                    self.fix_type(&mut p.ty, &c.file, m.line)?;
                }
                methods.insert(
                    m.name.clone(),
                    MethodSig {
                        params: m.params.iter().map(|p| p.ty.clone()).collect(),
                        ret: m.return_type.clone(),
                        is_static: m.is_static,
                    },
                );
            }
            let mut consts = HashMap::new();
            for k in &mut c.consts {
                self.fix_type(&mut k.ty, &c.file, k.line)?;
                consts.insert(
                    k.name.clone(),
                    ConstInfo {
                        ty: k.ty.clone(),
                        is_public: k.is_public,
                        value: None,
                    },
                );
            }
            let info = self.classes.get_mut(&c.name).unwrap();
            info.fields = fields;
            info.methods = methods;
            info.consts = consts;
        }
        // reject base-class cycles before any chain walk
        for decl in &program.decls {
            let Decl::Class(c) = decl else { continue };
            let mut seen = vec![c.name.clone()];
            let mut cur = c.base.clone();
            while let Some(b) = cur {
                if seen.contains(&b) {
                    return Err(CompileError::semantic(
                        &c.file,
                        c.line,
                        format!("cyclic inheritance involving {}", c.name),
                    ));
                }
                cur = self.classes.get(&b).and_then(|i| i.base.clone());
                seen.push(b);
            }
        }
        Ok(())
    }

    /// Reclassify parsed `Class` names that denote enums and validate the
    /// type is well formed.
    fn fix_type(&self, ty: &mut Type, file: &str, line: u32) -> Result<(), CompileError> {
        match ty {
            Type::Class(name) | Type::ClassPtr(name) => {
                if self.enums.contains_key(name) {
                    *ty = Type::Enum(name.clone());
                } else if !self.classes.contains_key(name) {
                    return Err(CompileError::semantic(
                        file,
                        line,
                        format!("unknown type {name}"),
                    ));
                }
            }
            Type::Range { lo, hi } => {
                if lo > hi {
                    return Err(CompileError::semantic(
                        file,
                        line,
                        format!("invalid range [{lo} .. {hi}]"),
                    ));
                }
            }
            Type::List(t) | Type::Stack(t) | Type::Set(t) | Type::Slice(t) => {
                self.fix_type(t, file, line)?
            }
            Type::Array { elem, .. } => self.fix_type(elem, file, line)?,
            Type::Dict { key, value, .. } => {
                self.fix_type(key, file, line)?;
                self.fix_type(value, file, line)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn find_field(&self, class: &str, name: &str) -> Option<Type> {
        let mut cur = Some(class.to_string());
        while let Some(c) = cur {
            let info = self.classes.get(&c)?;
            if let Some(ty) = info.fields.get(name) {
                return Some(ty.clone());
            }
            cur = info.base.clone();
        }
        None
    }

    fn find_method(&self, class: &str, name: &str) -> Option<(String, MethodSig)> {
        let mut cur = Some(class.to_string());
        while let Some(c) = cur {
            let info = self.classes.get(&c)?;
            if let Some(sig) = info.methods.get(name) {
                return Some((c, sig.clone()));
            }
            cur = info.base.clone();
        }
        None
    }

    fn find_const(&self, class: &str, name: &str) -> Option<(String, ConstInfo)> {
        let mut cur = Some(class.to_string());
        while let Some(c) = cur {
            let info = self.classes.get(&c)?;
            if let Some(k) = info.consts.get(name) {
                return Some((c, k.clone()));
            }
            cur = info.base.clone();
        }
        None
    }

    /// Storage of an abstract class would construct an instance of it.
    fn check_storage(&self, ty: &Type, file: &str, line: u32) -> Result<(), CompileError> {
        if let Type::Class(name) = ty {
            if self.classes.get(name).is_some_and(|i| i.is_abstract) {
                return Err(CompileError::semantic(
                    file,
                    line,
                    format!("cannot construct abstract class {name}"),
                ));
            }
        }
        if let Type::Array { elem, .. } = ty {
            return self.check_storage(elem, file, line);
        }
        Ok(())
    }

    fn derives_from(&self, class: &str, base: &str) -> bool {
        let mut cur = Some(class.to_string());
        while let Some(c) = cur {
            if c == base {
                return true;
            }
            cur = self.classes.get(&c).and_then(|i| i.base.clone());
        }
        false
    }

    // ---- pass 2a: constant values ----

    fn fold_consts(&mut self, program: &mut Program) -> Result<(), CompileError> {
        for decl in &mut program.decls {
            let Decl::Class(c) = decl else { continue };
            let mut folded: Vec<(String, Option<ConstVal>)> = Vec::new();
            {
                let mut ctx = Ctx {
                    file: &c.file,
                    class: &c.name,
                    method: None,
                    is_static: true,
                    scopes: Vec::new(),
                    method_consts: HashMap::new(),
                };
                for k in &mut c.consts {
                    self.expr(&mut k.value, &mut ctx)?;
                    let value = const_val(&k.value);
                    if value.is_none() && !is_const_init(&k.value) {
                        return Err(ctx.err(
                            k.line,
                            format!("constant expression expected for {}", k.name),
                        ));
                    }
                    folded.push((k.name.clone(), value));
                }
            }
            let info = self.classes.get_mut(&c.name).unwrap();
            for (name, value) in folded {
                if let Some(k) = info.consts.get_mut(&name) {
                    k.value = value;
                }
            }
        }
        Ok(())
    }

    // ---- pass 2b: bodies ----

    fn bodies(&mut self, program: &mut Program) -> Result<(), CompileError> {
        for decl in &mut program.decls {
            let Decl::Class(c) = decl else { continue };
            for i in 0..c.fields.len() {
                let (name, line) = (c.fields[i].name.clone(), c.fields[i].line);
                if c.fields[i].init.is_none() {
                    self.check_storage(&c.fields[i].ty, &c.file, line)?;
                }
                if let Some(mut init) = c.fields[i].init.take() {
                    let mut ctx = Ctx {
                        file: &c.file,
                        class: &c.name,
                        method: None,
                        is_static: false,
                        scopes: Vec::new(),
                        method_consts: HashMap::new(),
                    };
                    let ty = self.expr(&mut init, &mut ctx)?;
                    if !self.compat(&ty, &c.fields[i].ty) {
                        return Err(ctx.err(line, format!("type mismatch initializing {name}")));
                    }
                    c.fields[i].init = Some(init);
                }
            }
            if let Some(body) = &mut c.ctor {
                let mut ctx = Ctx {
                    file: &c.file,
                    class: &c.name,
                    method: None,
                    is_static: false,
                    scopes: vec![HashMap::new()],
                    method_consts: HashMap::new(),
                };
                for s in body.iter_mut() {
                    self.stmt(s, &mut ctx)?;
                }
                if body.iter().any(|s| matches!(s.kind, StmtKind::Const(_))) {
                    return Err(CompileError::semantic(
                        &c.file,
                        c.line,
                        "const declarations are not supported in constructors",
                    ));
                }
            }
            for m in &mut c.methods {
                let Some(body) = &mut m.body else { continue };
                let mut scope = HashMap::new();
                for p in &m.params {
                    scope.insert(p.name.clone(), p.ty.clone());
                }
                let mut ctx = Ctx {
                    file: &c.file,
                    class: &c.name,
                    method: Some(&m.name),
                    is_static: m.is_static,
                    scopes: vec![scope],
                    method_consts: HashMap::new(),
                };
                for s in body.iter_mut() {
                    self.stmt(s, &mut ctx)?;
                }
                hoist_consts(body, &mut m.consts);
            }
        }
        Ok(())
    }

    fn stmt(&mut self, s: &mut Stmt, ctx: &mut Ctx) -> Result<(), CompileError> {
        let line = s.line;
        match &mut s.kind {
            StmtKind::Block(body) => {
                ctx.scopes.push(HashMap::new());
                for s in body {
                    self.stmt(s, ctx)?;
                }
                ctx.scopes.pop();
            }
            StmtKind::Expr(e) => {
                self.expr(e, ctx)?;
            }
            StmtKind::Var(decl) => {
                self.fix_type(&mut decl.ty, ctx.file, line)?;
                if decl.init.is_none() {
                    self.check_storage(&decl.ty, ctx.file, line)?;
                }
                if let Some(init) = &mut decl.init {
                    let ty = self.expr(init, ctx)?;
                    if !self.compat(&ty, &decl.ty) {
                        return Err(
                            ctx.err(line, format!("type mismatch initializing {}", decl.name))
                        );
                    }
                }
                ctx.declare(&decl.name, decl.ty.clone());
            }
            StmtKind::Const(decl) => {
                self.fix_type(&mut decl.ty, ctx.file, line)?;
                self.expr(&mut decl.value, ctx)?;
                if const_val(&decl.value).is_none() && !is_const_init(&decl.value) {
                    return Err(ctx.err(
                        line,
                        format!("constant expression expected for {}", decl.name),
                    ));
                }
                ctx.method_consts
                    .insert(decl.name.clone(), decl.ty.clone());
            }
            StmtKind::Assign { target, op, value } => {
                let tty = self.expr(target, ctx)?;
                if !is_lvalue(target) {
                    return Err(ctx.err(line, "left side of assignment is not assignable"));
                }
                let vty = self.expr(value, ctx)?;
                if *op == AssignOp::Set {
                    if !self.compat(&vty, &tty) {
                        return Err(ctx.err(line, "type mismatch in assignment"));
                    }
                } else if !tty.is_numeric() {
                    return Err(ctx.err(line, "compound assignment needs a numeric target"));
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.want_bool(cond, ctx)?;
                self.stmt(then_branch, ctx)?;
                if let Some(e) = else_branch {
                    self.stmt(e, ctx)?;
                }
            }
            StmtKind::While { cond, body } => {
                self.want_bool(cond, ctx)?;
                self.stmt(body, ctx)?;
            }
            StmtKind::DoWhile { body, cond } => {
                self.stmt(body, ctx)?;
                self.want_bool(cond, ctx)?;
            }
            StmtKind::For {
                init,
                cond,
                advance,
                body,
            } => {
                ctx.scopes.push(HashMap::new());
                if let Some(init) = init {
                    self.stmt(init, ctx)?;
                }
                if let Some(cond) = cond {
                    self.want_bool(cond, ctx)?;
                }
                if let Some(advance) = advance {
                    self.stmt(advance, ctx)?;
                }
                self.stmt(body, ctx)?;
                ctx.scopes.pop();
            }
            StmtKind::Foreach {
                key,
                value,
                collection,
                body,
            } => {
                let cty = self.expr(collection, ctx)?;
                self.fix_type(&mut key.ty, ctx.file, line)?;
                if let Some(v) = value.as_mut() {
                    self.fix_type(&mut v.ty, ctx.file, line)?;
                }
                ctx.scopes.push(HashMap::new());
                match (&cty, value.as_ref()) {
                    (Type::Dict { key: k, value: v, .. }, Some(val)) => {
                        if !self.compat(k, &key.ty) || !self.compat(v, &val.ty) {
                            return Err(ctx.err(line, "foreach variable types do not match"));
                        }
                        ctx.declare(&key.name, key.ty.clone());
                        let val = val.clone();
                        ctx.declare(&val.name, val.ty);
                    }
                    (Type::Dict { .. }, None) => {
                        return Err(
                            ctx.err(line, "foreach over a dictionary needs two variables")
                        );
                    }
                    (_, Some(_)) => {
                        return Err(
                            ctx.err(line, "two foreach variables are only valid on dictionaries")
                        );
                    }
                    (_, None) => match cty.elem() {
                        Some(elem) => {
                            if !self.compat(elem, &key.ty) {
                                return Err(ctx.err(line, "foreach variable type does not match"));
                            }
                            ctx.declare(&key.name, key.ty.clone());
                        }
                        None => return Err(ctx.err(line, "foreach needs a collection")),
                    },
                }
                self.stmt(body, ctx)?;
                ctx.scopes.pop();
            }
            StmtKind::Switch {
                value,
                cases,
                default,
            } => {
                let vty = self.expr(value, ctx)?;
                if !vty.is_integer() && vty != Type::Str {
                    return Err(ctx.err(line, "switch needs an integer or string value"));
                }
                for case in cases {
                    for v in &mut case.values {
                        self.expr(v, ctx)?;
                    }
                    ctx.scopes.push(HashMap::new());
                    for s in &mut case.body {
                        self.stmt(s, ctx)?;
                    }
                    ctx.scopes.pop();
                }
                if let Some(body) = default {
                    ctx.scopes.push(HashMap::new());
                    for s in body {
                        self.stmt(s, ctx)?;
                    }
                    ctx.scopes.pop();
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    self.expr(e, ctx)?;
                }
            }
            StmtKind::Throw(e) => {
                let ty = self.expr(e, ctx)?;
                if ty != Type::Str {
                    return Err(ctx.err(line, "throw needs a string message"));
                }
            }
            StmtKind::Lock { body } => {
                self.stmt(body, ctx)?;
            }
            StmtKind::Assert { cond, msg } => {
                self.want_bool(cond, ctx)?;
                if let Some(m) = msg {
                    self.expr(m, ctx)?;
                }
            }
        }
        Ok(())
    }

    fn want_bool(&mut self, e: &mut Expr, ctx: &mut Ctx) -> Result<(), CompileError> {
        let ty = self.expr(e, ctx)?;
        if ty != Type::Bool {
            return Err(ctx.err(e.line, "condition must be a bool"));
        }
        Ok(())
    }

    fn expr(&mut self, e: &mut Expr, ctx: &mut Ctx) -> Result<Type, CompileError> {
        let line = e.line;
        let kind = std::mem::replace(&mut e.kind, ExprKind::Null);
        let (kind, ty) = self.expr_kind(kind, e.ty.take(), line, ctx)?;
        e.kind = kind;
        e.ty = Some(ty.clone());
        Ok(ty)
    }

    fn expr_kind(
        &mut self,
        kind: ExprKind,
        preset: Option<Type>,
        line: u32,
        ctx: &mut Ctx,
    ) -> Result<(ExprKind, Type), CompileError> {
        match kind {
            ExprKind::Int(v) => {
                let ty = preset.unwrap_or(Type::Range { lo: v, hi: v });
                Ok((ExprKind::Int(v), ty))
            }
            ExprKind::Float(v) => Ok((ExprKind::Float(v), preset.unwrap_or(Type::F64))),
            ExprKind::Str(s) => Ok((ExprKind::Str(s), Type::Str)),
            ExprKind::Char(c) => {
                let v = c as i64;
                Ok((ExprKind::Char(c), Type::Range { lo: v, hi: v }))
            }
            ExprKind::Bool(b) => Ok((ExprKind::Bool(b), Type::Bool)),
            ExprKind::Null => Ok((ExprKind::Null, Type::Null)),
            ExprKind::Interp(mut parts) => {
                for part in &mut parts {
                    if let Some(arg) = &mut part.arg {
                        self.expr(arg, ctx)?;
                    }
                }
                Ok((ExprKind::Interp(parts), Type::Str))
            }
            ExprKind::Resource(name) => {
                if !self.resource_names.contains(&name) {
                    self.resource_names.push(name.clone());
                }
                Ok((ExprKind::Resource(name), Type::Slice(Box::new(Type::U8))))
            }
            ExprKind::Name(name) => self.resolve_name(name, line, ctx),
            ExprKind::Member { mut target, name } => {
                if let ExprKind::Name(tn) = &target.kind {
                    if tn == "RegexOptions" {
                        let bits = regex_option_bits(&name)
                            .ok_or_else(|| ctx.err(line, format!("unknown RegexOptions.{name}")))?;
                        return Ok((ExprKind::Int(bits), Type::I32));
                    }
                    if let Some(constants) = self.enums.get(tn) {
                        if !constants.contains_key(&name) {
                            return Err(ctx.err(line, format!("unknown constant {tn}.{name}")));
                        }
                        return Ok((
                            ExprKind::EnumRef {
                                enum_name: tn.clone(),
                                constant: name,
                            },
                            Type::Enum(tn.clone()),
                        ));
                    }
                    if self.classes.contains_key(tn) {
                        let (defining, info) = self
                            .find_const(tn, &name)
                            .ok_or_else(|| ctx.err(line, format!("unknown constant {tn}.{name}")))?;
                        return Ok(self.const_ref(defining, None, name, &info));
                    }
                }
                let tty = self.expr(&mut target, ctx)?;
                let ty = self
                    .prop_type(&tty, &name)
                    .ok_or_else(|| ctx.err(line, format!("unknown member {name}")))?;
                Ok((ExprKind::Prop { target, name }, ty))
            }
            ExprKind::Binary { op, mut lhs, mut rhs } => {
                let lt = self.expr(&mut lhs, ctx)?;
                let rt = self.expr(&mut rhs, ctx)?;
                let ty = self.binary_type(op, &lt, &rt, line, ctx)?;
                // fold untyped integer literals so ranges stay tight
                if let (ExprKind::Int(a), ExprKind::Int(b)) = (&lhs.kind, &rhs.kind) {
                    if matches!(lt, Type::Range { .. }) && matches!(rt, Type::Range { .. }) {
                        if let Some(v) = fold_int(op, *a, *b) {
                            return Ok((ExprKind::Int(v), Type::Range { lo: v, hi: v }));
                        }
                    }
                }
                Ok((ExprKind::Binary { op, lhs, rhs }, ty))
            }
            ExprKind::Unary { op, mut operand } => {
                let oty = self.expr(&mut operand, ctx)?;
                let ty = match op {
                    UnOp::Not => {
                        if oty != Type::Bool {
                            return Err(ctx.err(line, "! needs a bool operand"));
                        }
                        Type::Bool
                    }
                    UnOp::Neg => {
                        if !oty.is_numeric() {
                            return Err(ctx.err(line, "negation needs a numeric operand"));
                        }
                        match (&operand.kind, &oty) {
                            (ExprKind::Int(v), Type::Range { .. }) => {
                                let v = -*v;
                                return Ok((ExprKind::Int(v), Type::Range { lo: v, hi: v }));
                            }
                            (ExprKind::Float(v), _) => {
                                let v = -*v;
                                return Ok((ExprKind::Float(v), oty));
                            }
                            (_, Type::Range { lo, hi }) => Type::Range { lo: -hi, hi: -lo },
                            _ => oty,
                        }
                    }
                    UnOp::BitNot => {
                        if !oty.is_integer() {
                            return Err(ctx.err(line, "~ needs an integer operand"));
                        }
                        Type::I32
                    }
                    UnOp::PreInc | UnOp::PreDec => {
                        if !oty.is_numeric() {
                            return Err(ctx.err(line, "++/-- needs a numeric operand"));
                        }
                        oty
                    }
                };
                Ok((ExprKind::Unary { op, operand }, ty))
            }
            ExprKind::Postfix { op, mut operand } => {
                let ty = self.expr(&mut operand, ctx)?;
                if !ty.is_numeric() {
                    return Err(ctx.err(line, "++/-- needs a numeric operand"));
                }
                Ok((ExprKind::Postfix { op, operand }, ty))
            }
            ExprKind::Cond {
                mut cond,
                mut on_true,
                mut on_false,
            } => {
                let cty = self.expr(&mut cond, ctx)?;
                if cty != Type::Bool {
                    return Err(ctx.err(line, "condition must be a bool"));
                }
                let tt = self.expr(&mut on_true, ctx)?;
                let ft = self.expr(&mut on_false, ctx)?;
                let ty = if tt == ft {
                    tt
                } else if tt.is_numeric() && ft.is_numeric() {
                    self.wider(&tt, &ft)
                } else if ft == Type::Null {
                    tt
                } else if tt == Type::Null {
                    ft
                } else {
                    tt
                };
                Ok((
                    ExprKind::Cond {
                        cond,
                        on_true,
                        on_false,
                    },
                    ty,
                ))
            }
            ExprKind::Call { callee, mut args } => {
                let (callee, ret) = self.resolve_call(callee, &mut args, line, ctx)?;
                Ok((ExprKind::Call { callee, args }, ret))
            }
            ExprKind::Index {
                mut target,
                mut index,
            } => {
                let tty = self.expr(&mut target, ctx)?;
                let ity = self.expr(&mut index, ctx)?;
                let ty = match &tty {
                    Type::List(t) | Type::Stack(t) | Type::Slice(t) => {
                        if !ity.is_integer() {
                            return Err(ctx.err(line, "index must be an integer"));
                        }
                        (**t).clone()
                    }
                    Type::Array { elem, .. } => {
                        if !ity.is_integer() {
                            return Err(ctx.err(line, "index must be an integer"));
                        }
                        (**elem).clone()
                    }
                    Type::Dict { key, value, .. } => {
                        if !self.compat(&ity, key) {
                            return Err(ctx.err(line, "wrong dictionary key type"));
                        }
                        (**value).clone()
                    }
                    other => {
                        return Err(ctx.err(line, format!("cannot index {other:?}")));
                    }
                };
                Ok((ExprKind::Index { target, index }, ty))
            }
            ExprKind::ArrayLit(mut elems) => {
                let mut elem_ty = Type::Null;
                for el in &mut elems {
                    elem_ty = self.expr(el, ctx)?;
                }
                Ok((ExprKind::ArrayLit(elems), Type::Slice(Box::new(elem_ty))))
            }
            // already resolved forms do not occur: resolution runs once
            other => Ok((other, preset.unwrap_or(Type::Void))),
        }
    }

    fn resolve_name(
        &mut self,
        name: String,
        line: u32,
        ctx: &mut Ctx,
    ) -> Result<(ExprKind, Type), CompileError> {
        if let Some(ty) = ctx.lookup_local(&name) {
            return Ok((ExprKind::Local(name), ty.clone()));
        }
        if let Some(ty) = ctx.method_consts.get(&name) {
            return Ok((
                ExprKind::ConstRef {
                    class: ctx.class.to_string(),
                    method: ctx.method.map(str::to_string),
                    name,
                },
                ty.clone(),
            ));
        }
        if let Some(ty) = self.find_field(ctx.class, &name) {
            if ctx.is_static {
                return Err(ctx.err(
                    line,
                    format!("cannot use field {name} in a static method"),
                ));
            }
            return Ok((ExprKind::FieldRef(name), ty));
        }
        if let Some((defining, info)) = self.find_const(ctx.class, &name) {
            return Ok(self.const_ref(defining, None, name, &info));
        }
        Err(ctx.err(line, format!("unknown symbol {name}")))
    }

    /// Reference to a class-scoped constant: private scalars are inlined,
    /// everything else becomes an attribute reference.
    fn const_ref(
        &self,
        class: String,
        method: Option<String>,
        name: String,
        info: &ConstInfo,
    ) -> (ExprKind, Type) {
        if !info.is_public {
            if let Some(value) = &info.value {
                let kind = match value {
                    ConstVal::Int(v) => ExprKind::Int(*v),
                    ConstVal::Float(v) => ExprKind::Float(*v),
                    ConstVal::Str(s) => ExprKind::Str(s.clone()),
                    ConstVal::Bool(b) => ExprKind::Bool(*b),
                };
                return (kind, info.ty.clone());
            }
        }
        (
            ExprKind::ConstRef {
                class,
                method,
                name,
            },
            info.ty.clone(),
        )
    }

    fn prop_type(&self, ty: &Type, name: &str) -> Option<Type> {
        match (ty, name) {
            (Type::Str, "Length") => Some(Type::I32),
            (Type::List(_) | Type::Stack(_), "Count") => Some(Type::I32),
            (Type::Set(_) | Type::Dict { .. }, "Count") => Some(Type::I32),
            (Type::Array { .. } | Type::Slice(_), "Length") => Some(Type::I32),
            (Type::Match, "Start" | "End" | "Length") => Some(Type::I32),
            (Type::Match, "Value") => Some(Type::Str),
            (Type::Class(c) | Type::ClassPtr(c), _) => self.find_field(c, name),
            _ => None,
        }
    }

    fn binary_type(
        &self,
        op: BinOp,
        lt: &Type,
        rt: &Type,
        line: u32,
        ctx: &Ctx,
    ) -> Result<Type, CompileError> {
        use crate::emitter::{type_code, TypeCode};
        match op {
            BinOp::And | BinOp::Or => {
                if *lt != Type::Bool || *rt != Type::Bool {
                    return Err(ctx.err(line, "&& and || need bool operands"));
                }
                Ok(Type::Bool)
            }
            BinOp::Eq | BinOp::NotEq => {
                let ok = (lt.is_numeric() && rt.is_numeric())
                    || lt == rt
                    || *lt == Type::Null
                    || *rt == Type::Null
                    || self.compat(lt, rt)
                    || self.compat(rt, lt);
                if !ok {
                    return Err(ctx.err(line, "cannot compare these operands"));
                }
                Ok(Type::Bool)
            }
            BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq => {
                let ok = (lt.is_numeric() && rt.is_numeric()) || (*lt == Type::Str && *rt == Type::Str);
                if !ok {
                    return Err(ctx.err(line, "cannot order these operands"));
                }
                Ok(Type::Bool)
            }
            BinOp::Add if *lt == Type::Str && *rt == Type::Str => Ok(Type::Str),
            _ => {
                if !lt.is_numeric() || !rt.is_numeric() {
                    return Err(ctx.err(line, "arithmetic needs numeric operands"));
                }
                if lt.is_float() || rt.is_float() {
                    if matches!(op, BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) {
                        return Err(ctx.err(line, "bitwise operations need integer operands"));
                    }
                    if *lt == Type::F64 || *rt == Type::F64 {
                        return Ok(Type::F64);
                    }
                    return Ok(Type::F32);
                }
                // integer result follows the left operand, promoted
                let lc = type_code(lt, true);
                let rc = type_code(rt, true);
                if lc == Some(TypeCode::Int64) || rc == Some(TypeCode::Int64) {
                    Ok(Type::I64)
                } else if lc == Some(TypeCode::UInt32) {
                    Ok(Type::U32)
                } else {
                    Ok(Type::I32)
                }
            }
        }
    }

    fn wider(&self, a: &Type, b: &Type) -> Type {
        use crate::emitter::{type_code, TypeCode};
        if *a == Type::F64 || *b == Type::F64 {
            return Type::F64;
        }
        if *a == Type::F32 || *b == Type::F32 {
            return Type::F32;
        }
        let ac = type_code(a, true);
        let bc = type_code(b, true);
        if ac == Some(TypeCode::Int64) || bc == Some(TypeCode::Int64) {
            Type::I64
        } else if ac == Some(TypeCode::UInt32) || bc == Some(TypeCode::UInt32) {
            Type::U32
        } else {
            Type::I32
        }
    }

    fn resolve_call(
        &mut self,
        callee: Callee,
        args: &mut [Expr],
        line: u32,
        ctx: &mut Ctx,
    ) -> Result<(Callee, Type), CompileError> {
        let Callee::Unresolved { target, name } = callee else {
            return Err(ctx.err(line, "internal: callee resolved twice"));
        };
        for arg in args.iter_mut() {
            self.expr(arg, ctx)?;
        }
        match target {
            None => {
                let (defining, sig) = self
                    .find_method(ctx.class, &name)
                    .ok_or_else(|| ctx.err(line, format!("unknown method {name}")))?;
                self.check_args(&sig, args, &name, line, ctx)?;
                if sig.is_static {
                    Ok((
                        Callee::Static {
                            class: defining,
                            name,
                        },
                        sig.ret,
                    ))
                } else {
                    if ctx.is_static {
                        return Err(ctx.err(
                            line,
                            format!("cannot call instance method {name} from a static method"),
                        ));
                    }
                    Ok((Callee::This(name), sig.ret))
                }
            }
            Some(target) => self.resolve_target_call(*target, name, args, line, ctx),
        }
    }

    fn resolve_target_call(
        &mut self,
        mut target: Expr,
        name: String,
        args: &mut [Expr],
        line: u32,
        ctx: &mut Ctx,
    ) -> Result<(Callee, Type), CompileError> {
        if let ExprKind::Name(tn) = &target.kind {
            match tn.as_str() {
                "base" => {
                    let base = self
                        .classes
                        .get(ctx.class)
                        .and_then(|i| i.base.clone())
                        .ok_or_else(|| ctx.err(line, format!("{} has no base class", ctx.class)))?;
                    let (_, sig) = self
                        .find_method(&base, &name)
                        .ok_or_else(|| ctx.err(line, format!("unknown method base.{name}")))?;
                    self.check_args(&sig, args, &name, line, ctx)?;
                    if ctx.is_static {
                        return Err(ctx.err(line, "cannot call base methods from a static method"));
                    }
                    return Ok((Callee::Base { class: base, name }, sig.ret));
                }
                "Regex" => {
                    let ret = match (name.as_str(), args.len()) {
                        ("IsMatch", 2 | 3) => Type::Bool,
                        ("Compile", 1 | 2) => Type::Regex,
                        ("Escape", 1) => Type::Str,
                        _ => return Err(ctx.err(line, format!("unknown method Regex.{name}"))),
                    };
                    return Ok((
                        Callee::Builtin {
                            class: BuiltinClass::Regex,
                            name,
                        },
                        ret,
                    ));
                }
                "UTF8" => {
                    let ret = match (name.as_str(), args.len()) {
                        ("GetByteCount", 1) => Type::I32,
                        ("GetBytes", 3) => Type::Void,
                        ("GetString", 3) => Type::Str,
                        _ => return Err(ctx.err(line, format!("unknown method UTF8.{name}"))),
                    };
                    return Ok((
                        Callee::Builtin {
                            class: BuiltinClass::Utf8,
                            name,
                        },
                        ret,
                    ));
                }
                "Console" => {
                    if !matches!((name.as_str(), args.len()), ("Write" | "WriteLine", 0 | 1)) {
                        return Err(ctx.err(line, format!("unknown method Console.{name}")));
                    }
                    return Ok((
                        Callee::Builtin {
                            class: BuiltinClass::Console,
                            name,
                        },
                        Type::Void,
                    ));
                }
                "Environment" => {
                    if name != "GetEnvironmentVariable" || args.len() != 1 {
                        return Err(
                            ctx.err(line, format!("unknown method Environment.{name}"))
                        );
                    }
                    return Ok((
                        Callee::Builtin {
                            class: BuiltinClass::Environment,
                            name,
                        },
                        Type::Str,
                    ));
                }
                class if self.classes.contains_key(class) => {
                    let (defining, sig) = self
                        .find_method(class, &name)
                        .ok_or_else(|| ctx.err(line, format!("unknown method {class}.{name}")))?;
                    if !sig.is_static {
                        return Err(ctx.err(line, format!("{class}.{name} is not static")));
                    }
                    self.check_args(&sig, args, &name, line, ctx)?;
                    return Ok((
                        Callee::Static {
                            class: defining,
                            name,
                        },
                        sig.ret,
                    ));
                }
                _ => {}
            }
        } else if let ExprKind::Member { target: t2, name: prop } = &target.kind {
            // `Console.Error.WriteLine(...)`
            if matches!(&t2.kind, ExprKind::Name(n) if n == "Console") && prop == "Error" {
                if !matches!((name.as_str(), args.len()), ("Write" | "WriteLine", 0 | 1)) {
                    return Err(ctx.err(line, format!("unknown method Console.Error.{name}")));
                }
                return Ok((
                    Callee::Builtin {
                        class: BuiltinClass::ConsoleError,
                        name,
                    },
                    Type::Void,
                ));
            }
        }
        let tty = self.expr(&mut target, ctx)?;
        if let Some(class) = tty.class_name() {
            let (_, sig) = self
                .find_method(class, &name)
                .ok_or_else(|| ctx.err(line, format!("unknown method {class}.{name}")))?;
            if sig.is_static {
                return Err(ctx.err(line, format!("{class}.{name} is static")));
            }
            self.check_args(&sig, args, &name, line, ctx)?;
            return Ok((
                Callee::Method {
                    target: Box::new(target),
                    name,
                },
                sig.ret,
            ));
        }
        let ret = builtin_method(&tty, &name, args.len())
            .ok_or_else(|| ctx.err(line, format!("unknown method {name} on {tty:?}")))?;
        Ok((
            Callee::Method {
                target: Box::new(target),
                name,
            },
            ret,
        ))
    }

    fn check_args(
        &self,
        sig: &MethodSig,
        args: &[Expr],
        name: &str,
        line: u32,
        ctx: &Ctx,
    ) -> Result<(), CompileError> {
        if args.len() != sig.params.len() {
            return Err(ctx.err(
                line,
                format!(
                    "{} expects {} arguments, got {}",
                    name,
                    sig.params.len(),
                    args.len()
                ),
            ));
        }
        for (arg, param) in args.iter().zip(&sig.params) {
            let aty = arg.ty.clone().unwrap_or(Type::Void);
            if !self.compat(&aty, param) {
                return Err(ctx.err(line, format!("argument type mismatch calling {name}")));
            }
        }
        Ok(())
    }

    /// Loose assignability: numeric widths convert freely, storage decays to
    /// views, derived classes convert to base references.
    fn compat(&self, from: &Type, to: &Type) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (Type::Null, Type::ClassPtr(_) | Type::Class(_) | Type::Str | Type::Regex | Type::Match) => true,
            (Type::Class(c) | Type::ClassPtr(c), Type::ClassPtr(d)) => self.derives_from(c, d),
            (Type::Class(c), Type::Class(d)) => self.derives_from(c, d),
            (Type::Array { elem, .. }, Type::Slice(t)) => elem == t,
            (Type::Slice(a), Type::Slice(b)) => a == b,
            _ => false,
        }
    }
}

fn is_lvalue(e: &Expr) -> bool {
    matches!(
        e.kind,
        ExprKind::Local(_) | ExprKind::FieldRef(_) | ExprKind::Prop { .. } | ExprKind::Index { .. }
    )
}

/// Non-scalar but still emittable constant initializers: aggregates, enum
/// constants and references to other emitted constants.
fn is_const_init(e: &Expr) -> bool {
    matches!(
        e.kind,
        ExprKind::ArrayLit(_) | ExprKind::EnumRef { .. } | ExprKind::ConstRef { .. }
    )
}

fn const_val(e: &Expr) -> Option<ConstVal> {
    match &e.kind {
        ExprKind::Int(v) => Some(ConstVal::Int(*v)),
        ExprKind::Char(c) => Some(ConstVal::Int(*c as i64)),
        ExprKind::Float(v) => Some(ConstVal::Float(*v)),
        ExprKind::Str(s) => Some(ConstVal::Str(s.clone())),
        ExprKind::Bool(b) => Some(ConstVal::Bool(*b)),
        _ => None,
    }
}

fn fold_int(op: BinOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0 {
                return None;
            }
            a % b
        }
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr => a.wrapping_shr(b as u32),
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        _ => return None,
    })
}

fn regex_option_bits(name: &str) -> Option<i64> {
    Some(match name {
        "None" => 0,
        "IgnoreCase" => 1,
        "Multiline" => 2,
        "Singleline" => 16,
        _ => return None,
    })
}

/// Return type of a builtin container/regex/match method, or None if the
/// receiver has no such method.
fn builtin_method(ty: &Type, name: &str, argc: usize) -> Option<Type> {
    match (ty, name, argc) {
        (Type::List(_), "Add", 1) => Some(Type::Void),
        (Type::List(_), "Insert", 2) => Some(Type::Void),
        (Type::List(_), "Remove", 1) => Some(Type::Void),
        (Type::List(_), "RemoveRange", 2) => Some(Type::Void),
        (Type::List(t), "Contains", 1) => {
            let _ = t;
            Some(Type::Bool)
        }
        (Type::List(_), "Clear", 0) => Some(Type::Void),
        (Type::List(_), "SortAll", 0) => Some(Type::Void),
        (Type::List(_), "SortPart", 2) => Some(Type::Void),
        (Type::List(_), "CopyTo", 4) => Some(Type::Void),
        (Type::Stack(_), "Push", 1) => Some(Type::Void),
        (Type::Stack(t), "Pop", 0) => Some((**t).clone()),
        (Type::Stack(t), "Peek", 0) => Some((**t).clone()),
        (Type::Stack(_), "Clear", 0) => Some(Type::Void),
        (Type::Set(_), "Add", 1) => Some(Type::Void),
        (Type::Set(_), "Contains", 1) => Some(Type::Bool),
        (Type::Set(_), "Remove", 1) => Some(Type::Void),
        (Type::Set(_), "Clear", 0) => Some(Type::Void),
        (Type::Dict { .. }, "ContainsKey", 1) => Some(Type::Bool),
        (Type::Dict { .. }, "Remove", 1) => Some(Type::Void),
        (Type::Dict { .. }, "Clear", 0) => Some(Type::Void),
        (Type::Array { .. } | Type::Slice(_), "Fill", 1 | 3) => Some(Type::Void),
        (Type::Array { .. } | Type::Slice(_), "CopyTo", 4) => Some(Type::Void),
        (Type::Array { .. } | Type::Slice(_), "SortAll", 0) => Some(Type::Void),
        (Type::Array { .. } | Type::Slice(_), "SortPart", 2) => Some(Type::Void),
        (Type::Regex, "IsMatch", 1) => Some(Type::Bool),
        (Type::Match, "Find", 2 | 3) => Some(Type::Bool),
        (Type::Match, "GetCapture", 1) => Some(Type::Str),
        _ => None,
    }
}

/// Move method-local const declarations out of the statement tree; they are
/// emitted as class attributes.
fn hoist_consts(stmts: &mut Vec<Stmt>, out: &mut Vec<ConstDecl>) {
    stmts.retain_mut(|s| {
        if matches!(s.kind, StmtKind::Const(_)) {
            if let StmtKind::Const(decl) = std::mem::replace(&mut s.kind, StmtKind::Break) {
                out.push(decl);
            }
            false
        } else {
            hoist_in_stmt(s, out);
            true
        }
    });
}

fn hoist_in_stmt(s: &mut Stmt, out: &mut Vec<ConstDecl>) {
    match &mut s.kind {
        StmtKind::Const(_) => {
            if let StmtKind::Const(decl) = std::mem::replace(&mut s.kind, StmtKind::Block(Vec::new()))
            {
                out.push(decl);
            }
        }
        StmtKind::Block(body) => hoist_consts(body, out),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            hoist_in_stmt(then_branch, out);
            if let Some(e) = else_branch {
                hoist_in_stmt(e, out);
            }
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::Foreach { body, .. }
        | StmtKind::Lock { body } => hoist_in_stmt(body, out),
        StmtKind::Switch { cases, default, .. } => {
            for case in cases {
                hoist_consts(&mut case.body, out);
            }
            if let Some(body) = default {
                hoist_consts(body, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn resolve_src(src: &str) -> Result<Program, CompileError> {
        let decls = parser::parse("test.mica", src, &[], false)?;
        let mut program = Program {
            decls,
            resources: Default::default(),
        };
        resolve(&mut program)?;
        Ok(program)
    }

    fn method_body(program: &Program, class: &str, method: &str) -> Vec<Stmt> {
        for decl in &program.decls {
            if let Decl::Class(c) = decl {
                if c.name == class {
                    for m in &c.methods {
                        if m.name == method {
                            return m.body.clone().unwrap();
                        }
                    }
                }
            }
        }
        panic!("no method {class}.{method}");
    }

    #[test]
    fn literals_get_range_types() {
        let p = resolve_src("class T { void M() { int x = 200; x = x; } }").unwrap();
        let body = method_body(&p, "T", "M");
        let StmtKind::Var(decl) = &body[0].kind else { panic!() };
        assert_eq!(
            decl.init.as_ref().unwrap().ty,
            Some(Type::Range { lo: 200, hi: 200 })
        );
    }

    #[test]
    fn uint_arithmetic_follows_left_operand() {
        let p = resolve_src("class T { void M(uint a) { uint b = a * 2; assert b >= a; } }")
            .unwrap();
        let body = method_body(&p, "T", "M");
        let StmtKind::Var(decl) = &body[0].kind else { panic!() };
        assert_eq!(decl.init.as_ref().unwrap().ty, Some(Type::U32));
    }

    #[test]
    fn folds_untyped_literal_arithmetic() {
        let p = resolve_src("class T { void M() { int x = 6 * 7; x = x; } }").unwrap();
        let body = method_body(&p, "T", "M");
        let StmtKind::Var(decl) = &body[0].kind else { panic!() };
        assert!(matches!(decl.init.as_ref().unwrap().kind, ExprKind::Int(42)));
    }

    #[test]
    fn rewrites_names_to_resolved_forms() {
        let p = resolve_src(
            "class T { int count; void M(int x) { count = x; this_is_unused(); } \
             void this_is_unused() { } }",
        )
        .unwrap();
        let body = method_body(&p, "T", "M");
        let StmtKind::Assign { target, value, .. } = &body[0].kind else {
            panic!()
        };
        assert!(matches!(target.kind, ExprKind::FieldRef(_)));
        assert!(matches!(value.kind, ExprKind::Local(_)));
        let StmtKind::Expr(call) = &body[1].kind else { panic!() };
        let ExprKind::Call { callee: Callee::This(name), .. } = &call.kind else {
            panic!("expected instance call: {:?}", call.kind);
        };
        assert_eq!(name, "this_is_unused");
    }

    #[test]
    fn inlines_private_scalar_consts() {
        let p = resolve_src("class T { const int Max = 10; int M() { return Max * 2; } }")
            .unwrap();
        let body = method_body(&p, "T", "M");
        let StmtKind::Return(Some(e)) = &body[0].kind else { panic!() };
        let ExprKind::Binary { lhs, .. } = &e.kind else { panic!() };
        assert!(matches!(lhs.kind, ExprKind::Int(10)));
    }

    #[test]
    fn public_consts_stay_references() {
        let p = resolve_src(
            "class T { public const int Max = 10; int M() { return Max; } }",
        )
        .unwrap();
        let body = method_body(&p, "T", "M");
        let StmtKind::Return(Some(e)) = &body[0].kind else { panic!() };
        assert!(matches!(&e.kind, ExprKind::ConstRef { method: None, .. }));
    }

    #[test]
    fn hoists_method_local_consts() {
        let p = resolve_src(
            "class T { int M() { const int Limit = 5; return Limit; } }",
        )
        .unwrap();
        for decl in &p.decls {
            if let Decl::Class(c) = decl {
                assert_eq!(c.methods[0].consts.len(), 1);
                assert_eq!(c.methods[0].consts[0].name, "Limit");
                let body = c.methods[0].body.as_ref().unwrap();
                assert_eq!(body.len(), 1, "const must be hoisted out of the body");
                let StmtKind::Return(Some(e)) = &body[0].kind else { panic!() };
                assert!(
                    matches!(&e.kind, ExprKind::ConstRef { method: Some(m), .. } if m == "M")
                );
            }
        }
    }

    #[test]
    fn folds_regex_options() {
        let p = resolve_src(
            "class T { bool M(string s) { return Regex.IsMatch(s, \"a+\", RegexOptions.IgnoreCase | RegexOptions.Multiline); } }",
        )
        .unwrap();
        let body = method_body(&p, "T", "M");
        let StmtKind::Return(Some(e)) = &body[0].kind else { panic!() };
        let ExprKind::Call { args, .. } = &e.kind else { panic!() };
        assert!(matches!(args[2].kind, ExprKind::Int(3)));
    }

    #[test]
    fn enum_members_resolve() {
        let p = resolve_src(
            "enum Season { Winter, Spring }\n\
             class T { Season M() { return Season.Spring; } }",
        )
        .unwrap();
        let body = method_body(&p, "T", "M");
        let StmtKind::Return(Some(e)) = &body[0].kind else { panic!() };
        assert!(matches!(&e.kind, ExprKind::EnumRef { constant, .. } if constant == "Spring"));
        assert_eq!(e.ty, Some(Type::Enum("Season".to_string())));
    }

    #[test]
    fn collects_resource_names() {
        let p = resolve_src("class T { void M() { byte[] b = resource(\"data/tile.bin\"); b.Fill(0); } }")
            .unwrap();
        assert!(p.resources.contains_key("data/tile.bin"));
    }

    #[test]
    fn rejects_unknown_symbols_with_position() {
        let err = resolve_src("class T { void M() {\n\t\tmissing = 1;\n\t} }").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("test.mica(2): ERROR:"), "{msg}");
        assert!(msg.contains("unknown symbol missing"), "{msg}");
    }

    #[test]
    fn rejects_dict_foreach_with_one_variable() {
        let err = resolve_src(
            "class T { void M(Dictionary<string, int> d) { foreach (string k in d) { } } }",
        )
        .unwrap_err();
        assert!(err.to_string().contains("two variables"));
    }

    #[test]
    fn rejects_abstract_storage() {
        let err = resolve_src(
            "abstract class Shape { public abstract int Area(); }\n\
             class T { void M() { Shape s; s.Area(); } }",
        )
        .unwrap_err();
        assert!(err.to_string().contains("abstract class Shape"), "{err}");
    }

    #[test]
    fn rejects_non_bool_conditions() {
        let err = resolve_src("class T { void M(int x) { if (x) { } } }").unwrap_err();
        assert!(err.to_string().contains("condition must be a bool"));
    }
}
