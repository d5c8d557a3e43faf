/// Parser module using nom for Mica syntax.
///
/// Works on `nom_locate` spans so every AST node records the source line it
/// started on; the resolver reuses those lines for its own diagnostics.
/// A small line-oriented preprocessor (`#if SYMBOL` / `#else` / `#endif`)
/// runs before parsing proper.
use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while};
use nom::character::complete::{alpha1, char, digit1, hex_digit1, multispace0, satisfy};
use nom::combinator::{not, opt, recognize, value};
use nom::multi::{many0, separated_list0};
use nom::sequence::{pair, preceded, terminated};
use nom::{IResult, InputTake};
use nom_locate::LocatedSpan;

use crate::ast::*;
use crate::error::CompileError;

type Span<'a> = LocatedSpan<&'a str>;
type PResult<'a, T> = IResult<Span<'a>, T>;

/// Strip `#if`/`#else`/`#endif` groups. Dropped lines are replaced by empty
/// ones so line numbers in later diagnostics stay accurate.
pub fn preprocess(path: &str, source: &str, defines: &[String]) -> Result<String, CompileError> {
    struct Level {
        parent_active: bool,
        active: bool,
        seen_else: bool,
    }
    let mut levels: Vec<Level> = Vec::new();
    let mut out = String::with_capacity(source.len());
    for (idx, line) in source.lines().enumerate() {
        let lineno = idx as u32 + 1;
        let trimmed = line.trim();
        if let Some(sym) = trimmed.strip_prefix("#if") {
            let sym = sym.trim();
            if sym.is_empty() {
                return Err(CompileError::parse(path, lineno, "#if without a symbol"));
            }
            let parent_active = levels.iter().all(|l| l.active);
            levels.push(Level {
                parent_active,
                active: parent_active && defines.iter().any(|d| d == sym),
                seen_else: false,
            });
            out.push('\n');
        } else if trimmed == "#else" {
            match levels.last_mut() {
                Some(level) if !level.seen_else => {
                    level.active = level.parent_active && !level.active;
                    level.seen_else = true;
                }
                _ => return Err(CompileError::parse(path, lineno, "unexpected #else")),
            }
            out.push('\n');
        } else if trimmed == "#endif" {
            if levels.pop().is_none() {
                return Err(CompileError::parse(path, lineno, "unexpected #endif"));
            }
            out.push('\n');
        } else if trimmed.starts_with('#') {
            return Err(CompileError::parse(
                path,
                lineno,
                format!("unknown directive: {trimmed}"),
            ));
        } else if levels.iter().all(|l| l.active) {
            out.push_str(line);
            out.push('\n');
        } else {
            out.push('\n');
        }
    }
    if !levels.is_empty() {
        return Err(CompileError::parse(path, 0, "missing #endif"));
    }
    Ok(out)
}

/// Parse one source file into top-level declarations.
pub fn parse(
    path: &str,
    source: &str,
    defines: &[String],
    reference: bool,
) -> Result<Vec<Decl>, CompileError> {
    let source = preprocess(path, source, defines)?;
    match program(Span::new(&source)) {
        Ok((rest, mut decls)) => {
            let (rest, _) = ws(rest).unwrap_or((rest, ()));
            if !rest.fragment().trim().is_empty() {
                // many0 stops at the declaration that failed; re-parse it to
                // recover the position of the actual error
                let failed = match item(rest) {
                    Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => e.input,
                    _ => rest,
                };
                let snippet: String = failed.fragment().chars().take(24).collect();
                return Err(CompileError::parse(
                    path,
                    failed.location_line(),
                    format!("syntax error near '{}'", snippet.trim_end()),
                ));
            }
            for decl in &mut decls {
                match decl {
                    Decl::Class(c) => {
                        c.file = path.to_string();
                        c.reference = reference;
                    }
                    Decl::Enum(e) => {
                        e.file = path.to_string();
                        e.reference = reference;
                    }
                }
            }
            Ok(decls)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let snippet: String = e.input.fragment().chars().take(24).collect();
            Err(CompileError::parse(
                path,
                e.input.location_line(),
                format!("syntax error near '{}'", snippet.trim_end()),
            ))
        }
        Err(nom::Err::Incomplete(_)) => Err(CompileError::parse(path, 0, "unexpected end of file")),
    }
}

fn program(input: Span) -> PResult<Vec<Decl>> {
    many0(item)(input)
}

fn item(input: Span) -> PResult<Decl> {
    let (input, _) = ws(input)?;
    let (input, doc) = doc_comment(input)?;
    let (input, _) = ws(input)?;
    let line = input.location_line();
    if let Ok((rest, decl)) = enum_decl(input, doc.clone(), line) {
        return Ok((rest, Decl::Enum(decl)));
    }
    let (rest, decl) = class_decl(input, doc, line)?;
    Ok((rest, Decl::Class(decl)))
}

/// Skip whitespace and comments, stopping in front of `///` documentation.
fn ws(mut input: Span) -> PResult<()> {
    loop {
        let (rest, _) = multispace0(input)?;
        input = rest;
        let frag = *input.fragment();
        if frag.starts_with("//") && !is_doc(frag) {
            let (rest, _) = take_while(|c| c != '\n')(input)?;
            input = rest;
        } else if frag.starts_with("/*") {
            let (rest, _) = take_until("*/")(input)?;
            let (rest, _) = tag("*/")(rest)?;
            input = rest;
        } else {
            return Ok((input, ()));
        }
    }
}

fn is_doc(frag: &str) -> bool {
    frag.starts_with("///") && !frag.starts_with("////")
}

fn advance(input: Span, count: usize) -> Span {
    input.take_split(count).0
}

fn perr(input: Span) -> nom::Err<nom::error::Error<Span>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

fn sym<'a>(c: char) -> impl FnMut(Span<'a>) -> PResult<'a, char> {
    move |input| char(c)(input)
}

fn identifier_raw<'a>(input: Span<'a>) -> PResult<'a, &'a str> {
    let (rest, span) = recognize(pair(
        alt((alpha1::<Span, _>, tag("_"))),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)?;
    Ok((rest, *span.fragment()))
}

fn identifier(input: Span) -> PResult<String> {
    let (rest, id) = identifier_raw(input)?;
    Ok((rest, id.to_string()))
}

/// Matches `kw` as a whole word.
fn keyword<'a>(kw: &'static str) -> impl FnMut(Span<'a>) -> PResult<'a, ()> {
    move |input| {
        let (rest, id) = identifier_raw(input)?;
        if id == kw {
            Ok((rest, ()))
        } else {
            Err(perr(input))
        }
    }
}

fn peeks_word(input: Span, kw: &str) -> bool {
    matches!(identifier_raw(input), Ok((_, id)) if id == kw)
}

/// Collect consecutive `///` lines into a doc comment.
fn doc_comment(input: Span) -> PResult<Option<CodeDoc>> {
    let mut lines: Vec<String> = Vec::new();
    let mut input = input;
    loop {
        let (rest, _) = multispace0(input)?;
        if is_doc(rest.fragment()) {
            let (rest, line) = take_while(|c| c != '\n')(rest)?;
            lines.push(line.fragment()[3..].trim().to_string());
            input = rest;
        } else {
            if lines.is_empty() {
                // leave leading whitespace for the caller's ws()
                return Ok((input, None));
            }
            input = rest;
            break;
        }
    }
    Ok((input, build_doc(&lines)))
}

fn build_doc(lines: &[String]) -> Option<CodeDoc> {
    let mut blocks: Vec<DocBlock> = Vec::new();
    let mut para: Vec<String> = Vec::new();
    let mut bullets: Vec<DocPara> = Vec::new();
    let flush =
        |blocks: &mut Vec<DocBlock>, para: &mut Vec<String>, bullets: &mut Vec<DocPara>| {
            if !para.is_empty() {
                blocks.push(DocBlock::Para(doc_runs(&para.join(" "))));
                para.clear();
            }
            if !bullets.is_empty() {
                blocks.push(DocBlock::Bullets(std::mem::take(bullets)));
            }
        };
    for line in lines {
        if line.is_empty() {
            flush(&mut blocks, &mut para, &mut bullets);
        } else if let Some(item) = line.strip_prefix("- ") {
            if !para.is_empty() {
                flush(&mut blocks, &mut para, &mut bullets);
            }
            bullets.push(doc_runs(item));
        } else {
            if !bullets.is_empty() {
                flush(&mut blocks, &mut para, &mut bullets);
            }
            para.push(line.clone());
        }
    }
    flush(&mut blocks, &mut para, &mut bullets);
    if blocks.is_empty() {
        return None;
    }
    let summary = match blocks.remove(0) {
        DocBlock::Para(p) => p,
        bullets @ DocBlock::Bullets(_) => {
            blocks.insert(0, bullets);
            DocPara { runs: Vec::new() }
        }
    };
    Some(CodeDoc {
        summary,
        details: blocks,
    })
}

/// Split a doc line into text and `` `code` `` runs.
fn doc_runs(text: &str) -> DocPara {
    let mut runs = Vec::new();
    for (i, seg) in text.split('`').enumerate() {
        if seg.is_empty() {
            continue;
        }
        if i % 2 == 0 {
            runs.push(DocRun::Text(seg.to_string()));
        } else {
            runs.push(DocRun::Code(seg.to_string()));
        }
    }
    DocPara { runs }
}

fn enum_decl(input: Span, doc: Option<CodeDoc>, line: u32) -> PResult<EnumDecl> {
    let (input, _) = keyword("enum")(input)?;
    let (input, _) = ws(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym('{')(input)?;
    let (input, raw) = separated_list0(preceded(ws, sym(',')), enum_constant)(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym('}')(input)?;
    let mut constants = Vec::with_capacity(raw.len());
    let mut next = 0;
    for (name, explicit) in raw {
        let value = explicit.unwrap_or(next);
        next = value + 1;
        constants.push(EnumConstant { name, value });
    }
    Ok((
        input,
        EnumDecl {
            name,
            doc,
            constants,
            reference: false,
            file: String::new(),
            line,
        },
    ))
}

fn enum_constant(input: Span) -> PResult<(String, Option<i64>)> {
    let (input, _) = ws(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, explicit) = opt(preceded(pair(sym('='), ws), int_const))(input)?;
    Ok((input, (name, explicit)))
}

fn class_decl(input: Span, doc: Option<CodeDoc>, line: u32) -> PResult<Class> {
    let (input, abstract_kw) = opt(terminated(keyword("abstract"), ws))(input)?;
    let (input, _) = keyword("class")(input)?;
    let (input, _) = ws(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, base) = opt(preceded(pair(sym(':'), ws), identifier))(input)?;
    let (input, _) = ws(input)?;
    let (mut input, _) = sym('{')(input)?;
    let mut class = Class {
        name,
        base,
        is_abstract: abstract_kw.is_some(),
        doc,
        consts: Vec::new(),
        fields: Vec::new(),
        ctor: None,
        methods: Vec::new(),
        reference: false,
        file: String::new(),
        line,
    };
    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = sym('}')(rest) {
            return Ok((rest, class));
        }
        let rest = member(rest, &mut class)?;
        input = rest;
    }
}

/// Parse one class member into `class`. Returns the remaining input.
fn member<'a>(input: Span<'a>, class: &mut Class) -> Result<Span<'a>, nom::Err<nom::error::Error<Span<'a>>>> {
    let (input, doc) = doc_comment(input)?;
    let (input, _) = ws(input)?;
    let line = input.location_line();
    let mut is_public = false;
    let mut is_static = false;
    let mut is_abstract = false;
    let mut input = input;
    loop {
        let (rest, _) = ws(input)?;
        match identifier_raw(rest) {
            Ok((rest2, word @ ("public" | "static" | "abstract" | "override" | "virtual"))) => {
                match word {
                    "public" => is_public = true,
                    "static" => is_static = true,
                    "abstract" => is_abstract = true,
                    _ => {}
                }
                input = rest2;
            }
            _ => {
                input = rest;
                break;
            }
        }
    }
    if peeks_word(input, "const") {
        let (rest, mut decl) = const_decl(input)?;
        decl.is_public = is_public;
        decl.doc = doc;
        decl.line = line;
        class.consts.push(decl);
        return Ok(rest);
    }
    // zero-argument constructor: `ClassName() { ... }`
    if let Ok((rest, id)) = identifier_raw(input) {
        if id == class.name {
            if let Ok((rest, _)) = preceded(ws, sym('('))(rest) {
                let (rest, _) = ws(rest)?;
                let (rest, _) = sym(')')(rest)?;
                let (rest, _) = ws(rest)?;
                let (rest, body) = block_body(rest)?;
                class.ctor = Some(body);
                return Ok(rest);
            }
        }
    }
    let (input, return_type) = type_parser(input)?;
    let (input, _) = ws(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    if let Ok((rest, _)) = sym('(')(input) {
        let (rest, params) = separated_list0(preceded(ws, sym(',')), param)(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, _) = sym(')')(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, body) = if is_abstract {
            let (rest, _) = sym(';')(rest)?;
            (rest, None)
        } else {
            let (rest, body) = block_body(rest)?;
            (rest, Some(body))
        };
        class.methods.push(Method {
            name,
            doc,
            is_public,
            is_static,
            is_abstract,
            return_type,
            params,
            consts: Vec::new(),
            body,
            line,
        });
        return Ok(rest);
    }
    let (input, init) = opt(preceded(pair(sym('='), ws), init_expr))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    class.fields.push(Field {
        name,
        ty: return_type,
        init,
        doc,
        line,
    });
    Ok(input)
}

fn param(input: Span) -> PResult<Param> {
    let (input, ty) = type_parser(input)?;
    let (input, _) = ws(input)?;
    let (input, name) = identifier(input)?;
    Ok((input, Param { name, ty }))
}

fn const_decl(input: Span) -> PResult<ConstDecl> {
    let (input, _) = ws(input)?;
    let line = input.location_line();
    let (input, _) = keyword("const")(input)?;
    let (input, ty) = type_parser(input)?;
    let (input, _) = ws(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym('=')(input)?;
    let (input, value) = init_expr(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    Ok((
        input,
        ConstDecl {
            name,
            ty,
            value,
            is_public: false,
            doc: None,
            line,
        },
    ))
}

/// Parse a type
fn type_parser(input: Span) -> PResult<Type> {
    let (input, _) = ws(input)?;
    let (input, base) = if let Ok((rest, _)) = sym('[')(input) {
        let (rest, _) = ws(rest)?;
        let (rest, lo) = int_const(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, _) = tag("..")(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, hi) = int_const(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, _) = sym(']')(rest)?;
        (rest, Type::Range { lo, hi })
    } else {
        named_type(input)?
    };
    // array suffixes: `[n]` fixed storage, `[]` slice
    let mut dims: Vec<Option<usize>> = Vec::new();
    let mut input = input;
    loop {
        let (rest, _) = ws(input)?;
        let Ok((rest2, _)) = sym('[')(rest) else { break };
        let (rest2, _) = ws(rest2)?;
        if let Ok((rest3, _)) = sym(']')(rest2) {
            dims.push(None);
            input = rest3;
        } else if let Ok((rest3, len)) = int_const(rest2) {
            let (rest3, _) = ws(rest3)?;
            let Ok((rest3, _)) = sym(']')(rest3) else { break };
            dims.push(Some(len.max(0) as usize));
            input = rest3;
        } else {
            break;
        }
    }
    let mut ty = base;
    for dim in dims.iter().rev() {
        ty = match dim {
            Some(len) => Type::Array {
                elem: Box::new(ty),
                len: *len,
            },
            None => Type::Slice(Box::new(ty)),
        };
    }
    Ok((input, ty))
}

fn named_type(input: Span) -> PResult<Type> {
    let (input, name) = identifier_raw(input)?;
    let ty = match name {
        "void" => Type::Void,
        "bool" => Type::Bool,
        "string" => Type::Str,
        "sbyte" => Type::I8,
        "short" => Type::I16,
        "int" => Type::I32,
        "long" => Type::I64,
        "byte" => Type::U8,
        "ushort" => Type::U16,
        "uint" => Type::U32,
        "float" => Type::F32,
        "double" => Type::F64,
        "Regex" => Type::Regex,
        "Match" => Type::Match,
        "List" | "Stack" | "HashSet" => {
            let (rest, elem) = generic_args1(input)?;
            let ty = match name {
                "List" => Type::List(Box::new(elem)),
                "Stack" => Type::Stack(Box::new(elem)),
                _ => Type::Set(Box::new(elem)),
            };
            return Ok((rest, ty));
        }
        "Dictionary" | "SortedDictionary" => {
            let (rest, (key, value)) = generic_args2(input)?;
            return Ok((
                rest,
                Type::Dict {
                    sorted: name == "SortedDictionary",
                    key: Box::new(key),
                    value: Box::new(value),
                },
            ));
        }
        _ => {
            // class or enum name; the resolver reclassifies enums
            let (rest, ptr) = opt(sym('*'))(input)?;
            let ty = if ptr.is_some() {
                Type::ClassPtr(name.to_string())
            } else {
                Type::Class(name.to_string())
            };
            return Ok((rest, ty));
        }
    };
    Ok((input, ty))
}

fn generic_args1(input: Span) -> PResult<Type> {
    let (input, _) = ws(input)?;
    let (input, _) = sym('<')(input)?;
    let (input, elem) = type_parser(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym('>')(input)?;
    Ok((input, elem))
}

fn generic_args2(input: Span) -> PResult<(Type, Type)> {
    let (input, _) = ws(input)?;
    let (input, _) = sym('<')(input)?;
    let (input, key) = type_parser(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(',')(input)?;
    let (input, value) = type_parser(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym('>')(input)?;
    Ok((input, (key, value)))
}

/// Signed integer literal used in types, enum values and case labels.
fn int_const(input: Span) -> PResult<i64> {
    let (input, neg) = opt(sym('-'))(input)?;
    let (input, _) = ws(input)?;
    let (input, magnitude) = if let Ok((rest, _)) = tag::<_, _, nom::error::Error<Span>>("0x")(input)
    {
        let (rest, digits) = hex_digit1(rest)?;
        (
            rest,
            i64::from_str_radix(digits.fragment(), 16).unwrap_or(i64::MAX),
        )
    } else {
        let (rest, digits) = digit1(input)?;
        (rest, digits.fragment().parse::<i64>().unwrap_or(i64::MAX))
    };
    Ok((input, if neg.is_some() { -magnitude } else { magnitude }))
}

fn block_body(input: Span) -> PResult<Vec<Stmt>> {
    let (input, _) = ws(input)?;
    let (input, _) = sym('{')(input)?;
    let (input, stmts) = many0(stmt)(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym('}')(input)?;
    Ok((input, stmts))
}

/// Parse a statement
fn stmt(input: Span) -> PResult<Stmt> {
    let (input, _) = ws(input)?;
    let line = input.location_line();
    if input.fragment().starts_with('{') {
        let (rest, body) = block_body(input)?;
        return Ok((rest, Stmt::new(StmtKind::Block(body), line)));
    }
    if let Ok((_, word)) = identifier_raw(input) {
        match word {
            "if" => return if_stmt(input, line),
            "while" => return while_stmt(input, line),
            "do" => return do_stmt(input, line),
            "for" => return for_stmt(input, line),
            "foreach" => return foreach_stmt(input, line),
            "switch" => return switch_stmt(input, line),
            "break" => return plain_stmt(input, "break", StmtKind::Break, line),
            "continue" => return plain_stmt(input, "continue", StmtKind::Continue, line),
            "return" => return return_stmt(input, line),
            "throw" => return throw_stmt(input, line),
            "lock" => return lock_stmt(input, line),
            "assert" => return assert_stmt(input, line),
            "const" => {
                let (rest, decl) = const_decl(input)?;
                return Ok((rest, Stmt::new(StmtKind::Const(decl), line)));
            }
            _ => {}
        }
    }
    let (input, kind) = simple_stmt(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    Ok((input, Stmt::new(kind, line)))
}

/// Local declaration, assignment or expression, without the trailing `;`.
/// Shared between statement position and `for` headers.
fn simple_stmt(input: Span) -> PResult<StmtKind> {
    if let Ok((rest, decl)) = var_decl_core(input) {
        return Ok((rest, StmtKind::Var(decl)));
    }
    let (input, target) = expr(input)?;
    let (input, _) = ws(input)?;
    if let Ok((rest, op)) = assign_op(input) {
        let (rest, _) = ws(rest)?;
        let (rest, value) = expr(rest)?;
        return Ok((rest, StmtKind::Assign { target, op, value }));
    }
    Ok((input, StmtKind::Expr(target)))
}

fn var_decl_core(input: Span) -> PResult<VarDecl> {
    let (input, ty) = type_parser(input)?;
    let (input, _) = ws(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, init) = opt(preceded(pair(sym('='), ws), init_expr))(input)?;
    Ok((input, VarDecl { name, ty, init }))
}

fn assign_op(input: Span) -> PResult<AssignOp> {
    alt((
        value(AssignOp::Shl, tag("<<=")),
        value(AssignOp::Shr, tag(">>=")),
        value(AssignOp::Add, tag("+=")),
        value(AssignOp::Sub, tag("-=")),
        value(AssignOp::Mul, tag("*=")),
        value(AssignOp::Div, tag("/=")),
        value(AssignOp::Mod, tag("%=")),
        value(AssignOp::BitAnd, tag("&=")),
        value(AssignOp::BitOr, tag("|=")),
        value(AssignOp::BitXor, tag("^=")),
        value(AssignOp::Set, terminated(sym('='), not(sym('=')))),
    ))(input)
}

fn if_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("if")(input)?;
    let (input, cond) = paren_expr(input)?;
    let (input, then_branch) = stmt(input)?;
    let (input, _) = ws(input)?;
    let (input, else_branch) = if peeks_word(input, "else") {
        let (rest, _) = keyword("else")(input)?;
        let (rest, branch) = stmt(rest)?;
        (rest, Some(Box::new(branch)))
    } else {
        (input, None)
    };
    Ok((
        input,
        Stmt::new(
            StmtKind::If {
                cond,
                then_branch: Box::new(then_branch),
                else_branch,
            },
            line,
        ),
    ))
}

fn while_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("while")(input)?;
    let (input, cond) = paren_expr(input)?;
    let (input, body) = stmt(input)?;
    Ok((
        input,
        Stmt::new(
            StmtKind::While {
                cond,
                body: Box::new(body),
            },
            line,
        ),
    ))
}

fn do_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("do")(input)?;
    let (input, body) = stmt(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = keyword("while")(input)?;
    let (input, cond) = paren_expr(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    Ok((
        input,
        Stmt::new(
            StmtKind::DoWhile {
                body: Box::new(body),
                cond,
            },
            line,
        ),
    ))
}

fn for_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("for")(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym('(')(input)?;
    let (input, _) = ws(input)?;
    let init_line = input.location_line();
    let (input, init) = opt(simple_stmt)(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    let (input, _) = ws(input)?;
    let (input, cond) = opt(expr)(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    let (input, _) = ws(input)?;
    let advance_line = input.location_line();
    let (input, advance_kind) = opt(simple_stmt)(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(')')(input)?;
    let (input, body) = stmt(input)?;
    Ok((
        input,
        Stmt::new(
            StmtKind::For {
                init: init.map(|kind| Box::new(Stmt::new(kind, init_line))),
                cond,
                advance: advance_kind.map(|kind| Box::new(Stmt::new(kind, advance_line))),
                body: Box::new(body),
            },
            line,
        ),
    ))
}

fn iter_var(input: Span) -> PResult<IterVar> {
    let (input, ty) = type_parser(input)?;
    let (input, _) = ws(input)?;
    let (input, name) = identifier(input)?;
    Ok((input, IterVar { name, ty }))
}

fn foreach_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("foreach")(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym('(')(input)?;
    let (input, _) = ws(input)?;
    let (input, (key, value)) = if let Ok((rest, _)) = sym('(')(input) {
        let (rest, key) = iter_var(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, _) = sym(',')(rest)?;
        let (rest, value) = iter_var(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, _) = sym(')')(rest)?;
        (rest, (key, Some(value)))
    } else {
        let (rest, key) = iter_var(input)?;
        (rest, (key, None))
    };
    let (input, _) = ws(input)?;
    let (input, _) = keyword("in")(input)?;
    let (input, collection) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(')')(input)?;
    let (input, body) = stmt(input)?;
    Ok((
        input,
        Stmt::new(
            StmtKind::Foreach {
                key,
                value,
                collection,
                body: Box::new(body),
            },
            line,
        ),
    ))
}

fn switch_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("switch")(input)?;
    let (input, value) = paren_expr(input)?;
    let (input, _) = ws(input)?;
    let (mut input, _) = sym('{')(input)?;
    let mut cases: Vec<SwitchCase> = Vec::new();
    let mut default: Option<Vec<Stmt>> = None;
    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = sym('}')(rest) {
            return Ok((
                rest,
                Stmt::new(
                    StmtKind::Switch {
                        value,
                        cases,
                        default,
                    },
                    line,
                ),
            ));
        }
        if peeks_word(rest, "case") {
            let (rest, _) = keyword("case")(rest)?;
            let (rest, values) = separated_list0(preceded(ws, sym(',')), expr)(rest)?;
            let (rest, _) = ws(rest)?;
            let (rest, _) = sym(':')(rest)?;
            let (rest, body) = case_body(rest)?;
            cases.push(SwitchCase { values, body });
            input = rest;
        } else if peeks_word(rest, "default") {
            let (rest, _) = keyword("default")(rest)?;
            let (rest, _) = ws(rest)?;
            let (rest, _) = sym(':')(rest)?;
            let (rest, body) = case_body(rest)?;
            default = Some(body);
            input = rest;
        } else {
            return Err(perr(rest));
        }
    }
}

fn case_body(mut input: Span) -> PResult<Vec<Stmt>> {
    let mut stmts = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        if rest.fragment().starts_with('}')
            || peeks_word(rest, "case")
            || peeks_word(rest, "default")
        {
            return Ok((rest, stmts));
        }
        let (rest, s) = stmt(rest)?;
        stmts.push(s);
        input = rest;
    }
}

fn plain_stmt<'a>(input: Span<'a>, kw: &'static str, kind: StmtKind, line: u32) -> PResult<'a, Stmt> {
    let (input, _) = keyword(kw)(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    Ok((input, Stmt::new(kind, line)))
}

fn return_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("return")(input)?;
    let (input, _) = ws(input)?;
    if let Ok((rest, _)) = sym(';')(input) {
        return Ok((rest, Stmt::new(StmtKind::Return(None), line)));
    }
    let (input, e) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    Ok((input, Stmt::new(StmtKind::Return(Some(e)), line)))
}

fn throw_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("throw")(input)?;
    let (input, e) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    Ok((input, Stmt::new(StmtKind::Throw(e), line)))
}

fn lock_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("lock")(input)?;
    // the guarded object is irrelevant: the JavaScript backend rejects lock
    let (input, _) = paren_expr(input)?;
    let (input, body) = stmt(input)?;
    Ok((
        input,
        Stmt::new(
            StmtKind::Lock {
                body: Box::new(body),
            },
            line,
        ),
    ))
}

fn assert_stmt(input: Span, line: u32) -> PResult<Stmt> {
    let (input, _) = keyword("assert")(input)?;
    let (input, cond) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, msg) = opt(preceded(pair(sym(','), ws), expr))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(';')(input)?;
    Ok((input, Stmt::new(StmtKind::Assert { cond, msg }, line)))
}

fn paren_expr(input: Span) -> PResult<Expr> {
    let (input, _) = ws(input)?;
    let (input, _) = sym('(')(input)?;
    let (input, e) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = sym(')')(input)?;
    Ok((input, e))
}

/// Aggregate initializer or expression; only valid after `=`.
fn init_expr(input: Span) -> PResult<Expr> {
    let (input, _) = ws(input)?;
    let line = input.location_line();
    if let Ok((rest, _)) = sym('{')(input) {
        let (rest, elems) = separated_list0(preceded(ws, sym(',')), expr)(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, _) = sym('}')(rest)?;
        return Ok((rest, Expr::new(ExprKind::ArrayLit(elems), line)));
    }
    expr(input)
}

/// Parse an expression
pub(crate) fn expr(input: Span) -> PResult<Expr> {
    cond_expr(input)
}

fn cond_expr(input: Span) -> PResult<Expr> {
    let (input, cond) = binary_chain(input, and_chain, or_op)?;
    let (after_ws, _) = ws(input)?;
    if let Ok((rest, _)) = sym('?')(after_ws) {
        let line = after_ws.location_line();
        let (rest, on_true) = cond_expr(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, _) = sym(':')(rest)?;
        let (rest, on_false) = cond_expr(rest)?;
        return Ok((
            rest,
            Expr::new(
                ExprKind::Cond {
                    cond: Box::new(cond),
                    on_true: Box::new(on_true),
                    on_false: Box::new(on_false),
                },
                line,
            ),
        ));
    }
    Ok((input, cond))
}

fn binary_chain<'a>(
    input: Span<'a>,
    next: fn(Span<'a>) -> PResult<'a, Expr>,
    op: fn(Span<'a>) -> PResult<'a, BinOp>,
) -> PResult<'a, Expr> {
    let (mut input, mut lhs) = next(input)?;
    loop {
        let (after_ws, _) = ws(input)?;
        match op(after_ws) {
            Ok((rest, o)) => {
                let line = after_ws.location_line();
                let (rest, rhs) = next(rest)?;
                lhs = Expr::new(
                    ExprKind::Binary {
                        op: o,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    line,
                );
                input = rest;
            }
            Err(_) => return Ok((input, lhs)),
        }
    }
}

fn and_chain(input: Span) -> PResult<Expr> {
    binary_chain(input, bitor_chain, and_op)
}

fn bitor_chain(input: Span) -> PResult<Expr> {
    binary_chain(input, bitxor_chain, bitor_op)
}

fn bitxor_chain(input: Span) -> PResult<Expr> {
    binary_chain(input, bitand_chain, bitxor_op)
}

fn bitand_chain(input: Span) -> PResult<Expr> {
    binary_chain(input, equality_chain, bitand_op)
}

fn equality_chain(input: Span) -> PResult<Expr> {
    binary_chain(input, rel_chain, eq_op)
}

fn rel_chain(input: Span) -> PResult<Expr> {
    binary_chain(input, shift_chain, rel_op)
}

fn shift_chain(input: Span) -> PResult<Expr> {
    binary_chain(input, add_chain, shift_op)
}

fn add_chain(input: Span) -> PResult<Expr> {
    binary_chain(input, mul_chain, add_op)
}

fn mul_chain(input: Span) -> PResult<Expr> {
    binary_chain(input, unary_expr, mul_op)
}

fn or_op(input: Span) -> PResult<BinOp> {
    value(BinOp::Or, tag("||"))(input)
}

fn and_op(input: Span) -> PResult<BinOp> {
    value(BinOp::And, tag("&&"))(input)
}

fn bitor_op(input: Span) -> PResult<BinOp> {
    value(
        BinOp::BitOr,
        terminated(sym('|'), not(alt((sym('|'), sym('='))))),
    )(input)
}

fn bitxor_op(input: Span) -> PResult<BinOp> {
    value(BinOp::BitXor, terminated(sym('^'), not(sym('='))))(input)
}

fn bitand_op(input: Span) -> PResult<BinOp> {
    value(
        BinOp::BitAnd,
        terminated(sym('&'), not(alt((sym('&'), sym('='))))),
    )(input)
}

fn eq_op(input: Span) -> PResult<BinOp> {
    alt((
        value(BinOp::Eq, tag("==")),
        value(BinOp::NotEq, tag("!=")),
    ))(input)
}

fn rel_op(input: Span) -> PResult<BinOp> {
    alt((
        value(BinOp::LessEq, tag("<=")),
        value(BinOp::GreaterEq, tag(">=")),
        value(BinOp::Less, terminated(sym('<'), not(sym('<')))),
        value(BinOp::Greater, terminated(sym('>'), not(sym('>')))),
    ))(input)
}

fn shift_op(input: Span) -> PResult<BinOp> {
    alt((
        value(BinOp::Shl, terminated(tag("<<"), not(sym('=')))),
        value(BinOp::Shr, terminated(tag(">>"), not(sym('=')))),
    ))(input)
}

fn add_op(input: Span) -> PResult<BinOp> {
    alt((
        value(BinOp::Add, terminated(sym('+'), not(alt((sym('+'), sym('=')))))),
        value(BinOp::Sub, terminated(sym('-'), not(alt((sym('-'), sym('=')))))),
    ))(input)
}

fn mul_op(input: Span) -> PResult<BinOp> {
    alt((
        value(BinOp::Mul, terminated(sym('*'), not(sym('=')))),
        value(
            BinOp::Div,
            terminated(sym('/'), not(alt((sym('/'), sym('*'), sym('='))))),
        ),
        value(BinOp::Mod, terminated(sym('%'), not(sym('=')))),
    ))(input)
}

fn unary_expr(input: Span) -> PResult<Expr> {
    let (input, _) = ws(input)?;
    let line = input.location_line();
    if let Ok((rest, _)) = tag::<_, _, nom::error::Error<Span>>("++")(input) {
        let (rest, operand) = unary_expr(rest)?;
        return Ok((rest, unary(UnOp::PreInc, operand, line)));
    }
    if let Ok((rest, _)) = tag::<_, _, nom::error::Error<Span>>("--")(input) {
        let (rest, operand) = unary_expr(rest)?;
        return Ok((rest, unary(UnOp::PreDec, operand, line)));
    }
    if let Ok((rest, _)) = sym('!')(input) {
        let (rest, operand) = unary_expr(rest)?;
        return Ok((rest, unary(UnOp::Not, operand, line)));
    }
    if let Ok((rest, _)) = sym('~')(input) {
        let (rest, operand) = unary_expr(rest)?;
        return Ok((rest, unary(UnOp::BitNot, operand, line)));
    }
    if let Ok((rest, _)) = sym('-')(input) {
        let (rest, operand) = unary_expr(rest)?;
        return Ok((rest, unary(UnOp::Neg, operand, line)));
    }
    postfix_expr(input)
}

fn unary(op: UnOp, operand: Expr, line: u32) -> Expr {
    Expr::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        line,
    )
}

fn postfix_expr(input: Span) -> PResult<Expr> {
    let (input, _) = ws(input)?;
    let (mut input, mut e) = primary_expr(input)?;
    loop {
        let (rest, _) = ws(input)?;
        let line = rest.location_line();
        if let Ok((rest2, _)) = sym('.')(rest) {
            let (rest2, _) = ws(rest2)?;
            let (rest2, name) = identifier(rest2)?;
            e = Expr::new(
                ExprKind::Member {
                    target: Box::new(e),
                    name,
                },
                line,
            );
            input = rest2;
        } else if let Ok((rest2, _)) = sym('(')(rest) {
            let (rest2, args) = separated_list0(preceded(ws, sym(',')), expr)(rest2)?;
            let (rest2, _) = ws(rest2)?;
            let (rest2, _) = sym(')')(rest2)?;
            let callee = match e.kind {
                ExprKind::Name(name) => Callee::Unresolved { target: None, name },
                ExprKind::Member { target, name } => Callee::Unresolved {
                    target: Some(target),
                    name,
                },
                _ => return Err(perr(rest)),
            };
            e = Expr::new(ExprKind::Call { callee, args }, e.line);
            input = rest2;
        } else if let Ok((rest2, _)) = sym('[')(rest) {
            let (rest2, index) = expr(rest2)?;
            let (rest2, _) = ws(rest2)?;
            let (rest2, _) = sym(']')(rest2)?;
            e = Expr::new(
                ExprKind::Index {
                    target: Box::new(e),
                    index: Box::new(index),
                },
                line,
            );
            input = rest2;
        } else if let Ok((rest2, _)) = tag::<_, _, nom::error::Error<Span>>("++")(rest) {
            e = Expr::new(
                ExprKind::Postfix {
                    op: PostfixOp::Inc,
                    operand: Box::new(e),
                },
                line,
            );
            input = rest2;
        } else if let Ok((rest2, _)) = tag::<_, _, nom::error::Error<Span>>("--")(rest) {
            e = Expr::new(
                ExprKind::Postfix {
                    op: PostfixOp::Dec,
                    operand: Box::new(e),
                },
                line,
            );
            input = rest2;
        } else {
            return Ok((input, e));
        }
    }
}

fn primary_expr(input: Span) -> PResult<Expr> {
    let (input, _) = ws(input)?;
    let line = input.location_line();
    let frag = *input.fragment();
    if frag.starts_with("$\"") {
        let (rest, kind) = interp_lit(input)?;
        return Ok((rest, Expr::new(kind, line)));
    }
    if frag.starts_with('"') {
        let (rest, s) = string_lit(input)?;
        return Ok((rest, Expr::new(ExprKind::Str(s), line)));
    }
    if frag.starts_with('\'') {
        let (rest, c) = char_lit(input)?;
        return Ok((rest, Expr::new(ExprKind::Char(c), line)));
    }
    if frag.starts_with('(') {
        let (rest, e) = paren_expr(input)?;
        return Ok((rest, e));
    }
    if frag.starts_with("0x") || frag.starts_with("0X") {
        return hex_lit(input, line);
    }
    if frag.starts_with(|c: char| c.is_ascii_digit()) {
        return number_lit(input, line);
    }
    if let Ok((rest, word)) = identifier_raw(input) {
        match word {
            "true" => return Ok((rest, Expr::new(ExprKind::Bool(true), line))),
            "false" => return Ok((rest, Expr::new(ExprKind::Bool(false), line))),
            "null" => return Ok((rest, Expr::new(ExprKind::Null, line))),
            "resource" => {
                let (rest, _) = ws(rest)?;
                let (rest, _) = sym('(')(rest)?;
                let (rest, _) = ws(rest)?;
                let (rest, name) = string_lit(rest)?;
                let (rest, _) = ws(rest)?;
                let (rest, _) = sym(')')(rest)?;
                return Ok((rest, Expr::new(ExprKind::Resource(name), line)));
            }
            _ => return Ok((rest, Expr::new(ExprKind::Name(word.to_string()), line))),
        }
    }
    Err(perr(input))
}

fn hex_lit(input: Span, line: u32) -> PResult<Expr> {
    let (input, _) = alt((tag("0x"), tag("0X")))(input)?;
    let (input, digits) = hex_digit1(input)?;
    let v = i64::from_str_radix(digits.fragment(), 16).unwrap_or(i64::MAX);
    int_suffix(input, v, line)
}

fn number_lit(input: Span, line: u32) -> PResult<Expr> {
    let (rest, whole) = digit1(input)?;
    // float: digits '.' digits
    if rest.fragment().starts_with('.')
        && rest.fragment()[1..].starts_with(|c: char| c.is_ascii_digit())
    {
        let (rest, _) = sym('.')(rest)?;
        let (rest, frac) = digit1(rest)?;
        let text = format!("{}.{}", whole.fragment(), frac.fragment());
        let v = text.parse::<f64>().unwrap_or(0.0);
        let mut e = Expr::new(ExprKind::Float(v), line);
        if let Ok((rest, _)) = alt((sym('f'), sym('F')))(rest) {
            e.ty = Some(Type::F32);
            return Ok((rest, e));
        }
        return Ok((rest, e));
    }
    let v = whole.fragment().parse::<i64>().unwrap_or(i64::MAX);
    int_suffix(rest, v, line)
}

fn int_suffix(input: Span, v: i64, line: u32) -> PResult<Expr> {
    let mut e = Expr::new(ExprKind::Int(v), line);
    if let Ok((rest, _)) = alt((sym('u'), sym('U')))(input) {
        e.ty = Some(Type::U32);
        return Ok((rest, e));
    }
    if let Ok((rest, _)) = sym('L')(input) {
        e.ty = Some(Type::I64);
        return Ok((rest, e));
    }
    if let Ok((rest, _)) = alt((sym('f'), sym('F')))(input) {
        let mut e = Expr::new(ExprKind::Float(v as f64), line);
        e.ty = Some(Type::F32);
        return Ok((rest, e));
    }
    Ok((input, e))
}

fn unescape(c: char) -> Option<char> {
    Some(match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        '\\' => '\\',
        '"' => '"',
        '\'' => '\'',
        '`' => '`',
        '$' => '$',
        _ => return None,
    })
}

fn string_lit(input: Span) -> PResult<String> {
    let (input, _) = sym('"')(input)?;
    let frag = *input.fragment();
    let mut out = String::new();
    let mut it = frag.char_indices();
    while let Some((idx, c)) = it.next() {
        match c {
            '"' => return Ok((advance(input, idx + 1), out)),
            '\n' => return Err(perr(input)),
            '\\' => match it.next().and_then(|(_, e)| unescape(e)) {
                Some(e) => out.push(e),
                None => return Err(perr(input)),
            },
            c => out.push(c),
        }
    }
    Err(perr(input))
}

fn char_lit(input: Span) -> PResult<char> {
    let (input, _) = sym('\'')(input)?;
    let frag = *input.fragment();
    let mut it = frag.char_indices();
    let (c, end) = match it.next() {
        Some((_, '\\')) => match it.next() {
            Some((idx, e)) => match unescape(e) {
                Some(c) => (c, idx + e.len_utf8()),
                None => return Err(perr(input)),
            },
            None => return Err(perr(input)),
        },
        Some((idx, c)) if c != '\'' && c != '\n' => (c, idx + c.len_utf8()),
        _ => return Err(perr(input)),
    };
    let input = advance(input, end);
    if !input.fragment().starts_with('\'') {
        return Err(perr(input));
    }
    Ok((advance(input, 1), c))
}

/// `$"literal{arg, width : format precision}..."`
fn interp_lit(input: Span) -> PResult<ExprKind> {
    let (mut input, _) = tag("$\"")(input)?;
    let mut parts: Vec<InterpPart> = Vec::new();
    let mut prefix = String::new();
    loop {
        let frag = *input.fragment();
        let mut chars = frag.chars();
        let Some(c) = chars.next() else {
            return Err(perr(input));
        };
        match c {
            '"' => {
                input = advance(input, 1);
                parts.push(InterpPart {
                    prefix: std::mem::take(&mut prefix),
                    arg: None,
                    width: None,
                    format: None,
                    precision: None,
                });
                return Ok((input, ExprKind::Interp(parts)));
            }
            '\n' => return Err(perr(input)),
            '{' if frag[1..].starts_with('{') => {
                prefix.push('{');
                input = advance(input, 2);
            }
            '}' if frag[1..].starts_with('}') => {
                prefix.push('}');
                input = advance(input, 2);
            }
            '{' => {
                let (rest, part) = interp_part(advance(input, 1), std::mem::take(&mut prefix))?;
                parts.push(part);
                input = rest;
            }
            '\\' => match chars.next().and_then(unescape) {
                Some(e) => {
                    prefix.push(e);
                    input = advance(input, 2);
                }
                None => return Err(perr(input)),
            },
            c => {
                prefix.push(c);
                input = advance(input, c.len_utf8());
            }
        }
    }
}

fn interp_part(input: Span, prefix: String) -> PResult<InterpPart> {
    let (input, arg) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, width) = if let Ok((rest, _)) = sym(',')(input) {
        let (rest, _) = ws(rest)?;
        let (rest, w) = int_const(rest)?;
        let (rest, _) = ws(rest)?;
        (rest, Some(w as i32))
    } else {
        (input, None)
    };
    let (input, format, precision) = if let Ok((rest, _)) = sym(':')(input) {
        let (rest, _) = ws(rest)?;
        let (rest, f) = satisfy(|c| c.is_ascii_alphabetic())(rest)?;
        let (rest, digits) = opt(digit1)(rest)?;
        let precision = digits.map(|d| d.fragment().parse::<i32>().unwrap_or(0));
        let (rest, _) = ws(rest)?;
        (rest, Some(f), precision)
    } else {
        (input, None, None)
    };
    let (input, _) = sym('}')(input)?;
    Ok((
        input,
        InterpPart {
            prefix,
            arg: Some(arg),
            width,
            format,
            precision,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Decl {
        let decls = parse("test.mica", src, &[], false).expect("parse failed");
        assert_eq!(decls.len(), 1);
        decls.into_iter().next().unwrap()
    }

    fn parse_stmts(body: &str) -> Vec<Stmt> {
        let src = format!("class T {{ void m() {{ {body} }} }}");
        match parse_one(&src) {
            Decl::Class(c) => c.methods.into_iter().next().unwrap().body.unwrap(),
            _ => panic!("expected class"),
        }
    }

    fn parse_expr(text: &str) -> Expr {
        let stmts = parse_stmts(&format!("x = {text};"));
        match stmts.into_iter().next().unwrap().kind {
            StmtKind::Assign { value, .. } => value,
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_enum_with_auto_increment() {
        let Decl::Enum(e) = parse_one("enum Season { Winter, Spring, Fall = 9, Late }") else {
            panic!("expected enum");
        };
        assert_eq!(e.name, "Season");
        let values: Vec<(String, i64)> = e
            .constants
            .iter()
            .map(|c| (c.name.clone(), c.value))
            .collect();
        assert_eq!(
            values,
            vec![
                ("Winter".to_string(), 0),
                ("Spring".to_string(), 1),
                ("Fall".to_string(), 9),
                ("Late".to_string(), 10),
            ]
        );
    }

    #[test]
    fn parses_class_members() {
        let Decl::Class(c) = parse_one(
            "class Foo : Bar {\n\
             \tconst int Max = 10;\n\
             \tint count = 0;\n\
             \tFoo() { count = 1; }\n\
             \tpublic static int Twice(int x) { return x * 2; }\n\
             \tpublic abstract void Run();\n\
             }",
        ) else {
            panic!("expected class");
        };
        assert_eq!(c.base.as_deref(), Some("Bar"));
        assert_eq!(c.consts.len(), 1);
        assert_eq!(c.fields.len(), 1);
        assert!(c.ctor.is_some());
        assert_eq!(c.methods.len(), 2);
        assert!(c.methods[0].is_static && c.methods[0].is_public);
        assert!(c.methods[1].is_abstract);
        assert!(c.methods[1].body.is_none());
    }

    #[test]
    fn binary_precedence_builds_left_spine() {
        let e = parse_expr("1 + 2 * 3");
        let ExprKind::Binary { op: BinOp::Add, rhs, .. } = e.kind else {
            panic!("expected addition at the root: {:?}", e.kind);
        };
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn shift_binds_tighter_than_relational() {
        let e = parse_expr("a >> 2 < b");
        let ExprKind::Binary { op: BinOp::Less, lhs, .. } = e.kind else {
            panic!("expected comparison at the root: {:?}", e.kind);
        };
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinOp::Shr, .. }));
    }

    #[test]
    fn parses_literal_suffixes() {
        assert_eq!(parse_expr("0xFFFFFFFFu").ty, Some(Type::U32));
        assert_eq!(parse_expr("5L").ty, Some(Type::I64));
        assert_eq!(parse_expr("1.5f").ty, Some(Type::F32));
        assert!(matches!(parse_expr("42").kind, ExprKind::Int(42)));
    }

    #[test]
    fn parses_types() {
        let stmts = parse_stmts("Dictionary<string, int> d; [0 .. 7] x; byte[4][2] grid;");
        let StmtKind::Var(d) = &stmts[0].kind else { panic!() };
        assert_eq!(
            d.ty,
            Type::Dict {
                sorted: false,
                key: Box::new(Type::Str),
                value: Box::new(Type::I32),
            }
        );
        let StmtKind::Var(x) = &stmts[1].kind else { panic!() };
        assert_eq!(x.ty, Type::Range { lo: 0, hi: 7 });
        let StmtKind::Var(g) = &stmts[2].kind else { panic!() };
        assert_eq!(
            g.ty,
            Type::Array {
                elem: Box::new(Type::Array {
                    elem: Box::new(Type::U8),
                    len: 2,
                }),
                len: 4,
            }
        );
    }

    #[test]
    fn parses_interpolated_string() {
        let e = parse_expr("$\"x={x,5:X2}!\"");
        let ExprKind::Interp(parts) = e.kind else {
            panic!("expected interpolation");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].prefix, "x=");
        assert_eq!(parts[0].width, Some(5));
        assert_eq!(parts[0].format, Some('X'));
        assert_eq!(parts[0].precision, Some(2));
        assert!(parts[0].arg.is_some());
        assert_eq!(parts[1].prefix, "!");
        assert!(parts[1].arg.is_none());
    }

    #[test]
    fn parses_switch_with_case_groups() {
        let stmts = parse_stmts(
            "switch (s) { case \"a\": return; case \"b\", \"c\": break; default: continue; }",
        );
        let StmtKind::Switch { cases, default, .. } = &stmts[0].kind else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].values.len(), 2);
        assert!(default.is_some());
    }

    #[test]
    fn parses_foreach_forms() {
        let stmts = parse_stmts(
            "foreach (int x in xs) { } foreach ((int k, string v) in d) { }",
        );
        let StmtKind::Foreach { key, value, .. } = &stmts[0].kind else {
            panic!("expected foreach");
        };
        assert_eq!(key.name, "x");
        assert!(value.is_none());
        let StmtKind::Foreach { value, .. } = &stmts[1].kind else {
            panic!("expected foreach");
        };
        assert_eq!(value.as_ref().unwrap().name, "v");
    }

    #[test]
    fn preprocessor_filters_inactive_groups() {
        let src = "#if FAST\nclass A { }\n#else\nclass B { }\n#endif\n";
        let with = preprocess("t", src, &["FAST".to_string()]).unwrap();
        assert!(with.contains("class A") && !with.contains("class B"));
        let without = preprocess("t", src, &[]).unwrap();
        assert!(!without.contains("class A") && without.contains("class B"));
        // line numbers survive filtering
        assert_eq!(without.lines().count(), src.lines().count());
    }

    #[test]
    fn preprocessor_rejects_unterminated_if() {
        assert!(preprocess("t", "#if X\nclass A { }\n", &[]).is_err());
    }

    #[test]
    fn doc_comments_attach_to_declarations() {
        let Decl::Class(c) = parse_one(
            "/// Summary with `code` inside.\n///\n/// - first\n/// - second\nclass Foo { }",
        ) else {
            panic!("expected class");
        };
        let doc = c.doc.expect("doc");
        assert_eq!(doc.summary.runs.len(), 3);
        assert!(matches!(&doc.summary.runs[1], DocRun::Code(c) if c == "code"));
        assert!(matches!(&doc.details[0], DocBlock::Bullets(items) if items.len() == 2));
    }

    #[test]
    fn reports_line_numbers_in_errors() {
        let err = parse("bad.mica", "class Foo {\n\tint x = ;\n}\n", &[], false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("bad.mica(2): ERROR:"), "{msg}");
    }
}
