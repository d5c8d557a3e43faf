mod ast;
mod emitter;
mod error;
mod jsgen;
mod parser;
mod resolver;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::ast::Program;
use crate::error::CompileError;

/// Mica Compiler - Translates Mica source files to JavaScript
#[derive(Parser, Debug)]
#[command(name = "micac", version, about, long_about = None)]
struct Args {
    /// Input Mica source files
    #[arg(required = true, value_name = "FILE")]
    sources: Vec<PathBuf>,

    /// Output file; comma-separated extensions run one pass per extension
    #[arg(short = 'o', value_name = "FILE")]
    output: String,

    /// Target language (inferred from the -o extension when omitted)
    #[arg(short = 'l', value_name = "TARGET")]
    lang: Option<String>,

    /// Namespace prefix, accepted for compatibility with other targets
    #[arg(short = 'n', value_name = "NAME")]
    namespace: Option<String>,

    /// Preprocessor symbols for #if groups
    #[arg(short = 'D', value_name = "SYMBOL")]
    defines: Vec<String>,

    /// Reference source files: resolved but not emitted
    #[arg(short = 'r', value_name = "FILE")]
    references: Vec<PathBuf>,

    /// Resource search directories
    #[arg(short = 'I', value_name = "DIR")]
    resource_dirs: Vec<PathBuf>,

    /// Print pipeline progress
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Js,
}

fn main() {
    let args = Args::parse();
    match compile(&args) {
        Ok(()) => {
            if args.debug {
                println!("✓ Translation successful: {}", args.output);
            }
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

fn compile(args: &Args) -> Result<(), CompileError> {
    // Step 1: parse reference files and sources into one program
    if args.debug {
        println!("[1/4] Parsing source files...");
    }
    let mut decls = Vec::new();
    for path in &args.references {
        decls.extend(parse_file(path, &args.defines, true)?);
    }
    for path in &args.sources {
        decls.extend(parse_file(path, &args.defines, false)?);
    }
    let mut program = Program {
        decls,
        resources: BTreeMap::new(),
    };

    // Step 2: resolve names and types
    if args.debug {
        println!("[2/4] Resolving...");
    }
    resolver::resolve(&mut program)?;

    // Step 3: load embedded resources
    if args.debug {
        println!("[3/4] Loading resources...");
    }
    load_resources(&mut program, &args.resource_dirs)?;

    // Step 4: one generation pass per requested output
    if args.debug {
        println!("[4/4] Generating...");
    }
    for (path, target) in output_passes(&args.output, args.lang.as_deref())? {
        let text = match target {
            Target::Js => jsgen::generate(&program)?,
        };
        fs::write(&path, text)
            .map_err(|e| CompileError::Io(format!("cannot write {path}: {e}")))?;
    }
    Ok(())
}

fn parse_file(
    path: &Path,
    defines: &[String],
    reference: bool,
) -> Result<Vec<ast::Decl>, CompileError> {
    let display = path.display().to_string();
    let source = fs::read_to_string(path)
        .map_err(|e| CompileError::Io(format!("cannot read {display}: {e}")))?;
    parser::parse(&display, &source, defines, reference)
}

/// Resolve `resource("name")` references against the `-I` search path, then
/// the working directory.
fn load_resources(program: &mut Program, dirs: &[PathBuf]) -> Result<(), CompileError> {
    let names: Vec<String> = program.resources.keys().cloned().collect();
    for name in names {
        let candidate = dirs
            .iter()
            .map(PathBuf::as_path)
            .chain(std::iter::once(Path::new(".")))
            .map(|dir| dir.join(&name))
            .find(|p| p.is_file());
        let Some(path) = candidate else {
            return Err(CompileError::Io(format!("resource {name} not found")));
        };
        let bytes = fs::read(&path)
            .map_err(|e| CompileError::Io(format!("cannot read {}: {e}", path.display())))?;
        program.resources.insert(name, bytes);
    }
    Ok(())
}

/// Expand `-o out.js,mjs` into per-extension output files. The target comes
/// from `-l` when given, from each extension otherwise.
fn output_passes(
    output: &str,
    lang: Option<&str>,
) -> Result<Vec<(String, Target)>, CompileError> {
    let Some(dot) = output.rfind('.') else {
        let Some(lang) = lang else {
            return Err(CompileError::Usage(format!(
                "cannot infer a target from {output}; pass -l"
            )));
        };
        return Ok(vec![(output.to_string(), target_named(lang)?)]);
    };
    let stem = &output[..dot];
    let mut passes = Vec::new();
    for ext in output[dot + 1..].split(',') {
        let target = match lang {
            Some(lang) => target_named(lang)?,
            None => target_named(ext)?,
        };
        passes.push((format!("{stem}.{ext}"), target));
    }
    Ok(passes)
}

fn target_named(name: &str) -> Result<Target, CompileError> {
    match name {
        "js" | "mjs" | "javascript" => Ok(Target::Js),
        "c" | "cpp" | "cs" | "java" | "ts" | "py" | "swift" | "cl" => {
            Err(CompileError::Usage(format!(
                "target {name} is not built into this micac; available targets: js"
            )))
        }
        other => Err(CompileError::Usage(format!("unknown target {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_comma_separated_extensions() {
        let passes = output_passes("out/app.js,mjs", None).unwrap();
        assert_eq!(
            passes,
            vec![
                ("out/app.js".to_string(), Target::Js),
                ("out/app.mjs".to_string(), Target::Js),
            ]
        );
    }

    #[test]
    fn explicit_lang_overrides_extension() {
        let passes = output_passes("bundle.out", Some("js")).unwrap();
        assert_eq!(passes, vec![("bundle.out".to_string(), Target::Js)]);
    }

    #[test]
    fn rejects_targets_this_build_lacks() {
        let err = output_passes("app.py", None).unwrap_err();
        assert!(err.to_string().contains("available targets: js"));
        assert!(output_passes("app.exe", None).is_err());
    }

    #[test]
    fn requires_target_information() {
        assert!(output_passes("noext", None).is_err());
    }
}
