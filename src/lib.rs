//! chsmc - a compiler for Concurrent Hierarchical State Machine descriptions
//!
//! This library provides the complete front end, IR, and code generators:
//! lexer, parser, symbol table, validator, and the C++ and Java backends.

pub mod codegen;
pub mod compiler;
pub mod options;
pub mod parser;
pub mod symbol;
pub mod validate;

pub use codegen::{Lang, Streams};
pub use compiler::{Compiler, Diagnostic, Severity};
pub use options::Options;

use codegen::sink::UserCode;
use codegen::EmitOpts;

/// The result of running a whole compilation in memory.
pub struct Compilation {
    /// Generated declaration stream (header / interface).
    pub declaration: String,
    /// Generated definition stream (implementation).  Empty for backends
    /// that emit a single stream.
    pub definition: String,
    pub errors: u32,
    pub warnings: u32,
    pub diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    pub fn succeeded(&self) -> bool {
        self.errors == 0
    }
}

/// Errors that abort a compilation outright, as opposed to source errors
/// which are collected and counted.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Lexical failures that make further parsing meaningless.
    #[error("{0}")]
    Fatal(String),
    /// The user-code sink could not be created or read back.
    #[error("user-code temporary file: {0}")]
    Sink(#[from] std::io::Error),
}

/// Compile a CHSM source text to the chosen backend language.
///
/// `declaration_name` is the name the definition stream should `#include`;
/// pass `None` when both streams go to the same place (stdout or a single
/// Java file).
pub fn compile(
    source: &str,
    source_path: &str,
    lang: Lang,
    line_directives: bool,
    declaration_name: Option<&str>,
) -> Result<Compilation, CompileError> {
    let mut cc = Compiler::new(source_path);
    let mut sink = UserCode::new()?;
    let gen = codegen::create(lang);

    parser::parse(source, &mut cc, gen.as_ref(), &mut sink, line_directives).map_err(
        |e| match e {
            parser::ParseFatal::Source(msg) => CompileError::Fatal(msg),
            parser::ParseFatal::Sink(e) => CompileError::Sink(e),
        },
    )?;

    validate::run(&mut cc);

    let mut streams = Streams::default();
    if cc.diags.errors == 0 {
        let user_code = sink.read_back()?;
        let opts = EmitOpts {
            line_directives,
            source_path,
            declaration_name,
        };
        gen.emit(&cc, &user_code, &opts, &mut streams);
    }

    Ok(Compilation {
        declaration: streams.declaration,
        definition: streams.definition,
        errors: cc.diags.errors,
        warnings: cc.diags.warnings,
        diagnostics: cc.diags.take(),
    })
}
