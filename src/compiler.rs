//! Compiler context and diagnostics
//!
//! A [`Compiler`] value carries everything that is shared across the
//! pipeline for one compilation: the symbol table, the machine symbol, and
//! the diagnostic counters.  It is created per compilation so tests can run
//! several compilations in sequence without teardown hazards.

use crate::symbol::info::{ChsmData, InfoKind};
use crate::symbol::table::{SymbolId, SymbolTable};

/// Process exit codes, following the BSD `sysexits` conventions the
/// command-line surface documents.
pub mod exit_code {
    pub const OK: i32 = 0;
    /// Bad command-line usage.
    pub const USAGE: i32 = 64;
    /// The source had errors.
    pub const DATA_ERR: i32 = 65;
    /// An input file could not be opened.
    pub const NO_INPUT: i32 = 66;
    /// Internal invariant violation: a bug in the compiler itself.
    pub const SOFTWARE: i32 = 70;
    /// The user-code sink could not be created or re-read.
    pub const IO_ERR: i32 = 74;
}

/// Report an internal consistency failure and exit.  These indicate a bug in
/// the compiler, not in the user's source.
pub fn internal_error(msg: &str) -> ! {
    eprintln!("chsmc: internal error: {}", msg);
    std::process::exit(exit_code::SOFTWARE);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One printed diagnostic, also retained for inspection by tests and by the
/// driver.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: u32,
    pub message: String,
}

/// Counts and records warnings and errors for one source file and prints
/// them to stderr as they are reported.
pub struct Diagnostics {
    path: String,
    pub errors: u32,
    pub warnings: u32,
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            errors: 0,
            warnings: 0,
            list: Vec::new(),
        }
    }

    pub fn error(&mut self, line: u32, message: impl Into<String>) {
        self.errors += 1;
        self.report(Severity::Error, line, message.into());
    }

    pub fn warning(&mut self, line: u32, message: impl Into<String>) {
        self.warnings += 1;
        self.report(Severity::Warning, line, message.into());
    }

    fn report(&mut self, severity: Severity, line: u32, message: String) {
        let kind = match severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        if self.path.is_empty() {
            eprintln!("line {}: {}: {}", line, kind, message);
        } else {
            eprintln!("\"{}\", line {}: {}: {}", self.path, line, kind, message);
        }
        self.list.push(Diagnostic {
            severity,
            line,
            message,
        });
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.list)
    }

    pub fn messages(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }
}

/// Everything the pipeline shares while compiling one CHSM.
pub struct Compiler {
    pub symtab: SymbolTable,
    pub diags: Diagnostics,
    /// The symbol carrying the machine's `Chsm` info, once declared.
    pub chsm: Option<SymbolId>,
    pub source_path: String,
}

impl Compiler {
    pub fn new(source_path: &str) -> Self {
        Self {
            symtab: SymbolTable::new(),
            diags: Diagnostics::new(source_path),
            chsm: None,
            source_path: source_path.to_string(),
        }
    }

    /// The machine record, if the `chsm` declaration has been seen.
    pub fn chsm_data(&self) -> Option<&ChsmData> {
        let sym = self.chsm?;
        match &self.symtab.info(sym)?.kind {
            InfoKind::Chsm(data) => Some(data),
            _ => None,
        }
    }

    pub fn chsm_data_mut(&mut self) -> Option<&mut ChsmData> {
        let sym = self.chsm?;
        match &mut self.symtab.info_mut(sym)?.kind {
            InfoKind::Chsm(data) => Some(data),
            _ => None,
        }
    }

    /// The machine's name, or `""` before the declaration is parsed.
    pub fn machine_name(&self) -> &str {
        match self.chsm {
            Some(sym) => self.symtab.name(sym),
            None => "",
        }
    }
}
