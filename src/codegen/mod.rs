//! Code generation
//!
//! The generator is a visitor over the IR.  Each backend emits a
//! declaration stream and a definition stream (the same stream for
//! languages that don't separate them), plus a family of begin/end hooks
//! the parser invokes while parsing to wrap raw user-code chunks into
//! auxiliary-function bodies in the user-code sink.

pub mod cpp;
pub mod java;
pub mod mangle;
pub mod sink;

use std::collections::HashMap;

use crate::compiler::Compiler;
use crate::parser::param::FnParam;
use crate::symbol::info::{
    ChsmData, EventData, ParentData, StateData, Transition, UserEventData,
};
use crate::symbol::table::SymbolId;
use crate::symbol::InfoKind;

/// The language to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Cpp,
    Java,
}

lazy_static::lazy_static! {
    static ref EXT_MAP: HashMap<&'static str, Lang> = {
        let mut m = HashMap::new();
        m.insert("chsmc", Lang::Cpp);
        m.insert("chsmj", Lang::Java);
        m
    };

    static ref LANG_MAP: HashMap<&'static str, Lang> = {
        let mut m = HashMap::new();
        m.insert("c++", Lang::Cpp);
        m.insert("java", Lang::Java);
        m
    };
}

impl Lang {
    /// Map a source filename extension to a language.
    pub fn from_ext(ext: &str) -> Option<Lang> {
        EXT_MAP.get(ext).copied()
    }

    /// Parse a `--language` value.
    pub fn from_name(name: &str) -> Option<Lang> {
        LANG_MAP.get(name.to_ascii_lowercase().as_str()).copied()
    }
}

/// The two output streams.  For single-file backends only `declaration` is
/// filled.
#[derive(Default)]
pub struct Streams {
    pub declaration: String,
    pub definition: String,
}

/// Options for the post-parse emission pass.
pub struct EmitOpts<'a> {
    pub line_directives: bool,
    pub source_path: &'a str,
    /// Name the definition stream should reference for its declarations;
    /// `None` when both streams end up in the same place.
    pub declaration_name: Option<&'a str>,
}

/// Context for the parse-time auxiliary-function hooks.
pub struct AuxCx<'a> {
    pub machine: &'a str,
    pub source_path: &'a str,
    pub line_directives: bool,
}

/// Which of the enter/exit pair an auxiliary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    Enter,
    Exit,
}

impl Which {
    /// Prefix used in generated enter/exit names ("E" / "X").
    pub fn prefix(&self) -> &'static str {
        match self {
            Which::Enter => "E",
            Which::Exit => "X",
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Which::Enter => "enter",
            Which::Exit => "exit",
        }
    }
}

/// Which runtime library class a state maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    State,
    Cluster,
    Set,
}

/// The state a parse-time enter/exit hook refers to.
pub struct StateHook {
    pub full_name: String,
    pub class: StateClass,
    /// User-specified derived class, overriding the library class.
    pub derived: Option<String>,
}

/// The event a parse-time precondition hook refers to.
pub struct EventHook {
    pub name: String,
    /// Full formal parameter list, base-event parameters first.
    pub params: Vec<FnParam>,
}

/// Prefixes for compiler-synthesized auxiliary function names.
pub const PREFIX_ACTION: &str = "A";
pub const PREFIX_CONDITION: &str = "C";
pub const PREFIX_ENTER: &str = "E";
pub const PREFIX_EXIT: &str = "X";
pub const PREFIX_TARGET: &str = "T";

/// A code generator for one backend language.
pub trait CodeGenerator {
    fn lang(&self) -> Lang;

    /// Filename extensions for the declaration and definition files.
    fn file_exts(&self) -> (&'static str, &'static str);

    /// Emit a line directive pointing back at the CHSM source.
    fn source_line(&self, out: &mut String, cx: &AuxCx, line: u32);

    // Parse-time hooks: each writes the opening or closing of one
    // auxiliary-function body around a raw user-code chunk.
    fn action_block_begin(&self, out: &mut String, cx: &AuxCx, id: u32, line: u32);
    fn action_block_end(&self, out: &mut String);
    fn condition_expr_begin(&self, out: &mut String, cx: &AuxCx, id: u32, line: u32);
    fn condition_expr_end(&self, out: &mut String);
    fn transition_target_begin(&self, out: &mut String, cx: &AuxCx, id: u32, line: u32);
    fn transition_target_end(&self, out: &mut String);
    fn enter_exit_begin(
        &self,
        out: &mut String,
        cx: &AuxCx,
        which: Which,
        state: &StateHook,
        line: u32,
    );
    fn enter_exit_end(&self, out: &mut String);
    fn precondition_expr_begin(&self, out: &mut String, cx: &AuxCx, event: &EventHook, line: u32);
    fn precondition_expr_end(&self, out: &mut String, cx: &AuxCx, event: &EventHook);
    fn precondition_func_begin(&self, out: &mut String, cx: &AuxCx, event: &EventHook, line: u32);
    fn precondition_func_end(&self, out: &mut String, cx: &AuxCx, event: &EventHook);

    /// Emit the whole machine after parsing and validation.  `user_code` is
    /// the accumulated contents of the user-code sink.
    fn emit(&self, cc: &Compiler, user_code: &str, opts: &EmitOpts, out: &mut Streams);
}

/// Create a code generator for the given language.
pub fn create(lang: Lang) -> Box<dyn CodeGenerator> {
    match lang {
        Lang::Cpp => Box::new(cpp::CppGenerator),
        Lang::Java => Box::new(java::JavaGenerator),
    }
}

/// A visitor over the IR, one method per info kind.
pub trait InfoVisitor {
    fn visit_chsm(&mut self, cc: &Compiler, sym: SymbolId, data: &ChsmData);
    fn visit_cluster(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData, history: bool);
    fn visit_set(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData);
    fn visit_state(&mut self, cc: &Compiler, sym: SymbolId, data: &StateData);
    fn visit_event(&mut self, cc: &Compiler, sym: SymbolId, data: &EventData);
    fn visit_user_event(&mut self, cc: &Compiler, sym: SymbolId, data: &UserEventData);
    fn visit_transition(&mut self, cc: &Compiler, transition: &Transition);
}

/// Dispatch a symbol's innermost info to the matching visitor method.
/// Placeholder infos have no emission and are ignored.
pub fn accept(cc: &Compiler, sym: SymbolId, visitor: &mut dyn InfoVisitor) {
    let Some(info) = cc.symtab.info(sym) else {
        return;
    };
    match &info.kind {
        InfoKind::Chsm(data) => visitor.visit_chsm(cc, sym, data),
        InfoKind::Cluster { parent, history, .. } => {
            visitor.visit_cluster(cc, sym, parent, *history)
        }
        InfoKind::Set(parent) => visitor.visit_set(cc, sym, parent),
        InfoKind::State(data) => visitor.visit_state(cc, sym, data),
        InfoKind::Event(data) => visitor.visit_event(cc, sym, data),
        InfoKind::UserEvent(data) => visitor.visit_user_event(cc, sym, data),
        InfoKind::Child(_) | InfoKind::Global => {}
    }
}

/// The banner comment prefix every generated section heading uses.
pub fn section_comment(title: &str) -> String {
    format!("///// chsmc: {}\n", title)
}

/// The generated-code version banner.
pub fn version_banner() -> String {
    section_comment(&format!("<<chsmc {}>>", env!("CARGO_PKG_VERSION")))
}

/// `n` levels of two-space indentation.
pub fn ind(n: usize) -> String {
    "  ".repeat(n)
}

/// The base name of a dotted state name: `root.trunk.leaf` -> `leaf`.
pub fn state_base_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Turn a file name into a legal identifier for include guards.
pub fn identify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ext_map() {
        assert_eq!(Lang::from_ext("chsmc"), Some(Lang::Cpp));
        assert_eq!(Lang::from_ext("chsmj"), Some(Lang::Java));
        assert_eq!(Lang::from_ext("txt"), None);
    }

    #[test]
    fn test_lang_names() {
        assert_eq!(Lang::from_name("c++"), Some(Lang::Cpp));
        assert_eq!(Lang::from_name("Java"), Some(Lang::Java));
        assert_eq!(Lang::from_name("go"), None);
    }

    #[test]
    fn test_state_base_name() {
        assert_eq!(state_base_name("root.trunk.leaf"), "leaf");
        assert_eq!(state_base_name("s"), "s");
    }

    #[test]
    fn test_identify() {
        assert_eq!(identify("my-machine.chsmc"), "my_machine_chsmc");
    }
}
