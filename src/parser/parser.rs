//! Parser for CHSM Source
//!
//! The parser drives the grammar, creates symbols and info records, wires
//! them together, and streams auxiliary-function bodies into the user-code
//! sink as it captures host-language chunks.
//!
//! Grammar (simplified):
//!   unit        ::= [%{ declarations %}] chsm_decl
//!   chsm_decl   ::= 'chsm' ['public'] NAME [: TYPE] ( PARAMS )
//!                   ['history'] 'is' '{' body '}'
//!   body        ::= (state | cluster | set | event | transition)*
//!   state       ::= 'state' NAME [: TYPE] upon* ('is' '{' transition* '}' | ';')
//!   cluster     ::= 'cluster' NAME [: TYPE] '(' children ')'
//!                   ['history'|'deep'] upon* 'is' '{' body '}'
//!   set         ::= 'set' NAME [: TYPE] '(' children ')' upon* 'is' '{' body '}'
//!   upon        ::= 'upon' ('enter'|'exit') %{ ACTION %}
//!   event       ::= 'event' NAME ['<' BASE '>'] [( PARAMS )]
//!                   ['[' EXPR ']' | %{ CODE %}] ';'
//!   transition  ::= trigger (',' trigger)* '->' target
//!                   ['[' COND ']'] [%{ ACTION %}] ';'
//!   trigger     ::= dotted_name | 'enter' '(' dotted_name ')'
//!                 | 'exit' '(' dotted_name ')'
//!   target      ::= dotted_name | '...' | '$' '{' EXPR '}'
//!
//! Errors are reported and parsing resynchronizes at the next declaration;
//! a non-zero error count suppresses code generation.

use crate::codegen::mangle::mangle;
use crate::codegen::sink::UserCode;
use crate::codegen::{AuxCx, CodeGenerator, EventHook, StateClass, StateHook, Which};
use crate::compiler::{internal_error, Compiler};
use crate::parser::lexer::{ChunkClose, Lexer, LexerError, Mode, Token, TokenType};
use crate::parser::param::{scanner_for, FnParam};
use crate::parser::sem::SemStack;
use crate::symbol::info::{
    ChildData, ChsmData, EventData, EventKind, IdCounters, Info, InfoKind, ParentData,
    Precondition, StateData, UserEventData,
};
use crate::symbol::table::{SymbolId, SCOPE_GLOBAL};

/// Errors that abort parsing outright.
#[derive(Debug)]
pub enum ParseFatal {
    /// A lexical failure; the message is already location-qualified.
    Source(String),
    /// The user-code sink failed.
    Sink(std::io::Error),
}

type PResult<T> = Result<T, ParseFatal>;

/// Trigger tags carried on the semantic stack while a transition's
/// right-hand side is parsed.
const TRIGGER_STATE: i32 = 0;
const TRIGGER_EVENT: i32 = 1;

/// Parse a whole source text into the compiler context.
pub fn parse(
    source: &str,
    cc: &mut Compiler,
    gen: &dyn CodeGenerator,
    sink: &mut UserCode,
    line_directives: bool,
) -> Result<(), ParseFatal> {
    let mut parser = Parser::new(source, cc, gen, sink, line_directives);
    parser.parse_unit()
}

struct Parser<'a> {
    lexer: Lexer,
    tok: Token,
    cc: &'a mut Compiler,
    gen: &'a dyn CodeGenerator,
    sink: &'a mut UserCode,
    sem: SemStack,
    line_directives: bool,
    /// The machine's name, cached for auxiliary emission.
    machine: String,
    root: Option<SymbolId>,
    /// A leading `%{ ... %}` block seen before the `chsm` declaration.
    pending_declarations: Option<(u32, String)>,
}

impl<'a> Parser<'a> {
    fn new(
        source: &str,
        cc: &'a mut Compiler,
        gen: &'a dyn CodeGenerator,
        sink: &'a mut UserCode,
        line_directives: bool,
    ) -> Self {
        Self {
            lexer: Lexer::new(source),
            tok: Token {
                token_type: TokenType::Eof,
                value: String::new(),
                line: 1,
                column: 1,
            },
            cc,
            gen,
            sink,
            sem: SemStack::new(),
            line_directives,
            machine: String::new(),
            root: None,
            pending_declarations: None,
        }
    }

    ////////// token plumbing //////////////////////////////////////////////

    fn advance(&mut self) -> PResult<()> {
        match self.lexer.next_token() {
            Ok(tok) => {
                self.tok = tok;
                Ok(())
            }
            Err(e) => Err(self.fatal(e)),
        }
    }

    fn fatal(&self, e: LexerError) -> ParseFatal {
        let msg = if self.cc.source_path.is_empty() {
            format!("line {}: fatal error: {}", e.line, e.message)
        } else {
            format!(
                "\"{}\", line {}: fatal error: {}",
                self.cc.source_path, e.line, e.message
            )
        };
        ParseFatal::Source(msg)
    }

    fn check(&self, tt: TokenType) -> bool {
        self.tok.token_type == tt
    }

    fn accept(&mut self, tt: TokenType) -> PResult<bool> {
        if self.check(tt) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consume a token of the given type, or report an error and return
    /// `None` leaving the token in place.
    fn expect(&mut self, tt: TokenType) -> PResult<Option<Token>> {
        if self.check(tt) {
            let tok = self.tok.clone();
            self.advance()?;
            Ok(Some(tok))
        } else {
            let found = if self.check(TokenType::Eof) {
                "end of file".to_string()
            } else {
                format!("\"{}\"", self.tok.value)
            };
            self.cc.diags.error(
                self.tok.line,
                format!("{}: unexpected; {} expected", found, tt.as_str()),
            );
            Ok(None)
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let line = self.tok.line;
        self.cc.diags.error(line, message.into());
    }

    /// Skip to the next `;` (consumed) or to a closing `}` / end of file
    /// (left in place), so parsing can resume at the next declaration.
    fn resync(&mut self) -> PResult<()> {
        loop {
            match self.tok.token_type {
                TokenType::Semicolon => {
                    self.advance()?;
                    return Ok(());
                }
                TokenType::RBrace | TokenType::Eof => return Ok(()),
                _ => self.advance()?,
            }
        }
    }

    /// Capture a host-language chunk.  The current token must be the
    /// opening delimiter, already consumed from the input.
    fn capture(&mut self, mode: Mode) -> PResult<Token> {
        self.lexer.push_mode(mode);
        self.advance()?;
        let chunk = self.tok.clone();
        self.lexer.pop_mode();
        self.advance()?;
        Ok(chunk)
    }

    fn sink_write(&mut self, text: &str) -> PResult<()> {
        self.sink.write(text).map_err(ParseFatal::Sink)
    }

    fn aux_parts(&self) -> (String, String) {
        (self.machine.clone(), self.cc.source_path.clone())
    }

    ////////// grammar /////////////////////////////////////////////////////

    fn parse_unit(&mut self) -> PResult<()> {
        self.advance()?;

        if self.check(TokenType::PercentLBrace) {
            let chunk = self.capture(Mode::HostExpr(ChunkClose::PercentBrace))?;
            self.pending_declarations = Some((chunk.line, chunk.value));
        }

        if self.check(TokenType::Chsm) {
            self.parse_chsm()?;
        } else {
            self.error_here("\"chsm\" declaration expected");
            return Ok(());
        }

        if !self.check(TokenType::Eof) {
            self.error_here("text after machine description");
        }
        Ok(())
    }

    fn parse_chsm(&mut self) -> PResult<()> {
        let line = self.tok.line;
        self.advance()?; // chsm

        let public = self.accept(TokenType::Public)?;

        let Some(name) = self.expect(TokenType::Identifier)? else {
            self.resync()?;
            return Ok(());
        };

        let derived = if self.check(TokenType::Colon) {
            Some(self.capture(Mode::HostClass)?.value)
        } else {
            None
        };

        let mut params = Vec::new();
        if self.check(TokenType::LParen) {
            let chunk = self.capture(Mode::HostParams)?;
            params = self.scan_params(&chunk);
        } else {
            self.expect(TokenType::LParen)?;
        }

        let history = self.accept(TokenType::History)?;

        self.expect(TokenType::Is)?;
        self.expect(TokenType::LBrace)?;

        // Create the machine and root-cluster records.
        let sy_chsm = self.cc.symtab.entry(&name.value);
        self.check_not_exists(sy_chsm, line);
        let sy_root = self.cc.symtab.entry("root");
        self.cc.symtab.insert_info(
            sy_root,
            Info {
                scope: SCOPE_GLOBAL,
                first_ref: line,
                used: false,
                kind: InfoKind::Cluster {
                    parent: ParentData {
                        state: StateData {
                            parent: None,
                            derived: None,
                            id: 0,
                            action: Default::default(),
                            event: Default::default(),
                        },
                        children: Vec::new(),
                    },
                    history,
                    deep: false,
                },
            },
        );
        self.cc.symtab.insert_info(
            sy_chsm,
            Info {
                scope: SCOPE_GLOBAL,
                first_ref: line,
                used: false,
                kind: InfoKind::Chsm(ChsmData {
                    root: sy_root,
                    derived,
                    public,
                    params,
                    ids: IdCounters::default(),
                    states: Vec::new(),
                    events: Vec::new(),
                    transitions: Vec::new(),
                    declarations: self.pending_declarations.take(),
                }),
            },
        );
        self.cc.chsm = Some(sy_chsm);
        self.machine = name.value;
        self.root = Some(sy_root);

        self.parse_body(sy_root, false)?;

        self.expect(TokenType::RBrace)?;
        self.accept(TokenType::Semicolon)?;
        Ok(())
    }

    fn parse_body(&mut self, parent: SymbolId, deep: bool) -> PResult<()> {
        loop {
            match self.tok.token_type {
                TokenType::RBrace | TokenType::Eof => return Ok(()),
                TokenType::State => self.parse_state(parent)?,
                TokenType::Cluster => self.parse_parent(parent, true, deep)?,
                TokenType::Set => self.parse_parent(parent, false, deep)?,
                TokenType::Event => self.parse_event()?,
                TokenType::Semicolon => self.advance()?,
                TokenType::Identifier | TokenType::Enter | TokenType::Exit => {
                    self.parse_transition(parent)?
                }
                _ => {
                    let value = self.tok.value.clone();
                    self.error_here(format!("\"{}\": unexpected", value));
                    self.resync()?;
                }
            }
        }
    }

    ////////// states //////////////////////////////////////////////////////

    fn full_name(&self, parent: SymbolId, base: &str) -> String {
        if Some(parent) == self.root {
            base.to_string()
        } else {
            format!("{}.{}", self.cc.symtab.name(parent), base)
        }
    }

    /// Create (or upgrade) the symbol for a newly defined state, assign its
    /// serial id, and link it to its parent.
    fn define_state(
        &mut self,
        parent: SymbolId,
        base: &str,
        full: &str,
        line: u32,
        kind: InfoKind,
    ) -> SymbolId {
        // A state inside a cluster or set must appear in the child list.
        if Some(parent) != self.root {
            let listed = match self.cc.symtab.lookup(base) {
                Some((_, info)) => match &info.kind {
                    InfoKind::Child(child) => Some(child.parent == parent),
                    _ => None,
                },
                None => None,
            };
            match listed {
                Some(true) => {
                    let child_sym = self.cc.symtab.id(base);
                    if let Some(info) = child_sym.and_then(|s| self.cc.symtab.info_mut(s)) {
                        if let InfoKind::Child(child) = &mut info.kind {
                            child.defined = true;
                        }
                    }
                }
                _ => {
                    let parent_name = self.cc.symtab.name(parent).to_string();
                    self.cc.diags.error(
                        line,
                        format!(
                            "\"{}\" not in the child list of \"{}\"",
                            base, parent_name
                        ),
                    );
                }
            }
        }

        let sym = self.cc.symtab.entry(full);
        let id = self
            .cc
            .chsm_data()
            .map(|d| d.states.len() as i32 + 1)
            .unwrap_or(1);
        let mut kind = kind;
        if let Some(state) = kind.as_state_mut() {
            state.id = id;
        }

        match self.cc.symtab.info_mut(sym) {
            None => {
                self.cc.symtab.insert_info(
                    sym,
                    Info {
                        scope: SCOPE_GLOBAL,
                        first_ref: line,
                        used: false,
                        kind,
                    },
                );
            }
            Some(info) => {
                match info.kind {
                    InfoKind::Global => {}
                    _ => {
                        let prior = info.kind.kind_name();
                        let msg =
                            format!("\"{}\" previously declared/defined as {}", full, prior);
                        self.cc.diags.error(line, msg);
                    }
                }
                if let Some(info) = self.cc.symtab.info_mut(sym) {
                    info.kind = kind;
                }
            }
        }

        if let Some(chsm) = self.cc.chsm_data_mut() {
            chsm.states.push(sym);
        }
        if let Some(info) = self.cc.symtab.info_mut(parent) {
            if let Some(data) = info.kind.as_parent_mut() {
                data.children.push(sym);
            }
        }
        sym
    }

    fn parse_state(&mut self, parent: SymbolId) -> PResult<()> {
        let line = self.tok.line;
        self.advance()?; // state

        let Some(name) = self.expect(TokenType::Identifier)? else {
            self.resync()?;
            return Ok(());
        };
        let full = self.full_name(parent, &name.value);

        let derived = if self.check(TokenType::Colon) {
            Some(self.capture(Mode::HostClass)?.value)
        } else {
            None
        };

        let sym = self.define_state(
            parent,
            &name.value,
            &full,
            line,
            InfoKind::State(StateData {
                parent: Some(parent),
                derived,
                id: 0,
                action: Default::default(),
                event: Default::default(),
            }),
        );

        self.parse_upon_clauses(sym)?;

        if self.accept(TokenType::Is)? {
            self.expect(TokenType::LBrace)?;
            self.parse_transition_block(sym)?;
            self.expect(TokenType::RBrace)?;
            self.accept(TokenType::Semicolon)?;
        } else {
            self.expect(TokenType::Semicolon)?;
        }
        Ok(())
    }

    fn parse_transition_block(&mut self, state: SymbolId) -> PResult<()> {
        loop {
            match self.tok.token_type {
                TokenType::RBrace | TokenType::Eof => return Ok(()),
                TokenType::Semicolon => self.advance()?,
                TokenType::Identifier | TokenType::Enter | TokenType::Exit => {
                    self.parse_transition(state)?
                }
                _ => {
                    let value = self.tok.value.clone();
                    self.error_here(format!("\"{}\": unexpected in transition list", value));
                    self.resync()?;
                }
            }
        }
    }

    fn parse_parent(&mut self, parent: SymbolId, is_cluster: bool, deep: bool) -> PResult<()> {
        let line = self.tok.line;
        self.advance()?; // cluster | set

        let Some(name) = self.expect(TokenType::Identifier)? else {
            self.resync()?;
            return Ok(());
        };
        let full = self.full_name(parent, &name.value);

        let derived = if self.check(TokenType::Colon) {
            Some(self.capture(Mode::HostClass)?.value)
        } else {
            None
        };

        let parent_data = ParentData {
            state: StateData {
                parent: Some(parent),
                derived,
                id: 0,
                action: Default::default(),
                event: Default::default(),
            },
            children: Vec::new(),
        };
        let kind = if is_cluster {
            InfoKind::Cluster {
                parent: parent_data,
                history: false,
                deep: false,
            }
        } else {
            InfoKind::Set(parent_data)
        };
        let sym = self.define_state(parent, &name.value, &full, line, kind);

        // Child list: each name becomes a placeholder in the body's scope,
        // which is one deeper than the current one.
        if self.expect(TokenType::LParen)?.is_some() {
            self.parse_child_list(sym)?;
        }

        // history / deep modifier
        let mut history = false;
        let mut is_deep = false;
        if self.check(TokenType::History) || self.check(TokenType::Deep) {
            if is_cluster {
                if self.accept(TokenType::History)? {
                    history = true;
                } else if self.accept(TokenType::Deep)? {
                    is_deep = true;
                    history = true;
                }
            } else {
                self.error_here("a set cannot have a history");
                self.advance()?;
            }
        }
        if deep {
            history = true;
            is_deep = true;
        }
        if is_cluster {
            if let Some(info) = self.cc.symtab.info_mut(sym) {
                if let InfoKind::Cluster {
                    history: h,
                    deep: d,
                    ..
                } = &mut info.kind
                {
                    *h = history;
                    *d = is_deep;
                }
            }
        }

        self.parse_upon_clauses(sym)?;

        self.expect(TokenType::Is)?;
        self.expect(TokenType::LBrace)?;

        self.cc.symtab.open_scope();
        self.parse_body(sym, is_deep)?;
        crate::validate::check_children_defined(self.cc);
        self.cc.symtab.close_scope();

        self.expect(TokenType::RBrace)?;
        self.accept(TokenType::Semicolon)?;
        Ok(())
    }

    fn parse_child_list(&mut self, parent: SymbolId) -> PResult<()> {
        if self.accept(TokenType::RParen)? {
            return Ok(()); // empty child list
        }
        loop {
            let Some(name) = self.expect(TokenType::Identifier)? else {
                self.resync()?;
                return Ok(());
            };
            let child_scope = self.cc.symtab.current_scope() + 1;
            let sym = self.cc.symtab.entry(&name.value);
            let duplicate = matches!(
                self.cc.symtab.info(sym),
                Some(Info {
                    scope,
                    kind: InfoKind::Child(child),
                    ..
                }) if *scope == child_scope && child.parent == parent
            );
            if duplicate {
                let msg = format!("\"{}\" duplicated in child list", name.value);
                self.cc.diags.error(name.line, msg);
            } else {
                self.cc.symtab.insert_info(
                    sym,
                    Info {
                        scope: child_scope,
                        first_ref: name.line,
                        used: false,
                        kind: InfoKind::Child(ChildData {
                            parent,
                            defined: false,
                        }),
                    },
                );
            }
            if !self.accept(TokenType::Comma)? {
                break;
            }
        }
        self.expect(TokenType::RParen)?;
        Ok(())
    }

    fn parse_upon_clauses(&mut self, sym: SymbolId) -> PResult<()> {
        while self.check(TokenType::Upon) {
            self.advance()?;
            let which = if self.accept(TokenType::Enter)? {
                Which::Enter
            } else if self.accept(TokenType::Exit)? {
                Which::Exit
            } else {
                self.error_here("\"enter\" or \"exit\" expected after \"upon\"");
                self.resync()?;
                continue;
            };

            if !self.check(TokenType::PercentLBrace) {
                self.error_here("%{ expected");
                self.resync()?;
                continue;
            }
            let chunk = self.capture(Mode::HostExpr(ChunkClose::PercentBrace))?;

            // Record the action on the state.
            let mut already = false;
            if let Some(info) = self.cc.symtab.info_mut(sym) {
                if let Some(state) = info.kind.as_state_mut() {
                    let flag = match which {
                        Which::Enter => &mut state.action.has_enter,
                        Which::Exit => &mut state.action.has_exit,
                    };
                    already = *flag;
                    *flag = true;
                }
            }
            if already {
                let msg = format!("{} action already specified", which.keyword());
                self.cc.diags.error(chunk.line, msg);
                continue;
            }

            let hook = self.state_hook(sym);
            let (machine, path) = self.aux_parts();
            let cx = AuxCx {
                machine: &machine,
                source_path: &path,
                line_directives: self.line_directives,
            };
            let mut buf = String::new();
            self.gen.enter_exit_begin(&mut buf, &cx, which, &hook, chunk.line);
            buf.push_str(&chunk.value);
            if !chunk.value.ends_with('\n') {
                buf.push('\n');
            }
            self.gen.enter_exit_end(&mut buf);
            self.sink_write(&buf)?;
        }
        Ok(())
    }

    fn state_hook(&self, sym: SymbolId) -> StateHook {
        let full_name = self.cc.symtab.name(sym).to_string();
        let (class, derived) = match self.cc.symtab.info(sym).map(|i| &i.kind) {
            Some(InfoKind::Cluster { parent, .. }) => {
                (StateClass::Cluster, parent.state.derived.clone())
            }
            Some(InfoKind::Set(parent)) => (StateClass::Set, parent.state.derived.clone()),
            Some(InfoKind::State(state)) => (StateClass::State, state.derived.clone()),
            _ => (StateClass::State, None),
        };
        StateHook {
            full_name,
            class,
            derived,
        }
    }

    ////////// events //////////////////////////////////////////////////////

    fn scan_params(&mut self, chunk: &Token) -> Vec<FnParam> {
        if chunk.value.trim().is_empty() {
            return Vec::new();
        }
        match scanner_for(self.gen.lang()).scan(&chunk.value, chunk.line) {
            Ok(params) => params,
            Err(e) => {
                self.cc.diags.error(chunk.line, format!("parameter list: {}", e));
                Vec::new()
            }
        }
    }

    fn parse_event(&mut self) -> PResult<()> {
        let line = self.tok.line;
        self.advance()?; // event

        let Some(name) = self.expect(TokenType::Identifier)? else {
            self.resync()?;
            return Ok(());
        };

        let base = if self.accept(TokenType::LAngle)? {
            let base = match self.expect(TokenType::Identifier)? {
                Some(tok) => {
                    let found = match self.cc.symtab.lookup(&tok.value) {
                        Some((id, info)) if info.kind.as_user_event().is_some() => Some(id),
                        _ => None,
                    };
                    if found.is_none() {
                        let msg = format!("base event \"{}\" not defined", tok.value);
                        self.cc.diags.error(tok.line, msg);
                    }
                    found
                }
                None => None,
            };
            self.expect(TokenType::RAngle)?;
            base
        } else {
            None
        };

        let params = if self.check(TokenType::LParen) {
            let chunk = self.capture(Mode::HostParams)?;
            self.scan_params(&chunk)
        } else {
            Vec::new()
        };

        let sym = self.cc.symtab.entry(&name.value);
        self.check_not_exists(sym, line);
        let info = Info {
            scope: SCOPE_GLOBAL,
            first_ref: line,
            used: false,
            kind: InfoKind::UserEvent(UserEventData {
                event: EventData {
                    kind: EventKind::User,
                    state: None,
                    transition_ids: Vec::new(),
                },
                base,
                params,
                precondition: Precondition::None,
            }),
        };
        match self.cc.symtab.info_mut(sym) {
            Some(existing) => *existing = info,
            None => self.cc.symtab.insert_info(sym, info),
        }
        if let Some(chsm) = self.cc.chsm_data_mut() {
            chsm.events.push(sym);
        }

        // Optional precondition: expression or function form.
        if self.check(TokenType::LBracket) {
            let chunk = self.capture(Mode::HostExpr(ChunkClose::Bracket))?;
            self.set_precondition(sym, Precondition::Expr);
            self.emit_precondition(sym, &chunk, Precondition::Expr)?;
        } else if self.check(TokenType::PercentLBrace) {
            let chunk = self.capture(Mode::HostExpr(ChunkClose::PercentBrace))?;
            self.set_precondition(sym, Precondition::Func);
            self.emit_precondition(sym, &chunk, Precondition::Func)?;
        }

        self.expect(TokenType::Semicolon)?;
        Ok(())
    }

    fn set_precondition(&mut self, sym: SymbolId, precondition: Precondition) {
        if let Some(info) = self.cc.symtab.info_mut(sym) {
            if let InfoKind::UserEvent(data) = &mut info.kind {
                data.precondition = precondition;
            }
        }
    }

    fn emit_precondition(
        &mut self,
        sym: SymbolId,
        chunk: &Token,
        form: Precondition,
    ) -> PResult<()> {
        let hook = EventHook {
            name: self.cc.symtab.name(sym).to_string(),
            params: crate::symbol::info::collect_params(&self.cc.symtab, sym),
        };
        let (machine, path) = self.aux_parts();
        let cx = AuxCx {
            machine: &machine,
            source_path: &path,
            line_directives: self.line_directives,
        };
        let mut buf = String::new();
        match form {
            Precondition::Expr => {
                self.gen
                    .precondition_expr_begin(&mut buf, &cx, &hook, chunk.line);
                buf.push_str(&chunk.value);
                self.gen.precondition_expr_end(&mut buf, &cx, &hook);
            }
            Precondition::Func => {
                self.gen
                    .precondition_func_begin(&mut buf, &cx, &hook, chunk.line);
                buf.push_str(&chunk.value);
                if !chunk.value.ends_with('\n') {
                    buf.push('\n');
                }
                self.gen.precondition_func_end(&mut buf, &cx, &hook);
            }
            Precondition::None => {}
        }
        self.sink_write(&buf)
    }

    fn check_not_exists(&mut self, sym: SymbolId, line: u32) {
        if let Some(info) = self.cc.symtab.info(sym) {
            let prior = info.kind.kind_name();
            let name = self.cc.symtab.name(sym).to_string();
            let msg = format!("\"{}\" previously declared/defined as {}", name, prior);
            self.cc.diags.error(line, msg);
        }
    }

    ////////// transitions /////////////////////////////////////////////////

    fn dotted_name(&mut self) -> PResult<Option<Token>> {
        let Some(mut name) = self.expect(TokenType::Identifier)? else {
            return Ok(None);
        };
        while self.check(TokenType::Dot) {
            self.advance()?;
            let Some(part) = self.expect(TokenType::Identifier)? else {
                return Ok(Some(name));
            };
            name.value.push('.');
            name.value.push_str(&part.value);
        }
        Ok(Some(name))
    }

    /// Resolve a possibly-relative dotted state name to its symbol,
    /// creating a forward-reference placeholder if it is not defined yet.
    fn resolve_state(&mut self, dotted: &str, line: u32) -> SymbolId {
        let (first, rest) = match dotted.find('.') {
            Some(pos) => (&dotted[..pos], Some(&dotted[pos + 1..])),
            None => (dotted, None),
        };

        let mut full = match self.cc.symtab.lookup(first) {
            Some((id, info)) => match &info.kind {
                InfoKind::Child(child) => {
                    format!("{}.{}", self.cc.symtab.name(child.parent), first)
                }
                InfoKind::State(_)
                | InfoKind::Cluster { .. }
                | InfoKind::Set(_)
                | InfoKind::Global => self.cc.symtab.name(id).to_string(),
                _ => {
                    let prior = info.kind.kind_name();
                    let msg = format!("\"{}\" is a {}, not a state", first, prior);
                    self.cc.diags.error(line, msg);
                    first.to_string()
                }
            },
            None => first.to_string(),
        };
        if let Some(rest) = rest {
            full.push('.');
            full.push_str(rest);
        }

        let sym = self.cc.symtab.entry(&full);
        if self.cc.symtab.info(sym).is_none() {
            self.cc.symtab.insert_info(
                sym,
                Info {
                    scope: SCOPE_GLOBAL,
                    first_ref: line,
                    used: false,
                    kind: InfoKind::Global,
                },
            );
        }
        sym
    }

    /// Get or create the synthetic enter/exit event of a state.
    fn enex_event(&mut self, which: Which, state: SymbolId) -> SymbolId {
        let full = self.cc.symtab.name(state).to_string();
        let name = format!("{}{}", which.prefix(), mangle(&full));
        let line = self.tok.line;
        let sym = self.cc.symtab.entry(&name);
        if self.cc.symtab.info(sym).is_none() {
            self.cc.symtab.insert_info(
                sym,
                Info {
                    scope: SCOPE_GLOBAL,
                    first_ref: line,
                    used: false,
                    kind: InfoKind::Event(EventData {
                        kind: match which {
                            Which::Enter => EventKind::Enter,
                            Which::Exit => EventKind::Exit,
                        },
                        state: Some(state),
                        transition_ids: Vec::new(),
                    }),
                },
            );
            if let Some(chsm) = self.cc.chsm_data_mut() {
                chsm.events.push(sym);
            }
        }
        sym
    }

    fn next_aux_id(&mut self, pick: fn(&mut IdCounters) -> &mut u32) -> u32 {
        match self.cc.chsm_data_mut() {
            Some(chsm) => {
                let counter = pick(&mut chsm.ids);
                *counter += 1;
                *counter
            }
            None => internal_error("no machine record while numbering an auxiliary"),
        }
    }

    fn parse_transition(&mut self, enclosing: SymbolId) -> PResult<()> {
        let line = self.tok.line;

        // Trigger list.  Each trigger is threaded through the semantic
        // stack until the whole statement has been parsed.
        let mut count = 0usize;
        loop {
            match self.tok.token_type {
                TokenType::Enter | TokenType::Exit => {
                    let which = if self.check(TokenType::Enter) {
                        Which::Enter
                    } else {
                        Which::Exit
                    };
                    self.advance()?;
                    self.expect(TokenType::LParen)?;
                    let Some(name) = self.dotted_name()? else {
                        self.drop_triggers(count);
                        self.resync()?;
                        return Ok(());
                    };
                    self.expect(TokenType::RParen)?;
                    let state = self.resolve_state(&name.value, name.line);
                    let event = self.enex_event(which, state);
                    self.sem.push_sym(event);
                    self.sem.push_int(TRIGGER_EVENT);
                }
                TokenType::Identifier => {
                    let Some(name) = self.dotted_name()? else {
                        self.drop_triggers(count);
                        self.resync()?;
                        return Ok(());
                    };
                    let is_user_event = !name.value.contains('.')
                        && matches!(
                            self.cc.symtab.lookup(&name.value),
                            Some((_, info)) if info.kind.as_user_event().is_some()
                        );
                    if is_user_event {
                        let sym = self.cc.symtab.id(&name.value).unwrap_or_else(|| {
                            internal_error("event symbol vanished during lookup")
                        });
                        if let Some(info) = self.cc.symtab.info_mut(sym) {
                            info.used = true;
                        }
                        self.sem.push_sym(sym);
                        self.sem.push_int(TRIGGER_EVENT);
                    } else {
                        let sym = self.resolve_state(&name.value, name.line);
                        self.sem.push_sym(sym);
                        self.sem.push_int(TRIGGER_STATE);
                    }
                }
                _ => {
                    self.error_here("state or event expected");
                    self.drop_triggers(count);
                    self.resync()?;
                    return Ok(());
                }
            }
            count += 1;
            if !self.accept(TokenType::Comma)? {
                break;
            }
        }

        if self.expect(TokenType::Arrow)?.is_none() {
            self.drop_triggers(count);
            self.resync()?;
            return Ok(());
        }

        // Target: a literal state, `...` for internal, or a computed one.
        let mut to = None;
        let mut target_id = 0;
        match self.tok.token_type {
            TokenType::Ellipsis => {
                self.advance()?;
            }
            TokenType::Dollar => {
                self.advance()?;
                if self.check(TokenType::LBrace) {
                    let chunk = self.capture(Mode::HostExpr(ChunkClose::Brace))?;
                    target_id = self.next_aux_id(|ids| &mut ids.target);
                    self.emit_aux(
                        target_id,
                        &chunk,
                        AuxKind::Target,
                    )?;
                } else {
                    self.error_here("{ expected after $");
                }
            }
            TokenType::Identifier => {
                if let Some(name) = self.dotted_name()? {
                    to = Some(self.resolve_state(&name.value, name.line));
                }
            }
            _ => {
                self.error_here("target state expected");
            }
        }

        // Optional condition, then optional action.
        let mut condition_id = 0;
        if self.check(TokenType::LBracket) {
            let chunk = self.capture(Mode::HostExpr(ChunkClose::Bracket))?;
            condition_id = self.next_aux_id(|ids| &mut ids.condition);
            self.emit_aux(condition_id, &chunk, AuxKind::Condition)?;
        }
        let mut action_id = 0;
        if self.check(TokenType::PercentLBrace) {
            let chunk = self.capture(Mode::HostExpr(ChunkClose::PercentBrace))?;
            action_id = self.next_aux_id(|ids| &mut ids.action);
            self.emit_aux(action_id, &chunk, AuxKind::Action)?;
        }

        self.expect(TokenType::Semicolon)?;

        // Build one table entry per trigger, in declaration order.
        let mut triggers = Vec::with_capacity(count);
        for _ in 0..count {
            let tag = self.sem.pop_int();
            let sym = self.sem.pop_sym();
            triggers.push((tag, sym));
        }
        triggers.reverse();

        for (tag, sym) in triggers {
            let from = if tag == TRIGGER_STATE { sym } else { enclosing };
            let index = match self.cc.chsm_data_mut() {
                Some(chsm) => {
                    let index = chsm.transitions.len();
                    chsm.transitions.push(crate::symbol::info::Transition {
                        first_ref: line,
                        from,
                        to,
                        condition_id,
                        target_id,
                        action_id,
                    });
                    index
                }
                None => continue,
            };
            if tag == TRIGGER_EVENT {
                if let Some(info) = self.cc.symtab.info_mut(sym) {
                    if let Some(event) = info.kind.as_event_mut() {
                        event.transition_ids.push(index);
                    }
                }
            }
        }
        Ok(())
    }

    fn drop_triggers(&mut self, count: usize) {
        for _ in 0..count {
            self.sem.pop_int();
            self.sem.pop_sym();
        }
    }

    fn emit_aux(&mut self, id: u32, chunk: &Token, kind: AuxKind) -> PResult<()> {
        let (machine, path) = self.aux_parts();
        let cx = AuxCx {
            machine: &machine,
            source_path: &path,
            line_directives: self.line_directives,
        };
        let mut buf = String::new();
        match kind {
            AuxKind::Condition => {
                self.gen.condition_expr_begin(&mut buf, &cx, id, chunk.line);
                buf.push_str(chunk.value.trim_end());
                self.gen.condition_expr_end(&mut buf);
            }
            AuxKind::Target => {
                self.gen
                    .transition_target_begin(&mut buf, &cx, id, chunk.line);
                buf.push_str(chunk.value.trim_end());
                self.gen.transition_target_end(&mut buf);
            }
            AuxKind::Action => {
                self.gen.action_block_begin(&mut buf, &cx, id, chunk.line);
                buf.push_str(&chunk.value);
                if !chunk.value.ends_with('\n') {
                    buf.push('\n');
                }
                self.gen.action_block_end(&mut buf);
            }
        }
        self.sink_write(&buf)
    }
}

#[derive(Clone, Copy)]
enum AuxKind {
    Condition,
    Target,
    Action,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Lang;

    fn parse_source(source: &str) -> Compiler {
        let mut cc = Compiler::new("test.chsmc");
        let mut sink = UserCode::new().unwrap();
        let gen = crate::codegen::create(Lang::Cpp);
        parse(source, &mut cc, gen.as_ref(), &mut sink, true).unwrap();
        cc
    }

    #[test]
    fn test_smoke() {
        let cc = parse_source("chsm M() is { state s; }");
        assert_eq!(cc.diags.errors, 0);
        let chsm = cc.chsm_data().unwrap();
        assert_eq!(chsm.states.len(), 1);
        assert_eq!(cc.symtab.name(chsm.states[0]), "s");
        assert!(chsm.transitions.is_empty());
        let root_info = cc.symtab.info(chsm.root).unwrap();
        assert_eq!(root_info.kind.as_parent().unwrap().children.len(), 1);
    }

    #[test]
    fn test_nested_names_are_qualified() {
        let cc = parse_source("chsm M() is { cluster c(a,b) is { state a; state b; a -> b; } }");
        assert_eq!(cc.diags.errors, 0);
        let chsm = cc.chsm_data().unwrap();
        let names: Vec<&str> = chsm
            .states
            .iter()
            .map(|&s| cc.symtab.name(s))
            .collect();
        assert_eq!(names, vec!["c", "c.a", "c.b"]);
        assert_eq!(chsm.transitions.len(), 1);
        let t = &chsm.transitions[0];
        assert_eq!(cc.symtab.name(t.from), "c.a");
        assert_eq!(cc.symtab.name(t.to.unwrap()), "c.b");
    }

    #[test]
    fn test_serial_ids_are_declaration_order() {
        let cc = parse_source("chsm M() is { cluster c(a,b) is { state a; state b; } }");
        let chsm = cc.chsm_data().unwrap();
        let ids: Vec<i32> = chsm
            .states
            .iter()
            .map(|&s| cc.symtab.info(s).unwrap().kind.as_state().unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_forward_reference_upgraded() {
        let cc = parse_source("chsm M() is { state a; a -> b; state b; }");
        assert_eq!(cc.diags.errors, 0);
        let chsm = cc.chsm_data().unwrap();
        assert_eq!(chsm.transitions.len(), 1);
        let to = chsm.transitions[0].to.unwrap();
        // Upgraded from a forward placeholder to a real state with an id.
        let info = cc.symtab.info(to).unwrap();
        assert_eq!(info.kind.as_state().unwrap().id, 2);
    }

    #[test]
    fn test_event_trigger_records_transition() {
        let cc = parse_source("chsm M() is { event e; state a; state b; a is { e -> b; } }");
        assert_eq!(cc.diags.errors, 0);
        let chsm = cc.chsm_data().unwrap();
        assert_eq!(chsm.transitions.len(), 1);
        assert_eq!(cc.symtab.name(chsm.transitions[0].from), "a");
        let (_, info) = cc.symtab.lookup("e").unwrap();
        assert_eq!(info.kind.as_event().unwrap().transition_ids, vec![0]);
        assert!(info.used);
    }

    #[test]
    fn test_enter_trigger_creates_synthetic_event() {
        let cc = parse_source("chsm M() is { state a; state b; a is { enter(b) -> b; } }");
        assert_eq!(cc.diags.errors, 0);
        let (_, info) = cc.symtab.lookup("EM1b").unwrap();
        let event = info.kind.as_event().unwrap();
        assert_eq!(event.kind, EventKind::Enter);
        assert_eq!(event.transition_ids, vec![0]);
    }

    #[test]
    fn test_event_parameters_and_inheritance() {
        let cc = parse_source(
            "chsm M() is { event base(int x); event d<base>(int y); state s; }",
        );
        assert_eq!(cc.diags.errors, 0);
        let (d, info) = cc.symtab.lookup("d").unwrap();
        let data = info.kind.as_user_event().unwrap();
        assert!(data.base.is_some());
        assert_eq!(data.params.len(), 1);
        assert_eq!(data.params[0].name, "y");
        assert!(crate::symbol::info::has_any_parameters(&cc.symtab, d));
    }

    #[test]
    fn test_undefined_child_is_an_error() {
        let cc = parse_source("chsm M() is { cluster c(a,b) is { state a; } }");
        assert!(cc.diags.errors > 0);
    }

    #[test]
    fn test_duplicate_definition_reported() {
        let cc = parse_source("chsm M() is { state s; state s; }");
        assert!(cc.diags.errors > 0);
    }

    #[test]
    fn test_deep_history_propagates() {
        let cc = parse_source(
            "chsm M() is { cluster c(i) deep is { cluster i(x) is { state x; } } }",
        );
        assert_eq!(cc.diags.errors, 0);
        let (_, info) = cc.symtab.lookup("c.i").unwrap();
        match &info.kind {
            InfoKind::Cluster { history, deep, .. } => {
                assert!(*history);
                assert!(*deep);
            }
            _ => panic!("expected a cluster"),
        }
    }

    #[test]
    fn test_internal_transition_has_no_target() {
        let cc = parse_source("chsm M() is { event e; state a; a is { e -> ...; } }");
        assert_eq!(cc.diags.errors, 0);
        let chsm = cc.chsm_data().unwrap();
        assert!(chsm.transitions[0].to.is_none());
        assert_eq!(chsm.transitions[0].target_id, 0);
    }

    #[test]
    fn test_computed_target_allocates_id() {
        let cc = parse_source(
            "chsm M() is { event e; state a; state b; a is { e -> $ { &b } ; } }",
        );
        assert_eq!(cc.diags.errors, 0);
        let chsm = cc.chsm_data().unwrap();
        assert!(chsm.transitions[0].to.is_none());
        assert_eq!(chsm.transitions[0].target_id, 1);
        assert_eq!(chsm.ids.target, 1);
    }

    #[test]
    fn test_condition_and_action_ids() {
        let cc = parse_source(
            "chsm M() is { event e; state a; state b; a is { e -> b [ x > 0 ] %{ act(); %}; } }",
        );
        assert_eq!(cc.diags.errors, 0);
        let chsm = cc.chsm_data().unwrap();
        assert_eq!(chsm.transitions[0].condition_id, 1);
        assert_eq!(chsm.transitions[0].action_id, 1);
    }

    #[test]
    fn test_history_recorded_on_cluster() {
        let cc = parse_source("chsm M() is { cluster c(a,b) history is { state a; state b; } }");
        let (_, info) = cc.symtab.lookup("c").unwrap();
        match &info.kind {
            InfoKind::Cluster { history, .. } => assert!(*history),
            _ => panic!("expected a cluster"),
        }
    }

    #[test]
    fn test_parse_error_recovers() {
        let cc = parse_source("chsm M() is { state ; state s; }");
        assert!(cc.diags.errors > 0);
        // The second state still parsed.
        assert!(cc.symtab.lookup("s").is_some());
    }

    #[test]
    fn test_leading_declarations_block() {
        let cc = parse_source("%{ #include <x.h> %} chsm M() is { state s; }");
        let chsm = cc.chsm_data().unwrap();
        let (_, text) = chsm.declarations.as_ref().unwrap();
        assert!(text.contains("#include <x.h>"));
    }

    #[test]
    fn test_chsm_constructor_params() {
        let cc = parse_source("chsm M( int limit ) is { state s; }");
        let chsm = cc.chsm_data().unwrap();
        assert_eq!(chsm.params.len(), 1);
        assert_eq!(chsm.params[0].name, "limit");
    }

    #[test]
    fn test_unused_event_not_marked() {
        let cc = parse_source("chsm M() is { event e; state s; }");
        let (_, info) = cc.symtab.lookup("e").unwrap();
        assert!(!info.used);
    }
}
