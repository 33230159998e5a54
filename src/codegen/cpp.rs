//! C++ code generator
//!
//! Emits a declaration stream (the header) and a definition stream (the
//! implementation).  Each state becomes a nested class deriving from the
//! runtime library's `state`, `cluster`, or `set`; each event becomes a
//! class with a `param_block` hierarchy mirroring event inheritance;
//! transitions become one flat `transition_[]` table the runtime indexes
//! into.

use crate::codegen::mangle::{demangle, mangle};
use crate::codegen::{
    accept, ind, section_comment, state_base_name, version_banner, AuxCx, CodeGenerator, EmitOpts,
    EventHook, InfoVisitor, Lang, StateClass, StateHook, Streams, Which, PREFIX_ACTION,
    PREFIX_CONDITION, PREFIX_ENTER, PREFIX_EXIT, PREFIX_TARGET,
};
use crate::compiler::Compiler;
use crate::parser::param::{
    emit_param_list, EMIT_ACTUAL, EMIT_COMMA, EMIT_FORMAL, EMIT_PREFIX,
};
use crate::symbol::info::{
    collect_params, has_any_parameters, serial, ChsmData, EventData, EventKind, ParentData,
    Precondition, StateData, Transition, UserEventData,
};
use crate::symbol::table::SymbolId;
use crate::symbol::InfoKind;

/// Namespace alias emitted at the top of the header so generated code is
/// independent of the runtime library's configured namespace.
const NS: &str = "CHSM_ns_alias";

const EVENT_CLASS_SUFFIX: &str = "_event";
const STATE_CLASS_PREFIX: &str = "state_";
const TRANSITIONS_SUFFIX: &str = "_transitions";

pub struct CppGenerator;

fn line_directive(out: &mut String, enabled: bool, path: &str, line: u32) {
    if enabled {
        out.push_str(&format!("#line {} \"{}\"\n", line, path));
    }
}

/// The runtime library class (or user-derived class) of a state or event.
fn lib_class(cc: &Compiler, sym: SymbolId) -> String {
    match cc.symtab.info(sym).map(|info| &info.kind) {
        Some(InfoKind::Cluster { parent, .. }) => parent
            .state
            .derived
            .clone()
            .unwrap_or_else(|| format!("{}::cluster", NS)),
        Some(InfoKind::Set(parent)) => parent
            .state
            .derived
            .clone()
            .unwrap_or_else(|| format!("{}::set", NS)),
        Some(InfoKind::State(state)) => state
            .derived
            .clone()
            .unwrap_or_else(|| format!("{}::state", NS)),
        Some(InfoKind::Event(_)) | Some(InfoKind::UserEvent(_)) => format!("{}::event", NS),
        _ => format!("{}::state", NS),
    }
}

fn hook_lib_class(state: &StateHook) -> String {
    if let Some(derived) = &state.derived {
        return derived.clone();
    }
    match state.class {
        StateClass::State => format!("{}::state", NS),
        StateClass::Cluster => format!("{}::cluster", NS),
        StateClass::Set => format!("{}::set", NS),
    }
}

/// Convert a dotted state name to its class-qualifier path:
/// `c.a` -> `state_c::state_a`.
fn class_path(full_name: &str) -> String {
    full_name
        .split('.')
        .map(|part| format!("{}{}", STATE_CLASS_PREFIX, part))
        .collect::<Vec<_>>()
        .join("::")
}

fn event_class(name: &str) -> String {
    format!("{}{}", name, EVENT_CLASS_SUFFIX)
}

/// The runtime display name of an event: user events print as themselves,
/// synthetic events as `enter(full.state.name)` / `exit(...)`.
fn display_name(cc: &Compiler, sym: SymbolId, event: &EventData) -> String {
    let name = cc.symtab.name(sym);
    match event.kind {
        EventKind::User => name.to_string(),
        EventKind::Enter => format!("enter({})", demangle(&name[1..])),
        EventKind::Exit => format!("exit({})", demangle(&name[1..])),
    }
}

fn base_event_class(cc: &Compiler, data: &UserEventData) -> String {
    match data.base {
        Some(base) => format!(
            "{}::{}",
            cc.machine_name(),
            event_class(cc.symtab.name(base))
        ),
        None => format!("{}::event", NS),
    }
}

impl CodeGenerator for CppGenerator {
    fn lang(&self) -> Lang {
        Lang::Cpp
    }

    fn file_exts(&self) -> (&'static str, &'static str) {
        ("h", "cpp")
    }

    fn source_line(&self, out: &mut String, cx: &AuxCx, line: u32) {
        line_directive(out, cx.line_directives, cx.source_path, line);
    }

    fn action_block_begin(&self, out: &mut String, cx: &AuxCx, id: u32, line: u32) {
        out.push_str(&format!(
            "void {}::{}{}( {}::event const &event ) {{\n{}(void)event;\n",
            cx.machine,
            PREFIX_ACTION,
            id,
            NS,
            ind(1)
        ));
        self.source_line(out, cx, line);
    }

    fn action_block_end(&self, out: &mut String) {
        out.push_str("}\n");
    }

    fn condition_expr_begin(&self, out: &mut String, cx: &AuxCx, id: u32, line: u32) {
        out.push_str(&format!(
            "bool {}::{}{}( {}::event const &event ) {{\n{}(void)event;\n",
            cx.machine,
            PREFIX_CONDITION,
            id,
            NS,
            ind(1)
        ));
        self.source_line(out, cx, line);
        out.push_str(&format!("{}return ", ind(1)));
    }

    fn condition_expr_end(&self, out: &mut String) {
        out.push_str("; }\n");
    }

    fn transition_target_begin(&self, out: &mut String, cx: &AuxCx, id: u32, line: u32) {
        out.push_str(&format!(
            "{}::state* {}::{}{}( {}::event const &event ) {{\n{}(void)event;\n",
            NS,
            cx.machine,
            PREFIX_TARGET,
            id,
            NS,
            ind(1)
        ));
        self.source_line(out, cx, line);
        out.push_str(&format!("{}return ", ind(1)));
    }

    fn transition_target_end(&self, out: &mut String) {
        out.push_str("; }\n");
    }

    fn enter_exit_begin(
        &self,
        out: &mut String,
        cx: &AuxCx,
        which: Which,
        state: &StateHook,
        line: u32,
    ) {
        let lib = hook_lib_class(state);
        out.push_str(&format!(
            "void {}::{}{}{}( {}::state const &chsm_state_, {}::event const &event ) {{\n{}(void)event;\n",
            cx.machine,
            which.prefix(),
            PREFIX_ACTION,
            mangle(&state.full_name),
            NS,
            NS,
            ind(1)
        ));
        self.source_line(out, cx, line);
        out.push_str(&format!(
            "{}{} const &state = dynamic_cast<{} const&>(chsm_state_);\n{}(void)state;\n",
            ind(1),
            lib,
            lib,
            ind(1)
        ));
    }

    fn enter_exit_end(&self, out: &mut String) {
        out.push_str("}\n");
    }

    fn precondition_expr_begin(&self, out: &mut String, cx: &AuxCx, event: &EventHook, line: u32) {
        out.push_str(&format!(
            "bool {}::{}::param_block::precondition() const {{\n{}return base_param_block::precondition() && (\n",
            cx.machine,
            event_class(&event.name),
            ind(1)
        ));
        self.source_line(out, cx, line);
    }

    fn precondition_expr_end(&self, out: &mut String, _cx: &AuxCx, _event: &EventHook) {
        out.push_str(");\n}\n");
    }

    fn precondition_func_begin(&self, out: &mut String, cx: &AuxCx, event: &EventHook, line: u32) {
        out.push_str(&format!(
            "bool {}::{}_precondition( {} ) const {{\n",
            cx.machine,
            event.name,
            emit_param_list(&event.params, EMIT_FORMAL)
        ));
        self.source_line(out, cx, line);
    }

    fn precondition_func_end(&self, out: &mut String, cx: &AuxCx, event: &EventHook) {
        out.push_str(&format!(
            "}}\nbool {}::{}::param_block::precondition() const {{\n{}return base_param_block::precondition() &&\n{}(({}&)chsm()).{}_precondition( {} );\n}}\n",
            cx.machine,
            event_class(&event.name),
            ind(1),
            ind(2),
            cx.machine,
            event.name,
            emit_param_list(&event.params, EMIT_ACTUAL)
        ));
    }

    fn emit(&self, cc: &Compiler, user_code: &str, opts: &EmitOpts, out: &mut Streams) {
        emit_declaration(cc, opts, &mut out.declaration);
        emit_definition(cc, user_code, opts, &mut out.definition);
    }
}

////////// declaration stream /////////////////////////////////////////////////

fn emit_declaration(cc: &Compiler, opts: &EmitOpts, out: &mut String) {
    let Some(chsm_sym) = cc.chsm else { return };
    let Some(chsm) = cc.chsm_data() else { return };

    let file_name = std::path::Path::new(opts.source_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(opts.source_path);
    let guard = format!("{}_H", crate::codegen::identify(file_name));

    out.push_str(&format!("#ifndef {}\n#define {}\n\n", guard, guard));
    out.push_str(&version_banner());
    out.push('\n');
    out.push_str(&format!(
        "#include <chsm.h>\nnamespace {} = CHSM_NS;\n\n",
        NS
    ));
    out.push_str(&section_comment("user declarations"));
    out.push('\n');
    if let Some((line, text)) = &chsm.declarations {
        line_directive(out, opts.line_directives, opts.source_path, *line);
        out.push_str(text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }

    let mut declarer = Declarer {
        out,
        opts,
        depth: 1,
    };
    declarer.visit_chsm(cc, chsm_sym, chsm);
}

struct Declarer<'b, 'o> {
    out: &'b mut String,
    opts: &'b EmitOpts<'o>,
    depth: usize,
}

impl Declarer<'_, '_> {
    fn emit_parent_common(
        &mut self,
        cc: &Compiler,
        sym: SymbolId,
        data: &ParentData,
        formal_args: Option<&str>,
    ) {
        let full = cc.symtab.name(sym);
        let base = state_base_name(full);
        let d = self.depth;

        self.out.push_str(&format!(
            "{}class {}{} : public {} {{ // id = {}\n{}public:\n",
            ind(d),
            STATE_CLASS_PREFIX,
            base,
            lib_class(cc, sym),
            data.state.id,
            ind(d)
        ));

        // The root state is special: its children are not lexically
        // enclosed by it.
        if data.state.parent.is_some() {
            self.depth += 1;
            for &child in &data.children {
                accept(cc, child, self);
                self.out.push('\n');
            }
            self.depth -= 1;
        }

        self.out.push_str(&format!(
            "{}{}{}( CHSM_STATE_ARGS{} );\n",
            ind(d + 1),
            STATE_CLASS_PREFIX,
            base,
            formal_args
                .map(|f| format!(", {}", f))
                .unwrap_or_default()
        ));
        self.out.push_str(&format!(
            "{}private:\n{}static state::id const children_[];\n{}}} {};",
            ind(d),
            ind(d + 1),
            ind(d),
            base
        ));
    }

    fn emit_event_common(&mut self, cc: &Compiler, sym: SymbolId) {
        self.out.push_str(&format!(
            "private:\n{}static {}::transition::id const {}{}[];\npublic:\n",
            ind(1),
            NS,
            cc.symtab.name(sym),
            TRANSITIONS_SUFFIX
        ));
    }

    fn emit_actions(&mut self, cc: &Compiler, sym: SymbolId) {
        let Some(state) = cc.symtab.info(sym).and_then(|info| info.kind.as_state()) else {
            return;
        };
        let m = mangle(cc.symtab.name(sym));
        if state.action.has_enter {
            self.out.push_str(&format!(
                "{}void {}{}{}( {}::state const&, {}::event const& );\n",
                ind(2),
                PREFIX_ENTER,
                PREFIX_ACTION,
                m,
                NS,
                NS
            ));
        }
        if state.action.has_exit {
            self.out.push_str(&format!(
                "{}void {}{}{}( {}::state const&, {}::event const& );\n",
                ind(2),
                PREFIX_EXIT,
                PREFIX_ACTION,
                m,
                NS,
                NS
            ));
        }
    }
}

impl InfoVisitor for Declarer<'_, '_> {
    fn visit_chsm(&mut self, cc: &Compiler, sym: SymbolId, data: &ChsmData) {
        let name = cc.symtab.name(sym);

        self.out.push('\n');
        self.out.push_str(&section_comment("machine class declaration"));
        self.out.push('\n');
        self.out.push_str(&format!("class {} : public ", name));
        match &data.derived {
            Some(derived) => self.out.push_str(derived),
            None => self.out.push_str(&format!("{}::machine", NS)),
        }
        self.out.push_str(" {\npublic:\n");

        // constructor and destructor declarations
        self.out.push_str(&format!(
            "{}{}({});\n{}~{}();\n",
            ind(1),
            name,
            emit_param_list(&data.params, 0),
            ind(1),
            name
        ));

        // states, recursively
        self.out.push_str(&format!("\n{}// states\n", ind(1)));
        accept(cc, data.root, self);
        self.out.push('\n');
        if let Some(root) = cc.symtab.info(data.root).and_then(|i| i.kind.as_parent()) {
            for &child in &root.children {
                accept(cc, child, self);
                self.out.push('\n');
            }
        }

        // events
        self.out.push_str(&format!("\n{}// events\n", ind(1)));
        for &event in &data.events {
            accept(cc, event, self);
            self.out.push('\n');
        }

        // transition condition member functions
        self.out
            .push_str(&format!("\n{}// transition conditions\n", ind(1)));
        for id in 1..=data.ids.condition {
            self.out.push_str(&format!(
                "{}bool {}{}( {}::event const& );\n",
                ind(1),
                PREFIX_CONDITION,
                id,
                NS
            ));
        }

        // transition target member functions
        self.out
            .push_str(&format!("\n{}// transition targets\n", ind(1)));
        for id in 1..=data.ids.target {
            self.out.push_str(&format!(
                "{}{}::state* {}{}( {}::event const& );\n",
                ind(1),
                NS,
                PREFIX_TARGET,
                id,
                NS
            ));
        }

        // transition action member functions
        self.out
            .push_str(&format!("\n{}// transition actions\n", ind(1)));
        for id in 1..=data.ids.action {
            self.out.push_str(&format!(
                "{}void {}{}( {}::event const& );\n",
                ind(1),
                PREFIX_ACTION,
                id,
                NS
            ));
        }

        // enter/exit action member functions
        self.out
            .push_str(&format!("\n{}// enter/exit actions\n", ind(1)));
        self.emit_actions(cc, data.root);
        for &state in &data.states {
            self.emit_actions(cc, state);
        }

        // data members
        let transition_slots = data.transitions.len().max(1);
        self.out.push_str(&format!(
            "\nprivate:\n{}{}::state *state_[{}];\n{}static {}::transition const transition_[];\n{}{}::event const *taken_[{}];\n{}{}::state *target_[{}];\n}};\n",
            ind(1),
            NS,
            data.states.len() + 2,
            ind(1),
            NS,
            ind(1),
            NS,
            transition_slots,
            ind(1),
            NS,
            transition_slots
        ));

        self.out.push('\n');
        self.out.push_str(&section_comment("THE END"));
        self.out.push_str("#endif\n");
    }

    fn visit_cluster(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData, _history: bool) {
        self.emit_parent_common(cc, sym, data, Some("bool chsm_history_"));
    }

    fn visit_set(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData) {
        self.emit_parent_common(cc, sym, data, None);
    }

    fn visit_state(&mut self, cc: &Compiler, sym: SymbolId, data: &StateData) {
        let full = cc.symtab.name(sym);
        self.out.push_str(&format!(
            "{}{} {}; // id = {}",
            ind(self.depth),
            lib_class(cc, sym),
            state_base_name(full),
            data.id
        ));
    }

    fn visit_event(&mut self, cc: &Compiler, sym: SymbolId, _data: &EventData) {
        self.emit_event_common(cc, sym);
        self.out.push_str(&format!(
            "{}{}::event {};",
            ind(1),
            NS,
            cc.symtab.name(sym)
        ));
    }

    fn visit_user_event(&mut self, cc: &Compiler, sym: SymbolId, data: &UserEventData) {
        let name = cc.symtab.name(sym);
        let class = event_class(name);
        let base_class = base_event_class(cc, data);
        let has_params = has_any_parameters(&cc.symtab, sym);
        let all_params = collect_params(&cc.symtab, sym);

        self.emit_event_common(cc, sym);

        self.out.push_str(&format!(
            "{}class {} : public {} {{\n{}typedef {} base_event;\n{}typedef base_event::param_block base_param_block;\n{}public:\n",
            ind(1),
            class,
            base_class,
            ind(2),
            base_class,
            ind(2),
            ind(1)
        ));

        // param_block
        self.out.push_str(&format!(
            "{}struct param_block : base_param_block {{\n",
            ind(2)
        ));
        for param in &data.params {
            line_directive(
                self.out,
                self.opts.line_directives,
                self.opts.source_path,
                param.line,
            );
            self.out.push_str(&format!(
                "{}{};\n",
                ind(3),
                crate::parser::param::stuff_decl(&param.decl, "", &param.name)
            ));
        }
        if has_params {
            self.out.push_str(&format!(
                "{}param_block( {}::event const&{} );\n",
                ind(2),
                NS,
                emit_param_list(&all_params, EMIT_COMMA)
            ));
        } else {
            self.out.push_str(&format!(
                "{}param_block( {}::event const& event ) :\n{}base_param_block( event ) {{ }}\n",
                ind(2),
                NS,
                ind(3)
            ));
        }
        self.out
            .push_str(&format!("{}protected:\n{}virtual ~param_block();\n", ind(2), ind(3)));
        if data.precondition != Precondition::None {
            self.out
                .push_str(&format!("{}bool precondition() const;\n", ind(3)));
        }
        self.out.push_str(&format!("{}}};\n", ind(2)));

        if has_params {
            self.out.push_str(&format!(
                "{}param_block* operator->() const {{\n{}return static_cast<param_block*>(param_block_);\n{}}}\n",
                ind(2),
                ind(3),
                ind(2)
            ));
        }

        if has_params || data.precondition != Precondition::None {
            self.out.push_str(&format!(
                "{}void operator()({});\n",
                ind(2),
                emit_param_list(&all_params, 0)
            ));
        }

        self.out.push_str(&format!(
            "{}protected:\n{}{}( CHSM_EVENT_ARGS ) : base_event( CHSM_EVENT_INIT ) {{ }}\n{}friend class {};\n{}}} {};\n",
            ind(1),
            ind(2),
            class,
            ind(2),
            cc.machine_name(),
            ind(1),
            name
        ));

        self.out.push_str(&format!(
            "{}alignas({}::param_block) char {}_param_block[ sizeof({}::param_block) ];",
            ind(1),
            class,
            name,
            class
        ));

        if data.precondition == Precondition::Func {
            self.out.push_str(&format!(
                "\n{}bool {}_precondition( {}) const;",
                ind(1),
                name,
                emit_param_list(&all_params, 0)
            ));
        }
    }

    fn visit_transition(&mut self, _cc: &Compiler, _transition: &Transition) {
        // nothing to declare
    }
}

////////// definition stream //////////////////////////////////////////////////

fn emit_definition(cc: &Compiler, user_code: &str, opts: &EmitOpts, out: &mut String) {
    let Some(chsm_sym) = cc.chsm else { return };
    let Some(chsm) = cc.chsm_data() else { return };

    out.push_str(&version_banner());
    out.push('\n');
    if let Some(declaration_name) = opts.declaration_name {
        out.push_str(&format!("#include \"{}\"\n", declaration_name));
    }
    out.push_str("#include <new>\n\n");

    let mut definer = Definer { out: &mut *out };

    // state definitions
    definer.out.push_str(&section_comment("state definitions"));
    definer.out.push('\n');
    accept(cc, chsm.root, &mut definer);
    definer.out.push('\n');
    for &state in &chsm.states {
        let is_parent = cc
            .symtab
            .info(state)
            .map(|info| info.kind.as_parent().is_some())
            .unwrap_or(false);
        if is_parent {
            accept(cc, state, &mut definer);
            definer.out.push('\n');
        }
    }

    // event definitions
    definer.out.push_str(&section_comment("event definitions"));
    definer.out.push('\n');
    for &event in &chsm.events {
        accept(cc, event, &mut definer);
        definer.out.push('\n');
    }

    // transitions
    definer.out.push_str(&section_comment("transitions"));
    definer.out.push('\n');
    definer.out.push_str(&format!(
        "{}::transition const {}::transition_[] = {{\n",
        NS,
        cc.machine_name()
    ));
    for transition in &chsm.transitions {
        definer.visit_transition(cc, transition);
        definer.out.push('\n');
    }
    definer.out.push_str(&format!(
        "{}{{ nullptr, 0, 0, nullptr, nullptr }}\n}};\n\n",
        ind(1)
    ));

    // machine constructor and destructor
    definer.visit_chsm(cc, chsm_sym, chsm);

    out.push_str("\n// user-code\n");
    out.push_str(user_code);
    out.push('\n');
    out.push_str(&section_comment("THE END"));
}

struct Definer<'b> {
    out: &'b mut String,
}

impl Definer<'_> {
    fn emit_transitions_array(&mut self, cc: &Compiler, sym: SymbolId, data: &EventData) {
        self.out.push_str(&format!(
            "{}::transition::id const {}::{}{}[] = {{\n{}",
            NS,
            cc.machine_name(),
            cc.symtab.name(sym),
            TRANSITIONS_SUFFIX,
            ind(1)
        ));
        for id in &data.transition_ids {
            self.out.push_str(&format!("{}, ", id));
        }
        self.out.push_str("-1\n};\n");
    }

    fn emit_parent_common(
        &mut self,
        cc: &Compiler,
        sym: SymbolId,
        data: &ParentData,
        formal_args: Option<&str>,
        actual_args: Option<&str>,
    ) {
        let full = cc.symtab.name(sym);
        let base = state_base_name(full);
        let path = class_path(full);

        // child id vector
        self.out.push_str(&format!(
            "{}::state::id const {}::{}::children_[] = {{\n{}",
            NS,
            cc.machine_name(),
            path,
            ind(1)
        ));
        for &child in &data.children {
            self.out
                .push_str(&format!("{}, ", serial(&cc.symtab, Some(child))));
        }
        self.out.push_str("-1\n};\n");

        // state constructor
        self.out.push_str(&format!(
            "{}::{}::{}{}( CHSM_STATE_ARGS{} ) :\n{}{}( CHSM_STATE_INIT, children_{} )",
            cc.machine_name(),
            path,
            STATE_CLASS_PREFIX,
            base,
            formal_args
                .map(|f| format!(", {}", f))
                .unwrap_or_default(),
            ind(1),
            lib_class(cc, sym),
            actual_args
                .map(|a| format!(", {}", a))
                .unwrap_or_default()
        ));

        // The root state's children are initialized by the machine
        // constructor, not here.
        if data.state.parent.is_some() {
            let mut initializer = Initializer {
                out: &mut *self.out,
                emitting_constructor: false,
            };
            for &child in &data.children {
                initializer.out.push_str(",\n");
                accept(cc, child, &mut initializer);
            }
        }

        self.out.push_str("\n{\n}\n");
    }
}

impl InfoVisitor for Definer<'_> {
    fn visit_chsm(&mut self, cc: &Compiler, sym: SymbolId, data: &ChsmData) {
        let name = cc.symtab.name(sym);

        self.out
            .push_str(&section_comment("CHSM constructor definition"));
        self.out.push('\n');
        self.out.push_str(&format!(
            "{}::{}({}) :\n{}",
            name,
            name,
            emit_param_list(&data.params, EMIT_PREFIX | EMIT_FORMAL),
            ind(1)
        ));
        match &data.derived {
            Some(derived) => self.out.push_str(derived),
            None => self.out.push_str(&format!("{}::machine", NS)),
        }
        self.out.push_str(&format!(
            "( state_, root, transition_, taken_, target_, {}{} )",
            data.transitions.len(),
            emit_param_list(&data.params, EMIT_COMMA | EMIT_ACTUAL | EMIT_PREFIX)
        ));

        let mut initializer = Initializer {
            out: &mut *self.out,
            emitting_constructor: true,
        };
        initializer.out.push_str(",\n");
        accept(cc, data.root, &mut initializer);
        if let Some(root) = cc.symtab.info(data.root).and_then(|i| i.kind.as_parent()) {
            for &child in &root.children {
                initializer.out.push_str(",\n");
                accept(cc, child, &mut initializer);
            }
        }
        for &event in &data.events {
            initializer.out.push_str(",\n");
            accept(cc, event, &mut initializer);
        }

        self.out.push_str("\n{\n");
        self.out
            .push_str(&format!("{}state_[0] = &root;\n", ind(1)));
        for (index, &state) in data.states.iter().enumerate() {
            self.out.push_str(&format!(
                "{}state_[{}] = &{};\n",
                ind(1),
                index + 1,
                cc.symtab.name(state)
            ));
        }
        self.out.push_str(&format!(
            "{}state_[{}] = nullptr;\n}}\n",
            ind(1),
            data.states.len() + 1
        ));

        self.out
            .push_str(&format!("\n{}::~{}() {{\n}}\n", name, name));
    }

    fn visit_cluster(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData, _history: bool) {
        self.emit_parent_common(
            cc,
            sym,
            data,
            Some("bool chsm_history_"),
            Some("chsm_history_"),
        );
    }

    fn visit_set(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData) {
        self.emit_parent_common(cc, sym, data, None, None);
    }

    fn visit_state(&mut self, _cc: &Compiler, _sym: SymbolId, _data: &StateData) {
        // plain states have no out-of-line definitions
    }

    fn visit_event(&mut self, cc: &Compiler, sym: SymbolId, data: &EventData) {
        self.emit_transitions_array(cc, sym, data);
    }

    fn visit_user_event(&mut self, cc: &Compiler, sym: SymbolId, data: &UserEventData) {
        self.emit_transitions_array(cc, sym, &data.event);

        let name = cc.symtab.name(sym);
        let machine = cc.machine_name();
        let class = event_class(name);
        let has_params = has_any_parameters(&cc.symtab, sym);
        let all_params = collect_params(&cc.symtab, sym);

        if has_params {
            // param_block constructor: formal argument names are prefixed
            // so they cannot collide with the data members they initialize.
            self.out.push_str(&format!(
                "{}::{}::param_block::param_block( {}::event const &event{} ) :\n{}base_param_block( event",
                machine,
                class,
                NS,
                emit_param_list(&all_params, EMIT_COMMA | EMIT_PREFIX | EMIT_FORMAL),
                ind(1)
            ));
            if let Some(base) = data.base {
                if has_any_parameters(&cc.symtab, base) {
                    let base_params = collect_params(&cc.symtab, base);
                    self.out.push_str(&emit_param_list(
                        &base_params,
                        EMIT_COMMA | EMIT_PREFIX | EMIT_ACTUAL,
                    ));
                }
            }
            self.out.push_str(" )");
            for param in &data.params {
                self.out.push_str(&format!(
                    ", {}( {}{} )",
                    param.name,
                    crate::parser::param::PARAM_PREFIX,
                    param.name
                ));
            }
            self.out.push_str("\n{\n}\n");
        }

        // Declared virtual in the runtime library, so defined out-of-line
        // even though it's empty.
        self.out.push_str(&format!(
            "{}::{}::param_block::~param_block() {{ }}\n",
            machine, class
        ));

        if has_params || data.precondition != Precondition::None {
            self.out.push_str(&format!(
                "\nvoid {}::{}::operator()({}) {{\n{}machine_lock const lock( machine_ );\n{}if ( in_progress_ == 0 )\n{}broadcast( new( static_cast<{}&>(machine_).{}_param_block ) param_block( *this{} ) );\n}}\n",
                machine,
                class,
                emit_param_list(&all_params, EMIT_FORMAL),
                ind(1),
                ind(1),
                ind(2),
                machine,
                name,
                emit_param_list(&all_params, EMIT_COMMA | EMIT_ACTUAL)
            ));
        }
    }

    fn visit_transition(&mut self, cc: &Compiler, transition: &Transition) {
        let machine = cc.machine_name();
        self.out.push_str(&format!("{}{{ ", ind(1)));

        if transition.condition_id > 0 {
            self.out.push_str(&format!(
                "static_cast<{}::transition::condition>(&{}::{}{})",
                NS, machine, PREFIX_CONDITION, transition.condition_id
            ));
        } else {
            self.out.push_str("nullptr");
        }

        self.out.push_str(&format!(
            ", {}, {}, ",
            serial(&cc.symtab, Some(transition.from)),
            serial(&cc.symtab, transition.to)
        ));

        if transition.target_id > 0 {
            self.out.push_str(&format!(
                "static_cast<{}::transition::target>(&{}::{}{})",
                NS, machine, PREFIX_TARGET, transition.target_id
            ));
        } else {
            self.out.push_str("nullptr");
        }

        self.out.push_str(", ");

        if transition.action_id > 0 {
            self.out.push_str(&format!(
                "static_cast<{}::transition::action>(&{}::{}{})",
                NS, machine, PREFIX_ACTION, transition.action_id
            ));
        } else {
            self.out.push_str("nullptr");
        }

        self.out.push_str(" },");
    }
}

////////// member initializers ////////////////////////////////////////////////

struct Initializer<'b> {
    out: &'b mut String,
    /// True while emitting the machine constructor's own initializer list,
    /// where the machine reference is `*this` rather than the
    /// `chsm_machine_` constructor argument.
    emitting_constructor: bool,
}

impl Initializer<'_> {
    fn chsm_ref(&self) -> &'static str {
        if self.emitting_constructor {
            "*this"
        } else {
            "chsm_machine_"
        }
    }

    fn emit_state_common(&mut self, cc: &Compiler, sym: SymbolId, data: &StateData) {
        let full = cc.symtab.name(sym);
        let m = mangle(full);
        let machine = cc.machine_name();
        let chsm_ref = self.chsm_ref();

        let parent_ref = match data.parent {
            None => "nullptr",
            Some(parent) => {
                let is_root = cc
                    .symtab
                    .info(parent)
                    .and_then(|i| i.kind.as_state())
                    .map(|s| s.parent.is_none())
                    .unwrap_or(false);
                if is_root {
                    "&root"
                } else {
                    "this"
                }
            }
        };

        self.out.push_str(&format!(
            "{}{}( {}, \"{}\", {}, ",
            ind(1),
            state_base_name(full),
            chsm_ref,
            full,
            parent_ref
        ));

        // enter/exit actions
        if data.action.has_enter {
            self.out.push_str(&format!(
                "static_cast<{}::state::action>(&{}::{}{}{})",
                NS, machine, PREFIX_ENTER, PREFIX_ACTION, m
            ));
        } else {
            self.out.push_str("nullptr");
        }
        self.out.push_str(", ");
        if data.action.has_exit {
            self.out.push_str(&format!(
                "static_cast<{}::state::action>(&{}::{}{}{})",
                NS, machine, PREFIX_EXIT, PREFIX_ACTION, m
            ));
        } else {
            self.out.push_str("nullptr");
        }
        self.out.push_str(", ");

        // enter/exit events
        if data.event.has_enter {
            self.out.push_str(&format!(
                "&(({}&){}).{}{}",
                machine, chsm_ref, PREFIX_ENTER, m
            ));
        } else {
            self.out.push_str("nullptr");
        }
        self.out.push_str(", ");
        if data.event.has_exit {
            self.out.push_str(&format!(
                "&(({}&){}).{}{}",
                machine, chsm_ref, PREFIX_EXIT, m
            ));
        } else {
            self.out.push_str("nullptr");
        }
    }

    fn emit_event_common(&mut self, cc: &Compiler, sym: SymbolId, data: &EventData) {
        self.out.push_str(&format!(
            "{}{}( this, {}{}, \"{}\", ",
            ind(1),
            cc.symtab.name(sym),
            cc.symtab.name(sym),
            TRANSITIONS_SUFFIX,
            display_name(cc, sym, data)
        ));
    }
}

impl InfoVisitor for Initializer<'_> {
    fn visit_chsm(&mut self, _cc: &Compiler, _sym: SymbolId, _data: &ChsmData) {
        // nothing to initialize
    }

    fn visit_cluster(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData, history: bool) {
        self.emit_state_common(cc, sym, &data.state);
        self.out
            .push_str(&format!(", {} )", if history { "true" } else { "false" }));
    }

    fn visit_set(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData) {
        self.emit_state_common(cc, sym, &data.state);
        self.out.push_str(" )");
    }

    fn visit_state(&mut self, cc: &Compiler, sym: SymbolId, data: &StateData) {
        self.emit_state_common(cc, sym, data);
        self.out.push_str(" )");
    }

    fn visit_event(&mut self, cc: &Compiler, sym: SymbolId, data: &EventData) {
        self.emit_event_common(cc, sym, data);
        self.out.push_str("0 )");
    }

    fn visit_user_event(&mut self, cc: &Compiler, sym: SymbolId, data: &UserEventData) {
        self.emit_event_common(cc, sym, &data.event);
        match data.base {
            Some(base) => self
                .out
                .push_str(&format!("&{}", cc.symtab.name(base))),
            None => self.out.push_str("nullptr"),
        }
        self.out.push_str(" )");
    }

    fn visit_transition(&mut self, _cc: &Compiler, _transition: &Transition) {
        // nothing to initialize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    fn compile_cpp(source: &str) -> crate::Compilation {
        compile(source, "test.chsmc", Lang::Cpp, true, Some("test.h")).unwrap()
    }

    fn compile_cpp_no_line(source: &str) -> crate::Compilation {
        compile(source, "test.chsmc", Lang::Cpp, false, Some("test.h")).unwrap()
    }

    #[test]
    fn test_smoke_header() {
        let result = compile_cpp("chsm M() is { state s; }");
        assert!(result.succeeded());
        let h = &result.declaration;
        assert!(h.contains("class M : public CHSM_ns_alias::machine {"));
        assert!(h.contains("CHSM_ns_alias::state s; // id = 1"));
        assert!(h.contains("class state_root : public CHSM_ns_alias::cluster"));
        assert!(h.contains("#ifndef test_chsmc_H"));
        assert!(h.contains("///// chsmc: THE END"));
    }

    #[test]
    fn test_smoke_definition() {
        let result = compile_cpp("chsm M() is { state s; }");
        let cpp = &result.definition;
        // Empty transition table, just the sentinel.
        assert!(cpp.contains("transition const M::transition_[] = {\n  { nullptr, 0, 0, nullptr, nullptr }\n};"));
        // The state initializer passes parent=root and null pointers.
        assert!(cpp.contains("s( *this, \"s\", &root, nullptr, nullptr, nullptr, nullptr )"));
        assert!(cpp.contains("state_[0] = &root;"));
        assert!(cpp.contains("state_[1] = &s;"));
        assert!(cpp.contains("state_[2] = nullptr;"));
        assert!(cpp.contains("#include \"test.h\""));
    }

    #[test]
    fn test_cluster_with_history() {
        let result =
            compile_cpp("chsm M() is { cluster c(a,b) history is { state a; state b; a -> b; } }");
        assert!(result.succeeded());
        let cpp = &result.definition;
        // The cluster's member-initializer passes history=true.
        assert!(cpp.contains(", true )"));
        // Child id vector in child-list order, -1 terminated.
        assert!(cpp.contains("M::state_c::children_[] = {\n  2, 3, -1\n};"));
        // One transition entry from a (id 2) to b (id 3).
        assert!(cpp.contains("{ nullptr, 2, 3, nullptr, nullptr },"));
    }

    #[test]
    fn test_intra_set_transition_generates_nothing() {
        let result =
            compile_cpp("chsm M() is { set S(a,b) is { state a; state b; a -> b; } }");
        assert!(!result.succeeded());
        assert!(result.declaration.is_empty());
        assert!(result.definition.is_empty());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("intra-set transition")));
    }

    #[test]
    fn test_event_inheritance_param_block() {
        let result = compile_cpp(
            "chsm M() is { event base(int x); event d<base>(int y); state a; state b; a is { base -> b; d -> b; } }",
        );
        assert!(result.succeeded());
        let h = &result.declaration;
        assert!(h.contains("class d_event : public M::base_event {"));
        assert!(h.contains("int y;"));
        let cpp = &result.definition;
        // The derived constructor forwards x and stores y.
        assert!(cpp.contains(
            "M::d_event::param_block::param_block( CHSM_ns_alias::event const &event, int Px, int Py ) :"
        ));
        assert!(cpp.contains("base_param_block( event, Px ), y( Py )"));
    }

    #[test]
    fn test_forward_reference_resolved_in_table() {
        let result = compile_cpp("chsm M() is { state a; a -> b; state b; }");
        assert!(result.succeeded());
        assert!(result
            .definition
            .contains("{ nullptr, 1, 2, nullptr, nullptr },"));
    }

    #[test]
    fn test_precondition_expression() {
        let result = compile_cpp("chsm M() is { event e [x > 0]; state a; a is { e -> ...; } }");
        assert!(result.succeeded());
        let cpp = &result.definition;
        assert!(cpp.contains("bool M::e_event::param_block::precondition() const {"));
        assert!(cpp.contains("return base_param_block::precondition() && ("));
        assert!(cpp.contains("#line 1 \"test.chsmc\""));
        assert!(cpp.contains("x > 0"));
    }

    #[test]
    fn test_no_line_suppresses_directives() {
        let result =
            compile_cpp_no_line("chsm M() is { event e [x > 0]; state a; a is { e -> ...; } }");
        assert!(result.succeeded());
        assert!(!result.definition.contains("#line"));
        assert!(!result.declaration.contains("#line"));
    }

    #[test]
    fn test_user_code_fidelity() {
        let body = "the_exact_text( 1, 2 ); /* kept */";
        let source = format!(
            "chsm M() is {{ event e; state a; a is {{ e -> ... %{{ {} %}}; }} }}",
            body
        );
        let result = compile_cpp(&source);
        assert!(result.succeeded());
        assert!(result.definition.contains(body));
        // A line directive precedes the user code.
        let pos_line = result.definition.find("#line").unwrap();
        let pos_body = result.definition.find(body).unwrap();
        assert!(pos_line < pos_body);
    }

    #[test]
    fn test_enter_exit_action_emission() {
        let result = compile_cpp("chsm M() is { state s upon enter %{ on_enter(); %}; }");
        assert!(result.succeeded());
        let h = &result.declaration;
        assert!(h.contains("void EAM1s( CHSM_ns_alias::state const&, CHSM_ns_alias::event const& );"));
        let cpp = &result.definition;
        assert!(cpp.contains("void M::EAM1s( CHSM_ns_alias::state const &chsm_state_, CHSM_ns_alias::event const &event ) {"));
        assert!(cpp.contains("on_enter();"));
        // The member initializer wires the enter action in.
        assert!(cpp.contains("static_cast<CHSM_ns_alias::state::action>(&M::EAM1s)"));
    }

    #[test]
    fn test_enter_event_member_and_table() {
        let result = compile_cpp(
            "chsm M() is { state a; state b; state c; a is { enter(b) -> c; } }",
        );
        assert!(result.succeeded());
        let h = &result.declaration;
        assert!(h.contains("CHSM_ns_alias::event EM1b;"));
        let cpp = &result.definition;
        assert!(cpp.contains("M::EM1b_transitions[] = {\n  0, -1\n};"));
        assert!(cpp.contains("EM1b( this, EM1b_transitions, \"enter(b)\", 0 )"));
        // The owning state's initializer references the enter event.
        assert!(cpp.contains("&((M&)*this).EM1b"));
    }

    #[test]
    fn test_computed_target() {
        let result = compile_cpp(
            "chsm M() is { event e; state a; state b; a is { e -> $ { &b }; } }",
        );
        assert!(result.succeeded());
        let h = &result.declaration;
        assert!(h.contains("CHSM_ns_alias::state* T1( CHSM_ns_alias::event const& );"));
        let cpp = &result.definition;
        assert!(cpp.contains("CHSM_ns_alias::state* M::T1( CHSM_ns_alias::event const &event ) {"));
        assert!(cpp.contains("return &b; }"));
        assert!(cpp.contains("static_cast<CHSM_ns_alias::transition::target>(&M::T1)"));
        // Internal/computed transitions have to_id -1.
        assert!(cpp.contains(", 1, -1, "));
    }

    #[test]
    fn test_condition_and_action() {
        let result = compile_cpp(
            "chsm M() is { event e; state a; state b; a is { e -> b [ ready() ] %{ go(); %}; } }",
        );
        assert!(result.succeeded());
        let cpp = &result.definition;
        assert!(cpp.contains("bool M::C1( CHSM_ns_alias::event const &event ) {"));
        assert!(cpp.contains("return ready(); }"));
        assert!(cpp.contains("void M::A1( CHSM_ns_alias::event const &event ) {"));
        assert!(cpp.contains("go();"));
        assert!(cpp.contains("static_cast<CHSM_ns_alias::transition::condition>(&M::C1)"));
        assert!(cpp.contains("static_cast<CHSM_ns_alias::transition::action>(&M::A1)"));
    }

    #[test]
    fn test_machine_constructor_params() {
        let result = compile_cpp("chsm M( int limit ) is { state s; }");
        assert!(result.succeeded());
        let cpp = &result.definition;
        assert!(cpp.contains("M::M(int Plimit) :"));
        assert!(cpp.contains(", Plimit )"));
    }

    #[test]
    fn test_broadcast_uses_placement_new() {
        let result = compile_cpp(
            "chsm M() is { event e(int n); state a; state b; a is { e -> b; } }",
        );
        assert!(result.succeeded());
        let cpp = &result.definition;
        assert!(cpp.contains("void M::e_event::operator()(int n) {"));
        assert!(cpp
            .contains("broadcast( new( static_cast<M&>(machine_).e_param_block ) param_block( *this, n ) );"));
        let h = &result.declaration;
        assert!(h.contains("alignas(e_event::param_block) char e_param_block[ sizeof(e_event::param_block) ];"));
    }

    #[test]
    fn test_transition_ordering_is_declaration_order() {
        let result = compile_cpp(
            "chsm M() is { event e; cluster c(a,b) is { e -> a; state a; state b; a is { e -> b; } } }",
        );
        assert!(result.succeeded());
        let cpp = &result.definition;
        // The parent-scope transition (from c, id 1) precedes the nested
        // one (from c.a, id 2).
        let first = cpp.find("{ nullptr, 1, 2, nullptr, nullptr },").unwrap();
        let second = cpp.find("{ nullptr, 2, 3, nullptr, nullptr },").unwrap();
        assert!(first < second);
        assert!(cpp.contains("M::e_transitions[] = {\n  0, 1, -1\n};"));
    }

    #[test]
    fn test_ancestor_transition_emitted_first_regardless_of_textual_order() {
        // The nested state's transition is written before the enclosing
        // cluster's own trigger; the table must still list the ancestor's
        // entry (from c, id 1) ahead of the descendant's (from c.a, id 2).
        let result = compile_cpp(
            "chsm M() is { event e; cluster c(a,b) is { state a; state b; a is { e -> b; } e -> a; } }",
        );
        assert!(result.succeeded());
        let cpp = &result.definition;
        let ancestor = cpp.find("{ nullptr, 1, 2, nullptr, nullptr },").unwrap();
        let descendant = cpp.find("{ nullptr, 2, 3, nullptr, nullptr },").unwrap();
        assert!(ancestor < descendant);
        // The event's id list is remapped to the reordered table.
        assert!(cpp.contains("M::e_transitions[] = {\n  1, 0, -1\n};"));
    }
}
