//! Java code generator
//!
//! Java has no header/implementation split, so both streams are one file:
//! one class per machine with nested `State_*` classes, per-event classes
//! with `ParamBlock` hierarchies, and `Thunk_*` classes adapting the
//! user's condition/target/action code to the runtime's interfaces.

use crate::codegen::mangle::{demangle, mangle};
use crate::codegen::{
    accept, ind, section_comment, state_base_name, version_banner, AuxCx, CodeGenerator, EmitOpts,
    EventHook, InfoVisitor, Lang, StateHook, Streams, Which, PREFIX_ACTION, PREFIX_CONDITION,
    PREFIX_TARGET,
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

const PKG: &str = "CHSM";
const EVENT_CLASS_SUFFIX: &str = "Event";
const STATE_CLASS_PREFIX: &str = "State_";
const TRANSITIONS_SUFFIX: &str = "Transitions";

// Java has no macro preprocessor, so the runtime argument lists are spelled
// out wherever C++ would use CHSM_STATE_ARGS and friends.
const STATE_ARGS: &str = "CHSM.Machine chsmM, String chsmN, CHSM.Parent chsmP, \
CHSM.State.Action chsmEA, CHSM.State.Action chsmXA, CHSM.Event chsmEE, CHSM.Event chsmXE";
const STATE_INIT: &str = "chsmM, chsmN, chsmP, chsmEA, chsmXA, chsmEE, chsmXE";
const EVENT_ARGS: &str = "CHSM.Machine chsmM, int[] chsmTids, String chsmN, CHSM.Event chsmBE";
const EVENT_INIT: &str = "chsmM, chsmTids, chsmN, chsmBE";

pub struct JavaGenerator;

fn line_directive(out: &mut String, enabled: bool, path: &str, line: u32) {
    if enabled {
        out.push_str(&format!("//#line {} \"{}\"\n", line, path));
    }
}

fn lib_class(cc: &Compiler, sym: SymbolId) -> String {
    match cc.symtab.info(sym).map(|info| &info.kind) {
        Some(InfoKind::Cluster { parent, .. }) => parent
            .state
            .derived
            .clone()
            .unwrap_or_else(|| format!("{}.Cluster", PKG)),
        Some(InfoKind::Set(parent)) => parent
            .state
            .derived
            .clone()
            .unwrap_or_else(|| format!("{}.Set", PKG)),
        Some(InfoKind::State(state)) => state
            .derived
            .clone()
            .unwrap_or_else(|| format!("{}.State", PKG)),
        Some(InfoKind::Event(_)) | Some(InfoKind::UserEvent(_)) => format!("{}.Event", PKG),
        _ => format!("{}.State", PKG),
    }
}

fn event_class(name: &str) -> String {
    format!("{}{}", name, EVENT_CLASS_SUFFIX)
}

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
            "{}.{}",
            cc.machine_name(),
            event_class(cc.symtab.name(base))
        ),
        None => format!("{}.Event", PKG),
    }
}

impl CodeGenerator for JavaGenerator {
    fn lang(&self) -> Lang {
        Lang::Java
    }

    fn file_exts(&self) -> (&'static str, &'static str) {
        ("java", "java")
    }

    fn source_line(&self, out: &mut String, cx: &AuxCx, line: u32) {
        line_directive(out, cx.line_directives, cx.source_path, line);
    }

    fn action_block_begin(&self, out: &mut String, cx: &AuxCx, id: u32, line: u32) {
        out.push_str(&format!(
            "{i1}private static final class Thunk_{pa}{id} implements {pkg}.Transition.Action {{\n\
             {i2}public void exec( {pkg}.Event event ) {{\n\
             {i3}(({m})event.machine()).thunk_{pa}{id}( event );\n\
             {i2}}}\n\
             {i1}}}\n\
             {i1}private void thunk_{pa}{id}( {pkg}.Event event ) {{\n",
            i1 = ind(1),
            i2 = ind(2),
            i3 = ind(3),
            pa = PREFIX_ACTION,
            id = id,
            pkg = PKG,
            m = cx.machine
        ));
        self.source_line(out, cx, line);
    }

    fn action_block_end(&self, out: &mut String) {
        out.push_str(&format!("{}}}\n", ind(1)));
    }

    fn condition_expr_begin(&self, out: &mut String, cx: &AuxCx, id: u32, line: u32) {
        out.push_str(&format!(
            "{i1}private static final class Thunk_{pc}{id} implements {pkg}.Transition.Condition {{\n\
             {i2}public boolean eval( {pkg}.Event event ) {{\n\
             {i3}return (({m})event.machine()).thunk_{pc}{id}( event );\n\
             {i2}}}\n\
             {i1}}}\n\
             {i1}private boolean thunk_{pc}{id}( {pkg}.Event event ) {{\n",
            i1 = ind(1),
            i2 = ind(2),
            i3 = ind(3),
            pc = PREFIX_CONDITION,
            id = id,
            pkg = PKG,
            m = cx.machine
        ));
        self.source_line(out, cx, line);
        out.push_str(&format!("{}return ", ind(2)));
    }

    fn condition_expr_end(&self, out: &mut String) {
        out.push_str(&format!(";\n{}}}\n", ind(1)));
    }

    fn transition_target_begin(&self, out: &mut String, cx: &AuxCx, id: u32, line: u32) {
        out.push_str(&format!(
            "{i1}private static final class Thunk_{pt}{id} implements {pkg}.Transition.Target {{\n\
             {i2}public {pkg}.State eval( {pkg}.Event event ) {{\n\
             {i3}return (({m})event.machine()).thunk_{pt}{id}( event );\n\
             {i2}}}\n\
             {i1}}}\n\
             {i1}private {pkg}.State thunk_{pt}{id}( {pkg}.Event event ) {{\n",
            i1 = ind(1),
            i2 = ind(2),
            i3 = ind(3),
            pt = PREFIX_TARGET,
            id = id,
            pkg = PKG,
            m = cx.machine
        ));
        self.source_line(out, cx, line);
        out.push_str(&format!("{}return ", ind(2)));
    }

    fn transition_target_end(&self, out: &mut String) {
        out.push_str(&format!(";\n{}}}\n", ind(1)));
    }

    fn enter_exit_begin(
        &self,
        out: &mut String,
        cx: &AuxCx,
        which: Which,
        state: &StateHook,
        line: u32,
    ) {
        let name = format!(
            "{}{}{}",
            which.prefix(),
            PREFIX_ACTION,
            mangle(&state.full_name)
        );
        out.push_str(&format!(
            "{i1}private static final class Thunk_{name} implements {pkg}.State.Action {{\n\
             {i2}public void exec( {pkg}.State state, {pkg}.Event event ) {{\n\
             {i3}(({m})state.machine()).{name}( state, event );\n\
             {i2}}}\n\
             {i1}}}\n\
             {i1}private void {name}( {pkg}.State state, {pkg}.Event event ) {{\n",
            i1 = ind(1),
            i2 = ind(2),
            i3 = ind(3),
            name = name,
            pkg = PKG,
            m = cx.machine
        ));
        self.source_line(out, cx, line);
    }

    fn enter_exit_end(&self, out: &mut String) {
        out.push_str(&format!("{}}}\n", ind(1)));
    }

    fn precondition_expr_begin(&self, out: &mut String, cx: &AuxCx, event: &EventHook, line: u32) {
        out.push_str(&format!(
            "{}boolean {}_precondition( {} ) {{\n{}return (\n",
            ind(1),
            event.name,
            emit_param_list(&event.params, EMIT_FORMAL),
            ind(2)
        ));
        self.source_line(out, cx, line);
    }

    fn precondition_expr_end(&self, out: &mut String, _cx: &AuxCx, _event: &EventHook) {
        out.push_str(&format!("\n{});\n{}}}\n", ind(2), ind(1)));
    }

    fn precondition_func_begin(&self, out: &mut String, cx: &AuxCx, event: &EventHook, line: u32) {
        out.push_str(&format!(
            "{}boolean {}_precondition( {} ) {{\n",
            ind(1),
            event.name,
            emit_param_list(&event.params, EMIT_FORMAL)
        ));
        self.source_line(out, cx, line);
    }

    fn precondition_func_end(&self, out: &mut String, _cx: &AuxCx, _event: &EventHook) {
        out.push_str(&format!("{}}}\n", ind(1)));
    }

    fn emit(&self, cc: &Compiler, user_code: &str, opts: &EmitOpts, out: &mut Streams) {
        let Some(chsm_sym) = cc.chsm else { return };
        let Some(chsm) = cc.chsm_data() else { return };
        let target = &mut out.declaration;

        target.push_str(&version_banner());
        target.push('\n');
        target.push_str(&section_comment("user-declarations"));
        target.push('\n');
        if let Some((line, text)) = &chsm.declarations {
            line_directive(target, opts.line_directives, opts.source_path, *line);
            target.push_str(text);
            if !text.ends_with('\n') {
                target.push('\n');
            }
        }

        let mut declarer = Declarer {
            out: &mut *target,
            opts,
            user_code,
            depth: 1,
        };
        declarer.visit_chsm(cc, chsm_sym, chsm);

        target.push('\n');
        target.push_str(&section_comment("THE END"));
    }
}

struct Declarer<'b, 'o> {
    out: &'b mut String,
    opts: &'b EmitOpts<'o>,
    user_code: &'b str,
    depth: usize,
}

impl Declarer<'_, '_> {
    fn emit_parent_common(
        &mut self,
        cc: &Compiler,
        sym: SymbolId,
        data: &ParentData,
        formal_params: Option<&str>,
        actual_params: Option<&str>,
    ) {
        let full = cc.symtab.name(sym);
        let base = state_base_name(full);
        let d = self.depth;

        self.out.push_str(&format!(
            "{}final static class {}{} extends {} {{ // id = {}\n",
            ind(d),
            STATE_CLASS_PREFIX,
            base,
            lib_class(cc, sym),
            data.state.id
        ));

        // child id vector
        self.out.push_str(&format!(
            "{}private static final int children_[] = new int[] {{ ",
            ind(d + 1)
        ));
        let mut first = true;
        for &child in &data.children {
            if !first {
                self.out.push_str(", ");
            }
            first = false;
            self.out
                .push_str(&serial(&cc.symtab, Some(child)).to_string());
        }
        self.out.push_str(" };\n");

        // The root state's children are not lexically enclosed by it.
        if data.state.parent.is_some() {
            self.depth += 1;
            for &child in &data.children {
                accept(cc, child, self);
            }
            self.depth -= 1;
        }

        // constructor
        self.out.push_str(&format!(
            "{}{}{}( {}{} ) {{\n{}super( {}, children_{} );\n",
            ind(d + 1),
            STATE_CLASS_PREFIX,
            base,
            STATE_ARGS,
            formal_params
                .map(|f| format!(", {}", f))
                .unwrap_or_default(),
            ind(d + 2),
            STATE_INIT,
            actual_params
                .map(|a| format!(", {}", a))
                .unwrap_or_default()
        ));
        if data.state.parent.is_some() {
            let mut initializer = Initializer {
                out: &mut *self.out,
                emitting_constructor: false,
                depth: d + 2,
            };
            for &child in &data.children {
                accept(cc, child, &mut initializer);
            }
        }
        self.out.push_str(&format!("{}}}\n", ind(d + 1)));

        // member
        self.out.push_str(&format!(
            "{}public final {}{} {};\n",
            ind(d),
            STATE_CLASS_PREFIX,
            base,
            base
        ));
    }

    fn emit_event_common(&mut self, cc: &Compiler, sym: SymbolId, data: &EventData) {
        let name = cc.symtab.name(sym);
        self.out.push_str(&format!(
            "{}private final static int {}{}[] = {{ ",
            ind(1),
            name,
            TRANSITIONS_SUFFIX
        ));
        let mut first = true;
        for id in &data.transition_ids {
            if !first {
                self.out.push_str(", ");
            }
            first = false;
            self.out.push_str(&id.to_string());
        }
        self.out.push_str(" };\n");
    }
}

impl InfoVisitor for Declarer<'_, '_> {
    fn visit_chsm(&mut self, cc: &Compiler, sym: SymbolId, data: &ChsmData) {
        let name = cc.symtab.name(sym);

        self.out.push('\n');
        self.out.push_str(&section_comment("CHSM class declaration"));
        self.out.push('\n');
        if data.public {
            self.out.push_str("public ");
        }
        self.out.push_str(&format!("class {} extends ", name));
        match &data.derived {
            Some(derived) => self.out.push_str(derived),
            None => self.out.push_str(&format!("{}.Machine", PKG)),
        }
        self.out.push_str(" {\n");

        // states
        self.out.push_str(&format!("\n{}// states\n", ind(1)));
        accept(cc, data.root, self);
        if let Some(root) = cc.symtab.info(data.root).and_then(|i| i.kind.as_parent()) {
            for &child in &root.children {
                accept(cc, child, self);
            }
        }

        // events
        self.out.push_str(&format!("\n{}// events\n", ind(1)));
        for &event in &data.events {
            accept(cc, event, self);
        }

        // constructor
        self.out
            .push_str(&format!("\n{}// constructor definition\n", ind(1)));
        self.out.push_str(&format!(
            "{}public {}( {} ) {{\n{}super( {} );\n",
            ind(1),
            name,
            emit_param_list(&data.params, EMIT_FORMAL),
            ind(2),
            emit_param_list(&data.params, EMIT_ACTUAL)
        ));

        let mut initializer = Initializer {
            out: &mut *self.out,
            emitting_constructor: true,
            depth: 2,
        };
        initializer
            .out
            .push_str(&format!("\n{}// initialize events\n", ind(2)));
        for &event in &data.events {
            accept(cc, event, &mut initializer);
        }
        initializer
            .out
            .push_str(&format!("\n{}// initialize states\n", ind(2)));
        accept(cc, data.root, &mut initializer);
        if let Some(root) = cc.symtab.info(data.root).and_then(|i| i.kind.as_parent()) {
            for &child in &root.children {
                accept(cc, child, &mut initializer);
            }
        }

        // state array
        self.out
            .push_str(&format!("\n{}// initialize state array\n", ind(2)));
        self.out
            .push_str(&format!("{}state_[ 0 ] = root;\n", ind(2)));
        for (index, &state) in data.states.iter().enumerate() {
            self.out.push_str(&format!(
                "{}state_[ {} ] = {};\n",
                ind(2),
                index + 1,
                cc.symtab.name(state)
            ));
        }
        self.out.push_str(&format!(
            "\n{}init( root, state_, transition_ );\n{}}}\n",
            ind(2),
            ind(1)
        ));

        // thunk instances for conditions, targets, and actions
        self.out
            .push_str(&format!("\n{}// transition conditions\n", ind(1)));
        for id in 1..=data.ids.condition {
            self.out.push_str(&format!(
                "{}private static final Thunk_{pc}{id} {pc}{id} = new Thunk_{pc}{id}();\n",
                ind(1),
                pc = PREFIX_CONDITION,
                id = id
            ));
        }
        self.out
            .push_str(&format!("\n{}// transition targets\n", ind(1)));
        for id in 1..=data.ids.target {
            self.out.push_str(&format!(
                "{}private static final Thunk_{pt}{id} {pt}{id} = new Thunk_{pt}{id}();\n",
                ind(1),
                pt = PREFIX_TARGET,
                id = id
            ));
        }
        self.out
            .push_str(&format!("\n{}// transition actions\n", ind(1)));
        for id in 1..=data.ids.action {
            self.out.push_str(&format!(
                "{}private static final Thunk_{pa}{id} {pa}{id} = new Thunk_{pa}{id}();\n",
                ind(1),
                pa = PREFIX_ACTION,
                id = id
            ));
        }

        // data members
        self.out.push_str(&format!(
            "\n{}// data members\n{}private final {}.State state_[] = new {}.State[{}];\n",
            ind(1),
            ind(1),
            PKG,
            PKG,
            data.states.len() + 1
        ));
        self.out.push_str(&format!(
            "{}private static final {}.Transition transition_[] = {{",
            ind(1),
            PKG
        ));
        if data.transitions.is_empty() {
            self.out.push_str(" null");
        } else {
            let mut first = true;
            for transition in &data.transitions {
                if !first {
                    self.out.push(',');
                }
                first = false;
                self.out.push_str(&format!("\n{}", ind(2)));
                self.visit_transition(cc, transition);
            }
        }
        self.out.push_str(&format!("\n{}}};\n", ind(1)));

        // user-code: thunks and auxiliary methods captured during parsing
        self.out.push_str(&format!("\n{}// user-code\n", ind(1)));
        self.out.push_str(self.user_code);
        self.out.push_str("}\n");
    }

    fn visit_cluster(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData, _history: bool) {
        self.emit_parent_common(
            cc,
            sym,
            data,
            Some("boolean chsmH"),
            Some("chsmH"),
        );
    }

    fn visit_set(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData) {
        self.emit_parent_common(cc, sym, data, None, None);
    }

    fn visit_state(&mut self, cc: &Compiler, sym: SymbolId, data: &StateData) {
        let full = cc.symtab.name(sym);
        self.out.push_str(&format!(
            "{}public final {} {}; // id = {}\n",
            ind(self.depth),
            lib_class(cc, sym),
            state_base_name(full),
            data.id
        ));
    }

    fn visit_event(&mut self, cc: &Compiler, sym: SymbolId, data: &EventData) {
        self.emit_event_common(cc, sym, data);
        self.out.push_str(&format!(
            "{}protected final {} {};\n",
            ind(1),
            lib_class(cc, sym),
            cc.symtab.name(sym)
        ));
    }

    fn visit_user_event(&mut self, cc: &Compiler, sym: SymbolId, data: &UserEventData) {
        self.emit_event_common(cc, sym, &data.event);

        let name = cc.symtab.name(sym);
        let class = event_class(name);
        let base_class = base_event_class(cc, data);
        let has_params = has_any_parameters(&cc.symtab, sym);
        let all_params = collect_params(&cc.symtab, sym);

        self.out.push_str(&format!(
            "{}protected static class {} extends {} {{\n",
            ind(1),
            class,
            base_class
        ));

        // ParamBlock
        self.out.push_str(&format!(
            "{}protected static class ParamBlock extends {}.ParamBlock {{\n",
            ind(2),
            base_class
        ));
        for param in &data.params {
            self.out.push_str(&format!(
                "{}{};\n",
                ind(3),
                crate::parser::param::stuff_decl(&param.decl, "", &param.name)
            ));
        }
        self.out.push_str(&format!(
            "{}protected ParamBlock( {}.Event event{} ) {{\n{}super( event",
            ind(3),
            PKG,
            emit_param_list(&all_params, EMIT_COMMA | EMIT_PREFIX | EMIT_FORMAL),
            ind(4)
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
        self.out.push_str(" );\n");
        for param in &data.params {
            self.out.push_str(&format!(
                "{}this.{} = {}{};\n",
                ind(4),
                param.name,
                crate::parser::param::PARAM_PREFIX,
                param.name
            ));
        }
        self.out.push_str(&format!("{}}}\n", ind(3)));

        if data.precondition != Precondition::None {
            self.out.push_str(&format!(
                "{}protected boolean precondition() {{\n{}return super.precondition() &&\n{}(({})event_.machine()).{}_precondition( {} );\n{}}}\n",
                ind(3),
                ind(4),
                ind(5),
                cc.machine_name(),
                name,
                emit_param_list(&all_params, EMIT_ACTUAL),
                ind(3)
            ));
        }
        self.out.push_str(&format!("{}}}\n", ind(2)));

        // event constructor
        self.out.push_str(&format!(
            "{}{}( {} ) {{\n{}super( {} );\n{}}}\n",
            ind(2),
            class,
            EVENT_ARGS,
            ind(3),
            EVENT_INIT,
            ind(2)
        ));

        // broadcast helpers
        if has_params || data.precondition != Precondition::None {
            self.out.push_str(&format!(
                "{}public void broadcast( {} ) {{\n{}broadcast( new ParamBlock( this{} ) );\n{}}}\n",
                ind(2),
                emit_param_list(&all_params, EMIT_FORMAL),
                ind(3),
                emit_param_list(&all_params, EMIT_COMMA | EMIT_ACTUAL),
                ind(2)
            ));
            self.out.push_str(&format!(
                "{}public final ParamBlock {}Param() {{\n{}return (ParamBlock)paramBlock_;\n{}}}\n",
                ind(2),
                name,
                ind(3),
                ind(2)
            ));
        }

        self.out.push_str(&format!("{}}}\n", ind(1)));
        self.out.push_str(&format!(
            "{}protected final {} {};\n",
            ind(1),
            class,
            name
        ));

        // short-hand broadcast method
        self.out.push_str(&format!(
            "{}public final void {}( {} ) {{\n{}{}.broadcast( {} );\n{}}}\n",
            ind(1),
            name,
            emit_param_list(&all_params, EMIT_FORMAL),
            ind(2),
            name,
            if has_params {
                emit_param_list(&all_params, EMIT_ACTUAL)
            } else {
                "null".to_string()
            },
            ind(1)
        ));
    }

    fn visit_transition(&mut self, cc: &Compiler, transition: &Transition) {
        self.out.push_str(&format!("new {}.Transition( ", PKG));

        if transition.condition_id > 0 {
            self.out
                .push_str(&format!("{}{}", PREFIX_CONDITION, transition.condition_id));
        } else {
            self.out.push_str("null");
        }

        self.out.push_str(&format!(
            ", {}, {}, ",
            serial(&cc.symtab, Some(transition.from)),
            serial(&cc.symtab, transition.to)
        ));

        if transition.target_id > 0 {
            self.out
                .push_str(&format!("{}{}", PREFIX_TARGET, transition.target_id));
        } else {
            self.out.push_str("null");
        }

        self.out.push_str(", ");

        if transition.action_id > 0 {
            self.out
                .push_str(&format!("{}{}", PREFIX_ACTION, transition.action_id));
        } else {
            self.out.push_str("null");
        }

        self.out.push_str(" )");
    }
}

struct Initializer<'b> {
    out: &'b mut String,
    /// True while emitting inside the machine constructor, where the
    /// machine reference is `this` rather than the `chsmM` argument.
    emitting_constructor: bool,
    depth: usize,
}

impl Initializer<'_> {
    fn chsm_ref(&self) -> &'static str {
        if self.emitting_constructor {
            "this"
        } else {
            "chsmM"
        }
    }

    fn emit_state_common(&mut self, cc: &Compiler, sym: SymbolId, data: &StateData) {
        let full = cc.symtab.name(sym);
        let m = mangle(full);
        let machine = cc.machine_name();
        let chsm_ref = self.chsm_ref();

        let parent_ref = match data.parent {
            None => "null",
            Some(parent) => {
                let is_root = cc
                    .symtab
                    .info(parent)
                    .and_then(|i| i.kind.as_state())
                    .map(|s| s.parent.is_none())
                    .unwrap_or(false);
                if is_root {
                    "root"
                } else {
                    "this"
                }
            }
        };

        self.out
            .push_str(&format!("( {}, \"{}\", {}, ", chsm_ref, full, parent_ref));

        if data.action.has_enter {
            self.out
                .push_str(&format!("new Thunk_E{}{}()", PREFIX_ACTION, m));
        } else {
            self.out.push_str("null");
        }
        self.out.push_str(", ");
        if data.action.has_exit {
            self.out
                .push_str(&format!("new Thunk_X{}{}()", PREFIX_ACTION, m));
        } else {
            self.out.push_str("null");
        }
        self.out.push_str(", ");

        if data.event.has_enter {
            self.out
                .push_str(&format!("(({}){}).E{}", machine, chsm_ref, m));
        } else {
            self.out.push_str("null");
        }
        self.out.push_str(", ");
        if data.event.has_exit {
            self.out
                .push_str(&format!("(({}){}).X{}", machine, chsm_ref, m));
        } else {
            self.out.push_str("null");
        }
    }

    fn emit_event_common(&mut self, cc: &Compiler, sym: SymbolId) {
        let name = cc.symtab.name(sym);
        self.out.push_str(&format!(
            "{}{} = new ",
            ind(self.depth),
            name
        ));
    }

    fn finish_event(&mut self, cc: &Compiler, sym: SymbolId, data: &EventData, base: &str) {
        let name = cc.symtab.name(sym);
        self.out.push_str(&format!(
            "( this, {}{}, \"{}\", {} );\n",
            name,
            TRANSITIONS_SUFFIX,
            display_name(cc, sym, data),
            base
        ));
    }
}

impl InfoVisitor for Initializer<'_> {
    fn visit_chsm(&mut self, _cc: &Compiler, _sym: SymbolId, _data: &ChsmData) {
        // nothing to initialize
    }

    fn visit_cluster(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData, history: bool) {
        let full = cc.symtab.name(sym);
        let base = state_base_name(full);
        self.out.push_str(&format!(
            "{}{} = new {}{}",
            ind(self.depth),
            base,
            STATE_CLASS_PREFIX,
            base
        ));
        self.emit_state_common(cc, sym, &data.state);
        self.out.push_str(&format!(
            ", {} );\n",
            if history { "true" } else { "false" }
        ));
    }

    fn visit_set(&mut self, cc: &Compiler, sym: SymbolId, data: &ParentData) {
        let full = cc.symtab.name(sym);
        let base = state_base_name(full);
        self.out.push_str(&format!(
            "{}{} = new {}{}",
            ind(self.depth),
            base,
            STATE_CLASS_PREFIX,
            base
        ));
        self.emit_state_common(cc, sym, &data.state);
        self.out.push_str(" );\n");
    }

    fn visit_state(&mut self, cc: &Compiler, sym: SymbolId, data: &StateData) {
        let full = cc.symtab.name(sym);
        self.out.push_str(&format!(
            "{}{} = new {}",
            ind(self.depth),
            state_base_name(full),
            lib_class(cc, sym)
        ));
        self.emit_state_common(cc, sym, data);
        self.out.push_str(" );\n");
    }

    fn visit_event(&mut self, cc: &Compiler, sym: SymbolId, data: &EventData) {
        self.emit_event_common(cc, sym);
        self.out.push_str(&lib_class(cc, sym));
        self.finish_event(cc, sym, data, "null");
    }

    fn visit_user_event(&mut self, cc: &Compiler, sym: SymbolId, data: &UserEventData) {
        self.emit_event_common(cc, sym);
        let class = event_class(cc.symtab.name(sym));
        self.out.push_str(&class);
        let base = match data.base {
            Some(base) => cc.symtab.name(base).to_string(),
            None => "null".to_string(),
        };
        self.finish_event(cc, sym, &data.event, &base);
    }

    fn visit_transition(&mut self, _cc: &Compiler, _transition: &Transition) {
        // nothing to initialize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    fn compile_java(source: &str) -> crate::Compilation {
        compile(source, "test.chsmj", Lang::Java, true, None).unwrap()
    }

    #[test]
    fn test_smoke() {
        let result = compile_java("chsm M() is { state s; }");
        assert!(result.succeeded());
        let java = &result.declaration;
        assert!(result.definition.is_empty());
        assert!(java.contains("class M extends CHSM.Machine {"));
        assert!(java.contains("public final CHSM.State s; // id = 1"));
        assert!(java.contains("state_[ 0 ] = root;"));
        assert!(java.contains("state_[ 1 ] = s;"));
        assert!(java.contains("init( root, state_, transition_ );"));
        assert!(java.contains("///// chsmc: THE END"));
    }

    #[test]
    fn test_public_machine() {
        let result = compile_java("chsm public M() is { state s; }");
        assert!(result.declaration.contains("public class M extends CHSM.Machine {"));
    }

    #[test]
    fn test_cluster_children_and_history() {
        let result = compile_java(
            "chsm M() is { cluster c(a,b) history is { state a; state b; a -> b; } }",
        );
        assert!(result.succeeded());
        let java = &result.declaration;
        assert!(java.contains("final static class State_c extends CHSM.Cluster { // id = 1"));
        assert!(java.contains("private static final int children_[] = new int[] { 2, 3 };"));
        assert!(java.contains("c = new State_c( this, \"c\", root, null, null, null, null, true );"));
        assert!(java.contains("new CHSM.Transition( null, 2, 3, null, null )"));
    }

    #[test]
    fn test_nested_state_initialized_in_parent_constructor() {
        let result = compile_java("chsm M() is { cluster c(a) is { state a; } }");
        assert!(result.succeeded());
        let java = &result.declaration;
        // The child is constructed inside State_c's constructor with the
        // machine argument, not `this`.
        assert!(java.contains("a = new CHSM.State( chsmM, \"c.a\", this, null, null, null, null );"));
    }

    #[test]
    fn test_event_with_parameters() {
        let result = compile_java(
            "chsm M() is { event e(int n); state a; state b; a is { e -> b; } }",
        );
        assert!(result.succeeded());
        let java = &result.declaration;
        assert!(java.contains("protected static class eEvent extends CHSM.Event {"));
        assert!(java.contains("protected static class ParamBlock extends CHSM.Event.ParamBlock {"));
        assert!(java.contains("int n;"));
        assert!(java.contains("protected ParamBlock( CHSM.Event event, int Pn ) {"));
        assert!(java.contains("this.n = Pn;"));
        assert!(java.contains("public void broadcast( int n ) {"));
        assert!(java.contains("public final void e( int n ) {"));
    }

    #[test]
    fn test_event_inheritance() {
        let result = compile_java(
            "chsm M() is { event base(int x); event d<base>(int y); state a; state b; a is { base -> b; d -> b; } }",
        );
        assert!(result.succeeded());
        let java = &result.declaration;
        assert!(java.contains("protected static class dEvent extends M.baseEvent {"));
        assert!(java.contains("protected ParamBlock( CHSM.Event event, int Px, int Py ) {"));
        assert!(java.contains("super( event, Px );"));
    }

    #[test]
    fn test_condition_thunk() {
        let result = compile_java(
            "chsm M() is { event e; state a; state b; a is { e -> b [ ok() ]; } }",
        );
        assert!(result.succeeded());
        let java = &result.declaration;
        assert!(java.contains("private static final class Thunk_C1 implements CHSM.Transition.Condition {"));
        assert!(java.contains("private boolean thunk_C1( CHSM.Event event ) {"));
        assert!(java.contains("return ok();"));
        assert!(java.contains("private static final Thunk_C1 C1 = new Thunk_C1();"));
        assert!(java.contains("new CHSM.Transition( C1, 1, 2, null, null )"));
    }

    #[test]
    fn test_enter_exit_thunks() {
        let result = compile_java("chsm M() is { state s upon exit %{ bye(); %}; }");
        assert!(result.succeeded());
        let java = &result.declaration;
        assert!(java.contains("private static final class Thunk_XAM1s implements CHSM.State.Action {"));
        assert!(java.contains("private void XAM1s( CHSM.State state, CHSM.Event event ) {"));
        assert!(java.contains("bye();"));
        assert!(java.contains("new Thunk_XAM1s()"));
    }

    #[test]
    fn test_line_directives_are_comments() {
        let result = compile_java(
            "chsm M() is { event e; state a; a is { e -> ... %{ act(); %}; } }",
        );
        assert!(result.succeeded());
        assert!(result.declaration.contains("//#line"));
        assert!(!result.declaration.contains("\n#line"));
    }

    #[test]
    fn test_empty_transition_table() {
        let result = compile_java("chsm M() is { state s; }");
        assert!(result
            .declaration
            .contains("private static final CHSM.Transition transition_[] = { null"));
    }

    #[test]
    fn test_ancestor_transition_emitted_first_regardless_of_textual_order() {
        // The nested state's transition is written before the enclosing
        // cluster's own trigger; the table must still list the ancestor's
        // entry (from c, id 1) ahead of the descendant's (from c.a, id 2).
        let result = compile_java(
            "chsm M() is { event e; cluster c(a,b) is { state a; state b; a is { e -> b; } e -> a; } }",
        );
        assert!(result.succeeded());
        let java = &result.declaration;
        let ancestor = java
            .find("new CHSM.Transition( null, 1, 2, null, null )")
            .unwrap();
        let descendant = java
            .find("new CHSM.Transition( null, 2, 3, null, null )")
            .unwrap();
        assert!(ancestor < descendant);
        // The event's id list is remapped to the reordered table.
        assert!(java.contains("private final static int eTransitions[] = { 1, 0 };"));
    }

    #[test]
    fn test_precondition_expression() {
        let result = compile_java(
            "chsm M() is { event e [count > 0]; state a; a is { e -> ...; } }",
        );
        assert!(result.succeeded());
        let java = &result.declaration;
        assert!(java.contains("boolean e_precondition(  ) {"));
        assert!(java.contains("count > 0"));
        assert!(java.contains("protected boolean precondition() {"));
        assert!(java.contains("return super.precondition() &&"));
    }
}
