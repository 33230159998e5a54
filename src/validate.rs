//! Post-parse validation
//!
//! Four checks run after parsing completes: enter/exit-event back-patching
//! (the only mutating check), state definedness, event usedness, and
//! transition well-formedness.  Child definedness is checked as each parent
//! scope closes, the only moment the scoped placeholder infos still exist.
//! A final ordering pass sorts the transition list for emission so that a
//! parent's transition on an event dominates a child's.

use crate::compiler::{internal_error, Compiler};
use crate::symbol::info::{EventKind, InfoKind, Transition};
use crate::symbol::table::SymbolId;

/// Run every post-parse pass.
pub fn run(cc: &mut Compiler) {
    backpatch_enter_exit_events(cc);
    check_states_defined(cc);
    check_events_used(cc);
    check_transitions(cc);
    order_transitions(cc);
}

/// For every synthetic enter/exit event with at least one outgoing
/// transition, flip the owning state's `has_enter_event` /
/// `has_exit_event` flag.
pub fn backpatch_enter_exit_events(cc: &mut Compiler) {
    let events = match cc.chsm_data() {
        Some(chsm) => chsm.events.clone(),
        None => return,
    };
    for event_sym in events {
        let Some(info) = cc.symtab.info(event_sym) else {
            continue;
        };
        let (kind, state, has_transitions) = match &info.kind {
            InfoKind::Event(event) => (
                event.kind,
                event.state,
                !event.transition_ids.is_empty(),
            ),
            _ => continue,
        };
        let Some(state_sym) = state else {
            continue;
        };
        if kind == EventKind::User {
            internal_error("user event recorded as an enter/exit event");
        }
        if !has_transitions {
            continue;
        }
        if let Some(state_info) = cc.symtab.info_mut(state_sym) {
            if let Some(state) = state_info.kind.as_state_mut() {
                match kind {
                    EventKind::Enter => state.event.has_enter = true,
                    EventKind::Exit => state.event.has_exit = true,
                    EventKind::User => {}
                }
            }
        }
    }
}

/// Report every child-list name in the current scope that was never
/// defined.  Called by the parser just before a parent's scope closes.
pub fn check_children_defined(cc: &mut Compiler) {
    let scope = cc.symtab.current_scope();
    let mut undefined = Vec::new();
    for (_, sym) in cc.symtab.iter() {
        let Some(info) = sym.info() else { continue };
        if info.scope != scope {
            continue;
        }
        if let InfoKind::Child(child) = &info.kind {
            if !child.defined {
                undefined.push((info.first_ref, sym.name().to_string()));
            }
        }
    }
    for (line, name) in undefined {
        cc.diags
            .error(line, format!("child state \"{}\" not defined", name));
    }
}

/// Report every state that was referenced but never defined.
pub fn check_states_defined(cc: &mut Compiler) {
    let mut undefined = Vec::new();
    for (_, sym) in cc.symtab.iter() {
        let Some(info) = sym.info() else { continue };
        if let InfoKind::Global = info.kind {
            undefined.push((info.first_ref, sym.name().to_string()));
        }
    }
    for (line, name) in undefined {
        cc.diags.error(line, format!("\"{}\" not defined", name));
    }
}

/// Report every declared user event never referenced by a transition.
pub fn check_events_used(cc: &mut Compiler) {
    let events = match cc.chsm_data() {
        Some(chsm) => chsm.events.clone(),
        None => return,
    };
    let mut unused = Vec::new();
    for event_sym in events {
        let Some(info) = cc.symtab.info(event_sym) else {
            continue;
        };
        if matches!(info.kind, InfoKind::UserEvent(_)) && !info.used {
            unused.push((info.first_ref, cc.symtab.name(event_sym).to_string()));
        }
    }
    for (line, name) in unused {
        cc.diags
            .warning(line, format!("event \"{}\" not used", name));
    }
}

/// Check each transition with a literal target: the target must be defined
/// and the nearest common ancestor of `from` and `to` must not be a set.
/// Ancestor/descendant pairs are exempt.
pub fn check_transitions(cc: &mut Compiler) {
    let transitions = match cc.chsm_data() {
        Some(chsm) => chsm.transitions.clone(),
        None => return,
    };
    let mut complaints = Vec::new();
    for transition in &transitions {
        let Some(to) = transition.to else { continue };
        // An undefined target was already reported by the state check.
        let to_defined = cc
            .symtab
            .info(to)
            .map(|info| info.kind.is_state_like())
            .unwrap_or(false);
        if !to_defined {
            continue;
        }
        if let Some(nca) = nearest_common_ancestor(cc, transition.from, to) {
            if nca == transition.from || nca == to {
                continue;
            }
            let is_set = cc
                .symtab
                .info(nca)
                .map(|info| matches!(info.kind, InfoKind::Set(_)))
                .unwrap_or(false);
            if is_set {
                complaints.push(transition.first_ref);
            }
        }
    }
    for line in complaints {
        cc.diags.error(line, "intra-set transition");
    }
}

/// Reorder the transition list so that a transition whose `from` state is
/// an ancestor of another's appears earlier in the emitted table; a parent's
/// transition on an event must dominate a child's on the same event.  The
/// sort is stable, so unrelated transitions keep declaration order.  Every
/// event's transition-id list is remapped to the new positions.
pub fn order_transitions(cc: &mut Compiler) {
    let (transitions, events) = match cc.chsm_data() {
        Some(chsm) => (chsm.transitions.clone(), chsm.events.clone()),
        None => return,
    };

    let depths: Vec<usize> = transitions
        .iter()
        .map(|t| ancestry(cc, t.from).len())
        .collect();
    let mut order: Vec<usize> = (0..transitions.len()).collect();
    order.sort_by_key(|&i| depths[i]);

    if order.iter().enumerate().all(|(new, &old)| new == old) {
        return;
    }

    let mut new_index = vec![0usize; order.len()];
    for (new, &old) in order.iter().enumerate() {
        new_index[old] = new;
    }

    let reordered: Vec<Transition> = order.iter().map(|&i| transitions[i].clone()).collect();
    if let Some(chsm) = cc.chsm_data_mut() {
        chsm.transitions = reordered;
    }
    for event_sym in events {
        if let Some(info) = cc.symtab.info_mut(event_sym) {
            if let Some(event) = info.kind.as_event_mut() {
                for id in &mut event.transition_ids {
                    *id = new_index[*id];
                }
            }
        }
    }
}

fn ancestry(cc: &Compiler, mut sym: SymbolId) -> Vec<SymbolId> {
    let mut chain = vec![sym];
    while let Some(parent) = cc
        .symtab
        .info(sym)
        .and_then(|info| info.kind.as_state())
        .and_then(|state| state.parent)
    {
        chain.push(parent);
        sym = parent;
    }
    chain
}

fn nearest_common_ancestor(cc: &Compiler, a: SymbolId, b: SymbolId) -> Option<SymbolId> {
    let ancestors_of_a = ancestry(cc, a);
    for candidate in ancestry(cc, b) {
        if ancestors_of_a.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}
