//! Per-scope info records: the compiler's IR
//!
//! Every symbol meaning is one of the variants of [`InfoKind`].  States,
//! clusters, and sets share [`StateData`]; clusters and sets additionally
//! carry their child lists.  The singleton machine record owns the
//! declaration-ordered state, event, and transition lists.

use crate::parser::param::FnParam;
use crate::symbol::table::{Scope, SymbolId};

/// Serial number of a state in emitted tables; `-1` encodes "none".
pub type StateId = i32;

pub const NO_STATE: StateId = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    User,
    Enter,
    Exit,
}

/// Paired enter/exit flags, used both for actions (`upon` clauses) and for
/// the back-patched synthetic-event flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnterExit {
    pub has_enter: bool,
    pub has_exit: bool,
}

/// Data common to plain states, clusters, and sets.
#[derive(Debug, Clone)]
pub struct StateData {
    /// Parent state; `None` only for the root cluster.
    pub parent: Option<SymbolId>,
    /// Backend-language class this state derives from, if any.
    pub derived: Option<String>,
    /// Serial id in definition order; the root cluster is 0.
    pub id: StateId,
    /// Which `upon enter`/`upon exit` action blocks were given.
    pub action: EnterExit,
    /// Which synthetic enter/exit events are actually broadcast; set by the
    /// validator's back-patching pass.
    pub event: EnterExit,
}

/// A cluster's or set's state data plus its children in definition order.
#[derive(Debug, Clone)]
pub struct ParentData {
    pub state: StateData,
    pub children: Vec<SymbolId>,
}

/// A name appearing in a parent's child list before its definition is seen.
#[derive(Debug, Clone)]
pub struct ChildData {
    pub parent: SymbolId,
    pub defined: bool,
}

/// An event: a user event, or a synthetic enter/exit event of a state.
#[derive(Debug, Clone)]
pub struct EventData {
    pub kind: EventKind,
    /// The state this is an enter/exit event for; `None` for user events.
    pub state: Option<SymbolId>,
    /// Indices into the machine's transition list, in declaration order.
    pub transition_ids: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    None,
    /// `event e [ expr ];`
    Expr,
    /// `event e %{ ... %};`
    Func,
}

#[derive(Debug, Clone)]
pub struct UserEventData {
    pub event: EventData,
    /// Base event for single-inheritance chains, if any.
    pub base: Option<SymbolId>,
    pub params: Vec<FnParam>,
    pub precondition: Precondition,
}

/// One transition record; owned by the machine record in declaration order.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Source line of the transition, for diagnostics.
    pub first_ref: u32,
    pub from: SymbolId,
    /// `None` for internal transitions and computed targets.
    pub to: Option<SymbolId>,
    /// Ids of compiler-synthesized auxiliary functions; 0 means absent.
    pub condition_id: u32,
    pub target_id: u32,
    pub action_id: u32,
}

/// Counters handing out fresh condition/target/action ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdCounters {
    pub condition: u32,
    pub target: u32,
    pub action: u32,
}

/// The singleton machine record.
#[derive(Debug, Clone)]
pub struct ChsmData {
    pub root: SymbolId,
    pub derived: Option<String>,
    /// Whether the generated Java class is `public`.
    pub public: bool,
    pub params: Vec<FnParam>,
    pub ids: IdCounters,
    /// All user states in definition order (the root is tracked separately).
    pub states: Vec<SymbolId>,
    /// All events in declaration order; base events precede derived ones.
    pub events: Vec<SymbolId>,
    pub transitions: Vec<Transition>,
    /// A leading `%{ ... %}` block of host-language declarations.
    pub declarations: Option<(u32, String)>,
}

#[derive(Debug, Clone)]
pub enum InfoKind {
    Child(ChildData),
    /// Forward reference to a state not yet defined.
    Global,
    State(StateData),
    Cluster {
        parent: ParentData,
        history: bool,
        deep: bool,
    },
    Set(ParentData),
    Event(EventData),
    UserEvent(UserEventData),
    Chsm(ChsmData),
}

/// One scope's meaning of a symbol.
#[derive(Debug, Clone)]
pub struct Info {
    pub scope: Scope,
    /// Line the symbol was first referenced on.
    pub first_ref: u32,
    pub used: bool,
    pub kind: InfoKind,
}

impl InfoKind {
    /// Human-readable kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            InfoKind::Child(_) => "child state",
            InfoKind::Global => "undefined state",
            InfoKind::State(_) => "state",
            InfoKind::Cluster { .. } => "cluster",
            InfoKind::Set(_) => "set",
            InfoKind::Event(_) => "event",
            InfoKind::UserEvent(_) => "event",
            InfoKind::Chsm(_) => "chsm",
        }
    }

    /// The state data of a state, cluster, or set.
    pub fn as_state(&self) -> Option<&StateData> {
        match self {
            InfoKind::State(data) => Some(data),
            InfoKind::Cluster { parent, .. } => Some(&parent.state),
            InfoKind::Set(parent) => Some(&parent.state),
            _ => None,
        }
    }

    pub fn as_state_mut(&mut self) -> Option<&mut StateData> {
        match self {
            InfoKind::State(data) => Some(data),
            InfoKind::Cluster { parent, .. } => Some(&mut parent.state),
            InfoKind::Set(parent) => Some(&mut parent.state),
            _ => None,
        }
    }

    /// The child list of a cluster or set.
    pub fn as_parent(&self) -> Option<&ParentData> {
        match self {
            InfoKind::Cluster { parent, .. } => Some(parent),
            InfoKind::Set(parent) => Some(parent),
            _ => None,
        }
    }

    pub fn as_parent_mut(&mut self) -> Option<&mut ParentData> {
        match self {
            InfoKind::Cluster { parent, .. } => Some(parent),
            InfoKind::Set(parent) => Some(parent),
            _ => None,
        }
    }

    /// The event data of a synthetic or user event.
    pub fn as_event(&self) -> Option<&EventData> {
        match self {
            InfoKind::Event(data) => Some(data),
            InfoKind::UserEvent(data) => Some(&data.event),
            _ => None,
        }
    }

    pub fn as_event_mut(&mut self) -> Option<&mut EventData> {
        match self {
            InfoKind::Event(data) => Some(data),
            InfoKind::UserEvent(data) => Some(&mut data.event),
            _ => None,
        }
    }

    pub fn as_user_event(&self) -> Option<&UserEventData> {
        match self {
            InfoKind::UserEvent(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_state_like(&self) -> bool {
        self.as_state().is_some()
    }
}

/// Serial id of an optional state reference for emitted tables.
pub fn serial(symtab: &crate::symbol::table::SymbolTable, sym: Option<SymbolId>) -> StateId {
    let Some(sym) = sym else {
        return NO_STATE;
    };
    symtab
        .info(sym)
        .and_then(|info| info.kind.as_state())
        .map(|state| state.id)
        .unwrap_or(NO_STATE)
}

/// Whether a user event has any parameters, including those inherited
/// transitively from its base events.
pub fn has_any_parameters(
    symtab: &crate::symbol::table::SymbolTable,
    event: SymbolId,
) -> bool {
    let mut current = Some(event);
    while let Some(sym) = current {
        match symtab.info(sym).and_then(|info| info.kind.as_user_event()) {
            Some(data) => {
                if !data.params.is_empty() {
                    return true;
                }
                current = data.base;
            }
            None => break,
        }
    }
    false
}

/// The event's full parameter list, base-event parameters first.
pub fn collect_params(
    symtab: &crate::symbol::table::SymbolTable,
    event: SymbolId,
) -> Vec<FnParam> {
    let mut chain = Vec::new();
    let mut current = Some(event);
    while let Some(sym) = current {
        match symtab.info(sym).and_then(|info| info.kind.as_user_event()) {
            Some(data) => {
                chain.push(sym);
                current = data.base;
            }
            None => break,
        }
    }
    let mut params = Vec::new();
    for sym in chain.into_iter().rev() {
        if let Some(data) = symtab.info(sym).and_then(|info| info.kind.as_user_event()) {
            params.extend(data.params.iter().cloned());
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::table::{SymbolTable, SCOPE_GLOBAL};

    fn user_event(base: Option<SymbolId>, params: Vec<FnParam>) -> Info {
        Info {
            scope: SCOPE_GLOBAL,
            first_ref: 1,
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
        }
    }

    #[test]
    fn test_has_any_parameters_walks_base_chain() {
        let mut table = SymbolTable::new();
        let base = table.entry("base");
        table.insert_info(
            base,
            user_event(
                None,
                vec![FnParam {
                    line: 1,
                    decl: "int $".to_string(),
                    name: "x".to_string(),
                }],
            ),
        );
        let derived = table.entry("d");
        table.insert_info(derived, user_event(Some(base), Vec::new()));

        assert!(has_any_parameters(&table, derived));
        let params = collect_params(&table, derived);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "x");
    }

    #[test]
    fn test_no_parameters() {
        let mut table = SymbolTable::new();
        let e = table.entry("e");
        table.insert_info(e, user_event(None, Vec::new()));
        assert!(!has_any_parameters(&table, e));
    }

    #[test]
    fn test_collect_params_orders_base_first() {
        let mut table = SymbolTable::new();
        let base = table.entry("base");
        table.insert_info(
            base,
            user_event(
                None,
                vec![FnParam {
                    line: 1,
                    decl: "int $".to_string(),
                    name: "x".to_string(),
                }],
            ),
        );
        let derived = table.entry("d");
        table.insert_info(
            derived,
            user_event(
                Some(base),
                vec![FnParam {
                    line: 2,
                    decl: "int $".to_string(),
                    name: "y".to_string(),
                }],
            ),
        );
        let params = collect_params(&table, derived);
        assert_eq!(params[0].name, "x");
        assert_eq!(params[1].name, "y");
    }
}
