//! The symbol table proper: a name-to-symbol map plus a scope counter.

use indexmap::IndexMap;

use crate::symbol::info::Info;

pub type Scope = u32;

/// Sentinel "no scope".
pub const SCOPE_NONE: Scope = 0;
/// The global scope; local scopes are greater.
pub const SCOPE_GLOBAL: Scope = 1;

/// A stable handle to a symbol.  Handles stay valid even after the symbol
/// loses its last info and its name becomes reusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

/// A named identifier owning a stack of infos ordered innermost-first
/// (descending scope).
#[derive(Debug)]
pub struct Symbol {
    name: String,
    infos: Vec<Info>,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The innermost info, if any.
    pub fn info(&self) -> Option<&Info> {
        self.infos.first()
    }
}

/// A mapping name -> symbol with a current scope.  Closing a scope destroys
/// every info belonging to it; a symbol that loses its last info is removed
/// from the name map.
pub struct SymbolTable {
    names: IndexMap<String, SymbolId>,
    arena: Vec<Symbol>,
    scope: Scope,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            names: IndexMap::new(),
            arena: Vec::new(),
            scope: SCOPE_GLOBAL,
        }
    }

    pub fn current_scope(&self) -> Scope {
        self.scope
    }

    pub fn open_scope(&mut self) {
        self.scope += 1;
    }

    /// Close the current scope, destroying every info at it and removing
    /// symbols that lose their last info.
    pub fn close_scope(&mut self) {
        if self.scope <= SCOPE_GLOBAL {
            return;
        }
        let closing = self.scope;
        let arena = &mut self.arena;
        self.names.retain(|_, id| {
            let sym = &mut arena[id.0 as usize];
            while sym.infos.first().map(|i| i.scope) == Some(closing) {
                sym.infos.remove(0);
            }
            !sym.infos.is_empty()
        });
        self.scope -= 1;
    }

    /// The symbol currently bound to `name`, if it has at least one info.
    pub fn id(&self, name: &str) -> Option<SymbolId> {
        self.names.get(name).copied()
    }

    /// The symbol for `name`, creating an empty one if absent.
    pub fn entry(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = SymbolId(self.arena.len() as u32);
        self.arena.push(Symbol {
            name: name.to_string(),
            infos: Vec::new(),
        });
        self.names.insert(name.to_string(), id);
        id
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.arena[id.0 as usize].name
    }

    /// The innermost info of `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<(SymbolId, &Info)> {
        let id = self.id(name)?;
        self.info(id).map(|info| (id, info))
    }

    /// The innermost info of a symbol.
    pub fn info(&self, id: SymbolId) -> Option<&Info> {
        self.arena[id.0 as usize].infos.first()
    }

    pub fn info_mut(&mut self, id: SymbolId) -> Option<&mut Info> {
        self.arena[id.0 as usize].infos.first_mut()
    }

    /// Insert a new info for a symbol at the position its scope dictates:
    /// infos stay ordered innermost-first, so a global info inserted while a
    /// nested scope is open lands beneath any nested-scope infos.
    pub fn insert_info(&mut self, id: SymbolId, info: Info) {
        let sym = &mut self.arena[id.0 as usize];
        // If the symbol vanished from the name map earlier, rebind it.
        self.names.entry(sym.name.clone()).or_insert(id);
        let pos = sym
            .infos
            .iter()
            .position(|existing| info.scope >= existing.scope)
            .unwrap_or(sym.infos.len());
        sym.infos.insert(pos, info);
    }

    /// Iterate all live symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.names
            .values()
            .map(move |&id| (id, &self.arena[id.0 as usize]))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::info::InfoKind;

    fn scoped(scope: Scope, kind: InfoKind) -> Info {
        Info {
            scope,
            first_ref: 1,
            used: false,
            kind,
        }
    }

    #[test]
    fn test_lookup_absent() {
        let table = SymbolTable::new();
        assert!(table.lookup("x").is_none());
    }

    #[test]
    fn test_shadow_and_restore() {
        let mut table = SymbolTable::new();
        table.open_scope(); // scope 2
        let a = table.entry("a");
        table.insert_info(a, scoped(table.current_scope(), InfoKind::Global));
        table.open_scope(); // scope 3
        table.insert_info(a, scoped(table.current_scope(), InfoKind::Global));

        let (_, info) = table.lookup("a").unwrap();
        assert_eq!(info.scope, 3);

        table.close_scope();
        let (_, info) = table.lookup("a").unwrap();
        assert_eq!(info.scope, 2);

        table.close_scope();
        assert!(table.lookup("a").is_none());
    }

    #[test]
    fn test_global_insert_goes_beneath_nested() {
        let mut table = SymbolTable::new();
        table.open_scope();
        let a = table.entry("a");
        table.insert_info(a, scoped(table.current_scope(), InfoKind::Global));
        // A global info inserted while the nested scope is open.
        table.insert_info(a, scoped(SCOPE_GLOBAL, InfoKind::Global));
        let (_, info) = table.lookup("a").unwrap();
        assert_eq!(info.scope, 2);
        table.close_scope();
        let (_, info) = table.lookup("a").unwrap();
        assert_eq!(info.scope, SCOPE_GLOBAL);
    }

    #[test]
    fn test_global_scope_never_closes() {
        let mut table = SymbolTable::new();
        let a = table.entry("a");
        table.insert_info(a, scoped(SCOPE_GLOBAL, InfoKind::Global));
        table.close_scope();
        assert!(table.lookup("a").is_some());
        assert_eq!(table.current_scope(), SCOPE_GLOBAL);
    }

    #[test]
    fn test_name_reuse_after_removal() {
        let mut table = SymbolTable::new();
        table.open_scope();
        let a = table.entry("a");
        table.insert_info(a, scoped(table.current_scope(), InfoKind::Global));
        table.close_scope();
        assert!(table.lookup("a").is_none());
        let b = table.entry("a");
        assert_ne!(a, b);
        // The old handle still resolves to its name.
        assert_eq!(table.name(a), "a");
    }
}
