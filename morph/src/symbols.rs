use std::{collections::HashMap, sync::Arc};

use ahash::RandomState;
use parking_lot::RwLock;

/// An interned name. Two symbols are equal iff their names are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default)]
struct SymbolTableImpl {
    names: Vec<Arc<str>>,
    mappings: HashMap<Arc<str>, Symbol, RandomState>,
}

/// Symbol table shared by every thread of a context.
#[derive(Debug, Default)]
pub struct SymbolTable(RwLock<SymbolTableImpl>);

impl SymbolTableImpl {
    fn get_or_add(&mut self, name: &str) -> Symbol {
        if let Some(&symbol) = self.mappings.get(name) {
            return symbol;
        }
        let raw = u32::try_from(self.names.len())
            .expect("symbol table exceeded u32::MAX entries");
        let symbol = Symbol(raw);
        let interned = Arc::<str>::from(name);
        self.names.push(interned.clone());
        self.mappings.insert(interned, symbol);
        symbol
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, name: &str) -> Symbol {
        if let Some(&symbol) = self.0.read().mappings.get(name) {
            return symbol;
        }
        self.0.write().get_or_add(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.0.read().mappings.get(name).copied()
    }

    pub fn name(&self, symbol: Symbol) -> Option<Arc<str>> {
        self.0.read().names.get(symbol.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
