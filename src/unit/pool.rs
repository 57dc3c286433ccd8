//! Run-scoped string interning.

use std::sync::Arc;

use dashmap::DashSet;

/// Concurrent interner for the UTF-8 constants of every unit decoded during one run.
///
/// Obfuscated artifacts repeat the same short names and descriptors across tens of thousands of
/// units, so decoded constant pools share one allocation per distinct string. The pool is owned
/// by a pipeline run: Load and Classify fill it, and it is cleared once Emit has drained the
/// working set.
#[derive(Debug, Default)]
pub struct SymbolPool {
    symbols: DashSet<Arc<str>>,
}

impl SymbolPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        SymbolPool::default()
    }

    /// Return the shared instance of `value`, inserting it on first use.
    pub fn intern(&self, value: &str) -> Arc<str> {
        if let Some(existing) = self.symbols.get(value) {
            return Arc::clone(existing.key());
        }

        let symbol: Arc<str> = Arc::from(value);
        if self.symbols.insert(Arc::clone(&symbol)) {
            return symbol;
        }

        // Lost a race with another thread, hand out the winner
        self.symbols
            .get(value)
            .map_or(symbol, |existing| Arc::clone(existing.key()))
    }

    /// Number of distinct symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns `true` if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Drop every symbol. Outstanding `Arc`s stay valid.
    pub fn clear(&self) {
        self.symbols.clear();
    }
}
