//! Cell value store
//!
//! The published value of every non-empty cell, keyed by [`CellKey`].
//! Formula cells hold their text together with the last computed value.

use ahash::AHashMap;
use gridcalc_core::CellValue;
use gridcalc_formula::CellKey;

/// Map from cell to stored value
#[derive(Debug, Clone, Default)]
pub struct CellStore {
    cells: AHashMap<CellKey, CellValue>,
}

impl CellStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value of a cell, `None` when the cell is empty
    pub fn get(&self, cell: CellKey) -> Option<&CellValue> {
        self.cells.get(&cell)
    }

    /// Value a reader sees: the cached result for formulas
    pub fn effective_value(&self, cell: CellKey) -> CellValue {
        self.cells
            .get(&cell)
            .map(|v| v.effective_value().clone())
            .unwrap_or_default()
    }

    /// Store a value; storing `Empty` removes the cell
    pub fn set(&mut self, cell: CellKey, value: CellValue) {
        if value.is_empty() {
            self.cells.remove(&cell);
        } else {
            self.cells.insert(cell, value);
        }
    }

    /// Store formula text, carrying the previous value over as the cached
    /// result until the formula has been calculated
    pub fn set_formula(&mut self, cell: CellKey, text: String) {
        let previous = self
            .cells
            .remove(&cell)
            .map(|v| v.effective_value().clone())
            .filter(|v| !v.is_empty());

        self.cells.insert(
            cell,
            CellValue::Formula {
                text,
                cached_value: previous.map(Box::new),
            },
        );
    }

    /// Publish a computed value
    ///
    /// Formula cells keep their text and take `value` as the cached result;
    /// any other cell is overwritten.
    pub fn publish(&mut self, cell: CellKey, value: CellValue) {
        match self.cells.get_mut(&cell) {
            Some(CellValue::Formula { cached_value, .. }) => {
                *cached_value = Some(Box::new(value));
            }
            _ => self.set(cell, value),
        }
    }

    /// Remove a cell, returning what it held
    pub fn remove(&mut self, cell: CellKey) -> Option<CellValue> {
        self.cells.remove(&cell)
    }

    /// Number of non-empty cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate over all stored cells (unordered)
    pub fn iter(&self) -> impl Iterator<Item = (CellKey, &CellValue)> + '_ {
        self.cells.iter().map(|(k, v)| (*k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcalc_core::CellError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_and_remove() {
        let mut store = CellStore::new();
        let a1 = CellKey::new(0, 0, 0);

        store.set(a1, CellValue::from(42.0));
        assert_eq!(store.get(a1), Some(&CellValue::Number(42.0)));
        assert_eq!(store.len(), 1);

        store.set(a1, CellValue::Empty);
        assert!(store.get(a1).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_formula_keeps_previous_value_until_published() {
        let mut store = CellStore::new();
        let a1 = CellKey::new(0, 0, 0);

        store.set(a1, CellValue::from(1.0));
        store.set_formula(a1, "=2+2".to_string());
        assert_eq!(store.effective_value(a1), CellValue::Number(1.0));

        store.publish(a1, CellValue::Number(4.0));
        assert_eq!(store.effective_value(a1), CellValue::Number(4.0));
        assert_eq!(store.get(a1).and_then(|v| v.formula_text()), Some("=2+2"));
    }

    #[test]
    fn test_publish_to_plain_cell_overwrites() {
        let mut store = CellStore::new();
        let b2 = CellKey::new(0, 1, 1);

        store.publish(b2, CellValue::Error(CellError::Circular));
        assert_eq!(store.effective_value(b2), CellValue::Error(CellError::Circular));
    }
}
