use chrono::{DateTime, Utc};
use core_types::PriceSeries;
use serde::{Deserialize, Serialize};

/// One price slot in an aligned column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    /// The symbol traded at this timestamp.
    Observed(f64),
    /// Carried forward from the symbol's last observation.
    Filled(f64),
    /// The symbol has no observation at or before this timestamp.
    Missing,
}

impl Cell {
    pub fn price(&self) -> Option<f64> {
        match self {
            Cell::Observed(p) | Cell::Filled(p) => Some(*p),
            Cell::Missing => None,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, Cell::Filled(_))
    }
}

/// The prices of one symbol over the frame's shared index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    symbol: String,
    cells: Vec<Cell>,
}

impl Column {
    pub(crate) fn new(symbol: String, cells: Vec<Cell>) -> Self {
        Self { symbol, cells }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Prices per row, `None` where the cell is missing.
    pub fn prices(&self) -> Vec<Option<f64>> {
        self.cells.iter().map(Cell::price).collect()
    }

    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_filled()).count()
    }
}

/// Several price histories laid over one ascending, duplicate-free index.
///
/// Every column holds exactly one cell per index row. Frames are produced by
/// the [`Aligner`](crate::Aligner) and are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedFrame {
    index: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

impl AlignedFrame {
    pub(crate) fn new(index: Vec<DateTime<Utc>>, columns: Vec<Column>) -> Self {
        debug_assert!(columns.iter().all(|c| c.cells.len() == index.len()));
        Self { index, columns }
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.column(symbol).is_some()
    }

    pub fn column(&self, symbol: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.symbol == symbol)
    }

    /// Converts each column back into a price series holding every defined
    /// cell. Forward-filled prices become ordinary observations.
    pub fn to_series(&self) -> Vec<PriceSeries> {
        self.columns
            .iter()
            .map(|column| {
                PriceSeries::from_pairs(
                    column.symbol.clone(),
                    self.index
                        .iter()
                        .zip(&column.cells)
                        .filter_map(|(ts, cell)| cell.price().map(|p| (*ts, p))),
                )
            })
            .collect()
    }
}
