// src/store/memory.rs
// In-process table used for tests and dry runs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::TabularStore;
use crate::error::StoreError;
use crate::models::{CellValue, Column, TableRow};

/// Table kept in memory. Cells are stored in their written text form and
/// re-parsed on read, like a spreadsheet would.
#[derive(Default)]
pub struct MemoryTable {
    rows: Mutex<Vec<Vec<(Column, String)>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, Vec<Vec<(Column, String)>>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a row exactly as given, bypassing the content store.
    pub fn push_raw_row(&self, cells: Vec<(Column, &str)>) {
        self.rows()
            .push(cells.into_iter().map(|(c, v)| (c, v.to_string())).collect());
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Successful append and update calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    /// Written text of one cell.
    pub fn cell(&self, position: usize, column: Column) -> Option<String> {
        self.rows()
            .get(position)?
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v.clone())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory table rejects writes".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TabularStore for MemoryTable {
    async fn read_rows(&self) -> Result<Vec<TableRow>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory table rejects reads".to_string()));
        }
        Ok(self
            .rows()
            .iter()
            .enumerate()
            .map(|(position, cells)| TableRow {
                position,
                cells: cells
                    .iter()
                    .map(|(column, text)| (*column, CellValue::parse(text)))
                    .collect(),
            })
            .collect())
    }

    async fn append_rows(&self, rows: Vec<Vec<(Column, CellValue)>>) -> Result<(), StoreError> {
        self.check_writes()?;
        let mut table = self.rows();
        for row in rows {
            table.push(
                row.into_iter()
                    .map(|(column, value)| (column, value.to_cell_string()))
                    .collect(),
            );
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_rows(
        &self,
        updates: Vec<(usize, Vec<(Column, CellValue)>)>,
    ) -> Result<(), StoreError> {
        self.check_writes()?;
        let mut table = self.rows();
        if let Some((position, _)) = updates.iter().find(|(p, _)| *p >= table.len()) {
            return Err(StoreError::Unavailable(format!("no row at position {}", position)));
        }
        for (position, cells) in updates {
            let row = &mut table[position];
            for (column, value) in cells {
                let text = value.to_cell_string();
                match row.iter_mut().find(|(c, _)| *c == column) {
                    Some(cell) => cell.1 = text,
                    None => row.push((column, text)),
                }
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
