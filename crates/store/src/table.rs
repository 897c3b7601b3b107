//! In-memory table that mirrors sink calls; the headless stand-in for a
//! table widget.

#![forbid(unsafe_code)]

use dockview_core::EntityId;
use tracing::warn;

use crate::{Keyed, RowSink};

#[derive(Debug, Clone)]
pub struct RowTable<R> {
    rows: Vec<R>,
    inserts: u64,
    updates: u64,
    removes: u64,
}

impl<R> Default for RowTable<R> {
    fn default() -> Self { Self { rows: Vec::new(), inserts: 0, updates: 0, removes: 0 } }
}

impl<R: Keyed + Clone> RowTable<R> {
    pub fn new() -> Self { Self::default() }

    pub fn rows(&self) -> &[R] { &self.rows }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
    pub fn inserts(&self) -> u64 { self.inserts }
    pub fn updates(&self) -> u64 { self.updates }
    pub fn removes(&self) -> u64 { self.removes }

    pub fn ids(&self) -> Vec<&str> { self.rows.iter().map(|r| r.id().as_str()).collect() }
}

impl<R: Keyed + Clone> RowSink<R> for RowTable<R> {
    fn insert(&mut self, index: usize, row: &R) {
        let index = index.min(self.rows.len());
        self.rows.insert(index, row.clone());
        self.inserts += 1;
    }

    fn update(&mut self, index: usize, row: &R) {
        match self.rows.get_mut(index) {
            Some(slot) if slot.id() == row.id() => *slot = row.clone(),
            _ => warn!(id = %row.id(), index, "table: update for unknown row"),
        }
        self.updates += 1;
    }

    fn remove(&mut self, index: usize, id: &EntityId) {
        if self.rows.get(index).map(|r| r.id() == id).unwrap_or(false) {
            self.rows.remove(index);
        } else {
            warn!(id = %id, index, "table: remove for unknown row");
        }
        self.removes += 1;
    }
}
