//! Dockview store: reconciles container/image change events into keyed,
//! sorted row state and mirrors every mutation into a [`RowSink`].

#![forbid(unsafe_code)]

use std::cmp::Ordering;

use dockview_core::EntityId;
use metrics::counter;
use rustc_hash::FxHashMap;
use tracing::debug;

pub mod rows;
pub mod table;

pub use rows::{ContainerFilter, ContainerProjection, ContainerRow, ImageProjection, ImageRow};
pub use table::RowTable;

/// Row view-model keyed by entity id.
pub trait Keyed {
    fn id(&self) -> &EntityId;
}

/// Maps a payload to its row and defines the collection's sort order.
pub trait Projection {
    type Payload;
    type Row: Keyed + Clone + PartialEq;

    /// `None` means the entity should not be shown, same as a removal.
    fn project(&self, id: &EntityId, payload: &Self::Payload) -> Option<Self::Row>;

    fn compare(&self, a: &Self::Row, b: &Self::Row) -> Ordering;

    /// Replace the sort order with a caller-supplied comparator.
    fn ordered_by<F>(self, cmp: F) -> OrderedBy<Self, F>
    where
        Self: Sized,
        F: Fn(&Self::Row, &Self::Row) -> Ordering,
    {
        OrderedBy { inner: self, cmp }
    }
}

pub struct OrderedBy<P, F> {
    inner: P,
    cmp: F,
}

impl<P, F> Projection for OrderedBy<P, F>
where
    P: Projection,
    F: Fn(&P::Row, &P::Row) -> Ordering,
{
    type Payload = P::Payload;
    type Row = P::Row;

    fn project(&self, id: &EntityId, payload: &Self::Payload) -> Option<Self::Row> {
        self.inner.project(id, payload)
    }

    fn compare(&self, a: &Self::Row, b: &Self::Row) -> Ordering { (self.cmp)(a, b) }
}

/// Outward table interface: what a table widget needs to follow the
/// reconciler. Indices refer to the sorted row order at the time of the call.
pub trait RowSink<R> {
    fn insert(&mut self, index: usize, row: &R);
    fn update(&mut self, index: usize, row: &R);
    fn remove(&mut self, index: usize, id: &EntityId);
}

/// What a single `apply` did to the row set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Inserted { index: usize },
    Updated { index: usize },
    /// Sort key changed; the row was re-spliced.
    Moved { from: usize, to: usize },
    Removed { index: usize },
    /// Same row as before; the sink was not touched.
    Unchanged { index: usize },
    /// Removal (or hidden payload) for an id without a row.
    Ignored,
}

impl Change {
    pub fn as_str(&self) -> &'static str {
        match self {
            Change::Inserted { .. } => "inserted",
            Change::Updated { .. } => "updated",
            Change::Moved { .. } => "moved",
            Change::Removed { .. } => "removed",
            Change::Unchanged { .. } => "unchanged",
            Change::Ignored => "ignored",
        }
    }
}

/// Keyed row collection for one entity kind.
///
/// `order` holds ids in sort order; `rows` is the id -> row map. A row exists
/// for an id iff the id is in both.
pub struct Reconciler<P: Projection> {
    label: &'static str,
    projection: P,
    order: Vec<EntityId>,
    rows: FxHashMap<EntityId, P::Row>,
}

impl<P: Projection> Reconciler<P> {
    pub fn new(label: &'static str, projection: P) -> Self {
        Self { label, projection, order: Vec::new(), rows: FxHashMap::default() }
    }

    pub fn label(&self) -> &'static str { self.label }
    pub fn len(&self) -> usize { self.order.len() }
    pub fn is_empty(&self) -> bool { self.order.is_empty() }
    pub fn contains(&self, id: &str) -> bool { self.rows.contains_key(id) }
    pub fn get(&self, id: &str) -> Option<&P::Row> { self.rows.get(id) }

    /// Rows in sort order.
    pub fn rows(&self) -> impl Iterator<Item = &P::Row> + '_ {
        self.order.iter().filter_map(move |id| self.rows.get(id))
    }

    /// Handle one change notification; mutates at most the row for `id`.
    pub fn apply(
        &mut self,
        id: &EntityId,
        payload: Option<&P::Payload>,
        sink: &mut dyn RowSink<P::Row>,
    ) -> Change {
        let next = payload.and_then(|p| self.projection.project(id, p));
        let change = match next {
            None => self.remove(id, sink),
            Some(row) => {
                if self.rows.contains_key(id.as_str()) {
                    self.replace(id, row, sink)
                } else {
                    self.insert(id, row, sink)
                }
            }
        };
        counter!("reconcile_changes_total", 1, "collection" => self.label, "change" => change.as_str());
        debug!(collection = self.label, id = %id, change = change.as_str(), rows = self.order.len(), "reconcile: applied");
        change
    }

    /// Feed a full snapshot through [`apply`](Self::apply), so rows that
    /// existed at startup take the same path as rows that arrive later.
    pub fn seed<'a, I>(&mut self, snapshot: I, sink: &mut dyn RowSink<P::Row>) -> usize
    where
        I: IntoIterator<Item = (&'a EntityId, &'a P::Payload)>,
        P::Payload: 'a,
    {
        let mut seen = 0usize;
        for (id, payload) in snapshot {
            self.apply(id, Some(payload), sink);
            seen += 1;
        }
        debug!(collection = self.label, seen, rows = self.order.len(), "reconcile: seeded");
        seen
    }

    fn ordering(&self, a: &P::Row, b: &P::Row) -> Ordering {
        self.projection.compare(a, b).then_with(|| a.id().cmp(b.id()))
    }

    /// Binary search for `row` among the ordered rows; `Err` is the insertion point.
    fn search(&self, row: &P::Row) -> Result<usize, usize> {
        self.order.binary_search_by(|probe| match self.rows.get(probe.as_str()) {
            Some(r) if r.id() == row.id() => Ordering::Equal,
            Some(r) => self.ordering(r, row),
            None => Ordering::Less,
        })
    }

    fn index_of(&self, id: &EntityId) -> Option<usize> {
        let current = self.rows.get(id.as_str())?;
        match self.search(current) {
            Ok(i) => Some(i),
            // Only reachable if the comparator is inconsistent.
            Err(_) => self.order.iter().position(|x| x == id),
        }
    }

    fn insert(&mut self, id: &EntityId, row: P::Row, sink: &mut dyn RowSink<P::Row>) -> Change {
        let index = match self.search(&row) {
            Ok(i) | Err(i) => i,
        };
        self.order.insert(index, id.clone());
        sink.insert(index, &row);
        self.rows.insert(id.clone(), row);
        Change::Inserted { index }
    }

    fn remove(&mut self, id: &EntityId, sink: &mut dyn RowSink<P::Row>) -> Change {
        let Some(index) = self.index_of(id) else { return Change::Ignored; };
        self.order.remove(index);
        self.rows.remove(id.as_str());
        sink.remove(index, id);
        Change::Removed { index }
    }

    fn replace(&mut self, id: &EntityId, row: P::Row, sink: &mut dyn RowSink<P::Row>) -> Change {
        let Some(from) = self.index_of(id) else { return self.insert(id, row, sink); };
        if self.rows.get(id.as_str()) == Some(&row) {
            return Change::Unchanged { index: from };
        }
        let before_ok = from == 0
            || self
                .rows
                .get(self.order[from - 1].as_str())
                .map(|prev| self.ordering(prev, &row) == Ordering::Less)
                .unwrap_or(true);
        let after_ok = from + 1 >= self.order.len()
            || self
                .rows
                .get(self.order[from + 1].as_str())
                .map(|next| self.ordering(&row, next) == Ordering::Less)
                .unwrap_or(true);
        if before_ok && after_ok {
            sink.update(from, &row);
            self.rows.insert(id.clone(), row);
            return Change::Updated { index: from };
        }
        self.order.remove(from);
        self.rows.remove(id.as_str());
        sink.remove(from, id);
        let to = match self.insert(id, row, sink) {
            Change::Inserted { index } => index,
            _ => from,
        };
        Change::Moved { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row { id: EntityId, key: i32 }

    impl Keyed for Row {
        fn id(&self) -> &EntityId { &self.id }
    }

    struct ByKey;

    impl Projection for ByKey {
        type Payload = i32;
        type Row = Row;

        fn project(&self, id: &EntityId, payload: &i32) -> Option<Row> {
            // Negative keys stand in for "hidden" payloads.
            (*payload >= 0).then(|| Row { id: id.clone(), key: *payload })
        }

        fn compare(&self, a: &Row, b: &Row) -> Ordering { a.key.cmp(&b.key) }
    }

    fn keys(r: &Reconciler<ByKey>) -> Vec<i32> { r.rows().map(|x| x.key).collect() }

    #[test]
    fn inserts_land_in_sorted_position() {
        let mut r = Reconciler::new("test", ByKey);
        let mut t: RowTable<Row> = RowTable::new();
        for (id, k) in [("a", 5), ("b", 1), ("c", 3), ("d", 9), ("e", 3)] {
            r.apply(&id.into(), Some(&k), &mut t);
        }
        assert_eq!(keys(&r), vec![1, 3, 3, 5, 9]);
        // equal keys order by id
        let ids: Vec<&str> = r.rows().map(|x| x.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "e", "a", "d"]);
        assert_eq!(t.rows(), r.rows().cloned().collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn update_in_place_when_order_holds() {
        let mut r = Reconciler::new("test", ByKey);
        let mut t: RowTable<Row> = RowTable::new();
        r.apply(&"a".into(), Some(&1), &mut t);
        r.apply(&"b".into(), Some(&5), &mut t);
        r.apply(&"c".into(), Some(&9), &mut t);
        assert_eq!(r.apply(&"b".into(), Some(&6), &mut t), Change::Updated { index: 1 });
        assert_eq!(r.apply(&"b".into(), Some(&6), &mut t), Change::Unchanged { index: 1 });
        assert_eq!(t.updates(), 1);
    }

    #[test]
    fn sort_key_change_resplices_only_that_row() {
        let mut r = Reconciler::new("test", ByKey);
        let mut t: RowTable<Row> = RowTable::new();
        r.apply(&"a".into(), Some(&1), &mut t);
        r.apply(&"b".into(), Some(&5), &mut t);
        r.apply(&"c".into(), Some(&9), &mut t);
        assert_eq!(r.apply(&"a".into(), Some(&10), &mut t), Change::Moved { from: 0, to: 2 });
        assert_eq!(keys(&r), vec![5, 9, 10]);
        assert_eq!(t.rows(), r.rows().cloned().collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn hidden_payload_removes_and_missing_is_ignored() {
        let mut r = Reconciler::new("test", ByKey);
        let mut t: RowTable<Row> = RowTable::new();
        assert_eq!(r.apply(&"a".into(), None, &mut t), Change::Ignored);
        assert_eq!(r.apply(&"a".into(), Some(&-1), &mut t), Change::Ignored);
        r.apply(&"a".into(), Some(&2), &mut t);
        assert_eq!(r.apply(&"a".into(), Some(&-1), &mut t), Change::Removed { index: 0 });
        assert!(r.is_empty());
        assert!(t.rows().is_empty());
    }

    #[test]
    fn caller_supplied_order_wins() {
        let mut r = Reconciler::new("test", ByKey.ordered_by(|a: &Row, b: &Row| b.key.cmp(&a.key)));
        let mut t: RowTable<Row> = RowTable::new();
        for (id, k) in [("a", 5), ("b", 1), ("c", 3)] {
            r.apply(&id.into(), Some(&k), &mut t);
        }
        let got: Vec<i32> = r.rows().map(|x| x.key).collect();
        assert_eq!(got, vec![5, 3, 1]);
    }

    #[test]
    fn seed_counts_entries_and_sorts() {
        let mut r = Reconciler::new("test", ByKey);
        let mut t: RowTable<Row> = RowTable::new();
        let snapshot: Vec<(EntityId, i32)> = vec![("a".into(), 2), ("b".into(), 1)];
        assert_eq!(r.seed(snapshot.iter().map(|(id, p)| (id, p)), &mut t), 2);
        assert_eq!(t.ids(), vec!["b", "a"]);
    }
}
