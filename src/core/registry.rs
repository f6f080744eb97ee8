/// Shared lookup-table storage.
///
/// The scorer and the codec that trained a table are usually distinct
/// objects (and may be reloaded instances), so tables live in an arena
/// owned by the caller rather than inside any codec. A codec holds an
/// opaque `LutHandle` into the arena; the caller passes the same arena
/// to both the training/encoding side and the scoring side.

pub const CENTERS: usize = 256;
pub const LUT_CELLS: usize = CENTERS * CENTERS;

/// Opaque, stable slot identifier returned by `LutArena::register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LutHandle(u32);

impl LutHandle {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One 256x256 f32 table per subspace, flattened.
/// `at(s, i, j)` reads the distance (or log-likelihood ratio) between
/// center i and center j of subspace s.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceTable {
    subspaces: usize,
    data: Vec<f32>,
}

impl DistanceTable {
    pub fn new(subspaces: usize) -> Self {
        Self {
            subspaces,
            data: vec![0.0; subspaces * LUT_CELLS],
        }
    }

    pub fn from_raw(subspaces: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), subspaces * LUT_CELLS);
        Self { subspaces, data }
    }

    pub fn subspace_count(&self) -> usize {
        self.subspaces
    }

    #[inline(always)]
    pub fn at(&self, s: usize, i: usize, j: usize) -> f32 {
        self.data[s * LUT_CELLS + i * CENTERS + j]
    }

    pub fn row(&self, s: usize) -> &[f32] {
        &self.data[s * LUT_CELLS..(s + 1) * LUT_CELLS]
    }

    pub fn row_mut(&mut self, s: usize) -> &mut [f32] {
        &mut self.data[s * LUT_CELLS..(s + 1) * LUT_CELLS]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Arena of table slots. Slots are registered per codec instance and
/// filled once training (or model load) completes. Handles stay valid
/// until `clear()`.
#[derive(Debug, Default)]
pub struct LutArena {
    slots: Vec<Option<DistanceTable>>,
}

impl LutArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty slot and return its handle.
    pub fn register(&mut self) -> LutHandle {
        let handle = LutHandle(self.slots.len() as u32);
        self.slots.push(None);
        handle
    }

    /// Install a trained table into its slot.
    pub fn install(&mut self, handle: LutHandle, table: DistanceTable) {
        self.slots[handle.index()] = Some(table);
    }

    /// Table for `handle`, or `None` if the slot was never filled or the
    /// arena has been cleared since.
    pub fn table(&self, handle: LutHandle) -> Option<&DistanceTable> {
        self.slots.get(handle.index()).and_then(|s| s.as_ref())
    }

    /// Release all slots. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_install_get() {
        let mut arena = LutArena::new();
        let h0 = arena.register();
        let h1 = arena.register();
        assert_ne!(h0, h1);
        assert!(arena.table(h0).is_none());

        let mut table = DistanceTable::new(2);
        table.row_mut(1)[3 * CENTERS + 7] = 4.5;
        arena.install(h1, table);

        assert!(arena.table(h0).is_none());
        let got = arena.table(h1).unwrap();
        assert_eq!(got.subspace_count(), 2);
        assert_eq!(got.at(1, 3, 7), 4.5);
        assert_eq!(got.at(0, 0, 0), 0.0);
    }

    #[test]
    fn clear_invalidates_handles() {
        let mut arena = LutArena::new();
        let h = arena.register();
        arena.install(h, DistanceTable::new(1));
        assert!(arena.table(h).is_some());

        arena.clear();
        assert!(arena.table(h).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn table_layout_is_row_major() {
        let mut table = DistanceTable::new(3);
        for s in 0..3 {
            let row = table.row_mut(s);
            row[0] = s as f32;
        }
        assert_eq!(table.at(2, 0, 0), 2.0);
        assert_eq!(table.as_slice().len(), 3 * LUT_CELLS);
        assert_eq!(table.row(1).len(), LUT_CELLS);
    }
}
