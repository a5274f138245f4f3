//! Raw shared storage for one component field.
//!
//! A [`Column`] is a fixed-size, type-erased array of plain scalar cells:
//! `rows × arity` cells of one [`ScalarKind`], where a row is an entity
//! slot and `arity` is the field's lane count (1 for scalars, the tuple /
//! buffer length otherwise). Reading field `F` of entity `E` is a direct
//! index into this array - the struct-of-arrays layout the whole runtime
//! depends on.
//!
//! # Sharing model
//!
//! Columns are shared with worker threads behind `Arc` and accessed
//! without any per-field lock. Cells are plain scalars (not atomics):
//! concurrent writes to *disjoint* cells are data-race-free by
//! construction, and concurrent writes to the *same* cell from two threads
//! in the same tick are a program error the runtime neither detects nor
//! arbitrates. Cross-thread visibility of cell writes is established by
//! the event-slot counter's release/acquire discipline, not by the cells
//! themselves.
//!
//! # Safety contract
//!
//! This module is intentionally unsafe inside and keeps its callers safe
//! by construction:
//!
//! 1. **Bounds**: every accessor asserts `cell < rows × arity`.
//! 2. **Typing**: accessors debug-assert the column's scalar kind; the
//!    store layer only calls the accessor matching the field's declared
//!    kind.
//! 3. **Alignment**: the backing buffer is a `u64` word array, so a cell
//!    at byte offset `cell × size` is always aligned for its scalar type.
//! 4. **Aliasing**: cells live in `UnsafeCell`s and are only touched
//!    through raw pointers; no `&`/`&mut` references to cell memory ever
//!    escape.

use std::cell::UnsafeCell;

use crate::component::ScalarKind;

/// A fixed-size shared array of `rows × arity` scalar cells.
pub struct Column {
    scalar: ScalarKind,
    arity: usize,
    rows: usize,
    cells: usize,
    words: Box<[UnsafeCell<u64>]>,
}

// SAFETY: Cells are only accessed through raw pointers with the bounds and
// typing checks above. Concurrent access to disjoint cells is race-free;
// same-cell races are excluded by the runtime's documented write
// discipline (one writer per entity field per tick).
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    /// Allocate a zeroed column of `rows × arity` cells.
    pub fn new(scalar: ScalarKind, arity: usize, rows: usize) -> Self {
        let cells = rows * arity;
        let bytes = cells * scalar.size();
        let words = (bytes + 7) / 8;
        Self {
            scalar,
            arity,
            rows,
            cells,
            words: (0..words.max(1)).map(|_| UnsafeCell::new(0)).collect(),
        }
    }

    /// The scalar type of each cell.
    #[inline]
    pub fn scalar(&self) -> ScalarKind {
        self.scalar
    }

    /// Lanes per row.
    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Number of rows (entity slots).
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The cell index of `lane` in `row`.
    #[inline]
    pub(crate) fn cell(&self, row: usize, lane: usize) -> usize {
        debug_assert!(row < self.rows && lane < self.arity);
        row * self.arity + lane
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.words.as_ptr() as *mut u8
    }

    /// Load a cell of any integer scalar kind, sign-extended to `i64`.
    pub(crate) fn load_int(&self, cell: usize) -> i64 {
        assert!(cell < self.cells, "column cell {} out of bounds", cell);
        // SAFETY: bounds checked above; the base buffer is 8-byte aligned
        // so a typed pointer offset by `cell` is aligned for its type.
        unsafe {
            match self.scalar {
                ScalarKind::I8 => *(self.base() as *const i8).add(cell) as i64,
                ScalarKind::I16 => *(self.base() as *const i16).add(cell) as i64,
                ScalarKind::I32 => *(self.base() as *const i32).add(cell) as i64,
                ScalarKind::U8 => *(self.base() as *const u8).add(cell) as i64,
                ScalarKind::U16 => *(self.base() as *const u16).add(cell) as i64,
                ScalarKind::U32 => *(self.base() as *const u32).add(cell) as i64,
                ScalarKind::F32 | ScalarKind::F64 => {
                    debug_assert!(false, "load_int on a float column");
                    0
                }
            }
        }
    }

    /// Store an integer cell, truncating to the column's declared width.
    pub(crate) fn store_int(&self, cell: usize, value: i64) {
        assert!(cell < self.cells, "column cell {} out of bounds", cell);
        // SAFETY: see `load_int`; same-cell write races are excluded by
        // the runtime's write discipline.
        unsafe {
            match self.scalar {
                ScalarKind::I8 => *(self.base() as *mut i8).add(cell) = value as i8,
                ScalarKind::I16 => *(self.base() as *mut i16).add(cell) = value as i16,
                ScalarKind::I32 => *(self.base() as *mut i32).add(cell) = value as i32,
                ScalarKind::U8 => *(self.base() as *mut u8).add(cell) = value as u8,
                ScalarKind::U16 => *(self.base() as *mut u16).add(cell) = value as u16,
                ScalarKind::U32 => *(self.base() as *mut u32).add(cell) = value as u32,
                ScalarKind::F32 | ScalarKind::F64 => {
                    debug_assert!(false, "store_int on a float column");
                }
            }
        }
    }

    /// Load any cell widened to `f64`. Every scalar kind in the closed set
    /// round-trips exactly through `f64`.
    pub(crate) fn load_num(&self, cell: usize) -> f64 {
        assert!(cell < self.cells, "column cell {} out of bounds", cell);
        // SAFETY: see `load_int`.
        unsafe {
            match self.scalar {
                ScalarKind::I8 => *(self.base() as *const i8).add(cell) as f64,
                ScalarKind::I16 => *(self.base() as *const i16).add(cell) as f64,
                ScalarKind::I32 => *(self.base() as *const i32).add(cell) as f64,
                ScalarKind::U8 => *(self.base() as *const u8).add(cell) as f64,
                ScalarKind::U16 => *(self.base() as *const u16).add(cell) as f64,
                ScalarKind::U32 => *(self.base() as *const u32).add(cell) as f64,
                ScalarKind::F32 => *(self.base() as *const f32).add(cell) as f64,
                ScalarKind::F64 => *(self.base() as *const f64).add(cell),
            }
        }
    }

    /// Store a cell from an `f64`, narrowing to the column's declared
    /// width.
    pub(crate) fn store_num(&self, cell: usize, value: f64) {
        assert!(cell < self.cells, "column cell {} out of bounds", cell);
        // SAFETY: see `store_int`.
        unsafe {
            match self.scalar {
                ScalarKind::I8 => *(self.base() as *mut i8).add(cell) = value as i8,
                ScalarKind::I16 => *(self.base() as *mut i16).add(cell) = value as i16,
                ScalarKind::I32 => *(self.base() as *mut i32).add(cell) = value as i32,
                ScalarKind::U8 => *(self.base() as *mut u8).add(cell) = value as u8,
                ScalarKind::U16 => *(self.base() as *mut u16).add(cell) = value as u16,
                ScalarKind::U32 => *(self.base() as *mut u32).add(cell) = value as u32,
                ScalarKind::F32 => *(self.base() as *mut f32).add(cell) = value as f32,
                ScalarKind::F64 => *(self.base() as *mut f64).add(cell) = value,
            }
        }
    }

    /// Load a `u8` cell. The column must be byte-typed.
    pub(crate) fn load_u8(&self, cell: usize) -> u8 {
        debug_assert_eq!(self.scalar, ScalarKind::U8);
        assert!(cell < self.cells, "column cell {} out of bounds", cell);
        // SAFETY: see `load_int`.
        unsafe { *self.base().add(cell) }
    }

    /// Store a `u8` cell. The column must be byte-typed.
    pub(crate) fn store_u8(&self, cell: usize, value: u8) {
        debug_assert_eq!(self.scalar, ScalarKind::U8);
        assert!(cell < self.cells, "column cell {} out of bounds", cell);
        // SAFETY: see `store_int`.
        unsafe { *self.base().add(cell) = value }
    }

    /// Load a `u32` cell (entity references and enum tags).
    pub(crate) fn load_u32(&self, cell: usize) -> u32 {
        debug_assert_eq!(self.scalar, ScalarKind::U32);
        assert!(cell < self.cells, "column cell {} out of bounds", cell);
        // SAFETY: see `load_int`.
        unsafe { *(self.base() as *const u32).add(cell) }
    }

    /// Store a `u32` cell (entity references and enum tags).
    pub(crate) fn store_u32(&self, cell: usize, value: u32) {
        debug_assert_eq!(self.scalar, ScalarKind::U32);
        assert!(cell < self.cells, "column cell {} out of bounds", cell);
        // SAFETY: see `store_int`.
        unsafe { *(self.base() as *mut u32).add(cell) = value }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn int_cells_round_trip_with_truncation() {
        let column = Column::new(ScalarKind::I16, 1, 4);

        column.store_int(2, -1234);
        assert_eq!(column.load_int(2), -1234);

        // Values wider than the cell truncate to the declared width.
        column.store_int(3, 0x1_2345);
        assert_eq!(column.load_int(3), 0x2345);
    }

    #[test]
    fn float_cells_round_trip() {
        let column = Column::new(ScalarKind::F32, 2, 4);

        column.store_num(column.cell(1, 0), 1.5);
        column.store_num(column.cell(1, 1), -2.25);

        assert_eq!(column.load_num(column.cell(1, 0)), 1.5);
        assert_eq!(column.load_num(column.cell(1, 1)), -2.25);
    }

    #[test]
    fn f64_cells_preserve_precision() {
        let column = Column::new(ScalarKind::F64, 1, 2);

        column.store_num(1, std::f64::consts::PI);
        assert_eq!(column.load_num(1), std::f64::consts::PI);
    }

    #[test]
    fn fresh_columns_are_zeroed() {
        let column = Column::new(ScalarKind::U32, 1, 8);
        for cell in 0..8 {
            assert_eq!(column.load_u32(cell), 0);
        }
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_access_panics() {
        let column = Column::new(ScalarKind::U8, 1, 4);
        column.load_u8(4);
    }

    #[test]
    fn disjoint_rows_are_writable_concurrently() {
        // Two threads write disjoint rows of a shared column.
        let column = Arc::new(Column::new(ScalarKind::U32, 1, 64));

        let a = Arc::clone(&column);
        let b = Arc::clone(&column);
        let ta = thread::spawn(move || {
            for row in 0..32 {
                a.store_u32(row, row as u32 + 1);
            }
        });
        let tb = thread::spawn(move || {
            for row in 32..64 {
                b.store_u32(row, row as u32 + 1);
            }
        });
        ta.join().unwrap();
        tb.join().unwrap();

        for row in 0..64 {
            assert_eq!(column.load_u32(row), row as u32 + 1);
        }
    }
}
