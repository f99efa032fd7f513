//! Columnar component storage.
//!
//! A [`Column`] is one component type's values packed back to back in a
//! single byte buffer, one fixed-size slot per row. A [`ColumnSet`] bundles
//! one column per component type of an archetype and owns the shared logical
//! row count: every column always holds exactly `count` live slots, rows
//! `0..count` are dense, and every byte past the live rows is zero.
//!
//! # Safety
//!
//! [`Column`] manages its allocation by hand so that the buffer is aligned for
//! the stored type and typed views are plain casts. The buffer is always
//! fully initialised (allocated zeroed, grown zeroed), which is what makes
//! handing it out as `&[u8]` sound.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use crate::component::{Component, ComponentInfo, ComponentTypeId};

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Rows added to every column of a set each time it runs out of room.
pub const DEFAULT_COLUMN_GROWTH: usize = 100;

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// A zero-initialised, aligned byte buffer viewed as fixed-size slots.
pub struct Column {
    /// Heap allocation, or a dangling pointer while nothing is allocated.
    data: NonNull<u8>,
    /// Slots that fit in the allocation.
    capacity: usize,
    item_size: usize,
    item_align: usize,
}

// The buffer only ever holds `Pod` bytes.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    /// Create an empty column for the type described by `info`.
    pub fn new(info: &ComponentInfo) -> Self {
        Self {
            data: NonNull::dangling(),
            capacity: 0,
            item_size: info.size,
            item_align: info.align,
        }
    }

    /// Size in bytes of one slot.
    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Number of slots the buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn layout_for(&self, capacity: usize) -> Layout {
        Layout::from_size_align(self.item_size * capacity, self.item_align)
            .expect("column layout overflow")
    }

    /// Grow to `new_capacity` slots. New bytes are zero.
    fn grow_to(&mut self, new_capacity: usize) {
        debug_assert!(new_capacity >= self.capacity);
        if self.item_size == 0 {
            self.capacity = new_capacity;
            return;
        }
        let old_bytes = self.item_size * self.capacity;
        let new_layout = self.layout_for(new_capacity);
        let raw = unsafe {
            if self.capacity == 0 {
                alloc::alloc_zeroed(new_layout)
            } else {
                let grown = alloc::realloc(
                    self.data.as_ptr(),
                    self.layout_for(self.capacity),
                    new_layout.size(),
                );
                if !grown.is_null() {
                    grown
                        .add(old_bytes)
                        .write_bytes(0, new_layout.size() - old_bytes);
                }
                grown
            }
        };
        self.data = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(new_layout));
        self.capacity = new_capacity;
    }

    /// The whole buffer, `capacity * item_size` bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.capacity * self.item_size) }
    }

    #[inline]
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.data.as_ptr(), self.capacity * self.item_size)
        }
    }

    /// Bytes of the slot at `index`.
    #[inline]
    pub fn slot(&self, index: usize) -> &[u8] {
        let start = index * self.item_size;
        &self.as_bytes()[start..start + self.item_size]
    }

    /// Mutable bytes of the slot at `index`.
    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.item_size;
        let size = self.item_size;
        &mut self.as_bytes_mut()[start..start + size]
    }

    /// The first `rows` slots as one contiguous span.
    #[inline]
    pub fn rows(&self, rows: usize) -> &[u8] {
        &self.as_bytes()[..rows * self.item_size]
    }

    #[inline]
    fn rows_mut(&mut self, rows: usize) -> &mut [u8] {
        let end = rows * self.item_size;
        &mut self.as_bytes_mut()[..end]
    }

    fn copy_slot(&mut self, from: usize, to: usize) {
        let size = self.item_size;
        self.as_bytes_mut()
            .copy_within(from * size..(from + 1) * size, to * size);
    }

    fn clear_slot(&mut self, index: usize) {
        self.slot_mut(index).fill(0);
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if self.item_size > 0 && self.capacity > 0 {
            unsafe { alloc::dealloc(self.data.as_ptr(), self.layout_for(self.capacity)) }
        }
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("capacity", &self.capacity)
            .field("item_size", &self.item_size)
            .field("item_align", &self.item_align)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Typed views
// ---------------------------------------------------------------------------

// Zero-sized components own no bytes, so their views are built from a
// dangling pointer instead of going through bytemuck.

pub(crate) fn cast_slot<T: Component>(bytes: &[u8]) -> &T {
    if std::mem::size_of::<T>() == 0 {
        return unsafe { &*NonNull::<T>::dangling().as_ptr() };
    }
    bytemuck::from_bytes(bytes)
}

pub(crate) fn cast_slot_mut<T: Component>(bytes: &mut [u8]) -> &mut T {
    if std::mem::size_of::<T>() == 0 {
        return unsafe { &mut *NonNull::<T>::dangling().as_ptr() };
    }
    bytemuck::from_bytes_mut(bytes)
}

pub(crate) fn cast_rows_mut<T: Component>(bytes: &mut [u8], rows: usize) -> &mut [T] {
    // An unallocated column's pointer is not aligned for `T`.
    if rows == 0 {
        return &mut [];
    }
    if std::mem::size_of::<T>() == 0 {
        return unsafe { std::slice::from_raw_parts_mut(NonNull::<T>::dangling().as_ptr(), rows) };
    }
    bytemuck::cast_slice_mut(bytes)
}

// ---------------------------------------------------------------------------
// ColumnSet
// ---------------------------------------------------------------------------

/// One [`Column`] per component type of an archetype, sharing a row count.
///
/// Columns are kept sorted by [`ComponentTypeId`] for binary-search lookup.
#[derive(Debug)]
pub struct ColumnSet {
    columns: Vec<(ComponentTypeId, Column)>,
    count: usize,
    capacity: usize,
    growth: usize,
}

impl ColumnSet {
    /// Create an empty set with one column per entry in `infos`.
    ///
    /// `growth` is the number of rows added per expansion; zero is treated
    /// as one.
    pub fn new(infos: &[ComponentInfo], growth: usize) -> Self {
        let mut columns: Vec<(ComponentTypeId, Column)> =
            infos.iter().map(|info| (info.id, Column::new(info))).collect();
        columns.sort_by_key(|(id, _)| *id);
        Self {
            columns,
            count: 0,
            capacity: 0,
            growth: growth.max(1),
        }
    }

    #[inline]
    fn column_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.columns.binary_search_by_key(&type_id, |(id, _)| *id).ok()
    }

    /// Live rows.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether no rows are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Rows that fit before the next expansion.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Component types held, ascending.
    pub fn type_ids(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.columns.iter().map(|(id, _)| *id)
    }

    /// Whether a column for `type_id` exists.
    #[inline]
    pub fn has_column(&self, type_id: ComponentTypeId) -> bool {
        self.column_index(type_id).is_some()
    }

    /// The column for `type_id`.
    pub fn column(&self, type_id: ComponentTypeId) -> Option<&Column> {
        let idx = self.column_index(type_id)?;
        Some(&self.columns[idx].1)
    }

    fn column_mut(&mut self, type_id: ComponentTypeId) -> Option<&mut Column> {
        let idx = self.column_index(type_id)?;
        Some(&mut self.columns[idx].1)
    }

    /// Append a zeroed row, expanding every column first if the set is full.
    ///
    /// Returns the new row's index.
    pub fn register_new(&mut self) -> usize {
        if self.count == self.capacity {
            let new_capacity = self.capacity + self.growth;
            for (_, column) in &mut self.columns {
                column.grow_to(new_capacity);
            }
            self.capacity = new_capacity;
        }
        self.count += 1;
        self.count - 1
    }

    /// Remove row `index` by moving the last row into it, then zero the
    /// vacated last slot.
    ///
    /// Returns the former index of the row that was moved into `index`, or
    /// `None` when `index` was already the last row.
    pub fn free_position(&mut self, index: usize) -> Option<usize> {
        debug_assert!(index < self.count, "row {index} out of bounds");
        let last = self.count - 1;
        for (_, column) in &mut self.columns {
            if index != last {
                column.copy_slot(last, index);
            }
            column.clear_slot(last);
        }
        self.count -= 1;
        (index != last).then_some(last)
    }

    /// Copy row `from` into row `to` of `other` for every type both sets
    /// hold. Columns present in only one set are left untouched.
    pub fn copy_to(&self, from: usize, other: &mut ColumnSet, to: usize) {
        for (type_id, column) in &self.columns {
            if let Some(dst) = other.column_mut(*type_id) {
                dst.slot_mut(to).copy_from_slice(column.slot(from));
            }
        }
    }

    /// Bytes of `type_id` at `row`.
    pub fn slot(&self, type_id: ComponentTypeId, row: usize) -> Option<&[u8]> {
        if row >= self.count {
            return None;
        }
        Some(self.column(type_id)?.slot(row))
    }

    /// Mutable bytes of `type_id` at `row`.
    pub fn slot_mut(&mut self, type_id: ComponentTypeId, row: usize) -> Option<&mut [u8]> {
        if row >= self.count {
            return None;
        }
        Some(self.column_mut(type_id)?.slot_mut(row))
    }

    /// The live span (`count` slots) of `type_id`.
    pub fn rows(&self, type_id: ComponentTypeId) -> Option<&[u8]> {
        Some(self.column(type_id)?.rows(self.count))
    }

    /// Live spans for several columns at once, in the order requested.
    ///
    /// Entries that are `None`, name a type this set lacks, or repeat an
    /// earlier entry come back as `None`.
    pub fn rows_mut_many(&mut self, wanted: &[Option<ComponentTypeId>]) -> Vec<Option<&mut [u8]>> {
        let mut spans: Vec<Option<&mut [u8]>> = wanted.iter().map(|_| None).collect();
        let count = self.count;
        for (type_id, column) in &mut self.columns {
            if let Some(pos) = wanted.iter().position(|w| *w == Some(*type_id)) {
                spans[pos] = Some(column.rows_mut(count));
            }
        }
        spans
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
