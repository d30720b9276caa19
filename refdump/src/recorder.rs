//! Bounded table of allocation records.

use {
    crate::{TypeDescriptor, TypeKind},
    std::sync::{
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering::{Relaxed, SeqCst}},
    },
    tracing::warn,
};

/// Base address of a record whose allocation was freed.
///
/// No allocation lives at the null address,
/// so a freed record can never match a scanned word.
pub const FREED: usize = 0;

/// Metadata about one tracked allocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AllocationRecord
{
    /// Element type of the allocation.
    pub descriptor: TypeDescriptor,

    /// Address of the first element, or [`FREED`].
    pub base: usize,

    /// Whether the allocation holds multiple elements.
    pub is_array: bool,

    /// Number of elements; 1 unless `is_array`.
    pub count: usize,
}

impl AllocationRecord
{
    /// Number of bytes covered by the allocation.
    pub fn extent(&self) -> usize
    {
        self.descriptor.size().saturating_mul(self.count)
    }

    /// Whether the allocation has not been freed.
    pub fn is_live(&self) -> bool
    {
        self.base != FREED
    }
}

/// Append-mostly table of allocation records.
///
/// Slots are never removed or reordered while the table is in use;
/// freeing an allocation only overwrites the base address of its record.
/// Hence an index into a [snapshot] identifies the same slot
/// for as long as the snapshot is used.
///
/// All slot mutation happens under a single lock,
/// so concurrent appends cannot corrupt the table
/// and a snapshot never observes a half-updated record.
///
/// [snapshot]: `Self::snapshot`
pub struct Recorder
{
    /// The records, with capacity reserved at construction.
    ///
    /// The vector never grows past its initial capacity,
    /// so appending to it never reallocates.
    records: Mutex<Vec<AllocationRecord>>,

    /// Maximum number of records.
    capacity: usize,

    /// Whether recording was enabled with [`set_enabled`][`Self::set_enabled`].
    enabled: AtomicBool,

    /// Number of outstanding [`suspend`][`Self::suspend`] calls.
    ///
    /// Recording is off while this is non-zero, whatever `enabled` says.
    suspensions: AtomicUsize,

    /// Number of allocations not recorded because the table was full.
    dropped: AtomicUsize,

    /// Whether the overflow warning has been logged.
    overflow_reported: AtomicBool,
}

impl Recorder
{
    /// Create an empty, enabled table that holds up to `capacity` records.
    pub fn new(capacity: usize) -> Self
    {
        Self{
            records: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            enabled: AtomicBool::new(true),
            suspensions: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            overflow_reported: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<Vec<AllocationRecord>>
    {
        // Records are plain data; a panic elsewhere cannot break them.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an allocation.
    ///
    /// Returns whether a record was appended.
    /// Nothing is recorded if the table is disabled or full,
    /// or if the allocation is of a scalar or zero-sized type,
    /// or if `base` is null.
    /// When the table is full, a warning is logged the first time.
    pub fn record(
        &self,
        descriptor: TypeDescriptor,
        base:       usize,
        is_array:   bool,
        count:      usize,
    ) -> bool
    {
        if !self.is_enabled() {
            return false;
        }

        if descriptor.kind() == TypeKind::Scalar
            || descriptor.size() == 0
            || base == FREED
        {
            return false;
        }

        let count = if is_array { count } else { 1 };
        let record = AllocationRecord{descriptor, base, is_array, count};

        let mut records = self.lock();
        if records.len() >= self.capacity {
            drop(records);
            self.report_overflow();
            return false;
        }
        records.push(record);
        true
    }

    #[cold]
    fn report_overflow(&self)
    {
        self.dropped.fetch_add(1, Relaxed);
        if !self.overflow_reported.swap(true, SeqCst) {
            warn!(
                capacity = self.capacity,
                "Allocation table is full; further allocations are not tracked"
            );
        }
    }

    /// Mark the live record at `base` as freed.
    ///
    /// Returns whether such a record was found.
    pub fn mark_freed(&self, base: usize) -> bool
    {
        if base == FREED {
            return false;
        }
        let mut records = self.lock();
        match records.iter_mut().find(|r| r.base == base) {
            Some(record) => { record.base = FREED; true },
            None         => false,
        }
    }

    /// Enable or disable recording; returns the previous setting.
    ///
    /// The setting is independent of suspensions:
    /// enabling recording while it is suspended takes effect
    /// once every suspension has been lifted.
    pub fn set_enabled(&self, enabled: bool) -> bool
    {
        self.enabled.swap(enabled, SeqCst)
    }

    /// Whether [`record`][`Self::record`] currently accepts new records,
    /// that is, recording is enabled and not suspended.
    pub fn is_enabled(&self) -> bool
    {
        self.enabled.load(SeqCst) && !self.is_suspended()
    }

    /// Stop recording until a matching [`resume`][`Self::resume`].
    ///
    /// Suspensions are counted, so they may overlap in any order,
    /// for example when dumps run concurrently on different threads.
    pub fn suspend(&self)
    {
        self.suspensions.fetch_add(1, SeqCst);
    }

    /// Lift one suspension made by [`suspend`][`Self::suspend`].
    pub fn resume(&self)
    {
        let previous = self.suspensions.fetch_sub(1, SeqCst);
        debug_assert!(previous > 0, "resume without suspend");
    }

    #[allow(missing_docs)]
    pub fn is_suspended(&self) -> bool
    {
        self.suspensions.load(SeqCst) != 0
    }

    /// Copy of every slot, freed ones included, in insertion order.
    pub fn snapshot(&self) -> Vec<AllocationRecord>
    {
        self.lock().clone()
    }

    /// Number of occupied slots, freed ones included.
    pub fn len(&self) -> usize
    {
        self.lock().len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize
    {
        self.capacity
    }

    /// Number of allocations not recorded because the table was full.
    pub fn dropped(&self) -> usize
    {
        self.dropped.load(Relaxed)
    }

    /// Remove every record and reset the overflow state.
    ///
    /// The reserved storage is kept.
    pub fn clear(&self)
    {
        self.lock().clear();
        self.dropped.store(0, Relaxed);
        self.overflow_reported.store(false, SeqCst);
    }
}
