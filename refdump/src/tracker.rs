//! The process-wide tracking service.

use {
    crate::{
        DumpError,
        LoadedSegments,
        Naming,
        Options,
        ProcessMemory,
        Recorder,
        Resolution,
        Resolver,
        RootRegions,
        RustNaming,
        TypeDescriptor,
        export::export,
    },
    std::{path::Path, sync::OnceLock, time::Instant},
    tracing::{info, warn},
};

static TRACKER: OnceLock<Tracker> = OnceLock::new();

/// Owns the allocation table and everything needed to dump it.
///
/// Allocation interceptors report to the tracker
/// through [`on_allocate`][`Self::on_allocate`],
/// [`on_free`][`Self::on_free`],
/// and [`on_reallocate`][`Self::on_reallocate`].
/// Usually there is one tracker per process, created by [`init_tracking`].
pub struct Tracker
{
    options: Options,
    recorder: Recorder,
    naming: Box<dyn Naming + Send + Sync>,
    roots: Box<dyn RootRegions + Send + Sync>,
}

impl Tracker
{
    /// Create a tracker that names types by their Rust names
    /// and finds static memory among the loaded objects.
    pub fn new(options: Options) -> Self
    {
        Self::with_collaborators(options, RustNaming::qualified(), LoadedSegments)
    }

    /// Create a tracker with custom naming and static memory.
    pub fn with_collaborators<N, R>(options: Options, naming: N, roots: R) -> Self
        where N: 'static + Naming + Send + Sync
            , R: 'static + RootRegions + Send + Sync
    {
        let recorder = Recorder::new(options.max_tracked_allocations);
        Self{options, recorder, naming: Box::new(naming), roots: Box::new(roots)}
    }

    #[allow(missing_docs)]
    pub fn options(&self) -> &Options
    {
        &self.options
    }

    /// The allocation table.
    pub fn recorder(&self) -> &Recorder
    {
        &self.recorder
    }

    /// Report an allocation of the given type at `base`.
    ///
    /// `count` is the number of elements of an array allocation;
    /// it is ignored unless `is_array` is set.
    /// Returns whether the allocation is now tracked.
    ///
    /// # Safety
    ///
    /// While the allocation is tracked, all of its bytes must be readable.
    /// An allocation stays tracked until it is reported freed,
    /// or forever if [`Options::trace_frees`] is disabled.
    pub unsafe fn on_allocate(
        &self,
        descriptor: TypeDescriptor,
        base:       usize,
        is_array:   bool,
        count:      usize,
    ) -> bool
    {
        self.recorder.record(descriptor, base, is_array, count)
    }

    /// Report that the allocation at `base` was freed.
    ///
    /// Returns whether a tracked allocation was forgotten.
    /// Does nothing if [`Options::trace_frees`] is disabled.
    pub fn on_free(&self, base: usize) -> bool
    {
        self.options.trace_frees && self.recorder.mark_freed(base)
    }

    /// Report that the allocation at `old_base` moved to `new_base`,
    /// for instance because a growable buffer was grown.
    ///
    /// Returns whether the new allocation is now tracked.
    ///
    /// # Safety
    ///
    /// See [`on_allocate`][`Self::on_allocate`].
    pub unsafe fn on_reallocate(
        &self,
        descriptor: TypeDescriptor,
        old_base:   usize,
        new_base:   usize,
        count:      usize,
    ) -> bool
    {
        self.on_free(old_base);
        // SAFETY: Forwarded to caller.
        unsafe { self.on_allocate(descriptor, new_base, true, count) }
    }

    /// Enable or disable tracking; returns the previous setting.
    ///
    /// While a [suspension][`Self::suspend`] is in effect,
    /// enabling takes effect only once it has been lifted.
    pub fn set_enabled(&self, enabled: bool) -> bool
    {
        self.recorder.set_enabled(enabled)
    }

    /// Whether allocations are currently tracked,
    /// that is, tracking is enabled and not suspended.
    pub fn is_enabled(&self) -> bool
    {
        self.recorder.is_enabled()
    }

    /// Stop tracking until the returned guard is dropped.
    ///
    /// Suspensions are counted rather than saving and restoring the setting,
    /// so they may be nested, and may overlap across threads
    /// and be lifted in any order.
    pub fn suspend(&self) -> Suspended<'_>
    {
        self.recorder.suspend();
        Suspended{recorder: &self.recorder}
    }

    /// Find the chains of references that lead to the allocation at `target`.
    ///
    /// Tracking is suspended for the duration of the call,
    /// so allocations made while resolving are not recorded.
    pub fn resolve(&self, target: usize) -> Resolution
    {
        let _suspended = self.suspend();

        let snapshot = self.recorder.snapshot();

        // SAFETY: Tracked allocations are readable per on_allocate,
        // and root regions are readable per RootRegions.
        let memory = unsafe { ProcessMemory::new() };

        let resolver = Resolver::new(
            &snapshot,
            &self.options,
            &memory,
            &*self.naming,
            &*self.roots,
        );
        resolver.resolve(target)
    }

    /// Resolve the references to `target` and write the graph to `path`.
    ///
    /// The format is chosen by [`OutputFormat::for_path`];
    /// image formats are rendered with [`Options::renderer`].
    ///
    /// [`OutputFormat::for_path`]: `crate::OutputFormat::for_path`
    pub fn dump_reference_graph(&self, target: usize, path: impl AsRef<Path>)
        -> Result<Resolution, DumpError>
    {
        let path = path.as_ref();
        let _suspended = self.suspend();
        let started = Instant::now();

        let resolution = self.resolve(target);
        export(&resolution.graph, path, &self.options.renderer)?;

        info!(
            target_address = format_args!("{target:#x}"),
            path = %path.display(),
            visited = resolution.visited,
            edges = resolution.graph.edge_count(),
            elapsed = ?started.elapsed(),
            "Dumped reference graph"
        );

        Ok(resolution)
    }

    /// Stop tracking and forget every record.
    pub fn shutdown(&self)
    {
        self.recorder.set_enabled(false);
        self.recorder.clear();
    }
}

/// Returned by [`Tracker::suspend`].
#[must_use = "tracking resumes when the guard is dropped"]
pub struct Suspended<'a>
{
    recorder: &'a Recorder,
}

impl Drop for Suspended<'_>
{
    fn drop(&mut self)
    {
        self.recorder.resume();
    }
}

/// Create the process-wide tracker, configured with `options`.
///
/// Subsequent calls return the existing tracker and ignore their options.
pub fn init_tracking(options: Options) -> &'static Tracker
{
    let mut created = false;
    let tracker = TRACKER.get_or_init(|| {
        created = true;
        Tracker::new(options)
    });
    if created {
        info!(
            capacity = tracker.recorder.capacity(),
            scan_global_regions = tracker.options.scan_global_regions,
            "Tracking initialized"
        );
    } else {
        warn!("Tracking is already initialized; new options are ignored");
    }
    tracker
}

/// The process-wide tracker, if [`init_tracking`] was called.
pub fn tracker() -> Option<&'static Tracker>
{
    TRACKER.get()
}

/// Enable or disable the process-wide tracker; returns the previous state.
///
/// Returns false without effect if [`init_tracking`] was not called.
pub fn set_enabled(enabled: bool) -> bool
{
    tracker().map_or(false, |t| t.set_enabled(enabled))
}

/// Like [`Tracker::dump_reference_graph`], on the process-wide tracker.
pub fn dump_reference_graph(target: usize, path: impl AsRef<Path>)
    -> Result<Resolution, DumpError>
{
    tracker()
        .ok_or(DumpError::NotInitialized)?
        .dump_reference_graph(target, path)
}
