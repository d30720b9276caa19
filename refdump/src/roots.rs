//! Static memory regions that may hold references into the heap.

use {os_ext::WritableSegment, std::fmt};

/// Kind of static memory a region belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Section
{
    /// Initialized writable statics.
    Data,

    /// Zero-initialized writable statics.
    Bss,
}

impl Section
{
    /// Synthetic type name under which the section appears in graphs.
    pub const fn pseudo_type(self) -> &'static str
    {
        match self {
            Self::Data => "#GlobalData",
            Self::Bss  => "#GlobalBss",
        }
    }
}

impl fmt::Display for Section
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(self.pseudo_type())
    }
}

/// Address range `[start, end)` of static memory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RootRegion
{
    #[allow(missing_docs)]
    pub start: usize,

    #[allow(missing_docs)]
    pub end: usize,

    #[allow(missing_docs)]
    pub section: Section,
}

impl RootRegion
{
    /// Number of bytes in the region.
    pub fn len(&self) -> usize
    {
        self.end.saturating_sub(self.start)
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

/// Enumerates the static memory regions to scan for roots.
///
/// Every region returned must be readable in its entirety
/// for as long as the process runs.
pub trait RootRegions
{
    /// The regions to scan, in the order they are to be scanned.
    fn regions(&self) -> Vec<RootRegion>;
}

/// No static memory is scanned.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRoots;

impl RootRegions for NoRoots
{
    fn regions(&self) -> Vec<RootRegion>
    {
        Vec::new()
    }
}

/// A fixed list of regions.
impl RootRegions for Vec<RootRegion>
{
    fn regions(&self) -> Vec<RootRegion>
    {
        self.clone()
    }
}

/// Writable segments of every object loaded into the process.
///
/// The segments are enumerated anew for each dump,
/// so objects loaded after initialization are included.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadedSegments;

impl RootRegions for LoadedSegments
{
    fn regions(&self) -> Vec<RootRegion>
    {
        os_ext::dl_iterate_phdr().iter().flat_map(split_segment).collect()
    }
}

/// Split a segment into its data and bss parts, dropping empty ones.
fn split_segment(segment: &WritableSegment) -> impl Iterator<Item=RootRegion>
{
    let data = RootRegion{
        start: segment.start,
        end: segment.file_end,
        section: Section::Data,
    };
    let bss = RootRegion{
        start: segment.file_end,
        end: segment.end,
        section: Section::Bss,
    };
    [data, bss].into_iter().filter(|r| !r.is_empty())
}
