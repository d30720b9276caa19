//! Inspecting the objects loaded into the process.

use std::{ffi::{CStr, OsString}, os::unix::ffi::OsStringExt};

/// Writable `PT_LOAD` segment of a loaded object.
///
/// Addresses are absolute, that is, relocated by the load bias.
/// The segment is split in two at `file_end`:
/// the bytes before it are initialized from the object file (data),
/// the bytes after it are zero-initialized at load time (bss).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WritableSegment
{
    /// Name of the object as reported by the dynamic linker.
    ///
    /// The main program is usually reported with an empty name.
    pub object: OsString,

    /// Address of the first byte of the segment.
    pub start: usize,

    /// Address just past the file-backed part of the segment.
    pub file_end: usize,

    /// Address just past the segment.
    pub end: usize,
}

/// Call dl_iterate_phdr(3) and collect every writable `PT_LOAD` segment.
///
/// On platforms without dl_iterate_phdr(3) this returns no segments.
pub fn dl_iterate_phdr() -> Vec<WritableSegment>
{
    let mut segments = Vec::new();
    collect_segments(&mut segments);
    segments
}

#[cfg(target_os = "linux")]
fn collect_segments(segments: &mut Vec<WritableSegment>)
{
    unsafe extern "C" fn callback(
        info: *mut libc::dl_phdr_info,
        _size: libc::size_t,
        data: *mut libc::c_void,
    ) -> libc::c_int
    {
        // SAFETY: data is the vector passed below; info is valid for the call.
        let segments = &mut *data.cast::<Vec<WritableSegment>>();
        let info = &*info;

        let object = if info.dlpi_name.is_null() {
            OsString::new()
        } else {
            let name = CStr::from_ptr(info.dlpi_name);
            OsString::from_vec(name.to_bytes().to_vec())
        };

        let bias = info.dlpi_addr as usize;
        for i in 0 .. usize::from(info.dlpi_phnum) {
            let phdr = &*info.dlpi_phdr.add(i);
            if phdr.p_type != libc::PT_LOAD || phdr.p_flags & libc::PF_W == 0 {
                continue;
            }
            let start = bias.wrapping_add(phdr.p_vaddr as usize);
            let filesz = (phdr.p_filesz as usize).min(phdr.p_memsz as usize);
            segments.push(WritableSegment{
                object: object.clone(),
                start,
                file_end: start.wrapping_add(filesz),
                end: start.wrapping_add(phdr.p_memsz as usize),
            });
        }

        // Zero means continue with the next object.
        0
    }

    let data: *mut Vec<WritableSegment> = segments;

    // SAFETY: The callback only touches data as the vector it is.
    unsafe { libc::dl_iterate_phdr(Some(callback), data.cast()); }
}

#[cfg(not(target_os = "linux"))]
fn collect_segments(_segments: &mut Vec<WritableSegment>)
{
}
