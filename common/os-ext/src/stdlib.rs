use std::{
    ffi::{CString, OsString},
    fs::File,
    io,
    os::unix::{ffi::{OsStrExt, OsStringExt}, io::{FromRawFd, OwnedFd}},
    path::{Path, PathBuf},
};

/// Call mkstemps(3) with the given arguments.
///
/// `template` must end in `XXXXXX` followed by `suffix_len` bytes.
/// Returns the opened file together with the path that was created.
/// The file is opened for reading and writing with mode 0600.
pub fn mkstemps(template: &Path, suffix_len: usize)
    -> io::Result<(File, PathBuf)>
{
    let template = CString::new(template.as_os_str().as_bytes())?;

    let suffix_len = libc::c_int::try_from(suffix_len)
        .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;

    // CString::as_mut_ptr does not exist.
    let mut template = template.into_bytes_with_nul();

    // SAFETY: template is NUL-terminated.
    let fd = unsafe {
        libc::mkstemps(template.as_mut_ptr().cast::<libc::c_char>(), suffix_len)
    };

    if fd == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: fd is a new, open file descriptor.
    let file = File::from(unsafe { OwnedFd::from_raw_fd(fd) });

    // Remove NUL.
    template.pop();

    Ok((file, PathBuf::from(OsString::from_vec(template))))
}
