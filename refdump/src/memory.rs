//! Reading raw memory one word at a time.

use std::{mem::size_of, ptr};

/// Size of a pointer, and the stride at which memory is scanned.
pub const WORD: usize = size_of::<usize>();

/// Source of memory words.
pub trait Memory
{
    /// Read the pointer-sized word at `address`.
    ///
    /// The address need not be aligned.
    fn read_word(&self, address: usize) -> usize;

    /// Whether any whole word in `[start, start + len)` equals `needle`.
    ///
    /// Words are read at offsets 0, [`WORD`], 2 × [`WORD`], …
    /// relative to `start`; a trailing partial word is not read.
    fn contains_word(&self, start: usize, len: usize, needle: usize) -> bool
    {
        let words = len / WORD;
        (0 .. words).any(|i| self.read_word(start + i * WORD) == needle)
    }
}

/// The memory of the current process.
#[derive(Clone, Copy, Debug)]
pub struct ProcessMemory
{
    _priv: (),
}

impl ProcessMemory
{
    /// Read memory of the current process.
    ///
    /// # Safety
    ///
    /// Every address passed to [`Memory::read_word`]
    /// must be readable for [`WORD`] bytes.
    pub const unsafe fn new() -> Self
    {
        Self{_priv: ()}
    }
}

impl Memory for ProcessMemory
{
    fn read_word(&self, address: usize) -> usize
    {
        // Read bytes so that unaligned addresses are fine.
        let ptr = address as *const [u8; WORD];
        // SAFETY: Readability is guaranteed by the constructor's contract.
        // The word may be padding or be written concurrently;
        // a stale or meaningless value only produces a spurious edge.
        let bytes = unsafe { ptr::read_volatile(ptr) };
        usize::from_ne_bytes(bytes)
    }
}
