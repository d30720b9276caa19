//! Extra items for talking to the operating system.
//!
//! This crate provides a safe, low-level interface to the operating system.
//! The functions in this crate are named after their underlying library calls,
//! and their behavior is identical except for the differences listed below.
//! The exact semantics of each function can be found in their man pages.
//!
//! # Differences with underlying library calls
//!
//! Errors are reported using [`Result`] rather than
//! through `errno` and an arbitrary return value.
//!
//! Path arguments are accepted instead of NUL-terminated strings.
//! They are automatically made NUL-terminated by the wrapper functions.
//! If an interior NUL is found within the path,
//! the wrapper function fails with `EINVAL`.
//!
//! Callback-based interfaces such as dl_iterate_phdr(3)
//! are turned into functions that collect the results.
//!
//! [`Result`]: `std::io::Result`

#![warn(missing_docs)]

pub use self::{link::*, stdlib::*};

mod link;
mod stdlib;
