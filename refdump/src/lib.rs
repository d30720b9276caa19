//! Finding out what keeps a leaked allocation alive.
//!
//! An allocation interceptor reports allocations and frees
//! to a [`Tracker`], which keeps a bounded table of their metadata.
//! Given the address of an allocation that should have been freed,
//! [`dump_reference_graph`] scans the tracked allocations,
//! and optionally static memory, for words equal to that address,
//! and then recursively for references to the allocations found.
//! The result is a graph of which types reference which types,
//! written in the Graphviz DOT language or rendered into an image.
//!
//! The scan is conservative: any word that happens to equal an address
//! is taken to be a reference, so the graph may contain spurious edges.
//!
//! Configuration is read from [`Options`],
//! which can be loaded from the `REFDUMP_OPTIONS` environment variable.

#![warn(missing_docs)]

pub use self::{
    address::*,
    descriptor::*,
    export::{DumpError, OutputFormat, RenderError},
    graph::*,
    memory::*,
    naming::*,
    options::*,
    recorder::*,
    resolver::*,
    roots::*,
    tracker::*,
};

mod address;
mod descriptor;
mod graph;
mod memory;
mod naming;
mod options;
mod recorder;
mod resolver;
mod roots;
mod tracker;

pub mod export;
