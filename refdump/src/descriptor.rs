//! Describing the types of tracked allocations.

use std::{any::type_name, mem::size_of};

/// Whether values of a type can hold references to other values.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TypeKind
{
    /// Numbers, booleans, characters and the unit type.
    ///
    /// Allocations of scalar types are never recorded.
    Scalar,

    /// Everything else: structs, enums, tuples, pointers, closures, ….
    Aggregate,
}

/// Opaque handle identifying the element type of an allocation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TypeDescriptor
{
    name: &'static str,
    size: usize,
    kind: TypeKind,
    code_pointer: bool,
}

/// Type names that are classified as [`TypeKind::Scalar`].
const SCALAR_NAMES: &[&str] = &[
    "()", "bool", "char",
    "f32", "f64",
    "i8", "i16", "i32", "i64", "i128", "isize",
    "u8", "u16", "u32", "u64", "u128", "usize",
];

impl TypeDescriptor
{
    /// Describe an arbitrary type.
    ///
    /// `size` is the size of one element in bytes.
    pub const fn new(name: &'static str, size: usize, kind: TypeKind) -> Self
    {
        Self{name, size, kind, code_pointer: false}
    }

    /// Describe the Rust type `T`.
    pub fn of<T>() -> Self
    {
        let name = type_name::<T>();
        let kind = if SCALAR_NAMES.contains(&name) {
            TypeKind::Scalar
        } else {
            TypeKind::Aggregate
        };
        Self::new(name, size_of::<T>(), kind)
    }

    /// Mark the first word of each value as a code address.
    ///
    /// This is the case for function pointers and for
    /// hand-rolled callback structs that begin with one.
    /// The code address is used to tell apart
    /// values that otherwise share a display name.
    pub const fn with_code_pointer(mut self) -> Self
    {
        self.code_pointer = true;
        self
    }

    /// The type name, as given at construction.
    pub const fn name(&self) -> &'static str
    {
        self.name
    }

    /// Size of one element in bytes.
    pub const fn size(&self) -> usize
    {
        self.size
    }

    #[allow(missing_docs)]
    pub const fn kind(&self) -> TypeKind
    {
        self.kind
    }

    /// Whether [`with_code_pointer`][`Self::with_code_pointer`] was called.
    pub const fn has_code_pointer(&self) -> bool
    {
        self.code_pointer
    }
}
