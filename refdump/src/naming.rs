//! Turning type descriptors and code addresses into human-readable text.

use {
    crate::TypeDescriptor,
    regex::Regex,
    std::{ffi::c_void, fmt, path::PathBuf, sync::OnceLock},
};

/// Location in the source code.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceLocation
{
    #[allow(missing_docs)]
    pub file: PathBuf,

    #[allow(missing_docs)]
    pub line: u32,
}

impl fmt::Display for SourceLocation
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Names types and code addresses.
pub trait Naming
{
    /// Display name for values of the given type.
    fn type_name(&self, descriptor: &TypeDescriptor) -> String;

    /// Source location of the code at the given address, if known.
    fn source_location(&self, code: usize) -> Option<SourceLocation>;
}

/// Names Rust types by their [`type_name`][`std::any::type_name`]
/// and code addresses by their debug info.
#[derive(Clone, Copy, Debug, Default)]
pub struct RustNaming
{
    short: bool,
}

impl RustNaming
{
    /// Use fully qualified type names, such as `alloc::vec::Vec<app::Info>`.
    pub const fn qualified() -> Self
    {
        Self{short: false}
    }

    /// Strip module paths from type names, such as `Vec<Info>`.
    ///
    /// Shorter names make for more readable graphs,
    /// but types with equal names in different modules are conflated.
    pub const fn short() -> Self
    {
        Self{short: true}
    }
}

impl Naming for RustNaming
{
    fn type_name(&self, descriptor: &TypeDescriptor) -> String
    {
        if self.short {
            strip_module_paths(descriptor.name())
        } else {
            descriptor.name().to_owned()
        }
    }

    fn source_location(&self, code: usize) -> Option<SourceLocation>
    {
        // backtrace::resolve treats the address as a return address
        // and looks up the byte before it. A code pointer holds the entry
        // of a function, whose byte before belongs to something else.
        let lookup = code.wrapping_add(1);
        let mut location = None;
        backtrace::resolve(lookup as *mut c_void, |symbol| {
            if location.is_some() {
                return;
            }
            if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                location = Some(SourceLocation{file: file.to_owned(), line});
            }
        });
        location
    }
}

/// Remove every `module::` prefix from a type name.
///
/// Module segments are recognized by starting with a lowercase letter,
/// which is the naming convention for modules and crates.
pub fn strip_module_paths(name: &str) -> String
{
    static MODULE_SEGMENT: OnceLock<Regex> = OnceLock::new();
    let regex = MODULE_SEGMENT.get_or_init(|| {
        Regex::new(r"(?-u:\b)[a-z_][a-z0-9_]*::")
            .expect("Module segment pattern should compile")
    });
    regex.replace_all(name, "").into_owned()
}

/// Whether the first word of a value of this type is a code address.
///
/// This holds for descriptors marked with [`with_code_pointer`]
/// and for function pointer types.
/// It does not hold for closures, whose values hold only their captures,
/// nor for boxed trait objects such as `Box<dyn Fn()>`,
/// whose code is reached through a vtable of unspecified layout.
///
/// [`with_code_pointer`]: `TypeDescriptor::with_code_pointer`
pub fn leads_with_code(descriptor: &TypeDescriptor) -> bool
{
    static FN_POINTER: OnceLock<Regex> = OnceLock::new();
    let regex = FN_POINTER.get_or_init(|| {
        Regex::new(r#"^(unsafe )?(extern "[^"]*" )?fn\("#)
            .expect("Function pointer pattern should compile")
    });
    descriptor.has_code_pointer() || regex.is_match(descriptor.name())
}
