//! Tracking configuration.

use {
    serde::{Deserialize, Serialize},
    std::env::{self, VarError},
    thiserror::Error,
};

/// Environment variable read by [`Options::from_env`].
pub const OPTIONS_VAR: &str = "REFDUMP_OPTIONS";

/// Default capacity of the allocation table.
pub const DEFAULT_MAX_TRACKED_ALLOCATIONS: usize = 1 << 20;

/// Configuration for tracking and dumping.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// # use refdump::Options;
/// let options = Options::from_json(r#"{"max_depth": 4}"#).unwrap();
/// assert_eq!(options.max_depth, 4);
/// assert!(options.trace_frees);
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options
{
    /// Number of records the allocation table can hold.
    ///
    /// The table's storage is reserved up front.
    pub max_tracked_allocations: usize,

    /// Whether static memory is scanned for references.
    ///
    /// References found there are attributed to
    /// the `#GlobalData` and `#GlobalBss` pseudo-types.
    pub scan_global_regions: bool,

    /// How many levels above the target to scan; 0 means no limit.
    pub max_depth: usize,

    /// Whether code addresses in function-like values
    /// are resolved to source locations for their display names.
    ///
    /// This applies to function pointers and to descriptors marked with
    /// [`TypeDescriptor::with_code_pointer`][`crate::TypeDescriptor::with_code_pointer`].
    /// Closures carry no code address in their values,
    /// so closures defined in the same function share one display name.
    pub resolve_closure_source_locations: bool,

    /// Whether free notifications are honored.
    ///
    /// When disabled, freed allocations stay live in the table.
    /// This is cheaper but produces edges from dead memory,
    /// and requires freed memory to remain readable.
    pub trace_frees: bool,

    /// Program invoked to render graph descriptions into images.
    ///
    /// It is invoked as `renderer -T<format> <input> -o <output>`.
    pub renderer: String,
}

impl Default for Options
{
    fn default() -> Self
    {
        Self{
            max_tracked_allocations: DEFAULT_MAX_TRACKED_ALLOCATIONS,
            scan_global_regions: false,
            max_depth: 0,
            resolve_closure_source_locations: false,
            trace_frees: true,
            renderer: "dot".to_owned(),
        }
    }
}

/// Returned when options could not be loaded.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum OptionsError
{
    #[error("Invalid options: {0}")]
    Json(#[from] serde_json::Error),

    #[error("REFDUMP_OPTIONS is not valid Unicode")]
    NotUnicode,
}

impl Options
{
    /// Parse options from a JSON object.
    pub fn from_json(json: &str) -> Result<Self, OptionsError>
    {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse options from the [`OPTIONS_VAR`] environment variable.
    ///
    /// If the variable is not set, the defaults are returned.
    pub fn from_env() -> Result<Self, OptionsError>
    {
        match env::var(OPTIONS_VAR) {
            Ok(json)                     => Self::from_json(&json),
            Err(VarError::NotPresent)    => Ok(Self::default()),
            Err(VarError::NotUnicode(_)) => Err(OptionsError::NotUnicode),
        }
    }
}
