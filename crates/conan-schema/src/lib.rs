//! Shared value types for conan-explorer.
//!
//! Everything here is plain data: references, binary package metadata,
//! remotes and the display alias for settings. No I/O happens in this crate.

pub mod package;
pub mod profile;
pub mod reference;
pub mod remote;

// Re-exports
pub use package::{Options, PackageId, PackageInfo, Settings, key_value_pairs};
pub use profile::build_profile_name_alias;
pub use reference::{
    BinaryReference, INVALID_REFERENCE, PLACEHOLDER, PackageReference, ReferenceError,
};
pub use remote::{Remote, RemoteAuth, remotes_from_same_server};
