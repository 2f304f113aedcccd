//! # dualfork Core Library
//!
//! Portable file, directory and resource-fork access. A file identity can be
//! a search-path-relative path string or a volume / directory-id / name
//! triplet; either one opens plain byte streams and typed, numbered resources
//! stored in a classic resource fork.
//!
//! ## Key Modules
//!
//! - [`identity`]: file and directory identities and the [`Location`] operations.
//! - [`opened_file`]: the byte-stream handle.
//! - [`codec`]: the resource map reader and writer, plus fork wrappers.
//! - [`resource_file`]: opened resource forks and the current-resource context stack.
//! - [`loaded`]: owned resource buffers.
//! - [`config`]: search path and per-user directories.
//!
//! ## Examples
//!
//! ```no_run
//! use dualfork::{FileSpecifier, LoadedResource, Location, ResType};
//!
//! let mut spec = FileSpecifier::new();
//! spec.set_name_with_path("Sounds/sounds.pack")?;
//! let mut sounds = spec.open_resource_file(false)?;
//! let mut clip = LoadedResource::new();
//! sounds.get(ResType::new(*b"snd "), 128, &mut clip)?;
//! # Ok::<(), dualfork::FileError>(())
//! ```

pub mod cli;
pub mod codec;
pub mod config;
pub mod dialog;
pub mod error;
pub mod fsx;
pub mod identity;
pub mod loaded;
pub mod opened_file;
pub mod resource_file;

pub use codec::{ResType, ResourceBuilder, ResourceDirectory, ResourceEntry};
pub use dialog::{DialogOutcome, DialogRequest, FileChooser};
pub use error::{ErrorCode, FileError, LastError, Result};
pub use identity::{DirEntry, FileKind, Location};
pub use loaded::LoadedResource;
pub use opened_file::OpenedFile;
pub use resource_file::{current_check, current_get, OpenedResourceFile, ResourceContext};

// Exactly one identity representation is exported per build.
#[cfg(not(feature = "triplet"))]
pub use identity::path::{DirectorySpecifier, FileSpecifier};
#[cfg(feature = "triplet")]
pub use identity::triplet::{DirectorySpecifier, FileSpecifier};
