//! Shared utilities: option rendering, placeholder expansion, path resolution, validation.

pub mod options;
pub mod paths;
pub mod template;
pub mod validation;

pub use options::{merge_options, options_to_args};
pub use paths::{resolve_file, resolve_program, PathError};
pub use template::{expand, expand_all, Vars};
pub use validation::{resolve_host_ref, validate_name};
