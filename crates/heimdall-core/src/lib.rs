//! Core API: the opaque-handle session surface every extraction and
//! serialization crate in the workspace is assembled behind.

mod api;
mod config;
mod error;
mod session;

pub use api::{
    close, finalize, init, last_error, process_input_file, set_ali_file_path, set_format,
    set_output_path, set_transitive, sign,
};
pub use config::{Config, EnabledStrategies};
pub use error::HeimdallError;
pub use session::Handle;
