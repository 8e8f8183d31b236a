//! The built-in `trellis:runtime` plugin.
//!
//! For every auto-mounted entrypoint it generates the client index, the
//! optional async and server bootstraps, the server index for SSR entries
//! and the runtime registration modules, then routes the bundler entries
//! through them.

mod plugin;
pub mod templates;

pub use plugin::{PLUGIN_NAME, RuntimeCodegen, generate, point_entries};
