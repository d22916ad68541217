//! ToolHive MCP core - platform and IO free foundation shared by the server
//! crate: settings, error taxonomy, the static operation registry and the
//! uniform operation result type.

mod error;
mod operations;
mod outcome;
mod settings;

pub use error::*;
pub use operations::*;
pub use outcome::*;
pub use settings::*;
