//! CLI commands implementation

pub mod files;
pub mod init;
pub mod remove;
pub mod run;
pub mod status;

pub use files::*;
pub use init::*;
pub use remove::*;
pub use run::*;
pub use status::*;
