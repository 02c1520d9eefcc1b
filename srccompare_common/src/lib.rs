pub mod archive;
pub mod config;
pub mod error;
pub mod text;
pub mod types;

pub use archive::*;
pub use config::*;
pub use error::*;
pub use text::*;
pub use types::*;
