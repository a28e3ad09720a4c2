pub mod config;
pub mod error;
pub mod types;

pub use config::MedtutorConfig;
pub use error::{MedtutorError, Result};
pub use types::*;
