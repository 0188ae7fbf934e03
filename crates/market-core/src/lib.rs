pub mod error;
pub mod sanitize;
pub mod traits;
pub mod types;

pub use error::*;
pub use sanitize::{sanitize, to_safe_json, RawKey, RawValue};
pub use traits::*;
pub use types::*;
