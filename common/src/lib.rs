#[macro_use]
pub mod macros;
pub mod file_format;
pub mod key_index_vec;
pub mod log_setup;
pub mod parallel;
pub mod serde;

pub use file_format::SerdeFormat;
pub use self::serde::{Result, deserialize, serialize};

pub const EPSILON: f64 = 1e-6;

pub fn is_debug() -> bool {
    cfg!(debug_assertions)
}
