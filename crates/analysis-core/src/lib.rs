pub mod alignment;
pub mod error;
pub mod traits;
pub mod types;

pub use alignment::*;
pub use error::*;
pub use traits::*;
pub use types::*;
