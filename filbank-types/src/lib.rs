pub mod codec;
pub mod error;
pub mod header;
pub mod sample_format;
pub mod shape;

pub use codec::*;
pub use error::*;
pub use header::*;
pub use sample_format::*;
pub use shape::*;
