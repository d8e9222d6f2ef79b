mod buffer;
mod multipart;
mod param_parser;

pub use self::buffer::*;
pub use self::multipart::*;
pub use self::param_parser::*;
