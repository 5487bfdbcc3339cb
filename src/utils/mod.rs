mod backoff;
mod file_io;

pub use backoff::*;
pub use file_io::*;
