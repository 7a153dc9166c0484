pub mod bitstream_io;
pub mod buffer_pool;
pub mod config;
pub mod convert;
pub mod errors;
pub mod lateness;
pub mod postproc;
pub mod timing;
