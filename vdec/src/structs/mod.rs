//! Data model shared by the pipeline stages.

pub mod format;
pub mod frame;
pub mod packet;
pub mod picture;
