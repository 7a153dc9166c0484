pub mod command;
pub mod decode;
pub mod info;
pub mod pack;
