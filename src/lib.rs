pub mod buildlog;
pub mod config;
pub mod error;
pub mod flash;
pub mod image;
pub mod partition;
pub mod ports;
pub mod process;
pub mod www;

#[macro_use]
extern crate log;
