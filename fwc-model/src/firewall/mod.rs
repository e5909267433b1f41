pub mod common;
pub mod parse;
pub mod ports;
pub mod types;

pub use common::{Arena, DeviceConfig, Model, ParserConfig};
