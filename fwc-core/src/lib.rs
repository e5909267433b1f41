//! Rule-compilation pipeline: compile-rule buffer, processor framework,
//! IPT/NFT backends, and the driver that wires them together. The `fwc`
//! binary (`src/main.rs`) is a thin CLI shell around this library so
//! integration tests can drive [`driver::compile_device`] directly.

pub mod comprule;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod generic;
pub mod ipt_nat;
pub mod ipt_policy;
pub mod nft_compiler;
pub mod nft_nat;
pub mod processor;
pub mod shadow;
pub mod version;
