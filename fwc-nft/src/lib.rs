pub mod client;
pub mod command;
pub mod expression;
pub mod helper;
pub mod statement;
pub mod types;

pub use client::NftClient;
pub use command::Command;
pub use expression::Expression;
pub use statement::Statement;
