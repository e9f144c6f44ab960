//! Typed call builders and view queries for the contracts the wallet talks to

pub mod erc20;

pub use erc20::{Erc20Call, Erc20Query, Erc20Token, TokenInfo};
