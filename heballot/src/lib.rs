#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

mod catalog;
mod cipher;
mod codec;
mod contract;
mod election;
mod eligibility;
mod error;
mod file_store;
mod keystore;
mod params;
mod records;
mod store;
mod tally;
mod util;

pub use catalog::*;
pub use cipher::*;
pub use codec::*;
pub use contract::*;
pub use election::*;
pub use eligibility::*;
pub use error::*;
pub use file_store::*;
pub use keystore::*;
pub use params::*;
pub use records::*;
pub use store::*;
pub use tally::*;
pub use util::*;

#[cfg(test)]
mod tests;
