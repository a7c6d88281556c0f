#![deny(dead_code)]
#![deny(unused_imports)]

pub mod cleaning;
pub mod config;
pub mod data;
pub mod estimate;
pub mod intervention;
pub mod io;
pub mod model;
pub mod rollout;
pub mod service;
pub mod summary;
pub mod transitions;
pub mod types;

#[cfg(test)]
mod test_fixtures;
