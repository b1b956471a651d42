// src/lib.rs

//! offerwatch library

pub mod bootstrap;
pub mod clients;
pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
