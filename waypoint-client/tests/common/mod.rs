#![allow(dead_code)]

mod harness;
mod tls_service;

pub use harness::*;
pub use tls_service::TlsService;
