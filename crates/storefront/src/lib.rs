//! Vitrine Storefront library.
//!
//! This crate provides the catalog cache, the cart/favorites container, and
//! the HTTP service hosting them as a library, allowing them to be tested
//! and reused by the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod notify;
pub mod routes;
pub mod state;
pub mod storage;
