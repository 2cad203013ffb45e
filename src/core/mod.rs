// src/core/mod.rs

//! Core subsystems of the retrieval engine.

pub mod common;
pub mod community;
pub mod config;
pub mod engine;
pub mod extract;
pub mod model;
pub mod store;
pub mod types;
pub mod vector;
