//! Homestead - backend for a personal website
//!
//! Blog, portfolio and flight log served as JSON under `/api`, with a
//! response cache that picks a strategy per request class, plus the
//! maintenance tooling behind the `homestead` binary (migrations, seeding,
//! geocoding and the performance gate).

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod gate;
pub mod models;
pub mod services;
