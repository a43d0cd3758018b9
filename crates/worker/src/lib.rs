//! Render farm worker: polls the request server for jobs assigned to this
//! machine, runs the engine for each one and finalizes the record.

pub mod config;
pub mod engine;
pub mod poll_loop;
pub mod runner;
