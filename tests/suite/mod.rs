//! Integration test modules.

mod audit;
mod cli;
mod concurrency;
mod gate;
mod lineage;
mod sqlite;
