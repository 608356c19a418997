//! Integration tests for dashrate-abr

mod bola_properties;
mod engine_strategies;
