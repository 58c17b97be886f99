//! Core library for the candidate-screening orchestrator.
//!
//! Business logic lives under [`workflows`]; the deployable HTTP service in
//! `services/api` wires these modules to concrete infrastructure.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
