//! wifi-xval — Wi-Fi scan monitor cross-validation agent.
//!
//! Runs inside a sensor-hub runtime and is driven step by step by a host test
//! harness. The host sends `StepStartCommand`s; the agent exercises the Wi-Fi
//! scan monitor through the runtime's asynchronous request API and answers
//! with binary `TestResult` messages.
//!
//! The crate has no platform dependencies. The runtime is reached through the
//! [`platform::Platform`] trait, so everything is testable on any host with
//! `cargo test`:
//! - `protocol`: message types and the test result builder
//! - `codec`: protocol-buffers wire encoding
//! - `comm`: size, allocate, encode, send
//! - `manager`: step state machine and event dispatch
//! - `queue`: single-consumer event queue for multi-threaded hosts
//! - `report`: NDJSON diagnostic lines for the runtime log

#![cfg_attr(not(test), no_std)]

pub mod codec;
pub mod comm;
pub mod manager;
pub mod platform;
pub mod protocol;
pub mod queue;
pub mod report;
