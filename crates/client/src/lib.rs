//! Client side of the SafeNest offline cache.
//!
//! This crate provides the network fetch pipeline and the coordinator that
//! intercepts dashboard requests, shared by the server binary and tests.

pub mod fetch;
pub mod worker;

pub use fetch::{Destination, FetchClient, FetchConfig, FetchRequest, Network};
pub use worker::{
    ActivateReport, ClickOutcome, ControlMessage, Coordinator, FetchOutcome, InstallReport, Notification,
    ResponseSource, Route, Router, Strategy, SyncOutcome, WorkerConfig, WorkerState,
};
