/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

//! A pre-fork ICAP (RFC 3507) server: request/response content adaptation
//! over a static, statically-linked set of modifiers.
//!
//! The process model is a single listening socket bound by a manager
//! process, which forks a pool of worker processes that each block in
//! `accept()` and serve one connection at a time. There is no async runtime;
//! every I/O call is a blocking syscall and concurrency comes entirely from
//! the process pool.

pub mod config;
pub mod daemon;
pub mod error;
pub mod handlers;
pub mod log;
pub mod manager;
pub mod modules;
pub mod opts;
pub mod protocol;
pub mod signal;
pub mod socket;
pub mod stats;
pub mod version;
pub mod worker;

pub use error::{IcapError, IcapResult};
