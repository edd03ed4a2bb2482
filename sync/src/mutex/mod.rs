// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach sources.
pub mod fifo_mutex;
pub mod mutex_api;
pub mod semaphore_mutex;

#[cfg(test)]
mod mutex_contract_tests;

// Re-export.
pub use fifo_mutex::*;
pub use mutex_api::*;
pub use semaphore_mutex::*;
