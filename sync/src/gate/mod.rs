// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach sources.
pub mod inner_gate;
pub mod monitor_gate;
pub mod spin_gate;

// Re-export.
pub use inner_gate::*;
pub use monitor_gate::*;
pub use spin_gate::*;
