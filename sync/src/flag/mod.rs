// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach sources.
pub mod once_flag;
pub mod scoped_async_release;
pub mod scoped_release;

// Re-export.
pub use once_flag::*;
pub use scoped_async_release::*;
pub use scoped_release::*;
