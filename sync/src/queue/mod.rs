// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach sources.
pub mod bounded_async_queue;
pub mod consuming_stream;
pub mod ordered_collection;

// Re-export.
pub use bounded_async_queue::*;
pub use consuming_stream::*;
pub use ordered_collection::*;
