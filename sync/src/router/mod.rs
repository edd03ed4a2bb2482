// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach sources.
pub mod broadcast_router;
pub mod handler;
pub mod keyed_router;
pub mod message_queue;
pub mod publish_result;
pub mod subscription;

pub(crate) mod dispatch;

// Re-export.
pub use broadcast_router::*;
pub use handler::*;
pub use keyed_router::*;
pub use message_queue::*;
pub use publish_result::*;
pub use subscription::*;
