// MIT License - Copyright (c) 2026 Peter Wright

//! Connection transport: the request/response engine and the direct TCP
//! socket with its reader task.

pub mod command;
pub mod direct;

pub use command::CommandEngine;
pub use direct::{CosFrame, DirectTransport};
