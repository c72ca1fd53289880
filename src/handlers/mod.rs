//! 핸들러 모듈

pub mod chat;
pub mod connection;
pub mod room;
pub mod task;
pub mod timer;

pub use chat::*;
pub use connection::*;
pub use room::*;
pub use task::*;
pub use timer::*;
