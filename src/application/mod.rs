//! Application services: the rendering pipeline and the use cases built on it.

pub mod attendance;
pub mod concat;
pub mod error;
pub mod masterlist;
pub mod render;
