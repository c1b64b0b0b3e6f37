pub mod bridge;
pub mod config;
pub mod error;
pub mod frame;
pub mod host_link;
pub mod packet;
pub mod pipeline;
pub mod pose;
pub mod protocol;
pub mod render;
pub mod transport;
