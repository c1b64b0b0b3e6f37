pub mod font;
pub mod overlay;
pub mod skeleton;
#[cfg(feature = "viewer")]
pub mod window;

pub use overlay::{CoverFit, FrameBuffer, OverlayRenderer, SharedOverlay};
pub use skeleton::{topology, POSE_CONNECTIONS};
#[cfg(feature = "viewer")]
pub use window::MinifbWindow;

use crate::packet::SkeletonPacket;

/// Visual feedback for a finished packet
pub trait PacketRenderer: Send + Sync {
    fn render_packet(&self, packet: &SkeletonPacket);
}
