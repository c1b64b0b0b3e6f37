/// A frame that could not be turned into pixels
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame {frame_id}: invalid base64 payload: {source}")]
    Base64 {
        frame_id: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("frame {frame_id}: image decode failed: {source}")]
    Decode {
        frame_id: String,
        #[source]
        source: image::ImageError,
    },

    #[error("frame {frame_id}: invalid dimensions {width}x{height}")]
    Dimensions {
        frame_id: String,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("pose engine unavailable: {0}")]
    Unavailable(String),

    #[error("pose engine not initialised")]
    NotInitialised,

    #[error("inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Socket(#[from] async_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no endpoint candidates configured")]
    NoCandidates,
}
