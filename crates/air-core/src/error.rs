use uuid::Uuid;

/// The five error kinds the engine can raise. Transient kinds are caught at
/// the layer that raises them and folded into a metrics counter; only
/// `FatalSession` is allowed to unwind out of the pipeline session.
#[derive(Debug, thiserror::Error)]
pub enum AirError {
    #[error("decode fault on block {block_id} segment {segment_index}: {source}")]
    DecodeFault {
        block_id: Uuid,
        segment_index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("seam miss at frame {session_frame_index}: next segment was not ready")]
    SeamMiss { session_frame_index: u64 },

    #[error("buffer underrun on {buffer} at frame {session_frame_index}")]
    BufferUnderrun { buffer: &'static str, session_frame_index: u64 },

    #[error("sink overrun: {bytes_dropped} bytes dropped")]
    SinkOverrun { bytes_dropped: usize },

    #[error("fatal session error: {0}")]
    FatalSession(String),
}

impl AirError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AirError::FatalSession(_))
    }
}
