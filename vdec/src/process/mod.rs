use std::fmt::Display;

use crate::utils::lateness::LatenessState;
use crate::utils::timing::TimestampAnchor;

/// Input accumulation ahead of the decoder.
///
/// Provides the [`BitstreamAssembler`](assemble::BitstreamAssembler), which
/// joins packets into one padded buffer and drops what the decoder consumed.
pub mod assemble;

/// Decoded-frame delivery into pool pictures.
///
/// Provides the [`FrameCompositor`](composite::FrameCompositor), which copies,
/// post-processes or converts decoded planes.
pub mod composite;

/// The decode loop.
///
/// Provides the [`DecodePump`](pump::DecodePump), which drives the decoder
/// and hands frames to the renderer on time.
pub mod pump;

/// Mutable state of one pipeline, owned by the decode thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineState {
    pub lateness: LatenessState,
    pub anchor: TimestampAnchor,
}

/// Counters kept by the decode loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub packets: u64,
    pub decode_calls: u64,
    pub frames_decoded: u64,
    pub frames_drawn: u64,
    pub decode_errors: u64,
    /// Frames decoded but not drawn because output was late.
    pub hurried_frames: u64,
    /// Packets discarded by forced resynchronisation.
    pub dropped_packets: u64,
    pub resyncs: u64,
}

impl Display for PumpStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} packets, {} frames decoded, {} drawn, {} hurried, {} decode errors, {} packets dropped in {} resyncs",
            self.packets,
            self.frames_decoded,
            self.frames_drawn,
            self.hurried_frames,
            self.decode_errors,
            self.dropped_packets,
            self.resyncs,
        )
    }
}

/// Why the decode loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    EndOfStream,
    Cancelled,
}
