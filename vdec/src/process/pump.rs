use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, error, info, trace, warn};

use crate::codec::{BufferProvider, CodecParameters, SkipHint, VideoDecoder};
use crate::process::assemble::BitstreamAssembler;
use crate::process::composite::FrameCompositor;
use crate::process::{PipelineState, PumpExit, PumpStats};
use crate::structs::format::VideoFormat;
use crate::structs::frame::{DecodedFrame, FrameData};
use crate::structs::packet::InputPacket;
use crate::utils::buffer_pool::{CancelToken, DirectRendering, FrameBufferPool};
use crate::utils::config::PipelineConfig;
use crate::utils::errors::{DecoderError, PipelineError, PoolError, SourceError};
use crate::utils::lateness::{Degradation, LatenessController, RESYNC_AFTER};
use crate::utils::postproc::{DeblockFilter, PostProcessor};
use crate::utils::timing::{Clock, MICROSECONDS, SystemClock, TimestampAssigner};

/// Smallest pool that lets the decoder hold a reference picture while the
/// renderer still has one to show.
pub const MIN_DIRECT_POOL: usize = 2;

/// Upstream supplier of demultiplexed packets.
pub trait PacketSource {
    /// The next packet, or `None` once the input is exhausted.
    fn next_packet(&mut self) -> Result<Option<InputPacket>, SourceError>;
}

impl PacketSource for VecDeque<InputPacket> {
    fn next_packet(&mut self) -> Result<Option<InputPacket>, SourceError> {
        Ok(self.pop_front())
    }
}

/// Everything a [`DecodePump`] is built from.
pub struct PumpSetup {
    pub decoder: Box<dyn VideoDecoder>,
    pub source: Box<dyn PacketSource + Send>,
    pub pool: Arc<FrameBufferPool>,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancelToken,
    pub config: PipelineConfig,
    pub params: CodecParameters,
    pub post_processor: Option<Box<dyn PostProcessor>>,
    pub assigner: TimestampAssigner,
    pub lateness: LatenessController,
}

impl PumpSetup {
    pub fn new(
        decoder: Box<dyn VideoDecoder>,
        source: Box<dyn PacketSource + Send>,
        pool: Arc<FrameBufferPool>,
        config: PipelineConfig,
    ) -> Self {
        let params = config.codec_parameters(0, 0, Default::default(), None);
        let lateness = LatenessController::new(config.hurry_up);

        Self {
            decoder,
            source,
            pool,
            clock: Arc::new(SystemClock::new()),
            cancel: CancelToken::new(),
            config,
            params,
            post_processor: Some(Box::new(DeblockFilter)),
            assigner: TimestampAssigner::default(),
            lateness,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_params(mut self, params: CodecParameters) -> Self {
        self.params = params;
        self
    }

    pub fn with_post_processor(mut self, processor: Option<Box<dyn PostProcessor>>) -> Self {
        self.post_processor = processor;
        self
    }

    /// Also rescales the resynchronisation threshold to the assigner's ticks.
    pub fn with_assigner(mut self, assigner: TimestampAssigner) -> Self {
        let ticks = assigner.ticks_per_second() as i64;
        self.lateness = self
            .lateness
            .with_resync_after(RESYNC_AFTER * ticks / MICROSECONDS as i64);
        self.assigner = assigner;
        self
    }
}

/// The decode loop.
///
/// Each [`step`](Self::step) pulls one packet, appends it to the assembled
/// input and lets the decoder work through everything buffered. Decoded
/// frames are timestamped, checked against the clock and either published to
/// the pool or dropped when output runs late.
pub struct DecodePump {
    decoder: Box<dyn VideoDecoder>,
    source: Box<dyn PacketSource + Send>,
    pool: Arc<FrameBufferPool>,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    assembler: BitstreamAssembler,
    compositor: FrameCompositor,
    direct: Option<DirectRendering>,
    lateness: LatenessController,
    assigner: TimestampAssigner,
    state: PipelineState,
    stats: PumpStats,
    /// Packet kept back by a resynchronisation.
    pending: Option<InputPacket>,
}

impl DecodePump {
    /// Opens the codec and settles the copy or direct-rendering mode.
    pub fn open(setup: PumpSetup) -> Result<Self, PipelineError> {
        let PumpSetup {
            mut decoder,
            source,
            pool,
            clock,
            cancel,
            config,
            mut params,
            post_processor,
            assigner,
            lateness,
        } = setup;

        let capabilities = decoder.capabilities();
        params.truncated = capabilities.truncated;

        if let Err(source) = decoder.open(&params) {
            error!("cannot open codec {}: {source}", decoder.name());
            return Err(PipelineError::CodecOpen {
                codec: decoder.name().to_string(),
                source,
            });
        }
        info!("{} decoder opened", decoder.name());

        let mut compositor = FrameCompositor::default();
        if config.post_processing_requested() {
            let name = config.pp_mode_name();
            match post_processor {
                Some(processor) => match processor.mode_by_name(name, config.pp_quality) {
                    Some(mode) => {
                        info!(
                            "post-processing activated ({name}, quality {})",
                            config.pp_quality
                        );
                        compositor = compositor.with_post_processing(processor, mode);
                    }
                    None => error!("cannot get post-processing mode {name}"),
                },
                None => error!("post-processing requested without a post-processor"),
            }
        }

        let context = *decoder.context();
        let native = context
            .pix_fmt
            .is_none_or(|format| format.native_chroma().is_some());

        let pool_fits = pool.capacity() >= MIN_DIRECT_POOL;
        if config.direct_rendering && !pool_fits {
            debug!(
                "pool of {} pictures too small for direct rendering",
                pool.capacity()
            );
        }

        let direct = if config.direct_rendering
            && capabilities.direct_rendering
            && !compositor.post_processing()
            && native
            && pool_fits
        {
            info!("using direct rendering");
            let mut direct = DirectRendering::new(pool.clone(), cancel.clone());
            direct.set_aspect_ratio(context.aspect_ratio);
            Some(direct)
        } else {
            if config.direct_rendering {
                debug!("direct rendering unavailable, copying frames");
            }
            None
        };

        Ok(Self {
            decoder,
            source,
            pool,
            clock,
            cancel,
            assembler: BitstreamAssembler::new(),
            compositor,
            direct,
            lateness,
            assigner,
            state: PipelineState::default(),
            stats: PumpStats::default(),
            pending: None,
        })
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn direct_rendering(&self) -> bool {
        self.direct.is_some()
    }

    pub fn post_processing(&self) -> bool {
        self.compositor.post_processing()
    }

    pub fn pool(&self) -> &Arc<FrameBufferPool> {
        &self.pool
    }

    /// Runs until the input ends, the pipeline is cancelled or a fatal error
    /// occurs, then releases decoder-held pictures and closes the pool.
    pub fn run(&mut self) -> Result<PumpExit, PipelineError> {
        let result = loop {
            match self.step() {
                Ok(Some(exit)) => break Ok(exit),
                Ok(None) => {}
                Err(err) => break Err(err),
            }
        };

        self.finish();
        let exit = result?;
        info!("decoding stopped ({exit:?}): {}", self.stats);
        Ok(exit)
    }

    /// Hands held pictures back to the pool and wakes up every waiter.
    pub fn finish(&mut self) {
        let provider = self
            .direct
            .as_mut()
            .map(|direct| direct as &mut dyn BufferProvider);
        self.decoder.flush(provider);
        self.pool.close();
    }

    /// One iteration: pull a packet and decode everything buffered.
    pub fn step(&mut self) -> Result<Option<PumpExit>, PipelineError> {
        if self.cancel.is_cancelled() {
            return Ok(Some(PumpExit::Cancelled));
        }

        let now = self.clock.now();
        if self.lateness.needs_resync(&self.state.lateness, now) {
            if let Some(exit) = self.resync()? {
                return Ok(Some(exit));
            }
        }

        loop {
            let packet = match self.pending.take() {
                Some(packet) => packet,
                None => match self.next_packet()? {
                    Some(packet) => packet,
                    None => return Ok(Some(PumpExit::EndOfStream)),
                },
            };

            self.stats.packets += 1;
            self.assigner.anchor(&mut self.state.anchor, packet.pts);
            if self.assembler.append(&packet.data) > 0 {
                break;
            }
        }

        self.drain()
    }

    fn next_packet(&mut self) -> Result<Option<InputPacket>, PipelineError> {
        self.source.next_packet().map_err(|err| {
            error!("packet source failed: {err}");
            err.into()
        })
    }

    /// Drops input until a packet dated in the future shows up.
    fn resync(&mut self) -> Result<Option<PumpExit>, PipelineError> {
        error!("more than 5 seconds of late video -> dropping packets");
        self.stats.resyncs += 1;
        self.assembler.clear();

        loop {
            let Some(packet) = self.next_packet()? else {
                error!("input ended while dropping late packets");
                return Ok(Some(PumpExit::EndOfStream));
            };

            let now = self.clock.now();
            match packet.authoritative_pts() {
                Some(pts) if pts >= now => {
                    debug!(
                        "resynchronised at {pts} after dropping {} packets",
                        self.stats.dropped_packets
                    );
                    self.pending = Some(packet);
                    self.state.lateness.episode_start = Some(now);
                    return Ok(None);
                }
                _ => self.stats.dropped_packets += 1,
            }
        }
    }

    fn skip_hint(&self) -> SkipHint {
        if !self.decoder.context().has_picture_size() {
            SkipHint::HeadersOnly
        } else if self.lateness.degradation(&self.state.lateness) == Degradation::SkipDecode {
            SkipHint::NonReference
        } else {
            SkipHint::None
        }
    }

    /// Decodes until the buffered input is used up or the decoder needs more.
    fn drain(&mut self) -> Result<Option<PumpExit>, PipelineError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Some(PumpExit::Cancelled));
            }

            self.decoder.set_skip(self.skip_hint());
            if let Some(direct) = self.direct.as_mut() {
                direct.set_aspect_ratio(self.decoder.context().aspect_ratio);
            }

            let buffered = self.assembler.len();
            self.stats.decode_calls += 1;
            let provider = self
                .direct
                .as_mut()
                .map(|direct| direct as &mut dyn BufferProvider);

            let output = match self.decoder.decode(self.assembler.input(), provider) {
                Ok(output) => output,
                Err(DecoderError::BufferUnavailable(PoolError::Cancelled)) => {
                    return Ok(Some(PumpExit::Cancelled));
                }
                Err(DecoderError::BufferUnavailable(err @ PoolError::InvalidFormat { .. })) => {
                    error!("cannot create video output: {err}");
                    return Err(PipelineError::RendererUnavailable(err.to_string()));
                }
                Err(DecoderError::BufferUnavailable(err)) => {
                    error!("cannot get a picture buffer: {err}");
                    return Err(err.into());
                }
                Err(err) => {
                    warn!("cannot decode one frame ({buffered} bytes): {err}");
                    self.stats.decode_errors += 1;
                    self.assembler.clear();
                    return Ok(None);
                }
            };

            let consumed = output.consumed.min(buffered);
            self.assembler.consume(consumed)?;

            if let Some(frame) = output.frame {
                if let Some(exit) = self.handle_frame(frame)? {
                    return Ok(Some(exit));
                }
            }

            if consumed == 0 || self.assembler.is_empty() {
                return Ok(None);
            }
        }
    }

    fn handle_frame(&mut self, frame: DecodedFrame) -> Result<Option<PumpExit>, PipelineError> {
        if frame.is_empty() {
            trace!("decoder returned an empty picture");
            self.discard(&frame)?;
            return Ok(None);
        }

        self.stats.frames_decoded += 1;

        let now = self.clock.now();
        let frame_rate = self.decoder.context().frame_rate;
        let pts = self.assigner.next(&mut self.state.anchor, frame_rate, now);
        self.lateness.record(&mut self.state.lateness, pts, now);

        let degradation = self.lateness.degradation(&self.state.lateness);
        if !degradation.draws() {
            trace!(
                "{} frame at {pts} not drawn ({degradation}, {} late)",
                frame.picture_type, self.state.lateness.late_count
            );
            self.stats.hurried_frames += 1;
            self.discard(&frame)?;
            return Ok(None);
        }

        match &frame.data {
            FrameData::Direct(picture) => self.pool.publish(picture, pts)?,
            FrameData::Owned(_) => {
                if let Some(exit) = self.composite(&frame, pts)? {
                    return Ok(Some(exit));
                }
            }
        }

        self.stats.frames_drawn += 1;
        Ok(None)
    }

    fn discard(&self, frame: &DecodedFrame) -> Result<(), PipelineError> {
        if let Some(picture) = frame.direct_picture() {
            self.pool.discard(picture)?;
        }
        Ok(())
    }

    /// Copies an owned frame into a fresh pool picture and publishes it.
    fn composite(&mut self, frame: &DecodedFrame, pts: i64) -> Result<Option<PumpExit>, PipelineError> {
        if let Err(err) = self.compositor.select(frame.format) {
            error!("unsupported pixel format {}: {err}", frame.format);
            return Err(err.into());
        }
        let chroma = frame.format.output_chroma()?;

        let format = VideoFormat::new(
            frame.width,
            frame.height,
            chroma,
            self.decoder.context().aspect_ratio,
        );
        if let Err(err) = self.pool.configure(format) {
            error!("cannot create video output: {err}");
            return Err(PipelineError::RendererUnavailable(err.to_string()));
        }

        let picture = match self.pool.allocate(&self.cancel) {
            Ok(picture) => picture,
            Err(PoolError::Cancelled) => return Ok(Some(PumpExit::Cancelled)),
            Err(err) => {
                error!("cannot get a picture buffer: {err}");
                return Err(err.into());
            }
        };

        let written = self.compositor.composite(frame, &mut picture.planes());
        if let Err(err) = written {
            error!("cannot copy {} picture: {err}", frame.format);
            self.pool.discard(&picture)?;
            return Err(err.into());
        }

        self.pool.publish(&picture, pts)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::raw::{RawHeader, RawVideoDecoder, encode_picture};
    use crate::codec::{CodecContext, DecodeInput, DecodeOutput, DecoderCapabilities};
    use crate::process::assemble::INPUT_PADDING;
    use crate::structs::format::{FrameRate, PixelFormat};
    use crate::structs::frame::PictureType;
    use crate::utils::lateness::LatenessState;
    use crate::utils::timing::{DEFAULT_PTS_DELAY, ManualClock};
    use anyhow::Result;
    use std::sync::Mutex;

    /// Raw decoder noting, per call, the input length, the padded length and
    /// whether the padding was zero.
    struct PaddingCheck {
        inner: RawVideoDecoder,
        calls: Arc<Mutex<Vec<(usize, usize, bool)>>>,
    }

    impl VideoDecoder for PaddingCheck {
        fn name(&self) -> &str {
            "padding-check"
        }

        fn capabilities(&self) -> DecoderCapabilities {
            self.inner.capabilities()
        }

        fn open(&mut self, params: &CodecParameters) -> Result<(), DecoderError> {
            self.inner.open(params)
        }

        fn context(&self) -> &CodecContext {
            self.inner.context()
        }

        fn set_skip(&mut self, hint: SkipHint) {
            self.inner.set_skip(hint)
        }

        fn decode(
            &mut self,
            input: DecodeInput<'_>,
            provider: Option<&mut dyn BufferProvider>,
        ) -> Result<DecodeOutput, DecoderError> {
            let tail_zero = input.padded()[input.len()..].iter().all(|&b| b == 0);
            self.calls
                .lock()
                .unwrap()
                .push((input.len(), input.padded().len(), tail_zero));
            self.inner.decode(input, provider)
        }

        fn flush(&mut self, provider: Option<&mut dyn BufferProvider>) {
            self.inner.flush(provider)
        }
    }

    fn picture(format: PixelFormat) -> Vec<u8> {
        let header = RawHeader {
            width: 8,
            height: 8,
            format,
            picture_type: PictureType::I,
            reference: true,
            has_qscale: false,
        };
        encode_picture(&header, &vec![0x10; header.picture_size()], None)
    }

    fn pump(packets: Vec<InputPacket>, config: PipelineConfig) -> Result<DecodePump> {
        let pool = Arc::new(FrameBufferPool::new(4));
        let params = config.codec_parameters(8, 8, FrameRate::new(25, 1), None);
        let setup = PumpSetup::new(
            Box::new(RawVideoDecoder::new()),
            Box::new(VecDeque::from(packets)),
            pool,
            config,
        )
        .with_params(params)
        .with_clock(Arc::new(ManualClock::new(0)));

        Ok(DecodePump::open(setup)?)
    }

    #[test]
    fn corrupt_packet_is_recoverable() -> Result<()> {
        let mut bad = picture(PixelFormat::Yuv420p);
        bad[0] = 0;
        let packets = vec![
            InputPacket::new(bad, Some(1_000_000)),
            InputPacket::new(picture(PixelFormat::Yuv420p), Some(1_040_000)),
        ];
        let mut pump = pump(packets, PipelineConfig::default())?;

        assert_eq!(pump.step()?, None);
        assert_eq!(pump.stats().decode_errors, 1);
        assert_eq!(pump.step()?, None);
        assert_eq!(pump.stats().frames_drawn, 1);
        assert_eq!(pump.step()?, Some(PumpExit::EndOfStream));
        Ok(())
    }

    #[test]
    fn unsupported_format_is_fatal() -> Result<()> {
        let packets = vec![InputPacket::new(picture(PixelFormat::Gray8), Some(1))];
        let mut pump = pump(packets, PipelineConfig::default())?;

        assert!(matches!(
            pump.run(),
            Err(PipelineError::UnsupportedFormat(_))
        ));
        assert!(pump.pool().is_closed());
        Ok(())
    }

    #[test]
    fn cancel_stops_before_decoding() -> Result<()> {
        let packets = vec![InputPacket::new(picture(PixelFormat::Yuv420p), Some(1))];
        let mut pump = pump(packets, PipelineConfig::default())?;

        pump.cancel.cancel();
        assert_eq!(pump.run()?, PumpExit::Cancelled);
        assert_eq!(pump.stats().decode_calls, 0);
        Ok(())
    }

    #[test]
    fn post_processing_excludes_direct_rendering() -> Result<()> {
        let config = PipelineConfig {
            direct_rendering: true,
            pp_quality: 4,
            ..Default::default()
        };
        let pump = pump(Vec::new(), config)?;
        assert!(pump.post_processing());
        assert!(!pump.direct_rendering());

        let config = PipelineConfig {
            direct_rendering: true,
            pp_quality: 4,
            pp_name: Some("sharpen".into()),
            ..Default::default()
        };
        let pump = self::pump(Vec::new(), config)?;
        assert!(!pump.post_processing());
        assert!(pump.direct_rendering());
        Ok(())
    }

    #[test]
    fn unknown_size_parses_headers_first() -> Result<()> {
        let pool = Arc::new(FrameBufferPool::new(4));
        let data = [picture(PixelFormat::Yuv420p), picture(PixelFormat::Yuv420p)].concat();
        let setup = PumpSetup::new(
            Box::new(RawVideoDecoder::new()),
            Box::new(VecDeque::from(vec![InputPacket::new(data, Some(1))])),
            pool,
            PipelineConfig::default(),
        )
        .with_clock(Arc::new(ManualClock::new(0)));
        let mut pump = DecodePump::open(setup)?;

        assert_eq!(pump.step()?, None);
        let stats = pump.stats();
        assert_eq!(stats.decode_calls, 2);
        assert_eq!(stats.frames_decoded, 1);
        Ok(())
    }

    #[test]
    fn decoder_sees_zero_padding() -> Result<()> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let data = [picture(PixelFormat::Yuv420p), vec![0xFF; 3]].concat();
        let config = PipelineConfig::default();
        let params = config.codec_parameters(8, 8, FrameRate::new(25, 1), None);
        let setup = PumpSetup::new(
            Box::new(PaddingCheck {
                inner: RawVideoDecoder::new(),
                calls: calls.clone(),
            }),
            Box::new(VecDeque::from(vec![InputPacket::new(data.clone(), Some(1))])),
            Arc::new(FrameBufferPool::new(4)),
            config,
        )
        .with_params(params)
        .with_clock(Arc::new(ManualClock::new(0)));
        let mut pump = DecodePump::open(setup)?;

        assert_eq!(pump.step()?, None);
        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            [
                (data.len(), data.len() + INPUT_PADDING, true),
                (3, 3 + INPUT_PADDING, true),
            ]
        );
        assert_eq!(pump.stats().frames_drawn, 1);
        assert_eq!(pump.assembler.len(), 3);
        Ok(())
    }

    #[test]
    fn missing_post_processor_disables_filtering() -> Result<()> {
        let config = PipelineConfig {
            direct_rendering: true,
            pp_quality: 4,
            ..Default::default()
        };
        let setup = PumpSetup::new(
            Box::new(RawVideoDecoder::new()),
            Box::new(VecDeque::new()),
            Arc::new(FrameBufferPool::new(4)),
            config,
        )
        .with_post_processor(None);
        let pump = DecodePump::open(setup)?;

        assert!(!pump.post_processing());
        assert!(pump.direct_rendering());
        Ok(())
    }

    #[test]
    fn small_pool_disables_direct_rendering() -> Result<()> {
        let config = PipelineConfig {
            direct_rendering: true,
            ..Default::default()
        };
        let setup = PumpSetup::new(
            Box::new(RawVideoDecoder::new()),
            Box::new(VecDeque::new()),
            Arc::new(FrameBufferPool::new(1)),
            config,
        );
        let pump = DecodePump::open(setup)?;
        assert!(!pump.direct_rendering());
        assert!(pump.pool().allows_modify());
        Ok(())
    }

    #[test]
    fn resync_threshold_follows_clock_ticks() -> Result<()> {
        let setup = PumpSetup::new(
            Box::new(RawVideoDecoder::new()),
            Box::new(VecDeque::new()),
            Arc::new(FrameBufferPool::new(4)),
            PipelineConfig::default(),
        )
        .with_assigner(TimestampAssigner::new(1_000, DEFAULT_PTS_DELAY));
        let pump = DecodePump::open(setup)?;

        let late = LatenessState {
            late_count: 1,
            episode_start: Some(0),
        };
        assert!(!pump.lateness.needs_resync(&late, 5_000));
        assert!(pump.lateness.needs_resync(&late, 5_001));
        Ok(())
    }
}
