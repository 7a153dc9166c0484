#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use vdec::codec::raw::{RawHeader, RawVideoDecoder, encode_picture};
use vdec::codec::{
    BufferProvider, CodecContext, CodecParameters, DecodeInput, DecodeOutput, DecoderCapabilities, SkipHint,
    VideoDecoder,
};
use vdec::process::pump::{DecodePump, PumpSetup};
use vdec::structs::format::{FrameRate, PixelFormat};
use vdec::structs::frame::PictureType;
use vdec::structs::packet::InputPacket;
use vdec::structs::picture::Plane;
use vdec::utils::buffer_pool::FrameBufferPool;
use vdec::utils::config::PipelineConfig;
use vdec::utils::errors::DecoderError;
use vdec::utils::timing::ManualClock;

pub const WIDTH: u16 = 16;
pub const HEIGHT: u16 = 16;

/// What the renderer saw for one picture.
#[derive(Debug, Clone)]
pub struct Shown {
    pub id: usize,
    pub pts: i64,
    pub planes: Vec<Plane>,
}

pub fn header(format: PixelFormat, reference: bool) -> RawHeader {
    RawHeader {
        width: WIDTH,
        height: HEIGHT,
        format,
        picture_type: if reference { PictureType::P } else { PictureType::B },
        reference,
        has_qscale: false,
    }
}

/// Tight planes with a deterministic gradient.
pub fn payload(format: PixelFormat, seed: u8) -> Vec<u8> {
    let size = format.picture_size(WIDTH as usize, HEIGHT as usize);
    (0..size).map(|i| (i as u8).wrapping_mul(3).wrapping_add(seed)).collect()
}

pub fn picture(format: PixelFormat, reference: bool, seed: u8) -> Vec<u8> {
    encode_picture(&header(format, reference), &payload(format, seed), None)
}

pub fn config() -> PipelineConfig {
    PipelineConfig::default()
}

pub fn pump(
    decoder: Box<dyn VideoDecoder>,
    packets: Vec<InputPacket>,
    pool: Arc<FrameBufferPool>,
    config: PipelineConfig,
    clock: ManualClock,
) -> anyhow::Result<DecodePump> {
    let params = config.codec_parameters(
        WIDTH as u32,
        HEIGHT as u32,
        FrameRate::new(25, 1),
        None,
    );
    let setup = PumpSetup::new(decoder, Box::new(VecDeque::from(packets)), pool, config)
        .with_params(params)
        .with_clock(Arc::new(clock));

    Ok(DecodePump::open(setup)?)
}

pub fn raw_pump(
    packets: Vec<InputPacket>,
    pool: Arc<FrameBufferPool>,
    config: PipelineConfig,
    clock: ManualClock,
) -> anyhow::Result<DecodePump> {
    pump(Box::new(RawVideoDecoder::new()), packets, pool, config, clock)
}

/// Drains the display queue until the pool is closed and empty.
pub fn spawn_renderer(pool: Arc<FrameBufferPool>) -> JoinHandle<Vec<Shown>> {
    thread::spawn(move || {
        let mut shown = Vec::new();
        loop {
            match pool.next_displayable(Duration::from_millis(5)) {
                Some(display) => {
                    shown.push(Shown {
                        id: display.picture.id(),
                        pts: display.pts,
                        planes: display.picture.planes().clone(),
                    });
                    pool.displayed(&display.picture).unwrap();
                }
                None if pool.is_drained() => break,
                None => {}
            }
        }
        shown
    })
}

/// Raw decoder whose every decode call costs `cost` ticks of the clock.
pub struct SlowDecoder {
    pub inner: RawVideoDecoder,
    pub clock: ManualClock,
    pub cost: i64,
}

impl VideoDecoder for SlowDecoder {
    fn name(&self) -> &str {
        "slow-raw"
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
        self.clock.advance(self.cost);
        self.inner.decode(input, provider)
    }

    fn flush(&mut self, provider: Option<&mut dyn BufferProvider>) {
        self.inner.flush(provider)
    }
}
