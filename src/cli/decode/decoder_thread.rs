use std::sync::Arc;
use std::thread;

use anyhow::{Result, bail};
use indicatif::ProgressBar;
use vdec::codec::raw::{RAW_FOURCC, RawVideoDecoder};
use vdec::process::pump::{DecodePump, PumpSetup};
use vdec::process::{PumpExit, PumpStats};
use vdec::utils::buffer_pool::{CancelToken, FrameBufferPool};
use vdec::utils::config::PipelineConfig;
use vdec::utils::timing::Clock;

use super::progress::ProgressSource;
use crate::container::VpkReader;
use crate::input::InputReader;

pub struct DecoderThreadConfig {
    pub reader: VpkReader<InputReader>,
    pub pool: Arc<FrameBufferPool>,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancelToken,
    pub config: PipelineConfig,
    pub pb_clone: Option<ProgressBar>,
}

pub struct DecoderThreadResult {
    pub exit: PumpExit,
    pub stats: PumpStats,
}

pub fn spawn_decoder_thread(
    config: DecoderThreadConfig,
) -> thread::JoinHandle<Result<DecoderThreadResult>> {
    thread::spawn(move || -> Result<DecoderThreadResult> {
        let pool = config.pool.clone();
        let result = run_decoder(config);
        // Unblocks the renderer when the pump never started.
        pool.close();
        result
    })
}

fn run_decoder(config: DecoderThreadConfig) -> Result<DecoderThreadResult> {
    let DecoderThreadConfig {
        reader,
        pool,
        clock,
        cancel,
        config,
        pb_clone,
    } = config;

    let header = *reader.header();
    if header.codec != RAW_FOURCC {
        bail!("No decoder for codec {:?}", header.codec_name());
    }

    let params = config.codec_parameters(
        header.width.into(),
        header.height.into(),
        header.frame_rate(),
        header.extradata(),
    );
    let source = ProgressSource::new(reader, pb_clone);

    let setup = PumpSetup::new(
        Box::new(RawVideoDecoder::new()),
        Box::new(source),
        pool,
        config,
    )
    .with_clock(clock)
    .with_cancel(cancel)
    .with_params(params);

    let mut pump = DecodePump::open(setup)?;
    let exit = pump.run()?;
    let stats = pump.stats();

    log::info!("Decode thread finished ({exit:?}): {stats}");
    Ok(DecoderThreadResult { exit, stats })
}
