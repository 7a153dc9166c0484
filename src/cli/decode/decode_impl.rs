use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use vdec::utils::buffer_pool::{CancelToken, FrameBufferPool};
use vdec::utils::timing::{Clock, DEFAULT_PTS_DELAY, SystemClock};

use super::decoder_thread::{DecoderThreadConfig, DecoderThreadResult, spawn_decoder_thread};
use super::output::VideoWriter;
use super::progress::{create_progress_bar, estimate_total_packets};
use crate::cli::command::{Cli, DecodeArgs, VideoFormat as OutputFormat};
use crate::config::resolve;
use crate::container::VpkReader;
use crate::input::InputReader;
use crate::timestamp::time_str;

/// How long the renderer waits on the display queue before checking for shutdown.
const RENDER_POLL: Duration = Duration::from_millis(20);

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Decoding video stream: {} (strict mode: {}, realtime: {})",
        args.input.display(),
        cli.strict,
        args.realtime
    );

    let config = resolve(args, cli)?;

    let clock = Arc::new(SystemClock::new());
    let input = InputReader::new(&args.input)?;
    let is_pipe = input.is_pipe();
    let reader = VpkReader::new(input)?.rebase(clock.now() + DEFAULT_PTS_DELAY);
    let header = *reader.header();

    log::info!(
        "Stream: {} {}x{} @ {}/{} fps",
        header.codec_name(),
        header.width,
        header.height,
        header.fps_num,
        header.fps_den
    );

    if args.output_path.is_none() && args.format != OutputFormat::Null {
        log::info!("No output path given, pictures are rendered but not written");
    }
    let mut writer = VideoWriter::create(
        args.output_path.as_deref(),
        args.format,
        header.frame_rate(),
    )?;

    let should_estimate = !args.no_estimate_progress && !is_pipe && multi.is_some();
    let total_packets = if should_estimate {
        Some(estimate_total_packets(&args.input)?)
    } else {
        if is_pipe {
            log::debug!("Skipping progress estimation for pipe input");
        } else if args.no_estimate_progress {
            log::debug!("Progress estimation disabled by --no-estimate-progress flag");
        }
        None
    };

    let pb = if let Some(multi) = multi {
        Some(create_progress_bar(multi, total_packets)?)
    } else {
        None
    };

    let pool = Arc::new(FrameBufferPool::new(config.pool_size).with_fail_level(config.fail_level));
    let cancel = CancelToken::new();

    let decode_thread = spawn_decoder_thread(DecoderThreadConfig {
        reader,
        pool: pool.clone(),
        clock: clock.clone(),
        cancel: cancel.clone(),
        config,
        pb_clone: pb.clone(),
    });

    let start_time = Instant::now();
    let mut renderer = Renderer {
        pool: &pool,
        clock: clock.as_ref(),
        realtime: args.realtime,
        pb: &pb,
        rendered: 0,
        late: 0,
        last_pts: None,
        first_pts: None,
        may_modify: None,
    };

    let render_result = renderer.run(&mut writer);
    if render_result.is_err() {
        cancel.cancel();
        pool.close();
    }

    let decode_result = match decode_thread.join() {
        Ok(result) => result,
        Err(_) => {
            if let Some(pb) = &pb {
                pb.finish_with_message("decode thread panicked");
            }
            return Err(anyhow::anyhow!("Decode thread panicked"));
        }
    };

    if let Err(e) = render_result {
        if let Some(pb) = &pb {
            pb.finish_with_message("render failed");
        }
        return Err(e);
    }

    match decode_result {
        Ok(DecoderThreadResult { exit, stats }) => {
            writer.finish()?;
            finalize_progress_bar(&pb, total_packets, &renderer, start_time);
            log::info!(
                "Decoding completed ({exit:?}): {stats}; {} pictures rendered, {} behind schedule",
                renderer.rendered,
                renderer.late
            );
            Ok(())
        }
        Err(e) => {
            if let Some(pb) = &pb {
                pb.finish_with_message("decode failed");
            }
            Err(e)
        }
    }
}

/// Display side of the pipeline, running on the calling thread.
struct Renderer<'a> {
    pool: &'a FrameBufferPool,
    clock: &'a dyn Clock,
    realtime: bool,
    pb: &'a Option<ProgressBar>,
    rendered: u64,
    late: u64,
    first_pts: Option<i64>,
    last_pts: Option<i64>,
    /// Whether the pool let the renderer touch pictures in place, read on
    /// the first picture. Pictures are only ever read here.
    may_modify: Option<bool>,
}

impl Renderer<'_> {
    fn run<W: Write>(&mut self, writer: &mut VideoWriter<W>) -> Result<()> {
        loop {
            let Some(shown) = self.pool.next_displayable(RENDER_POLL) else {
                if self.pool.is_drained() {
                    return Ok(());
                }
                continue;
            };

            if self.may_modify.is_none() {
                let allowed = self.pool.allows_modify();
                log::debug!(
                    "renderer {} modify pictures in place",
                    if allowed { "may" } else { "must not" }
                );
                self.may_modify = Some(allowed);
            }

            if self.realtime {
                self.wait_until(shown.pts);
            }

            let written = {
                let planes = shown.picture.planes();
                writer.write_picture(shown.picture.format(), &planes)
            };
            self.pool.displayed(&shown.picture)?;
            written?;

            self.rendered += 1;
            self.first_pts.get_or_insert(shown.pts);
            self.last_pts = Some(shown.pts);

            if let (Some(pb), true) = (self.pb, self.rendered % 25 == 0) {
                pb.set_message(format!(
                    "rendered: {} | timestamp: {}",
                    self.rendered,
                    time_str(self.media_time())
                ));
            }
        }
    }

    fn wait_until(&mut self, pts: i64) {
        let wait = pts - self.clock.now();
        if wait > 0 {
            thread::sleep(Duration::from_micros(wait as u64));
        } else if wait < 0 {
            log::trace!("picture at {pts} shown {}us late", -wait);
            self.late += 1;
        }
    }

    fn media_time(&self) -> i64 {
        match (self.first_pts, self.last_pts) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }
}

fn finalize_progress_bar(
    pb: &Option<ProgressBar>,
    total_packets: Option<u64>,
    renderer: &Renderer<'_>,
    start_time: Instant,
) {
    if let Some(pb) = pb {
        let elapsed = start_time.elapsed();
        let media_secs = renderer.media_time() as f64 / 1_000_000.0;
        let realtime_multiplier = media_secs / elapsed.as_secs_f64().max(f64::EPSILON);
        let final_time_str = time_str(renderer.media_time());

        if total_packets.is_some() {
            pb.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {pos}/{len} packets ({percent}%)\n{msg} | elapsed: {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
        } else {
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {pos} packets\n{msg} | elapsed: {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
        }

        pb.finish_with_message(format!(
            "rendered: {} | speed: {realtime_multiplier:.1}x | timestamp: {final_time_str}",
            renderer.rendered
        ));
    }
}
