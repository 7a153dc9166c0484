use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use vdec::codec::raw::{RAW_FOURCC, RawVideoDecoder};
use vdec::codec::{SkipHint, VideoDecoder};
use vdec::process::assemble::BitstreamAssembler;
use vdec::structs::format::PixelFormat;
use vdec::utils::config::PipelineConfig;

use super::command::{Cli, InfoArgs};
use crate::container::{VideoHeader, VpkReader};
use crate::input::InputReader;
use crate::timestamp::time_str;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing video stream: {}", args.input.display());

    let mut reader = VpkReader::new(InputReader::new(&args.input)?)?;
    let header = *reader.header();

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Analyzing packets...");
            Some(pb)
        }
        None => None,
    };

    let mut analysis = StreamAnalysis::new(&header, cli)?;
    while let Some(packet) = reader.next_chunk()? {
        analysis.push_packet(packet.pts(), &packet.payload)?;

        if let Some(pb) = &pb {
            if analysis.packets.is_multiple_of(100) {
                pb.set_message(format!("Analyzing packets...       {}", analysis.packets));
            }
        }
    }
    analysis.finish();

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    analysis.display(&header);
    Ok(())
}

/// Packet and picture statistics of one stream.
struct StreamAnalysis {
    /// Header-only decoder, when the codec is known.
    decoder: Option<RawVideoDecoder>,
    assembler: BitstreamAssembler,
    strict: bool,
    packets: u64,
    bytes: u64,
    pictures: u64,
    decode_errors: u64,
    untimed_packets: u64,
    first_pts: Option<i64>,
    last_pts: Option<i64>,
    pix_fmt: Option<PixelFormat>,
    picture_size: Option<(u32, u32)>,
}

impl StreamAnalysis {
    fn new(header: &VideoHeader, cli: &Cli) -> Result<Self> {
        let decoder = if header.codec == RAW_FOURCC {
            let config = PipelineConfig {
                fail_level: cli.fail_level(),
                ..Default::default()
            };
            let mut params = config.codec_parameters(
                header.width.into(),
                header.height.into(),
                header.frame_rate(),
                header.extradata(),
            );
            params.truncated = true;

            let mut decoder = RawVideoDecoder::new();
            decoder.open(&params)?;
            decoder.set_skip(SkipHint::HeadersOnly);
            Some(decoder)
        } else {
            log::warn!(
                "No decoder for codec {:?}, only packets are counted",
                header.codec_name()
            );
            None
        };

        Ok(Self {
            decoder,
            assembler: BitstreamAssembler::new(),
            strict: cli.strict,
            packets: 0,
            bytes: 0,
            pictures: 0,
            decode_errors: 0,
            untimed_packets: 0,
            first_pts: None,
            last_pts: None,
            pix_fmt: None,
            picture_size: None,
        })
    }

    fn push_packet(&mut self, pts: Option<i64>, payload: &[u8]) -> Result<()> {
        self.packets += 1;
        self.bytes += payload.len() as u64;

        match pts {
            Some(pts) => {
                self.first_pts.get_or_insert(pts);
                self.last_pts = Some(pts);
            }
            None => self.untimed_packets += 1,
        }

        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };

        self.assembler.append(payload);
        while !self.assembler.is_empty() {
            match decoder.decode(self.assembler.input(), None) {
                Ok(output) if output.consumed > 0 => {
                    self.pictures += 1;
                    self.assembler.consume(output.consumed)?;
                }
                Ok(_) => break,
                Err(e) => {
                    if self.strict {
                        return Err(e.into());
                    }
                    log::warn!("Cannot parse picture in packet {}: {e}", self.packets);
                    self.decode_errors += 1;
                    self.assembler.clear();
                }
            }
        }

        let context = decoder.context();
        if context.has_picture_size() {
            self.picture_size = Some((context.width, context.height));
        }
        self.pix_fmt = context.pix_fmt.or(self.pix_fmt);
        Ok(())
    }

    fn finish(&mut self) {
        if !self.assembler.is_empty() {
            log::warn!(
                "{} trailing bytes do not form a complete picture",
                self.assembler.len()
            );
        }
    }

    fn display(&self, header: &VideoHeader) {
        println!();
        println!("Video Stream Information");
        println!("========================");
        println!();
        println!("Codec                       {}", header.codec_name());
        println!(
            "Container picture size      {}x{}",
            header.width, header.height
        );

        let rate = header.frame_rate();
        if rate.is_known() {
            println!(
                "Frame rate                  {}/{} ({:.3} fps)",
                rate.num,
                rate.den,
                rate.num as f64 / rate.den as f64
            );
        } else {
            println!("Frame rate                  unknown");
        }

        if self.decoder.is_some() {
            match self.picture_size {
                Some((width, height)) => {
                    println!("Coded picture size          {width}x{height}")
                }
                None => println!("Coded picture size          unknown"),
            }
            match self.pix_fmt {
                Some(format) => println!("Pixel format                {format}"),
                None => println!("Pixel format                unknown"),
            }
        }

        println!();
        println!("Packets                     {}", self.packets);
        println!("Payload bytes               {}", self.bytes);
        if self.packets > 0 {
            println!(
                "Average packet size         {:.1} bytes",
                self.bytes as f64 / self.packets as f64
            );
        }
        println!("Packets without timestamp   {}", self.untimed_packets);

        if self.decoder.is_some() {
            println!("Pictures                    {}", self.pictures);
            if self.decode_errors > 0 {
                println!("Unparseable packets         {}", self.decode_errors);
            }
        }

        if let (Some(first), Some(last)) = (self.first_pts, self.last_pts) {
            println!();
            println!("First timestamp             {}", time_str(first));
            println!("Last timestamp              {}", time_str(last));
            println!("Duration                    {}", time_str(last - first));
        }
        println!();
    }
}
