use std::path::Path;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use vdec::process::pump::PacketSource;
use vdec::structs::packet::InputPacket;
use vdec::utils::errors::SourceError;

use crate::container::VpkReader;
use crate::input::InputReader;

pub fn estimate_total_packets(input_path: &Path) -> Result<u64> {
    log::info!("Counting packets for progress estimation");
    let count_start = std::time::Instant::now();

    let mut reader = VpkReader::new(InputReader::new(input_path)?)?;
    let mut bytes_read = 0u64;
    while let Some(packet) = reader.next_chunk()? {
        bytes_read += packet.payload.len() as u64;
    }

    let count_elapsed = count_start.elapsed();
    let read_speed_mbps = if count_elapsed.as_secs_f64() > 0.0 {
        (bytes_read as f64) / 1_000_000.0 / count_elapsed.as_secs_f64()
    } else {
        0.0
    };

    log::info!(
        "Found {} packets in {:.3}s ({:.1} MB/s, {} bytes)",
        reader.packets(),
        count_elapsed.as_secs_f64(),
        read_speed_mbps,
        bytes_read
    );

    Ok(reader.packets())
}

pub fn create_progress_bar(
    multi: &MultiProgress,
    total_packets: Option<u64>,
) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_packets {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} packets ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);

        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} packets\n{msg} | elapsed: {elapsed_precise}",
        )?);

        pb
    };
    pb.set_message("opening decoder");
    Ok(pb)
}

/// Packet source that advances a progress bar for every packet handed out.
pub struct ProgressSource<S> {
    inner: S,
    pb: Option<ProgressBar>,
}

impl<S: PacketSource> ProgressSource<S> {
    pub fn new(inner: S, pb: Option<ProgressBar>) -> Self {
        Self { inner, pb }
    }
}

impl<S: PacketSource> PacketSource for ProgressSource<S> {
    fn next_packet(&mut self) -> Result<Option<InputPacket>, SourceError> {
        let packet = self.inner.next_packet()?;
        if let (Some(pb), Some(_)) = (&self.pb, &packet) {
            pb.inc(1);
        }
        Ok(packet)
    }
}
