#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! One decode thread runs the [`process::pump::DecodePump`]; a renderer
//! thread consumes pictures from the shared
//! [`utils::buffer_pool::FrameBufferPool`]. The two sides meet only at the
//! pool, where pictures move through `FREE -> ALLOCATED -> REFERENCED ->
//! RELEASED` and are reused once nobody links them any more.
//!
//! ### Output Modes
//!
//! - **Copy**: the decoder owns its planes; the
//!   [`process::composite::FrameCompositor`] copies, post-processes or
//!   converts them into a pool picture.
//! - **Direct rendering**: the decoder writes straight into pool pictures
//!   obtained through a [`codec::BufferProvider`].
//!
//! ### Lateness
//!
//! - Up to 4 consecutive late frames: normal decoding
//! - 5 to 8: frames are decoded but not drawn
//! - More than 8: non-reference pictures are skipped
//! - 5 seconds late: packets are dropped until one is dated in the future
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::VecDeque;
//! use std::sync::Arc;
//!
//! use vdec::codec::raw::RawVideoDecoder;
//! use vdec::process::pump::{DecodePump, PumpSetup};
//! use vdec::structs::packet::InputPacket;
//! use vdec::utils::buffer_pool::FrameBufferPool;
//! use vdec::utils::config::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! let pool = Arc::new(FrameBufferPool::new(config.pool_size));
//! let packets: VecDeque<InputPacket> = VecDeque::new();
//!
//! let setup = PumpSetup::new(
//!     Box::new(RawVideoDecoder::new()),
//!     Box::new(packets),
//!     pool.clone(),
//!     config,
//! );
//! let mut pump = DecodePump::open(setup)?;
//!
//! // A renderer thread would drain `pool.next_displayable(..)` meanwhile.
//! let exit = pump.run()?;
//! println!("{exit:?}: {}", pump.stats());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Decoder interface and the reference codec.
///
/// - **Decoder trait** ([`codec::VideoDecoder`]): open, decode, flush
/// - **Buffer callbacks** ([`codec::BufferProvider`]): direct rendering
/// - **Raw codec** ([`codec::raw`]): uncompressed pictures
pub mod codec;

/// Pipeline stages.
///
/// 1. **Assembly** ([`process::assemble`]): padded input buffer
/// 2. **Decode loop** ([`process::pump`]): decoding, timing and degradation
/// 3. **Compositing** ([`process::composite`]): copy, filter or convert
pub mod process;

/// Data structures shared by the stages.
///
/// - **Packets** ([`structs::packet`]): demultiplexed input
/// - **Frames** ([`structs::frame`]): decoder output
/// - **Pictures** ([`structs::picture`]): pool-owned buffers
/// - **Formats** ([`structs::format`]): pixel formats, chromas, frame rates
pub mod structs;

/// Supporting infrastructure.
///
/// - **Picture pool** ([`utils::buffer_pool`]): renderer buffers
/// - **Timing** ([`utils::timing`]): clocks and timestamp extrapolation
/// - **Lateness** ([`utils::lateness`]): degradation policy
/// - **Conversion** ([`utils::convert`]): pixel-format conversion
/// - **Post-processing** ([`utils::postproc`]): deblocking
/// - **Configuration** ([`utils::config`]): pipeline options
/// - **Error Handling** ([`utils::errors`]): error types
pub mod utils;
