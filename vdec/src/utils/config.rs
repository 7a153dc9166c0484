//! Decoder pipeline options.
//!
//! Values are clamped on the way in so that every consumer sees the same
//! ranges regardless of where the configuration came from.

use log::Level;

use crate::codec::CodecParameters;
use crate::structs::format::FrameRate;

pub const DEFAULT_PP_NAME: &str = "default";
pub const DEFAULT_POOL_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Decoder leniency towards known encoder bugs, 0..=99.
    pub workaround_bugs: u8,
    /// Decoder error concealment strength, -1..=99.
    pub error_resilience: i8,
    pub grayscale: bool,
    /// Enables lateness-driven degradation.
    pub hurry_up: bool,
    /// Requests zero-copy decoding into renderer buffers.
    pub direct_rendering: bool,
    /// Post-processing quality; 0 disables post-processing.
    pub pp_quality: u8,
    pub pp_name: Option<String>,
    /// Validation severity at which the pipeline fails instead of logging.
    pub fail_level: Level,
    /// Number of picture buffers the renderer keeps.
    pub pool_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workaround_bugs: 1,
            error_resilience: -1,
            grayscale: false,
            hurry_up: false,
            direct_rendering: false,
            pp_quality: 0,
            pp_name: None,
            fail_level: Level::Error,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn set_workaround_bugs(&mut self, value: i64) {
        self.workaround_bugs = value.clamp(0, 99) as u8;
    }

    pub fn set_error_resilience(&mut self, value: i64) {
        self.error_resilience = value.clamp(-1, 99) as i8;
    }

    pub fn set_pp_quality(&mut self, value: i64) {
        self.pp_quality = value.clamp(0, u8::MAX as i64) as u8;
    }

    /// Post-processing mode name, `"default"` when unset or empty.
    pub fn pp_mode_name(&self) -> &str {
        match self.pp_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_PP_NAME,
        }
    }

    pub fn post_processing_requested(&self) -> bool {
        self.pp_quality > 0
    }

    /// Codec open parameters for a stream of the given size and rate.
    pub fn codec_parameters(
        &self,
        width: u32,
        height: u32,
        frame_rate: FrameRate,
        extradata: Option<Vec<u8>>,
    ) -> CodecParameters {
        CodecParameters {
            width,
            height,
            frame_rate,
            extradata,
            workaround_bugs: self.workaround_bugs,
            error_resilience: self.error_resilience,
            grayscale: self.grayscale,
            truncated: false,
            fail_level: self.fail_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_clamped() {
        let mut config = PipelineConfig::default();

        config.set_workaround_bugs(250);
        assert_eq!(config.workaround_bugs, 99);
        config.set_workaround_bugs(-3);
        assert_eq!(config.workaround_bugs, 0);

        config.set_error_resilience(-20);
        assert_eq!(config.error_resilience, -1);
        config.set_error_resilience(120);
        assert_eq!(config.error_resilience, 99);
    }

    #[test]
    fn empty_pp_name_means_default() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.pp_mode_name(), "default");

        config.pp_name = Some(String::new());
        assert_eq!(config.pp_mode_name(), "default");

        config.pp_name = Some("deblock".into());
        assert_eq!(config.pp_mode_name(), "deblock");
    }
}
