use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vdec::utils::config::PipelineConfig;

use crate::cli::command::{Cli, DecodeArgs};

/// Pipeline options as written in a `--config` YAML file.
///
/// Every key is optional; absent keys keep the library defaults.
#[derive(Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workaround_bugs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_resilience: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grayscale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hurry_up: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_rendering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pp_quality: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pp_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("cannot open config file {}", path.display()))?;
        serde_yaml_ng::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(value) = self.workaround_bugs {
            config.set_workaround_bugs(value);
        }
        if let Some(value) = self.error_resilience {
            config.set_error_resilience(value);
        }
        if let Some(value) = self.grayscale {
            config.grayscale = value;
        }
        if let Some(value) = self.hurry_up {
            config.hurry_up = value;
        }
        if let Some(value) = self.direct_rendering {
            config.direct_rendering = value;
        }
        if let Some(value) = self.pp_quality {
            config.set_pp_quality(value);
        }
        if let Some(name) = &self.pp_name {
            config.pp_name = Some(name.clone());
        }
        if let Some(size) = self.pool_size {
            config.pool_size = size.max(1);
        }
    }

    fn from_config(config: &PipelineConfig) -> Self {
        Self {
            workaround_bugs: Some(config.workaround_bugs.into()),
            error_resilience: Some(config.error_resilience.into()),
            grayscale: Some(config.grayscale),
            hurry_up: Some(config.hurry_up),
            direct_rendering: Some(config.direct_rendering),
            pp_quality: Some(config.pp_quality.into()),
            pp_name: config.pp_name.clone(),
            pool_size: Some(config.pool_size),
        }
    }
}

/// Library defaults, then the config file, then command-line flags.
pub fn resolve(args: &DecodeArgs, cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig {
        fail_level: cli.fail_level(),
        ..Default::default()
    };

    if let Some(path) = &args.config {
        FileConfig::load(path)?.apply(&mut config);
    }

    // Switch flags can only turn an option on.
    config.hurry_up |= args.hurry_up;
    config.direct_rendering |= args.direct_rendering;
    config.grayscale |= args.grayscale;
    if let Some(quality) = args.pp_quality {
        config.set_pp_quality(quality.into());
    }
    if let Some(name) = &args.pp_name {
        config.pp_name = Some(name.clone());
    }

    if log::log_enabled!(log::Level::Debug) {
        let effective = serde_yaml_ng::to_string(&FileConfig::from_config(&config))?;
        log::debug!("effective pipeline options:\n{effective}");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_keys_map_onto_pipeline_options() -> Result<()> {
        let file: FileConfig = serde_yaml_ng::from_str(
            "hurry-up: true\nworkaround-bugs: 400\npp-quality: 3\npp-name: luma\npool-size: 0\n",
        )?;

        let mut config = PipelineConfig::default();
        file.apply(&mut config);

        assert!(config.hurry_up);
        assert!(!config.direct_rendering);
        assert_eq!(config.workaround_bugs, 99);
        assert_eq!(config.pp_quality, 3);
        assert_eq!(config.pp_mode_name(), "luma");
        assert_eq!(config.pool_size, 1);
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_yaml_ng::from_str::<FileConfig>("hurry_up: true\n").is_err());
    }

    #[test]
    fn empty_document_keeps_defaults() -> Result<()> {
        let file: FileConfig = serde_yaml_ng::from_str("{}")?;
        assert_eq!(file, FileConfig::default());
        assert!(serde_yaml_ng::to_string(&file)?.trim() == "{}");
        Ok(())
    }
}
