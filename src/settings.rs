//! Loading and saving of the patcher's options.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// The directory that modification files are loaded from.
    pub mods_dir: PathBuf,

    /// The extension of the resources that hold spell documents.
    pub spell_extension: String,

    /// Whether spells are patched as soon as the game loads them.
    pub apply_on_load: bool,

    /// The most verbose level that will be logged (`off`, `error`, `warn`, `info`, `debug` or
    /// `trace`).
    pub log_level: String,

    /// A JSON schema to use instead of the built-in property table.
    pub schema_path: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            mods_dir: PathBuf::from("mods"),
            spell_extension: "spl".to_string(),
            apply_on_load: true,
            log_level: "info".to_string(),
            schema_path: None,
        }
    }
}

impl Options {
    fn parse_json(reader: impl Read) -> Result<Options> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Loads options from `path`. If there is no file there, the defaults are returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Options> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("No options file at {}. Defaults will be used.", path.display());
            return Ok(Options::default());
        }

        let file = File::open(path)
            .wrap_err_with(|| format!("failed to open options file {}", path.display()))?;

        Options::parse_json(file)
            .wrap_err_with(|| format!("failed to parse options file {}", path.display()))
    }

    /// Loads options from `path`, falling back to the defaults if anything goes wrong.
    pub fn load_or_default(path: impl AsRef<Path>) -> Options {
        match Options::load(path) {
            Ok(options) => options,
            Err(err) => {
                log::error!("Error loading options: {err:?}. Defaults will be used.");
                Options::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .wrap_err_with(|| format!("failed to write options to {}", path.display()))?;

        log::info!("Options saved.");
        Ok(())
    }

    /// Returns the configured log level, or `Info` if it isn't a level name.
    pub fn level_filter(&self) -> log::LevelFilter {
        log::LevelFilter::from_str(&self.log_level).unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}'; using 'info'.", self.log_level);
            log::LevelFilter::Info
        })
    }
}
