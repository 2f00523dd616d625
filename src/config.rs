use std::env;

use crate::error::ConfigError;

/// Region size used when nothing else is configured: 64 KiB.
pub const DEFAULT_REGION_SIZE: usize = 64 * 1024;

/// Environment variable that overrides [`Config::region_size`].
pub const REGION_SIZE_VAR: &str = "NEXTFIT_REGION_SIZE";

/// Settings of the `nextfit` binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Bytes requested for the heap region. The platform rounds this up to
    /// whole pages.
    pub region_size: usize,
}

impl Config {
    /// Default configuration, a region of [`DEFAULT_REGION_SIZE`] bytes.
    pub const fn with_default_config() -> Self {
        Self::with_region_size(DEFAULT_REGION_SIZE)
    }

    /// Builds a configuration with the given region size.
    pub const fn with_region_size(region_size: usize) -> Self {
        Self { region_size }
    }

    /// Default configuration overridden by [`REGION_SIZE_VAR`] if it is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_var(env::var(REGION_SIZE_VAR).ok().as_deref())
    }

    fn from_var(value: Option<&str>) -> Result<Self, ConfigError> {
        let Some(value) = value else {
            return Ok(Self::with_default_config());
        };

        match value.trim().parse::<usize>() {
            Ok(size) if size > 0 => Ok(Self::with_region_size(size)),
            _ => Err(ConfigError::InvalidRegionSize {
                var: REGION_SIZE_VAR,
                value: value.to_owned(),
            }),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::with_default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(Config::default().region_size, DEFAULT_REGION_SIZE);
        assert_eq!(Config::from_var(None), Ok(Config::with_default_config()));
    }

    #[test]
    fn override_from_variable() {
        assert_eq!(Config::from_var(Some("4096")), Ok(Config::with_region_size(4096)));
        assert_eq!(Config::from_var(Some(" 128\n")), Ok(Config::with_region_size(128)));
    }

    #[test]
    fn invalid_values() {
        for value in ["", "0", "-1", "64k", "lots"] {
            assert_eq!(
                Config::from_var(Some(value)),
                Err(ConfigError::InvalidRegionSize {
                    var: REGION_SIZE_VAR,
                    value: value.to_owned(),
                })
            );
        }
    }
}
