//! Simulation configuration resource.
//!
//! Manages tick-rate and physics settings loaded from an INI configuration
//! file. Provides defaults for safe startup and methods to load/save
//! configuration.
//!
//! # Configuration File Format
//!
//! ```ini
//! [simulation]
//! fixed_rate = 60
//! max_fixed_steps = 5
//! time_scale = 1.0
//!
//! [physics]
//! enabled = true
//! integrate_velocity = true
//! ```

use configparser::ini::Ini;
use log::info;
use std::path::PathBuf;

use crate::error::SetupError;

/// Default safe values for startup
const DEFAULT_FIXED_RATE: u32 = 60;
const DEFAULT_MAX_FIXED_STEPS: u32 = 5;
const DEFAULT_TIME_SCALE: f32 = 1.0;
const DEFAULT_PHYSICS_ENABLED: bool = true;
const DEFAULT_INTEGRATE_VELOCITY: bool = true;
const DEFAULT_CONFIG_PATH: &str = "./config.ini";

/// Simulation configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Fixed updates per simulated second.
    pub fixed_rate: u32,
    /// Cap on fixed updates run in one frame; surplus lag is dropped.
    pub max_fixed_steps: u32,
    /// Multiplier applied to wall-clock frame time.
    pub time_scale: f32,
    /// Run collision detection and resolution.
    pub physics_enabled: bool,
    /// Integrate rigid body velocity into transforms before detection.
    pub integrate_velocity: bool,
    /// Path to the configuration file.
    pub config_path: PathBuf,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SimConfig {
    /// Create a new configuration with safe default values.
    pub fn new() -> Self {
        Self {
            fixed_rate: DEFAULT_FIXED_RATE,
            max_fixed_steps: DEFAULT_MAX_FIXED_STEPS,
            time_scale: DEFAULT_TIME_SCALE,
            physics_enabled: DEFAULT_PHYSICS_ENABLED,
            integrate_velocity: DEFAULT_INTEGRATE_VELOCITY,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Create a new configuration with a custom config file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            ..Self::new()
        }
    }

    /// Seconds per fixed update.
    pub fn fixed_delta(&self) -> f32 {
        1.0 / self.fixed_rate.max(1) as f32
    }

    /// Load configuration from the INI file.
    ///
    /// Missing values retain their current (default) values.
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(&mut self) -> Result<(), SetupError> {
        let mut config = Ini::new();
        config
            .load(&self.config_path)
            .map_err(|e| SetupError::Config(format!("Failed to load config file: {}", e)))?;

        // [simulation] section
        if let Some(rate) = read_u32(&config, "simulation", "fixed_rate")? {
            if rate == 0 {
                return Err(SetupError::Config(
                    "simulation.fixed_rate must be positive".to_string(),
                ));
            }
            self.fixed_rate = rate;
        }
        if let Some(steps) = read_u32(&config, "simulation", "max_fixed_steps")? {
            self.max_fixed_steps = steps;
        }
        if let Some(scale) = config.getfloat("simulation", "time_scale").ok().flatten() {
            self.time_scale = scale as f32;
        }

        // [physics] section
        if let Some(enabled) = config.getbool("physics", "enabled").ok().flatten() {
            self.physics_enabled = enabled;
        }
        if let Some(integrate) = config
            .getbool("physics", "integrate_velocity")
            .ok()
            .flatten()
        {
            self.integrate_velocity = integrate;
        }

        info!(
            "Loaded config: fixed_rate={}, max_fixed_steps={}, time_scale={}, physics={}, integrate_velocity={}",
            self.fixed_rate,
            self.max_fixed_steps,
            self.time_scale,
            self.physics_enabled,
            self.integrate_velocity
        );

        Ok(())
    }

    /// Save configuration to the INI file.
    ///
    /// Creates the file if it doesn't exist.
    pub fn save_to_file(&self) -> Result<(), SetupError> {
        let mut config = Ini::new();

        // [simulation] section
        config.set("simulation", "fixed_rate", Some(self.fixed_rate.to_string()));
        config.set(
            "simulation",
            "max_fixed_steps",
            Some(self.max_fixed_steps.to_string()),
        );
        config.set("simulation", "time_scale", Some(self.time_scale.to_string()));

        // [physics] section
        config.set("physics", "enabled", Some(self.physics_enabled.to_string()));
        config.set(
            "physics",
            "integrate_velocity",
            Some(self.integrate_velocity.to_string()),
        );

        config
            .write(&self.config_path)
            .map_err(|e| SetupError::Config(format!("Failed to save config file: {}", e)))?;

        info!("Saved config to {:?}", self.config_path);

        Ok(())
    }
}

/// Unsigned INI value that must fit in a `u32`. Unparseable values are
/// ignored like any other malformed entry; values that parse but overflow are
/// rejected.
fn read_u32(config: &Ini, section: &str, key: &str) -> Result<Option<u32>, SetupError> {
    let Some(value) = config.getuint(section, key).ok().flatten() else {
        return Ok(None);
    };
    u32::try_from(value)
        .map(Some)
        .map_err(|_| SetupError::Config(format!("{}.{} out of range: {}", section, key, value)))
}
