//! Long-lived data shared by the engine and its systems.
//!
//! Overview
//! - `scenedata` – keyed values and flags stored on each scene
//! - `simconfig` – simulation settings loaded from an INI file
//! - `simtime` – simulation clock, frame and fixed-step counters
pub mod scenedata;
pub mod simconfig;
pub mod simtime;
