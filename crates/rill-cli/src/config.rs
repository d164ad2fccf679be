//! Optional TOML config file for CLI defaults (SPEC_FULL.md §10.3), following
//! the builder-ish config struct pattern used by the compiler-config example
//! in the broader example pack, scaled down to the handful of knobs a
//! command-line interpreter actually needs.

use std::path::Path;

use rill::resource::ResourceLimits;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub gc_steps_per_instruction: Option<usize>,
    pub max_call_depth: Option<usize>,
    pub max_heap_objects: Option<usize>,
    #[serde(default)]
    pub debug: DebugDefaults,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebugDefaults {
    pub print_ast: bool,
    pub print_symbols: bool,
    pub print_constants: bool,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))
    }

    pub fn resource_limits(&self) -> ResourceLimits {
        let defaults = ResourceLimits::default();
        ResourceLimits {
            max_call_depth: self.max_call_depth.unwrap_or(defaults.max_call_depth),
            max_heap_objects: self.max_heap_objects.unwrap_or(defaults.max_heap_objects),
            gc_steps_per_instruction: self.gc_steps_per_instruction.unwrap_or(defaults.gc_steps_per_instruction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_resource_limits_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.resource_limits(), ResourceLimits::default());
    }

    #[test]
    fn parses_a_partial_table() {
        let config: CliConfig = toml::from_str("gc_steps_per_instruction = 16\n[debug]\nprint_ast = true\n").unwrap();
        assert_eq!(config.gc_steps_per_instruction, Some(16));
        assert!(config.debug.print_ast);
        assert!(!config.debug.print_symbols);
    }
}
