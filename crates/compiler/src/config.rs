//! Compiler configuration: the knobs an external driver or project file can
//! set without this crate needing to change, mirroring the teacher's
//! `config.rs` (`CompilerConfig`, `OptimizationLevel`) generalized to this
//! compiler's own extension points.

use std::path::{Path, PathBuf};

use crate::errors::CompileError;

/// Placeholder for an external driver to thread a flag through; codegen
/// always emits `-O0`-shaped IR regardless of this setting (see Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationLevel {
    #[default]
    O0,
    O1,
    O2,
    O3,
}

impl OptimizationLevel {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "O0" | "0" => Some(OptimizationLevel::O0),
            "O1" | "1" => Some(OptimizationLevel::O1),
            "O2" | "2" => Some(OptimizationLevel::O2),
            "O3" | "3" => Some(OptimizationLevel::O3),
            _ => None,
        }
    }
}

/// Compiler configuration, built up via the `with_*` methods or loaded from
/// a project's `chroma.toml` and then overridden by explicit CLI flags —
/// the same override precedence the teacher's `LintConfig::merge` uses.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    pub optimization_level: OptimizationLevel,
    pub import_search_roots: Vec<PathBuf>,
    pub json_diagnostics: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_optimization_level(mut self, level: OptimizationLevel) -> Self {
        self.optimization_level = level;
        self
    }

    pub fn with_import_search_roots(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.import_search_roots.extend(roots);
        self
    }

    pub fn with_json_diagnostics(mut self, enabled: bool) -> Self {
        self.json_diagnostics = enabled;
        self
    }

    /// Loads `chroma.toml` from `project_dir`, if present, as a base layer
    /// for `merge` to apply explicit overrides on top of. Returns the default
    /// configuration (not an error) when no such file exists — a project
    /// config is optional.
    pub fn load_project_config(project_dir: &Path) -> Result<Self, CompileError> {
        let path = project_dir.join("chroma.toml");
        if !path.exists() {
            return Ok(CompilerConfig::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| CompileError::Io {
            path: path.clone(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self, CompileError> {
        let table: ProjectConfigFile = toml::from_str(content)
            .map_err(|e| CompileError::Config(format!("invalid chroma.toml: {}", e)))?;
        let mut config = CompilerConfig::default();
        if let Some(level) = table.optimization_level.as_deref() {
            config.optimization_level = OptimizationLevel::from_str(level)
                .ok_or_else(|| CompileError::Config(format!("unknown optimization level '{}'", level)))?;
        }
        if let Some(roots) = table.import_search_roots {
            config.import_search_roots = roots.into_iter().map(PathBuf::from).collect();
        }
        if let Some(json) = table.json_diagnostics {
            config.json_diagnostics = json;
        }
        Ok(config)
    }

    /// Applies `overrides` on top of `self`, keeping `self`'s values where
    /// `overrides` left a field at its default. Mirrors the teacher's
    /// `LintConfig::merge` (project file as the base layer, explicit flags
    /// win).
    pub fn merge(mut self, overrides: CompilerConfig) -> Self {
        if overrides.optimization_level != OptimizationLevel::default() {
            self.optimization_level = overrides.optimization_level;
        }
        if !overrides.import_search_roots.is_empty() {
            self.import_search_roots = overrides.import_search_roots;
        }
        if overrides.json_diagnostics {
            self.json_diagnostics = true;
        }
        self
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct ProjectConfigFile {
    optimization_level: Option<String>,
    import_search_roots: Option<Vec<String>>,
    json_diagnostics: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_o0_and_human_readable_diagnostics() {
        let config = CompilerConfig::default();
        assert_eq!(config.optimization_level, OptimizationLevel::O0);
        assert!(!config.json_diagnostics);
    }

    #[test]
    fn from_toml_parses_every_field() {
        let config = CompilerConfig::from_toml(
            "optimization_level = \"O2\"\nimport_search_roots = [\"vendor\"]\njson_diagnostics = true\n",
        )
        .unwrap();
        assert_eq!(config.optimization_level, OptimizationLevel::O2);
        assert_eq!(config.import_search_roots, vec![PathBuf::from("vendor")]);
        assert!(config.json_diagnostics);
    }

    #[test]
    fn merge_prefers_explicit_overrides_over_project_defaults() {
        let base = CompilerConfig::from_toml("optimization_level = \"O2\"\n").unwrap();
        let overrides = CompilerConfig::new().with_json_diagnostics(true);
        let merged = base.merge(overrides);
        assert_eq!(merged.optimization_level, OptimizationLevel::O2);
        assert!(merged.json_diagnostics);
    }

    #[test]
    fn missing_project_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompilerConfig::load_project_config(dir.path()).unwrap();
        assert_eq!(config.optimization_level, OptimizationLevel::O0);
    }
}
