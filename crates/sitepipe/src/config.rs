//! Configuration file (sitepipe.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use sitepipe_tasks::paths::DEFAULT_DATA_FILE;
use sitepipe_tasks::{Category, PathSpec, PathTable, PipelineConfig};

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct PathsConfig {
    pub build: Option<String>,
    pub data: Option<String>,
    pub styles: Option<EntryConfig>,
    pub markup: Option<EntryConfig>,
    pub scripts: Option<EntryConfig>,
    pub images: Option<EntryConfig>,
    pub fonts: Option<EntryConfig>,
}

impl PathsConfig {
    fn entry(&self, category: Category) -> Option<&EntryConfig> {
        match category {
            Category::Styles => self.styles.as_ref(),
            Category::Markup => self.markup.as_ref(),
            Category::Scripts => self.scripts.as_ref(),
            Category::Images => self.images.as_ref(),
            Category::Fonts => self.fonts.as_ref(),
        }
    }
}

/// Overrides for one category; unset fields keep their defaults.
#[derive(Debug, Deserialize, Default)]
pub struct EntryConfig {
    pub source: Option<String>,
    pub dest: Option<String>,
    pub watch: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct StylesConfig {
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            browsers: default_browsers(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default = "default_script_target")]
    pub target: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            target: default_script_target(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_open")]
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: default_open(),
        }
    }
}

fn default_browsers() -> Vec<String> {
    sitepipe_tasks::pipeline::DEFAULT_BROWSERS
        .iter()
        .map(|q| q.to_string())
        .collect()
}
fn default_script_target() -> String {
    sitepipe_tasks::pipeline::DEFAULT_SCRIPT_TARGET.to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_open() -> bool {
    true
}

/// Loaded configuration plus the project root it applies to.
#[derive(Debug)]
pub struct Config {
    pub root: PathBuf,
    pub file: ConfigFile,
}

impl Config {
    /// Load `path` if it exists. Returns an error if it exists but is malformed.
    ///
    /// The project root is the directory containing the config file.
    pub fn load(path: &Path) -> Result<Self> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let root = fs::canonicalize(dir)
            .with_context(|| format!("Failed to resolve project root {}", dir.display()))?;

        let file = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file = parse(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            tracing::info!("Loaded config from {}", path.display());
            file
        } else {
            ConfigFile::default()
        };

        Ok(Self { root, file })
    }

    /// Path table settings with file overrides applied.
    pub fn path_spec(&self) -> PathSpec {
        let mut spec = PathSpec::default();
        let paths = &self.file.paths;

        if let Some(build) = &paths.build {
            spec.build = build.clone();
        }
        if let Some(data) = &paths.data {
            // Markup reruns when the data file changes
            for watch in &mut spec.entry_mut(Category::Markup).watch {
                if *watch == DEFAULT_DATA_FILE {
                    *watch = data.clone();
                }
            }
            spec.data = data.clone();
        }

        for category in Category::ALL {
            let Some(overrides) = paths.entry(category) else {
                continue;
            };
            let entry = spec.entry_mut(category);
            if let Some(source) = &overrides.source {
                entry.source = source.clone();
            }
            if let Some(dest) = &overrides.dest {
                entry.dest = dest.clone();
            }
            if let Some(watch) = &overrides.watch {
                entry.watch = watch.clone();
            }
        }

        spec
    }

    /// Pipeline settings for this project.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let paths = PathTable::new(&self.root, &self.path_spec()).context("Invalid [paths]")?;

        Ok(PipelineConfig {
            paths,
            browsers: self.file.styles.browsers.clone(),
            script_target: self.file.scripts.target.clone(),
        })
    }
}

fn parse(content: &str) -> Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}
