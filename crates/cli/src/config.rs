//! CLI configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use visreg_engine::{
    BaselineStoreOptions, Browser, CoordinatorOptions, DiffOptions, PlaywrightConfig, Viewport,
    WritePolicy,
};

/// Top-level configuration, usually read from `visreg.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisregConfig {
    /// Root directory of the baseline/current/diff blob store
    pub store_path: PathBuf,

    /// Rendering surface configuration
    pub renderer: RendererConfig,

    /// Default comparison options
    pub diff: DiffOptions,

    /// Baseline storage behaviour
    pub baselines: BaselinesConfig,
}

impl Default for VisregConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("visual-regression"),
            renderer: RendererConfig::default(),
            diff: DiffOptions::default(),
            baselines: BaselinesConfig::default(),
        }
    }
}

/// Playwright renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Page to capture
    pub base_url: String,

    /// Browser engine
    pub browser: Browser,

    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Run the browser without a window
    pub headless: bool,

    /// Selector to wait for before capturing
    pub wait_for_selector: Option<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            browser: Browser::Chromium,
            viewport_width: 1280,
            viewport_height: 720,
            headless: true,
            wait_for_selector: None,
        }
    }
}

impl RendererConfig {
    pub fn playwright(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            url: self.base_url.clone(),
            browser: self.browser,
            headless: self.headless,
            viewport: Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
            },
            wait_for_selector: self.wait_for_selector.clone(),
            ..PlaywrightConfig::default()
        }
    }
}

/// Baseline storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselinesConfig {
    /// Wait for or reject concurrent writes to the same baseline
    pub write_policy: WritePolicy,

    /// Keep the current capture and diff image of every comparison
    pub persist_artifacts: bool,
}

impl Default for BaselinesConfig {
    fn default() -> Self {
        Self {
            write_policy: WritePolicy::Wait,
            persist_artifacts: true,
        }
    }
}

impl VisregConfig {
    /// Load configuration from file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            baselines: BaselineStoreOptions {
                write_policy: self.baselines.write_policy,
            },
            persist_artifacts: self.baselines.persist_artifacts,
        }
    }
}
