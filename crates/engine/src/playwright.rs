//! Playwright-backed rendering surface
//!
//! Each call generates a small Node.js script that opens the page at the
//! current viewport, performs one action (screenshot or element lookup) and
//! reports back as a JSON line on stdout. The page is reloaded per call, so
//! the target must render deterministically.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, VisregError};
use crate::pixel::{ImageEncoding, PixelBuffer};
use crate::render::{BoundingBox, Framing, RawCapture, RenderFrame, Renderer, Viewport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = VisregError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(VisregError::InvalidRequest(format!("unknown browser: {}", other))),
        }
    }
}

/// Configuration for the Playwright renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaywrightConfig {
    /// Page to render
    pub url: String,
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    /// Wait for this selector after navigation, before acting
    pub wait_for_selector: Option<String>,
    /// Node.js executable
    pub node_binary: String,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            wait_for_selector: None,
            node_binary: "node".to_string(),
        }
    }
}

/// JSON line printed by every generated script
#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    success: bool,
    #[serde(default, rename = "box")]
    bounding_box: Option<BoundingBox>,
    #[serde(default)]
    error: Option<String>,
}

/// Renders pages through Playwright
pub struct PlaywrightRenderer {
    config: PlaywrightConfig,
    viewport: Mutex<Viewport>,
}

impl PlaywrightRenderer {
    /// Create a renderer after checking that Playwright is installed
    pub async fn connect(config: PlaywrightConfig) -> Result<Self> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {}
            _ => {
                return Err(VisregError::SurfaceUnavailable {
                    operation: "connect",
                    reason: "Playwright not found. Install with: npx playwright install".into(),
                })
            }
        }

        info!("Using Playwright {} renderer for {}", config.browser.as_str(), config.url);
        Ok(Self::new(config))
    }

    /// Create a renderer without checking the installation
    pub fn new(config: PlaywrightConfig) -> Self {
        Self {
            viewport: Mutex::new(config.viewport),
            config,
        }
    }

    /// Build the script for one action against the current viewport
    pub fn build_script(&self, action: &str) -> String {
        let viewport = *self.viewport.lock();
        let wait = self
            .config
            .wait_for_selector
            .as_ref()
            .map(|s| format!("\n    await page.waitForSelector({});", js_string(s)))
            .unwrap_or_default();

        format!(
            r#"
const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();

  try {{
    await page.goto({url});{wait}
{action}
  }} catch (error) {{
    console.log(JSON.stringify({{ success: false, error: error.message }}));
    process.exit(1);
  }} finally {{
    await browser.close();
  }}
}})();
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            width = viewport.width,
            height = viewport.height,
            url = js_string(&self.config.url),
            wait = wait,
            action = action,
        )
    }

    fn screenshot_action(frame: &RenderFrame, path: &Path) -> String {
        let mut options = vec![
            format!("path: {}", js_string(&path.to_string_lossy())),
            format!("type: '{}'", frame.format.encoding.as_str()),
        ];

        if let (ImageEncoding::Jpeg, Some(quality)) = (frame.format.encoding, frame.format.quality) {
            options.push(format!("quality: {}", quality));
        }

        match frame.framing {
            Framing::FullSurface => options.push("fullPage: true".to_string()),
            Framing::Viewport => options.push("fullPage: false".to_string()),
            Framing::Clip(b) => {
                options.push("fullPage: true".to_string());
                options.push(format!(
                    "clip: {{ x: {}, y: {}, width: {}, height: {} }}",
                    b.x, b.y, b.width, b.height
                ));
            }
        }

        format!(
            "    await page.screenshot({{ {} }});\n    console.log(JSON.stringify({{ success: true }}));",
            options.join(", ")
        )
    }

    fn locate_action(selector: &str) -> String {
        let selector = js_string(selector);
        format!(
            r#"    const matches = page.locator({selector});
    const box = (await matches.count()) > 0 ? await matches.first().boundingBox() : null;
    console.log(JSON.stringify({{ success: true, box }}));"#,
            selector = selector
        )
    }

    /// Run a generated script and parse its outcome line
    async fn run_script(&self, operation: &'static str, script: &str) -> Result<ScriptOutcome> {
        let temp_dir = tempfile::tempdir().map_err(|e| VisregError::SurfaceUnavailable {
            operation,
            reason: format!("cannot create script directory: {}", e),
        })?;
        let script_path = temp_dir.path().join("capture.js");
        tokio::fs::write(&script_path, script)
            .await
            .map_err(|e| VisregError::SurfaceUnavailable {
                operation,
                reason: format!("cannot write script: {}", e),
            })?;

        debug!("Running Playwright script: {}", script_path.display());

        let output = Command::new(&self.config.node_binary)
            .arg(&script_path)
            .current_dir(temp_dir.path())
            .output()
            .await
            .map_err(|e| VisregError::SurfaceUnavailable {
                operation,
                reason: format!("failed to run {}: {}", self.config.node_binary, e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let outcome = stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<ScriptOutcome>(line.trim()).ok());

        match outcome {
            Some(outcome) if output.status.success() && outcome.success => Ok(outcome),
            Some(outcome) => Err(VisregError::SurfaceUnavailable {
                operation,
                reason: outcome.error.unwrap_or_else(|| "script reported failure".into()),
            }),
            None => Err(VisregError::SurfaceUnavailable {
                operation,
                reason: format!(
                    "script failed:\nstdout: {}\nstderr: {}",
                    stdout,
                    String::from_utf8_lossy(&output.stderr)
                ),
            }),
        }
    }
}

#[async_trait]
impl Renderer for PlaywrightRenderer {
    async fn render_capture(&self, frame: &RenderFrame) -> Result<RawCapture> {
        let temp_dir = tempfile::tempdir().map_err(|e| VisregError::SurfaceUnavailable {
            operation: "capture",
            reason: format!("cannot create capture directory: {}", e),
        })?;
        let image_path = temp_dir
            .path()
            .join(format!("capture.{}", frame.format.encoding.extension()));

        let script = self.build_script(&Self::screenshot_action(frame, &image_path));
        self.run_script("capture", &script).await?;

        let bytes = tokio::fs::read(&image_path)
            .await
            .map_err(|e| VisregError::SurfaceUnavailable {
                operation: "capture",
                reason: format!("screenshot not written: {}", e),
            })?;
        let buffer = PixelBuffer::decode(&bytes)?;

        Ok(RawCapture {
            width: buffer.width(),
            height: buffer.height(),
            pixels: buffer.as_bytes().to_vec(),
        })
    }

    async fn resize_viewport(&self, width: u32, height: u32) -> Result<()> {
        debug!("Viewport set to {}x{}", width, height);
        *self.viewport.lock() = Viewport { width, height };
        Ok(())
    }

    async fn locate_element(&self, selector: &str) -> Result<Option<BoundingBox>> {
        let script = self.build_script(&Self::locate_action(selector));
        let outcome = self.run_script("locate element", &script).await?;
        Ok(outcome.bounding_box)
    }

    fn viewport(&self) -> Viewport {
        *self.viewport.lock()
    }
}

/// Quote `s` as a JavaScript string literal
fn js_string(s: &str) -> String {
    // JSON strings are valid JavaScript string literals
    serde_json::to_string(s).unwrap_or_else(|_| "''".to_string())
}
