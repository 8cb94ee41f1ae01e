//! Browser launch planning.
//!
//! Turns the gateway configuration into a [`LaunchPlan`]: either attach to a
//! running browser over CDP, or launch a local Chromium. The plan is plain data
//! so it can be inspected and tested without a browser.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;

/// Flags passed to every locally launched browser.
pub const DEFAULT_LAUNCH_ARGS: &[&str] = &["--disable-blink-features=AutomationControlled"];

/// Viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1288,
            height: 711,
        }
    }
}

impl Viewport {
    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// Connect to an existing browser's remote-debugging endpoint.
    AttachCdp { url: String },
    /// Start a new local browser process.
    Launch {
        executable: Option<PathBuf>,
        headless: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub strategy: LaunchStrategy,
    pub viewport: Viewport,
    pub args: Vec<String>,
}

impl LaunchPlan {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let strategy = match config.cdp_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => LaunchStrategy::AttachCdp {
                url: url.to_string(),
            },
            _ => LaunchStrategy::Launch {
                executable: config.executable_path.clone(),
                headless: config.headless,
            },
        };

        LaunchPlan {
            strategy,
            viewport: Viewport::default(),
            args: DEFAULT_LAUNCH_ARGS.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn is_attach(&self) -> bool {
        matches!(self.strategy, LaunchStrategy::AttachCdp { .. })
    }

    /// Human-readable target for logs.
    pub fn describe(&self) -> String {
        match &self.strategy {
            LaunchStrategy::AttachCdp { url } => format!("attach to {url}"),
            LaunchStrategy::Launch {
                executable,
                headless,
            } => {
                let binary = executable
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "auto-detected chromium".to_string());
                let mode = if *headless { "headless" } else { "headed" };
                format!("launch {binary} ({mode})")
            }
        }
    }
}
