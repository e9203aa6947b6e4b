use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::navigation::ZoomLimits;
use crate::session::CompositeMode;
use crate::view::{DEFAULT_SAFE_MARGIN, Padding};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Decode threads; defaults to the available parallelism.
    pub worker_count: Option<usize>,
    /// Space kept free for the toolbar and footer.
    pub viewport_padding: Padding,
    /// Pixels of image that must stay inside the visible area when panning.
    pub safe_margin: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub magnifier_scale: f32,
    /// Number of undoable actions kept.
    pub undo_depth: usize,
    /// How long the headless run waits for imports to settle.
    #[serde(with = "humantime_serde")]
    pub settle_timeout: Duration,
    /// Composite mode applied once two images are loaded.
    pub composite: CompositeMode,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.min_scale > 0.0, "min-scale must be positive");
        ensure!(
            self.max_scale >= self.min_scale,
            "max-scale must not be below min-scale"
        );
        ensure!(
            self.magnifier_scale > 0.0,
            "magnifier-scale must be positive"
        );
        ensure!(self.undo_depth > 0, "undo-depth must be greater than zero");
        ensure!(self.safe_margin >= 0.0, "safe-margin must not be negative");
        let Padding {
            top,
            right,
            bottom,
            left,
        } = self.viewport_padding;
        ensure!(
            [top, right, bottom, left].iter().all(|v| *v >= 0.0),
            "viewport-padding values must not be negative"
        );
        Ok(self)
    }

    pub fn workers(&self) -> usize {
        self.worker_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn zoom_limits(&self) -> ZoomLimits {
        ZoomLimits {
            min: self.min_scale,
            max: self.max_scale,
            magnifier: self.magnifier_scale,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        let limits = ZoomLimits::default();
        Self {
            worker_count: None,
            viewport_padding: Padding::new(32.0, 0.0, 20.0, 0.0),
            safe_margin: DEFAULT_SAFE_MARGIN,
            min_scale: limits.min,
            max_scale: limits.max,
            magnifier_scale: limits.magnifier,
            undo_depth: 16,
            settle_timeout: Duration::from_secs(30),
            composite: CompositeMode::Top,
        }
    }
}
