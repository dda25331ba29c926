use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::overlay::OutputFormat;
use crate::settings::Settings;

mod cloudinary;

pub use cloudinary::{Cloudinary, DelegatedImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    LocalRaster,
    LocalSvg,
    Delegated,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LocalRaster => "local-raster",
            BackendKind::LocalSvg => "local-svg",
            BackendKind::Delegated => "delegated",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "local-raster" | "raster" => Ok(BackendKind::LocalRaster),
            "local-svg" | "svg" => Ok(BackendKind::LocalSvg),
            "delegated" | "cloudinary" => Ok(BackendKind::Delegated),
            other => Err(anyhow!(
                "unknown render backend '{}' (expected local-raster, local-svg or delegated)",
                other
            )),
        }
    }

    pub fn is_local(&self) -> bool {
        !matches!(self, BackendKind::Delegated)
    }

    pub fn default_format(&self) -> OutputFormat {
        match self {
            BackendKind::LocalRaster | BackendKind::Delegated => OutputFormat::Jpeg,
            BackendKind::LocalSvg => OutputFormat::Svg,
        }
    }

    /// Output format for one request. Only local backends honour the requested format.
    pub fn output_format(&self, requested: Option<OutputFormat>) -> OutputFormat {
        match requested {
            Some(format) if self.is_local() => format,
            _ => self.default_format(),
        }
    }
}

/// Primary backend plus at most one local fallback, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendPlan {
    pub primary: BackendKind,
    pub fallback: Option<BackendKind>,
}

impl BackendPlan {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let primary = BackendKind::parse(&settings.backend)?;
        let fallback = settings
            .fallback_backend
            .as_deref()
            .map(BackendKind::parse)
            .transpose()?;
        Self::new(primary, fallback)
    }

    pub fn new(primary: BackendKind, fallback: Option<BackendKind>) -> Result<Self> {
        match fallback {
            Some(kind) if !kind.is_local() => Err(anyhow!(
                "fallback backend must be local, got '{}'",
                kind.as_str()
            )),
            Some(kind) if kind == primary => Ok(Self {
                primary,
                fallback: None,
            }),
            _ => Ok(Self { primary, fallback }),
        }
    }
}
