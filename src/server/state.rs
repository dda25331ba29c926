use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use usvg::fontdb;

use crate::backend::{BackendKind, BackendPlan, Cloudinary};
use crate::fetch::{HttpFetcher, ImageFetcher};
use crate::overlay::font::{self, SystemFontLoader};
use crate::overlay::{ResolvedFont, WebFont};
use crate::paths;
use crate::settings::Settings;

/// Read-only state shared by every request.
pub(crate) struct ServerState {
    pub(crate) settings: Settings,
    pub(crate) backends: BackendPlan,
    pub(crate) fetcher: Arc<dyn ImageFetcher>,
    pub(crate) delegate: Option<Cloudinary>,
    pub(crate) font: ResolvedFont,
    pub(crate) fontdb: Arc<fontdb::Database>,
    pub(crate) web_font: Option<WebFont>,
}

impl ServerState {
    pub(crate) async fn initialize(settings: Settings) -> Result<Self> {
        let backends = BackendPlan::from_settings(&settings)?;
        let timeout = Duration::from_secs(settings.fetch_timeout_secs);
        let loader = SystemFontLoader::new(paths::font_cache_dir(), timeout)?;
        let candidates = font::candidates_from_settings(&settings);
        let resolved = font::resolve_font(&candidates, &loader).await;
        let fontdb = Arc::new(loader.render_database(&resolved));
        let fetcher = Arc::new(HttpFetcher::new(timeout, settings.max_image_bytes)?);
        info!(
            backend = backends.primary.as_str(),
            fallback = backends.fallback.map(|kind| kind.as_str()).unwrap_or("none"),
            font = %resolved.family,
            thai = resolved.covers_thai(),
            "server state ready"
        );
        Self::assemble(settings, backends, fetcher, resolved, fontdb)
    }

    pub(crate) fn assemble(
        settings: Settings,
        backends: BackendPlan,
        fetcher: Arc<dyn ImageFetcher>,
        font: ResolvedFont,
        fontdb: Arc<fontdb::Database>,
    ) -> Result<Self> {
        let delegate = if backends.primary == BackendKind::Delegated {
            Some(Cloudinary::new(&settings)?)
        } else {
            None
        };
        let web_font = match (
            settings.web_font_family.as_ref(),
            settings.web_font_css_url.as_ref(),
        ) {
            (Some(family), Some(css_url)) => Some(WebFont {
                family: family.clone(),
                css_url: css_url.clone(),
            }),
            _ => None,
        };
        Ok(Self {
            settings,
            backends,
            fetcher,
            delegate,
            font,
            fontdb,
            web_font,
        })
    }

    /// Families for rasterizing; the render database maps the generic family to the resolved face.
    pub(crate) fn raster_families(&self) -> Vec<String> {
        vec![self.font.family.clone()]
    }

    /// Families for SVG and HTML documents, which are rendered by the viewer.
    pub(crate) fn document_families(&self) -> Vec<String> {
        let mut families = Vec::new();
        if let Some(web_font) = self.web_font.as_ref() {
            families.push(web_font.family.clone());
        }
        families.push(self.font.family.clone());
        families
    }
}
