use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use crate::settings::Settings;

pub const GENERIC_FAMILY: &str = "sans-serif";

const THAI_PROBE: [char; 3] = ['\u{0E01}', '\u{0E31}', '\u{0E48}'];

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// True when the face maps a Thai consonant, vowel and tone mark.
    pub fn covers_thai(&self) -> bool {
        let Ok(face) = Face::parse(&self.data, self.face_index) else {
            return false;
        };
        THAI_PROBE.iter().all(|ch| face.glyph_index(*ch).is_some())
    }
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .field("face_index", &self.face_index)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// One entry of the ordered font fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontCandidate {
    Embedded(Vec<u8>),
    Path(PathBuf),
    Family(String),
    Remote(String),
}

impl FontCandidate {
    pub fn kind(&self) -> &'static str {
        match self {
            FontCandidate::Embedded(_) => "embedded",
            FontCandidate::Path(_) => "path",
            FontCandidate::Family(_) => "family",
            FontCandidate::Remote(_) => "remote",
        }
    }

    fn label(&self) -> String {
        match self {
            FontCandidate::Embedded(data) => format!("embedded ({} bytes)", data.len()),
            FontCandidate::Path(path) => path.display().to_string(),
            FontCandidate::Family(family) => family.clone(),
            FontCandidate::Remote(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedFont {
    pub family: String,
    pub source: String,
    pub metrics: Option<FontMetrics>,
}

impl ResolvedFont {
    /// Terminal fallback: the renderer's generic sans-serif face.
    pub fn builtin() -> Self {
        Self {
            family: GENERIC_FAMILY.to_string(),
            source: "builtin".to_string(),
            metrics: None,
        }
    }

    pub fn covers_thai(&self) -> bool {
        self.metrics
            .as_ref()
            .map(FontMetrics::covers_thai)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FontReport {
    pub family: String,
    pub source: String,
    pub thai_shaping: bool,
}

impl From<&ResolvedFont> for FontReport {
    fn from(font: &ResolvedFont) -> Self {
        // resvg shapes through rustybuzz, so shaping only depends on glyph coverage
        Self {
            family: font.family.clone(),
            source: font.source.clone(),
            thai_shaping: font.covers_thai(),
        }
    }
}

pub type FontFuture<'a> = Pin<Box<dyn Future<Output = Result<FontMetrics>> + Send + 'a>>;

pub trait FontLoader: Send + Sync {
    fn load<'a>(&'a self, candidate: &'a FontCandidate) -> FontFuture<'a>;
}

/// Builds the fallback chain from settings: embedded, local paths, installed families, remote
/// download, generic family.
pub fn candidates_from_settings(settings: &Settings) -> Vec<FontCandidate> {
    let mut candidates = Vec::new();
    if let Some(encoded) = settings.font_embedded_base64.as_deref() {
        match BASE64.decode(encoded.trim()) {
            Ok(data) => candidates.push(FontCandidate::Embedded(data)),
            Err(err) => warn!("ignoring embedded font: invalid base64 ({})", err),
        }
    }
    candidates.extend(
        settings
            .font_paths
            .iter()
            .filter(|path| !path.trim().is_empty())
            .map(|path| FontCandidate::Path(PathBuf::from(path.trim()))),
    );
    candidates.extend(
        settings
            .font_families
            .iter()
            .filter(|family| !family.trim().is_empty())
            .map(|family| FontCandidate::Family(family.trim().to_string())),
    );
    if let Some(url) = settings.font_download_url.as_deref() {
        candidates.push(FontCandidate::Remote(url.to_string()));
    }
    candidates.push(FontCandidate::Family(GENERIC_FAMILY.to_string()));
    candidates
}

/// Returns the first candidate the loader accepts; never fails.
pub async fn resolve_font<L>(candidates: &[FontCandidate], loader: &L) -> ResolvedFont
where
    L: FontLoader + ?Sized,
{
    for candidate in candidates {
        match loader.load(candidate).await {
            Ok(metrics) => {
                let family = metrics
                    .family()
                    .map(|name| name.to_string())
                    .or_else(|| match candidate {
                        FontCandidate::Family(name) => Some(name.clone()),
                        _ => None,
                    })
                    .unwrap_or_else(|| GENERIC_FAMILY.to_string());
                info!("using font '{}' from {}", family, candidate.label());
                return ResolvedFont {
                    family,
                    source: candidate.kind().to_string(),
                    metrics: Some(metrics),
                };
            }
            Err(err) => debug!("font candidate {} skipped: {:#}", candidate.label(), err),
        }
    }
    warn!("no font candidate could be loaded; falling back to builtin {}", GENERIC_FAMILY);
    ResolvedFont::builtin()
}

/// Loads candidates from disk, the system font database and an on-disk download cache.
pub struct SystemFontLoader {
    db: fontdb::Database,
    client: reqwest::Client,
    cache_dir: PathBuf,
}

impl SystemFontLoader {
    pub fn new(cache_dir: PathBuf, timeout: Duration) -> Result<Self> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build font download client")?;
        Ok(Self {
            db,
            client,
            cache_dir,
        })
    }

    /// Font database for rendering: system fonts plus the resolved face, which also becomes the
    /// generic sans-serif family.
    pub fn render_database(&self, font: &ResolvedFont) -> fontdb::Database {
        let mut db = self.db.clone();
        if let Some(metrics) = font.metrics.as_ref() {
            db.load_font_data(metrics.data().to_vec());
            db.set_sans_serif_family(font.family.clone());
        }
        db
    }

    async fn load_remote(&self, url: &str) -> Result<FontMetrics> {
        let path = cached_font_path(&self.cache_dir, url);
        if let Ok(data) = std::fs::read(&path) {
            if let Ok(metrics) = load_font_metrics_from_data(&data) {
                return Ok(metrics);
            }
            warn!("discarding unreadable cached font {}", path.display());
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to download font: {}", url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("font download returned {}: {}", status, url));
        }
        let data = response.bytes().await?.to_vec();
        let metrics = load_font_metrics_from_data(&data)?;
        let cache_dir = self.cache_dir.clone();
        tokio::task::spawn_blocking(move || store_cached_font(&cache_dir, &path, &data))
            .await
            .map_err(|err| anyhow!("font cache task failed: {}", err))??;
        Ok(metrics)
    }
}

impl FontLoader for SystemFontLoader {
    fn load<'a>(&'a self, candidate: &'a FontCandidate) -> FontFuture<'a> {
        Box::pin(async move {
            match candidate {
                FontCandidate::Embedded(data) => load_font_metrics_from_data(data),
                FontCandidate::Path(path) => load_font_metrics(path),
                FontCandidate::Family(family) => load_font_metrics_from_family(&self.db, family),
                FontCandidate::Remote(url) => self.load_remote(url).await,
            }
        })
    }
}

pub(crate) fn cached_font_path(cache_dir: &Path, url: &str) -> PathBuf {
    cache_dir.join(format!("{:x}.ttf", md5::compute(url.as_bytes())))
}

fn store_cached_font(cache_dir: &Path, path: &Path, data: &[u8]) -> Result<()> {
    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("failed to create font cache: {}", cache_dir.display()))?;
    let mut temp = tempfile::NamedTempFile::new_in(cache_dir)?;
    std::io::Write::write_all(&mut temp, data)?;
    // concurrent writers store identical bytes, the last rename wins
    temp.persist(path)
        .map_err(|err| anyhow!("failed to store cached font {}: {}", path.display(), err))?;
    Ok(())
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

pub(crate) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font {
        if let Ok(face) = Face::parse(&font.data, font.face_index) {
            let mut advance = 0u32;
            for ch in text.chars() {
                if ch == '\n' {
                    continue;
                }
                if ch == ' ' {
                    advance = advance.saturating_add(font.space_advance as u32);
                    continue;
                }
                if let Some(glyph) = face.glyph_index(ch) {
                    let glyph_advance = face.glyph_hor_advance(glyph).unwrap_or(font.space_advance);
                    advance = advance.saturating_add(glyph_advance as u32);
                } else {
                    advance = advance.saturating_add(font.space_advance as u32);
                }
            }
            let units = font.units_per_em.max(1) as f32;
            return advance as f32 * (font_size / units);
        }
    }
    estimate_text_width_units(text) * font_size
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if is_thai_combining(ch) {
        0.0
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(ch as u32, 0x0E00..=0x0E7F) {
        0.6
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

/// Above/below vowels and tone marks take no horizontal advance.
fn is_thai_combining(ch: char) -> bool {
    matches!(ch as u32, 0x0E31 | 0x0E34..=0x0E3A | 0x0E47..=0x0E4E)
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

/// First parseable face of a font file or collection.
fn load_font_metrics_from_data(data: &[u8]) -> Result<FontMetrics> {
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    let shared = Arc::new(data.to_vec());
    (0..count)
        .find_map(|index| face_metrics(&shared, index))
        .ok_or_else(|| anyhow!("failed to parse font data"))
}

fn face_metrics(data: &Arc<Vec<u8>>, index: u32) -> Option<FontMetrics> {
    let face = Face::parse(data, index).ok()?;
    let units_per_em = face.units_per_em().max(1);
    let space_advance = face
        .glyph_index(' ')
        .and_then(|id| face.glyph_hor_advance(id))
        .unwrap_or(units_per_em / 2);
    Some(FontMetrics {
        data: data.clone(),
        units_per_em,
        space_advance,
        family: extract_family_name(&face),
        face_index: index,
    })
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case(GENERIC_FAMILY) {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    face_metrics(&Arc::new(data), face_index)
        .ok_or_else(|| anyhow!("failed to parse font data: {}", family))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
