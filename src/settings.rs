use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub backend: String,
    pub fallback_backend: Option<String>,
    pub jpeg_quality: u8,
    pub fetch_timeout_secs: u64,
    pub max_image_bytes: usize,
    pub embed_image: bool,
    pub font_embedded_base64: Option<String>,
    pub font_paths: Vec<String>,
    pub font_families: Vec<String>,
    pub font_download_url: Option<String>,
    pub web_font_family: Option<String>,
    pub web_font_css_url: Option<String>,
    pub cloudinary_cloud_name: String,
    pub cloudinary_font_family: String,
    pub cloudinary_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            backend: "local-raster".to_string(),
            fallback_backend: None,
            jpeg_quality: 90,
            fetch_timeout_secs: 15,
            max_image_bytes: 20 * 1024 * 1024,
            embed_image: true,
            font_embedded_base64: None,
            font_paths: Vec::new(),
            font_families: Vec::new(),
            font_download_url: None,
            web_font_family: None,
            web_font_css_url: None,
            cloudinary_cloud_name: "demo".to_string(),
            cloudinary_font_family: "Sarabun".to_string(),
            cloudinary_base_url: "https://res.cloudinary.com".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    server: Option<ServerSettings>,
    render: Option<RenderSettings>,
    font: Option<FontSettings>,
    cloudinary: Option<CloudinarySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    backend: Option<String>,
    fallback: Option<String>,
    jpeg_quality: Option<u8>,
    fetch_timeout_secs: Option<u64>,
    max_image_bytes: Option<usize>,
    embed_image: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    embedded_base64: Option<String>,
    paths: Option<Vec<String>>,
    families: Option<Vec<String>>,
    download_url: Option<String>,
    web_family: Option<String>,
    web_css_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CloudinarySettings {
    cloud_name: Option<String>,
    font_family: Option<String>,
    base_url: Option<String>,
}

/// Loads the embedded defaults, then `settings.toml`, `settings.local.toml` from the working
/// directory and finally `extra_path`. Environment overrides are applied last.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(server) = incoming.server {
            if let Some(host) = non_empty(server.host) {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
        }
        if let Some(render) = incoming.render {
            if let Some(backend) = non_empty(render.backend) {
                self.backend = backend;
            }
            if let Some(fallback) = render.fallback {
                self.fallback_backend = non_empty(Some(fallback));
            }
            if let Some(quality) = render.jpeg_quality {
                self.jpeg_quality = quality.clamp(1, 100);
            }
            if let Some(secs) = render.fetch_timeout_secs {
                if secs > 0 {
                    self.fetch_timeout_secs = secs;
                }
            }
            if let Some(limit) = render.max_image_bytes {
                if limit > 0 {
                    self.max_image_bytes = limit;
                }
            }
            if let Some(embed) = render.embed_image {
                self.embed_image = embed;
            }
        }
        if let Some(font) = incoming.font {
            if let Some(encoded) = font.embedded_base64 {
                self.font_embedded_base64 = non_empty(Some(encoded));
            }
            if let Some(paths) = font.paths {
                self.font_paths = paths;
            }
            if let Some(families) = font.families {
                self.font_families = families;
            }
            if let Some(url) = font.download_url {
                self.font_download_url = non_empty(Some(url));
            }
            if let Some(family) = font.web_family {
                self.web_font_family = non_empty(Some(family));
            }
            if let Some(url) = font.web_css_url {
                self.web_font_css_url = non_empty(Some(url));
            }
        }
        if let Some(cloudinary) = incoming.cloudinary {
            if let Some(name) = non_empty(cloudinary.cloud_name) {
                self.cloudinary_cloud_name = name;
            }
            if let Some(family) = non_empty(cloudinary.font_family) {
                self.cloudinary_font_family = family;
            }
            if let Some(url) = non_empty(cloudinary.base_url) {
                self.cloudinary_base_url = url.trim_end_matches('/').to_string();
            }
        }
    }

    pub(crate) fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = non_empty(lookup("PORT")) {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid PORT value '{}'", port))?;
        }
        if let Some(host) = non_empty(lookup("HOST")) {
            self.host = host;
        }
        if let Some(backend) = non_empty(lookup("OVERLAY_BACKEND")) {
            self.backend = backend;
        }
        if let Some(name) = non_empty(lookup("CLOUDINARY_CLOUD_NAME")) {
            self.cloudinary_cloud_name = name;
        }
        if let Some(url) = non_empty(lookup("OVERLAY_FONT_URL")) {
            self.font_download_url = Some(url);
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn embedded_defaults_parse() {
        let mut settings = Settings::default();
        settings.merge(toml::from_str(DEFAULT_SETTINGS_TOML).unwrap());
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.backend, "local-raster");
        assert_eq!(settings.fallback_backend, None);
        assert_eq!(settings.web_font_family.as_deref(), Some("Sarabun"));
        assert!(
            settings
                .font_paths
                .iter()
                .any(|path| path.ends_with("Garuda.ttf"))
        );
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let mut settings = Settings::default();
        settings.merge(
            toml::from_str(
                r#"
[render]
backend = "delegated"
fallback = "local-svg"
jpeg_quality = 150
"#,
            )
            .unwrap(),
        );
        assert_eq!(settings.backend, "delegated");
        assert_eq!(settings.fallback_backend.as_deref(), Some("local-svg"));
        assert_eq!(settings.jpeg_quality, 100);
    }

    #[test]
    fn env_overrides_port_and_cloud_name() {
        let env: HashMap<&str, &str> =
            HashMap::from([("PORT", "9090"), ("CLOUDINARY_CLOUD_NAME", "acme")]);
        let mut settings = Settings::default();
        settings
            .apply_env(|key| env.get(key).map(|value| value.to_string()))
            .unwrap();
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.cloudinary_cloud_name, "acme");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(|key| (key == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("invalid PORT"));
    }
}
