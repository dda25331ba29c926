use serde::{Deserialize, Serialize};

use crate::overlay::FontReport;

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ServiceDescriptor {
    pub(crate) status: &'static str,
    pub(crate) how_to_use: &'static str,
    pub(crate) backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) fallback: Option<&'static str>,
    pub(crate) font: FontReport,
    pub(crate) endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EndpointInfo {
    pub(crate) method: &'static str,
    pub(crate) path: &'static str,
    pub(crate) description: &'static str,
}

/// Query of the standalone document routes. Values stay raw so bad input falls back to defaults
/// instead of rejecting the request.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct CanvasQuery {
    pub(crate) text: Option<String>,
    pub(crate) font_size: Option<String>,
    pub(crate) bg: Option<String>,
    pub(crate) color: Option<String>,
    pub(crate) width: Option<String>,
}
