pub mod backend;
pub mod fetch;
pub mod logging;
pub mod overlay;
mod paths;
pub mod server;
pub mod settings;

pub use overlay::{
    Align, LayoutPlan, OutputFormat, OverlayError, OverlayRequest, RenderedArtifact, Rgb, VAlign,
    layout_text, validate,
};
pub use server::run_server;
