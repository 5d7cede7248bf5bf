//! Boundary to the generative content provider.
//!
//! The real provider (and its prompt templates, and the object-storage
//! upload of derived images) lives outside this process; handlers only see
//! the `PoemComposer` trait. `TemplateComposer` is a deterministic local
//! implementation for development wiring and tests.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ComposeRequest {
    /// Captured image payload as sent by the client device.
    pub image_data: String,
    pub author_alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ComposedPoem {
    pub title: String,
    pub text: String,
    pub palette: Vec<String>,
    /// Filled by providers that upload a derived image.
    pub derived_asset_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("composer rejected the capture: {0}")]
    Rejected(String),
    #[error("composer unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PoemComposer: Send + Sync {
    async fn compose(&self, req: &ComposeRequest) -> Result<ComposedPoem, ComposeError>;
}

const TITLES: &[&str] = &["Still Light", "What the Lens Held", "Afternoon, Unframed", "Small Weather"];

const PALETTES: &[[&str; 3]] = &[
    ["#1f2a44", "#7c8aa5", "#e8e3d3"],
    ["#3c2f2f", "#a96f44", "#f2d0a4"],
    ["#16302b", "#4d7c6f", "#c9d8c5"],
    ["#2b2d42", "#8d99ae", "#edf2f4"],
];

/// Deterministic stand-in composer: the same capture always yields the same
/// poem, which keeps local runs and tests stable.
pub struct TemplateComposer;

#[async_trait]
impl PoemComposer for TemplateComposer {
    async fn compose(&self, req: &ComposeRequest) -> Result<ComposedPoem, ComposeError> {
        if req.image_data.trim().is_empty() {
            return Err(ComposeError::Rejected("empty capture".into()));
        }
        let seed = req
            .image_data
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        let title = TITLES[seed % TITLES.len()].to_string();
        let palette = PALETTES[seed % PALETTES.len()]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let text = format!(
            "The shutter closed on {} bytes of light;\nwhat stayed behind became this line.",
            req.image_data.len()
        );
        Ok(ComposedPoem { title, text, palette, derived_asset_url: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_capture_composes_the_same_poem() {
        let req = ComposeRequest { image_data: "aGVsbG8=".into(), author_alias: None };
        let a = TemplateComposer.compose(&req).await.unwrap();
        let b = TemplateComposer.compose(&req).await.unwrap();
        assert_eq!(a.title, b.title);
        assert_eq!(a.text, b.text);
        assert_eq!(a.palette, b.palette);
        assert_eq!(a.palette.len(), 3);
    }

    #[tokio::test]
    async fn empty_capture_is_rejected() {
        let req = ComposeRequest { image_data: "   ".into(), author_alias: None };
        assert!(matches!(
            TemplateComposer.compose(&req).await,
            Err(ComposeError::Rejected(_))
        ));
    }
}
