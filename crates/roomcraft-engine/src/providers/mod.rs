use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use roomcraft_contracts::models::{Capability, ModelSelector};
use serde::Serialize;

use crate::codec::EncodedImage;
use crate::config::StudioConfig;

mod dryrun;
mod gemini;

pub use dryrun::DryrunProvider;
pub use gemini::GeminiProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineImage(EncodedImage),
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::InlineImage(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&EncodedImage> {
        match self {
            Self::InlineImage(image) => Some(image),
            Self::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: ContentRole,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: ContentRole::User,
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: ContentRole::Model,
            parts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub response_modalities: Vec<Modality>,
}

/// Response parts in the order the service returned them, flattened across
/// candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentResponse {
    pub parts: Vec<Part>,
    pub finish_reason: Option<String>,
}

impl ContentResponse {
    pub fn first_image(&self) -> Option<&EncodedImage> {
        self.parts.iter().find_map(Part::as_image)
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

pub trait ContentProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Confirms credentials are present before a long-lived session is opened.
    fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ContentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ContentProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ContentProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(config: &StudioConfig) -> ProviderRegistry {
    let mut providers = ProviderRegistry::new();
    providers.register(DryrunProvider);
    providers.register(GeminiProvider::new(config));
    providers
}

/// A provider bound to the model chosen for one capability.
#[derive(Clone)]
pub struct ResolvedModel {
    pub provider: Arc<dyn ContentProvider>,
    pub model: String,
    pub fallback_reason: Option<String>,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("fallback_reason", &self.fallback_reason)
            .finish()
    }
}

pub fn resolve_model(
    registry: &ProviderRegistry,
    selector: &ModelSelector,
    requested: &str,
    capability: Capability,
) -> Result<ResolvedModel> {
    let selection = selector
        .select(Some(requested), capability)
        .map_err(|reason| anyhow!(reason))?;
    let provider = registry.get(&selection.model.provider).ok_or_else(|| {
        anyhow!(
            "no provider registered for '{}' (model {})",
            selection.model.provider,
            selection.model.name
        )
    })?;
    Ok(ResolvedModel {
        provider,
        model: selection.model.name,
        fallback_reason: selection.fallback_reason,
    })
}
