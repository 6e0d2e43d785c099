use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Image,
    Edit,
    Text,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Edit => "edit",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Known models keyed by name, kept in registration order.
///
/// Order matters: the selector falls back to the first model that supports
/// the requested capability.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim())
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[Capability]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities.to_vec(),
            },
        );
    };

    insert(
        "gemini-2.5-flash-image-preview",
        "gemini",
        &[Capability::Image, Capability::Edit],
    );
    insert(
        "gemini-2.5-flash-image",
        "gemini",
        &[Capability::Image, Capability::Edit],
    );
    insert("gemini-2.5-flash", "gemini", &[Capability::Text]);
    insert("gemini-2.5-pro", "gemini", &[Capability::Text]);
    insert(
        "dryrun-image-1",
        "dryrun",
        &[Capability::Image, Capability::Edit],
    );
    insert("dryrun-text-1", "dryrun", &[Capability::Text]);

    map
}
