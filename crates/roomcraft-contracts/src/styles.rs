use indexmap::IndexMap;

/// Design styles offered to the user, in display order.
pub const DESIGN_STYLES: &[&str] = &[
    "Modern",
    "Minimalist",
    "Scandinavian",
    "Industrial",
    "Bohemian",
    "Coastal",
    "Mid-Century Modern",
    "Farmhouse",
    "Traditional",
    "Japandi",
    "Art Deco",
    "Rustic",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSpec {
    pub name: String,
    pub slug: String,
}

/// Fixed, order-preserving catalog of design styles.
///
/// Lookups are case-insensitive and tolerate `-`/`_`/space differences so that
/// `mid_century_modern` resolves to `Mid-Century Modern`.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: IndexMap<String, StyleSpec>,
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::new(DESIGN_STYLES.iter().copied())
    }
}

impl StyleCatalog {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut styles = IndexMap::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let slug = slugify(name);
            styles.entry(slug.clone()).or_insert_with(|| StyleSpec {
                name: name.to_string(),
                slug,
            });
        }
        Self { styles }
    }

    pub fn resolve(&self, raw: &str) -> Option<&StyleSpec> {
        self.styles.get(&slugify(raw))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.styles.values().any(|style| style.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.styles.values().map(|style| style.name.as_str()).collect()
    }

    pub fn list(&self) -> impl Iterator<Item = &StyleSpec> {
        self.styles.values()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}
