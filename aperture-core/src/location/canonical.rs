use std::{collections::HashMap, fmt};

/// Maps a free-text location name to the key used for grouping and lookup.
///
/// Swappable per locale. `None` means the name carries no usable location.
pub trait LocationCanonicalizer: Send + Sync + fmt::Debug {
    fn canonicalize(&self, raw: &str) -> Option<String>;
}

/// Lowercase, trim and collapse internal whitespace.
pub fn normalize_location(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for word in raw.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    (!out.is_empty()).then_some(out)
}

/// Normalize `raw`, then merge known spelling variants.
///
/// `variants` must be keyed by normalized names.
pub fn canonicalize_location(
    raw: &str,
    variants: &HashMap<String, String>,
) -> Option<String> {
    let normalized = normalize_location(raw)?;
    match variants.get(&normalized) {
        Some(canonical) => Some(canonical.clone()),
        None => Some(normalized),
    }
}

/// Canonicalizer backed by a variant → canonical lookup table.
#[derive(Debug, Clone, Default)]
pub struct VariantTableCanonicalizer {
    variants: HashMap<String, String>,
}

impl VariantTableCanonicalizer {
    /// Both sides of every pair are normalized; pairs that normalize to
    /// nothing are dropped.
    pub fn new<I, K, V>(variants: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let variants = variants
            .into_iter()
            .filter_map(|(variant, canonical)| {
                Some((
                    normalize_location(variant.as_ref())?,
                    normalize_location(canonical.as_ref())?,
                ))
            })
            .collect();
        Self { variants }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

impl LocationCanonicalizer for VariantTableCanonicalizer {
    fn canonicalize(&self, raw: &str) -> Option<String> {
        canonicalize_location(raw, &self.variants)
    }
}
