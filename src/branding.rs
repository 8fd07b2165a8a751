//! Reflects tenant branding into the host document.

use std::collections::BTreeMap;

use tokio::sync::watch;

use crate::color::HexColor;
use crate::tenant::{Branding, TenantState};

/// Id of the single style element carrying tenant CSS.
pub const CUSTOM_STYLE_ID: &str = "tenant-custom-css";

pub const PRIMARY_PROPERTY: &str = "--primary";
pub const SECONDARY_PROPERTY: &str = "--secondary";

/// The slice of a rendering document that branding touches.
pub trait Document {
    /// Set a CSS custom property on the document root.
    fn set_root_property(&mut self, name: &str, value: &str);

    fn remove_root_property(&mut self, name: &str);

    /// Insert a style element with the given id, replacing any with the same id.
    fn insert_style(&mut self, id: &str, css: &str);

    /// Remove the style element with the given id, if present.
    fn remove_style(&mut self, id: &str);
}

/// Headless [`Document`] used for server-side rendering and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocument {
    root_properties: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
}

impl InMemoryDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn root_property(&self, name: &str) -> Option<&str> {
        self.root_properties.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn style(&self, id: &str) -> Option<&str> {
        self.styles.get(id).map(String::as_str)
    }

    #[must_use]
    pub fn style_count(&self) -> usize {
        self.styles.len()
    }
}

impl Document for InMemoryDocument {
    fn set_root_property(&mut self, name: &str, value: &str) {
        self.root_properties.insert(name.to_owned(), value.to_owned());
    }

    fn remove_root_property(&mut self, name: &str) {
        self.root_properties.remove(name);
    }

    fn insert_style(&mut self, id: &str, css: &str) {
        self.styles.insert(id.to_owned(), css.to_owned());
    }

    fn remove_style(&mut self, id: &str) {
        self.styles.remove(id);
    }
}

/// Applies branding and remembers what it injected so it can take it back.
#[derive(Debug, Default)]
pub struct BrandingApplier {
    style_injected: bool,
    properties: Vec<&'static str>,
}

impl BrandingApplier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was applied before with `branding`.
    ///
    /// `None` or empty fields apply nothing. Invalid colours are skipped.
    pub fn apply<D: Document>(&mut self, doc: &mut D, branding: Option<&Branding>) {
        self.teardown(doc);

        let Some(branding) = branding else {
            return;
        };

        for (property, value) in [
            (PRIMARY_PROPERTY, branding.primary_color.as_deref()),
            (SECONDARY_PROPERTY, branding.secondary_color.as_deref()),
        ] {
            let Some(value) = value else { continue };
            match value.parse::<HexColor>() {
                Ok(color) => {
                    doc.set_root_property(property, &color.to_hsl().to_string());
                    self.properties.push(property);
                }
                Err(e) => tracing::warn!(property, error = %e, "Skipping branding colour"),
            }
        }

        if let Some(css) = branding.custom_css.as_deref().filter(|c| !c.trim().is_empty()) {
            doc.insert_style(CUSTOM_STYLE_ID, css);
            self.style_injected = true;
        }
    }

    /// Remove everything this applier put into `doc`.
    pub fn teardown<D: Document>(&mut self, doc: &mut D) {
        if std::mem::take(&mut self.style_injected) {
            doc.remove_style(CUSTOM_STYLE_ID);
        }
        for property in self.properties.drain(..) {
            doc.remove_root_property(property);
        }
    }

    /// Re-apply branding every time tenant resolution completes, until the
    /// store is dropped. Tears down on exit.
    pub async fn follow<D: Document>(
        &mut self,
        doc: &mut D,
        mut tenants: watch::Receiver<TenantState>,
    ) {
        loop {
            let branding = match &*tenants.borrow_and_update() {
                TenantState::Resolved(tenant) => tenant.as_ref().and_then(|t| t.branding.clone()),
                _ => None,
            };
            self.apply(doc, branding.as_ref());
            if tenants.changed().await.is_err() {
                break;
            }
        }
        self.teardown(doc);
    }
}
