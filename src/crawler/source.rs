//! Discovery source
//!
//! Channel addresses are discovered per category by an external component.
//! Its output is a JSON document `{"category": ["url", ...], ...}` which is
//! imported into the category tables and read back per category when a crawl
//! builds its job list.

use crate::address::classify_address;
use crate::storage::{SqliteStorage, Storage, StorageResult};
use crate::GraphError;
use std::collections::BTreeMap;
use std::path::Path;

/// Supplies discovered channel addresses per category
pub trait ChannelSource {
    fn channel_urls_by_category(&self, category: &str) -> StorageResult<Vec<String>>;
}

impl ChannelSource for SqliteStorage {
    fn channel_urls_by_category(&self, category: &str) -> StorageResult<Vec<String>> {
        self.addresses_in_category(category)
    }
}

/// Counts from one discovery import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub categories: usize,
    pub linked: usize,
    pub skipped: usize,
}

/// Imports a discovery document from `path`
pub fn import_discovery<S: Storage>(storage: &mut S, path: &Path) -> Result<ImportReport, GraphError> {
    let content = std::fs::read_to_string(path)?;
    let document: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)?;
    import_document(storage, &document)
}

/// Links every parseable address to its category
///
/// Addresses are stored in canonical form; unparseable entries are skipped.
pub fn import_document<S: Storage>(
    storage: &mut S,
    document: &BTreeMap<String, Vec<String>>,
) -> Result<ImportReport, GraphError> {
    let mut report = ImportReport::default();

    for (category, urls) in document {
        let category = category.trim();
        if category.is_empty() {
            report.skipped += urls.len();
            continue;
        }
        report.categories += 1;

        for raw in urls {
            let address = match classify_address(raw) {
                Ok(address) => address.canonical_link(),
                Err(e) => {
                    tracing::warn!("Skipping discovered address '{}': {}", raw, e);
                    report.skipped += 1;
                    continue;
                }
            };

            storage.add_category_link(category, &address)?;
            report.linked += 1;
        }
        tracing::info!("Imported category {} ({} addresses)", category, urls.len());
    }

    Ok(report)
}
