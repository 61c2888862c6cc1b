//! Graph export
//!
//! # Components
//!
//! - `GraphSnapshot`: nodes and relationships read from the relational store
//! - `GraphExporter`: writes a snapshot to Neo4j with idempotent `MERGE`s
//!
//! A node is keyed by the channel's numeric id when it is known and by its
//! address otherwise, so a channel reached both by handle and by `c/<id>`
//! collapses into one node.

mod exporter;

pub use exporter::{ExportReport, GraphExporter};

use crate::storage::{ChannelRecord, EdgeKind, Storage, StorageResult};
use std::collections::{BTreeSet, HashMap};

/// A channel as it is written to the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub link: String,
    pub subscribers: u64,
    pub verified: bool,
    /// `YYYY-MM-DD`, empty when unknown
    pub created_at: String,
    pub categories: BTreeSet<String>,
}

/// A directed relationship between two node ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

/// Everything the exporter writes in one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub similar: Vec<GraphEdge>,
    pub reposts: Vec<GraphEdge>,
}

/// Node key for a stored channel
pub fn node_id(record: &ChannelRecord) -> String {
    match record.channel_id {
        Some(id) => id.to_string(),
        None => record.address.clone(),
    }
}

/// Label for a category: title-cased, alphanumeric characters only
///
/// # Examples
///
/// ```
/// use channel_graph::graph::category_label;
///
/// assert_eq!(category_label("hand made"), "HandMade");
/// assert_eq!(category_label("18+ news"), "18News");
/// ```
pub fn category_label(category: &str) -> String {
    let mut label = String::with_capacity(category.len());
    let mut word_start = true;

    for c in category.chars() {
        if c.is_alphabetic() {
            if word_start {
                label.extend(c.to_uppercase());
            } else {
                label.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            if c.is_alphanumeric() {
                label.push(c);
            }
            word_start = true;
        }
    }
    label
}

impl GraphSnapshot {
    /// Reads channels, edges and categories from `storage`
    ///
    /// Similar targets inherit the categories of the channels recommending
    /// them; repost sources do not.
    pub fn from_storage<S: Storage + ?Sized>(storage: &S) -> StorageResult<Self> {
        let channels = storage.list_channels()?;
        let categories = storage.categories_by_address()?;

        let mut node_of: HashMap<String, String> = HashMap::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut nodes: Vec<GraphNode> = Vec::new();

        for record in &channels {
            let id = node_id(record);
            node_of.insert(record.address.clone(), id.clone());

            let position = *index.entry(id.clone()).or_insert_with(|| {
                nodes.push(GraphNode {
                    id,
                    name: String::new(),
                    link: record.address.clone(),
                    subscribers: 0,
                    verified: false,
                    created_at: String::new(),
                    categories: BTreeSet::new(),
                });
                nodes.len() - 1
            });
            merge_record(&mut nodes[position], record);

            if let Some(names) = categories.get(&record.address) {
                nodes[position].categories.extend(names.iter().cloned());
            }
        }

        let similar = resolve_edges(storage, EdgeKind::Similar, &node_of)?;
        let reposts = resolve_edges(storage, EdgeKind::Related, &node_of)?;

        for edge in &similar {
            let inherited = index
                .get(&edge.source)
                .map(|&i| nodes[i].categories.clone())
                .unwrap_or_default();
            if let Some(&target) = index.get(&edge.target) {
                nodes[target].categories.extend(inherited);
            }
        }

        Ok(Self {
            nodes,
            similar,
            reposts,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Fills in what `node` does not know yet from `record`
fn merge_record(node: &mut GraphNode, record: &ChannelRecord) {
    if node.name.is_empty() {
        if let Some(name) = &record.name {
            node.name = name.clone();
        }
    }
    if node.subscribers == 0 {
        node.subscribers = record.subscribers.unwrap_or(0);
    }
    if node.created_at.is_empty() {
        if let Some(date) = record.created_at {
            node.created_at = date.format("%Y-%m-%d").to_string();
        }
    }
    node.verified |= record.verified;
}

fn resolve_edges<S: Storage + ?Sized>(
    storage: &S,
    kind: EdgeKind,
    node_of: &HashMap<String, String>,
) -> StorageResult<Vec<GraphEdge>> {
    let mut seen = BTreeSet::new();
    let edges = storage
        .list_edges(kind)?
        .into_iter()
        .filter_map(|edge| {
            let source = node_of.get(&edge.source)?.clone();
            let target = node_of.get(&edge.target)?.clone();
            (source != target).then_some(GraphEdge { source, target })
        })
        .filter(|edge| seen.insert((edge.source.clone(), edge.target.clone())))
        .collect();
    Ok(edges)
}
