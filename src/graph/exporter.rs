use crate::config::GraphConfig;
use crate::graph::{category_label, GraphEdge, GraphNode, GraphSnapshot};
use crate::GraphError;
use neo4rs::{query, ConfigBuilder, Graph};

const CLEAR_CYPHER: &str = "MATCH (n) DETACH DELETE n";

const CHANNEL_CYPHER: &str = "\
MERGE (c:Channel {id: $id})
ON CREATE SET c.system_created_at = timestamp()
ON MATCH SET c.system_updated_at = timestamp()
SET c.name = $name,
    c.link = $link,
    c.subscribers = $subscribers,
    c.verified = $verified,
    c.created_at = $created_at";

/// Relationship types written for the two edge kinds
const SIMILAR_TO: &str = "SIMILAR_TO";
const REPOSTS_FROM: &str = "REPOSTS_FROM";

/// Counts of what one export wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub nodes: usize,
    pub similar: usize,
    pub reposts: usize,
}

/// Writes channel graphs to a Neo4j database
pub struct GraphExporter {
    graph: Graph,
}

impl GraphExporter {
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .max_connections(4)
            .build()?;
        let graph = Graph::connect(neo_config).await?;
        tracing::info!("Connected to graph store at {}", config.uri);
        Ok(Self { graph })
    }

    /// Deletes every node and relationship
    pub async fn clear(&self) -> Result<(), GraphError> {
        self.graph.run(query(CLEAR_CYPHER)).await?;
        tracing::info!("Graph store cleared");
        Ok(())
    }

    /// Merges all nodes, then all relationships, of `snapshot`
    pub async fn export(&self, snapshot: &GraphSnapshot) -> Result<ExportReport, GraphError> {
        let mut report = ExportReport::default();

        for node in &snapshot.nodes {
            self.merge_node(node).await?;
            report.nodes += 1;
        }
        tracing::info!("Merged {} channel nodes", report.nodes);

        for edge in &snapshot.similar {
            self.merge_edge(SIMILAR_TO, edge).await?;
            report.similar += 1;
        }
        for edge in &snapshot.reposts {
            self.merge_edge(REPOSTS_FROM, edge).await?;
            report.reposts += 1;
        }
        tracing::info!(
            "Merged {} {} and {} {} relationships",
            report.similar,
            SIMILAR_TO,
            report.reposts,
            REPOSTS_FROM
        );

        Ok(report)
    }

    async fn merge_node(&self, node: &GraphNode) -> Result<(), GraphError> {
        let subscribers = i64::try_from(node.subscribers).unwrap_or(i64::MAX);
        let q = query(CHANNEL_CYPHER)
            .param("id", node.id.as_str())
            .param("name", node.name.as_str())
            .param("link", node.link.as_str())
            .param("subscribers", subscribers)
            .param("verified", node.verified)
            .param("created_at", node.created_at.as_str());
        self.graph.run(q).await?;

        for category in &node.categories {
            let q = query(&category_cypher(&category_label(category)))
                .param("id", node.id.as_str())
                .param("category", category.as_str());
            self.graph.run(q).await?;
        }
        Ok(())
    }

    async fn merge_edge(&self, rel_type: &str, edge: &GraphEdge) -> Result<(), GraphError> {
        let q = query(&edge_cypher(rel_type))
            .param("source", edge.source.as_str())
            .param("target", edge.target.as_str());
        self.graph.run(q).await?;
        Ok(())
    }
}

/// Adds the category label and appends to the comma-joined `category` property
///
/// Labels cannot be query parameters; `label` must already be sanitized.
fn category_cypher(label: &str) -> String {
    let set_label = if label.is_empty() {
        String::new()
    } else {
        format!("SET c:{}\n", label)
    };
    format!(
        "MATCH (c:Channel {{id: $id}})\n\
         {}SET c.category = CASE\n\
         \x20   WHEN c.category IS NULL THEN $category\n\
         \x20   WHEN NOT c.category CONTAINS $category THEN c.category + ',' + $category\n\
         \x20   ELSE c.category\n\
         END",
        set_label
    )
}

fn edge_cypher(rel_type: &str) -> String {
    format!(
        "MATCH (source:Channel {{id: $source}})\n\
         MATCH (target:Channel {{id: $target}})\n\
         MERGE (source)-[r:{}]->(target)\n\
         ON CREATE SET r.created_at = timestamp()",
        rel_type
    )
}
