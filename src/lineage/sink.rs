//! Lineage sink — where provenance records are published
//!
//! A [`LineageSink`] receives one record per item that passes through a
//! lineage-enabled node, plus one record per completed pipeline run. The
//! crate ships no concrete sink (writing to a file, a message bus, or a
//! graph database is a host application concern); [`NullSink`] is provided
//! for tests and as the default when lineage is disabled.

use async_trait::async_trait;

use crate::error::Result;
use crate::lineage::LineagePacket;

/// A single item's lineage, ready to publish: the node that produced it and
/// the packet's provenance, with the payload erased (lineage sinks care
/// about identity, not content).
#[derive(Debug, Clone)]
pub struct ItemRecord {
    /// Node that emitted this item.
    pub node: String,
    /// Packet id.
    pub record_id: String,
    /// Parent packet ids.
    pub parent_ids: Vec<String>,
    /// Full traversal path up to and including `node`.
    pub traversal_path: Vec<String>,
}

impl<T> From<&LineagePacket<T>> for ItemRecord {
    fn from(packet: &LineagePacket<T>) -> Self {
        Self {
            node: packet.traversal_path.last().cloned().unwrap_or_default(),
            record_id: packet.record_id.clone(),
            parent_ids: packet.parent_ids.clone(),
            traversal_path: packet.traversal_path.clone(),
        }
    }
}

/// Summary published once a run completes.
#[derive(Debug, Clone)]
pub struct PipelineRecord {
    /// Total items observed across all lineage-enabled nodes.
    pub total_items: u64,
    /// Number of cardinality mismatches observed (strict or warn mode).
    pub cardinality_mismatches: u64,
}

/// Receives lineage records as a run progresses.
#[async_trait]
pub trait LineageSink: Send + Sync {
    /// Record a single item's lineage.
    async fn record_item(&self, record: ItemRecord) -> Result<()>;

    /// Record the pipeline-level summary once the run ends.
    async fn record_pipeline(&self, record: PipelineRecord) -> Result<()>;
}

/// Discards every record. Used when lineage is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl LineageSink for NullSink {
    async fn record_item(&self, _record: ItemRecord) -> Result<()> {
        Ok(())
    }

    async fn record_pipeline(&self, _record: PipelineRecord) -> Result<()> {
        Ok(())
    }
}
