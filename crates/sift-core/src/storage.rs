//! Vector storage: the store interface and its Qdrant Edge implementation

use std::collections::HashMap;
use std::path::Path;

use edge::EdgeShard;
use segment::data_types::vectors::{NamedQuery, VectorInternal, VectorStructInternal};
use segment::types::{
    Distance, ExtendedPointId, Payload, PayloadStorageType, SegmentConfig, VectorDataConfig,
    VectorStorageType, WithPayloadInterface, WithVector,
};
use serde_json::Value;
use shard::count::CountRequestInternal;
use shard::operations::CollectionUpdateOperations;
use shard::operations::point_ops::{
    PointInsertOperationsInternal, PointOperations, PointStructPersisted,
};
use shard::query::query_enum::QueryEnum;
use shard::query::{ScoringQuery, ShardQueryRequest};

use crate::{BlockPayload, Result, SiftError};

/// Vector name used in the shard
const VECTOR_NAME: &str = "blocks";

/// A vector to write, keyed by block id.
#[derive(Debug, Clone)]
pub struct VectorItem {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: BlockPayload,
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: String,
    /// Cosine distance in `[0, 2]`, 0 meaning same direction
    pub distance: f32,
    pub payload: BlockPayload,
}

/// Key-indexed vector database with nearest-neighbour search.
pub trait VectorStore: Sized {
    /// Open or create a store at `path` for vectors of `dims` dimensions.
    fn open(path: &Path, dims: usize) -> Result<Self>;

    /// Insert or replace vectors by id.
    fn upsert(&mut self, items: Vec<VectorItem>) -> Result<()>;

    /// Remove vectors by id. Unknown ids are ignored.
    fn delete(&mut self, ids: &[String]) -> Result<()>;

    /// The `k` nearest vectors, closest first.
    fn search(&self, vector: Vec<f32>, k: usize) -> Result<Vec<Neighbor>>;

    /// Number of stored vectors.
    fn count(&self) -> Result<usize>;

    /// Persist pending writes.
    fn flush(&self) {}
}

/// Storage wrapper around Qdrant Edge.
pub struct Storage {
    shard: EdgeShard,
}

impl VectorStore for Storage {
    fn open(path: &Path, dims: usize) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        // Create segment config for the shard
        let mut vector_data = HashMap::new();
        vector_data.insert(
            VECTOR_NAME.to_string(),
            VectorDataConfig {
                size: dims,
                distance: Distance::Cosine,
                storage_type: VectorStorageType::ChunkedMmap,
                index: Default::default(),
                quantization_config: None,
                multivector_config: None,
                datatype: None,
            },
        );

        let segment_config = SegmentConfig {
            vector_data,
            sparse_vector_data: HashMap::new(),
            payload_storage_type: PayloadStorageType::Mmap,
        };

        let shard = EdgeShard::load(path, Some(segment_config))
            .map_err(|e| SiftError::Storage(e.to_string()))?;

        Ok(Self { shard })
    }

    fn upsert(&mut self, items: Vec<VectorItem>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let point_structs = items
            .into_iter()
            .map(|item| {
                let payload_json = serde_json::to_value(&item.payload)?;
                Ok(make_point(point_id(&item.id), item.vector, payload_json))
            })
            .collect::<Result<Vec<PointStructPersisted>>>()?;

        let operation = CollectionUpdateOperations::PointOperation(PointOperations::UpsertPoints(
            PointInsertOperationsInternal::PointsList(point_structs),
        ));

        self.shard
            .update(operation)
            .map_err(|e| SiftError::Storage(e.to_string()))?;

        Ok(())
    }

    fn delete(&mut self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let operation = CollectionUpdateOperations::PointOperation(PointOperations::DeletePoints {
            ids: ids.iter().map(|id| point_id(id)).collect(),
        });

        self.shard
            .update(operation)
            .map_err(|e| SiftError::Storage(e.to_string()))?;

        Ok(())
    }

    fn search(&self, query: Vec<f32>, k: usize) -> Result<Vec<Neighbor>> {
        let query_vec: VectorInternal = query.into();

        let results = self
            .shard
            .query(ShardQueryRequest {
                prefetches: vec![],
                query: Some(ScoringQuery::Vector(QueryEnum::Nearest(NamedQuery {
                    query: query_vec,
                    using: Some(VECTOR_NAME.to_string()),
                }))),
                filter: None,
                score_threshold: None,
                limit: k,
                offset: 0,
                params: None,
                with_vector: WithVector::Bool(false),
                with_payload: WithPayloadInterface::Bool(true),
            })
            .map_err(|e| SiftError::Storage(e.to_string()))?;

        let neighbors = results
            .into_iter()
            .filter_map(|scored| {
                let payload_map = scored.payload?;
                match payload_to_block(&payload_map) {
                    Ok(payload) => Some(Neighbor {
                        id: payload.block_id.clone(),
                        // Qdrant reports cosine similarity; convert to distance.
                        distance: 1.0 - scored.score,
                        payload,
                    }),
                    Err(e) => {
                        tracing::warn!("Skipping point with unreadable payload: {}", e);
                        None
                    }
                }
            })
            .collect();

        Ok(neighbors)
    }

    fn count(&self) -> Result<usize> {
        let count = self
            .shard
            .count(CountRequestInternal {
                filter: None,
                exact: true,
            })
            .map_err(|e| SiftError::Storage(e.to_string()))?;

        Ok(count)
    }

    fn flush(&self) {
        self.shard.flush();
    }
}

/// Map a block id onto a numeric Qdrant point id.
///
/// The string id travels in the payload; the numeric id is the first eight
/// bytes of its blake3 hash.
pub fn point_id(block_id: &str) -> ExtendedPointId {
    let hash = blake3::hash(block_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    ExtendedPointId::NumId(u64::from_le_bytes(bytes))
}

/// Create a point struct for upserting.
fn make_point(id: ExtendedPointId, vector: Vec<f32>, payload: Value) -> PointStructPersisted {
    let mut vectors = HashMap::new();
    vectors.insert(VECTOR_NAME.to_string(), VectorInternal::from(vector));

    PointStructPersisted {
        id,
        vector: VectorStructInternal::Named(vectors).into(),
        payload: Some(json_to_payload(payload)),
    }
}

/// Convert JSON value to Qdrant Payload.
fn json_to_payload(value: Value) -> Payload {
    let mut payload = Payload::default();
    if let Value::Object(map) = value {
        for (k, v) in map {
            payload.0.insert(k, v);
        }
    }
    payload
}

/// Convert Qdrant Payload back to BlockPayload.
fn payload_to_block(payload: &Payload) -> Result<BlockPayload> {
    let json_map: serde_json::Map<String, Value> = payload
        .0
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    serde_json::from_value(Value::Object(json_map)).map_err(|e| SiftError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic() {
        assert_eq!(point_id("a.py:1:login"), point_id("a.py:1:login"));
        assert_ne!(point_id("a.py:1:login"), point_id("a.py:2:login"));
    }
}
