//! JSON chunking strategy: walks the value tree up to a recursion-depth
//! cap, emitting one chunk per object/array-of-objects with schema-inference
//! metadata attached.

use serde_json::{json, Value};

use crate::config::ChunkingConfig;
use crate::errors::ChunkingError;
use crate::models::{Chunk, Document, Metadata};

use super::text::window_text;
use super::{finalize, ChunkingStrategy};

pub struct JsonStrategy;

impl ChunkingStrategy for JsonStrategy {
    fn name(&self) -> &'static str {
        "json"
    }

    fn chunk(&self, document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, ChunkingError> {
        if document.content.len() > config.json_max_size_for_parsing {
            return fallback_text(document, config);
        }

        let value: Value = serde_json::from_str(&document.content).map_err(|e| ChunkingError::ParseFailed {
            strategy: self.name(),
            document_id: document.id.clone(),
            message: e.to_string(),
        })?;

        let mut nodes = Vec::new();
        collect_nodes(
            &value,
            0,
            config.json_max_recursion_depth,
            config.json_max_objects_to_process,
            &mut nodes,
        );

        if nodes.is_empty() {
            nodes.push(value);
        }

        let mut chunks = Vec::new();
        for node in nodes {
            let schema = infer_schema(&node, config.schema_inference_enabled, config.json_max_object_keys_to_process);
            let rendered = serde_json::to_string_pretty(&node)
                .unwrap_or_else(|_| node.to_string());
            let pieces = window_text(&rendered, config.chunk_size, config.chunk_overlap);
            for piece in pieces {
                let mut metadata: Metadata = Metadata::new();
                for (k, v) in &schema {
                    metadata.insert(k.clone(), v.clone());
                }
                chunks.push(Chunk {
                    id: Chunk::new_id(),
                    document_id: document.id.clone(),
                    content: piece,
                    chunk_index: 0,
                    total_chunks: 0,
                    chunk_size: 0,
                    chunking_strategy: String::new(),
                    metadata,
                });
            }
        }

        Ok(finalize(chunks, &document.id, self.name()))
    }
}

fn fallback_text(document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, ChunkingError> {
    let pieces = window_text(&document.content, config.chunk_size, config.chunk_overlap);
    let chunks = pieces
        .into_iter()
        .take(config.max_chunks_per_document)
        .map(|text| Chunk {
            id: Chunk::new_id(),
            document_id: document.id.clone(),
            content: text,
            chunk_index: 0,
            total_chunks: 0,
            chunk_size: 0,
            chunking_strategy: String::new(),
            metadata: Metadata::new(),
        })
        .collect();
    Ok(finalize(chunks, &document.id, "json"))
}

/// Walk `value`, collecting object nodes (and arrays-of-objects, treated as
/// one node per array since items are usually homogeneous) up to
/// `max_depth`/`max_objects`. The root itself is included if it has no
/// chunkable children, so small documents still yield one chunk.
fn collect_nodes(value: &Value, depth: usize, max_depth: usize, max_objects: usize, out: &mut Vec<Value>) {
    if out.len() >= max_objects {
        return;
    }
    match value {
        Value::Object(map) => {
            if depth >= max_depth || !map.values().any(|v| v.is_object() || v.is_array()) {
                out.push(value.clone());
                return;
            }
            for (_, v) in map {
                if out.len() >= max_objects {
                    break;
                }
                collect_nodes(v, depth + 1, max_depth, max_objects, out);
            }
        }
        Value::Array(items) => {
            if items.iter().all(|i| !i.is_object() && !i.is_array()) || depth >= max_depth {
                if !items.is_empty() {
                    out.push(value.clone());
                }
                return;
            }
            for item in items {
                if out.len() >= max_objects {
                    break;
                }
                collect_nodes(item, depth + 1, max_depth, max_objects, out);
            }
        }
        _ => {}
    }
}

/// Infer coarse schema metadata for a JSON node: root type, nesting depth,
/// a datatype histogram over immediate/descendant scalar values, and a
/// structural classification hint.
fn infer_schema(value: &Value, enabled: bool, max_keys: usize) -> Vec<(String, Value)> {
    if !enabled {
        return vec![("schema_inference_enabled".to_string(), json!(false))];
    }

    let root_type = match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    };

    let depth = max_nesting_depth(value, 0);
    let mut histogram = serde_json::Map::new();
    tally_types(value, &mut histogram);

    let structural_hint = if let Value::Object(map) = value {
        if map.len() > max_keys {
            "wide_object"
        } else if depth > 3 {
            "deeply_nested"
        } else {
            "flat_record"
        }
    } else if matches!(value, Value::Array(items) if items.len() > 50) {
        "large_array"
    } else {
        "simple"
    };

    vec![
        ("json_root_type".to_string(), json!(root_type)),
        ("json_nesting_depth".to_string(), json!(depth)),
        ("json_type_histogram".to_string(), Value::Object(histogram)),
        ("json_structural_hint".to_string(), json!(structural_hint)),
    ]
}

fn max_nesting_depth(value: &Value, current: usize) -> usize {
    match value {
        Value::Object(map) => map
            .values()
            .map(|v| max_nesting_depth(v, current + 1))
            .max()
            .unwrap_or(current),
        Value::Array(items) => items
            .iter()
            .map(|v| max_nesting_depth(v, current + 1))
            .max()
            .unwrap_or(current),
        _ => current,
    }
}

fn tally_types(value: &Value, histogram: &mut serde_json::Map<String, Value>) {
    let key = match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    };
    let count = histogram.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    histogram.insert(key.to_string(), json!(count + 1));

    match value {
        Value::Object(map) => map.values().for_each(|v| tally_types(v, histogram)),
        Value::Array(items) => items.iter().for_each(|v| tally_types(v, histogram)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;

    #[test]
    fn infers_flat_record_schema() {
        let content = r#"{"name": "widget", "price": 9.99, "in_stock": true}"#;
        let doc = Document::new("localfile", "localfile:x.json", "p1", content, "json");
        let config = ChunkingConfig::default();
        let chunks = JsonStrategy.chunk(&doc, &config).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.get("json_structural_hint").unwrap(), "flat_record");
    }

    #[test]
    fn splits_array_of_objects_into_one_node() {
        let content = r#"{"items": [{"a": 1}, {"a": 2}, {"a": 3}]}"#;
        let doc = Document::new("localfile", "localfile:x.json", "p1", content, "json");
        let config = ChunkingConfig::default();
        let chunks = JsonStrategy.chunk(&doc, &config).unwrap();
        assert!(!chunks.is_empty());
    }

    #[test]
    fn invalid_json_errors_and_caller_falls_back() {
        let doc = Document::new("localfile", "localfile:x.json", "p1", "not json{{{", "json");
        let config = ChunkingConfig::default();
        assert!(JsonStrategy.chunk(&doc, &config).is_err());
    }

    #[test]
    fn oversized_document_falls_back_to_text() {
        let content = format!(r#"{{"blob": "{}"}}"#, "x".repeat(300_000));
        let doc = Document::new("localfile", "localfile:x.json", "p1", content, "json");
        let config = ChunkingConfig::default();
        let chunks = JsonStrategy.chunk(&doc, &config).unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks[0].metadata.get("json_root_type").is_none());
    }
}
