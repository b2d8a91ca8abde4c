use std::sync::Arc;

use vsearch::{
    AnnConfig, AnnIndex, Catalog, EmbedError, Embedder, Embedding, IdentifierTable, SearchError,
    VisualSearch,
};

/// Embedder double that decodes the payload as little-endian f32s.
struct VectorBytes {
    dim: usize,
}

impl Embedder for VectorBytes {
    fn model_name(&self) -> &str {
        "vector-bytes"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, image_bytes: &[u8]) -> Result<Embedding, EmbedError> {
        if image_bytes.len() != self.dim * 4 {
            return Err(EmbedError::Decode(format!(
                "expected {} bytes, got {}",
                self.dim * 4,
                image_bytes.len()
            )));
        }
        let vector: Vec<f32> = image_bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Embedding {
            embedding_dim: vector.len(),
            vector,
            model_name: "vector-bytes".into(),
            normalized: true,
        })
    }
}

fn to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Five distinct unit vectors in 512 dimensions at angles 0, 0.2, 0.8, 1.8 and 3.2
/// radians in the first plane, so distances from any one of them are distinct.
fn fruit_vectors() -> Vec<Vec<f32>> {
    (0..5)
        .map(|i| {
            let angle = (i * i) as f32 * 0.2;
            let mut v = vec![0.0f32; 512];
            v[0] = angle.cos();
            v[1] = angle.sin();
            v
        })
        .collect()
}

/// Unit vectors on disjoint axes: every pair is the same distance apart.
fn axis_vectors() -> Vec<Vec<f32>> {
    (0..5)
        .map(|i| {
            let mut v = vec![0.0f32; 512];
            v[i * 7] = 0.8;
            v[i * 7 + 1] = 0.6;
            v
        })
        .collect()
}

fn fruit_table() -> IdentifierTable {
    ["1_apple", "2_banana", "3_cherry", "4_date", "5_elderberry"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn fruit_service() -> VisualSearch {
    let index = AnnIndex::build(&fruit_vectors(), AnnConfig::default()).unwrap();
    let catalog = Catalog::new(index, fruit_table()).unwrap();
    VisualSearch::from_catalog(catalog, Arc::new(VectorBytes { dim: 512 }))
}

#[test]
fn cherry_query_returns_cherry_first() {
    let svc = fruit_service();
    let query = to_bytes(&fruit_vectors()[2]);

    let hits = svc.handle_query(&query, 3).unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].internal_id, 2);
    assert_eq!(hits[0].external_product_id, "3");
    assert_eq!(hits[0].display_name, "cherry");
    assert!(hits[0].distance.abs() < 1e-6);

    assert!(hits[0].distance < hits[1].distance);
    assert!(hits[1].distance < hits[2].distance);
    for hit in &hits {
        assert!(hit.internal_id < 5);
    }
    // banana (0.6 rad away) then apple (0.8 rad away)
    assert_eq!(hits[1].internal_id, 1);
    assert_eq!(hits[2].internal_id, 0);
}

#[test]
fn oversized_k_clamps_to_catalog() {
    let svc = fruit_service();
    let hits = svc.handle_query(&to_bytes(&fruit_vectors()[0]), 50).unwrap();
    assert_eq!(hits.len(), 5);

    let mut ids: Vec<_> = hits.iter().map(|h| h.internal_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn equidistant_hits_order_by_internal_id() {
    let index = AnnIndex::build(&axis_vectors(), AnnConfig::default()).unwrap();
    let catalog = Catalog::new(index, fruit_table()).unwrap();
    let svc = VisualSearch::from_catalog(catalog, Arc::new(VectorBytes { dim: 512 }));

    let hits = svc.handle_query(&to_bytes(&axis_vectors()[0]), 5).unwrap();
    assert_eq!(hits[0].internal_id, 0);
    let tail: Vec<_> = hits[1..].iter().map(|h| h.internal_id).collect();
    assert_eq!(tail, vec![1, 2, 3, 4]);
}

#[test]
fn identical_queries_serialize_identically() {
    let svc = fruit_service();
    let query = to_bytes(&fruit_vectors()[4]);

    let first = serde_json::to_vec(&svc.handle_query(&query, 3).unwrap()).unwrap();
    let second = serde_json::to_vec(&svc.handle_query(&query, 3).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn opaque_identifier_used_as_id_and_name() {
    let index = AnnIndex::build(&[vec![1.0, 0.0]], AnnConfig::default()).unwrap();
    let catalog = Catalog::new(index, vec!["widget".to_string()].into()).unwrap();
    let svc = VisualSearch::from_catalog(catalog, Arc::new(VectorBytes { dim: 2 }));

    let hits = svc.handle_query(&to_bytes(&[1.0, 0.0]), 1).unwrap();
    assert_eq!(hits[0].external_product_id, "widget");
    assert_eq!(hits[0].display_name, "widget");
}

#[test]
fn empty_catalog_returns_no_hits() {
    let catalog = Catalog::empty(512, AnnConfig::default());
    let svc = VisualSearch::from_catalog(catalog, Arc::new(VectorBytes { dim: 512 }));

    let hits = svc.handle_query(&to_bytes(&fruit_vectors()[0]), 5).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn zero_top_k_is_invalid() {
    let svc = fruit_service();
    let err = svc
        .handle_query(&to_bytes(&fruit_vectors()[0]), 0)
        .unwrap_err();
    assert_eq!(err, SearchError::InvalidTopK { requested: 0 });
}

#[test]
fn undecodable_payload_is_embedding_error() {
    let svc = fruit_service();
    let err = svc.handle_query(b"jpeg?", 3).unwrap_err();
    assert!(matches!(err, SearchError::Embedding(_)));
    assert!(err.is_client_error());
}

#[test]
fn concurrent_queries_share_one_service() {
    let svc = Arc::new(fruit_service());
    let expected = svc.handle_query(&to_bytes(&fruit_vectors()[3]), 2).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = Arc::clone(&svc);
            std::thread::spawn(move || svc.handle_query(&to_bytes(&fruit_vectors()[3]), 2))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), expected);
    }
}
