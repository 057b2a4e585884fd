use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::Arc;

use sdk::errors::EngineError;
use sdk::types::{ChunkMetadata, SearchHit};
use sonar_engine::llm::embedding::Embedder;
use sonar_engine::retrieval::{
    rank_order, reconstruct, CodeRetriever, CollectionBackend, InMemoryCollection,
    MultiCollectionStore, SearchFilter, StoreOptions,
};

/// Every query embeds to the origin, so a chunk's distance is its squared norm
struct OriginEmbedder;

#[async_trait]
impl Embedder for OriginEmbedder {
    fn model(&self) -> &str {
        "origin"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EngineError> {
        Ok(vec![0.0, 0.0])
    }
}

#[derive(Debug, Clone)]
struct ChunkSpec {
    path: usize,
    class: Option<usize>,
    start: u32,
    len: u32,
    x: f32,
    y: f32,
}

const PATHS: &[&str] = &["src/a.py", "src/b.py", "lib/c.rs"];
const CLASSES: &[&str] = &["Foo", "Bar"];

fn chunk_spec() -> impl Strategy<Value = ChunkSpec> {
    (
        0..PATHS.len(),
        proptest::option::of(0..CLASSES.len()),
        1u32..200,
        0u32..30,
        -4.0f32..4.0,
        -4.0f32..4.0,
    )
        .prop_map(|(path, class, start, len, x, y)| ChunkSpec {
            path,
            class,
            start,
            len,
            x,
            y,
        })
}

fn collections() -> impl Strategy<Value = Vec<Vec<ChunkSpec>>> {
    proptest::collection::vec(proptest::collection::vec(chunk_spec(), 0..12), 1..4)
}

fn build_collection(index: usize, specs: &[ChunkSpec]) -> Arc<dyn CollectionBackend> {
    let name = format!("col{}", index);
    let collection = InMemoryCollection::new(name.clone());
    for (i, spec) in specs.iter().enumerate() {
        collection.add(
            format!("{}-{}", name, i),
            format!("chunk {} of {}", i, name),
            vec![spec.x, spec.y],
            ChunkMetadata {
                path: PATHS[spec.path].to_string(),
                class_name: spec.class.map(|c| CLASSES[c].to_string()),
                start_line: spec.start,
                end_line: spec.start + spec.len,
                ..Default::default()
            },
        );
    }
    Arc::new(collection)
}

fn store(backends: Vec<Arc<dyn CollectionBackend>>) -> MultiCollectionStore {
    MultiCollectionStore::new(backends, Arc::new(OriginEmbedder), StoreOptions::default())
}

fn hit(id: &str, path: usize, class: Option<usize>, start: u32, score: f64) -> SearchHit {
    SearchHit {
        chunk_id: id.to_string(),
        text: format!("text of {}", id),
        score,
        distance: None,
        metadata: ChunkMetadata {
            path: PATHS[path].to_string(),
            class_name: class.map(|c| CLASSES[c].to_string()),
            start_line: start,
            end_line: start + 5,
            ..Default::default()
        },
        collection: "code".to_string(),
    }
}

fn raw_hits() -> impl Strategy<Value = Vec<SearchHit>> {
    proptest::collection::vec(
        (
            0..PATHS.len(),
            proptest::option::of(0..CLASSES.len()),
            1u32..100,
            0.0f64..1.0,
        ),
        0..16,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (path, class, start, score))| {
                hit(&format!("c{}", i), path, class, start, score)
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // At most K hits, in ranking order
    #[test]
    fn test_semantic_search_is_bounded_and_ranked(
        specs in collections(),
        k in 1usize..10,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let hits = runtime.block_on(async {
            let backends = specs
                .iter()
                .enumerate()
                .map(|(i, s)| build_collection(i, s))
                .collect();
            store(backends)
                .semantic_search("anything", Some(k), &SearchFilter::default())
                .await
                .unwrap()
        });

        prop_assert!(hits.len() <= k);
        for pair in hits.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
            prop_assert_ne!(rank_order(&pair[0], &pair[1]), std::cmp::Ordering::Greater);
        }
        for h in &hits {
            prop_assert!(h.score > 0.0 && h.score <= 1.0);
        }
    }

    // Dropping one collection leaves the others' hits in the same order
    #[test]
    fn test_removing_a_collection_keeps_the_rest_as_prefix(
        specs in collections(),
        k in 1usize..10,
        removed in 0usize..4,
    ) {
        let removed = removed % specs.len();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (full, reduced) = runtime.block_on(async {
            let all: Vec<Arc<dyn CollectionBackend>> = specs
                .iter()
                .enumerate()
                .map(|(i, s)| build_collection(i, s))
                .collect();
            let kept: Vec<Arc<dyn CollectionBackend>> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != removed)
                .map(|(_, b)| b.clone())
                .collect();

            let full = store(all)
                .semantic_search("anything", Some(k), &SearchFilter::default())
                .await
                .unwrap();
            let reduced = store(kept)
                .semantic_search("anything", Some(k), &SearchFilter::default())
                .await
                .unwrap();
            (full, reduced)
        });

        let removed_name = format!("col{}", removed);
        let survivors: Vec<&str> = full
            .iter()
            .filter(|h| h.collection != removed_name)
            .map(|h| h.chunk_id.as_str())
            .collect();
        let reduced_ids: Vec<&str> = reduced.iter().map(|h| h.chunk_id.as_str()).collect();

        prop_assert!(survivors.len() <= reduced_ids.len());
        prop_assert_eq!(&reduced_ids[..survivors.len()], &survivors[..]);
    }

    #[test]
    fn test_reconstruct_is_idempotent(hits in raw_hits()) {
        let once = reconstruct(hits);
        let twice = reconstruct(once.clone());
        prop_assert_eq!(once, twice);
    }

    // One merged hit per (path, class) unit; module-level chunks pass through
    #[test]
    fn test_reconstruct_merges_each_unit_once(hits in raw_hits()) {
        let module_level = hits.iter().filter(|h| h.metadata.class_name.is_none()).count();
        let merged = reconstruct(hits.clone());

        let mut units: Vec<(String, String)> = merged
            .iter()
            .filter_map(|h| {
                h.metadata
                    .class_name
                    .clone()
                    .map(|c| (h.metadata.path.clone(), c))
            })
            .collect();
        let unit_count = units.len();
        units.sort();
        units.dedup();
        prop_assert_eq!(units.len(), unit_count);

        let merged_module_level = merged
            .iter()
            .filter(|h| h.metadata.class_name.is_none())
            .count();
        prop_assert_eq!(merged_module_level, module_level);

        for m in merged.iter().filter(|h| h.metadata.class_name.is_some()) {
            let members: Vec<&SearchHit> = hits
                .iter()
                .filter(|h| {
                    h.metadata.path == m.metadata.path
                        && h.metadata.class_name == m.metadata.class_name
                })
                .collect();
            let best = members.iter().map(|h| h.score).fold(f64::MIN, f64::max);
            let first = members.iter().map(|h| h.metadata.start_line).min().unwrap();
            prop_assert_eq!(m.score, best);
            prop_assert_eq!(m.metadata.start_line, first);
        }
    }
}

#[tokio::test]
async fn test_regex_search_on_empty_collection_is_empty() {
    let empty: Arc<dyn CollectionBackend> = Arc::new(InMemoryCollection::new("empty"));
    let hits = store(vec![empty])
        .regex_search("not-a-class", &[])
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_invalid_regex_is_reported() {
    let empty: Arc<dyn CollectionBackend> = Arc::new(InMemoryCollection::new("empty"));
    let err = store(vec![empty])
        .regex_search("class (Foo", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPattern { .. }));
}

#[tokio::test]
async fn test_symbol_search_respects_path_filter() {
    let code = build_collection(
        0,
        &[
            ChunkSpec { path: 0, class: Some(0), start: 1, len: 10, x: 1.0, y: 0.0 },
            ChunkSpec { path: 1, class: Some(0), start: 1, len: 10, x: 1.0, y: 0.0 },
        ],
    );
    let hits = store(vec![code])
        .search_by_symbol("Foo", &["src/b.py".to_string()])
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].location(), "src/b.py:1-11");
}
