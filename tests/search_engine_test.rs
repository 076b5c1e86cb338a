use std::sync::Arc;

use tempfile::TempDir;

use scoped_search::storage::file::FileStorageConfig;
use scoped_search::storage::{Storage, StorageConfig, StorageFactory};
use scoped_search::{EngineConfig, IndexKey, SearchEngine, SearchError, SearchRequest};

fn memory_engine() -> scoped_search::Result<SearchEngine> {
    let storage = StorageFactory::create(StorageConfig::default())?;
    SearchEngine::new(storage, EngineConfig::default())
}

fn product(id: &str) -> IndexKey {
    IndexKey::new(format!("Product:{id}"), "Product", id)
}

fn order(id: &str) -> IndexKey {
    IndexKey::new(format!("Order:{id}"), "Order", id)
}

fn keys(engine: &SearchEngine, request: &SearchRequest) -> scoped_search::Result<Vec<String>> {
    Ok(engine
        .search_with(request)?
        .into_iter()
        .map(|r| r.key)
        .collect())
}

#[test]
fn test_add_then_search() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "A red widget with chrome trim")?;

    let results = engine.search("widget", &["Product"])?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].key, "Product:1");
    assert_eq!(results[0].scope, "Product");
    assert_eq!(results[0].entity_id, "1");
    assert_eq!(results[0].index_key(), product("1"));

    // Matching is case-insensitive.
    assert_eq!(engine.search("WIDGET", &["Product"])?.len(), 1);
    Ok(())
}

#[test]
fn test_search_without_index_fails() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    assert!(!engine.index_exists()?);

    let err = engine.search("anything", &[] as &[&str]).unwrap_err();
    assert!(matches!(err, SearchError::IndexNotFound(_)));
    Ok(())
}

#[test]
fn test_first_write_creates_index() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "fresh storage")?;
    assert!(engine.index_exists()?);
    assert_eq!(engine.doc_count()?, 1);
    Ok(())
}

#[test]
fn test_update_replaces_document() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "apple")?;
    engine.update(&product("1"), "banana")?;

    assert_eq!(engine.doc_count()?, 1);
    assert!(engine.search("apple", &["Product"])?.is_empty());
    assert_eq!(engine.search("banana", &["Product"])?[0].key, "Product:1");
    Ok(())
}

#[test]
fn test_update_missing_key_adds() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.update(&product("7"), "brand new")?;
    assert_eq!(engine.doc_count()?, 1);
    Ok(())
}

#[test]
fn test_remove() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "apple pie")?;
    engine.add(&product("2"), "apple tart")?;

    engine.remove(&product("1"))?;
    assert_eq!(engine.doc_count()?, 1);

    let request = SearchRequest::builder("apple").limit(10).build();
    assert_eq!(keys(&engine, &request)?, vec!["Product:2"]);

    // Removing an absent key is not an error.
    engine.remove(&product("1"))?;
    assert_eq!(engine.doc_count()?, 1);
    Ok(())
}

#[test]
fn test_scope_isolation() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "shipping apple crates")?;
    engine.add(&order("1"), "shipping apple crates")?;

    let request = SearchRequest::builder("apple").scope("Order").limit(10).build();
    assert_eq!(keys(&engine, &request)?, vec!["Order:1"]);

    let request = SearchRequest::builder("apple")
        .scopes(["Order", "Product"])
        .limit(10)
        .build();
    let mut found = keys(&engine, &request)?;
    found.sort();
    assert_eq!(found, vec!["Order:1", "Product:1"]);

    let request = SearchRequest::builder("apple").limit(10).build();
    assert_eq!(keys(&engine, &request)?.len(), 2);

    let request = SearchRequest::builder("apple").scope("Invoice").limit(10).build();
    assert!(keys(&engine, &request)?.is_empty());
    Ok(())
}

#[test]
fn test_scope_is_exact_match() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "apple")?;
    assert!(engine.search("apple", &["product"])?.is_empty());
    assert_eq!(engine.search("apple", &["Product"])?.len(), 1);
    Ok(())
}

#[test]
fn test_default_limit_is_one() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    for id in ["1", "2", "3"] {
        engine.add(&product(id), "apple")?;
    }
    assert_eq!(engine.search("apple", &["Product"])?.len(), 1);
    let request = SearchRequest::builder("apple").build();
    assert_eq!(engine.search_with(&request)?.len(), 1);

    let storage = StorageFactory::create(StorageConfig::default())?;
    let config = EngineConfig::builder().default_limit(5).build();
    let engine = SearchEngine::new(storage, config)?;
    for id in ["1", "2", "3"] {
        engine.add(&product(id), "apple")?;
    }
    assert_eq!(engine.search("apple", &["Product"])?.len(), 3);
    assert_eq!(engine.search_with(&request)?.len(), 3);
    Ok(())
}

#[test]
fn test_ranking_and_pagination() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "apple")?;
    engine.add(&product("2"), "apple apple apple")?;
    engine.add(&product("3"), "pear")?;
    engine.add(&product("4"), "apple orange")?;

    let results = engine.search_with(&SearchRequest::builder("apple").limit(10).build())?;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].key, "Product:2");
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let page = engine.search_with(&SearchRequest::builder("apple").limit(2).build())?;
    assert_eq!(page.len(), 2);
    let rest = engine.search_with(&SearchRequest::builder("apple").limit(2).offset(2).build())?;
    assert_eq!(rest.len(), 1);
    assert!(page.iter().all(|r| r.key != rest[0].key));
    Ok(())
}

#[test]
fn test_zero_limit_rejected() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "apple")?;
    let err = engine
        .search_with(&SearchRequest::builder("apple").limit(0).build())
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidArgument(_)));
    Ok(())
}

#[test]
fn test_query_syntax_errors() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "apple")?;
    assert!(engine.search("", &["Product"]).unwrap_err().is_query_error());
    Ok(())
}

#[test]
fn test_stop_words_are_not_indexed() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "the apple")?;
    assert!(engine.search("the", &["Product"])?.is_empty());
    assert_eq!(engine.search("apple", &["Product"])?.len(), 1);
    Ok(())
}

#[test]
fn test_custom_stop_words() -> scoped_search::Result<()> {
    let storage = StorageFactory::create(StorageConfig::default())?;
    let config = EngineConfig::builder().stop_words(["apple"]).build();
    let engine = SearchEngine::new(storage, config)?;
    engine.add(&product("1"), "the apple")?;
    assert!(engine.search("apple", &["Product"])?.is_empty());
    assert_eq!(engine.search("the", &["Product"])?.len(), 1);
    Ok(())
}

#[test]
fn test_clear() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "apple")?;
    engine.add(&order("1"), "apple")?;

    engine.clear()?;
    assert!(engine.index_exists()?);
    assert_eq!(engine.doc_count()?, 0);
    assert!(engine.search("apple", &[] as &[&str])?.is_empty());

    // Writes after a clear accumulate normally.
    engine.add(&product("2"), "apple")?;
    engine.add(&product("3"), "apple")?;
    assert_eq!(engine.doc_count()?, 2);
    Ok(())
}

#[test]
fn test_clear_on_empty_storage() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.clear()?;
    assert!(engine.index_exists()?);
    assert_eq!(engine.doc_count()?, 0);
    Ok(())
}

#[test]
fn test_clear_discards_bulk_session() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.begin_bulk()?;
    engine.add(&product("1"), "apple")?;
    engine.clear()?;

    assert!(!engine.bulk_active());
    assert_eq!(engine.doc_count()?, 0);
    Ok(())
}

#[test]
fn test_bulk_matches_single_operations() -> scoped_search::Result<()> {
    let single = memory_engine()?;
    let bulk = memory_engine()?;
    let docs = [
        (product("1"), "red apple"),
        (product("2"), "green apple"),
        (order("1"), "apple delivery"),
    ];

    for (key, data) in &docs {
        single.add(key, data)?;
    }

    bulk.begin_bulk()?;
    for (key, data) in &docs {
        bulk.add(key, data)?;
    }
    bulk.end_bulk()?;

    let request = SearchRequest::builder("apple").limit(10).build();
    let mut expected = keys(&single, &request)?;
    let mut actual = keys(&bulk, &request)?;
    expected.sort();
    actual.sort();
    assert_eq!(expected, actual);
    assert_eq!(single.doc_count()?, bulk.doc_count()?);
    Ok(())
}

#[test]
fn test_bulk_writes_visible_after_end() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.begin_bulk()?;
    assert!(engine.bulk_active());
    engine.add(&product("1"), "apple")?;
    engine.add(&product("2"), "apple")?;

    assert_eq!(engine.doc_count()?, 0);

    engine.end_bulk()?;
    assert!(!engine.bulk_active());
    assert_eq!(engine.doc_count()?, 2);
    Ok(())
}

#[test]
fn test_bulk_session_state_errors() -> scoped_search::Result<()> {
    let engine = memory_engine()?;

    // Ending without a session is a no-op.
    engine.end_bulk()?;

    engine.begin_bulk()?;
    assert!(matches!(engine.begin_bulk(), Err(SearchError::BulkSessionActive)));
    assert!(matches!(engine.optimize(), Err(SearchError::BulkSessionActive)));
    engine.end_bulk()?;

    engine.optimize()?;
    Ok(())
}

#[test]
fn test_remove_inside_bulk_session() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    engine.add(&product("1"), "apple")?;

    engine.begin_bulk()?;
    engine.remove(&product("1"))?;
    engine.add(&product("2"), "apple")?;
    engine.update(&product("2"), "pear")?;
    engine.end_bulk()?;

    assert_eq!(engine.doc_count()?, 1);
    assert_eq!(engine.search("pear", &["Product"])?[0].key, "Product:2");
    assert!(engine.search("apple", &["Product"])?.is_empty());
    Ok(())
}

#[test]
fn test_bulk_guard_commits_on_drop() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    {
        let session = engine.bulk()?;
        session.add(&product("1"), "apple")?;
        session.add(&product("2"), "apple")?;
    }
    assert!(!engine.bulk_active());
    assert_eq!(engine.doc_count()?, 2);

    let session = engine.bulk()?;
    session.add(&product("3"), "apple")?;
    session.finish()?;
    assert_eq!(engine.doc_count()?, 3);
    Ok(())
}

#[test]
fn test_optimize_preserves_results() -> scoped_search::Result<()> {
    let engine = memory_engine()?;
    for id in ["1", "2", "3", "4"] {
        engine.add(&product(id), "apple")?;
    }
    engine.remove(&product("4"))?;

    engine.optimize()?;
    assert_eq!(engine.doc_count()?, 3);

    let request = SearchRequest::builder("apple").limit(10).build();
    let mut found = keys(&engine, &request)?;
    found.sort();
    assert_eq!(found, vec!["Product:1", "Product:2", "Product:3"]);
    Ok(())
}

#[test]
fn test_file_storage_persists_across_engines() -> scoped_search::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let storage_config = StorageConfig::File(FileStorageConfig::new(temp_dir.path()));

    {
        let storage = StorageFactory::create(storage_config.clone())?;
        let engine = SearchEngine::new(storage, EngineConfig::default())?;
        engine.add(&product("1"), "durable apple")?;
    }

    let storage = StorageFactory::create(storage_config)?;
    let engine = SearchEngine::new(storage, EngineConfig::default())?;
    assert!(engine.index_exists()?);
    assert_eq!(engine.search("durable", &["Product"])?[0].key, "Product:1");
    Ok(())
}

#[test]
fn test_engines_share_storage() -> scoped_search::Result<()> {
    let storage: Arc<dyn Storage> = StorageFactory::create(StorageConfig::default())?;
    let writer = SearchEngine::new(storage.clone(), EngineConfig::default())?;
    let reader = SearchEngine::new(storage, EngineConfig::default())?;

    writer.add(&product("1"), "apple")?;
    assert_eq!(reader.search("apple", &["Product"])?.len(), 1);
    Ok(())
}

#[test]
fn test_concurrent_searches() -> scoped_search::Result<()> {
    let engine = Arc::new(memory_engine()?);
    engine.add(&product("1"), "apple")?;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || engine.search("apple", &["Product"]).map(|r| r.len()))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap()?, 1);
    }
    Ok(())
}

#[test]
fn test_one_writer_per_storage() -> scoped_search::Result<()> {
    let storage: Arc<dyn Storage> = StorageFactory::create(StorageConfig::default())?;
    let first = SearchEngine::new(storage.clone(), EngineConfig::default())?;
    let second = SearchEngine::new(storage, EngineConfig::default())?;

    first.begin_bulk()?;
    first.add(&product("1"), "apple")?;

    assert!(matches!(second.begin_bulk(), Err(SearchError::Engine(_))));
    assert!(second.add(&product("2"), "apple").is_err());
    // Reads are not blocked by the writer.
    assert_eq!(second.doc_count()?, 0);

    first.end_bulk()?;
    second.begin_bulk()?;
    second.add(&product("2"), "apple")?;
    second.end_bulk()?;
    assert_eq!(first.doc_count()?, 2);
    Ok(())
}

#[test]
fn test_concurrent_bulk_sessions_have_one_winner() -> scoped_search::Result<()> {
    let storage: Arc<dyn Storage> = StorageFactory::create(StorageConfig::default())?;
    SearchEngine::new(storage.clone(), EngineConfig::default())?.clear()?;

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let storage = storage.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let engine = SearchEngine::new(storage, EngineConfig::default())?;
                barrier.wait();
                let started = engine.begin_bulk().is_ok();
                // Hold the writer until both threads have tried.
                barrier.wait();
                engine.end_bulk()?;
                Ok::<_, SearchError>(started)
            })
        })
        .collect();

    let mut started = 0;
    for handle in handles {
        if handle.join().unwrap()? {
            started += 1;
        }
    }
    assert_eq!(started, 1);
    Ok(())
}
