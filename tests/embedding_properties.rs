//! Embedding-cache properties: idempotence, batch/single equivalence,
//! cache-hit accounting via the encoder invocation counter.

mod common;

use anyhow::Result;

use common::{init_tracing, test_config};
use quarry::{Config, EmbeddingService, cosine_similarity};

fn service_in(data_dir: &std::path::Path) -> Result<EmbeddingService> {
    init_tracing();
    Ok(EmbeddingService::new(&test_config(data_dir))?)
}

#[tokio::test]
async fn test_repeated_encode_hits_cache_and_returns_identical_bits() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let service = service_in(tmp.path())?;

    let first = service.encode("idempotent text")?;
    let invocations_after_first = service.encoder_invocations();

    let second = service.encode("idempotent text")?;
    let third = service.encode("idempotent text")?;

    assert_eq!(
        first.iter().map(|f| f.to_bits()).collect::<Vec<_>>(),
        second.iter().map(|f| f.to_bits()).collect::<Vec<_>>()
    );
    assert_eq!(second, third);

    // The model ran exactly once; later calls were cache hits.
    assert_eq!(service.encoder_invocations(), invocations_after_first);
    assert_eq!(invocations_after_first, 1);
    Ok(())
}

#[tokio::test]
async fn test_encode_batch_equals_encode_for_every_text() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let service = service_in(tmp.path())?;

    let texts = ["alpha beta", "gamma delta", "epsilon"];
    let batch = service.encode_batch(&texts)?;

    for (text, from_batch) in texts.iter().zip(&batch) {
        // Single-call path hits the cache warmed by the batch, so the vectors
        // must be bit-identical.
        assert_eq!(&service.encode(text)?, from_batch);
    }
    Ok(())
}

#[tokio::test]
async fn test_batch_skips_entries_cached_before_the_call() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let service = service_in(tmp.path())?;

    service.encode("already cached")?;
    assert_eq!(service.encoder_invocations(), 1);

    service.encode_batch(&["already cached", "fresh one", "fresh two"])?;

    // Only the two uncached texts reached the encoder.
    assert_eq!(service.encoder_invocations(), 3);
    Ok(())
}

#[tokio::test]
async fn test_disk_cache_survives_service_restart() -> Result<()> {
    let tmp = tempfile::tempdir()?;

    let original = {
        let service = service_in(tmp.path())?;
        service.encode("persisted vector")?
    };

    let service = service_in(tmp.path())?;
    let restored = service.encode("persisted vector")?;

    assert_eq!(original, restored);
    // Served from disk, not recomputed.
    assert_eq!(service.encoder_invocations(), 0);
    Ok(())
}

#[tokio::test]
async fn test_disabled_cache_recomputes_every_call() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = Config {
        enable_cache: false,
        ..test_config(tmp.path())
    };
    let service = EmbeddingService::new(&config)?;

    service.encode("no cache")?;
    service.encode("no cache")?;

    assert_eq!(service.encoder_invocations(), 2);
    Ok(())
}

#[tokio::test]
async fn test_similarity_of_related_texts_exceeds_unrelated() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let service = service_in(tmp.path())?;

    let query = service.encode("capital of France")?;
    let related = service.encode("Paris is the capital of France")?;
    let unrelated = service.encode("Python is a programming language")?;

    assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_encodes_do_not_corrupt_results() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let service = service_in(tmp.path())?;

    let expected = service.encode("contended text")?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.encode_async("contended text".to_string()).await
        }));
    }

    for handle in handles {
        let vector = handle.await??;
        assert_eq!(vector, expected);
    }
    Ok(())
}
