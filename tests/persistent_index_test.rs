use tempfile::TempDir;

use hashdex::segment::SegmentPaths;
use hashdex::{HashdexError, Index, IndexConfig, MemoryIndex, PersistentIndex};

const CORPUS: &[&str] = &[
    "the quick brown fox jumps over the lazy dog",
    "a quick brown dog outpaces a quick red fox",
    "lorem ipsum dolor sit amet",
    "the dog sleeps in the sun",
    "brown bread and brown butter",
    "foxes and dogs are not the same animal",
    "quick thinking saves the day",
    "the end",
];

fn config(dir: &TempDir, token_budget: u64) -> IndexConfig {
    IndexConfig::builder(dir.path())
        .table_size(211)
        .token_budget(token_budget)
        .merge_workers(2)
        .fs_retry_limit(5)
        .fs_retry_delay_ms(1)
        .build()
}

fn feed(index: &mut dyn Index) -> hashdex::Result<()> {
    for (doc, text) in CORPUS.iter().enumerate() {
        let doc = doc as u32 + 1;
        let mut tokens = 0;
        for (offset, term) in text.split_whitespace().enumerate() {
            index.insert(term, doc, offset as u32)?;
            tokens += 1;
        }
        index.record_document(doc, &format!("doc{doc}.txt"), tokens)?;
    }
    Ok(())
}

fn vocabulary() -> Vec<&'static str> {
    let mut terms: Vec<&str> = CORPUS.iter().flat_map(|t| t.split_whitespace()).collect();
    terms.sort_unstable();
    terms.dedup();
    terms
}

#[test]
fn test_compacts_to_single_segment_matching_memory_index() -> hashdex::Result<()> {
    let dir = TempDir::new().unwrap();
    let mut index = PersistentIndex::open(config(&dir, 8))?;
    let mut reference = MemoryIndex::new();
    feed(&mut index)?;
    feed(&mut reference)?;

    assert!(index.stats().segments_created >= 2);
    index.cleanup()?;

    let stats = index.stats();
    assert_eq!(stats.live_segments, 1);
    assert_eq!(stats.merges_completed, stats.segments_created - 1);

    for term in vocabulary() {
        let stored = index.get_postings(term)?.expect("term must survive compaction");
        let expected = reference.get_postings(term)?.unwrap();
        assert_eq!(stored, expected, "postings of '{term}' differ");

        let ids = stored.doc_ids();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for entry in stored.iter() {
            assert!(entry.positions().windows(2).all(|w| w[0] <= w[1]));
        }
    }
    assert!(index.get_postings("zebra")?.is_none());
    assert_eq!(index.doc_count(), CORPUS.len());
    Ok(())
}

#[test]
fn test_document_is_never_split_across_segments() -> hashdex::Result<()> {
    let dir = TempDir::new().unwrap();
    let mut index = PersistentIndex::open(config(&dir, 1))?;
    for offset in 0..4 {
        index.insert("same", 1, offset)?;
    }
    index.insert("same", 2, 0)?;
    index.insert("same", 2, 1)?;
    index.insert("same", 3, 0)?;
    index.cleanup()?;

    let postings = index.get_postings("same")?.unwrap();
    assert_eq!(postings.doc_ids(), vec![1, 2, 3]);
    assert_eq!(postings[0].positions(), &[0, 1, 2, 3]);
    assert_eq!(postings[1].positions(), &[0, 1]);
    assert_eq!(index.stats().segments_created, 3);
    Ok(())
}

#[test]
fn test_reopen_preserves_contents() -> hashdex::Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let mut index = PersistentIndex::open(config(&dir, 10))?;
        feed(&mut index)?;
        index.cleanup()?;
    }

    let mut reopened = PersistentIndex::open(config(&dir, 10))?;
    assert_eq!(reopened.segment_infos().len(), 1);
    assert_eq!(reopened.doc_count(), CORPUS.len());
    assert_eq!(reopened.doc_info(3).unwrap().name, "doc3.txt");
    assert_eq!(reopened.get_postings("lorem")?.unwrap().doc_ids(), vec![3]);

    // New documents land in a new segment and are merged with the old one.
    reopened.insert("lorem", 20, 0)?;
    reopened.record_document(20, "doc20.txt", 1)?;
    reopened.cleanup()?;
    assert_eq!(reopened.stats().live_segments, 1);
    assert_eq!(reopened.get_postings("lorem")?.unwrap().doc_ids(), vec![3, 20]);
    assert_eq!(reopened.doc_count(), CORPUS.len() + 1);
    Ok(())
}

#[test]
fn test_reopen_with_other_table_size_fails() -> hashdex::Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let mut index = PersistentIndex::open(config(&dir, 10))?;
        feed(&mut index)?;
        index.cleanup()?;
    }

    let other = IndexConfig {
        table_size: 97,
        ..config(&dir, 10)
    };
    assert!(matches!(
        PersistentIndex::open(other),
        Err(HashdexError::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn test_truncated_dictionary_fails_open() -> hashdex::Result<()> {
    let dir = TempDir::new().unwrap();
    let segment_id = {
        let mut index = PersistentIndex::open(config(&dir, 1000))?;
        feed(&mut index)?;
        index.cleanup()?;
        index.segment_infos()[0].segment_id
    };

    let paths = SegmentPaths::new(dir.path(), segment_id);
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&paths.dictionary)?;
    file.set_len(100)?;
    drop(file);

    assert!(matches!(
        PersistentIndex::open(config(&dir, 1000)),
        Err(HashdexError::CorruptSegment { .. })
    ));
    Ok(())
}

#[test]
fn test_missing_data_file_fails_open() -> hashdex::Result<()> {
    let dir = TempDir::new().unwrap();
    let segment_id = {
        let mut index = PersistentIndex::open(config(&dir, 1000))?;
        feed(&mut index)?;
        index.cleanup()?;
        index.segment_infos()[0].segment_id
    };

    std::fs::remove_file(SegmentPaths::new(dir.path(), segment_id).data)?;
    assert!(matches!(
        PersistentIndex::open(config(&dir, 1000)),
        Err(HashdexError::CorruptSegment { .. })
    ));
    Ok(())
}

#[test]
fn test_config_file_is_written() -> hashdex::Result<()> {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, 10);
    let mut index = PersistentIndex::open(config.clone())?;
    index.cleanup()?;

    let saved = IndexConfig::load(dir.path().join(hashdex::index::persistent::CONFIG_FNAME))?;
    assert_eq!(saved, config);
    Ok(())
}
