//! Flat JSON record stores.
//!
//! A [`RecordStore`] is a keyed mapping persisted as one pretty-printed JSON
//! object. Every call loads the whole document from disk, and every mutation
//! writes the whole document back, so there is no in-memory cache to go stale.
//! Writes land in a sibling temp file that is renamed over the document.
//!
//! Two processes writing the same store still race: the last rename wins.

use crate::error::{ResearchError, Result};
use crate::records::{PaperRecord, TopicRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Papers already analyzed, keyed by title.
pub type PaperStore = RecordStore<PaperRecord>;

/// Curated research topics, keyed by topic name.
pub type TopicStore = RecordStore<TopicRecord>;

/// Keyed mapping backed by a single JSON document.
#[derive(Debug, Clone)]
pub struct RecordStore<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open a store, creating an empty document (and parent directories) if
    /// none exists yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            info!(path = ?path, "Creating empty record store");
            write_document(&path, &BTreeMap::<String, T>::new())?;
        }
        Ok(Self {
            path,
            _record: PhantomData,
        })
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up one record by exact key.
    pub fn get(&self, key: &str) -> Result<Option<T>> {
        let mut records = self.load()?;
        Ok(records.remove(key))
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(key))
    }

    /// Insert or fully overwrite the record at `key`.
    pub fn put(&self, key: &str, record: &T) -> Result<()> {
        let mut records: BTreeMap<String, serde_json::Value> = self.load_raw()?;
        records.insert(key.to_string(), serde_json::to_value(record)?);
        write_document(&self.path, &records)?;
        debug!(path = ?self.path, key = key, "Stored record");
        Ok(())
    }

    /// Remove the record at `key`. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut records: BTreeMap<String, serde_json::Value> = self.load_raw()?;
        if records.remove(key).is_none() {
            return Ok(false);
        }
        write_document(&self.path, &records)?;
        debug!(path = ?self.path, key = key, "Deleted record");
        Ok(true)
    }

    /// Every record in the store.
    pub fn list(&self) -> Result<BTreeMap<String, T>> {
        self.load()
    }

    /// Every key in the store, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.load_raw()?.into_keys().collect())
    }

    /// Re-serialize the current document without changing its content.
    pub fn save(&self) -> Result<()> {
        let records = self.load_raw()?;
        write_document(&self.path, &records)?;
        debug!(path = ?self.path, records = records.len(), "Saved record store");
        Ok(())
    }

    fn load(&self) -> Result<BTreeMap<String, T>> {
        let content = self.read_document()?;
        serde_json::from_str(&content).map_err(|e| self.corrupt(e))
    }

    /// Load without decoding records, so mutations never depend on every
    /// other record matching `T`.
    fn load_raw(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        let content = self.read_document()?;
        serde_json::from_str(&content).map_err(|e| self.corrupt(e))
    }

    fn read_document(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok("{}".to_string()),
            Err(e) => Err(e.into()),
        }
    }

    fn corrupt(&self, e: serde_json::Error) -> ResearchError {
        ResearchError::Store {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

fn write_document<V: Serialize>(path: &Path, records: &BTreeMap<String, V>) -> Result<()> {
    let content = serde_json::to_string_pretty(records)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ImportantPaper, PaperAnalysis, TopicConnection};
    use tempfile::TempDir;

    fn topic() -> TopicRecord {
        let mut topic = TopicRecord {
            description: "Language modelling".to_string(),
            current_status: "Active".to_string(),
            key_challenges: vec!["long context".to_string()],
            important_papers: vec![
                ImportantPaper {
                    title: "Attention Is All You Need".to_string(),
                    summary: None,
                },
                ImportantPaper {
                    title: "BERT".to_string(),
                    summary: Some("Bidirectional encoder".to_string()),
                },
            ],
            ..Default::default()
        };
        topic.extra.insert(
            "breakthrough_papers".to_string(),
            serde_json::json!({"2015": "DQN", "2017": ["AlphaGo Zero", {"nested": true}]}),
        );
        topic
    }

    #[test]
    fn test_open_creates_empty_document() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("papers.json");
        let store = PaperStore::open(&path)?;
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path)?.trim(), "{}");
        assert!(store.list()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_put_then_get_returns_equal_value() -> Result<()> {
        let dir = TempDir::new()?;
        let topics = TopicStore::open(dir.path().join("topics.json"))?;
        topics.put("NLP", &topic())?;
        assert_eq!(topics.get("NLP")?, Some(topic()));

        let papers = PaperStore::open(dir.path().join("papers.json"))?;
        let record = PaperRecord::new(
            "T",
            PaperAnalysis {
                year: 2020,
                keywords: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                ..Default::default()
            },
            Some(TopicConnection {
                key_problem: "k".to_string(),
                topic_advancement: "adv".to_string(),
                important: true,
                ..Default::default()
            }),
        );
        papers.put("T", &record)?;
        assert_eq!(papers.get("T")?, Some(record));
        Ok(())
    }

    #[test]
    fn test_put_overwrites_and_delete_reports_existence() -> Result<()> {
        let dir = TempDir::new()?;
        let store = TopicStore::open(dir.path().join("topics.json"))?;
        store.put("NLP", &topic())?;
        let replaced = TopicRecord {
            description: "replaced".to_string(),
            ..Default::default()
        };
        store.put("NLP", &replaced)?;
        assert_eq!(store.get("NLP")?, Some(replaced));

        assert!(store.delete("NLP")?);
        assert!(!store.delete("NLP")?);
        assert_eq!(store.get("NLP")?, None);
        Ok(())
    }

    #[test]
    fn test_every_call_reads_from_disk() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("topics.json");
        let store = TopicStore::open(&path)?;
        fs::write(&path, r#"{"RL": {"description": "written elsewhere"}}"#)?;
        assert_eq!(store.keys()?, vec!["RL".to_string()]);
        assert!(store.contains("RL")?);
        Ok(())
    }

    #[test]
    fn test_malformed_document_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("papers.json");
        fs::write(&path, "not json")?;
        let store = PaperStore::open(&path)?;
        assert!(matches!(store.get("T"), Err(ResearchError::Store { .. })));
        assert!(matches!(store.put("T", &PaperRecord::new("T", Default::default(), None)), Err(ResearchError::Store { .. })));
        Ok(())
    }

    #[test]
    fn test_save_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let store = TopicStore::open(dir.path().join("topics.json"))?;
        store.put("NLP", &topic())?;
        store.save()?;
        let first = fs::read_to_string(store.path())?;
        store.save()?;
        assert_eq!(fs::read_to_string(store.path())?, first);
        assert_eq!(store.get("NLP")?, Some(topic()));
        Ok(())
    }
}
