//! Local persistence of fetched results.
//!
//! The portal core only needs get/set/delete of string blobs; what backs
//! them is up to the embedding application.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    internals::Preset,
    marks_table::{ExamPeriod, Semester, SubjectRecord, is_placeholder_result},
};

pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// All entries in one JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> anyhow::Result<BTreeMap<String, String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a JSON object of strings", self.path.display()))
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, String>)) -> anyhow::Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("file store lock poisoned"))?;
        // An unreadable file would otherwise block every later write.
        let mut entries = self.read_entries().unwrap_or_else(|e| {
            warn!("overwriting unreadable store: {:#}", e);
            BTreeMap::new()
        });
        change(&mut entries);
        self.write_entries(&entries)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedMarks {
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<SubjectRecord>,
}

pub fn cache_key(semester: Semester, exam_period: ExamPeriod) -> String {
    format!("marks_{}_{}", semester.selector(), exam_period.selector())
}

/// Last fetched marks per semester and exam period.
pub struct MarksCache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> MarksCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// A cached blob that no longer decodes is treated as a miss.
    pub fn load(
        &self,
        semester: Semester,
        exam_period: ExamPeriod,
    ) -> anyhow::Result<Option<CachedMarks>> {
        let key = cache_key(semester, exam_period);
        let Some(blob) = self.store.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&blob) {
            Ok(cached) => Ok(Some(cached)),
            Err(e) => {
                warn!("discarding unreadable cache entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Stores `records` unless they are placeholders. Returns whether
    /// anything was written.
    pub fn save(
        &self,
        semester: Semester,
        exam_period: ExamPeriod,
        records: &[SubjectRecord],
    ) -> anyhow::Result<bool> {
        if records.is_empty() || is_placeholder_result(records) {
            debug!(
                "not caching placeholder result for semester {}, {}",
                semester, exam_period
            );
            return Ok(false);
        }
        let cached = CachedMarks {
            fetched_at: Utc::now(),
            records: records.to_vec(),
        };
        let blob = serde_json::to_string(&cached)?;
        self.store.set(&cache_key(semester, exam_period), &blob)?;
        Ok(true)
    }

    pub fn clear_all(&self) -> anyhow::Result<()> {
        for number in 1..=Semester::MAX {
            let semester = Semester::new(number)?;
            for exam_period in [ExamPeriod::First, ExamPeriod::Second] {
                self.store.delete(&cache_key(semester, exam_period))?;
            }
        }
        Ok(())
    }
}

pub const PRESETS_KEY: &str = "@internals_presets";

/// Named sets of calculator marks, one per subject name.
pub struct PresetStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> PresetStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// An unreadable blob reads as no presets.
    pub fn all(&self) -> anyhow::Result<Vec<Preset>> {
        let Some(blob) = self.store.get(PRESETS_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&blob) {
            Ok(presets) => Ok(presets),
            Err(e) => {
                warn!("discarding unreadable presets: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, presets: &[Preset]) -> anyhow::Result<()> {
        let blob = serde_json::to_string(presets)?;
        self.store.set(PRESETS_KEY, &blob)
    }

    /// Replaces any preset with the same subject name.
    pub fn save(&self, preset: Preset) -> anyhow::Result<()> {
        let mut presets = self.all()?;
        presets.retain(|p| p.subject_name != preset.subject_name);
        presets.push(preset);
        self.write(&presets)
    }

    pub fn get(&self, subject_name: &str) -> anyhow::Result<Option<Preset>> {
        Ok(self
            .all()?
            .into_iter()
            .find(|p| p.subject_name == subject_name))
    }

    pub fn exists(&self, subject_name: &str) -> anyhow::Result<bool> {
        Ok(self.get(subject_name)?.is_some())
    }

    pub fn delete(&self, subject_name: &str) -> anyhow::Result<()> {
        let mut presets = self.all()?;
        presets.retain(|p| p.subject_name != subject_name);
        self.write(&presets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internals::AssessmentMarks;
    use indexmap::IndexMap;

    fn record(code: &str, mark: &str) -> SubjectRecord {
        let mut fields = IndexMap::new();
        fields.insert("MID-I".to_string(), mark.to_string());
        SubjectRecord {
            subject_code: code.to_string(),
            subject_name: format!("Subject {code}"),
            fields,
        }
    }

    fn semester(n: u8) -> Semester {
        Semester::new(n).unwrap()
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn json_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::new(&path);
        assert_eq!(store.get("missing").unwrap(), None);
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.delete("a").unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("a").unwrap(), None);
        assert_eq!(reopened.get("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn json_file_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(JsonFileStore::new(&path).get("a").is_err());
    }

    #[test]
    fn cache_save_recovers_from_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"{"marks_1_1": 5}"#).unwrap();

        let cache = MarksCache::new(JsonFileStore::new(&path));
        let records = vec![record("CS101", "20")];
        assert!(cache.save(semester(1), ExamPeriod::First, &records).unwrap());

        let cached = cache.load(semester(1), ExamPeriod::First).unwrap().unwrap();
        assert_eq!(cached.records, records);
    }

    fn preset(subject_name: &str, mid1_descriptive: f64) -> Preset {
        Preset::new(
            subject_name,
            AssessmentMarks {
                mid1_descriptive,
                ..AssessmentMarks::default()
            },
        )
    }

    #[test]
    fn presets_upsert_by_subject_name() {
        let presets = PresetStore::new(MemoryStore::new());
        assert!(presets.all().unwrap().is_empty());

        presets.save(preset("Data Structures", 20.0)).unwrap();
        presets.save(preset("Digital Logic", 10.0)).unwrap();
        presets.save(preset("Data Structures", 28.0)).unwrap();

        let all = presets.all().unwrap();
        let names: Vec<_> = all.iter().map(|p| p.subject_name.as_str()).collect();
        assert_eq!(names, vec!["Digital Logic", "Data Structures"]);
        let updated = presets.get("Data Structures").unwrap().unwrap();
        assert_eq!(updated.marks.mid1_descriptive, 28.0);
        assert!(updated.final_internals.is_some());
    }

    #[test]
    fn presets_delete_by_subject_name() {
        let presets = PresetStore::new(MemoryStore::new());
        presets.save(preset("Data Structures", 20.0)).unwrap();
        presets.save(preset("Digital Logic", 10.0)).unwrap();

        assert!(presets.exists("Digital Logic").unwrap());
        presets.delete("Digital Logic").unwrap();
        assert!(!presets.exists("Digital Logic").unwrap());
        assert!(presets.exists("Data Structures").unwrap());
        presets.delete("Never Saved").unwrap();
        assert_eq!(presets.all().unwrap().len(), 1);
    }

    #[test]
    fn unreadable_presets_read_as_empty() {
        let store = MemoryStore::new();
        store.set(PRESETS_KEY, "{broken").unwrap();
        let presets = PresetStore::new(store);
        assert!(presets.all().unwrap().is_empty());
        presets.save(preset("Data Structures", 20.0)).unwrap();
        assert_eq!(presets.all().unwrap().len(), 1);
    }

    #[test]
    fn cache_keys_follow_selection() {
        assert_eq!(cache_key(semester(3), ExamPeriod::Second), "marks_3_2");
    }

    #[test]
    fn cache_saves_and_loads_real_results() {
        let cache = MarksCache::new(MemoryStore::new());
        let records = vec![record("CS301", "24"), record("CS302", "N/A")];

        assert!(cache.save(semester(3), ExamPeriod::First, &records).unwrap());
        let cached = cache.load(semester(3), ExamPeriod::First).unwrap().unwrap();
        assert_eq!(cached.records, records);
        assert_eq!(cache.load(semester(3), ExamPeriod::Second).unwrap(), None);
    }

    #[test]
    fn cache_skips_placeholders() {
        let cache = MarksCache::new(MemoryStore::new());
        let saved = cache
            .save(semester(1), ExamPeriod::First, &SubjectRecord::network_error_placeholder())
            .unwrap();
        assert!(!saved);
        let saved = cache
            .save(semester(1), ExamPeriod::First, &SubjectRecord::parse_failed_placeholders())
            .unwrap();
        assert!(!saved);
        assert_eq!(cache.load(semester(1), ExamPeriod::First).unwrap(), None);
    }

    #[test]
    fn unreadable_entry_is_a_miss() {
        let store = MemoryStore::new();
        store.set("marks_2_1", "not json").unwrap();
        let cache = MarksCache::new(store);
        assert_eq!(cache.load(semester(2), ExamPeriod::First).unwrap(), None);
    }

    #[test]
    fn clear_all_removes_every_selection() {
        let cache = MarksCache::new(MemoryStore::new());
        let records = vec![record("CS101", "20")];
        cache.save(semester(1), ExamPeriod::First, &records).unwrap();
        cache.save(semester(8), ExamPeriod::Second, &records).unwrap();
        cache.clear_all().unwrap();
        assert_eq!(cache.load(semester(1), ExamPeriod::First).unwrap(), None);
        assert_eq!(cache.load(semester(8), ExamPeriod::Second).unwrap(), None);
    }
}
