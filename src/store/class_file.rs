use super::ContentStore;
use crate::codec::{parse_datetime, CANONICAL_DATETIME_FORMAT};
use crate::error::WorkflowError;
use crate::schema::{ClassSchema, FieldKind, NativeValue, Record, RecordId};
use crate::util::write_json_atomic;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type StoredFields = BTreeMap<String, Value>;

/// On-disk layout of `records/<Class>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassFile {
    schema: ClassSchema,
    #[serde(default)]
    records: Vec<StoredRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredRecord {
    id: RecordId,
    #[serde(default)]
    fields: StoredFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    live: Option<StoredFields>,
}

#[derive(Debug, Clone)]
struct ClassEntry {
    schema: Arc<ClassSchema>,
    records: BTreeMap<RecordId, StoredRecord>,
}

/// JSON-file content store with draft and live stages per record.
#[derive(Debug, Default)]
pub struct FileStore {
    dir: Option<PathBuf>,
    classes: BTreeMap<String, ClassEntry>,
}

impl FileStore {
    /// Load every `*.json` class file under `dir`. A missing dir is empty.
    pub fn open(dir: &Path) -> Result<Self> {
        let mut store = FileStore {
            dir: Some(dir.to_path_buf()),
            classes: BTreeMap::new(),
        };
        if !dir.is_dir() {
            return Ok(store);
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("read {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        for path in paths {
            let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            let file: ClassFile = serde_json::from_slice(&bytes)
                .with_context(|| format!("parse class file {}", path.display()))?;
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default();
            if stem != file.schema.name {
                return Err(anyhow!(
                    "{} declares class {:?}; file name must match",
                    path.display(),
                    file.schema.name
                ));
            }
            store.insert_file(file)?;
        }
        tracing::debug!(classes = store.classes.len(), "content store loaded");
        Ok(store)
    }

    /// Store with no backing directory; writes stay in memory.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        FileStore::default()
    }

    #[cfg(test)]
    pub fn add_class(&mut self, schema: ClassSchema) {
        self.classes.insert(
            schema.name.clone(),
            ClassEntry {
                schema: Arc::new(schema),
                records: BTreeMap::new(),
            },
        );
    }

    /// Insert a record, optionally publishing it with identical live fields.
    #[cfg(test)]
    pub fn add_record(&mut self, record: &Record, published: bool) -> Result<()> {
        self.save(record)?;
        if published {
            self.publish(record)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn remove_record(&mut self, class: &str, id: RecordId) {
        if let Some(entry) = self.classes.get_mut(class) {
            entry.records.remove(&id);
        }
    }

    pub fn class_names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    fn insert_file(&mut self, file: ClassFile) -> Result<()> {
        let schema = Arc::new(file.schema);
        let mut records = BTreeMap::new();
        for stored in file.records {
            for (field, value) in stored.fields.iter().chain(stored.live.iter().flatten()) {
                let kind = schema.require_field(field)?;
                value_from_json(kind, value).with_context(|| {
                    format!("{}#{} field {field}", schema.name, stored.id)
                })?;
            }
            if records.insert(stored.id, stored).is_some() {
                return Err(anyhow!("duplicate record id in class {}", schema.name));
            }
        }
        self.classes
            .insert(schema.name.clone(), ClassEntry { schema, records });
        Ok(())
    }

    fn entry(&self, class: &str) -> Result<&ClassEntry> {
        self.classes
            .get(class)
            .ok_or_else(|| WorkflowError::Validation(format!("unknown class {class:?}")).into())
    }

    fn stored(&self, record: &Record) -> Result<&StoredRecord> {
        self.entry(record.class())?
            .records
            .get(&record.id())
            .ok_or_else(|| not_found(record.class(), record.id()))
    }

    fn flush_class(&self, class: &str) -> Result<()> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        let entry = self.entry(class)?;
        let file = ClassFile {
            schema: entry.schema.as_ref().clone(),
            records: entry.records.values().cloned().collect(),
        };
        write_json_atomic(&dir.join(format!("{class}.json")), &file)
    }
}

impl ContentStore for FileStore {
    fn schema(&self, class: &str) -> Option<&ClassSchema> {
        self.classes.get(class).map(|entry| entry.schema.as_ref())
    }

    fn list_identifiers(&self, class: &str) -> Result<Vec<RecordId>> {
        Ok(self.entry(class)?.records.keys().copied().collect())
    }

    fn load(&self, class: &str, id: RecordId) -> Result<Option<Record>> {
        let entry = self.entry(class)?;
        let Some(stored) = entry.records.get(&id) else {
            return Ok(None);
        };
        let mut record = Record::new(entry.schema.clone(), id);
        for (field, value) in &stored.fields {
            let kind = entry.schema.require_field(field)?;
            record.set(field, value_from_json(kind, value)?)?;
        }
        Ok(Some(record))
    }

    fn save(&mut self, record: &Record) -> Result<()> {
        let fields = record
            .fields()
            .iter()
            .map(|(field, value)| (field.clone(), value_to_json(value)))
            .collect::<StoredFields>();
        let class = record.class().to_string();
        let entry = self
            .classes
            .get_mut(&class)
            .ok_or_else(|| WorkflowError::Validation(format!("unknown class {class:?}")))?;
        match entry.records.get_mut(&record.id()) {
            Some(stored) => stored.fields = fields,
            None => {
                entry.records.insert(
                    record.id(),
                    StoredRecord {
                        id: record.id(),
                        fields,
                        live: None,
                    },
                );
            }
        }
        self.flush_class(&class)
    }

    fn is_published(&self, record: &Record) -> Result<bool> {
        Ok(self.stored(record)?.live.is_some())
    }

    fn has_unsaved_draft_changes(&self, record: &Record) -> Result<Option<bool>> {
        let stored = self.stored(record)?;
        Ok(Some(match &stored.live {
            Some(live) => live != &stored.fields,
            None => false,
        }))
    }

    fn publish(&mut self, record: &Record) -> Result<()> {
        let class = record.class().to_string();
        let stored = self
            .classes
            .get_mut(&class)
            .and_then(|entry| entry.records.get_mut(&record.id()))
            .ok_or_else(|| not_found(&class, record.id()))?;
        stored.live = Some(stored.fields.clone());
        self.flush_class(&class)
    }
}

fn not_found(class: &str, id: RecordId) -> anyhow::Error {
    WorkflowError::RecordNotFound {
        class: class.to_string(),
        id,
    }
    .into()
}

fn value_from_json(kind: &FieldKind, value: &Value) -> Result<NativeValue> {
    if value.is_null() {
        return Ok(NativeValue::Null);
    }
    let native = match kind {
        FieldKind::ShortText | FieldKind::LongText | FieldKind::RichText => {
            value.as_str().map(|text| NativeValue::Text(text.to_string()))
        }
        FieldKind::Integer => value.as_i64().map(NativeValue::Integer),
        FieldKind::Float => value.as_f64().map(NativeValue::Float),
        FieldKind::Boolean => value.as_bool().map(NativeValue::Boolean),
        FieldKind::DateTime => value
            .as_str()
            .and_then(parse_datetime)
            .map(NativeValue::DateTime),
        FieldKind::HasOne { .. } => value.as_u64().map(|id| {
            if id == 0 {
                NativeValue::Null
            } else {
                NativeValue::Ref(id)
            }
        }),
        FieldKind::HasMany { .. } => value.as_array().and_then(|items| {
            items
                .iter()
                .map(Value::as_u64)
                .collect::<Option<Vec<_>>>()
                .map(NativeValue::Refs)
        }),
    };
    native.ok_or_else(|| anyhow!("value {value} does not fit field kind {kind}"))
}

fn value_to_json(value: &NativeValue) -> Value {
    match value {
        NativeValue::Null => Value::Null,
        NativeValue::Text(text) => Value::String(text.clone()),
        NativeValue::Integer(value) => Value::from(*value),
        NativeValue::Float(value) => Value::from(*value),
        NativeValue::Boolean(value) => Value::Bool(*value),
        NativeValue::DateTime(value) => {
            Value::String(value.format(CANONICAL_DATETIME_FORMAT).to_string())
        }
        NativeValue::Ref(id) => Value::from(*id),
        NativeValue::Refs(ids) => Value::from(ids.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_class(dir: &Path) {
        let text = r#"{
            "schema": {
                "name": "Article",
                "fields": {
                    "Title": {"kind": "short_text"},
                    "Featured": {"kind": "boolean"},
                    "Author": {"kind": "has_one", "class": "Person"}
                }
            },
            "records": [
                {"id": 1, "fields": {"Title": "Hello", "Featured": true}, "live": {"Title": "Hello", "Featured": true}},
                {"id": 2, "fields": {"Title": "Draft only", "Author": 4}}
            ]
        }"#;
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("Article.json"), text).unwrap();
    }

    #[test]
    fn open_reads_records_and_publish_state() {
        let temp = tempfile::tempdir().unwrap();
        write_class(temp.path());
        let store = FileStore::open(temp.path()).unwrap();

        assert_eq!(store.list_identifiers("Article").unwrap(), vec![1, 2]);
        let first = store.load("Article", 1).unwrap().unwrap();
        assert_eq!(
            first.get("Title").unwrap(),
            &NativeValue::Text("Hello".to_string())
        );
        assert!(store.is_published(&first).unwrap());
        assert_eq!(store.has_unsaved_draft_changes(&first).unwrap(), Some(false));

        let second = store.load("Article", 2).unwrap().unwrap();
        assert_eq!(second.get("Author").unwrap(), &NativeValue::Ref(4));
        assert!(!store.is_published(&second).unwrap());
        assert!(store.load("Article", 3).unwrap().is_none());
    }

    #[test]
    fn save_writes_draft_and_publish_copies_to_live() {
        let temp = tempfile::tempdir().unwrap();
        write_class(temp.path());
        let mut store = FileStore::open(temp.path()).unwrap();

        let mut record = store.load("Article", 1).unwrap().unwrap();
        record
            .set("Title", NativeValue::Text("Changed".to_string()))
            .unwrap();
        store.save(&record).unwrap();
        assert_eq!(store.has_unsaved_draft_changes(&record).unwrap(), Some(true));

        store.publish(&record).unwrap();
        assert_eq!(store.has_unsaved_draft_changes(&record).unwrap(), Some(false));

        let reopened = FileStore::open(temp.path()).unwrap();
        let reloaded = reopened.load("Article", 1).unwrap().unwrap();
        assert_eq!(
            reloaded.get("Title").unwrap(),
            &NativeValue::Text("Changed".to_string())
        );
        assert!(reopened.is_published(&reloaded).unwrap());
    }

    #[test]
    fn mismatched_file_name_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        write_class(temp.path());
        fs::rename(temp.path().join("Article.json"), temp.path().join("Post.json")).unwrap();
        assert!(FileStore::open(temp.path()).is_err());
    }

    #[test]
    fn unknown_class_is_a_validation_error() {
        let store = FileStore::in_memory();
        let err = store.list_identifiers("Nope").unwrap_err();
        assert!(matches!(
            crate::error::workflow_error(&err),
            Some(WorkflowError::Validation(_))
        ));
    }
}
