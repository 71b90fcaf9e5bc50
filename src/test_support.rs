//! Fixtures shared by unit tests.
use crate::error::WorkflowError;
use crate::gateway::PromptGateway;
use crate::schema::{ClassSchema, FieldKind, NativeValue, Record};
use crate::store::{ContentStore, FileStore};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

fn schema(name: &str, title_field: &str, fields: &[(&str, FieldKind)]) -> ClassSchema {
    ClassSchema {
        name: name.to_string(),
        title_field: title_field.to_string(),
        fields: fields
            .iter()
            .map(|(field, kind)| (field.to_string(), kind.clone()))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn text(value: &str) -> NativeValue {
    NativeValue::Text(value.to_string())
}

/// Articles 1-3 (1 and 2 published), people 10-11, tags 20-21.
pub fn sample_store() -> FileStore {
    let mut store = FileStore::in_memory();
    store.add_class(schema(
        "Person",
        "Name",
        &[("Name", FieldKind::ShortText), ("Bio", FieldKind::LongText)],
    ));
    store.add_class(schema("Tag", "Title", &[("Title", FieldKind::ShortText)]));
    store.add_class(schema(
        "Article",
        "Title",
        &[
            ("Title", FieldKind::ShortText),
            ("Summary", FieldKind::LongText),
            ("Body", FieldKind::RichText),
            ("Featured", FieldKind::Boolean),
            ("Views", FieldKind::Integer),
            ("Rating", FieldKind::Float),
            ("PublishedAt", FieldKind::DateTime),
            (
                "Author",
                FieldKind::HasOne {
                    class: "Person".to_string(),
                },
            ),
            (
                "Tags",
                FieldKind::HasMany {
                    class: "Tag".to_string(),
                },
            ),
        ],
    ));

    for (id, name) in [(10, "Ada Lovelace"), (11, "Grace Hopper")] {
        let mut person = new_record(&store, "Person", id);
        person.set("Name", text(name)).expect("set name");
        store.add_record(&person, true).expect("add person");
    }
    for (id, title) in [(20, "Rust"), (21, "Testing")] {
        let mut tag = new_record(&store, "Tag", id);
        tag.set("Title", text(title)).expect("set title");
        store.add_record(&tag, true).expect("add tag");
    }

    let published_at = NaiveDate::from_ymd_opt(2024, 3, 5)
        .and_then(|date| date.and_hms_opt(9, 30, 0))
        .expect("valid date");
    let mut first = new_record(&store, "Article", 1);
    first.set("Title", text("Hello World")).expect("set");
    first.set("Featured", NativeValue::Boolean(true)).expect("set");
    first.set("Views", NativeValue::Integer(42)).expect("set");
    first.set("PublishedAt", NativeValue::DateTime(published_at)).expect("set");
    first.set("Author", NativeValue::Ref(10)).expect("set");
    first.set("Tags", NativeValue::Refs(vec![20, 21])).expect("set");
    store.add_record(&first, true).expect("add article");

    let mut second = new_record(&store, "Article", 2);
    second.set("Title", text("Second Post")).expect("set");
    second.set("Featured", NativeValue::Boolean(false)).expect("set");
    store.add_record(&second, true).expect("add article");

    let mut third = new_record(&store, "Article", 3);
    third.set("Title", text("Third Post")).expect("set");
    store.add_record(&third, false).expect("add article");

    store
}

pub fn new_record(store: &FileStore, class: &str, id: u64) -> Record {
    let schema = store.schema(class).expect("class exists").clone();
    Record::new(Arc::new(schema), id)
}

pub fn load(store: &FileStore, class: &str, id: u64) -> Record {
    store
        .load(class, id)
        .expect("load record")
        .expect("record exists")
}

/// Gateway that replays canned answers and remembers every prompt.
#[derive(Default)]
pub struct ScriptedGateway {
    answers: RefCell<VecDeque<Result<String, WorkflowError>>>,
    pub prompts: RefCell<Vec<String>>,
}

impl ScriptedGateway {
    pub fn answering(answers: &[&str]) -> Self {
        let gateway = ScriptedGateway::default();
        for answer in answers {
            gateway.push_answer(answer);
        }
        gateway
    }

    pub fn push_answer(&self, answer: &str) {
        self.answers.borrow_mut().push_back(Ok(answer.to_string()));
    }

    pub fn push_failure(&self, error: &str) {
        self.push_error(WorkflowError::Provider(error.to_string()));
    }

    pub fn push_error(&self, error: WorkflowError) {
        self.answers.borrow_mut().push_back(Err(error));
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl PromptGateway for ScriptedGateway {
    fn ask(&self, prompt: &str, _model: Option<&str>) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.answers.borrow_mut().pop_front() {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(error)) => Err(error.into()),
            None => Err(anyhow!("scripted gateway ran out of answers")),
        }
    }
}
