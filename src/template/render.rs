use super::{Node, Template, VarPath, ID_FIELD};
use crate::codec::native_to_human;
use crate::schema::{FieldKind, NativeValue, Record};
use crate::store::ContentStore;
use anyhow::Result;
use std::collections::BTreeMap;

/// Binds templates to records, dereferencing relations through the store.
///
/// Rendering only reads from the store, so the same template, record
/// snapshot and reserved values always produce the same text.
pub struct Renderer<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    reserved: BTreeMap<String, String>,
}

struct Resolved {
    value: NativeValue,
    kind: Option<FieldKind>,
}

impl<'a, S: ContentStore + ?Sized> Renderer<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Renderer {
            store,
            reserved: BTreeMap::new(),
        }
    }

    /// Bind a reserved placeholder that shadows any field of the same name.
    pub fn with_reserved(mut self, name: &str, value: String) -> Self {
        self.reserved.insert(name.to_string(), value);
        self
    }

    pub fn render(&self, template: &Template, record: &Record) -> Result<String> {
        let mut out = String::new();
        let mut scopes = vec![record.clone()];
        self.render_nodes(template.nodes(), &mut scopes, &mut out)?;
        Ok(out)
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        scopes: &mut Vec<Record>,
        out: &mut String,
    ) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Var(path) => out.push_str(&self.display(path, scopes)?),
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let branch = if self.is_truthy(cond, scopes)? {
                        then
                    } else {
                        otherwise
                    };
                    self.render_nodes(branch, scopes, out)?;
                }
                Node::Loop { path, body } => {
                    for item in self.loop_items(path, scopes)? {
                        scopes.push(item);
                        let rendered = self.render_nodes(body, scopes, out);
                        scopes.pop();
                        rendered?;
                    }
                }
            }
        }
        Ok(())
    }

    fn display(&self, path: &VarPath, scopes: &[Record]) -> Result<String> {
        if let Some(value) = path.as_single().and_then(|name| self.reserved.get(name)) {
            return Ok(value.clone());
        }
        let Some(resolved) = self.resolve(path, scopes)? else {
            tracing::debug!(placeholder = %path, "placeholder did not resolve");
            return Ok(String::new());
        };
        match (&resolved.kind, &resolved.value) {
            (Some(FieldKind::HasOne { class }), NativeValue::Ref(id)) => {
                Ok(self.titles(class, &[*id])?.join(", "))
            }
            (Some(FieldKind::HasMany { class }), NativeValue::Refs(ids)) => {
                Ok(self.titles(class, ids)?.join(", "))
            }
            (_, value) => Ok(native_to_human(value)),
        }
    }

    fn is_truthy(&self, path: &VarPath, scopes: &[Record]) -> Result<bool> {
        if let Some(value) = path.as_single().and_then(|name| self.reserved.get(name)) {
            return Ok(!value.trim().is_empty());
        }
        Ok(self
            .resolve(path, scopes)?
            .is_some_and(|resolved| resolved.value.is_truthy()))
    }

    fn loop_items(&self, path: &VarPath, scopes: &[Record]) -> Result<Vec<Record>> {
        let Some(resolved) = self.resolve(path, scopes)? else {
            return Ok(Vec::new());
        };
        let (class, ids) = match (&resolved.kind, &resolved.value) {
            (Some(FieldKind::HasMany { class }), NativeValue::Refs(ids)) => (class, ids.clone()),
            (Some(FieldKind::HasOne { class }), NativeValue::Ref(id)) => (class, vec![*id]),
            _ => return Ok(Vec::new()),
        };
        let mut items = Vec::new();
        for id in ids {
            if let Some(item) = self.store.load(class, id)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Resolve against the innermost scope that declares the head field.
    fn resolve(&self, path: &VarPath, scopes: &[Record]) -> Result<Option<Resolved>> {
        let head = path.head();
        for scope in scopes.iter().rev() {
            if head == ID_FIELD || scope.schema().field(head).is_some() {
                return self.walk(scope, path.segments()).map(Some);
            }
        }
        Ok(None)
    }

    fn walk(&self, record: &Record, segments: &[String]) -> Result<Resolved> {
        let mut current = record.clone();
        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();
            if segment == ID_FIELD && last {
                return Ok(Resolved {
                    value: NativeValue::Text(current.id().to_string()),
                    kind: None,
                });
            }
            let kind = current.schema().require_field(segment)?.clone();
            let value = current.get(segment)?.clone();
            if last {
                return Ok(Resolved {
                    value,
                    kind: Some(kind),
                });
            }
            let next = match (&kind, &value) {
                (FieldKind::HasOne { class }, NativeValue::Ref(id)) => self.store.load(class, *id)?,
                _ => None,
            };
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(Resolved {
            value: NativeValue::Null,
            kind: None,
        })
    }

    fn titles(&self, class: &str, ids: &[u64]) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        for id in ids {
            if let Some(related) = self.store.load(class, *id)? {
                titles.push(related.title());
            }
        }
        Ok(titles)
    }
}
