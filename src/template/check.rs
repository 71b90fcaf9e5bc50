use super::{Node, Template, VarPath, ID_FIELD};
use crate::error::WorkflowError;
use crate::schema::{ClassSchema, FieldKind};
use crate::store::ContentStore;
use anyhow::Result;

impl Template {
    /// Verify every placeholder against the schemas it will be rendered with.
    ///
    /// `reserved` names are always accepted. Loops must iterate a relation.
    pub fn check<S: ContentStore + ?Sized>(
        &self,
        store: &S,
        root: &ClassSchema,
        reserved: &[&str],
    ) -> Result<()> {
        let mut scopes = vec![root];
        check_nodes(self.nodes(), store, &mut scopes, reserved)
    }
}

fn check_nodes<'s, S: ContentStore + ?Sized>(
    nodes: &[Node],
    store: &'s S,
    scopes: &mut Vec<&'s ClassSchema>,
    reserved: &[&str],
) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Var(path) => {
                if !is_reserved(path, reserved) {
                    resolve_kind(path, store, scopes)?;
                }
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                if !is_reserved(cond, reserved) {
                    resolve_kind(cond, store, scopes)?;
                }
                check_nodes(then, store, scopes, reserved)?;
                check_nodes(otherwise, store, scopes, reserved)?;
            }
            Node::Loop { path, body } => {
                let class = match resolve_kind(path, store, scopes)? {
                    Some(FieldKind::HasMany { class }) | Some(FieldKind::HasOne { class }) => class,
                    _ => return Err(invalid(format!("{path} is not a relation and cannot loop"))),
                };
                let item_schema = store
                    .schema(&class)
                    .ok_or_else(|| invalid(format!("{path} points at unknown class {class}")))?;
                scopes.push(item_schema);
                let checked = check_nodes(body, store, scopes, reserved);
                scopes.pop();
                checked?;
            }
        }
    }
    Ok(())
}

fn is_reserved(path: &VarPath, reserved: &[&str]) -> bool {
    path.as_single()
        .is_some_and(|name| reserved.contains(&name))
}

/// Kind of the final segment; `None` for `$ID`.
fn resolve_kind<S: ContentStore + ?Sized>(
    path: &VarPath,
    store: &S,
    scopes: &[&ClassSchema],
) -> Result<Option<FieldKind>> {
    let head = path.head();
    let Some(mut schema) = scopes
        .iter()
        .rev()
        .copied()
        .find(|schema| head == ID_FIELD || schema.field(head).is_some())
    else {
        return Err(invalid(format!("placeholder {path} does not name a field")));
    };
    let segments = path.segments();
    for (index, segment) in segments.iter().enumerate() {
        let last = index + 1 == segments.len();
        if segment == ID_FIELD && last {
            return Ok(None);
        }
        let kind = schema
            .field(segment)
            .ok_or_else(|| invalid(format!("{path}: class {} has no field {segment}", schema.name)))?;
        if last {
            return Ok(Some(kind.clone()));
        }
        let FieldKind::HasOne { class } = kind else {
            return Err(invalid(format!(
                "{path}: only has_one relations can be dereferenced, {segment} is {kind}"
            )));
        };
        schema = store
            .schema(class)
            .ok_or_else(|| invalid(format!("{path}: unknown class {class}")))?;
    }
    Ok(None)
}

fn invalid(message: String) -> anyhow::Error {
    WorkflowError::Validation(message).into()
}
