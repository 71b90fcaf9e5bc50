//! Instruction template language.
//!
//! Supported syntax, and nothing more:
//!
//! ```text
//! $Field  {$Field}  $Relation.Field
//! <% if $Field %> ... <% else %> ... <% end_if %>
//! <% loop $Relation %> ... <% end_loop %>
//! ```
//!
//! `$ID` reads the record identifier. Inside a loop, placeholders resolve
//! against the loop item first and fall back to the enclosing records.
use crate::error::WorkflowError;
use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;

mod check;
mod render;

pub use render::Renderer;

/// Pseudo-field that renders the record identifier.
pub const ID_FIELD: &str = "ID";

const PATH_PATTERN: &str = r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*";

/// Dotted placeholder path such as `Author.Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarPath(Vec<String>);

impl VarPath {
    fn parse(raw: &str) -> Self {
        VarPath(raw.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn head(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// Single-segment name, used for reserved placeholders.
    pub fn as_single(&self) -> Option<&str> {
        match self.0.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

impl fmt::Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Var(VarPath),
    If {
        cond: VarPath,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Loop {
        path: VarPath,
        body: Vec<Node>,
    },
}

/// Parsed template, ready to render against any record of its class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

enum FrameKind {
    Root,
    If(VarPath),
    Loop(VarPath),
}

struct Frame {
    kind: FrameKind,
    nodes: Vec<Node>,
    otherwise: Option<Vec<Node>>,
    offset: usize,
}

impl Frame {
    fn new(kind: FrameKind, offset: usize) -> Self {
        Frame {
            kind,
            nodes: Vec::new(),
            otherwise: None,
            offset,
        }
    }

    fn push(&mut self, node: Node) {
        match self.otherwise.as_mut() {
            Some(otherwise) => otherwise.push(node),
            None => self.nodes.push(node),
        }
    }
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let token_re = Regex::new(&format!(
            r"(?s)<%(?P<tag>.*?)%>|\{{\$(?P<braced>{PATH_PATTERN})\}}|\$(?P<path>{PATH_PATTERN})"
        ))
        .context("compile template token pattern")?;
        let tag_re = Regex::new(&format!(
            r"^\s*(?P<keyword>if|loop|else|end_if|end_loop)(?:\s+\$(?P<path>{PATH_PATTERN}))?\s*$"
        ))
        .context("compile template tag pattern")?;

        let mut stack = vec![Frame::new(FrameKind::Root, 0)];
        let mut cursor = 0;
        for caps in token_re.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if whole.start() > cursor {
                push_node(&mut stack, Node::Text(source[cursor..whole.start()].to_string()));
            }
            cursor = whole.end();
            let offset = whole.start();

            if let Some(path) = caps.name("braced").or_else(|| caps.name("path")) {
                push_node(&mut stack, Node::Var(VarPath::parse(path.as_str())));
                continue;
            }
            let tag = caps.name("tag").map(|m| m.as_str()).unwrap_or_default();
            let parsed = tag_re
                .captures(tag)
                .ok_or_else(|| syntax(offset, format!("unrecognized block <%{tag}%>")))?;
            let keyword = parsed.name("keyword").map(|m| m.as_str()).unwrap_or_default();
            let path = parsed.name("path").map(|m| VarPath::parse(m.as_str()));
            match (keyword, path) {
                ("if", Some(path)) => stack.push(Frame::new(FrameKind::If(path), offset)),
                ("loop", Some(path)) => stack.push(Frame::new(FrameKind::Loop(path), offset)),
                ("if" | "loop", None) => {
                    return Err(syntax(offset, format!("<% {keyword} %> needs a $placeholder")));
                }
                ("else", None) => {
                    let frame = stack.last_mut().filter(|frame| {
                        matches!(frame.kind, FrameKind::If(_)) && frame.otherwise.is_none()
                    });
                    match frame {
                        Some(frame) => frame.otherwise = Some(Vec::new()),
                        None => return Err(syntax(offset, "<% else %> outside of <% if %>")),
                    }
                }
                ("end_if", None) => match pop_frame(&mut stack) {
                    Some(Frame {
                        kind: FrameKind::If(cond),
                        nodes,
                        otherwise,
                        ..
                    }) => push_node(
                        &mut stack,
                        Node::If {
                            cond,
                            then: nodes,
                            otherwise: otherwise.unwrap_or_default(),
                        },
                    ),
                    _ => return Err(syntax(offset, "<% end_if %> without matching <% if %>")),
                },
                ("end_loop", None) => match pop_frame(&mut stack) {
                    Some(Frame {
                        kind: FrameKind::Loop(path),
                        nodes,
                        ..
                    }) => push_node(&mut stack, Node::Loop { path, body: nodes }),
                    _ => {
                        return Err(syntax(offset, "<% end_loop %> without matching <% loop %>"))
                    }
                },
                _ => return Err(syntax(offset, format!("{keyword} takes no placeholder"))),
            }
        }
        if cursor < source.len() {
            push_node(&mut stack, Node::Text(source[cursor..].to_string()));
        }

        match stack.pop() {
            Some(Frame {
                kind: FrameKind::Root,
                nodes,
                ..
            }) => Ok(Template { nodes }),
            Some(frame) => Err(syntax(frame.offset, "block is never closed")),
            None => Err(syntax(0, "template stack underflow")),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether a single-segment placeholder appears anywhere in the template.
    pub fn mentions(&self, name: &str) -> bool {
        fn visit(nodes: &[Node], name: &str) -> bool {
            nodes.iter().any(|node| match node {
                Node::Text(_) => false,
                Node::Var(path) => path.as_single() == Some(name),
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => cond.as_single() == Some(name) || visit(then, name) || visit(otherwise, name),
                Node::Loop { body, .. } => visit(body, name),
            })
        }
        visit(&self.nodes, name)
    }
}

fn push_node(stack: &mut [Frame], node: Node) {
    if let Some(frame) = stack.last_mut() {
        frame.push(node);
    }
}

/// Pop a block frame, never the root.
fn pop_frame(stack: &mut Vec<Frame>) -> Option<Frame> {
    if stack.len() > 1 {
        stack.pop()
    } else {
        None
    }
}

fn syntax(offset: usize, message: impl Into<String>) -> anyhow::Error {
    WorkflowError::Template {
        offset,
        message: message.into(),
    }
    .into()
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
