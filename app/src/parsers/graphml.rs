// ==============================================================================
// graphml.rs - GraphML Component Document
// ==============================================================================
// Description: Minimal GraphML reader/writer for network component files.
//              Reads node ids and sample labels, and appends a per-node
//              <data> annotation while leaving the rest of the text intact.
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Expected node shape (as written by the network renderer):
//   <node id="n0">
//     <data key="d0">sample_name</data>
//   </node>
// The first <data> child of a node carries the sample name.
// ==============================================================================

use std::path::Path;

use crate::cache;
use crate::error::{ClusterError, Result};

const NODE_OPEN: &str = "<node";
const NODE_CLOSE: &str = "</node>";
const DATA_OPEN: &str = "<data";
const DATA_CLOSE: &str = "</data>";

/// A node of the graph and where it sits in the document text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    /// Text of the node's first <data> child
    pub label: Option<String>,
    span: NodeSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeSpan {
    start: usize,
    open_end: usize,
    close_start: Option<usize>,
    end: usize,
}

/// GraphML document held as text plus an index of its nodes
#[derive(Debug, Clone)]
pub struct GraphDocument {
    text: String,
    nodes: Vec<GraphNode>,
}

impl GraphDocument {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ClusterError::storage(path, e))?;
        Self::parse(text).map_err(|e| match e {
            ClusterError::NetworkArtifact(msg) => {
                ClusterError::NetworkArtifact(format!("{:?}: {}", path, msg))
            }
            other => other,
        })
    }

    pub fn parse(text: String) -> Result<Self> {
        let nodes = scan_nodes(&text)?;
        Ok(Self { text, nodes })
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Sample label of the first node in document order
    pub fn first_label(&self) -> Option<&str> {
        self.nodes.first().and_then(|n| n.label.as_deref())
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Append `<data key="{key}">{value}</data>` to every node, replacing an
    /// existing entry for the same key. Returns the number of nodes touched.
    pub fn annotate_nodes<F>(&mut self, key: &str, classify: F) -> Result<usize>
    where
        F: Fn(Option<&str>) -> &'static str,
    {
        let mut out = String::with_capacity(self.text.len() + self.nodes.len() * 48);
        let mut cursor = 0;

        for node in &self.nodes {
            out.push_str(&self.text[cursor..node.span.start]);
            let value = classify(node.label.as_deref());
            out.push_str(&annotated_node(&self.text, node, key, value));
            cursor = node.span.end;
        }
        out.push_str(&self.text[cursor..]);

        let touched = self.nodes.len();
        self.nodes = scan_nodes(&out)?;
        self.text = out;
        Ok(touched)
    }

    /// Replace the file on disk with this document
    pub fn write(&self, path: &Path) -> Result<()> {
        cache::write_atomic(path, self.text.as_bytes())
    }
}

fn malformed(msg: &str) -> ClusterError {
    ClusterError::NetworkArtifact(format!("malformed GraphML: {}", msg))
}

/// True if `tag` continues as an element name boundary at `at`
fn is_tag_boundary(text: &str, at: usize) -> bool {
    matches!(text[at..].chars().next(), Some(c) if c.is_whitespace() || c == '>' || c == '/')
}

fn scan_nodes(text: &str) -> Result<Vec<GraphNode>> {
    let mut nodes = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(NODE_OPEN) {
        let start = cursor + rel;
        let after = start + NODE_OPEN.len();
        if !is_tag_boundary(text, after) {
            cursor = after;
            continue;
        }

        let tag_end = text[after..]
            .find('>')
            .map(|i| after + i)
            .ok_or_else(|| malformed("unterminated <node> tag"))?;
        let id = attribute(&text[start..tag_end], "id").unwrap_or_default();

        if text[..tag_end].ends_with('/') {
            nodes.push(GraphNode {
                id,
                label: None,
                span: NodeSpan {
                    start,
                    open_end: tag_end + 1,
                    close_start: None,
                    end: tag_end + 1,
                },
            });
            cursor = tag_end + 1;
            continue;
        }

        let body_start = tag_end + 1;
        let close_start = text[body_start..]
            .find(NODE_CLOSE)
            .map(|i| body_start + i)
            .ok_or_else(|| malformed(&format!("node {} has no closing tag", id)))?;
        let end = close_start + NODE_CLOSE.len();

        nodes.push(GraphNode {
            label: first_data_text(&text[body_start..close_start]),
            id,
            span: NodeSpan {
                start,
                open_end: body_start,
                close_start: Some(close_start),
                end,
            },
        });
        cursor = end;
    }

    Ok(nodes)
}

/// Locate the next <data> element in `body` at or after `from`:
/// (element start, start tag end, element end)
fn next_data_element(body: &str, from: usize) -> Option<(usize, usize, usize)> {
    let mut cursor = from;
    while let Some(rel) = body[cursor..].find(DATA_OPEN) {
        let start = cursor + rel;
        let after = start + DATA_OPEN.len();
        if !is_tag_boundary(body, after) {
            cursor = after;
            continue;
        }
        let tag_end = after + body[after..].find('>')?;
        if body[..tag_end].ends_with('/') {
            return Some((start, tag_end, tag_end + 1));
        }
        let close = tag_end + 1 + body[tag_end + 1..].find(DATA_CLOSE)?;
        return Some((start, tag_end, close + DATA_CLOSE.len()));
    }
    None
}

fn first_data_text(body: &str) -> Option<String> {
    let (_, tag_end, end) = next_data_element(body, 0)?;
    if end == tag_end + 1 {
        return None;
    }
    let inner = &body[tag_end + 1..end - DATA_CLOSE.len()];
    Some(unescape(inner.trim()))
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let mut from = 0;
    while let Some(rel) = tag[from..].find(name) {
        let pos = from + rel;
        from = pos + name.len();

        let preceded_by_space = tag[..pos].chars().last().is_some_and(char::is_whitespace);
        let rest = tag[from..].trim_start();
        if !preceded_by_space || !rest.starts_with('=') {
            continue;
        }
        let value = rest[1..].trim_start();
        let quote = value.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let inner = &value[1..];
        let end = inner.find(quote)?;
        return Some(unescape(&inner[..end]));
    }
    None
}

/// Escape text for use in GraphML character data or attribute values
pub fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Whitespace between the start of the line and `at`, if only whitespace
fn line_indent(text: &str, at: usize) -> &str {
    let line_start = text[..at].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &text[line_start..at];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix
    } else {
        ""
    }
}

/// Drop existing <data key="{key}"> children together with their line
fn strip_data_key(body: &str, key: &str) -> String {
    let mut body = body.to_string();
    let mut cursor = 0;

    while let Some((start, tag_end, end)) = next_data_element(&body, cursor) {
        if attribute(&body[start..tag_end], "key").as_deref() != Some(key) {
            cursor = end;
            continue;
        }
        let mut cut = body[..start].trim_end_matches([' ', '\t']).len();
        if body[..cut].ends_with('\n') {
            cut -= 1;
            if body[..cut].ends_with('\r') {
                cut -= 1;
            }
        }
        body.replace_range(cut..end, "");
        cursor = cut;
    }

    body
}

fn annotated_node(text: &str, node: &GraphNode, key: &str, value: &str) -> String {
    let indent = line_indent(text, node.span.start);
    let data = format!("<data key=\"{}\">{}</data>", key, value);

    let Some(close_start) = node.span.close_start else {
        let open = text[node.span.start..node.span.open_end]
            .trim_end_matches('>')
            .trim_end_matches('/')
            .trim_end();
        return format!("{open}>\n{indent}  {data}\n{indent}{NODE_CLOSE}");
    };

    let start_tag = &text[node.span.start..node.span.open_end];
    let body = strip_data_key(&text[node.span.open_end..close_start], key);
    let content = body.trim_end();
    let trailing = &body[content.len()..];

    let new_body = if body.contains('\n') {
        let child_indent = if content.trim().is_empty() {
            format!("{indent}  ")
        } else {
            let first_line = content.find('\n').map_or(0, |i| i + 1);
            let rest = &content[first_line..];
            let width = rest.len() - rest.trim_start_matches([' ', '\t']).len();
            rest[..width].to_string()
        };
        let trailing = if trailing.contains('\n') {
            trailing.to_string()
        } else {
            format!("\n{indent}")
        };
        format!("{content}\n{child_indent}{data}{trailing}")
    } else {
        format!("{content}{data}{trailing}")
    };

    format!("{start_tag}{new_body}{NODE_CLOSE}")
}
