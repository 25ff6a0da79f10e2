//! Host document model — the stand-in for the page a binding is injected
//! into.
//!
//! A `Document` holds attached elements: rich-text surfaces (ordered text
//! nodes; node boundaries are the surface's line-break representation),
//! plain text fields (value + selection offsets), and static regions
//! (non-editable, so the selection fallback has a negative case). The
//! document also tracks focus and one global selection, and publishes
//! events on every selection change and every synthesized input/change
//! notification.
//!
//! All offsets are character offsets, clamped to the surface length, so a
//! stale range can never slice through a multi-byte boundary.

pub mod binding;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type ElementId = u64;
pub type NodeId = u64;

/// What kind of editing a surface supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    RichText,
    PlainField,
}

/// Declarative element description used by `tab.open`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ElementSpec {
    /// Rich-text surface; `text` is split on `\n` into nodes.
    RichText { text: String },
    /// Plain input/textarea-like field.
    PlainField { text: String },
    /// Non-editable text region.
    Static { text: String },
}

/// One line of a rich-text surface. Node ids are stable for the lifetime
/// of the document, so captured ranges can be re-validated much later.
#[derive(Debug, Clone)]
pub struct TextNode {
    pub id: NodeId,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum ElementBody {
    Rich { nodes: Vec<TextNode> },
    Plain {
        value: String,
        sel_start: usize,
        sel_end: usize,
    },
    Static { text: String },
}

#[derive(Debug, Clone)]
pub struct Element {
    pub id: ElementId,
    pub body: ElementBody,
}

impl Element {
    pub fn capability(&self) -> Option<Capability> {
        match self.body {
            ElementBody::Rich { .. } => Some(Capability::RichText),
            ElementBody::Plain { .. } => Some(Capability::PlainField),
            ElementBody::Static { .. } => None,
        }
    }

    pub fn is_editable(&self) -> bool {
        self.capability().is_some()
    }

    /// Full text content; rich nodes joined with `\n`.
    pub fn text(&self) -> String {
        match &self.body {
            ElementBody::Rich { nodes } => nodes
                .iter()
                .map(|n| n.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            ElementBody::Plain { value, .. } => value.clone(),
            ElementBody::Static { text } => text.clone(),
        }
    }

    /// Short content preview sent alongside extraction results.
    pub fn preview(&self) -> String {
        let text = self.text();
        text.chars().take(100).collect()
    }
}

/// A range inside a rich-text surface, addressed by node id so the range
/// survives edits to other nodes and can be detected as stale when its
/// node is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RichRange {
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
}

/// A captured position inside one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRange {
    Rich(RichRange),
    Plain { start: usize, end: usize },
}

/// The document-global selection: one contiguous range in one element.
#[derive(Debug, Clone, Copy)]
pub struct DocSelection {
    pub element: ElementId,
    pub range: SurfaceRange,
}

/// Events a document publishes to injected bindings and host-side
/// listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocEvent {
    SelectionChanged,
    /// Synthesized after a successful programmatic write, so host logic
    /// bound to the surface observes the mutation.
    Input { element: ElementId },
    Change { element: ElementId },
}

/// Why an in-surface mutation could not be performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRejected {
    ElementDetached,
    NotEditable,
}

impl std::fmt::Display for EditRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditRejected::ElementDetached => write!(f, "element is detached from the document"),
            EditRejected::NotEditable => write!(f, "element is not editable"),
        }
    }
}

pub struct Document {
    elements: Vec<Element>,
    next_element: ElementId,
    next_node: NodeId,
    focused: Option<ElementId>,
    selection: Option<DocSelection>,
    events: broadcast::Sender<DocEvent>,
}

impl Document {
    pub fn new(specs: &[ElementSpec]) -> Self {
        let (events, _) = broadcast::channel(64);
        let mut doc = Self {
            elements: Vec::new(),
            next_element: 1,
            next_node: 1,
            focused: None,
            selection: None,
            events,
        };
        for spec in specs {
            doc.append(spec);
        }
        doc
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DocEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn append(&mut self, spec: &ElementSpec) -> ElementId {
        let id = self.next_element;
        self.next_element += 1;
        let body = match spec {
            ElementSpec::RichText { text } => {
                let nodes = text
                    .split('\n')
                    .map(|line| {
                        let id = self.next_node;
                        self.next_node += 1;
                        TextNode {
                            id,
                            text: line.to_string(),
                        }
                    })
                    .collect();
                ElementBody::Rich { nodes }
            }
            ElementSpec::PlainField { text } => ElementBody::Plain {
                value: text.clone(),
                sel_start: 0,
                sel_end: 0,
            },
            ElementSpec::Static { text } => ElementBody::Static { text: text.clone() },
        };
        self.elements.push(Element { id, body });
        id
    }

    /// Detach an element. Focus and the global selection are dropped when
    /// they point at it; captures held elsewhere simply go stale.
    pub fn detach(&mut self, id: ElementId) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| e.id != id);
        if self.elements.len() == before {
            return false;
        }
        if self.focused == Some(id) {
            self.focused = None;
        }
        if self.selection.map(|s| s.element) == Some(id) {
            self.selection = None;
            self.emit(DocEvent::SelectionChanged);
        }
        true
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub fn is_attached(&self, id: ElementId) -> bool {
        self.element(id).is_some()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn focused(&self) -> Option<ElementId> {
        self.focused
    }

    pub fn focus(&mut self, id: ElementId) -> bool {
        if self.is_attached(id) {
            self.focused = Some(id);
            true
        } else {
            false
        }
    }

    /// Drop focus without touching the selection — what happens to the
    /// page the moment a transient UI surface opens and steals it.
    pub fn blur(&mut self) {
        self.focused = None;
    }

    pub fn selection(&self) -> Option<DocSelection> {
        self.selection
    }

    /// Select `start..end` (character offsets) inside an element; for rich
    /// surfaces the offsets address the node at `node_index`. Focuses the
    /// element and fires a selection-change notification, like a user
    /// drag-select would.
    pub fn select(
        &mut self,
        element: ElementId,
        node_index: usize,
        start: usize,
        end: usize,
    ) -> Result<(), EditRejected> {
        let range = {
            let el = self
                .element(element)
                .ok_or(EditRejected::ElementDetached)?;
            match &el.body {
                ElementBody::Rich { nodes } => {
                    let node = nodes
                        .get(node_index)
                        .ok_or(EditRejected::ElementDetached)?;
                    let (start, end) = clamp_range(&node.text, start, end);
                    SurfaceRange::Rich(RichRange {
                        node: node.id,
                        start,
                        end,
                    })
                }
                ElementBody::Plain { value, .. } => {
                    let (start, end) = clamp_range(value, start, end);
                    SurfaceRange::Plain { start, end }
                }
                ElementBody::Static { text } => {
                    let (start, end) = clamp_range(text, start, end);
                    SurfaceRange::Plain { start, end }
                }
            }
        };
        if let Some(Element {
            body: ElementBody::Plain {
                sel_start, sel_end, ..
            },
            ..
        }) = self.element_mut(element)
        {
            if let SurfaceRange::Plain { start, end } = range {
                *sel_start = start;
                *sel_end = end;
            }
        }
        self.focused = Some(element);
        self.selection = Some(DocSelection { element, range });
        self.emit(DocEvent::SelectionChanged);
        Ok(())
    }

    /// Text of the current global selection, if any.
    pub fn selected_text(&self) -> Option<String> {
        let sel = self.selection?;
        self.range_text(sel.element, &sel.range)
    }

    /// Text of an arbitrary range, if the element (and node) still exist.
    pub fn range_text(&self, element: ElementId, range: &SurfaceRange) -> Option<String> {
        let el = self.element(element)?;
        match (&el.body, range) {
            (ElementBody::Rich { nodes }, SurfaceRange::Rich(r)) => {
                let node = nodes.iter().find(|n| n.id == r.node)?;
                Some(char_slice(&node.text, r.start, r.end))
            }
            (ElementBody::Plain { value, .. }, SurfaceRange::Plain { start, end }) => {
                Some(char_slice(value, *start, *end))
            }
            (ElementBody::Static { text }, SurfaceRange::Plain { start, end }) => {
                Some(char_slice(text, *start, *end))
            }
            _ => None,
        }
    }

    /// Live selection text of a plain field, read from the element's own
    /// offsets (the way a field reports `selectionStart`/`selectionEnd`).
    pub fn plain_selection(&self, element: ElementId) -> Option<(usize, usize, String)> {
        match &self.element(element)?.body {
            ElementBody::Plain {
                value,
                sel_start,
                sel_end,
            } => Some((*sel_start, *sel_end, char_slice(value, *sel_start, *sel_end))),
            _ => None,
        }
    }

    /// Whether a rich range's node is still attached.
    pub fn rich_node_attached(&self, element: ElementId, node: NodeId) -> bool {
        matches!(
            self.element(element),
            Some(Element {
                body: ElementBody::Rich { nodes },
                ..
            }) if nodes.iter().any(|n| n.id == node)
        )
    }

    /// Formatted insertion into a rich surface: replaces `range` with
    /// `text`, converting literal newlines into node boundaries (this
    /// surface's line-break representation). Returns the collapsed range
    /// at the end of the inserted text.
    ///
    /// When `range` is `None` (stale capture) the insertion is
    /// best-effort: the current selection is used if it sits in this
    /// element, otherwise the text lands at the end of the surface.
    pub fn insert_rich(
        &mut self,
        element: ElementId,
        range: Option<RichRange>,
        text: &str,
    ) -> Result<RichRange, EditRejected> {
        // Resolve the target range before mutating anything.
        let range = match range {
            Some(r) if self.rich_node_attached(element, r.node) => r,
            _ => self.rich_fallback_range(element)?,
        };

        let collapsed = {
            let next_node = &mut self.next_node;
            let el = self
                .elements
                .iter_mut()
                .find(|e| e.id == element)
                .ok_or(EditRejected::ElementDetached)?;
            let ElementBody::Rich { nodes } = &mut el.body else {
                return Err(EditRejected::NotEditable);
            };
            let pos = nodes
                .iter()
                .position(|n| n.id == range.node)
                .ok_or(EditRejected::ElementDetached)?;

            let (start, end) = clamp_range(&nodes[pos].text, range.start, range.end);
            let prefix = char_slice(&nodes[pos].text, 0, start);
            let suffix_len = char_len(&nodes[pos].text);
            let suffix = char_slice(&nodes[pos].text, end, suffix_len);

            let segments: Vec<&str> = text.split('\n').collect();
            if segments.len() == 1 {
                nodes[pos].text = format!("{prefix}{}{suffix}", segments[0]);
                RichRange {
                    node: nodes[pos].id,
                    start: char_len(&prefix) + char_len(segments[0]),
                    end: char_len(&prefix) + char_len(segments[0]),
                }
            } else {
                nodes[pos].text = format!("{prefix}{}", segments[0]);
                let mut insert_at = pos + 1;
                for segment in &segments[1..segments.len() - 1] {
                    let id = *next_node;
                    *next_node += 1;
                    nodes.insert(
                        insert_at,
                        TextNode {
                            id,
                            text: segment.to_string(),
                        },
                    );
                    insert_at += 1;
                }
                let last = segments[segments.len() - 1];
                let id = *next_node;
                *next_node += 1;
                nodes.insert(
                    insert_at,
                    TextNode {
                        id,
                        text: format!("{last}{suffix}"),
                    },
                );
                RichRange {
                    node: id,
                    start: char_len(last),
                    end: char_len(last),
                }
            }
        };

        self.focused = Some(element);
        self.selection = Some(DocSelection {
            element,
            range: SurfaceRange::Rich(collapsed),
        });
        self.emit(DocEvent::Input { element });
        self.emit(DocEvent::Change { element });
        Ok(collapsed)
    }

    /// Where a stale rich capture falls back to: the live selection when
    /// it sits inside this element, otherwise a collapsed range at the
    /// very end of the surface.
    fn rich_fallback_range(&self, element: ElementId) -> Result<RichRange, EditRejected> {
        if let Some(DocSelection {
            element: sel_el,
            range: SurfaceRange::Rich(r),
        }) = self.selection
        {
            if sel_el == element && self.rich_node_attached(element, r.node) {
                return Ok(r);
            }
        }
        let el = self
            .element(element)
            .ok_or(EditRejected::ElementDetached)?;
        let ElementBody::Rich { nodes } = &el.body else {
            return Err(EditRejected::NotEditable);
        };
        let last = nodes.last().ok_or(EditRejected::ElementDetached)?;
        let end = char_len(&last.text);
        Ok(RichRange {
            node: last.id,
            start: end,
            end,
        })
    }

    /// Splice `text` into a plain field at its live selection offsets and
    /// move the caret to the end of the inserted text.
    pub fn splice_plain(
        &mut self,
        element: ElementId,
        text: &str,
    ) -> Result<usize, EditRejected> {
        let el = self
            .element_mut(element)
            .ok_or(EditRejected::ElementDetached)?;
        let ElementBody::Plain {
            value,
            sel_start,
            sel_end,
        } = &mut el.body
        else {
            return Err(EditRejected::NotEditable);
        };
        let (start, end) = clamp_range(value, *sel_start, *sel_end);
        let prefix = char_slice(value, 0, start);
        let suffix = char_slice(value, end, char_len(value));
        *value = format!("{prefix}{text}{suffix}");
        let caret = start + char_len(text);
        *sel_start = caret;
        *sel_end = caret;

        self.focused = Some(element);
        self.selection = Some(DocSelection {
            element,
            range: SurfaceRange::Plain {
                start: caret,
                end: caret,
            },
        });
        self.emit(DocEvent::Input { element });
        self.emit(DocEvent::Change { element });
        Ok(caret)
    }
}

// ─── Character-offset helpers ────────────────────────────────────────────────

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Slice by character offsets, clamped to the string.
pub(crate) fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

fn clamp_range(s: &str, start: usize, end: usize) -> (usize, usize) {
    let len = char_len(s);
    let start = start.min(len);
    let end = end.clamp(start, len);
    (start, end)
}
