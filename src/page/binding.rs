//! Page binding — the script-side half of the system, one task per tab.
//!
//! The binding owns the only authoritative view of "what text is selected
//! and where it must be written back": a sticky [`EditableTarget`] captured
//! from selection-change notifications. Nothing else reads or writes that
//! state; the coordinator reaches it exclusively through the control
//! channel (`Ping` / `Extract` / `Apply`), each call carrying a oneshot
//! reply slot.
//!
//! The target is deliberately kept when the selection collapses or focus
//! moves away — the transient UI surface steals focus the instant it
//! opens, and the binding must still remember where the text came from.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::RedraftError;
use crate::page::{
    Capability, DocEvent, DocSelection, Document, ElementBody, ElementId, SurfaceRange,
};

/// The captured write-back location: element, capability, and the range
/// descriptor appropriate to it. Valid only while the element stays
/// attached; always re-checked before use.
#[derive(Debug, Clone, Copy)]
pub struct EditableTarget {
    pub element: ElementId,
    pub capability: Capability,
    pub range: SurfaceRange,
}

/// Result of an extract request.
#[derive(Debug, Clone)]
pub struct ExtractReply {
    pub selected_text: Option<String>,
    pub element_preview: Option<String>,
}

pub enum BindingMsg {
    Ping {
        reply: oneshot::Sender<()>,
    },
    Extract {
        reply: oneshot::Sender<ExtractReply>,
    },
    Apply {
        text: String,
        reply: oneshot::Sender<Result<(), RedraftError>>,
    },
}

/// Cheap clonable handle to an injected binding. A closed channel means
/// the binding is gone and the coordinator must re-inject.
#[derive(Clone)]
pub struct BindingHandle {
    tx: mpsc::Sender<BindingMsg>,
}

impl BindingHandle {
    /// Liveness probe. Distinguishes "not yet injected" from "injected
    /// but target lost" — a live binding always answers, target or not.
    pub async fn ping(&self) -> Result<(), RedraftError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BindingMsg::Ping { reply })
            .await
            .map_err(|_| RedraftError::Transport("binding channel closed".into()))?;
        rx.await
            .map_err(|_| RedraftError::Transport("binding dropped ping reply".into()))
    }

    pub async fn extract(&self) -> Result<ExtractReply, RedraftError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BindingMsg::Extract { reply })
            .await
            .map_err(|_| RedraftError::Transport("binding channel closed".into()))?;
        rx.await
            .map_err(|_| RedraftError::Transport("binding dropped extract reply".into()))
    }

    pub async fn apply(&self, text: String) -> Result<(), RedraftError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BindingMsg::Apply { text, reply })
            .await
            .map_err(|_| RedraftError::Transport("binding channel closed".into()))?;
        rx.await
            .map_err(|_| RedraftError::Transport("binding dropped apply reply".into()))?
    }
}

/// Install a binding into a document: spawns the task and returns its
/// handle. Injecting twice would duplicate the selection listener, which
/// is why callers must probe first and only inject on a failed probe.
pub fn inject(doc: Arc<Mutex<Document>>) -> BindingHandle {
    let events = doc.lock().expect("document lock").subscribe();
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(run(doc, events, rx));
    BindingHandle { tx }
}

async fn run(
    doc: Arc<Mutex<Document>>,
    mut events: broadcast::Receiver<DocEvent>,
    mut control: mpsc::Receiver<BindingMsg>,
) {
    let mut target: Option<EditableTarget> = None;
    loop {
        tokio::select! {
            msg = control.recv() => {
                let Some(msg) = msg else {
                    // Handle dropped — superseded by a fresh injection or
                    // the tab closed.
                    debug!("binding control channel closed, stopping");
                    break;
                };
                let mut guard = doc.lock().expect("document lock");
                match msg {
                    BindingMsg::Ping { reply } => {
                        let _ = reply.send(());
                    }
                    BindingMsg::Extract { reply } => {
                        let _ = reply.send(extract(&guard, &mut target));
                    }
                    BindingMsg::Apply { text, reply } => {
                        let _ = reply.send(apply(&mut guard, &mut target, &text));
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(DocEvent::SelectionChanged) => {
                        let doc = doc.lock().expect("document lock");
                        observe(&doc, &mut target);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "binding missed selection events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

// ─── Observe ─────────────────────────────────────────────────────────────────

/// Selection-change observation: capture a new target when the focused
/// element is editable and the selection inside it is non-empty. An empty
/// selection or a focus move never clears an existing capture.
fn observe(doc: &Document, target: &mut Option<EditableTarget>) {
    let (Some(focused), Some(sel)) = (doc.focused(), doc.selection()) else {
        return;
    };
    if sel.element != focused {
        return;
    }
    let Some(capability) = doc.element(focused).and_then(|e| e.capability()) else {
        return;
    };
    let non_empty = doc
        .selected_text()
        .is_some_and(|t| !t.trim().is_empty());
    if non_empty {
        *target = Some(EditableTarget {
            element: focused,
            capability,
            range: sel.range,
        });
    }
}

// ─── Extract ─────────────────────────────────────────────────────────────────

/// Best-effort selected text, in priority order:
/// 1. the stored target's captured range, re-validated and re-read live;
/// 2. the focused element's live selection;
/// 3. the global selection, if its owning element is editable.
///
/// Every successful branch re-captures the target so a later apply lands
/// in the same place.
fn extract(doc: &Document, target: &mut Option<EditableTarget>) -> ExtractReply {
    let selected_text = extract_text(doc, target);
    let element_preview = target
        .as_ref()
        .and_then(|t| doc.element(t.element))
        .map(|e| e.preview());
    ExtractReply {
        selected_text,
        element_preview,
    }
}

fn extract_text(doc: &Document, target: &mut Option<EditableTarget>) -> Option<String> {
    // 1. Stored capture, re-validated against attachment.
    if let Some(t) = *target {
        if doc.is_attached(t.element) {
            match t.capability {
                Capability::RichText => {
                    if let SurfaceRange::Rich(r) = t.range {
                        if doc.rich_node_attached(t.element, r.node) {
                            if let Some(text) = doc.range_text(t.element, &t.range) {
                                let trimmed = text.trim();
                                if !trimmed.is_empty() {
                                    return Some(trimmed.to_string());
                                }
                            }
                        }
                    }
                }
                Capability::PlainField => {
                    // Plain fields report live offsets; the capture follows them.
                    if let Some((start, end, text)) = doc.plain_selection(t.element) {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            *target = Some(EditableTarget {
                                range: SurfaceRange::Plain { start, end },
                                ..t
                            });
                            return Some(trimmed.to_string());
                        }
                    }
                }
            }
        }
    }

    // 2. The focused element's own live selection.
    if let (Some(focused), Some(sel)) = (doc.focused(), doc.selection()) {
        if sel.element == focused {
            if let Some(capability) = doc.element(focused).and_then(|e| e.capability()) {
                if let Some(text) = doc.selected_text() {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        *target = Some(EditableTarget {
                            element: focused,
                            capability,
                            range: sel.range,
                        });
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
    }

    // 3. Global selection whose owning element is an editable surface,
    //    focused or not.
    if let Some(DocSelection { element, range }) = doc.selection() {
        if let Some(capability) = doc.element(element).and_then(|e| e.capability()) {
            if let Some(text) = doc.range_text(element, &range) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    *target = Some(EditableTarget {
                        element,
                        capability,
                        range,
                    });
                    return Some(trimmed.to_string());
                }
            }
        }
    }

    None
}

// ─── Apply ───────────────────────────────────────────────────────────────────

/// Replace the captured range with `text` and re-capture a collapsed
/// range at the insertion end, so sequential applies stack instead of
/// overwriting each other.
fn apply(
    doc: &mut Document,
    target: &mut Option<EditableTarget>,
    text: &str,
) -> Result<(), RedraftError> {
    let t = target.ok_or(RedraftError::NoTarget)?;
    if !doc.is_attached(t.element) {
        return Err(RedraftError::NoTarget);
    }

    match t.capability {
        Capability::RichText => {
            // Use the stored range when its node survived; otherwise the
            // insertion is best-effort rather than an error.
            let range = match t.range {
                SurfaceRange::Rich(r) if doc.rich_node_attached(t.element, r.node) => Some(r),
                _ => {
                    debug!(element = t.element, "stored range is stale, best-effort insert");
                    None
                }
            };
            let collapsed = doc
                .insert_rich(t.element, range, text)
                .map_err(|e| RedraftError::Apply(e.to_string()))?;
            *target = Some(EditableTarget {
                range: SurfaceRange::Rich(collapsed),
                ..t
            });
        }
        Capability::PlainField => {
            let caret = doc
                .splice_plain(t.element, text)
                .map_err(|e| RedraftError::Apply(e.to_string()))?;
            *target = Some(EditableTarget {
                range: SurfaceRange::Plain {
                    start: caret,
                    end: caret,
                },
                ..t
            });
        }
    }
    Ok(())
}

/// True when the element body and capability still agree — used by tests
/// to assert a capture is structurally sound.
#[allow(dead_code)]
fn capability_matches(body: &ElementBody, capability: Capability) -> bool {
    matches!(
        (body, capability),
        (ElementBody::Rich { .. }, Capability::RichText)
            | (ElementBody::Plain { .. }, Capability::PlainField)
    )
}
