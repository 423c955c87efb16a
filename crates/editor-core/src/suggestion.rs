//! `@` mention autocomplete.
//!
//! The machine never edits the document on its own: it watches the text
//! before the caret after every change and only writes on commit, through the
//! `mention.insert` command.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Editor, Node, Point};
use crate::error::EditError;
use crate::keys::Key;
use crate::plugin::node_at_path;

pub const TRIGGER: char = '@';
pub const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionCandidate {
    pub id: String,
    pub label: String,
}

impl MentionCandidate {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.label.to_lowercase().contains(&query) || self.id.to_lowercase().contains(&query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionPhase {
    Idle,
    /// The trigger was typed and nothing follows it yet.
    Triggered,
    Filtering,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionSession {
    /// Position of the trigger character itself.
    pub trigger: Point,
    pub query: String,
    pub candidates: Vec<MentionCandidate>,
    pub highlighted: usize,
}

impl SuggestionSession {
    pub fn highlighted_candidate(&self) -> Option<&MentionCandidate> {
        self.candidates.get(self.highlighted).or_else(|| self.candidates.first())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionEvent {
    Opened(SuggestionSession),
    Updated(SuggestionSession),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The key belonged to the suggestion popup.
    Handled,
    Committed(MentionCandidate),
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct MentionSuggestion {
    catalog: Vec<MentionCandidate>,
    session: Option<SuggestionSession>,
    /// Trigger the user dismissed; stays closed until that `@` is gone.
    dismissed: Option<Point>,
}

impl MentionSuggestion {
    pub fn new(catalog: Vec<MentionCandidate>) -> Self {
        Self {
            catalog,
            session: None,
            dismissed: None,
        }
    }

    pub fn catalog(&self) -> &[MentionCandidate] {
        &self.catalog
    }

    pub fn session(&self) -> Option<&SuggestionSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn phase(&self) -> SuggestionPhase {
        match &self.session {
            None => SuggestionPhase::Idle,
            Some(session) if session.query.is_empty() => SuggestionPhase::Triggered,
            Some(_) => SuggestionPhase::Filtering,
        }
    }

    pub fn candidates_for(&self, query: &str) -> Vec<MentionCandidate> {
        self.catalog
            .iter()
            .filter(|c| c.matches(query))
            .take(MAX_SUGGESTIONS)
            .cloned()
            .collect()
    }

    /// Re-reads the text before the caret. Call after every document or
    /// selection change.
    pub fn sync(&mut self, editor: &Editor) -> Option<SuggestionEvent> {
        let detected = detect_trigger(editor);
        if self.dismissed.is_some() && detected.as_ref().map(|(trigger, _)| trigger) != self.dismissed.as_ref() {
            self.dismissed = None;
        }

        let next = detected
            .filter(|(trigger, _)| self.dismissed.as_ref() != Some(trigger))
            .map(|(trigger, query)| {
                let candidates = self.candidates_for(&query);
                let highlighted = match &self.session {
                    Some(prev) if prev.trigger == trigger && prev.candidates == candidates => prev.highlighted,
                    _ => 0,
                };
                SuggestionSession {
                    trigger,
                    query,
                    candidates,
                    highlighted,
                }
            });

        let event = match (&self.session, &next) {
            (None, None) => None,
            (None, Some(session)) => Some(SuggestionEvent::Opened(session.clone())),
            (Some(_), None) => Some(SuggestionEvent::Closed),
            (Some(prev), Some(session)) if prev != session => Some(SuggestionEvent::Updated(session.clone())),
            (Some(_), Some(_)) => None,
        };
        if let Some(event) = &event {
            debug!(?event, "mention suggestion");
        }
        self.session = next;
        event
    }

    pub fn handle_key(&mut self, key: Key, editor: &mut Editor) -> Result<KeyOutcome, EditError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(KeyOutcome::Ignored);
        };
        let count = session.candidates.len();
        match key {
            Key::Down => {
                if count > 0 {
                    session.highlighted = (session.highlighted + 1) % count;
                }
                Ok(KeyOutcome::Handled)
            }
            Key::Up => {
                if count > 0 {
                    session.highlighted = (session.highlighted + count - 1) % count;
                }
                Ok(KeyOutcome::Handled)
            }
            Key::Enter => self.commit(editor).map(KeyOutcome::Committed),
            Key::Escape => {
                self.cancel();
                Ok(KeyOutcome::Handled)
            }
            _ => Ok(KeyOutcome::Ignored),
        }
    }

    /// Closes the popup without touching the document.
    pub fn cancel(&mut self) {
        if let Some(session) = self.session.take() {
            self.dismissed = Some(session.trigger);
        }
    }

    /// Replaces `@query` with a mention of the highlighted (or first) candidate.
    pub fn commit(&mut self, editor: &mut Editor) -> Result<MentionCandidate, EditError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| EditError::NotFound("no active mention suggestion".to_string()))?;
        let candidate = session
            .highlighted_candidate()
            .cloned()
            .ok_or_else(|| EditError::NotFound(format!("no mention matches \"{}\"", session.query)))?;

        let end = session.trigger.offset + TRIGGER.len_utf8() + session.query.len();
        editor.run_command(
            "mention.insert",
            Some(serde_json::json!({
                "id": candidate.id,
                "label": candidate.label,
                "replace": {
                    "path": session.trigger.path,
                    "start": session.trigger.offset,
                    "end": end,
                },
            })),
        )?;
        self.session = None;
        Ok(candidate)
    }

    /// Pointer selection of the candidate at `index`.
    pub fn select(&mut self, index: usize, editor: &mut Editor) -> Result<MentionCandidate, EditError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| EditError::NotFound("no active mention suggestion".to_string()))?;
        if index >= session.candidates.len() {
            return Err(EditError::NotFound(format!("no mention candidate at {index}")));
        }
        session.highlighted = index;
        self.commit(editor)
    }
}

/// Trigger position and query for a collapsed caret sitting after `@query`.
/// The `@` must open the text or follow whitespace, and the query may not
/// contain whitespace.
fn detect_trigger(editor: &Editor) -> Option<(Point, String)> {
    let sel = editor.selection();
    if !sel.is_collapsed() {
        return None;
    }
    let caret = &sel.focus;
    let Some(Node::Text(leaf)) = node_at_path(editor.doc(), &caret.path) else {
        return None;
    };
    let before = leaf.text.get(..caret.offset)?;
    let at = before.rfind(TRIGGER)?;
    let query = &before[at + TRIGGER.len_utf8()..];
    if query.chars().any(char::is_whitespace) {
        return None;
    }

    let opens_word = match before[..at].chars().next_back() {
        Some(prev) => prev.is_whitespace(),
        None => preceded_by_break(editor, &caret.path),
    };
    opens_word.then(|| (Point::new(caret.path.clone(), at), query.to_string()))
}

/// Whether the inline sibling before the leaf at `path` ends a word.
fn preceded_by_break(editor: &Editor, path: &[usize]) -> bool {
    let Some((&ix, parent)) = path.split_last() else {
        return true;
    };
    if ix == 0 {
        return true;
    }
    let mut prev = parent.to_vec();
    prev.push(ix - 1);
    match node_at_path(editor.doc(), &prev) {
        Some(Node::Text(t)) => t.text.chars().next_back().is_none_or(char::is_whitespace),
        Some(Node::Void(v)) => v.inline_text().ends_with(char::is_whitespace),
        _ => true,
    }
}
