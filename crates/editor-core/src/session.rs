//! One editing surface as a host sees it: HTML in, HTML and signals out.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::SessionConfig;
use crate::core::{Chain, Editor, Point, Selection};
use crate::error::{ConfigError, EditError, MarkupError, ValueError};
use crate::keys::{Key, KeyStroke};
use crate::markup::{parse_html, serialize_html};
use crate::plugin::{PluginRegistry, first_text_point};
use crate::serde_value::EditorValue;
use crate::suggestion::{KeyOutcome, MentionSuggestion, SuggestionEvent};
use crate::toolbar::Toolbar;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ContentChanged { html: String },
    Focus,
    Blur,
    ReadOnlyChanged { read_only: bool },
}

type SessionListener = Box<dyn FnMut(&SessionEvent) + Send>;

pub struct EditorSession {
    editor: Editor,
    registry: Arc<PluginRegistry>,
    toolbar: Toolbar,
    suggestion: MentionSuggestion,
    placeholder: String,
    focused: bool,
    listeners: Vec<SessionListener>,
}

impl EditorSession {
    #[instrument(level = "debug", skip_all)]
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        let registry = Arc::new(PluginRegistry::from_features(&config.features));
        let doc = parse_html(&config.content, &registry)?;
        let caret = first_text_point(&doc).unwrap_or(Point::new(vec![0, 0], 0));
        let mut editor = Editor::with_registry(doc, Selection::collapsed(caret), Arc::clone(&registry))
            .with_config(config.editor_config());
        editor.set_read_only(config.read_only);

        info!(
            plugins = registry.plugin_ids().len(),
            mentions = config.mentions.len(),
            read_only = config.read_only,
            "editor session created"
        );

        let mut session = Self {
            editor,
            registry,
            toolbar: Toolbar::new(config.menus),
            suggestion: MentionSuggestion::new(config.mentions),
            placeholder: config.placeholder,
            focused: false,
            listeners: Vec::new(),
        };
        session.refresh();
        Ok(session)
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn toolbar(&self) -> &Toolbar {
        &self.toolbar
    }

    pub fn toolbar_mut(&mut self) -> &mut Toolbar {
        &mut self.toolbar
    }

    pub fn suggestion(&self) -> &MentionSuggestion {
        &self.suggestion
    }

    /// Current document as HTML.
    pub fn value(&self) -> String {
        serialize_html(self.editor.doc(), &self.registry)
    }

    pub fn value_tree(&self) -> EditorValue {
        EditorValue::from_document(self.editor.doc().clone())
    }

    /// Placeholder text, shown only while the document is empty.
    pub fn placeholder(&self) -> Option<&str> {
        self.editor.doc().is_empty().then_some(self.placeholder.as_str())
    }

    pub fn on_event(&mut self, listener: impl FnMut(&SessionEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Replaces the whole document. History is cleared.
    pub fn set_content(&mut self, html: &str) -> Result<(), MarkupError> {
        let doc = parse_html(html, &self.registry)?;
        self.editor.reset(doc);
        self.emit_content_changed();
        self.refresh();
        Ok(())
    }

    /// Loads a structured tree produced by `value_tree`. History is cleared.
    pub fn set_value(&mut self, value: EditorValue) -> Result<(), ValueError> {
        let doc = value.into_document(&self.registry)?;
        self.editor.reset(doc);
        self.emit_content_changed();
        self.refresh();
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        self.editor.is_read_only()
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        if self.editor.is_read_only() == read_only {
            return;
        }
        self.editor.set_read_only(read_only);
        info!(read_only, "editor read-only state changed");
        self.emit(SessionEvent::ReadOnlyChanged { read_only });
        self.refresh();
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn focus(&mut self) {
        if !self.focused {
            self.focused = true;
            self.emit(SessionEvent::Focus);
        }
    }

    pub fn blur(&mut self) {
        if self.focused {
            self.focused = false;
            self.emit(SessionEvent::Blur);
        }
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.editor.set_selection(selection);
        self.refresh();
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), EditError> {
        self.track(|editor| editor.run_command(id, args))
    }

    pub fn run_chain(&mut self, chain: &Chain) -> Result<(), EditError> {
        self.track(|editor| editor.run_chain(chain))
    }

    /// Types `text` at the caret, replacing any selected range.
    pub fn type_text(&mut self, text: &str) -> Result<(), EditError> {
        self.run_command("core.insert_text", Some(serde_json::json!({ "text": text })))
    }

    pub fn undo(&mut self) -> bool {
        self.track(|editor| Ok::<_, EditError>(editor.undo())).unwrap_or(false)
    }

    pub fn redo(&mut self) -> bool {
        self.track(|editor| Ok::<_, EditError>(editor.redo())).unwrap_or(false)
    }

    /// Routes a key press. Returns whether the session consumed it.
    pub fn handle_key(&mut self, stroke: KeyStroke) -> Result<bool, EditError> {
        if self.suggestion.is_active()
            && stroke.modifiers.is_empty()
            && matches!(stroke.key, Key::Up | Key::Down | Key::Enter | Key::Escape)
        {
            let before = self.editor.version();
            let outcome = self.suggestion.handle_key(stroke.key, &mut self.editor)?;
            self.after_change(before);
            return Ok(outcome != KeyOutcome::Ignored);
        }

        let m = stroke.modifiers;
        let command = match stroke.key {
            Key::Tab if !m.primary && !m.alt => Some(if m.shift { "block.outdent" } else { "block.indent" }),
            Key::Enter if m.primary && !m.shift => Some("page_break.insert"),
            Key::Char(_) if m.primary && stroke.is_char('z') => {
                return Ok(if m.shift { self.redo() } else { self.undo() });
            }
            Key::Char(_) if m.primary && !m.shift && stroke.is_char('b') => Some("marks.toggle_bold"),
            Key::Char(_) if m.primary && !m.shift && stroke.is_char('i') => Some("marks.toggle_italic"),
            Key::Char(_) if m.primary && !m.shift && stroke.is_char('u') => Some("marks.toggle_underline"),
            _ => None,
        };
        let Some(id) = command.filter(|id| self.registry.command(id).is_some()) else {
            return Ok(false);
        };
        debug!(command = id, "key shortcut");
        self.run_command(id, None)?;
        Ok(true)
    }

    /// Mention popup: commit the candidate at `index`.
    pub fn select_suggestion(&mut self, index: usize) -> Result<(), EditError> {
        let before = self.editor.version();
        let result = self.suggestion.select(index, &mut self.editor).map(|_| ());
        self.after_change(before);
        result
    }

    /// Runs an editor mutation, then emits and resyncs when it changed the document.
    fn track<T>(&mut self, f: impl FnOnce(&mut Editor) -> Result<T, EditError>) -> Result<T, EditError> {
        let before = self.editor.version();
        let result = f(&mut self.editor);
        self.after_change(before);
        result
    }

    fn after_change(&mut self, version_before: u64) {
        if self.editor.version() != version_before {
            self.emit_content_changed();
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        if let Some(SuggestionEvent::Opened(session)) = self.suggestion.sync(&self.editor) {
            debug!(query = %session.query, candidates = session.candidates.len(), "mention suggestion opened");
        }
        self.toolbar.set_suggestion_active(self.suggestion.is_active());
        self.toolbar.sync(&self.editor);
    }

    fn emit_content_changed(&mut self) {
        let html = self.value();
        self.emit(SessionEvent::ContentChanged { html });
    }

    fn emit(&mut self, event: SessionEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}
