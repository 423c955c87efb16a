use std::sync::{Arc, Mutex};

use edital_editor_core::{
    ActivePanel, DEFAULT_PLACEHOLDER, EditError, EditorSession, FeatureFlags, Key, KeyStroke, Panel, Point, Selection,
    SessionConfig, SessionEvent,
};

fn session_with(content: &str) -> EditorSession {
    EditorSession::new(SessionConfig {
        content: content.to_string(),
        ..SessionConfig::default()
    })
    .unwrap()
}

fn record(session: &mut EditorSession) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    session.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

#[test]
fn config_defaults_and_json() {
    let config = SessionConfig::default();
    assert_eq!(config.placeholder, DEFAULT_PLACEHOLDER);
    assert!(config.features.tables);
    assert!(config.menus.range_menu);
    assert!(!config.read_only);

    let config = SessionConfig::from_json_str(
        r#"{
            "features": { "tables": false },
            "mentions": [{ "id": "nomeEdital", "label": "Nome do edital" }],
            "read_only": true,
            "content": "<p>oi</p>"
        }"#,
    )
    .unwrap();
    assert!(!config.features.tables);
    assert!(config.features.lists);
    assert_eq!(config.mentions.len(), 1);
    assert_eq!(config.mentions[0].label, "Nome do edital");
    assert!(config.read_only);
    assert_eq!(config.placeholder, DEFAULT_PLACEHOLDER);

    assert!(SessionConfig::from_json_str("{ \"read_only\": 3 }").is_err());
}

#[test]
fn content_round_trips_and_changes_are_announced() {
    let mut session = session_with("<p>oi</p>");
    assert_eq!(session.value(), "<p>oi</p>");
    let events = record(&mut session);

    session.set_selection(Selection::collapsed(Point::new(vec![0, 0], 2)));
    session.type_text("!").unwrap();
    assert_eq!(session.value(), "<p>oi!</p>");
    assert_eq!(
        events.lock().unwrap().as_slice(),
        [SessionEvent::ContentChanged {
            html: "<p>oi!</p>".to_string()
        }]
    );

    session.set_content("<h2>novo</h2>").unwrap();
    assert_eq!(session.value(), "<h2>novo</h2>");
    assert_eq!(events.lock().unwrap().len(), 2);
    assert!(!session.editor().can_undo());
    assert_eq!(session.value_tree().schema, "edital-editor");
}

#[test]
fn no_op_commands_stay_silent() {
    let mut session = session_with("<p>oi</p>");
    let events = record(&mut session);
    session.run_command("block.outdent", None).unwrap();
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn read_only_blocks_edits_and_is_announced() {
    let mut session = session_with("<p>oi</p>");
    let events = record(&mut session);

    session.set_read_only(true);
    session.set_read_only(true);
    assert!(session.is_read_only());
    assert_eq!(
        events.lock().unwrap().as_slice(),
        [SessionEvent::ReadOnlyChanged { read_only: true }]
    );

    assert_eq!(session.type_text("x").unwrap_err(), EditError::ReadOnly);
    assert_eq!(
        session.run_command("marks.toggle_bold", None).unwrap_err(),
        EditError::ReadOnly
    );
    assert!(session.toolbar().state().read_only);
    assert_eq!(session.value(), "<p>oi</p>");

    session.set_read_only(false);
    session.type_text("x").unwrap();
}

#[test]
fn placeholder_only_while_empty() {
    let mut session = session_with("<p></p>");
    assert_eq!(session.placeholder(), Some(DEFAULT_PLACEHOLDER));
    session.type_text("a").unwrap();
    assert_eq!(session.placeholder(), None);
}

#[test]
fn keyboard_shortcuts() {
    let mut session = session_with("<p>oi</p>");

    assert!(session.handle_key(KeyStroke::new(Key::Tab)).unwrap());
    assert_eq!(session.value(), r#"<p style="margin-left: 30px">oi</p>"#);
    assert!(session.handle_key(KeyStroke::new(Key::Tab).shift()).unwrap());
    assert_eq!(session.value(), "<p>oi</p>");

    session.set_selection(Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], 2)));
    assert!(session.handle_key(KeyStroke::new(Key::Char('b')).primary()).unwrap());
    assert_eq!(session.value(), "<p><strong>oi</strong></p>");

    assert!(session.handle_key(KeyStroke::new(Key::Char('z')).primary()).unwrap());
    assert_eq!(session.value(), "<p>oi</p>");
    assert!(session.handle_key(KeyStroke::new(Key::Char('Z')).primary().shift()).unwrap());
    assert_eq!(session.value(), "<p><strong>oi</strong></p>");

    assert!(!session.handle_key(KeyStroke::new(Key::Char('q')).primary()).unwrap());
    assert!(!session.handle_key(KeyStroke::new(Key::Left)).unwrap());
}

#[test]
fn shortcuts_for_disabled_features_are_ignored() {
    let mut session = EditorSession::new(SessionConfig {
        features: FeatureFlags {
            page_break: false,
            ..FeatureFlags::default()
        },
        content: "<p>oi</p>".to_string(),
        ..SessionConfig::default()
    })
    .unwrap();
    assert!(!session.handle_key(KeyStroke::new(Key::Enter).primary()).unwrap());
    assert_eq!(session.value(), "<p>oi</p>");
}

#[test]
fn focus_and_blur_fire_once_per_transition() {
    let mut session = session_with("<p>oi</p>");
    let events = record(&mut session);

    session.focus();
    session.focus();
    assert!(session.is_focused());
    session.blur();
    session.blur();
    assert!(!session.is_focused());

    assert_eq!(
        events.lock().unwrap().as_slice(),
        [SessionEvent::Focus, SessionEvent::Blur]
    );
}

#[test]
fn session_loads_and_edits_with_tracing_enabled() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let config = SessionConfig::from_json_str(r#"{ "content": "<h1>Edital</h1><p>corpo</p>" }"#)?;
    let mut session = EditorSession::new(config)?;
    session.set_selection(Selection::collapsed(Point::new(vec![1, 0], 5)));
    session.type_text(".")?;
    anyhow::ensure!(session.value() == "<h1>Edital</h1><p>corpo.</p>", "{}", session.value());
    Ok(())
}

#[test]
fn host_can_drive_toolbar_panels() {
    let mut session = session_with("<p>oi</p>");
    session.toolbar_mut().open_panel(Panel::Align);
    assert_eq!(session.toolbar().active_panel(), ActivePanel::Open(Panel::Align));
}

#[test]
fn value_tree_loads_back_into_another_session() {
    let source = session_with("<h2>título</h2><p>corpo</p>");
    let mut target = session_with("<p></p>");
    let events = record(&mut target);

    target.set_value(source.value_tree()).unwrap();
    assert_eq!(target.value(), "<h2>título</h2><p>corpo</p>");
    assert!(!target.editor().can_undo());
    assert_eq!(events.lock().unwrap().len(), 1);
}
