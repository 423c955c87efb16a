use edital_editor_core::{
    EditError, EditorSession, Key, KeyStroke, MentionCandidate, Node, SessionConfig, SuggestionPhase,
};

fn session() -> EditorSession {
    let mentions = ["inicioEdital", "fimEdital", "nomeEdital", "descricaoEdital"]
        .into_iter()
        .map(|id| MentionCandidate::new(id, id))
        .collect();
    EditorSession::new(SessionConfig {
        mentions,
        ..SessionConfig::default()
    })
    .unwrap()
}

fn candidate_ids(session: &EditorSession) -> Vec<String> {
    session
        .suggestion()
        .session()
        .map(|s| s.candidates.iter().map(|c| c.id.clone()).collect())
        .unwrap_or_default()
}

fn press(session: &mut EditorSession, key: Key) -> Result<bool, EditError> {
    session.handle_key(KeyStroke::new(key))
}

fn text_leaves(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push(t.text.clone()),
            Node::Element(el) => text_leaves(&el.children, out),
            Node::Void(_) => {}
        }
    }
}

#[test]
fn typing_a_query_filters_candidates() {
    let mut session = session();
    session.type_text("Nome: ").unwrap();
    assert!(!session.suggestion().is_active());

    session.type_text("@").unwrap();
    assert_eq!(session.suggestion().phase(), SuggestionPhase::Triggered);
    assert_eq!(candidate_ids(&session).len(), 4);

    session.type_text("nome").unwrap();
    assert_eq!(session.suggestion().phase(), SuggestionPhase::Filtering);
    assert_eq!(candidate_ids(&session), ["nomeEdital"]);
}

#[test]
fn enter_replaces_the_query_with_a_mention() {
    let mut session = session();
    session.type_text("Nome: ").unwrap();
    session.type_text("@nome").unwrap();

    assert!(press(&mut session, Key::Enter).unwrap());
    assert!(!session.suggestion().is_active());
    assert_eq!(
        session.value(),
        r#"<p>Nome: <span data-type="mention" data-id="nomeEdital" data-label="nomeEdital">@nomeEdital</span></p>"#
    );

    let mut leaves = Vec::new();
    text_leaves(&session.editor().doc().children, &mut leaves);
    assert!(leaves.iter().all(|t| !t.contains("@nome")), "{leaves:?}");
    assert_eq!(session.editor().selection().focus.path, vec![0, 2]);
}

#[test]
fn arrows_cycle_the_highlight() {
    let mut session = session();
    session.type_text("@").unwrap();
    let highlighted = |s: &EditorSession| s.suggestion().session().map(|s| s.highlighted);

    assert_eq!(highlighted(&session), Some(0));
    press(&mut session, Key::Down).unwrap();
    assert_eq!(highlighted(&session), Some(1));
    press(&mut session, Key::Up).unwrap();
    press(&mut session, Key::Up).unwrap();
    assert_eq!(highlighted(&session), Some(3));

    press(&mut session, Key::Enter).unwrap();
    assert!(session.value().contains(r#"data-id="descricaoEdital""#));
}

#[test]
fn pointer_selection_commits_that_candidate() {
    let mut session = session();
    session.type_text("@").unwrap();
    session.select_suggestion(1).unwrap();
    assert!(session.value().contains(r#"data-id="fimEdital""#));

    let err = session.select_suggestion(0).unwrap_err();
    assert!(matches!(err, EditError::NotFound(_)));
}

#[test]
fn escape_dismisses_until_the_trigger_is_removed() {
    let mut session = session();
    session.type_text("@no").unwrap();
    assert!(session.suggestion().is_active());

    assert!(press(&mut session, Key::Escape).unwrap());
    assert!(!session.suggestion().is_active());
    session.type_text("m").unwrap();
    assert!(!session.suggestion().is_active());

    for _ in 0.."@nom".len() {
        session.run_command("core.delete_backward", None).unwrap();
    }
    assert_eq!(session.value(), "<p></p>");

    session.type_text("@").unwrap();
    assert!(session.suggestion().is_active());
}

#[test]
fn trigger_must_start_a_word() {
    let mut session = session();
    session.type_text("mail@nome").unwrap();
    assert!(!session.suggestion().is_active());

    session.type_text(" @nome x").unwrap();
    assert!(!session.suggestion().is_active());
}

#[test]
fn enter_without_matches_fails_and_keeps_the_document() {
    let mut session = session();
    session.type_text("@zzz").unwrap();
    assert!(session.suggestion().is_active());
    assert!(candidate_ids(&session).is_empty());
    let before = session.value();

    let err = press(&mut session, Key::Enter).unwrap_err();
    assert!(matches!(err, EditError::NotFound(_)));
    assert_eq!(session.value(), before);
}

#[test]
fn suggestion_hides_the_floating_menu() {
    let mut session = session();
    session.type_text("@").unwrap();
    assert!(!session.toolbar().menu().visible);
}
