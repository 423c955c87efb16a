use edital_editor_core::{
    ActivePanel, Align, BlockType, ClickTarget, Document, Editor, GeometrySource, MenuCapabilities, MenuContext,
    MenuPosition, Node, NodeKind, Panel, PluginRegistry, Point, Rect, Selection, Toolbar, Viewport,
    compute_menu_position,
};
use serde_json::json;

struct FixedGeometry {
    rect: Option<Rect>,
    viewport: Viewport,
}

impl GeometrySource for FixedGeometry {
    fn selection_rect(&self) -> Option<Rect> {
        self.rect
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}

fn geometry() -> FixedGeometry {
    FixedGeometry {
        rect: Some(Rect::new(400.0, 100.0, 50.0, 20.0)),
        viewport: Viewport {
            width: 1000.0,
            height: 800.0,
        },
    }
}

fn editor_with(children: Vec<Node>) -> Editor {
    Editor::new(
        Document::new(children),
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::richtext(),
    )
}

fn select_range(editor: &mut Editor) {
    editor.set_selection(Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], 3)));
}

#[test]
fn range_menu_follows_the_selection() {
    let mut editor = editor_with(vec![Node::paragraph("hello")]);
    let mut toolbar = Toolbar::new(MenuCapabilities::default());

    toolbar.sync(&editor);
    assert!(!toolbar.menu().visible);

    select_range(&mut editor);
    toolbar.sync(&editor);
    assert!(toolbar.menu().visible);
    assert_eq!(toolbar.menu().context, MenuContext::Range);

    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0], 2)));
    toolbar.sync(&editor);
    assert!(!toolbar.menu().visible);
    assert_eq!(toolbar.menu().position, None);
}

#[test]
fn disabled_range_menu_never_shows() {
    let mut editor = editor_with(vec![Node::paragraph("hello")]);
    let mut toolbar = Toolbar::new(MenuCapabilities {
        range_menu: false,
        table_menu: true,
    });
    select_range(&mut editor);
    toolbar.sync(&editor);
    assert!(!toolbar.menu().visible);
}

#[test]
fn table_caret_shows_the_table_menu() {
    let mut editor = editor_with(vec![Node::paragraph("a")]);
    editor.run_command("table.insert", Some(json!({ "rows": 2, "cols": 2 }))).unwrap();
    let mut toolbar = Toolbar::new(MenuCapabilities::default());

    let ticket = toolbar.sync(&editor);
    assert!(toolbar.menu().visible);
    assert_eq!(toolbar.menu().context, MenuContext::Table);
    assert!(toolbar.state().in_table);
    assert!(!toolbar.state().has_caption);
    assert!(toolbar.state().is_enabled("table.delete_row"));
    assert!(!toolbar.state().is_enabled("table.insert"));

    assert!(toolbar.layout_settled(ticket, &geometry()));
    assert_eq!(toolbar.menu().position, Some(MenuPosition { x: 425.0, y: 128.0 }));
}

#[test]
fn one_panel_at_a_time_and_panels_hide_the_menu() {
    let mut editor = editor_with(vec![Node::paragraph("hello")]);
    let mut toolbar = Toolbar::new(MenuCapabilities::default());
    select_range(&mut editor);
    toolbar.sync(&editor);
    assert!(toolbar.menu().visible);

    toolbar.open_panel(Panel::HighlightColor);
    toolbar.open_panel(Panel::FontFamily);
    assert_eq!(toolbar.active_panel(), ActivePanel::Open(Panel::FontFamily));
    assert!(!toolbar.menu().visible);

    toolbar.handle_click(ClickTarget::Panel(Panel::FontFamily));
    assert_eq!(toolbar.active_panel(), ActivePanel::Open(Panel::FontFamily));
    toolbar.handle_click(ClickTarget::Trigger(Panel::FontFamily));
    assert_eq!(toolbar.active_panel(), ActivePanel::None);
    toolbar.handle_click(ClickTarget::Trigger(Panel::Align));
    toolbar.handle_click(ClickTarget::Outside);
    assert_eq!(toolbar.active_panel(), ActivePanel::None);
}

#[test]
fn showing_the_menu_closes_open_panels() {
    let mut editor = editor_with(vec![Node::paragraph("hello")]);
    let mut toolbar = Toolbar::new(MenuCapabilities::default());
    toolbar.sync(&editor);
    toolbar.open_panel(Panel::TextColor);

    select_range(&mut editor);
    toolbar.sync(&editor);
    assert!(toolbar.menu().visible);
    assert_eq!(toolbar.active_panel(), ActivePanel::None);
}

#[test]
fn only_the_latest_layout_ticket_places_the_menu() {
    let mut editor = editor_with(vec![Node::paragraph("hello")]);
    let mut toolbar = Toolbar::new(MenuCapabilities::default());
    select_range(&mut editor);

    let stale = toolbar.sync(&editor);
    let fresh = toolbar.sync(&editor);
    assert_ne!(stale, fresh);
    assert_eq!(toolbar.pending_layout(), Some(fresh));

    assert!(!toolbar.layout_settled(stale, &geometry()));
    assert_eq!(toolbar.menu().position, None);
    assert!(toolbar.layout_settled(fresh, &geometry()));
    assert!(toolbar.menu().position.is_some());
    assert!(!toolbar.layout_settled(fresh, &geometry()));

    let cancelled = toolbar.sync(&editor);
    toolbar.cancel_pending_layout();
    assert!(!toolbar.layout_settled(cancelled, &geometry()));
}

#[test]
fn menu_position_is_clamped_to_the_viewport() {
    let viewport = Viewport {
        width: 1000.0,
        height: 800.0,
    };
    let near_left = Rect::new(0.0, 100.0, 20.0, 20.0);

    let range = compute_menu_position(near_left, viewport, MenuContext::Range);
    assert_eq!(range, MenuPosition { x: 170.0, y: 128.0 });

    let table = compute_menu_position(near_left, viewport, MenuContext::Table);
    assert_eq!(table.x, 230.0);

    let near_right = Rect::new(990.0, 0.0, 10.0, 10.0);
    let range = compute_menu_position(near_right, viewport, MenuContext::Range);
    assert_eq!(range.x, 830.0);

    let narrow = Viewport {
        width: 200.0,
        height: 800.0,
    };
    assert_eq!(compute_menu_position(near_left, narrow, MenuContext::Range).x, 100.0);
}

#[test]
fn indicators_reflect_the_caret_block() {
    let mut editor = editor_with(vec![Node::paragraph("hello")]);
    editor.run_command("block.set_heading", Some(json!({ "level": 2 }))).unwrap();
    editor.run_command("block.indent", None).unwrap();
    let mut toolbar = Toolbar::new(MenuCapabilities::default());
    toolbar.sync(&editor);

    let state = toolbar.state();
    assert_eq!(state.block_type, BlockType::Heading(2));
    assert_eq!(state.indent_px, 30);
    assert!(state.list.is_none());
    assert!(state.is_enabled("block.outdent"));
    assert!(state.is_enabled("table.insert"));
    assert!(!state.is_enabled("list.lift"));

    editor.run_command("block.set_paragraph", None).unwrap();
    editor.run_command("list.toggle_ordered", None).unwrap();
    toolbar.sync(&editor);
    let list = toolbar.state().list.clone().unwrap();
    assert_eq!(list.kind, NodeKind::OrderedList);
    assert_eq!(list.style, "decimal");
    assert_eq!(toolbar.state().block_type, BlockType::Paragraph);
}

#[test]
fn indicators_follow_the_anchor_of_a_cross_block_range() {
    let mut editor = editor_with(vec![Node::paragraph("title"), Node::paragraph("body")]);
    editor.run_command("block.set_heading", Some(json!({ "level": 2 }))).unwrap();
    editor.run_command("block.set_align", Some(json!({ "align": "center" }))).unwrap();

    editor.set_selection(Selection::new(Point::new(vec![0, 0], 1), Point::new(vec![1, 0], 2)));
    let mut toolbar = Toolbar::new(MenuCapabilities::default());
    toolbar.sync(&editor);
    assert_eq!(toolbar.state().block_type, BlockType::Heading(2));
    assert_eq!(toolbar.state().align, Align::Center);

    editor.set_selection(Selection::new(Point::new(vec![1, 0], 2), Point::new(vec![0, 0], 1)));
    toolbar.sync(&editor);
    assert_eq!(toolbar.state().block_type, BlockType::Paragraph);
    assert_eq!(toolbar.state().align, Align::Left);
}
