//! Toolbar and floating-menu state derived from the editor after each change.
//!
//! Everything except menu placement is computed synchronously in [`Toolbar::sync`].
//! Placement needs host geometry, so `sync` hands out a [`LayoutTicket`] and the
//! host answers with [`Toolbar::layout_settled`] once layout has run.

use serde::Serialize;

use crate::attributes::{Align, IndentLevel};
use crate::config::MenuCapabilities;
use crate::core::{Editor, Marks, NodeKind};
use crate::plugin::element_at_path;
use crate::plugins::{active_align, active_block_type, active_indent, active_list, active_marks, caption_of, table_path_at};

pub const MENU_OFFSET_Y: f32 = 8.0;
pub const VIEWPORT_MARGIN: f32 = 10.0;
pub const RANGE_MENU_WIDTH: f32 = 320.0;
pub const TABLE_MENU_WIDTH: f32 = 440.0;

/// Commands whose enablement the toolbar tracks by dry run.
pub const TRACKED_COMMANDS: &[&str] = &[
    "block.indent",
    "block.outdent",
    "table.insert",
    "table.insert_row_above",
    "table.insert_row_below",
    "table.insert_col_left",
    "table.insert_col_right",
    "table.delete_row",
    "table.delete_col",
    "table.delete_table",
    "table.merge_cell_right",
    "table.split_cell",
    "table.set_caption",
    "table.toggle_caption",
    "table.update_caption_position",
    "list.lift",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockType {
    Paragraph,
    Heading(u8),
    Blockquote,
    CodeBlock,
}

/// Block kinds that drive the block-type indicator. Paragraphs are the
/// fallback and are left out so a paragraph inside a quote reports the quote.
const BLOCK_TYPES: &[(NodeKind, fn(u8) -> BlockType)] = &[
    (NodeKind::Heading, BlockType::Heading),
    (NodeKind::Blockquote, |_| BlockType::Blockquote),
    (NodeKind::CodeBlock, |_| BlockType::CodeBlock),
];

impl BlockType {
    pub fn for_kind(kind: NodeKind, level: u8) -> Option<Self> {
        BLOCK_TYPES
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, make)| make(level))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Panel {
    Heading,
    FontFamily,
    FontSize,
    TextColor,
    HighlightColor,
    Align,
    BulletStyle,
    OrderedStyle,
    Table,
    Caption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ActivePanel {
    #[default]
    None,
    Open(Panel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MenuContext {
    #[default]
    Range,
    Table,
}

impl MenuContext {
    pub fn footprint(self) -> f32 {
        match self {
            MenuContext::Range => RANGE_MENU_WIDTH,
            MenuContext::Table => TABLE_MENU_WIDTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// Menu anchor: `x` is the horizontal centre, `y` the top edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MenuPosition {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FloatingMenu {
    pub visible: bool,
    pub context: MenuContext,
    pub position: Option<MenuPosition>,
}

/// Host-side layout queries, valid once layout has settled.
pub trait GeometrySource {
    /// Bounding box of the current selection or caret.
    fn selection_rect(&self) -> Option<Rect>;
    fn viewport(&self) -> Viewport;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    Panel(Panel),
    Trigger(Panel),
    Outside,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListState {
    pub kind: NodeKind,
    pub style: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolbarState {
    pub block_type: BlockType,
    pub align: Align,
    pub marks: Marks,
    pub list: Option<ListState>,
    pub indent_px: u16,
    pub in_table: bool,
    pub has_caption: bool,
    pub read_only: bool,
    pub enabled: Vec<(&'static str, bool)>,
}

impl Default for ToolbarState {
    fn default() -> Self {
        Self {
            block_type: BlockType::Paragraph,
            align: Align::default(),
            marks: Marks::default(),
            list: None,
            indent_px: IndentLevel::ZERO.px(),
            in_table: false,
            has_caption: false,
            read_only: false,
            enabled: Vec::new(),
        }
    }
}

impl ToolbarState {
    pub fn is_enabled(&self, command: &str) -> bool {
        self.enabled.iter().any(|(id, on)| *id == command && *on)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Toolbar {
    menus: MenuCapabilities,
    state: ToolbarState,
    panel: ActivePanel,
    menu: FloatingMenu,
    generation: u64,
    pending: Option<LayoutTicket>,
    suggestion_active: bool,
}

impl Toolbar {
    pub fn new(menus: MenuCapabilities) -> Self {
        Self {
            menus,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &ToolbarState {
        &self.state
    }

    pub fn active_panel(&self) -> ActivePanel {
        self.panel
    }

    pub fn menu(&self) -> &FloatingMenu {
        &self.menu
    }

    pub fn pending_layout(&self) -> Option<LayoutTicket> {
        self.pending
    }

    /// Recomputes indicators and menu visibility. Any earlier layout ticket
    /// is superseded by the one returned.
    pub fn sync(&mut self, editor: &Editor) -> LayoutTicket {
        let table = table_path_at(editor);
        let has_caption = table
            .as_ref()
            .and_then(|path| element_at_path(editor.doc(), path))
            .is_some_and(|el| caption_of(el).is_some());

        self.state = ToolbarState {
            block_type: active_block_type(editor),
            align: active_align(editor),
            marks: active_marks(editor),
            list: active_list(editor).map(|(kind, style)| ListState { kind, style }),
            indent_px: active_indent(editor).px(),
            in_table: table.is_some(),
            has_caption,
            read_only: editor.is_read_only(),
            enabled: TRACKED_COMMANDS
                .iter()
                .map(|id| (*id, editor.can_run_command(id, None)))
                .collect(),
        };

        let range = !editor.selection().is_collapsed();
        let in_table = self.menus.table_menu && table.is_some();
        let visible = !self.suggestion_active && ((self.menus.range_menu && range) || in_table);
        if visible && !self.menu.visible {
            self.panel = ActivePanel::None;
        }
        self.menu.visible = visible;
        self.menu.context = if in_table { MenuContext::Table } else { MenuContext::Range };
        if !visible {
            self.menu.position = None;
        }

        self.generation += 1;
        let ticket = LayoutTicket(self.generation);
        self.pending = Some(ticket);
        ticket
    }

    /// Places the floating menu. Returns `false` for a superseded or
    /// cancelled ticket, or when there is nothing to place.
    pub fn layout_settled(&mut self, ticket: LayoutTicket, geometry: &dyn GeometrySource) -> bool {
        if self.pending != Some(ticket) {
            return false;
        }
        self.pending = None;
        if !self.menu.visible {
            return false;
        }
        let Some(rect) = geometry.selection_rect() else {
            return false;
        };
        self.menu.position = Some(compute_menu_position(rect, geometry.viewport(), self.menu.context));
        true
    }

    pub fn cancel_pending_layout(&mut self) {
        self.pending = None;
    }

    pub fn open_panel(&mut self, panel: Panel) {
        self.panel = ActivePanel::Open(panel);
        self.menu.visible = false;
        self.menu.position = None;
    }

    pub fn toggle_panel(&mut self, panel: Panel) {
        if self.panel == ActivePanel::Open(panel) {
            self.panel = ActivePanel::None;
        } else {
            self.open_panel(panel);
        }
    }

    pub fn close_panels(&mut self) {
        self.panel = ActivePanel::None;
    }

    pub fn handle_click(&mut self, target: ClickTarget) {
        match target {
            ClickTarget::Outside => self.close_panels(),
            ClickTarget::Trigger(panel) => self.toggle_panel(panel),
            ClickTarget::Panel(_) => {}
        }
    }

    /// The mention popup owns the space under the caret while it is open.
    pub fn set_suggestion_active(&mut self, active: bool) {
        self.suggestion_active = active;
        if active {
            self.menu.visible = false;
            self.menu.position = None;
        }
    }
}

/// Below `rect` by [`MENU_OFFSET_Y`], centred on it, with the centre clamped
/// so the menu footprint keeps [`VIEWPORT_MARGIN`] from both viewport edges.
pub fn compute_menu_position(rect: Rect, viewport: Viewport, context: MenuContext) -> MenuPosition {
    let half = context.footprint() / 2.0 + VIEWPORT_MARGIN;
    let (min, max) = (half, viewport.width - half);
    let x = if max < min {
        viewport.width / 2.0
    } else {
        rect.center_x().clamp(min, max)
    };
    MenuPosition {
        x,
        y: rect.bottom() + MENU_OFFSET_Y,
    }
}
