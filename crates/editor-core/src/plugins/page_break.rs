use crate::core::{Node, NodeKind};
use crate::plugin::{CommandSpec, NodeSpec, EditorPlugin, insert_block_void};

pub(crate) struct PageBreakPlugin;

impl EditorPlugin for PageBreakPlugin {
    fn id(&self) -> &'static str {
        "page_break"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::block_void(NodeKind::PageBreak)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("page_break.insert", "Insert page break", |editor, _args| {
                insert_block_void(editor, Node::page_break(), "command:page_break.insert")
            })
            .description("Insert a page break after the current block.")
            .keywords(["page break", "quebra de página", "break"]),
        ]
    }
}
