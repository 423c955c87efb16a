//! HTML fragment parse and serialize.
//!
//! Parsing is two-staged: quick-xml events build a small lenient DOM
//! ([`MarkupElement`]), which is then mapped onto the document tree through the
//! tag table below. Unknown containers are transparent; inline runs at block
//! level are wrapped into paragraphs.

use std::fmt::Write as _;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, instrument};

use crate::attributes::{heading_level_of, merge_markup_attrs, parse_style, strip_consumed};
use crate::core::{Document, ElementNode, MarkupAttrs, Marks, Node, NodeKind, TextNode, VoidNode};
use crate::error::MarkupError;
use crate::plugin::PluginRegistry;

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "caption", "div", "figure", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section",
    "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

pub const PAGE_BREAK_TEXT: &str = "--- ✂ ---";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkupElement {
    pub tag: String,
    pub attrs: MarkupAttrs,
    pub children: Vec<MarkupNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element(MarkupElement),
    Text(String),
}

impl MarkupElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: MarkupAttrs::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Value of one property of the inline `style` attribute.
    pub fn style(&self, prop: &str) -> Option<String> {
        let style = self.attrs.get("style")?;
        parse_style(style)
            .into_iter()
            .rev()
            .find(|(p, _)| p == prop)
            .map(|(_, v)| v)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[MarkupNode], out: &mut String) {
    for node in nodes {
        match node {
            MarkupNode::Text(t) => out.push_str(t),
            MarkupNode::Element(el) if el.tag == "br" => out.push('\n'),
            MarkupNode::Element(el) => collect_text(&el.children, out),
        }
    }
}

fn resolve_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "nbsp" => Some("\u{a0}"),
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "hellip" => Some("…"),
        "ndash" => Some("–"),
        "mdash" => Some("—"),
        "laquo" => Some("«"),
        "raquo" => Some("»"),
        "copy" => Some("©"),
        "reg" => Some("®"),
        "deg" => Some("°"),
        "ordm" => Some("º"),
        "ordf" => Some("ª"),
        "sect" => Some("§"),
        _ => None,
    }
}

/// Parses an HTML fragment into a lenient DOM. Unclosed elements are closed at
/// the end of input, stray end tags are ignored.
pub fn parse_fragment(html: &str) -> Result<Vec<MarkupNode>, MarkupError> {
    let mut reader = Reader::from_str(html);
    reader.trim_text(false);
    reader.check_end_names(false);

    let mut stack: Vec<MarkupElement> = vec![MarkupElement::new("#root")];
    loop {
        let event = reader.read_event().map_err(|err| MarkupError::Malformed {
            position: reader.buffer_position(),
            message: err.to_string(),
        })?;
        match event {
            Event::Start(ref e) => {
                let el = element_from(e);
                if VOID_TAGS.contains(&el.tag.as_str()) {
                    attach(&mut stack, MarkupNode::Element(el));
                } else {
                    stack.push(el);
                }
            }
            Event::Empty(ref e) => {
                let el = element_from(e);
                attach(&mut stack, MarkupNode::Element(el));
            }
            Event::End(ref e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if VOID_TAGS.contains(&tag.as_str()) {
                    continue;
                }
                let Some(depth) = stack.iter().rposition(|el| el.tag == tag) else {
                    continue;
                };
                while stack.len() > depth.max(1) {
                    close_top(&mut stack);
                }
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape_with(resolve_entity)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned());
                attach(&mut stack, MarkupNode::Text(text));
            }
            Event::CData(ref c) => {
                let text = String::from_utf8_lossy(c).into_owned();
                attach(&mut stack, MarkupNode::Text(text));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }
    Ok(stack.pop().map(|root| root.children).unwrap_or_default())
}

fn element_from(start: &BytesStart<'_>) -> MarkupElement {
    let tag = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
    let mut el = MarkupElement::new(tag);
    for attr in start.html_attributes().filter_map(Result::ok) {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = attr
            .unescape_value_with(resolve_entity)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        el.attrs.insert(key, value);
    }
    el
}

fn attach(stack: &mut [MarkupElement], node: MarkupNode) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    match (parent.children.last_mut(), node) {
        (Some(MarkupNode::Text(prev)), MarkupNode::Text(text)) => prev.push_str(&text),
        (_, node) => parent.children.push(node),
    }
}

fn close_top(stack: &mut Vec<MarkupElement>) {
    if let Some(el) = stack.pop() {
        attach(stack, MarkupNode::Element(el));
    }
}

/// Parses an HTML fragment into a document using the registry's node and
/// attribute declarations. Kinds the registry does not know are unwrapped.
#[instrument(level = "debug", skip_all, fields(len = html.len()))]
pub fn parse_html(html: &str, registry: &PluginRegistry) -> Result<Document, MarkupError> {
    let dom = parse_fragment(html)?;
    let reader = DomReader { registry };
    let children = reader.blocks(dom.iter());
    debug!(blocks = children.len(), "parsed markup");
    Ok(Document::new(children))
}

struct DomReader<'r> {
    registry: &'r PluginRegistry,
}

impl DomReader<'_> {
    fn enabled(&self, kind: NodeKind) -> bool {
        self.registry.node_spec(kind).is_some()
    }

    fn element(&self, kind: NodeKind, el: &MarkupElement, structural: &[&str], children: Vec<Node>) -> Node {
        let (attrs, passthrough) = self.registry.read_markup_attrs(kind, el, structural);
        Node::Element(ElementNode {
            kind,
            attrs,
            children,
            passthrough,
        })
    }

    fn void(&self, kind: NodeKind, el: &MarkupElement, structural: &[&str]) -> Node {
        let (attrs, passthrough) = self.registry.read_markup_attrs(kind, el, structural);
        Node::Void(VoidNode {
            kind,
            attrs,
            passthrough,
        })
    }

    fn blocks<'a>(&self, nodes: impl IntoIterator<Item = &'a MarkupNode>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut pending: Vec<&MarkupNode> = Vec::new();
        for node in nodes {
            match node {
                MarkupNode::Element(el) if BLOCK_TAGS.contains(&el.tag.as_str()) => {
                    self.flush_inline(&mut pending, &mut out);
                    self.block(el, &mut out);
                }
                _ => pending.push(node),
            }
        }
        self.flush_inline(&mut pending, &mut out);
        out
    }

    fn flush_inline(&self, pending: &mut Vec<&MarkupNode>, out: &mut Vec<Node>) {
        if pending.is_empty() {
            return;
        }
        let inline = self.inline_content(pending.drain(..));
        if !inline.is_empty() {
            out.push(Node::element(NodeKind::Paragraph, inline));
        }
    }

    fn block(&self, el: &MarkupElement, out: &mut Vec<Node>) {
        match el.tag.as_str() {
            "p" => {
                let inline = self.inline_content(el.children.iter());
                out.push(self.element(NodeKind::Paragraph, el, &[], inline));
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let inline = self.inline_content(el.children.iter());
                let kind = if self.enabled(NodeKind::Heading) {
                    NodeKind::Heading
                } else {
                    NodeKind::Paragraph
                };
                out.push(self.element(kind, el, &[], inline));
            }
            "blockquote" if self.enabled(NodeKind::Blockquote) => {
                let children = self.blocks(el.children.iter());
                out.push(self.element(NodeKind::Blockquote, el, &[], children));
            }
            "pre" => {
                let text = el.text_content();
                let kind = if self.enabled(NodeKind::CodeBlock) {
                    NodeKind::CodeBlock
                } else {
                    NodeKind::Paragraph
                };
                out.push(self.element(kind, el, &[], vec![Node::text(text)]));
            }
            "ul" | "ol" if self.enabled(NodeKind::ListItem) => {
                let kind = if el.tag == "ul" {
                    NodeKind::BulletList
                } else {
                    NodeKind::OrderedList
                };
                let items = self.list_items(&el.children);
                out.push(self.element(kind, el, &[], items));
            }
            "li" if self.enabled(NodeKind::ListItem) => {
                let item = self.list_item(el);
                out.push(Node::element(NodeKind::BulletList, vec![item]));
            }
            "table" if self.enabled(NodeKind::Table) => out.push(self.table(el)),
            "hr" => {
                if self.enabled(NodeKind::Divider) {
                    out.push(self.void(NodeKind::Divider, el, &[]));
                }
            }
            "div" if el.attr("data-type") == Some("page-break") => {
                if self.enabled(NodeKind::PageBreak) {
                    out.push(self.page_break(el));
                }
            }
            _ => out.extend(self.blocks(el.children.iter())),
        }
    }

    fn page_break(&self, el: &MarkupElement) -> Node {
        let mut el = el.clone();
        if let Some(class) = el.attrs.remove("class") {
            let rest: Vec<&str> = class
                .split_whitespace()
                .filter(|t| *t != "page-break")
                .collect();
            if !rest.is_empty() {
                el.attrs.insert("class".to_string(), rest.join(" "));
            }
        }
        self.void(NodeKind::PageBreak, &el, &["data-type"])
    }

    fn list_items(&self, nodes: &[MarkupNode]) -> Vec<Node> {
        let mut items = Vec::new();
        for node in nodes {
            match node {
                MarkupNode::Element(li) if li.tag == "li" => items.push(self.list_item(li)),
                MarkupNode::Text(t) if t.trim().is_empty() => {}
                other => {
                    let blocks = self.blocks(std::iter::once(other));
                    if !blocks.is_empty() {
                        items.push(Node::element(NodeKind::ListItem, blocks));
                    }
                }
            }
        }
        items
    }

    fn list_item(&self, li: &MarkupElement) -> Node {
        let mut children = self.blocks(li.children.iter());
        if children.is_empty() {
            children.push(Node::paragraph(""));
        }
        self.element(NodeKind::ListItem, li, &[], children)
    }

    fn table(&self, el: &MarkupElement) -> Node {
        let mut caption = None;
        let mut rows = Vec::new();
        self.table_parts(&el.children, &mut caption, &mut rows);
        let children = caption.into_iter().chain(rows).collect();
        self.element(NodeKind::Table, el, &[], children)
    }

    fn table_parts(&self, nodes: &[MarkupNode], caption: &mut Option<Node>, rows: &mut Vec<Node>) {
        for node in nodes {
            let MarkupNode::Element(child) = node else {
                continue;
            };
            match child.tag.as_str() {
                "caption" => {
                    if caption.is_none() && self.enabled(NodeKind::TableCaption) {
                        let inline = self.inline_content(child.children.iter());
                        *caption = Some(self.element(NodeKind::TableCaption, child, &[], inline));
                    }
                }
                "thead" | "tbody" | "tfoot" => self.table_parts(&child.children, caption, rows),
                "tr" => rows.push(self.table_row(child)),
                _ => {}
            }
        }
    }

    fn table_row(&self, tr: &MarkupElement) -> Node {
        let cells = tr
            .children
            .iter()
            .filter_map(|node| match node {
                MarkupNode::Element(cell) if cell.tag == "td" || cell.tag == "th" => {
                    let kind = if cell.tag == "th" {
                        NodeKind::TableHeader
                    } else {
                        NodeKind::TableCell
                    };
                    let mut blocks = self.blocks(cell.children.iter());
                    if blocks.is_empty() {
                        blocks.push(Node::paragraph(""));
                    }
                    Some(self.element(kind, cell, &[], blocks))
                }
                _ => None,
            })
            .collect();
        self.element(NodeKind::TableRow, tr, &[], cells)
    }

    fn inline_content<'a>(&self, nodes: impl IntoIterator<Item = &'a MarkupNode>) -> Vec<Node> {
        let mut out = Vec::new();
        for node in nodes {
            self.inline(node, &Marks::default(), &mut out);
        }
        finish_inline(out)
    }

    fn inline(&self, node: &MarkupNode, marks: &Marks, out: &mut Vec<Node>) {
        let el = match node {
            MarkupNode::Text(t) => {
                out.push(Node::Text(TextNode {
                    text: collapse_whitespace(t),
                    marks: marks.clone(),
                }));
                return;
            }
            MarkupNode::Element(el) => el,
        };

        let mut marks = marks.clone();
        match el.tag.as_str() {
            "br" => {
                out.push(self.void(NodeKind::HardBreak, el, &[]));
                return;
            }
            "img" => return,
            "span" if el.attr("data-type") == Some("mention") && self.enabled(NodeKind::Mention) => {
                out.push(self.void(NodeKind::Mention, el, &["data-type"]));
                return;
            }
            "strong" | "b" => marks.bold = true,
            "em" | "i" => marks.italic = true,
            "u" => marks.underline = true,
            "s" | "strike" | "del" => marks.strikethrough = true,
            "code" => marks.code = true,
            "a" => marks.link = el.attr("href").map(str::to_string),
            "mark" => {
                marks.highlight_color = Some(
                    el.attr("data-color")
                        .map(str::to_string)
                        .or_else(|| el.style("background-color"))
                        .unwrap_or_default(),
                );
            }
            _ => {}
        }
        if let Some((tag, consumed)) = mark_wrapper(&el.tag) {
            let extra = strip_consumed(&el.attrs, consumed);
            if !extra.is_empty() {
                merge_markup_attrs(marks.markup.entry(tag.to_string()).or_default(), &extra);
            }
        }
        if el.tag == "span" || el.tag == "font" {
            if let Some(color) = el.style("color").or_else(|| el.attr("color").map(str::to_string)) {
                marks.text_color = Some(color);
            }
            if let Some(family) = el.style("font-family").or_else(|| el.attr("face").map(str::to_string)) {
                marks.font_family = Some(family);
            }
            if let Some(size) = el.style("font-size") {
                marks.font_size = Some(size);
            }
        }
        for child in &el.children {
            self.inline(child, &marks, out);
        }
    }
}

/// Mark-bearing tags, the tag each renders back as, and the markup attributes
/// the marks consume.
const MARK_WRAPPERS: &[(&[&str], &str, &[&str])] = &[
    (&["strong", "b"], "strong", &[]),
    (&["em", "i"], "em", &[]),
    (&["u"], "u", &[]),
    (&["s", "strike", "del"], "s", &[]),
    (&["code"], "code", &[]),
    (&["a"], "a", &["href"]),
    (&["mark"], "mark", &["data-color", "style:background-color"]),
    (
        &["span", "font"],
        "span",
        &["style:color", "style:font-family", "style:font-size", "color", "face"],
    ),
];

fn mark_wrapper(tag: &str) -> Option<(&'static str, &'static [&'static str])> {
    MARK_WRAPPERS
        .iter()
        .find(|(tags, _, _)| tags.contains(&tag))
        .map(|(_, out, consumed)| (*out, *consumed))
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Trims whitespace at the block edges and around line breaks, drops empty
/// text leaves. Returns an empty vec when nothing but whitespace remains.
fn finish_inline(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    let mut after_space = true;
    for node in nodes {
        match node {
            Node::Text(mut t) => {
                if after_space {
                    t.text = t.text.trim_start_matches(' ').to_string();
                }
                if t.text.is_empty() {
                    continue;
                }
                after_space = t.text.ends_with(' ');
                out.push(Node::Text(t));
            }
            Node::Void(v) => {
                after_space = v.kind == NodeKind::HardBreak;
                if after_space {
                    trim_trailing_space(&mut out);
                }
                out.push(Node::Void(v));
            }
            Node::Element(el) => {
                after_space = false;
                out.push(Node::Element(el));
            }
        }
    }
    trim_trailing_space(&mut out);
    out.retain(|n| !matches!(n, Node::Text(t) if t.text.is_empty()));
    out
}

fn trim_trailing_space(nodes: &mut [Node]) {
    if let Some(Node::Text(t)) = nodes.last_mut() {
        let trimmed = t.text.trim_end_matches(' ').len();
        t.text.truncate(trimmed);
    }
}

/// Serializes a document to HTML. Declared attributes are rendered through the
/// registry and merged with each node's passed-through markup attributes.
pub fn serialize_html(doc: &Document, registry: &PluginRegistry) -> String {
    let mut writer = HtmlWriter {
        registry,
        out: String::new(),
    };
    for node in &doc.children {
        writer.block(node);
    }
    writer.out
}

struct HtmlWriter<'r> {
    registry: &'r PluginRegistry,
    out: String,
}

impl HtmlWriter<'_> {
    fn open(&mut self, tag: &str, attrs: &MarkupAttrs) {
        self.out.push('<');
        self.out.push_str(tag);
        // data-type first so structural markers read naturally.
        let ordered = attrs
            .iter()
            .filter(|(k, _)| k.as_str() == "data-type")
            .chain(attrs.iter().filter(|(k, _)| k.as_str() != "data-type"));
        for (key, value) in ordered {
            let _ = write!(self.out, " {key}=\"{}\"", escape(value.as_str()));
        }
        self.out.push('>');
    }

    fn close(&mut self, tag: &str) {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn attrs_for(&self, kind: NodeKind, attrs: &crate::core::Attrs, passthrough: &MarkupAttrs) -> MarkupAttrs {
        let mut rendered = self.registry.render_attrs(kind, attrs);
        merge_markup_attrs(&mut rendered, passthrough);
        rendered
    }

    fn block(&mut self, node: &Node) {
        match node {
            Node::Element(el) => self.element(el),
            Node::Void(v) => self.void(v),
            Node::Text(t) => self.text(t),
        }
    }

    fn element(&mut self, el: &ElementNode) {
        let attrs = self.attrs_for(el.kind, &el.attrs, &el.passthrough);
        match el.kind {
            NodeKind::Paragraph => self.wrapped("p", &attrs, el),
            NodeKind::Heading => {
                let tag = format!("h{}", heading_level_of(el));
                self.wrapped(&tag, &attrs, el);
            }
            NodeKind::TableCaption => self.wrapped("caption", &attrs, el),
            NodeKind::CodeBlock => {
                self.open("pre", &attrs);
                self.out.push_str("<code>");
                for child in &el.children {
                    if let Node::Text(t) = child {
                        self.out.push_str(&partial_escape(t.text.as_str()));
                    }
                }
                self.out.push_str("</code>");
                self.close("pre");
            }
            NodeKind::ListItem => {
                self.open("li", &attrs);
                match el.children.as_slice() {
                    [Node::Element(p)] if is_plain_paragraph(p) => self.inline_children(p),
                    children => {
                        for child in children {
                            self.block(child);
                        }
                    }
                }
                self.close("li");
            }
            NodeKind::Table => {
                self.open("table", &attrs);
                let (captions, rows): (Vec<&Node>, Vec<&Node>) = el
                    .children
                    .iter()
                    .partition(|n| n.kind() == Some(NodeKind::TableCaption));
                for caption in captions {
                    self.block(caption);
                }
                self.out.push_str("<tbody>");
                for row in rows {
                    self.block(row);
                }
                self.out.push_str("</tbody>");
                self.close("table");
            }
            kind => {
                let tag = block_tag(kind);
                self.open(tag, &attrs);
                for child in &el.children {
                    self.block(child);
                }
                self.close(tag);
            }
        }
    }

    fn wrapped(&mut self, tag: &str, attrs: &MarkupAttrs, el: &ElementNode) {
        self.open(tag, attrs);
        self.inline_children(el);
        self.close(tag);
    }

    fn inline_children(&mut self, el: &ElementNode) {
        for child in &el.children {
            match child {
                Node::Text(t) => self.text(t),
                Node::Void(v) => self.void(v),
                Node::Element(inner) => self.element(inner),
            }
        }
    }

    fn void(&mut self, v: &VoidNode) {
        let mut attrs = self.attrs_for(v.kind, &v.attrs, &v.passthrough);
        match v.kind {
            NodeKind::PageBreak => {
                let mut base = MarkupAttrs::new();
                base.insert("data-type".to_string(), "page-break".to_string());
                base.insert("class".to_string(), "page-break".to_string());
                merge_markup_attrs(&mut base, &attrs);
                self.open("div", &base);
                self.out.push_str("<div class=\"page-break-line\"></div>");
                let _ = write!(self.out, "<div class=\"page-break-text\">{PAGE_BREAK_TEXT}</div>");
                self.close("div");
            }
            NodeKind::Mention => {
                attrs.insert("data-type".to_string(), "mention".to_string());
                self.open("span", &attrs);
                self.out.push_str(&partial_escape(v.inline_text().as_str()));
                self.close("span");
            }
            NodeKind::HardBreak => {
                self.open("br", &attrs);
            }
            _ => {
                self.open("hr", &attrs);
            }
        }
    }

    fn text(&mut self, t: &TextNode) {
        if t.text.is_empty() {
            return;
        }
        let marks = &t.marks;
        let mut wrappers: Vec<(&str, MarkupAttrs)> = Vec::new();
        let carried = |tag: &str, mut attrs: MarkupAttrs| {
            if let Some(extra) = marks.markup.get(tag) {
                merge_markup_attrs(&mut attrs, extra);
            }
            attrs
        };
        if let Some(href) = &marks.link {
            let mut attrs = MarkupAttrs::new();
            attrs.insert("href".to_string(), href.clone());
            wrappers.push(("a", carried("a", attrs)));
        }
        for (on, tag) in [
            (marks.bold, "strong"),
            (marks.italic, "em"),
            (marks.underline, "u"),
            (marks.strikethrough, "s"),
            (marks.code, "code"),
        ] {
            if on {
                wrappers.push((tag, carried(tag, MarkupAttrs::new())));
            }
        }
        if let Some(color) = &marks.highlight_color {
            let mut attrs = MarkupAttrs::new();
            if !color.is_empty() {
                attrs.insert("data-color".to_string(), color.clone());
                attrs.insert("style".to_string(), format!("background-color: {color}"));
            }
            wrappers.push(("mark", carried("mark", attrs)));
        }
        let style: Vec<String> = [
            ("color", &marks.text_color),
            ("font-family", &marks.font_family),
            ("font-size", &marks.font_size),
        ]
        .into_iter()
        .filter_map(|(prop, value)| value.as_ref().map(|v| format!("{prop}: {v}")))
        .collect();
        if !style.is_empty() || marks.markup.contains_key("span") {
            let mut attrs = MarkupAttrs::new();
            if !style.is_empty() {
                attrs.insert("style".to_string(), style.join("; "));
            }
            wrappers.push(("span", carried("span", attrs)));
        }

        for (tag, attrs) in &wrappers {
            self.open(tag, attrs);
        }
        self.out.push_str(&partial_escape(t.text.as_str()));
        for (tag, _) in wrappers.iter().rev() {
            self.close(tag);
        }
    }
}

fn is_plain_paragraph(el: &ElementNode) -> bool {
    el.kind == NodeKind::Paragraph && el.attrs.is_empty() && el.passthrough.is_empty()
}

fn block_tag(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Blockquote => "blockquote",
        NodeKind::BulletList => "ul",
        NodeKind::OrderedList => "ol",
        NodeKind::TableRow => "tr",
        NodeKind::TableCell => "td",
        NodeKind::TableHeader => "th",
        _ => "div",
    }
}
