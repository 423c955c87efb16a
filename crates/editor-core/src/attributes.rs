//! Declared node attributes: their domains, defaults and markup form.
//!
//! Plugins declare attributes with [`AttributeSpec`]. The registry uses the
//! specs in three places: markup parse (`parse`), markup render (`render`), and
//! the `NormalizeDeclaredAttrs` pass plus command validation (`validate`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ElementNode, MarkupAttrs, NodeKind};
use crate::markup::MarkupElement;

pub type ParseFn = fn(&MarkupElement) -> Option<Value>;
pub type RenderFn = fn(&Value) -> MarkupAttrs;
pub type ValidateFn = fn(&Value) -> Option<Value>;

#[derive(Clone)]
pub struct AttributeSpec {
    pub kinds: Vec<NodeKind>,
    pub name: &'static str,
    pub default: Option<Value>,
    pub parse: ParseFn,
    pub render: RenderFn,
    /// Strict domain check; returns the canonical value or `None` when out of domain.
    pub validate: ValidateFn,
    /// Markup attributes this spec reads. `style:prop` names one CSS property.
    pub consumes: &'static [&'static str],
}

impl AttributeSpec {
    pub fn new(
        kinds: &[NodeKind],
        name: &'static str,
        default: Option<Value>,
        parse: ParseFn,
        render: RenderFn,
    ) -> Self {
        Self {
            kinds: kinds.to_vec(),
            name,
            default,
            parse,
            render,
            validate: |value| Some(value.clone()),
            consumes: &[],
        }
    }

    pub fn validate(mut self, validate: ValidateFn) -> Self {
        self.validate = validate;
        self
    }

    pub fn consumes(mut self, consumes: &'static [&'static str]) -> Self {
        self.consumes = consumes;
        self
    }

    pub fn is_default(&self, value: &Value) -> bool {
        self.default.as_ref() == Some(value)
    }
}

impl std::fmt::Debug for AttributeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeSpec")
            .field("kinds", &self.kinds)
            .field("name", &self.name)
            .field("default", &self.default)
            .finish()
    }
}

pub fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim();
            if prop.is_empty() || value.is_empty() {
                return None;
            }
            Some((prop, value.to_string()))
        })
        .collect()
}

pub fn render_style(decls: &[(String, String)]) -> String {
    decls
        .iter()
        .map(|(prop, value)| format!("{prop}: {value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn style_attr(prop: &str, value: impl Into<String>) -> MarkupAttrs {
    let mut attrs = MarkupAttrs::new();
    attrs.insert("style".to_string(), format!("{prop}: {}", value.into()));
    attrs
}

/// Overlays `overlay` on `base`. `style` merges per property and `class` as a
/// token union; for anything else the overlay wins.
pub fn merge_markup_attrs(base: &mut MarkupAttrs, overlay: &MarkupAttrs) {
    for (key, value) in overlay {
        match key.as_str() {
            "style" => {
                let mut decls = base.get("style").map(|s| parse_style(s)).unwrap_or_default();
                for (prop, v) in parse_style(value) {
                    match decls.iter_mut().find(|(p, _)| *p == prop) {
                        Some(slot) => slot.1 = v,
                        None => decls.push((prop, v)),
                    }
                }
                if !decls.is_empty() {
                    base.insert("style".to_string(), render_style(&decls));
                }
            }
            "class" => {
                let mut tokens: Vec<String> = base
                    .get("class")
                    .map(|c| c.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                for token in value.split_whitespace() {
                    if !tokens.iter().any(|t| t == token) {
                        tokens.push(token.to_string());
                    }
                }
                if !tokens.is_empty() {
                    base.insert("class".to_string(), tokens.join(" "));
                }
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Removes the markup attributes named in `consumes` (including single style
/// properties) and returns what is left for passthrough.
pub fn strip_consumed(attrs: &MarkupAttrs, consumes: &[&str]) -> MarkupAttrs {
    let mut out = MarkupAttrs::new();
    for (key, value) in attrs {
        if key == "style" {
            let decls: Vec<(String, String)> = parse_style(value)
                .into_iter()
                .filter(|(prop, _)| {
                    !consumes
                        .iter()
                        .any(|c| c.strip_prefix("style:") == Some(prop.as_str()))
                })
                .collect();
            if !decls.is_empty() {
                out.insert(key.clone(), render_style(&decls));
            }
            continue;
        }
        if consumes.contains(&key.as_str()) {
            continue;
        }
        out.insert(key.clone(), value.clone());
    }
    out
}

pub const INDENT_STEP: u16 = 30;
pub const INDENT_MAX: u16 = 300;

/// Indentation in pixels, always one of 0, 30, ..., 300.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct IndentLevel(u16);

impl IndentLevel {
    pub const ZERO: IndentLevel = IndentLevel(0);
    pub const MAX: IndentLevel = IndentLevel(INDENT_MAX);

    /// Nearest level, clamped into the domain.
    pub fn quantize(px: f64) -> Self {
        if !px.is_finite() || px <= 0.0 {
            return Self::ZERO;
        }
        let steps = (px / f64::from(INDENT_STEP)).round();
        let px = (steps * f64::from(INDENT_STEP)).min(f64::from(INDENT_MAX));
        IndentLevel(px as u16)
    }

    pub fn from_px(px: u16) -> Option<Self> {
        (px % INDENT_STEP == 0 && px <= INDENT_MAX).then_some(IndentLevel(px))
    }

    pub fn px(self) -> u16 {
        self.0
    }

    pub fn increased(self) -> Self {
        IndentLevel((self.0 + INDENT_STEP).min(INDENT_MAX))
    }

    pub fn decreased(self) -> Self {
        IndentLevel(self.0.saturating_sub(INDENT_STEP))
    }
}

/// Leading integer of a CSS length such as `"60px"` or `"60.5px"`.
pub fn parse_css_int(value: &str) -> Option<f64> {
    let value = value.trim();
    let end = value
        .char_indices()
        .find(|(ix, c)| !(c.is_ascii_digit() || (*ix == 0 && (*c == '-' || *c == '+')) || *c == '.'))
        .map(|(ix, _)| ix)
        .unwrap_or(value.len());
    value[..end].parse::<f64>().ok()
}

macro_rules! css_keyword_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $css:expr),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_css(self) -> &'static str {
                match self {
                    $($name::$variant => $css),+
                }
            }

            pub fn from_css(value: &str) -> Option<Self> {
                let value = value.trim();
                Self::ALL.iter().copied().find(|v| {
                    let css = v.as_css();
                    css.eq_ignore_ascii_case(value) || css.trim_matches('"') == value.trim_matches(|c| c == '"' || c == '\'')
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }
    };
}

css_keyword_enum! {
    /// Marker style of a bullet list.
    BulletStyle {
        Disc => "disc",
        Circle => "circle",
        Square => "square",
        HeavyCheck => r#""\2714""#,
        WhiteHeavyCheck => r#""\2705""#,
        BallotBox => r#""\2610""#,
    } default Disc
}

css_keyword_enum! {
    /// Numbering style of an ordered list.
    OrderedStyle {
        Decimal => "decimal",
        DecimalLeadingZero => "decimal-leading-zero",
        LowerAlpha => "lower-alpha",
        UpperAlpha => "upper-alpha",
        LowerRoman => "lower-roman",
        UpperRoman => "upper-roman",
    } default Decimal
}

css_keyword_enum! {
    CaptionPosition {
        Top => "top",
        Bottom => "bottom",
    } default Top
}

css_keyword_enum! {
    Align {
        Left => "left",
        Center => "center",
        Right => "right",
        Justify => "justify",
    } default Left
}

impl Serialize for Align {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_css())
    }
}

impl Serialize for CaptionPosition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_css())
    }
}

/// List style attribute of a bullet or ordered list, as its CSS keyword.
pub fn list_style_of(el: &ElementNode) -> Option<&'static str> {
    let stored = el.attr_str("list_style");
    match el.kind {
        NodeKind::BulletList => Some(
            stored
                .and_then(BulletStyle::from_css)
                .unwrap_or_default()
                .as_css(),
        ),
        NodeKind::OrderedList => Some(
            stored
                .and_then(OrderedStyle::from_css)
                .unwrap_or_default()
                .as_css(),
        ),
        _ => None,
    }
}

pub fn indent_of(el: &ElementNode) -> IndentLevel {
    el.attr_u64("indent")
        .and_then(|px| u16::try_from(px).ok())
        .and_then(IndentLevel::from_px)
        .unwrap_or_default()
}

pub fn align_of(el: &ElementNode) -> Align {
    el.attr_str("align")
        .and_then(Align::from_css)
        .unwrap_or_default()
}

pub fn heading_level_of(el: &ElementNode) -> u8 {
    el.attr_u64("level")
        .filter(|level| (1..=6).contains(level))
        .map(|level| level as u8)
        .unwrap_or(1)
}

pub fn caption_position_of(el: &ElementNode) -> CaptionPosition {
    el.attr_str("position")
        .and_then(CaptionPosition::from_css)
        .unwrap_or_default()
}

pub fn span_of(el: &ElementNode, name: &str) -> usize {
    el.attr_u64(name)
        .filter(|span| *span >= 1)
        .map(|span| span as usize)
        .unwrap_or(1)
}
