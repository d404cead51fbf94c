//! Content normalization into canonical markdown.
//!
//! Each supported content type has one entry point that converts a raw
//! fetched payload into clean markdown. Normalization never fails upward:
//! malformed input degrades to a labeled error block inside the returned
//! string so one bad document cannot abort its whole source.

use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use ego_tree::{NodeId, NodeRef};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

use crate::config::{ContentType, SourceSpec};

/// Rows emitted into the data dictionary table before truncating. The
/// upstream dictionaries run to thousands of entries; callers wanting the
/// full table should raise this.
pub const DATA_DICTIONARY_ROW_CAP: usize = 100;

/// Per-source switches forwarded from the [`SourceSpec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions<'a> {
    pub strip_deprecated: bool,
    pub filter_sections: Option<&'a [String]>,
}

impl<'a> NormalizeOptions<'a> {
    pub fn from_spec(spec: &'a SourceSpec) -> Self {
        Self {
            strip_deprecated: spec.strip_deprecated,
            filter_sections: spec.filter_sections.as_deref(),
        }
    }
}

/// Dispatch a raw payload to the normalizer for its declared content type.
/// Unknown types pass through unmodified as a degraded fallback.
pub fn normalize(
    content_type: ContentType,
    raw: &str,
    context_url: Option<&str>,
    opts: NormalizeOptions<'_>,
) -> String {
    match content_type {
        ContentType::Html => html_to_markdown(raw, context_url, opts.strip_deprecated),
        ContentType::Xml => xml_to_markdown(raw, opts.filter_sections),
        ContentType::Json => json_schema_to_markdown(raw),
        // Repository hosts render markdown as HTML server-side, so the HTML
        // path applies; there is no meaningful base URL for link resolution.
        ContentType::RepoMarkdown => html_to_markdown(raw, None, opts.strip_deprecated),
        ContentType::Unknown => raw.to_string(),
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

static CHROME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script, style, nav, header, footer, aside").unwrap());

static MAIN_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "main",
        "article",
        r#"[role="main"]"#,
        ".content",
        ".documentation",
        "#content",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*\n+").unwrap());

const DEPRECATED_PATTERNS: [&str; 3] = ["deprecat", "legacy", "obsolete"];

/// Text elements shorter than this that match a deprecated pattern are
/// treated as badges and removed together with their container.
const BADGE_TEXT_LIMIT: usize = 50;

/// Parse HTML, strip non-content chrome, select the main content region and
/// convert it to ATX-style markdown with `-` bullet markers.
pub fn html_to_markdown(raw: &str, context_url: Option<&str>, strip_deprecated: bool) -> String {
    let mut document = Html::parse_document(raw);

    let chrome: Vec<NodeId> = document.select(&CHROME_SELECTOR).map(|el| el.id()).collect();
    detach_all(&mut document, &chrome);

    let root_id = select_main_region(&document);

    if strip_deprecated {
        let doomed = collect_deprecated(&document, root_id);
        detach_all(&mut document, &doomed.into_iter().collect::<Vec<_>>());
    }

    let base = context_url.and_then(|u| Url::parse(u).ok());
    let markdown = match document.tree.get(root_id) {
        Some(root) => render_children(root, base.as_ref(), 0),
        None => String::new(),
    };
    tidy_markdown(&markdown)
}

/// Collapse runs of 3+ blank-ish lines to one blank line and trim the ends.
fn tidy_markdown(markdown: &str) -> String {
    EXCESS_BLANK_LINES
        .replace_all(markdown, "\n\n")
        .trim()
        .to_string()
}

fn detach_all(document: &mut Html, ids: &[NodeId]) {
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(*id) {
            node.detach();
        }
    }
}

/// First matching main-content region by selector priority, falling back to
/// the body, falling back to the whole tree.
fn select_main_region(document: &Html) -> NodeId {
    for selector in MAIN_SELECTORS.iter() {
        if let Some(el) = document.select(selector).next() {
            return el.id();
        }
    }
    if let Some(body) = document.select(&BODY_SELECTOR).next() {
        return body.id();
    }
    document.tree.root().id()
}

fn matches_deprecated(text: &str) -> bool {
    let lower = text.to_lowercase();
    DEPRECATED_PATTERNS.iter().any(|p| lower.contains(p))
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Compute the full deletion set before touching the tree; detaching while
/// iterating siblings would invalidate the traversal.
fn collect_deprecated(document: &Html, root_id: NodeId) -> HashSet<NodeId> {
    let mut doomed = HashSet::new();
    let Some(root) = document.tree.get(root_id) else {
        return doomed;
    };

    for el in root.descendants().filter_map(ElementRef::wrap) {
        let name = el.value().name();

        // A matching heading takes its whole subsection: every following
        // sibling up to the next heading of the same or a higher level.
        if let Some(level) = heading_level(name) {
            let text: String = el.text().collect();
            if matches_deprecated(&text) {
                doomed.insert(el.id());
                for sibling in el.next_siblings() {
                    if let Some(sib_el) = ElementRef::wrap(sibling) {
                        if let Some(sib_level) = heading_level(sib_el.value().name()) {
                            if sib_level <= level {
                                break;
                            }
                        }
                    }
                    doomed.insert(sibling.id());
                }
            }
        }

        // Containers flagged deprecated via class or id.
        if matches!(name, "div" | "section" | "article") {
            let class_hit = el.value().classes().any(matches_deprecated);
            let id_hit = el.value().id().is_some_and(matches_deprecated);
            if class_hit || id_hit {
                doomed.insert(el.id());
            }
        }

        // Short "deprecated" badges: the meaningful removal unit is the
        // surrounding container, not the badge text itself.
        if matches!(name, "span" | "div" | "p") {
            let text: String = el.text().collect();
            if text.len() < BADGE_TEXT_LIMIT && matches_deprecated(&text) {
                let container = el
                    .ancestors()
                    .take_while(|a| a.id() != root_id)
                    .filter_map(ElementRef::wrap)
                    .find(|a| matches!(a.value().name(), "div" | "section" | "article"));
                if let Some(container) = container {
                    doomed.insert(container.id());
                }
            }
        }
    }

    doomed
}

fn render_children(node: NodeRef<Node>, base: Option<&Url>, depth: usize) -> String {
    let mut out = String::new();
    for child in node.children() {
        out.push_str(&render_node(child, base, depth));
    }
    out
}

fn render_node(node: NodeRef<Node>, base: Option<&Url>, depth: usize) -> String {
    match node.value() {
        Node::Text(t) => collapse_ws(&t),
        Node::Element(el) => {
            let name = el.name().to_string();
            render_element(node, &name, base, depth)
        }
        _ => String::new(),
    }
}

fn render_element(node: NodeRef<Node>, name: &str, base: Option<&Url>, depth: usize) -> String {
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = heading_level(name).unwrap_or(1) as usize;
            let text = collapse_ws(&render_children(node, base, depth));
            format!("\n\n{} {}\n\n", "#".repeat(level), text.trim())
        }
        "p" => {
            let inner = render_children(node, base, depth);
            format!("\n\n{}\n\n", inner.trim())
        }
        "br" => "\n".to_string(),
        "hr" => "\n\n---\n\n".to_string(),
        "ul" => render_list(node, base, depth, false),
        "ol" => render_list(node, base, depth, true),
        "pre" => {
            let code = raw_text(node);
            format!("\n\n```\n{}\n```\n\n", code.trim_matches('\n'))
        }
        "code" => {
            let code = collapse_ws(&raw_text(node));
            let code = code.trim();
            if code.is_empty() {
                String::new()
            } else {
                format!("`{code}`")
            }
        }
        "a" => {
            let text = render_children(node, base, depth);
            let text = text.trim();
            match element_attr(node, "href") {
                Some(href) if !text.is_empty() => {
                    format!("[{}]({})", text, resolve_url(&href, base))
                }
                _ => text.to_string(),
            }
        }
        "strong" | "b" => wrap_emphasis(node, base, depth, "**"),
        "em" | "i" => wrap_emphasis(node, base, depth, "*"),
        "img" => {
            let alt = element_attr(node, "alt").unwrap_or_default();
            match element_attr(node, "src") {
                Some(src) => format!("![{}]({})", alt, resolve_url(&src, base)),
                None => String::new(),
            }
        }
        "blockquote" => {
            let inner = tidy_markdown(&render_children(node, base, depth));
            let quoted: String = inner
                .lines()
                .map(|line| format!("> {line}\n"))
                .collect();
            format!("\n\n{}\n\n", quoted.trim_end())
        }
        "table" => render_table(node, base),
        "head" | "title" | "meta" | "link" | "noscript" | "template" => String::new(),
        _ => render_children(node, base, depth),
    }
}

fn wrap_emphasis(node: NodeRef<Node>, base: Option<&Url>, depth: usize, marker: &str) -> String {
    let inner = render_children(node, base, depth);
    let inner = inner.trim();
    if inner.is_empty() {
        String::new()
    } else {
        format!("{marker}{inner}{marker}")
    }
}

fn render_list(node: NodeRef<Node>, base: Option<&Url>, depth: usize, ordered: bool) -> String {
    let mut out = String::from("\n\n");
    let mut index = 1usize;
    for child in node.children() {
        let is_item = child
            .value()
            .as_element()
            .is_some_and(|el| el.name() == "li");
        if !is_item {
            continue;
        }
        let item = render_list_item(child, base, depth);
        let marker = if ordered {
            format!("{index}.")
        } else {
            "-".to_string()
        };
        out.push_str(&format!("{}{} {}\n", "  ".repeat(depth), marker, item));
        index += 1;
    }
    out.push('\n');
    out
}

fn render_list_item(node: NodeRef<Node>, base: Option<&Url>, depth: usize) -> String {
    let mut inline = String::new();
    let mut nested = String::new();
    for child in node.children() {
        let is_list = child
            .value()
            .as_element()
            .is_some_and(|el| matches!(el.name(), "ul" | "ol"));
        if is_list {
            nested.push_str(&render_node(child, base, depth + 1));
        } else {
            inline.push_str(&render_node(child, base, depth));
        }
    }
    let mut item = inline.trim().to_string();
    if !nested.trim().is_empty() {
        item.push('\n');
        item.push_str(nested.trim_matches('\n'));
    }
    item
}

fn render_table(node: NodeRef<Node>, _base: Option<&Url>) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    for descendant in node.descendants() {
        let is_row = descendant
            .value()
            .as_element()
            .is_some_and(|el| el.name() == "tr");
        if !is_row {
            continue;
        }
        let cells: Vec<String> = descendant
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "th" | "td"))
            .map(|c| collapse_ws(&c.text().collect::<String>()).trim().to_string())
            .collect();
        if !cells.is_empty() {
            rows.push(cells);
        }
    }
    if rows.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n\n");
    out.push_str(&format!("| {} |\n", rows[0].join(" | ")));
    out.push_str(&format!("| {} |\n", vec!["---"; rows[0].len()].join(" | ")));
    for row in &rows[1..] {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out.push('\n');
    out
}

fn element_attr(node: NodeRef<Node>, attr: &str) -> Option<String> {
    node.value()
        .as_element()
        .and_then(|el| el.attr(attr))
        .map(|v| v.to_string())
}

fn resolve_url(href: &str, base: Option<&Url>) -> String {
    match base {
        Some(base) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

fn raw_text(node: NodeRef<Node>) -> String {
    node.descendants()
        .filter_map(|n| n.value().as_text())
        .map(|t| &**t)
        .collect()
}

/// Collapse internal whitespace runs to single spaces, preserving word
/// boundaries around inline markup.
fn collapse_ws(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_ws = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_ws {
                out.push(' ');
            }
            prev_ws = true;
        } else {
            out.push(c);
            prev_ws = false;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// XML
// ---------------------------------------------------------------------------

struct XmlElement {
    local_name: String,
    attributes: Vec<(String, String)>,
    text: String,
}

impl XmlElement {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

struct XmlIndex {
    text: String,
    elements: Vec<XmlElement>,
}

fn interesting_local_name(local: &str) -> bool {
    local.contains("DataElement") || local.contains("tag") || local.contains("TransferSyntax")
}

/// Single streaming pass over the document collecting the full text content
/// plus every element relevant to the DICOM extraction sections. In lenient
/// mode parse errors end the scan with whatever was salvaged, mirroring a
/// recovering parser.
fn scan_xml(content: &str, lenient: bool) -> Result<XmlIndex, quick_xml::Error> {
    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.trim_text_start = true;
    config.trim_text_end = true;
    if lenient {
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
    }

    let mut elements: Vec<XmlElement> = Vec::new();
    let mut text_chunks: Vec<String> = Vec::new();
    // Index into `elements` for each open element we are capturing text for.
    let mut open: Vec<Option<usize>> = Vec::new();

    loop {
        match reader.read_event() {
            Err(_) if lenient => break,
            Err(e) => return Err(e),
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                let slot = record_element(&mut elements, &start);
                open.push(slot);
            }
            Ok(Event::Empty(start)) => {
                record_element(&mut elements, &start);
            }
            Ok(Event::End(_)) => {
                open.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                if text.is_empty() {
                    continue;
                }
                if let Some(Some(idx)) = open.last() {
                    let elem = &mut elements[*idx];
                    if !elem.text.is_empty() {
                        elem.text.push(' ');
                    }
                    elem.text.push_str(&text);
                }
                text_chunks.push(text);
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                if !text.is_empty() {
                    text_chunks.push(text);
                }
            }
            Ok(_) => {}
        }
    }

    Ok(XmlIndex {
        text: text_chunks.join("\n"),
        elements,
    })
}

fn record_element(
    elements: &mut Vec<XmlElement>,
    start: &quick_xml::events::BytesStart<'_>,
) -> Option<usize> {
    let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    if !interesting_local_name(&local) {
        return None;
    }
    let attributes = start
        .attributes()
        .filter_map(|a| a.ok())
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
            let value = a
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
            (key, value)
        })
        .collect();
    elements.push(XmlElement {
        local_name: local,
        attributes,
        text: String::new(),
    });
    Some(elements.len() - 1)
}

/// Extract standard-document sections from XML. A strict parse is attempted
/// first; on failure the document is re-scanned leniently.
pub fn xml_to_markdown(raw: &str, filter_sections: Option<&[String]>) -> String {
    let index = match scan_xml(raw, false) {
        Ok(index) => index,
        Err(err) => {
            tracing::debug!(error = %err, "strict XML parse failed, re-scanning leniently");
            match scan_xml(raw, true) {
                Ok(index) => index,
                Err(err) => {
                    return format!("# Error Parsing XML\n\nFailed to parse XML: {err}\n");
                }
            }
        }
    };

    let mut output = vec!["# DICOM Standard Documentation\n".to_string()];
    let filters = filter_sections.unwrap_or(&[]);

    if filters.is_empty() {
        output.push(index.text.clone());
    } else {
        if filters.iter().any(|f| f == "data_dictionary") {
            output.extend(data_dictionary_section(&index));
        }
        if filters.iter().any(|f| f == "transfer_syntaxes") {
            output.extend(transfer_syntax_section(&index));
        }
    }

    output.join("\n")
}

fn data_dictionary_section(index: &XmlIndex) -> Vec<String> {
    let mut out = vec!["\n## DICOM Data Dictionary\n".to_string()];

    let rows: Vec<&XmlElement> = index
        .elements
        .iter()
        .filter(|e| e.local_name.contains("DataElement") || e.local_name.contains("tag"))
        .take(DATA_DICTIONARY_ROW_CAP)
        .collect();

    if rows.is_empty() {
        out.push(
            "*Data dictionary section found but structure not recognized. \
             Full XML parsing may be needed.*\n"
                .to_string(),
        );
        return out;
    }

    out.push("| Tag | Name | VR | Description |".to_string());
    out.push("|-----|------|----|-------------|".to_string());
    for elem in rows {
        let tag = elem.attr("tag").unwrap_or("N/A");
        let name = elem.attr("name").unwrap_or_else(|| {
            if elem.text.is_empty() {
                "N/A"
            } else {
                elem.text.as_str()
            }
        });
        let vr = elem.attr("vr").unwrap_or("N/A");
        out.push(format!("| {tag} | {name} | {vr} | ... |"));
    }
    out
}

fn transfer_syntax_section(index: &XmlIndex) -> Vec<String> {
    let mut out = vec!["\n## DICOM Transfer Syntaxes\n".to_string()];

    let elements: Vec<&XmlElement> = index
        .elements
        .iter()
        .filter(|e| e.local_name.contains("TransferSyntax"))
        .collect();

    if elements.is_empty() {
        out.push(
            "*Transfer syntax section found but structure not recognized. \
             Full XML parsing may be needed.*\n"
                .to_string(),
        );
        return out;
    }

    for elem in elements {
        let uid = elem.attr("uid").unwrap_or_else(|| {
            if elem.text.is_empty() {
                "N/A"
            } else {
                elem.text.as_str()
            }
        });
        let name = elem.attr("name").unwrap_or("N/A");
        out.push(format!("- **{name}**: `{uid}`"));
    }
    out
}

// ---------------------------------------------------------------------------
// JSON schema
// ---------------------------------------------------------------------------

/// Render a JSON schema as readable markdown: description, per-property
/// subsections, then the pretty-printed original for reference. Property
/// iteration order follows declaration order.
pub fn json_schema_to_markdown(raw: &str) -> String {
    let data: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(err) => {
            return format!(
                "# Error Parsing JSON Schema\n\nFailed to parse JSON: {err}\n\n```\n{raw}\n```"
            );
        }
    };

    let mut output = vec!["# JSON Schema Documentation\n".to_string()];

    if let Some(desc) = data.get("description").and_then(Value::as_str) {
        output.push(format!("{desc}\n"));
    }

    let required: Vec<&str> = data
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if let Some(properties) = data.get("properties").and_then(Value::as_object) {
        output.push("## Properties\n".to_string());
        for (name, definition) in properties {
            output.push(format!("### `{name}`"));
            if let Some(definition) = definition.as_object() {
                if let Some(desc) = definition.get("description").and_then(Value::as_str) {
                    output.push(desc.to_string());
                }
                if let Some(declared) = definition.get("type") {
                    let rendered = match declared {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    output.push(format!("- **Type:** `{rendered}`"));
                }
                if required.contains(&name.as_str()) {
                    output.push("- **Required:** Yes".to_string());
                }
            }
            output.push(String::new());
        }
    }

    output.push("## Full Schema (JSON)\n".to_string());
    output.push("```json".to_string());
    output.push(serde_json::to_string_pretty(&data).unwrap_or_else(|_| raw.to_string()));
    output.push("```".to_string());

    output.join("\n")
}
