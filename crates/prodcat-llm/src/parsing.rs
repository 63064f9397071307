//! Parsing of model output.
//!
//! `find_json` is best-effort and never fails. `parse_response` tolerates
//! multiple top-level elements and stray text, but reports XML it still
//! cannot read as `Error::InvalidXml`.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, error};

use prodcat_core::{Error, Result};

/// Parse the JSON object embedded in `haystack`, from the first `{` to the
/// last `}`. A missing bracket is added before parsing.
pub fn find_json(haystack: &str) -> Option<Value> {
    debug!("Finding JSON in {}", haystack);
    let start = haystack.find('{');
    let end = haystack.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) => {
            if e < s {
                return None;
            }
            parse_json_logged(&haystack[s..=e])
        }
        _ => {
            debug!("Response is missing brackets, adding them");
            let mut text = String::with_capacity(haystack.len() + 2);
            if start.is_none() {
                text.push('{');
            }
            text.push_str(haystack);
            if end.is_none() {
                text.push('}');
            }
            parse_json_logged(&text)
        }
    }
}

fn parse_json_logged(text: &str) -> Option<Value> {
    match serde_json::from_str(text) {
        Ok(v) => Some(v),
        Err(e) => {
            error!("Failed to parse JSON: {} ({})", text, e);
            None
        }
    }
}

/// Parse possibly partial XML into nested maps and lists.
///
/// The content of each tag in `cdata_tags` is wrapped in CDATA first, so
/// markup inside free-text fields is kept as text. The result maps the
/// root tag to its content; leaves become strings, repeated child tags
/// become lists. When the input only parses under a synthetic `<root>`,
/// that wrapper is removed from the result.
pub fn parse_response(xml: &str, cdata_tags: &[&str]) -> Result<Value> {
    let mut xml = xml.to_string();
    for tag in cdata_tags {
        let tag = regex::escape(tag);
        let re = Regex::new(&format!(r"(?s)<{}>(.+?)</{}>", tag, tag))
            .map_err(|e| Error::InvalidXml(e.to_string()))?;
        let replacement = format!("<{}><![CDATA[${{1}}]]></{}>", tag, tag);
        xml = re.replace_all(&xml, replacement.as_str()).into_owned();
    }

    let root = match parse_tree(&xml) {
        Ok(root) => root,
        Err(first) => {
            debug!("XML not well-formed ({}), retrying with a root element", first);
            parse_tree(&format!("<root>{}</root>", xml)).map_err(Error::InvalidXml)?
        }
    };

    let content = element_to_value(&root);
    if root.name == "root" && !xml.trim().starts_with("<root>") {
        return Ok(content);
    }

    let mut map = Map::new();
    map.insert(root.name, content);
    Ok(Value::Object(map))
}

#[derive(Debug)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn new(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            text: String::new(),
            children: Vec::new(),
        }
    }
}

/// Build an element tree from a single well-formed document.
/// Entities are never expanded beyond the predefined ones.
fn parse_tree(xml: &str) -> std::result::Result<Element, String> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    fn attach(
        el: Element,
        stack: &mut [Element],
        root: &mut Option<Element>,
    ) -> std::result::Result<(), String> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(el),
            None if root.is_some() => return Err(format!("extra top-level element <{}>", el.name)),
            None => *root = Some(el),
        }
        Ok(())
    }

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.is_empty() && root.is_some() {
                    return Err("multiple top-level elements".into());
                }
                stack.push(Element::new(e.name().as_ref()));
            }
            Ok(Event::Empty(e)) => attach(Element::new(e.name().as_ref()), &mut stack, &mut root)?,
            Ok(Event::End(e)) => {
                let el = stack.pop().ok_or("unexpected closing tag")?;
                if el.name.as_bytes() != e.name().as_ref() {
                    return Err(format!("mismatched closing tag for <{}>", el.name));
                }
                attach(el, &mut stack, &mut root)?;
            }
            Ok(Event::Text(t)) => {
                let text = match t.unescape() {
                    Ok(s) => s.into_owned(),
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err("text outside the root element".into()),
                }
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&text),
                    None => return Err("CDATA outside the root element".into()),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("at position {}: {}", reader.buffer_position(), e)),
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "no root element".to_string())
}

fn element_to_value(el: &Element) -> Value {
    if el.children.is_empty() {
        return Value::String(el.text.clone());
    }

    let mut map = Map::new();
    for child in &el.children {
        let value = element_to_value(child);
        match map.get_mut(&child.name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(child.name.clone(), value);
            }
        }
    }
    Value::Object(map)
}

/// Render JSON as indented XML-like tags for prompts. Objects become
/// nested tags, list items share their parent's indentation.
pub fn json_to_xml(value: &Value) -> String {
    render_xml(value, "")
}

fn render_xml(value: &Value, padding: &str) -> String {
    let mut lines = Vec::new();
    match value {
        Value::Object(map) => {
            let inner = format!("{}  ", padding);
            for (tag, child) in map {
                lines.push(format!("{}<{}>", padding, tag));
                lines.push(render_xml(child, &inner));
                lines.push(format!("{}</{}>", padding, tag));
            }
        }
        Value::Array(items) => {
            for item in items {
                lines.push(render_xml(item, padding));
            }
        }
        Value::String(s) => lines.push(format!("{}{}", padding, s)),
        other => lines.push(format!("{}{}", padding, other)),
    }
    lines.join("\n")
}
