//! String-level helpers for the OOXML parts the fillers edit.
//!
//! Office parts are rewritten in place rather than parsed into a tree so
//! that everything the fillers do not touch survives byte for byte.

use std::ops::Range;

/// Escapes text for use in element content.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters are not allowed in XML 1.0
            c if c.is_control() && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

/// A tag found by [`next_tag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag<'a> {
    pub(crate) name: &'a str,
    pub(crate) kind: TagKind,
    pub(crate) range: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagKind {
    Start,
    End,
    Empty,
}

/// Finds the next element tag at or after `from`, skipping declarations,
/// comments and processing instructions.
pub(crate) fn next_tag(xml: &str, mut from: usize) -> Option<Tag<'_>> {
    loop {
        let start = from + xml.get(from..)?.find('<')?;
        let rest = &xml[start..];

        if rest.starts_with("<!--") {
            from = start + rest.find("-->")? + 3;
            continue;
        }
        if rest.starts_with("<?") || rest.starts_with("<!") {
            from = start + rest.find('>')? + 1;
            continue;
        }

        let end = start + rest.find('>')? + 1;
        let inner = &xml[start + 1..end - 1];

        let (kind, body) = if let Some(body) = inner.strip_prefix('/') {
            (TagKind::End, body)
        } else if let Some(body) = inner.strip_suffix('/') {
            (TagKind::Empty, body)
        } else {
            (TagKind::Start, inner)
        };

        let name_end = body
            .find(|c: char| c.is_whitespace())
            .unwrap_or(body.len());

        return Some(Tag {
            name: &body[..name_end],
            kind,
            range: start..end,
        });
    }
}

/// Byte range of the first `name` element in `xml[from..]`, tags included.
///
/// Elements of the same name must not nest.
pub(crate) fn find_element(xml: &str, name: &str, from: usize) -> Option<Range<usize>> {
    let mut pos = from;
    while let Some(tag) = next_tag(xml, pos) {
        pos = tag.range.end;
        if tag.name != name {
            continue;
        }
        match tag.kind {
            TagKind::Empty => return Some(tag.range),
            TagKind::Start => {
                let close = format!("</{name}>");
                let end = pos + xml[pos..].find(&close)? + close.len();
                return Some(tag.range.start..end);
            }
            TagKind::End => {}
        }
    }
    None
}

/// Direct children of the element whose start tag ends at `content_start`.
///
/// Returns each child's name and full byte range.
pub(crate) fn child_elements(xml: &str, content_start: usize) -> Vec<(&str, Range<usize>)> {
    let mut children = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<(&str, usize)> = None;
    let mut pos = content_start;

    while let Some(tag) = next_tag(xml, pos) {
        pos = tag.range.end;
        match tag.kind {
            TagKind::Start => {
                if depth == 0 {
                    current = Some((tag.name, tag.range.start));
                }
                depth += 1;
            }
            TagKind::Empty => {
                if depth == 0 {
                    children.push((tag.name, tag.range));
                }
            }
            TagKind::End => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some((name, start)) = current.take() {
                        children.push((name, start..tag.range.end));
                    }
                }
            }
        }
    }

    children
}

/// Value of attribute `name` in a start tag.
pub(crate) fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {name}=");
    let start = tag.find(&needle)? + needle.len();
    let quote = tag[start..].chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let value_start = start + 1;
    let len = tag[value_start..].find(quote)?;
    Some(&tag[value_start..value_start + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
        assert_eq!(escape("bell\u{7}"), "bell");
    }

    #[test]
    fn test_next_tag_skips_declaration() {
        let xml = r#"<?xml version="1.0"?><!-- note --><a:p attr="1"/>"#;
        let tag = next_tag(xml, 0).unwrap();
        assert_eq!(tag.name, "a:p");
        assert_eq!(tag.kind, TagKind::Empty);
    }

    #[test]
    fn test_find_element() {
        let xml = "<a:p><a:pPr algn=\"ctr\"><a:lnSpc/></a:pPr><a:r/></a:p>";
        let range = find_element(xml, "a:pPr", 0).unwrap();
        assert_eq!(&xml[range], "<a:pPr algn=\"ctr\"><a:lnSpc/></a:pPr>");

        let range = find_element(xml, "a:r", 0).unwrap();
        assert_eq!(&xml[range], "<a:r/>");

        assert!(find_element(xml, "a:rPr", 0).is_none());
    }

    #[test]
    fn test_find_element_ignores_prefix_match() {
        let xml = "<a:rPrChange/><a:rPr b=\"1\"/>";
        let range = find_element(xml, "a:rPr", 0).unwrap();
        assert_eq!(&xml[range], "<a:rPr b=\"1\"/>");
    }

    #[test]
    fn test_child_elements() {
        let xml = "<root><p:sp><p:sp/></p:sp><p:pic/><p:grpSp><p:sp/></p:grpSp></root>";
        let children = child_elements(xml, "<root>".len());
        let names: Vec<&str> = children.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["p:sp", "p:pic", "p:grpSp"]);
        assert_eq!(&xml[children[0].1.clone()], "<p:sp><p:sp/></p:sp>");
    }

    #[test]
    fn test_attribute() {
        let tag = r#"<Relationship Id="rId2" Target='slides/slide1.xml'/>"#;
        assert_eq!(attribute(tag, "Id"), Some("rId2"));
        assert_eq!(attribute(tag, "Target"), Some("slides/slide1.xml"));
        assert_eq!(attribute(tag, "Type"), None);
    }
}
