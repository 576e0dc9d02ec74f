//! PowerPoint template filling.
//!
//! The first slide of the template carries six text shapes. They are
//! filled by position, in the order the shapes appear on the slide:
//! objective, title, reference, caption, approach, impact.

use super::{read_entry, rewrite_archive, xml, SlideText};
use crate::error::{Error, Result};
use std::ops::Range;
use tracing::debug;

const TEMPLATE_NAME: &str = "pptx";
const FALLBACK_SLIDE: &str = "ppt/slides/slide1.xml";
const TEXT_SHAPES: usize = 6;
const TX_BODY_END: &str = "</p:txBody>";

/// Fills the text shapes of the first slide of a `.pptx` template.
///
/// Each line of a value becomes its own paragraph. The paragraph and run
/// properties of the shape's first paragraph carry over to every new one.
///
/// # Errors
///
/// Returns an error if the template is not a readable zip container or its
/// first slide has fewer than six text shapes.
pub fn render(template: &[u8], text: &SlideText) -> Result<Vec<u8>> {
    let slide = first_slide(template)?;
    debug!("Filling {}", slide);

    let mut found = false;
    let output = rewrite_archive(
        template,
        |name| name == slide,
        |_, xml| {
            found = true;
            fill_slide(xml, text).map(Some)
        },
    )?;

    if !found {
        return Err(Error::template_msg(
            TEMPLATE_NAME,
            format!("slide part '{slide}' is missing"),
        ));
    }

    Ok(output)
}

/// Zip entry of the first slide in presentation order.
fn first_slide(template: &[u8]) -> Result<String> {
    let Some(presentation) = read_entry(template, "ppt/presentation.xml")? else {
        return Ok(FALLBACK_SLIDE.to_string());
    };
    let Some(rels) = read_entry(template, "ppt/_rels/presentation.xml.rels")? else {
        return Ok(FALLBACK_SLIDE.to_string());
    };

    let Some(rel_id) = xml::find_element(&presentation, "p:sldId", 0)
        .and_then(|range| xml::attribute(&presentation[range], "r:id").map(str::to_string))
    else {
        return Err(Error::template_msg(TEMPLATE_NAME, "presentation has no slides"));
    };

    let mut pos = 0;
    while let Some(range) = xml::find_element(&rels, "Relationship", pos) {
        pos = range.end;
        let tag = &rels[range];
        if xml::attribute(tag, "Id") != Some(rel_id.as_str()) {
            continue;
        }
        if let Some(target) = xml::attribute(tag, "Target") {
            return Ok(match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("ppt/{target}"),
            });
        }
    }

    Err(Error::template_msg(
        TEMPLATE_NAME,
        format!("no relationship for first slide '{rel_id}'"),
    ))
}

/// Rewrites the first six text shapes of a slide part.
fn fill_slide(slide: &str, text: &SlideText) -> Result<String> {
    let shapes = text_bodies(slide)?;
    if shapes.len() < TEXT_SHAPES {
        return Err(Error::template_msg(
            TEMPLATE_NAME,
            format!(
                "first slide has {} text shapes, expected at least {TEXT_SHAPES}",
                shapes.len()
            ),
        ));
    }

    let mut output = slide.to_string();
    for (range, value) in shapes
        .into_iter()
        .zip(text.in_shape_order())
        .rev()
    {
        let body = replace_text(&slide[range.clone()], value);
        output.replace_range(range, &body);
    }

    Ok(output)
}

/// Ranges of the `p:txBody` of every top-level shape that has one.
fn text_bodies(slide: &str) -> Result<Vec<Range<usize>>> {
    let mut pos = 0;
    let tree_start = loop {
        let Some(tag) = xml::next_tag(slide, pos) else {
            return Err(Error::template_msg(TEMPLATE_NAME, "slide has no shape tree"));
        };
        pos = tag.range.end;
        if tag.name == "p:spTree" && tag.kind == xml::TagKind::Start {
            break tag.range.end;
        }
    };

    Ok(xml::child_elements(slide, tree_start)
        .into_iter()
        .filter(|(name, _)| *name == "p:sp")
        .filter_map(|(_, shape)| {
            xml::find_element(slide, "p:txBody", shape.start).filter(|body| body.end <= shape.end)
        })
        .collect())
}

/// Replaces the paragraphs of a `p:txBody` element with `value`.
fn replace_text(tx_body: &str, value: &str) -> String {
    let inner_end = tx_body.len().saturating_sub(TX_BODY_END.len());
    let first = xml::find_element(tx_body, "a:p", 0);

    let prefix = first.as_ref().map_or(&tx_body[..inner_end], |p| &tx_body[..p.start]);
    let template = first.map_or("", |p| &tx_body[p]);

    let property = |name: &str| xml::find_element(template, name, 0).map_or("", |r| &template[r]);
    let p_pr = property("a:pPr");
    let r_pr = property("a:rPr");
    let end_para = property("a:endParaRPr");

    let mut out = String::with_capacity(prefix.len() + value.len() * 2);
    out.push_str(prefix);

    for line in value.split('\n') {
        let line = line.trim_end_matches('\r');
        out.push_str("<a:p>");
        out.push_str(p_pr);
        if !line.is_empty() {
            out.push_str("<a:r>");
            out.push_str(r_pr);
            out.push_str("<a:t>");
            out.push_str(&xml::escape(line));
            out.push_str("</a:t></a:r>");
        }
        out.push_str(end_para);
        out.push_str("</a:p>");
    }

    out.push_str(TX_BODY_END);
    out
}

#[cfg(test)]
mod tests {
    use super::super::tests::{build_zip, entry};
    use super::*;

    const PRESENTATION: &str = "<p:presentation><p:sldIdLst><p:sldId id=\"256\" r:id=\"rId7\"/>\
        </p:sldIdLst></p:presentation>";
    const RELS: &str = "<Relationships>\
        <Relationship Id=\"rId1\" Type=\"master\" Target=\"slideMasters/slideMaster1.xml\"/>\
        <Relationship Id=\"rId7\" Type=\"slide\" Target=\"slides/slide3.xml\"/>\
        </Relationships>";

    fn shape(id: usize, text: &str) -> String {
        format!(
            "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"Text {id}\"/></p:nvSpPr>\
             <p:txBody><a:bodyPr/><a:lstStyle/>\
             <a:p><a:pPr algn=\"l\"/><a:r><a:rPr lang=\"en-US\" sz=\"1400\"/><a:t>{text}</a:t></a:r>\
             <a:endParaRPr lang=\"en-US\"/></a:p>\
             <a:p><a:r><a:t>second</a:t></a:r></a:p></p:txBody></p:sp>"
        )
    }

    fn slide(shapes: usize) -> String {
        let mut tree = String::from("<p:nvGrpSpPr/><p:grpSpPr/>");
        tree.push_str("<p:pic><p:nvPicPr/></p:pic>");
        tree.push_str("<p:sp><p:nvSpPr/><p:spPr/></p:sp>");
        for i in 0..shapes {
            tree.push_str(&shape(i + 2, &format!("placeholder {i}")));
            if i == 1 {
                tree.push_str(&format!("<p:grpSp>{}</p:grpSp>", shape(99, "grouped")));
            }
        }
        format!("<?xml version=\"1.0\"?><p:sld><p:cSld><p:spTree>{tree}</p:spTree></p:cSld></p:sld>")
    }

    fn slide_text() -> SlideText {
        SlideText {
            objective: "Quantify drought impacts.".to_string(),
            title: "Heat & Drought".to_string(),
            reference: "fill in".to_string(),
            caption: "fill in".to_string(),
            approach: "- Modeled plants\n- Compared costs".to_string(),
            impact: "Lower costs".to_string(),
        }
    }

    #[test]
    fn test_first_slide_from_relationships() {
        let template = build_zip(&[
            ("ppt/presentation.xml", PRESENTATION),
            ("ppt/_rels/presentation.xml.rels", RELS),
        ]);
        assert_eq!(first_slide(&template).unwrap(), "ppt/slides/slide3.xml");
    }

    #[test]
    fn test_first_slide_fallback() {
        let template = build_zip(&[(FALLBACK_SLIDE, "<p:sld/>")]);
        assert_eq!(first_slide(&template).unwrap(), FALLBACK_SLIDE);
    }

    #[test]
    fn test_text_bodies_skip_groups_and_plain_shapes() {
        let xml = slide(6);
        let bodies = text_bodies(&xml).unwrap();

        assert_eq!(bodies.len(), 6);
        assert!(xml[bodies[0].clone()].contains("placeholder 0"));
        assert!(xml[bodies[2].clone()].contains("placeholder 2"));
    }

    #[test]
    fn test_replace_text_preserves_properties() {
        let xml = shape(2, "old");
        let range = xml::find_element(&xml, "p:txBody", 0).unwrap();
        let body = replace_text(&xml[range], "one\n\ntwo & three");

        assert_eq!(
            body,
            "<p:txBody><a:bodyPr/><a:lstStyle/>\
             <a:p><a:pPr algn=\"l\"/><a:r><a:rPr lang=\"en-US\" sz=\"1400\"/><a:t>one</a:t></a:r><a:endParaRPr lang=\"en-US\"/></a:p>\
             <a:p><a:pPr algn=\"l\"/><a:endParaRPr lang=\"en-US\"/></a:p>\
             <a:p><a:pPr algn=\"l\"/><a:r><a:rPr lang=\"en-US\" sz=\"1400\"/><a:t>two &amp; three</a:t></a:r><a:endParaRPr lang=\"en-US\"/></a:p>\
             </p:txBody>"
        );
    }

    #[test]
    fn test_replace_text_empty_body() {
        let body = replace_text("<p:txBody><a:bodyPr/></p:txBody>", "text");
        assert_eq!(body, "<p:txBody><a:bodyPr/><a:p><a:r><a:t>text</a:t></a:r></a:p></p:txBody>");
    }

    #[test]
    fn test_render_fills_by_position() {
        let template = build_zip(&[
            ("ppt/presentation.xml", PRESENTATION),
            ("ppt/_rels/presentation.xml.rels", RELS),
            ("ppt/slides/slide3.xml", &slide(7)),
            ("ppt/slides/slide1.xml", &slide(6)),
        ]);

        let output = render(&template, &slide_text()).unwrap();
        let filled = entry(&output, "ppt/slides/slide3.xml");

        let order = [
            "Quantify drought impacts.",
            "Heat &amp; Drought",
            "fill in",
            "- Modeled plants",
            "- Compared costs",
            "Lower costs",
            "placeholder 6",
        ];
        let positions: Vec<usize> = order.iter().map(|t| filled.find(t).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(filled.contains("grouped"));
        assert!(!filled.contains("placeholder 0"));
        assert_eq!(filled.matches("second").count(), 2);
        assert!(entry(&output, "ppt/slides/slide1.xml").contains("placeholder 0"));
    }

    #[test]
    fn test_render_too_few_shapes() {
        let template = build_zip(&[(FALLBACK_SLIDE, &slide(5))]);
        let err = render(&template, &slide_text()).unwrap_err();
        assert!(matches!(err, Error::Template { .. }));
        assert!(err.to_string().contains("5 text shapes"));
    }

    #[test]
    fn test_render_missing_slide() {
        let template = build_zip(&[("ppt/other.xml", "<x/>")]);
        assert!(render(&template, &slide_text()).is_err());
    }
}
