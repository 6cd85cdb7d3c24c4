//! Minimal PresentationML writer for three-slide briefs.
//!
//! The package holds one blank layout, one master and a small theme; every
//! slide is built from plain text boxes.

use std::fmt::Write as _;
use std::io::{Cursor, Write};

use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use revdesk_types::truncate_chars;

use crate::presentation::Brief;

const JUSTIFICATION_SLIDE_CHARS: usize = 500;

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const SLIDE_WIDTH: u32 = 9_144_000;
const SLIDE_HEIGHT: u32 = 6_858_000;
const MARGIN: u32 = 457_200;

enum Slide {
    Title { title: String, subtitle: String },
    Bullets { title: String, bullets: Vec<String> },
}

pub(crate) fn render_deck(brief: &Brief<'_>) -> Result<Vec<u8>, ZipError> {
    let justification = truncate_chars(brief.justification.unwrap_or("-"), JUSTIFICATION_SLIDE_CHARS);
    let slides = [
        Slide::Title {
            title: "Investment Program Revision Request".to_string(),
            subtitle: format!("Request ID: {}", brief.request_id),
        },
        Slide::Bullets {
            title: "Summary".to_string(),
            bullets: brief.summary_lines().to_vec(),
        },
        Slide::Bullets {
            title: "Justification".to_string(),
            bullets: justification
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        },
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut add = |name: &str, content: String| -> Result<(), ZipError> {
        zip.start_file(name, options)?;
        zip.write_all(content.as_bytes())?;
        Ok(())
    };

    add("[Content_Types].xml", content_types(slides.len()))?;
    add(
        "_rels/.rels",
        relationships(&[("officeDocument", "ppt/presentation.xml")]),
    )?;
    add("ppt/presentation.xml", presentation(slides.len()))?;
    add("ppt/_rels/presentation.xml.rels", presentation_rels(slides.len()))?;
    add("ppt/slideMasters/slideMaster1.xml", slide_master())?;
    add(
        "ppt/slideMasters/_rels/slideMaster1.xml.rels",
        relationships(&[
            ("slideLayout", "../slideLayouts/slideLayout1.xml"),
            ("theme", "../theme/theme1.xml"),
        ]),
    )?;
    add("ppt/slideLayouts/slideLayout1.xml", slide_layout())?;
    add(
        "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
        relationships(&[("slideMaster", "../slideMasters/slideMaster1.xml")]),
    )?;
    add("ppt/theme/theme1.xml", theme())?;
    for (index, slide) in slides.iter().enumerate() {
        let number = index + 1;
        add(&format!("ppt/slides/slide{number}.xml"), slide_xml(slide))?;
        add(
            &format!("ppt/slides/_rels/slide{number}.xml.rels"),
            relationships(&[("slideLayout", "../slideLayouts/slideLayout1.xml")]),
        )?;
    }

    Ok(zip.finish()?.into_inner())
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c if c.is_control() && !matches!(c, '\t' | '\n' | '\r') => {}
            c => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// Package parts
// ============================================================================

fn content_types(slide_count: usize) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/><Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/><Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>"#
    );
    for number in 1..=slide_count {
        let _ = write!(
            xml,
            r#"<Override PartName="/ppt/slides/slide{number}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
        );
    }
    xml.push_str("</Types>");
    xml
}

fn relationships(targets: &[(&str, &str)]) -> String {
    let mut xml = format!(r#"{XML_DECL}<Relationships xmlns="{REL_NS}">"#);
    for (index, (kind, target)) in targets.iter().enumerate() {
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{}" Type="{REL_TYPE}/{kind}" Target="{target}"/>"#,
            index + 1
        );
    }
    xml.push_str("</Relationships>");
    xml
}

/// rId1 is the master, slides follow, the theme comes last.
fn presentation_rels(slide_count: usize) -> String {
    let slide_targets: Vec<String> = (1..=slide_count)
        .map(|number| format!("slides/slide{number}.xml"))
        .collect();
    let mut targets = vec![("slideMaster", "slideMasters/slideMaster1.xml")];
    targets.extend(slide_targets.iter().map(|target| ("slide", target.as_str())));
    targets.push(("theme", "theme/theme1.xml"));
    relationships(&targets)
}

fn presentation(slide_count: usize) -> String {
    let mut slide_ids = String::new();
    for index in 0..slide_count {
        let _ = write!(
            slide_ids,
            r#"<p:sldId id="{}" r:id="rId{}"/>"#,
            256 + index,
            index + 2
        );
    }
    format!(
        r#"{XML_DECL}<p:presentation {NS}><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{slide_ids}</p:sldIdLst><p:sldSz cx="{SLIDE_WIDTH}" cy="{SLIDE_HEIGHT}"/><p:notesSz cx="{SLIDE_HEIGHT}" cy="{SLIDE_WIDTH}"/></p:presentation>"#
    )
}

const EMPTY_TREE: &str = r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>"#;

fn slide_master() -> String {
    format!(
        r#"{XML_DECL}<p:sldMaster {NS}><p:cSld><p:spTree>{EMPTY_TREE}</p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#
    )
}

fn slide_layout() -> String {
    format!(
        r#"{XML_DECL}<p:sldLayout {NS} type="blank" preserve="1"><p:cSld name="Blank"><p:spTree>{EMPTY_TREE}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#
    )
}

fn theme() -> String {
    let solid = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    let line = r#"<a:ln w="9525"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#;
    let effect = "<a:effectStyle><a:effectLst/></a:effectStyle>";
    format!(
        r#"{XML_DECL}<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Revision Desk"><a:themeElements><a:clrScheme name="Revision Desk"><a:dk1><a:srgbClr val="000000"/></a:dk1><a:lt1><a:srgbClr val="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="1F2937"/></a:dk2><a:lt2><a:srgbClr val="F3F4F6"/></a:lt2><a:accent1><a:srgbClr val="1D4ED8"/></a:accent1><a:accent2><a:srgbClr val="059669"/></a:accent2><a:accent3><a:srgbClr val="D97706"/></a:accent3><a:accent4><a:srgbClr val="DC2626"/></a:accent4><a:accent5><a:srgbClr val="7C3AED"/></a:accent5><a:accent6><a:srgbClr val="0891B2"/></a:accent6><a:hlink><a:srgbClr val="1D4ED8"/></a:hlink><a:folHlink><a:srgbClr val="6D28D9"/></a:folHlink></a:clrScheme><a:fontScheme name="Revision Desk"><a:majorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Revision Desk"><a:fillStyleLst>{solid}{solid}{solid}</a:fillStyleLst><a:lnStyleLst>{line}{line}{line}</a:lnStyleLst><a:effectStyleLst>{effect}{effect}{effect}</a:effectStyleLst><a:bgFillStyleLst>{solid}{solid}{solid}</a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#
    )
}

// ============================================================================
// Slides
// ============================================================================

fn text_box(id: u32, y: u32, height: u32, paragraphs: &str) -> String {
    let width = SLIDE_WIDTH - 2 * MARGIN;
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Text {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="{MARGIN}" y="{y}"/><a:ext cx="{width}" cy="{height}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr><p:txBody><a:bodyPr wrap="square"/><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#
    )
}

fn paragraph(text: &str, size: u32, bold: bool) -> String {
    let bold = u8::from(bold);
    format!(
        r#"<a:p><a:r><a:rPr lang="en-US" sz="{size}" b="{bold}"/><a:t>{}</a:t></a:r></a:p>"#,
        escape_xml(text)
    )
}

fn bullet(text: &str) -> String {
    format!(
        r#"<a:p><a:pPr marL="342900" indent="-342900"><a:buChar char="&#8226;"/></a:pPr><a:r><a:rPr lang="en-US" sz="2000"/><a:t>{}</a:t></a:r></a:p>"#,
        escape_xml(text)
    )
}

fn slide_xml(slide: &Slide) -> String {
    let shapes = match slide {
        Slide::Title { title, subtitle } => {
            text_box(2, 2_130_000, 1_470_000, &paragraph(title, 4000, true))
                + &text_box(3, 3_886_000, 1_000_000, &paragraph(subtitle, 2400, false))
        }
        Slide::Bullets { title, bullets } => {
            let body: String = if bullets.is_empty() {
                bullet("-")
            } else {
                bullets.iter().map(|line| bullet(line)).collect()
            };
            text_box(2, MARGIN, 1_000_000, &paragraph(title, 3200, true))
                + &text_box(3, 1_600_000, SLIDE_HEIGHT - 1_600_000 - MARGIN, &body)
        }
    };
    format!(
        r#"{XML_DECL}<p:sld {NS}><p:cSld><p:spTree>{EMPTY_TREE}{shapes}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#
    )
}
