use crate::unified_blocks::{BlockKind, UnifiedBlock};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;

fn local_name<'a>(q: &'a [u8]) -> &'a [u8] {
    match q.iter().position(|&b| b == b':') { Some(i) => &q[i + 1..], None => q }
}

fn attr_val(e: &BytesStart<'_>, key_local: &[u8]) -> Option<String> {
    for a in e.attributes().with_checks(false) {
        if let Ok(attr) = a {
            let k = local_name(attr.key.as_ref());
            if k == key_local {
                return Some(String::from_utf8_lossy(&attr.value).into_owned());
            }
        }
    }
    None
}

/// Read `word/document.xml` out of a DOCX zip and convert it to UnifiedBlocks.
/// - `w:p` with a `Heading*` style becomes a `Heading` block (level from the style name).
/// - `w:p` with a numbering reference (`w:numPr`) becomes a `ListItem`.
/// - Everything else becomes a `Paragraph`.
/// - `w:tbl` is flattened into TSV wrapped the same way `reader_pptx` wraps tables.
pub fn read_docx_to_blocks(path: &str) -> Vec<UnifiedBlock> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return vec![UnifiedBlock::new(BlockKind::Paragraph, "(error) failed to open DOCX", 0, path, "docx")],
    };
    let mut zip = match zip::ZipArchive::new(file) {
        Ok(z) => z,
        Err(_) => return vec![UnifiedBlock::new(BlockKind::Paragraph, "(error) not a valid .docx (zip) file", 0, path, "docx")],
    };

    let mut xml = String::new();
    match zip.by_name("word/document.xml") {
        Ok(mut f) => {
            let _ = f.read_to_string(&mut xml);
        }
        Err(_) => return vec![UnifiedBlock::new(BlockKind::Paragraph, "(error) missing word/document.xml", 0, path, "docx")],
    }

    let mut blocks: Vec<UnifiedBlock> = Vec::new();
    let mut reader = Reader::from_str(&xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut order = 0u32;

    let mut in_p = false;
    let mut in_r_text = false;
    let mut cur_text = String::new();
    let mut style_name: Option<String> = None;
    let mut has_num_pr = false;

    let mut in_tbl = false;
    let mut in_tr = false;
    let mut in_tc = false;
    let mut cell_text = String::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut table_text = String::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                match local_name(e.name().as_ref()) {
                    b"p" => {
                        if !in_tbl {
                            in_p = true;
                            cur_text.clear();
                            style_name = None;
                            has_num_pr = false;
                        }
                    }
                    b"pStyle" => {
                        if in_p {
                            style_name = attr_val(&e, b"val");
                        }
                    }
                    b"numPr" => {
                        if in_p {
                            has_num_pr = true;
                        }
                    }
                    b"t" => {
                        if in_p {
                            in_r_text = true;
                        }
                    }
                    b"br" | b"tab" => {
                        if in_p && !in_tbl {
                            cur_text.push(if local_name(e.name().as_ref()) == b"tab" { '\t' } else { '\n' });
                        }
                    }
                    b"tbl" => {
                        in_tbl = true;
                        table_text.clear();
                        row_cells.clear();
                    }
                    b"tr" => {
                        if in_tbl {
                            in_tr = true;
                            row_cells.clear();
                        }
                    }
                    b"tc" => {
                        if in_tr {
                            in_tc = true;
                            cell_text.clear();
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if in_r_text {
                    if let Ok(cow) = t.unescape() {
                        if in_tbl && in_tc {
                            cell_text.push_str(&cow);
                        } else {
                            cur_text.push_str(&cow);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                match local_name(e.name().as_ref()) {
                    b"t" => in_r_text = false,
                    b"p" => {
                        if in_p && !in_tbl {
                            let text = cur_text.trim().to_string();
                            if !text.is_empty() {
                                let level = style_name.as_deref().and_then(heading_level_from_style);
                                let mut b = if let Some(level) = level {
                                    let mut b = UnifiedBlock::new(BlockKind::Heading, text.clone(), order, path, "docx");
                                    b.heading_level = Some(level);
                                    b.section_hint = Some(crate::unified_blocks::SectionHint { level, title: text, numbering: None });
                                    b
                                } else if has_num_pr {
                                    UnifiedBlock::new(BlockKind::ListItem, text, order, path, "docx")
                                } else {
                                    UnifiedBlock::new(BlockKind::Paragraph, text, order, path, "docx")
                                };
                                if has_num_pr && level.is_none() {
                                    b.list = Some(crate::unified_blocks::ListInfo { ordered: true, level: 1, marker: None });
                                }
                                blocks.push(b);
                                order += 1;
                            }
                            in_p = false;
                        }
                    }
                    b"tc" => {
                        if in_tc {
                            in_tc = false;
                            let cell = cell_text.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "\u{2028}");
                            row_cells.push(cell);
                            cell_text.clear();
                        }
                    }
                    b"tr" => {
                        if in_tr {
                            in_tr = false;
                            let line = row_cells.join("\t");
                            table_text.push_str(&line);
                            table_text.push('\n');
                            row_cells.clear();
                        }
                    }
                    b"tbl" => {
                        if in_tbl {
                            in_tbl = false;
                            if !table_text.is_empty() {
                                let content = table_text.trim_end_matches('\n');
                                let wrapped = format!("<table delim=\"tsv\" cell-nl=\"U+2028\">\n{}\n</table>\n", content);
                                let mut b = UnifiedBlock::new(BlockKind::Paragraph, wrapped, order, path, "docx");
                                b.attrs.insert("is_table".to_string(), "true".to_string());
                                b.attrs.insert("table_cell_nl".to_string(), "U+2028".to_string());
                                blocks.push(b);
                                order += 1;
                            }
                            table_text.clear();
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    if blocks.is_empty() {
        blocks.push(UnifiedBlock::new(BlockKind::Paragraph, String::new(), 0, path, "docx"));
    }
    blocks
}

/// Word heading styles are named `heading1`..`heading9` (or `Heading1` in some producers).
fn heading_level_from_style(style: &str) -> Option<u8> {
    let lower = style.to_ascii_lowercase();
    let digits: String = lower.chars().filter(|c| c.is_ascii_digit()).collect();
    if lower.starts_with("heading") && !digits.is_empty() {
        digits.parse::<u8>().ok().map(|n| n.clamp(1, 6))
    } else if lower == "title" {
        Some(1)
    } else {
        None
    }
}
