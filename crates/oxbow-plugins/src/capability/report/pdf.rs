//! Minimal PDF writer for text reports.
//!
//! Produces a self-contained PDF 1.4 document: one Helvetica text column
//! per page, fixed leading, explicit cross-reference table. Output is
//! deterministic for a given line sequence. Viewers only need the
//! standard-14 font set, so nothing is embedded.

/// Text lines per page at 14pt leading inside letter-size margins.
const LINES_PER_PAGE: usize = 50;

const FONT_SIZE: u32 = 11;
const LEADING: u32 = 14;
const MARGIN_LEFT: u32 = 50;
const TOP_BASELINE: u32 = 760;

/// Renders the lines as a paginated PDF document.
pub(crate) fn render(lines: &[String]) -> Vec<u8> {
    let empty: &[String] = &[];
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![empty]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    // Object layout: 1 catalog, 2 page tree, 3 font, then a page and a
    // content stream per page.
    let page_ids: Vec<usize> = (0..pages.len()).map(|index| 4 + 2 * index).collect();
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects: Vec<String> = vec![
        String::from("<< /Type /Catalog /Pages 2 0 R >>"),
        format!(
            "<< /Type /Pages /Kids [{kids}] /Count {} >>",
            pages.len()
        ),
        String::from("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>"),
    ];

    for (index, page) in pages.iter().enumerate() {
        let content_id = 5 + 2 * index;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        objects.push(content_stream(page));
    }

    assemble(&objects)
}

/// Builds one page's content stream object body.
fn content_stream(lines: &[String]) -> String {
    let mut text = format!("BT\n/F1 {FONT_SIZE} Tf\n{LEADING} TL\n{MARGIN_LEFT} {TOP_BASELINE} Td\n");
    for line in lines {
        text.push_str(&format!("({}) Tj\nT*\n", escape_text(line)));
    }
    text.push_str("ET");
    format!("<< /Length {} >>\nstream\n{text}\nendstream", text.len())
}

/// Escapes a line for a PDF literal string: delimiters get backslash
/// escapes, everything outside printable ASCII becomes an octal escape.
fn escape_text(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for byte in line.bytes() {
        match byte {
            b'(' => escaped.push_str("\\("),
            b')' => escaped.push_str("\\)"),
            b'\\' => escaped.push_str("\\\\"),
            0x20..=0x7e => escaped.push(char::from(byte)),
            other => escaped.push_str(&format!("\\{other:03o}")),
        }
    }
    escaped
}

/// Serialises the numbered objects with a cross-reference table and
/// trailer.
fn assemble(objects: &[String]) -> Vec<u8> {
    let mut out: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());

    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}
