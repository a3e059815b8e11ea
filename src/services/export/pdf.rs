use std::fmt::Write as _;

use super::view::ResultView;

const MM_TO_PT: f64 = 72.0 / 25.4;
const PAGE_WIDTH: f64 = 210.0 * MM_TO_PT;
const PAGE_HEIGHT: f64 = 297.0 * MM_TO_PT;
const MARGIN: f64 = 10.0 * MM_TO_PT;

/// Width of the laid-out result surface before it is scaled onto the page.
const CONTENT_WIDTH: f64 = 720.0;
const PADDING: f64 = 24.0;
const LINE_SPACING: f64 = 1.35;
/// Rough Helvetica advance as a share of the font size, used for wrapping.
const AVERAGE_GLYPH_WIDTH: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Self::Regular => "F1",
            Self::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone)]
struct Line {
    font: Font,
    size: f64,
    text: String,
    space_before: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Placement {
    pub(super) scale: f64,
    pub(super) x: f64,
    pub(super) y: f64,
}

/// Fits the content box inside the margins: scale to the usable width, shrink
/// further if that overflows the usable height, centre horizontally and pin
/// to the top margin.
pub(super) fn place(content_width: f64, content_height: f64) -> Placement {
    let usable_width = PAGE_WIDTH - 2.0 * MARGIN;
    let usable_height = PAGE_HEIGHT - 2.0 * MARGIN;

    let mut scale = usable_width / content_width;
    if content_height * scale > usable_height {
        scale = usable_height / content_height;
    }

    let x = MARGIN + (usable_width - content_width * scale) / 2.0;
    let y = PAGE_HEIGHT - MARGIN - content_height * scale;
    Placement { scale, x, y }
}

pub(super) fn render(view: &ResultView) -> Vec<u8> {
    let lines = layout(view);
    let content_height = PADDING * 2.0
        + lines.iter().map(|line| line.space_before + line.size * LINE_SPACING).sum::<f64>();
    let placement = place(CONTENT_WIDTH, content_height);

    let stream = content_stream(&lines, content_height, placement);
    assemble(&stream)
}

fn layout(view: &ResultView) -> Vec<Line> {
    let mut lines = Vec::new();

    push_wrapped(&mut lines, Font::Bold, 22.0, &view.title, 0.0);
    push_wrapped(&mut lines, Font::Regular, 12.0, &format!("Script: {}", view.script_name), 4.0);
    push_wrapped(&mut lines, Font::Bold, 14.0, &view.score_line, 6.0);

    push_wrapped(&mut lines, Font::Bold, 13.0, "Overall Feedback", 14.0);
    push_wrapped(&mut lines, Font::Regular, 11.0, &view.overall_feedback, 2.0);

    if !view.questions.is_empty() {
        push_wrapped(&mut lines, Font::Bold, 13.0, "Question Breakdown", 14.0);
        for question in &view.questions {
            let heading = format!("{}  ({})", question.label, question.marks);
            push_wrapped(&mut lines, Font::Bold, 12.0, &heading, 8.0);
            push_wrapped(&mut lines, Font::Regular, 11.0, &question.feedback, 0.0);
        }
    }

    lines
}

fn push_wrapped(lines: &mut Vec<Line>, font: Font, size: f64, text: &str, space_before: f64) {
    let max_chars = ((CONTENT_WIDTH - 2.0 * PADDING) / (size * AVERAGE_GLYPH_WIDTH)) as usize;
    let mut first = true;

    for wrapped in wrap(text, max_chars.max(1)) {
        lines.push(Line {
            font,
            size,
            text: wrapped,
            space_before: if first { space_before } else { 0.0 },
        });
        first = false;
    }
}

fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut wrapped = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    wrapped.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                wrapped.push(word.into_iter().collect());
                word = rest;
            }

            let word: String = word.into_iter().collect();
            let needed = if current.is_empty() { word.chars().count() } else { 1 + word.chars().count() };
            if current.chars().count() + needed > max_chars {
                wrapped.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        wrapped.push(current);
    }

    if wrapped.is_empty() {
        wrapped.push(String::new());
    }
    wrapped
}

fn content_stream(lines: &[Line], content_height: f64, placement: Placement) -> Vec<u8> {
    let mut stream = Vec::new();
    let mut header = String::new();
    let _ = writeln!(
        header,
        "q {s:.4} 0 0 {s:.4} {x:.2} {y:.2} cm",
        s = placement.scale,
        x = placement.x,
        y = placement.y
    );
    stream.extend_from_slice(header.as_bytes());

    let mut cursor = content_height - PADDING;
    for (position, line) in lines.iter().enumerate() {
        cursor -= line.space_before + line.size * LINE_SPACING;
        let baseline = cursor + line.size * (LINE_SPACING - 1.0);

        let mut op = String::new();
        let _ = write!(
            op,
            "BT /{} {:.1} Tf {:.2} {:.2} Td (",
            line.font.resource(),
            line.size,
            PADDING,
            baseline
        );
        stream.extend_from_slice(op.as_bytes());
        stream.extend_from_slice(&encode_text(&line.text));
        stream.extend_from_slice(b") Tj ET\n");

        // Rule under the title.
        if position == 0 {
            let rule_y = baseline - 6.0;
            let mut rule = String::new();
            let _ = writeln!(
                rule,
                "0.8 w {:.2} {rule_y:.2} m {:.2} {rule_y:.2} l S",
                PADDING,
                CONTENT_WIDTH - PADDING
            );
            stream.extend_from_slice(rule.as_bytes());
        }
    }

    stream.extend_from_slice(b"Q\n");
    stream
}

/// WinAnsi bytes for a PDF literal string. Unmappable characters become `?`.
fn encode_text(text: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                encoded.push(b'\\');
                encoded.push(c as u8);
            }
            '\t' => encoded.push(b' '),
            '\u{2018}' => encoded.push(0x91),
            '\u{2019}' => encoded.push(0x92),
            '\u{201C}' => encoded.push(0x93),
            '\u{201D}' => encoded.push(0x94),
            '\u{2022}' => encoded.push(0x95),
            '\u{2013}' => encoded.push(0x96),
            '\u{2014}' => encoded.push(0x97),
            ' '..='~' => encoded.push(c as u8),
            '\u{A0}'..='\u{FF}' => encoded.push(c as u32 as u8),
            _ => encoded.push(b'?'),
        }
    }
    encoded
}

fn assemble(stream: &[u8]) -> Vec<u8> {
    let font = |name: &str| {
        format!("<< /Type /Font /Subtype /Type1 /BaseFont /{name} /Encoding /WinAnsiEncoding >>")
            .into_bytes()
    };

    let mut contents = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
    contents.extend_from_slice(stream);
    contents.extend_from_slice(b"\nendstream");

    let objects: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH:.2} {PAGE_HEIGHT:.2}] \
             /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>"
        )
        .into_bytes(),
        font("Helvetica"),
        font("Helvetica-Bold"),
        contents,
    ];

    let mut pdf = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (number, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n", number + 1).as_bytes());
        pdf.extend_from_slice(body);
        pdf.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = pdf.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(xref, "{offset:010} 00000 n ");
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );
    pdf.extend_from_slice(xref.as_bytes());
    pdf
}
