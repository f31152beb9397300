//! PDF <-> base64 helpers for report attachments.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

use crate::error::OpsError;

pub const PDF_DATA_URI_PREFIX: &str = "data:application/pdf;base64,";
const PDF_MAGIC: &[u8] = b"%PDF-";

pub fn encode_pdf(bytes: &[u8], data_uri: bool) -> String {
    if !bytes.starts_with(PDF_MAGIC) {
        warn!(len = bytes.len(), "input does not start with a PDF header");
    }
    let encoded = STANDARD.encode(bytes);
    if data_uri {
        format!("{PDF_DATA_URI_PREFIX}{encoded}")
    } else {
        encoded
    }
}

/// Accepts bare base64 or a `data:` URI, with arbitrary line breaks.
pub fn decode_pdf(text: &str) -> Result<Vec<u8>, OpsError> {
    let trimmed = text.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((scheme, rest)) if scheme.starts_with("data:") => rest,
        _ => trimmed,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;
    if !bytes.starts_with(PDF_MAGIC) {
        warn!(len = bytes.len(), "decoded data does not start with a PDF header");
    }
    Ok(bytes)
}

/// A one-page PDF with `title` on it, for wiring tests of the report flow.
pub fn stub_pdf(title: &str) -> Vec<u8> {
    let text: String = title
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .flat_map(|c| match c {
            '(' | ')' | '\\' => vec!['\\', c],
            c => vec![c],
        })
        .collect();
    let content = format!("BT /F1 18 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ),
    ];

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref_at = out.len();
    let xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    out.extend_from_slice(xref.as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_has_header_trailer_and_valid_xref() {
        let pdf = stub_pdf("Inventario (2026)");
        let text = String::from_utf8(pdf.clone()).unwrap();
        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains(r"(Inventario \(2026\))"));

        let startxref: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|t| t.lines().next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(text[startxref..].starts_with("xref\n"));
        // object 3 offset from the xref table points at "3 0 obj"
        let third = text[startxref..].lines().nth(5).unwrap();
        let off: usize = third[..10].parse().unwrap();
        assert!(text[off..].starts_with("3 0 obj"));
    }

    #[test]
    fn decode_accepts_data_uri_with_line_breaks() {
        let pdf = stub_pdf("x");
        let encoded = encode_pdf(&pdf, true);
        assert!(encoded.starts_with(PDF_DATA_URI_PREFIX));
        let (head, tail) = encoded.split_at(40);
        let wrapped = format!("{head}\n{tail}\n");
        assert_eq!(decode_pdf(&wrapped).unwrap(), pdf);
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let err = decode_pdf("not*base64").unwrap_err();
        assert!(matches!(err, OpsError::Decode(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
