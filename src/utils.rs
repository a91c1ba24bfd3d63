use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::{Encoding, MACINTOSH, UTF_8, WINDOWS_1252};
use eyre::{Context, Result, eyre};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment switch for images-only mode.
pub const IMAGES_ONLY_ENV: &str = "NOTES_EXPORT_IMAGES_ONLY";

/// Configuration required to run the extraction.
/// This decouples the logic from how the arguments were parsed (CLI/env/config file).
#[derive(Clone, Debug)]
pub struct ExtractConfig {
    pub root: PathBuf,
    pub images_only: bool,
    /// Forced raw/html layout; `None` lets the tracker detect it.
    pub subdirs: Option<bool>,
}

/// `true` only for the literal value `true`, ignoring ASCII case.
pub fn images_only_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Candidate text encodings, tried in order.
/// Mac Roman maps every byte, so Latin-1 only matters if that ever changes.
fn text_encodings() -> [&'static Encoding; 3] {
    [UTF_8, MACINTOSH, WINDOWS_1252]
}

/// Decode bytes with the first candidate encoding that accepts them without replacement.
pub fn decode_text(bytes: &[u8]) -> Result<(String, &'static Encoding)> {
    text_encodings()
        .into_iter()
        .find_map(|enc| {
            enc.decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| (text.into_owned(), enc))
        })
        .ok_or_else(|| eyre!("no candidate encoding could decode the input"))
}

/// Read a file as text, falling back through the candidate encodings.
pub fn read_text_with_fallback(path: &Path) -> Result<(String, &'static Encoding)> {
    let bytes = fs::read(path).wrap_err_with(|| format!("Failed to read: {}", path.display()))?;
    decode_text(&bytes)
}

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// An inline `data:image/...` source split into its parts.
#[derive(Debug, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub format: &'a str,
    pub payload: &'a str,
}

impl<'a> DataUri<'a> {
    pub fn parse(src: &'a str) -> Result<Self> {
        let (header, payload) = src
            .split_once(',')
            .ok_or_else(|| eyre!("data URI has no ',' separator"))?;
        let mime = header.split(';').next().unwrap_or(header);
        let format = mime
            .split('/')
            .nth(1)
            .ok_or_else(|| eyre!("data URI header has no image subtype: {:?}", header))?;
        Ok(Self { format, payload })
    }

    /// Decode the base64 payload. Characters outside the alphabet are dropped first.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let symbols = payload_symbols(self.payload)?;
        PAYLOAD_ENGINE
            .decode(&symbols)
            .wrap_err("base64 decoding failed")
    }
}

/// Alphabet symbols of a base64 payload, with padding removed.
///
/// Bytes outside the alphabet are skipped. Input ends at the first `=` run that
/// completes a quantum; anything after it is ignored. Stray `=` that cannot
/// complete a quantum are skipped. An unpadded partial quantum is an error.
fn payload_symbols(payload: &str) -> Result<Vec<u8>> {
    let mut symbols = Vec::with_capacity(payload.len());
    let mut quad_pos = 0usize;
    let mut pads = 0usize;

    for b in payload.bytes() {
        if b == b'=' {
            if quad_pos >= 2 {
                pads += 1;
                if quad_pos + pads >= 4 {
                    return Ok(symbols);
                }
            }
            continue;
        }
        if b.is_ascii_alphanumeric() || b == b'+' || b == b'/' {
            symbols.push(b);
            quad_pos = (quad_pos + 1) % 4;
            pads = 0;
        }
    }

    if quad_pos != 0 {
        return Err(eyre!("base64 payload has incorrect padding"));
    }
    Ok(symbols)
}

/// `{filename}-attachment-{NNN}.{format}`
pub fn attachment_name(filename: &str, counter: usize, format: &str) -> String {
    format!("{}-attachment-{:03}.{}", filename, counter, format)
}

/// Sniff the decoded bytes and compare against the declared format.
/// Returns the sniffed extension when it disagrees.
pub fn sniff_mismatch(declared: &str, data: &[u8]) -> Option<&'static str> {
    let kind = infer::get(data)?;
    let sniffed = kind.extension();
    let declared = declared.to_ascii_lowercase();
    let same = declared == sniffed
        || (sniffed == "jpg" && declared == "jpeg")
        || (sniffed == "tif" && declared == "tiff")
        || kind.mime_type().ends_with(&format!("/{}", declared));
    (!same).then_some(sniffed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_only_flag_is_case_insensitive_literal() {
        assert!(images_only_flag(Some("true")));
        assert!(images_only_flag(Some("TRUE")));
        assert!(images_only_flag(Some("True")));
        assert!(!images_only_flag(Some("1")));
        assert!(!images_only_flag(Some("yes")));
        assert!(!images_only_flag(Some(" true")));
        assert!(!images_only_flag(None));
    }

    #[test]
    fn utf8_wins_when_valid() {
        let (text, enc) = decode_text("café".as_bytes()).unwrap();
        assert_eq!(text, "café");
        assert_eq!(enc, UTF_8);
    }

    #[test]
    fn invalid_utf8_falls_back_to_mac_roman() {
        // 0x8E is "é" in Mac Roman and a stray continuation byte in UTF-8.
        let (text, enc) = decode_text(b"caf\x8e").unwrap();
        assert_eq!(text, "café");
        assert_eq!(enc, MACINTOSH);
    }

    #[test]
    fn parses_png_data_uri() {
        let uri = DataUri::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(uri.format, "png");
        assert_eq!(uri.payload, "iVBORw0KGgo=");
        assert_eq!(
            uri.decode().unwrap(),
            vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]
        );
    }

    #[test]
    fn format_keeps_full_subtype() {
        let uri = DataUri::parse("data:image/svg+xml;charset=utf-8;base64,PHN2Zy8+").unwrap();
        assert_eq!(uri.format, "svg+xml");
        assert_eq!(uri.decode().unwrap(), b"<svg/>");
    }

    #[test]
    fn missing_comma_is_an_error() {
        assert!(DataUri::parse("data:image/png;base64").is_err());
    }

    #[test]
    fn missing_subtype_is_an_error() {
        assert!(DataUri::parse("data:imagepng;base64,AAAA").is_err());
    }

    #[test]
    fn payload_whitespace_is_ignored() {
        let uri = DataUri::parse("data:image/png;base64,iVBO\nRw0K Ggo=").unwrap();
        assert_eq!(uri.decode().unwrap().len(), 8);
    }

    #[test]
    fn bad_padding_fails() {
        let uri = DataUri::parse("data:image/png;base64,iVBORw0KGgo").unwrap();
        assert!(uri.decode().is_err());
    }

    #[test]
    fn extra_padding_is_accepted() {
        let uri = DataUri::parse("data:image/png;base64,iVBORw0KGgo==").unwrap();
        assert_eq!(
            uri.decode().unwrap(),
            vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]
        );
    }

    #[test]
    fn data_after_padding_is_ignored() {
        let uri = DataUri::parse("data:image/png;base64,iVBORw0KGgo=AAAA").unwrap();
        assert_eq!(uri.decode().unwrap().len(), 8);

        let uri = DataUri::parse("data:image/gif;base64,QQ==QUJD").unwrap();
        assert_eq!(uri.decode().unwrap(), b"A");
    }

    #[test]
    fn padding_that_cannot_end_a_quantum_is_skipped() {
        // A lone `=` after one symbol of a quantum is dropped, decoding carries on.
        let uri = DataUri::parse("data:image/png;base64,Q=UJD").unwrap();
        assert_eq!(uri.decode().unwrap(), b"ABC");
    }

    #[test]
    fn single_leftover_symbol_fails() {
        let uri = DataUri::parse("data:image/png;base64,QUJDR").unwrap();
        assert!(uri.decode().is_err());
    }

    #[test]
    fn attachment_names_are_zero_padded() {
        assert_eq!(attachment_name("Meeting", 1, "png"), "Meeting-attachment-001.png");
        assert_eq!(attachment_name("Meeting", 42, "gif"), "Meeting-attachment-042.gif");
        assert_eq!(attachment_name("Meeting", 1234, "gif"), "Meeting-attachment-1234.gif");
    }

    #[test]
    fn sniff_reports_only_disagreements() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(sniff_mismatch("png", &png), None);
        assert_eq!(sniff_mismatch("PNG", &png), None);
        assert_eq!(sniff_mismatch("jpeg", &png), Some("png"));
        assert_eq!(sniff_mismatch("png", b"plain"), None);
    }
}
