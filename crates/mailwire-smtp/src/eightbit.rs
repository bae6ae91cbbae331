//! The RFC 2045 8-bit suitability test and part conversion.

use crate::mime::{MimeMessage, MimePart};

/// Maximum line length for 8bit data (RFC 2045 §2.8), excluding CRLF.
const MAX_LINE: usize = 998;

/// Returns true if `data` may travel as `8bit`: no NUL bytes, CR and LF
/// only as CRLF pairs, and no line longer than 998 bytes.
#[must_use]
pub fn is_8bit_clean(data: &[u8]) -> bool {
    let mut line_len = 0usize;
    let mut i = 0;

    while i < data.len() {
        match data[i] {
            0 => return false,
            b'\r' => {
                if data.get(i + 1) != Some(&b'\n') {
                    return false;
                }
                i += 1;
                line_len = 0;
            }
            b'\n' => return false,
            _ => {
                line_len += 1;
                if line_len > MAX_LINE {
                    return false;
                }
            }
        }
        i += 1;
    }

    true
}

/// Converts qualifying quoted-printable and base64 parts of `message` to
/// `8bit`.
///
/// A part qualifies when its decoded content passes [`is_8bit_clean`];
/// the decoded content is then re-attached under the original content
/// type with `Content-Transfer-Encoding: 8bit`. Returns true when at
/// least one part converted. Parts convert independently: one
/// non-qualifying part does not stop the rest.
pub fn convert_to_8bit(message: &mut dyn MimeMessage) -> bool {
    let mut converted = false;

    message.for_each_part(&mut |part: &mut dyn MimePart| {
        let encoding = part.transfer_encoding().to_ascii_lowercase();
        if encoding != "quoted-printable" && encoding != "base64" {
            return;
        }

        match part.decoded_content() {
            Ok(content) if is_8bit_clean(&content) => {
                part.attach_8bit(content);
                converted = true;
            }
            Ok(_) => {}
            Err(reason) => {
                tracing::debug!(%reason, "part left unconverted");
            }
        }
    });

    converted
}
