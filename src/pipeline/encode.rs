//! Payload encoding: PNG bytes → base64 string, checked against the wire ceiling.
//!
//! The submission endpoint takes the image as a base64 string inside a JSON
//! document, and enforces its own hard ceiling on that string. Validating
//! here means an oversized payload is rejected before any network call.

use crate::error::AnalysisError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Base64-encode a normalized PNG.
pub fn encode_image(png: &[u8]) -> String {
    let b64 = STANDARD.encode(png);
    debug!("Encoded image {} bytes → {} bytes base64", png.len(), b64.len());
    b64
}

/// Check a base64 payload against the wire ceiling.
///
/// # Errors
/// * [`AnalysisError::EmptyPayload`]: nothing to send
/// * [`AnalysisError::PayloadTooLarge`]: more than `limit` bytes
pub fn validate_payload(payload: &str, limit: usize) -> Result<(), AnalysisError> {
    if payload.is_empty() {
        return Err(AnalysisError::EmptyPayload);
    }
    let size = payload.len();
    if size > limit {
        return Err(AnalysisError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

/// Encode and validate in one step.
pub fn prepare_payload(png: &[u8], limit: usize) -> Result<String, AnalysisError> {
    let payload = encode_image(png);
    validate_payload(&payload, limit)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode should succeed");

        let b64 = prepare_payload(&png, 262_000).expect("small payload is valid");
        let decoded = STANDARD.decode(&b64).expect("valid base64");
        assert_eq!(decoded, png);
    }

    #[test]
    fn empty_payload_fails() {
        assert!(matches!(
            validate_payload("", 262_000),
            Err(AnalysisError::EmptyPayload)
        ));
    }

    #[test]
    fn payload_at_ceiling_passes() {
        let payload = "A".repeat(262_000);
        tokio_test::assert_ok!(validate_payload(&payload, 262_000));
    }

    #[test]
    fn payload_over_ceiling_reports_size() {
        let payload = "A".repeat(262_001);
        match validate_payload(&payload, 262_000) {
            Err(AnalysisError::PayloadTooLarge { size, limit }) => {
                assert_eq!(size, 262_001);
                assert_eq!(limit, 262_000);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn encoded_budget_png_can_exceed_wire_ceiling() {
        // 250 000 bytes of PNG is 333 336 bytes of base64: the wire ceiling is
        // the tighter limit and must be enforced separately.
        let png = vec![0u8; 250_000];
        tokio_test::assert_err!(prepare_payload(&png, 262_000));
        let png = vec![0u8; 196_500];
        tokio_test::assert_ok!(prepare_payload(&png, 262_000));
    }
}
