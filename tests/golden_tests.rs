//! # Golden Tests
//!
//! Byte-exact wire output for a reference receipt. Printers accept these
//! sequences as-is, so any drift here is a hardware regression.

use std::sync::Arc;

use image::{DynamicImage, Rgba, RgbaImage};
use pretty_assertions::assert_eq;

use blethermal::config::SessionConfig;
use blethermal::print::{PrintOptions, encode_receipt};
use blethermal::receipt::{Align, ReceiptModel, ShopHeader};
use blethermal::render::logo::Logo;
use blethermal::session::PrinterSession;
use blethermal::transport::mock::{MockDevice, MockHost};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

const INIT: [u8; 5] = [0x1B, 0x40, 0x1D, 0x21, 0x00];
const CUT: [u8; 4] = [0x1D, 0x56, 0x41, 0x0A];

const CAFE_TEXT: &str = concat!(
    "            Corner Cafe\r\n",
    "            12 Main St\r\n",
    "             555-0100\r\n",
    "-----------------------------------\r\n",
    "Item            Qty   Price   Total\r\n",
    "-----------------------------------\r\n",
    "Coffee            2    3.50    7.00\r\n",
    "-----------------------------------\r\n",
    "Subtotal                     Rs7.00\r\n",
    "Tax (8%)                     Rs0.56\r\n",
    "-----------------------------------\r\n",
    "TOTAL                        Rs7.56\r\n",
    "-----------------------------------\r\n",
    "            Thank you!\r\n",
    "\r\n\r\n\r\n",
);

fn cafe() -> blethermal::receipt::ReceiptBuilder {
    ReceiptModel::builder(
        ShopHeader::new("Corner Cafe")
            .address("12 Main St")
            .phone("555-0100"),
    )
    .line("Coffee", 2, 3.50)
    .tax_rate(0.08)
    .footer("Thank you!")
    .header_align(Align::Center)
    .footer_align(Align::Center)
}

fn black_logo(width: u32, height: u32) -> Logo {
    Logo::from_image(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([0, 0, 0, 255]),
    )))
}

fn golden(logo: Option<&[u8]>) -> Vec<u8> {
    let mut bytes = INIT.to_vec();
    if let Some(logo) = logo {
        bytes.extend_from_slice(logo);
    }
    bytes.extend_from_slice(CAFE_TEXT.as_bytes());
    bytes.extend_from_slice(&CUT);
    bytes
}

// ============================================================================
// GOLDEN BYTES
// ============================================================================

#[test]
fn golden_text_receipt() {
    let model = cafe().build().unwrap();
    let bytes = encode_receipt(&model, &PrintOptions::default())
        .unwrap()
        .to_bytes();
    assert_eq!(bytes, golden(None));
}

#[test]
fn golden_receipt_with_logo() {
    let model = cafe().logo(black_logo(8, 2)).build().unwrap();
    let bytes = encode_receipt(&model, &PrintOptions::default())
        .unwrap()
        .to_bytes();

    let raster = [0x1D, 0x76, 0x30, 0x00, 0x01, 0x00, 0x02, 0x00, 0xFF, 0xFF];
    assert_eq!(bytes, golden(Some(&raster)));
}

#[test]
fn golden_currency_glyph_is_transliterated() {
    let model = ReceiptModel::builder(ShopHeader::new("Chai \u{20B9}10 Stall"))
        .line("Caf\u{e9} au lait", 1, 1.00)
        .build()
        .unwrap();
    let bytes = encode_receipt(&model, &PrintOptions::default())
        .unwrap()
        .to_bytes();

    assert!(bytes.is_ascii());
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("Chai Rs10 Stall"));
    assert!(text.contains("Cafe au lait"));
}

#[tokio::test]
async fn golden_bytes_survive_chunking() {
    let device = MockDevice::printer("abc123", "BT-58");
    let host = MockHost::new().with_device(device.clone());
    host.choose(Some("abc123"));
    let session = PrinterSession::new(Arc::new(host), SessionConfig::default()).unwrap();
    session.connect().await.unwrap();

    let model = cafe().logo(black_logo(8, 2)).build().unwrap();
    for chunk_size in [1, 7, 20, 512] {
        device.clear_writes();
        let options = PrintOptions {
            chunk_size,
            ..PrintOptions::default()
        };
        session.print_receipt(&model, &options).await.unwrap();

        let raster = [0x1D, 0x76, 0x30, 0x00, 0x01, 0x00, 0x02, 0x00, 0xFF, 0xFF];
        assert_eq!(device.written(), golden(Some(&raster)), "chunk size {}", chunk_size);
        assert!(device.writes().iter().all(|w| w.len() <= chunk_size));
    }
}
