//! # Print Orchestrator
//!
//! The public print path: check the link, encode everything, then stream
//! the segments through the chunker.
//!
//! ```text
//! print_receipt(model, options)
//!   1. device set and GATT link up?            else NotConnected
//!   2. encode: init | logo? | body | cut?      nothing sent yet
//!   3. send each segment, chunk by chunk       first failure aborts
//! ```
//!
//! Step 3 holds the characteristic's write lock for the whole receipt, so
//! concurrent prints on one session come out one after the other.
//!
//! A failed print is never resumed. The printer may have received a prefix
//! of the receipt; the caller decides whether to print again.

use serde::{Deserialize, Serialize};

use crate::error::{PrinterError, Result};
use crate::protocol::commands;
use crate::receipt::{encode_body, model::validate_width, ReceiptModel};
use crate::render::logo::{encode_logo, DEFAULT_THRESHOLD};
use crate::session::PrinterSession;
use crate::transport::chunker::{Chunker, DEFAULT_CHUNK_SIZE};

/// What to do when the logo cannot be rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogoFailure {
    /// Fail the whole print with the encoding error.
    #[default]
    Abort,
    /// Log a warning and print the text without the logo.
    SkipLogo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrintOptions {
    /// Overrides the model's width when set.
    pub width: Option<usize>,
    pub auto_cut: bool,
    pub chunk_size: usize,
    pub logo_failure: LogoFailure,
    /// Logo darkness cutoff.
    pub threshold: u8,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            width: None,
            auto_cut: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            logo_failure: LogoFailure::Abort,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl PrintOptions {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PrinterError::InvalidOptions(
                "chunk size must be at least 1 byte".into(),
            ));
        }
        if let Some(width) = self.width {
            validate_width(width)?;
        }
        Ok(())
    }
}

/// Receipt bytes, split into the segments sent one after another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedReceipt {
    pub init: Vec<u8>,
    pub logo: Option<Vec<u8>>,
    pub body: Vec<u8>,
    pub cut: Option<Vec<u8>>,
}

impl EncodedReceipt {
    /// Segments in send order, labelled for logs.
    pub fn segments(&self) -> impl Iterator<Item = (&'static str, &[u8])> {
        [
            Some(("init", self.init.as_slice())),
            self.logo.as_deref().map(|logo| ("logo", logo)),
            Some(("body", self.body.as_slice())),
            self.cut.as_deref().map(|cut| ("cut", cut)),
        ]
        .into_iter()
        .flatten()
    }

    pub fn len(&self) -> usize {
        self.segments().map(|(_, bytes)| bytes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for (_, bytes) in self.segments() {
            out.extend_from_slice(bytes);
        }
        out
    }
}

/// Encode a receipt without sending it.
///
/// ```
/// use blethermal::print::{encode_receipt, PrintOptions};
/// use blethermal::receipt::{ReceiptModel, ShopHeader};
///
/// let model = ReceiptModel::builder(ShopHeader::new("Corner Cafe"))
///     .line("Coffee", 2, 3.50)
///     .tax_rate(0.08)
///     .build()?;
/// let bytes = encode_receipt(&model, &PrintOptions::default())?.to_bytes();
///
/// assert!(bytes.starts_with(&[0x1B, 0x40, 0x1D, 0x21, 0x00]));
/// assert!(bytes.ends_with(&[0x1D, 0x56, 0x41, 0x0A]));
/// # Ok::<(), blethermal::PrinterError>(())
/// ```
pub fn encode_receipt(model: &ReceiptModel, options: &PrintOptions) -> Result<EncodedReceipt> {
    options.validate()?;
    let width = options.width.unwrap_or(model.width());

    let logo = match model.logo() {
        None => None,
        Some(logo) => match encode_logo(logo, width, options.threshold) {
            Ok(raster) => Some(raster),
            Err(e) if options.logo_failure == LogoFailure::SkipLogo => {
                tracing::warn!(error = %e, "Printing without logo");
                None
            }
            Err(e) => return Err(e),
        },
    };

    Ok(EncodedReceipt {
        init: commands::init(),
        logo,
        body: encode_body(model, width),
        cut: options.auto_cut.then(commands::cut),
    })
}

/// Bytes and chunking of a completed print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintSummary {
    pub bytes: usize,
    pub chunk_size: usize,
    pub logo: bool,
}

impl PrinterSession {
    /// Print `model` on the connected printer.
    ///
    /// ## Errors
    ///
    /// - [`PrinterError::NotConnected`]: no device, or the link is down
    ///   (checked before any byte is sent, and again before every chunk)
    /// - [`PrinterError::EncodingFailure`]: logo could not be rasterized and
    ///   `logo_failure` is `Abort`
    /// - [`PrinterError::WriteFailure`]: a chunk write failed; the rest of
    ///   the receipt is dropped
    /// - [`PrinterError::Timeout`]: a chunk write outlived the session's
    ///   `op_timeout`; the rest of the receipt is dropped
    pub async fn print_receipt(
        &self,
        model: &ReceiptModel,
        options: &PrintOptions,
    ) -> Result<PrintSummary> {
        let device = self.device().ok_or(PrinterError::NotConnected)?;
        let handle = self.characteristic()?;
        if !handle.is_valid() || !handle.gatt().is_connected().await {
            return Err(PrinterError::NotConnected);
        }

        let payload = encode_receipt(model, options)?;
        let chunker = Chunker::new(options.chunk_size)?.with_timeout(self.config().op_timeout);
        let chunk_size = chunker.effective_chunk_size(&handle);
        tracing::info!(
            device = %device,
            bytes = payload.len(),
            chunk_size,
            logo = payload.logo.is_some(),
            "Printing receipt"
        );

        if let Err(e) = chunker.send_segments(&handle, payload.segments()).await {
            tracing::warn!(device = %device, error = %e, "Print aborted");
            return Err(e);
        }

        Ok(PrintSummary {
            bytes: payload.len(),
            chunk_size,
            logo: payload.logo.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use image::{DynamicImage, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;

    use crate::config::SessionConfig;
    use crate::receipt::ShopHeader;
    use crate::render::logo::Logo;
    use crate::session::ConnectionState;
    use crate::transport::mock::{MockDevice, MockHost};

    fn coffee() -> ReceiptModel {
        ReceiptModel::builder(ShopHeader::new("Corner Cafe"))
            .line("Coffee", 2, 3.50)
            .tax_rate(0.08)
            .build()
            .unwrap()
    }

    fn with_logo(logo: Logo) -> ReceiptModel {
        ReceiptModel::builder(ShopHeader::new("Corner Cafe"))
            .line("Coffee", 2, 3.50)
            .logo(logo)
            .build()
            .unwrap()
    }

    fn black_square(side: u32) -> Logo {
        Logo::from_image(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            side,
            side,
            Rgba([0, 0, 0, 255]),
        )))
    }

    async fn connected() -> (PrinterSession, MockDevice) {
        let device = MockDevice::printer("abc123", "BT-58");
        let host = MockHost::new().with_device(device.clone());
        host.choose(Some("abc123"));
        let session = PrinterSession::new(Arc::new(host), SessionConfig::default()).unwrap();
        session.connect().await.unwrap();
        (session, device)
    }

    #[test]
    fn test_encode_segments() {
        let payload = encode_receipt(&coffee(), &PrintOptions::default()).unwrap();
        let labels: Vec<&str> = payload.segments().map(|(label, _)| label).collect();
        assert_eq!(labels, vec!["init", "body", "cut"]);

        let bytes = payload.to_bytes();
        assert_eq!(&bytes[..5], &[0x1B, 0x40, 0x1D, 0x21, 0x00]);
        assert_eq!(&bytes[bytes.len() - 4..], &[0x1D, 0x56, 0x41, 0x0A]);
        assert_eq!(bytes.len(), payload.len());
    }

    #[test]
    fn test_no_cut_when_disabled() {
        let options = PrintOptions {
            auto_cut: false,
            ..PrintOptions::default()
        };
        let payload = encode_receipt(&coffee(), &options).unwrap();
        assert!(payload.cut.is_none());
        assert!(payload.to_bytes().ends_with(b"\r\n\r\n\r\n"));
    }

    #[test]
    fn test_logo_segment_before_body() {
        let payload = encode_receipt(&with_logo(black_square(16)), &PrintOptions::default()).unwrap();
        let logo = payload.logo.as_ref().unwrap();
        assert_eq!(&logo[..4], &[0x1D, 0x76, 0x30, 0x00]);
        assert_eq!(logo.len(), 8 + 2 * 16);

        let labels: Vec<&str> = payload.segments().map(|(label, _)| label).collect();
        assert_eq!(labels, vec!["init", "logo", "body", "cut"]);
    }

    #[test]
    fn test_bad_logo_aborts_by_default() {
        let model = with_logo(Logo::from_bytes(b"not an image".to_vec()));
        assert!(matches!(
            encode_receipt(&model, &PrintOptions::default()),
            Err(PrinterError::EncodingFailure(_))
        ));
    }

    #[test]
    fn test_bad_logo_skipped_when_asked() {
        let model = with_logo(Logo::from_bytes(b"not an image".to_vec()));
        let options = PrintOptions {
            logo_failure: LogoFailure::SkipLogo,
            ..PrintOptions::default()
        };
        let payload = encode_receipt(&model, &options).unwrap();
        assert!(payload.logo.is_none());
    }

    #[test]
    fn test_invalid_options() {
        let zero_chunk = PrintOptions {
            chunk_size: 0,
            ..PrintOptions::default()
        };
        assert!(matches!(
            encode_receipt(&coffee(), &zero_chunk),
            Err(PrinterError::InvalidOptions(_))
        ));
        let narrow = PrintOptions {
            width: Some(10),
            ..PrintOptions::default()
        };
        assert!(encode_receipt(&coffee(), &narrow).is_err());
    }

    #[test]
    fn test_width_override() {
        let options = PrintOptions {
            width: Some(48),
            ..PrintOptions::default()
        };
        let payload = encode_receipt(&coffee(), &options).unwrap();
        let body = String::from_utf8(payload.body).unwrap();
        assert!(body.contains(&format!("{}\r\n", "-".repeat(48))));
    }

    #[test]
    fn test_options_from_json() {
        let options: PrintOptions =
            serde_json::from_str(r#"{"autoCut": false, "logoFailure": "skipLogo"}"#).unwrap();
        assert!(!options.auto_cut);
        assert_eq!(options.logo_failure, LogoFailure::SkipLogo);
        assert_eq!(options.chunk_size, 20);
    }

    #[tokio::test]
    async fn test_print_sends_everything_in_chunks() {
        let (session, device) = connected().await;
        let model = coffee();

        let summary = session
            .print_receipt(&model, &PrintOptions::default())
            .await
            .unwrap();

        let expected = encode_receipt(&model, &PrintOptions::default())
            .unwrap()
            .to_bytes();
        assert_eq!(device.written(), expected);
        assert_eq!(summary.bytes, expected.len());
        assert!(device.writes().iter().all(|w| !w.is_empty() && w.len() <= 20));
    }

    #[tokio::test]
    async fn test_print_without_connection() {
        let device = MockDevice::printer("abc123", "BT-58");
        let host = MockHost::new().with_device(device.clone());
        let session = PrinterSession::new(Arc::new(host), SessionConfig::default()).unwrap();

        assert!(matches!(
            session.print_receipt(&coffee(), &PrintOptions::default()).await,
            Err(PrinterError::NotConnected)
        ));
        assert!(device.writes().is_empty());
    }

    #[tokio::test]
    async fn test_encoding_failure_sends_nothing() {
        let (session, device) = connected().await;
        let model = with_logo(Logo::from_bytes(b"garbage".to_vec()));

        assert!(matches!(
            session.print_receipt(&model, &PrintOptions::default()).await,
            Err(PrinterError::EncodingFailure(_))
        ));
        assert!(device.writes().is_empty());
    }

    #[tokio::test]
    async fn test_remote_disconnect_mid_print() {
        let (session, device) = connected().await;
        device.drop_link_after_writes(3);

        let err = session
            .print_receipt(&coffee(), &PrintOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PrinterError::NotConnected));
        assert_eq!(device.writes().len(), 3);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_prints_do_not_interleave() {
        let (session, device) = connected().await;
        device.set_write_delay(Some(std::time::Duration::from_millis(5)));
        let first = coffee();
        let second = ReceiptModel::builder(ShopHeader::new("Tea House"))
            .line("Sencha", 1, 4.00)
            .footer("Come again")
            .build()
            .unwrap();

        let (opts_a, opts_b) = (PrintOptions::default(), PrintOptions::default());
        let (a, b) = tokio::join!(
            session.print_receipt(&first, &opts_a),
            session.print_receipt(&second, &opts_b),
        );
        a.unwrap();
        b.unwrap();

        let options = PrintOptions::default();
        let mut first_then_second = encode_receipt(&first, &options).unwrap().to_bytes();
        first_then_second.extend(encode_receipt(&second, &options).unwrap().to_bytes());
        let mut second_then_first = encode_receipt(&second, &options).unwrap().to_bytes();
        second_then_first.extend(encode_receipt(&first, &options).unwrap().to_bytes());

        let written = device.written();
        assert!(written == first_then_second || written == second_then_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        let (session, device) = connected().await;
        device.set_write_delay(Some(session.config().op_timeout * 2));

        let err = session
            .print_receipt(&coffee(), &PrintOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PrinterError::Timeout {
                operation: "characteristic write",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_write_failure_aborts_print() {
        let (session, device) = connected().await;
        device.fail_write_at(2);

        assert!(matches!(
            session.print_receipt(&coffee(), &PrintOptions::default()).await,
            Err(PrinterError::WriteFailure(_))
        ));
        assert_eq!(device.writes().len(), 2);
        assert!(!device.written().ends_with(&commands::cut()));
    }
}
