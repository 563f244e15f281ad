use std::process::Command;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, ImageFormat};

/// Widest frame shipped to the detector; larger captures are downscaled.
const MAX_FRAME_WIDTH: u32 = 640;

/// A source of camera frames, encoded as PNG bytes.
///
/// Implementations hold the capture resource; dropping the source releases
/// it, so ownership by the sampling task gives scoped acquisition.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<Vec<u8>>;
}

/// Captures frames by running an external capture command that writes one
/// PNG to stdout (e.g. `fswebcam --png 9 --save -` on Linux, `imagesnap -`
/// on macOS). Keeps the camera dependency out of the process entirely.
pub struct CommandFrameSource {
    program: String,
    args: Vec<String>,
}

impl CommandFrameSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl FrameSource for CommandFrameSource {
    fn grab(&mut self) -> Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .with_context(|| format!("failed to run capture command '{}'", self.program))?;

        if !output.status.success() {
            bail!(
                "capture command '{}' exited with {}",
                self.program,
                output.status
            );
        }
        if output.stdout.is_empty() {
            bail!("capture command '{}' produced no frame data", self.program);
        }

        normalize_frame(&output.stdout)
    }
}

/// Decode, downscale to the detector's working width, and re-encode. Also
/// rejects captures that are not decodable images.
pub fn normalize_frame(png_bytes: &[u8]) -> Result<Vec<u8>> {
    let img =
        image::load_from_memory(png_bytes).context("captured frame is not a decodable image")?;

    let img = if img.width() > MAX_FRAME_WIDTH {
        let scale = MAX_FRAME_WIDTH as f32 / img.width() as f32;
        let height = (img.height() as f32 * scale).round().max(1.0) as u32;
        DynamicImage::ImageRgba8(image::imageops::resize(
            &img,
            MAX_FRAME_WIDTH,
            height,
            image::imageops::FilterType::Triangle,
        ))
    } else {
        img
    };

    let mut encoded = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut encoded), ImageFormat::Png)
        .context("failed to re-encode frame as PNG")?;
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn png_of(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn small_frames_pass_through_decodable() {
        let bytes = normalize_frame(&png_of(320, 240)).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.width(), 320);
        assert_eq!(img.height(), 240);
    }

    #[test]
    fn wide_frames_are_downscaled() {
        let bytes = normalize_frame(&png_of(1280, 720)).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.width(), 640);
        assert_eq!(img.height(), 360);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(normalize_frame(b"not a png").is_err());
    }

    #[test]
    fn missing_capture_command_reports_error() {
        let mut source = CommandFrameSource::new("studysentry-no-such-binary", vec![]);
        assert!(source.grab().is_err());
    }
}
