//! Image metadata extraction

use crate::error::PreprocessError;
use crate::validator::ImageProbe;
use domain_types::{CaptureInfo, ImageMetadata};
use std::io::Cursor;
use tracing::debug;

/// Format, dimensions, byte size and EXIF capture tags of an upload.
///
/// Missing or unreadable EXIF data is not an error.
pub fn extract_metadata(bytes: &[u8]) -> Result<ImageMetadata, PreprocessError> {
    let probe = ImageProbe::read(bytes)?;
    let capture = read_capture_info(bytes);

    Ok(ImageMetadata {
        format: probe.format_name().to_string(),
        width: probe.width,
        height: probe.height,
        color_type: format!("{:?}", probe.color_type),
        file_size_bytes: bytes.len() as u64,
        capture,
    })
}

fn read_capture_info(bytes: &[u8]) -> Option<CaptureInfo> {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(e) => {
            debug!("No EXIF data: {}", e);
            return None;
        }
    };

    let info = CaptureInfo {
        make: ascii_tag(&reader, exif::Tag::Make),
        model: ascii_tag(&reader, exif::Tag::Model),
        datetime: ascii_tag(&reader, exif::Tag::DateTimeOriginal)
            .or_else(|| ascii_tag(&reader, exif::Tag::DateTime)),
        software: ascii_tag(&reader, exif::Tag::Software),
    };

    if info.is_empty() {
        None
    } else {
        Some(info)
    }
}

fn ascii_tag(reader: &exif::Exif, tag: exif::Tag) -> Option<String> {
    let field = reader.get_field(tag, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Ascii(parts) => parts
            .first()
            .map(|raw| String::from_utf8_lossy(raw).trim_end_matches('\0').trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::Tag;
    use image::{DynamicImage, GrayAlphaImage, ImageFormat, RgbImage};

    const EXIF_IFD_POINTER: u16 = 0x8769;
    const ASCII: u16 = 2;
    const LONG: u16 = 4;

    /// Little-endian TIFF block with ASCII tags in IFD0 and, when given, in
    /// the Exif sub-IFD
    fn tiff_block(primary: &[(Tag, &[u8])], exif_ifd: &[(Tag, &[u8])]) -> Vec<u8> {
        let ifd_len = |entries: usize| 2 + 12 * entries + 4;
        let has_exif = !exif_ifd.is_empty();
        let primary_entries = primary.len() + usize::from(has_exif);
        let exif_at = 8 + ifd_len(primary_entries);
        let mut data_at = exif_at + if has_exif { ifd_len(exif_ifd.len()) } else { 0 };
        let mut data = Vec::new();

        let mut write_ifd = |entries: &[(Tag, &[u8])], pointer: Option<usize>| {
            let mut ifd = Vec::new();
            let count = entries.len() + usize::from(pointer.is_some());
            ifd.extend_from_slice(&(count as u16).to_le_bytes());
            for (tag, value) in entries {
                ifd.extend_from_slice(&tag.number().to_le_bytes());
                ifd.extend_from_slice(&ASCII.to_le_bytes());
                ifd.extend_from_slice(&(value.len() as u32).to_le_bytes());
                if value.len() <= 4 {
                    let mut inline = [0u8; 4];
                    inline[..value.len()].copy_from_slice(value);
                    ifd.extend_from_slice(&inline);
                } else {
                    ifd.extend_from_slice(&(data_at as u32).to_le_bytes());
                    data.extend_from_slice(value);
                    data_at += value.len();
                    if value.len() % 2 == 1 {
                        data.push(0);
                        data_at += 1;
                    }
                }
            }
            if let Some(offset) = pointer {
                ifd.extend_from_slice(&EXIF_IFD_POINTER.to_le_bytes());
                ifd.extend_from_slice(&LONG.to_le_bytes());
                ifd.extend_from_slice(&1u32.to_le_bytes());
                ifd.extend_from_slice(&(offset as u32).to_le_bytes());
            }
            ifd.extend_from_slice(&0u32.to_le_bytes());
            ifd
        };

        let ifd0 = write_ifd(primary, has_exif.then_some(exif_at));
        let sub_ifd = if has_exif { write_ifd(exif_ifd, None) } else { Vec::new() };

        let mut tiff = b"II".to_vec();
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend_from_slice(&ifd0);
        tiff.extend_from_slice(&sub_ifd);
        tiff.extend_from_slice(&data);
        tiff
    }

    /// JPEG from the `image` encoder with an APP1 Exif segment after SOI
    fn jpeg_with_exif(tiff: &[u8]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(64, 64))
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        let jpeg = buf.into_inner();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(tiff);

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_jpeg_capture_tags() {
        let tiff = tiff_block(
            &[
                (Tag::Make, b"Olympus\0\0\0"),
                (Tag::Model, b"CX43\0"),
                (Tag::DateTime, b"2024:01:01 00:00:00\0"),
            ],
            &[(Tag::DateTimeOriginal, b"2023:06:15 09:30:12\0")],
        );
        let bytes = jpeg_with_exif(&tiff);

        let meta = extract_metadata(&bytes).unwrap();
        assert_eq!(meta.format, "jpeg");
        assert_eq!((meta.width, meta.height), (64, 64));

        let capture = meta.capture.unwrap();
        assert_eq!(capture.make.as_deref(), Some("Olympus"));
        assert_eq!(capture.model.as_deref(), Some("CX43"));
        assert_eq!(capture.datetime.as_deref(), Some("2023:06:15 09:30:12"));
        assert!(capture.software.is_none());
    }

    #[test]
    fn test_capture_datetime_falls_back_and_blank_tags_dropped() {
        let tiff = tiff_block(
            &[
                (Tag::Make, b"   \0"),
                (Tag::Software, b"scope-acq 2.1\0"),
                (Tag::DateTime, b"2022:11:30 17:45:00\0"),
            ],
            &[],
        );
        let meta = extract_metadata(&jpeg_with_exif(&tiff)).unwrap();

        let capture = meta.capture.unwrap();
        assert!(capture.make.is_none());
        assert!(capture.model.is_none());
        assert_eq!(capture.software.as_deref(), Some("scope-acq 2.1"));
        assert_eq!(capture.datetime.as_deref(), Some("2022:11:30 17:45:00"));
    }

    #[test]
    fn test_png_metadata_without_exif() {
        let img = DynamicImage::ImageLumaA8(GrayAlphaImage::new(64, 80));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        let bytes = buf.into_inner();

        let meta = extract_metadata(&bytes).unwrap();
        assert_eq!(meta.format, "png");
        assert_eq!((meta.width, meta.height), (64, 80));
        assert_eq!(meta.color_type, "La8");
        assert_eq!(meta.file_size_bytes, bytes.len() as u64);
        assert!(meta.capture.is_none());
    }

    #[test]
    fn test_metadata_ignores_size_limits() {
        // Metadata is descriptive; bounds are the validator's job
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(10, 10));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Bmp).unwrap();

        let meta = extract_metadata(&buf.into_inner()).unwrap();
        assert_eq!(meta.format, "bmp");
        assert_eq!(meta.width, 10);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            extract_metadata(&[0u8; 10]),
            Err(PreprocessError::Decode(_))
        ));
    }
}
