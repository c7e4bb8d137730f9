//! Minimal TIFF header reader: enough to count bands without GDAL.

use crate::utils::error::{FtwError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

pub const SAMPLES_PER_PIXEL: u16 = 277;
pub const EXPECTED_BANDS: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TiffByteOrder {
    Little,
    Big,
}

impl TiffByteOrder {
    fn u16(&self, buf: &[u8]) -> u16 {
        match self {
            TiffByteOrder::Little => LittleEndian::read_u16(buf),
            TiffByteOrder::Big => BigEndian::read_u16(buf),
        }
    }

    fn u32(&self, buf: &[u8]) -> u32 {
        match self {
            TiffByteOrder::Little => LittleEndian::read_u32(buf),
            TiffByteOrder::Big => BigEndian::read_u32(buf),
        }
    }

    fn u64(&self, buf: &[u8]) -> u64 {
        match self {
            TiffByteOrder::Little => LittleEndian::read_u64(buf),
            TiffByteOrder::Big => BigEndian::read_u64(buf),
        }
    }
}

/// SamplesPerPixel of the first IFD. Classic TIFF and BigTIFF are accepted.
pub fn band_count(path: &Path) -> Result<u16> {
    let invalid = |reason: &str| FtwError::InvalidRaster {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let mut file = File::open(path)?;
    let mut header = [0u8; 16];
    let read = file.read(&mut header)?;
    if read < 8 {
        return Err(invalid("file too small to be a TIFF"));
    }

    let order = match &header[0..2] {
        b"II" => TiffByteOrder::Little,
        b"MM" => TiffByteOrder::Big,
        _ => return Err(invalid("not a TIFF file")),
    };

    let (big, ifd_offset) = match order.u16(&header[2..4]) {
        42 => (false, order.u32(&header[4..8]) as u64),
        43 if read >= 16 => (true, order.u64(&header[8..16])),
        _ => return Err(invalid("unsupported TIFF version")),
    };

    file.seek(SeekFrom::Start(ifd_offset))?;
    let (count_size, entry_size) = if big { (8, 20) } else { (2, 12) };
    let mut count_buf = [0u8; 8];
    file.read_exact(&mut count_buf[..count_size])?;
    let entries = if big {
        order.u64(&count_buf)
    } else {
        order.u16(&count_buf[..2]) as u64
    };

    let mut entry = [0u8; 20];
    for _ in 0..entries {
        file.read_exact(&mut entry[..entry_size])?;
        if order.u16(&entry[0..2]) != SAMPLES_PER_PIXEL {
            continue;
        }
        // SHORT value stored inline at the start of the value field
        let value_at = if big { 12 } else { 8 };
        return match order.u16(&entry[2..4]) {
            3 => Ok(order.u16(&entry[value_at..value_at + 2])),
            4 => Ok(order.u32(&entry[value_at..value_at + 4]) as u16),
            _ => Err(invalid("unexpected SamplesPerPixel type")),
        };
    }

    // 無此標籤時預設為單波段
    Ok(1)
}

pub fn ensure_band_count(path: &Path, expected: u16) -> Result<()> {
    if !path.is_file() {
        return Err(FtwError::InvalidRaster {
            path: path.display().to_string(),
            reason: "file does not exist".to_string(),
        });
    }
    let bands = band_count(path)?;
    if bands != expected {
        return Err(FtwError::InvalidRaster {
            path: path.display().to_string(),
            reason: format!("Expected {} bands, found {} bands", expected, bands),
        });
    }
    Ok(())
}
