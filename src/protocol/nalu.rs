use memchr::memmem;
use thiserror::Error;

/// Annex-B start code used by the dongle's video stream.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

pub const NALU_SLICE: u8 = 1;
pub const NALU_IDR: u8 = 5;
pub const NALU_SEI: u8 = 6;
pub const NALU_SPS: u8 = 7;
pub const NALU_PPS: u8 = 8;

#[derive(Debug, Error)]
pub enum NaluError {
    #[error("nal unit too short")]
    TooShort,
    #[error("not a sequence parameter set")]
    NotSps,
    #[error("bitstream exhausted while parsing")]
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nalu<'a> {
    /// nal_unit_type (low five bits of the first byte).
    pub kind: u8,
    /// Unit bytes without the start code, emulation bytes still present.
    pub raw: &'a [u8],
}

/// Iterate NAL units in a 4-byte start-code stream.
pub fn iter_nalus(stream: &[u8]) -> impl Iterator<Item = Nalu<'_>> {
    let mut starts: Vec<usize> = memmem::find_iter(stream, &START_CODE).collect();
    starts.push(stream.len().saturating_add(START_CODE.len()));
    starts
        .windows(2)
        .map(|w| {
            let begin = w[0] + START_CODE.len();
            let end = (w[1]).min(stream.len());
            &stream[begin..end]
        })
        .filter(|raw| !raw.is_empty())
        .map(|raw| Nalu {
            kind: raw[0] & 0x1F,
            raw,
        })
        .collect::<Vec<_>>()
        .into_iter()
}

/// First NAL unit of the given type, without its start code.
pub fn find_nalu(stream: &[u8], kind: u8) -> Option<&[u8]> {
    iter_nalus(stream).find(|n| n.kind == kind).map(|n| n.raw)
}

/// True if the access unit contains an IDR slice.
pub fn is_keyframe(stream: &[u8]) -> bool {
    iter_nalus(stream).any(|n| n.kind == NALU_IDR)
}

/// Remove emulation-prevention bytes (00 00 03 xx → 00 00 xx), yielding the
/// raw byte sequence payload the bit reader operates on.
pub fn unescape_rbsp(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut zeros = 0usize;
    for &b in raw {
        if zeros >= 2 && b == 3 {
            zeros = 0;
            continue;
        }
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(b);
    }
    out
}

/// Geometry and profile signalling parsed out of an SPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpsInfo {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub width: u32,
    pub height: u32,
}

impl SpsInfo {
    /// MIME-style codec tag, e.g. `avc1.64002A` for High 4.2.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02X}{:02X}{:02X}",
            self.profile_idc, self.constraint_flags, self.level_idc
        )
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit: 0 }
    }

    fn read_bit(&mut self) -> Result<u32, NaluError> {
        let byte = self.bit / 8;
        if byte >= self.data.len() {
            return Err(NaluError::Exhausted);
        }
        let shift = 7 - (self.bit % 8);
        self.bit += 1;
        Ok(((self.data[byte] >> shift) & 1) as u32)
    }

    fn read_bits(&mut self, n: u32) -> Result<u32, NaluError> {
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()?;
        }
        Ok(value)
    }

    /// Unsigned exp-Golomb.
    fn read_ue(&mut self) -> Result<u32, NaluError> {
        let mut zeros = 0u32;
        while self.read_bit()? == 0 {
            zeros += 1;
            if zeros > 31 {
                return Err(NaluError::Exhausted);
            }
        }
        Ok((1 << zeros) - 1 + self.read_bits(zeros)?)
    }

    /// Signed exp-Golomb.
    fn read_se(&mut self) -> Result<i32, NaluError> {
        let code = self.read_ue()?;
        let value = code.div_ceil(2) as i32;
        Ok(if code % 2 == 0 { -value } else { value })
    }
}

fn skip_scaling_list(reader: &mut BitReader<'_>, size: usize) -> Result<(), NaluError> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_se()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// Parse the geometry-relevant prefix of a sequence parameter set.
///
/// `nalu` is the unit without its start code (as produced by [`iter_nalus`]).
pub fn parse_sps(nalu: &[u8]) -> Result<SpsInfo, NaluError> {
    if nalu.len() < 4 {
        return Err(NaluError::TooShort);
    }
    if nalu[0] & 0x1F != NALU_SPS {
        return Err(NaluError::NotSps);
    }

    let rbsp = unescape_rbsp(&nalu[1..]);
    if rbsp.len() < 4 {
        return Err(NaluError::TooShort);
    }
    let profile_idc = rbsp[0];
    let constraint_flags = rbsp[1];
    let level_idc = rbsp[2];

    let mut reader = BitReader::new(&rbsp[3..]);
    let _sps_id = reader.read_ue()?;

    let mut chroma_format_idc = 1u32;
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format_idc = reader.read_ue()?;
        if chroma_format_idc == 3 {
            let _separate_colour_plane = reader.read_bit()?;
        }
        let _bit_depth_luma = reader.read_ue()?;
        let _bit_depth_chroma = reader.read_ue()?;
        let _qpprime = reader.read_bit()?;
        if reader.read_bit()? == 1 {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if reader.read_bit()? == 1 {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let _log2_max_frame_num = reader.read_ue()?;
    let pic_order_cnt_type = reader.read_ue()?;
    if pic_order_cnt_type == 0 {
        let _log2_max_pic_order_cnt = reader.read_ue()?;
    } else if pic_order_cnt_type == 1 {
        let _delta_pic_order_always_zero = reader.read_bit()?;
        let _offset_non_ref = reader.read_se()?;
        let _offset_top_bottom = reader.read_se()?;
        let cycles = reader.read_ue()?;
        for _ in 0..cycles {
            let _offset = reader.read_se()?;
        }
    }

    let _max_num_ref_frames = reader.read_ue()?;
    let _gaps_allowed = reader.read_bit()?;

    let pic_width_in_mbs = reader.read_ue()? + 1;
    let pic_height_in_map_units = reader.read_ue()? + 1;
    let frame_mbs_only = reader.read_bit()?;
    if frame_mbs_only == 0 {
        let _mb_adaptive = reader.read_bit()?;
    }
    let _direct_8x8 = reader.read_bit()?;

    let mut crop = (0u32, 0u32, 0u32, 0u32);
    if reader.read_bit()? == 1 {
        crop = (
            reader.read_ue()?,
            reader.read_ue()?,
            reader.read_ue()?,
            reader.read_ue()?,
        );
    }

    // Crop units per H.264 table 6-1 (sub-sampling by chroma format).
    let (sub_w, sub_h) = match chroma_format_idc {
        0 => (1, 1),
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1),
    };
    let crop_unit_x = sub_w;
    let crop_unit_y = sub_h * (2 - frame_mbs_only);

    let width = pic_width_in_mbs * 16 - (crop.0 + crop.1) * crop_unit_x;
    let height = (2 - frame_mbs_only) * pic_height_in_map_units * 16 - (crop.2 + crop.3) * crop_unit_y;

    Ok(SpsInfo {
        profile_idc,
        constraint_flags,
        level_idc,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Baseline level-3.0 SPS describing 320x240 (20x15 macroblocks, no crop).
    const SPS_320X240: [u8; 8] = [0x67, 0x42, 0x00, 0x1E, 0xDA, 0x05, 0x07, 0xC4];

    fn annexb(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in units {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(unit);
        }
        out
    }

    #[test]
    fn iterates_units_and_kinds() {
        let stream = annexb(&[&SPS_320X240, &[0x68, 0xCE, 0x38, 0x80], &[0x65, 0x88, 0x84]]);
        let kinds: Vec<u8> = iter_nalus(&stream).map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NALU_SPS, NALU_PPS, NALU_IDR]);
    }

    #[test]
    fn keyframe_detection_requires_idr() {
        let p_slice = annexb(&[&[0x41, 0x9A, 0x00]]);
        assert!(!is_keyframe(&p_slice));
        let idr = annexb(&[&SPS_320X240, &[0x65, 0x88]]);
        assert!(is_keyframe(&idr));
    }

    #[test]
    fn find_nalu_returns_unit_without_start_code() {
        let stream = annexb(&[&[0x41, 0x9A], &SPS_320X240]);
        let sps = find_nalu(&stream, NALU_SPS).unwrap();
        assert_eq!(sps, &SPS_320X240);
        assert!(find_nalu(&stream, NALU_IDR).is_none());
    }

    #[test]
    fn emulation_prevention_bytes_removed() {
        let raw = [0x67, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00];
        assert_eq!(
            unescape_rbsp(&raw),
            vec![0x67, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn parses_baseline_sps_geometry() {
        let info = parse_sps(&SPS_320X240).unwrap();
        assert_eq!(info.profile_idc, 66);
        assert_eq!(info.width, 320);
        assert_eq!(info.height, 240);
        assert_eq!(info.codec_string(), "avc1.42001E");
    }

    #[test]
    fn rejects_non_sps_units() {
        assert!(matches!(
            parse_sps(&[0x65, 0x88, 0x84, 0x00]),
            Err(NaluError::NotSps)
        ));
    }
}
