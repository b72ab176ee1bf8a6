use crate::playback::PlaybackError;
use base64::Engine;

/// Container formats the server's TTS pipeline is known to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Ogg,
}

impl AudioFormat {
    /// File suffix handed to the external player so it can pick a demuxer.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => ".mp3",
            AudioFormat::Wav => ".wav",
            AudioFormat::Ogg => ".ogg",
        }
    }
}

/// Decodes a base64 audio payload into raw bytes.
///
/// Whitespace (line-wrapped base64) is tolerated; an empty payload, before or
/// after decoding, is rejected.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, PlaybackError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(PlaybackError::Empty);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(compact.as_bytes())?;
    if bytes.is_empty() {
        return Err(PlaybackError::Empty);
    }
    Ok(bytes)
}

/// Identifies the container from its leading magic bytes.
pub fn sniff_format(bytes: &[u8]) -> Result<AudioFormat, PlaybackError> {
    match bytes {
        [b'I', b'D', b'3', ..] => Ok(AudioFormat::Mp3),
        // MPEG audio frame sync: 11 set bits.
        [0xFF, second, ..] if second & 0xE0 == 0xE0 => Ok(AudioFormat::Mp3),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Ok(AudioFormat::Wav),
        [b'O', b'g', b'g', b'S', ..] => Ok(AudioFormat::Ogg),
        _ => Err(PlaybackError::UnsupportedFormat),
    }
}

/// Maps a `[0, 1]` volume onto the 0–100 scale most CLI players expect.
pub fn volume_percent(volume: f32) -> u8 {
    if volume.is_nan() {
        return 0;
    }
    (volume.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_decode_payload() {
        let bytes = decode_payload(&encode(b"ID3\x04\x00")).unwrap();
        assert_eq!(bytes, b"ID3\x04\x00");

        // Line-wrapped payloads are accepted.
        let wrapped = format!("{}\n", encode(b"RIFF"));
        assert_eq!(decode_payload(&wrapped).unwrap(), b"RIFF");
    }

    #[test]
    fn test_decode_payload_rejects_empty_and_invalid() {
        assert!(matches!(decode_payload(""), Err(PlaybackError::Empty)));
        assert!(matches!(decode_payload("  \n"), Err(PlaybackError::Empty)));
        assert!(matches!(
            decode_payload("invalid_base64!"),
            Err(PlaybackError::Decode(_))
        ));
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(sniff_format(b"ID3\x03rest").unwrap(), AudioFormat::Mp3);
        assert_eq!(sniff_format(&[0xFF, 0xFB, 0x90, 0x64]).unwrap(), AudioFormat::Mp3);
        assert_eq!(
            sniff_format(b"RIFF\x24\x00\x00\x00WAVEfmt ").unwrap(),
            AudioFormat::Wav
        );
        assert_eq!(sniff_format(b"OggS\x00\x02").unwrap(), AudioFormat::Ogg);
    }

    #[test]
    fn test_sniff_format_rejects_unknown() {
        assert!(matches!(
            sniff_format(b"<html>"),
            Err(PlaybackError::UnsupportedFormat)
        ));
        assert!(matches!(sniff_format(&[0xFF]), Err(PlaybackError::UnsupportedFormat)));
        assert!(matches!(sniff_format(&[]), Err(PlaybackError::UnsupportedFormat)));
    }

    #[test]
    fn test_extension() {
        assert_eq!(AudioFormat::Mp3.extension(), ".mp3");
        assert_eq!(AudioFormat::Wav.extension(), ".wav");
        assert_eq!(AudioFormat::Ogg.extension(), ".ogg");
    }

    #[test]
    fn test_volume_percent() {
        assert_eq!(volume_percent(0.0), 0);
        assert_eq!(volume_percent(0.7), 70);
        assert_eq!(volume_percent(1.0), 100);
        assert_eq!(volume_percent(3.0), 100);
        assert_eq!(volume_percent(-1.0), 0);
        assert_eq!(volume_percent(f32::NAN), 0);
    }
}
