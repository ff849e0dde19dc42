//! Frame extraction and encoding (`spec.md` §4.1, C1).
//!
//! A single `recv` may contain several concatenated JSON objects. Extraction
//! is brace-balanced: every maximal substring starting at `{` and ending at
//! its matching `}` is yielded as one frame, mirroring the reference
//! implementation's non-greedy `{.*?}` regex scan. Nested braces inside
//! string values are not handled — on-wire payloads are flat scalar maps, so
//! this assumption holds in practice (`spec.md` §4.1, §9 open question).

use crate::cipher::FrameCipher;
use crate::error::ProtoError;

/// Extract every complete `{...}` object from `buf`, applying `cipher` to
/// each frame's bytes after boundary detection. Brace matching happens on
/// the (still possibly ciphered) raw bytes, since frame boundaries are a
/// property of the wire layout, not the plaintext.
pub fn decode_frames(buf: &[u8], cipher: &dyn FrameCipher) -> Result<Vec<String>, ProtoError> {
    let mut frames = Vec::new();
    let mut depth: i32 = 0;
    let mut start: Option<usize> = None;

    for (i, &byte) in buf.iter().enumerate() {
        match byte {
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            let wire = &buf[s..=i];
                            let plain = cipher.decode(wire)?;
                            let text = String::from_utf8(plain).map_err(|e| {
                                ProtoError::MalformedFrame(format!("invalid utf-8: {e}"))
                            })?;
                            frames.push(text);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if frames.is_empty() && !buf.is_empty() {
        return Err(ProtoError::MalformedFrame(
            "no complete JSON object found in buffer".into(),
        ));
    }

    Ok(frames)
}

/// Encode a single JSON text as wire bytes, applying `cipher`.
pub fn encode_frame(text: &str, cipher: &dyn FrameCipher) -> Vec<u8> {
    cipher.encode(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::Identity;

    #[test]
    fn decodes_multiple_concatenated_objects() {
        let buf = br#"{"type":0,"from":1001}{"type":1}"#;
        let frames = decode_frames(buf, &Identity).unwrap();
        assert_eq!(frames, vec![
            r#"{"type":0,"from":1001}"#.to_string(),
            r#"{"type":1}"#.to_string(),
        ]);
    }

    #[test]
    fn round_trip_preserves_list() {
        let objects = vec![
            r#"{"type":2,"from":1,"to":2}"#.to_string(),
            r#"{"type":4,"to":7}"#.to_string(),
        ];
        let encoded: Vec<u8> = objects
            .iter()
            .flat_map(|o| encode_frame(o, &Identity))
            .collect();
        let decoded = decode_frames(&encoded, &Identity).unwrap();
        assert_eq!(decoded, objects);
    }

    #[test]
    fn empty_buffer_yields_no_frames() {
        assert_eq!(decode_frames(b"", &Identity).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn non_empty_buffer_with_no_braces_is_malformed() {
        assert!(decode_frames(b"not json", &Identity).is_err());
    }

    #[test]
    fn unbalanced_trailing_brace_yields_only_complete_objects() {
        let buf = br#"{"type":0}{"type":1"#;
        let frames = decode_frames(buf, &Identity).unwrap();
        assert_eq!(frames, vec![r#"{"type":0}"#.to_string()]);
    }
}
