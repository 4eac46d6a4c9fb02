//! Multi-packet framing.
//!
//! A single packet is sent as-is. Multiple packets batched into one
//! transport message are joined with the `U+FFFD` replacement character as
//! a separator, each prefixed with its own length — counted in *code
//! points*, not bytes, since the packets themselves may contain `U+FFFD`
//! as ordinary payload text (see the unicode test in `packet.rs`).
//!
//! Layout: `�<len>�<packet>�<len>�<packet>...`

use crate::error::{CodecError, CodecResult};

const SEP: char = '\u{fffd}';

/// Joins already-encoded packet strings into one frame. A single packet is
/// passed through unframed; zero or multiple packets get the `�`
/// envelope.
pub fn encode_frames<S: AsRef<str>>(packets: &[S]) -> String {
    match packets {
        [] => String::new(),
        [only] => only.as_ref().to_owned(),
        many => {
            let mut out = String::new();
            for packet in many {
                let packet = packet.as_ref();
                out.push(SEP);
                out.push_str(&packet.chars().count().to_string());
                out.push(SEP);
                out.push_str(packet);
            }
            out
        }
    }
}

/// Splits a frame back into its constituent encoded packet strings. A
/// frame with no `�` envelope is treated as a single packet.
pub fn decode_frames(input: &str) -> CodecResult<Vec<String>> {
    if !input.starts_with(SEP) {
        return Ok(vec![input.to_owned()]);
    }

    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != SEP {
            return Err(CodecError::InvalidFrameLength(
                chars[i..].iter().collect::<String>(),
            ));
        }
        i += 1;

        let mut len_str = String::new();
        while i < chars.len() && chars[i] != SEP {
            len_str.push(chars[i]);
            i += 1;
        }
        if i >= chars.len() {
            return Err(CodecError::TruncatedFrame { expected: 0, found: 0 });
        }
        i += 1; // consume the separator following the length

        let length: usize = len_str
            .parse()
            .map_err(|_| CodecError::InvalidFrameLength(len_str.clone()))?;

        if i + length > chars.len() {
            return Err(CodecError::TruncatedFrame { expected: length, found: chars.len() - i });
        }

        out.push(chars[i..i + length].iter().collect());
        i += length;
    }

    Ok(out)
}
