//! Per-line checksums.
//!
//! Every line of a reply except line 0 and the blank terminator ends in one
//! checksum byte: the low six bits of the byte sum, offset into printable
//! ASCII by `0x30`.

use crate::error::{FrameError, Result};
use crate::response::Response;

/// Commands whose replies leave the `;` before the checksum out of the sum.
const SEMICOLON_EXCLUDED: [&[u8; 2]; 3] = [b"PP", b"II", b"VV"];

/// Compute the SCIP checksum byte for `data`.
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (sum & 0x3f) + 0x30
}

/// Verify every checksummed line of a response.
///
/// Returns the first failing line. Responses with fewer than two lines
/// cannot be valid replies and are reported as truncated.
pub fn validate(response: &Response) -> Result<()> {
    let lines = response.lines();
    if lines.len() < 2 {
        return Err(FrameError::Truncated { lines: lines.len() });
    }

    let excludes_semicolon = lines[0]
        .body()
        .get(..2)
        .is_some_and(|prefix| SEMICOLON_EXCLUDED.iter().any(|cmd| prefix == *cmd));

    for (index, line) in lines.iter().enumerate().take(lines.len() - 1).skip(1) {
        let Some((&sent, mut data)) = line.body().split_last() else {
            return Err(FrameError::Checksum {
                line: index,
                expected: char::from(checksum(&[])),
                actual: ' ',
            });
        };

        if excludes_semicolon {
            if let Some((b';', rest)) = data.split_last() {
                data = rest;
            }
        }

        let expected = checksum(data);
        if expected != sent {
            return Err(FrameError::Checksum {
                line: index,
                expected: char::from(expected),
                actual: char::from(sent),
            });
        }
    }

    Ok(())
}
