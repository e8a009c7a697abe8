//! Hex text for frames on the command line.

use crate::exit::{CliError, CliResult, DATA_INVALID};

/// Lowercase hex, bytes separated by `sep`.
pub fn encode(bytes: &[u8], sep: &str) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(sep)
}

/// Parse hex digits, ignoring whitespace, commas and `0x` prefixes.
pub fn decode(text: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .flat_map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
                .bytes()
        })
        .collect();

    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("hex input has an odd number of digits ({})", digits.len()),
        ));
    }

    digits
        .chunks_exact(2)
        .map(|pair| -> CliResult<u8> { Ok((nibble(pair[0])? << 4) | nibble(pair[1])?) })
        .collect()
}

fn nibble(digit: u8) -> CliResult<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(CliError::new(
            DATA_INVALID,
            format!("invalid hex digit {:?}", char::from(other)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_separator() {
        assert_eq!(encode(&[0x23, 0x02, 0xff], " "), "23 02 ff");
        assert_eq!(encode(&[0x0a, 0x0b], ""), "0a0b");
    }

    #[test]
    fn decodes_loose_formatting() {
        assert_eq!(decode("23 02\n0x01,FF").unwrap(), vec![0x23, 0x02, 0x01, 0xff]);
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn rejects_bad_digits() {
        assert_eq!(decode("2").unwrap_err().code, DATA_INVALID);
        assert_eq!(decode("zz").unwrap_err().code, DATA_INVALID);
    }
}
