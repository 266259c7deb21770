//! gbsplay invocation and register-dump parsing
//!
//! gbsplay's `iodumper` output plugin prints one line per APU register
//! write: an 8-digit hex cycle delta, then the register address and the
//! value, e.g. `0000abcd ff12=f3`. Two lines of preamble precede the dump.

use crate::error::{Error, Result};
use crate::translate::RegWrite;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

/// Lines of preamble before the register dump starts.
const HEADER_LINES: usize = 2;

/// Parse an iodumper register dump into a register-write list.
///
/// Cycle deltas accumulate into absolute song time; addresses are stored
/// relative to 0xFF00.
pub fn parse_dump<R: BufRead>(input: R) -> Result<Vec<RegWrite>> {
    let mut writes = Vec::new();
    let mut cycles_passed: u64 = 0;

    for (number, line) in input.lines().enumerate() {
        let line = line?;
        if number < HEADER_LINES {
            continue;
        }
        let parse_err = |message: &str| Error::DumpParse {
            line: number + 1,
            message: message.to_string(),
        };

        let delta_field = line.get(0..8).ok_or_else(|| parse_err("line too short"))?;
        let address_field = line.get(9..13).ok_or_else(|| parse_err("line too short"))?;
        let value_field = line.get(14..16).ok_or_else(|| parse_err("line too short"))?;

        let delta = u32::from_str_radix(delta_field, 16)
            .map_err(|_| parse_err("bad cycle delta"))?;
        let address = u16::from_str_radix(address_field, 16)
            .map_err(|_| parse_err("bad register address"))?;
        let value = u8::from_str_radix(value_field, 16)
            .map_err(|_| parse_err("bad register value"))?;

        cycles_passed += u64::from(delta);
        writes.push(RegWrite {
            time: cycles_passed,
            address: (address & 0xFF) as u8,
            value,
        });
    }

    Ok(writes)
}

/// Run gbsplay on a GBS file and capture the register dump.
pub fn run(gbs: &Path, subsong: u32, seconds: u32) -> Result<Vec<RegWrite>> {
    let mut child = Command::new("gbsplay")
        .arg("-t")
        .arg(seconds.to_string())
        .arg("-o")
        .arg("iodumper")
        .arg("--")
        .arg(gbs)
        .arg(subsong.to_string())
        .arg(subsong.to_string())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Gbsplay(format!("failed to start gbsplay: {}", e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Gbsplay("no stdout handle".to_string()))?;
    let writes = parse_dump(BufReader::new(stdout))?;

    let status = child.wait()?;
    if !status.success() {
        return Err(Error::Gbsplay(format!("gbsplay exited with {}", status)));
    }

    log::debug!("captured {} register writes", writes.len());
    Ok(writes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_dump_accumulates_cycles() {
        let dump = "\
gbsplay preamble line one
gbsplay preamble line two
00000000 ff26=80
000003e8 ff12=f3
00000010 ff14=87
";
        let writes = parse_dump(Cursor::new(dump)).unwrap();
        assert_eq!(
            writes,
            vec![
                RegWrite { time: 0, address: 0x26, value: 0x80 },
                RegWrite { time: 0x3E8, address: 0x12, value: 0xF3 },
                RegWrite { time: 0x3F8, address: 0x14, value: 0x87 },
            ]
        );
    }

    #[test]
    fn test_parse_dump_empty() {
        let writes = parse_dump(Cursor::new("line one\nline two\n")).unwrap();
        assert!(writes.is_empty());
    }

    #[test]
    fn test_parse_dump_reports_line_number() {
        let dump = "one\ntwo\nnot hex!\n";
        match parse_dump(Cursor::new(dump)) {
            Err(Error::DumpParse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected a dump parse error, got {:?}", other.map(|_| ())),
        }
    }
}
