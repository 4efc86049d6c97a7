//! Chunked line streaming from one file into another

use gcodeplan_core::PostProcessError;
use std::io::{Read, Write};
use std::path::Path;

/// Read chunk size, also the threshold at which output is flushed
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Stream `input` line by line into `output`
///
/// A line ends at `\n`, `\r` or `\r\n`. `handler` gets the 1-based line id
/// and the raw bytes of the line without its terminator, and appends the
/// bytes to export, newline-terminated, to the output buffer. Lines are not
/// required to be UTF-8. Returns the number of lines.
pub fn rewrite_lines<R, W, F>(
    mut input: R,
    mut output: W,
    input_path: &Path,
    output_path: &Path,
    mut handler: F,
) -> Result<u32, PostProcessError>
where
    R: Read,
    W: Write,
    F: FnMut(u32, &[u8], &mut Vec<u8>),
{
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut line: Vec<u8> = Vec::new();
    let mut export: Vec<u8> = Vec::with_capacity(CHUNK_SIZE + CHUNK_SIZE / 2);
    let mut line_id = 0u32;
    let mut after_cr = false;

    loop {
        let read = input
            .read(&mut chunk)
            .map_err(|source| PostProcessError::Read {
                path: input_path.to_path_buf(),
                source,
            })?;
        if read == 0 {
            break;
        }

        let mut rest = &chunk[..read];
        while !rest.is_empty() {
            if after_cr {
                after_cr = false;
                if rest[0] == b'\n' {
                    rest = &rest[1..];
                    continue;
                }
            }
            match rest.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(end) => {
                    line.extend_from_slice(&rest[..end]);
                    after_cr = rest[end] == b'\r';
                    rest = &rest[end + 1..];

                    line_id += 1;
                    handler(line_id, &line, &mut export);
                    line.clear();
                    if export.len() >= CHUNK_SIZE {
                        write_export(&mut output, &mut export, output_path)?;
                    }
                }
                None => {
                    line.extend_from_slice(rest);
                    rest = &[];
                }
            }
        }
    }

    if !line.is_empty() {
        line_id += 1;
        handler(line_id, &line, &mut export);
    }
    write_export(&mut output, &mut export, output_path)?;
    output.flush().map_err(|source| PostProcessError::Write {
        path: output_path.to_path_buf(),
        source,
    })?;
    Ok(line_id)
}

fn write_export<W: Write>(
    output: &mut W,
    export: &mut Vec<u8>,
    path: &Path,
) -> Result<(), PostProcessError> {
    if export.is_empty() {
        return Ok(());
    }
    output
        .write_all(export)
        .map_err(|source| PostProcessError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    export.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn copy_with_ids(input: &str) -> (String, u32) {
        let mut output = Vec::new();
        let count = rewrite_lines(
            Cursor::new(input.as_bytes()),
            &mut output,
            Path::new("in"),
            Path::new("out"),
            |id, line, out| {
                out.extend_from_slice(format!("{}:", id).as_bytes());
                out.extend_from_slice(line);
                out.push(b'\n');
            },
        )
        .unwrap();
        (String::from_utf8(output).unwrap(), count)
    }

    #[test]
    fn test_line_endings() {
        let (out, count) = copy_with_ids("G1 X1\r\nG1 X2\rG1 X3\nG1 X4");
        assert_eq!(count, 4);
        assert_eq!(out, "1:G1 X1\n2:G1 X2\n3:G1 X3\n4:G1 X4\n");
    }

    #[test]
    fn test_empty_lines_are_counted() {
        let (out, count) = copy_with_ids("a\n\nb\n");
        assert_eq!(count, 3);
        assert_eq!(out, "1:a\n2:\n3:b\n");
    }

    #[test]
    fn test_handler_can_insert_lines() {
        let mut output = Vec::new();
        rewrite_lines(
            Cursor::new(b"G1 X1\nG1 X2\n".as_slice()),
            &mut output,
            Path::new("in"),
            Path::new("out"),
            |id, line, out| {
                if id == 2 {
                    out.extend_from_slice(b"M73 P50 R1\n");
                }
                out.extend_from_slice(line);
                out.push(b'\n');
            },
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "G1 X1\nM73 P50 R1\nG1 X2\n"
        );
    }

    #[test]
    fn test_large_input_spans_chunks() {
        let input: String = (0..20_000).map(|i| format!("G1 X{}\n", i)).collect();
        let (out, count) = copy_with_ids(&input);
        assert_eq!(count, 20_000);
        assert!(out.ends_with("20000:G1 X19999\n"));
    }

    #[test]
    fn test_non_utf8_bytes_pass_through() {
        let mut output = Vec::new();
        rewrite_lines(
            Cursor::new(b"; caf\xe9\nG1 X1\n".as_slice()),
            &mut output,
            Path::new("in"),
            Path::new("out"),
            |_, line, out| {
                out.extend_from_slice(line);
                out.push(b'\n');
            },
        )
        .unwrap();
        assert_eq!(output, b"; caf\xe9\nG1 X1\n");
    }
}
