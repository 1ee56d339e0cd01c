//! Byte sources and sinks for the CLI tools
//!
//! `"-"` selects stdin/stdout, anything else is a file path.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

/// Open an input: file path or `-` for stdin
pub fn open_input(input: &str) -> io::Result<Box<dyn Read>> {
    if input == "-" {
        tracing::info!("Reading from stdin");
        Ok(Box::new(io::stdin()))
    } else {
        tracing::info!("Reading from file: {}", input);
        Ok(Box::new(BufReader::new(File::open(input)?)))
    }
}

/// Open an output: file path or `-` for stdout
pub fn open_output(output: &str) -> io::Result<Box<dyn Write>> {
    if output == "-" {
        tracing::info!("Writing to stdout");
        Ok(Box::new(io::stdout()))
    } else {
        tracing::info!("Writing to file: {}", output);
        Ok(Box::new(BufWriter::new(File::create(output)?)))
    }
}

/// Fill `buf` as far as possible, stopping early only at end of input
pub fn read_chunk<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
