use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;

/// Buffered reader over a file or, for `-`, standard input.
pub struct InputReader {
    reader: Box<dyn Read + Send>,
    is_pipe: bool,
}

impl InputReader {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let is_pipe = is_pipe(input_path.as_ref());

        let reader: Box<dyn Read + Send> = if is_pipe {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let file = File::open(input_path)?;
            Box::new(BufReader::new(file))
        };

        Ok(Self { reader, is_pipe })
    }

    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

pub fn is_pipe(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}
