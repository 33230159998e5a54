//! User-code sink
//!
//! A write-only stream over a uniquely-named temporary file.  The parser
//! diverts raw host-language text (conditions, actions, enter/exit bodies)
//! into it, wrapped between per-auxiliary-function headers and footers
//! produced by the code generator.  After parsing and validation succeed,
//! the sink is rewound and copied into the definition stream.  The file is
//! removed on drop.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tempfile::NamedTempFile;

pub struct UserCode {
    file: NamedTempFile,
}

impl UserCode {
    pub fn new() -> io::Result<Self> {
        let file = tempfile::Builder::new().prefix("chsm.").tempfile()?;
        Ok(Self { file })
    }

    pub fn write(&mut self, text: &str) -> io::Result<()> {
        self.file.write_all(text.as_bytes())
    }

    /// Rewind the sink and return everything written so far.
    pub fn read_back(&mut self) -> io::Result<String> {
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        self.file.read_to_string(&mut contents)?;
        Ok(contents)
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_back() {
        let mut sink = UserCode::new().unwrap();
        sink.write("first\n").unwrap();
        sink.write("second\n").unwrap();
        assert_eq!(sink.read_back().unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_file_removed_on_drop() {
        let path;
        {
            let sink = UserCode::new().unwrap();
            path = sink.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
