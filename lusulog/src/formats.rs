// The file formats an ingestion task can name.  Names come from the configuration file and are
// resolved when it is loaded, so a misspelled format is reported before any file is read.
//
// To add a format: add a variant, give it a name and an extension, and a parse function with the
// same text -> Option<LusuRecord> contract as parse_xt_lusu_tgs.

use crate::{parse_xt_lusu_tgs, LusuRecord};
use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// XT-series LUSU tag files.
    XtLusuTgs,
}

impl FileFormat {
    pub const ALL: [FileFormat; 1] = [FileFormat::XtLusuTgs];

    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::XtLusuTgs => "xt_lusu_tgs",
        }
    }

    /// File name extension of files in this format, without the dot.

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::XtLusuTgs => "tgs",
        }
    }

    /// Parse the full text of one file.  None means the file yields no record.

    pub fn parse(&self, text: &str) -> Option<LusuRecord> {
        match self {
            FileFormat::XtLusuTgs => parse_xt_lusu_tgs(text),
        }
    }
}

impl FromStr for FileFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<FileFormat> {
        for f in FileFormat::ALL {
            if f.name() == s {
                return Ok(f);
            }
        }
        let known = FileFormat::ALL.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ");
        bail!("Unknown file format '{s}', expected one of: {known}")
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[test]
fn test_format_names() {
    assert!(FileFormat::from_str("xt_lusu_tgs").unwrap() == FileFormat::XtLusuTgs);
    assert!(FileFormat::XtLusuTgs.to_string() == "xt_lusu_tgs");
    assert!(FileFormat::from_str("pas_log").is_err());
    assert!(FileFormat::from_str("XT_LUSU_TGS").is_err());
}

#[test]
fn test_format_parse() {
    let f = FileFormat::XtLusuTgs;
    assert!(f.extension() == "tgs");
    assert!(f.parse("LUSU_CREATE_TIME_TAG|INT|s|1700000000\n").is_some());
    assert!(f.parse("nothing here\n").is_none());
}
