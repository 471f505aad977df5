//! Flat file storage of identifier mappings
//!
//! One reaction per line, the reaction id followed by its identifiers, separated by any
//! whitespace. Mappings are written tab separated.
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::kinetics::mapping::IdentifierMapping;

impl IdentifierMapping {
    /// Read a mapping file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let mapping = Self::from_reader(fs::File::open(path)?)?;
        if mapping.is_empty() {
            warn!(path = %path.display(), "Identifier mapping is empty");
        } else {
            info!(path = %path.display(), reactions = mapping.len(), "Read identifier mapping");
        }
        Ok(mapping)
    }

    /// Parse a mapping from any reader, lines without identifiers are ignored
    ///
    /// A reaction listed more than once keeps the identifiers of its last line.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, MappingError> {
        let mut mapping = IdentifierMapping::new();
        for (number, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(reaction) = fields.next() else {
                continue;
            };
            let identifiers: Vec<String> = fields.map(str::to_string).collect();
            if identifiers.is_empty() {
                debug!(reaction, line = number + 1, "Mapping line has no identifiers");
                continue;
            }
            if mapping.identifiers(reaction).is_some() {
                warn!(reaction, line = number + 1, "Reaction is mapped again, keeping this line");
            }
            mapping.insert(reaction, identifiers);
        }
        Ok(mapping)
    }

    /// Write the mapping, one tab separated line per reaction
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), MappingError> {
        let contents: String = self
            .iter()
            .map(|(reaction, identifiers)| {
                let mut line = reaction.to_string();
                for id in identifiers {
                    line.push('\t');
                    line.push_str(id);
                }
                line.push('\n');
                line
            })
            .collect();
        fs::write(path, contents)?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Unable to access mapping file")]
    Io(#[from] std::io::Error),
}
