// 📇 Party Directory
// Collector name → collector ID, kept in a two-column CSV file.
//
// The file is maintained by hand (any spreadsheet app can edit it). The core
// only seeds it when missing and reads it; it never writes party rows itself.

use crate::error::DirectoryError;
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// ID reported for parties without one (and for unknown names)
pub const UNKNOWN_ID: &str = "N/A";

const HEADER: [&str; 2] = ["name", "id"];
const EXAMPLE_PARTY: [&str; 2] = ["Example Collector 1", "123456789"];

/// PartyRecord - one row of the directory file
#[derive(Debug, Clone, PartialEq)]
pub struct PartyRecord {
    pub name: String,
    pub id: String,
}

/// PartyDirectory - in-memory copy of the directory file
#[derive(Debug, Clone, Default)]
pub struct PartyDirectory {
    parties: HashMap<String, String>,
}

impl PartyDirectory {
    /// Read the directory file, creating it with an example row if missing.
    ///
    /// # Returns
    /// * `Ok(directory)` - at least one usable row
    /// * `Err(DirectoryError::Empty)` - file readable, nothing usable in it
    /// * `Err(DirectoryError::Create | Read)` - file could not be made or opened
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        if !path.exists() {
            create_seeded(path)?;
            info!("created party directory {}", path.display());
        }

        let read_err = |source| DirectoryError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(read_err)?;

        let mut parties = HashMap::new();
        for result in reader.records() {
            let record = result.map_err(read_err)?;
            if let Some(party) = party_from_record(&record) {
                parties.insert(party.name, party.id);
            }
        }

        if parties.is_empty() {
            warn!("party directory {} has no usable rows", path.display());
            return Err(DirectoryError::Empty {
                path: path.to_path_buf(),
            });
        }

        info!("loaded {} parties from {}", parties.len(), path.display());
        Ok(PartyDirectory { parties })
    }

    /// ID for a party name, `UNKNOWN_ID` if the name is not listed
    pub fn resolve(&self, name: &str) -> &str {
        self.parties.get(name).map(String::as_str).unwrap_or(UNKNOWN_ID)
    }

    /// All party names, sorted for display
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.parties.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }
}

impl FromIterator<PartyRecord> for PartyDirectory {
    fn from_iter<I: IntoIterator<Item = PartyRecord>>(iter: I) -> Self {
        PartyDirectory {
            parties: iter.into_iter().map(|p| (p.name, p.id)).collect(),
        }
    }
}

/// Name in column 1, ID in column 2; blank names are skipped
fn party_from_record(record: &csv::StringRecord) -> Option<PartyRecord> {
    let name = record.get(0).map(str::trim).unwrap_or("");
    if name.is_empty() {
        return None;
    }

    let id = record.get(1).map(str::trim).unwrap_or("");
    Some(PartyRecord {
        name: name.to_string(),
        id: if id.is_empty() { UNKNOWN_ID } else { id }.to_string(),
    })
}

fn create_seeded(path: &Path) -> Result<(), DirectoryError> {
    let create_err = |source| DirectoryError::Create {
        path: PathBuf::from(path),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| create_err(csv::Error::from(e)))?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(create_err)?;
    writer.write_record(HEADER).map_err(create_err)?;
    writer.write_record(EXAMPLE_PARTY).map_err(create_err)?;
    writer
        .flush()
        .map_err(|e| create_err(csv::Error::from(e)))?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_seeded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("parties.csv");

        let directory = PartyDirectory::load(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["name,id", "Example Collector 1,123456789"]);

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.resolve("Example Collector 1"), "123456789");
    }

    #[test]
    fn test_blank_names_skipped_and_blank_ids_unknown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("parties.csv");
        fs::write(
            &path,
            "name,id\n  ACME Recycling , 900\n,555\nBeta Co,\nGamma\n",
        )
        .unwrap();

        let directory = PartyDirectory::load(&path).unwrap();

        assert_eq!(directory.names(), vec!["ACME Recycling", "Beta Co", "Gamma"]);
        assert_eq!(directory.resolve("ACME Recycling"), "900");
        assert_eq!(directory.resolve("Beta Co"), UNKNOWN_ID);
        assert_eq!(directory.resolve("Gamma"), UNKNOWN_ID);
        assert_eq!(directory.resolve("Nobody"), UNKNOWN_ID);
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("parties.csv");
        fs::write(&path, "name,id\n,\n").unwrap();

        let result = PartyDirectory::load(&path);
        assert!(matches!(result, Err(DirectoryError::Empty { .. })));
    }

    #[test]
    fn test_unreadable_location_is_an_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be cannot be opened as CSV.
        let path = dir.path().join("parties.csv");
        fs::create_dir(&path).unwrap();

        let result = PartyDirectory::load(&path);
        assert!(matches!(result, Err(DirectoryError::Read { .. })));
    }

    #[test]
    fn test_directory_from_records() {
        let directory: PartyDirectory = vec![PartyRecord {
            name: "ACME".to_string(),
            id: "42".to_string(),
        }]
        .into_iter()
        .collect();

        assert_eq!(directory.resolve("ACME"), "42");
        assert!(!directory.is_empty());
    }
}
