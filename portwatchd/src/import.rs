use std::io::Read;
use std::path::Path;
use anyhow::{Context, Result};
use shared::types::ServiceRecord;

/// Parsed service list
#[derive(Debug, Default)]
pub struct Import {
    pub records: Vec<ServiceRecord>,
    /// Rows dropped for missing fields, an empty host, a bad port or bad UTF-8
    pub skipped: usize,
}

/// Read a headerless `host,port,label` CSV file
pub fn from_path(path: impl AsRef<Path>) -> Result<Import> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open service list: {}", path.display()))?;
    from_reader(file).with_context(|| format!("Failed to read service list: {}", path.display()))
}

/// Parse CSV text already in memory
pub fn from_str(text: &str) -> Result<Import> {
    from_reader(text.as_bytes())
}

fn from_reader(reader: impl Read) -> Result<Import> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut import = Import::default();
    for row in csv.byte_records() {
        let row = row.context("Malformed CSV")?;
        let record = match csv::StringRecord::from_byte_record(row) {
            Ok(row) => {
                let record = parse_row(&row);
                if record.is_none() {
                    tracing::debug!("Skipping service row {:?}", row);
                }
                record
            }
            Err(e) => {
                tracing::debug!("Skipping service row that is not UTF-8: {}", e);
                None
            }
        };
        match record {
            Some(record) => import.records.push(record),
            None => import.skipped += 1,
        }
    }

    if import.skipped > 0 {
        tracing::warn!("{} service rows skipped", import.skipped);
    }
    Ok(import)
}

fn parse_row(row: &csv::StringRecord) -> Option<ServiceRecord> {
    if row.len() < 3 {
        return None;
    }
    let host = row.get(0)?;
    let label = row.get(2)?;
    let port = row.get(1)?.parse::<u16>().ok().filter(|p| *p != 0)?;
    if host.is_empty() {
        return None;
    }
    Some(ServiceRecord::new(host, port, label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::ServiceStatus;
    use std::io::Write;

    #[test]
    fn test_import_in_order() {
        let import = from_str("10.0.0.1,80,web\n10.0.0.2,9999,db\n").unwrap();
        assert_eq!(import.skipped, 0);
        assert_eq!(import.records.len(), 2);
        assert_eq!(import.records[0], ServiceRecord::new("10.0.0.1", 80, "web"));
        assert_eq!(import.records[1], ServiceRecord::new("10.0.0.2", 9999, "db"));
        assert!(import.records.iter().all(|r| r.status == ServiceStatus::Unknown));
    }

    #[test]
    fn test_short_row_skipped() {
        let import = from_str("10.0.0.1,80,web\n10.0.0.3,443\n10.0.0.2,9999,db\n").unwrap();
        assert_eq!(import.skipped, 1);
        let labels: Vec<_> = import.records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["web", "db"]);
    }

    #[test]
    fn test_bad_port_and_empty_host_skipped() {
        let import = from_str("a,http,web\nb,0,zero\nc,70000,big\n,22,nohost\nd,22,ok\n").unwrap();
        assert_eq!(import.skipped, 4);
        assert_eq!(import.records, vec![ServiceRecord::new("d", 22, "ok")]);
    }

    #[test]
    fn test_extra_fields_and_whitespace() {
        let import = from_str(" host.example , 8080 ,\"api, v2\",extra\n").unwrap();
        assert_eq!(import.records, vec![ServiceRecord::new("host.example", 8080, "api, v2")]);
    }

    #[test]
    fn test_duplicates_kept() {
        let import = from_str("10.0.0.1,80,web\n10.0.0.1,80,web\n").unwrap();
        assert_eq!(import.records.len(), 2);
    }

    #[test]
    fn test_non_utf8_row_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"10.0.0.1,80,web\n10.0.0.2,22,caf\xe9\n10.0.0.3,443,api\n").unwrap();

        let import = from_path(file.path()).unwrap();
        assert_eq!(import.skipped, 1);
        let labels: Vec<_> = import.records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["web", "api"]);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "10.0.0.1,80,web").unwrap();
        let import = from_path(file.path()).unwrap();
        assert_eq!(import.records.len(), 1);
        assert!(from_path("/nonexistent/assets.csv").is_err());
    }
}
