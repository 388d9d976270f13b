use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("could not parse {}", path.display()))
}

/// Pretty-printed with two-space indentation, like the files the planner
/// ships with.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("could not create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("could not write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Header row comes from the field names of `T`. Nothing is written for
/// an empty list.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if rows.is_empty() {
        log::warn!("no rows to save to {}", path.display());
        return Ok(());
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("could not create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Row {
        first_name: String,
        num_ratings: Option<u32>,
    }

    #[test]
    fn json_survives_a_trip_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.json");
        let rows = vec![Row {
            first_name: "Ada".to_owned(),
            num_ratings: Some(3),
        }];

        write_json(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  {\n    \"firstName\": \"Ada\""));
        assert_eq!(read_json::<Vec<Row>>(&path).unwrap(), rows);
    }

    #[test]
    fn missing_input_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");

        let error = read_json::<Vec<Row>>(&path).unwrap_err();
        assert!(error.to_string().contains("nope.json"));
    }

    #[test]
    fn csv_has_a_header_and_blank_nulls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");
        let rows = vec![
            Row {
                first_name: "Ada".to_owned(),
                num_ratings: Some(3),
            },
            Row {
                first_name: "Alan".to_owned(),
                num_ratings: None,
            },
        ];

        write_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "firstName,numRatings\nAda,3\nAlan,\n");
    }

    #[test]
    fn empty_csv_is_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");

        write_csv::<Row>(&path, &[]).unwrap();

        assert!(!path.exists());
    }
}
