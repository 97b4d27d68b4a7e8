use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One row of simulation telemetry, taken after the plant has been advanced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub time: f64,
    pub pitch_reference: f64,
    pub yaw_reference: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub roll_rate: f64,
    pub pitch_rate: f64,
    pub yaw_rate: f64,
    pub force: f64,
    pub torque: f64,
    pub left: f64,
    pub right: f64,
    pub saturated: bool,
    pub held: bool,
}

/// Writes the records to a CSV file with a header row.
pub fn write_csv<P: AsRef<Path>>(path: P, records: &[TelemetryRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_has_header_and_rows() {
        let path = std::env::temp_dir().join(format!("whirlybird-telemetry-{}.csv", std::process::id()));
        let records = [
            TelemetryRecord {
                time: 0.01,
                pitch: -0.26,
                ..Default::default()
            },
            TelemetryRecord {
                time: 0.02,
                saturated: true,
                ..Default::default()
            },
        ];

        write_csv(&path, &records).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("time,pitch_reference,yaw_reference,roll,pitch"));
        assert!(lines[0].ends_with("saturated,held"));
        assert!(lines[2].ends_with("true,false"));

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let back: Vec<TelemetryRecord> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(back, records);
    }
}
