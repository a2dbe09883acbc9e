use crate::core::simulator::{HourLogSink, HourRecord};
use csv::WriterBuilder;
use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub trait Output: Debug {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write>;
    /// Whether this output can be considered a no-op and therefore that any code that only writes to the output can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct FileOutput {
    directory_path: PathBuf,
    file_prefix: String,
}

impl FileOutput {
    pub fn new(directory_path: PathBuf, file_prefix: String) -> Self {
        Self {
            directory_path,
            file_prefix,
        }
    }
}

impl Output for FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        Ok(BufWriter::new(File::create(self.directory_path.join(
            format!("{}{location_key}.csv", self.file_prefix),
        ))?))
    }
}

impl Output for &FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <FileOutput as Output>::writer_for_location_key(self, location_key)
    }
}

/// An output that goes to nowhere/ a "sink"/ /dev/null.
#[derive(Debug, Default)]
pub struct SinkOutput;

impl Output for SinkOutput {
    fn writer_for_location_key(&self, _location_key: &str) -> anyhow::Result<impl Write> {
        Ok(io::sink())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Writes per-hour simulation rows as CSV. The header carries one column per
/// tank node, so it is emitted with the first row once the node count is
/// known.
pub struct CsvHourLog<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl<W: Write> CsvHourLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: WriterBuilder::new().from_writer(writer),
            header_written: false,
        }
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        Ok(self.writer.flush()?)
    }

    fn write_header(&mut self, node_count: usize) -> anyhow::Result<()> {
        let mut columns: Vec<String> = (0..node_count)
            .map(|n| format!("Tank node #{n}"))
            .collect();
        columns.extend(
            [
                "time",
                "temperature",
                "demand (kWh)",
                "energy stored (kWh)",
                "tank draw to load (kg)",
                "heat injected (kWh)",
                "energy surplus (kWh)",
                "electricity used (kWh)",
                "tank draw to heatpump (kg)",
                "heatpump active",
            ]
            .map(String::from),
        );
        self.writer.write_record(&columns)?;
        Ok(())
    }
}

impl<W: Write> HourLogSink for CsvHourLog<W> {
    fn record(&mut self, record: &HourRecord) -> anyhow::Result<()> {
        if !self.header_written {
            self.write_header(record.node_temps.len())?;
            self.header_written = true;
        }

        let mut row: Vec<String> = record
            .node_temps
            .iter()
            .map(|temp| temp.to_string())
            .collect();
        row.extend([
            record.timestamp.to_rfc3339(),
            record.ambient_temp.to_string(),
            record.demand.to_string(),
            record.energy_stored.to_string(),
            record.mass_drawn.to_string(),
            record.heat_injected.to_string(),
            record.surplus.to_string(),
            record.electricity_used.to_string(),
            record.mass_heated.to_string(),
            u8::from(record.heating_active).to_string(),
        ]);
        self.writer.write_record(&row)?;
        Ok(())
    }
}
