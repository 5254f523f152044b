use crate::analysis::AnalysisResult;
use crate::error::Result;
use crate::source::ResultSink;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const BASIC_HEADER: [&str; 4] = ["SequenceNumber", "TimeDuration", "Conflict", "RTO"];
const EXTENDED_HEADER: [&str; 3] = ["FrTimeUs", "Srtt", "SrttMinusDuration"];

/// Writes one CSV row per result, flushed as it goes.
pub struct CsvResultWriter<W: Write> {
    writer: csv::Writer<W>,
    extended: bool,
}

impl CsvResultWriter<File> {
    pub fn create(path: impl AsRef<Path>, extended: bool) -> Result<Self> {
        Self::from_writer(File::create(path)?, extended)
    }
}

impl<W: Write> CsvResultWriter<W> {
    /// Wrap `inner` and write the header row immediately.
    pub fn from_writer(inner: W, extended: bool) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        let mut header = BASIC_HEADER.to_vec();
        if extended {
            header.extend(EXTENDED_HEADER);
        }
        writer.write_record(&header)?;
        writer.flush()?;
        Ok(CsvResultWriter { writer, extended })
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

impl<W: Write> ResultSink for CsvResultWriter<W> {
    fn save(&mut self, result: &AnalysisResult) -> Result<()> {
        let mut row = vec![
            result.seq.to_string(),
            format!("{:.9}", result.duration),
            (result.conflict as u8).to_string(),
            (result.rto as u8).to_string(),
        ];
        if self.extended {
            row.push(result.fr_time_us.to_string());
            row.push(format!("{:.9}", result.srtt));
            row.push(format!("{:.9}", result.diff));
        }
        self.writer.write_record(&row)?;
        self.writer.flush()?;
        Ok(())
    }
}
