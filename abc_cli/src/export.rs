use std::io::{self, Write};

use database::models::StoredTune;

/// Rows shown by [`write_report`] before the listing is cut short.
const REPORT_MAX_ROWS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// Tunes as ABC notation, separated by blank lines.
    Abc,
    Json,
    /// Plain-text table with a tune count.
    Report,
}

pub fn write_tunes<W: Write>(
    writer: W,
    tunes: &[StoredTune],
    format: ExportFormat,
) -> io::Result<()> {
    match format {
        ExportFormat::Abc => write_abc(writer, tunes),
        ExportFormat::Json => write_json(writer, tunes),
        ExportFormat::Report => write_report(writer, tunes),
    }
}

pub fn write_abc<W: Write>(mut writer: W, tunes: &[StoredTune]) -> io::Result<()> {
    for (index, tune) in tunes.iter().enumerate() {
        if index > 0 {
            writeln!(writer)?;
        }
        writeln!(writer, "{}", tune.abc_notation)?;
    }
    writer.flush()
}

pub fn write_json<W: Write>(mut writer: W, tunes: &[StoredTune]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, tunes)?;
    writeln!(writer)?;
    writer.flush()
}

pub fn write_report<W: Write>(mut writer: W, tunes: &[StoredTune]) -> io::Result<()> {
    writeln!(writer, "ABC Tune Database Export")?;
    writeln!(writer)?;
    writeln!(writer, "Total tunes: {}", tunes.len())?;
    writeln!(writer)?;
    write_table(writer, tunes, REPORT_MAX_ROWS)
}

/// Fixed-width listing of at most `max_rows` tunes.
pub fn write_table<W: Write>(
    mut writer: W,
    tunes: &[StoredTune],
    max_rows: usize,
) -> io::Result<()> {
    writeln!(
        writer,
        "{:>6}  {:>4}  {:<40}  {:<12}  {:<10}  {:<6}",
        "id", "book", "title", "type", "key", "meter"
    )?;
    writeln!(writer, "{}", "-".repeat(88))?;

    for tune in tunes.iter().take(max_rows) {
        writeln!(
            writer,
            "{:>6}  {:>4}  {:<40}  {:<12}  {:<10}  {:<6}",
            tune.id,
            tune.book_number,
            fit(&tune.title, 40),
            fit(&tune.tune_type, 12),
            fit(&tune.key_signature, 10),
            fit(&tune.meter, 6),
        )?;
    }

    if tunes.len() > max_rows {
        writeln!(writer, "... and {} more", tunes.len() - max_rows)?;
    }
    writer.flush()
}

fn fit(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_owned();
    }
    let mut fitted = value.chars().take(width - 1).collect::<String>();
    fitted.push('…');
    fitted
}
