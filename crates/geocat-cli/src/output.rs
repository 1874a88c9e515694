//! Rendering of dataset records.

use anyhow::Result;
use clap::ValueEnum;
use geocat_core::DatasetInfo;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One YAML document per dataset
    Yaml,
    /// A JSON array
    Json,
    /// `id,status,product,location`, first location only
    Csv,
}

pub fn write_infos<W: Write>(format: OutputFormat, infos: &[DatasetInfo], out: W) -> Result<()> {
    match format {
        OutputFormat::Yaml => write_yaml(infos, out),
        OutputFormat::Json => write_json(infos, out),
        OutputFormat::Csv => write_csv(infos, out),
    }
}

fn write_yaml<W: Write>(infos: &[DatasetInfo], mut out: W) -> Result<()> {
    for info in infos {
        writeln!(out, "---")?;
        out.write_all(serde_yaml::to_string(info)?.as_bytes())?;
    }
    out.flush()?;
    Ok(())
}

fn write_json<W: Write>(infos: &[DatasetInfo], mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, infos)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn write_csv<W: Write>(infos: &[DatasetInfo], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["id", "status", "product", "location"])?;
    for info in infos {
        let id = info.id.to_string();
        let location = info.locations.first().map(String::as_str).unwrap_or("");
        writer.write_record([id.as_str(), info.status, info.product.as_str(), location])?;
    }
    writer.flush()?;
    Ok(())
}
